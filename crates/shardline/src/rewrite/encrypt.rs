/*
 * Copyright 2026 Shardline Authors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Encryption rewriting: cipher and assisted query columns in place of logic
//! columns, encrypted literals and parameters.

use crate::binder::{BoundStatementContext, ColumnSegment, Projection, ProjectionOrigin, StatementKind};
use crate::error::{Result, RewriteError, ShardError};
use crate::rewrite::token::{quote_of, quoted, SqlToken, TokenPart};
use crate::rule::{EncryptColumn, RuleSet};
use crate::sql::{literal_value, object_name_parts, TextRange};
use crate::types::Value;
use sqlparser::ast::{
    visit_expressions, AssignmentTarget, BinaryOperator, Expr, GroupByExpr, OnInsert, OrderBy,
    OrderByKind, Query, SetExpr, Spanned, Statement, Value as AstValue, Visit, Visitor,
};
use std::collections::HashSet;
use std::ops::ControlFlow;

/// Parameter change requested by an encryption token.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterEdit {
    Replace { index: usize, value: Value },
    /// New parameter for a marker inserted at text offset `at`.
    Add { at: usize, value: Value },
}

#[derive(Debug, Default)]
pub struct EncryptRewrite {
    pub tokens: Vec<SqlToken>,
    /// Wildcard items replaced by an explicit column list.
    pub expanded_wildcards: HashSet<TextRange>,
    pub parameter_edits: Vec<ParameterEdit>,
}

enum Operand {
    Parameter(usize, Value),
    Literal(Value, TextRange),
    Other,
}

struct Encrypted<'a> {
    range: TextRange,
    table: &'a str,
    column: &'a EncryptColumn,
}

pub struct EncryptTokenGenerator<'a> {
    ctx: &'a BoundStatementContext,
    rules: &'a RuleSet,
    params: &'a [Value],
}

impl<'a> EncryptTokenGenerator<'a> {
    pub fn new(ctx: &'a BoundStatementContext, rules: &'a RuleSet, params: &'a [Value]) -> Self {
        Self { ctx, rules, params }
    }

    pub fn generate(&self) -> Result<EncryptRewrite> {
        let mut out = EncryptRewrite::default();
        let touches_encrypted = self
            .ctx
            .tables()
            .table_names()
            .iter()
            .any(|t| self.rules.encrypt.find_table(t).is_some());
        if !touches_encrypted {
            return Ok(out);
        }
        let mut handled = HashSet::new();
        self.check_insert(&mut handled)?;
        if self.ctx.kind() == StatementKind::Select {
            self.check_ordering()?;
            self.projections(&mut out, &mut handled);
        }
        self.assignments(&mut out, &mut handled)?;
        self.predicates(&mut out, &mut handled)?;
        for segment in self.ctx.columns() {
            let Some(found) = self.encrypted(segment) else {
                continue;
            };
            if handled.insert(found.range.start) {
                out.tokens.push(self.rename(&found, &found.column.cipher));
            }
        }
        Ok(out)
    }

    fn encrypted(&self, segment: &'a ColumnSegment) -> Option<Encrypted<'a>> {
        let table = segment.table.as_deref()?;
        let column = self.rules.encrypt.find_column(table, &segment.name)?;
        Some(Encrypted {
            range: segment.range?,
            table,
            column,
        })
    }

    fn encrypted_expr(&self, expr: &Expr) -> Option<Encrypted<'a>> {
        let ident = match expr {
            Expr::Identifier(ident) => ident,
            Expr::CompoundIdentifier(parts) => parts.last()?,
            Expr::Nested(inner) => return self.encrypted_expr(inner),
            _ => return None,
        };
        self.encrypted(self.ctx.column_for_ident(ident)?)
    }

    fn rename(&self, found: &Encrypted<'_>, to: &str) -> SqlToken {
        let quote = quote_of(self.ctx.source().slice(found.range));
        SqlToken::text(found.range, quoted(to, quote))
    }

    fn operand(&self, expr: &Expr, column: &str) -> Result<Operand> {
        let Expr::Value(v) = expr else {
            return Ok(Operand::Other);
        };
        if matches!(v.value, AstValue::Placeholder(_)) {
            let marker = self.ctx.marker_for_value(v).ok_or_else(|| {
                ShardError::Rewrite(RewriteError::SegmentPosition(format!(
                    "parameter marker next to encrypted column '{column}'"
                )))
            })?;
            let value = self.params.get(marker.index).cloned().ok_or_else(|| {
                ShardError::Rewrite(RewriteError::MissingDerivedValue(format!(
                    "parameter #{} for encrypted column '{column}' is not bound",
                    marker.index + 1
                )))
            })?;
            return Ok(Operand::Parameter(marker.index, value));
        }
        match literal_value(expr) {
            Some(value) => {
                let range = self.ctx.source().require_range(v.span, "literal")?;
                Ok(Operand::Literal(value, range))
            }
            None => Ok(Operand::Other),
        }
    }

    /// INSERT column names are rewritten with the value groups; encrypted columns in
    /// ON DUPLICATE KEY UPDATE are not supported.
    fn check_insert(&self, handled: &mut HashSet<usize>) -> Result<()> {
        let Some(insert) = self.ctx.insert() else {
            return Ok(());
        };
        handled.extend(insert.columns.iter().filter_map(|c| c.range).map(|r| r.start));
        let Statement::Insert(statement) = self.ctx.statement() else {
            return Ok(());
        };
        if let Some(OnInsert::DuplicateKeyUpdate(assignments)) = &statement.on {
            for assignment in assignments {
                let AssignmentTarget::ColumnName(name) = &assignment.target else {
                    continue;
                };
                let Some(ident) = object_name_parts(name).last().copied() else {
                    continue;
                };
                if let Some(column) = self.rules.encrypt.find_column(&insert.table, &ident.value) {
                    return Err(ShardError::Rewrite(RewriteError::UnsupportedEncryptPredicate {
                        column: column.logic.clone(),
                        operator: "ON DUPLICATE KEY UPDATE".to_string(),
                    }));
                }
            }
        }
        Ok(())
    }

    /// ORDER BY and GROUP BY keys must not be encrypted columns.
    fn check_ordering(&self) -> Result<()> {
        for item in self.ctx.order_by() {
            let projection = item.index.and_then(|i| self.ctx.projections().get(i));
            if let Some(column) = projection.and_then(|p| self.projection_column(p)) {
                return Err(unsupported(column, "ORDER BY"));
            }
        }
        let mut check = OrderingCheck { generator: self };
        match self.ctx.statement().visit(&mut check) {
            ControlFlow::Break(e) => Err(e),
            ControlFlow::Continue(()) => Ok(()),
        }
    }

    fn first_encrypted(&self, expr: &Expr) -> Option<&'a EncryptColumn> {
        let mut found = None;
        let _ = visit_expressions(expr, |e: &Expr| match self.encrypted_expr(e) {
            Some(hit) => {
                found = Some(hit.column);
                ControlFlow::Break(())
            }
            None => ControlFlow::Continue(()),
        });
        found
    }

    fn projections(&self, out: &mut EncryptRewrite, handled: &mut HashSet<usize>) {
        let mut wildcards: Vec<(TextRange, Vec<&Projection>)> = Vec::new();
        for projection in self.ctx.projections() {
            match &projection.origin {
                ProjectionOrigin::Item { range: Some(range) } => {
                    self.projection_item(projection, *range, out, handled);
                }
                ProjectionOrigin::Wildcard {
                    range: Some(range), ..
                } => match wildcards.iter_mut().find(|(r, _)| r == range) {
                    Some((_, items)) => items.push(projection),
                    None => wildcards.push((*range, vec![projection])),
                },
                _ => {}
            }
        }
        for (range, items) in wildcards {
            if items.iter().any(|p| self.projection_column(p).is_some()) {
                out.tokens.push(SqlToken::parts(range, self.expand_wildcard(&items)));
                out.expanded_wildcards.insert(range);
            }
        }
    }

    fn projection_column(&self, projection: &Projection) -> Option<&'a EncryptColumn> {
        let origin = projection.column.as_ref()?;
        self.rules.encrypt.find_column(&origin.table, &origin.column)
    }

    /// A bare column item becomes `cipher AS logic`.
    fn projection_item(
        &self,
        projection: &Projection,
        range: TextRange,
        out: &mut EncryptRewrite,
        handled: &mut HashSet<usize>,
    ) {
        let Some(origin) = projection.column.as_ref() else {
            return;
        };
        let Some(segment) = self.ctx.columns().iter().find(|c| {
            c.name.eq_ignore_ascii_case(&origin.column)
                && c.range.is_some_and(|r| r.stop == range.stop && range.contains(&r))
                && c.owner_range.or(c.range).is_some_and(|head| head.start == range.start)
        }) else {
            return;
        };
        let Some(found) = self.encrypted(segment) else {
            return;
        };
        out.tokens.push(self.rename(&found, &found.column.cipher));
        if projection.alias.is_none() {
            let quote = quote_of(self.ctx.source().slice(found.range));
            out.tokens.push(SqlToken::insert(
                range.stop,
                format!(" AS {}", quoted(&projection.label, quote)),
            ));
        }
        handled.insert(found.range.start);
    }

    fn expand_wildcard(&self, items: &[&Projection]) -> Vec<TokenPart> {
        let mut parts = Vec::new();
        for (idx, projection) in items.iter().enumerate() {
            if idx > 0 {
                parts.push(TokenPart::Text(", ".to_string()));
            }
            if let ProjectionOrigin::Wildcard {
                qualifier: Some(qualifier),
                qualifier_is_table,
                ..
            } = &projection.origin
            {
                match self.rules.sharding.find_table_rule(qualifier) {
                    Some(rule) if *qualifier_is_table => parts.push(TokenPart::Table {
                        logic: rule.logic_table.clone(),
                        quote: None,
                    }),
                    _ => parts.push(TokenPart::Text(qualifier.clone())),
                }
                parts.push(TokenPart::Text(".".to_string()));
            }
            let text = match self.projection_column(projection) {
                Some(column) => format!("{} AS {}", column.cipher, projection.label),
                None => projection.label.clone(),
            };
            parts.push(TokenPart::Text(text));
        }
        parts
    }

    /// `SET logic = v` becomes `SET cipher = enc(v)` followed by the assisted query
    /// and plain columns.
    fn assignments(&self, out: &mut EncryptRewrite, handled: &mut HashSet<usize>) -> Result<()> {
        let Statement::Update { assignments, .. } = self.ctx.statement() else {
            return Ok(());
        };
        for assignment in assignments {
            let AssignmentTarget::ColumnName(name) = &assignment.target else {
                continue;
            };
            let Some(ident) = object_name_parts(name).last().copied() else {
                continue;
            };
            let Some(found) = self
                .ctx
                .column_for_ident(ident)
                .and_then(|s| self.encrypted(s))
            else {
                continue;
            };
            handled.insert(found.range.start);
            out.tokens.push(self.rename(&found, &found.column.cipher));
            let value_range = self
                .ctx
                .source()
                .require_range(assignment.value.span(), "assignment value")?;
            let (table, column) = (found.table, found.column);
            let mut derived = String::new();
            match self.operand(&assignment.value, &column.logic)? {
                Operand::Parameter(index, value) => {
                    out.parameter_edits.push(ParameterEdit::Replace {
                        index,
                        value: column.encrypt(table, &value)?,
                    });
                    if let Some(assisted) = &column.assisted_query {
                        derived.push_str(&format!(", {assisted} = ?"));
                        out.parameter_edits.push(ParameterEdit::Add {
                            at: value_range.stop,
                            value: column.assisted_encrypt(table, &value)?.unwrap_or(Value::Null),
                        });
                    }
                    if let Some(plain) = &column.plain {
                        derived.push_str(&format!(", {plain} = ?"));
                        out.parameter_edits.push(ParameterEdit::Add {
                            at: value_range.stop,
                            value,
                        });
                    }
                }
                Operand::Literal(value, range) => {
                    out.tokens.push(SqlToken::text(
                        range,
                        column.encrypt(table, &value)?.to_sql_literal(),
                    ));
                    if let Some(assisted) = &column.assisted_query {
                        let hashed = column.assisted_encrypt(table, &value)?.unwrap_or(Value::Null);
                        derived.push_str(&format!(", {assisted} = {}", hashed.to_sql_literal()));
                    }
                    if let Some(plain) = &column.plain {
                        derived.push_str(&format!(", {plain} = {}", value.to_sql_literal()));
                    }
                }
                Operand::Other => {
                    return Err(ShardError::Rewrite(RewriteError::MissingDerivedValue(format!(
                        "cannot encrypt the expression assigned to '{}'",
                        column.logic
                    ))))
                }
            }
            if !derived.is_empty() {
                out.tokens.push(SqlToken::insert(value_range.stop, derived));
            }
        }
        Ok(())
    }

    fn predicates(&self, out: &mut EncryptRewrite, handled: &mut HashSet<usize>) -> Result<()> {
        let flow = visit_expressions(self.ctx.statement(), |expr: &Expr| {
            match self.predicate(expr, out, handled) {
                Ok(()) => ControlFlow::Continue(()),
                Err(e) => ControlFlow::Break(e),
            }
        });
        match flow {
            ControlFlow::Break(e) => Err(e),
            ControlFlow::Continue(()) => Ok(()),
        }
    }

    fn predicate(
        &self,
        expr: &Expr,
        out: &mut EncryptRewrite,
        handled: &mut HashSet<usize>,
    ) -> Result<()> {
        match expr {
            Expr::BinaryOp { left, op, right } => {
                let (found, other) = match (self.encrypted_expr(left), self.encrypted_expr(right)) {
                    (Some(found), _) => (found, right.as_ref()),
                    (None, Some(found)) => (found, left.as_ref()),
                    (None, None) => return Ok(()),
                };
                match op {
                    BinaryOperator::Eq | BinaryOperator::NotEq => {
                        if let Some(peer) = self.encrypted_expr(other) {
                            self.query_column(&found, out, handled);
                            self.query_column(&peer, out, handled);
                            return Ok(());
                        }
                        self.query_column(&found, out, handled);
                        self.query_operand(&found, &op.to_string(), other, out)
                    }
                    BinaryOperator::Lt
                    | BinaryOperator::LtEq
                    | BinaryOperator::Gt
                    | BinaryOperator::GtEq
                    | BinaryOperator::Spaceship => Err(unsupported(found.column, &op.to_string())),
                    _ => Ok(()),
                }
            }
            Expr::InList { expr, list, .. } => {
                let Some(found) = self.encrypted_expr(expr) else {
                    return Ok(());
                };
                self.query_column(&found, out, handled);
                for item in list {
                    self.query_operand(&found, "IN", item, out)?;
                }
                Ok(())
            }
            Expr::Between { expr, .. } => match self.encrypted_expr(expr) {
                Some(found) => Err(unsupported(found.column, "BETWEEN")),
                None => Ok(()),
            },
            Expr::Like { expr, .. } | Expr::ILike { expr, .. } => match self.encrypted_expr(expr) {
                Some(found) => Err(unsupported(found.column, "LIKE")),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    fn query_column(&self, found: &Encrypted<'_>, out: &mut EncryptRewrite, handled: &mut HashSet<usize>) {
        if handled.insert(found.range.start) {
            out.tokens.push(self.rename(found, found.column.query_column()));
        }
    }

    fn query_operand(
        &self,
        found: &Encrypted<'_>,
        operator: &str,
        expr: &Expr,
        out: &mut EncryptRewrite,
    ) -> Result<()> {
        let column = found.column;
        match self.operand(expr, &column.logic)? {
            Operand::Parameter(index, value) => out.parameter_edits.push(ParameterEdit::Replace {
                index,
                value: column.query_value(found.table, &value)?,
            }),
            Operand::Literal(value, range) => out.tokens.push(SqlToken::text(
                range,
                column.query_value(found.table, &value)?.to_sql_literal(),
            )),
            // only literals and parameters can be encrypted before the shards see them
            Operand::Other => return Err(unsupported(column, operator)),
        }
        Ok(())
    }
}

struct OrderingCheck<'g, 'a> {
    generator: &'g EncryptTokenGenerator<'a>,
}

impl OrderingCheck<'_, '_> {
    fn check_group_by(&self, body: &SetExpr) -> Result<()> {
        match body {
            SetExpr::Select(select) => {
                if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
                    if let Some(column) = exprs.iter().find_map(|e| self.generator.first_encrypted(e)) {
                        return Err(unsupported(column, "GROUP BY"));
                    }
                }
                Ok(())
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.check_group_by(left)?;
                self.check_group_by(right)
            }
            // nested queries are visited on their own
            _ => Ok(()),
        }
    }
}

impl Visitor for OrderingCheck<'_, '_> {
    type Break = ShardError;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(OrderBy {
            kind: OrderByKind::Expressions(items),
            ..
        }) = &query.order_by
        {
            for item in items {
                if let Some(column) = self.generator.first_encrypted(&item.expr) {
                    return ControlFlow::Break(unsupported(column, "ORDER BY"));
                }
            }
        }
        match self.check_group_by(&query.body) {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) => ControlFlow::Break(e),
        }
    }
}

fn unsupported(column: &EncryptColumn, operator: &str) -> ShardError {
    ShardError::Rewrite(RewriteError::UnsupportedEncryptPredicate {
        column: column.logic.clone(),
        operator: operator.to_string(),
    })
}
