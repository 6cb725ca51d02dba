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

//! Sharding condition extraction: WHERE predicates in disjunctive normal form and
//! INSERT value groups, reduced to per-column sharding values.

use crate::binder::{BoundStatementContext, InsertContext, InsertShape, InsertValue, StatementKind};
use crate::error::Result;
use crate::metadata::MetaDataSnapshot;
use crate::rule::{ShardingRule, ShardingValue, ValueRange};
use crate::sql::{literal_value, object_name_parts};
use crate::types::Value;
use sqlparser::ast::{
    BinaryOperator, Expr, Ident, JoinConstraint, JoinOperator, Query, SetExpr, Statement, TableFactor,
    Value as AstValue, Visit, Visitor,
};
use std::collections::BTreeMap;
use std::ops::{Bound, ControlFlow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    Equal,
    In,
    Between,
    Range,
}

/// Constraint on one sharding column of one logic table.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardingConditionValue {
    pub table: String,
    pub column: String,
    pub operator: ConditionOperator,
    pub value: ShardingValue,
    /// Parameters the value was taken from.
    pub parameter_indices: Vec<usize>,
}

/// One AND group of sharding values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShardingCondition {
    pub values: Vec<ShardingConditionValue>,
    /// INSERT value group this condition was built from.
    pub group: Option<usize>,
}

impl ShardingCondition {
    /// Values constraining any of `tables`, keyed by lower-case column name.
    pub fn values_for(&self, tables: &[&str]) -> Result<BTreeMap<String, ShardingValue>> {
        let mut out: BTreeMap<String, ShardingValue> = BTreeMap::new();
        for value in &self.values {
            if !tables.iter().any(|t| t.eq_ignore_ascii_case(&value.table)) {
                continue;
            }
            let key = value.column.to_ascii_lowercase();
            let merged = match out.remove(&key) {
                Some(existing) => intersect(&existing, &value.value)?,
                None => Some(value.value.clone()),
            };
            // A contradiction between tables of one binding group leaves nothing to route.
            out.insert(key, merged.unwrap_or(ShardingValue::List(Vec::new())));
        }
        Ok(out)
    }
}

/// Conditions of one statement. No conditions and not always false means the
/// statement is unconditional.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShardingConditions {
    conditions: Vec<ShardingCondition>,
    always_false: bool,
}

impl ShardingConditions {
    pub fn new(conditions: Vec<ShardingCondition>) -> Self {
        Self {
            conditions,
            always_false: false,
        }
    }

    pub fn always_false() -> Self {
        Self {
            conditions: Vec::new(),
            always_false: true,
        }
    }

    pub fn conditions(&self) -> &[ShardingCondition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn is_always_false(&self) -> bool {
        self.always_false
    }

    pub fn is_unconditional(&self) -> bool {
        self.conditions.is_empty() && !self.always_false
    }

    /// Collapses duplicate conditions. Group attribution is dropped from merged
    /// INSERT conditions.
    pub fn merge(&mut self) {
        let mut merged: Vec<ShardingCondition> = Vec::with_capacity(self.conditions.len());
        for mut condition in self.conditions.drain(..) {
            condition.group = None;
            if !merged.contains(&condition) {
                merged.push(condition);
            }
        }
        self.conditions = merged;
    }
}

pub struct ConditionExtractor<'a> {
    ctx: &'a BoundStatementContext,
    rule: &'a ShardingRule,
    metadata: &'a MetaDataSnapshot,
    params: &'a [Value],
    max_groups: usize,
}

impl<'a> ConditionExtractor<'a> {
    pub fn new(
        ctx: &'a BoundStatementContext,
        rule: &'a ShardingRule,
        metadata: &'a MetaDataSnapshot,
        params: &'a [Value],
        max_groups: usize,
    ) -> Self {
        Self {
            ctx,
            rule,
            metadata,
            params,
            max_groups,
        }
    }

    pub fn extract(&self) -> Result<ShardingConditions> {
        match self.ctx.kind() {
            StatementKind::Insert => match self.ctx.insert() {
                Some(insert) if !matches!(insert.shape, InsertShape::Select { .. }) => {
                    self.insert_conditions(insert)
                }
                _ => self.where_conditions(),
            },
            StatementKind::Select | StatementKind::Update | StatementKind::Delete => {
                self.where_conditions()
            }
            _ => Ok(ShardingConditions::default()),
        }
    }

    fn insert_conditions(&self, insert: &InsertContext) -> Result<ShardingConditions> {
        let Some(table_rule) = self.rule.find_table_rule(&insert.table) else {
            return Ok(ShardingConditions::default());
        };
        let columns = insert.effective_columns(self.metadata.table(&insert.table));
        let generated = insert.generated_key().filter(|k| k.is_generated());
        let mut conditions = Vec::with_capacity(insert.groups.len());
        for (idx, group) in insert.groups.iter().enumerate() {
            let mut values = Vec::new();
            for column in table_rule.sharding_columns() {
                let position = columns.iter().position(|c| c.eq_ignore_ascii_case(column));
                let found = match position.and_then(|p| group.items.get(p)) {
                    Some(item) => item.resolve(self.params).map(|v| {
                        let indices = match &item.value {
                            InsertValue::Parameter(m) => vec![m.index],
                            _ => Vec::new(),
                        };
                        (v, indices)
                    }),
                    None => generated
                        .filter(|k| k.column_name().eq_ignore_ascii_case(column))
                        .and_then(|k| k.values().get(idx).cloned())
                        .map(|v| (v, Vec::new())),
                };
                if let Some((value, parameter_indices)) = found {
                    values.push(ShardingConditionValue {
                        table: table_rule.logic_table.clone(),
                        column: column.to_string(),
                        operator: ConditionOperator::Equal,
                        value: ShardingValue::List(vec![value]),
                        parameter_indices,
                    });
                }
            }
            conditions.push(ShardingCondition {
                values,
                group: Some(idx),
            });
        }
        Ok(ShardingConditions::new(conditions))
    }

    fn where_conditions(&self) -> Result<ShardingConditions> {
        let sources = predicate_sources(self.ctx.statement());
        let mut conditions = Vec::new();
        let mut any_false = false;
        for source in sources {
            let governed = source.tables.is_empty()
                || source
                    .tables
                    .iter()
                    .any(|t| self.rule.find_table_rule(t).is_some());
            let groups = source
                .predicate
                .as_ref()
                .and_then(|predicate| dnf(predicate, self.max_groups));
            let Some(groups) = groups else {
                if governed {
                    return Ok(ShardingConditions::default());
                }
                continue;
            };
            for group in groups {
                match self.reduce_group(&group)? {
                    GroupOutcome::Constrained(condition) => conditions.push(condition),
                    GroupOutcome::Contradiction => any_false = true,
                    // one unconstrained branch reads every shard
                    GroupOutcome::Unconstrained if governed => {
                        return Ok(ShardingConditions::default());
                    }
                    GroupOutcome::Unconstrained => {}
                }
            }
        }
        if conditions.is_empty() && any_false {
            return Ok(ShardingConditions::always_false());
        }
        Ok(ShardingConditions::new(conditions))
    }

    fn reduce_group(&self, group: &[Expr]) -> Result<GroupOutcome> {
        let mut by_column: BTreeMap<(String, String), ShardingConditionValue> = BTreeMap::new();
        for predicate in group {
            let Some(value) = self.predicate_value(predicate) else {
                continue;
            };
            let key = (
                value.table.to_ascii_lowercase(),
                value.column.to_ascii_lowercase(),
            );
            match by_column.remove(&key) {
                None => {
                    by_column.insert(key, value);
                }
                Some(existing) => {
                    let Some(merged) = intersect(&existing.value, &value.value)? else {
                        return Ok(GroupOutcome::Contradiction);
                    };
                    let mut parameter_indices = existing.parameter_indices;
                    parameter_indices.extend(value.parameter_indices);
                    by_column.insert(
                        key,
                        ShardingConditionValue {
                            table: existing.table,
                            column: existing.column,
                            operator: operator_for(&merged),
                            value: merged,
                            parameter_indices,
                        },
                    );
                }
            }
        }
        if by_column.is_empty() {
            return Ok(GroupOutcome::Unconstrained);
        }
        if by_column
            .values()
            .any(|v| matches!(&v.value, ShardingValue::List(list) if list.is_empty()))
        {
            return Ok(GroupOutcome::Contradiction);
        }
        Ok(GroupOutcome::Constrained(ShardingCondition {
            values: by_column.into_values().collect(),
            group: None,
        }))
    }

    fn predicate_value(&self, expr: &Expr) -> Option<ShardingConditionValue> {
        match expr {
            Expr::BinaryOp { left, op, right } => {
                let op = comparison(op)?;
                let (column, value_expr, op) = match self.sharding_column(left) {
                    Some(column) => (column, right.as_ref(), op),
                    None => (self.sharding_column(right)?, left.as_ref(), op.flipped()),
                };
                let (value, indices) = self.value_of(value_expr)?;
                let (operator, value) = match op {
                    Comparison::Eq => (ConditionOperator::Equal, ShardingValue::List(vec![value])),
                    Comparison::Lt => (ConditionOperator::Range, range(ValueRange::less_than(value))),
                    Comparison::LtEq => (ConditionOperator::Range, range(ValueRange::at_most(value))),
                    Comparison::Gt => (
                        ConditionOperator::Range,
                        range(ValueRange::greater_than(value)),
                    ),
                    Comparison::GtEq => (ConditionOperator::Range, range(ValueRange::at_least(value))),
                };
                Some(column.into_value(operator, value, indices))
            }
            Expr::InList {
                expr,
                list,
                negated: false,
            } => {
                let column = self.sharding_column(expr)?;
                let mut values = Vec::with_capacity(list.len());
                let mut indices = Vec::new();
                for item in list {
                    let (value, idx) = self.value_of(item)?;
                    if !values.contains(&value) {
                        values.push(value);
                    }
                    indices.extend(idx);
                }
                Some(column.into_value(ConditionOperator::In, ShardingValue::List(values), indices))
            }
            Expr::Between {
                expr,
                negated: false,
                low,
                high,
            } => {
                let column = self.sharding_column(expr)?;
                let (low, mut indices) = self.value_of(low)?;
                let (high, high_idx) = self.value_of(high)?;
                indices.extend(high_idx);
                Some(column.into_value(
                    ConditionOperator::Between,
                    range(ValueRange::closed(low, high)),
                    indices,
                ))
            }
            Expr::Nested(inner) => self.predicate_value(inner),
            _ => None,
        }
    }

    fn sharding_column(&self, expr: &Expr) -> Option<ColumnRef> {
        let ident: &Ident = match expr {
            Expr::Identifier(ident) => ident,
            Expr::CompoundIdentifier(parts) => parts.last()?,
            Expr::Nested(inner) => return self.sharding_column(inner),
            _ => return None,
        };
        let segment = self.ctx.column_for_ident(ident)?;
        let table = segment.table.as_deref()?;
        let table_rule = self.rule.find_table_rule(table)?;
        table_rule
            .is_sharding_column(&segment.name)
            .then(|| ColumnRef {
                table: table_rule.logic_table.clone(),
                column: segment.name.clone(),
            })
    }

    fn value_of(&self, expr: &Expr) -> Option<(Value, Vec<usize>)> {
        if let Expr::Value(v) = expr {
            if matches!(v.value, AstValue::Placeholder(_)) {
                let marker = self.ctx.marker_for_value(v)?;
                let value = self.params.get(marker.index)?.clone();
                return (!value.is_null()).then(|| (value, vec![marker.index]));
            }
        }
        literal_value(expr)
            .filter(|v| !v.is_null())
            .map(|v| (v, Vec::new()))
    }
}

enum GroupOutcome {
    Constrained(ShardingCondition),
    Contradiction,
    Unconstrained,
}

struct ColumnRef {
    table: String,
    column: String,
}

impl ColumnRef {
    fn into_value(
        self,
        operator: ConditionOperator,
        value: ShardingValue,
        parameter_indices: Vec<usize>,
    ) -> ShardingConditionValue {
        ShardingConditionValue {
            table: self.table,
            column: self.column,
            operator,
            value,
            parameter_indices,
        }
    }
}

#[derive(Clone, Copy)]
enum Comparison {
    Eq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl Comparison {
    fn flipped(self) -> Self {
        match self {
            Comparison::Eq => Comparison::Eq,
            Comparison::Lt => Comparison::Gt,
            Comparison::LtEq => Comparison::GtEq,
            Comparison::Gt => Comparison::Lt,
            Comparison::GtEq => Comparison::LtEq,
        }
    }
}

fn comparison(op: &BinaryOperator) -> Option<Comparison> {
    match op {
        BinaryOperator::Eq => Some(Comparison::Eq),
        BinaryOperator::Lt => Some(Comparison::Lt),
        BinaryOperator::LtEq => Some(Comparison::LtEq),
        BinaryOperator::Gt => Some(Comparison::Gt),
        BinaryOperator::GtEq => Some(Comparison::GtEq),
        _ => None,
    }
}

fn range(range: ValueRange) -> ShardingValue {
    ShardingValue::Range(range)
}

fn operator_for(value: &ShardingValue) -> ConditionOperator {
    match value {
        ShardingValue::List(list) if list.len() == 1 => ConditionOperator::Equal,
        ShardingValue::List(_) => ConditionOperator::In,
        ShardingValue::Range(r) => match (&r.lower, &r.upper) {
            (Bound::Included(_), Bound::Included(_)) => ConditionOperator::Between,
            _ => ConditionOperator::Range,
        },
    }
}

/// Intersection of two constraints on one column; `None` when nothing satisfies both.
pub fn intersect(a: &ShardingValue, b: &ShardingValue) -> Result<Option<ShardingValue>> {
    let out = match (a, b) {
        (ShardingValue::List(x), ShardingValue::List(y)) => {
            let mut kept = Vec::new();
            for v in x {
                let mut found = false;
                for w in y {
                    if v.eq(w)? {
                        found = true;
                        break;
                    }
                }
                if found {
                    kept.push(v.clone());
                }
            }
            ShardingValue::List(kept)
        }
        (ShardingValue::List(list), ShardingValue::Range(r))
        | (ShardingValue::Range(r), ShardingValue::List(list)) => {
            let mut kept = Vec::new();
            for v in list {
                if r.contains(v)? {
                    kept.push(v.clone());
                }
            }
            ShardingValue::List(kept)
        }
        (ShardingValue::Range(x), ShardingValue::Range(y)) => match x.intersect(y)? {
            Some(r) => ShardingValue::Range(r),
            None => return Ok(None),
        },
    };
    Ok(match &out {
        ShardingValue::List(list) if list.is_empty() => None,
        _ => Some(out),
    })
}

/// Splits a predicate into OR-ed AND groups of atomic predicates. `None` when the
/// expansion exceeds `limit` groups.
pub fn dnf(expr: &Expr, limit: usize) -> Option<Vec<Vec<Expr>>> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            let left = dnf(left, limit)?;
            let right = dnf(right, limit)?;
            if left.len().saturating_mul(right.len()) > limit {
                return None;
            }
            let mut out = Vec::with_capacity(left.len() * right.len());
            for l in &left {
                for r in &right {
                    let mut group = l.clone();
                    group.extend(r.iter().cloned());
                    out.push(group);
                }
            }
            Some(out)
        }
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Or,
            right,
        } => {
            let mut out = dnf(left, limit)?;
            out.extend(dnf(right, limit)?);
            (out.len() <= limit).then_some(out)
        }
        Expr::Nested(inner) => dnf(inner, limit),
        other => Some(vec![vec![other.clone()]]),
    }
}

/// WHERE clause of one SELECT, UPDATE or DELETE, AND-ed with the ON constraints
/// of its inner joins. `tables` names the tables read by that query block; it
/// is empty for UPDATE and DELETE, whose target is always governed.
struct PredicateSource {
    predicate: Option<Expr>,
    tables: Vec<String>,
}

/// Predicate sources of the statement and of every nested query.
fn predicate_sources(statement: &Statement) -> Vec<PredicateSource> {
    let mut collector = PredicateCollector::default();
    match statement {
        Statement::Update { selection, .. } => collector.sources.push(PredicateSource {
            predicate: selection.clone(),
            tables: Vec::new(),
        }),
        Statement::Delete(delete) => collector.sources.push(PredicateSource {
            predicate: delete.selection.clone(),
            tables: Vec::new(),
        }),
        _ => {}
    }
    let _ = statement.visit(&mut collector);
    collector.sources
}

#[derive(Default)]
struct PredicateCollector {
    sources: Vec<PredicateSource>,
}

impl PredicateCollector {
    fn collect_set_expr(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Select(select) => {
                let mut predicate = select.selection.clone();
                let mut tables = Vec::new();
                for table in &select.from {
                    push_table_name(&table.relation, &mut tables);
                    for join in &table.joins {
                        push_table_name(&join.relation, &mut tables);
                        let on = match &join.join_operator {
                            JoinOperator::Join(c) | JoinOperator::Inner(c) => c,
                            _ => continue,
                        };
                        if let JoinConstraint::On(expr) = on {
                            predicate = Some(match predicate {
                                Some(p) => Expr::BinaryOp {
                                    left: Box::new(p),
                                    op: BinaryOperator::And,
                                    right: Box::new(expr.clone()),
                                },
                                None => expr.clone(),
                            });
                        }
                    }
                }
                if tables.is_empty() {
                    // FROM-less or derived-only selects read no governed table directly
                    tables.push("dual".to_string());
                }
                self.sources.push(PredicateSource { predicate, tables });
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.collect_set_expr(left);
                self.collect_set_expr(right);
            }
            // nested queries are visited on their own
            _ => {}
        }
    }
}

fn push_table_name(factor: &TableFactor, tables: &mut Vec<String>) {
    if let TableFactor::Table { name, .. } = factor {
        if let Some(ident) = object_name_parts(name).last() {
            tables.push(ident.value.clone());
        }
    }
}

impl Visitor for PredicateCollector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        self.collect_set_expr(&query.body);
        ControlFlow::Continue(())
    }
}
