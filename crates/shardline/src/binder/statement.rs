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

use crate::binder::session::{
    resolve_qualified, resolve_unqualified, BinderSession, BoundColumn, ColumnResolution,
    TableBinderContext,
};
use crate::binder::{
    AssignmentSegment, BindOptions, ColumnSegment, CombineSegment, DalKind, DdlKind,
    IndexSegment, InsertColumn, InsertContext, InsertShape, InsertValue, InsertValueGroup,
    InsertValueItem, OrderByItem, Projection, ProjectionColumn, ProjectionOrigin,
    SimpleTableSegment, StatementKind, TableBoundInfo,
};
use crate::error::{BindingError, Result};
use crate::metadata::MetaDataSnapshot;
use crate::sql::{
    is_placeholder, literal_value, object_name_parts, ParameterMarker, SourceText, TextRange,
};
use sqlparser::ast::{
    AlterTableOperation, Assignment, AssignmentTarget, Expr, FromTable, FunctionArg,
    FunctionArgExpr, FunctionArguments, GroupByExpr, Ident, Insert, JoinConstraint, JoinOperator,
    ObjectName, ObjectType, OnInsert, OrderByKind, Query, Select, SelectItem, SetExpr,
    SetQuantifier, Spanned, Statement, TableAlias, TableFactor, TableObject, TableWithJoins,
    TruncateTableTarget, UpdateTableFromKind, Value as AstValue,
};

/// Statement-level results that do not live in the session.
#[derive(Debug)]
pub(crate) struct BoundParts {
    pub kind: StatementKind,
    pub projections: Vec<Projection>,
    pub order_by: Vec<OrderByItem>,
    pub insert: Option<InsertContext>,
    pub assignments: Vec<AssignmentSegment>,
    pub rename_to: Option<String>,
}

impl BoundParts {
    fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            projections: Vec::new(),
            order_by: Vec::new(),
            insert: None,
            assignments: Vec::new(),
            rename_to: None,
        }
    }
}

/// Unknown columns are errors in `Strict` mode and skipped in `Lenient` mode, which
/// covers clauses that may name output aliases (ORDER BY, GROUP BY, HAVING).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Strict,
    Lenient,
}

#[derive(Debug, Default)]
struct QueryBinding {
    projections: Vec<Projection>,
    order_by: Vec<OrderByItem>,
}

#[derive(Debug, Default)]
struct SetBinding {
    projections: Vec<Projection>,
    scope: Vec<TableBinderContext>,
}

fn labels(projections: &[Projection]) -> Vec<BoundColumn> {
    projections
        .iter()
        .map(|p| BoundColumn::derived(&p.label, p.column.clone()))
        .collect()
}

fn expr_label(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(parts) => parts
            .last()
            .map(|i| i.value.clone())
            .unwrap_or_else(|| expr.to_string()),
        _ => expr.to_string(),
    }
}

fn join_constraint_expr(op: &JoinOperator) -> Option<&Expr> {
    match op {
        JoinOperator::Join(JoinConstraint::On(expr))
        | JoinOperator::Inner(JoinConstraint::On(expr))
        | JoinOperator::LeftOuter(JoinConstraint::On(expr))
        | JoinOperator::RightOuter(JoinConstraint::On(expr))
        | JoinOperator::FullOuter(JoinConstraint::On(expr)) => Some(expr),
        _ => None,
    }
}

/// `db.schema.table` split into (database, owner, table).
fn split_table_name(name: &ObjectName) -> Result<(Option<&Ident>, Option<&Ident>, &Ident)> {
    let parts = object_name_parts(name);
    match parts.as_slice() {
        [table] => Ok((None, None, *table)),
        [owner, table] => Ok((None, Some(*owner), *table)),
        [.., database, owner, table] => Ok((Some(*database), Some(*owner), *table)),
        [] => Err(BindingError::Unsupported(format!("table name '{name}'")).into()),
    }
}

fn wildcard_owner(text: &str) -> String {
    let trimmed = text.trim_end_matches(".*");
    trimmed
        .rsplit('.')
        .next()
        .unwrap_or(trimmed)
        .trim_matches(|c| matches!(c, '`' | '"'))
        .to_string()
}

pub(crate) struct StatementBinder<'a> {
    metadata: &'a MetaDataSnapshot,
    options: &'a BindOptions,
    source: &'a SourceText,
    markers: &'a [ParameterMarker],
}

impl<'a> StatementBinder<'a> {
    pub(crate) fn new(
        metadata: &'a MetaDataSnapshot,
        options: &'a BindOptions,
        source: &'a SourceText,
        markers: &'a [ParameterMarker],
    ) -> Self {
        Self {
            metadata,
            options,
            source,
            markers,
        }
    }

    pub(crate) fn bind(
        &self,
        statement: &Statement,
        session: &mut BinderSession,
    ) -> Result<BoundParts> {
        let mut parts = BoundParts::new(StatementKind::Other);
        match statement {
            Statement::Query(query) => {
                parts.kind = StatementKind::Select;
                let out = self.bind_query(query, session, &[])?;
                parts.projections = out.projections;
                parts.order_by = out.order_by;
            }
            Statement::Insert(insert) => {
                parts.kind = StatementKind::Insert;
                parts.insert = Some(self.bind_insert(insert, session)?);
            }
            Statement::Update {
                table,
                assignments,
                from,
                selection,
                ..
            } => {
                parts.kind = StatementKind::Update;
                let mut scope = Vec::new();
                self.bind_table_with_joins(table, session, &[], &mut scope)?;
                if let Some(UpdateTableFromKind::BeforeSet(tables) | UpdateTableFromKind::AfterSet(tables)) =
                    from
                {
                    for t in tables {
                        self.bind_table_with_joins(t, session, &[], &mut scope)?;
                    }
                }
                parts.assignments = self.bind_assignments(assignments, session, &scope)?;
                if let Some(selection) = selection {
                    self.bind_expr(selection, session, &scope, &[], Mode::Strict)?;
                }
            }
            Statement::Delete(delete) => {
                parts.kind = StatementKind::Delete;
                let tables = match &delete.from {
                    FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
                };
                let mut scope = Vec::new();
                for t in tables {
                    self.bind_table_with_joins(t, session, &[], &mut scope)?;
                }
                if let Some(using) = &delete.using {
                    for t in using {
                        self.bind_table_with_joins(t, session, &[], &mut scope)?;
                    }
                }
                if let Some(selection) = &delete.selection {
                    self.bind_expr(selection, session, &scope, &[], Mode::Strict)?;
                }
            }
            Statement::CreateTable(create) => {
                parts.kind = StatementKind::Ddl(DdlKind::CreateTable);
                session.tables.push(self.table_segment(&create.name, None)?);
            }
            Statement::AlterTable {
                name, operations, ..
            } => {
                parts.kind = StatementKind::Ddl(DdlKind::AlterTable);
                self.bind_physical_table(name, None, session, &mut Vec::new())?;
                for op in operations {
                    if let AlterTableOperation::RenameTable { table_name } = op {
                        let (_, _, new_name) = split_table_name(table_name)?;
                        parts.rename_to = Some(new_name.value.clone());
                    }
                }
            }
            Statement::Drop {
                object_type: ObjectType::Table,
                names,
                ..
            } => {
                parts.kind = StatementKind::Ddl(DdlKind::DropTable);
                for name in names {
                    let mut segment = self.table_segment(name, None)?;
                    let (database, owner, _) = split_table_name(name)?;
                    segment.bound = self.resolve_location(database, owner)?;
                    session.tables.push(segment);
                }
            }
            Statement::Drop {
                object_type: ObjectType::Index,
                names,
                ..
            } => {
                parts.kind = StatementKind::Ddl(DdlKind::DropIndex);
                for name in names {
                    self.bind_dropped_index(name, session)?;
                }
            }
            Statement::Truncate { table_names, .. } => {
                parts.kind = StatementKind::Ddl(DdlKind::Truncate);
                for target in table_names {
                    let TruncateTableTarget { name, .. } = target;
                    self.bind_physical_table(name, None, session, &mut Vec::new())?;
                }
            }
            Statement::CreateIndex(create_idx) => {
                parts.kind = StatementKind::Ddl(DdlKind::CreateIndex);
                let segment = self.table_segment(&create_idx.table_name, None)?;
                let table = segment.name.clone();
                session.tables.push(segment);
                if let Some(index_name) = &create_idx.name {
                    let (_, _, ident) = split_table_name(index_name)?;
                    session.indexes.push(IndexSegment {
                        name: ident.value.clone(),
                        range: self.source.ident_range(ident).ok(),
                        table: Some(table),
                    });
                }
            }
            Statement::Drop { .. }
            | Statement::CreateView { .. }
            | Statement::CreateSchema { .. }
            | Statement::CreateDatabase { .. } => {
                parts.kind = StatementKind::Ddl(DdlKind::Other);
            }
            Statement::ExplainTable { table_name, .. } => {
                parts.kind = StatementKind::Dal(DalKind::Describe);
                self.bind_physical_table(table_name, None, session, &mut Vec::new())?;
            }
            Statement::ShowColumns { show_options, .. } => {
                parts.kind = StatementKind::Dal(DalKind::ShowColumns);
                if let Some(name) = show_options
                    .show_in
                    .as_ref()
                    .and_then(|show_in| show_in.parent_name.as_ref())
                {
                    self.bind_physical_table(name, None, session, &mut Vec::new())?;
                }
            }
            Statement::ShowTables { .. }
            | Statement::ShowCreate { .. }
            | Statement::ShowVariables { .. } => {
                parts.kind = StatementKind::Dal(DalKind::Other);
            }
            Statement::StartTransaction { .. }
            | Statement::Commit { .. }
            | Statement::Rollback { .. }
            | Statement::Savepoint { .. }
            | Statement::ReleaseSavepoint { .. } => {
                parts.kind = StatementKind::Tcl;
            }
            Statement::Grant { .. } | Statement::Revoke { .. } | Statement::CreateRole { .. } => {
                parts.kind = StatementKind::Dcl;
            }
            _ => {}
        }
        Ok(parts)
    }

    fn current_database(&self) -> &str {
        self.options
            .current_database
            .as_deref()
            .unwrap_or_else(|| self.metadata.default_database())
    }

    /// An owner names a database when one exists with that name, otherwise a schema of
    /// the current database.
    fn resolve_location(
        &self,
        database: Option<&Ident>,
        owner: Option<&Ident>,
    ) -> Result<Option<TableBoundInfo>> {
        let skip = self.options.skip_metadata_validate;
        if let (Some(database), Some(schema)) = (database, owner) {
            return match self.metadata.schema(&database.value, &schema.value) {
                Some(found) => Ok(Some(TableBoundInfo {
                    database: database.value.clone(),
                    schema: found.name.clone(),
                })),
                None if skip => Ok(None),
                None => Err(BindingError::UnknownDatabase {
                    database: format!("{}.{}", database.value, schema.value),
                }
                .into()),
            };
        }
        if let Some(owner) = owner {
            if let Some(db) = self.metadata.database(&owner.value) {
                return Ok(Some(TableBoundInfo {
                    database: db.name.clone(),
                    schema: db.default_schema.clone(),
                }));
            }
            let current = self.current_database();
            if let Some(schema) = self.metadata.schema(current, &owner.value) {
                return Ok(Some(TableBoundInfo {
                    database: current.to_string(),
                    schema: schema.name.clone(),
                }));
            }
            if skip {
                return Ok(None);
            }
            return Err(BindingError::UnknownDatabase {
                database: owner.value.clone(),
            }
            .into());
        }
        let current = self.current_database();
        match self.metadata.database(current) {
            Some(db) => Ok(Some(TableBoundInfo {
                database: db.name.clone(),
                schema: db.default_schema.clone(),
            })),
            None if skip => Ok(None),
            None => Err(BindingError::UnknownDatabase {
                database: current.to_string(),
            }
            .into()),
        }
    }

    fn table_segment(
        &self,
        name: &ObjectName,
        alias: Option<&TableAlias>,
    ) -> Result<SimpleTableSegment> {
        let (_, owner, table) = split_table_name(name)?;
        Ok(SimpleTableSegment {
            name: table.value.clone(),
            owner: owner.map(|o| o.value.clone()),
            alias: alias.map(|a| a.name.value.clone()),
            name_range: self.source.ident_range(table).ok(),
            owner_range: owner.and_then(|o| self.source.ident_range(o).ok()),
            quote: table.quote_style,
            bound: None,
        })
    }

    /// Binds a base table reference, recording its segment and pushing its context.
    fn bind_physical_table(
        &self,
        name: &ObjectName,
        alias: Option<&TableAlias>,
        session: &mut BinderSession,
        scope: &mut Vec<TableBinderContext>,
    ) -> Result<()> {
        let mut segment = self.table_segment(name, alias)?;
        let (database, owner, _) = split_table_name(name)?;
        let bound = self.resolve_location(database, owner)?;
        let meta = bound
            .as_ref()
            .and_then(|b| self.metadata.find_table(&b.database, &b.schema, &segment.name));
        if meta.is_none() && !self.options.skip_metadata_validate {
            return Err(BindingError::UnknownTable {
                table: segment.name.clone(),
            }
            .into());
        }
        let table = meta.map_or_else(|| segment.name.clone(), |m| m.name.clone());
        let columns = meta.map(|m| {
            m.columns
                .iter()
                .map(|c| BoundColumn::physical(&m.name, &c.name, c.visible))
                .collect()
        });
        segment.bound = bound.clone();
        scope.push(TableBinderContext {
            reference: segment.alias.clone().unwrap_or_else(|| segment.name.clone()),
            table: Some(table),
            bound,
            columns,
            referenced_by_name: segment.alias.is_none(),
        });
        session.tables.push(segment);
        Ok(())
    }

    fn bind_dropped_index(&self, name: &ObjectName, session: &mut BinderSession) -> Result<()> {
        let (database, owner, index) = split_table_name(name)?;
        let table = self
            .resolve_location(database, owner)?
            .and_then(|b| {
                self.metadata
                    .find_table_by_index(&b.database, &b.schema, &index.value)
            })
            .map(|t| t.name.clone());
        if let Some(table) = &table {
            session.extra_tables.push(table.clone());
        }
        session.indexes.push(IndexSegment {
            name: index.value.clone(),
            range: self.source.ident_range(index).ok(),
            table,
        });
        Ok(())
    }

    fn bind_query(
        &self,
        query: &Query,
        session: &mut BinderSession,
        outer: &[TableBinderContext],
    ) -> Result<QueryBinding> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                let alias = &cte.alias.name.value;
                session.declare_cte(alias)?;
                let inner = self.bind_query(&cte.query, session, outer)?;
                let columns = if cte.alias.columns.is_empty() {
                    inner.projections.iter().map(|p| p.label.clone()).collect()
                } else {
                    cte.alias
                        .columns
                        .iter()
                        .map(|c| c.name.value.clone())
                        .collect()
                };
                session.set_cte_columns(alias, columns);
            }
        }

        let body = self.bind_set_expr(&query.body, session, outer)?;
        let mut order_by = Vec::new();
        if let Some(order) = &query.order_by {
            if let OrderByKind::Expressions(exprs) = &order.kind {
                for item in exprs {
                    self.bind_expr(&item.expr, session, &body.scope, outer, Mode::Lenient)?;
                    order_by.push(OrderByItem {
                        index: order_by_index(&item.expr, &body.projections),
                        ascending: item.options.asc.unwrap_or(true),
                    });
                }
            }
        }
        Ok(QueryBinding {
            projections: body.projections,
            order_by,
        })
    }

    fn bind_set_expr(
        &self,
        expr: &SetExpr,
        session: &mut BinderSession,
        outer: &[TableBinderContext],
    ) -> Result<SetBinding> {
        match expr {
            SetExpr::Select(select) => self.bind_select(select, session, outer),
            SetExpr::Query(query) => {
                let inner = self.bind_query(query, session, outer)?;
                Ok(SetBinding {
                    projections: inner.projections,
                    scope: Vec::new(),
                })
            }
            SetExpr::SetOperation {
                op,
                set_quantifier,
                left,
                right,
            } => {
                let left_binding = self.bind_set_expr(left, session, outer)?;
                self.bind_set_expr(right, session, outer)?;
                session.combines.push(CombineSegment {
                    operator: op.to_string(),
                    all: matches!(set_quantifier, SetQuantifier::All),
                    left: self.source.range(left.span()),
                    right: self.source.range(right.span()),
                });
                Ok(SetBinding {
                    projections: left_binding.projections,
                    scope: Vec::new(),
                })
            }
            SetExpr::Values(values) => {
                for row in &values.rows {
                    for e in row {
                        self.bind_expr(e, session, &[], outer, Mode::Lenient)?;
                    }
                }
                Ok(SetBinding::default())
            }
            _ => Ok(SetBinding::default()),
        }
    }

    fn bind_select(
        &self,
        select: &Select,
        session: &mut BinderSession,
        outer: &[TableBinderContext],
    ) -> Result<SetBinding> {
        let mut scope = Vec::new();
        for twj in &select.from {
            self.bind_table_with_joins(twj, session, outer, &mut scope)?;
        }
        let projections = self.bind_projection(&select.projection, session, &scope, outer)?;
        if let Some(selection) = &select.selection {
            self.bind_expr(selection, session, &scope, outer, Mode::Strict)?;
        }
        if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
            for e in exprs {
                self.bind_expr(e, session, &scope, outer, Mode::Lenient)?;
            }
        }
        if let Some(having) = &select.having {
            self.bind_expr(having, session, &scope, outer, Mode::Lenient)?;
        }
        Ok(SetBinding { projections, scope })
    }

    fn bind_table_with_joins(
        &self,
        twj: &TableWithJoins,
        session: &mut BinderSession,
        outer: &[TableBinderContext],
        scope: &mut Vec<TableBinderContext>,
    ) -> Result<()> {
        self.bind_table_factor(&twj.relation, session, outer, scope)?;
        for join in &twj.joins {
            session.contains_join = true;
            self.bind_table_factor(&join.relation, session, outer, scope)?;
            if let Some(on) = join_constraint_expr(&join.join_operator) {
                self.bind_expr(on, session, scope, outer, Mode::Strict)?;
            }
        }
        Ok(())
    }

    fn bind_table_factor(
        &self,
        factor: &TableFactor,
        session: &mut BinderSession,
        outer: &[TableBinderContext],
        scope: &mut Vec<TableBinderContext>,
    ) -> Result<()> {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let (_, owner, table) = split_table_name(name)?;
                if owner.is_none() && table.value.eq_ignore_ascii_case("dual") {
                    return Ok(());
                }
                if owner.is_none() && session.is_cte(&table.value) {
                    let columns = session.cte_columns(&table.value).map(|cols| {
                        cols.iter()
                            .map(|c| BoundColumn::derived(c, None))
                            .collect()
                    });
                    scope.push(TableBinderContext {
                        reference: alias
                            .as_ref()
                            .map_or_else(|| table.value.clone(), |a| a.name.value.clone()),
                        table: None,
                        bound: None,
                        columns,
                        referenced_by_name: alias.is_none(),
                    });
                    return Ok(());
                }
                self.bind_physical_table(name, alias.as_ref(), session, scope)
            }
            TableFactor::Derived {
                lateral,
                subquery,
                alias,
                ..
            } => {
                session.contains_subquery = true;
                let mut visible = outer.to_vec();
                if *lateral {
                    visible.extend(scope.iter().cloned());
                }
                let inner = self.bind_query(subquery, session, &visible)?;
                let columns = labels(&inner.projections);
                let reference = alias
                    .as_ref()
                    .map(|a| a.name.value.clone())
                    .unwrap_or_default();
                if !reference.is_empty() {
                    session.subquery_projections.push((
                        reference.clone(),
                        columns.iter().map(|c| c.name.clone()).collect(),
                    ));
                }
                scope.push(TableBinderContext {
                    reference,
                    table: None,
                    bound: None,
                    columns: Some(columns),
                    referenced_by_name: false,
                });
                Ok(())
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => self.bind_table_with_joins(table_with_joins, session, outer, scope),
            _ => {
                scope.push(TableBinderContext {
                    reference: String::new(),
                    table: None,
                    bound: None,
                    columns: None,
                    referenced_by_name: false,
                });
                Ok(())
            }
        }
    }

    fn bind_projection(
        &self,
        items: &[SelectItem],
        session: &mut BinderSession,
        scope: &[TableBinderContext],
        outer: &[TableBinderContext],
    ) -> Result<Vec<Projection>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                SelectItem::UnnamedExpr(expr) => {
                    self.bind_expr(expr, session, scope, outer, Mode::Strict)?;
                    out.push(Projection {
                        label: expr_label(expr),
                        alias: None,
                        column: column_origin(expr, scope, outer),
                        origin: ProjectionOrigin::Item {
                            range: self.source.range(expr.span()),
                        },
                    });
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    self.bind_expr(expr, session, scope, outer, Mode::Strict)?;
                    out.push(Projection {
                        label: alias.value.clone(),
                        alias: Some(alias.value.clone()),
                        column: column_origin(expr, scope, outer),
                        origin: ProjectionOrigin::Item {
                            range: self.source.range(expr.span()),
                        },
                    });
                }
                SelectItem::Wildcard(_) => {
                    self.expand_wildcard(None, item, scope, &mut out)?;
                }
                SelectItem::QualifiedWildcard(kind, _) => {
                    let owner = wildcard_owner(&kind.to_string());
                    self.expand_wildcard(Some(&owner), item, scope, &mut out)?;
                }
            }
        }
        Ok(out)
    }

    fn expand_wildcard(
        &self,
        owner: Option<&str>,
        item: &SelectItem,
        scope: &[TableBinderContext],
        out: &mut Vec<Projection>,
    ) -> Result<()> {
        let range = self.source.range(item.span());
        let contexts = scope
            .iter()
            .filter(|ctx| owner.map_or(true, |o| ctx.matches_reference(o)))
            .collect::<Vec<_>>();
        if let (Some(owner), true) = (owner, contexts.is_empty()) {
            return Err(BindingError::UnknownTable {
                table: owner.to_string(),
            }
            .into());
        }
        let qualify = owner.is_some() || scope.len() > 1;
        for ctx in contexts {
            let Some(columns) = &ctx.columns else {
                continue;
            };
            let qualifier = (qualify && !ctx.reference.is_empty()).then(|| ctx.reference.clone());
            for column in columns.iter().filter(|c| c.visible) {
                out.push(Projection {
                    label: column.name.clone(),
                    alias: None,
                    column: column.origin.clone(),
                    origin: ProjectionOrigin::Wildcard {
                        range,
                        qualifier: qualifier.clone(),
                        qualifier_is_table: qualifier.is_some()
                            && ctx.referenced_by_name
                            && ctx.table.is_some(),
                    },
                });
            }
        }
        Ok(())
    }

    fn bind_subquery(
        &self,
        query: &Query,
        session: &mut BinderSession,
        scope: &[TableBinderContext],
        outer: &[TableBinderContext],
    ) -> Result<()> {
        session.contains_subquery = true;
        let mut visible = scope.to_vec();
        visible.extend(outer.iter().cloned());
        self.bind_query(query, session, &visible)?;
        Ok(())
    }

    fn bind_expr(
        &self,
        expr: &Expr,
        session: &mut BinderSession,
        scope: &[TableBinderContext],
        outer: &[TableBinderContext],
        mode: Mode,
    ) -> Result<()> {
        match expr {
            Expr::Identifier(ident) => self.bind_column(None, ident, session, scope, outer, mode),
            Expr::CompoundIdentifier(parts) => match parts.as_slice() {
                [.., owner, column] => {
                    self.bind_column(Some(owner), column, session, scope, outer, mode)
                }
                [column] => self.bind_column(None, column, session, scope, outer, mode),
                [] => Ok(()),
            },
            Expr::BinaryOp { left, right, .. } => {
                self.bind_expr(left, session, scope, outer, mode)?;
                self.bind_expr(right, session, scope, outer, mode)
            }
            Expr::UnaryOp { expr, .. }
            | Expr::Nested(expr)
            | Expr::IsNull(expr)
            | Expr::IsNotNull(expr)
            | Expr::IsTrue(expr)
            | Expr::IsFalse(expr)
            | Expr::Cast { expr, .. } => self.bind_expr(expr, session, scope, outer, mode),
            Expr::InList { expr, list, .. } => {
                self.bind_expr(expr, session, scope, outer, mode)?;
                for item in list {
                    self.bind_expr(item, session, scope, outer, mode)?;
                }
                Ok(())
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                self.bind_expr(expr, session, scope, outer, mode)?;
                self.bind_expr(low, session, scope, outer, mode)?;
                self.bind_expr(high, session, scope, outer, mode)
            }
            Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
                self.bind_expr(expr, session, scope, outer, mode)?;
                self.bind_expr(pattern, session, scope, outer, mode)
            }
            Expr::Tuple(items) => {
                for item in items {
                    self.bind_expr(item, session, scope, outer, mode)?;
                }
                Ok(())
            }
            Expr::Function(func) => {
                if let FunctionArguments::List(list) = &func.args {
                    for arg in &list.args {
                        if let FunctionArg::Unnamed(FunctionArgExpr::Expr(e))
                        | FunctionArg::Named {
                            arg: FunctionArgExpr::Expr(e),
                            ..
                        } = arg
                        {
                            self.bind_expr(e, session, scope, outer, mode)?;
                        }
                    }
                }
                Ok(())
            }
            Expr::InSubquery { expr, subquery, .. } => {
                self.bind_expr(expr, session, scope, outer, mode)?;
                self.bind_subquery(subquery, session, scope, outer)
            }
            Expr::Subquery(query) | Expr::Exists { subquery: query, .. } => {
                self.bind_subquery(query, session, scope, outer)
            }
            _ => Ok(()),
        }
    }

    fn bind_column(
        &self,
        owner: Option<&Ident>,
        ident: &Ident,
        session: &mut BinderSession,
        scope: &[TableBinderContext],
        outer: &[TableBinderContext],
        mode: Mode,
    ) -> Result<()> {
        let resolution = match owner {
            Some(o) => resolve_qualified(&o.value, &ident.value, scope, outer),
            None => resolve_unqualified(&ident.value, scope, outer)?,
        };
        let (ctx, correlated) = match resolution {
            ColumnResolution::Bound(ctx, is_outer) => (Some(ctx), is_outer),
            ColumnResolution::Unverified(ctx) => (ctx, false),
            ColumnResolution::NotFound => {
                if mode == Mode::Lenient {
                    return Ok(());
                }
                let column = match owner {
                    Some(o) => format!("{}.{}", o.value, ident.value),
                    None => ident.value.clone(),
                };
                return Err(BindingError::UnknownColumn { column }.into());
            }
        };
        session.columns.push(ColumnSegment {
            name: ident.value.clone(),
            range: self.source.ident_range(ident).ok(),
            owner: owner.map(|o| o.value.clone()),
            owner_range: owner.and_then(|o| self.source.ident_range(o).ok()),
            table: ctx.and_then(|c| c.table.clone()),
            owner_is_table: owner.is_some() && ctx.is_some_and(|c| c.referenced_by_name),
            correlated,
        });
        Ok(())
    }

    fn bind_assignments(
        &self,
        assignments: &[Assignment],
        session: &mut BinderSession,
        scope: &[TableBinderContext],
    ) -> Result<Vec<AssignmentSegment>> {
        let mut out = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            if let AssignmentTarget::ColumnName(name) = &assignment.target {
                let parts = object_name_parts(name);
                if let Some((column, rest)) = parts.split_last() {
                    let before = session.columns.len();
                    self.bind_column(rest.last().copied(), column, session, scope, &[], Mode::Strict)?;
                    out.push(AssignmentSegment {
                        column: column.value.clone(),
                        table: session
                            .columns
                            .get(before)
                            .and_then(|c| c.table.clone()),
                    });
                }
            }
            self.bind_expr(&assignment.value, session, scope, &[], Mode::Strict)?;
        }
        Ok(out)
    }

    fn bind_insert(&self, insert: &Insert, session: &mut BinderSession) -> Result<InsertContext> {
        let name = match &insert.table {
            TableObject::TableName(name) => name,
            _ => {
                return Err(BindingError::Unsupported(
                    "INSERT into a table function".to_string(),
                )
                .into())
            }
        };
        let mut scope = Vec::new();
        self.bind_physical_table(name, None, session, &mut scope)?;
        let table_ctx = scope.first().cloned();
        let table = table_ctx
            .as_ref()
            .and_then(|c| c.table.clone())
            .unwrap_or_default();
        let table_stop = session
            .tables
            .last()
            .and_then(|s| s.name_range)
            .map(|r| r.stop);

        let mut columns = Vec::with_capacity(insert.columns.len());
        for column in &insert.columns {
            self.bind_column(None, column, session, &scope, &[], Mode::Strict)?;
            columns.push(InsertColumn {
                name: column.value.clone(),
                range: self.source.ident_range(column).ok(),
            });
        }
        let columns_range = match (
            columns.first().and_then(|c| c.range),
            columns.last().and_then(|c| c.range),
        ) {
            (Some(first), Some(last)) => self
                .source
                .prev_char_before(first.start, '(')
                .zip(self.source.next_char_after(last.stop, ')'))
                .map(|(open, close)| TextRange::new(open, close + 1)),
            _ => None,
        };

        let mut context = InsertContext {
            table,
            shape: InsertShape::Values,
            columns,
            columns_range,
            table_stop,
            groups: Vec::new(),
            generated_key: None,
        };

        if let Some(source) = &insert.source {
            match source.body.as_ref() {
                SetExpr::Values(values) if source.with.is_none() => {
                    for row in &values.rows {
                        for e in row {
                            self.bind_expr(e, session, &[], &[], Mode::Lenient)?;
                        }
                        context.groups.push(self.value_group(row));
                    }
                }
                _ => {
                    let inner = self.bind_query(source, session, &[])?;
                    context.shape = InsertShape::Select {
                        projection_count: inner.projections.len(),
                    };
                }
            }
        } else if !insert.assignments.is_empty() {
            context.shape = InsertShape::Set;
            let mut values = Vec::with_capacity(insert.assignments.len());
            for assignment in &insert.assignments {
                let AssignmentTarget::ColumnName(target) = &assignment.target else {
                    return Err(
                        BindingError::Unsupported("tuple assignment in INSERT".to_string()).into(),
                    );
                };
                let parts = object_name_parts(target);
                let Some(column) = parts.last() else {
                    continue;
                };
                self.bind_column(None, column, session, &scope, &[], Mode::Strict)?;
                self.bind_expr(&assignment.value, session, &[], &[], Mode::Lenient)?;
                context.columns.push(InsertColumn {
                    name: column.value.clone(),
                    range: self.source.ident_range(column).ok(),
                });
                values.push(assignment.value.clone());
            }
            let mut group = self.value_group(&values);
            group.range = None;
            context.groups.push(group);
        } else {
            return Err(BindingError::Unsupported("INSERT without values".to_string()).into());
        }

        if let Some(OnInsert::DuplicateKeyUpdate(assignments)) = &insert.on {
            self.bind_assignments(assignments, session, &scope)?;
        }
        Ok(context)
    }

    fn value_group(&self, row: &[Expr]) -> InsertValueGroup {
        let items = row
            .iter()
            .map(|e| {
                let range = self.source.range(e.span());
                let value = if is_placeholder(e) {
                    range
                        .and_then(|r| self.marker_at(r.start))
                        .map_or(InsertValue::Expression, InsertValue::Parameter)
                } else {
                    literal_value(e).map_or(InsertValue::Expression, InsertValue::Literal)
                };
                InsertValueItem { value, range }
            })
            .collect::<Vec<_>>();
        let range = match (
            items.first().and_then(|i| i.range),
            items.last().and_then(|i| i.range),
        ) {
            (Some(first), Some(last)) => self
                .source
                .prev_char_before(first.start, '(')
                .zip(self.source.next_char_after(last.stop, ')'))
                .map(|(open, close)| TextRange::new(open, close + 1)),
            _ => None,
        };
        let span = range.or_else(|| {
            items
                .first()
                .and_then(|i| i.range)
                .zip(items.last().and_then(|i| i.range))
                .map(|(first, last)| TextRange::new(first.start, last.stop))
        });
        let markers = span.map_or_else(Vec::new, |span| {
            self.markers
                .iter()
                .filter(|m| span.contains(&m.range))
                .copied()
                .collect()
        });
        InsertValueGroup {
            items,
            range,
            markers,
        }
    }

    fn marker_at(&self, start: usize) -> Option<ParameterMarker> {
        self.markers.iter().find(|m| m.range.start == start).copied()
    }
}

fn column_origin(
    expr: &Expr,
    scope: &[TableBinderContext],
    outer: &[TableBinderContext],
) -> Option<ProjectionColumn> {
    let (ctx, column) = match expr {
        Expr::Identifier(ident) => match resolve_unqualified(&ident.value, scope, outer).ok()? {
            ColumnResolution::Bound(ctx, _) => (ctx, ident),
            ColumnResolution::Unverified(ctx) => (ctx?, ident),
            ColumnResolution::NotFound => return None,
        },
        Expr::CompoundIdentifier(parts) => match parts.as_slice() {
            [.., owner, column] => match resolve_qualified(&owner.value, &column.value, scope, outer) {
                ColumnResolution::Bound(ctx, _) => (ctx, column),
                ColumnResolution::Unverified(ctx) => (ctx?, column),
                ColumnResolution::NotFound => return None,
            },
            _ => return None,
        },
        Expr::Nested(inner) => return column_origin(inner, scope, outer),
        _ => return None,
    };
    match ctx.column_origin(&column.value) {
        Some(origin) => Some(origin.clone()),
        None if ctx.columns.is_none() => ctx.table.as_ref().map(|table| ProjectionColumn {
            table: table.clone(),
            column: column.value.clone(),
        }),
        None => None,
    }
}

fn order_by_index(expr: &Expr, projections: &[Projection]) -> Option<usize> {
    match expr {
        Expr::Value(v) => match &v.value {
            AstValue::Number(n, _) => n
                .parse::<usize>()
                .ok()
                .filter(|n| (1..=projections.len()).contains(n))
                .map(|n| n - 1),
            _ => None,
        },
        Expr::Identifier(ident) => projections
            .iter()
            .position(|p| p.label.eq_ignore_ascii_case(&ident.value)),
        Expr::CompoundIdentifier(parts) => {
            let last = parts.last()?;
            projections
                .iter()
                .position(|p| p.alias.is_none() && p.label.eq_ignore_ascii_case(&last.value))
        }
        Expr::Nested(inner) => order_by_index(inner, projections),
        other => {
            let text = other.to_string();
            projections
                .iter()
                .position(|p| p.label.eq_ignore_ascii_case(&text))
        }
    }
}
