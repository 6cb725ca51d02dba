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

//! Statement binding: resolves every table and column reference in a parsed statement
//! against the metadata snapshot and produces a [`BoundStatementContext`].

pub mod generated_key;
pub mod insert;
pub mod session;
mod statement;
pub mod tables;

pub use generated_key::{GeneratedKeyContext, GeneratedKeyResolver};
pub use insert::{InsertColumn, InsertContext, InsertShape, InsertValue, InsertValueGroup, InsertValueItem};
pub use session::{BinderSession, BoundColumn, TableBinderContext};
pub use tables::TablesContext;

use crate::error::Result;
use crate::metadata::MetaDataSnapshot;
use crate::sql::{collect_parameter_markers, ParameterMarker, SourceText, TextRange};
use sqlparser::ast::{Ident, Statement, ValueWithSpan};
use statement::{BoundParts, StatementBinder};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlKind {
    CreateTable,
    AlterTable,
    DropTable,
    Truncate,
    CreateIndex,
    DropIndex,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DalKind {
    Describe,
    ShowColumns,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl(DdlKind),
    Dal(DalKind),
    Dcl,
    Tcl,
    Other,
}

impl StatementKind {
    pub fn is_dml(&self) -> bool {
        matches!(
            self,
            StatementKind::Select | StatementKind::Insert | StatementKind::Update | StatementKind::Delete
        )
    }

    pub fn is_query(&self) -> bool {
        matches!(self, StatementKind::Select)
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatementKind::Select => "select",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Delete => "delete",
            StatementKind::Ddl(_) => "ddl",
            StatementKind::Dal(_) => "dal",
            StatementKind::Dcl => "dcl",
            StatementKind::Tcl => "tcl",
            StatementKind::Other => "other",
        }
    }
}

/// Where a bound table lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBoundInfo {
    pub database: String,
    pub schema: String,
}

/// A physical table reference as written in the statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleTableSegment {
    pub name: String,
    pub owner: Option<String>,
    pub alias: Option<String>,
    pub name_range: Option<TextRange>,
    pub owner_range: Option<TextRange>,
    pub quote: Option<char>,
    /// `None` for tables that are created by the statement itself.
    pub bound: Option<TableBoundInfo>,
}

/// A column reference with the table it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSegment {
    pub name: String,
    pub range: Option<TextRange>,
    pub owner: Option<String>,
    pub owner_range: Option<TextRange>,
    /// Logical table; `None` for derived tables, CTEs and unverified references.
    pub table: Option<String>,
    /// The owner qualifier is the table name itself rather than an alias.
    pub owner_is_table: bool,
    /// Resolved through an enclosing query.
    pub correlated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionColumn {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionOrigin {
    /// An explicit select item; the range covers its expression.
    Item { range: Option<TextRange> },
    /// One column produced by expanding `*` or `t.*`; the range covers the wildcard item.
    Wildcard {
        range: Option<TextRange>,
        qualifier: Option<String>,
        /// The qualifier is an unaliased physical table name.
        qualifier_is_table: bool,
    },
}

/// One output column of the top-level query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub label: String,
    pub alias: Option<String>,
    pub column: Option<ProjectionColumn>,
    pub origin: ProjectionOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderByItem {
    /// Output column index; `None` when the key is not projected.
    pub index: Option<usize>,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineSegment {
    pub operator: String,
    pub all: bool,
    pub left: Option<TextRange>,
    pub right: Option<TextRange>,
}

/// An index name appearing in CREATE INDEX or DROP INDEX.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSegment {
    pub name: String,
    pub range: Option<TextRange>,
    /// Table owning the index, when known.
    pub table: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentSegment {
    pub column: String,
    pub table: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BindOptions {
    /// Database used for unqualified names; the snapshot default when unset.
    pub current_database: Option<String>,
    /// Accept tables and columns missing from metadata.
    pub skip_metadata_validate: bool,
}

impl BindOptions {
    pub fn with_current_database(mut self, database: impl Into<String>) -> Self {
        self.current_database = Some(database.into());
        self
    }
}

/// Everything the router and rewriter need to know about one statement.
#[derive(Debug, Clone)]
pub struct BoundStatementContext {
    source: SourceText,
    statement: Statement,
    kind: StatementKind,
    tables: TablesContext,
    table_segments: Vec<SimpleTableSegment>,
    columns: Vec<ColumnSegment>,
    column_lookup: HashMap<usize, usize>,
    markers: Vec<ParameterMarker>,
    projections: Vec<Projection>,
    order_by: Vec<OrderByItem>,
    combines: Vec<CombineSegment>,
    insert: Option<InsertContext>,
    indexes: Vec<IndexSegment>,
    assignments: Vec<AssignmentSegment>,
    rename_to: Option<String>,
    contains_subquery: bool,
    contains_join: bool,
}

impl BoundStatementContext {
    pub fn source(&self) -> &SourceText {
        &self.source
    }

    pub fn sql(&self) -> &str {
        self.source.as_str()
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn tables(&self) -> &TablesContext {
        &self.tables
    }

    pub fn table_segments(&self) -> &[SimpleTableSegment] {
        &self.table_segments
    }

    pub fn columns(&self) -> &[ColumnSegment] {
        &self.columns
    }

    /// Column bound at the identifier's position.
    pub fn column_for_ident(&self, ident: &Ident) -> Option<&ColumnSegment> {
        let start = self.source.offset(ident.span.start)?;
        self.column_lookup
            .get(&start)
            .and_then(|idx| self.columns.get(*idx))
    }

    pub fn markers(&self) -> &[ParameterMarker] {
        &self.markers
    }

    pub fn has_parameters(&self) -> bool {
        !self.markers.is_empty()
    }

    pub fn marker_for_value(&self, value: &ValueWithSpan) -> Option<ParameterMarker> {
        let start = self.source.offset(value.span.start)?;
        self.marker_at(start)
    }

    pub fn marker_at(&self, start: usize) -> Option<ParameterMarker> {
        self.markers
            .binary_search_by_key(&start, |m| m.range.start)
            .ok()
            .map(|idx| self.markers[idx])
    }

    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    pub fn order_by(&self) -> &[OrderByItem] {
        &self.order_by
    }

    pub fn combines(&self) -> &[CombineSegment] {
        &self.combines
    }

    pub fn insert(&self) -> Option<&InsertContext> {
        self.insert.as_ref()
    }

    pub fn insert_mut(&mut self) -> Option<&mut InsertContext> {
        self.insert.as_mut()
    }

    pub fn indexes(&self) -> &[IndexSegment] {
        &self.indexes
    }

    pub fn assignments(&self) -> &[AssignmentSegment] {
        &self.assignments
    }

    /// New table name of `ALTER TABLE .. RENAME TO ..`.
    pub fn rename_to(&self) -> Option<&str> {
        self.rename_to.as_deref()
    }

    pub fn contains_subquery(&self) -> bool {
        self.contains_subquery
    }

    pub fn contains_join(&self) -> bool {
        self.contains_join
    }
}

/// Binds parsed statements against one metadata snapshot.
pub struct Binder<'a> {
    metadata: &'a MetaDataSnapshot,
    options: BindOptions,
}

impl<'a> Binder<'a> {
    pub fn new(metadata: &'a MetaDataSnapshot) -> Self {
        Self {
            metadata,
            options: BindOptions::default(),
        }
    }

    pub fn with_options(metadata: &'a MetaDataSnapshot, options: BindOptions) -> Self {
        Self { metadata, options }
    }

    pub fn bind(&self, statement: Statement, sql: &str) -> Result<BoundStatementContext> {
        let source = SourceText::new(sql);
        let markers = collect_parameter_markers(&statement, &source)?;
        let mut session = BinderSession::new();
        let binder = StatementBinder::new(self.metadata, &self.options, &source, &markers);
        let parts: BoundParts = binder.bind(&statement, &mut session)?;

        let tables = TablesContext::new(
            &session.tables,
            &session.extra_tables,
            session.subquery_projections.drain(..),
        );
        let column_lookup = session
            .columns
            .iter()
            .enumerate()
            .filter_map(|(idx, c)| c.range.map(|r| (r.start, idx)))
            .collect();
        Ok(BoundStatementContext {
            source,
            statement,
            kind: parts.kind,
            tables,
            table_segments: session.tables,
            columns: session.columns,
            column_lookup,
            markers,
            projections: parts.projections,
            order_by: parts.order_by,
            combines: session.combines,
            insert: parts.insert,
            indexes: session.indexes,
            assignments: parts.assignments,
            rename_to: parts.rename_to,
            contains_subquery: session.contains_subquery,
            contains_join: session.contains_join,
        })
    }
}

#[cfg(test)]
mod tests;
