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

use crate::binder::{
    ColumnSegment, CombineSegment, IndexSegment, ProjectionColumn, SimpleTableSegment,
    TableBoundInfo,
};
use crate::error::{BindingError, Result};
use std::collections::{HashMap, HashSet};

/// A column visible through a table context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundColumn {
    pub name: String,
    /// Hidden columns resolve by name but never expand from `*`.
    pub visible: bool,
    /// Physical column this one is read from, traced through derived tables.
    pub origin: Option<ProjectionColumn>,
}

impl BoundColumn {
    pub fn physical(table: &str, name: &str, visible: bool) -> Self {
        Self {
            name: name.to_string(),
            visible,
            origin: Some(ProjectionColumn {
                table: table.to_string(),
                column: name.to_string(),
            }),
        }
    }

    pub fn derived(name: &str, origin: Option<ProjectionColumn>) -> Self {
        Self {
            name: name.to_string(),
            visible: true,
            origin,
        }
    }
}

/// Name resolution context for one table reference in a FROM clause or one outer query
/// table visible to a correlated subquery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBinderContext {
    /// Alias, or the table name when no alias was given.
    pub reference: String,
    /// Logical table name; `None` for derived tables and CTE references.
    pub table: Option<String>,
    pub bound: Option<TableBoundInfo>,
    /// Known columns; `None` when the table could not be validated.
    pub columns: Option<Vec<BoundColumn>>,
    pub referenced_by_name: bool,
}

impl TableBinderContext {
    pub fn matches_reference(&self, name: &str) -> bool {
        self.reference.eq_ignore_ascii_case(name)
    }

    pub fn has_column(&self, column: &str) -> Option<bool> {
        self.columns
            .as_ref()
            .map(|cols| cols.iter().any(|c| c.name.eq_ignore_ascii_case(column)))
    }

    pub fn column_origin(&self, column: &str) -> Option<&ProjectionColumn> {
        self.columns
            .as_ref()?
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(column))?
            .origin
            .as_ref()
    }
}

/// State shared by every recursive bind call made for one top-level statement.
///
/// The CTE alias set is statement-global: subqueries and every branch of a UNION
/// observe and extend the same set.
#[derive(Debug, Default)]
pub struct BinderSession {
    cte_aliases: HashSet<String>,
    cte_columns: HashMap<String, Vec<String>>,
    pub(crate) tables: Vec<SimpleTableSegment>,
    pub(crate) columns: Vec<ColumnSegment>,
    pub(crate) subquery_projections: Vec<(String, Vec<String>)>,
    pub(crate) combines: Vec<CombineSegment>,
    pub(crate) indexes: Vec<IndexSegment>,
    pub(crate) extra_tables: Vec<String>,
    pub(crate) contains_subquery: bool,
    pub(crate) contains_join: bool,
}

impl BinderSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a CTE alias, failing when the statement already declares it.
    pub fn declare_cte(&mut self, alias: &str) -> Result<()> {
        if !self.cte_aliases.insert(alias.to_ascii_lowercase()) {
            return Err(BindingError::DuplicateAlias {
                alias: alias.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn set_cte_columns(&mut self, alias: &str, columns: Vec<String>) {
        self.cte_columns.insert(alias.to_ascii_lowercase(), columns);
    }

    pub fn is_cte(&self, name: &str) -> bool {
        self.cte_aliases.contains(&name.to_ascii_lowercase())
    }

    pub fn cte_columns(&self, name: &str) -> Option<&[String]> {
        self.cte_columns
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub fn cte_alias_count(&self) -> usize {
        self.cte_aliases.len()
    }
}

/// Outcome of resolving one column name against the visible table contexts.
#[derive(Debug)]
pub(crate) enum ColumnResolution<'a> {
    Bound(&'a TableBinderContext, bool),
    /// A table without validated columns may own the column.
    Unverified(Option<&'a TableBinderContext>),
    NotFound,
}

/// Resolves an unqualified column: local scope first, then outer contexts.
pub(crate) fn resolve_unqualified<'a>(
    column: &str,
    scope: &'a [TableBinderContext],
    outer: &'a [TableBinderContext],
) -> Result<ColumnResolution<'a>> {
    for (contexts, is_outer) in [(scope, false), (outer, true)] {
        let definite = contexts
            .iter()
            .filter(|ctx| ctx.has_column(column) == Some(true))
            .collect::<Vec<_>>();
        match definite.as_slice() {
            [single] => return Ok(ColumnResolution::Bound(single, is_outer)),
            [] => {
                let mut unverified = contexts.iter().filter(|ctx| ctx.columns.is_none());
                if let Some(first) = unverified.next() {
                    let single = unverified.next().is_none().then_some(first);
                    return Ok(ColumnResolution::Unverified(single));
                }
            }
            _ => {
                return Err(BindingError::AmbiguousColumn {
                    column: column.to_string(),
                }
                .into())
            }
        }
    }
    Ok(ColumnResolution::NotFound)
}

/// Resolves `owner.column` against the visible table contexts.
pub(crate) fn resolve_qualified<'a>(
    owner: &str,
    column: &str,
    scope: &'a [TableBinderContext],
    outer: &'a [TableBinderContext],
) -> ColumnResolution<'a> {
    let found = scope
        .iter()
        .map(|ctx| (ctx, false))
        .chain(outer.iter().map(|ctx| (ctx, true)))
        .find(|(ctx, _)| ctx.matches_reference(owner));
    match found {
        Some((ctx, is_outer)) => match ctx.has_column(column) {
            Some(true) => ColumnResolution::Bound(ctx, is_outer),
            None => ColumnResolution::Unverified(Some(ctx)),
            Some(false) => ColumnResolution::NotFound,
        },
        None => ColumnResolution::NotFound,
    }
}
