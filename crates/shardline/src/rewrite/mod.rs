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

//! Rewriting: turns one bound statement and its route into the SQL and parameters
//! each route unit executes.
//!
//! Rewriting is token based. Generators emit [`SqlToken`]s that replace or insert
//! text at byte ranges of the original SQL; everything outside a token is copied
//! unchanged. Tokens that depend on the target (actual table names, the INSERT rows
//! a unit receives) are rendered once per route unit.

pub mod columns;
pub mod encrypt;
pub mod parameter;
pub mod sharding;
pub mod token;

pub use columns::{
    AppendGeneratedKey, ColumnItem, ColumnList, ColumnOrigin, ColumnPipeline, ColumnTransform,
    EncryptColumns, StripVirtualColumns,
};
pub use encrypt::{EncryptRewrite, EncryptTokenGenerator, ParameterEdit};
pub use parameter::{GroupedParameterBuilder, ParameterBuilder};
pub use token::{render, SqlToken, SqlTokens, TokenContent, TokenPart};

use crate::binder::{BoundStatementContext, InsertContext, InsertShape, InsertValue, InsertValueGroup};
use crate::error::{Result, RewriteError, RoutingError, ShardError};
use crate::metadata::MetaDataSnapshot;
use crate::route::{RouteContext, RouteUnit};
use crate::rule::{EncryptTable, RuleSet};
use crate::sql::{ParameterMarker, TextRange};
use crate::types::Value;
use std::fmt;
use tracing::debug;

/// SQL and parameters for one data source.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUnit {
    pub data_source: String,
    pub sql: String,
    pub parameters: Vec<Value>,
}

impl fmt::Display for ExecutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ::: {}", self.data_source, self.sql)?;
        if !self.parameters.is_empty() {
            let params = self
                .parameters
                .iter()
                .map(Value::to_sql_literal)
                .collect::<Vec<_>>();
            write!(f, " ::: [{}]", params.join(", "))?;
        }
        Ok(())
    }
}

/// INSERT rows rendered once and distributed to units by group.
struct InsertRows {
    table: String,
    rows: Vec<String>,
    parameters: GroupedParameterBuilder,
}

impl InsertRows {
    fn render<F: Fn(usize) -> bool>(&self, include: F) -> String {
        self.rows
            .iter()
            .enumerate()
            .filter(|(idx, _)| include(*idx))
            .map(|(_, row)| row.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Default)]
struct InsertRewrite {
    tokens: Vec<SqlToken>,
    rows: Option<InsertRows>,
}

pub struct Rewriter<'a> {
    rules: &'a RuleSet,
    metadata: &'a MetaDataSnapshot,
}

impl<'a> Rewriter<'a> {
    pub fn new(rules: &'a RuleSet, metadata: &'a MetaDataSnapshot) -> Self {
        Self { rules, metadata }
    }

    /// Execution units in route order. A statement that touches no governed table
    /// runs once on the default data source.
    pub fn rewrite(
        &self,
        ctx: &BoundStatementContext,
        route: &RouteContext,
        params: &[Value],
    ) -> Result<Vec<ExecutionUnit>> {
        let encrypt = EncryptTokenGenerator::new(ctx, self.rules, params).generate()?;
        let insert = self.rewrite_insert(ctx, route, params)?;

        let mut tokens = SqlTokens::new();
        tokens.extend(sharding::table_tokens(
            ctx,
            &self.rules.sharding,
            &encrypt.expanded_wildcards,
        ));
        tokens.extend(sharding::index_tokens(ctx, &self.rules.sharding));
        tokens.extend(encrypt.tokens);
        tokens.extend(insert.tokens);
        let tokens = tokens.finish()?;

        let units = if route.plan.is_empty() {
            let data_source = self.rules.default_data_source().ok_or_else(|| {
                RoutingError::NoRouteTarget(format!(
                    "'{}' touches no sharding table and no default data source is configured",
                    ctx.sql()
                ))
            })?;
            vec![RouteUnit::new(data_source)]
        } else {
            route.plan.units().to_vec()
        };

        let mut out = Vec::with_capacity(units.len());
        match &insert.rows {
            Some(rows) => {
                let mut parameters = rows.parameters.clone();
                apply_edits(ctx, &encrypt.parameter_edits, Some(&mut parameters), None)?;
                for unit in &units {
                    let node = unit.data_node(&rows.table);
                    let include =
                        |group: usize| node.as_ref().map_or(true, |n| route.is_group_routed_to(group, n));
                    out.push(ExecutionUnit {
                        data_source: unit.data_source.clone(),
                        sql: render(ctx.sql(), &tokens, Some(unit), &rows.render(include)),
                        parameters: parameters.build(include),
                    });
                }
            }
            None => {
                let mut builder = ParameterBuilder::new(params.to_vec());
                apply_edits(ctx, &encrypt.parameter_edits, None, Some(&mut builder))?;
                let parameters = builder.build();
                for unit in &units {
                    out.push(ExecutionUnit {
                        data_source: unit.data_source.clone(),
                        sql: render(ctx.sql(), &tokens, Some(unit), ""),
                        parameters: parameters.clone(),
                    });
                }
            }
        }
        debug!(
            tokens = tokens.len(),
            units = out.len(),
            "statement rewritten"
        );
        Ok(out)
    }

    fn rewrite_insert(
        &self,
        ctx: &BoundStatementContext,
        route: &RouteContext,
        params: &[Value],
    ) -> Result<InsertRewrite> {
        let Some(insert) = ctx.insert() else {
            return Ok(InsertRewrite::default());
        };
        let table_rule = self.rules.sharding.find_table_rule(&insert.table);
        let encrypt_table = self.rules.encrypt.find_table(&insert.table);
        let generated = insert
            .generated_key()
            .filter(|k| k.is_generated() && k.values().len() == insert.groups.len());

        let names = insert.effective_columns(self.metadata.table(&insert.table));
        let original = ColumnList::from_names(&names);
        let mut pipeline = ColumnPipeline::new();
        if let Some(rule) = table_rule.filter(|r| !r.virtual_columns.is_empty()) {
            pipeline = pipeline.then(StripVirtualColumns {
                virtual_columns: &rule.virtual_columns,
            });
        }
        if let Some(table) = encrypt_table {
            pipeline = pipeline.then(EncryptColumns { table });
        }
        if let Some(key) = generated {
            pipeline = pipeline.then(AppendGeneratedKey {
                column: key.column_name(),
            });
        }
        let columns = pipeline.run(original.clone())?;
        let columns_changed = columns != original;
        let distributed = insert.groups.len() > 1 && !route.insert_group_nodes().is_empty();
        if !columns_changed && !distributed {
            return Ok(InsertRewrite::default());
        }

        let mut out = InsertRewrite::default();
        match insert.shape {
            InsertShape::Select { .. } => {
                if columns_changed {
                    return Err(ShardError::Rewrite(RewriteError::MissingDerivedValue(format!(
                        "INSERT .. SELECT into '{}' cannot supply cipher, assisted query or generated columns",
                        insert.table
                    ))));
                }
                return Ok(out);
            }
            InsertShape::Values if columns_changed => {
                let list = columns.names().join(", ");
                match (insert.columns_range, insert.table_stop) {
                    (Some(range), _) => out.tokens.push(SqlToken::text(range, format!("({list})"))),
                    (None, Some(at)) => out.tokens.push(SqlToken::insert(at, format!(" ({list})"))),
                    (None, None) => {
                        return Err(ShardError::Rewrite(RewriteError::SegmentPosition(format!(
                            "column list of INSERT into '{}'",
                            insert.table
                        ))))
                    }
                }
            }
            InsertShape::Values | InsertShape::Set => {}
        }

        let needed = ctx.markers().iter().map(|m| m.index + 1).max().unwrap_or(0);
        if params.len() < needed {
            return Err(ShardError::Rewrite(RewriteError::MissingDerivedValue(format!(
                "statement uses {needed} parameters but {} were supplied",
                params.len()
            ))));
        }
        reject_numbered_markers(ctx)?;

        let rows_range = rows_range(insert)?;
        let renderer = RowRenderer {
            ctx,
            insert,
            names: &names,
            columns: &columns,
            encrypt_table,
            generated: generated.map(|k| k.values()),
            dropped: columns.dropped_originals(original.len()),
            params,
        };
        let mut rows = Vec::with_capacity(insert.groups.len());
        let mut groups = Vec::with_capacity(insert.groups.len());
        for (idx, group) in insert.groups.iter().enumerate() {
            let (row, builder) = renderer.render(idx, group)?;
            rows.push(row);
            groups.push(builder);
        }
        let partition = |keep: &dyn Fn(&ParameterMarker) -> bool| {
            ParameterBuilder::new(
                ctx.markers()
                    .iter()
                    .filter(|m| keep(m))
                    .filter_map(|m| params.get(m.index).cloned())
                    .collect(),
            )
        };
        out.tokens.push(SqlToken::insert_values(rows_range));
        out.rows = Some(InsertRows {
            table: insert.table.clone(),
            rows,
            parameters: GroupedParameterBuilder {
                before: partition(&|m: &ParameterMarker| m.range.start < rows_range.start),
                groups,
                after: partition(&|m: &ParameterMarker| m.range.start >= rows_range.stop),
            },
        });
        Ok(out)
    }
}

/// Text covered by the rows: every VALUES group, or the assignments of
/// `INSERT .. SET`.
fn rows_range(insert: &InsertContext) -> Result<TextRange> {
    let missing = || {
        ShardError::Rewrite(RewriteError::SegmentPosition(format!(
            "value rows of INSERT into '{}'",
            insert.table
        )))
    };
    let (first, last) = match insert.shape {
        InsertShape::Set => (
            insert.columns.first().and_then(|c| c.range),
            insert
                .groups
                .first()
                .and_then(|g| g.items.last())
                .and_then(|i| i.range),
        ),
        _ => (
            insert.groups.first().and_then(|g| g.range),
            insert.groups.last().and_then(|g| g.range),
        ),
    };
    let (first, last) = (first.ok_or_else(missing)?, last.ok_or_else(missing)?);
    Ok(TextRange::new(first.start, last.stop))
}

/// Renders one value group against the transformed column list.
struct RowRenderer<'a> {
    ctx: &'a BoundStatementContext,
    insert: &'a InsertContext,
    /// Effective column names before any transform.
    names: &'a [String],
    columns: &'a ColumnList,
    encrypt_table: Option<&'a EncryptTable>,
    generated: Option<&'a [Value]>,
    dropped: Vec<usize>,
    params: &'a [Value],
}

impl RowRenderer<'_> {
    fn render(&self, idx: usize, group: &InsertValueGroup) -> Result<(String, ParameterBuilder)> {
        let mut builder = ParameterBuilder::new(
            group
                .markers
                .iter()
                .filter_map(|m| self.params.get(m.index).cloned())
                .collect(),
        );
        let local = |marker: &ParameterMarker| group.markers.iter().position(|m| m == marker);
        for n in &self.dropped {
            let Some(range) = group.items.get(*n).and_then(|i| i.range) else {
                continue;
            };
            for (pos, marker) in group.markers.iter().enumerate() {
                if range.contains(&marker.range) {
                    builder.remove(pos);
                }
            }
        }

        let mut emitted = 0;
        let mut values = Vec::with_capacity(self.columns.len());
        for column in self.columns.items() {
            let text = match column.origin {
                ColumnOrigin::GeneratedKey => {
                    let value = self
                        .generated
                        .and_then(|keys| keys.get(idx))
                        .cloned()
                        .unwrap_or(Value::Null);
                    if group.markers.is_empty() {
                        value.to_sql_literal()
                    } else {
                        builder.add(emitted, value);
                        emitted += 1;
                        "?".to_string()
                    }
                }
                ColumnOrigin::Original(n) => {
                    let range = self.item_range(group, n)?;
                    emitted += group.markers.iter().filter(|m| range.contains(&m.range)).count();
                    self.ctx.source().slice(range).to_string()
                }
                ColumnOrigin::Cipher(n) | ColumnOrigin::AssistedQuery(n) | ColumnOrigin::Plain(n) => {
                    let item = group.items.get(n).ok_or_else(|| self.missing_value(n))?;
                    let encrypt = self
                        .encrypt_table
                        .zip(self.names.get(n))
                        .and_then(|(t, name)| t.find_column(name))
                        .ok_or_else(|| self.missing_value(n))?;
                    let table = self.insert.table.as_str();
                    let plain = match &item.value {
                        InsertValue::Literal(v) => v.clone(),
                        InsertValue::Parameter(marker) => self
                            .params
                            .get(marker.index)
                            .cloned()
                            .ok_or_else(|| self.missing_value(n))?,
                        InsertValue::Expression => return Err(self.missing_value(n)),
                    };
                    let derived = match column.origin {
                        ColumnOrigin::Cipher(_) => encrypt.encrypt(table, &plain)?,
                        ColumnOrigin::AssistedQuery(_) => {
                            encrypt.assisted_encrypt(table, &plain)?.unwrap_or(Value::Null)
                        }
                        _ => plain,
                    };
                    match (&item.value, column.origin) {
                        (InsertValue::Parameter(marker), ColumnOrigin::Cipher(_)) => {
                            if let Some(pos) = local(marker) {
                                builder.replace(pos, derived);
                            }
                            emitted += 1;
                            self.ctx.source().slice(marker.range).to_string()
                        }
                        (InsertValue::Parameter(_), _) => {
                            builder.add(emitted, derived);
                            emitted += 1;
                            "?".to_string()
                        }
                        _ => derived.to_sql_literal(),
                    }
                }
            };
            values.push(text);
        }

        let row = match self.insert.shape {
            InsertShape::Set => self
                .columns
                .names()
                .iter()
                .zip(&values)
                .map(|(name, value)| format!("{name} = {value}"))
                .collect::<Vec<_>>()
                .join(", "),
            _ => format!("({})", values.join(", ")),
        };
        Ok((row, builder))
    }

    fn item_range(&self, group: &InsertValueGroup, n: usize) -> Result<TextRange> {
        group
            .items
            .get(n)
            .and_then(|i| i.range)
            .ok_or_else(|| {
                ShardError::Rewrite(RewriteError::SegmentPosition(format!(
                    "value #{} of INSERT into '{}'",
                    n + 1,
                    self.insert.table
                )))
            })
    }

    fn missing_value(&self, n: usize) -> ShardError {
        ShardError::Rewrite(RewriteError::MissingDerivedValue(format!(
            "value #{} of INSERT into '{}' must be a literal or a parameter",
            n + 1,
            self.insert.table
        )))
    }
}

/// Parameter regrouping renumbers markers, which only positional `?` markers allow.
fn reject_numbered_markers(ctx: &BoundStatementContext) -> Result<()> {
    match ctx
        .markers()
        .iter()
        .find(|m| ctx.source().slice(m.range).starts_with('$'))
    {
        Some(marker) => Err(ShardError::Rewrite(RewriteError::NumberedParameters(
            ctx.source().slice(marker.range).to_string(),
        ))),
        None => Ok(()),
    }
}

/// Applies encryption edits to either the grouped INSERT parameters or the plain
/// parameter list.
fn apply_edits(
    ctx: &BoundStatementContext,
    edits: &[ParameterEdit],
    grouped: Option<&mut GroupedParameterBuilder>,
    plain: Option<&mut ParameterBuilder>,
) -> Result<()> {
    if edits.is_empty() {
        return Ok(());
    }
    if let Some(grouped) = grouped {
        // Only predicates outside the value rows produce edits here.
        let first_row = ctx
            .insert()
            .and_then(|i| i.groups.first())
            .and_then(|g| g.range)
            .map_or(usize::MAX, |r| r.start);
        let before = ctx
            .markers()
            .iter()
            .filter(|m| m.range.start < first_row)
            .count();
        let after = ctx.markers().len() - grouped.after.original().len();
        for edit in edits {
            if let ParameterEdit::Replace { index, value } = edit {
                let position = ctx.markers().iter().position(|m| m.index == *index);
                match position {
                    Some(p) if p < before => grouped.before.replace(p, value.clone()),
                    Some(p) if p >= after => grouped.after.replace(p - after, value.clone()),
                    _ => {}
                }
            }
        }
        return Ok(());
    }
    let Some(builder) = plain else {
        return Ok(());
    };
    let mut added = 0;
    for edit in edits {
        match edit {
            ParameterEdit::Replace { index, value } => builder.replace(*index, value.clone()),
            ParameterEdit::Add { at, value } => {
                reject_numbered_markers(ctx)?;
                let before = ctx.markers().iter().filter(|m| m.range.start < *at).count();
                builder.add(before + added, value.clone());
                added += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
