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

use crate::binder::{BoundStatementContext, InsertContext, InsertShape};
use crate::error::Result;
use crate::metadata::{MetaDataSnapshot, TableMetaData};
use crate::rule::ShardingRule;
use crate::types::Value;
use tracing::debug;

/// The generated key column of an INSERT and the values it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedKeyContext {
    column: String,
    generated: bool,
    values: Vec<Value>,
}

impl GeneratedKeyContext {
    pub fn new(column: impl Into<String>, generated: bool) -> Self {
        Self {
            column: column.into(),
            generated,
            values: Vec::new(),
        }
    }

    pub fn column_name(&self) -> &str {
        &self.column
    }

    /// True when the statement omits the column and values must be generated.
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn push_value(&mut self, value: Value) {
        self.values.push(value);
    }
}

pub struct GeneratedKeyResolver;

impl GeneratedKeyResolver {
    /// Finds the table's generated column and whether the INSERT supplies it.
    ///
    /// Supplied values are collected per row from literals and, when parameters are
    /// given, from the bound parameters. Expressions contribute nothing.
    pub fn resolve(
        table: &TableMetaData,
        insert: &InsertContext,
        params: &[Value],
    ) -> Option<GeneratedKeyContext> {
        let column = table.generated_column()?;
        let position = if insert.has_explicit_columns() {
            insert
                .columns
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(&column.name))
        } else {
            let visible = table.visible_column_names();
            (insert.value_count(0) == visible.len())
                .then(|| visible.iter().position(|c| c.eq_ignore_ascii_case(&column.name)))
                .flatten()
        };

        let Some(position) = position else {
            return Some(GeneratedKeyContext::new(column.name.clone(), true));
        };
        let mut ctx = GeneratedKeyContext::new(column.name.clone(), false);
        if matches!(insert.shape, InsertShape::Select { .. }) {
            return Some(ctx);
        }
        for group in &insert.groups {
            if let Some(value) = group.items.get(position).and_then(|item| item.resolve(params)) {
                ctx.push_value(value);
            }
        }
        Some(ctx)
    }

    /// Resolves the key context of an INSERT and, when the statement omits the key,
    /// generates one value per row with the table's key generator.
    pub fn attach(
        ctx: &mut BoundStatementContext,
        metadata: &MetaDataSnapshot,
        rule: &ShardingRule,
        params: &[Value],
    ) -> Result<()> {
        let Some(insert) = ctx.insert_mut() else {
            return Ok(());
        };
        let Some(table) = metadata.table(&insert.table) else {
            return Ok(());
        };
        let Some(mut key) = Self::resolve(table, insert, params) else {
            return Ok(());
        };
        let generator = rule.find_key_generator(&insert.table, key.column_name());
        if let (true, Some(generator), InsertShape::Values | InsertShape::Set) =
            (key.is_generated(), generator, insert.shape)
        {
            for _ in 0..insert.groups.len() {
                key.push_value(generator.generate_key()?);
            }
            debug!(
                table = %insert.table,
                column = key.column_name(),
                count = key.values().len(),
                "generated keys"
            );
        }
        insert.generated_key = Some(key);
        Ok(())
    }
}
