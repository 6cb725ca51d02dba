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

use crate::binder::GeneratedKeyContext;
use crate::metadata::TableMetaData;
use crate::sql::{ParameterMarker, TextRange};
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertShape {
    Values,
    Set,
    Select { projection_count: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum InsertValue {
    Literal(Value),
    Parameter(ParameterMarker),
    Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertValueItem {
    pub value: InsertValue,
    pub range: Option<TextRange>,
}

impl InsertValueItem {
    /// Resolved value of a literal or a supplied parameter.
    pub fn resolve(&self, params: &[Value]) -> Option<Value> {
        match &self.value {
            InsertValue::Literal(v) => Some(v.clone()),
            InsertValue::Parameter(marker) => params.get(marker.index).cloned(),
            InsertValue::Expression => None,
        }
    }
}

/// One parenthesized VALUES row, or the assignment list of `INSERT .. SET`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertValueGroup {
    pub items: Vec<InsertValueItem>,
    /// Covers the parentheses of a VALUES row.
    pub range: Option<TextRange>,
    /// Placeholders inside the group, in text order.
    pub markers: Vec<ParameterMarker>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertColumn {
    pub name: String,
    pub range: Option<TextRange>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertContext {
    pub table: String,
    pub shape: InsertShape,
    pub columns: Vec<InsertColumn>,
    /// Covers `(a, b, ..)` including the parentheses.
    pub columns_range: Option<TextRange>,
    /// Offset just after the target table name.
    pub table_stop: Option<usize>,
    pub groups: Vec<InsertValueGroup>,
    pub generated_key: Option<GeneratedKeyContext>,
}

impl InsertContext {
    pub fn has_explicit_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    /// Number of values each row supplies.
    pub fn value_count(&self, group: usize) -> usize {
        match self.shape {
            InsertShape::Select { projection_count } => projection_count,
            InsertShape::Values | InsertShape::Set => {
                self.groups.get(group).map_or(0, |g| g.items.len())
            }
        }
    }

    /// Target column names: the explicit list, or the table's visible columns.
    pub fn effective_columns(&self, table: Option<&TableMetaData>) -> Vec<String> {
        if self.has_explicit_columns() {
            return self.columns.iter().map(|c| c.name.clone()).collect();
        }
        table.map(TableMetaData::visible_column_names).unwrap_or_default()
    }

    pub fn column_position(&self, table: Option<&TableMetaData>, column: &str) -> Option<usize> {
        self.effective_columns(table)
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
    }

    pub fn generated_key(&self) -> Option<&GeneratedKeyContext> {
        self.generated_key.as_ref()
    }
}
