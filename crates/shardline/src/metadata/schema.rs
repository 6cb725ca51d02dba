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

use serde::{Deserialize, Serialize};

fn default_visible() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetaData {
    pub name: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub primary_key: bool,
    /// Value is produced by the database or a key generator when omitted.
    #[serde(default)]
    pub generated: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

impl ColumnMetaData {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            primary_key: false,
            generated: false,
            visible: true,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetaData {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetaData {
    pub name: String,
    pub columns: Vec<ColumnMetaData>,
    #[serde(default)]
    pub indexes: Vec<IndexMetaData>,
}

impl TableMetaData {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnMetaData>) -> Self {
        Self {
            name: name.into(),
            columns,
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.indexes.push(IndexMetaData {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetaData> {
        self.column_index(name).map(|idx| &self.columns[idx])
    }

    pub fn contains_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn contains_index(&self, name: &str) -> bool {
        self.indexes.iter().any(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub fn generated_column(&self) -> Option<&ColumnMetaData> {
        self.columns.iter().find(|c| c.generated)
    }

    pub fn is_generated(&self, column: &str) -> bool {
        self.column(column).is_some_and(|c| c.generated)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn visible_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.visible)
            .map(|c| c.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetaData {
    pub name: String,
    #[serde(default)]
    pub tables: Vec<TableMetaData>,
}

impl SchemaMetaData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableMetaData> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// Inserts or replaces a table, matching names case-insensitively.
    pub fn put_table(&mut self, table: TableMetaData) {
        match self
            .tables
            .iter_mut()
            .find(|t| t.name.eq_ignore_ascii_case(&table.name))
        {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
    }

    pub fn remove_table(&mut self, name: &str) -> Option<TableMetaData> {
        let idx = self
            .tables
            .iter()
            .position(|t| t.name.eq_ignore_ascii_case(name))?;
        Some(self.tables.remove(idx))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseMetaData {
    pub name: String,
    pub default_schema: String,
    #[serde(default)]
    pub schemas: Vec<SchemaMetaData>,
}

impl DatabaseMetaData {
    /// MySQL-style database where schema and database share one name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::with_default_schema(name.clone(), name)
    }

    pub fn with_default_schema(name: impl Into<String>, default_schema: impl Into<String>) -> Self {
        let default_schema = default_schema.into();
        Self {
            name: name.into(),
            schemas: vec![SchemaMetaData::new(default_schema.clone())],
            default_schema,
        }
    }

    pub fn with_table(mut self, table: TableMetaData) -> Self {
        self.default_schema_mut().put_table(table);
        self
    }

    pub fn schema(&self, name: &str) -> Option<&SchemaMetaData> {
        self.schemas.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn schema_mut(&mut self, name: &str) -> Option<&mut SchemaMetaData> {
        self.schemas
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn default_schema_mut(&mut self) -> &mut SchemaMetaData {
        let idx = match self
            .schemas
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(&self.default_schema))
        {
            Some(idx) => idx,
            None => {
                self.schemas.push(SchemaMetaData::new(self.default_schema.clone()));
                self.schemas.len() - 1
            }
        };
        &mut self.schemas[idx]
    }
}
