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

use crate::error::{Result, ShardError};
use crate::metadata::schema::{DatabaseMetaData, SchemaMetaData, TableMetaData};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Immutable, versioned view of logical databases, schemas and tables.
///
/// A snapshot is never changed once published; DDL produces a new snapshot through
/// [`MetaDataRegistry::alter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaDataSnapshot {
    #[serde(default)]
    version: u64,
    default_database: String,
    databases: Vec<DatabaseMetaData>,
}

impl MetaDataSnapshot {
    pub fn new(default_database: DatabaseMetaData) -> Self {
        Self {
            version: 0,
            default_database: default_database.name.clone(),
            databases: vec![default_database],
        }
    }

    pub fn with_database(mut self, database: DatabaseMetaData) -> Self {
        self.put_database(database);
        self
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let snapshot: MetaDataSnapshot = serde_json::from_str(text)
            .map_err(|e| ShardError::Config(format!("invalid metadata: {e}")))?;
        if snapshot.database(&snapshot.default_database).is_none() {
            return Err(ShardError::Config(format!(
                "default database '{}' is not declared",
                snapshot.default_database
            )));
        }
        Ok(snapshot)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn default_database(&self) -> &str {
        &self.default_database
    }

    pub fn databases(&self) -> &[DatabaseMetaData] {
        &self.databases
    }

    pub fn database(&self, name: &str) -> Option<&DatabaseMetaData> {
        self.databases
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    pub fn contains_database(&self, name: &str) -> bool {
        self.database(name).is_some()
    }

    pub fn schema(&self, database: &str, schema: &str) -> Option<&SchemaMetaData> {
        self.database(database)?.schema(schema)
    }

    pub fn find_table(&self, database: &str, schema: &str, table: &str) -> Option<&TableMetaData> {
        self.schema(database, schema)?.table(table)
    }

    /// Finds the table owning `index` within one schema.
    pub fn find_table_by_index(
        &self,
        database: &str,
        schema: &str,
        index: &str,
    ) -> Option<&TableMetaData> {
        self.schema(database, schema)?
            .tables
            .iter()
            .find(|t| t.contains_index(index))
    }

    fn default_schema(&self) -> Option<&SchemaMetaData> {
        let db = self.database(&self.default_database)?;
        db.schema(&db.default_schema)
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// Looks a table up in the default database and schema.
    pub fn table(&self, name: &str) -> Option<&TableMetaData> {
        self.default_schema()?.table(name)
    }

    pub fn is_generated(&self, table: &str, column: &str) -> bool {
        self.table(table).is_some_and(|t| t.is_generated(column))
    }

    pub fn visible_column_names(&self, table: &str) -> Vec<String> {
        self.table(table)
            .map(|t| t.visible_column_names())
            .unwrap_or_default()
    }

    pub fn put_database(&mut self, database: DatabaseMetaData) {
        match self
            .databases
            .iter_mut()
            .find(|d| d.name.eq_ignore_ascii_case(&database.name))
        {
            Some(existing) => *existing = database,
            None => self.databases.push(database),
        }
    }

    pub fn put_table(&mut self, database: &str, schema: &str, table: TableMetaData) -> Result<()> {
        let db = self
            .databases
            .iter_mut()
            .find(|d| d.name.eq_ignore_ascii_case(database))
            .ok_or_else(|| ShardError::Config(format!("database '{database}' does not exist")))?;
        match db.schema_mut(schema) {
            Some(s) => s.put_table(table),
            None => {
                let mut s = SchemaMetaData::new(schema);
                s.put_table(table);
                db.schemas.push(s);
            }
        }
        Ok(())
    }

    pub fn remove_table(&mut self, database: &str, schema: &str, table: &str) -> bool {
        self.databases
            .iter_mut()
            .find(|d| d.name.eq_ignore_ascii_case(database))
            .and_then(|d| d.schema_mut(schema))
            .and_then(|s| s.remove_table(table))
            .is_some()
    }
}

/// Publishes metadata snapshots copy-on-write.
///
/// Readers take an `Arc` and keep a consistent view for the duration of one statement
/// even when a newer snapshot is published concurrently.
#[derive(Debug)]
pub struct MetaDataRegistry {
    current: RwLock<Arc<MetaDataSnapshot>>,
}

impl MetaDataRegistry {
    pub fn new(snapshot: MetaDataSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<MetaDataSnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Replaces the current snapshot; the published version is always increasing.
    pub fn publish(&self, mut snapshot: MetaDataSnapshot) -> Arc<MetaDataSnapshot> {
        let mut current = self.current.write();
        snapshot.version = current.version.saturating_add(1).max(snapshot.version);
        let published = Arc::new(snapshot);
        *current = Arc::clone(&published);
        published
    }

    /// Applies `change` to a copy of the current snapshot and publishes it.
    ///
    /// The write lock is held across the change so concurrent alters serialize.
    pub fn alter<F>(&self, change: F) -> Result<Arc<MetaDataSnapshot>>
    where
        F: FnOnce(&mut MetaDataSnapshot) -> Result<()>,
    {
        let mut current = self.current.write();
        let mut next = MetaDataSnapshot::clone(&current);
        change(&mut next)?;
        next.version = current.version.saturating_add(1);
        let published = Arc::new(next);
        *current = Arc::clone(&published);
        Ok(published)
    }
}
