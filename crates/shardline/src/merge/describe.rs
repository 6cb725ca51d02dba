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

//! DESCRIBE and SHOW COLUMNS over encrypted tables.

use crate::error::Result;
use crate::merge::result::{MemoryQueryResult, QueryResult};
use crate::rule::EncryptTable;
use crate::types::Value;
use tracing::debug;

/// Hides derived columns and shows cipher columns under their logic name.
///
/// Rows are buffered on the first advance. Column 0 holds the field name.
pub struct DescribeResult {
    table: EncryptTable,
    source: Option<Box<dyn QueryResult>>,
    buffered: MemoryQueryResult,
}

impl DescribeResult {
    pub fn new(table: EncryptTable, source: Box<dyn QueryResult>) -> Self {
        Self {
            table,
            source: Some(source),
            buffered: MemoryQueryResult::default(),
        }
    }

    fn load(&mut self, mut source: Box<dyn QueryResult>) -> Result<()> {
        let all = MemoryQueryResult::buffer(source.as_mut())?;
        let total = all.rows().len();
        let labels = (0..all.column_count())
            .map(|c| all.column_label(c))
            .collect::<Result<Vec<_>>>()?;
        let rows = all
            .rows()
            .iter()
            .filter_map(|row| self.present(row))
            .collect::<Vec<_>>();
        debug!(
            table = %self.table.name,
            rows = total,
            kept = rows.len(),
            "describe rows rewritten"
        );
        self.buffered = MemoryQueryResult::new(labels, rows);
        Ok(())
    }

    fn present(&self, row: &[Value]) -> Option<Vec<Value>> {
        let Some(Value::Text(field)) = row.first() else {
            return Some(row.to_vec());
        };
        if self.table.is_assisted_query_column(field) || self.table.is_plain_column(field) {
            return None;
        }
        let mut row = row.to_vec();
        if let Some(logic) = self.table.logic_column_of_cipher(field) {
            row[0] = Value::Text(logic.to_string());
        }
        Some(row)
    }
}

impl QueryResult for DescribeResult {
    fn next(&mut self) -> Result<bool> {
        if let Some(source) = self.source.take() {
            self.load(source)?;
        }
        self.buffered.next()
    }

    fn value(&self, column: usize) -> Result<Value> {
        self.buffered.value(column)
    }

    fn column_count(&self) -> usize {
        match &self.source {
            Some(source) => source.column_count(),
            None => self.buffered.column_count(),
        }
    }

    fn column_label(&self, column: usize) -> Result<String> {
        match &self.source {
            Some(source) => source.column_label(column),
            None => self.buffered.column_label(column),
        }
    }
}
