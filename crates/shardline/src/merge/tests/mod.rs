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
use crate::merge::{MemoryQueryResult, MergedResult, QueryResult};
use crate::types::Value;


pub(super) fn memory(labels: &[&str], rows: Vec<Vec<Value>>) -> Box<dyn QueryResult> {
    Box::new(MemoryQueryResult::new(
        labels.iter().map(|l| l.to_string()).collect(),
        rows,
    ))
}

pub(super) fn int_rows(rows: &[&[i64]]) -> Vec<Vec<Value>> {
    rows.iter()
        .map(|row| row.iter().copied().map(Value::Int64).collect())
        .collect()
}

pub(super) fn drain(merged: &mut MergedResult) -> Vec<Vec<Value>> {
    let mut out = Vec::new();
    while merged.next().expect("advance") {
        out.push(merged.row().expect("row"));
    }
    out
}

/// Yields `rows` rows of a single column, then fails.
pub(super) struct FailingResult {
    pub rows: usize,
    pub served: usize,
}

impl QueryResult for FailingResult {
    fn next(&mut self) -> Result<bool> {
        if self.served == self.rows {
            return Err(ShardError::Execution("connection reset".into()));
        }
        self.served += 1;
        Ok(true)
    }

    fn value(&self, _column: usize) -> Result<Value> {
        Ok(Value::Int64(self.served as i64))
    }

    fn column_count(&self) -> usize {
        1
    }

    fn column_label(&self, _column: usize) -> Result<String> {
        Ok("order_id".into())
    }
}
