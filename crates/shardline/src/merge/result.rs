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

use crate::error::{MergeError, Result, ShardError};
use crate::types::Value;

/// One physical result stream, implemented by the executor.
///
/// `next` advances to the following row and returns `false` once the stream is
/// drained. Cells of the current row are read with `value`.
pub trait QueryResult {
    fn next(&mut self) -> Result<bool>;
    fn value(&self, column: usize) -> Result<Value>;
    fn column_count(&self) -> usize;
    fn column_label(&self, column: usize) -> Result<String>;
}

impl<T: QueryResult + ?Sized> QueryResult for Box<T> {
    fn next(&mut self) -> Result<bool> {
        (**self).next()
    }

    fn value(&self, column: usize) -> Result<Value> {
        (**self).value(column)
    }

    fn column_count(&self) -> usize {
        (**self).column_count()
    }

    fn column_label(&self, column: usize) -> Result<String> {
        (**self).column_label(column)
    }
}

/// Rows held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueryResult {
    labels: Vec<String>,
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
}

impl MemoryQueryResult {
    pub fn new(labels: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            labels,
            rows,
            position: None,
        }
    }

    /// Drains `source` into memory.
    pub fn buffer(source: &mut dyn QueryResult) -> Result<Self> {
        let count = source.column_count();
        let labels = (0..count)
            .map(|c| source.column_label(c))
            .collect::<Result<Vec<_>>>()?;
        let mut rows = Vec::new();
        while source.next()? {
            rows.push((0..count).map(|c| source.value(c)).collect::<Result<Vec<_>>>()?);
        }
        Ok(Self::new(labels, rows))
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    fn current(&self) -> Result<&[Value]> {
        self.position
            .and_then(|p| self.rows.get(p))
            .map(Vec::as_slice)
            .ok_or(ShardError::Merge(MergeError::NoCurrentRow))
    }
}

impl QueryResult for MemoryQueryResult {
    fn next(&mut self) -> Result<bool> {
        let next = self.position.map_or(0, |p| p + 1).min(self.rows.len());
        self.position = Some(next);
        Ok(next < self.rows.len())
    }

    fn value(&self, column: usize) -> Result<Value> {
        self.current()?
            .get(column)
            .cloned()
            .ok_or(ShardError::Merge(MergeError::ColumnOutOfRange(column)))
    }

    fn column_count(&self) -> usize {
        self.labels.len()
    }

    fn column_label(&self, column: usize) -> Result<String> {
        self.labels
            .get(column)
            .cloned()
            .ok_or(ShardError::Merge(MergeError::ColumnOutOfRange(column)))
    }
}

/// Result of target `target`; failures of the underlying stream are reported as
/// [`MergeError::TargetFailed`].
pub struct TargetResult {
    target: usize,
    result: Box<dyn QueryResult>,
}

impl TargetResult {
    pub fn new(target: usize, result: Box<dyn QueryResult>) -> Self {
        Self { target, result }
    }

    pub fn target(&self) -> usize {
        self.target
    }

    fn failed(&self, err: ShardError) -> ShardError {
        match err {
            ShardError::Merge(_) => err,
            other => ShardError::Merge(MergeError::TargetFailed {
                target: self.target,
                message: other.to_string(),
            }),
        }
    }
}

impl QueryResult for TargetResult {
    fn next(&mut self) -> Result<bool> {
        self.result.next().map_err(|e| self.failed(e))
    }

    fn value(&self, column: usize) -> Result<Value> {
        self.result.value(column).map_err(|e| self.failed(e))
    }

    fn column_count(&self) -> usize {
        self.result.column_count()
    }

    fn column_label(&self, column: usize) -> Result<String> {
        self.result.column_label(column)
    }
}
