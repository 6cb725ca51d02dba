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

//! Streaming merges over several target results.

use crate::binder::OrderByItem;
use crate::error::{MergeError, Result, ShardError};
use crate::merge::result::{QueryResult, TargetResult};
use crate::types::Value;
use std::cmp::Ordering;

/// Drains targets one after another.
pub struct IteratorStreamResult {
    sources: Vec<TargetResult>,
    current: usize,
}

impl IteratorStreamResult {
    pub fn new(sources: Vec<TargetResult>) -> Self {
        Self {
            sources,
            current: 0,
        }
    }

    fn source(&self) -> Result<&TargetResult> {
        self.sources
            .get(self.current)
            .ok_or(ShardError::Merge(MergeError::NoCurrentRow))
    }
}

impl QueryResult for IteratorStreamResult {
    fn next(&mut self) -> Result<bool> {
        while let Some(source) = self.sources.get_mut(self.current) {
            if source.next()? {
                return Ok(true);
            }
            self.current += 1;
        }
        Ok(false)
    }

    fn value(&self, column: usize) -> Result<Value> {
        self.source()?.value(column)
    }

    fn column_count(&self) -> usize {
        self.sources.first().map_or(0, TargetResult::column_count)
    }

    fn column_label(&self, column: usize) -> Result<String> {
        match self.sources.first() {
            Some(source) => source.column_label(column),
            None => Err(ShardError::Merge(MergeError::ColumnOutOfRange(column))),
        }
    }
}

/// K-way merge of targets that are each sorted by the same keys.
///
/// Every target holds its current row; the merged cursor yields the smallest one
/// and advances only that target. Ties go to the lower target index.
pub struct OrderByStreamResult {
    sources: Vec<TargetResult>,
    keys: Vec<(usize, bool)>,
    has_row: Vec<bool>,
    current: Option<usize>,
    primed: bool,
}

impl OrderByStreamResult {
    /// `keys` are `(output column, ascending)` pairs.
    pub fn new(sources: Vec<TargetResult>, keys: Vec<(usize, bool)>) -> Self {
        let has_row = vec![false; sources.len()];
        Self {
            sources,
            keys,
            has_row,
            current: None,
            primed: false,
        }
    }

    fn compare(&self, left: usize, right: usize) -> Result<Ordering> {
        for (column, ascending) in &self.keys {
            let a = self.sources[left].value(*column)?;
            let b = self.sources[right].value(*column)?;
            let ord = compare_nulls_first(&a, &b)?;
            if ord != Ordering::Equal {
                return Ok(if *ascending { ord } else { ord.reverse() });
            }
        }
        Ok(Ordering::Equal)
    }
}

impl QueryResult for OrderByStreamResult {
    fn next(&mut self) -> Result<bool> {
        if !self.primed {
            for (idx, source) in self.sources.iter_mut().enumerate() {
                self.has_row[idx] = source.next()?;
            }
            self.primed = true;
        } else if let Some(idx) = self.current {
            self.has_row[idx] = self.sources[idx].next()?;
        }

        let mut best: Option<usize> = None;
        for idx in (0..self.sources.len()).filter(|i| self.has_row[*i]) {
            best = match best {
                Some(b) if self.compare(idx, b)? != Ordering::Less => Some(b),
                _ => Some(idx),
            };
        }
        self.current = best;
        Ok(best.is_some())
    }

    fn value(&self, column: usize) -> Result<Value> {
        match self.current {
            Some(idx) => self.sources[idx].value(column),
            None => Err(ShardError::Merge(MergeError::NoCurrentRow)),
        }
    }

    fn column_count(&self) -> usize {
        self.sources.first().map_or(0, TargetResult::column_count)
    }

    fn column_label(&self, column: usize) -> Result<String> {
        match self.sources.first() {
            Some(source) => source.column_label(column),
            None => Err(ShardError::Merge(MergeError::ColumnOutOfRange(column))),
        }
    }
}

/// Merge keys of an ORDER BY; `None` when some key is not a projected column.
pub fn sort_keys(order_by: &[OrderByItem]) -> Option<Vec<(usize, bool)>> {
    order_by
        .iter()
        .map(|item| item.index.map(|idx| (idx, item.ascending)))
        .collect()
}

/// NULL sorts before every other value.
fn compare_nulls_first(left: &Value, right: &Value) -> Result<Ordering> {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ok(Ordering::Equal),
        (true, false) => Ok(Ordering::Less),
        (false, true) => Ok(Ordering::Greater),
        (false, false) => left.compare(right),
    }
}
