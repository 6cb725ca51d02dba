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

//! Merging: one logical cursor over the results of every execution unit.

pub mod decrypt;
pub mod describe;
pub mod result;
pub mod stream;

pub use decrypt::DecryptResult;
pub use describe::DescribeResult;
pub use result::{MemoryQueryResult, QueryResult, TargetResult};
pub use stream::{sort_keys, IteratorStreamResult, OrderByStreamResult};

use crate::binder::{BoundStatementContext, DalKind, StatementKind};
use crate::error::{MergeError, Result, ShardError};
use crate::rule::RuleSet;
use crate::types::Value;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Unconsumed,
    Iterating,
    Exhausted,
}

/// The logical result handed to the front end.
pub struct MergedResult {
    inner: Box<dyn QueryResult>,
    state: CursorState,
}

impl MergedResult {
    fn new(inner: Box<dyn QueryResult>) -> Self {
        Self {
            inner,
            state: CursorState::Unconsumed,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Advances to the next row. Advancing past the end is an error, and so is any
    /// advance after a target failed.
    pub fn next(&mut self) -> Result<bool> {
        if self.state == CursorState::Exhausted {
            return Err(ShardError::Merge(MergeError::CursorExhausted));
        }
        match self.inner.next() {
            Ok(true) => {
                self.state = CursorState::Iterating;
                Ok(true)
            }
            Ok(false) => {
                self.state = CursorState::Exhausted;
                Ok(false)
            }
            Err(err) => {
                self.state = CursorState::Exhausted;
                Err(err)
            }
        }
    }

    pub fn value(&self, column: usize) -> Result<Value> {
        if self.state != CursorState::Iterating {
            return Err(ShardError::Merge(MergeError::NoCurrentRow));
        }
        if column >= self.inner.column_count() {
            return Err(ShardError::Merge(MergeError::ColumnOutOfRange(column)));
        }
        self.inner.value(column)
    }

    /// Every cell of the current row.
    pub fn row(&self) -> Result<Vec<Value>> {
        (0..self.column_count()).map(|c| self.value(c)).collect()
    }

    pub fn column_count(&self) -> usize {
        self.inner.column_count()
    }

    pub fn column_label(&self, column: usize) -> Result<String> {
        self.inner.column_label(column)
    }
}

pub struct MergeEngine<'a> {
    rules: &'a RuleSet,
}

impl<'a> MergeEngine<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self { rules }
    }

    /// Merges one result per execution unit, in execution unit order.
    pub fn merge(
        &self,
        results: Vec<Box<dyn QueryResult>>,
        ctx: &BoundStatementContext,
    ) -> Result<MergedResult> {
        let mut sources = results
            .into_iter()
            .enumerate()
            .map(|(target, result)| TargetResult::new(target, result))
            .collect::<Vec<_>>();
        if let Some(first) = sources.first() {
            let expected = first.column_count();
            if let Some(other) = sources.iter().find(|s| s.column_count() != expected) {
                return Err(ShardError::Merge(MergeError::IncompatibleColumns {
                    target: other.target(),
                    expected,
                    actual: other.column_count(),
                }));
            }
        }

        let count = sources.len();
        let keys = match ctx.kind() {
            StatementKind::Select => sort_keys(ctx.order_by()).filter(|k| !k.is_empty()),
            _ => None,
        };
        let mut merged: Box<dyn QueryResult> = match keys {
            _ if count == 1 => Box::new(sources.remove(0)),
            Some(keys) => Box::new(OrderByStreamResult::new(sources, keys)),
            None => Box::new(IteratorStreamResult::new(sources)),
        };

        let encrypt_table = ctx
            .tables()
            .primary_table()
            .and_then(|t| self.rules.encrypt.find_table(t));
        match (ctx.kind(), encrypt_table) {
            (StatementKind::Dal(DalKind::Describe | DalKind::ShowColumns), Some(table)) => {
                merged = Box::new(DescribeResult::new(table.clone(), merged));
            }
            (StatementKind::Select, _) => {
                let columns = ctx
                    .projections()
                    .iter()
                    .map(|p| {
                        let origin = p.column.as_ref()?;
                        let column = self.rules.encrypt.find_column(&origin.table, &origin.column)?;
                        Some((origin.table.clone(), column.clone()))
                    })
                    .collect::<Vec<_>>();
                if columns.iter().any(Option::is_some) {
                    merged = Box::new(DecryptResult::new(merged, columns));
                }
            }
            _ => {}
        }
        debug!(targets = count, kind = ctx.kind().label(), "results merged");
        Ok(MergedResult::new(merged))
    }
}

#[cfg(test)]
mod tests;
