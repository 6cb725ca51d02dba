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

use crate::error::Result;
use crate::merge::result::QueryResult;
use crate::rule::EncryptColumn;
use crate::types::Value;

/// Decrypts projected columns read from cipher columns.
pub struct DecryptResult {
    inner: Box<dyn QueryResult>,
    /// Per output column: the table and encrypted column it was read from.
    columns: Vec<Option<(String, EncryptColumn)>>,
}

impl DecryptResult {
    pub fn new(inner: Box<dyn QueryResult>, columns: Vec<Option<(String, EncryptColumn)>>) -> Self {
        Self { inner, columns }
    }
}

impl QueryResult for DecryptResult {
    fn next(&mut self) -> Result<bool> {
        self.inner.next()
    }

    fn value(&self, column: usize) -> Result<Value> {
        let value = self.inner.value(column)?;
        match self.columns.get(column) {
            Some(Some((table, encrypt))) => encrypt.decrypt(table, &value),
            _ => Ok(value),
        }
    }

    fn column_count(&self) -> usize {
        self.inner.column_count()
    }

    fn column_label(&self, column: usize) -> Result<String> {
        self.inner.column_label(column)
    }
}
