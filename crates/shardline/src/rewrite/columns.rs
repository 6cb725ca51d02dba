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

//! INSERT column lists and the ordered transforms applied to them.
//!
//! Every transform takes the current [`ColumnList`] and returns the next one. Items
//! remember where they came from, so a transform finds columns by looking at the
//! list it was given instead of assuming the positions of the original statement.

use crate::error::Result;
use crate::rule::EncryptTable;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOrigin {
    /// Column `n` of the statement's effective column list.
    Original(usize),
    /// Cipher column replacing encrypted original column `n`.
    Cipher(usize),
    /// Assisted query column derived from original column `n`.
    AssistedQuery(usize),
    /// Plain copy of original column `n`.
    Plain(usize),
    /// Key column filled with generated values.
    GeneratedKey,
}

impl ColumnOrigin {
    /// Original column whose value this item is computed from.
    pub fn source(&self) -> Option<usize> {
        match self {
            ColumnOrigin::Original(n)
            | ColumnOrigin::Cipher(n)
            | ColumnOrigin::AssistedQuery(n)
            | ColumnOrigin::Plain(n) => Some(*n),
            ColumnOrigin::GeneratedKey => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnItem {
    pub name: String,
    pub origin: ColumnOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnList {
    items: Vec<ColumnItem>,
}

impl ColumnList {
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            items: names
                .iter()
                .enumerate()
                .map(|(idx, name)| ColumnItem {
                    name: name.as_ref().to_string(),
                    origin: ColumnOrigin::Original(idx),
                })
                .collect(),
        }
    }

    pub fn items(&self) -> &[ColumnItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.name.as_str()).collect()
    }

    /// Position of `name` in the current list.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub fn position_of(&self, origin: ColumnOrigin) -> Option<usize> {
        self.items.iter().position(|i| i.origin == origin)
    }

    /// True when every item is the original column at its original position.
    pub fn is_original(&self) -> bool {
        self.items
            .iter()
            .enumerate()
            .all(|(idx, i)| i.origin == ColumnOrigin::Original(idx))
    }

    /// Original columns no longer present.
    pub fn dropped_originals(&self, original_len: usize) -> Vec<usize> {
        (0..original_len)
            .filter(|n| {
                !self
                    .items
                    .iter()
                    .any(|i| matches!(i.origin, ColumnOrigin::Original(m) | ColumnOrigin::Cipher(m) if m == *n))
            })
            .collect()
    }

    fn insert(&mut self, at: usize, item: ColumnItem) {
        let at = at.min(self.items.len());
        self.items.insert(at, item);
    }
}

pub trait ColumnTransform {
    fn name(&self) -> &'static str;

    fn apply(&self, columns: ColumnList) -> Result<ColumnList>;
}

/// Drops routing-only columns that do not exist in the actual tables.
pub struct StripVirtualColumns<'a> {
    pub virtual_columns: &'a [String],
}

impl ColumnTransform for StripVirtualColumns<'_> {
    fn name(&self) -> &'static str {
        "strip_virtual_columns"
    }

    fn apply(&self, mut columns: ColumnList) -> Result<ColumnList> {
        columns.items.retain(|item| {
            !self
                .virtual_columns
                .iter()
                .any(|v| v.eq_ignore_ascii_case(&item.name))
        });
        Ok(columns)
    }
}

/// Swaps encrypted columns for their cipher column and adds the assisted query and
/// plain columns right after it.
pub struct EncryptColumns<'a> {
    pub table: &'a EncryptTable,
}

impl ColumnTransform for EncryptColumns<'_> {
    fn name(&self) -> &'static str {
        "encrypt_columns"
    }

    fn apply(&self, mut columns: ColumnList) -> Result<ColumnList> {
        let encrypted = columns
            .items
            .iter()
            .filter_map(|item| match item.origin {
                ColumnOrigin::Original(n) => self.table.find_column(&item.name).map(|c| (n, c)),
                _ => None,
            })
            .collect::<Vec<_>>();
        for (source, column) in encrypted {
            let Some(at) = columns.position_of(ColumnOrigin::Original(source)) else {
                continue;
            };
            columns.items[at] = ColumnItem {
                name: column.cipher.clone(),
                origin: ColumnOrigin::Cipher(source),
            };
            let mut next = at + 1;
            if let Some(assisted) = &column.assisted_query {
                columns.insert(
                    next,
                    ColumnItem {
                        name: assisted.clone(),
                        origin: ColumnOrigin::AssistedQuery(source),
                    },
                );
                next += 1;
            }
            if let Some(plain) = &column.plain {
                columns.insert(
                    next,
                    ColumnItem {
                        name: plain.clone(),
                        origin: ColumnOrigin::Plain(source),
                    },
                );
            }
        }
        Ok(columns)
    }
}

/// Appends the key column when its values are generated.
pub struct AppendGeneratedKey<'a> {
    pub column: &'a str,
}

impl ColumnTransform for AppendGeneratedKey<'_> {
    fn name(&self) -> &'static str {
        "append_generated_key"
    }

    fn apply(&self, mut columns: ColumnList) -> Result<ColumnList> {
        if columns.position(self.column).is_none() {
            columns.items.push(ColumnItem {
                name: self.column.to_string(),
                origin: ColumnOrigin::GeneratedKey,
            });
        }
        Ok(columns)
    }
}

/// Ordered column transforms.
#[derive(Default)]
pub struct ColumnPipeline<'a> {
    transforms: Vec<Box<dyn ColumnTransform + 'a>>,
}

impl<'a> ColumnPipeline<'a> {
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
        }
    }

    pub fn then(mut self, transform: impl ColumnTransform + 'a) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn run(&self, mut columns: ColumnList) -> Result<ColumnList> {
        for transform in &self.transforms {
            let before = columns.len();
            columns = transform.apply(columns)?;
            debug!(
                transform = transform.name(),
                before,
                after = columns.len(),
                "column transform applied"
            );
        }
        Ok(columns)
    }
}
