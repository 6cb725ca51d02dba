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

//! Parameter lists of rewritten statements.

use crate::types::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Edits applied to one original parameter sequence.
///
/// Removed and replaced indices address the original sequence. Added indices
/// address the output sequence and are applied in ascending order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterBuilder {
    original: Vec<Value>,
    added: BTreeMap<usize, Vec<Value>>,
    removed: BTreeSet<usize>,
    replaced: BTreeMap<usize, Value>,
}

impl ParameterBuilder {
    pub fn new(original: Vec<Value>) -> Self {
        Self {
            original,
            ..Self::default()
        }
    }

    pub fn original(&self) -> &[Value] {
        &self.original
    }

    pub fn add(&mut self, output_index: usize, value: Value) {
        self.added.entry(output_index).or_default().push(value);
    }

    pub fn remove(&mut self, original_index: usize) {
        self.removed.insert(original_index);
    }

    pub fn replace(&mut self, original_index: usize, value: Value) {
        self.replaced.insert(original_index, value);
    }

    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.replaced.is_empty()
    }

    pub fn build(&self) -> Vec<Value> {
        let mut out: Vec<Value> = self
            .original
            .iter()
            .enumerate()
            .filter(|(idx, _)| !self.removed.contains(idx))
            .map(|(idx, v)| self.replaced.get(&idx).unwrap_or(v).clone())
            .collect();
        for (index, values) in &self.added {
            let at = (*index).min(out.len());
            for (offset, value) in values.iter().enumerate() {
                out.insert(at + offset, value.clone());
            }
        }
        out
    }
}

/// Parameters of an INSERT whose value groups are distributed across route units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedParameterBuilder {
    /// Parameters ahead of the first value group.
    pub before: ParameterBuilder,
    pub groups: Vec<ParameterBuilder>,
    /// Parameters after the last value group, such as ON DUPLICATE KEY UPDATE.
    pub after: ParameterBuilder,
}

impl GroupedParameterBuilder {
    /// Parameters for a unit receiving the groups accepted by `include`.
    pub fn build<F>(&self, include: F) -> Vec<Value>
    where
        F: Fn(usize) -> bool,
    {
        let mut out = self.before.build();
        for (idx, group) in self.groups.iter().enumerate() {
            if include(idx) {
                out.extend(group.build());
            }
        }
        out.extend(self.after.build());
        out
    }

    pub fn build_all(&self) -> Vec<Value> {
        self.build(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::Int64).collect()
    }

    #[test]
    fn unchanged_builder_returns_input() {
        let builder = ParameterBuilder::new(ints(&[1, 2, 3]));
        assert!(builder.is_unchanged());
        assert_eq!(builder.build(), ints(&[1, 2, 3]));
    }

    #[test]
    fn removed_indices_address_the_original_sequence() {
        let mut builder = ParameterBuilder::new(ints(&[10, 20, 30, 40]));
        builder.remove(1);
        builder.remove(3);
        builder.replace(2, Value::Int64(33));
        assert_eq!(builder.build(), ints(&[10, 33]));
    }

    #[test]
    fn added_indices_address_the_output_sequence() {
        let mut builder = ParameterBuilder::new(ints(&[10, 20, 30]));
        builder.remove(0);
        builder.add(1, Value::Int64(21));
        builder.add(3, Value::Int64(31));
        builder.add(3, Value::Int64(32));
        assert_eq!(builder.build(), ints(&[20, 21, 30, 31, 32]));
    }

    #[test]
    fn grouped_builder_filters_groups() {
        let grouped = GroupedParameterBuilder {
            before: ParameterBuilder::new(ints(&[0])),
            groups: vec![
                ParameterBuilder::new(ints(&[1, 2])),
                ParameterBuilder::new(ints(&[3, 4])),
            ],
            after: ParameterBuilder::new(ints(&[5])),
        };
        assert_eq!(grouped.build(|g| g == 1), ints(&[0, 3, 4, 5]));
        assert_eq!(grouped.build_all(), ints(&[0, 1, 2, 3, 4, 5]));
    }
}
