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

use crate::rule::DataNode;
use std::collections::BTreeMap;
use std::fmt;

/// One data source with the actual table chosen for each logic table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteUnit {
    pub data_source: String,
    /// Lower-case logic table name to actual table name.
    tables: BTreeMap<String, String>,
}

impl RouteUnit {
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            tables: BTreeMap::new(),
        }
    }

    pub fn with_table(mut self, logic: &str, actual: impl Into<String>) -> Self {
        self.map_table(logic, actual);
        self
    }

    pub fn map_table(&mut self, logic: &str, actual: impl Into<String>) {
        self.tables.insert(logic.to_ascii_lowercase(), actual.into());
    }

    pub fn actual_table(&self, logic: &str) -> Option<&str> {
        self.tables
            .get(&logic.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn contains_logic_table(&self, logic: &str) -> bool {
        self.tables.contains_key(&logic.to_ascii_lowercase())
    }

    pub fn table_mappings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tables.iter().map(|(l, a)| (l.as_str(), a.as_str()))
    }

    pub fn data_node(&self, logic: &str) -> Option<DataNode> {
        self.actual_table(logic)
            .map(|actual| DataNode::new(self.data_source.clone(), actual))
    }
}

impl fmt::Display for RouteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data_source)?;
        let mut first = true;
        for (logic, actual) in &self.tables {
            f.write_str(if first { ": " } else { ", " })?;
            write!(f, "{logic} -> {actual}")?;
            first = false;
        }
        Ok(())
    }
}

/// Sorted, duplicate-free route units.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutePlan {
    units: Vec<RouteUnit>,
}

impl RoutePlan {
    pub fn new(mut units: Vec<RouteUnit>) -> Self {
        units.sort();
        units.dedup();
        Self { units }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn units(&self) -> &[RouteUnit] {
        &self.units
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn data_sources(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.units.iter().map(|u| u.data_source.as_str()).collect();
        out.dedup();
        out
    }

    /// Actual tables chosen for `logic` across all units, in unit order.
    pub fn actual_tables(&self, logic: &str) -> Vec<DataNode> {
        self.units.iter().filter_map(|u| u.data_node(logic)).collect()
    }
}
