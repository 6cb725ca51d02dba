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

use crate::binder::SimpleTableSegment;
use std::collections::BTreeMap;

/// Deduplicated view of the tables a statement touches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TablesContext {
    table_names: Vec<String>,
    schema_names: Vec<String>,
    database_names: Vec<String>,
    subquery_projections: BTreeMap<String, Vec<String>>,
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        list.push(value.to_string());
    }
}

fn is_dual(name: &str) -> bool {
    name.eq_ignore_ascii_case("dual")
}

impl TablesContext {
    pub fn new(
        segments: &[SimpleTableSegment],
        extra_tables: &[String],
        subquery_projections: impl IntoIterator<Item = (String, Vec<String>)>,
    ) -> Self {
        let mut out = Self::default();
        for segment in segments {
            if is_dual(&segment.name) {
                continue;
            }
            push_unique(&mut out.table_names, &segment.name);
            match &segment.bound {
                Some(bound) => {
                    push_unique(&mut out.schema_names, &bound.schema);
                    push_unique(&mut out.database_names, &bound.database);
                }
                None => {
                    if let Some(owner) = &segment.owner {
                        push_unique(&mut out.schema_names, owner);
                        push_unique(&mut out.database_names, owner);
                    }
                }
            }
        }
        for table in extra_tables.iter().filter(|t| !is_dual(t)) {
            push_unique(&mut out.table_names, table);
        }
        for (alias, columns) in subquery_projections {
            out.subquery_projections
                .entry(alias.to_ascii_lowercase())
                .or_insert(columns);
        }
        out
    }

    pub fn table_names(&self) -> &[String] {
        &self.table_names
    }

    pub fn is_empty(&self) -> bool {
        self.table_names.is_empty()
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.table_names.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    pub fn primary_table(&self) -> Option<&str> {
        self.table_names.first().map(String::as_str)
    }

    pub fn schema_names(&self) -> &[String] {
        &self.schema_names
    }

    pub fn database_names(&self) -> &[String] {
        &self.database_names
    }

    /// Output columns of a derived table, keyed by its alias.
    pub fn subquery_projection(&self, alias: &str) -> Option<&[String]> {
        self.subquery_projections
            .get(&alias.to_ascii_lowercase())
            .map(Vec::as_slice)
    }
}
