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

use crate::config::{AlgorithmConfig, ShardingRuleConfig, ShardingStrategyConfig};
use crate::error::{Result, ShardError};
use crate::rule::algorithm::{
    AlgorithmRegistry, ComplexKeysShardingAlgorithm, ComplexKeysShardingValue,
    HintShardingAlgorithm, KeyGenerateAlgorithm, PreciseShardingValue, RangeShardingValue,
    ShardingValue, StandardShardingAlgorithm,
};
use crate::rule::inline::expand_all;
use crate::types::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// One physical table in one data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            table: table.into(),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let (ds, table) = text
            .trim()
            .split_once('.')
            .filter(|(ds, table)| !ds.is_empty() && !table.is_empty() && !table.contains('.'))
            .ok_or_else(|| {
                ShardError::Config(format!(
                    "invalid data node '{text}', expected '<data_source>.<table>'"
                ))
            })?;
        Ok(Self::new(ds, table))
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

#[derive(Debug, Clone)]
pub enum ShardingStrategy {
    Standard {
        column: String,
        algorithm: Arc<dyn StandardShardingAlgorithm>,
    },
    Complex {
        columns: Vec<String>,
        algorithm: Arc<dyn ComplexKeysShardingAlgorithm>,
    },
    Hint {
        algorithm: Arc<dyn HintShardingAlgorithm>,
    },
    None,
}

impl ShardingStrategy {
    fn build(
        config: Option<&ShardingStrategyConfig>,
        algorithms: &BTreeMap<String, AlgorithmConfig>,
        registry: &AlgorithmRegistry,
    ) -> Result<Self> {
        let lookup = |name: &str| {
            algorithms.get(name).ok_or_else(|| {
                ShardError::Config(format!("sharding algorithm '{name}' is not declared"))
            })
        };
        Ok(match config {
            None | Some(ShardingStrategyConfig::None) => Self::None,
            Some(ShardingStrategyConfig::Standard {
                sharding_column,
                algorithm,
            }) => Self::Standard {
                column: sharding_column.clone(),
                algorithm: registry.create_standard(lookup(algorithm)?)?,
            },
            Some(ShardingStrategyConfig::Complex {
                sharding_columns,
                algorithm,
            }) => Self::Complex {
                columns: sharding_columns.clone(),
                algorithm: registry.create_complex(lookup(algorithm)?)?,
            },
            Some(ShardingStrategyConfig::Hint { algorithm }) => Self::Hint {
                algorithm: registry.create_hint(lookup(algorithm)?)?,
            },
        })
    }

    pub fn sharding_columns(&self) -> Vec<&str> {
        match self {
            Self::Standard { column, .. } => vec![column.as_str()],
            Self::Complex { columns, .. } => columns.iter().map(String::as_str).collect(),
            Self::Hint { .. } | Self::None => Vec::new(),
        }
    }

    pub fn is_hint(&self) -> bool {
        matches!(self, Self::Hint { .. })
    }

    /// Narrows `targets` using column constraints keyed by lower-case column name.
    /// Missing constraints leave every target in play.
    pub fn do_sharding(
        &self,
        targets: &[String],
        logic_table: &str,
        values: &BTreeMap<String, ShardingValue>,
    ) -> Result<Vec<String>> {
        match self {
            Self::Standard { column, algorithm } => {
                match values.get(&column.to_ascii_lowercase()) {
                    None => Ok(targets.to_vec()),
                    Some(ShardingValue::List(list)) => {
                        let mut out = BTreeSet::new();
                        for value in list {
                            let precise = PreciseShardingValue {
                                logic_table,
                                column,
                                value,
                            };
                            if let Some(target) = algorithm.do_precise_sharding(targets, &precise)? {
                                out.insert(target);
                            }
                        }
                        Ok(in_target_order(targets, &out))
                    }
                    Some(ShardingValue::Range(range)) => {
                        let range_value = RangeShardingValue {
                            logic_table,
                            column,
                            range,
                        };
                        let out = algorithm
                            .do_range_sharding(targets, &range_value)?
                            .into_iter()
                            .collect::<BTreeSet<_>>();
                        Ok(in_target_order(targets, &out))
                    }
                }
            }
            Self::Complex { columns, algorithm } => {
                let relevant = values
                    .iter()
                    .filter(|(k, _)| columns.iter().any(|c| c.eq_ignore_ascii_case(k)))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<BTreeMap<_, _>>();
                if relevant.is_empty() {
                    return Ok(targets.to_vec());
                }
                let out = algorithm
                    .do_sharding(
                        targets,
                        &ComplexKeysShardingValue {
                            logic_table,
                            values: &relevant,
                        },
                    )?
                    .into_iter()
                    .collect::<BTreeSet<_>>();
                Ok(in_target_order(targets, &out))
            }
            Self::Hint { .. } | Self::None => Ok(targets.to_vec()),
        }
    }

    /// Narrows `targets` with out-of-band hint values; no values keeps every target.
    pub fn do_hint_sharding(
        &self,
        targets: &[String],
        logic_table: &str,
        hint_values: &[Value],
    ) -> Result<Vec<String>> {
        if hint_values.is_empty() {
            return Ok(targets.to_vec());
        }
        match self {
            Self::Hint { algorithm } => {
                let out = algorithm
                    .do_sharding(targets, logic_table, hint_values)?
                    .into_iter()
                    .collect::<BTreeSet<_>>();
                Ok(in_target_order(targets, &out))
            }
            Self::Standard { column, .. } => {
                let mut values = BTreeMap::new();
                values.insert(
                    column.to_ascii_lowercase(),
                    ShardingValue::List(hint_values.to_vec()),
                );
                self.do_sharding(targets, logic_table, &values)
            }
            Self::Complex { .. } | Self::None => Ok(targets.to_vec()),
        }
    }
}

fn in_target_order(targets: &[String], selected: &BTreeSet<String>) -> Vec<String> {
    targets
        .iter()
        .filter(|t| selected.contains(*t))
        .cloned()
        .collect()
}

#[derive(Debug, Clone)]
pub struct KeyGenerate {
    pub column: String,
    pub generator: Arc<dyn KeyGenerateAlgorithm>,
}

#[derive(Debug, Clone)]
pub struct TableRule {
    pub logic_table: String,
    pub data_nodes: Vec<DataNode>,
    pub database_strategy: ShardingStrategy,
    pub table_strategy: ShardingStrategy,
    pub key_generate: Option<KeyGenerate>,
    pub virtual_columns: Vec<String>,
}

impl TableRule {
    /// Data sources holding at least one node, in configured order.
    pub fn data_sources(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for node in &self.data_nodes {
            if !out.contains(&node.data_source) {
                out.push(node.data_source.clone());
            }
        }
        out
    }

    pub fn actual_tables_in(&self, data_source: &str) -> Vec<String> {
        self.data_nodes
            .iter()
            .filter(|n| n.data_source == data_source)
            .map(|n| n.table.clone())
            .collect()
    }

    /// Position of an actual table among the tables of its data source.
    pub fn actual_table_index(&self, data_source: &str, table: &str) -> Option<usize> {
        self.actual_tables_in(data_source)
            .iter()
            .position(|t| t.eq_ignore_ascii_case(table))
    }

    pub fn contains_node(&self, data_source: &str, table: &str) -> bool {
        self.data_nodes
            .iter()
            .any(|n| n.data_source == data_source && n.table.eq_ignore_ascii_case(table))
    }

    pub fn sharding_columns(&self) -> Vec<&str> {
        let mut out = self.database_strategy.sharding_columns();
        for column in self.table_strategy.sharding_columns() {
            if !out.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                out.push(column);
            }
        }
        out
    }

    pub fn is_sharding_column(&self, column: &str) -> bool {
        self.sharding_columns()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }

    pub fn is_virtual_column(&self, column: &str) -> bool {
        self.virtual_columns
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }

    pub fn uses_hint(&self) -> bool {
        self.database_strategy.is_hint() || self.table_strategy.is_hint()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShardingRule {
    data_sources: Vec<String>,
    tables: BTreeMap<String, TableRule>,
    binding_groups: Vec<Vec<String>>,
    broadcast_tables: BTreeSet<String>,
    default_key_generator: Option<Arc<dyn KeyGenerateAlgorithm>>,
}

impl ShardingRule {
    pub fn build(
        config: &ShardingRuleConfig,
        data_sources: &[String],
        registry: &AlgorithmRegistry,
    ) -> Result<Self> {
        let mut tables = BTreeMap::new();
        for (logic_table, table_config) in &config.tables {
            let data_nodes = match &table_config.actual_data_nodes {
                Some(expr) => expand_all(expr)?
                    .iter()
                    .map(|n| DataNode::parse(n))
                    .collect::<Result<Vec<_>>>()?,
                None => data_sources
                    .iter()
                    .map(|ds| DataNode::new(ds.clone(), logic_table.clone()))
                    .collect(),
            };
            if data_nodes.is_empty() {
                return Err(ShardError::Config(format!(
                    "table '{logic_table}' has no data nodes"
                )));
            }
            if let Some(node) = data_nodes
                .iter()
                .find(|n| !data_sources.contains(&n.data_source))
            {
                return Err(ShardError::Config(format!(
                    "data node '{node}' of table '{logic_table}' uses an undeclared data source"
                )));
            }
            let database_strategy = ShardingStrategy::build(
                table_config
                    .database_strategy
                    .as_ref()
                    .or(config.default_database_strategy.as_ref()),
                &config.sharding_algorithms,
                registry,
            )?;
            let table_strategy = ShardingStrategy::build(
                table_config
                    .table_strategy
                    .as_ref()
                    .or(config.default_table_strategy.as_ref()),
                &config.sharding_algorithms,
                registry,
            )?;
            let key_generate = match &table_config.key_generate {
                Some(key) => {
                    let generator_config = config.key_generators.get(&key.generator).ok_or_else(
                        || {
                            ShardError::Config(format!(
                                "key generator '{}' is not declared",
                                key.generator
                            ))
                        },
                    )?;
                    Some(KeyGenerate {
                        column: key.column.clone(),
                        generator: registry.create_key_generator(generator_config)?,
                    })
                }
                None => None,
            };
            tables.insert(
                logic_table.to_ascii_lowercase(),
                TableRule {
                    logic_table: logic_table.clone(),
                    data_nodes,
                    database_strategy,
                    table_strategy,
                    key_generate,
                    virtual_columns: table_config.virtual_columns.clone(),
                },
            );
        }
        let default_key_generator = match &config.default_key_generator {
            Some(name) => {
                let generator_config = config.key_generators.get(name).ok_or_else(|| {
                    ShardError::Config(format!("key generator '{name}' is not declared"))
                })?;
                Some(registry.create_key_generator(generator_config)?)
            }
            None => None,
        };
        Ok(Self {
            data_sources: data_sources.to_vec(),
            tables,
            binding_groups: config
                .binding_groups
                .iter()
                .map(|g| g.iter().map(|t| t.to_ascii_lowercase()).collect())
                .collect(),
            broadcast_tables: config
                .broadcast_tables
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            default_key_generator,
        })
    }

    pub fn data_sources(&self) -> &[String] {
        &self.data_sources
    }

    pub fn table_rules(&self) -> impl Iterator<Item = &TableRule> {
        self.tables.values()
    }

    pub fn find_table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.tables.get(&logic_table.to_ascii_lowercase())
    }

    pub fn is_sharding_table(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_ascii_lowercase())
    }

    pub fn is_broadcast_table(&self, name: &str) -> bool {
        self.broadcast_tables.contains(&name.to_ascii_lowercase())
    }

    /// True when the table is managed by this rule at all.
    pub fn is_governed(&self, name: &str) -> bool {
        self.is_sharding_table(name) || self.is_broadcast_table(name)
    }

    pub fn is_all_broadcast(&self, names: &[String]) -> bool {
        !names.is_empty() && names.iter().all(|n| self.is_broadcast_table(n))
    }

    fn binding_group_index(&self, name: &str) -> Option<usize> {
        let lower = name.to_ascii_lowercase();
        self.binding_groups.iter().position(|g| g.contains(&lower))
    }

    /// True when every table is a sharding table and all of them share one binding group.
    pub fn is_all_binding(&self, names: &[String]) -> bool {
        match names {
            [] => false,
            [single] => self.is_sharding_table(single),
            [first, rest @ ..] => {
                let Some(group) = self.binding_group_index(first) else {
                    return false;
                };
                rest.iter()
                    .all(|n| self.binding_group_index(n) == Some(group))
            }
        }
    }

    pub fn is_binding_pair(&self, left: &str, right: &str) -> bool {
        left.eq_ignore_ascii_case(right)
            || matches!(
                (self.binding_group_index(left), self.binding_group_index(right)),
                (Some(a), Some(b)) if a == b
            )
    }

    pub fn is_sharding_column(&self, column: &str, table: &str) -> bool {
        self.find_table_rule(table)
            .is_some_and(|rule| rule.is_sharding_column(column))
    }

    /// Key generator for `column` of `table`, falling back to the default generator
    /// for sharding tables.
    pub fn find_key_generator(
        &self,
        table: &str,
        column: &str,
    ) -> Option<&Arc<dyn KeyGenerateAlgorithm>> {
        let rule = self.find_table_rule(table)?;
        match &rule.key_generate {
            Some(key) if key.column.eq_ignore_ascii_case(column) => Some(&key.generator),
            Some(_) => None,
            None => self.default_key_generator.as_ref(),
        }
    }

    pub fn key_generate_column(&self, table: &str) -> Option<&str> {
        self.find_table_rule(table)?
            .key_generate
            .as_ref()
            .map(|k| k.column.as_str())
    }
}
