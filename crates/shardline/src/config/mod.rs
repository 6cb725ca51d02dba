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

//! Declarative rule configuration, loaded from JSON or built in code.

use crate::error::{Result, ShardError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfiguration {
    pub data_sources: Vec<String>,
    #[serde(default)]
    pub sharding: ShardingRuleConfig,
    #[serde(default)]
    pub encrypt: EncryptRuleConfig,
    #[serde(default)]
    pub props: ShardingProps,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardingRuleConfig {
    #[serde(default)]
    pub tables: BTreeMap<String, TableRuleConfig>,
    #[serde(default)]
    pub binding_groups: Vec<Vec<String>>,
    #[serde(default)]
    pub broadcast_tables: Vec<String>,
    #[serde(default)]
    pub default_database_strategy: Option<ShardingStrategyConfig>,
    #[serde(default)]
    pub default_table_strategy: Option<ShardingStrategyConfig>,
    #[serde(default)]
    pub default_key_generator: Option<String>,
    #[serde(default)]
    pub sharding_algorithms: BTreeMap<String, AlgorithmConfig>,
    #[serde(default)]
    pub key_generators: BTreeMap<String, AlgorithmConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRuleConfig {
    /// Inline expression such as `ds_${0..1}.t_order_${0..3}`; defaults to the logic
    /// table in every data source.
    #[serde(default)]
    pub actual_data_nodes: Option<String>,
    #[serde(default)]
    pub database_strategy: Option<ShardingStrategyConfig>,
    #[serde(default)]
    pub table_strategy: Option<ShardingStrategyConfig>,
    #[serde(default)]
    pub key_generate: Option<KeyGenerateConfig>,
    /// Columns that only steer routing and are stripped from INSERT statements.
    #[serde(default)]
    pub virtual_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardingStrategyConfig {
    Standard {
        sharding_column: String,
        algorithm: String,
    },
    Complex {
        sharding_columns: Vec<String>,
        algorithm: String,
    },
    Hint {
        algorithm: String,
    },
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyGenerateConfig {
    pub column: String,
    pub generator: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub props: AlgorithmProps,
}

impl AlgorithmConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            props: AlgorithmProps::default(),
        }
    }

    pub fn with_prop(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.props.0.insert(key.to_string(), value.into());
        self
    }
}

/// Free-form algorithm properties with typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlgorithmProps(pub BTreeMap<String, serde_json::Value>);

impl AlgorithmProps {
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn require_str(&self, key: &str) -> Result<String> {
        self.get_str(key)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ShardError::Config(format!("algorithm property '{key}' is required")))
    }

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.0.get(key) {
            None => Ok(None),
            Some(serde_json::Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| ShardError::Config(format!("property '{key}' must be an integer"))),
            Some(serde_json::Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| ShardError::Config(format!("property '{key}' must be an integer"))),
            Some(_) => Err(ShardError::Config(format!(
                "property '{key}' must be an integer"
            ))),
        }
    }

    pub fn get_bool(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s == "1" || s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncryptRuleConfig {
    #[serde(default)]
    pub tables: BTreeMap<String, EncryptTableConfig>,
    #[serde(default)]
    pub encryptors: BTreeMap<String, AlgorithmConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncryptTableConfig {
    pub columns: BTreeMap<String, EncryptColumnConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptColumnConfig {
    pub cipher: String,
    pub encryptor: String,
    #[serde(default)]
    pub assisted_query: Option<String>,
    #[serde(default)]
    pub assisted_query_encryptor: Option<String>,
    #[serde(default)]
    pub plain: Option<String>,
}

/// What to do with UPDATE/DELETE statements that carry no usable sharding predicate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FullRouteDmlPolicy {
    /// Send the statement to every physical table of the logic table.
    #[default]
    Broadcast,
    /// Refuse to route the statement.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteCacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_route_cache_capacity")]
    pub capacity: usize,
}

impl Default for RouteCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_route_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingProps {
    #[serde(default)]
    pub sql_show: bool,
    #[serde(default)]
    pub full_route_dml: FullRouteDmlPolicy,
    #[serde(default)]
    pub route_cache: RouteCacheConfig,
    #[serde(default = "default_true")]
    pub merge_conditions: bool,
    /// Target for statements that touch no governed table.
    #[serde(default)]
    pub default_data_source: Option<String>,
    /// Upper bound on OR-expanded predicate groups before a statement is routed unconditionally.
    #[serde(default = "default_max_condition_groups")]
    pub max_condition_groups: usize,
}

impl Default for ShardingProps {
    fn default() -> Self {
        Self {
            sql_show: false,
            full_route_dml: FullRouteDmlPolicy::default(),
            route_cache: RouteCacheConfig::default(),
            merge_conditions: true,
            default_data_source: None,
            max_condition_groups: default_max_condition_groups(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_route_cache_capacity() -> usize {
    1024
}

fn default_max_condition_groups() -> usize {
    64
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

impl ShardingProps {
    /// Applies `SHARDLINE_SQL_SHOW` and `SHARDLINE_ROUTE_CACHE` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Some(show) = env_flag("SHARDLINE_SQL_SHOW") {
            self.sql_show = show;
        }
        if let Some(enabled) = env_flag("SHARDLINE_ROUTE_CACHE") {
            self.route_cache.enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.route_cache.enabled && self.route_cache.capacity == 0 {
            return Err(ShardError::Config(
                "route_cache.capacity must be > 0".to_string(),
            ));
        }
        if self.max_condition_groups == 0 {
            return Err(ShardError::Config(
                "max_condition_groups must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl RuleConfiguration {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: RuleConfiguration = serde_json::from_str(text)
            .map_err(|e| ShardError::Config(format!("invalid rule configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Checks references between sections; algorithm properties are checked when
    /// the rule set is built.
    pub fn validate(&self) -> Result<()> {
        if self.data_sources.is_empty() {
            return Err(ShardError::Config(
                "at least one data source is required".to_string(),
            ));
        }
        if self.data_sources.iter().any(|ds| ds.trim().is_empty()) {
            return Err(ShardError::Config(
                "data source names cannot be empty".to_string(),
            ));
        }
        if let Some(ds) = &self.props.default_data_source {
            if !self.data_sources.iter().any(|d| d == ds) {
                return Err(ShardError::Config(format!(
                    "default data source '{ds}' is not declared"
                )));
            }
        }
        self.props.validate()?;

        let sharding = &self.sharding;
        let strategies = sharding
            .tables
            .values()
            .flat_map(|t| [t.database_strategy.as_ref(), t.table_strategy.as_ref()])
            .chain([
                sharding.default_database_strategy.as_ref(),
                sharding.default_table_strategy.as_ref(),
            ])
            .flatten();
        for strategy in strategies {
            let algorithm = match strategy {
                ShardingStrategyConfig::Standard { algorithm, .. }
                | ShardingStrategyConfig::Complex { algorithm, .. }
                | ShardingStrategyConfig::Hint { algorithm } => algorithm,
                ShardingStrategyConfig::None => continue,
            };
            if !sharding.sharding_algorithms.contains_key(algorithm) {
                return Err(ShardError::Config(format!(
                    "sharding algorithm '{algorithm}' is not declared"
                )));
            }
        }
        for (table, rule) in &sharding.tables {
            if let Some(key) = &rule.key_generate {
                if !sharding.key_generators.contains_key(&key.generator) {
                    return Err(ShardError::Config(format!(
                        "key generator '{}' of table '{table}' is not declared",
                        key.generator
                    )));
                }
            }
        }
        for group in &sharding.binding_groups {
            for table in group {
                if !sharding
                    .tables
                    .keys()
                    .any(|t| t.eq_ignore_ascii_case(table))
                {
                    return Err(ShardError::Config(format!(
                        "binding table '{table}' is not a sharding table"
                    )));
                }
            }
        }
        for (table, config) in &self.encrypt.tables {
            for (column, column_config) in &config.columns {
                let encryptors = std::iter::once(&column_config.encryptor)
                    .chain(column_config.assisted_query_encryptor.as_ref());
                for name in encryptors {
                    if !self.encrypt.encryptors.contains_key(name) {
                        return Err(ShardError::Config(format!(
                            "encryptor '{name}' of column '{table}.{column}' is not declared"
                        )));
                    }
                }
                if column_config.assisted_query.is_some()
                    && column_config.assisted_query_encryptor.is_none()
                {
                    return Err(ShardError::Config(format!(
                        "assisted query column of '{table}.{column}' needs an encryptor"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
