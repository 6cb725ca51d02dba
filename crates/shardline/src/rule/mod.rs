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

pub mod algorithm;
pub mod encrypt;
pub mod inline;
pub mod sharding;

pub use algorithm::{
    AlgorithmRegistry, ComplexKeysShardingAlgorithm, ComplexKeysShardingValue,
    HintShardingAlgorithm, KeyGenerateAlgorithm, PreciseShardingValue, RangeShardingValue,
    ShardingValue, StandardShardingAlgorithm, ValueRange,
};
pub use encrypt::{
    AssistedEncryptAlgorithm, EncryptAlgorithm, EncryptColumn, EncryptContext, EncryptRule,
    EncryptTable,
};
pub use sharding::{DataNode, ShardingRule, ShardingStrategy, TableRule};

use crate::config::{RuleConfiguration, ShardingProps};
use crate::error::Result;

/// The complete rule set active for one activation; immutable once built.
#[derive(Debug, Clone)]
pub struct RuleSet {
    version: u64,
    data_sources: Vec<String>,
    pub sharding: ShardingRule,
    pub encrypt: EncryptRule,
    pub props: ShardingProps,
}

impl RuleSet {
    pub fn build(config: &RuleConfiguration, registry: &AlgorithmRegistry, version: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            version,
            data_sources: config.data_sources.clone(),
            sharding: ShardingRule::build(&config.sharding, &config.data_sources, registry)?,
            encrypt: EncryptRule::build(&config.encrypt, registry)?,
            props: config.props.clone(),
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn data_sources(&self) -> &[String] {
        &self.data_sources
    }

    /// Where statements touching no sharding table are sent.
    pub fn default_data_source(&self) -> Option<&str> {
        match &self.props.default_data_source {
            Some(ds) => Some(ds.as_str()),
            None if self.data_sources.len() == 1 => self.data_sources.first().map(String::as_str),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests;
