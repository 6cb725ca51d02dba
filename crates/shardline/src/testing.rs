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

//! Shared rule and metadata fixture for unit tests.

use crate::binder::{BindOptions, Binder, BoundStatementContext, GeneratedKeyResolver};
use crate::config::{
    AlgorithmConfig, EncryptColumnConfig, EncryptTableConfig, KeyGenerateConfig,
    RuleConfiguration, ShardingStrategyConfig, TableRuleConfig,
};
use crate::error::{Result, ShardError};
use crate::metadata::{ColumnMetaData, DatabaseMetaData, MetaDataSnapshot, TableMetaData};
use crate::route::{RouteContext, RouteHint, Router};
use crate::rule::{
    AlgorithmRegistry, AssistedEncryptAlgorithm, EncryptAlgorithm, EncryptContext,
    KeyGenerateAlgorithm, RuleSet,
};
use crate::sql::SqlDialect;
use crate::types::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub(crate) const SHARDING_DB: &str = "sharding_db";

/// Hands out consecutive keys starting at `start` (default 1000).
#[derive(Debug)]
pub(crate) struct FixedIncrementKeyGenerator {
    next: AtomicI64,
}

impl KeyGenerateAlgorithm for FixedIncrementKeyGenerator {
    fn generate_key(&self) -> Result<Value> {
        Ok(Value::Int64(self.next.fetch_add(1, Ordering::SeqCst)))
    }
}

/// Wraps values as `enc(<value>)`.
#[derive(Debug)]
pub(crate) struct WrappingEncryptor;

impl EncryptAlgorithm for WrappingEncryptor {
    fn encrypt(&self, plain: &Value, _ctx: &EncryptContext<'_>) -> Result<Value> {
        Ok(Value::Text(format!("enc({plain})")))
    }

    fn decrypt(&self, cipher: &Value, _ctx: &EncryptContext<'_>) -> Result<Value> {
        let Value::Text(text) = cipher else {
            return Err(ShardError::Type(format!(
                "cannot decrypt {}",
                cipher.type_name()
            )));
        };
        text.strip_prefix("enc(")
            .and_then(|rest| rest.strip_suffix(')'))
            .map(|plain| Value::Text(plain.to_string()))
            .ok_or_else(|| ShardError::Type(format!("'{text}' is not a cipher value")))
    }
}

/// Produces `hash(<value>)`.
#[derive(Debug)]
pub(crate) struct HashingAssistedEncryptor;

impl AssistedEncryptAlgorithm for HashingAssistedEncryptor {
    fn encrypt(&self, plain: &Value, _ctx: &EncryptContext<'_>) -> Result<Value> {
        Ok(Value::Text(format!("hash({plain})")))
    }
}

pub(crate) fn registry() -> AlgorithmRegistry {
    let mut registry = AlgorithmRegistry::with_builtins();
    registry.register_key_generator("FIXED_INCREMENT", |props| {
        let start = props.get_i64("start")?.unwrap_or(1000);
        Ok(Arc::new(FixedIncrementKeyGenerator {
            next: AtomicI64::new(start),
        }) as Arc<dyn KeyGenerateAlgorithm>)
    });
    registry.register_encryptor("TEST", |_| {
        Ok(Arc::new(WrappingEncryptor) as Arc<dyn EncryptAlgorithm>)
    });
    registry.register_assisted_encryptor("TEST_ASSISTED", |_| {
        Ok(Arc::new(HashingAssistedEncryptor) as Arc<dyn AssistedEncryptAlgorithm>)
    });
    registry
}

fn col(name: &str, data_type: &str) -> ColumnMetaData {
    ColumnMetaData::new(name, data_type)
}

pub(crate) fn metadata() -> MetaDataSnapshot {
    let db = DatabaseMetaData::new(SHARDING_DB)
        .with_table(
            TableMetaData::new(
                "t_order",
                vec![
                    col("order_id", "BIGINT").primary_key().generated(),
                    col("user_id", "INT"),
                    col("status", "VARCHAR"),
                ],
            )
            .with_index("idx_order_status", &["status"]),
        )
        .with_table(TableMetaData::new(
            "t_order_item",
            vec![
                col("item_id", "BIGINT").primary_key(),
                col("order_id", "BIGINT"),
                col("user_id", "INT"),
                col("quantity", "INT"),
            ],
        ))
        .with_table(TableMetaData::new(
            "t_user",
            vec![
                col("user_id", "INT").primary_key(),
                col("username", "VARCHAR"),
                col("password", "VARCHAR"),
                col("status", "VARCHAR"),
            ],
        ))
        .with_table(TableMetaData::new(
            "t_config",
            vec![col("cfg_key", "VARCHAR").primary_key(), col("cfg_value", "VARCHAR")],
        ))
        .with_table(TableMetaData::new(
            "t_single",
            vec![col("id", "INT").primary_key(), col("name", "VARCHAR")],
        ))
        .with_table(TableMetaData::new(
            "t_hint",
            vec![col("id", "INT").primary_key(), col("content", "VARCHAR")],
        ))
        .with_table(TableMetaData::new(
            "t_account",
            vec![col("account_id", "BIGINT").primary_key(), col("balance", "INT")],
        ))
        .with_table(TableMetaData::new(
            "t_log",
            vec![
                col("log_id", "BIGINT").primary_key(),
                col("shard_key", "INT").hidden(),
                col("message", "VARCHAR"),
            ],
        ));
    MetaDataSnapshot::new(db)
}

fn standard(column: &str, algorithm: &str) -> Option<ShardingStrategyConfig> {
    Some(ShardingStrategyConfig::Standard {
        sharding_column: column.to_string(),
        algorithm: algorithm.to_string(),
    })
}

fn inline(expression: &str) -> AlgorithmConfig {
    AlgorithmConfig::new("INLINE").with_prop("algorithm-expression", expression)
}

pub(crate) fn rule_config() -> RuleConfiguration {
    let mut config = RuleConfiguration {
        data_sources: vec!["ds_0".to_string(), "ds_1".to_string()],
        ..RuleConfiguration::default()
    };
    let sharding = &mut config.sharding;
    let algorithms = &mut sharding.sharding_algorithms;
    algorithms.insert("database_inline".into(), inline("ds_${user_id % 2}"));
    algorithms.insert("order_inline".into(), inline("t_order_${order_id % 2}"));
    algorithms.insert("item_inline".into(), inline("t_order_item_${order_id % 2}"));
    algorithms.insert(
        "account_mod".into(),
        AlgorithmConfig::new("MOD").with_prop("sharding-count", 2),
    );
    algorithms.insert(
        "log_mod".into(),
        AlgorithmConfig::new("MOD").with_prop("sharding-count", 2),
    );
    algorithms.insert(
        "hint_database".into(),
        AlgorithmConfig::new("HINT_INLINE").with_prop("algorithm-expression", "ds_${value % 2}"),
    );
    algorithms.insert(
        "hint_inline".into(),
        AlgorithmConfig::new("HINT_INLINE").with_prop("algorithm-expression", "t_hint_${value % 2}"),
    );
    sharding
        .key_generators
        .insert("fixed".into(), AlgorithmConfig::new("FIXED_INCREMENT"));

    sharding.tables.insert(
        "t_order".into(),
        TableRuleConfig {
            actual_data_nodes: Some("ds_${0..1}.t_order_${0..1}".into()),
            database_strategy: standard("user_id", "database_inline"),
            table_strategy: standard("order_id", "order_inline"),
            key_generate: Some(KeyGenerateConfig {
                column: "order_id".into(),
                generator: "fixed".into(),
            }),
            virtual_columns: Vec::new(),
        },
    );
    sharding.tables.insert(
        "t_order_item".into(),
        TableRuleConfig {
            actual_data_nodes: Some("ds_${0..1}.t_order_item_${0..1}".into()),
            database_strategy: standard("user_id", "database_inline"),
            table_strategy: standard("order_id", "item_inline"),
            ..TableRuleConfig::default()
        },
    );
    sharding.tables.insert(
        "t_account".into(),
        TableRuleConfig {
            actual_data_nodes: Some("ds_${0..1}.t_account_${0..1}".into()),
            database_strategy: Some(ShardingStrategyConfig::None),
            table_strategy: standard("account_id", "account_mod"),
            ..TableRuleConfig::default()
        },
    );
    sharding.tables.insert(
        "t_hint".into(),
        TableRuleConfig {
            actual_data_nodes: Some("ds_${0..1}.t_hint_${0..1}".into()),
            database_strategy: Some(ShardingStrategyConfig::Hint {
                algorithm: "hint_database".into(),
            }),
            table_strategy: Some(ShardingStrategyConfig::Hint {
                algorithm: "hint_inline".into(),
            }),
            ..TableRuleConfig::default()
        },
    );
    sharding.tables.insert(
        "t_log".into(),
        TableRuleConfig {
            actual_data_nodes: Some("ds_${0..1}.t_log".into()),
            database_strategy: standard("shard_key", "log_mod"),
            virtual_columns: vec!["shard_key".into()],
            ..TableRuleConfig::default()
        },
    );
    sharding.binding_groups = vec![vec!["t_order".into(), "t_order_item".into()]];
    sharding.broadcast_tables = vec!["t_config".into()];

    let encrypt = &mut config.encrypt;
    encrypt
        .encryptors
        .insert("test_enc".into(), AlgorithmConfig::new("TEST"));
    encrypt
        .encryptors
        .insert("test_assisted".into(), AlgorithmConfig::new("TEST_ASSISTED"));
    let mut user = EncryptTableConfig::default();
    user.columns.insert(
        "username".into(),
        EncryptColumnConfig {
            cipher: "username_cipher".into(),
            encryptor: "test_enc".into(),
            assisted_query: Some("assisted_query_username".into()),
            assisted_query_encryptor: Some("test_assisted".into()),
            plain: None,
        },
    );
    user.columns.insert(
        "password".into(),
        EncryptColumnConfig {
            cipher: "password_cipher".into(),
            encryptor: "test_enc".into(),
            assisted_query: None,
            assisted_query_encryptor: None,
            plain: Some("password_plain".into()),
        },
    );
    encrypt.tables.insert("t_user".into(), user);

    config.props.default_data_source = Some("ds_0".into());
    config
}

pub(crate) fn rules() -> RuleSet {
    RuleSet::build(&rule_config(), &registry(), 1).expect("fixture rules build")
}

pub(crate) fn try_bind(sql: &str) -> Result<BoundStatementContext> {
    try_bind_with(sql, BindOptions::default())
}

pub(crate) fn try_bind_with(sql: &str, options: BindOptions) -> Result<BoundStatementContext> {
    let metadata = metadata();
    let statement = SqlDialect::MySql.parse_statement(sql)?;
    Binder::with_options(&metadata, options).bind(statement, sql)
}

pub(crate) fn bind(sql: &str) -> BoundStatementContext {
    try_bind(sql).unwrap_or_else(|e| panic!("bind '{sql}' failed: {e}"))
}

/// Binds, attaches generated keys and routes against the fixture metadata.
pub(crate) fn try_route_with(
    rules: &RuleSet,
    sql: &str,
    params: &[Value],
    hint: Option<&RouteHint>,
) -> Result<(BoundStatementContext, RouteContext)> {
    let metadata = metadata();
    let mut ctx = try_bind(sql)?;
    GeneratedKeyResolver::attach(&mut ctx, &metadata, &rules.sharding, params)?;
    let route = Router::new(rules, &metadata).route(&ctx, params, hint)?;
    Ok((ctx, route))
}

pub(crate) fn try_route(sql: &str, params: &[Value]) -> Result<RouteContext> {
    try_route_with(&rules(), sql, params, None).map(|(_, route)| route)
}

pub(crate) fn route(sql: &str, params: &[Value]) -> RouteContext {
    try_route(sql, params).unwrap_or_else(|e| panic!("route '{sql}' failed: {e}"))
}
