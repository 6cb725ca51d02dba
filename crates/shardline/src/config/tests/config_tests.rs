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

use crate::config::{FullRouteDmlPolicy, RuleConfiguration, ShardingProps, ShardingStrategyConfig};
use crate::error::ShardError;
use crate::testing::rule_config;
use std::io::Write;

const MINIMAL: &str = r#"{
    "data_sources": ["ds_0", "ds_1"],
    "sharding": {
        "tables": {
            "t_order": {
                "actual_data_nodes": "ds_${0..1}.t_order_${0..3}",
                "database_strategy": {"standard": {"sharding_column": "user_id", "algorithm": "db_mod"}},
                "table_strategy": {"standard": {"sharding_column": "order_id", "algorithm": "table_mod"}}
            }
        },
        "sharding_algorithms": {
            "db_mod": {"type": "MOD", "props": {"sharding-count": 2}},
            "table_mod": {"type": "MOD", "props": {"sharding-count": 4}}
        }
    },
    "props": {"sql_show": true, "full_route_dml": "reject"}
}"#;

fn config_error(text: &str) -> String {
    match RuleConfiguration::from_json_str(text) {
        Err(ShardError::Config(msg)) => msg,
        Err(other) => panic!("expected config error, got {other}"),
        Ok(_) => panic!("expected config error"),
    }
}

#[test]
fn parses_json_configuration() {
    let config = RuleConfiguration::from_json_str(MINIMAL).expect("valid config");
    assert_eq!(config.data_sources, ["ds_0", "ds_1"]);
    let table = config.sharding.tables.get("t_order").expect("t_order rule");
    assert!(matches!(
        table.table_strategy,
        Some(ShardingStrategyConfig::Standard { ref algorithm, .. }) if algorithm == "table_mod"
    ));
    assert!(config.props.sql_show);
    assert_eq!(config.props.full_route_dml, FullRouteDmlPolicy::Reject);
    assert!(config.props.route_cache.enabled);
    assert_eq!(config.props.max_condition_groups, 64);
}

#[test]
fn props_defaults() {
    let props = ShardingProps::default();
    assert!(!props.sql_show);
    assert!(props.merge_conditions);
    assert_eq!(props.full_route_dml, FullRouteDmlPolicy::Broadcast);
    assert_eq!(props.route_cache.capacity, 1024);
    props.validate().expect("defaults are valid");
}

#[test]
fn rejects_undeclared_algorithm() {
    let text = MINIMAL.replace("\"algorithm\": \"db_mod\"", "\"algorithm\": \"missing\"");
    assert!(config_error(&text).contains("missing"));
}

#[test]
fn rejects_empty_data_sources() {
    let msg = config_error(r#"{"data_sources": []}"#);
    assert!(msg.contains("data source"));
}

#[test]
fn rejects_undeclared_default_data_source() {
    let msg = config_error(r#"{"data_sources": ["ds_0"], "props": {"default_data_source": "ds_9"}}"#);
    assert!(msg.contains("ds_9"));
}

#[test]
fn rejects_zero_cache_capacity() {
    let mut props = ShardingProps::default();
    props.route_cache.capacity = 0;
    assert!(props.validate().is_err());
    props.route_cache.enabled = false;
    props.validate().expect("disabled cache ignores capacity");
}

#[test]
fn rejects_binding_group_with_unknown_table() {
    let mut config = rule_config();
    config
        .sharding
        .binding_groups
        .push(vec!["t_order".into(), "t_unknown".into()]);
    assert!(config.validate().is_err());
}

#[test]
fn rejects_assisted_query_without_encryptor() {
    let mut config = rule_config();
    let column = config
        .encrypt
        .tables
        .get_mut("t_user")
        .and_then(|t| t.columns.get_mut("username"))
        .expect("username rule");
    column.assisted_query_encryptor = None;
    assert!(config.validate().is_err());
}

#[test]
fn loads_configuration_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(MINIMAL.as_bytes()).expect("write config");
    let config = RuleConfiguration::load(file.path()).expect("load config");
    assert_eq!(config.sharding.sharding_algorithms.len(), 2);
}

#[test]
fn fixture_configuration_round_trips_through_json() {
    let config = rule_config();
    let text = serde_json::to_string(&config).expect("serialize");
    let parsed = RuleConfiguration::from_json_str(&text).expect("parse");
    assert_eq!(parsed, config);
}
