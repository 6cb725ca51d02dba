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

#![no_main]

use libfuzzer_sys::fuzz_target;
use shardline::metadata::{ColumnMetaData, DatabaseMetaData, MetaDataSnapshot, TableMetaData};
use shardline::{RuleConfiguration, ShardingEngine, Value};
use std::sync::OnceLock;

const RULES: &str = r#"{
    "data_sources": ["ds_0", "ds_1"],
    "sharding": {
        "tables": {
            "t_order": {
                "actual_data_nodes": "ds_${0..1}.t_order_${0..1}",
                "database_strategy": {"standard": {"sharding_column": "user_id", "algorithm": "db_mod"}},
                "table_strategy": {"standard": {"sharding_column": "order_id", "algorithm": "table_mod"}}
            },
            "t_order_item": {
                "actual_data_nodes": "ds_${0..1}.t_order_item_${0..1}",
                "database_strategy": {"standard": {"sharding_column": "user_id", "algorithm": "db_mod"}},
                "table_strategy": {"standard": {"sharding_column": "order_id", "algorithm": "table_mod"}}
            }
        },
        "binding_groups": [["t_order", "t_order_item"]],
        "broadcast_tables": ["t_config"],
        "sharding_algorithms": {
            "db_mod": {"type": "MOD", "props": {"sharding-count": 2}},
            "table_mod": {"type": "MOD", "props": {"sharding-count": 2}}
        }
    },
    "props": {"default_data_source": "ds_0", "route_cache": {"enabled": false}}
}"#;

fn fuzz_engine() -> &'static ShardingEngine {
    static ENGINE: OnceLock<ShardingEngine> = OnceLock::new();
    ENGINE.get_or_init(|| {
        let db = DatabaseMetaData::new("sharding_db")
            .with_table(TableMetaData::new(
                "t_order",
                vec![
                    ColumnMetaData::new("order_id", "BIGINT").primary_key(),
                    ColumnMetaData::new("user_id", "INT"),
                    ColumnMetaData::new("status", "VARCHAR"),
                ],
            ))
            .with_table(TableMetaData::new(
                "t_order_item",
                vec![
                    ColumnMetaData::new("item_id", "BIGINT").primary_key(),
                    ColumnMetaData::new("order_id", "BIGINT"),
                    ColumnMetaData::new("user_id", "INT"),
                ],
            ))
            .with_table(TableMetaData::new(
                "t_config",
                vec![ColumnMetaData::new("cfg_key", "VARCHAR").primary_key()],
            ));
        let config = RuleConfiguration::from_json_str(RULES).expect("fuzz rules");
        ShardingEngine::new(&config, MetaDataSnapshot::new(db)).expect("fuzz engine")
    })
}

fuzz_target!(|data: &[u8]| {
    let Ok(sql) = std::str::from_utf8(data) else {
        return;
    };
    let params = [Value::Int32(1), Value::Int64(2), Value::Text("x".to_string())];
    let _ = fuzz_engine().prepare(sql, &params);
});
