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

use crate::metadata::{
    ColumnMetaData, DatabaseMetaData, MetaDataRegistry, MetaDataSnapshot, TableMetaData,
};
use std::sync::Arc;
use tempfile::tempdir;

fn order_snapshot() -> MetaDataSnapshot {
    MetaDataSnapshot::new(
        DatabaseMetaData::new("sharding_db").with_table(
            TableMetaData::new(
                "t_order",
                vec![
                    ColumnMetaData::new("order_id", "bigint")
                        .primary_key()
                        .generated(),
                    ColumnMetaData::new("user_id", "int"),
                    ColumnMetaData::new("status", "varchar"),
                    ColumnMetaData::new("shard_flag", "int").hidden(),
                ],
            )
            .with_index("idx_status", &["status"]),
        ),
    )
}

#[test]
fn snapshot_lookups_are_case_insensitive() {
    let snapshot = order_snapshot();
    assert!(snapshot.contains_table("T_ORDER"));
    assert!(snapshot.contains_table("t_order"));
    assert!(!snapshot.contains_table("t_order_item"));
    assert!(snapshot.is_generated("t_order", "ORDER_ID"));
    assert!(!snapshot.is_generated("t_order", "user_id"));
    assert_eq!(
        snapshot.visible_column_names("t_order"),
        vec!["order_id", "user_id", "status"]
    );
    let table = snapshot.table("t_order").expect("table");
    assert_eq!(table.columns.len(), 4);
    assert_eq!(
        snapshot
            .find_table_by_index("sharding_db", "sharding_db", "IDX_STATUS")
            .map(|t| t.name.as_str()),
        Some("t_order")
    );
}

#[test]
fn registry_alter_publishes_new_snapshot_without_touching_old_one() {
    let registry = MetaDataRegistry::new(order_snapshot());
    let before = registry.snapshot();

    let after = registry
        .alter(|snapshot| {
            snapshot.put_table(
                "sharding_db",
                "sharding_db",
                TableMetaData::new("t_user", vec![ColumnMetaData::new("user_id", "int")]),
            )
        })
        .expect("alter");

    assert!(!before.contains_table("t_user"));
    assert!(after.contains_table("t_user"));
    assert!(after.version() > before.version());
    assert!(Arc::ptr_eq(&after, &registry.snapshot()));
}

#[test]
fn registry_alter_failure_keeps_current_snapshot() {
    let registry = MetaDataRegistry::new(order_snapshot());
    let version = registry.version();
    let err = registry
        .alter(|snapshot| {
            snapshot.put_table(
                "missing_db",
                "missing_db",
                TableMetaData::new("t", Vec::new()),
            )
        })
        .expect_err("unknown database");
    assert!(err.to_string().contains("missing_db"));
    assert_eq!(registry.version(), version);
}

#[test]
fn published_versions_increase_monotonically() {
    let registry = MetaDataRegistry::new(order_snapshot());
    let first = registry.publish(order_snapshot());
    let second = registry.publish(order_snapshot());
    assert!(second.version() > first.version());
}

#[test]
fn concurrent_readers_observe_complete_snapshots() {
    let registry = Arc::new(MetaDataRegistry::new(order_snapshot()));
    let mut handles = Vec::new();
    for i in 0..4 {
        let registry = Arc::clone(&registry);
        handles.push(std::thread::spawn(move || {
            for j in 0..50 {
                if i == 0 {
                    registry
                        .alter(|s| {
                            s.put_table(
                                "sharding_db",
                                "sharding_db",
                                TableMetaData::new(
                                    format!("t_tmp_{j}"),
                                    vec![ColumnMetaData::new("id", "int")],
                                ),
                            )
                        })
                        .expect("alter");
                } else {
                    let snapshot = registry.snapshot();
                    assert!(snapshot.contains_table("t_order"));
                }
            }
        }));
    }
    for handle in handles {
        handle.join().expect("join");
    }
    assert!(registry.snapshot().contains_table("t_tmp_49"));
}

#[test]
fn snapshot_loads_from_json_file() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("metadata.json");
    let json = serde_json::to_string(&order_snapshot()).expect("serialize");
    std::fs::write(&path, json).expect("write");

    let loaded = MetaDataSnapshot::load(&path).expect("load");
    assert_eq!(loaded, order_snapshot());

    let err = MetaDataSnapshot::from_json_str(
        r#"{"default_database":"nope","databases":[]}"#,
    )
    .expect_err("undeclared default database");
    assert!(err.to_string().contains("nope"));
}
