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

use crate::binder::GeneratedKeyResolver;
use crate::testing::{bind, metadata};
use crate::types::Value;

fn resolve(sql: &str, params: &[Value]) -> Option<crate::binder::GeneratedKeyContext> {
    let ctx = bind(sql);
    let insert = ctx.insert().expect("insert context");
    let metadata = metadata();
    let table = metadata.table(&insert.table).expect("table metadata");
    GeneratedKeyResolver::resolve(table, insert, params)
}

#[test]
fn absent_key_column_is_generated() {
    let key = resolve("INSERT INTO t_order (user_id, status) VALUES (1, 'a'), (2, 'b')", &[])
        .expect("generated key context");
    assert_eq!(key.column_name(), "order_id");
    assert!(key.is_generated());
    assert!(key.values().is_empty());
}

#[test]
fn supplied_literal_keys_are_collected() {
    let key = resolve(
        "INSERT INTO t_order (order_id, user_id) VALUES (7, 1), (8, 2)",
        &[],
    )
    .expect("generated key context");
    assert!(!key.is_generated());
    assert_eq!(key.values(), [Value::Int64(7), Value::Int64(8)]);
}

#[test]
fn supplied_parameter_keys_need_parameters() {
    let sql = "INSERT INTO t_order (user_id, order_id) VALUES (?, ?)";
    let without = resolve(sql, &[]).expect("generated key context");
    assert!(!without.is_generated());
    assert!(without.values().is_empty());

    let with = resolve(sql, &[Value::Int64(1), Value::Int64(99)]).expect("generated key context");
    assert_eq!(with.values(), [Value::Int64(99)]);
}

#[test]
fn implicit_list_with_full_row_supplies_key() {
    let key = resolve("INSERT INTO t_order VALUES (5, 1, 'x')", &[]).expect("generated key context");
    assert!(!key.is_generated());
    assert_eq!(key.values(), [Value::Int64(5)]);
}

#[test]
fn table_without_generated_column_has_no_context() {
    assert!(resolve("INSERT INTO t_user (user_id) VALUES (1)", &[]).is_none());
}
