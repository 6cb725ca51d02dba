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

use super::{pair, rewrite, statements, text, try_rewrite};
use crate::error::{RewriteError, ShardError};
use crate::types::Value;

#[test]
fn rows_go_to_the_node_they_route_to() {
    assert_eq!(
        statements(
            "INSERT INTO t_order (order_id, user_id, status) VALUES (1, 1, 'a'), (2, 2, 'b')",
            &[]
        ),
        [
            pair("ds_0", "INSERT INTO t_order_0 (order_id, user_id, status) VALUES (2, 2, 'b')"),
            pair("ds_1", "INSERT INTO t_order_1 (order_id, user_id, status) VALUES (1, 1, 'a')"),
        ]
    );
}

#[test]
fn row_parameters_follow_their_rows() {
    let params = [
        Value::Int64(1),
        Value::Int64(1),
        text("a"),
        Value::Int64(2),
        Value::Int64(2),
        text("b"),
    ];
    let units = rewrite(
        "INSERT INTO t_order (order_id, user_id, status) VALUES (?, ?, ?), (?, ?, ?)",
        &params,
    );
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].data_source, "ds_0");
    assert_eq!(
        units[0].sql,
        "INSERT INTO t_order_0 (order_id, user_id, status) VALUES (?, ?, ?)"
    );
    assert_eq!(units[0].parameters, params[3..]);
    assert_eq!(units[1].parameters, params[..3]);
}

#[test]
fn generated_keys_are_appended_as_literals() {
    assert_eq!(
        statements("INSERT INTO t_order (user_id, status) VALUES (1, 'a'), (1, 'b')", &[]),
        [
            pair(
                "ds_1",
                "INSERT INTO t_order_0 (user_id, status, order_id) VALUES (1, 'a', 1000)"
            ),
            pair(
                "ds_1",
                "INSERT INTO t_order_1 (user_id, status, order_id) VALUES (1, 'b', 1001)"
            ),
        ]
    );
}

#[test]
fn generated_keys_become_parameters_next_to_parameters() {
    let units = rewrite(
        "INSERT INTO t_order (user_id, status) VALUES (?, ?)",
        &[Value::Int64(1), text("a")],
    );
    assert_eq!(units.len(), 1);
    assert_eq!(
        units[0].sql,
        "INSERT INTO t_order_0 (user_id, status, order_id) VALUES (?, ?, ?)"
    );
    assert_eq!(
        units[0].parameters,
        [Value::Int64(1), text("a"), Value::Int64(1000)]
    );
}

#[test]
fn encrypted_columns_expand_into_derived_columns() {
    assert_eq!(
        statements(
            "INSERT INTO t_user (user_id, username, password) VALUES (1, 'alice', 'secret')",
            &[]
        ),
        [pair(
            "ds_0",
            "INSERT INTO t_user (user_id, username_cipher, assisted_query_username, \
             password_cipher, password_plain) VALUES (1, 'enc(alice)', 'hash(alice)', \
             'enc(secret)', 'secret')"
        )]
    );
}

#[test]
fn encrypted_parameters_are_replaced_and_derived_ones_added() {
    let units = rewrite(
        "INSERT INTO t_user (user_id, username) VALUES (?, ?)",
        &[Value::Int64(1), text("alice")],
    );
    assert_eq!(
        units[0].sql,
        "INSERT INTO t_user (user_id, username_cipher, assisted_query_username) VALUES (?, ?, ?)"
    );
    assert_eq!(
        units[0].parameters,
        [Value::Int64(1), text("enc(alice)"), text("hash(alice)")]
    );
}

#[test]
fn missing_column_list_is_spelled_out() {
    assert_eq!(
        statements("INSERT INTO t_user VALUES (1, 'bob', 'pw', 'active')", &[]),
        [pair(
            "ds_0",
            "INSERT INTO t_user (user_id, username_cipher, assisted_query_username, \
             password_cipher, password_plain, status) VALUES (1, 'enc(bob)', 'hash(bob)', \
             'enc(pw)', 'pw', 'active')"
        )]
    );
}

#[test]
fn virtual_columns_are_dropped_with_their_parameters() {
    assert_eq!(
        statements(
            "INSERT INTO t_log (log_id, shard_key, message) VALUES (1, 3, 'hi')",
            &[]
        ),
        [pair("ds_1", "INSERT INTO t_log (log_id, message) VALUES (1, 'hi')")]
    );
    let units = rewrite(
        "INSERT INTO t_log (log_id, shard_key, message) VALUES (?, ?, ?)",
        &[Value::Int64(1), Value::Int64(3), text("hi")],
    );
    assert_eq!(units[0].sql, "INSERT INTO t_log (log_id, message) VALUES (?, ?)");
    assert_eq!(units[0].parameters, [Value::Int64(1), text("hi")]);
}

#[test]
fn insert_set_renders_assignments() {
    assert_eq!(
        statements("INSERT INTO t_user SET user_id = 1, username = 'carol'", &[]),
        [pair(
            "ds_0",
            "INSERT INTO t_user SET user_id = 1, username_cipher = 'enc(carol)', \
             assisted_query_username = 'hash(carol)'"
        )]
    );
}

#[test]
fn insert_select_into_encrypted_columns_is_rejected() {
    let err = try_rewrite(
        "INSERT INTO t_user (user_id, username) SELECT id, name FROM t_single",
        &[],
    )
    .expect_err("derived values are unknown");
    assert!(matches!(
        err,
        ShardError::Rewrite(RewriteError::MissingDerivedValue(_))
    ));
}

#[test]
fn encrypted_values_must_be_literals_or_parameters() {
    let err = try_rewrite(
        "INSERT INTO t_user (user_id, username) VALUES (1, CONCAT('a', 'b'))",
        &[],
    )
    .expect_err("expression cannot be encrypted");
    assert!(matches!(
        err,
        ShardError::Rewrite(RewriteError::MissingDerivedValue(_))
    ));

    let err = try_rewrite("INSERT INTO t_user (user_id, username) VALUES (?, ?)", &[])
        .expect_err("parameters are missing");
    assert!(matches!(
        err,
        ShardError::Rewrite(RewriteError::MissingDerivedValue(_))
    ));
}

#[test]
fn untouched_single_row_insert_keeps_its_text() {
    let units = rewrite(
        "INSERT INTO t_order (order_id, user_id, status) VALUES (?, ?, 'x')",
        &[Value::Int64(4), Value::Int64(5)],
    );
    assert_eq!(
        units[0].sql,
        "INSERT INTO t_order_0 (order_id, user_id, status) VALUES (?, ?, 'x')"
    );
    assert_eq!(units[0].data_source, "ds_1");
    assert_eq!(units[0].parameters, [Value::Int64(4), Value::Int64(5)]);
}
