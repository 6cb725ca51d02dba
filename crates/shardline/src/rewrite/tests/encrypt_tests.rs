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

fn unsupported(sql: &str) -> (String, String) {
    match try_rewrite(sql, &[]) {
        Err(ShardError::Rewrite(RewriteError::UnsupportedEncryptPredicate { column, operator })) => {
            (column, operator)
        }
        other => panic!("expected unsupported predicate for '{sql}', got {other:?}"),
    }
}

#[test]
fn projected_columns_read_the_cipher_under_the_logic_name() {
    assert_eq!(
        statements("SELECT username FROM t_user WHERE user_id = 1", &[]),
        [pair(
            "ds_0",
            "SELECT username_cipher AS username FROM t_user WHERE user_id = 1"
        )]
    );
    assert_eq!(
        statements("SELECT username AS name FROM t_user", &[]),
        [pair("ds_0", "SELECT username_cipher AS name FROM t_user")]
    );
}

#[test]
fn wildcard_over_encrypted_table_is_expanded() {
    assert_eq!(
        statements("SELECT * FROM t_user WHERE user_id = 1", &[]),
        [pair(
            "ds_0",
            "SELECT user_id, username_cipher AS username, password_cipher AS password, status \
             FROM t_user WHERE user_id = 1"
        )]
    );
}

#[test]
fn equality_uses_the_assisted_query_column() {
    assert_eq!(
        statements("SELECT user_id FROM t_user WHERE username = 'alice'", &[]),
        [pair(
            "ds_0",
            "SELECT user_id FROM t_user WHERE assisted_query_username = 'hash(alice)'"
        )]
    );
    let units = rewrite(
        "SELECT user_id FROM t_user WHERE username = ?",
        &[text("alice")],
    );
    assert_eq!(
        units[0].sql,
        "SELECT user_id FROM t_user WHERE assisted_query_username = ?"
    );
    assert_eq!(units[0].parameters, [text("hash(alice)")]);
}

#[test]
fn equality_without_assisted_column_compares_ciphers() {
    assert_eq!(
        statements("DELETE FROM t_user WHERE password = 'pw'", &[]),
        [pair("ds_0", "DELETE FROM t_user WHERE password_cipher = 'enc(pw)'")]
    );
}

#[test]
fn in_lists_encrypt_every_item() {
    let units = rewrite(
        "SELECT user_id FROM t_user WHERE username IN ('a', ?)",
        &[text("b")],
    );
    assert_eq!(
        units[0].sql,
        "SELECT user_id FROM t_user WHERE assisted_query_username IN ('hash(a)', ?)"
    );
    assert_eq!(units[0].parameters, [text("hash(b)")]);
}

#[test]
fn order_and_pattern_predicates_are_rejected() {
    assert_eq!(
        unsupported("SELECT user_id FROM t_user WHERE username > 'a'"),
        ("username".to_string(), ">".to_string())
    );
    assert_eq!(
        unsupported("SELECT user_id FROM t_user WHERE username LIKE 'a%'"),
        ("username".to_string(), "LIKE".to_string())
    );
    assert_eq!(
        unsupported("SELECT user_id FROM t_user WHERE password BETWEEN 'a' AND 'b'"),
        ("password".to_string(), "BETWEEN".to_string())
    );
}

#[test]
fn comparison_with_an_expression_is_rejected() {
    assert_eq!(
        unsupported("SELECT user_id FROM t_user WHERE username = CONCAT('al', 'ice')"),
        ("username".to_string(), "=".to_string())
    );
    assert_eq!(
        unsupported("SELECT user_id FROM t_user WHERE password IN ('a', UPPER(status))"),
        ("password".to_string(), "IN".to_string())
    );
}

#[test]
fn ordering_by_encrypted_columns_is_rejected() {
    assert_eq!(
        unsupported("SELECT username FROM t_user ORDER BY username"),
        ("username".to_string(), "ORDER BY".to_string())
    );
    assert_eq!(
        unsupported("SELECT username AS name FROM t_user ORDER BY 1"),
        ("username".to_string(), "ORDER BY".to_string())
    );
    assert_eq!(
        unsupported("SELECT user_id FROM t_user ORDER BY LOWER(password)"),
        ("password".to_string(), "ORDER BY".to_string())
    );
    assert_eq!(
        unsupported("SELECT status, COUNT(*) FROM t_user GROUP BY status, username"),
        ("username".to_string(), "GROUP BY".to_string())
    );
    assert_eq!(
        statements("SELECT user_id FROM t_user ORDER BY user_id", &[]),
        [pair("ds_0", "SELECT user_id FROM t_user ORDER BY user_id")]
    );
}

#[test]
fn update_writes_cipher_and_derived_columns() {
    assert_eq!(
        statements("UPDATE t_user SET password = 'new' WHERE user_id = 1", &[]),
        [pair(
            "ds_0",
            "UPDATE t_user SET password_cipher = 'enc(new)', password_plain = 'new' WHERE user_id = 1"
        )]
    );
    let units = rewrite(
        "UPDATE t_user SET username = ? WHERE user_id = ?",
        &[text("dave"), Value::Int64(7)],
    );
    assert_eq!(
        units[0].sql,
        "UPDATE t_user SET username_cipher = ?, assisted_query_username = ? WHERE user_id = ?"
    );
    assert_eq!(
        units[0].parameters,
        [text("enc(dave)"), text("hash(dave)"), Value::Int64(7)]
    );
}

#[test]
fn update_from_an_expression_is_rejected() {
    let err = try_rewrite(
        "UPDATE t_user SET username = UPPER(status) WHERE user_id = 1",
        &[],
    )
    .expect_err("expression cannot be encrypted");
    assert!(matches!(
        err,
        ShardError::Rewrite(RewriteError::MissingDerivedValue(_))
    ));
}

#[test]
fn duplicate_key_update_of_encrypted_column_is_rejected() {
    assert_eq!(
        unsupported(
            "INSERT INTO t_user (user_id, username) VALUES (1, 'a') \
             ON DUPLICATE KEY UPDATE username = 'b'"
        ),
        ("username".to_string(), "ON DUPLICATE KEY UPDATE".to_string())
    );
}

#[test]
fn statements_without_encrypted_tables_are_untouched() {
    assert_eq!(
        statements("SELECT name FROM t_single WHERE name = 'x'", &[]),
        [pair("ds_0", "SELECT name FROM t_single WHERE name = 'x'")]
    );
}
