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

use crate::binder::{InsertShape, InsertValue, StatementKind};
use crate::testing::{bind, try_bind};
use crate::types::Value;

#[test]
fn multi_row_values_are_grouped() {
    let sql = "INSERT INTO t_order (user_id, status) VALUES (10, 'a'), (11, 'b')";
    let ctx = bind(sql);
    assert_eq!(ctx.kind(), StatementKind::Insert);
    let insert = ctx.insert().expect("insert context");
    assert_eq!(insert.table, "t_order");
    assert_eq!(insert.shape, InsertShape::Values);
    assert_eq!(insert.groups.len(), 2);
    assert_eq!(insert.value_count(0), 2);
    assert_eq!(
        insert.groups[1].items[0].value,
        InsertValue::Literal(Value::Int64(11))
    );
    let first = insert.groups[0].range.expect("group range");
    assert_eq!(&sql[first.start..first.stop], "(10, 'a')");
    let columns = insert.columns_range.expect("column list range");
    assert_eq!(&sql[columns.start..columns.stop], "(user_id, status)");
}

#[test]
fn parameters_are_attributed_to_their_group() {
    let ctx = bind("INSERT INTO t_order (user_id, status) VALUES (?, ?), (?, 'x')");
    let insert = ctx.insert().expect("insert context");
    let indexes = insert
        .groups
        .iter()
        .map(|g| g.markers.iter().map(|m| m.index).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    assert_eq!(indexes, vec![vec![0, 1], vec![2]]);
    assert!(matches!(
        insert.groups[1].items[0].value,
        InsertValue::Parameter(m) if m.index == 2
    ));
}

#[test]
fn implicit_column_list_uses_visible_columns() {
    let ctx = bind("INSERT INTO t_order VALUES (1, 2, 'x')");
    let insert = ctx.insert().expect("insert context");
    assert!(!insert.has_explicit_columns());
    assert!(insert.columns_range.is_none());
    let stop = insert.table_stop.expect("table stop");
    assert_eq!(&ctx.sql()[..stop], "INSERT INTO t_order");
}

#[test]
fn insert_select_counts_projections() {
    let ctx = bind("INSERT INTO t_order_item (item_id, order_id, user_id, quantity) SELECT order_id, order_id, user_id, 1 FROM t_order");
    let insert = ctx.insert().expect("insert context");
    assert_eq!(insert.shape, InsertShape::Select { projection_count: 4 });
    assert_eq!(insert.value_count(0), 4);
    assert!(insert.groups.is_empty());
    assert!(ctx.tables().contains_table("t_order"));
}

#[test]
fn insert_set_form_builds_one_group() {
    let ctx = bind("INSERT INTO t_order SET user_id = 1, status = 'new'");
    let insert = ctx.insert().expect("insert context");
    assert_eq!(insert.shape, InsertShape::Set);
    assert_eq!(insert.groups.len(), 1);
    assert_eq!(insert.columns.len(), 2);
    assert_eq!(insert.value_count(0), 2);
}

#[test]
fn expressions_are_opaque_values() {
    let ctx = bind("INSERT INTO t_order (user_id, status) VALUES (1 + 1, -5)");
    let items = &ctx.insert().expect("insert context").groups[0].items;
    assert_eq!(items[0].value, InsertValue::Expression);
    assert_eq!(items[1].value, InsertValue::Literal(Value::Int64(-5)));
}

#[test]
fn unknown_insert_column_is_rejected() {
    assert!(try_bind("INSERT INTO t_order (nope) VALUES (1)").is_err());
}
