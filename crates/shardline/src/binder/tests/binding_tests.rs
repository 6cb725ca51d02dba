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

use crate::binder::{
    BindOptions, DalKind, DdlKind, ProjectionOrigin, SimpleTableSegment, StatementKind, TablesContext,
};
use crate::error::{BindingError, ShardError};
use crate::testing::{bind, try_bind, try_bind_with, SHARDING_DB};

fn binding_error(sql: &str) -> BindingError {
    match try_bind(sql) {
        Err(ShardError::Binding(e)) => e,
        Err(other) => panic!("expected binding error for '{sql}', got {other}"),
        Ok(_) => panic!("expected binding error for '{sql}'"),
    }
}

#[test]
fn binds_simple_select_tables_and_columns() {
    let ctx = bind("SELECT order_id, status FROM t_order WHERE user_id = 10");
    assert_eq!(ctx.kind(), StatementKind::Select);
    assert_eq!(ctx.tables().table_names(), ["t_order".to_string()]);
    assert_eq!(ctx.tables().database_names(), [SHARDING_DB.to_string()]);
    assert_eq!(ctx.columns().len(), 3);
    assert!(ctx
        .columns()
        .iter()
        .all(|c| c.table.as_deref() == Some("t_order")));
    let labels = ctx
        .projections()
        .iter()
        .map(|p| p.label.as_str())
        .collect::<Vec<_>>();
    assert_eq!(labels, ["order_id", "status"]);
}

#[test]
fn table_segment_ranges_point_at_source_text() {
    let sql = "SELECT * FROM `t_order` o WHERE o.order_id = 1";
    let ctx = bind(sql);
    let segment = &ctx.table_segments()[0];
    let range = segment.name_range.expect("table range");
    assert_eq!(&sql[range.start..range.stop], "`t_order`");
    assert_eq!(segment.quote, Some('`'));
    assert_eq!(segment.alias.as_deref(), Some("o"));
}

#[test]
fn alias_qualified_columns_resolve_to_logic_table() {
    let ctx = bind(
        "SELECT o.order_id, i.item_id FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id",
    );
    assert!(ctx.contains_join());
    let item = ctx
        .columns()
        .iter()
        .find(|c| c.name == "item_id")
        .expect("item_id bound");
    assert_eq!(item.table.as_deref(), Some("t_order_item"));
    assert!(!item.owner_is_table);
}

#[test]
fn table_name_owner_is_flagged() {
    let ctx = bind("SELECT t_order.status FROM t_order");
    let column = &ctx.columns()[0];
    assert_eq!(column.owner.as_deref(), Some("t_order"));
    assert!(column.owner_is_table);
}

#[test]
fn unqualified_column_in_two_tables_is_ambiguous() {
    let err = binding_error(
        "SELECT order_id FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id",
    );
    assert_eq!(
        err,
        BindingError::AmbiguousColumn {
            column: "order_id".to_string()
        }
    );
}

#[test]
fn unknown_table_and_column_are_rejected() {
    assert_eq!(
        binding_error("SELECT * FROM t_missing"),
        BindingError::UnknownTable {
            table: "t_missing".to_string()
        }
    );
    assert_eq!(
        binding_error("SELECT nope FROM t_order"),
        BindingError::UnknownColumn {
            column: "nope".to_string()
        }
    );
}

#[test]
fn skip_validation_accepts_unknown_tables() {
    let options = BindOptions {
        skip_metadata_validate: true,
        ..BindOptions::default()
    };
    let ctx = try_bind_with("SELECT a FROM t_missing WHERE b = 1", options).expect("bind");
    assert_eq!(ctx.tables().table_names(), ["t_missing".to_string()]);
    assert!(ctx
        .columns()
        .iter()
        .all(|c| c.table.as_deref() == Some("t_missing")));
}

#[test]
fn owner_resolves_to_database() {
    let ctx = bind("SELECT status FROM sharding_db.t_order");
    let bound = ctx.table_segments()[0].bound.clone().expect("bound");
    assert_eq!(bound.database, SHARDING_DB);
    assert_eq!(ctx.tables().schema_names(), [SHARDING_DB.to_string()]);
}

#[test]
fn unknown_owner_is_unknown_database() {
    assert_eq!(
        binding_error("SELECT * FROM other_db.t_order"),
        BindingError::UnknownDatabase {
            database: "other_db".to_string()
        }
    );
}

#[test]
fn dual_is_not_a_table() {
    let ctx = bind("SELECT 1 FROM DUAL");
    assert!(ctx.tables().is_empty());

    let segment = SimpleTableSegment {
        name: "t_order".into(),
        owner: None,
        alias: None,
        name_range: None,
        owner_range: None,
        quote: None,
        bound: None,
    };
    let tables = TablesContext::new(
        &[segment],
        &["Dual".to_string(), "t_order_item".to_string()],
        std::iter::empty(),
    );
    assert_eq!(tables.table_names(), ["t_order", "t_order_item"]);
}

#[test]
fn cte_alias_is_visible_and_not_a_table() {
    let ctx = bind(
        "WITH recent AS (SELECT order_id, user_id FROM t_order) SELECT order_id FROM recent WHERE user_id = 1",
    );
    assert_eq!(ctx.tables().table_names(), ["t_order".to_string()]);
    assert_eq!(ctx.projections()[0].label, "order_id");
    assert_eq!(
        ctx.projections()[0].column.as_ref().map(|c| c.table.as_str()),
        None
    );
}

#[test]
fn duplicate_cte_alias_is_rejected() {
    let err = binding_error(
        "WITH a AS (SELECT order_id FROM t_order), a AS (SELECT user_id FROM t_user) SELECT * FROM a",
    );
    assert_eq!(
        err,
        BindingError::DuplicateAlias {
            alias: "a".to_string()
        }
    );
}

#[test]
fn correlated_subquery_sees_outer_table() {
    let ctx = bind(
        "SELECT order_id FROM t_order o WHERE EXISTS (SELECT 1 FROM t_order_item i WHERE i.order_id = o.order_id)",
    );
    assert!(ctx.contains_subquery());
    let correlated = ctx
        .columns()
        .iter()
        .filter(|c| c.correlated)
        .collect::<Vec<_>>();
    assert_eq!(correlated.len(), 1);
    assert_eq!(correlated[0].table.as_deref(), Some("t_order"));
    assert_eq!(ctx.tables().table_names().len(), 2);
}

#[test]
fn derived_table_projections_are_recorded() {
    let ctx = bind("SELECT u.username FROM (SELECT user_id, username FROM t_user) u");
    assert_eq!(
        ctx.tables().subquery_projection("u"),
        Some(["user_id".to_string(), "username".to_string()].as_slice())
    );
    let outer = ctx
        .columns()
        .iter()
        .find(|c| c.owner.as_deref() == Some("u"))
        .expect("outer column");
    assert_eq!(outer.table, None);
    let origin = ctx.projections()[0].column.clone().expect("lineage");
    assert_eq!(origin.table, "t_user");
    assert_eq!(origin.column, "username");
}

#[test]
fn wildcard_expands_visible_columns_only() {
    let ctx = bind("SELECT * FROM t_log");
    let labels = ctx
        .projections()
        .iter()
        .map(|p| p.label.as_str())
        .collect::<Vec<_>>();
    assert_eq!(labels, ["log_id", "message"]);
    assert!(matches!(
        ctx.projections()[0].origin,
        ProjectionOrigin::Wildcard {
            qualifier: None,
            ..
        }
    ));
}

#[test]
fn qualified_wildcard_over_join_is_qualified() {
    let ctx = bind(
        "SELECT o.*, i.quantity FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id",
    );
    assert_eq!(ctx.projections().len(), 4);
    match &ctx.projections()[0].origin {
        ProjectionOrigin::Wildcard { qualifier, .. } => {
            assert_eq!(qualifier.as_deref(), Some("o"))
        }
        other => panic!("expected wildcard projection, got {other:?}"),
    }
}

#[test]
fn order_by_resolves_output_positions() {
    let ctx = bind(
        "SELECT order_id, status AS s FROM t_order ORDER BY s DESC, 1, user_id",
    );
    let items = ctx.order_by();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].index, Some(1));
    assert!(!items[0].ascending);
    assert_eq!(items[1].index, Some(0));
    assert_eq!(items[2].index, None);
}

#[test]
fn union_records_combine_segment() {
    let ctx = bind("SELECT user_id FROM t_order UNION ALL SELECT user_id FROM t_user");
    assert_eq!(ctx.combines().len(), 1);
    assert!(ctx.combines()[0].all);
    assert_eq!(ctx.projections().len(), 1);
}

#[test]
fn update_records_assignments() {
    let ctx = bind("UPDATE t_order SET status = 'done' WHERE order_id = 3");
    assert_eq!(ctx.kind(), StatementKind::Update);
    assert_eq!(ctx.assignments().len(), 1);
    assert_eq!(ctx.assignments()[0].column, "status");
    assert_eq!(ctx.assignments()[0].table.as_deref(), Some("t_order"));
}

#[test]
fn delete_binds_predicate_columns() {
    let ctx = bind("DELETE FROM t_order WHERE user_id = 2");
    assert_eq!(ctx.kind(), StatementKind::Delete);
    assert_eq!(ctx.columns()[0].name, "user_id");
}

#[test]
fn ddl_and_dal_kinds() {
    assert_eq!(
        bind("CREATE TABLE t_new (id INT)").kind(),
        StatementKind::Ddl(DdlKind::CreateTable)
    );
    assert!(bind("CREATE TABLE t_new (id INT)").table_segments()[0]
        .bound
        .is_none());
    let alter = bind("ALTER TABLE t_order RENAME TO t_order_new");
    assert_eq!(alter.kind(), StatementKind::Ddl(DdlKind::AlterTable));
    assert_eq!(alter.rename_to(), Some("t_order_new"));
    assert_eq!(
        bind("TRUNCATE TABLE t_order").kind(),
        StatementKind::Ddl(DdlKind::Truncate)
    );
    assert_eq!(
        bind("DESCRIBE t_user").kind(),
        StatementKind::Dal(DalKind::Describe)
    );
    assert_eq!(bind("COMMIT").kind(), StatementKind::Tcl);
}

#[test]
fn drop_index_finds_owning_table() {
    let ctx = bind("DROP INDEX idx_order_status");
    assert_eq!(ctx.kind(), StatementKind::Ddl(DdlKind::DropIndex));
    assert_eq!(ctx.indexes()[0].table.as_deref(), Some("t_order"));
    assert!(ctx.tables().contains_table("t_order"));
}

#[test]
fn create_index_records_index_segment() {
    let sql = "CREATE INDEX idx_user ON t_order (user_id)";
    let ctx = bind(sql);
    let index = &ctx.indexes()[0];
    assert_eq!(index.name, "idx_user");
    assert_eq!(index.table.as_deref(), Some("t_order"));
    let range = index.range.expect("index range");
    assert_eq!(&sql[range.start..range.stop], "idx_user");
}

#[test]
fn column_lookup_by_identifier_position() {
    let ctx = bind("SELECT status FROM t_order WHERE order_id = ?");
    assert_eq!(ctx.markers().len(), 1);
    let start = ctx.sql().find("order_id").expect("column in text");
    let column = ctx
        .columns()
        .iter()
        .find(|c| c.range.map(|r| r.start) == Some(start))
        .expect("column by range");
    assert_eq!(column.name, "order_id");
}
