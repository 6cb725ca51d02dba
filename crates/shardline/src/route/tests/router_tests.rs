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

use crate::config::{AlgorithmConfig, RuleConfiguration, ShardingStrategyConfig, TableRuleConfig};
use crate::error::{RoutingError, ShardError};
use crate::route::{RouteHint, RouteStrategy, RouteUnit, UnconditionalScope};
use crate::rule::{DataNode, RuleSet};
use crate::testing::{registry, route, rules, try_route, try_route_with};
use crate::types::Value;
use proptest::prelude::*;

fn units(sql: &str, params: &[Value]) -> Vec<String> {
    route(sql, params)
        .plan
        .units()
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// `t_order` split over `count` tables of a single data source with MOD.
fn single_source_mod_rules(count: usize) -> RuleSet {
    let mut config = RuleConfiguration {
        data_sources: vec!["ds_0".to_string()],
        ..RuleConfiguration::default()
    };
    config.sharding.sharding_algorithms.insert(
        "order_mod".into(),
        AlgorithmConfig::new("MOD").with_prop("sharding-count", count as i64),
    );
    config.sharding.tables.insert(
        "t_order".into(),
        TableRuleConfig {
            actual_data_nodes: Some(format!("ds_0.t_order_${{0..{}}}", count - 1)),
            table_strategy: Some(ShardingStrategyConfig::Standard {
                sharding_column: "order_id".into(),
                algorithm: "order_mod".into(),
            }),
            ..TableRuleConfig::default()
        },
    );
    RuleSet::build(&config, &registry(), 1).expect("build rules")
}

#[test]
fn equality_on_both_keys_routes_to_one_node() {
    let route = route("SELECT * FROM t_order WHERE user_id = 1 AND order_id = 3", &[]);
    assert_eq!(route.strategy, Some(RouteStrategy::Standard));
    assert_eq!(
        route.plan.units(),
        [RouteUnit::new("ds_1").with_table("t_order", "t_order_1")]
    );
}

#[test]
fn parameters_drive_routing() {
    let route = route(
        "SELECT * FROM t_order WHERE user_id = ? AND order_id = ?",
        &[Value::Int64(2), Value::Int64(5)],
    );
    assert_eq!(
        route.plan.actual_tables("t_order"),
        [DataNode::new("ds_0", "t_order_1")]
    );
}

#[test]
fn mod_routing_over_four_tables() {
    let rules = single_source_mod_rules(4);
    let (_, route) = try_route_with(&rules, "SELECT * FROM t_order WHERE order_id = 17", &[], None)
        .expect("route");
    assert_eq!(
        route.plan.actual_tables("t_order"),
        [DataNode::new("ds_0", "t_order_1")]
    );
}

#[test]
fn covering_range_routes_to_every_table() {
    let rules = single_source_mod_rules(16);
    let (_, route) = try_route_with(
        &rules,
        "SELECT * FROM t_order WHERE order_id BETWEEN 1 AND 16",
        &[],
        None,
    )
    .expect("route");
    assert_eq!(route.plan.len(), 16);
}

#[test]
fn range_spanning_most_of_i64_routes_to_every_table() {
    let rules = single_source_mod_rules(4);
    let (_, route) = try_route_with(
        &rules,
        "SELECT * FROM t_order WHERE order_id BETWEEN -9000000000000000000 AND 9000000000000000000",
        &[],
        None,
    )
    .expect("route");
    assert_eq!(route.plan.len(), 4);
}

#[test]
fn in_list_without_database_key_fans_out() {
    let route = route("SELECT * FROM t_order WHERE order_id IN (1, 2)", &[]);
    assert_eq!(route.plan.len(), 4);
    assert_eq!(route.plan.data_sources(), ["ds_0", "ds_1"]);
}

#[test]
fn unconstrained_or_branch_routes_everywhere() {
    let route = route(
        "SELECT * FROM t_order WHERE user_id = 1 OR status = 'paid'",
        &[],
    );
    assert!(route.conditions.is_unconditional());
    assert_eq!(route.plan.len(), 4);
}

#[test]
fn union_with_unconstrained_branch_routes_everywhere() {
    let mixed = route(
        "SELECT order_id FROM t_order WHERE order_id = 1 \
         UNION ALL SELECT order_id FROM t_order WHERE status = 'x'",
        &[],
    );
    assert!(mixed.conditions.is_unconditional());
    assert_eq!(mixed.plan.len(), 4);

    let open = route(
        "SELECT order_id FROM t_order WHERE user_id = 1 AND order_id = 1 \
         UNION ALL SELECT order_id FROM t_order",
        &[],
    );
    assert!(open.conditions.is_unconditional());
    assert_eq!(open.plan.len(), 4);
}

#[test]
fn unsharded_subquery_without_conditions_keeps_outer_route() {
    let route = route(
        "SELECT * FROM t_order WHERE user_id = 1 AND order_id = 3 \
         AND status IN (SELECT id FROM t_single)",
        &[],
    );
    assert_eq!(route.plan.len(), 1);
}

#[test]
fn contradiction_routes_to_a_single_node() {
    let route = route("SELECT * FROM t_order WHERE user_id = 1 AND user_id = 2", &[]);
    assert_eq!(
        route.strategy,
        Some(RouteStrategy::Unconditional(UnconditionalScope::Unicast))
    );
    assert_eq!(
        units("SELECT * FROM t_order WHERE user_id = 1 AND user_id = 2", &[]),
        ["ds_0: t_order -> t_order_0"]
    );
}

#[test]
fn binding_tables_share_the_table_suffix() {
    let route = route(
        "SELECT * FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id \
         WHERE o.user_id = 1 AND o.order_id = 2",
        &[],
    );
    assert_eq!(route.strategy, Some(RouteStrategy::Standard));
    assert_eq!(
        route.plan.units(),
        [RouteUnit::new("ds_1")
            .with_table("t_order", "t_order_0")
            .with_table("t_order_item", "t_order_item_0")]
    );
}

#[test]
fn unconstrained_join_of_unbound_tables_is_cartesian() {
    let route = route(
        "SELECT * FROM t_order o JOIN t_account a ON o.user_id = a.account_id",
        &[],
    );
    assert_eq!(route.strategy, Some(RouteStrategy::Complex));
    assert_eq!(route.plan.len(), 8);
}

#[test]
fn join_that_cannot_meet_in_one_source_is_rejected() {
    let err = try_route(
        "SELECT * FROM t_order o JOIN t_account a ON o.user_id = a.account_id WHERE o.user_id = 1",
        &[],
    )
    .expect_err("tables do not meet");
    assert!(matches!(
        err,
        ShardError::Routing(RoutingError::CrossShardViolation(_))
    ));
}

#[test]
fn broadcast_tables() {
    assert_eq!(units("SELECT * FROM t_config", &[]), ["ds_0: t_config -> t_config"]);
    let route = route("INSERT INTO t_config (cfg_key, cfg_value) VALUES ('a', 'b')", &[]);
    assert_eq!(
        route.strategy,
        Some(RouteStrategy::Unconditional(UnconditionalScope::AllDataSources))
    );
    assert_eq!(route.plan.data_sources(), ["ds_0", "ds_1"]);
}

#[test]
fn ungoverned_tables_produce_an_empty_route() {
    let route = route("SELECT * FROM t_single WHERE id = 1", &[]);
    assert!(route.is_empty());
    assert_eq!(route.strategy, None);
}

#[test]
fn transaction_control_goes_to_every_source() {
    let route = route("COMMIT", &[]);
    assert_eq!(route.plan.data_sources(), ["ds_0", "ds_1"]);
}

#[test]
fn ddl_on_a_sharding_table_touches_every_node() {
    let route = route("CREATE INDEX idx_user ON t_order (user_id)", &[]);
    assert_eq!(
        route.strategy,
        Some(RouteStrategy::Unconditional(UnconditionalScope::AllTableNodes))
    );
    assert_eq!(route.plan.len(), 4);
}

#[test]
fn insert_rows_route_per_group() {
    let route = route(
        "INSERT INTO t_order (order_id, user_id, status) VALUES (1, 1, 'a'), (2, 2, 'b')",
        &[],
    );
    assert_eq!(route.plan.len(), 2);
    let node_1 = DataNode::new("ds_1", "t_order_1");
    let node_0 = DataNode::new("ds_0", "t_order_0");
    assert!(route.is_group_routed_to(0, &node_1));
    assert!(!route.is_group_routed_to(0, &node_0));
    assert!(route.is_group_routed_to(1, &node_0));
}

#[test]
fn generated_keys_take_part_in_routing() {
    let (ctx, route) = try_route_with(
        &rules(),
        "INSERT INTO t_order (user_id, status) VALUES (1, 'a'), (1, 'b')",
        &[],
        None,
    )
    .expect("route");
    let key = ctx
        .insert()
        .and_then(|i| i.generated_key())
        .expect("generated key");
    assert_eq!(key.values(), [Value::Int64(1000), Value::Int64(1001)]);
    assert_eq!(
        route.plan.actual_tables("t_order"),
        [
            DataNode::new("ds_1", "t_order_0"),
            DataNode::new("ds_1", "t_order_1")
        ]
    );
}

#[test]
fn insert_without_database_key_is_rejected() {
    let err = try_route("INSERT INTO t_order (order_id, status) VALUES (1, 'a')", &[])
        .expect_err("row spans two sources");
    assert!(matches!(
        err,
        ShardError::Routing(RoutingError::UnsupportedShape(_))
    ));
}

#[test]
fn hint_values_route_hint_tables() {
    let hint = RouteHint::new()
        .with_database_value(1i64)
        .with_table_value(3i64);
    let (_, route) =
        try_route_with(&rules(), "SELECT * FROM t_hint", &[], Some(&hint)).expect("route");
    assert_eq!(route.strategy, Some(RouteStrategy::Hint));
    assert_eq!(
        route.plan.units(),
        [RouteUnit::new("ds_1").with_table("t_hint", "t_hint_1")]
    );
}

#[test]
fn hint_table_without_values_routes_everywhere() {
    let route = route("SELECT * FROM t_hint", &[]);
    assert_eq!(route.strategy, Some(RouteStrategy::Hint));
    assert_eq!(route.plan.len(), 4);
}

#[test]
fn hint_across_unbound_tables_is_rejected() {
    let hint = RouteHint::new().with_database_value(0i64);
    let err = try_route_with(
        &rules(),
        "SELECT * FROM t_order o JOIN t_account a ON o.user_id = a.account_id",
        &[],
        Some(&hint),
    )
    .expect_err("hint over unbound tables");
    assert!(matches!(
        err,
        ShardError::Routing(RoutingError::UnsupportedShape(_))
    ));
}

#[test]
fn virtual_sharding_column_routes_database() {
    let route = route("SELECT * FROM t_log WHERE shard_key = 3", &[]);
    assert_eq!(route.plan.actual_tables("t_log"), [DataNode::new("ds_1", "t_log")]);
}

#[test]
fn union_merges_duplicate_conditions() {
    let route = route(
        "SELECT order_id FROM t_order WHERE user_id = 1 AND order_id = 1 \
         UNION SELECT order_id FROM t_order WHERE user_id = 1 AND order_id = 1",
        &[],
    );
    assert_eq!(route.conditions.conditions().len(), 1);
    assert_eq!(route.plan.len(), 1);
}

proptest! {
    #[test]
    fn equality_routing_follows_the_inline_expressions(user_id in 0i64..100_000, order_id in 0i64..100_000) {
        let route = route(
            "SELECT * FROM t_order WHERE user_id = ? AND order_id = ?",
            &[Value::Int64(user_id), Value::Int64(order_id)],
        );
        prop_assert_eq!(
            route.plan.actual_tables("t_order"),
            vec![DataNode::new(
                format!("ds_{}", user_id % 2),
                format!("t_order_{}", order_id % 2)
            )]
        );
    }
}
