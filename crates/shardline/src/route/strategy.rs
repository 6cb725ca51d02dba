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

//! Route strategy selection and the routing performed by each strategy.

use crate::binder::StatementKind;
use crate::error::{Result, RoutingError, ShardError};
use crate::route::condition::ShardingConditions;
use crate::route::plan::{RoutePlan, RouteUnit};
use crate::route::RouteHint;
use crate::rule::{DataNode, ShardingRule, ShardingValue, TableRule};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnconditionalScope {
    /// Every data node of the statement's sharding tables.
    AllTableNodes,
    /// Every data source once.
    AllDataSources,
    /// A single node.
    Unicast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteStrategy {
    Standard,
    Complex,
    Hint,
    Unconditional(UnconditionalScope),
}

/// The statement facts a strategy routes on.
#[derive(Debug)]
pub struct RouteInput<'a> {
    pub kind: StatementKind,
    pub rule: &'a ShardingRule,
    /// Sharding tables in first-seen order.
    pub sharding_tables: Vec<String>,
    pub broadcast_tables: Vec<String>,
    pub conditions: &'a ShardingConditions,
    pub hint: Option<&'a RouteHint>,
}

impl RouteInput<'_> {
    fn table_rule(&self, name: &str) -> Result<&TableRule> {
        self.rule.find_table_rule(name).ok_or_else(|| {
            ShardError::Routing(RoutingError::NoRouteTarget(format!(
                "'{name}' is not a sharding table"
            )))
        })
    }

    fn hint_supplied(&self) -> bool {
        self.hint.is_some_and(|h| !h.is_empty())
    }
}

impl RouteStrategy {
    /// Picks the strategy for a statement touching at least one governed table.
    pub fn select(input: &RouteInput<'_>) -> Result<Self> {
        let rule = input.rule;
        let sharding = &input.sharding_tables;
        let all_binding = rule.is_all_binding(sharding);
        let strategy = match input.kind {
            StatementKind::Tcl => Self::Unconditional(UnconditionalScope::AllDataSources),
            StatementKind::Dal(_) => Self::Unconditional(UnconditionalScope::Unicast),
            StatementKind::Dcl | StatementKind::Ddl(_) if sharding.is_empty() => {
                Self::Unconditional(UnconditionalScope::AllDataSources)
            }
            StatementKind::Dcl | StatementKind::Ddl(_) if all_binding => {
                Self::Unconditional(UnconditionalScope::AllTableNodes)
            }
            StatementKind::Dcl | StatementKind::Ddl(_) => {
                return Err(ShardError::Routing(RoutingError::UnsupportedShape(format!(
                    "{} statement spans non-binding sharding tables {}",
                    input.kind.label(),
                    sharding.join(", ")
                ))))
            }
            kind if sharding.is_empty() => {
                if kind.is_query() {
                    Self::Unconditional(UnconditionalScope::Unicast)
                } else {
                    Self::Unconditional(UnconditionalScope::AllDataSources)
                }
            }
            _ if input.hint_supplied()
                || sharding
                    .iter()
                    .any(|t| rule.find_table_rule(t).is_some_and(TableRule::uses_hint)) =>
            {
                if !all_binding {
                    return Err(ShardError::Routing(RoutingError::UnsupportedShape(
                        "hint routing requires a single sharding table or one binding group"
                            .to_string(),
                    )));
                }
                Self::Hint
            }
            _ if input.conditions.is_always_false() => {
                Self::Unconditional(UnconditionalScope::Unicast)
            }
            _ if all_binding => Self::Standard,
            _ => Self::Complex,
        };
        debug!(
            strategy = strategy.label(),
            kind = input.kind.label(),
            tables = ?sharding,
            "route strategy selected"
        );
        Ok(strategy)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Complex => "complex",
            Self::Hint => "hint",
            Self::Unconditional(UnconditionalScope::AllTableNodes) => "all_table_nodes",
            Self::Unconditional(UnconditionalScope::AllDataSources) => "all_data_sources",
            Self::Unconditional(UnconditionalScope::Unicast) => "unicast",
        }
    }

    pub fn route(&self, input: &RouteInput<'_>) -> Result<RoutePlan> {
        let units = match self {
            Self::Standard => route_standard(input, NodeSource::Conditions)?,
            Self::Hint => route_standard(input, NodeSource::Hint)?,
            Self::Complex => route_complex(input)?,
            Self::Unconditional(UnconditionalScope::AllTableNodes) => {
                route_standard(input, NodeSource::Everything)?
            }
            Self::Unconditional(UnconditionalScope::AllDataSources) => route_data_sources(input),
            Self::Unconditional(UnconditionalScope::Unicast) => route_unicast(input)?,
        };
        Ok(RoutePlan::new(units))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum NodeSource {
    Conditions,
    Hint,
    Everything,
}

/// Data nodes of one table for the given column values, or for hint values when
/// `hint` is set. Database routing runs first, then table routing per data source.
pub fn route_data_nodes(
    table_rule: &TableRule,
    values: &BTreeMap<String, ShardingValue>,
    hint: Option<&RouteHint>,
) -> Result<Vec<DataNode>> {
    let logic = table_rule.logic_table.as_str();
    let sources = table_rule.data_sources();
    let routed_sources = match hint {
        Some(h) => table_rule
            .database_strategy
            .do_hint_sharding(&sources, logic, &h.database_values)?,
        None => table_rule
            .database_strategy
            .do_sharding(&sources, logic, values)?,
    };
    let mut nodes = Vec::new();
    for ds in routed_sources {
        let tables = table_rule.actual_tables_in(&ds);
        let routed_tables = match hint {
            Some(h) => table_rule
                .table_strategy
                .do_hint_sharding(&tables, logic, &h.table_values)?,
            None => table_rule.table_strategy.do_sharding(&tables, logic, values)?,
        };
        nodes.extend(routed_tables.into_iter().map(|t| DataNode::new(ds.clone(), t)));
    }
    Ok(nodes)
}

/// Nodes of `table_rule` for every condition; constraints are read from `tables`.
fn nodes_for_conditions(
    input: &RouteInput<'_>,
    table_rule: &TableRule,
    tables: &[&str],
) -> Result<BTreeSet<DataNode>> {
    let mut nodes = BTreeSet::new();
    if input.conditions.is_empty() {
        nodes.extend(route_data_nodes(table_rule, &BTreeMap::new(), None)?);
        return Ok(nodes);
    }
    for condition in input.conditions.conditions() {
        let values = condition.values_for(tables)?;
        nodes.extend(route_data_nodes(table_rule, &values, None)?);
    }
    Ok(nodes)
}

fn no_route(table: &str) -> ShardError {
    ShardError::Routing(RoutingError::NoRouteTarget(format!(
        "sharding values of '{table}' match no data node"
    )))
}

fn route_standard(input: &RouteInput<'_>, source: NodeSource) -> Result<Vec<RouteUnit>> {
    let Some(primary) = input.sharding_tables.first() else {
        return Ok(route_data_sources(input));
    };
    let primary_rule = input.table_rule(primary)?;
    let names = input
        .sharding_tables
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>();
    let nodes = match source {
        NodeSource::Conditions => nodes_for_conditions(input, primary_rule, &names)?,
        NodeSource::Hint => {
            let empty = RouteHint::default();
            let hint = input.hint.unwrap_or(&empty);
            route_data_nodes(primary_rule, &BTreeMap::new(), Some(hint))?
                .into_iter()
                .collect()
        }
        NodeSource::Everything => route_data_nodes(primary_rule, &BTreeMap::new(), None)?
            .into_iter()
            .collect(),
    };
    if nodes.is_empty() {
        return Err(no_route(primary));
    }
    nodes
        .into_iter()
        .map(|node| binding_unit(input, primary_rule, node))
        .collect()
}

/// Unit for one node of the primary table; binding tables take the actual table at
/// the same position.
fn binding_unit(input: &RouteInput<'_>, primary: &TableRule, node: DataNode) -> Result<RouteUnit> {
    let index = primary
        .actual_table_index(&node.data_source, &node.table)
        .ok_or_else(|| no_route(&primary.logic_table))?;
    let mut unit = RouteUnit::new(node.data_source.clone()).with_table(&primary.logic_table, &node.table);
    for name in input.sharding_tables.iter().skip(1) {
        let rule = input.table_rule(name)?;
        let actual = rule
            .actual_tables_in(&node.data_source)
            .into_iter()
            .nth(index)
            .ok_or_else(|| {
                ShardError::Routing(RoutingError::CrossShardViolation(format!(
                    "binding table '{name}' has no actual table #{index} in '{}'",
                    node.data_source
                )))
            })?;
        unit.map_table(name, actual);
    }
    add_broadcast(input, &mut unit);
    Ok(unit)
}

fn add_broadcast(input: &RouteInput<'_>, unit: &mut RouteUnit) {
    for name in &input.broadcast_tables {
        unit.map_table(name, name.clone());
    }
}

/// Routes each table on its own and joins the results per data source. Units in a
/// data source that lacks one of the tables are kept so the checker can reject them.
fn route_complex(input: &RouteInput<'_>) -> Result<Vec<RouteUnit>> {
    let mut per_source: BTreeMap<String, Vec<(String, Vec<String>)>> = BTreeMap::new();
    for name in &input.sharding_tables {
        let rule = input.table_rule(name)?;
        let nodes = nodes_for_conditions(input, rule, &[name.as_str()])?;
        if nodes.is_empty() {
            return Err(no_route(name));
        }
        for node in nodes {
            let tables = per_source.entry(node.data_source).or_default();
            match tables.iter_mut().find(|(t, _)| t == name) {
                Some((_, actual)) => actual.push(node.table),
                None => tables.push((name.clone(), vec![node.table])),
            }
        }
    }
    let mut units = Vec::new();
    for (ds, tables) in per_source {
        let mut partial = vec![RouteUnit::new(ds.clone())];
        for (logic, actuals) in &tables {
            partial = partial
                .iter()
                .flat_map(|unit| {
                    actuals
                        .iter()
                        .map(|actual| unit.clone().with_table(logic, actual.clone()))
                })
                .collect();
        }
        for mut unit in partial {
            add_broadcast(input, &mut unit);
            units.push(unit);
        }
    }
    Ok(units)
}

fn route_data_sources(input: &RouteInput<'_>) -> Vec<RouteUnit> {
    input
        .rule
        .data_sources()
        .iter()
        .map(|ds| {
            let mut unit = RouteUnit::new(ds.clone());
            add_broadcast(input, &mut unit);
            unit
        })
        .collect()
}

fn route_unicast(input: &RouteInput<'_>) -> Result<Vec<RouteUnit>> {
    if input.sharding_tables.is_empty() {
        return Ok(route_data_sources(input).into_iter().take(1).collect());
    }
    let everything = ShardingConditions::default();
    let full = RouteInput {
        kind: input.kind,
        rule: input.rule,
        sharding_tables: input.sharding_tables.clone(),
        broadcast_tables: input.broadcast_tables.clone(),
        conditions: &everything,
        hint: None,
    };
    let candidates = if input.rule.is_all_binding(&input.sharding_tables) {
        route_standard(&full, NodeSource::Everything)?
    } else {
        route_complex(&full)?
    };
    let mut sorted = RoutePlan::new(candidates).units().to_vec();
    sorted.retain(|u| input.sharding_tables.iter().all(|t| u.contains_logic_table(t)));
    sorted.truncate(1);
    if sorted.is_empty() {
        return Err(ShardError::Routing(RoutingError::CrossShardViolation(format!(
            "tables {} share no data source",
            input.sharding_tables.join(", ")
        ))));
    }
    Ok(sorted)
}

