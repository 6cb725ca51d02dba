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

//! Routing: decides which data nodes a bound statement runs on.

pub mod cache;
pub mod checker;
pub mod condition;
pub mod plan;
pub mod strategy;

pub use cache::{normalize_sql, RouteCache, RouteCacheStats, RouteFingerprint};
pub use checker::{CheckContext, CheckerChain, RouteChecker};
pub use condition::{
    ConditionExtractor, ConditionOperator, ShardingCondition, ShardingConditionValue,
    ShardingConditions,
};
pub use plan::{RoutePlan, RouteUnit};
pub use strategy::{route_data_nodes, RouteInput, RouteStrategy, UnconditionalScope};

use crate::binder::{BoundStatementContext, InsertContext, InsertShape, StatementKind};
use crate::error::Result;
use crate::metadata::MetaDataSnapshot;
use crate::rule::{DataNode, RuleSet};
use crate::types::Value;
use std::collections::BTreeSet;
use tracing::debug;

/// Sharding values supplied by the caller instead of being read from predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteHint {
    pub database_values: Vec<Value>,
    pub table_values: Vec<Value>,
}

impl RouteHint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database_value(mut self, value: impl Into<Value>) -> Self {
        self.database_values.push(value.into());
        self
    }

    pub fn with_table_value(mut self, value: impl Into<Value>) -> Self {
        self.table_values.push(value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.database_values.is_empty() && self.table_values.is_empty()
    }
}

/// Result of routing one statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteContext {
    pub plan: RoutePlan,
    /// `None` when the statement touches no governed table.
    pub strategy: Option<RouteStrategy>,
    pub conditions: ShardingConditions,
    /// Sharding tables of the statement in first-seen order.
    pub sharding_tables: Vec<String>,
    insert_nodes: Vec<BTreeSet<DataNode>>,
}

impl RouteContext {
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when no governed table is involved.
    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }

    /// Data nodes per INSERT value group of a sharding table; empty otherwise.
    pub fn insert_group_nodes(&self) -> &[BTreeSet<DataNode>] {
        &self.insert_nodes
    }

    /// Whether INSERT value group `group` belongs to `node`. Rows of tables that are
    /// not sharded go everywhere.
    pub fn is_group_routed_to(&self, group: usize, node: &DataNode) -> bool {
        match self.insert_nodes.get(group) {
            Some(nodes) => nodes.contains(node),
            None => self.insert_nodes.is_empty(),
        }
    }
}

pub struct Router<'a> {
    rules: &'a RuleSet,
    metadata: &'a MetaDataSnapshot,
    cache: Option<&'a RouteCache>,
    checkers: CheckerChain,
}

impl<'a> Router<'a> {
    pub fn new(rules: &'a RuleSet, metadata: &'a MetaDataSnapshot) -> Self {
        Self {
            rules,
            metadata,
            cache: None,
            checkers: CheckerChain::default(),
        }
    }

    pub fn with_cache(mut self, cache: &'a RouteCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_checkers(mut self, checkers: CheckerChain) -> Self {
        self.checkers = checkers;
        self
    }

    pub fn route(
        &self,
        ctx: &BoundStatementContext,
        params: &[Value],
        hint: Option<&RouteHint>,
    ) -> Result<RouteContext> {
        let generates_keys = ctx
            .insert()
            .and_then(InsertContext::generated_key)
            .is_some_and(|k| k.is_generated());
        match self.cache {
            Some(cache) if !generates_keys => {
                let fingerprint = RouteFingerprint::new(
                    ctx.sql(),
                    params,
                    hint,
                    self.rules.version(),
                    self.metadata.version(),
                )
                .with_databases(ctx.tables().database_names());
                cache
                    .get_or_route(&fingerprint, || self.route_uncached(ctx, params, hint))
                    .map(|route| (*route).clone())
            }
            _ => self.route_uncached(ctx, params, hint),
        }
    }

    fn route_uncached(
        &self,
        ctx: &BoundStatementContext,
        params: &[Value],
        hint: Option<&RouteHint>,
    ) -> Result<RouteContext> {
        let rule = &self.rules.sharding;
        let mut sharding_tables: Vec<String> = Vec::new();
        let mut broadcast_tables = Vec::new();
        for name in ctx.tables().table_names() {
            if let Some(table_rule) = rule.find_table_rule(name) {
                if !sharding_tables.contains(&table_rule.logic_table) {
                    sharding_tables.push(table_rule.logic_table.clone());
                }
            } else if rule.is_broadcast_table(name) {
                broadcast_tables.push(name.clone());
            }
        }
        if sharding_tables.is_empty() && broadcast_tables.is_empty() && ctx.kind() != StatementKind::Tcl
        {
            debug!(sql = ctx.sql(), "no governed table, empty route");
            return Ok(RouteContext::empty());
        }

        let hinted = hint.is_some_and(|h| !h.is_empty());
        let mut conditions = if hinted {
            ShardingConditions::default()
        } else {
            ConditionExtractor::new(
                ctx,
                rule,
                self.metadata,
                params,
                self.rules.props.max_condition_groups,
            )
            .extract()?
        };
        let insert_nodes = if hinted {
            Vec::new()
        } else {
            self.insert_nodes(ctx, &conditions)?
        };
        let batched = ctx.kind() == StatementKind::Insert
            || ctx.contains_subquery()
            || !ctx.combines().is_empty();
        if self.rules.props.merge_conditions && batched && conditions.conditions().len() > 1 {
            conditions.merge();
        }

        let input = RouteInput {
            kind: ctx.kind(),
            rule,
            sharding_tables,
            broadcast_tables,
            conditions: &conditions,
            hint,
        };
        let strategy = RouteStrategy::select(&input)?;
        let plan = strategy.route(&input)?;
        let sharding_tables = input.sharding_tables;
        let route = RouteContext {
            plan,
            strategy: Some(strategy),
            sharding_tables,
            conditions,
            insert_nodes,
        };
        self.checkers.check(&CheckContext {
            statement: ctx,
            rules: self.rules,
            route: &route,
            params,
        })?;
        debug!(
            strategy = strategy.label(),
            units = route.plan.len(),
            "statement routed"
        );
        Ok(route)
    }

    /// Nodes each INSERT value group routes to, computed before conditions are merged.
    fn insert_nodes(
        &self,
        ctx: &BoundStatementContext,
        conditions: &ShardingConditions,
    ) -> Result<Vec<BTreeSet<DataNode>>> {
        let Some(insert) = ctx.insert() else {
            return Ok(Vec::new());
        };
        if matches!(insert.shape, InsertShape::Select { .. }) {
            return Ok(Vec::new());
        }
        let Some(table_rule) = self.rules.sharding.find_table_rule(&insert.table) else {
            return Ok(Vec::new());
        };
        let mut out = vec![BTreeSet::new(); insert.groups.len()];
        for condition in conditions.conditions() {
            let Some(group) = condition.group else {
                continue;
            };
            let values = condition.values_for(&[table_rule.logic_table.as_str()])?;
            if let Some(slot) = out.get_mut(group) {
                slot.extend(route_data_nodes(table_rule, &values, None)?);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests;
