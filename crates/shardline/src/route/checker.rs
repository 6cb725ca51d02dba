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

//! Route checkers: each one may reject a computed route, none of them narrows it.

use crate::binder::{BoundStatementContext, DdlKind, InsertShape, StatementKind};
use crate::config::FullRouteDmlPolicy;
use crate::error::{Result, RoutingError, ShardError};
use crate::route::{RouteContext, RouteStrategy};
use crate::rule::{RuleSet, ShardingValue};
use crate::sql::{is_placeholder, literal_value, object_name_parts};
use crate::types::Value;
use sqlparser::ast::{AssignmentTarget, Expr, Statement};
use tracing::debug;

/// Everything a checker may look at.
pub struct CheckContext<'a> {
    pub statement: &'a BoundStatementContext,
    pub rules: &'a RuleSet,
    pub route: &'a RouteContext,
    pub params: &'a [Value],
}

pub trait RouteChecker: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, ctx: &CheckContext<'_>) -> Result<()>;
}

fn unsupported(message: impl Into<String>) -> ShardError {
    ShardError::Routing(RoutingError::UnsupportedShape(message.into()))
}

fn violation(message: impl Into<String>) -> ShardError {
    ShardError::Routing(RoutingError::CrossShardViolation(message.into()))
}

/// Every mapping in the plan must be a node of the rule that governs the table.
pub struct PlanConsistencyChecker;

impl RouteChecker for PlanConsistencyChecker {
    fn name(&self) -> &'static str {
        "plan_consistency"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<()> {
        let rule = &ctx.rules.sharding;
        for unit in ctx.route.plan.units() {
            for (logic, actual) in unit.table_mappings() {
                let consistent = match rule.find_table_rule(logic) {
                    Some(table_rule) => table_rule.contains_node(&unit.data_source, actual),
                    None => {
                        rule.is_broadcast_table(logic)
                            && actual.eq_ignore_ascii_case(logic)
                            && rule.data_sources().contains(&unit.data_source)
                    }
                };
                if !consistent {
                    return Err(violation(format!(
                        "route unit maps '{logic}' to '{}.{actual}', which its rule does not define",
                        unit.data_source
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Sharding tables of one statement must meet in every route unit.
pub struct CoLocationChecker;

impl RouteChecker for CoLocationChecker {
    fn name(&self) -> &'static str {
        "co_location"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<()> {
        let tables = &ctx.route.sharding_tables;
        if tables.len() < 2 {
            return Ok(());
        }
        for unit in ctx.route.plan.units() {
            if let Some(missing) = tables.iter().find(|t| !unit.contains_logic_table(t)) {
                return Err(violation(format!(
                    "'{missing}' has no data in '{}' where {} must be joined",
                    unit.data_source,
                    tables
                        .iter()
                        .filter(|t| *t != missing)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Each INSERT row must land on exactly one data node.
pub struct InsertValuesChecker;

impl RouteChecker for InsertValuesChecker {
    fn name(&self) -> &'static str {
        "insert_values"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<()> {
        let Some(insert) = ctx.statement.insert() else {
            return Ok(());
        };
        for (group, nodes) in ctx.route.insert_group_nodes().iter().enumerate() {
            if nodes.len() != 1 {
                return Err(unsupported(format!(
                    "row #{} of INSERT into '{}' routes to {} data nodes, expected exactly one",
                    group + 1,
                    insert.table,
                    nodes.len()
                )));
            }
        }
        Ok(())
    }
}

/// INSERT .. SELECT is only routable when every sharding table is bound together.
pub struct InsertSelectChecker;

impl RouteChecker for InsertSelectChecker {
    fn name(&self) -> &'static str {
        "insert_select"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<()> {
        let Some(insert) = ctx.statement.insert() else {
            return Ok(());
        };
        if !matches!(insert.shape, InsertShape::Select { .. }) {
            return Ok(());
        }
        let rule = &ctx.rules.sharding;
        if !rule.is_sharding_table(&insert.table) {
            return Ok(());
        }
        if insert.generated_key().is_some_and(|k| k.is_generated()) {
            return Err(unsupported(format!(
                "INSERT .. SELECT into '{}' cannot generate keys",
                insert.table
            )));
        }
        if !rule.is_all_binding(&ctx.route.sharding_tables) {
            return Err(unsupported(format!(
                "INSERT .. SELECT into '{}' reads from tables outside its binding group",
                insert.table
            )));
        }
        Ok(())
    }
}

/// UPDATE may only assign a sharding column the value the row is already routed by.
pub struct ShardingKeyUpdateChecker;

impl ShardingKeyUpdateChecker {
    fn assigned_value(ctx: &CheckContext<'_>, column: &str) -> Option<Value> {
        let Statement::Update { assignments, .. } = ctx.statement.statement() else {
            return None;
        };
        let expr: &Expr = assignments.iter().find_map(|a| match &a.target {
            AssignmentTarget::ColumnName(name) => object_name_parts(name)
                .last()
                .filter(|i| i.value.eq_ignore_ascii_case(column))
                .map(|_| &a.value),
            AssignmentTarget::Tuple(_) => None,
        })?;
        if is_placeholder(expr) {
            let Expr::Value(v) = expr else {
                return None;
            };
            let marker = ctx.statement.marker_for_value(v)?;
            return ctx.params.get(marker.index).cloned();
        }
        literal_value(expr)
    }

    /// True when every condition pins `table.column` to exactly `value`.
    fn pinned_to(ctx: &CheckContext<'_>, table: &str, column: &str, value: &Value) -> bool {
        let conditions = ctx.route.conditions.conditions();
        !conditions.is_empty()
            && conditions.iter().all(|condition| {
                condition.values.iter().any(|v| {
                    v.table.eq_ignore_ascii_case(table)
                        && v.column.eq_ignore_ascii_case(column)
                        && matches!(&v.value, ShardingValue::List(list)
                            if list.len() == 1 && list[0].eq(value).unwrap_or(false))
                })
            })
    }
}

impl RouteChecker for ShardingKeyUpdateChecker {
    fn name(&self) -> &'static str {
        "sharding_key_update"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<()> {
        if ctx.statement.kind() != StatementKind::Update {
            return Ok(());
        }
        let rule = &ctx.rules.sharding;
        for assignment in ctx.statement.assignments() {
            let Some(table) = assignment.table.as_deref() else {
                continue;
            };
            if !rule.is_sharding_column(&assignment.column, table) {
                continue;
            }
            let unchanged = Self::assigned_value(ctx, &assignment.column)
                .is_some_and(|v| Self::pinned_to(ctx, table, &assignment.column, &v));
            if !unchanged {
                return Err(unsupported(format!(
                    "UPDATE of sharding column '{table}.{}' may move rows between shards",
                    assignment.column
                )));
            }
        }
        Ok(())
    }
}

/// Sharding tables cannot be renamed in place.
pub struct RenameChecker;

impl RouteChecker for RenameChecker {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<()> {
        if ctx.statement.kind() != StatementKind::Ddl(DdlKind::AlterTable) {
            return Ok(());
        }
        if ctx.statement.rename_to().is_none() {
            return Ok(());
        }
        match ctx.route.sharding_tables.first() {
            Some(table) => Err(unsupported(format!(
                "renaming sharding table '{table}' is not supported"
            ))),
            None => Ok(()),
        }
    }
}

/// Applies [`FullRouteDmlPolicy`] to UPDATE and DELETE without sharding conditions.
pub struct FullRouteDmlChecker;

impl RouteChecker for FullRouteDmlChecker {
    fn name(&self) -> &'static str {
        "full_route_dml"
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<()> {
        if !matches!(
            ctx.statement.kind(),
            StatementKind::Update | StatementKind::Delete
        ) {
            return Ok(());
        }
        if ctx.rules.props.full_route_dml != FullRouteDmlPolicy::Reject {
            return Ok(());
        }
        let route = ctx.route;
        let full_route = route.conditions.is_unconditional()
            && !route.sharding_tables.is_empty()
            && route.strategy != Some(RouteStrategy::Hint)
            && route.plan.len() > 1;
        if full_route {
            return Err(unsupported(format!(
                "{} without sharding condition would touch {} physical tables",
                ctx.statement.kind().label().to_ascii_uppercase(),
                route.plan.len()
            )));
        }
        Ok(())
    }
}

/// Ordered checkers run after routing.
pub struct CheckerChain {
    checkers: Vec<Box<dyn RouteChecker>>,
}

impl Default for CheckerChain {
    fn default() -> Self {
        Self {
            checkers: vec![
                Box::new(PlanConsistencyChecker),
                Box::new(CoLocationChecker),
                Box::new(InsertValuesChecker),
                Box::new(InsertSelectChecker),
                Box::new(ShardingKeyUpdateChecker),
                Box::new(RenameChecker),
                Box::new(FullRouteDmlChecker),
            ],
        }
    }
}

impl CheckerChain {
    pub fn empty() -> Self {
        Self {
            checkers: Vec::new(),
        }
    }

    pub fn with(mut self, checker: impl RouteChecker + 'static) -> Self {
        self.checkers.push(Box::new(checker));
        self
    }

    pub fn check(&self, ctx: &CheckContext<'_>) -> Result<()> {
        for checker in &self.checkers {
            if let Err(e) = checker.check(ctx) {
                debug!(checker = checker.name(), error = %e, "route rejected");
                return Err(e);
            }
        }
        Ok(())
    }
}
