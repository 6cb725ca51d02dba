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

pub mod binder;
pub mod config;
pub mod error;
pub mod merge;
pub mod metadata;
pub mod rewrite;
pub mod route;
pub mod rule;
pub mod sql;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use binder::{BindOptions, BoundStatementContext, StatementKind};
pub use config::RuleConfiguration;
pub use error::{Result, ShardError};
pub use merge::{MergedResult, QueryResult};
pub use metadata::{MetaDataRegistry, MetaDataSnapshot};
pub use rewrite::ExecutionUnit;
pub use route::{RouteCacheStats, RouteContext, RouteHint};
pub use rule::{AlgorithmRegistry, RuleSet};
pub use sql::SqlDialect;
pub use types::Value;

use crate::binder::{Binder, GeneratedKeyResolver};
use crate::merge::MergeEngine;
use crate::rewrite::Rewriter;
use crate::route::{RouteCache, Router};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Per-statement options for [`ShardingEngine::prepare`].
#[derive(Debug, Clone, Default)]
pub struct PrepareOptions {
    pub dialect: SqlDialect,
    pub bind: BindOptions,
    pub hint: Option<RouteHint>,
}

impl PrepareOptions {
    pub fn with_hint(mut self, hint: RouteHint) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn with_current_database(mut self, database: impl Into<String>) -> Self {
        self.bind = self.bind.with_current_database(database);
        self
    }
}

/// A statement ready for execution, together with what the merger needs afterwards.
#[derive(Debug)]
pub struct ExecutionContext {
    pub statement: BoundStatementContext,
    pub route: RouteContext,
    pub units: Vec<ExecutionUnit>,
    rules: Arc<RuleSet>,
}

impl ExecutionContext {
    /// Rule set the statement was prepared under.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }
}

#[derive(Debug)]
struct Activation {
    rules: Arc<RuleSet>,
    cache: Option<RouteCache>,
}

impl Activation {
    fn new(rules: RuleSet) -> Result<Self> {
        let cache = if rules.props.route_cache.enabled {
            Some(RouteCache::new(
                rules.props.route_cache.capacity,
                rules.version(),
            )?)
        } else {
            None
        };
        Ok(Self {
            rules: Arc::new(rules),
            cache,
        })
    }
}

/// Entry point tying the pipeline stages together.
///
/// Statements prepared concurrently with [`ShardingEngine::activate`] or a metadata
/// publish keep the rule set and snapshot they started with.
pub struct ShardingEngine {
    registry: AlgorithmRegistry,
    metadata: MetaDataRegistry,
    active: RwLock<Arc<Activation>>,
}

impl ShardingEngine {
    pub fn new(config: &RuleConfiguration, metadata: MetaDataSnapshot) -> Result<Self> {
        Self::with_registry(config, metadata, AlgorithmRegistry::with_builtins())
    }

    pub fn with_registry(
        config: &RuleConfiguration,
        metadata: MetaDataSnapshot,
        registry: AlgorithmRegistry,
    ) -> Result<Self> {
        let rules = RuleSet::build(config, &registry, 1)?;
        let active = Activation::new(rules)?;
        Ok(Self {
            registry,
            metadata: MetaDataRegistry::new(metadata),
            active: RwLock::new(Arc::new(active)),
        })
    }

    /// Builds and activates a new rule set. The previous route cache is dropped with it.
    pub fn activate(&self, config: &RuleConfiguration) -> Result<u64> {
        let mut active = self.active.write();
        let version = active.rules.version().saturating_add(1);
        let next = Activation::new(RuleSet::build(config, &self.registry, version)?)?;
        *active = Arc::new(next);
        info!(version, "activated rule set");
        Ok(version)
    }

    pub fn rules(&self) -> Arc<RuleSet> {
        Arc::clone(&self.active.read().rules)
    }

    pub fn metadata(&self) -> &MetaDataRegistry {
        &self.metadata
    }

    pub fn cache_stats(&self) -> Option<RouteCacheStats> {
        self.active.read().cache.as_ref().map(RouteCache::stats)
    }

    pub fn prepare(&self, sql: &str, params: &[Value]) -> Result<ExecutionContext> {
        self.prepare_with(sql, params, &PrepareOptions::default())
    }

    pub fn prepare_with(
        &self,
        sql: &str,
        params: &[Value],
        options: &PrepareOptions,
    ) -> Result<ExecutionContext> {
        let active = Arc::clone(&self.active.read());
        let metadata = self.metadata.snapshot();

        let parsed = options.dialect.parse_statement(sql)?;
        let mut statement =
            Binder::with_options(&metadata, options.bind.clone()).bind(parsed, sql)?;
        GeneratedKeyResolver::attach(&mut statement, &metadata, &active.rules.sharding, params)?;

        let mut router = Router::new(&active.rules, &metadata);
        if let Some(cache) = &active.cache {
            router = router.with_cache(cache);
        }
        let route = router.route(&statement, params, options.hint.as_ref())?;
        let units = Rewriter::new(&active.rules, &metadata).rewrite(&statement, &route, params)?;
        debug!(
            kind = statement.kind().label(),
            strategy = ?route.strategy,
            units = units.len(),
            "prepared statement"
        );

        if active.rules.props.sql_show {
            info!(target: "shardline::sql_show", "Logic SQL: {sql}");
            for unit in &units {
                info!(target: "shardline::sql_show", "Actual SQL: {unit}");
            }
        }
        Ok(ExecutionContext {
            statement,
            route,
            units,
            rules: Arc::clone(&active.rules),
        })
    }

    /// Merges one result per execution unit of `ctx`, in unit order.
    pub fn merge(
        &self,
        ctx: &ExecutionContext,
        results: Vec<Box<dyn QueryResult>>,
    ) -> Result<MergedResult> {
        MergeEngine::new(&ctx.rules).merge(results, &ctx.statement)
    }
}
