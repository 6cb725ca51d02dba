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

//! Route cache: an LRU of computed routes keyed by statement fingerprint, with at
//! most one routing computation in flight per fingerprint.

use crate::error::{Result, ShardError};
use crate::route::{RouteContext, RouteHint};
use crate::types::Value;
use lru::LruCache;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Identity of one routing computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteFingerprint {
    sql: String,
    parameters: Vec<String>,
    hint: Option<(Vec<String>, Vec<String>)>,
    rule_version: u64,
    metadata_version: u64,
    databases: Vec<String>,
}

impl RouteFingerprint {
    pub fn new(
        sql: &str,
        params: &[Value],
        hint: Option<&RouteHint>,
        rule_version: u64,
        metadata_version: u64,
    ) -> Self {
        Self {
            sql: normalize_sql(sql),
            parameters: params.iter().map(value_key).collect(),
            hint: hint.filter(|h| !h.is_empty()).map(|h| {
                (
                    h.database_values.iter().map(value_key).collect(),
                    h.table_values.iter().map(value_key).collect(),
                )
            }),
            rule_version,
            metadata_version,
            databases: Vec::new(),
        }
    }

    /// Databases the statement resolved against, so that the same text bound
    /// under another current database gets its own entry.
    pub fn with_databases(mut self, databases: &[String]) -> Self {
        self.databases = databases.iter().map(|d| d.to_ascii_lowercase()).collect();
        self
    }

    pub fn rule_version(&self) -> u64 {
        self.rule_version
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

fn value_key(value: &Value) -> String {
    format!("{}:{}", value.type_name(), value.to_sql_literal())
}

/// Collapses whitespace runs outside quoted text.
pub fn normalize_sql(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;
    for c in sql.trim().chars() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c.is_whitespace() => pending_space = true,
            None => {
                if pending_space {
                    out.push(' ');
                    pending_space = false;
                }
                if matches!(c, '\'' | '"' | '`') {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

#[derive(Debug, Error)]
pub(crate) enum CacheError {
    #[error("fingerprint rule version {fingerprint} does not match cache rule version {cache}")]
    VersionMismatch { cache: u64, fingerprint: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

enum FlightState {
    Pending,
    Done(Option<Arc<RouteContext>>),
}

struct Flight {
    state: Mutex<FlightState>,
    ready: Condvar,
}

impl Flight {
    fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Pending),
            ready: Condvar::new(),
        }
    }

    /// Blocks until the leader finishes; `None` when it failed.
    fn wait(&self) -> Option<Arc<RouteContext>> {
        let mut state = self.state.lock();
        while matches!(*state, FlightState::Pending) {
            self.ready.wait(&mut state);
        }
        match &*state {
            FlightState::Done(result) => result.clone(),
            FlightState::Pending => None,
        }
    }

    fn complete(&self, result: Option<Arc<RouteContext>>) {
        *self.state.lock() = FlightState::Done(result);
        self.ready.notify_all();
    }
}

/// Releases waiters even when the leader unwinds.
struct FlightGuard<'a> {
    cache: &'a RouteCache,
    fingerprint: &'a RouteFingerprint,
    flight: &'a Flight,
    done: bool,
}

impl FlightGuard<'_> {
    fn finish(&mut self, result: Option<Arc<RouteContext>>) {
        self.cache.in_flight.lock().remove(self.fingerprint);
        self.flight.complete(result);
        self.done = true;
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.finish(None);
        }
    }
}

/// Created once per rule activation and shared by every router of that activation.
pub struct RouteCache {
    rule_version: u64,
    entries: Mutex<LruCache<RouteFingerprint, Arc<RouteContext>>>,
    in_flight: Mutex<HashMap<RouteFingerprint, Arc<Flight>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for RouteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteCache")
            .field("rule_version", &self.rule_version)
            .field("stats", &self.stats())
            .finish()
    }
}

impl RouteCache {
    pub fn new(capacity: usize, rule_version: u64) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| ShardError::Config("route cache capacity must be > 0".to_string()))?;
        Ok(Self {
            rule_version,
            entries: Mutex::new(LruCache::new(capacity)),
            in_flight: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn rule_version(&self) -> u64 {
        self.rule_version
    }

    pub fn stats(&self) -> RouteCacheStats {
        RouteCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().len(),
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Returns the cached route for `fingerprint`, computing it with `route` on a miss.
    /// Concurrent callers with the same fingerprint wait for the in-flight computation
    /// and compute on their own only if it fails. Cache faults fall back to `route`.
    pub fn get_or_route<F>(&self, fingerprint: &RouteFingerprint, route: F) -> Result<Arc<RouteContext>>
    where
        F: Fn() -> Result<RouteContext>,
    {
        match self.try_get_or_route(fingerprint, &route) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "route cache bypassed");
                route().map(Arc::new)
            }
        }
    }

    fn try_get_or_route<F>(
        &self,
        fingerprint: &RouteFingerprint,
        route: &F,
    ) -> std::result::Result<Result<Arc<RouteContext>>, CacheError>
    where
        F: Fn() -> Result<RouteContext>,
    {
        if fingerprint.rule_version != self.rule_version {
            return Err(CacheError::VersionMismatch {
                cache: self.rule_version,
                fingerprint: fingerprint.rule_version,
            });
        }
        if let Some(hit) = self.lookup(fingerprint) {
            return Ok(Ok(hit));
        }

        let (flight, leader) = {
            let mut in_flight = self.in_flight.lock();
            // A leader may have finished between the lookup and taking the lock.
            if let Some(hit) = self.lookup(fingerprint) {
                return Ok(Ok(hit));
            }
            match in_flight.get(fingerprint) {
                Some(flight) => (Arc::clone(flight), false),
                None => {
                    let flight = Arc::new(Flight::new());
                    in_flight.insert(fingerprint.clone(), Arc::clone(&flight));
                    (flight, true)
                }
            }
        };

        self.misses.fetch_add(1, Ordering::Relaxed);
        if !leader {
            return Ok(match flight.wait() {
                Some(ctx) => Ok(ctx),
                None => route().map(Arc::new),
            });
        }

        let mut guard = FlightGuard {
            cache: self,
            fingerprint,
            flight: &flight,
            done: false,
        };
        let outcome = route().map(Arc::new);
        match &outcome {
            Ok(ctx) => {
                self.entries.lock().put(fingerprint.clone(), Arc::clone(ctx));
                guard.finish(Some(Arc::clone(ctx)));
            }
            Err(_) => guard.finish(None),
        }
        Ok(outcome)
    }

    fn lookup(&self, fingerprint: &RouteFingerprint) -> Option<Arc<RouteContext>> {
        let hit = self.entries.lock().get(fingerprint).cloned();
        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }
}
