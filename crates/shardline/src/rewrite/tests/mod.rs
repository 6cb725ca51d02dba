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

use crate::error::Result;
use crate::rewrite::{ExecutionUnit, Rewriter};
use crate::rule::RuleSet;
use crate::testing::{metadata, rules, try_route_with};
use crate::types::Value;

mod encrypt_tests;
mod insert_tests;

pub(super) fn try_rewrite_with(rules: &RuleSet, sql: &str, params: &[Value]) -> Result<Vec<ExecutionUnit>> {
    let metadata = metadata();
    let (ctx, route) = try_route_with(rules, sql, params, None)?;
    Rewriter::new(rules, &metadata).rewrite(&ctx, &route, params)
}

pub(super) fn try_rewrite(sql: &str, params: &[Value]) -> Result<Vec<ExecutionUnit>> {
    try_rewrite_with(&rules(), sql, params)
}

pub(super) fn rewrite(sql: &str, params: &[Value]) -> Vec<ExecutionUnit> {
    try_rewrite(sql, params).unwrap_or_else(|e| panic!("rewrite '{sql}' failed: {e}"))
}

/// `(data source, sql)` pairs in unit order.
pub(super) fn statements(sql: &str, params: &[Value]) -> Vec<(String, String)> {
    rewrite(sql, params)
        .into_iter()
        .map(|u| (u.data_source, u.sql))
        .collect()
}

pub(super) fn pair(data_source: &str, sql: &str) -> (String, String) {
    (data_source.to_string(), sql.to_string())
}

pub(super) fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}
