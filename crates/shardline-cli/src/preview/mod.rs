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

//! Route previews: load rules and metadata, prepare one statement, and render the
//! execution units without touching any data source.

use crate::cli::{Cli, OutputFormat};
use serde::Serialize;
use shardline::{
    MetaDataSnapshot, PrepareOptions, RouteHint, RuleConfiguration, ShardError, ShardingEngine,
    Value,
};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error(transparent)]
    Shard(#[from] ShardError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PreviewError>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitPreview {
    pub data_source: String,
    pub sql: String,
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePreview {
    pub logic_sql: String,
    pub strategy: Option<String>,
    pub units: Vec<UnitPreview>,
}

impl RoutePreview {
    pub fn render_text(&self) -> String {
        let mut out = format!("Logic SQL: {}\n", self.logic_sql);
        if let Some(strategy) = &self.strategy {
            out.push_str(&format!("Strategy: {strategy}\n"));
        }
        for unit in &self.units {
            out.push_str(&format!("{} ::: {}", unit.data_source, unit.sql));
            if !unit.parameters.is_empty() {
                out.push_str(&format!(" ::: [{}]", unit.parameters.join(", ")));
            }
            out.push('\n');
        }
        out
    }
}

/// Parses a `--param` argument.
pub fn parse_param(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Ok(b) = trimmed.to_ascii_lowercase().parse::<bool>() {
        return Value::Boolean(b);
    }
    if let Some(quoted) = trimmed
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return Value::Text(quoted.replace("''", "'"));
    }
    Value::from_number_literal(trimmed).unwrap_or_else(|_| Value::Text(text.to_string()))
}

/// Builds an engine from rule and metadata files. Environment overrides apply to the
/// loaded properties.
pub fn load_engine(config: &Path, metadata: &Path) -> Result<ShardingEngine> {
    let mut rules = RuleConfiguration::load(config)?;
    rules.props.apply_env_overrides();
    let metadata = MetaDataSnapshot::load(metadata)?;
    debug!(
        data_sources = rules.data_sources.len(),
        tables = rules.sharding.tables.len(),
        "loaded rule configuration"
    );
    Ok(ShardingEngine::new(&rules, metadata)?)
}

pub fn preview(
    engine: &ShardingEngine,
    sql: &str,
    params: &[Value],
    options: &PrepareOptions,
) -> Result<RoutePreview> {
    let ctx = engine.prepare_with(sql, params, options)?;
    Ok(RoutePreview {
        logic_sql: sql.to_string(),
        strategy: ctx.route.strategy.map(|s| format!("{s:?}")),
        units: ctx
            .units
            .into_iter()
            .map(|u| UnitPreview {
                parameters: u.parameters.iter().map(Value::to_sql_literal).collect(),
                data_source: u.data_source,
                sql: u.sql,
            })
            .collect(),
    })
}

fn prepare_options(cli: &Cli) -> PrepareOptions {
    let mut options = PrepareOptions {
        dialect: cli.dialect.into(),
        ..PrepareOptions::default()
    };
    if let Some(database) = &cli.database {
        options = options.with_current_database(database.clone());
    }
    let mut hint = RouteHint::new();
    if let Some(v) = &cli.hint_database {
        hint = hint.with_database_value(parse_param(v));
    }
    if let Some(v) = &cli.hint_table {
        hint = hint.with_table_value(parse_param(v));
    }
    if !hint.is_empty() {
        options = options.with_hint(hint);
    }
    options
}

/// Runs one preview and returns the rendered output.
pub fn run(cli: &Cli) -> Result<String> {
    let engine = load_engine(&cli.config, &cli.metadata)?;
    let params = cli.params.iter().map(|p| parse_param(p)).collect::<Vec<_>>();
    let preview = preview(&engine, &cli.sql, &params, &prepare_options(cli))?;
    match cli.format {
        OutputFormat::Text => Ok(preview.render_text()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&preview)? + "\n"),
    }
}
