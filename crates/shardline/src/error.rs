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

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShardError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("binding error: {0}")]
    Binding(#[from] BindingError),

    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("rewrite error: {0}")]
    Rewrite(#[from] RewriteError),

    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("type error: {0}")]
    Type(String),

    /// Raised by executor-side result streams handed to the merger.
    #[error("execution error: {0}")]
    Execution(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("column '{column}' is ambiguous")]
    AmbiguousColumn { column: String },

    #[error("table '{table}' does not exist")]
    UnknownTable { table: String },

    #[error("column '{column}' does not exist")]
    UnknownColumn { column: String },

    #[error("database '{database}' does not exist")]
    UnknownDatabase { database: String },

    #[error("alias '{alias}' is declared more than once")]
    DuplicateAlias { alias: String },

    #[error("unsupported statement: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("no route target for statement: {0}")]
    NoRouteTarget(String),

    #[error("unsupported routing shape: {0}")]
    UnsupportedShape(String),

    #[error("cross-shard invariant violated: {0}")]
    CrossShardViolation(String),

    #[error("missing sharding value for '{table}.{column}'")]
    MissingShardingValue { table: String, column: String },

    #[error("sharding algorithm '{algorithm}' failed: {message}")]
    Algorithm { algorithm: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteError {
    #[error("derived value unavailable: {0}")]
    MissingDerivedValue(String),

    #[error("unsupported predicate on encrypted column '{column}': {operator}")]
    UnsupportedEncryptPredicate { column: String, operator: String },

    #[error("sql tokens overlap at [{first_start}, {first_stop}) and [{second_start}, {second_stop})")]
    OverlappingTokens {
        first_start: usize,
        first_stop: usize,
        second_start: usize,
        second_stop: usize,
    },

    #[error("segment position unavailable: {0}")]
    SegmentPosition(String),

    #[error("numbered parameter markers cannot be regrouped: {0}")]
    NumberedParameters(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("result from target #{target} failed: {message}")]
    TargetFailed { target: usize, message: String },

    #[error("target #{target} returned {actual} columns, expected {expected}")]
    IncompatibleColumns {
        target: usize,
        expected: usize,
        actual: usize,
    },

    #[error("merged result is exhausted")]
    CursorExhausted,

    #[error("merged result has no current row")]
    NoCurrentRow,

    #[error("column index {0} is out of range")]
    ColumnOutOfRange(usize),
}

pub type Result<T> = std::result::Result<T, ShardError>;

impl ShardError {
    /// True when the statement itself cannot be handled by the sharding layer,
    /// as opposed to a metadata, configuration or execution failure.
    pub fn is_unroutable(&self) -> bool {
        matches!(
            self,
            ShardError::Parse(_)
                | ShardError::Binding(_)
                | ShardError::Rewrite(_)
                | ShardError::Routing(
                    RoutingError::UnsupportedShape(_)
                        | RoutingError::CrossShardViolation(_)
                        | RoutingError::NoRouteTarget(_)
                        | RoutingError::MissingShardingValue { .. }
                )
        )
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            ShardError::Io(_) => "io",
            ShardError::Parse(_) => "parse",
            ShardError::Binding(_) => "binding",
            ShardError::Routing(RoutingError::Algorithm { .. }) => "algorithm",
            ShardError::Routing(_) => "routing",
            ShardError::Rewrite(_) => "rewrite",
            ShardError::Merge(_) => "merge",
            ShardError::Config(_) => "config",
            ShardError::Type(_) => "type",
            ShardError::Execution(_) => "execution",
        }
    }
}
