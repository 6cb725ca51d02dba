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

use clap::{Parser, ValueEnum};
use shardline::SqlDialect;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DialectArg {
    Mysql,
    Postgresql,
    Generic,
}

impl From<DialectArg> for SqlDialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Mysql => SqlDialect::MySql,
            DialectArg::Postgresql => SqlDialect::PostgreSql,
            DialectArg::Generic => SqlDialect::Generic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "shardline",
    about = "Preview how a statement is routed and rewritten across data sources"
)]
pub struct Cli {
    /// Rule configuration (JSON).
    #[arg(short, long)]
    pub config: PathBuf,

    /// Logical schema metadata (JSON).
    #[arg(short, long)]
    pub metadata: PathBuf,

    #[arg(short, long)]
    pub sql: String,

    /// Positional parameter; repeat in marker order. `null`, `true`, `false`,
    /// numbers and `'quoted'` text are recognized, anything else is text.
    #[arg(short = 'p', long = "param")]
    pub params: Vec<String>,

    #[arg(long, value_enum, default_value = "mysql")]
    pub dialect: DialectArg,

    /// Database the session is connected to.
    #[arg(long)]
    pub database: Option<String>,

    #[arg(long)]
    pub hint_database: Option<String>,

    #[arg(long)]
    pub hint_table: Option<String>,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}
