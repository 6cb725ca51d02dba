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

//! Tokens that substitute logic table and index names with actual names.

use crate::binder::{BoundStatementContext, ProjectionOrigin};
use crate::rewrite::token::{quote_of, SqlToken, TokenPart};
use crate::rule::ShardingRule;
use crate::sql::TextRange;
use std::collections::HashSet;

/// Table tokens for table references, column owners and wildcard qualifiers that
/// name a sharding table. Wildcards in `expanded` are rewritten elsewhere.
pub fn table_tokens(
    ctx: &BoundStatementContext,
    rule: &ShardingRule,
    expanded: &HashSet<TextRange>,
) -> Vec<SqlToken> {
    let source = ctx.source();
    let mut tokens = Vec::new();
    for segment in ctx.table_segments() {
        let Some(range) = segment.name_range else {
            continue;
        };
        if let Some(table_rule) = rule.find_table_rule(&segment.name) {
            tokens.push(SqlToken::table(range, &table_rule.logic_table, segment.quote));
        }
    }
    for column in ctx.columns() {
        let (Some(owner), Some(range), true) = (&column.owner, column.owner_range, column.owner_is_table)
        else {
            continue;
        };
        if let Some(table_rule) = rule.find_table_rule(owner) {
            tokens.push(SqlToken::table(
                range,
                &table_rule.logic_table,
                quote_of(source.slice(range)),
            ));
        }
    }
    for projection in ctx.projections() {
        let ProjectionOrigin::Wildcard {
            range: Some(range),
            qualifier: Some(qualifier),
            qualifier_is_table: true,
        } = &projection.origin
        else {
            continue;
        };
        if expanded.contains(range) {
            continue;
        }
        let Some(table_rule) = rule.find_table_rule(qualifier) else {
            continue;
        };
        if let Some(owner) = qualifier_range(source.slice(*range), range.start, qualifier) {
            tokens.push(SqlToken::table(
                owner,
                &table_rule.logic_table,
                quote_of(source.slice(owner)),
            ));
        }
    }
    tokens
}

/// Range of the qualifier in a `[owner.]qualifier.*` item starting at `start`.
fn qualifier_range(text: &str, start: usize, qualifier: &str) -> Option<TextRange> {
    let dot = text.rfind('.')?;
    let head = &text[..dot];
    let owner_start = head.rfind('.').map_or(0, |inner| inner + 1);
    let name = head[owner_start..].trim_matches(|c| matches!(c, '`' | '"' | '[' | ']'));
    name.eq_ignore_ascii_case(qualifier)
        .then(|| TextRange::new(start + owner_start, start + dot))
}

/// Index name tokens for indexes of sharding tables; the actual name carries the
/// actual table as suffix.
pub fn index_tokens(ctx: &BoundStatementContext, rule: &ShardingRule) -> Vec<SqlToken> {
    let source = ctx.source();
    ctx.indexes()
        .iter()
        .filter_map(|index| {
            let range = index.range?;
            let table_rule = rule.find_table_rule(index.table.as_deref()?)?;
            Some(SqlToken::parts(
                range,
                vec![TokenPart::Index {
                    name: index.name.clone(),
                    logic: table_rule.logic_table.clone(),
                    quote: quote_of(source.slice(range)),
                }],
            ))
        })
        .collect()
}
