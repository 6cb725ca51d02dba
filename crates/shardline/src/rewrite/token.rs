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

//! SQL tokens: replacements of byte ranges of the original statement text.

use crate::error::{Result, RewriteError, ShardError};
use crate::route::RouteUnit;
use crate::sql::TextRange;

/// One piece of replacement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPart {
    Text(String),
    /// Logic table name, replaced by the actual table of the route unit.
    Table { logic: String, quote: Option<char> },
    /// Index name, suffixed with the actual table of `logic`.
    Index {
        name: String,
        logic: String,
        quote: Option<char>,
    },
}

impl TokenPart {
    fn render(&self, unit: Option<&RouteUnit>, out: &mut String) {
        match self {
            TokenPart::Text(text) => out.push_str(text),
            TokenPart::Table { logic, quote } => {
                let actual = unit.and_then(|u| u.actual_table(logic)).unwrap_or(logic);
                push_quoted(out, actual, *quote);
            }
            TokenPart::Index { name, logic, quote } => match unit.and_then(|u| u.actual_table(logic)) {
                Some(actual) => push_quoted(out, &format!("{name}_{actual}"), *quote),
                None => push_quoted(out, name, *quote),
            },
        }
    }
}

/// Quote character of an identifier as written, if any.
pub fn quote_of(text: &str) -> Option<char> {
    text.chars().next().filter(|c| matches!(c, '`' | '"' | '['))
}

pub fn quoted(name: &str, quote: Option<char>) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    push_quoted(&mut out, name, quote);
    out
}

fn push_quoted(out: &mut String, name: &str, quote: Option<char>) {
    match quote {
        Some(open) => {
            let close = if open == '[' { ']' } else { open };
            out.push(open);
            out.push_str(name);
            out.push(close);
        }
        None => out.push_str(name),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenContent {
    Parts(Vec<TokenPart>),
    /// The INSERT value groups routed to the unit being rendered.
    InsertValues,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlToken {
    pub range: TextRange,
    pub content: TokenContent,
}

impl SqlToken {
    pub fn text(range: TextRange, text: impl Into<String>) -> Self {
        Self {
            range,
            content: TokenContent::Parts(vec![TokenPart::Text(text.into())]),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::text(TextRange::at(at), text)
    }

    pub fn parts(range: TextRange, parts: Vec<TokenPart>) -> Self {
        Self {
            range,
            content: TokenContent::Parts(parts),
        }
    }

    pub fn table(range: TextRange, logic: &str, quote: Option<char>) -> Self {
        Self::parts(
            range,
            vec![TokenPart::Table {
                logic: logic.to_string(),
                quote,
            }],
        )
    }

    pub fn insert_values(range: TextRange) -> Self {
        Self {
            range,
            content: TokenContent::InsertValues,
        }
    }

    /// Whether rendering depends on the route unit.
    pub fn is_unit_aware(&self) -> bool {
        match &self.content {
            TokenContent::InsertValues => true,
            TokenContent::Parts(parts) => parts.iter().any(|p| !matches!(p, TokenPart::Text(_))),
        }
    }
}

/// Tokens collected for one statement.
#[derive(Debug, Clone, Default)]
pub struct SqlTokens {
    tokens: Vec<SqlToken>,
}

impl SqlTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, token: SqlToken) {
        self.tokens.push(token);
    }

    pub fn extend(&mut self, tokens: impl IntoIterator<Item = SqlToken>) {
        self.tokens.extend(tokens);
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Orders tokens by position, drops exact duplicates and rejects overlaps.
    /// Insertions at one offset keep the order they were pushed in.
    pub fn finish(mut self) -> Result<Vec<SqlToken>> {
        self.tokens
            .sort_by_key(|t| (t.range.start, !t.range.is_empty(), t.range.stop));
        let mut out: Vec<SqlToken> = Vec::with_capacity(self.tokens.len());
        for token in self.tokens {
            if let Some(last) = out.last() {
                if !token.range.is_empty() && last.range == token.range {
                    if last.content == token.content {
                        continue;
                    }
                    return Err(overlap(last.range, token.range));
                }
                if last.range.overlaps(&token.range) {
                    return Err(overlap(last.range, token.range));
                }
            }
            out.push(token);
        }
        Ok(out)
    }
}

fn overlap(first: TextRange, second: TextRange) -> ShardError {
    ShardError::Rewrite(RewriteError::OverlappingTokens {
        first_start: first.start,
        first_stop: first.stop,
        second_start: second.start,
        second_stop: second.stop,
    })
}

/// Applies ordered, non-overlapping tokens to `sql` for one route unit.
pub fn render(sql: &str, tokens: &[SqlToken], unit: Option<&RouteUnit>, insert_values: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 16);
    let mut cursor = 0;
    for token in tokens {
        out.push_str(sql.get(cursor..token.range.start).unwrap_or(""));
        match &token.content {
            TokenContent::Parts(parts) => {
                for part in parts {
                    part.render(unit, &mut out);
                }
            }
            TokenContent::InsertValues => out.push_str(insert_values),
        }
        cursor = token.range.stop.max(cursor);
    }
    out.push_str(sql.get(cursor..).unwrap_or(""));
    out
}
