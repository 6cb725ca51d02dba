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

//! Thin adapter over `sqlparser`: dialect selection, single-statement parsing, and
//! mapping of AST spans onto byte offsets of the original SQL text.

use crate::error::{Result, RewriteError, ShardError};
use crate::types::Value;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{
    visit_expressions, Expr, Ident, ObjectName, Statement, UnaryOperator, Value as AstValue,
};
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Location, Span};
use std::ops::ControlFlow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlDialect {
    #[default]
    MySql,
    PostgreSql,
    Generic,
}

impl SqlDialect {
    fn dialect(&self) -> Box<dyn Dialect> {
        match self {
            SqlDialect::MySql => Box::new(MySqlDialect {}),
            SqlDialect::PostgreSql => Box::new(PostgreSqlDialect {}),
            SqlDialect::Generic => Box::new(GenericDialect {}),
        }
    }

    /// Parses exactly one statement.
    pub fn parse_statement(&self, sql: &str) -> Result<Statement> {
        let dialect = self.dialect();
        let mut statements = Parser::parse_sql(dialect.as_ref(), sql)
            .map_err(|e| ShardError::Parse(e.to_string()))?;
        match statements.len() {
            1 => Ok(statements.remove(0)),
            0 => Err(ShardError::Parse("empty statement".to_string())),
            n => Err(ShardError::Parse(format!(
                "expected a single statement, found {n}"
            ))),
        }
    }

    pub fn quote_char(&self) -> char {
        match self {
            SqlDialect::MySql => '`',
            SqlDialect::PostgreSql | SqlDialect::Generic => '"',
        }
    }
}

/// Half-open byte range `[start, stop)` into the original SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextRange {
    pub start: usize,
    pub stop: usize,
}

impl TextRange {
    pub fn new(start: usize, stop: usize) -> Self {
        Self { start, stop }
    }

    /// Zero-width range used for insertions.
    pub fn at(pos: usize) -> Self {
        Self {
            start: pos,
            stop: pos,
        }
    }

    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    pub fn contains(&self, other: &TextRange) -> bool {
        self.start <= other.start && other.stop <= self.stop
    }

    /// Insertions only overlap a replacement when they fall strictly inside it.
    pub fn overlaps(&self, other: &TextRange) -> bool {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => false,
            (true, false) => other.start < self.start && self.start < other.stop,
            (false, true) => self.start < other.start && other.start < self.stop,
            (false, false) => self.start < other.stop && other.start < self.stop,
        }
    }
}

/// Original SQL text with a line index for span translation.
#[derive(Debug, Clone)]
pub struct SourceText {
    sql: String,
    line_starts: Vec<usize>,
}

impl SourceText {
    pub fn new(sql: &str) -> Self {
        let mut line_starts = vec![0];
        for (idx, c) in sql.char_indices() {
            if c == '\n' {
                line_starts.push(idx + 1);
            }
        }
        Self {
            sql: sql.to_string(),
            line_starts,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.sql
    }

    pub fn len(&self) -> usize {
        self.sql.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn slice(&self, range: TextRange) -> &str {
        self.sql.get(range.start..range.stop).unwrap_or("")
    }

    /// Byte offset of a 1-based line/column location; columns count characters.
    pub fn offset(&self, location: Location) -> Option<usize> {
        if location.line == 0 || location.column == 0 {
            return None;
        }
        let line_start = *self.line_starts.get(usize::try_from(location.line - 1).ok()?)?;
        let column = usize::try_from(location.column - 1).ok()?;
        let line = &self.sql[line_start..];
        if column == 0 {
            return Some(line_start);
        }
        let mut chars = line.char_indices();
        match chars.nth(column) {
            Some((idx, _)) => Some(line_start + idx),
            // end of text
            None if line.chars().count() == column => Some(self.sql.len()),
            None => None,
        }
    }

    pub fn range(&self, span: Span) -> Option<TextRange> {
        let start = self.offset(span.start)?;
        let stop = self.offset(span.end)?;
        (start <= stop).then_some(TextRange::new(start, stop))
    }

    pub fn require_range(&self, span: Span, what: &str) -> Result<TextRange> {
        self.range(span).ok_or_else(|| {
            ShardError::Rewrite(RewriteError::SegmentPosition(format!(
                "no source position for {what}"
            )))
        })
    }

    /// Range of an identifier, checked against the identifier text.
    pub fn ident_range(&self, ident: &Ident) -> Result<TextRange> {
        let range = self.require_range(ident.span, &format!("identifier '{}'", ident.value))?;
        let text = self.slice(range);
        let unquoted = text.trim_matches(|c| matches!(c, '`' | '"' | '[' | ']'));
        if !unquoted.eq_ignore_ascii_case(&ident.value) {
            return Err(ShardError::Rewrite(RewriteError::SegmentPosition(format!(
                "identifier '{}' does not match source text '{text}'",
                ident.value
            ))));
        }
        Ok(range)
    }

    /// Next occurrence of `c` at or after `from`, skipping whitespace only.
    pub fn next_char_after(&self, from: usize, c: char) -> Option<usize> {
        let rest = self.sql.get(from..)?;
        let trimmed = rest.trim_start();
        trimmed
            .starts_with(c)
            .then_some(from + (rest.len() - trimmed.len()))
    }

    /// Previous occurrence of `c` strictly before `before`, skipping whitespace only.
    pub fn prev_char_before(&self, before: usize, c: char) -> Option<usize> {
        let head = self.sql.get(..before)?;
        let trimmed = head.trim_end();
        trimmed
            .ends_with(c)
            .then_some(trimmed.len() - c.len_utf8())
    }
}

/// A `?` or `$n` placeholder in the statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterMarker {
    /// Index into the runtime parameter list.
    pub index: usize,
    pub range: TextRange,
}

/// Collects every placeholder sorted by position. `?` markers are numbered by textual
/// order, `$n` markers address parameter `n - 1`.
pub fn collect_parameter_markers(
    statement: &Statement,
    source: &SourceText,
) -> Result<Vec<ParameterMarker>> {
    let mut found: Vec<(TextRange, String)> = Vec::new();
    let mut missing: Option<String> = None;
    let _ = visit_expressions(statement, |expr: &Expr| {
        if let Expr::Value(v) = expr {
            if let AstValue::Placeholder(text) = &v.value {
                match source.offset(v.span.start) {
                    Some(start) => {
                        found.push((TextRange::new(start, start + text.len()), text.clone()))
                    }
                    None => missing = Some(text.clone()),
                }
            }
        }
        ControlFlow::<()>::Continue(())
    });
    if let Some(text) = missing {
        return Err(ShardError::Rewrite(RewriteError::SegmentPosition(format!(
            "no source position for parameter marker '{text}'"
        ))));
    }
    found.sort_by_key(|(range, _)| *range);
    found.dedup_by_key(|(range, _)| *range);

    let mut ordinal = 0;
    let mut markers = Vec::with_capacity(found.len());
    for (range, text) in found {
        let index = match text.strip_prefix('$').map(str::parse::<usize>) {
            Some(Ok(n)) if n > 0 => n - 1,
            Some(_) => {
                return Err(ShardError::Parse(format!(
                    "invalid parameter marker '{text}'"
                )))
            }
            None => {
                let idx = ordinal;
                ordinal += 1;
                idx
            }
        };
        markers.push(ParameterMarker { index, range });
    }
    Ok(markers)
}

/// Identifier parts of a possibly qualified name.
pub fn object_name_parts(name: &ObjectName) -> Vec<&Ident> {
    name.0.iter().filter_map(|p| p.as_ident()).collect()
}

pub fn object_name_to_string(name: &ObjectName) -> String {
    name.0
        .iter()
        .map(|p| {
            p.as_ident()
                .map(|i| i.value.clone())
                .unwrap_or_else(|| p.to_string())
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Converts a literal expression to a runtime value. Placeholders and non-literal
/// expressions yield `None`.
pub fn literal_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Value(v) => match &v.value {
            AstValue::Number(n, _) => Value::from_number_literal(n).ok(),
            AstValue::SingleQuotedString(s)
            | AstValue::DoubleQuotedString(s)
            | AstValue::NationalStringLiteral(s) => Some(Value::Text(s.clone())),
            AstValue::Boolean(b) => Some(Value::Boolean(*b)),
            AstValue::Null => Some(Value::Null),
            _ => None,
        },
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match literal_value(expr)? {
            Value::Int32(v) => v.checked_neg().map(Value::Int32),
            Value::Int64(v) => v.checked_neg().map(Value::Int64),
            Value::Float64(v) => Some(Value::Float64(-v)),
            _ => None,
        },
        Expr::UnaryOp {
            op: UnaryOperator::Plus,
            expr,
        }
        | Expr::Nested(expr) => literal_value(expr),
        _ => None,
    }
}

pub fn is_placeholder(expr: &Expr) -> bool {
    matches!(expr, Expr::Value(v) if matches!(v.value, AstValue::Placeholder(_)))
}

#[cfg(test)]
mod tests;
