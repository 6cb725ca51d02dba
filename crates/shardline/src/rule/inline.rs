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

//! Inline expressions used for data-node lists and inline sharding algorithms.
//!
//! `ds_${0..1}.t_order_${[0, 2]}` expands to every combination of the enumerated groups;
//! `t_order_${order_id % 4}` evaluates integer arithmetic over sharding-column variables.

use crate::error::{Result, ShardError};
use crate::types::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct InlineExpression {
    source: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Group(Group),
}

#[derive(Debug, Clone, PartialEq)]
enum Group {
    Range(i64, i64),
    List(Vec<String>),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(i64),
    Variable(String),
    Negate(Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Evaluated {
    Int(i64),
    Text(String),
}

impl InlineExpression {
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;
        while !rest.is_empty() {
            let open = if rest.starts_with("${") {
                Some(2)
            } else if rest.starts_with("$->{") {
                Some(4)
            } else {
                None
            };
            match open {
                Some(skip) => {
                    let close = rest[skip..].find('}').ok_or_else(|| {
                        ShardError::Config(format!("unterminated inline group in '{source}'"))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    let body = &rest[skip..skip + close];
                    segments.push(Segment::Group(parse_group(body, source)?));
                    rest = &rest[skip + close + 1..];
                }
                None => {
                    let mut chars = rest.chars();
                    if let Some(c) = chars.next() {
                        literal.push(c);
                    }
                    rest = chars.as_str();
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Variables referenced by expression groups, in first-seen order.
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        for segment in &self.segments {
            if let Segment::Group(Group::Expr(expr)) = segment {
                collect_variables(expr, &mut out);
            }
        }
        out
    }

    /// Expands enumerated groups into their cartesian product.
    pub fn expand(&self) -> Result<Vec<String>> {
        let mut out = vec![String::new()];
        for segment in &self.segments {
            let options: Vec<String> = match segment {
                Segment::Literal(text) => vec![text.clone()],
                Segment::Group(Group::Range(lo, hi)) => (*lo..=*hi).map(|v| v.to_string()).collect(),
                Segment::Group(Group::List(items)) => items.clone(),
                Segment::Group(Group::Expr(expr)) => match eval(expr, &HashMap::new())? {
                    Evaluated::Int(v) => vec![v.to_string()],
                    Evaluated::Text(s) => vec![s],
                },
            };
            out = out
                .iter()
                .flat_map(|prefix| options.iter().map(move |o| format!("{prefix}{o}")))
                .collect();
        }
        Ok(out)
    }

    /// Evaluates the expression for one set of column values.
    pub fn evaluate(&self, vars: &HashMap<String, Value>) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Group(Group::Expr(expr)) => match eval(expr, vars)? {
                    Evaluated::Int(v) => out.push_str(&v.to_string()),
                    Evaluated::Text(s) => out.push_str(&s),
                },
                Segment::Group(_) => {
                    return Err(ShardError::Config(format!(
                        "inline expression '{}' enumerates values and cannot be evaluated",
                        self.source
                    )))
                }
            }
        }
        Ok(out)
    }
}

/// Splits a comma-separated list of inline expressions and expands each of them.
pub fn expand_all(source: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for part in split_top_level(source) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        out.extend(InlineExpression::parse(part)?.expand()?);
    }
    Ok(out)
}

fn split_top_level(source: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, c) in source.char_indices() {
        match c {
            '{' | '[' => depth += 1,
            '}' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&source[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&source[start..]);
    parts
}

fn parse_group(body: &str, source: &str) -> Result<Group> {
    let trimmed = body.trim();
    if let Some((lo, hi)) = trimmed.split_once("..") {
        if let (Ok(lo), Ok(hi)) = (lo.trim().parse::<i64>(), hi.trim().parse::<i64>()) {
            if lo > hi {
                return Err(ShardError::Config(format!(
                    "empty range '{trimmed}' in '{source}'"
                )));
            }
            return Ok(Group::Range(lo, hi));
        }
    }
    if let Some(inner) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        let items = inner
            .split(',')
            .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>();
        return Ok(Group::List(items));
    }
    let tokens = tokenize(trimmed, source)?;
    let mut parser = ExprParser { tokens, pos: 0 };
    let expr = parser.parse_sum()?;
    if parser.pos != parser.tokens.len() {
        return Err(ShardError::Config(format!(
            "unexpected trailing input in inline group '{trimmed}'"
        )));
    }
    Ok(Group::Expr(expr))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(i64),
    Ident(String),
    Op(char),
    Open,
    Close,
}

fn tokenize(text: &str, source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            let n = digits
                .parse::<i64>()
                .map_err(|_| ShardError::Config(format!("number out of range in '{source}'")))?;
            tokens.push(Token::Number(n));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else if matches!(c, '+' | '-' | '*' | '/' | '%') {
            tokens.push(Token::Op(c));
            i += 1;
        } else if c == '(' {
            tokens.push(Token::Open);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::Close);
            i += 1;
        } else {
            return Err(ShardError::Config(format!(
                "unsupported character '{c}' in inline expression '{source}'"
            )));
        }
    }
    Ok(tokens)
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn parse_sum(&mut self) -> Result<Expr> {
        let mut left = self.parse_product()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let right = self.parse_product()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek().cloned() {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if let Some(Token::Op('-')) = self.peek() {
            self.pos += 1;
            return Ok(Expr::Negate(Box::new(self.parse_unary()?)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| ShardError::Config("inline expression ended early".to_string()))?;
        self.pos += 1;
        match token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Ident(name) => Ok(Expr::Variable(name)),
            Token::Open => {
                let inner = self.parse_sum()?;
                match self.peek() {
                    Some(Token::Close) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(ShardError::Config(
                        "missing ')' in inline expression".to_string(),
                    )),
                }
            }
            other => Err(ShardError::Config(format!(
                "unexpected token {other:?} in inline expression"
            ))),
        }
    }
}

fn collect_variables(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Variable(name) => {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        Expr::Negate(inner) => collect_variables(inner, out),
        Expr::Binary(_, l, r) => {
            collect_variables(l, out);
            collect_variables(r, out);
        }
    }
}

fn lookup<'a>(vars: &'a HashMap<String, Value>, name: &str) -> Option<&'a Value> {
    vars.get(name).or_else(|| {
        vars.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    })
}

fn eval(expr: &Expr, vars: &HashMap<String, Value>) -> Result<Evaluated> {
    match expr {
        Expr::Number(n) => Ok(Evaluated::Int(*n)),
        Expr::Variable(name) => {
            let value = lookup(vars, name).ok_or_else(|| {
                ShardError::Config(format!("inline variable '{name}' is not bound"))
            })?;
            Ok(match value.as_i64() {
                Some(v) if !matches!(value, Value::Text(_)) => Evaluated::Int(v),
                _ => Evaluated::Text(value.to_string()),
            })
        }
        Expr::Negate(inner) => match eval(inner, vars)? {
            Evaluated::Int(v) => Ok(Evaluated::Int(-v)),
            Evaluated::Text(s) => Ok(Evaluated::Int(-parse_int(&s)?)),
        },
        Expr::Binary(op, l, r) => {
            let l = as_int(eval(l, vars)?)?;
            let r = as_int(eval(r, vars)?)?;
            let out = match op {
                '+' => l.checked_add(r),
                '-' => l.checked_sub(r),
                '*' => l.checked_mul(r),
                '/' => l.checked_div(r),
                '%' => l.checked_rem(r),
                _ => None,
            };
            out.map(Evaluated::Int).ok_or_else(|| {
                ShardError::Config(format!("arithmetic error evaluating {l} {op} {r}"))
            })
        }
    }
}

fn as_int(v: Evaluated) -> Result<i64> {
    match v {
        Evaluated::Int(i) => Ok(i),
        Evaluated::Text(s) => parse_int(&s),
    }
}

fn parse_int(s: &str) -> Result<i64> {
    s.trim()
        .parse::<i64>()
        .map_err(|_| ShardError::Config(format!("'{s}' is not an integer")))
}
