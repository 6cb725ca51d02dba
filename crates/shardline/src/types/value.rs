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

use crate::error::{Result, ShardError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A literal or parameter value flowing through routing, rewriting and merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Float64(_) => "float64",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view used by numeric sharding algorithms.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            Self::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Parses a numeric SQL literal, keeping integers exact.
    pub fn from_number_literal(text: &str) -> Result<Self> {
        if let Ok(v) = text.parse::<i64>() {
            return Ok(Self::Int64(v));
        }
        text.parse::<f64>()
            .map(Self::Float64)
            .map_err(|_| ShardError::Type(format!("invalid numeric literal '{text}'")))
    }

    /// Renders the value as SQL literal text for splicing into rewritten statements.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Boolean(v) => {
                if *v {
                    "TRUE".to_string()
                } else {
                    "FALSE".to_string()
                }
            }
            Self::Int32(v) => v.to_string(),
            Self::Int64(v) => v.to_string(),
            Self::Float64(v) => v.to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Bytes(b) => {
                let hex = b.iter().map(|byte| format!("{byte:02X}")).collect::<String>();
                format!("X'{hex}'")
            }
        }
    }

    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        let (a, b) = align_numeric(self, other)?;
        compare_aligned(&a, &b)
    }

    pub fn eq(&self, other: &Value) -> Result<bool> {
        Ok(self.compare(other)? == Ordering::Equal)
    }

    pub fn lt(&self, other: &Value) -> Result<bool> {
        Ok(self.compare(other)? == Ordering::Less)
    }

    pub fn gt(&self, other: &Value) -> Result<bool> {
        Ok(self.compare(other)? == Ordering::Greater)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Bytes(b) => {
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

fn align_numeric(left: &Value, right: &Value) -> Result<(Value, Value)> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => {
            Err(ShardError::Type("cannot compare NULL values".to_string()))
        }
        (Value::Boolean(l), Value::Boolean(r)) => Ok((Value::Boolean(*l), Value::Boolean(*r))),
        (Value::Int32(l), Value::Int32(r)) => Ok((Value::Int32(*l), Value::Int32(*r))),
        (Value::Int64(l), Value::Int64(r)) => Ok((Value::Int64(*l), Value::Int64(*r))),
        (Value::Float64(l), Value::Float64(r)) => Ok((Value::Float64(*l), Value::Float64(*r))),
        (Value::Text(l), Value::Text(r)) => Ok((Value::Text(l.clone()), Value::Text(r.clone()))),
        (Value::Bytes(l), Value::Bytes(r)) => Ok((Value::Bytes(l.clone()), Value::Bytes(r.clone()))),

        (Value::Int32(l), Value::Int64(r)) => Ok((Value::Int64(i64::from(*l)), Value::Int64(*r))),
        (Value::Int64(l), Value::Int32(r)) => Ok((Value::Int64(*l), Value::Int64(i64::from(*r)))),
        (Value::Int64(l), Value::Float64(r)) => Ok((Value::Float64(*l as f64), Value::Float64(*r))),
        (Value::Float64(l), Value::Int64(r)) => Ok((Value::Float64(*l), Value::Float64(*r as f64))),
        (Value::Int32(l), Value::Float64(r)) => {
            Ok((Value::Float64(f64::from(*l)), Value::Float64(*r)))
        }
        (Value::Float64(l), Value::Int32(r)) => {
            Ok((Value::Float64(*l), Value::Float64(f64::from(*r))))
        }

        _ => Err(ShardError::Type(format!(
            "cannot compare {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn compare_aligned(left: &Value, right: &Value) -> Result<Ordering> {
    let out = match (left, right) {
        (Value::Boolean(l), Value::Boolean(r)) => l.cmp(r),
        (Value::Int32(l), Value::Int32(r)) => l.cmp(r),
        (Value::Int64(l), Value::Int64(r)) => l.cmp(r),
        (Value::Float64(l), Value::Float64(r)) => l
            .partial_cmp(r)
            .ok_or_else(|| ShardError::Type("cannot compare NaN".to_string()))?,
        (Value::Text(l), Value::Text(r)) => l.cmp(r),
        (Value::Bytes(l), Value::Bytes(r)) => l.cmp(r),
        _ => {
            return Err(ShardError::Type(
                "aligned comparison types mismatch".to_string(),
            ))
        }
    };
    Ok(out)
}
