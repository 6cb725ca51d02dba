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

//! Pluggable sharding and key-generation algorithms plus the built-in implementations.

use crate::config::{AlgorithmConfig, AlgorithmProps};
use crate::error::{Result, RoutingError, ShardError};
use crate::rule::encrypt::{AssistedEncryptAlgorithm, EncryptAlgorithm};
use crate::rule::inline::InlineExpression;
use crate::types::Value;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Values a sharding column is constrained to: an explicit list or a range.
#[derive(Debug, Clone, PartialEq)]
pub enum ShardingValue {
    List(Vec<Value>),
    Range(ValueRange),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub lower: Bound<Value>,
    pub upper: Bound<Value>,
}

impl ValueRange {
    pub fn closed(lower: Value, upper: Value) -> Self {
        Self {
            lower: Bound::Included(lower),
            upper: Bound::Included(upper),
        }
    }

    pub fn at_least(v: Value) -> Self {
        Self {
            lower: Bound::Included(v),
            upper: Bound::Unbounded,
        }
    }

    pub fn greater_than(v: Value) -> Self {
        Self {
            lower: Bound::Excluded(v),
            upper: Bound::Unbounded,
        }
    }

    pub fn at_most(v: Value) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Included(v),
        }
    }

    pub fn less_than(v: Value) -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(v),
        }
    }

    pub fn contains(&self, v: &Value) -> Result<bool> {
        let above = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(lo) => !v.lt(lo)?,
            Bound::Excluded(lo) => v.gt(lo)?,
        };
        let below = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(hi) => !v.gt(hi)?,
            Bound::Excluded(hi) => v.lt(hi)?,
        };
        Ok(above && below)
    }

    /// Intersection of two ranges; `None` when it is empty.
    pub fn intersect(&self, other: &ValueRange) -> Result<Option<ValueRange>> {
        let lower = tighter_lower(&self.lower, &other.lower)?;
        let upper = tighter_upper(&self.upper, &other.upper)?;
        let empty = match (&lower, &upper) {
            (Bound::Included(lo), Bound::Included(hi)) => lo.gt(hi)?,
            (Bound::Included(lo), Bound::Excluded(hi))
            | (Bound::Excluded(lo), Bound::Included(hi))
            | (Bound::Excluded(lo), Bound::Excluded(hi)) => !lo.lt(hi)?,
            _ => false,
        };
        Ok((!empty).then_some(ValueRange { lower, upper }))
    }

    /// Inclusive integer bounds when both ends are bounded integers.
    pub fn integer_bounds(&self) -> Option<(i64, i64)> {
        let lo = match &self.lower {
            Bound::Included(v) => int_value(v)?,
            Bound::Excluded(v) => int_value(v)?.checked_add(1)?,
            Bound::Unbounded => return None,
        };
        let hi = match &self.upper {
            Bound::Included(v) => int_value(v)?,
            Bound::Excluded(v) => int_value(v)?.checked_sub(1)?,
            Bound::Unbounded => return None,
        };
        Some((lo, hi))
    }
}

fn int_value(v: &Value) -> Option<i64> {
    match v {
        Value::Int32(_) | Value::Int64(_) => v.as_i64(),
        _ => None,
    }
}

fn tighter_lower(a: &Bound<Value>, b: &Bound<Value>) -> Result<Bound<Value>> {
    Ok(match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other.clone(),
        (Bound::Included(x), Bound::Included(y)) => {
            Bound::Included(if x.gt(y)? { x.clone() } else { y.clone() })
        }
        (Bound::Excluded(x), Bound::Excluded(y)) => {
            Bound::Excluded(if x.gt(y)? { x.clone() } else { y.clone() })
        }
        (Bound::Included(i), Bound::Excluded(e)) | (Bound::Excluded(e), Bound::Included(i)) => {
            if i.gt(e)? {
                Bound::Included(i.clone())
            } else {
                Bound::Excluded(e.clone())
            }
        }
    })
}

fn tighter_upper(a: &Bound<Value>, b: &Bound<Value>) -> Result<Bound<Value>> {
    Ok(match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other.clone(),
        (Bound::Included(x), Bound::Included(y)) => {
            Bound::Included(if x.lt(y)? { x.clone() } else { y.clone() })
        }
        (Bound::Excluded(x), Bound::Excluded(y)) => {
            Bound::Excluded(if x.lt(y)? { x.clone() } else { y.clone() })
        }
        (Bound::Included(i), Bound::Excluded(e)) | (Bound::Excluded(e), Bound::Included(i)) => {
            if i.lt(e)? {
                Bound::Included(i.clone())
            } else {
                Bound::Excluded(e.clone())
            }
        }
    })
}

pub struct PreciseShardingValue<'a> {
    pub logic_table: &'a str,
    pub column: &'a str,
    pub value: &'a Value,
}

pub struct RangeShardingValue<'a> {
    pub logic_table: &'a str,
    pub column: &'a str,
    pub range: &'a ValueRange,
}

pub struct ComplexKeysShardingValue<'a> {
    pub logic_table: &'a str,
    /// Sharding column name (lower case) to its constraint.
    pub values: &'a BTreeMap<String, ShardingValue>,
}

pub trait StandardShardingAlgorithm: Send + Sync + fmt::Debug {
    fn do_precise_sharding(
        &self,
        targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> Result<Option<String>>;

    fn do_range_sharding(
        &self,
        targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> Result<Vec<String>>;
}

pub trait ComplexKeysShardingAlgorithm: Send + Sync + fmt::Debug {
    fn do_sharding(
        &self,
        targets: &[String],
        value: &ComplexKeysShardingValue<'_>,
    ) -> Result<Vec<String>>;
}

pub trait HintShardingAlgorithm: Send + Sync + fmt::Debug {
    fn do_sharding(&self, targets: &[String], logic_table: &str, values: &[Value])
        -> Result<Vec<String>>;
}

pub trait KeyGenerateAlgorithm: Send + Sync + fmt::Debug {
    fn generate_key(&self) -> Result<Value>;
}

fn algorithm_error(algorithm: &str, message: impl Into<String>) -> ShardError {
    ShardError::Routing(RoutingError::Algorithm {
        algorithm: algorithm.to_string(),
        message: message.into(),
    })
}

fn find_target(targets: &[String], name: &str) -> Option<String> {
    targets
        .iter()
        .find(|t| t.eq_ignore_ascii_case(name))
        .cloned()
}

/// Trailing decimal suffix of a target name, e.g. `t_order_12` -> 12.
fn numeric_suffix(target: &str) -> Option<i64> {
    let digits = target
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>();
    if digits.is_empty() {
        return None;
    }
    digits.into_iter().rev().collect::<String>().parse().ok()
}

/// `MOD`: routes to the target whose numeric suffix equals `value mod sharding-count`.
#[derive(Debug)]
pub struct ModShardingAlgorithm {
    sharding_count: i64,
}

impl ModShardingAlgorithm {
    pub fn new(props: &AlgorithmProps) -> Result<Self> {
        let sharding_count = props
            .get_i64("sharding-count")?
            .ok_or_else(|| ShardError::Config("MOD requires 'sharding-count'".to_string()))?;
        if sharding_count <= 0 {
            return Err(ShardError::Config(
                "MOD 'sharding-count' must be > 0".to_string(),
            ));
        }
        Ok(Self { sharding_count })
    }

    fn target_for(&self, targets: &[String], suffix: i64) -> Option<String> {
        targets
            .iter()
            .find(|t| numeric_suffix(t) == Some(suffix))
            .cloned()
    }
}

impl StandardShardingAlgorithm for ModShardingAlgorithm {
    fn do_precise_sharding(
        &self,
        targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> Result<Option<String>> {
        let v = value.value.as_i64().ok_or_else(|| {
            algorithm_error(
                "MOD",
                format!("value {} of '{}' is not an integer", value.value, value.column),
            )
        })?;
        Ok(self.target_for(targets, v.rem_euclid(self.sharding_count)))
    }

    fn do_range_sharding(
        &self,
        targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> Result<Vec<String>> {
        let Some((lo, hi)) = value.range.integer_bounds() else {
            return Ok(targets.to_vec());
        };
        if hi < lo {
            return Ok(Vec::new());
        }
        let width = i128::from(hi) - i128::from(lo) + 1;
        if width >= i128::from(self.sharding_count) {
            return Ok(targets.to_vec());
        }
        let suffixes = (lo..=hi)
            .map(|v| v.rem_euclid(self.sharding_count))
            .collect::<BTreeSet<_>>();
        Ok(targets
            .iter()
            .filter(|t| numeric_suffix(t).is_some_and(|s| suffixes.contains(&s)))
            .cloned()
            .collect())
    }
}

/// `INLINE`: evaluates `algorithm-expression` with the sharding column bound.
#[derive(Debug)]
pub struct InlineShardingAlgorithm {
    expression: InlineExpression,
    allow_range_query: bool,
}

impl InlineShardingAlgorithm {
    pub fn new(props: &AlgorithmProps) -> Result<Self> {
        Ok(Self {
            expression: InlineExpression::parse(&props.require_str("algorithm-expression")?)?,
            allow_range_query: props.get_bool("allow-range-query-with-inline-sharding"),
        })
    }
}

impl StandardShardingAlgorithm for InlineShardingAlgorithm {
    fn do_precise_sharding(
        &self,
        targets: &[String],
        value: &PreciseShardingValue<'_>,
    ) -> Result<Option<String>> {
        let mut vars = HashMap::new();
        vars.insert(value.column.to_string(), value.value.clone());
        let name = self
            .expression
            .evaluate(&vars)
            .map_err(|e| algorithm_error("INLINE", e.to_string()))?;
        find_target(targets, &name).map(Some).ok_or_else(|| {
            algorithm_error(
                "INLINE",
                format!(
                    "'{name}' computed for {}.{} is not an available target",
                    value.logic_table, value.column
                ),
            )
        })
    }

    fn do_range_sharding(
        &self,
        targets: &[String],
        value: &RangeShardingValue<'_>,
    ) -> Result<Vec<String>> {
        if self.allow_range_query {
            return Ok(targets.to_vec());
        }
        Err(ShardError::Routing(RoutingError::UnsupportedShape(format!(
            "range condition on {}.{} requires 'allow-range-query-with-inline-sharding'",
            value.logic_table, value.column
        ))))
    }
}

/// `HINT_INLINE`: evaluates `algorithm-expression` (default `${value}`) per hint value.
#[derive(Debug)]
pub struct HintInlineShardingAlgorithm {
    expression: InlineExpression,
}

impl HintInlineShardingAlgorithm {
    pub fn new(props: &AlgorithmProps) -> Result<Self> {
        let source = props
            .get_str("algorithm-expression")
            .unwrap_or_else(|| "${value}".to_string());
        Ok(Self {
            expression: InlineExpression::parse(&source)?,
        })
    }
}

impl HintShardingAlgorithm for HintInlineShardingAlgorithm {
    fn do_sharding(
        &self,
        targets: &[String],
        _logic_table: &str,
        values: &[Value],
    ) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for value in values {
            let mut vars = HashMap::new();
            vars.insert("value".to_string(), value.clone());
            let name = self
                .expression
                .evaluate(&vars)
                .map_err(|e| algorithm_error("HINT_INLINE", e.to_string()))?;
            if let Some(target) = find_target(targets, &name) {
                if !out.contains(&target) {
                    out.push(target);
                }
            }
        }
        Ok(out)
    }
}

/// `COMPLEX_INLINE`: evaluates the expression for every combination of listed values.
#[derive(Debug)]
pub struct ComplexInlineShardingAlgorithm {
    expression: InlineExpression,
    allow_range_query: bool,
}

impl ComplexInlineShardingAlgorithm {
    pub fn new(props: &AlgorithmProps) -> Result<Self> {
        Ok(Self {
            expression: InlineExpression::parse(&props.require_str("algorithm-expression")?)?,
            allow_range_query: props.get_bool("allow-range-query-with-inline-sharding"),
        })
    }
}

impl ComplexKeysShardingAlgorithm for ComplexInlineShardingAlgorithm {
    fn do_sharding(
        &self,
        targets: &[String],
        value: &ComplexKeysShardingValue<'_>,
    ) -> Result<Vec<String>> {
        let mut combos: Vec<HashMap<String, Value>> = vec![HashMap::new()];
        for variable in self.expression.variables() {
            let constraint = value
                .values
                .iter()
                .find(|(column, _)| column.eq_ignore_ascii_case(&variable))
                .map(|(_, v)| v);
            let values = match constraint {
                Some(ShardingValue::List(values)) => values,
                Some(ShardingValue::Range(_)) if self.allow_range_query => {
                    return Ok(targets.to_vec())
                }
                Some(ShardingValue::Range(_)) => {
                    return Err(ShardError::Routing(RoutingError::UnsupportedShape(format!(
                        "range condition on {}.{variable} is not supported by COMPLEX_INLINE",
                        value.logic_table
                    ))))
                }
                None => return Ok(targets.to_vec()),
            };
            combos = combos
                .iter()
                .flat_map(|combo| {
                    values.iter().map(|v| {
                        let mut next = combo.clone();
                        next.insert(variable.clone(), v.clone());
                        next
                    })
                })
                .collect();
        }
        let mut out = Vec::new();
        for vars in &combos {
            let name = self
                .expression
                .evaluate(vars)
                .map_err(|e| algorithm_error("COMPLEX_INLINE", e.to_string()))?;
            if let Some(target) = find_target(targets, &name) {
                if !out.contains(&target) {
                    out.push(target);
                }
            }
        }
        Ok(out)
    }
}

/// 2016-11-01T00:00:00Z in milliseconds.
const SNOWFLAKE_EPOCH_MS: i64 = 1_477_929_600_000;
const SNOWFLAKE_SEQUENCE_BITS: u32 = 12;
const SNOWFLAKE_WORKER_BITS: u32 = 10;

#[derive(Debug, Default)]
struct SnowflakeState {
    last_ms: i64,
    sequence: i64,
}

/// `SNOWFLAKE`: 41-bit timestamp, 10-bit worker id, 12-bit sequence.
#[derive(Debug)]
pub struct SnowflakeKeyGenerateAlgorithm {
    worker_id: i64,
    state: Mutex<SnowflakeState>,
}

impl SnowflakeKeyGenerateAlgorithm {
    pub fn new(props: &AlgorithmProps) -> Result<Self> {
        let worker_id = props.get_i64("worker-id")?.unwrap_or(0);
        if !(0..(1 << SNOWFLAKE_WORKER_BITS)).contains(&worker_id) {
            return Err(ShardError::Config(
                "SNOWFLAKE 'worker-id' must be within [0, 1024)".to_string(),
            ));
        }
        Ok(Self {
            worker_id,
            state: Mutex::new(SnowflakeState::default()),
        })
    }
}

impl KeyGenerateAlgorithm for SnowflakeKeyGenerateAlgorithm {
    fn generate_key(&self) -> Result<Value> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| algorithm_error("SNOWFLAKE", e.to_string()))?
            .as_millis() as i64;
        let mut state = self.state.lock();
        // Clock moving backwards keeps issuing from the last timestamp.
        let mut ms = now.max(state.last_ms);
        if ms == state.last_ms {
            state.sequence = (state.sequence + 1) & ((1 << SNOWFLAKE_SEQUENCE_BITS) - 1);
            if state.sequence == 0 {
                ms += 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = ms;
        let id = ((ms - SNOWFLAKE_EPOCH_MS) << (SNOWFLAKE_SEQUENCE_BITS + SNOWFLAKE_WORKER_BITS))
            | (self.worker_id << SNOWFLAKE_SEQUENCE_BITS)
            | state.sequence;
        Ok(Value::Int64(id))
    }
}

type Factory<T> = Arc<dyn Fn(&AlgorithmProps) -> Result<Arc<T>> + Send + Sync>;

/// Algorithm implementations looked up by configured type name.
#[derive(Clone)]
pub struct AlgorithmRegistry {
    standard: HashMap<String, Factory<dyn StandardShardingAlgorithm>>,
    complex: HashMap<String, Factory<dyn ComplexKeysShardingAlgorithm>>,
    hint: HashMap<String, Factory<dyn HintShardingAlgorithm>>,
    key_generators: HashMap<String, Factory<dyn KeyGenerateAlgorithm>>,
    encryptors: HashMap<String, Factory<dyn EncryptAlgorithm>>,
    assisted_encryptors: HashMap<String, Factory<dyn AssistedEncryptAlgorithm>>,
}

impl fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("standard", &self.standard.keys().collect::<BTreeSet<_>>())
            .field("complex", &self.complex.keys().collect::<BTreeSet<_>>())
            .field("hint", &self.hint.keys().collect::<BTreeSet<_>>())
            .field("key_generators", &self.key_generators.keys().collect::<BTreeSet<_>>())
            .field("encryptors", &self.encryptors.keys().collect::<BTreeSet<_>>())
            .finish()
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl AlgorithmRegistry {
    pub fn empty() -> Self {
        Self {
            standard: HashMap::new(),
            complex: HashMap::new(),
            hint: HashMap::new(),
            key_generators: HashMap::new(),
            encryptors: HashMap::new(),
            assisted_encryptors: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register_standard("MOD", |props| {
            Ok(Arc::new(ModShardingAlgorithm::new(props)?) as Arc<dyn StandardShardingAlgorithm>)
        });
        registry.register_standard("INLINE", |props| {
            Ok(Arc::new(InlineShardingAlgorithm::new(props)?) as Arc<dyn StandardShardingAlgorithm>)
        });
        registry.register_hint("HINT_INLINE", |props| {
            Ok(Arc::new(HintInlineShardingAlgorithm::new(props)?) as Arc<dyn HintShardingAlgorithm>)
        });
        registry.register_complex("COMPLEX_INLINE", |props| {
            Ok(Arc::new(ComplexInlineShardingAlgorithm::new(props)?)
                as Arc<dyn ComplexKeysShardingAlgorithm>)
        });
        registry.register_key_generator("SNOWFLAKE", |props| {
            Ok(Arc::new(SnowflakeKeyGenerateAlgorithm::new(props)?) as Arc<dyn KeyGenerateAlgorithm>)
        });
        registry
    }

    pub fn register_standard<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&AlgorithmProps) -> Result<Arc<dyn StandardShardingAlgorithm>> + Send + Sync + 'static,
    {
        self.standard.insert(kind.to_ascii_uppercase(), Arc::new(factory));
    }

    pub fn register_complex<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&AlgorithmProps) -> Result<Arc<dyn ComplexKeysShardingAlgorithm>>
            + Send
            + Sync
            + 'static,
    {
        self.complex.insert(kind.to_ascii_uppercase(), Arc::new(factory));
    }

    pub fn register_hint<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&AlgorithmProps) -> Result<Arc<dyn HintShardingAlgorithm>> + Send + Sync + 'static,
    {
        self.hint.insert(kind.to_ascii_uppercase(), Arc::new(factory));
    }

    pub fn register_key_generator<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&AlgorithmProps) -> Result<Arc<dyn KeyGenerateAlgorithm>> + Send + Sync + 'static,
    {
        self.key_generators
            .insert(kind.to_ascii_uppercase(), Arc::new(factory));
    }

    pub fn register_encryptor<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&AlgorithmProps) -> Result<Arc<dyn EncryptAlgorithm>> + Send + Sync + 'static,
    {
        self.encryptors.insert(kind.to_ascii_uppercase(), Arc::new(factory));
    }

    pub fn register_assisted_encryptor<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&AlgorithmProps) -> Result<Arc<dyn AssistedEncryptAlgorithm>>
            + Send
            + Sync
            + 'static,
    {
        self.assisted_encryptors
            .insert(kind.to_ascii_uppercase(), Arc::new(factory));
    }

    pub fn create_standard(&self, config: &AlgorithmConfig) -> Result<Arc<dyn StandardShardingAlgorithm>> {
        create(&self.standard, config, "standard sharding")
    }

    pub fn create_complex(
        &self,
        config: &AlgorithmConfig,
    ) -> Result<Arc<dyn ComplexKeysShardingAlgorithm>> {
        create(&self.complex, config, "complex sharding")
    }

    pub fn create_hint(&self, config: &AlgorithmConfig) -> Result<Arc<dyn HintShardingAlgorithm>> {
        create(&self.hint, config, "hint sharding")
    }

    pub fn create_key_generator(
        &self,
        config: &AlgorithmConfig,
    ) -> Result<Arc<dyn KeyGenerateAlgorithm>> {
        create(&self.key_generators, config, "key generate")
    }

    pub fn create_encryptor(&self, config: &AlgorithmConfig) -> Result<Arc<dyn EncryptAlgorithm>> {
        create(&self.encryptors, config, "encrypt")
    }

    pub fn create_assisted_encryptor(
        &self,
        config: &AlgorithmConfig,
    ) -> Result<Arc<dyn AssistedEncryptAlgorithm>> {
        create(&self.assisted_encryptors, config, "assisted query encrypt")
    }
}

fn create<T: ?Sized>(
    factories: &HashMap<String, Factory<T>>,
    config: &AlgorithmConfig,
    family: &str,
) -> Result<Arc<T>> {
    let factory = factories
        .get(&config.kind.to_ascii_uppercase())
        .ok_or_else(|| {
            ShardError::Config(format!(
                "{family} algorithm type '{}' is not registered",
                config.kind
            ))
        })?;
    factory(&config.props)
}
