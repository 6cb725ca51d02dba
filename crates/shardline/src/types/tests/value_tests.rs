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

use crate::types::Value;
use std::cmp::Ordering;

#[test]
fn value_comparisons_align_numeric_types() {
    assert!(Value::Int32(1).lt(&Value::Int64(2)).expect("lt"));
    assert!(Value::Int64(2).gt(&Value::Int32(1)).expect("gt"));
    assert!(Value::Int64(3).eq(&Value::Float64(3.0)).expect("eq"));
    assert_eq!(
        Value::Text("a".to_string())
            .compare(&Value::Text("b".to_string()))
            .expect("compare"),
        Ordering::Less
    );
}

#[test]
fn value_comparison_rejects_null_and_mixed_types() {
    assert!(Value::Null.compare(&Value::Int64(1)).is_err());
    assert!(Value::Text("1".to_string())
        .compare(&Value::Boolean(true))
        .is_err());
}

#[test]
fn value_renders_sql_literals() {
    assert_eq!(Value::Int64(17).to_sql_literal(), "17");
    assert_eq!(Value::Text("o'neil".to_string()).to_sql_literal(), "'o''neil'");
    assert_eq!(Value::Null.to_sql_literal(), "NULL");
    assert_eq!(Value::Boolean(false).to_sql_literal(), "FALSE");
    assert_eq!(Value::Bytes(vec![0xab, 0x01]).to_sql_literal(), "X'AB01'");
}

#[test]
fn number_literals_keep_integers_exact() {
    assert_eq!(
        Value::from_number_literal("9007199254740993").expect("int"),
        Value::Int64(9_007_199_254_740_993)
    );
    assert_eq!(
        Value::from_number_literal("2.5").expect("float"),
        Value::Float64(2.5)
    );
    assert!(Value::from_number_literal("abc").is_err());
}

#[test]
fn integer_view_accepts_numeric_text() {
    assert_eq!(Value::Int32(7).as_i64(), Some(7));
    assert_eq!(Value::Text(" 42 ".to_string()).as_i64(), Some(42));
    assert_eq!(Value::Float64(1.5).as_i64(), None);
}
