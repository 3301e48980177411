//! CEL 변환 유틸리티
//!
//! serde_json 값과 CEL 값 사이의 변환, 그리고 CEL 문자열 리터럴 quote를 제공합니다.

use std::collections::HashMap;
use std::sync::Arc;

use cel_interpreter::objects::{Key, Map, Value as CelValue};
use cel_interpreter::{Context, Program};
use serde_json::Value;

/// 주어진 변수로 CEL 표현식 실행
pub(crate) fn execute(expression: &str, vars: Vec<(&str, Value)>) -> Result<CelValue, String> {
    let program = Program::compile(expression).map_err(|e| e.to_string())?;

    let mut ctx = Context::default();
    for (name, value) in vars {
        ctx.add_variable_from_value(name, json_to_cel(value));
    }

    program.execute(&ctx).map_err(|e| e.to_string())
}

/// 불리언으로 평가되어야 하는 CEL 표현식 실행
pub(crate) fn eval_bool(expression: &str, vars: Vec<(&str, Value)>) -> Result<bool, String> {
    match execute(expression, vars)? {
        CelValue::Bool(b) => Ok(b),
        _ => Err("expression did not evaluate to bool".to_string()),
    }
}

/// CEL 문자열 리터럴로 quote
pub(crate) fn quote_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub(crate) fn json_to_cel(value: Value) -> CelValue {
    match value {
        Value::Null => CelValue::Null,
        Value::Bool(b) => CelValue::Bool(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                CelValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                CelValue::UInt(u)
            } else if let Some(f) = n.as_f64() {
                CelValue::Float(f)
            } else {
                CelValue::Null
            }
        }
        Value::String(s) => CelValue::String(s.into()),
        Value::Array(arr) => {
            let values = arr.into_iter().map(json_to_cel).collect::<Vec<_>>();
            CelValue::List(Arc::new(values))
        }
        Value::Object(map) => {
            let mut obj = HashMap::new();
            for (k, v) in map {
                obj.insert(Key::from(k), json_to_cel(v));
            }
            CelValue::Map(Map { map: Arc::new(obj) })
        }
    }
}

pub(crate) fn cel_to_json(value: &CelValue) -> Value {
    match value {
        CelValue::Null => Value::Null,
        CelValue::Bool(b) => Value::Bool(*b),
        CelValue::Int(i) => Value::from(*i),
        CelValue::UInt(u) => Value::from(*u),
        CelValue::Float(f) => Value::from(*f),
        CelValue::String(s) => Value::String(s.to_string()),
        CelValue::List(items) => Value::Array(items.iter().map(cel_to_json).collect()),
        CelValue::Map(map) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in map.map.iter() {
                obj.insert(key_to_string(k), cel_to_json(v));
            }
            Value::Object(obj)
        }
        _ => Value::Null,
    }
}

fn key_to_string(key: &Key) -> String {
    match key {
        Key::String(s) => s.to_string(),
        Key::Int(i) => i.to_string(),
        Key::Uint(u) => u.to_string(),
        Key::Bool(b) => b.to_string(),
    }
}
