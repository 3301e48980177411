//! 단일 레코드에 대한 predicate 실행
//!
//! 인메모리 백엔드가 사용하는 실행기입니다. 레코드는 JSON 객체이며,
//! raw fragment는 `resource` 변수에 레코드가 바인딩된 CEL 표현식으로 실행됩니다.
//!
//! 누락된 필드는 `null`로 취급합니다. 비교는 항상 참/거짓으로 결정됩니다.
//!
//! raw fragment 실행 오류는 SQL의 `NULL`처럼 "알 수 없음"이 되며, 3치 논리로 전파됩니다.
//! `NOT`을 거쳐도 알 수 없음은 그대로이고, 최종 결과가 알 수 없음이면 매칭되지 않습니다.
//! 따라서 Forbid 안의 실패한 raw fragment는 레코드를 허용하지 않습니다.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::{cel, Operator, Predicate, RawFragment};

/// 레코드가 predicate를 만족하는지 평가
pub fn evaluate(predicate: &Predicate, record: &Map<String, Value>) -> bool {
    evaluate_tristate(predicate, record) == Some(true)
}

/// 3치 평가 (`None` = 알 수 없음)
pub fn evaluate_tristate(predicate: &Predicate, record: &Map<String, Value>) -> Option<bool> {
    match predicate {
        Predicate::True => Some(true),
        Predicate::False => Some(false),
        Predicate::Compare { field, op, value } => {
            let actual = record.get(field).unwrap_or(&Value::Null);
            Some(compare(actual, *op, value))
        }
        Predicate::Raw(raw) => evaluate_raw(raw, record),
        Predicate::And { items } => {
            let mut unknown = false;
            for item in items {
                match evaluate_tristate(item, record) {
                    Some(false) => return Some(false),
                    None => unknown = true,
                    Some(true) => {}
                }
            }
            if unknown { None } else { Some(true) }
        }
        Predicate::Or { items } => {
            let mut unknown = false;
            for item in items {
                match evaluate_tristate(item, record) {
                    Some(true) => return Some(true),
                    None => unknown = true,
                    Some(false) => {}
                }
            }
            if unknown { None } else { Some(false) }
        }
        Predicate::Not { item } => evaluate_tristate(item, record).map(|b| !b),
    }
}

fn evaluate_raw(raw: &RawFragment, record: &Map<String, Value>) -> Option<bool> {
    let expression = raw.render(cel::quote_literal);
    match cel::eval_bool(&expression, vec![("resource", Value::Object(record.clone()))]) {
        Ok(result) => Some(result),
        Err(e) => {
            tracing::warn!(
                expression = %raw.expression,
                error = %e,
                "raw expression failed on record; result is unknown"
            );
            None
        }
    }
}

/// 단일 비교 연산
pub fn compare(actual: &Value, op: Operator, expected: &Value) -> bool {
    match op {
        Operator::Eq => values_equal(actual, expected),
        Operator::Ne => !values_equal(actual, expected),
        Operator::Gt => matches!(order(actual, expected), Some(Ordering::Greater)),
        Operator::Gte => matches!(
            order(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::Lt => matches!(order(actual, expected), Some(Ordering::Less)),
        Operator::Lte => matches!(
            order(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::In => candidates(expected)
            .iter()
            .any(|c| values_equal(actual, c)),
        Operator::NotIn => !candidates(expected)
            .iter()
            .any(|c| values_equal(actual, c)),
        Operator::Like => like(actual, expected),
        Operator::NotLike => !like(actual, expected),
        Operator::Is => {
            let set = !is_blank(actual);
            match expected.as_str() {
                Some("set") => set,
                Some("not set") => !set,
                _ => false,
            }
        }
        Operator::Between => match expected.as_array().map(|a| a.as_slice()) {
            Some([low, high]) => {
                matches!(order(actual, low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(order(actual, high), Some(Ordering::Less | Ordering::Equal))
            }
            _ => false,
        },
    }
}

fn candidates(expected: &Value) -> Vec<Value> {
    match expected {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn like(actual: &Value, pattern: &Value) -> bool {
    match (actual.as_str(), pattern.as_str()) {
        (Some(text), Some(pattern)) => {
            let text: Vec<char> = text.chars().collect();
            let pattern: Vec<char> = pattern.chars().collect();
            like_match(&text, &pattern)
        }
        _ => false,
    }
}

/// SQL LIKE 매칭 (`%` = 임의 길이, `_` = 한 글자)
fn like_match(text: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|i| like_match(&text[i..], rest)),
        Some(('_', rest)) => !text.is_empty() && like_match(&text[1..], rest),
        Some((c, rest)) => text.first() == Some(c) && like_match(&text[1..], rest),
    }
}
