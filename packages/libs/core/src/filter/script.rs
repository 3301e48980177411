//! 샌드박스 스크립트 실행
//!
//! Script 필터는 두 개의 출력(`raw_expression`, `structured_filter`)만 설정할 수 있고,
//! 읽기 전용 바인딩 `target_entity`, `acting_as`만 볼 수 있습니다.
//!
//! 기본 구현인 [`CelScriptRunner`]는 스크립트를 하나의 CEL 표현식으로 실행합니다.
//! CEL에는 import, I/O, 가변 상태가 없으므로 바인딩 허용 목록이 곧 샌드박스 경계입니다.
//! 표현식의 값이 출력을 결정합니다.
//!
//! - 문자열 → `raw_expression`
//! - 리스트 → `structured_filter`
//! - 맵 → `raw_expression` / `structured_filter` 키 (그 외 키는 오류)
//! - `null` → 출력 없음

use serde_json::Value;
use thiserror::Error;

use super::query_filter::FilterCondition;
use crate::predicate::cel;

/// 스크립트에 노출되는 읽기 전용 바인딩
#[derive(Debug, Clone, Copy)]
pub struct ScriptBindings<'a> {
    pub target_entity: &'a str,
    pub acting_as: &'a str,
}

/// 스크립트가 설정한 출력
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutput {
    pub raw_expression: Option<String>,
    pub structured_filter: Option<Vec<FilterCondition>>,
}

/// 스크립트 실행 에러
///
/// 평가 시점에는 절대 전파되지 않으며, 컴파일러가 universal-false로 강등합니다.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error("script is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("script failed: {0}")]
    Execution(String),

    #[error("script produced an invalid output: {0}")]
    InvalidOutput(String),
}

/// 샌드박스 스크립트 실행기
pub trait ScriptRunner: Send + Sync {
    fn run(&self, code: &str, bindings: &ScriptBindings<'_>) -> Result<ScriptOutput, ScriptError>;
}

/// CEL 기반 스크립트 실행기
#[derive(Debug, Clone)]
pub struct CelScriptRunner {
    max_len: usize,
}

impl CelScriptRunner {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl Default for CelScriptRunner {
    fn default() -> Self {
        Self::new(16 * 1024)
    }
}

impl ScriptRunner for CelScriptRunner {
    fn run(&self, code: &str, bindings: &ScriptBindings<'_>) -> Result<ScriptOutput, ScriptError> {
        if code.len() > self.max_len {
            return Err(ScriptError::TooLong {
                len: code.len(),
                max: self.max_len,
            });
        }

        let vars = vec![
            ("target_entity", Value::String(bindings.target_entity.to_string())),
            ("acting_as", Value::String(bindings.acting_as.to_string())),
        ];
        let result = cel::execute(code, vars).map_err(ScriptError::Execution)?;

        parse_output(cel::cel_to_json(&result))
    }
}

fn parse_output(value: Value) -> Result<ScriptOutput, ScriptError> {
    match value {
        Value::Null => Ok(ScriptOutput::default()),
        Value::String(expr) => Ok(ScriptOutput {
            raw_expression: Some(expr),
            structured_filter: None,
        }),
        Value::Array(_) => Ok(ScriptOutput {
            raw_expression: None,
            structured_filter: Some(parse_conditions(value)?),
        }),
        Value::Object(mut map) => {
            let raw = map.remove("raw_expression");
            let structured = map.remove("structured_filter");
            if let Some(key) = map.keys().next() {
                return Err(ScriptError::InvalidOutput(format!(
                    "'{}' is not a settable output",
                    key
                )));
            }

            let raw_expression = match raw {
                None | Some(Value::Null) => None,
                Some(Value::String(expr)) => Some(expr),
                Some(other) => {
                    return Err(ScriptError::InvalidOutput(format!(
                        "raw_expression must be a string, got {}",
                        other
                    )))
                }
            };
            let structured_filter = match structured {
                None | Some(Value::Null) => None,
                Some(list) => Some(parse_conditions(list)?),
            };

            Ok(ScriptOutput {
                raw_expression,
                structured_filter,
            })
        }
        other => Err(ScriptError::InvalidOutput(format!(
            "expected string, list or map, got {}",
            other
        ))),
    }
}

fn parse_conditions(value: Value) -> Result<Vec<FilterCondition>, ScriptError> {
    let conditions: Vec<FilterCondition> = serde_json::from_value(value)
        .map_err(|e| ScriptError::InvalidOutput(e.to_string()))?;
    for condition in &conditions {
        condition.validate().map_err(ScriptError::InvalidOutput)?;
    }
    Ok(conditions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Operator;

    fn bindings() -> ScriptBindings<'static> {
        ScriptBindings {
            target_entity: "widget",
            acting_as: "alice",
        }
    }

    #[test]
    fn test_string_sets_raw_expression() {
        let runner = CelScriptRunner::default();
        let out = runner
            .run("'resource.owner == \"' + acting_as + '\"'", &bindings())
            .unwrap();
        assert_eq!(
            out.raw_expression.as_deref(),
            Some("resource.owner == \"alice\"")
        );
        assert!(out.structured_filter.is_none());
    }

    #[test]
    fn test_list_sets_structured_filter() {
        let runner = CelScriptRunner::default();
        let out = runner
            .run("[['owner', '=', acting_as], ['kind', '=', target_entity]]", &bindings())
            .unwrap();
        let conditions = out.structured_filter.unwrap();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].operator, Operator::Eq);
        assert_eq!(conditions[0].value, Value::String("alice".to_string()));
        assert_eq!(conditions[1].value, Value::String("widget".to_string()));
    }

    #[test]
    fn test_map_output_and_unknown_key() {
        let runner = CelScriptRunner::default();
        let out = runner
            .run(
                "acting_as == 'alice' ? {'raw_expression': 'true'} : {'structured_filter': []}",
                &bindings(),
            )
            .unwrap();
        assert_eq!(out.raw_expression.as_deref(), Some("true"));

        let err = runner
            .run("{'import': 'os'}", &bindings())
            .unwrap_err();
        assert!(matches!(err, ScriptError::InvalidOutput(_)));
    }

    #[test]
    fn test_failures() {
        let runner = CelScriptRunner::new(8);
        assert!(matches!(
            runner.run("'way too long script'", &bindings()),
            Err(ScriptError::TooLong { .. })
        ));

        let runner = CelScriptRunner::default();
        assert!(matches!(
            runner.run("undefined_binding.x", &bindings()),
            Err(ScriptError::Execution(_))
        ));
        assert!(matches!(
            runner.run("42", &bindings()),
            Err(ScriptError::InvalidOutput(_))
        ));
    }
}
