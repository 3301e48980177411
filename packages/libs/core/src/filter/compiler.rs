//! Predicate 컴파일러
//!
//! Query Filter 하나를 acting identity 기준의 [`Predicate`]로 컴파일합니다.
//!
//! - structured filter: 조건들을 인라인 비교로 바꾸어 AND
//! - raw expression: 그대로 사용, acting identity는 렌더링 시점에 템플릿으로 채움
//! - script: 샌드박스 실행 후 `raw_expression` 우선, 없으면 `structured_filter`,
//!   둘 다 없으면 universal-false
//!
//! 컴파일 실패는 전파되지 않습니다. 진단 로그를 남기고 universal-false가 됩니다.

use super::query_filter::{FilterCondition, FilterBody, QueryFilter};
use super::script::{ScriptBindings, ScriptRunner};
use crate::predicate::{Predicate, RawFragment};

/// Query Filter 컴파일
pub fn compile(filter: &QueryFilter, acting_as: &str, runner: &dyn ScriptRunner) -> Predicate {
    match &filter.body {
        FilterBody::Structured(conditions) => compile_conditions(&filter.name, conditions),
        FilterBody::Raw(expr) => compile_raw(&filter.name, expr, acting_as),
        FilterBody::Script(code) => {
            let bindings = ScriptBindings {
                target_entity: &filter.target,
                acting_as,
            };
            match runner.run(code, &bindings) {
                Ok(output) => {
                    if let Some(expr) = output.raw_expression {
                        compile_raw(&filter.name, &expr, acting_as)
                    } else if let Some(conditions) = output.structured_filter {
                        compile_conditions(&filter.name, &conditions)
                    } else {
                        tracing::debug!(
                            filter = %filter.name,
                            "script set no output; compiling to universal false"
                        );
                        Predicate::False
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        filter = %filter.name,
                        entity = %filter.target,
                        acting_as,
                        error = %e,
                        "script filter failed; compiling to universal false"
                    );
                    Predicate::False
                }
            }
        }
    }
}

fn compile_raw(name: &str, expr: &str, acting_as: &str) -> Predicate {
    if expr.trim().is_empty() {
        tracing::warn!(filter = %name, "empty raw expression; compiling to universal false");
        return Predicate::False;
    }
    Predicate::Raw(RawFragment::new(expr, acting_as))
}

/// 조건 목록을 AND로 결합 (빈 목록은 universal-true)
fn compile_conditions(name: &str, conditions: &[FilterCondition]) -> Predicate {
    let mut items = Vec::with_capacity(conditions.len());
    for condition in conditions {
        if let Err(e) = condition.validate() {
            tracing::warn!(filter = %name, error = %e, "invalid condition; compiling to universal false");
            return Predicate::False;
        }
        items.push(Predicate::compare(
            condition.field.clone(),
            condition.operator,
            condition.value.clone(),
        ));
    }
    Predicate::and(items)
}
