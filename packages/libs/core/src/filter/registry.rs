//! 요청 단위 필터 컴파일 스코프
//!
//! 하나의 평가 요청 동안 `(필터 이름, acting identity)` 기준으로 컴파일 결과를 메모이즈합니다.
//! 스코프는 요청이 끝나면 버려지며 요청 간에 공유되지 않습니다.

use std::collections::{BTreeMap, HashMap};

use super::compiler::compile;
use super::query_filter::QueryFilter;
use super::script::ScriptRunner;
use crate::predicate::Predicate;

/// 요청 단위 컴파일 스코프
pub struct CompileScope<'a> {
    filters: &'a BTreeMap<String, QueryFilter>,
    runner: &'a dyn ScriptRunner,
    memo: HashMap<(String, String), Predicate>,
}

impl<'a> CompileScope<'a> {
    pub fn new(filters: &'a BTreeMap<String, QueryFilter>, runner: &'a dyn ScriptRunner) -> Self {
        Self {
            filters,
            runner,
            memo: HashMap::new(),
        }
    }

    /// 이름으로 필터를 찾아 컴파일 (메모이즈)
    ///
    /// 존재하지 않는 필터는 universal-false 입니다.
    pub fn resolve(&mut self, name: &str, acting_as: &str) -> Predicate {
        let key = (name.to_string(), acting_as.to_string());
        if let Some(p) = self.memo.get(&key) {
            return p.clone();
        }

        let predicate = match self.filters.get(name) {
            Some(filter) => compile(filter, acting_as, self.runner),
            None => {
                tracing::warn!(filter = %name, "referenced query filter is missing; compiling to universal false");
                Predicate::False
            }
        };
        self.memo.insert(key, predicate.clone());
        predicate
    }

    /// 필터 정의 조회
    pub fn filter(&self, name: &str) -> Option<&'a QueryFilter> {
        self.filters.get(name)
    }

    /// 메모에 저장된 컴파일 결과 수
    pub fn compiled(&self) -> usize {
        self.memo.len()
    }
}
