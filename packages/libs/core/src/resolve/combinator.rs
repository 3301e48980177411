//! Permit / Forbid 조합
//!
//! 최종 predicate = `(Permit OR ...) AND NOT (Forbid OR ...)`.
//! 접근 수준은 상수 폴딩된 최종 predicate에서 결정됩니다.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::predicate::Predicate;

/// 접근 수준
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// 모든 레코드
    Total,

    /// 어떤 레코드도 아님
    None,

    /// predicate를 만족하는 레코드
    Partial,

    /// 관리되지 않는 대상 (호출자가 기본 동작으로 fallback)
    Unmanaged,
}

impl AccessLevel {
    /// 어떤 레코드라도 접근 가능한지
    pub fn grants_any(&self) -> bool {
        matches!(self, AccessLevel::Total | AccessLevel::Partial)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Total => "total",
            AccessLevel::None => "none",
            AccessLevel::Partial => "partial",
            AccessLevel::Unmanaged => "unmanaged",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permit / Forbid fragment 조합
pub fn combine(permits: Vec<Predicate>, forbids: Vec<Predicate>) -> (Predicate, AccessLevel) {
    if permits.is_empty() {
        return (Predicate::False, AccessLevel::None);
    }

    let predicate = Predicate::and(vec![
        Predicate::or(permits),
        Predicate::not(Predicate::or(forbids)),
    ]);
    let level = match &predicate {
        Predicate::True => AccessLevel::Total,
        Predicate::False => AccessLevel::None,
        _ => AccessLevel::Partial,
    };
    (predicate, level)
}
