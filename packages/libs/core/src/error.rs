//! 공통 에러 타입
//!
//! Warden 엔진 전체에서 사용되는 에러 타입을 정의합니다.
//!
//! 데이터에 따라 달라지는 결과(매칭 없음, 빈 필터 등)는 에러가 아니라 정상적인 결정입니다.
//! 여기에 정의된 에러는 구조적 오용이나 저장 시점의 설정 오류만 나타냅니다.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Warden 공통 에러
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────────
    // Configuration Errors (저장 시점에만 발생)
    // ─────────────────────────────────────────────────────────────────────────────
    #[error("invalid query filter '{name}': {message}")]
    InvalidFilter { name: String, message: String },

    #[error("invalid resource descriptor '{name}': {message}")]
    InvalidDescriptor { name: String, message: String },

    #[error("invalid rule '{title}': {message}")]
    InvalidRule { title: String, message: String },

    #[error("query filter '{name}' is referenced by rules: {}", rules.join(", "))]
    FilterInUse { name: String, rules: Vec<String> },

    #[error("resource descriptor '{name}' is referenced by rules: {}", rules.join(", "))]
    DescriptorInUse { name: String, rules: Vec<String> },

    #[error("not found: {what} '{name}'")]
    NotFound { what: &'static str, name: String },

    #[error("engine configuration error: {message}")]
    Config { message: String },

    // ─────────────────────────────────────────────────────────────────────────────
    // Evaluation Errors
    // ─────────────────────────────────────────────────────────────────────────────
    #[error("invalid target: {kind}/{key}: {reason}")]
    InvalidTarget {
        kind: String,
        key: String,
        reason: String,
    },

    #[error("predicate backend error: {message}")]
    Backend { message: String },

    // ─────────────────────────────────────────────────────────────────────────────
    // IO/Serialization Errors
    // ─────────────────────────────────────────────────────────────────────────────
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// 관리자가 저장 시점에 고쳐야 하는 설정 오류인지 여부
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidFilter { .. }
                | Error::InvalidDescriptor { .. }
                | Error::InvalidRule { .. }
                | Error::FilterInUse { .. }
                | Error::DescriptorInUse { .. }
                | Error::Config { .. }
                | Error::Yaml(_)
        )
    }

    /// 에러 코드 (호출자용)
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidFilter { .. } => "INVALID_QUERY_FILTER",
            Error::InvalidDescriptor { .. } => "INVALID_RESOURCE_DESCRIPTOR",
            Error::InvalidRule { .. } => "INVALID_RULE",
            Error::FilterInUse { .. } => "QUERY_FILTER_IN_USE",
            Error::DescriptorInUse { .. } => "RESOURCE_DESCRIPTOR_IN_USE",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Config { .. } => "CONFIG_ERROR",
            Error::InvalidTarget { .. } => "INVALID_TARGET",
            Error::Backend { .. } => "BACKEND_ERROR",
            Error::Yaml(_) => "YAML_ERROR",
            Error::Json(_) => "JSON_ERROR",
        }
    }

    pub(crate) fn invalid_target(
        kind: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidTarget {
            kind: kind.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }
}
