//! SQL 렌더링 에러

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SqlError>;

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("cannot render '{field} {op}': {message}")]
    InvalidCondition {
        field: String,
        op: String,
        message: String,
    },

    #[error(transparent)]
    Engine(#[from] warden_core::Error),
}
