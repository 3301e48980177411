//! 규칙 해석
//!
//! Principal 매칭, resource 필터 그룹 컴파일, Permit/Forbid 조합.

pub mod combinator;
pub mod principal;
pub mod resource;

pub use combinator::{combine, AccessLevel};
pub use principal::PrincipalResolver;
pub use resource::group_predicate;
