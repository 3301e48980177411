//! Query Filter
//!
//! 이름이 붙은 재사용 가능한 predicate 정의와 컴파일러, 샌드박스 스크립트 실행기,
//! 요청 단위 컴파일 스코프를 제공합니다.

pub mod compiler;
mod query_filter;
pub mod registry;
pub mod script;

pub use compiler::compile;
pub use query_filter::{FilterCondition, FilterBody, QueryFilter};
pub use registry::CompileScope;
pub use script::{CelScriptRunner, ScriptBindings, ScriptError, ScriptOutput, ScriptRunner};
