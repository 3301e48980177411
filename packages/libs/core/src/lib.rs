//! warden-core: 규칙 기반 접근 제어 평가 엔진
//!
//! 이름이 붙은 재사용 가능한 predicate(Query Filter)를 Permit/Forbid 규칙으로 조합하고,
//! 규칙이 적용되는 principal과 레코드를 해석해 하나의 필터 predicate로 컴파일합니다.
//!
//! # 모듈 구조
//!
//! - `predicate`: 백엔드 중립 predicate AST와 단일 레코드 실행기
//! - `filter`: Query Filter 정의, 컴파일러, 샌드박스 스크립트, 요청 단위 컴파일 스코프
//! - `policy`: Resource Descriptor, 규칙, 정책 저장소 및 저장 시점 검증
//! - `rule_map`: `{kind: {key: {field: {action: [Rule]}}}}` 인덱스와 버전 캐시
//! - `resolve`: principal 매칭, resource 필터 그룹, Permit/Forbid 조합
//! - `source`: predicate 실행 백엔드 (`DataSource`)
//! - `engine`: 결정 API와 정책 변경 API
//! - `config`, `context`, `error`: 설정, 요청 컨텍스트, 공통 에러 타입
//!
//! # 예시
//!
//! ```ignore
//! let engine = Engine::from_yaml(EngineConfig::from_env()?, &policy_yaml, Arc::new(source))?;
//! let request = AccessRequest::entity("widget", Action::Read, "alice");
//! let decision = engine.filter_predicate(&request)?;
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod filter;
pub mod policy;
pub mod predicate;
pub mod resolve;
pub mod rule_map;
pub mod source;

pub use config::EngineConfig;
pub use context::AccessRequest;
pub use engine::{Engine, FilterDecision, ResolvedRules, ResourceAccess};
pub use error::{Error, Result};
pub use predicate::Predicate;
pub use resolve::AccessLevel;
