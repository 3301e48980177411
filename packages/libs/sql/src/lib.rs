//! warden-sql: 컴파일된 predicate의 SQL 렌더링
//!
//! warden-core가 만든 [`Predicate`](warden_core::Predicate)를 SQL-backed 저장소가
//! 실행할 수 있는 조건식과 SELECT 문으로 변환합니다.
//! SeaQuery를 사용하여 값 quoting을 처리합니다.
//!
//! # 모듈 구조
//!
//! - `predicate`: Predicate → SeaQuery 조건식
//! - `builder`: 필터 SELECT 빌더와 `resource_filter_query`
//! - `error`: SQL 렌더링 에러

pub mod builder;
pub mod error;
pub mod predicate;

pub use builder::{resource_filter_query, FilterQuery, FilterQueryBuilder};
pub use error::{Result, SqlError};
pub use predicate::PredicateSql;
