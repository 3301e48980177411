//! 필터 쿼리 빌더
//!
//! 결정 API가 만든 predicate를 SQL-backed 저장소가 실행할 SELECT 문으로 만듭니다.

use sea_query::{Expr, PostgresQueryBuilder, Query, SelectStatement};
use serde::Serialize;

use warden_core::context::AccessRequest;
use warden_core::predicate::Predicate;
use warden_core::{AccessLevel, Engine};

use crate::error::Result;
use crate::predicate::{DynIden, PredicateSql};

/// SELECT 쿼리 빌더
pub struct FilterQueryBuilder<'a> {
    table: &'a str,
    id_field: &'a str,
}

impl<'a> FilterQueryBuilder<'a> {
    /// 새 빌더 생성
    pub fn new(table: &'a str, id_field: &'a str) -> Self {
        Self { table, id_field }
    }

    /// `SELECT id FROM table WHERE predicate`
    pub fn build(&self, predicate: &Predicate) -> Result<String> {
        let query = self.select(predicate)?;
        Ok(query.to_string(PostgresQueryBuilder))
    }

    /// `SELECT id FROM table WHERE predicate AND id = record`
    pub fn build_record_check(&self, predicate: &Predicate, record_id: &str) -> Result<String> {
        let mut query = self.select(predicate)?;
        query.and_where(
            Expr::col((DynIden(self.table.to_string()), DynIden(self.id_field.to_string())))
                .eq(record_id),
        );
        Ok(query.to_string(PostgresQueryBuilder))
    }

    fn select(&self, predicate: &Predicate) -> Result<SelectStatement> {
        let table = DynIden(self.table.to_string());
        let condition = PredicateSql::new(self.table).render(predicate)?;

        let mut query = Query::select();
        query
            .column((table.clone(), DynIden(self.id_field.to_string())))
            .from(table)
            .and_where(condition);
        Ok(query)
    }
}

/// 리소스 필터 쿼리
#[derive(Debug, Clone, Serialize)]
pub struct FilterQuery {
    /// `SELECT id FROM <key> WHERE <predicate>`
    pub sql: String,

    pub access: AccessLevel,

    /// 관리되지 않는 대상 (호출자 기본 동작으로 fallback, `sql`은 빈 결과)
    pub unmanaged: bool,
}

/// 요청에 대한 필터 쿼리 생성
pub fn resource_filter_query(engine: &Engine, request: &AccessRequest) -> Result<FilterQuery> {
    let decision = engine.filter_predicate(request)?;
    let sql = FilterQueryBuilder::new(&request.key, &engine.config().id_field).build(&decision.predicate)?;

    tracing::debug!(
        key = %request.key,
        action = %request.action,
        actor = request.actor(),
        access = %decision.access,
        "filter query rendered"
    );
    Ok(FilterQuery {
        sql,
        access: decision.access,
        unmanaged: decision.unmanaged,
    })
}
