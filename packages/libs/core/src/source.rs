//! Predicate 실행 백엔드
//!
//! 엔진은 레코드 저장소를 직접 다루지 않습니다. membership join, 속성 조회, 레코드 검사는
//! 모두 [`DataSource`]를 통해 위임됩니다.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::predicate::{eval, Predicate};

/// Predicate 실행 백엔드
pub trait DataSource: Send + Sync {
    /// predicate를 만족하는 레코드 ID 목록
    fn select_where(&self, entity: &str, predicate: &Predicate) -> Result<Vec<String>>;

    /// 단일 레코드 속성 조회 (레코드 또는 속성이 없으면 `None`)
    fn get_attribute(&self, entity: &str, id: &str, attribute: &str) -> Result<Option<Value>>;

    /// 엔티티 타입 존재 여부
    fn entity_exists(&self, entity: &str) -> bool;
}

/// 인메모리 백엔드
///
/// 엔티티별 JSON 레코드 목록을 들고 [`eval::evaluate`]로 predicate를 실행합니다.
#[derive(Debug, Clone)]
pub struct MemoryDataSource {
    id_field: String,
    entities: HashMap<String, Vec<Map<String, Value>>>,
}

impl MemoryDataSource {
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            entities: HashMap::new(),
        }
    }

    /// 엔티티 타입 등록 (레코드 없이)
    pub fn define(&mut self, entity: impl Into<String>) -> &mut Self {
        self.entities.entry(entity.into()).or_default();
        self
    }

    /// 레코드 추가 (JSON 객체만 허용)
    pub fn insert(&mut self, entity: impl Into<String>, record: Value) -> Result<&mut Self> {
        let entity = entity.into();
        let Value::Object(record) = record else {
            return Err(Error::Backend {
                message: format!("records of '{}' must be JSON objects", entity),
            });
        };
        if !record.get(&self.id_field).map_or(false, |v| !v.is_null()) {
            return Err(Error::Backend {
                message: format!("record of '{}' has no '{}'", entity, self.id_field),
            });
        }
        self.entities.entry(entity).or_default().push(record);
        Ok(self)
    }

    fn record(&self, entity: &str, id: &str) -> Option<&Map<String, Value>> {
        self.entities
            .get(entity)?
            .iter()
            .find(|r| r.get(&self.id_field).map_or(false, |v| id_matches(v, id)))
    }
}

impl Default for MemoryDataSource {
    fn default() -> Self {
        Self::new("id")
    }
}

impl DataSource for MemoryDataSource {
    fn select_where(&self, entity: &str, predicate: &Predicate) -> Result<Vec<String>> {
        let records = self.entities.get(entity).ok_or_else(|| Error::Backend {
            message: format!("unknown entity '{}'", entity),
        })?;
        if predicate.is_false() {
            return Ok(Vec::new());
        }
        Ok(records
            .iter()
            .filter(|r| eval::evaluate(predicate, r))
            .filter_map(|r| r.get(&self.id_field).map(id_string))
            .collect())
    }

    fn get_attribute(&self, entity: &str, id: &str, attribute: &str) -> Result<Option<Value>> {
        if !self.entities.contains_key(entity) {
            return Err(Error::Backend {
                message: format!("unknown entity '{}'", entity),
            });
        }
        Ok(self
            .record(entity, id)
            .and_then(|r| r.get(attribute))
            .cloned())
    }

    fn entity_exists(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }
}

fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn id_matches(value: &Value, id: &str) -> bool {
    id_string(value) == id
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> MemoryDataSource {
        let mut source = MemoryDataSource::default();
        source
            .insert("widget", json!({ "id": "w1", "status": "active" }))
            .unwrap()
            .insert("widget", json!({ "id": 2, "status": "draft" }))
            .unwrap();
        source.define("gadget");
        source
    }

    #[test]
    fn test_select_where() {
        let source = source();
        let ids = source
            .select_where("widget", &Predicate::eq("status", "active"))
            .unwrap();
        assert_eq!(ids, vec!["w1"]);

        let all = source.select_where("widget", &Predicate::True).unwrap();
        assert_eq!(all, vec!["w1", "2"]);

        assert!(source.select_where("gadget", &Predicate::True).unwrap().is_empty());
        assert!(source.select_where("ghost", &Predicate::True).is_err());
    }

    #[test]
    fn test_get_attribute() {
        let source = source();
        assert_eq!(
            source.get_attribute("widget", "2", "status").unwrap(),
            Some(json!("draft"))
        );
        assert_eq!(source.get_attribute("widget", "w9", "status").unwrap(), None);
    }

    #[test]
    fn test_insert_requires_id() {
        let mut source = MemoryDataSource::default();
        assert!(source.insert("widget", json!({ "status": "x" })).is_err());
        assert!(source.insert("widget", json!([1])).is_err());
    }
}
