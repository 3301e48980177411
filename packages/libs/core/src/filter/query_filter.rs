//! Query Filter 정의
//!
//! 이름이 붙은 재사용 가능한 predicate 입니다. 세 가지 표현 중 정확히 하나를 가집니다.
//!
//! ```yaml
//! filters:
//!   active_widgets:
//!     target: widget
//!     structured_filter:
//!       - [status, "=", active]
//!   my_widgets:
//!     target: widget
//!     raw_expression: "resource.owner == {{acting_as}}"
//!   managers:
//!     target: role
//!     script: "[['name', '=', 'Manager']]"
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::predicate::Operator;

/// Query Filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawQueryFilter", into = "RawQueryFilter")]
pub struct QueryFilter {
    /// 고유 이름 (YAML 맵 키에서 채워질 수 있음)
    pub name: String,

    /// 대상 엔티티 타입
    pub target: String,

    /// 설명
    pub description: Option<String>,

    /// predicate 표현
    pub body: FilterBody,
}

/// predicate 표현 (정확히 하나)
#[derive(Debug, Clone, PartialEq)]
pub enum FilterBody {
    /// 필드/연산자/값 조건 목록 (AND)
    Structured(Vec<FilterCondition>),

    /// 백엔드 언어 표현식
    Raw(String),

    /// 샌드박스 스크립트 (raw expression 또는 structured filter를 만들어냄)
    Script(String),
}

impl FilterBody {
    /// 표현 종류 이름
    pub fn kind(&self) -> &'static str {
        match self {
            FilterBody::Structured(_) => "structured_filter",
            FilterBody::Raw(_) => "raw_expression",
            FilterBody::Script(_) => "script",
        }
    }
}

impl QueryFilter {
    pub fn structured(
        name: impl Into<String>,
        target: impl Into<String>,
        conditions: Vec<FilterCondition>,
    ) -> Self {
        Self::new(name, target, FilterBody::Structured(conditions))
    }

    pub fn raw(name: impl Into<String>, target: impl Into<String>, expr: impl Into<String>) -> Self {
        Self::new(name, target, FilterBody::Raw(expr.into()))
    }

    pub fn script(
        name: impl Into<String>,
        target: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self::new(name, target, FilterBody::Script(code.into()))
    }

    fn new(name: impl Into<String>, target: impl Into<String>, body: FilterBody) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            description: None,
            body,
        }
    }
}

/// YAML/JSON 직렬화 형태
///
/// 세 표현 필드가 평평하게 놓이며, 변환 시점에 정확히 하나인지 검사합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawQueryFilter {
    #[serde(default)]
    name: String,

    target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    structured_filter: Option<Vec<FilterCondition>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw_expression: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    script: Option<String>,
}

impl TryFrom<RawQueryFilter> for QueryFilter {
    type Error = String;

    fn try_from(raw: RawQueryFilter) -> Result<Self, Self::Error> {
        let body = match (raw.structured_filter, raw.raw_expression, raw.script) {
            (Some(conditions), None, None) => FilterBody::Structured(conditions),
            (None, Some(expr), None) => FilterBody::Raw(expr),
            (None, None, Some(code)) => FilterBody::Script(code),
            (None, None, None) => {
                return Err(format!(
                    "query filter '{}' needs one of structured_filter, raw_expression, script",
                    raw.name
                ))
            }
            _ => {
                return Err(format!(
                    "query filter '{}' must populate exactly one of structured_filter, raw_expression, script",
                    raw.name
                ))
            }
        };

        Ok(QueryFilter {
            name: raw.name,
            target: raw.target,
            description: raw.description,
            body,
        })
    }
}

impl From<QueryFilter> for RawQueryFilter {
    fn from(filter: QueryFilter) -> Self {
        let mut raw = RawQueryFilter {
            name: filter.name,
            target: filter.target,
            description: filter.description,
            structured_filter: None,
            raw_expression: None,
            script: None,
        };
        match filter.body {
            FilterBody::Structured(conditions) => raw.structured_filter = Some(conditions),
            FilterBody::Raw(expr) => raw.raw_expression = Some(expr),
            FilterBody::Script(code) => raw.script = Some(code),
        }
        raw
    }
}

/// 필드/연산자/값 조건
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl FilterCondition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// 연산자와 값의 모양 검사
    pub fn validate(&self) -> Result<(), String> {
        if self.field.trim().is_empty() {
            return Err("condition field must not be empty".to_string());
        }
        match self.operator {
            Operator::Between => match self.value.as_array() {
                Some(items) if items.len() == 2 => Ok(()),
                _ => Err(format!(
                    "'between' on '{}' needs a [low, high] pair",
                    self.field
                )),
            },
            Operator::Is => match self.value.as_str() {
                Some("set") | Some("not set") => Ok(()),
                _ => Err(format!(
                    "'is' on '{}' needs \"set\" or \"not set\"",
                    self.field
                )),
            },
            Operator::Like | Operator::NotLike => match self.value {
                Value::String(_) => Ok(()),
                _ => Err(format!("'{}' on '{}' needs a string pattern", self.operator, self.field)),
            },
            _ => Ok(()),
        }
    }
}

impl Serialize for FilterCondition {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        (&self.field, self.operator, &self.value).serialize(serializer)
    }
}

/// `[field, op, value]` 트리플 또는 `{field, operator, value}` 객체 모두 허용
impl<'de> Deserialize<'de> for FilterCondition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        #[derive(Deserialize)]
        struct ConditionObject {
            field: String,
            operator: Operator,
            #[serde(default)]
            value: Value,
        }

        struct ConditionVisitor;

        impl<'de> Visitor<'de> for ConditionVisitor {
            type Value = FilterCondition;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a [field, operator, value] triple or a condition object")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let field: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let operator: Operator = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let value: Value = seq.next_element()?.unwrap_or(Value::Null);
                if seq.next_element::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(4, &self));
                }
                Ok(FilterCondition {
                    field,
                    operator,
                    value,
                })
            }

            fn visit_map<M>(self, map: M) -> Result<Self::Value, M::Error>
            where
                M: de::MapAccess<'de>,
            {
                let obj =
                    ConditionObject::deserialize(de::value::MapAccessDeserializer::new(map))?;
                Ok(FilterCondition {
                    field: obj.field,
                    operator: obj.operator,
                    value: obj.value,
                })
            }
        }

        deserializer.deserialize_any(ConditionVisitor)
    }
}
