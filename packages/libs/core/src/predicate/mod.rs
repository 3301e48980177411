//! 컴파일된 predicate fragment
//!
//! Query Filter가 컴파일된 결과이자, 규칙 조합기가 최종적으로 만들어내는 불리언 표현식입니다.
//! 특정 백엔드에 묶이지 않은 AST이며, 백엔드가 실행(`eval`, SQL 렌더링 등)을 담당합니다.
//!
//! `and`/`or`/`not` 생성자는 상수 폴딩을 수행하므로 `True`/`False`가 살아남는 경우는
//! 표현식 전체가 상수일 때뿐입니다.

pub(crate) mod cel;
pub mod eval;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw expression에서 acting identity로 치환되는 토큰
pub const ACTING_AS_TOKEN: &str = "{{acting_as}}";

/// 비교 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Like,
    NotLike,
    /// `set` / `not set`
    Is,
    /// `[low, high]` (양 끝 포함)
    Between,
}

impl Operator {
    /// 문자열에서 파싱 (`=`, `not in` 등)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "=" | "==" => Some(Operator::Eq),
            "!=" | "<>" => Some(Operator::Ne),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Gte),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Lte),
            "in" => Some(Operator::In),
            "not in" => Some(Operator::NotIn),
            "like" => Some(Operator::Like),
            "not like" => Some(Operator::NotLike),
            "is" => Some(Operator::Is),
            "between" => Some(Operator::Between),
            _ => None,
        }
    }

    /// 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::In => "in",
            Operator::NotIn => "not in",
            Operator::Like => "like",
            Operator::NotLike => "not like",
            Operator::Is => "is",
            Operator::Between => "between",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Operator {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Operator::from_str(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown operator: {}", value)))
    }
}

/// 백엔드 언어로 작성된 raw expression 조각
///
/// `expression`은 그대로 사용되며, 렌더링 시점에 `{{acting_as}}` 토큰만
/// 백엔드 규칙에 맞게 quote된 identity 리터럴로 치환됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFragment {
    pub expression: String,
    pub acting_as: String,
}

impl RawFragment {
    pub fn new(expression: impl Into<String>, acting_as: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            acting_as: acting_as.into(),
        }
    }

    /// acting identity를 템플릿에 채운 최종 expression
    pub fn render(&self, quote: impl Fn(&str) -> String) -> String {
        if self.expression.contains(ACTING_AS_TOKEN) {
            self.expression
                .replace(ACTING_AS_TOKEN, &quote(&self.acting_as))
        } else {
            self.expression.clone()
        }
    }
}

/// 컴파일된 불리언 predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    /// 모든 레코드
    True,

    /// 어떤 레코드도 아님
    False,

    /// 필드 비교
    Compare {
        field: String,
        op: Operator,
        value: Value,
    },

    /// 백엔드 언어 raw expression
    Raw(RawFragment),

    And { items: Vec<Predicate> },

    Or { items: Vec<Predicate> },

    Not { item: Box<Predicate> },
}

impl Predicate {
    /// 단일 비교
    pub fn compare(field: impl Into<String>, op: Operator, value: Value) -> Self {
        Predicate::Compare {
            field: field.into(),
            op,
            value,
        }
    }

    /// `field = value`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, Operator::Eq, value.into())
    }

    /// `field in (values...)`, 값이 없으면 `False`
    pub fn is_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Predicate::False;
        }
        Self::compare(field, Operator::In, Value::Array(values))
    }

    /// 상수 폴딩을 포함한 AND
    pub fn and(items: impl IntoIterator<Item = Predicate>) -> Self {
        let mut out = Vec::new();
        for item in items {
            match item {
                Predicate::True => {}
                Predicate::False => return Predicate::False,
                Predicate::And { items } => out.extend(items),
                other => out.push(other),
            }
        }
        collapse(out, Predicate::True, |items| Predicate::And { items })
    }

    /// 상수 폴딩을 포함한 OR
    pub fn or(items: impl IntoIterator<Item = Predicate>) -> Self {
        let mut out = Vec::new();
        for item in items {
            match item {
                Predicate::False => {}
                Predicate::True => return Predicate::True,
                Predicate::Or { items } => out.extend(items),
                other => out.push(other),
            }
        }
        collapse(out, Predicate::False, |items| Predicate::Or { items })
    }

    /// 상수 폴딩 및 이중 부정 제거를 포함한 NOT
    #[allow(clippy::should_implement_trait)]
    pub fn not(item: Predicate) -> Self {
        match item {
            Predicate::True => Predicate::False,
            Predicate::False => Predicate::True,
            Predicate::Not { item } => *item,
            other => Predicate::Not {
                item: Box::new(other),
            },
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Predicate::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Predicate::False)
    }
}

fn collapse(
    mut items: Vec<Predicate>,
    empty: Predicate,
    wrap: impl FnOnce(Vec<Predicate>) -> Predicate,
) -> Predicate {
    match items.len() {
        0 => empty,
        1 => items.pop().unwrap_or(empty),
        _ => wrap(items),
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::True => write!(f, "TRUE"),
            Predicate::False => write!(f, "FALSE"),
            Predicate::Compare { field, op, value } => write!(f, "{} {} {}", field, op, value),
            Predicate::Raw(raw) => write!(f, "({})", raw.expression),
            Predicate::And { items } => write_joined(f, items, " AND "),
            Predicate::Or { items } => write_joined(f, items, " OR "),
            Predicate::Not { item } => write!(f, "NOT ({})", item),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Predicate], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, ")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_and_folding() {
        let a = Predicate::eq("status", "active");
        assert_eq!(Predicate::and(vec![Predicate::True, a.clone()]), a);
        assert_eq!(
            Predicate::and(vec![a.clone(), Predicate::False]),
            Predicate::False
        );
        assert_eq!(Predicate::and(Vec::new()), Predicate::True);
    }

    #[test]
    fn test_or_folding() {
        let a = Predicate::eq("status", "active");
        assert_eq!(Predicate::or(vec![Predicate::False, a.clone()]), a);
        assert_eq!(Predicate::or(vec![a, Predicate::True]), Predicate::True);
        assert_eq!(Predicate::or(Vec::new()), Predicate::False);
    }

    #[test]
    fn test_nested_and_is_flattened() {
        let a = Predicate::eq("a", 1);
        let b = Predicate::eq("b", 2);
        let c = Predicate::eq("c", 3);
        let nested = Predicate::and(vec![Predicate::and(vec![a.clone(), b.clone()]), c.clone()]);
        assert_eq!(nested, Predicate::And { items: vec![a, b, c] });
    }

    #[test]
    fn test_not_folding() {
        let a = Predicate::eq("a", 1);
        assert_eq!(Predicate::not(Predicate::True), Predicate::False);
        assert_eq!(Predicate::not(Predicate::not(a.clone())), a);
    }

    #[test]
    fn test_is_in_empty_is_false() {
        let p = Predicate::is_in("id", Vec::<String>::new());
        assert!(p.is_false());
    }

    #[test]
    fn test_raw_render() {
        let raw = RawFragment::new("owner = {{acting_as}}", "o'brien");
        let rendered = raw.render(|s| format!("'{}'", s.replace('\'', "''")));
        assert_eq!(rendered, "owner = 'o''brien'");
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!(Operator::from_str("NOT IN"), Some(Operator::NotIn));
        assert_eq!(Operator::from_str("<>"), Some(Operator::Ne));
        assert_eq!(Operator::from_str("~"), None);
    }

    #[test]
    fn test_serde_shape() {
        let p = Predicate::and(vec![
            Predicate::eq("status", "active"),
            Predicate::not(Predicate::eq("archived", true)),
        ]);
        let value = serde_json::to_value(&p).unwrap();
        assert_eq!(value["type"], json!("and"));
        assert_eq!(value["items"][0]["op"], json!("="));
        let back: Predicate = serde_json::from_value(value).unwrap();
        assert_eq!(back, p);
    }
}
