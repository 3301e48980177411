//! Predicate → SQL 조건식
//!
//! 컴파일된 [`Predicate`]를 SeaQuery `SimpleExpr`로 변환합니다.
//! 값은 모두 SeaQuery를 통해 quote되며, raw fragment만 SQL 텍스트로 그대로 들어갑니다.
//! raw fragment의 `{{acting_as}}`는 작은따옴표 문자열 리터럴로 치환됩니다.
//!
//! 부정 비교(`!=`, `not in`, `not like`)는 인메모리 실행기와 같게 NULL 컬럼도 매칭합니다.
//!
//! NULL 처리는 인메모리 실행기(`warden_core::predicate::eval`)와 같습니다.
//! - 비교는 참/거짓으로 결정됩니다. `NOT` 아래의 비교는 `(...) IS TRUE`로 감싸서
//!   NULL 컬럼이 알 수 없음으로 남지 않게 합니다.
//! - raw fragment는 감싸지 않습니다. NULL로 인한 알 수 없음은 `NOT`을 거쳐도 유지되어
//!   레코드가 선택되지 않습니다.

use sea_query::{Expr, Iden, SimpleExpr};
use serde_json::Value;

use warden_core::predicate::{Operator, Predicate};

use crate::error::{Result, SqlError};

/// 동적 테이블/컬럼 식별자
#[derive(Debug, Clone)]
pub(crate) struct DynIden(pub(crate) String);

impl Iden for DynIden {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        // String에 쓰는 fmt::Write는 실패하지 않는다
        let _ = write!(s, "{}", self.0);
    }
}

/// 테이블 기준 predicate 렌더러
pub struct PredicateSql<'a> {
    table: &'a str,
}

impl<'a> PredicateSql<'a> {
    pub fn new(table: &'a str) -> Self {
        Self { table }
    }

    /// Predicate를 조건식으로 변환
    pub fn render(&self, predicate: &Predicate) -> Result<SimpleExpr> {
        self.render_in(predicate, false)
    }

    fn render_in(&self, predicate: &Predicate, negated: bool) -> Result<SimpleExpr> {
        match predicate {
            Predicate::True => Ok(Expr::cust("TRUE")),
            Predicate::False => Ok(Expr::cust("FALSE")),
            Predicate::Compare { field, op, value } => {
                let expr = self.compare(field, *op, value)?;
                if negated {
                    Ok(Expr::cust_with_expr("($1) IS TRUE", expr))
                } else {
                    Ok(expr)
                }
            }
            Predicate::Raw(raw) => Ok(Expr::cust(format!("({})", raw.render(quote_literal)))),
            Predicate::And { items } => self.fold(items, negated, SimpleExpr::and, "TRUE"),
            Predicate::Or { items } => self.fold(items, negated, SimpleExpr::or, "FALSE"),
            Predicate::Not { item } => Ok(self.render_in(item, true)?.not()),
        }
    }

    fn fold(
        &self,
        items: &[Predicate],
        negated: bool,
        join: fn(SimpleExpr, SimpleExpr) -> SimpleExpr,
        empty: &str,
    ) -> Result<SimpleExpr> {
        let mut iter = items.iter();
        let Some(first) = iter.next() else {
            return Ok(Expr::cust(empty));
        };
        let mut expr = self.render_in(first, negated)?;
        for item in iter {
            expr = join(expr, self.render_in(item, negated)?);
        }
        Ok(expr)
    }

    fn column(&self, field: &str) -> Expr {
        Expr::col((DynIden(self.table.to_string()), DynIden(field.to_string())))
    }

    fn compare(&self, field: &str, op: Operator, value: &Value) -> Result<SimpleExpr> {
        let invalid = |message: &str| SqlError::InvalidCondition {
            field: field.to_string(),
            op: op.to_string(),
            message: message.to_string(),
        };
        let col = || self.column(field);

        let expr = match op {
            Operator::Eq if value.is_null() => col().is_null(),
            Operator::Eq => col().eq(value_to_expr(value)),
            Operator::Ne if value.is_null() => col().is_not_null(),
            Operator::Ne => col().is_null().or(col().ne(value_to_expr(value))),
            Operator::Gt => col().gt(value_to_expr(value)),
            Operator::Gte => col().gte(value_to_expr(value)),
            Operator::Lt => col().lt(value_to_expr(value)),
            Operator::Lte => col().lte(value_to_expr(value)),
            Operator::In => match candidates(value) {
                list if list.is_empty() => Expr::cust("FALSE"),
                list => col().is_in(list),
            },
            Operator::NotIn => match candidates(value) {
                list if list.is_empty() => Expr::cust("TRUE"),
                list => col().is_null().or(col().is_not_in(list)),
            },
            Operator::Like => col().like(value.as_str().ok_or_else(|| invalid("pattern must be a string"))?),
            Operator::NotLike => {
                let pattern = value.as_str().ok_or_else(|| invalid("pattern must be a string"))?;
                col().is_null().or(col().not_like(pattern))
            }
            Operator::Is => match value.as_str() {
                Some("set") => col().is_not_null(),
                Some("not set") => col().is_null(),
                _ => return Err(invalid("expected \"set\" or \"not set\"")),
            },
            Operator::Between => match value.as_array().map(|a| a.as_slice()) {
                Some([low, high]) => col().between(value_to_expr(low), value_to_expr(high)),
                _ => return Err(invalid("expected a [low, high] pair")),
            },
        };
        Ok(expr)
    }
}

fn candidates(value: &Value) -> Vec<SimpleExpr> {
    match value {
        Value::Array(items) => items.iter().map(value_to_expr).collect(),
        Value::Null => Vec::new(),
        other => vec![value_to_expr(other)],
    }
}

/// SQL 문자열 리터럴로 quote (`'` → `''`)
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

pub(crate) fn value_to_expr(value: &Value) -> SimpleExpr {
    match value {
        Value::Null => Expr::val(Option::<String>::None).into(),
        Value::Bool(b) => Expr::val(*b).into(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Expr::val(i).into()
            } else if let Some(f) = n.as_f64() {
                Expr::val(f).into()
            } else {
                Expr::val(n.to_string()).into()
            }
        }
        Value::String(s) => Expr::val(s.as_str()).into(),
        Value::Array(_) | Value::Object(_) => Expr::val(value.to_string()).into(),
    }
}
