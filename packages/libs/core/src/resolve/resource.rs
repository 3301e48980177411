//! Resource 필터 그룹 해석
//!
//! 규칙의 resource 필터 그룹을 `(OR non-exception) AND NOT (OR exception)` predicate로 만듭니다.
//! non-exception 필터가 없으면 모든 레코드입니다.

use crate::filter::CompileScope;
use crate::policy::FilterRef;
use crate::predicate::Predicate;

/// 필터 그룹을 하나의 predicate로 컴파일
pub fn group_predicate(scope: &mut CompileScope<'_>, refs: &[FilterRef], acting_as: &str) -> Predicate {
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for r in refs {
        let p = scope.resolve(&r.filter, acting_as);
        if r.exception {
            exclude.push(p);
        } else {
            include.push(p);
        }
    }

    let included = if include.is_empty() {
        Predicate::True
    } else {
        Predicate::or(include)
    };
    Predicate::and(vec![included, Predicate::not(Predicate::or(exclude))])
}
