//! Principal 해석
//!
//! 규칙의 principal 필터 그룹이 acting identity와 매칭되는지 판단합니다.
//! 필터 대상 엔티티에 따라 두 단계로 확장됩니다.
//!
//! - identity: predicate를 identity 엔티티에 직접 적용
//! - group: predicate로 group을 고른 뒤 멤버십 join으로 identity 확장
//! - role: predicate로 role을 고른 뒤 wildcard role이면 모든 identity,
//!   아니면 role 할당 join으로 identity 확장

use std::collections::HashMap;

use crate::config::{EngineConfig, PrincipalType};
use crate::error::Result;
use crate::filter::CompileScope;
use crate::policy::FilterRef;
use crate::predicate::Predicate;
use crate::source::DataSource;

/// Principal 해석기 (요청 단위)
pub struct PrincipalResolver<'a> {
    config: &'a EngineConfig,
    source: &'a dyn DataSource,
    memo: HashMap<(String, String), bool>,
}

impl<'a> PrincipalResolver<'a> {
    pub fn new(config: &'a EngineConfig, source: &'a dyn DataSource) -> Self {
        Self {
            config,
            source,
            memo: HashMap::new(),
        }
    }

    /// 필터 그룹 매칭: 어떤 non-exception 필터와 매칭되고 어떤 exception 필터와도 매칭되지 않음
    pub fn group_matches(
        &mut self,
        scope: &mut CompileScope<'_>,
        refs: &[FilterRef],
        actor: &str,
    ) -> Result<bool> {
        let mut included = false;
        for r in refs.iter().filter(|r| !r.exception) {
            if self.filter_matches(scope, &r.filter, actor)? {
                included = true;
                break;
            }
        }
        if !included {
            return Ok(false);
        }

        for r in refs.iter().filter(|r| r.exception) {
            if self.filter_matches(scope, &r.filter, actor)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 단일 principal 필터 매칭 (메모이즈)
    pub fn filter_matches(
        &mut self,
        scope: &mut CompileScope<'_>,
        name: &str,
        actor: &str,
    ) -> Result<bool> {
        let key = (name.to_string(), actor.to_string());
        if let Some(matched) = self.memo.get(&key) {
            return Ok(*matched);
        }

        let matched = match scope.filter(name) {
            None => false,
            Some(filter) => match self.config.principals.principal_type(&filter.target) {
                None => {
                    tracing::warn!(
                        filter = %name,
                        entity = %filter.target,
                        "principal filter does not target a principal entity; no match"
                    );
                    false
                }
                Some(kind) => {
                    let predicate = scope.resolve(name, actor);
                    self.expand(kind, &predicate, actor)?
                }
            },
        };

        self.memo.insert(key, matched);
        Ok(matched)
    }

    fn expand(&self, kind: PrincipalType, predicate: &Predicate, actor: &str) -> Result<bool> {
        if predicate.is_false() {
            return Ok(false);
        }
        let p = &self.config.principals;
        let id_field = self.config.id_field.as_str();

        match kind {
            PrincipalType::Identity => {
                if predicate.is_true() {
                    return Ok(true);
                }
                let scoped = Predicate::and(vec![predicate.clone(), Predicate::eq(id_field, actor)]);
                Ok(!self.source.select_where(&p.identity, &scoped)?.is_empty())
            }
            PrincipalType::Group => {
                let groups = self.source.select_where(&p.group, predicate)?;
                if groups.is_empty() {
                    return Ok(false);
                }
                let membership = Predicate::and(vec![
                    Predicate::is_in(p.group_member_group_field.as_str(), groups),
                    Predicate::eq(p.group_member_identity_field.as_str(), actor),
                ]);
                Ok(!self.source.select_where(&p.group_member, &membership)?.is_empty())
            }
            PrincipalType::Role => {
                let roles = self.source.select_where(&p.role, predicate)?;
                if roles.iter().any(|r| r == &p.wildcard_role) {
                    return Ok(true);
                }
                if roles.is_empty() {
                    return Ok(false);
                }
                let assignment = Predicate::and(vec![
                    Predicate::is_in(p.role_assignment_role_field.as_str(), roles),
                    Predicate::eq(p.role_assignment_identity_field.as_str(), actor),
                ]);
                Ok(!self.source.select_where(&p.role_assignment, &assignment)?.is_empty())
            }
        }
    }
}
