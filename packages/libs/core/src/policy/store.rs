//! 정책 저장소
//!
//! Query Filter, Resource Descriptor, Rule 세 컬렉션을 담습니다.
//! 모든 변경은 저장 시점에 검증되며, 검증 실패는 설정 오류로 반환됩니다.
//!
//! ```yaml
//! filters:
//!   staff:
//!     target: role
//!     structured_filter: [[name, "=", Staff]]
//! resources:
//!   widgets:
//!     kind: entity
//!     key: widget
//!     actions: all
//! rules:
//!   - title: staff read widgets
//!     polarity: permit
//!     resource: widgets
//!     actions: [read]
//!     principals: [staff]
//! ```

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::descriptor::{ManagedActions, ResourceDescriptor, ResourceKind};
use super::rule::{Polarity, Rule};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::filter::{FilterBody, QueryFilter};

/// 정책 저장소
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyStore {
    /// Query Filter (이름 → 정의)
    #[serde(default)]
    pub filters: BTreeMap<String, QueryFilter>,

    /// Resource Descriptor (이름 → 정의)
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDescriptor>,

    /// 규칙 (삽입 순서 유지)
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl PolicyStore {
    /// YAML 문서에서 로드 후 검증
    pub fn from_yaml(yaml: &str, config: &EngineConfig) -> Result<Self> {
        let mut store: PolicyStore = serde_yaml::from_str(yaml)?;

        // 맵 키가 이름이 된다
        for (name, filter) in store.filters.iter_mut() {
            if filter.name.is_empty() {
                filter.name = name.clone();
            } else if &filter.name != name {
                return Err(Error::InvalidFilter {
                    name: name.clone(),
                    message: format!("name '{}' does not match its key", filter.name),
                });
            }
        }
        for (name, descriptor) in store.resources.iter_mut() {
            if descriptor.name.is_empty() {
                descriptor.name = name.clone();
            } else if &descriptor.name != name {
                return Err(Error::InvalidDescriptor {
                    name: name.clone(),
                    message: format!("name '{}' does not match its key", descriptor.name),
                });
            }
        }

        store.validate(config)?;
        Ok(store)
    }

    /// YAML로 직렬화
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// 전체 검증
    pub fn validate(&self, config: &EngineConfig) -> Result<()> {
        for filter in self.filters.values() {
            validate_filter(filter, config)?;
        }
        for descriptor in self.resources.values() {
            validate_descriptor(descriptor, config)?;
        }
        let mut titles = HashSet::new();
        for rule in &self.rules {
            if !titles.insert(rule.title.as_str()) {
                return Err(invalid_rule(rule, "duplicate rule title"));
            }
            self.validate_rule(rule, config)?;
        }
        Ok(())
    }

    pub fn rule(&self, title: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.title == title)
    }

    /// 필터를 참조하는 규칙 제목
    pub fn rules_referencing_filter(&self, name: &str) -> Vec<String> {
        self.rules
            .iter()
            .filter(|r| r.references(name))
            .map(|r| r.title.clone())
            .collect()
    }

    /// Descriptor를 참조하는 규칙 제목
    pub fn rules_referencing_resource(&self, name: &str) -> Vec<String> {
        self.rules
            .iter()
            .filter(|r| r.resource == name)
            .map(|r| r.title.clone())
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────────

    /// 필터 추가/교체
    ///
    /// 교체 시 이 필터를 참조하는 규칙들도 다시 검증합니다.
    pub fn upsert_filter(&mut self, filter: QueryFilter, config: &EngineConfig) -> Result<()> {
        validate_filter(&filter, config)?;
        let name = filter.name.clone();
        self.filters.insert(name.clone(), filter);
        for rule in self.rules.iter().filter(|r| r.references(&name)) {
            self.validate_rule(rule, config)?;
        }
        Ok(())
    }

    /// 필터 삭제 (참조 중이면 거부)
    pub fn delete_filter(&mut self, name: &str) -> Result<QueryFilter> {
        let rules = self.rules_referencing_filter(name);
        if !rules.is_empty() {
            return Err(Error::FilterInUse {
                name: name.to_string(),
                rules,
            });
        }
        self.filters.remove(name).ok_or_else(|| Error::NotFound {
            what: "query filter",
            name: name.to_string(),
        })
    }

    /// 필터 참조를 모든 규칙에서 제거
    ///
    /// 참조 제거로 범위가 넓어질 수 있는 규칙은 비활성화됩니다.
    /// - non-exception principal이 남지 않는 규칙
    /// - exception 참조를 잃은 Permit
    /// - 마지막 non-exception resource 필터를 잃은 Permit (빈 목록은 전체 레코드)
    ///
    /// 영향을 받은 규칙 제목을 반환합니다.
    pub fn unlink_filter(&mut self, name: &str) -> Vec<String> {
        let mut touched = Vec::new();
        for rule in self.rules.iter_mut().filter(|r| r.references(name)) {
            let lost_exception = rule
                .principals
                .iter()
                .chain(rule.resources.iter())
                .any(|r| r.filter == name && r.exception);
            let had_resource_scope = rule.resources.iter().any(|r| !r.exception);

            rule.principals.retain(|r| r.filter != name);
            rule.resources.retain(|r| r.filter != name);

            let no_principal = !rule.principals.iter().any(|r| !r.exception);
            let widened = rule.polarity == Polarity::Permit
                && (lost_exception
                    || (had_resource_scope && !rule.resources.iter().any(|r| !r.exception)));
            if no_principal || widened {
                rule.disabled = true;
            }
            touched.push(rule.title.clone());
        }
        touched
    }

    /// Descriptor 추가/교체
    pub fn upsert_resource(
        &mut self,
        descriptor: ResourceDescriptor,
        config: &EngineConfig,
    ) -> Result<()> {
        validate_descriptor(&descriptor, config)?;
        let name = descriptor.name.clone();
        self.resources.insert(name.clone(), descriptor);
        for rule in self.rules.iter().filter(|r| r.resource == name) {
            self.validate_rule(rule, config)?;
        }
        Ok(())
    }

    /// Descriptor 삭제 (참조 중이면 거부)
    pub fn delete_resource(&mut self, name: &str) -> Result<ResourceDescriptor> {
        let rules = self.rules_referencing_resource(name);
        if !rules.is_empty() {
            return Err(Error::DescriptorInUse {
                name: name.to_string(),
                rules,
            });
        }
        self.resources.remove(name).ok_or_else(|| Error::NotFound {
            what: "resource descriptor",
            name: name.to_string(),
        })
    }

    /// 규칙 추가/교체 (제목 기준, 교체 시 위치 유지)
    pub fn upsert_rule(&mut self, rule: Rule, config: &EngineConfig) -> Result<()> {
        self.validate_rule(&rule, config)?;
        match self.rules.iter_mut().find(|r| r.title == rule.title) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
        Ok(())
    }

    pub fn delete_rule(&mut self, title: &str) -> Result<Rule> {
        let index = self
            .rules
            .iter()
            .position(|r| r.title == title)
            .ok_or_else(|| Error::NotFound {
                what: "rule",
                name: title.to_string(),
            })?;
        Ok(self.rules.remove(index))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Rule validation
    // ─────────────────────────────────────────────────────────────────────────────

    fn validate_rule(&self, rule: &Rule, config: &EngineConfig) -> Result<()> {
        if rule.title.trim().is_empty() {
            return Err(invalid_rule(rule, "title must not be empty"));
        }

        let descriptor = self
            .resources
            .get(&rule.resource)
            .ok_or_else(|| invalid_rule(rule, format!("unknown resource '{}'", rule.resource)))?;

        if let ManagedActions::Only(actions) = &rule.actions {
            if actions.is_empty() {
                return Err(invalid_rule(rule, "at least one action is required"));
            }
            if let Some(action) = actions.iter().find(|a| !descriptor.actions.contains(**a)) {
                return Err(invalid_rule(
                    rule,
                    format!("action '{}' is not managed by '{}'", action, descriptor.name),
                ));
            }
        }

        if !rule.disabled && !rule.principals.iter().any(|r| !r.exception) {
            return Err(invalid_rule(
                rule,
                "at least one non-exception principal filter is required",
            ));
        }

        for reference in &rule.principals {
            let filter = self.referenced(rule, &reference.filter)?;
            if config.principals.principal_type(&filter.target).is_none() {
                return Err(invalid_rule(
                    rule,
                    format!(
                        "principal filter '{}' targets '{}', expected one of {}, {}, {}",
                        filter.name,
                        filter.target,
                        config.principals.identity,
                        config.principals.group,
                        config.principals.role
                    ),
                ));
            }
        }

        for reference in &rule.resources {
            let filter = self.referenced(rule, &reference.filter)?;
            if descriptor.kind == ResourceKind::Entity && filter.target != descriptor.key {
                return Err(invalid_rule(
                    rule,
                    format!(
                        "resource filter '{}' targets '{}' but the rule governs '{}'",
                        filter.name, filter.target, descriptor.key
                    ),
                ));
            }
        }

        if !rule.validity.is_well_formed() {
            return Err(invalid_rule(rule, "valid_from is after valid_until"));
        }

        Ok(())
    }

    fn referenced(&self, rule: &Rule, name: &str) -> Result<&QueryFilter> {
        self.filters
            .get(name)
            .ok_or_else(|| invalid_rule(rule, format!("unknown query filter '{}'", name)))
    }
}

fn invalid_rule(rule: &Rule, message: impl Into<String>) -> Error {
    Error::InvalidRule {
        title: rule.title.clone(),
        message: message.into(),
    }
}

fn validate_filter(filter: &QueryFilter, config: &EngineConfig) -> Result<()> {
    let invalid = |message: String| Error::InvalidFilter {
        name: filter.name.clone(),
        message,
    };

    if filter.name.trim().is_empty() {
        return Err(invalid("name must not be empty".to_string()));
    }
    if filter.target.trim().is_empty() {
        return Err(invalid("target entity must not be empty".to_string()));
    }

    match &filter.body {
        FilterBody::Structured(conditions) => {
            for condition in conditions {
                condition.validate().map_err(invalid)?;
            }
        }
        FilterBody::Raw(expr) => {
            if expr.trim().is_empty() {
                return Err(invalid("raw expression must not be empty".to_string()));
            }
        }
        FilterBody::Script(code) => {
            if code.trim().is_empty() {
                return Err(invalid("script must not be empty".to_string()));
            }
            if code.len() > config.max_script_len {
                return Err(invalid(format!(
                    "script is {} bytes, limit is {}",
                    code.len(),
                    config.max_script_len
                )));
            }
        }
    }
    Ok(())
}

fn validate_descriptor(descriptor: &ResourceDescriptor, config: &EngineConfig) -> Result<()> {
    let invalid = |message: String| Error::InvalidDescriptor {
        name: descriptor.name.clone(),
        message,
    };

    if descriptor.name.trim().is_empty() {
        return Err(invalid("name must not be empty".to_string()));
    }
    if !config.knows_kind(&descriptor.kind) {
        return Err(invalid(format!("unknown resource kind '{}'", descriptor.kind)));
    }
    if descriptor.key.trim().is_empty() {
        return Err(invalid("key must not be empty".to_string()));
    }
    if matches!(&descriptor.field, Some(f) if f.trim().is_empty()) {
        return Err(invalid("field must not be blank".to_string()));
    }
    if matches!(&descriptor.actions, ManagedActions::Only(a) if a.is_empty()) {
        return Err(invalid("at least one managed action is required".to_string()));
    }
    Ok(())
}
