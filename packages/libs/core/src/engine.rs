//! 규칙 평가 엔진
//!
//! 정책 저장소 스냅샷, Rule Map 캐시, 데이터 소스, 스크립트 실행기를 묶어
//! 결정 API와 정책 변경 API를 제공합니다.
//!
//! # 결정 흐름
//!
//! 1. Rule Map(캐시)에서 `(kind, key, field, action)` slot 조회. 없으면 unmanaged
//! 2. 각 규칙의 principal 필터 그룹을 acting identity와 매칭
//! 3. 매칭된 규칙의 resource 필터 그룹을 predicate로 컴파일
//! 4. `Permit AND NOT Forbid`로 조합
//!
//! 슈퍼 identity는 2~4를 건너뛰고 항상 total 입니다.
//!
//! # 동시성
//!
//! 결정은 현재 스냅샷을 읽기만 합니다. 변경은 새 스냅샷을 만들어 교체하고,
//! 반환하기 전에 Rule Map 캐시를 무효화합니다.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::context::AccessRequest;
use crate::error::{Error, Result};
use crate::filter::{CelScriptRunner, CompileScope, QueryFilter, ScriptRunner};
use crate::policy::{Polarity, PolicyStore, ResourceDescriptor, ResourceKind, Rule};
use crate::predicate::Predicate;
use crate::resolve::{combine, group_predicate, AccessLevel, PrincipalResolver};
use crate::rule_map::{build_rule_map, RuleMap, RuleMapCache};
use crate::source::DataSource;

/// 적용 가능한 규칙 조회 결과
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedRules {
    /// acting identity와 매칭된 규칙 (삽입 순서)
    pub rules: Vec<Arc<Rule>>,

    /// 관리되지 않는 대상
    pub unmanaged: bool,

    /// 슈퍼 identity 우회
    pub bypass: bool,
}

/// 필터 predicate 결정
#[derive(Debug, Clone, Serialize)]
pub struct FilterDecision {
    pub predicate: Predicate,
    pub access: AccessLevel,
    pub unmanaged: bool,

    /// 결정에 참여한 규칙 제목
    pub rules: Vec<String>,
}

/// 접근 여부
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceAccess {
    pub access: bool,
    pub unmanaged: bool,
}

/// 규칙 평가 엔진
pub struct Engine {
    config: EngineConfig,
    store: RwLock<Arc<PolicyStore>>,
    cache: RuleMapCache,
    source: Arc<dyn DataSource>,
    runner: Arc<dyn ScriptRunner>,
}

impl Engine {
    /// 새 엔진 생성 (저장소를 검증)
    pub fn new(config: EngineConfig, store: PolicyStore, source: Arc<dyn DataSource>) -> Result<Self> {
        config.validate()?;
        store.validate(&config)?;

        let runner: Arc<dyn ScriptRunner> = Arc::new(CelScriptRunner::new(config.max_script_len));
        Ok(Self {
            cache: RuleMapCache::new(config.rule_map_ttl_secs),
            config,
            store: RwLock::new(Arc::new(store)),
            source,
            runner,
        })
    }

    /// YAML 정책 문서로 엔진 생성
    pub fn from_yaml(config: EngineConfig, yaml: &str, source: Arc<dyn DataSource>) -> Result<Self> {
        let store = PolicyStore::from_yaml(yaml, &config)?;
        Self::new(config, store, source)
    }

    /// 스크립트 실행기 교체
    pub fn with_script_runner(mut self, runner: Arc<dyn ScriptRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 현재 정책 스냅샷
    pub fn store(&self) -> Arc<PolicyStore> {
        let guard = self.store.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Decision API
    // ─────────────────────────────────────────────────────────────────────────────

    /// 전체 Rule Map (캐시)
    pub fn rule_map(&self) -> Arc<RuleMap> {
        self.cache
            .get_or_build(|| build_rule_map(self.store(), Utc::now()))
    }

    /// acting identity에 적용되는 규칙
    pub fn resource_rules(&self, request: &AccessRequest) -> Result<ResolvedRules> {
        let map = self.rule_map();
        self.check_target(&map, request)?;

        let store = Arc::clone(map.source());
        let mut scope = CompileScope::new(&store.filters, self.runner.as_ref());
        self.resolve_rules(&map, &mut scope, request)
    }

    /// 필터 predicate와 접근 수준
    pub fn filter_predicate(&self, request: &AccessRequest) -> Result<FilterDecision> {
        let map = self.rule_map();
        self.check_target(&map, request)?;

        let store = Arc::clone(map.source());
        let mut scope = CompileScope::new(&store.filters, self.runner.as_ref());
        let resolved = self.resolve_rules(&map, &mut scope, request)?;
        let actor = request.actor();

        let decision = if resolved.bypass {
            FilterDecision {
                predicate: Predicate::True,
                access: AccessLevel::Total,
                unmanaged: resolved.unmanaged,
                rules: Vec::new(),
            }
        } else if resolved.unmanaged {
            FilterDecision {
                predicate: Predicate::False,
                access: AccessLevel::Unmanaged,
                unmanaged: true,
                rules: Vec::new(),
            }
        } else {
            let mut permits = Vec::new();
            let mut forbids = Vec::new();
            for rule in &resolved.rules {
                let fragment = group_predicate(&mut scope, &rule.resources, actor);
                match rule.polarity {
                    Polarity::Permit => permits.push(fragment),
                    Polarity::Forbid => forbids.push(fragment),
                }
            }
            let (predicate, access) = combine(permits, forbids);
            FilterDecision {
                predicate,
                access,
                unmanaged: false,
                rules: resolved.rules.iter().map(|r| r.title.clone()).collect(),
            }
        };

        tracing::debug!(
            kind = %request.kind,
            key = %request.key,
            field = %request.field_key(),
            action = %request.action,
            actor,
            access = %decision.access,
            rules = decision.rules.len(),
            compiled = scope.compiled(),
            "filter predicate computed"
        );
        Ok(decision)
    }

    /// 어떤 레코드라도 접근 가능한지
    pub fn has_resource_access(&self, request: &AccessRequest) -> Result<ResourceAccess> {
        let decision = self.filter_predicate(request)?;
        Ok(ResourceAccess {
            access: decision.access.grants_any(),
            unmanaged: decision.unmanaged,
        })
    }

    /// 단일 레코드 접근 가능 여부
    ///
    /// 엔티티 리소스에만 적용됩니다. 관리되지 않는 대상은 `access: false, unmanaged: true`.
    pub fn has_record_access(&self, request: &AccessRequest, record_id: &str) -> Result<ResourceAccess> {
        if request.kind != ResourceKind::Entity {
            return Err(Error::invalid_target(
                request.kind.as_str(),
                &request.key,
                "record access applies to entity resources only",
            ));
        }

        let decision = self.filter_predicate(request)?;
        let access = match decision.access {
            AccessLevel::Total => self
                .source
                .get_attribute(&request.key, record_id, &self.config.id_field)?
                .is_some(),
            AccessLevel::Partial => {
                let scoped = Predicate::and(vec![
                    decision.predicate,
                    Predicate::eq(self.config.id_field.as_str(), record_id),
                ]);
                !self.source.select_where(&request.key, &scoped)?.is_empty()
            }
            AccessLevel::None | AccessLevel::Unmanaged => false,
        };

        tracing::debug!(
            key = %request.key,
            record = record_id,
            action = %request.action,
            actor = request.actor(),
            access,
            "record access checked"
        );
        Ok(ResourceAccess {
            access,
            unmanaged: decision.unmanaged,
        })
    }

    fn resolve_rules(
        &self,
        map: &RuleMap,
        scope: &mut CompileScope<'_>,
        request: &AccessRequest,
    ) -> Result<ResolvedRules> {
        let slot = map.slot(&request.kind, &request.key, request.field_key(), request.action);
        let actor = request.actor();

        if actor == self.config.super_identity {
            return Ok(ResolvedRules {
                rules: slot.map(<[_]>::to_vec).unwrap_or_default(),
                unmanaged: slot.is_none(),
                bypass: true,
            });
        }

        let Some(candidates) = slot else {
            return Ok(ResolvedRules {
                rules: Vec::new(),
                unmanaged: true,
                bypass: false,
            });
        };

        let mut resolver = PrincipalResolver::new(&self.config, self.source.as_ref());
        let mut rules = Vec::new();
        for rule in candidates {
            if resolver.group_matches(scope, &rule.principals, actor)? {
                rules.push(Arc::clone(rule));
            }
        }

        Ok(ResolvedRules {
            rules,
            unmanaged: false,
            bypass: false,
        })
    }

    fn check_target(&self, map: &RuleMap, request: &AccessRequest) -> Result<()> {
        let kind = request.kind.as_str();
        if !self.config.knows_kind(&request.kind) {
            return Err(Error::invalid_target(kind, &request.key, "unknown resource kind"));
        }
        if request.key.trim().is_empty() {
            return Err(Error::invalid_target(kind, &request.key, "empty resource key"));
        }
        if request.kind == ResourceKind::Entity
            && !self.source.entity_exists(&request.key)
            && !map.manages(&request.kind, &request.key)
        {
            return Err(Error::invalid_target(kind, &request.key, "unknown entity"));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn upsert_filter(&self, filter: QueryFilter) -> Result<()> {
        let name = filter.name.clone();
        self.mutate("upsert_filter", &name, |store, config| store.upsert_filter(filter, config))
    }

    /// 필터 삭제 (규칙이 참조 중이면 [`Error::FilterInUse`])
    pub fn delete_filter(&self, name: &str) -> Result<QueryFilter> {
        self.mutate("delete_filter", name, |store, _| store.delete_filter(name))
    }

    /// 모든 규칙에서 필터 참조 제거, 영향을 받은 규칙 제목 반환
    pub fn unlink_filter(&self, name: &str) -> Result<Vec<String>> {
        self.mutate("unlink_filter", name, |store, _| Ok(store.unlink_filter(name)))
    }

    pub fn upsert_resource(&self, descriptor: ResourceDescriptor) -> Result<()> {
        let name = descriptor.name.clone();
        self.mutate("upsert_resource", &name, |store, config| {
            store.upsert_resource(descriptor, config)
        })
    }

    pub fn delete_resource(&self, name: &str) -> Result<ResourceDescriptor> {
        self.mutate("delete_resource", name, |store, _| store.delete_resource(name))
    }

    pub fn upsert_rule(&self, rule: Rule) -> Result<()> {
        let title = rule.title.clone();
        self.mutate("upsert_rule", &title, |store, config| store.upsert_rule(rule, config))
    }

    pub fn delete_rule(&self, title: &str) -> Result<Rule> {
        self.mutate("delete_rule", title, |store, _| store.delete_rule(title))
    }

    /// 저장소 전체 교체
    pub fn replace_store(&self, store: PolicyStore) -> Result<()> {
        self.mutate("replace_store", "*", |current, config| {
            store.validate(config)?;
            *current = store;
            Ok(())
        })
    }

    /// 복사본에 변경을 적용하고, 성공하면 교체 후 캐시 무효화
    fn mutate<T>(
        &self,
        op: &'static str,
        target: &str,
        apply: impl FnOnce(&mut PolicyStore, &EngineConfig) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.store.write().unwrap_or_else(|e| e.into_inner());
        let mut next = PolicyStore::clone(&guard);
        let out = match apply(&mut next, &self.config) {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(op, name = target, error = %e, "policy change rejected");
                return Err(e);
            }
        };
        *guard = Arc::new(next);
        self.cache.invalidate();
        drop(guard);

        tracing::info!(op, name = target, "policy store updated");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterCondition, ScriptBindings, ScriptError, ScriptOutput};
    use crate::policy::{Action, FilterRef, ValidityWindow};
    use crate::predicate::{eval, Operator};
    use crate::source::MemoryDataSource;
    use serde_json::json;

    const POLICY: &str = r#"
filters:
  everyone:
    target: role
    structured_filter: [[name, "=", All]]
  managers:
    target: role
    structured_filter: [[name, "=", Manager]]
  active:
    target: widget
    structured_filter: [[status, "=", active]]
  archived:
    target: widget
    structured_filter: [[archived, "=", true]]
  mine:
    target: widget
    raw_expression: "resource.owner == {{acting_as}}"
resources:
  widgets:
    kind: entity
    key: widget
    actions: [read, write, delete]
  sales:
    kind: report
    key: sales
rules:
  - title: everyone reads widgets
    polarity: permit
    resource: widgets
    actions: [read]
    principals: [everyone]
    resources: [active]
  - title: hide archived
    polarity: forbid
    resource: widgets
    actions: [read]
    principals: [everyone]
    resources: [archived]
  - title: managers write widgets
    polarity: permit
    resource: widgets
    actions: [write]
    principals: [managers]
  - title: owners delete widgets
    polarity: permit
    resource: widgets
    actions: [delete]
    principals: [everyone]
    resources: [mine]
"#;

    fn source() -> MemoryDataSource {
        let mut s = MemoryDataSource::default();
        for user in ["alice", "bob"] {
            s.insert("user", json!({ "id": user })).unwrap();
        }
        s.insert("role", json!({ "id": "All", "name": "All" })).unwrap();
        s.insert("role", json!({ "id": "Manager", "name": "Manager" })).unwrap();
        s.insert("role_assignment", json!({ "id": "a1", "role": "Manager", "user": "alice" }))
            .unwrap();
        s.define("group").define("group_member").define("gadget");
        s.insert("widget", json!({ "id": "w1", "status": "active", "archived": false, "owner": "alice" }))
            .unwrap();
        s.insert("widget", json!({ "id": "w2", "status": "active", "archived": true, "owner": "bob" }))
            .unwrap();
        s.insert("widget", json!({ "id": "w3", "status": "draft", "archived": false, "owner": "bob" }))
            .unwrap();
        s
    }

    fn engine() -> Engine {
        Engine::from_yaml(EngineConfig::default(), POLICY, Arc::new(source())).unwrap()
    }

    fn read(actor: &str) -> AccessRequest {
        AccessRequest::entity("widget", Action::Read, actor)
    }

    #[test]
    fn test_unmanaged_resource_passes_through() {
        let engine = engine();
        let req = AccessRequest::entity("gadget", Action::Read, "alice");

        let rules = engine.resource_rules(&req).unwrap();
        assert!(rules.unmanaged);
        assert!(rules.rules.is_empty());

        let decision = engine.filter_predicate(&req).unwrap();
        assert_eq!(decision.access, AccessLevel::Unmanaged);
        assert!(decision.unmanaged);

        let access = engine.has_resource_access(&req).unwrap();
        assert_eq!(access, ResourceAccess { access: false, unmanaged: true });
    }

    #[test]
    fn test_permit_all_is_total() {
        let engine = engine();
        let req = AccessRequest::new(ResourceKind::Report, "sales", Action::Read, "bob");
        assert_eq!(engine.filter_predicate(&req).unwrap().access, AccessLevel::None);

        engine
            .upsert_rule(Rule::permit("everyone reads sales", "sales").with_principal(FilterRef::include("everyone")))
            .unwrap();
        let decision = engine.filter_predicate(&req).unwrap();
        assert_eq!(decision.access, AccessLevel::Total);
        assert!(decision.predicate.is_true());
        assert_eq!(decision.rules, vec!["everyone reads sales"]);
    }

    #[test]
    fn test_active_minus_archived() {
        let engine = engine();
        let decision = engine.filter_predicate(&read("bob")).unwrap();
        assert_eq!(decision.access, AccessLevel::Partial);
        assert_eq!(
            decision.predicate,
            Predicate::and(vec![
                Predicate::eq("status", "active"),
                Predicate::not(Predicate::eq("archived", true)),
            ])
        );

        assert!(engine.has_record_access(&read("bob"), "w1").unwrap().access);
        assert!(!engine.has_record_access(&read("bob"), "w2").unwrap().access);
        assert!(!engine.has_record_access(&read("bob"), "w3").unwrap().access);
    }

    #[test]
    fn test_role_assignment_join() {
        let engine = engine();
        let write = |actor: &str| AccessRequest::entity("widget", Action::Write, actor);

        let alice = engine.filter_predicate(&write("alice")).unwrap();
        assert_eq!(alice.access, AccessLevel::Total);
        assert_eq!(alice.rules, vec!["managers write widgets"]);

        let bob = engine.filter_predicate(&write("bob")).unwrap();
        assert_eq!(bob.access, AccessLevel::None);
        assert!(bob.rules.is_empty());
        assert!(!engine.has_resource_access(&write("bob")).unwrap().access);
    }

    #[test]
    fn test_failing_script_is_universal_false() {
        let engine = engine();
        engine
            .upsert_filter(QueryFilter::script("broken", "widget", "undefined_binding.field"))
            .unwrap();
        engine
            .upsert_rule(
                Rule::permit("scripted", "widgets")
                    .with_actions(vec![Action::Write])
                    .with_principal(FilterRef::include("everyone"))
                    .with_resource(FilterRef::include("broken")),
            )
            .unwrap();

        let req = AccessRequest::entity("widget", Action::Write, "bob");
        let decision = engine.filter_predicate(&req).unwrap();
        assert!(decision.predicate.is_false());
        assert_eq!(decision.access, AccessLevel::None);
        assert_eq!(decision.rules, vec!["scripted"]);
    }

    #[test]
    fn test_acting_as_templates_raw_expression() {
        let engine = engine();
        let delete = AccessRequest::entity("widget", Action::Delete, "alice");
        assert!(engine.has_record_access(&delete, "w1").unwrap().access);
        assert!(!engine.has_record_access(&delete, "w2").unwrap().access);

        let preview = delete.clone().acting_as("bob");
        assert!(!engine.has_record_access(&preview, "w1").unwrap().access);
        assert!(engine.has_record_access(&preview, "w2").unwrap().access);
    }

    #[test]
    fn test_super_identity_bypasses_rules() {
        let engine = engine();
        let req = read("Administrator");
        let rules = engine.resource_rules(&req).unwrap();
        assert!(rules.bypass);

        let decision = engine.filter_predicate(&req).unwrap();
        assert_eq!(decision.access, AccessLevel::Total);
        assert!(decision.predicate.is_true());
        assert!(engine.has_record_access(&req, "w2").unwrap().access);
        assert!(!engine.has_record_access(&req, "w9").unwrap().access);
    }

    #[test]
    fn test_decisions_are_idempotent() {
        let engine = engine();
        let a = engine.filter_predicate(&read("bob")).unwrap();
        let b = engine.filter_predicate(&read("bob")).unwrap();
        assert_eq!(a.predicate, b.predicate);
        assert_eq!(a.access, b.access);
        assert!(Arc::ptr_eq(&engine.rule_map(), &engine.rule_map()));
    }

    #[test]
    fn test_record_access_matches_predicate() {
        let engine = engine();
        let data = source();
        for actor in ["alice", "bob"] {
            for action in [Action::Read, Action::Write, Action::Delete] {
                let req = AccessRequest::entity("widget", action, actor).acting_as(actor);
                let decision = engine.filter_predicate(&req).unwrap();
                let matching = data.select_where("widget", &decision.predicate).unwrap();
                for id in ["w1", "w2", "w3"] {
                    let record = engine.has_record_access(&req, id).unwrap().access;
                    assert_eq!(record, matching.iter().any(|m| m == id), "{actor} {action} {id}");
                }
            }
        }
    }

    #[test]
    fn test_forbid_never_widens() {
        let engine = engine();
        let before = engine.filter_predicate(&read("bob")).unwrap();
        engine
            .upsert_rule(
                Rule::forbid("hide drafts", "widgets")
                    .with_actions(vec![Action::Read])
                    .with_principal(FilterRef::include("everyone")),
            )
            .unwrap();
        let after = engine.filter_predicate(&read("bob")).unwrap();
        assert_eq!(before.access, AccessLevel::Partial);
        assert_eq!(after.access, AccessLevel::None);

        let record = json!({ "id": "w1", "status": "active", "archived": false });
        let record = record.as_object().unwrap();
        assert!(eval::evaluate(&before.predicate, record));
        assert!(!eval::evaluate(&after.predicate, record));
    }

    #[test]
    fn test_mutation_invalidates_rule_map() {
        let engine = engine();
        let first = engine.rule_map();
        engine.delete_rule("hide archived").unwrap();
        let second = engine.rule_map();
        assert!(!Arc::ptr_eq(&first, &second));

        let decision = engine.filter_predicate(&read("bob")).unwrap();
        assert_eq!(decision.predicate, Predicate::eq("status", "active"));
    }

    #[test]
    fn test_rejected_mutation_keeps_snapshot() {
        let engine = engine();
        let before = engine.store();
        assert!(matches!(engine.delete_filter("active"), Err(Error::FilterInUse { .. })));
        assert!(Arc::ptr_eq(&before, &engine.store()));

        let touched = engine.unlink_filter("active").unwrap();
        assert_eq!(touched, vec!["everyone reads widgets"]);
        engine.delete_filter("active").unwrap();
        assert!(engine.store().rule("everyone reads widgets").unwrap().disabled);
    }

    #[test]
    fn test_unlink_never_widens_permit() {
        let engine = engine();
        assert!(!engine.has_record_access(&read("bob"), "w3").unwrap().access);

        engine.unlink_filter("active").unwrap();
        let decision = engine.filter_predicate(&read("bob")).unwrap();
        assert_eq!(decision.access, AccessLevel::None);
        assert!(decision.predicate.is_false());
        assert!(!engine.has_record_access(&read("bob"), "w3").unwrap().access);

        // 저장 후 다시 불러와도 그대로
        engine.replace_store(PolicyStore::clone(&engine.store())).unwrap();
        let yaml = engine.store().to_yaml().unwrap();
        PolicyStore::from_yaml(&yaml, engine.config()).unwrap();
    }

    #[test]
    fn test_validity_window_checked_at_decision_time() {
        let engine = engine();
        let now = Utc::now();
        let sales = |action| AccessRequest::new(ResourceKind::Report, "sales", action, "bob");

        engine
            .upsert_rule(
                Rule::permit("read until soon", "sales")
                    .with_actions(vec![Action::Read])
                    .with_principal(FilterRef::include("everyone"))
                    .with_validity(ValidityWindow {
                        valid_from: None,
                        valid_until: Some(now + chrono::Duration::milliseconds(800)),
                    }),
            )
            .unwrap();
        engine
            .upsert_rule(
                Rule::permit("write from soon", "sales")
                    .with_actions(vec![Action::Write])
                    .with_principal(FilterRef::include("everyone"))
                    .with_validity(ValidityWindow {
                        valid_from: Some(now + chrono::Duration::milliseconds(800)),
                        valid_until: None,
                    }),
            )
            .unwrap();

        assert_eq!(engine.filter_predicate(&sales(Action::Read)).unwrap().access, AccessLevel::Total);
        assert_eq!(engine.filter_predicate(&sales(Action::Write)).unwrap().access, AccessLevel::None);

        std::thread::sleep(std::time::Duration::from_millis(1200));

        let read = engine.filter_predicate(&sales(Action::Read)).unwrap();
        assert_eq!(read.access, AccessLevel::None);
        assert!(read.rules.is_empty());
        assert_eq!(engine.filter_predicate(&sales(Action::Write)).unwrap().access, AccessLevel::Total);
    }

    #[test]
    fn test_active_minus_compound_archived() {
        let engine = engine();
        engine
            .upsert_filter(QueryFilter::structured(
                "active_archived",
                "widget",
                vec![
                    FilterCondition::new("status", Operator::Eq, "active"),
                    FilterCondition::new("archived", Operator::Eq, true),
                ],
            ))
            .unwrap();
        let mut forbid = engine.store().rule("hide archived").unwrap().clone();
        forbid.resources = vec![FilterRef::include("active_archived")];
        engine.upsert_rule(forbid).unwrap();

        let decision = engine.filter_predicate(&read("bob")).unwrap();
        assert_eq!(decision.access, AccessLevel::Partial);
        assert_eq!(
            decision.predicate,
            Predicate::and(vec![
                Predicate::eq("status", "active"),
                Predicate::not(Predicate::and(vec![
                    Predicate::eq("status", "active"),
                    Predicate::eq("archived", true),
                ])),
            ])
        );

        assert!(engine.has_record_access(&read("bob"), "w1").unwrap().access);
        assert!(!engine.has_record_access(&read("bob"), "w2").unwrap().access);
        assert!(!engine.has_record_access(&read("bob"), "w3").unwrap().access);
    }

    #[test]
    fn test_forbid_with_failing_raw_expression_denies() {
        let engine = engine();
        engine
            .upsert_filter(QueryFilter::raw("secret", "widget", "resource.secret == true"))
            .unwrap();
        engine
            .upsert_rule(
                Rule::forbid("hide secret", "widgets")
                    .with_actions(vec![Action::Read])
                    .with_principal(FilterRef::include("everyone"))
                    .with_resource(FilterRef::include("secret")),
            )
            .unwrap();

        let decision = engine.filter_predicate(&read("bob")).unwrap();
        assert_eq!(decision.access, AccessLevel::Partial);
        assert!(!engine.has_record_access(&read("bob"), "w1").unwrap().access);
        assert!(source().select_where("widget", &decision.predicate).unwrap().is_empty());
    }

    #[test]
    fn test_readers_see_whole_snapshots_during_mutation() {
        let engine = engine();
        let with_forbid = engine.filter_predicate(&read("bob")).unwrap().predicate;
        let without_forbid = Predicate::eq("status", "active");
        let forbid = engine.store().rule("hide archived").unwrap().clone();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..200 {
                        let decision = engine.filter_predicate(&read("bob")).unwrap();
                        assert_eq!(decision.access, AccessLevel::Partial);
                        assert!(
                            decision.predicate == with_forbid || decision.predicate == without_forbid,
                            "{:?}",
                            decision.predicate
                        );
                    }
                });
            }
            s.spawn(|| {
                for _ in 0..50 {
                    engine.delete_rule("hide archived").unwrap();
                    engine.upsert_rule(forbid.clone()).unwrap();
                }
            });
        });

        assert_eq!(engine.filter_predicate(&read("bob")).unwrap().predicate, with_forbid);
    }

    #[test]
    fn test_invalid_targets() {
        let engine = engine();
        let unknown_kind =
            AccessRequest::new(ResourceKind::Custom("dashboard".to_string()), "main", Action::Read, "bob");
        assert!(matches!(
            engine.filter_predicate(&unknown_kind),
            Err(Error::InvalidTarget { .. })
        ));

        let empty_key = AccessRequest::entity("", Action::Read, "bob");
        assert!(engine.filter_predicate(&empty_key).is_err());

        let ghost = AccessRequest::entity("ghost", Action::Read, "bob");
        assert_eq!(engine.filter_predicate(&ghost).unwrap_err().code(), "INVALID_TARGET");

        let report = AccessRequest::new(ResourceKind::Report, "sales", Action::Read, "bob");
        assert!(engine.has_record_access(&report, "r1").is_err());
    }

    #[test]
    fn test_custom_script_runner() {
        struct OwnerRunner;

        impl ScriptRunner for OwnerRunner {
            fn run(&self, _: &str, b: &ScriptBindings<'_>) -> std::result::Result<ScriptOutput, ScriptError> {
                Ok(ScriptOutput {
                    raw_expression: None,
                    structured_filter: Some(vec![FilterCondition::new("owner", Operator::Eq, b.acting_as)]),
                })
            }
        }

        let engine = engine().with_script_runner(Arc::new(OwnerRunner));
        engine
            .upsert_filter(QueryFilter::script("owned", "widget", "anything"))
            .unwrap();
        engine
            .upsert_rule(
                Rule::forbid("not own", "widgets")
                    .with_actions(vec![Action::Read])
                    .with_principal(FilterRef::include("everyone"))
                    .with_resource(FilterRef::include("owned")),
            )
            .unwrap();

        assert!(!engine.has_record_access(&read("alice"), "w1").unwrap().access);
        assert!(engine.has_record_access(&read("bob"), "w1").unwrap().access);
    }
}
