//! Rule Map
//!
//! `{kind: {key: {field: {action: [Rule...]}}}}` 형태의 파생 인덱스입니다.
//! field 키 `""`는 리소스 전체를 관리하는 slot 입니다.
//!
//! 활성화된 Descriptor가 관리하는 모든 action에 대해 slot을 만들고,
//! 활성화되어 있고 유효 기간에 현재 시각이 포함된 규칙을 삽입 순서대로 채웁니다.
//! 규칙이 하나도 없는 slot도 존재하며, 이는 "관리되지만 허용 규칙 없음"을 뜻합니다.
//!
//! 맵은 다음 유효 기간 경계(`valid_from` 도달 또는 `valid_until` 경과)까지만 유효합니다.

mod cache;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::policy::{Action, ManagedActions, PolicyStore, ResourceKind, Rule};

pub use cache::RuleMapCache;

/// action → 규칙 목록
pub type ActionRules = BTreeMap<Action, Vec<Arc<Rule>>>;

/// Rule Map
#[derive(Debug, Clone, Serialize)]
pub struct RuleMap {
    /// kind → key → field → action → rules
    pub kinds: BTreeMap<ResourceKind, BTreeMap<String, BTreeMap<String, ActionRules>>>,

    /// 생성 시각
    pub built_at: DateTime<Utc>,

    /// 규칙 활성 상태가 바뀌는 가장 이른 시각 (이 시각부터 맵은 낡음)
    pub stale_at: Option<DateTime<Utc>>,

    /// 이 맵을 만든 정책 스냅샷
    #[serde(skip)]
    source: Arc<PolicyStore>,
}

impl RuleMap {
    /// slot 조회 (`None` = unmanaged)
    pub fn slot(&self, kind: &ResourceKind, key: &str, field: &str, action: Action) -> Option<&[Arc<Rule>]> {
        self.kinds
            .get(kind)?
            .get(key)?
            .get(field)?
            .get(&action)
            .map(Vec::as_slice)
    }

    /// (kind, key)가 하나라도 관리되는지
    pub fn manages(&self, kind: &ResourceKind, key: &str) -> bool {
        self.kinds.get(kind).map_or(false, |keys| keys.contains_key(key))
    }

    /// 이 맵을 만든 정책 스냅샷
    pub fn source(&self) -> &Arc<PolicyStore> {
        &self.source
    }

    /// 아직 유효 기간 경계를 넘지 않았는지
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.stale_at.map_or(true, |at| now < at)
    }

    /// 모든 slot에 들어있는 규칙 항목 수 (여러 slot에 들어간 규칙은 중복 집계)
    pub fn rule_count(&self) -> usize {
        self.kinds
            .values()
            .flat_map(|keys| keys.values())
            .flat_map(|fields| fields.values())
            .flat_map(|actions| actions.values())
            .map(Vec::len)
            .sum()
    }
}

/// 정책 스냅샷에서 Rule Map 생성
pub fn build_rule_map(store: Arc<PolicyStore>, now: DateTime<Utc>) -> RuleMap {
    let mut kinds: BTreeMap<ResourceKind, BTreeMap<String, BTreeMap<String, ActionRules>>> =
        BTreeMap::new();

    for descriptor in store.resources.values().filter(|d| !d.disabled) {
        let actions = kinds
            .entry(descriptor.kind.clone())
            .or_default()
            .entry(descriptor.key.clone())
            .or_default()
            .entry(descriptor.field_key().to_string())
            .or_default();
        for action in descriptor.actions.actions() {
            actions.entry(action).or_default();
        }
    }

    for rule in store.rules.iter().filter(|r| r.is_active(now)) {
        let Some(descriptor) = store.resources.get(&rule.resource).filter(|d| !d.disabled) else {
            continue;
        };
        let Some(slots) = kinds
            .get_mut(&descriptor.kind)
            .and_then(|keys| keys.get_mut(&descriptor.key))
            .and_then(|fields| fields.get_mut(descriptor.field_key()))
        else {
            continue;
        };

        let governed = match &rule.actions {
            ManagedActions::All => descriptor.actions.actions(),
            ManagedActions::Only(_) => rule.actions.actions(),
        };
        let rule = Arc::new(rule.clone());
        for action in governed {
            if let Some(rules) = slots.get_mut(&action) {
                rules.push(Arc::clone(&rule));
            }
        }
    }

    let stale_at = next_boundary(&store, now);
    RuleMap {
        kinds,
        built_at: now,
        stale_at,
        source: store,
    }
}

/// `now` 이후 규칙의 활성 여부가 처음 바뀌는 시각
///
/// `valid_from`은 그 시각에 활성화되고, `valid_until`은 그 시각까지 포함이므로
/// 바로 다음 순간에 비활성화됩니다.
fn next_boundary(store: &PolicyStore, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    store
        .rules
        .iter()
        .filter(|r| !r.disabled)
        .flat_map(|r| {
            let opens = r.validity.valid_from.filter(|from| *from > now);
            let closes = r
                .validity
                .valid_until
                .filter(|until| *until >= now)
                .and_then(|until| until.checked_add_signed(Duration::nanoseconds(1)));
            opens.into_iter().chain(closes)
        })
        .min()
}
