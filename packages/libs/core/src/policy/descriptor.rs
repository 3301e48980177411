//! Resource Descriptor
//!
//! 어떤 (kind, key[, field])가 규칙으로 관리되는지, 어떤 action이 관리되는지를 선언합니다.
//! Descriptor가 없는 대상은 "unmanaged"이며 엔진은 허용도 거부도 하지 않고 fallback을 알립니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Resource 종류
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Entity,
    Report,
    Page,
    Custom(String),
}

impl ResourceKind {
    /// 문자열에서 파싱
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "entity" => ResourceKind::Entity,
            "report" => ResourceKind::Report,
            "page" => ResourceKind::Page,
            other => ResourceKind::Custom(other.to_string()),
        }
    }

    /// 문자열로 변환
    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::Entity => "entity",
            ResourceKind::Report => "report",
            ResourceKind::Page => "page",
            ResourceKind::Custom(kind) => kind,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResourceKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResourceKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(ResourceKind::from_str(value.as_str()))
    }
}

/// 관리되는 action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
    Create,
    Delete,
    Submit,
    Cancel,
    Amend,
    Print,
    Email,
    Report,
    Import,
    Export,
    Share,
    Select,
}

impl Action {
    pub const ALL: [Action; 14] = [
        Action::Read,
        Action::Write,
        Action::Create,
        Action::Delete,
        Action::Submit,
        Action::Cancel,
        Action::Amend,
        Action::Print,
        Action::Email,
        Action::Report,
        Action::Import,
        Action::Export,
        Action::Share,
        Action::Select,
    ];

    /// 문자열에서 파싱
    pub fn from_str(s: &str) -> Option<Self> {
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
    }

    /// 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Create => "create",
            Action::Delete => "delete",
            Action::Submit => "submit",
            Action::Cancel => "cancel",
            Action::Amend => "amend",
            Action::Print => "print",
            Action::Email => "email",
            Action::Report => "report",
            Action::Import => "import",
            Action::Export => "export",
            Action::Share => "share",
            Action::Select => "select",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 관리되는 action 집합
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedActions {
    /// 모든 action
    All,

    /// 명시적 목록
    Only(Vec<Action>),
}

impl Default for ManagedActions {
    fn default() -> Self {
        ManagedActions::All
    }
}

impl ManagedActions {
    pub fn contains(&self, action: Action) -> bool {
        match self {
            ManagedActions::All => true,
            ManagedActions::Only(actions) => actions.contains(&action),
        }
    }

    /// 관리되는 action 목록 (중복 제거, 정의 순서 유지)
    pub fn actions(&self) -> Vec<Action> {
        match self {
            ManagedActions::All => Action::ALL.to_vec(),
            ManagedActions::Only(actions) => {
                let mut out: Vec<Action> = Vec::with_capacity(actions.len());
                for a in actions {
                    if !out.contains(a) {
                        out.push(*a);
                    }
                }
                out
            }
        }
    }
}

impl Serialize for ManagedActions {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            ManagedActions::All => serializer.serialize_str("all"),
            ManagedActions::Only(actions) => actions.serialize(serializer),
        }
    }
}

/// `all` 또는 action 목록
impl<'de> Deserialize<'de> for ManagedActions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct ManagedActionsVisitor;

        impl<'de> Visitor<'de> for ManagedActionsVisitor {
            type Value = ManagedActions;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("\"all\" or a list of actions")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if v.eq_ignore_ascii_case("all") {
                    return Ok(ManagedActions::All);
                }
                Action::from_str(v)
                    .map(|a| ManagedActions::Only(vec![a]))
                    .ok_or_else(|| E::custom(format!("unknown action: {}", v)))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut actions = Vec::new();
                while let Some(action) = seq.next_element::<Action>()? {
                    actions.push(action);
                }
                Ok(ManagedActions::Only(actions))
            }
        }

        deserializer.deserialize_any(ManagedActionsVisitor)
    }
}

/// Resource Descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// 고유 이름 (YAML 맵 키에서 채워질 수 있음)
    #[serde(default)]
    pub name: String,

    pub kind: ResourceKind,

    /// 엔티티 이름, 리포트 이름, 페이지 이름 등
    pub key: String,

    /// 특정 필드만 관리하는 경우
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    #[serde(default)]
    pub actions: ManagedActions,

    #[serde(default)]
    pub disabled: bool,
}

impl ResourceDescriptor {
    pub fn new(name: impl Into<String>, kind: ResourceKind, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            key: key.into(),
            field: None,
            actions: ManagedActions::All,
            disabled: false,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = ManagedActions::Only(actions);
        self
    }

    /// Rule Map의 field 키 (`""` = 리소스 전체)
    pub fn field_key(&self) -> &str {
        self.field.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_descriptor() {
        let yaml = r#"
kind: entity
key: widget
actions: [read, write]
"#;
        let d: ResourceDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(d.kind, ResourceKind::Entity);
        assert_eq!(d.field_key(), "");
        assert!(d.actions.contains(Action::Read));
        assert!(!d.actions.contains(Action::Delete));
    }

    #[test]
    fn test_managed_actions_shorthand() {
        let all: ManagedActions = serde_yaml::from_str("all").unwrap();
        assert_eq!(all, ManagedActions::All);
        assert_eq!(all.actions().len(), Action::ALL.len());

        let one: ManagedActions = serde_yaml::from_str("read").unwrap();
        assert_eq!(one, ManagedActions::Only(vec![Action::Read]));

        assert!(serde_yaml::from_str::<ManagedActions>("fly").is_err());
    }

    #[test]
    fn test_custom_kind_round_trip() {
        let kind = ResourceKind::from_str("Dashboard");
        assert_eq!(kind, ResourceKind::Custom("dashboard".to_string()));
        assert_eq!(serde_json::to_value(&kind).unwrap(), "dashboard");
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!(Action::from_str("WRITE"), Some(Action::Write));
        assert_eq!(Action::from_str("fly"), None);
    }
}
