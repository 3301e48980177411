//! 평가 요청 컨텍스트
//!
//! 결정 API의 입력입니다. 저장되지 않습니다.

use serde::{Deserialize, Serialize};

use crate::policy::{Action, ResourceKind};

/// 접근 결정 요청
///
/// acting identity는 기본적으로 세션 사용자이며, 미리보기 등을 위해 `acting_as`로
/// 다른 identity를 지정할 수 있습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub kind: ResourceKind,

    pub key: String,

    /// 특정 필드 (없으면 리소스 전체)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    pub action: Action,

    /// 세션 사용자
    pub session_actor: String,

    /// 대신 평가할 identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acting_as: Option<String>,
}

impl AccessRequest {
    /// 새 요청 생성
    pub fn new(
        kind: ResourceKind,
        key: impl Into<String>,
        action: Action,
        session_actor: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            field: None,
            action,
            session_actor: session_actor.into(),
            acting_as: None,
        }
    }

    /// 엔티티 요청 생성
    pub fn entity(key: impl Into<String>, action: Action, session_actor: impl Into<String>) -> Self {
        Self::new(ResourceKind::Entity, key, action, session_actor)
    }

    /// 필드 설정
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// acting identity 설정
    pub fn acting_as(mut self, identity: impl Into<String>) -> Self {
        self.acting_as = Some(identity.into());
        self
    }

    /// 실제 평가에 쓰이는 identity
    pub fn actor(&self) -> &str {
        self.acting_as.as_deref().unwrap_or(&self.session_actor)
    }

    /// Rule Map의 field 키
    pub fn field_key(&self) -> &str {
        self.field.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_defaults_to_session() {
        let req = AccessRequest::entity("widget", Action::Read, "alice");
        assert_eq!(req.actor(), "alice");
        assert_eq!(req.field_key(), "");

        let req = req.acting_as("bob").with_field("price");
        assert_eq!(req.actor(), "bob");
        assert_eq!(req.field_key(), "price");
    }
}
