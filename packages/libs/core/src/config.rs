//! 엔진 설정
//!
//! Principal 엔티티 이름, join 테이블, 슈퍼 identity 등 엔진이 데이터 소스에 대해
//! 가정하는 이름들을 정의합니다. YAML(`engine:` 섹션) 또는 환경변수에서 로드합니다.

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::policy::ResourceKind;

/// 엔진 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 모든 규칙을 우회하는 슈퍼 identity
    pub super_identity: String,

    /// 레코드 ID 필드 이름
    pub id_field: String,

    /// Principal 엔티티 설정
    pub principals: PrincipalEntities,

    /// 알려진 resource kind 목록 (목록에 없는 kind 요청은 InvalidTarget)
    pub resource_kinds: Vec<ResourceKind>,

    /// Rule Map 캐시 TTL (초, 0 = 무효화될 때까지 유지)
    pub rule_map_ttl_secs: u64,

    /// Script 필터 최대 길이 (bytes)
    pub max_script_len: usize,
}

/// Principal 엔티티 및 join 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrincipalEntities {
    /// identity 엔티티 (예: `user`)
    pub identity: String,

    /// group 엔티티
    pub group: String,

    /// group 멤버십 join 엔티티
    pub group_member: String,

    /// 멤버십 엔티티에서 group을 가리키는 필드
    pub group_member_group_field: String,

    /// 멤버십 엔티티에서 identity를 가리키는 필드
    pub group_member_identity_field: String,

    /// role 엔티티
    pub role: String,

    /// role 할당 join 엔티티
    pub role_assignment: String,

    /// role 할당 엔티티에서 role을 가리키는 필드
    pub role_assignment_role_field: String,

    /// role 할당 엔티티에서 identity를 가리키는 필드
    pub role_assignment_identity_field: String,

    /// 모든 identity로 확장되는 wildcard role
    pub wildcard_role: String,
}

impl Default for PrincipalEntities {
    fn default() -> Self {
        Self {
            identity: "user".to_string(),
            group: "group".to_string(),
            group_member: "group_member".to_string(),
            group_member_group_field: "group".to_string(),
            group_member_identity_field: "user".to_string(),
            role: "role".to_string(),
            role_assignment: "role_assignment".to_string(),
            role_assignment_role_field: "role".to_string(),
            role_assignment_identity_field: "user".to_string(),
            wildcard_role: "All".to_string(),
        }
    }
}

/// Principal 필터의 대상 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalType {
    Identity,
    Group,
    Role,
}

impl PrincipalEntities {
    /// 필터 대상 엔티티로부터 principal 종류 판별
    pub fn principal_type(&self, target: &str) -> Option<PrincipalType> {
        if target == self.identity {
            Some(PrincipalType::Identity)
        } else if target == self.group {
            Some(PrincipalType::Group)
        } else if target == self.role {
            Some(PrincipalType::Role)
        } else {
            None
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            super_identity: "Administrator".to_string(),
            id_field: "id".to_string(),
            principals: PrincipalEntities::default(),
            resource_kinds: vec![ResourceKind::Entity, ResourceKind::Report, ResourceKind::Page],
            rule_map_ttl_secs: 0,
            max_script_len: 16 * 1024,
        }
    }
}

impl EngineConfig {
    /// 환경변수에서 설정 로드
    ///
    /// 설정되지 않은 값은 기본값을 사용합니다.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(v) = env::var("WARDEN_SUPER_IDENTITY") {
            config.super_identity = v;
        }
        if let Ok(v) = env::var("WARDEN_ID_FIELD") {
            config.id_field = v;
        }
        if let Ok(v) = env::var("WARDEN_WILDCARD_ROLE") {
            config.principals.wildcard_role = v;
        }
        if let Ok(v) = env::var("WARDEN_RESOURCE_KINDS") {
            config.resource_kinds = v
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(ResourceKind::from_str)
                .collect();
        }
        if let Ok(v) = env::var("WARDEN_RULE_MAP_TTL") {
            config.rule_map_ttl_secs = v.parse().map_err(|_| Error::Config {
                message: format!("WARDEN_RULE_MAP_TTL must be an integer, got '{}'", v),
            })?;
        }
        if let Ok(v) = env::var("WARDEN_MAX_SCRIPT_LEN") {
            config.max_script_len = v.parse().map_err(|_| Error::Config {
                message: format!("WARDEN_MAX_SCRIPT_LEN must be an integer, got '{}'", v),
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.super_identity.is_empty() {
            return Err(Error::Config {
                message: "super identity must not be empty".to_string(),
            });
        }
        if self.id_field.is_empty() {
            return Err(Error::Config {
                message: "id field must not be empty".to_string(),
            });
        }
        if self.resource_kinds.is_empty() {
            return Err(Error::Config {
                message: "at least one resource kind must be known".to_string(),
            });
        }
        let p = &self.principals;
        if p.identity == p.group || p.identity == p.role || p.group == p.role {
            return Err(Error::Config {
                message: "identity, group and role entities must be distinct".to_string(),
            });
        }
        Ok(())
    }

    /// kind가 엔진에 알려져 있는지 여부
    pub fn knows_kind(&self, kind: &ResourceKind) -> bool {
        self.resource_kinds.contains(kind)
    }
}
