//! Permit / Forbid 규칙
//!
//! ```yaml
//! rules:
//!   - title: staff read widgets
//!     polarity: permit
//!     resource: widgets
//!     actions: [read]
//!     principals:
//!       - staff
//!       - { filter: interns, exception: true }
//!     resources:
//!       - active_widgets
//!     valid_until: 2030-01-01T00:00:00Z
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::descriptor::ManagedActions;

/// 규칙 극성
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Permit,
    Forbid,
}

/// Query Filter 참조
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRef {
    /// 참조하는 필터 이름
    pub filter: String,

    /// 예외 그룹 여부 (`AND NOT`)
    pub exception: bool,
}

impl FilterRef {
    pub fn include(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            exception: false,
        }
    }

    pub fn except(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            exception: true,
        }
    }
}

impl Serialize for FilterRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        if !self.exception {
            return serializer.serialize_str(&self.filter);
        }
        let mut s = serializer.serialize_struct("FilterRef", 2)?;
        s.serialize_field("filter", &self.filter)?;
        s.serialize_field("exception", &self.exception)?;
        s.end()
    }
}

/// FilterRef의 custom deserializer (shorthand: 필터 이름만)
impl<'de> Deserialize<'de> for FilterRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        #[derive(Deserialize)]
        struct FilterRefObject {
            filter: String,
            #[serde(default)]
            exception: bool,
        }

        struct FilterRefVisitor;

        impl<'de> Visitor<'de> for FilterRefVisitor {
            type Value = FilterRef;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a filter name or a {filter, exception} object")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(FilterRef::include(v))
            }

            fn visit_map<M>(self, map: M) -> Result<Self::Value, M::Error>
            where
                M: de::MapAccess<'de>,
            {
                let obj = FilterRefObject::deserialize(de::value::MapAccessDeserializer::new(map))?;
                Ok(FilterRef {
                    filter: obj.filter,
                    exception: obj.exception,
                })
            }
        }

        deserializer.deserialize_any(FilterRefVisitor)
    }
}

/// 규칙 유효 기간 (양 끝 포함, 없으면 무제한)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

impl ValidityWindow {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.valid_from.map_or(true, |from| from <= now)
            && self.valid_until.map_or(true, |until| now <= until)
    }

    pub fn is_well_formed(&self) -> bool {
        match (self.valid_from, self.valid_until) {
            (Some(from), Some(until)) => from <= until,
            _ => true,
        }
    }
}

/// 규칙
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// 고유 제목
    pub title: String,

    pub polarity: Polarity,

    /// Resource Descriptor 이름
    pub resource: String,

    /// 적용 action (`all` = descriptor가 관리하는 모든 action)
    #[serde(default)]
    pub actions: ManagedActions,

    /// Principal 필터 그룹
    #[serde(default)]
    pub principals: Vec<FilterRef>,

    /// Resource 필터 그룹 (비어 있으면 모든 레코드)
    #[serde(default)]
    pub resources: Vec<FilterRef>,

    #[serde(flatten)]
    pub validity: ValidityWindow,

    #[serde(default)]
    pub disabled: bool,
}

impl Rule {
    pub fn new(title: impl Into<String>, polarity: Polarity, resource: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            polarity,
            resource: resource.into(),
            actions: ManagedActions::All,
            principals: Vec::new(),
            resources: Vec::new(),
            validity: ValidityWindow::default(),
            disabled: false,
        }
    }

    pub fn permit(title: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::new(title, Polarity::Permit, resource)
    }

    pub fn forbid(title: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::new(title, Polarity::Forbid, resource)
    }

    pub fn with_actions(mut self, actions: Vec<super::Action>) -> Self {
        self.actions = ManagedActions::Only(actions);
        self
    }

    pub fn with_principal(mut self, filter: FilterRef) -> Self {
        self.principals.push(filter);
        self
    }

    pub fn with_resource(mut self, filter: FilterRef) -> Self {
        self.resources.push(filter);
        self
    }

    pub fn with_validity(mut self, validity: ValidityWindow) -> Self {
        self.validity = validity;
        self
    }

    /// 지금 적용 가능한 규칙인지
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.disabled && self.validity.contains(now)
    }

    /// 필터 참조 여부
    pub fn references(&self, filter: &str) -> bool {
        self.principals
            .iter()
            .chain(self.resources.iter())
            .any(|r| r.filter == filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Action;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_parse_rule_with_shorthand_refs() {
        let yaml = r#"
title: staff read widgets
polarity: permit
resource: widgets
actions: [read]
principals:
  - staff
  - { filter: interns, exception: true }
valid_until: 2030-01-01T00:00:00Z
"#;
        let rule: Rule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.polarity, Polarity::Permit);
        assert_eq!(rule.actions, ManagedActions::Only(vec![Action::Read]));
        assert_eq!(rule.principals[0], FilterRef::include("staff"));
        assert_eq!(rule.principals[1], FilterRef::except("interns"));
        assert!(rule.resources.is_empty());
        assert_eq!(
            rule.validity.valid_until,
            Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_filter_ref_serializes_shorthand() {
        let value = serde_json::to_value(FilterRef::include("staff")).unwrap();
        assert_eq!(value, serde_json::json!("staff"));
        let value = serde_json::to_value(FilterRef::except("interns")).unwrap();
        assert_eq!(value["exception"], serde_json::json!(true));
    }

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let window = ValidityWindow {
            valid_from: Some(now - Duration::days(1)),
            valid_until: Some(now + Duration::days(1)),
        };
        assert!(window.contains(now));
        assert!(!window.contains(now + Duration::days(2)));
        assert!(ValidityWindow::default().contains(now));

        let inverted = ValidityWindow {
            valid_from: window.valid_until,
            valid_until: window.valid_from,
        };
        assert!(!inverted.is_well_formed());
    }

    #[test]
    fn test_disabled_rule_is_inactive() {
        let mut rule = Rule::permit("r", "widgets");
        assert!(rule.is_active(Utc::now()));
        rule.disabled = true;
        assert!(!rule.is_active(Utc::now()));
    }
}
