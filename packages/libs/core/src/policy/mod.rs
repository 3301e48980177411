//! 정책 모델
//!
//! Resource Descriptor, Permit/Forbid 규칙, 그리고 이를 담는 저장소입니다.

mod descriptor;
mod rule;
mod store;

pub use descriptor::{Action, ManagedActions, ResourceDescriptor, ResourceKind};
pub use rule::{FilterRef, Polarity, Rule, ValidityWindow};
pub use store::PolicyStore;
