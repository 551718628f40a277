//! Rowguard engine — policy orchestration over leased connections.
//!
//! One verb per security-object operation: validate → build → acquire an
//! administrative lease → execute → release. Referential drops are
//! guarded, grant/revoke are idempotent, and the audit stream is queried
//! through the same lease discipline as everything else.

pub mod audit;
pub mod config;
pub mod engine;
pub mod policies;
pub mod principals;
pub mod privileges;
pub mod profiles;
pub mod roles;
pub mod rowfilter;

pub use config::EngineConfig;
pub use engine::SecurityEngine;
pub use policies::{
    AuditConditionRequest, AuditPolicyCreate, PredicateRequest, RedactionPolicyCreate,
};
pub use principals::{PrincipalCreate, PrincipalUpdate};
pub use privileges::GrantRequest;
