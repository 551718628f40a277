//! Rowguard core — statement safety layer and security-object model.
//!
//! Administrative statements in the target dialect cannot carry bound
//! parameters for identifiers, so this crate makes unvalidated text
//! unrepresentable instead: names pass through the validator into
//! [`SafeIdentifier`]/[`SafeLiteral`], and the statement builder accepts
//! only those types. Also home to the error taxonomy and the pure audit
//! merge.

pub mod audit;
pub mod error;
pub mod ident;
pub mod model;
pub mod statement;
pub mod value;

pub use error::{Error, Result};

pub use ident::{SafeIdentifier, SafeLiteral, ValidatorConfig};

pub use model::{
    AuditPolicyRecord, CallerIdentity, CatalogSnapshot, GrantOutcome, GrantRecord, GrantSource,
    LifecycleState, PrincipalRecord, ProfileRecord, RedactionPolicyRecord, RevokeOutcome,
    RoleRecord, RowFilterBindingRecord, SecurityObjectKind,
};

pub use statement::{
    AccountAction, ActivationPredicate, AuditAction, AuditCondition, AuditGranularity,
    AuditPolicySpec, ContextPair, DropBehavior, ExecutionMode, Grantable, MaskingFunction,
    ObjectPrivilege, PrincipalAlter, PrincipalSpec, ProfileLimit, ProfileLimits,
    ProfileLimitsUpdate, Quota, QuotaClause, RedactionPolicySpec, RoleAuth, Statement,
    SystemPrivilege, ROW_FILTER_NAMESPACE,
};

pub use audit::{
    ActionKind, AuditCursor, AuditEvent, AuditFilter, AuditPage, AuditSource, CoarseAuditRecord,
    FineAuditRecord,
};

pub use value::Value;
