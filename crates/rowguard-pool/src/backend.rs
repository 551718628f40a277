//! The upstream database boundary.
//!
//! The database exposes a DDL channel without parameter binding, a DML
//! channel with binding, a session-context set/clear primitive, catalog
//! views, and two read-only log sources. Everything rowguard knows about
//! the database goes through these two traits; the lease manager owns the
//! connections and nobody else touches one directly.

use std::future::Future;

use thiserror::Error;

use rowguard_core::audit::{CoarseAuditRecord, FineAuditRecord};
use rowguard_core::model::{
    AuditPolicyRecord, CallerIdentity, GrantRecord, PrincipalRecord, ProfileRecord,
    RedactionPolicyRecord, RoleRecord, RowFilterBindingRecord,
};
use rowguard_core::value::Value;
use rowguard_core::Error as CoreError;

/// A failure reported by the database, diagnostic code included.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct BackendError {
    /// Database diagnostic code.
    pub code: String,
    /// Database diagnostic text.
    pub message: String,
}

impl BackendError {
    /// Build an error from a diagnostic code and text.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<BackendError> for CoreError {
    fn from(e: BackendError) -> Self {
        CoreError::UpstreamRejected {
            code: e.code,
            message: e.message,
        }
    }
}

/// Result type for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// One physical connection's view of the database.
///
/// Implementations must treat `set_session_context`/`clear_session_context`
/// as the only way session state changes; the lease manager relies on a
/// successful clear to prove a connection clean before reuse.
pub trait SessionConnection: Send {
    /// Execute a statement on the administrative (no-bind) channel.
    fn execute_ddl(&mut self, text: &str) -> impl Future<Output = BackendResult<()>> + Send;

    /// Execute a statement on the data channel with bound parameters.
    /// Returns the affected row count.
    fn execute_dml(
        &mut self,
        text: &str,
        params: &[Value],
    ) -> impl Future<Output = BackendResult<u64>> + Send;

    /// Bind a caller identity into the session context.
    fn set_session_context(
        &mut self,
        identity: &CallerIdentity,
    ) -> impl Future<Output = BackendResult<()>> + Send;

    /// Reset the session context to the anonymous state.
    fn clear_session_context(&mut self) -> impl Future<Output = BackendResult<()>> + Send;

    /// Catalog view: all principals.
    fn fetch_principals(&mut self) -> impl Future<Output = BackendResult<Vec<PrincipalRecord>>> + Send;

    /// Catalog view: one principal by name.
    fn fetch_principal(
        &mut self,
        name: &str,
    ) -> impl Future<Output = BackendResult<Option<PrincipalRecord>>> + Send;

    /// Catalog view: all profiles with dependent counts.
    fn fetch_profiles(&mut self) -> impl Future<Output = BackendResult<Vec<ProfileRecord>>> + Send;

    /// Catalog view: principals assigned to a profile.
    fn fetch_profile_dependents(
        &mut self,
        profile: &str,
    ) -> impl Future<Output = BackendResult<Vec<String>>> + Send;

    /// Catalog view: all roles with grantee counts.
    fn fetch_roles(&mut self) -> impl Future<Output = BackendResult<Vec<RoleRecord>>> + Send;

    /// Catalog view: grantees holding a role.
    fn fetch_role_grantees(
        &mut self,
        role: &str,
    ) -> impl Future<Output = BackendResult<Vec<String>>> + Send;

    /// Catalog view: direct and role-inherited grants for a grantee.
    fn fetch_grants(
        &mut self,
        grantee: &str,
    ) -> impl Future<Output = BackendResult<Vec<GrantRecord>>> + Send;

    /// Catalog view: all audit policies.
    fn fetch_audit_policies(
        &mut self,
    ) -> impl Future<Output = BackendResult<Vec<AuditPolicyRecord>>> + Send;

    /// Catalog view: all redaction policies.
    fn fetch_redaction_policies(
        &mut self,
    ) -> impl Future<Output = BackendResult<Vec<RedactionPolicyRecord>>> + Send;

    /// Catalog view: all row-filter bindings.
    fn fetch_row_filter_bindings(
        &mut self,
    ) -> impl Future<Output = BackendResult<Vec<RowFilterBindingRecord>>> + Send;

    /// Log source: coarse action log, optionally filtered by object.
    fn fetch_coarse_audit(
        &mut self,
        object: Option<&str>,
    ) -> impl Future<Output = BackendResult<Vec<CoarseAuditRecord>>> + Send;

    /// Log source: fine-grained column/condition log, optionally filtered
    /// by object.
    fn fetch_fine_audit(
        &mut self,
        object: Option<&str>,
    ) -> impl Future<Output = BackendResult<Vec<FineAuditRecord>>> + Send;
}

/// A factory for physical connections.
pub trait AdminBackend: Send + Sync + 'static {
    /// The connection type this backend produces.
    type Conn: SessionConnection;

    /// Open a new physical connection.
    fn connect(&self) -> impl Future<Output = BackendResult<Self::Conn>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_maps_to_upstream_rejected() {
        let err = BackendError::new("ORA-01920", "user name conflicts");
        let core: CoreError = err.into();
        match core {
            CoreError::UpstreamRejected { code, message } => {
                assert_eq!(code, "ORA-01920");
                assert!(message.contains("conflicts"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
