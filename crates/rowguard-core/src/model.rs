//! Security-object data model.
//!
//! These are the shapes the orchestration engine exposes and the catalog
//! views return. Record types carry plain strings because they are read
//! *back* from the catalog; anything headed the other way — into statement
//! text — goes through the validator first.

use serde::Serialize;

/// Umbrella term for anything administered through this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SecurityObjectKind {
    /// A database account.
    Principal,
    /// A named bundle of resource/password limits.
    Profile,
    /// A grantable bundle of privileges.
    Role,
    /// A single privilege grant.
    PrivilegeGrant,
    /// A caller-identity to session-context mapping.
    RowFilterBinding,
    /// A statement-capture rule.
    AuditPolicy,
    /// A column-masking rule.
    RedactionPolicy,
}

impl std::fmt::Display for SecurityObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SecurityObjectKind::Principal => "principal",
            SecurityObjectKind::Profile => "profile",
            SecurityObjectKind::Role => "role",
            SecurityObjectKind::PrivilegeGrant => "privilege grant",
            SecurityObjectKind::RowFilterBinding => "row-filter binding",
            SecurityObjectKind::AuditPolicy => "audit policy",
            SecurityObjectKind::RedactionPolicy => "redaction policy",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    /// Account is open.
    Active,
    /// Account is locked.
    Locked,
    /// Password has expired.
    Expired,
}

impl LifecycleState {
    /// Parse the catalog's `account_status` string.
    ///
    /// Combined forms ("EXPIRED & LOCKED") report the lock first, since a
    /// locked account cannot log in regardless of password state.
    pub fn from_account_status(status: &str) -> Self {
        let upper = status.to_ascii_uppercase();
        if upper.contains("LOCKED") {
            LifecycleState::Locked
        } else if upper.contains("EXPIRED") {
            LifecycleState::Expired
        } else {
            LifecycleState::Active
        }
    }

    /// The catalog representation of this state.
    pub fn account_status(&self) -> &'static str {
        match self {
            LifecycleState::Active => "OPEN",
            LifecycleState::Locked => "LOCKED",
            LifecycleState::Expired => "EXPIRED",
        }
    }
}

/// Identity a lease runs under.
///
/// Administrative operations use a fixed elevated identity; data-path
/// leases carry the logical caller whose row-filter context the database
/// resolves at context-set time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallerIdentity {
    name: String,
    elevated: bool,
}

impl CallerIdentity {
    /// A logical caller identity for row-filtered data access.
    pub fn caller(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elevated: false,
        }
    }

    /// The elevated identity administrative statements run under.
    pub fn administrator(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elevated: true,
        }
    }

    /// The identity name bound into the session context.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the elevated administrative identity.
    pub fn is_elevated(&self) -> bool {
        self.elevated
    }
}

impl std::fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// A principal row from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrincipalRecord {
    /// Account name.
    pub name: String,
    /// Lifecycle state parsed from the account status.
    pub state: LifecycleState,
    /// Assigned profile, if any.
    pub profile: Option<String>,
    /// Default tablespace.
    pub default_tablespace: Option<String>,
    /// Temporary tablespace.
    pub temporary_tablespace: Option<String>,
    /// Creation timestamp, epoch milliseconds.
    pub created_at: Option<u64>,
}

/// A profile row from the catalog, with its dependent count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileRecord {
    /// Profile name.
    pub name: String,
    /// Resource and password limits.
    pub limits: crate::statement::ProfileLimits,
    /// Number of principals assigned to this profile.
    pub assigned_principals: usize,
}

/// A role row from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleRecord {
    /// Role name.
    pub name: String,
    /// Whether enabling the role requires a password.
    pub password_required: bool,
    /// Number of principals or roles this role is granted to.
    pub grantee_count: usize,
}

/// How a grant reached the grantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GrantSource {
    /// Granted directly to the grantee.
    Direct,
    /// Inherited through a granted role.
    ViaRole,
}

/// A privilege grant row from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrantRecord {
    /// Who holds the grant.
    pub grantee: String,
    /// Rendered privilege ("CREATE SESSION", "SELECT", or a role name).
    pub privilege: String,
    /// Target object for object privileges.
    pub object: Option<String>,
    /// Whether the grant carries the admin option.
    pub admin_option: bool,
    /// Direct grant or inherited through a role.
    pub source: GrantSource,
}

/// Observable effect of a grant operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GrantOutcome {
    /// The grant was newly applied.
    Granted,
    /// The grantee already held the privilege; nothing was sent downstream.
    AlreadyGranted,
}

/// Observable effect of a revoke operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RevokeOutcome {
    /// The grant was revoked.
    Revoked,
    /// The grantee did not hold the privilege; nothing was sent downstream.
    NotHeld,
}

/// A row-filter binding row from the binding table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFilterBindingRecord {
    /// Logical caller identity the binding applies to.
    pub caller: String,
    /// Context key/value pairs the row-filter function consults.
    pub pairs: Vec<(String, String)>,
}

/// An audit policy row from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditPolicyRecord {
    /// Policy name.
    pub name: String,
    /// Object whose statements the policy captures.
    pub object: String,
    /// Captured statement kinds, as rendered action names.
    pub actions: Vec<String>,
    /// Audited column for fine-grained policies.
    pub column: Option<String>,
    /// Capture condition for fine-grained policies.
    pub condition: Option<String>,
    /// Coarse (unified) or fine-grained.
    pub fine_grained: bool,
    /// Whether the policy is currently enabled.
    pub enabled: bool,
}

/// A redaction policy row from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedactionPolicyRecord {
    /// Policy name.
    pub name: String,
    /// Object the masked column belongs to.
    pub object: String,
    /// Masked column.
    pub column: String,
    /// Masking function code, as stored by the database.
    pub function_code: i64,
    /// Activation predicate text.
    pub predicate: String,
}

/// Counts gathered from the catalog views during startup reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogSnapshot {
    /// Number of principals.
    pub principals: usize,
    /// Number of profiles.
    pub profiles: usize,
    /// Number of roles.
    pub roles: usize,
    /// Number of direct privilege grants.
    pub grants: usize,
    /// Number of audit policies.
    pub audit_policies: usize,
    /// Number of redaction policies.
    pub redaction_policies: usize,
    /// Number of row-filter bindings.
    pub row_filter_bindings: usize,
}
