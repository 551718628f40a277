//! Administrative statement rendering.
//!
//! One rendering function per security-object operation. Inputs are
//! validated types only — `SafeIdentifier`, `SafeLiteral`, and the typed
//! option enums below — so unvalidated text is unrepresentable here; the
//! compiler enforces what discipline cannot.
//!
//! Every statement carries an [`ExecutionMode`]: identifiers cannot be
//! bound on the DDL channel, while procedure calls and binding-table
//! maintenance ride the DML channel with real bound parameters.

use serde::Serialize;

use crate::ident::{SafeIdentifier, SafeLiteral};
use crate::model::GrantRecord;
use crate::value::Value;

/// Context namespace the database's row-filter function reads.
pub const ROW_FILTER_NAMESPACE: &str = "ROWGUARD_CTX";

/// How a statement must be dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionMode {
    /// Administrative channel; no parameter binding available.
    Ddl,
    /// Data channel; `params` are bound in order.
    Dml,
}

/// A rendered administrative statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    text: String,
    mode: ExecutionMode,
    params: Vec<Value>,
}

impl Statement {
    fn ddl(text: String) -> Self {
        Self {
            text,
            mode: ExecutionMode::Ddl,
            params: Vec::new(),
        }
    }

    fn dml(text: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            text: text.into(),
            mode: ExecutionMode::Dml,
            params,
        }
    }

    /// The statement text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The dispatch mode.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Bound parameters, in order. Empty for DDL.
    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Restrict or cascade behavior for drop operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DropBehavior {
    /// Reject the drop if dependents exist.
    Restrict,
    /// Remove or reassign dependents as part of the drop.
    Cascade,
}

/// Account lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AccountAction {
    /// Lock the account.
    Lock,
    /// Unlock the account.
    Unlock,
}

/// Storage quota on a tablespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quota {
    /// No quota ceiling.
    Unlimited,
    /// Ceiling in megabytes.
    Megabytes(u32),
}

impl std::fmt::Display for Quota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quota::Unlimited => f.write_str("UNLIMITED"),
            Quota::Megabytes(n) => write!(f, "{}M", n),
        }
    }
}

/// A quota clause naming the tablespace it applies to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaClause {
    /// The quota ceiling.
    pub quota: Quota,
    /// Tablespace the quota applies to.
    pub tablespace: SafeIdentifier,
}

/// Inputs for creating a principal.
#[derive(Debug, Clone)]
pub struct PrincipalSpec {
    /// Account name.
    pub name: SafeIdentifier,
    /// Initial password.
    pub password: SafeLiteral,
    /// Default tablespace.
    pub default_tablespace: SafeIdentifier,
    /// Temporary tablespace, if different from the database default.
    pub temporary_tablespace: Option<SafeIdentifier>,
    /// Quota on the default tablespace.
    pub quota: Option<Quota>,
    /// Assigned profile.
    pub profile: Option<SafeIdentifier>,
}

/// Render the create statement for a principal.
pub fn create_principal(spec: &PrincipalSpec) -> Statement {
    let mut text = format!(
        "CREATE USER {} IDENTIFIED BY {} DEFAULT TABLESPACE {}",
        spec.name,
        spec.password.quoted(),
        spec.default_tablespace
    );
    if let Some(ts) = &spec.temporary_tablespace {
        text.push_str(&format!(" TEMPORARY TABLESPACE {}", ts));
    }
    if let Some(q) = &spec.quota {
        text.push_str(&format!(" QUOTA {} ON {}", q, spec.default_tablespace));
    }
    if let Some(p) = &spec.profile {
        text.push_str(&format!(" PROFILE {}", p));
    }
    Statement::ddl(text)
}

/// Changes applicable to an existing principal.
#[derive(Debug, Clone, Default)]
pub struct PrincipalAlter {
    /// New password.
    pub password: Option<SafeLiteral>,
    /// New default tablespace.
    pub default_tablespace: Option<SafeIdentifier>,
    /// New temporary tablespace.
    pub temporary_tablespace: Option<SafeIdentifier>,
    /// New quota.
    pub quota: Option<QuotaClause>,
    /// New profile.
    pub profile: Option<SafeIdentifier>,
}

impl PrincipalAlter {
    /// Whether any change is requested.
    pub fn is_empty(&self) -> bool {
        self.password.is_none()
            && self.default_tablespace.is_none()
            && self.temporary_tablespace.is_none()
            && self.quota.is_none()
            && self.profile.is_none()
    }
}

/// Render the alter statement for a principal, or `None` if no change is
/// requested.
pub fn alter_principal(name: &SafeIdentifier, alter: &PrincipalAlter) -> Option<Statement> {
    if alter.is_empty() {
        return None;
    }
    let mut text = format!("ALTER USER {}", name);
    if let Some(pw) = &alter.password {
        text.push_str(&format!(" IDENTIFIED BY {}", pw.quoted()));
    }
    if let Some(ts) = &alter.default_tablespace {
        text.push_str(&format!(" DEFAULT TABLESPACE {}", ts));
    }
    if let Some(ts) = &alter.temporary_tablespace {
        text.push_str(&format!(" TEMPORARY TABLESPACE {}", ts));
    }
    if let Some(qc) = &alter.quota {
        text.push_str(&format!(" QUOTA {} ON {}", qc.quota, qc.tablespace));
    }
    if let Some(p) = &alter.profile {
        text.push_str(&format!(" PROFILE {}", p));
    }
    Some(Statement::ddl(text))
}

/// Render an account lock/unlock statement.
pub fn account_action(name: &SafeIdentifier, action: AccountAction) -> Statement {
    let verb = match action {
        AccountAction::Lock => "LOCK",
        AccountAction::Unlock => "UNLOCK",
    };
    Statement::ddl(format!("ALTER USER {} ACCOUNT {}", name, verb))
}

/// Render a password-expiry statement.
pub fn expire_password(name: &SafeIdentifier) -> Statement {
    Statement::ddl(format!("ALTER USER {} PASSWORD EXPIRE", name))
}

/// Render the drop statement for a principal.
pub fn drop_principal(name: &SafeIdentifier, behavior: DropBehavior) -> Statement {
    let mut text = format!("DROP USER {}", name);
    if behavior == DropBehavior::Cascade {
        text.push_str(" CASCADE");
    }
    Statement::ddl(text)
}

/// A single resource or password limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProfileLimit {
    /// Inherit the database default.
    Default,
    /// No ceiling.
    Unlimited,
    /// Explicit ceiling.
    Value(u32),
}

impl Default for ProfileLimit {
    fn default() -> Self {
        ProfileLimit::Default
    }
}

impl std::fmt::Display for ProfileLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileLimit::Default => f.write_str("DEFAULT"),
            ProfileLimit::Unlimited => f.write_str("UNLIMITED"),
            ProfileLimit::Value(n) => write!(f, "{}", n),
        }
    }
}

impl std::str::FromStr for ProfileLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEFAULT" => Ok(ProfileLimit::Default),
            "UNLIMITED" => Ok(ProfileLimit::Unlimited),
            other => other
                .parse::<u32>()
                .map(ProfileLimit::Value)
                .map_err(|_| format!("expected DEFAULT, UNLIMITED, or a number, got '{}'", s)),
        }
    }
}

/// The limit bundle a profile carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProfileLimits {
    /// Concurrent session ceiling.
    pub sessions_per_user: ProfileLimit,
    /// Connect time ceiling, minutes.
    pub connect_time: ProfileLimit,
    /// Idle time ceiling, minutes.
    pub idle_time: ProfileLimit,
    /// Failed login attempts before the account locks.
    pub failed_login_attempts: ProfileLimit,
    /// Password lifetime, days.
    pub password_life_time: ProfileLimit,
}

const PROFILE_LIMIT_NAMES: [&str; 5] = [
    "SESSIONS_PER_USER",
    "CONNECT_TIME",
    "IDLE_TIME",
    "FAILED_LOGIN_ATTEMPTS",
    "PASSWORD_LIFE_TIME",
];

impl ProfileLimits {
    fn as_array(&self) -> [ProfileLimit; 5] {
        [
            self.sessions_per_user,
            self.connect_time,
            self.idle_time,
            self.failed_login_attempts,
            self.password_life_time,
        ]
    }
}

/// Render the create statement for a profile. Every limit is rendered
/// explicitly so the catalog never inherits a surprise.
pub fn create_profile(name: &SafeIdentifier, limits: &ProfileLimits) -> Statement {
    let mut text = format!("CREATE PROFILE {} LIMIT", name);
    for (limit_name, limit) in PROFILE_LIMIT_NAMES.iter().zip(limits.as_array()) {
        text.push_str(&format!(" {} {}", limit_name, limit));
    }
    Statement::ddl(text)
}

/// Partial limit changes for an existing profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileLimitsUpdate {
    /// New session ceiling.
    pub sessions_per_user: Option<ProfileLimit>,
    /// New connect time ceiling.
    pub connect_time: Option<ProfileLimit>,
    /// New idle time ceiling.
    pub idle_time: Option<ProfileLimit>,
    /// New failed-attempt ceiling.
    pub failed_login_attempts: Option<ProfileLimit>,
    /// New password lifetime.
    pub password_life_time: Option<ProfileLimit>,
}

impl ProfileLimitsUpdate {
    fn as_array(&self) -> [Option<ProfileLimit>; 5] {
        [
            self.sessions_per_user,
            self.connect_time,
            self.idle_time,
            self.failed_login_attempts,
            self.password_life_time,
        ]
    }

    /// Whether any change is requested.
    pub fn is_empty(&self) -> bool {
        self.as_array().iter().all(Option::is_none)
    }
}

/// Render the alter statement for a profile, or `None` if no change is
/// requested.
pub fn alter_profile(name: &SafeIdentifier, update: &ProfileLimitsUpdate) -> Option<Statement> {
    if update.is_empty() {
        return None;
    }
    let mut text = format!("ALTER PROFILE {} LIMIT", name);
    for (limit_name, limit) in PROFILE_LIMIT_NAMES.iter().zip(update.as_array()) {
        if let Some(limit) = limit {
            text.push_str(&format!(" {} {}", limit_name, limit));
        }
    }
    Some(Statement::ddl(text))
}

/// Render the drop statement for a profile.
pub fn drop_profile(name: &SafeIdentifier, behavior: DropBehavior) -> Statement {
    let mut text = format!("DROP PROFILE {}", name);
    if behavior == DropBehavior::Cascade {
        text.push_str(" CASCADE");
    }
    Statement::ddl(text)
}

/// How a role authenticates when enabled.
#[derive(Debug, Clone)]
pub enum RoleAuth {
    /// No password required.
    NotIdentified,
    /// Password required to enable the role.
    Password(SafeLiteral),
}

fn role_auth_clause(auth: &RoleAuth) -> String {
    match auth {
        RoleAuth::NotIdentified => "NOT IDENTIFIED".to_string(),
        RoleAuth::Password(pw) => format!("IDENTIFIED BY {}", pw.quoted()),
    }
}

/// Render the create statement for a role.
pub fn create_role(name: &SafeIdentifier, auth: &RoleAuth) -> Statement {
    Statement::ddl(format!("CREATE ROLE {} {}", name, role_auth_clause(auth)))
}

/// Render the alter statement for a role's authentication.
pub fn alter_role(name: &SafeIdentifier, auth: &RoleAuth) -> Statement {
    Statement::ddl(format!("ALTER ROLE {} {}", name, role_auth_clause(auth)))
}

/// Render the drop statement for a role.
pub fn drop_role(name: &SafeIdentifier) -> Statement {
    Statement::ddl(format!("DROP ROLE {}", name))
}

/// System-wide privileges grantable without a target object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SystemPrivilege {
    /// Log in.
    CreateSession,
    /// Create tables in the own schema.
    CreateTable,
    /// Create views in the own schema.
    CreateView,
    /// Create stored procedures in the own schema.
    CreateProcedure,
    /// Create principals.
    CreateUser,
    /// Alter any principal.
    AlterUser,
    /// Drop principals.
    DropUser,
    /// Create roles.
    CreateRole,
    /// Create profiles.
    CreateProfile,
    /// Read any table.
    SelectAnyTable,
}

impl std::fmt::Display for SystemPrivilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SystemPrivilege::CreateSession => "CREATE SESSION",
            SystemPrivilege::CreateTable => "CREATE TABLE",
            SystemPrivilege::CreateView => "CREATE VIEW",
            SystemPrivilege::CreateProcedure => "CREATE PROCEDURE",
            SystemPrivilege::CreateUser => "CREATE USER",
            SystemPrivilege::AlterUser => "ALTER USER",
            SystemPrivilege::DropUser => "DROP USER",
            SystemPrivilege::CreateRole => "CREATE ROLE",
            SystemPrivilege::CreateProfile => "CREATE PROFILE",
            SystemPrivilege::SelectAnyTable => "SELECT ANY TABLE",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for SystemPrivilege {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('_', " ");
        match normalized.as_str() {
            "CREATE SESSION" => Ok(SystemPrivilege::CreateSession),
            "CREATE TABLE" => Ok(SystemPrivilege::CreateTable),
            "CREATE VIEW" => Ok(SystemPrivilege::CreateView),
            "CREATE PROCEDURE" => Ok(SystemPrivilege::CreateProcedure),
            "CREATE USER" => Ok(SystemPrivilege::CreateUser),
            "ALTER USER" => Ok(SystemPrivilege::AlterUser),
            "DROP USER" => Ok(SystemPrivilege::DropUser),
            "CREATE ROLE" => Ok(SystemPrivilege::CreateRole),
            "CREATE PROFILE" => Ok(SystemPrivilege::CreateProfile),
            "SELECT ANY TABLE" => Ok(SystemPrivilege::SelectAnyTable),
            _ => Err(format!("unknown system privilege '{}'", s)),
        }
    }
}

/// Privileges grantable on a specific object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ObjectPrivilege {
    /// Read rows.
    Select,
    /// Insert rows.
    Insert,
    /// Update rows.
    Update,
    /// Delete rows.
    Delete,
    /// Execute a stored unit.
    Execute,
}

impl std::fmt::Display for ObjectPrivilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ObjectPrivilege::Select => "SELECT",
            ObjectPrivilege::Insert => "INSERT",
            ObjectPrivilege::Update => "UPDATE",
            ObjectPrivilege::Delete => "DELETE",
            ObjectPrivilege::Execute => "EXECUTE",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ObjectPrivilege {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SELECT" => Ok(ObjectPrivilege::Select),
            "INSERT" => Ok(ObjectPrivilege::Insert),
            "UPDATE" => Ok(ObjectPrivilege::Update),
            "DELETE" => Ok(ObjectPrivilege::Delete),
            "EXECUTE" => Ok(ObjectPrivilege::Execute),
            _ => Err(format!("unknown object privilege '{}'", s)),
        }
    }
}

/// Anything that can appear between GRANT and TO.
#[derive(Debug, Clone)]
pub enum Grantable {
    /// A system privilege.
    System(SystemPrivilege),
    /// An object privilege on a named object.
    Object {
        /// The privilege kind.
        privilege: ObjectPrivilege,
        /// The target object.
        object: SafeIdentifier,
    },
    /// A role.
    Role(SafeIdentifier),
}

impl Grantable {
    /// Render the grant target as it appears in statement text.
    pub fn render(&self) -> String {
        match self {
            Grantable::System(p) => p.to_string(),
            Grantable::Object { privilege, object } => format!("{} ON {}", privilege, object),
            Grantable::Role(r) => r.to_string(),
        }
    }

    /// Whether a catalog grant row matches this grantable.
    pub fn matches(&self, record: &GrantRecord) -> bool {
        match self {
            Grantable::System(p) => {
                record.object.is_none() && record.privilege == p.to_string()
            }
            Grantable::Object { privilege, object } => {
                record.privilege == privilege.to_string()
                    && record.object.as_deref() == Some(object.as_str())
            }
            Grantable::Role(r) => record.object.is_none() && record.privilege == r.as_str(),
        }
    }
}

/// Render a grant statement.
pub fn grant(grantable: &Grantable, grantee: &SafeIdentifier, admin_option: bool) -> Statement {
    let mut text = format!("GRANT {} TO {}", grantable.render(), grantee);
    if admin_option {
        text.push_str(" WITH ADMIN OPTION");
    }
    Statement::ddl(text)
}

/// Render a revoke statement.
pub fn revoke(grantable: &Grantable, grantee: &SafeIdentifier) -> Statement {
    Statement::ddl(format!("REVOKE {} FROM {}", grantable.render(), grantee))
}

/// One context key/value pair of a row-filter binding.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextPair {
    /// Context key, consulted by the row-filter function.
    pub key: SafeIdentifier,
    /// Context value. Travels as a bound parameter, never as text.
    pub value: String,
}

/// Render the upsert for one row-filter binding pair.
pub fn bind_row_filter_pair(caller: &SafeIdentifier, pair: &ContextPair) -> Statement {
    Statement::dml(
        "MERGE INTO row_filter_bindings b \
         USING (SELECT :1 AS caller, :2 AS ctx_key, :3 AS ctx_value FROM dual) s \
         ON (b.caller = s.caller AND b.ctx_key = s.ctx_key) \
         WHEN MATCHED THEN UPDATE SET b.ctx_value = s.ctx_value \
         WHEN NOT MATCHED THEN INSERT (caller, ctx_key, ctx_value) \
         VALUES (s.caller, s.ctx_key, s.ctx_value)",
        vec![
            Value::Text(caller.as_str().to_string()),
            Value::Text(pair.key.as_str().to_string()),
            Value::Text(pair.value.clone()),
        ],
    )
}

/// Render the delete for a caller's row-filter binding.
pub fn unbind_row_filter(caller: &SafeIdentifier) -> Statement {
    Statement::dml(
        "DELETE FROM row_filter_bindings WHERE caller = :1",
        vec![Value::Text(caller.as_str().to_string())],
    )
}

/// Statement kinds an audit policy captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditAction {
    /// Reads.
    Select,
    /// Inserts.
    Insert,
    /// Updates.
    Update,
    /// Deletes.
    Delete,
    /// Every statement kind.
    All,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditAction::Select => "SELECT",
            AuditAction::Insert => "INSERT",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::All => "ALL",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SELECT" => Ok(AuditAction::Select),
            "INSERT" => Ok(AuditAction::Insert),
            "UPDATE" => Ok(AuditAction::Update),
            "DELETE" => Ok(AuditAction::Delete),
            "ALL" => Ok(AuditAction::All),
            _ => Err(format!("unknown audit action '{}'", s)),
        }
    }
}

/// Coarse (unified) or fine-grained capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuditGranularity {
    /// One record per captured statement.
    Coarse,
    /// Column/condition-level capture.
    Fine,
}

/// Capture condition for a fine-grained audit policy.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditCondition {
    /// Capture when a session context key holds a given value.
    ContextEquals {
        /// Context key under [`ROW_FILTER_NAMESPACE`].
        key: SafeIdentifier,
        /// Expected value.
        value: SafeIdentifier,
    },
    /// Capture when a column exceeds a threshold.
    ColumnGreaterThan {
        /// Column to compare.
        column: SafeIdentifier,
        /// Threshold.
        threshold: i64,
    },
}

impl AuditCondition {
    /// Render the condition text handed to the capture engine.
    pub fn render(&self) -> String {
        match self {
            AuditCondition::ContextEquals { key, value } => format!(
                "SYS_CONTEXT('{}', '{}') = '{}'",
                ROW_FILTER_NAMESPACE, key, value
            ),
            AuditCondition::ColumnGreaterThan { column, threshold } => {
                format!("{} > {}", column, threshold)
            }
        }
    }
}

/// Inputs for creating an audit policy.
#[derive(Debug, Clone)]
pub struct AuditPolicySpec {
    /// Policy name.
    pub name: SafeIdentifier,
    /// Object whose statements are captured.
    pub object: SafeIdentifier,
    /// Captured statement kinds.
    pub actions: Vec<AuditAction>,
    /// Audited column, fine-grained only.
    pub column: Option<SafeIdentifier>,
    /// Capture condition, fine-grained only.
    pub condition: Option<AuditCondition>,
    /// Coarse or fine-grained.
    pub granularity: AuditGranularity,
}

fn render_actions(actions: &[AuditAction]) -> String {
    if actions.is_empty() {
        return AuditAction::All.to_string();
    }
    actions
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render the create statement for an audit policy.
///
/// Coarse policies are DDL; fine-grained policies are registered through a
/// procedure call on the DML channel, which is why they can bind their
/// condition text instead of splicing it.
pub fn create_audit_policy(spec: &AuditPolicySpec) -> Statement {
    match spec.granularity {
        AuditGranularity::Coarse => Statement::ddl(format!(
            "CREATE AUDIT POLICY {} ACTIONS {} ON {}",
            spec.name,
            render_actions(&spec.actions),
            spec.object
        )),
        AuditGranularity::Fine => Statement::dml(
            "BEGIN audit_admin.add_fine_policy(:1, :2, :3, :4, :5); END;",
            vec![
                Value::Text(spec.name.as_str().to_string()),
                Value::Text(spec.object.as_str().to_string()),
                Value::Text(render_actions(&spec.actions)),
                spec.column
                    .as_ref()
                    .map(|c| Value::Text(c.as_str().to_string()))
                    .unwrap_or(Value::Null),
                spec.condition
                    .as_ref()
                    .map(|c| Value::Text(c.render()))
                    .unwrap_or(Value::Null),
            ],
        ),
    }
}

/// Render the enable/disable statement for a coarse audit policy.
pub fn set_audit_policy_enabled(name: &SafeIdentifier, enabled: bool) -> Statement {
    let verb = if enabled { "AUDIT" } else { "NOAUDIT" };
    Statement::ddl(format!("{} POLICY {}", verb, name))
}

/// Render the drop statement for an audit policy.
pub fn drop_audit_policy(name: &SafeIdentifier, granularity: AuditGranularity) -> Statement {
    match granularity {
        AuditGranularity::Coarse => Statement::ddl(format!("DROP AUDIT POLICY {}", name)),
        AuditGranularity::Fine => Statement::dml(
            "BEGIN audit_admin.drop_fine_policy(:1); END;",
            vec![Value::Text(name.as_str().to_string())],
        ),
    }
}

/// Masking function applied by a redaction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MaskingFunction {
    /// Replace the whole value.
    Full,
    /// Keep a visible prefix/suffix, mask the middle.
    Partial {
        /// Characters left visible at the start.
        prefix_visible: u32,
        /// Characters left visible at the end.
        suffix_visible: u32,
        /// Masking character.
        mask_char: char,
    },
    /// Replace with NULL.
    Nullify,
    /// Replace with random data of the same shape.
    Random,
}

impl MaskingFunction {
    /// Numeric function code, as the redaction engine stores it.
    pub fn code(&self) -> i64 {
        match self {
            MaskingFunction::Full => 1,
            MaskingFunction::Partial { .. } => 2,
            MaskingFunction::Nullify => 3,
            MaskingFunction::Random => 4,
        }
    }

    /// Extra parameters for functions that take them.
    pub fn params_text(&self) -> Option<String> {
        match self {
            MaskingFunction::Partial {
                prefix_visible,
                suffix_visible,
                mask_char,
            } => Some(format!(
                "prefix={},suffix={},mask={}",
                prefix_visible, suffix_visible, mask_char
            )),
            _ => None,
        }
    }
}

/// When a redaction policy applies.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivationPredicate {
    /// Always mask.
    Always,
    /// Never mask (policy staged but inert).
    Never,
    /// Mask unless a session context key holds a given value.
    ContextEquals {
        /// Context key under [`ROW_FILTER_NAMESPACE`].
        key: SafeIdentifier,
        /// Value that activates the policy.
        value: SafeIdentifier,
    },
}

impl ActivationPredicate {
    /// Render the predicate text handed to the redaction engine.
    pub fn render(&self) -> String {
        match self {
            ActivationPredicate::Always => "1=1".to_string(),
            ActivationPredicate::Never => "1=0".to_string(),
            ActivationPredicate::ContextEquals { key, value } => format!(
                "SYS_CONTEXT('{}', '{}') = '{}'",
                ROW_FILTER_NAMESPACE, key, value
            ),
        }
    }
}

/// Inputs for adding a redaction policy.
#[derive(Debug, Clone)]
pub struct RedactionPolicySpec {
    /// Policy name.
    pub name: SafeIdentifier,
    /// Object the masked column belongs to.
    pub object: SafeIdentifier,
    /// Masked column.
    pub column: SafeIdentifier,
    /// Masking function.
    pub function: MaskingFunction,
    /// Activation predicate.
    pub predicate: ActivationPredicate,
}

/// Render the registration call for a redaction policy.
pub fn add_redaction_policy(spec: &RedactionPolicySpec) -> Statement {
    Statement::dml(
        "BEGIN redact_admin.add_policy(:1, :2, :3, :4, :5, :6); END;",
        vec![
            Value::Text(spec.name.as_str().to_string()),
            Value::Text(spec.object.as_str().to_string()),
            Value::Text(spec.column.as_str().to_string()),
            Value::Int(spec.function.code()),
            spec.function
                .params_text()
                .map(Value::Text)
                .unwrap_or(Value::Null),
            Value::Text(spec.predicate.render()),
        ],
    )
}

/// Render the removal call for a redaction policy.
pub fn drop_redaction_policy(name: &SafeIdentifier, object: &SafeIdentifier) -> Statement {
    Statement::dml(
        "BEGIN redact_admin.drop_policy(:1, :2); END;",
        vec![
            Value::Text(name.as_str().to_string()),
            Value::Text(object.as_str().to_string()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::ValidatorConfig;

    fn id(s: &str) -> SafeIdentifier {
        ValidatorConfig::default().validate_identifier(s).unwrap()
    }

    fn lit(s: &str) -> SafeLiteral {
        ValidatorConfig::default().validate_secret_literal(s).unwrap()
    }

    #[test]
    fn test_create_principal_full() {
        let stmt = create_principal(&PrincipalSpec {
            name: id("nhanvien01"),
            password: lit("s3cret"),
            default_tablespace: id("users"),
            temporary_tablespace: Some(id("temp")),
            quota: Some(Quota::Megabytes(50)),
            profile: Some(id("limited")),
        });
        assert_eq!(
            stmt.text(),
            "CREATE USER NHANVIEN01 IDENTIFIED BY \"s3cret\" DEFAULT TABLESPACE USERS \
             TEMPORARY TABLESPACE TEMP QUOTA 50M ON USERS PROFILE LIMITED"
        );
        assert_eq!(stmt.mode(), ExecutionMode::Ddl);
        assert!(stmt.params().is_empty());
    }

    #[test]
    fn test_create_principal_minimal() {
        let stmt = create_principal(&PrincipalSpec {
            name: id("app1"),
            password: lit("pw"),
            default_tablespace: id("users"),
            temporary_tablespace: None,
            quota: None,
            profile: None,
        });
        assert_eq!(
            stmt.text(),
            "CREATE USER APP1 IDENTIFIED BY \"pw\" DEFAULT TABLESPACE USERS"
        );
    }

    #[test]
    fn test_alter_principal_empty_is_none() {
        assert!(alter_principal(&id("a1"), &PrincipalAlter::default()).is_none());
    }

    #[test]
    fn test_alter_principal_profile_only() {
        let alter = PrincipalAlter {
            profile: Some(id("default")),
            ..PrincipalAlter::default()
        };
        let stmt = alter_principal(&id("hr_user"), &alter).unwrap();
        assert_eq!(stmt.text(), "ALTER USER HR_USER PROFILE DEFAULT");
    }

    #[test]
    fn test_account_actions() {
        assert_eq!(
            account_action(&id("u1"), AccountAction::Lock).text(),
            "ALTER USER U1 ACCOUNT LOCK"
        );
        assert_eq!(
            account_action(&id("u1"), AccountAction::Unlock).text(),
            "ALTER USER U1 ACCOUNT UNLOCK"
        );
        assert_eq!(
            expire_password(&id("u1")).text(),
            "ALTER USER U1 PASSWORD EXPIRE"
        );
    }

    #[test]
    fn test_drop_principal_cascade() {
        assert_eq!(
            drop_principal(&id("u1"), DropBehavior::Restrict).text(),
            "DROP USER U1"
        );
        assert_eq!(
            drop_principal(&id("u1"), DropBehavior::Cascade).text(),
            "DROP USER U1 CASCADE"
        );
    }

    #[test]
    fn test_create_profile_renders_all_limits() {
        let limits = ProfileLimits {
            sessions_per_user: ProfileLimit::Value(3),
            connect_time: ProfileLimit::Value(60),
            idle_time: ProfileLimit::Unlimited,
            failed_login_attempts: ProfileLimit::Value(5),
            password_life_time: ProfileLimit::Default,
        };
        let stmt = create_profile(&id("limited"), &limits);
        assert_eq!(
            stmt.text(),
            "CREATE PROFILE LIMITED LIMIT SESSIONS_PER_USER 3 CONNECT_TIME 60 \
             IDLE_TIME UNLIMITED FAILED_LOGIN_ATTEMPTS 5 PASSWORD_LIFE_TIME DEFAULT"
        );
    }

    #[test]
    fn test_alter_profile_partial() {
        let update = ProfileLimitsUpdate {
            idle_time: Some(ProfileLimit::Value(15)),
            ..ProfileLimitsUpdate::default()
        };
        let stmt = alter_profile(&id("limited"), &update).unwrap();
        assert_eq!(stmt.text(), "ALTER PROFILE LIMITED LIMIT IDLE_TIME 15");
        assert!(alter_profile(&id("limited"), &ProfileLimitsUpdate::default()).is_none());
    }

    #[test]
    fn test_role_statements() {
        assert_eq!(
            create_role(&id("hr_role"), &RoleAuth::NotIdentified).text(),
            "CREATE ROLE HR_ROLE NOT IDENTIFIED"
        );
        assert_eq!(
            create_role(&id("hr_role"), &RoleAuth::Password(lit("pw"))).text(),
            "CREATE ROLE HR_ROLE IDENTIFIED BY \"pw\""
        );
        assert_eq!(drop_role(&id("hr_role")).text(), "DROP ROLE HR_ROLE");
    }

    #[test]
    fn test_grant_revoke_rendering() {
        let g = Grantable::System(SystemPrivilege::CreateSession);
        assert_eq!(
            grant(&g, &id("hr_user"), false).text(),
            "GRANT CREATE SESSION TO HR_USER"
        );
        assert_eq!(
            grant(&g, &id("hr_user"), true).text(),
            "GRANT CREATE SESSION TO HR_USER WITH ADMIN OPTION"
        );

        let g = Grantable::Object {
            privilege: ObjectPrivilege::Select,
            object: id("projects"),
        };
        assert_eq!(
            revoke(&g, &id("hr_role")).text(),
            "REVOKE SELECT ON PROJECTS FROM HR_ROLE"
        );

        let g = Grantable::Role(id("hr_role"));
        assert_eq!(
            grant(&g, &id("hr_user"), false).text(),
            "GRANT HR_ROLE TO HR_USER"
        );
    }

    #[test]
    fn test_grantable_matches_record() {
        let rec = GrantRecord {
            grantee: "HR_USER".to_string(),
            privilege: "CREATE SESSION".to_string(),
            object: None,
            admin_option: false,
            source: crate::model::GrantSource::Direct,
        };
        assert!(Grantable::System(SystemPrivilege::CreateSession).matches(&rec));
        assert!(!Grantable::System(SystemPrivilege::CreateTable).matches(&rec));
        assert!(!Grantable::Role(id("create_session2")).matches(&rec));
    }

    #[test]
    fn test_row_filter_binding_statements() {
        let stmt = bind_row_filter_pair(
            &id("hr_user"),
            &ContextPair {
                key: id("dept"),
                value: "HR".to_string(),
            },
        );
        assert_eq!(stmt.mode(), ExecutionMode::Dml);
        assert_eq!(
            stmt.params(),
            &[
                Value::Text("HR_USER".into()),
                Value::Text("DEPT".into()),
                Value::Text("HR".into())
            ]
        );

        let stmt = unbind_row_filter(&id("hr_user"));
        assert_eq!(stmt.mode(), ExecutionMode::Dml);
        assert_eq!(stmt.params(), &[Value::Text("HR_USER".into())]);
    }

    #[test]
    fn test_audit_policy_modes() {
        let coarse = create_audit_policy(&AuditPolicySpec {
            name: id("proj_audit"),
            object: id("projects"),
            actions: vec![AuditAction::Select, AuditAction::Update],
            column: None,
            condition: None,
            granularity: AuditGranularity::Coarse,
        });
        assert_eq!(coarse.mode(), ExecutionMode::Ddl);
        assert_eq!(
            coarse.text(),
            "CREATE AUDIT POLICY PROJ_AUDIT ACTIONS SELECT, UPDATE ON PROJECTS"
        );

        let fine = create_audit_policy(&AuditPolicySpec {
            name: id("salary_watch"),
            object: id("projects"),
            actions: vec![AuditAction::Select],
            column: Some(id("budget")),
            condition: Some(AuditCondition::ColumnGreaterThan {
                column: id("budget"),
                threshold: 100_000,
            }),
            granularity: AuditGranularity::Fine,
        });
        assert_eq!(fine.mode(), ExecutionMode::Dml);
        assert_eq!(fine.params().len(), 5);
        assert_eq!(fine.params()[3], Value::Text("BUDGET".into()));
        assert_eq!(fine.params()[4], Value::Text("BUDGET > 100000".into()));
    }

    #[test]
    fn test_audit_policy_enable_disable_drop() {
        assert_eq!(
            set_audit_policy_enabled(&id("p1"), true).text(),
            "AUDIT POLICY P1"
        );
        assert_eq!(
            set_audit_policy_enabled(&id("p1"), false).text(),
            "NOAUDIT POLICY P1"
        );
        assert_eq!(
            drop_audit_policy(&id("p1"), AuditGranularity::Coarse).text(),
            "DROP AUDIT POLICY P1"
        );
        assert_eq!(
            drop_audit_policy(&id("p1"), AuditGranularity::Fine).mode(),
            ExecutionMode::Dml
        );
    }

    #[test]
    fn test_redaction_policy_call() {
        let stmt = add_redaction_policy(&RedactionPolicySpec {
            name: id("mask_budget"),
            object: id("projects"),
            column: id("budget"),
            function: MaskingFunction::Partial {
                prefix_visible: 0,
                suffix_visible: 2,
                mask_char: '*',
            },
            predicate: ActivationPredicate::ContextEquals {
                key: id("dept"),
                value: id("hr"),
            },
        });
        assert_eq!(stmt.mode(), ExecutionMode::Dml);
        assert_eq!(stmt.params()[3], Value::Int(2));
        assert_eq!(
            stmt.params()[4],
            Value::Text("prefix=0,suffix=2,mask=*".into())
        );
        assert_eq!(
            stmt.params()[5],
            Value::Text("SYS_CONTEXT('ROWGUARD_CTX', 'DEPT') = 'HR'".into())
        );
    }

    #[test]
    fn test_predicate_rendering() {
        assert_eq!(ActivationPredicate::Always.render(), "1=1");
        assert_eq!(ActivationPredicate::Never.render(), "1=0");
    }

    #[test]
    fn test_statement_serializes_for_tooling() {
        let stmt = drop_role(&id("hr_role"));
        let json = serde_json::to_value(&stmt).unwrap();
        assert_eq!(json["text"], "DROP ROLE HR_ROLE");
        assert_eq!(json["mode"], "Ddl");
    }
}
