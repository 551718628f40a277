//! In-memory backend.
//!
//! Implements the backend traits over concurrent maps: a catalog, a
//! binding table, the two audit log sources, and per-connection session
//! context. It interprets exactly the statements the builder renders
//! (keyword dispatch over the fixed grammar, not a SQL parser) and records
//! which context was active for every execution, which is what the
//! leak-safety tests assert against. Failure injection covers the
//! context-clear path.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;

use rowguard_core::audit::{CoarseAuditRecord, FineAuditRecord};
use rowguard_core::model::{
    AuditPolicyRecord, CallerIdentity, GrantRecord, GrantSource, LifecycleState, PrincipalRecord,
    ProfileRecord, RedactionPolicyRecord, RoleRecord, RowFilterBindingRecord,
};
use rowguard_core::statement::{ProfileLimit, ProfileLimits};
use rowguard_core::value::Value;

use crate::backend::{AdminBackend, BackendError, BackendResult, SessionConnection};

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One executed statement, with the session context active at execution
/// time.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    /// Physical connection the statement ran on.
    pub conn_id: u64,
    /// Session context active when the statement executed.
    pub context: Option<String>,
    /// Statement text.
    pub text: String,
}

#[derive(Default)]
struct MemoryState {
    principals: DashMap<String, PrincipalRecord>,
    profiles: DashMap<String, ProfileLimits>,
    roles: DashMap<String, RoleRecord>,
    grants: Mutex<Vec<GrantRecord>>,
    audit_policies: DashMap<String, AuditPolicyRecord>,
    redaction_policies: DashMap<String, RedactionPolicyRecord>,
    bindings: DashMap<String, Vec<(String, String)>>,
    coarse_log: Mutex<Vec<CoarseAuditRecord>>,
    fine_log: Mutex<Vec<FineAuditRecord>>,
    log_seq: AtomicU64,
    contexts: DashMap<u64, String>,
    last_context: DashMap<u64, String>,
    executions: Mutex<Vec<ExecutionRecord>>,
    fail_next_clear: AtomicBool,
    next_conn_id: AtomicU64,
}

impl MemoryState {
    fn next_seq(&self) -> u64 {
        self.log_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn log_coarse(&self, actor: &str, action: &str, object: Option<&str>) {
        self.coarse_log.lock().push(CoarseAuditRecord {
            timestamp: now_millis(),
            sequence: self.next_seq(),
            actor: actor.to_string(),
            action: action.to_string(),
            object_name: object.map(|s| s.to_string()),
        });
    }

    fn log_fine_if_watched(&self, actor: &str, statement_type: &str, object: Option<&str>) {
        let Some(object) = object else { return };
        for entry in self.audit_policies.iter() {
            let policy = entry.value();
            if policy.fine_grained && policy.enabled && policy.object == object {
                self.fine_log.lock().push(FineAuditRecord {
                    timestamp: now_millis(),
                    sequence: self.next_seq(),
                    actor: actor.to_string(),
                    statement_type: statement_type.to_string(),
                    object_name: object.to_string(),
                    column: policy.column.clone(),
                    condition: policy.condition.clone(),
                    policy_name: policy.name.clone(),
                });
            }
        }
    }

    fn assigned_count(&self, profile: &str) -> usize {
        self.principals
            .iter()
            .filter(|p| p.value().profile.as_deref() == Some(profile))
            .count()
    }

    fn grantee_count(&self, role: &str) -> usize {
        self.grants
            .lock()
            .iter()
            .filter(|g| g.privilege == role && g.object.is_none())
            .count()
    }
}

/// Shared in-memory database. Clone freely; every clone and every
/// connection sees the same state.
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<MemoryState>,
}

impl MemoryBackend {
    /// Create an empty database with the standard DEFAULT profile.
    pub fn new() -> Self {
        let backend = Self {
            state: Arc::new(MemoryState::default()),
        };
        backend
            .state
            .profiles
            .insert("DEFAULT".to_string(), ProfileLimits::default());
        backend
    }

    /// Make the next context clear fail, once.
    pub fn fail_next_context_clear(&self) {
        self.state.fail_next_clear.store(true, Ordering::Relaxed);
    }

    /// Context currently bound on a connection.
    pub fn current_context(&self, conn_id: u64) -> Option<String> {
        self.state.contexts.get(&conn_id).map(|e| e.value().clone())
    }

    /// Last context ever bound on a connection, surviving clears.
    pub fn last_context(&self, conn_id: u64) -> Option<String> {
        self.state
            .last_context
            .get(&conn_id)
            .map(|e| e.value().clone())
    }

    /// Every executed statement with its execution-time context.
    pub fn executions(&self) -> Vec<ExecutionRecord> {
        self.state.executions.lock().clone()
    }

    /// Sorted catalog content by object kind, for state comparisons.
    pub fn catalog_names(&self) -> BTreeMap<&'static str, Vec<String>> {
        let mut out = BTreeMap::new();
        let mut names: Vec<String> = self.state.principals.iter().map(|e| e.key().clone()).collect();
        names.sort();
        out.insert("principals", names);
        let mut names: Vec<String> = self.state.profiles.iter().map(|e| e.key().clone()).collect();
        names.sort();
        out.insert("profiles", names);
        let mut names: Vec<String> = self.state.roles.iter().map(|e| e.key().clone()).collect();
        names.sort();
        out.insert("roles", names);
        let mut names: Vec<String> = self
            .state
            .grants
            .lock()
            .iter()
            .map(|g| {
                format!(
                    "{}:{}{}",
                    g.grantee,
                    g.privilege,
                    g.object.as_deref().map(|o| format!("@{}", o)).unwrap_or_default()
                )
            })
            .collect();
        names.sort();
        out.insert("grants", names);
        let mut names: Vec<String> = self
            .state
            .audit_policies
            .iter()
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        out.insert("audit_policies", names);
        let mut names: Vec<String> = self
            .state
            .redaction_policies
            .iter()
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        out.insert("redaction_policies", names);
        let mut names: Vec<String> = self.state.bindings.iter().map(|e| e.key().clone()).collect();
        names.sort();
        out.insert("bindings", names);
        out
    }
}

impl AdminBackend for MemoryBackend {
    type Conn = MemoryConnection;

    async fn connect(&self) -> BackendResult<MemoryConnection> {
        let id = self.state.next_conn_id.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(MemoryConnection {
            id,
            state: self.state.clone(),
        })
    }
}

/// One simulated physical connection.
pub struct MemoryConnection {
    id: u64,
    state: Arc<MemoryState>,
}

impl MemoryConnection {
    fn actor(&self) -> String {
        self.state
            .contexts
            .get(&self.id)
            .map(|e| e.value().clone())
            .unwrap_or_else(|| "ANONYMOUS".to_string())
    }

    fn record_execution(&self, text: &str) {
        self.state.executions.lock().push(ExecutionRecord {
            conn_id: self.id,
            context: self.state.contexts.get(&self.id).map(|e| e.value().clone()),
            text: text.to_string(),
        });
    }

    fn apply_ddl(&self, text: &str) -> BackendResult<(String, Option<String>)> {
        let tokens = tokenize(text);
        let words: Vec<&str> = tokens.iter().map(|t| t.as_str()).collect();
        match words.as_slice() {
            ["CREATE", "USER", name, rest @ ..] => {
                if self.state.principals.contains_key(*name) {
                    return Err(BackendError::new(
                        "ORA-01920",
                        format!("user name '{}' conflicts with another user or role name", name),
                    ));
                }
                let clauses = parse_user_clauses(rest)?;
                if let Some(profile) = &clauses.profile {
                    if !self.state.profiles.contains_key(profile) {
                        return Err(BackendError::new(
                            "ORA-02380",
                            format!("profile '{}' does not exist", profile),
                        ));
                    }
                }
                self.state.principals.insert(
                    name.to_string(),
                    PrincipalRecord {
                        name: name.to_string(),
                        state: LifecycleState::Active,
                        profile: clauses.profile,
                        default_tablespace: clauses.default_tablespace,
                        temporary_tablespace: clauses.temporary_tablespace,
                        created_at: Some(now_millis()),
                    },
                );
                Ok(("CREATE USER".to_string(), Some(name.to_string())))
            }
            ["ALTER", "USER", name, rest @ ..] => {
                let clauses = parse_user_clauses(rest)?;
                if let Some(profile) = &clauses.profile {
                    if !self.state.profiles.contains_key(profile) {
                        return Err(BackendError::new(
                            "ORA-02380",
                            format!("profile '{}' does not exist", profile),
                        ));
                    }
                }
                let mut entry = self.state.principals.get_mut(*name).ok_or_else(|| {
                    BackendError::new("ORA-01918", format!("user '{}' does not exist", name))
                })?;
                let record = entry.value_mut();
                if clauses.profile.is_some() {
                    record.profile = clauses.profile;
                }
                if clauses.default_tablespace.is_some() {
                    record.default_tablespace = clauses.default_tablespace;
                }
                if clauses.temporary_tablespace.is_some() {
                    record.temporary_tablespace = clauses.temporary_tablespace;
                }
                if clauses.password_changed && record.state == LifecycleState::Expired {
                    record.state = LifecycleState::Active;
                }
                if let Some(action) = clauses.account_action {
                    record.state = match action {
                        "LOCK" => LifecycleState::Locked,
                        _ => LifecycleState::Active,
                    };
                }
                if clauses.password_expired {
                    record.state = LifecycleState::Expired;
                }
                Ok(("ALTER USER".to_string(), Some(name.to_string())))
            }
            ["DROP", "USER", name, rest @ ..] => {
                if !matches!(rest, [] | ["CASCADE"]) {
                    return Err(BackendError::new(
                        "ORA-00922",
                        "missing or invalid option".to_string(),
                    ));
                }
                if self.state.principals.remove(*name).is_none() {
                    return Err(BackendError::new(
                        "ORA-01918",
                        format!("user '{}' does not exist", name),
                    ));
                }
                // grants held by the principal go with it
                self.state.grants.lock().retain(|g| g.grantee != *name);
                Ok(("DROP USER".to_string(), Some(name.to_string())))
            }
            ["CREATE", "PROFILE", name, "LIMIT", rest @ ..] => {
                if self.state.profiles.contains_key(*name) {
                    return Err(BackendError::new(
                        "ORA-02379",
                        format!("profile '{}' already exists", name),
                    ));
                }
                let limits = parse_profile_limits(rest, ProfileLimits::default())?;
                self.state.profiles.insert(name.to_string(), limits);
                Ok(("CREATE PROFILE".to_string(), Some(name.to_string())))
            }
            ["ALTER", "PROFILE", name, "LIMIT", rest @ ..] => {
                let current = self
                    .state
                    .profiles
                    .get(*name)
                    .map(|e| *e.value())
                    .ok_or_else(|| {
                        BackendError::new(
                            "ORA-02380",
                            format!("profile '{}' does not exist", name),
                        )
                    })?;
                let limits = parse_profile_limits(rest, current)?;
                self.state.profiles.insert(name.to_string(), limits);
                Ok(("ALTER PROFILE".to_string(), Some(name.to_string())))
            }
            ["DROP", "PROFILE", name, rest @ ..] => {
                let cascade = matches!(rest, ["CASCADE"]);
                if !self.state.profiles.contains_key(*name) {
                    return Err(BackendError::new(
                        "ORA-02380",
                        format!("profile '{}' does not exist", name),
                    ));
                }
                let assigned = self.state.assigned_count(name);
                if assigned > 0 && !cascade {
                    return Err(BackendError::new(
                        "ORA-02382",
                        format!("profile '{}' has users assigned, cannot drop without CASCADE", name),
                    ));
                }
                if assigned > 0 {
                    for mut p in self.state.principals.iter_mut() {
                        if p.value().profile.as_deref() == Some(*name) {
                            p.value_mut().profile = Some("DEFAULT".to_string());
                        }
                    }
                }
                self.state.profiles.remove(*name);
                Ok(("DROP PROFILE".to_string(), Some(name.to_string())))
            }
            ["CREATE", "ROLE", name, auth @ ..] => {
                if self.state.roles.contains_key(*name) {
                    return Err(BackendError::new(
                        "ORA-01921",
                        format!("role name '{}' conflicts with another user or role name", name),
                    ));
                }
                let password_required = matches!(auth, ["IDENTIFIED", "BY", _]);
                self.state.roles.insert(
                    name.to_string(),
                    RoleRecord {
                        name: name.to_string(),
                        password_required,
                        grantee_count: 0,
                    },
                );
                Ok(("CREATE ROLE".to_string(), Some(name.to_string())))
            }
            ["ALTER", "ROLE", name, auth @ ..] => {
                let mut entry = self.state.roles.get_mut(*name).ok_or_else(|| {
                    BackendError::new("ORA-01919", format!("role '{}' does not exist", name))
                })?;
                entry.value_mut().password_required = matches!(auth, ["IDENTIFIED", "BY", _]);
                Ok(("ALTER ROLE".to_string(), Some(name.to_string())))
            }
            ["DROP", "ROLE", name] => {
                if self.state.roles.remove(*name).is_none() {
                    return Err(BackendError::new(
                        "ORA-01919",
                        format!("role '{}' does not exist", name),
                    ));
                }
                self.state
                    .grants
                    .lock()
                    .retain(|g| g.grantee != *name && !(g.privilege == *name && g.object.is_none()));
                Ok(("DROP ROLE".to_string(), Some(name.to_string())))
            }
            ["CREATE", "AUDIT", "POLICY", name, "ACTIONS", rest @ ..] => {
                if self.state.audit_policies.contains_key(*name) {
                    return Err(BackendError::new(
                        "ORA-46354",
                        format!("audit policy '{}' already exists", name),
                    ));
                }
                let on = rest.iter().position(|t| *t == "ON").ok_or_else(|| {
                    BackendError::new("ORA-00905", "missing keyword ON".to_string())
                })?;
                let actions: Vec<String> = rest[..on]
                    .iter()
                    .map(|t| t.trim_end_matches(',').to_string())
                    .collect();
                let object = rest.get(on + 1).ok_or_else(|| {
                    BackendError::new("ORA-00936", "missing expression".to_string())
                })?;
                self.state.audit_policies.insert(
                    name.to_string(),
                    AuditPolicyRecord {
                        name: name.to_string(),
                        object: object.to_string(),
                        actions,
                        column: None,
                        condition: None,
                        fine_grained: false,
                        enabled: false,
                    },
                );
                Ok(("CREATE AUDIT POLICY".to_string(), Some(object.to_string())))
            }
            ["AUDIT", "POLICY", name] | ["NOAUDIT", "POLICY", name] => {
                let enabled = words[0] == "AUDIT";
                let mut entry = self.state.audit_policies.get_mut(*name).ok_or_else(|| {
                    BackendError::new(
                        "ORA-46350",
                        format!("audit policy '{}' does not exist", name),
                    )
                })?;
                entry.value_mut().enabled = enabled;
                Ok((words[0].to_string(), Some(entry.value().object.clone())))
            }
            ["DROP", "AUDIT", "POLICY", name] => {
                let removed = self.state.audit_policies.remove(*name).ok_or_else(|| {
                    BackendError::new(
                        "ORA-46350",
                        format!("audit policy '{}' does not exist", name),
                    )
                })?;
                Ok(("DROP AUDIT POLICY".to_string(), Some(removed.1.object)))
            }
            ["GRANT", rest @ ..] => {
                let to = rest.iter().position(|t| *t == "TO").ok_or_else(|| {
                    BackendError::new("ORA-00905", "missing keyword TO".to_string())
                })?;
                let admin_option = rest.ends_with(&["WITH", "ADMIN", "OPTION"]);
                let grantee = rest.get(to + 1).ok_or_else(|| {
                    BackendError::new("ORA-00936", "missing expression".to_string())
                })?;
                if !self.state.principals.contains_key(*grantee)
                    && !self.state.roles.contains_key(*grantee)
                {
                    return Err(BackendError::new(
                        "ORA-01917",
                        format!("user or role '{}' does not exist", grantee),
                    ));
                }
                let (privilege, object) = parse_grant_target(&rest[..to]);
                let mut grants = self.state.grants.lock();
                let exists = grants.iter().any(|g| {
                    g.grantee == *grantee && g.privilege == privilege && g.object == object
                });
                if !exists {
                    grants.push(GrantRecord {
                        grantee: grantee.to_string(),
                        privilege,
                        object,
                        admin_option,
                        source: GrantSource::Direct,
                    });
                }
                Ok(("GRANT".to_string(), Some(grantee.to_string())))
            }
            ["REVOKE", rest @ ..] => {
                let from = rest.iter().position(|t| *t == "FROM").ok_or_else(|| {
                    BackendError::new("ORA-00905", "missing keyword FROM".to_string())
                })?;
                let grantee = rest.get(from + 1).ok_or_else(|| {
                    BackendError::new("ORA-00936", "missing expression".to_string())
                })?;
                let (privilege, object) = parse_grant_target(&rest[..from]);
                let mut grants = self.state.grants.lock();
                let before = grants.len();
                grants.retain(|g| {
                    !(g.grantee == *grantee && g.privilege == privilege && g.object == object)
                });
                if grants.len() == before {
                    return Err(BackendError::new(
                        "ORA-01927",
                        format!("cannot revoke '{}' from '{}'", privilege, grantee),
                    ));
                }
                Ok(("REVOKE".to_string(), Some(grantee.to_string())))
            }
            _ => Err(BackendError::new(
                "ORA-00900",
                format!("invalid statement: {}", text),
            )),
        }
    }

    fn apply_dml(&self, text: &str, params: &[Value]) -> BackendResult<(u64, String, Option<String>)> {
        let text_param = |i: usize| -> Option<String> {
            params.get(i).and_then(|v| v.as_text()).map(|s| s.to_string())
        };
        if text.starts_with("MERGE INTO row_filter_bindings") {
            let (caller, key, value) = match (text_param(0), text_param(1), text_param(2)) {
                (Some(c), Some(k), Some(v)) => (c, k, v),
                _ => {
                    return Err(BackendError::new(
                        "ORA-01008",
                        "not all variables bound".to_string(),
                    ))
                }
            };
            let mut pairs = self.state.bindings.entry(caller).or_default();
            match pairs.iter_mut().find(|(k, _)| *k == key) {
                Some(pair) => pair.1 = value,
                None => pairs.push((key, value)),
            }
            Ok((1, "MERGE".to_string(), Some("ROW_FILTER_BINDINGS".to_string())))
        } else if text.starts_with("DELETE FROM row_filter_bindings") {
            let caller = text_param(0).ok_or_else(|| {
                BackendError::new("ORA-01008", "not all variables bound".to_string())
            })?;
            let removed = self
                .state
                .bindings
                .remove(&caller)
                .map(|(_, pairs)| pairs.len() as u64)
                .unwrap_or(0);
            Ok((removed, "DELETE".to_string(), Some("ROW_FILTER_BINDINGS".to_string())))
        } else if text.starts_with("BEGIN audit_admin.add_fine_policy") {
            let name = text_param(0).ok_or_else(|| {
                BackendError::new("ORA-01008", "not all variables bound".to_string())
            })?;
            let object = text_param(1).ok_or_else(|| {
                BackendError::new("ORA-01008", "not all variables bound".to_string())
            })?;
            if self.state.audit_policies.contains_key(&name) {
                return Err(BackendError::new(
                    "ORA-28101",
                    format!("policy '{}' already exists", name),
                ));
            }
            let actions = text_param(2)
                .map(|s| s.split(", ").map(|a| a.to_string()).collect())
                .unwrap_or_default();
            self.state.audit_policies.insert(
                name.clone(),
                AuditPolicyRecord {
                    name,
                    object: object.clone(),
                    actions,
                    column: text_param(3),
                    condition: text_param(4),
                    fine_grained: true,
                    enabled: true,
                },
            );
            Ok((0, "EXECUTE".to_string(), Some(object)))
        } else if text.starts_with("BEGIN audit_admin.drop_fine_policy") {
            let name = text_param(0).ok_or_else(|| {
                BackendError::new("ORA-01008", "not all variables bound".to_string())
            })?;
            let removed = self.state.audit_policies.remove(&name).ok_or_else(|| {
                BackendError::new("ORA-28102", format!("policy '{}' does not exist", name))
            })?;
            Ok((0, "EXECUTE".to_string(), Some(removed.1.object)))
        } else if text.starts_with("BEGIN redact_admin.add_policy") {
            let name = text_param(0).ok_or_else(|| {
                BackendError::new("ORA-01008", "not all variables bound".to_string())
            })?;
            let object = text_param(1).ok_or_else(|| {
                BackendError::new("ORA-01008", "not all variables bound".to_string())
            })?;
            let column = text_param(2).ok_or_else(|| {
                BackendError::new("ORA-01008", "not all variables bound".to_string())
            })?;
            if self.state.redaction_policies.contains_key(&name) {
                return Err(BackendError::new(
                    "ORA-28069",
                    format!("redaction policy '{}' already exists", name),
                ));
            }
            let function_code = params.get(3).and_then(|v| v.as_int()).unwrap_or(0);
            let predicate = text_param(5).unwrap_or_else(|| "1=1".to_string());
            self.state.redaction_policies.insert(
                name.clone(),
                RedactionPolicyRecord {
                    name,
                    object: object.clone(),
                    column,
                    function_code,
                    predicate,
                },
            );
            Ok((0, "EXECUTE".to_string(), Some(object)))
        } else if text.starts_with("BEGIN redact_admin.drop_policy") {
            let name = text_param(0).ok_or_else(|| {
                BackendError::new("ORA-01008", "not all variables bound".to_string())
            })?;
            let removed = self.state.redaction_policies.remove(&name).ok_or_else(|| {
                BackendError::new(
                    "ORA-28068",
                    format!("redaction policy '{}' does not exist", name),
                )
            })?;
            Ok((0, "EXECUTE".to_string(), Some(removed.1.object)))
        } else {
            Err(BackendError::new(
                "ORA-00900",
                format!("invalid statement: {}", text),
            ))
        }
    }
}

impl SessionConnection for MemoryConnection {
    async fn execute_ddl(&mut self, text: &str) -> BackendResult<()> {
        self.record_execution(text);
        let actor = self.actor();
        let (action, object) = self.apply_ddl(text)?;
        self.state.log_coarse(&actor, &action, object.as_deref());
        let statement_type = action.split_whitespace().next().unwrap_or("").to_string();
        self.state
            .log_fine_if_watched(&actor, &statement_type, object.as_deref());
        Ok(())
    }

    async fn execute_dml(&mut self, text: &str, params: &[Value]) -> BackendResult<u64> {
        self.record_execution(text);
        let actor = self.actor();
        let (affected, action, object) = self.apply_dml(text, params)?;
        self.state.log_coarse(&actor, &action, object.as_deref());
        // procedure calls are not statements on the watched object
        if action != "EXECUTE" {
            self.state.log_fine_if_watched(&actor, &action, object.as_deref());
        }
        Ok(affected)
    }

    async fn set_session_context(&mut self, identity: &CallerIdentity) -> BackendResult<()> {
        self.state
            .contexts
            .insert(self.id, identity.name().to_string());
        self.state
            .last_context
            .insert(self.id, identity.name().to_string());
        self.state.log_coarse(identity.name(), "LOGON", None);
        Ok(())
    }

    async fn clear_session_context(&mut self) -> BackendResult<()> {
        if self.state.fail_next_clear.swap(false, Ordering::Relaxed) {
            return Err(BackendError::new(
                "ORA-28112",
                "failed to execute context clearing function".to_string(),
            ));
        }
        let actor = self.actor();
        self.state.contexts.remove(&self.id);
        self.state.log_coarse(&actor, "LOGOFF", None);
        Ok(())
    }

    async fn fetch_principals(&mut self) -> BackendResult<Vec<PrincipalRecord>> {
        let mut out: Vec<PrincipalRecord> =
            self.state.principals.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn fetch_principal(&mut self, name: &str) -> BackendResult<Option<PrincipalRecord>> {
        Ok(self.state.principals.get(name).map(|e| e.value().clone()))
    }

    async fn fetch_profiles(&mut self) -> BackendResult<Vec<ProfileRecord>> {
        let mut out: Vec<ProfileRecord> = self
            .state
            .profiles
            .iter()
            .map(|e| ProfileRecord {
                name: e.key().clone(),
                limits: *e.value(),
                assigned_principals: self.state.assigned_count(e.key()),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn fetch_profile_dependents(&mut self, profile: &str) -> BackendResult<Vec<String>> {
        let mut out: Vec<String> = self
            .state
            .principals
            .iter()
            .filter(|p| p.value().profile.as_deref() == Some(profile))
            .map(|p| p.key().clone())
            .collect();
        out.sort();
        Ok(out)
    }

    async fn fetch_roles(&mut self) -> BackendResult<Vec<RoleRecord>> {
        let mut out: Vec<RoleRecord> = self
            .state
            .roles
            .iter()
            .map(|e| RoleRecord {
                grantee_count: self.state.grantee_count(e.key()),
                ..e.value().clone()
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn fetch_role_grantees(&mut self, role: &str) -> BackendResult<Vec<String>> {
        let mut out: Vec<String> = self
            .state
            .grants
            .lock()
            .iter()
            .filter(|g| g.privilege == role && g.object.is_none())
            .map(|g| g.grantee.clone())
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn fetch_grants(&mut self, grantee: &str) -> BackendResult<Vec<GrantRecord>> {
        let grants = self.state.grants.lock();
        let mut out: Vec<GrantRecord> = grants
            .iter()
            .filter(|g| g.grantee == grantee)
            .cloned()
            .collect();
        // one level of role inheritance, mirroring the catalog view
        let held_roles: Vec<String> = out
            .iter()
            .filter(|g| g.object.is_none() && self.state.roles.contains_key(&g.privilege))
            .map(|g| g.privilege.clone())
            .collect();
        for role in held_roles {
            for g in grants.iter().filter(|g| g.grantee == role) {
                out.push(GrantRecord {
                    grantee: grantee.to_string(),
                    privilege: g.privilege.clone(),
                    object: g.object.clone(),
                    admin_option: false,
                    source: GrantSource::ViaRole,
                });
            }
        }
        Ok(out)
    }

    async fn fetch_audit_policies(&mut self) -> BackendResult<Vec<AuditPolicyRecord>> {
        let mut out: Vec<AuditPolicyRecord> = self
            .state
            .audit_policies
            .iter()
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn fetch_redaction_policies(&mut self) -> BackendResult<Vec<RedactionPolicyRecord>> {
        let mut out: Vec<RedactionPolicyRecord> = self
            .state
            .redaction_policies
            .iter()
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn fetch_row_filter_bindings(&mut self) -> BackendResult<Vec<RowFilterBindingRecord>> {
        let mut out: Vec<RowFilterBindingRecord> = self
            .state
            .bindings
            .iter()
            .map(|e| RowFilterBindingRecord {
                caller: e.key().clone(),
                pairs: e.value().clone(),
            })
            .collect();
        out.sort_by(|a, b| a.caller.cmp(&b.caller));
        Ok(out)
    }

    async fn fetch_coarse_audit(&mut self, object: Option<&str>) -> BackendResult<Vec<CoarseAuditRecord>> {
        let log = self.state.coarse_log.lock();
        Ok(log
            .iter()
            .filter(|r| match object {
                Some(o) => r.object_name.as_deref() == Some(o),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn fetch_fine_audit(&mut self, object: Option<&str>) -> BackendResult<Vec<FineAuditRecord>> {
        let log = self.state.fine_log.lock();
        Ok(log
            .iter()
            .filter(|r| match object {
                Some(o) => r.object_name == o,
                None => true,
            })
            .cloned()
            .collect())
    }
}

/// Split statement text into tokens, keeping double-quoted runs intact.
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in text.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[derive(Default)]
struct UserClauses {
    profile: Option<String>,
    default_tablespace: Option<String>,
    temporary_tablespace: Option<String>,
    password_changed: bool,
    password_expired: bool,
    account_action: Option<&'static str>,
}

fn parse_user_clauses(mut rest: &[&str]) -> Result<UserClauses, BackendError> {
    let mut clauses = UserClauses::default();
    while !rest.is_empty() {
        match rest {
            ["IDENTIFIED", "BY", _pw, tail @ ..] => {
                clauses.password_changed = true;
                rest = tail;
            }
            ["DEFAULT", "TABLESPACE", ts, tail @ ..] => {
                clauses.default_tablespace = Some(ts.to_string());
                rest = tail;
            }
            ["TEMPORARY", "TABLESPACE", ts, tail @ ..] => {
                clauses.temporary_tablespace = Some(ts.to_string());
                rest = tail;
            }
            ["QUOTA", _quota, "ON", _ts, tail @ ..] => {
                rest = tail;
            }
            ["PROFILE", p, tail @ ..] => {
                clauses.profile = Some(p.to_string());
                rest = tail;
            }
            ["ACCOUNT", "LOCK", tail @ ..] => {
                clauses.account_action = Some("LOCK");
                rest = tail;
            }
            ["ACCOUNT", "UNLOCK", tail @ ..] => {
                clauses.account_action = Some("UNLOCK");
                rest = tail;
            }
            ["PASSWORD", "EXPIRE", tail @ ..] => {
                clauses.password_expired = true;
                rest = tail;
            }
            _ => {
                return Err(BackendError::new(
                    "ORA-00922",
                    format!("missing or invalid option near '{}'", rest[0]),
                ))
            }
        }
    }
    Ok(clauses)
}

fn parse_profile_limits(
    rest: &[&str],
    mut limits: ProfileLimits,
) -> Result<ProfileLimits, BackendError> {
    let mut chunks = rest.chunks_exact(2);
    for chunk in &mut chunks {
        let value: ProfileLimit = chunk[1]
            .parse()
            .map_err(|e: String| BackendError::new("ORA-02377", e))?;
        match chunk[0] {
            "SESSIONS_PER_USER" => limits.sessions_per_user = value,
            "CONNECT_TIME" => limits.connect_time = value,
            "IDLE_TIME" => limits.idle_time = value,
            "FAILED_LOGIN_ATTEMPTS" => limits.failed_login_attempts = value,
            "PASSWORD_LIFE_TIME" => limits.password_life_time = value,
            other => {
                return Err(BackendError::new(
                    "ORA-02376",
                    format!("invalid or redundant resource '{}'", other),
                ))
            }
        }
    }
    if !chunks.remainder().is_empty() {
        return Err(BackendError::new(
            "ORA-02377",
            "invalid profile limit".to_string(),
        ));
    }
    Ok(limits)
}

fn parse_grant_target(tokens: &[&str]) -> (String, Option<String>) {
    if let Some(on) = tokens.iter().position(|t| *t == "ON") {
        (
            tokens[..on].join(" "),
            tokens.get(on + 1).map(|s| s.to_string()),
        )
    } else {
        (tokens.join(" "), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_keeps_quoted_runs() {
        let tokens = tokenize("CREATE USER A IDENTIFIED BY \"p w\" PROFILE P1");
        assert_eq!(
            tokens,
            vec!["CREATE", "USER", "A", "IDENTIFIED", "BY", "\"p w\"", "PROFILE", "P1"]
        );
    }

    #[test]
    fn test_parse_grant_target() {
        assert_eq!(
            parse_grant_target(&["CREATE", "SESSION"]),
            ("CREATE SESSION".to_string(), None)
        );
        assert_eq!(
            parse_grant_target(&["SELECT", "ON", "PROJECTS"]),
            ("SELECT".to_string(), Some("PROJECTS".to_string()))
        );
    }

    #[tokio::test]
    async fn test_create_and_drop_round_trip() {
        let backend = MemoryBackend::new();
        let before = backend.catalog_names();
        let mut conn = backend.connect().await.unwrap();
        conn.execute_ddl("CREATE USER U1 IDENTIFIED BY \"pw\" DEFAULT TABLESPACE USERS")
            .await
            .unwrap();
        assert!(backend.catalog_names()["principals"].contains(&"U1".to_string()));
        conn.execute_ddl("DROP USER U1").await.unwrap();
        assert_eq!(backend.catalog_names(), before);
    }

    #[tokio::test]
    async fn test_duplicate_user_is_rejected_with_code() {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect().await.unwrap();
        let ddl = "CREATE USER U1 IDENTIFIED BY \"pw\" DEFAULT TABLESPACE USERS";
        conn.execute_ddl(ddl).await.unwrap();
        let err = conn.execute_ddl(ddl).await.unwrap_err();
        assert_eq!(err.code, "ORA-01920");
    }

    #[tokio::test]
    async fn test_context_is_recorded_per_connection() {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect().await.unwrap();
        let id = conn.id;
        conn.set_session_context(&CallerIdentity::caller("HR_USER"))
            .await
            .unwrap();
        assert_eq!(backend.current_context(id).as_deref(), Some("HR_USER"));
        conn.clear_session_context().await.unwrap();
        assert_eq!(backend.current_context(id), None);
        assert_eq!(backend.last_context(id).as_deref(), Some("HR_USER"));
    }

    #[tokio::test]
    async fn test_fine_log_only_for_watched_objects() {
        let backend = MemoryBackend::new();
        let mut conn = backend.connect().await.unwrap();
        conn.execute_dml(
            "BEGIN audit_admin.add_fine_policy(:1, :2, :3, :4, :5); END;",
            &[
                Value::Text("WATCH1".into()),
                Value::Text("PROJECTS".into()),
                Value::Text("SELECT".into()),
                Value::Text("BUDGET".into()),
                Value::Null,
            ],
        )
        .await
        .unwrap();

        conn.execute_ddl("CREATE AUDIT POLICY CP ACTIONS SELECT ON PROJECTS")
            .await
            .unwrap();
        let fine = conn.fetch_fine_audit(Some("PROJECTS")).await.unwrap();
        assert_eq!(fine.len(), 1);
        assert_eq!(fine[0].policy_name, "WATCH1");
        assert_eq!(fine[0].column.as_deref(), Some("BUDGET"));
    }
}
