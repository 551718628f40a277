//! End-to-end engine tests against the in-memory backend: idempotent
//! grants, referential drop guards, catalog round-trips, and the audit
//! stream.

use std::time::Duration;

use rowguard_core::audit::{ActionKind, AuditFilter};
use rowguard_core::model::{GrantOutcome, LifecycleState, RevokeOutcome};
use rowguard_core::statement::{
    AuditAction, AuditGranularity, DropBehavior, MaskingFunction, ProfileLimit, ProfileLimits,
    Quota, SystemPrivilege,
};
use rowguard_core::Error;
use rowguard_engine::{
    AuditPolicyCreate, EngineConfig, GrantRequest, PredicateRequest, PrincipalCreate,
    PrincipalUpdate, RedactionPolicyCreate, SecurityEngine,
};
use rowguard_pool::{MemoryBackend, PoolConfig};

fn engine(backend: MemoryBackend) -> SecurityEngine<MemoryBackend> {
    SecurityEngine::new(
        backend,
        EngineConfig::new().with_pool(
            PoolConfig::new()
                .with_max_connections(2)
                .with_acquire_timeout(Duration::from_millis(500)),
        ),
    )
}

fn user(name: &str) -> PrincipalCreate {
    PrincipalCreate {
        username: name.to_string(),
        password: "s3cret99".to_string(),
        default_tablespace: "users".to_string(),
        temporary_tablespace: Some("temp".to_string()),
        quota: Some(Quota::Megabytes(10)),
        profile: None,
    }
}

#[tokio::test]
async fn create_lock_unlock_drop_principal() {
    let eng = engine(MemoryBackend::new());
    eng.create_principal(&user("hr_app")).await.unwrap();

    let record = eng.get_principal("hr_app").await.unwrap().unwrap();
    assert_eq!(record.name, "HR_APP");
    assert_eq!(record.state, LifecycleState::Active);

    eng.lock_principal("hr_app").await.unwrap();
    let record = eng.get_principal("hr_app").await.unwrap().unwrap();
    assert_eq!(record.state, LifecycleState::Locked);

    eng.unlock_principal("hr_app").await.unwrap();
    eng.expire_password("hr_app").await.unwrap();
    let record = eng.get_principal("hr_app").await.unwrap().unwrap();
    assert_eq!(record.state, LifecycleState::Expired);

    eng.drop_principal("hr_app", DropBehavior::Restrict)
        .await
        .unwrap();
    assert!(eng.get_principal("hr_app").await.unwrap().is_none());
}

#[tokio::test]
async fn alter_principal_applies_only_requested_changes() {
    let backend = MemoryBackend::new();
    let eng = engine(backend.clone());
    eng.create_principal(&user("shift1")).await.unwrap();

    // an empty update never reaches the backend
    let executed_before = backend.executions().len();
    eng.alter_principal("shift1", &PrincipalUpdate::default())
        .await
        .unwrap();
    assert_eq!(backend.executions().len(), executed_before);

    eng.create_profile("night", &ProfileLimits::default())
        .await
        .unwrap();
    eng.alter_principal(
        "shift1",
        &PrincipalUpdate {
            profile: Some("night".to_string()),
            quota: Some((Quota::Unlimited, "users".to_string())),
            ..PrincipalUpdate::default()
        },
    )
    .await
    .unwrap();

    let record = eng.get_principal("shift1").await.unwrap().unwrap();
    assert_eq!(record.profile.as_deref(), Some("NIGHT"));
    assert_eq!(record.default_tablespace.as_deref(), Some("USERS"));
}

#[tokio::test]
async fn create_then_drop_leaves_catalog_unchanged() {
    let backend = MemoryBackend::new();
    let eng = engine(backend.clone());
    let before = backend.catalog_names();

    eng.create_principal(&user("transient1")).await.unwrap();
    eng.drop_principal("transient1", DropBehavior::Restrict)
        .await
        .unwrap();

    assert_eq!(backend.catalog_names(), before);
}

#[tokio::test]
async fn invalid_identifiers_never_reach_the_backend() {
    let backend = MemoryBackend::new();
    let eng = engine(backend.clone());

    let err = eng
        .create_principal(&user("nhanvien01; DROP TABLE projects"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidIdentifier(_)));

    let err = eng.lock_principal("x'--").await.unwrap_err();
    assert!(matches!(err, Error::InvalidIdentifier(_)));

    assert!(backend.executions().is_empty(), "nothing was sent downstream");
}

#[tokio::test]
async fn duplicate_create_surfaces_the_database_diagnostic() {
    let eng = engine(MemoryBackend::new());
    eng.create_principal(&user("dup1")).await.unwrap();
    let err = eng.create_principal(&user("dup1")).await.unwrap_err();
    match err {
        Error::UpstreamRejected { code, message } => {
            assert_eq!(code, "ORA-01920");
            assert!(message.contains("DUP1"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn double_grant_reports_already_granted() {
    let eng = engine(MemoryBackend::new());
    eng.create_role("hr_role", None).await.unwrap();

    let request = GrantRequest::System(SystemPrivilege::CreateSession);
    let first = eng.grant("hr_role", &request, false).await.unwrap();
    assert_eq!(first, GrantOutcome::Granted);

    let second = eng.grant("hr_role", &request, false).await.unwrap();
    assert_eq!(second, GrantOutcome::AlreadyGranted);

    let grants = eng.list_grants("hr_role").await.unwrap();
    assert_eq!(grants.len(), 1, "the second call was a no-op");
    assert_eq!(grants[0].privilege, "CREATE SESSION");
}

#[tokio::test]
async fn revoke_is_idempotent() {
    let eng = engine(MemoryBackend::new());
    eng.create_role("tmp_role", None).await.unwrap();

    let request = GrantRequest::System(SystemPrivilege::CreateTable);
    assert_eq!(
        eng.revoke("tmp_role", &request).await.unwrap(),
        RevokeOutcome::NotHeld
    );

    eng.grant("tmp_role", &request, false).await.unwrap();
    assert_eq!(
        eng.revoke("tmp_role", &request).await.unwrap(),
        RevokeOutcome::Revoked
    );
    assert_eq!(
        eng.revoke("tmp_role", &request).await.unwrap(),
        RevokeOutcome::NotHeld
    );
}

#[tokio::test]
async fn drop_profile_in_use_requires_explicit_cascade() {
    let eng = engine(MemoryBackend::new());
    let limits = ProfileLimits {
        sessions_per_user: ProfileLimit::Value(2),
        ..ProfileLimits::default()
    };
    eng.create_profile("limited", &limits).await.unwrap();

    let mut request = user("clerk1");
    request.profile = Some("limited".to_string());
    eng.create_principal(&request).await.unwrap();

    let err = eng
        .drop_profile("limited", DropBehavior::Restrict)
        .await
        .unwrap_err();
    match err {
        Error::ObjectInUse { name, dependents, .. } => {
            assert_eq!(name, "LIMITED");
            assert_eq!(dependents, 1);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // cascade reassigns the dependent to the configured default profile
    eng.drop_profile("limited", DropBehavior::Cascade)
        .await
        .unwrap();
    let record = eng.get_principal("clerk1").await.unwrap().unwrap();
    assert_eq!(record.profile.as_deref(), Some("DEFAULT"));
    assert!(eng.get_profile("limited").await.unwrap().is_none());
}

#[tokio::test]
async fn drop_role_in_use_requires_explicit_cascade() {
    let eng = engine(MemoryBackend::new());
    eng.create_role("dept_role", None).await.unwrap();
    eng.create_principal(&user("member1")).await.unwrap();
    eng.grant("member1", &GrantRequest::Role("dept_role".to_string()), false)
        .await
        .unwrap();

    let err = eng
        .drop_role("dept_role", DropBehavior::Restrict)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ObjectInUse { dependents: 1, .. }));

    eng.drop_role("dept_role", DropBehavior::Cascade)
        .await
        .unwrap();
    assert!(eng.get_role("dept_role").await.unwrap().is_none());
    let grants = eng.list_grants("member1").await.unwrap();
    assert!(grants.iter().all(|g| g.privilege != "DEPT_ROLE"));
}

#[tokio::test]
async fn row_filter_bindings_round_trip() {
    let eng = engine(MemoryBackend::new());
    eng.bind_row_filter(
        "hr_user",
        &[
            ("dept".to_string(), "HR".to_string()),
            ("region".to_string(), "WEST".to_string()),
        ],
    )
    .await
    .unwrap();

    let bindings = eng.list_row_filter_bindings().await.unwrap();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].caller, "HR_USER");
    assert_eq!(bindings[0].pairs.len(), 2);
    assert!(bindings[0]
        .pairs
        .contains(&("DEPT".to_string(), "HR".to_string())));

    // rebinding a key updates in place
    eng.bind_row_filter("hr_user", &[("dept".to_string(), "FIN".to_string())])
        .await
        .unwrap();
    let bindings = eng.list_row_filter_bindings().await.unwrap();
    assert!(bindings[0]
        .pairs
        .contains(&("DEPT".to_string(), "FIN".to_string())));

    let removed = eng.unbind_row_filter("hr_user").await.unwrap();
    assert_eq!(removed, 2);
    assert!(eng.list_row_filter_bindings().await.unwrap().is_empty());
}

#[tokio::test]
async fn audit_policies_capture_and_merge() {
    let eng = engine(MemoryBackend::new());

    // fine-grained watch on the binding table, coarse policy alongside
    eng.create_audit_policy(&AuditPolicyCreate {
        name: "bind_watch".to_string(),
        object: "row_filter_bindings".to_string(),
        actions: vec![AuditAction::All],
        column: Some("ctx_value".to_string()),
        condition: None,
        granularity: AuditGranularity::Fine,
    })
    .await
    .unwrap();

    eng.bind_row_filter("audited_user", &[("dept".to_string(), "HR".to_string())])
        .await
        .unwrap();

    let page = eng
        .query_audit_events(&AuditFilter {
            object: Some("ROW_FILTER_BINDINGS".to_string()),
            ..AuditFilter::default()
        })
        .await
        .unwrap();

    // the bind produced one coarse record and one fine record
    assert!(page.events.len() >= 2);
    let fine: Vec<_> = page
        .events
        .iter()
        .filter(|e| e.column.as_deref() == Some("CTX_VALUE"))
        .collect();
    assert_eq!(fine.len(), 1);
    assert_eq!(fine[0].actor, "SEC_ADMIN");

    // descending order throughout
    let keys: Vec<_> = page
        .events
        .iter()
        .map(|e| (e.timestamp, e.sequence))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(keys, sorted);
}

#[tokio::test]
async fn audit_query_pages_with_cursor() {
    let eng = engine(MemoryBackend::new());
    for i in 0..6 {
        eng.create_principal(&user(&format!("bulk{}", i))).await.unwrap();
    }

    let first = eng
        .query_audit_events(&AuditFilter {
            action: Some(ActionKind::Create),
            page_size: 4,
            ..AuditFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(first.events.len(), 4);
    let cursor = first.next.expect("more events remain");

    let second = eng
        .query_audit_events(&AuditFilter {
            action: Some(ActionKind::Create),
            page_size: 4,
            cursor: Some(cursor),
            ..AuditFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(second.events.len(), 2);
    assert!(second.next.is_none());
}

#[tokio::test]
async fn coarse_audit_policy_lifecycle() {
    let eng = engine(MemoryBackend::new());
    eng.create_audit_policy(&AuditPolicyCreate {
        name: "proj_audit".to_string(),
        object: "projects".to_string(),
        actions: vec![AuditAction::Select, AuditAction::Update],
        column: None,
        condition: None,
        granularity: AuditGranularity::Coarse,
    })
    .await
    .unwrap();

    let policies = eng.list_audit_policies().await.unwrap();
    assert_eq!(policies.len(), 1);
    assert!(!policies[0].enabled);

    eng.enable_audit_policy("proj_audit").await.unwrap();
    assert!(eng.list_audit_policies().await.unwrap()[0].enabled);

    eng.disable_audit_policy("proj_audit").await.unwrap();
    eng.drop_audit_policy("proj_audit").await.unwrap();
    assert!(eng.list_audit_policies().await.unwrap().is_empty());
}

#[tokio::test]
async fn coarse_policy_rejects_fine_grained_fields() {
    let eng = engine(MemoryBackend::new());
    let err = eng
        .create_audit_policy(&AuditPolicyCreate {
            name: "bad_policy".to_string(),
            object: "projects".to_string(),
            actions: vec![AuditAction::Select],
            column: Some("budget".to_string()),
            condition: None,
            granularity: AuditGranularity::Coarse,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidLiteral(_)));
}

#[tokio::test]
async fn redaction_policy_round_trip() {
    let eng = engine(MemoryBackend::new());
    eng.add_redaction_policy(&RedactionPolicyCreate {
        name: "mask_budget".to_string(),
        object: "projects".to_string(),
        column: "budget".to_string(),
        function: MaskingFunction::Full,
        predicate: PredicateRequest::ContextEquals {
            key: "dept".to_string(),
            value: "hr".to_string(),
        },
    })
    .await
    .unwrap();

    let policies = eng.list_redaction_policies().await.unwrap();
    assert_eq!(policies.len(), 1);
    assert_eq!(policies[0].column, "BUDGET");
    assert_eq!(policies[0].function_code, 1);
    assert!(policies[0].predicate.contains("ROWGUARD_CTX"));

    eng.drop_redaction_policy("mask_budget", "projects")
        .await
        .unwrap();
    assert!(eng.list_redaction_policies().await.unwrap().is_empty());
}

#[tokio::test]
async fn context_leak_on_release_retries_once_and_succeeds() {
    let backend = MemoryBackend::new();
    let eng = engine(backend.clone());
    eng.create_principal(&user("steady1")).await.unwrap();

    backend.fail_next_context_clear();
    let principals = eng.list_principals().await.unwrap();
    assert_eq!(principals.len(), 1);

    let stats = eng.pool_stats();
    assert_eq!(stats.discarded, 1, "the tainted connection was discarded");
    assert!(stats.created >= 2, "the retry ran on a fresh connection");
}

#[tokio::test]
async fn context_leak_without_retry_surfaces_the_error() {
    let backend = MemoryBackend::new();
    let eng = SecurityEngine::new(
        backend.clone(),
        EngineConfig::new().with_leak_retry(false),
    );

    backend.fail_next_context_clear();
    let err = eng.list_principals().await.unwrap_err();
    assert!(matches!(err, Error::ContextLeakRisk));
}

#[tokio::test]
async fn bootstrap_reports_catalog_counts() {
    let eng = engine(MemoryBackend::new());
    eng.create_principal(&user("count_me")).await.unwrap();
    eng.create_role("count_role", None).await.unwrap();
    eng.grant(
        "count_me",
        &GrantRequest::System(SystemPrivilege::CreateSession),
        false,
    )
    .await
    .unwrap();

    let snapshot = eng.bootstrap().await.unwrap();
    assert_eq!(snapshot.principals, 1);
    assert_eq!(snapshot.roles, 1);
    assert_eq!(snapshot.grants, 1);
    // the seeded DEFAULT profile
    assert_eq!(snapshot.profiles, 1);
}

#[tokio::test]
async fn alter_profile_merges_limits() {
    let eng = engine(MemoryBackend::new());
    eng.create_profile(
        "ops",
        &ProfileLimits {
            sessions_per_user: ProfileLimit::Value(5),
            idle_time: ProfileLimit::Value(30),
            ..ProfileLimits::default()
        },
    )
    .await
    .unwrap();

    eng.alter_profile(
        "ops",
        &rowguard_core::statement::ProfileLimitsUpdate {
            idle_time: Some(ProfileLimit::Unlimited),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let profile = eng.get_profile("ops").await.unwrap().unwrap();
    assert_eq!(profile.limits.sessions_per_user, ProfileLimit::Value(5));
    assert_eq!(profile.limits.idle_time, ProfileLimit::Unlimited);
}
