//! Lease lifecycle tests: context isolation across callers, the
//! fail-closed discard policy, and pool exhaustion.

use std::time::Duration;

use rowguard_core::model::CallerIdentity;
use rowguard_core::statement::{self, PrincipalSpec};
use rowguard_core::{Error, ValidatorConfig};
use rowguard_pool::{LeaseManager, MemoryBackend, PoolConfig};

fn small_pool(backend: MemoryBackend, size: usize) -> LeaseManager<MemoryBackend> {
    LeaseManager::new(
        backend,
        PoolConfig::new()
            .with_max_connections(size)
            .with_acquire_timeout(Duration::from_millis(200))
            .with_context_clear_timeout(Duration::from_millis(200)),
    )
}

fn create_user_stmt(name: &str) -> rowguard_core::Statement {
    let v = ValidatorConfig::default();
    statement::create_principal(&PrincipalSpec {
        name: v.validate_identifier(name).unwrap(),
        password: v.validate_secret_literal("pw12345").unwrap(),
        default_tablespace: v.validate_identifier("users").unwrap(),
        temporary_tablespace: None,
        quota: None,
        profile: None,
    })
}

#[tokio::test]
async fn context_is_set_before_any_statement_executes() {
    let backend = MemoryBackend::new();
    let pool = small_pool(backend.clone(), 1);

    let mut lease = pool.acquire(CallerIdentity::caller("HR_USER")).await.unwrap();
    lease.execute(&create_user_stmt("u_hr")).await.unwrap();
    pool.release(lease).await.unwrap();

    // Same physical slot, different caller: the second lease's context-set
    // must land before its statement runs.
    let mut lease = pool.acquire(CallerIdentity::caller("IT_USER")).await.unwrap();
    lease.execute(&create_user_stmt("u_it")).await.unwrap();
    pool.release(lease).await.unwrap();

    let executions = backend.executions();
    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0].context.as_deref(), Some("HR_USER"));
    assert_eq!(executions[1].context.as_deref(), Some("IT_USER"));
    // one physical connection served both callers
    assert_eq!(executions[0].conn_id, executions[1].conn_id);
}

#[tokio::test]
async fn released_lease_leaves_no_context_behind() {
    let backend = MemoryBackend::new();
    let pool = small_pool(backend.clone(), 1);

    let lease = pool.acquire(CallerIdentity::caller("HR_USER")).await.unwrap();
    let slot = lease.slot_id();
    pool.release(lease).await.unwrap();

    assert_eq!(backend.current_context(slot), None);
    // the history proves the context existed while leased
    assert_eq!(backend.last_context(slot).as_deref(), Some("HR_USER"));
}

#[tokio::test]
async fn failed_context_clear_discards_the_connection() {
    let backend = MemoryBackend::new();
    let pool = small_pool(backend.clone(), 1);

    let lease = pool.acquire(CallerIdentity::caller("HR_USER")).await.unwrap();
    let tainted_slot = lease.slot_id();

    backend.fail_next_context_clear();
    let err = pool.release(lease).await.unwrap_err();
    assert!(matches!(err, Error::ContextLeakRisk));

    let stats = pool.stats();
    assert_eq!(stats.discarded, 1);
    assert_eq!(pool.idle_connections().await, 0);

    // the next acquire opens a replacement rather than reusing the
    // tainted connection
    let lease = pool.acquire(CallerIdentity::caller("IT_USER")).await.unwrap();
    assert_ne!(lease.slot_id(), tainted_slot);
    assert_eq!(pool.stats().created, 2);
    pool.release(lease).await.unwrap();
}

#[tokio::test]
async fn dropped_lease_is_discarded_not_reused() {
    let backend = MemoryBackend::new();
    let pool = small_pool(backend.clone(), 1);

    let lease = pool.acquire(CallerIdentity::caller("HR_USER")).await.unwrap();
    let abandoned_slot = lease.slot_id();
    drop(lease);

    assert_eq!(pool.stats().discarded, 1);
    assert_eq!(pool.idle_connections().await, 0);

    let lease = pool.acquire(CallerIdentity::caller("IT_USER")).await.unwrap();
    assert_ne!(lease.slot_id(), abandoned_slot);
    pool.release(lease).await.unwrap();
}

#[tokio::test]
async fn acquire_times_out_with_pool_exhausted() {
    let backend = MemoryBackend::new();
    let pool = small_pool(backend, 1);

    let held = pool.acquire(CallerIdentity::caller("HR_USER")).await.unwrap();

    let err = pool
        .acquire(CallerIdentity::caller("IT_USER"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PoolExhausted { .. }));

    pool.release(held).await.unwrap();

    // capacity is back once the first lease is released
    let lease = pool.acquire(CallerIdentity::caller("IT_USER")).await.unwrap();
    pool.release(lease).await.unwrap();
}

#[tokio::test]
async fn concurrent_callers_never_observe_foreign_context() {
    let backend = MemoryBackend::new();
    let pool = small_pool(backend.clone(), 2);

    let mut handles = Vec::new();
    for (caller, user) in [
        ("HR_USER", "acct_hr1"),
        ("IT_USER", "acct_it1"),
        ("FIN_USER", "acct_fin1"),
        ("OPS_USER", "acct_ops1"),
    ] {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let mut lease = pool.acquire(CallerIdentity::caller(caller)).await.unwrap();
            lease.execute(&create_user_stmt(user)).await.unwrap();
            pool.release(lease).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // every statement executed under exactly the context of the caller
    // that issued it
    for record in backend.executions() {
        let context = record.context.expect("context present during execution");
        let expected_user = match context.as_str() {
            "HR_USER" => "ACCT_HR1",
            "IT_USER" => "ACCT_IT1",
            "FIN_USER" => "ACCT_FIN1",
            "OPS_USER" => "ACCT_OPS1",
            other => panic!("unexpected context {}", other),
        };
        assert!(
            record.text.contains(expected_user),
            "statement {:?} ran under context {}",
            record.text,
            context
        );
    }
}

#[tokio::test]
async fn recycled_connections_are_reused_when_clean() {
    let backend = MemoryBackend::new();
    let pool = small_pool(backend, 1);

    for caller in ["A_USER", "B_USER", "C_USER"] {
        let lease = pool.acquire(CallerIdentity::caller(caller)).await.unwrap();
        pool.release(lease).await.unwrap();
    }

    let stats = pool.stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.recycled, 3);
    assert_eq!(stats.discarded, 0);
}
