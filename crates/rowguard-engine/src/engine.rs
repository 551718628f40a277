//! The orchestration engine core.
//!
//! Every verb follows the same shape: re-validate inputs, render the
//! statement, acquire a lease under the elevated administrative identity,
//! execute, release. The release path runs on every exit; when it reports
//! a context-leak discard, the logical operation is retried at most once
//! on a fresh lease. The discarded connection itself is never retried.

use std::future::Future;

use tokio::time::timeout;

use rowguard_core::model::{CallerIdentity, CatalogSnapshot};
use rowguard_core::statement::Statement;
use rowguard_core::{Error, Result, ValidatorConfig};
use rowguard_pool::{AdminBackend, LeaseManager, PoolStatsSnapshot};

use crate::config::EngineConfig;

/// Retry a one-lease operation once when release reported a context-leak
/// discard. `$attempt` must be an expression producing a fresh future, so
/// the retry runs on a fresh lease.
macro_rules! leak_retry {
    ($engine:expr, $attempt:expr) => {{
        match $attempt.await {
            Err(rowguard_core::Error::ContextLeakRisk)
                if $engine.config().retry_on_context_leak =>
            {
                tracing::warn!("context-leak discard; retrying once on a fresh lease");
                $attempt.await
            }
            other => other,
        }
    }};
}
pub(crate) use leak_retry;

/// Fold an operation result with its release result. The statement's own
/// failure is the primary diagnosis; a clean execution followed by an
/// unprovable context clear is reported as the release failure.
pub(crate) fn combine<T>(executed: Result<T>, released: Result<()>) -> Result<T> {
    match (executed, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => Err(e),
    }
}

/// Administers security objects through validated statements executed on
/// leased connections.
pub struct SecurityEngine<B: AdminBackend> {
    pool: LeaseManager<B>,
    config: EngineConfig,
    admin: CallerIdentity,
}

impl<B: AdminBackend> SecurityEngine<B> {
    /// Create an engine over the given backend.
    pub fn new(backend: B, config: EngineConfig) -> Self {
        let pool = LeaseManager::new(backend, config.pool.clone());
        let admin = CallerIdentity::administrator(config.admin_identity.clone());
        Self {
            pool,
            config,
            admin,
        }
    }

    /// The validator this engine re-validates every input with.
    pub fn validator(&self) -> &ValidatorConfig {
        &self.config.validator
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The lease manager, for data-path callers that need row-filtered
    /// leases under their own identity.
    pub fn pool(&self) -> &LeaseManager<B> {
        &self.pool
    }

    /// Current pool counters.
    pub fn pool_stats(&self) -> PoolStatsSnapshot {
        self.pool.stats()
    }

    /// Acquire a lease under the administrative identity.
    pub(crate) async fn admin_lease(&self) -> Result<rowguard_pool::Lease<B>> {
        self.pool.acquire(self.admin.clone()).await
    }

    /// Release a lease back to the pool.
    pub(crate) async fn release(&self, lease: rowguard_pool::Lease<B>) -> Result<()> {
        self.pool.release(lease).await
    }

    /// Bound a database call by the configured operation timeout.
    pub(crate) async fn timed<T, Fut>(&self, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let ceiling = self.config.operation_timeout;
        match timeout(ceiling, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::OperationTimeout {
                elapsed_ms: ceiling.as_millis() as u64,
            }),
        }
    }

    /// Execute one built statement on an administrative lease.
    pub(crate) async fn execute_admin(&self, statement: &Statement) -> Result<u64> {
        leak_retry!(self, self.execute_admin_once(statement))
    }

    async fn execute_admin_once(&self, statement: &Statement) -> Result<u64> {
        let mut lease = self.admin_lease().await?;
        let executed = self.timed(lease.execute(statement)).await;
        let released = self.release(lease).await;
        combine(executed, released)
    }

    /// Reconcile against the catalog views and report what exists.
    pub async fn bootstrap(&self) -> Result<CatalogSnapshot> {
        let snapshot = leak_retry!(self, self.bootstrap_once())?;
        tracing::info!(
            principals = snapshot.principals,
            profiles = snapshot.profiles,
            roles = snapshot.roles,
            grants = snapshot.grants,
            audit_policies = snapshot.audit_policies,
            redaction_policies = snapshot.redaction_policies,
            bindings = snapshot.row_filter_bindings,
            "catalog reconciled"
        );
        Ok(snapshot)
    }

    async fn bootstrap_once(&self) -> Result<CatalogSnapshot> {
        let mut lease = self.admin_lease().await?;
        let gathered = self
            .timed(async {
                let principals = lease.fetch_principals().await?;
                let profiles = lease.fetch_profiles().await?;
                let roles = lease.fetch_roles().await?;
                let audit_policies = lease.fetch_audit_policies().await?;
                let redaction_policies = lease.fetch_redaction_policies().await?;
                let bindings = lease.fetch_row_filter_bindings().await?;

                let grantees: Vec<String> = principals
                    .iter()
                    .map(|p| p.name.clone())
                    .chain(roles.iter().map(|r| r.name.clone()))
                    .collect();
                let mut grants = 0usize;
                for name in &grantees {
                    grants += lease
                        .fetch_grants(name)
                        .await?
                        .iter()
                        .filter(|g| g.source == rowguard_core::GrantSource::Direct)
                        .count();
                }

                Ok(CatalogSnapshot {
                    principals: principals.len(),
                    profiles: profiles.len(),
                    roles: roles.len(),
                    grants,
                    audit_policies: audit_policies.len(),
                    redaction_policies: redaction_policies.len(),
                    row_filter_bindings: bindings.len(),
                })
            })
            .await;
        let released = self.release(lease).await;
        combine(gathered, released)
    }
}
