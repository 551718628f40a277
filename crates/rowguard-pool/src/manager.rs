//! Connection lease management.
//!
//! Each physical connection moves through
//! `Idle → Leased → ContextSet → InUse → ContextClearing → Idle`. The
//! caller's identity is bound into the session context before a lease is
//! handed out, and the context is cleared before the connection re-enters
//! the free list. A connection whose clear fails — or whose lease is
//! dropped without going through [`LeaseManager::release`] — is discarded,
//! never reused: the pool opens a replacement on the next acquire instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use rowguard_core::model::CallerIdentity;
use rowguard_core::statement::{ExecutionMode, Statement};
use rowguard_core::{Error, Result};

use crate::backend::{AdminBackend, SessionConnection};

/// Pool sizing and timeout configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of physical connections.
    pub max_connections: usize,
    /// How long an acquire may wait for a connection.
    pub acquire_timeout: Duration,
    /// How long a context clear may take before the connection is
    /// considered unprovable and discarded.
    pub context_clear_timeout: Duration,
}

impl PoolConfig {
    /// Create a configuration with the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of physical connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the context-clear timeout.
    pub fn with_context_clear_timeout(mut self, timeout: Duration) -> Self {
        self.context_clear_timeout = timeout;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            context_clear_timeout: Duration::from_secs(5),
        }
    }
}

/// Lifetime counters for pool observability.
#[derive(Debug, Default)]
pub struct PoolStats {
    created: AtomicU64,
    recycled: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time view of [`PoolStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    /// Physical connections opened.
    pub created: u64,
    /// Successful clear-and-return cycles.
    pub recycled: u64,
    /// Connections discarded instead of reused.
    pub discarded: u64,
}

impl PoolStats {
    fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            created: self.created.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Lease progress through the per-connection state machine. `Idle` is the
/// pool's own state and never appears on a live lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    /// Physical connection assigned, context not yet bound.
    Leased,
    /// Caller identity bound into the session context.
    ContextSet,
    /// A statement has executed on the lease.
    InUse,
    /// Release in progress.
    ContextClearing,
}

struct Slot<C> {
    id: u64,
    conn: C,
}

struct Inner<B: AdminBackend> {
    backend: B,
    config: PoolConfig,
    free: Mutex<Vec<Slot<B::Conn>>>,
    semaphore: Arc<Semaphore>,
    next_slot_id: AtomicU64,
    stats: PoolStats,
}

/// Owns the physical connections and enforces the context lifecycle on
/// every lease boundary.
pub struct LeaseManager<B: AdminBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: AdminBackend> Clone for LeaseManager<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: AdminBackend> LeaseManager<B> {
    /// Create a manager over the given backend. Connections are opened
    /// lazily, up to the configured bound.
    pub fn new(backend: B, config: PoolConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_connections));
        Self {
            inner: Arc::new(Inner {
                backend,
                config,
                free: Mutex::new(Vec::new()),
                semaphore,
                next_slot_id: AtomicU64::new(1),
                stats: PoolStats::default(),
            }),
        }
    }

    /// Acquire a lease running under the given identity.
    ///
    /// Blocks until a connection is available, bounded by the acquire
    /// timeout. The identity is bound into the session context before the
    /// lease is returned, so the first statement a caller executes already
    /// runs row-filtered.
    pub async fn acquire(&self, identity: CallerIdentity) -> Result<Lease<B>> {
        let waited = self.inner.config.acquire_timeout;
        let permit = timeout(waited, self.inner.semaphore.clone().acquire_owned())
            .await
            .map_err(|_| Error::PoolExhausted {
                waited_ms: waited.as_millis() as u64,
            })?
            .map_err(|_| Error::PoolExhausted {
                waited_ms: waited.as_millis() as u64,
            })?;

        let mut slot = match self.inner.free.lock().await.pop() {
            Some(slot) => slot,
            None => self.open_slot().await?,
        };

        tracing::trace!(slot = slot.id, identity = %identity, "connection leased");

        if let Err(e) = slot.conn.set_session_context(&identity).await {
            // Context state unknown; the connection must not re-enter the pool.
            self.inner.stats.discarded.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(slot = slot.id, error = %e, "context set failed; discarding connection");
            drop(slot);
            return Err(e.into());
        }

        Ok(Lease {
            slot: Some(slot),
            state: LeaseState::ContextSet,
            identity,
            _permit: permit,
            inner: self.inner.clone(),
        })
    }

    /// Clear the lease's session context and return its connection to the
    /// pool.
    ///
    /// Mandatory on every exit path. If the clear fails or times out the
    /// connection is discarded and `ContextLeakRisk` is returned; the pool
    /// opens a replacement on the next acquire.
    pub async fn release(&self, mut lease: Lease<B>) -> Result<()> {
        let mut slot = match lease.slot.take() {
            Some(slot) => slot,
            None => return Ok(()),
        };
        lease.state = LeaseState::ContextClearing;

        let cleared = timeout(
            self.inner.config.context_clear_timeout,
            slot.conn.clear_session_context(),
        )
        .await;

        match cleared {
            Ok(Ok(())) => {
                self.inner.stats.recycled.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(slot = slot.id, "context cleared; connection recycled");
                self.inner.free.lock().await.push(slot);
                Ok(())
            }
            Ok(Err(e)) => {
                self.inner.stats.discarded.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(slot = slot.id, error = %e, "context clear failed; discarding connection");
                drop(slot);
                Err(Error::ContextLeakRisk)
            }
            Err(_) => {
                self.inner.stats.discarded.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(slot = slot.id, "context clear timed out; discarding connection");
                drop(slot);
                Err(Error::ContextLeakRisk)
            }
        }
    }

    /// Current lifetime counters.
    pub fn stats(&self) -> PoolStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Number of idle connections currently pooled.
    pub async fn idle_connections(&self) -> usize {
        self.inner.free.lock().await.len()
    }

    async fn open_slot(&self) -> Result<Slot<B::Conn>> {
        let conn = self.inner.backend.connect().await?;
        let id = self.inner.next_slot_id.fetch_add(1, Ordering::Relaxed);
        self.inner.stats.created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(slot = id, "physical connection opened");
        Ok(Slot { id, conn })
    }
}

/// The exclusive right to one physical connection for one logical
/// operation.
///
/// Dropping a lease without releasing it (a cancelled caller, a panic
/// unwinding) discards the connection: its context was never proven clean,
/// so it must not be reused.
pub struct Lease<B: AdminBackend> {
    slot: Option<Slot<B::Conn>>,
    state: LeaseState,
    identity: CallerIdentity,
    _permit: OwnedSemaphorePermit,
    inner: Arc<Inner<B>>,
}

impl<B: AdminBackend> std::fmt::Debug for Lease<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("slot_id", &self.slot_id())
            .field("state", &self.state)
            .field("identity", &self.identity)
            .finish()
    }
}

impl<B: AdminBackend> Lease<B> {
    /// Identity this lease runs under.
    pub fn identity(&self) -> &CallerIdentity {
        &self.identity
    }

    /// Stable id of the underlying physical connection.
    pub fn slot_id(&self) -> u64 {
        self.slot.as_ref().map(|s| s.id).unwrap_or(0)
    }

    /// Current state-machine position.
    pub fn state(&self) -> LeaseState {
        self.state
    }

    fn conn(&mut self) -> &mut B::Conn {
        // release() consumes the lease, so the slot is present for the
        // whole lifetime of &mut self.
        &mut self
            .slot
            .as_mut()
            .expect("lease used after release")
            .conn
    }

    /// Execute a built statement, dispatching on its execution mode.
    pub async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        self.state = LeaseState::InUse;
        match statement.mode() {
            ExecutionMode::Ddl => {
                self.conn().execute_ddl(statement.text()).await?;
                Ok(0)
            }
            ExecutionMode::Dml => {
                let affected = self
                    .conn()
                    .execute_dml(statement.text(), statement.params())
                    .await?;
                Ok(affected)
            }
        }
    }

    /// Catalog view: all principals.
    pub async fn fetch_principals(&mut self) -> Result<Vec<rowguard_core::PrincipalRecord>> {
        self.state = LeaseState::InUse;
        Ok(self.conn().fetch_principals().await?)
    }

    /// Catalog view: one principal by name.
    pub async fn fetch_principal(
        &mut self,
        name: &str,
    ) -> Result<Option<rowguard_core::PrincipalRecord>> {
        self.state = LeaseState::InUse;
        Ok(self.conn().fetch_principal(name).await?)
    }

    /// Catalog view: all profiles.
    pub async fn fetch_profiles(&mut self) -> Result<Vec<rowguard_core::ProfileRecord>> {
        self.state = LeaseState::InUse;
        Ok(self.conn().fetch_profiles().await?)
    }

    /// Catalog view: principals assigned to a profile.
    pub async fn fetch_profile_dependents(&mut self, profile: &str) -> Result<Vec<String>> {
        self.state = LeaseState::InUse;
        Ok(self.conn().fetch_profile_dependents(profile).await?)
    }

    /// Catalog view: all roles.
    pub async fn fetch_roles(&mut self) -> Result<Vec<rowguard_core::RoleRecord>> {
        self.state = LeaseState::InUse;
        Ok(self.conn().fetch_roles().await?)
    }

    /// Catalog view: grantees holding a role.
    pub async fn fetch_role_grantees(&mut self, role: &str) -> Result<Vec<String>> {
        self.state = LeaseState::InUse;
        Ok(self.conn().fetch_role_grantees(role).await?)
    }

    /// Catalog view: grants held by a grantee.
    pub async fn fetch_grants(&mut self, grantee: &str) -> Result<Vec<rowguard_core::GrantRecord>> {
        self.state = LeaseState::InUse;
        Ok(self.conn().fetch_grants(grantee).await?)
    }

    /// Catalog view: all audit policies.
    pub async fn fetch_audit_policies(
        &mut self,
    ) -> Result<Vec<rowguard_core::AuditPolicyRecord>> {
        self.state = LeaseState::InUse;
        Ok(self.conn().fetch_audit_policies().await?)
    }

    /// Catalog view: all redaction policies.
    pub async fn fetch_redaction_policies(
        &mut self,
    ) -> Result<Vec<rowguard_core::RedactionPolicyRecord>> {
        self.state = LeaseState::InUse;
        Ok(self.conn().fetch_redaction_policies().await?)
    }

    /// Catalog view: all row-filter bindings.
    pub async fn fetch_row_filter_bindings(
        &mut self,
    ) -> Result<Vec<rowguard_core::RowFilterBindingRecord>> {
        self.state = LeaseState::InUse;
        Ok(self.conn().fetch_row_filter_bindings().await?)
    }

    /// Log source: coarse action log.
    pub async fn fetch_coarse_audit(
        &mut self,
        object: Option<&str>,
    ) -> Result<Vec<rowguard_core::CoarseAuditRecord>> {
        self.state = LeaseState::InUse;
        Ok(self.conn().fetch_coarse_audit(object).await?)
    }

    /// Log source: fine-grained column/condition log.
    pub async fn fetch_fine_audit(
        &mut self,
        object: Option<&str>,
    ) -> Result<Vec<rowguard_core::FineAuditRecord>> {
        self.state = LeaseState::InUse;
        Ok(self.conn().fetch_fine_audit(object).await?)
    }
}

impl<B: AdminBackend> Drop for Lease<B> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            // Cancellation or abandonment: context cannot be proven clean.
            self.inner.stats.discarded.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                slot = slot.id,
                identity = %self.identity,
                "lease dropped without release; discarding connection"
            );
            drop(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new()
            .with_max_connections(3)
            .with_acquire_timeout(Duration::from_millis(250))
            .with_context_clear_timeout(Duration::from_millis(100));
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.acquire_timeout, Duration::from_millis(250));
        assert_eq!(config.context_clear_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 10);
    }
}
