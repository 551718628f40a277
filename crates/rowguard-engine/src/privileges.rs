//! Privilege grant and revoke, idempotent in both directions.

use rowguard_core::model::{GrantOutcome, GrantRecord, GrantSource, RevokeOutcome};
use rowguard_core::statement::{self, Grantable, ObjectPrivilege, SystemPrivilege};
use rowguard_core::Result;
use rowguard_pool::AdminBackend;

use crate::engine::{combine, leak_retry, SecurityEngine};

/// Raw grant target, validated by the engine into a [`Grantable`].
#[derive(Debug, Clone)]
pub enum GrantRequest {
    /// A system privilege.
    System(SystemPrivilege),
    /// An object privilege on a named object.
    Object {
        /// The privilege kind.
        privilege: ObjectPrivilege,
        /// The target object name.
        object: String,
    },
    /// A role by name.
    Role(String),
}

impl<B: AdminBackend> SecurityEngine<B> {
    fn to_grantable(&self, request: &GrantRequest) -> Result<Grantable> {
        let v = self.validator();
        Ok(match request {
            GrantRequest::System(privilege) => Grantable::System(*privilege),
            GrantRequest::Object { privilege, object } => Grantable::Object {
                privilege: *privilege,
                object: v.validate_identifier(object)?,
            },
            GrantRequest::Role(role) => Grantable::Role(v.validate_identifier(role)?),
        })
    }

    /// Grant a privilege or role.
    ///
    /// Granting something the grantee already holds directly is a no-op
    /// success reported as [`GrantOutcome::AlreadyGranted`]; nothing is
    /// sent downstream in that case.
    pub async fn grant(
        &self,
        grantee: &str,
        request: &GrantRequest,
        admin_option: bool,
    ) -> Result<GrantOutcome> {
        let grantee = self.validator().validate_identifier(grantee)?;
        let grantable = self.to_grantable(request)?;
        let outcome = leak_retry!(self, self.grant_once(&grantee, &grantable, admin_option))?;
        match outcome {
            GrantOutcome::Granted => {
                tracing::info!(grantee = %grantee, privilege = %grantable.render(), "privilege granted");
            }
            GrantOutcome::AlreadyGranted => {
                tracing::debug!(grantee = %grantee, privilege = %grantable.render(), "grant already held");
            }
        }
        Ok(outcome)
    }

    async fn grant_once(
        &self,
        grantee: &rowguard_core::SafeIdentifier,
        grantable: &Grantable,
        admin_option: bool,
    ) -> Result<GrantOutcome> {
        let mut lease = self.admin_lease().await?;
        let executed = self
            .timed(async {
                let held = lease.fetch_grants(grantee.as_str()).await?;
                if held
                    .iter()
                    .any(|g| g.source == GrantSource::Direct && grantable.matches(g))
                {
                    return Ok(GrantOutcome::AlreadyGranted);
                }
                lease
                    .execute(&statement::grant(grantable, grantee, admin_option))
                    .await?;
                Ok(GrantOutcome::Granted)
            })
            .await;
        let released = self.release(lease).await;
        combine(executed, released)
    }

    /// Revoke a privilege or role.
    ///
    /// Revoking something the grantee does not hold directly is a no-op
    /// success reported as [`RevokeOutcome::NotHeld`].
    pub async fn revoke(&self, grantee: &str, request: &GrantRequest) -> Result<RevokeOutcome> {
        let grantee = self.validator().validate_identifier(grantee)?;
        let grantable = self.to_grantable(request)?;
        let outcome = leak_retry!(self, self.revoke_once(&grantee, &grantable))?;
        if outcome == RevokeOutcome::Revoked {
            tracing::info!(grantee = %grantee, privilege = %grantable.render(), "privilege revoked");
        }
        Ok(outcome)
    }

    async fn revoke_once(
        &self,
        grantee: &rowguard_core::SafeIdentifier,
        grantable: &Grantable,
    ) -> Result<RevokeOutcome> {
        let mut lease = self.admin_lease().await?;
        let executed = self
            .timed(async {
                let held = lease.fetch_grants(grantee.as_str()).await?;
                if !held
                    .iter()
                    .any(|g| g.source == GrantSource::Direct && grantable.matches(g))
                {
                    return Ok(RevokeOutcome::NotHeld);
                }
                lease.execute(&statement::revoke(grantable, grantee)).await?;
                Ok(RevokeOutcome::Revoked)
            })
            .await;
        let released = self.release(lease).await;
        combine(executed, released)
    }

    /// List the grants a grantee holds, direct and role-inherited.
    pub async fn list_grants(&self, grantee: &str) -> Result<Vec<GrantRecord>> {
        let grantee = self.validator().validate_identifier(grantee)?;
        leak_retry!(self, self.list_grants_once(grantee.as_str()))
    }

    async fn list_grants_once(&self, grantee: &str) -> Result<Vec<GrantRecord>> {
        let mut lease = self.admin_lease().await?;
        let fetched = self.timed(lease.fetch_grants(grantee)).await;
        let released = self.release(lease).await;
        combine(fetched, released)
    }
}
