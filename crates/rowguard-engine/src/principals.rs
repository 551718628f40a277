//! Principal verbs.

use rowguard_core::model::PrincipalRecord;
use rowguard_core::statement::{
    self, AccountAction, DropBehavior, PrincipalAlter, PrincipalSpec, Quota, QuotaClause,
};
use rowguard_core::{Error, Result};
use rowguard_pool::AdminBackend;

use crate::engine::{combine, leak_retry, SecurityEngine};

/// Raw inputs for creating a principal. Every field is re-validated by the
/// engine before any statement is rendered.
#[derive(Debug, Clone)]
pub struct PrincipalCreate {
    /// Account name.
    pub username: String,
    /// Initial password.
    pub password: String,
    /// Default tablespace.
    pub default_tablespace: String,
    /// Temporary tablespace.
    pub temporary_tablespace: Option<String>,
    /// Quota on the default tablespace.
    pub quota: Option<Quota>,
    /// Assigned profile.
    pub profile: Option<String>,
}

/// Raw inputs for altering a principal.
#[derive(Debug, Clone, Default)]
pub struct PrincipalUpdate {
    /// New password.
    pub password: Option<String>,
    /// New default tablespace.
    pub default_tablespace: Option<String>,
    /// New temporary tablespace.
    pub temporary_tablespace: Option<String>,
    /// New quota, with the tablespace it applies to.
    pub quota: Option<(Quota, String)>,
    /// New profile.
    pub profile: Option<String>,
}

impl<B: AdminBackend> SecurityEngine<B> {
    /// Create a principal.
    pub async fn create_principal(&self, request: &PrincipalCreate) -> Result<()> {
        let v = self.validator();
        let name = v.validate_identifier(&request.username)?;
        let password = v.validate_secret_literal(&request.password)?;
        let default_tablespace = v.validate_identifier(&request.default_tablespace)?;
        let temporary_tablespace = request
            .temporary_tablespace
            .as_deref()
            .map(|t| v.validate_identifier(t))
            .transpose()?;
        if temporary_tablespace.as_ref() == Some(&default_tablespace) {
            return Err(Error::InvalidIdentifier(
                "default and temporary tablespaces must differ".to_string(),
            ));
        }
        let profile = request
            .profile
            .as_deref()
            .map(|p| v.validate_identifier(p))
            .transpose()?;

        let stmt = statement::create_principal(&PrincipalSpec {
            name: name.clone(),
            password,
            default_tablespace,
            temporary_tablespace,
            quota: request.quota,
            profile,
        });
        self.execute_admin(&stmt).await?;
        tracing::info!(principal = %name, "principal created");
        Ok(())
    }

    /// Alter a principal. A fully empty update is a no-op success.
    pub async fn alter_principal(&self, username: &str, update: &PrincipalUpdate) -> Result<()> {
        let v = self.validator();
        let name = v.validate_identifier(username)?;
        let alter = PrincipalAlter {
            password: update
                .password
                .as_deref()
                .map(|p| v.validate_secret_literal(p))
                .transpose()?,
            default_tablespace: update
                .default_tablespace
                .as_deref()
                .map(|t| v.validate_identifier(t))
                .transpose()?,
            temporary_tablespace: update
                .temporary_tablespace
                .as_deref()
                .map(|t| v.validate_identifier(t))
                .transpose()?,
            quota: update
                .quota
                .as_ref()
                .map(|(quota, tablespace)| {
                    Ok::<_, Error>(QuotaClause {
                        quota: *quota,
                        tablespace: v.validate_identifier(tablespace)?,
                    })
                })
                .transpose()?,
            profile: update
                .profile
                .as_deref()
                .map(|p| v.validate_identifier(p))
                .transpose()?,
        };
        match statement::alter_principal(&name, &alter) {
            Some(stmt) => {
                self.execute_admin(&stmt).await?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Lock a principal's account.
    pub async fn lock_principal(&self, username: &str) -> Result<()> {
        let name = self.validator().validate_identifier(username)?;
        self.execute_admin(&statement::account_action(&name, AccountAction::Lock))
            .await?;
        tracing::info!(principal = %name, "account locked");
        Ok(())
    }

    /// Unlock a principal's account.
    pub async fn unlock_principal(&self, username: &str) -> Result<()> {
        let name = self.validator().validate_identifier(username)?;
        self.execute_admin(&statement::account_action(&name, AccountAction::Unlock))
            .await?;
        tracing::info!(principal = %name, "account unlocked");
        Ok(())
    }

    /// Force a password change at the next login.
    pub async fn expire_password(&self, username: &str) -> Result<()> {
        let name = self.validator().validate_identifier(username)?;
        self.execute_admin(&statement::expire_password(&name)).await?;
        Ok(())
    }

    /// Drop a principal. Ownership cascades are the database's own
    /// semantics; `Restrict` lets it reject when owned objects exist.
    pub async fn drop_principal(&self, username: &str, behavior: DropBehavior) -> Result<()> {
        let name = self.validator().validate_identifier(username)?;
        self.execute_admin(&statement::drop_principal(&name, behavior))
            .await?;
        tracing::info!(principal = %name, "principal dropped");
        Ok(())
    }

    /// Read one principal from the catalog.
    pub async fn get_principal(&self, username: &str) -> Result<Option<PrincipalRecord>> {
        let name = self.validator().validate_identifier(username)?;
        leak_retry!(self, self.get_principal_once(name.as_str()))
    }

    async fn get_principal_once(&self, name: &str) -> Result<Option<PrincipalRecord>> {
        let mut lease = self.admin_lease().await?;
        let fetched = self.timed(lease.fetch_principal(name)).await;
        let released = self.release(lease).await;
        combine(fetched, released)
    }

    /// List every principal in the catalog.
    pub async fn list_principals(&self) -> Result<Vec<PrincipalRecord>> {
        leak_retry!(self, self.list_principals_once())
    }

    async fn list_principals_once(&self) -> Result<Vec<PrincipalRecord>> {
        let mut lease = self.admin_lease().await?;
        let fetched = self.timed(lease.fetch_principals()).await;
        let released = self.release(lease).await;
        combine(fetched, released)
    }
}
