//! Role verbs, including the referential drop guard.

use rowguard_core::model::{RoleRecord, SecurityObjectKind};
use rowguard_core::statement::{self, DropBehavior, Grantable, RoleAuth};
use rowguard_core::{Error, Result};
use rowguard_pool::AdminBackend;

use crate::engine::{combine, leak_retry, SecurityEngine};

impl<B: AdminBackend> SecurityEngine<B> {
    /// Create a role, password-protected when a password is given.
    pub async fn create_role(&self, name: &str, password: Option<&str>) -> Result<()> {
        let v = self.validator();
        let name = v.validate_identifier(name)?;
        let auth = match password {
            Some(pw) => RoleAuth::Password(v.validate_secret_literal(pw)?),
            None => RoleAuth::NotIdentified,
        };
        self.execute_admin(&statement::create_role(&name, &auth)).await?;
        tracing::info!(role = %name, "role created");
        Ok(())
    }

    /// Change a role's authentication. `None` removes the password.
    pub async fn alter_role(&self, name: &str, password: Option<&str>) -> Result<()> {
        let v = self.validator();
        let name = v.validate_identifier(name)?;
        let auth = match password {
            Some(pw) => RoleAuth::Password(v.validate_secret_literal(pw)?),
            None => RoleAuth::NotIdentified,
        };
        self.execute_admin(&statement::alter_role(&name, &auth)).await?;
        Ok(())
    }

    /// Drop a role.
    ///
    /// With `Restrict`, a role still granted to anyone fails with
    /// `ObjectInUse`. With `Cascade`, it is revoked from every grantee
    /// first.
    pub async fn drop_role(&self, name: &str, behavior: DropBehavior) -> Result<()> {
        let name = self.validator().validate_identifier(name)?;
        leak_retry!(self, self.drop_role_once(&name, behavior))?;
        tracing::info!(role = %name, "role dropped");
        Ok(())
    }

    async fn drop_role_once(
        &self,
        name: &rowguard_core::SafeIdentifier,
        behavior: DropBehavior,
    ) -> Result<()> {
        let mut lease = self.admin_lease().await?;
        let executed = self
            .timed(async {
                let grantees = lease.fetch_role_grantees(name.as_str()).await?;
                if !grantees.is_empty() {
                    if behavior == DropBehavior::Restrict {
                        return Err(Error::ObjectInUse {
                            kind: SecurityObjectKind::Role,
                            name: name.as_str().to_string(),
                            dependents: grantees.len(),
                        });
                    }
                    for grantee in &grantees {
                        let grantee = self.validator().validate_identifier(grantee)?;
                        lease
                            .execute(&statement::revoke(
                                &Grantable::Role(name.clone()),
                                &grantee,
                            ))
                            .await?;
                    }
                }
                lease.execute(&statement::drop_role(name)).await?;
                Ok(())
            })
            .await;
        let released = self.release(lease).await;
        combine(executed, released)
    }

    /// Read one role from the catalog.
    pub async fn get_role(&self, name: &str) -> Result<Option<RoleRecord>> {
        let name = self.validator().validate_identifier(name)?;
        let roles = self.list_roles().await?;
        Ok(roles.into_iter().find(|r| r.name == name.as_str()))
    }

    /// List every role with its grantee count.
    pub async fn list_roles(&self) -> Result<Vec<RoleRecord>> {
        leak_retry!(self, self.list_roles_once())
    }

    async fn list_roles_once(&self) -> Result<Vec<RoleRecord>> {
        let mut lease = self.admin_lease().await?;
        let fetched = self.timed(lease.fetch_roles()).await;
        let released = self.release(lease).await;
        combine(fetched, released)
    }
}
