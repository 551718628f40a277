//! Profile verbs, including the referential drop guard.

use rowguard_core::model::{ProfileRecord, SecurityObjectKind};
use rowguard_core::statement::{
    self, DropBehavior, PrincipalAlter, ProfileLimits, ProfileLimitsUpdate,
};
use rowguard_core::{Error, Result};
use rowguard_pool::AdminBackend;

use crate::engine::{combine, leak_retry, SecurityEngine};

impl<B: AdminBackend> SecurityEngine<B> {
    /// Create a profile with the given limit bundle.
    pub async fn create_profile(&self, name: &str, limits: &ProfileLimits) -> Result<()> {
        let name = self.validator().validate_identifier(name)?;
        self.execute_admin(&statement::create_profile(&name, limits))
            .await?;
        tracing::info!(profile = %name, "profile created");
        Ok(())
    }

    /// Alter a profile's limits. An empty update is a no-op success.
    pub async fn alter_profile(&self, name: &str, update: &ProfileLimitsUpdate) -> Result<()> {
        let name = self.validator().validate_identifier(name)?;
        match statement::alter_profile(&name, update) {
            Some(stmt) => {
                self.execute_admin(&stmt).await?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Drop a profile.
    ///
    /// With `Restrict`, a profile still assigned to principals fails with
    /// `ObjectInUse`. With `Cascade`, dependents are first reassigned to
    /// the configured default profile, then the profile is dropped —
    /// nothing falls back silently.
    pub async fn drop_profile(&self, name: &str, behavior: DropBehavior) -> Result<()> {
        let name = self.validator().validate_identifier(name)?;
        let fallback = self
            .validator()
            .validate_identifier(&self.config().default_profile)?;
        leak_retry!(self, self.drop_profile_once(&name, behavior, &fallback))?;
        tracing::info!(profile = %name, "profile dropped");
        Ok(())
    }

    async fn drop_profile_once(
        &self,
        name: &rowguard_core::SafeIdentifier,
        behavior: DropBehavior,
        fallback: &rowguard_core::SafeIdentifier,
    ) -> Result<()> {
        let mut lease = self.admin_lease().await?;
        let executed = self
            .timed(async {
                let dependents = lease.fetch_profile_dependents(name.as_str()).await?;
                if !dependents.is_empty() {
                    if behavior == DropBehavior::Restrict {
                        return Err(Error::ObjectInUse {
                            kind: SecurityObjectKind::Profile,
                            name: name.as_str().to_string(),
                            dependents: dependents.len(),
                        });
                    }
                    for dependent in &dependents {
                        let dependent = self.validator().validate_identifier(dependent)?;
                        let reassign = PrincipalAlter {
                            profile: Some(fallback.clone()),
                            ..PrincipalAlter::default()
                        };
                        if let Some(stmt) = statement::alter_principal(&dependent, &reassign) {
                            lease.execute(&stmt).await?;
                        }
                    }
                    tracing::info!(
                        profile = %name,
                        dependents = dependents.len(),
                        fallback = %fallback,
                        "dependents reassigned before profile drop"
                    );
                }
                lease
                    .execute(&statement::drop_profile(name, DropBehavior::Restrict))
                    .await?;
                Ok(())
            })
            .await;
        let released = self.release(lease).await;
        combine(executed, released)
    }

    /// Read one profile from the catalog.
    pub async fn get_profile(&self, name: &str) -> Result<Option<ProfileRecord>> {
        let name = self.validator().validate_identifier(name)?;
        let profiles = self.list_profiles().await?;
        Ok(profiles.into_iter().find(|p| p.name == name.as_str()))
    }

    /// List every profile with its dependent count.
    pub async fn list_profiles(&self) -> Result<Vec<ProfileRecord>> {
        leak_retry!(self, self.list_profiles_once())
    }

    async fn list_profiles_once(&self) -> Result<Vec<ProfileRecord>> {
        let mut lease = self.admin_lease().await?;
        let fetched = self.timed(lease.fetch_profiles()).await;
        let released = self.release(lease).await;
        combine(fetched, released)
    }

    /// List the principals assigned to a profile.
    pub async fn list_profile_dependents(&self, name: &str) -> Result<Vec<String>> {
        let name = self.validator().validate_identifier(name)?;
        leak_retry!(self, self.list_profile_dependents_once(name.as_str()))
    }

    async fn list_profile_dependents_once(&self, name: &str) -> Result<Vec<String>> {
        let mut lease = self.admin_lease().await?;
        let fetched = self.timed(lease.fetch_profile_dependents(name)).await;
        let released = self.release(lease).await;
        combine(fetched, released)
    }
}
