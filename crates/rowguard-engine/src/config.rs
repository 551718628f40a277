//! Engine configuration.

use std::time::Duration;

use rowguard_core::statement::DropBehavior;
use rowguard_core::ValidatorConfig;
use rowguard_pool::PoolConfig;

/// Configuration for [`crate::SecurityEngine`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Connection pool sizing and timeouts.
    pub pool: PoolConfig,
    /// Identifier/literal limits and the reserved-word denylist.
    pub validator: ValidatorConfig,
    /// The fixed elevated identity administrative statements run under.
    pub admin_identity: String,
    /// Profile dependents fall back to on a cascading profile drop.
    pub default_profile: String,
    /// Drop behavior applied when a front end does not pass one explicitly.
    pub default_drop_behavior: DropBehavior,
    /// Retry a logical operation once on a fresh lease after a
    /// context-leak discard.
    pub retry_on_context_leak: bool,
    /// Ceiling for a single database call.
    pub operation_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            validator: ValidatorConfig::default(),
            admin_identity: "SEC_ADMIN".to_string(),
            default_profile: "DEFAULT".to_string(),
            default_drop_behavior: DropBehavior::Restrict,
            retry_on_context_leak: true,
            operation_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Create a configuration with the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pool configuration.
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set the validator configuration.
    pub fn with_validator(mut self, validator: ValidatorConfig) -> Self {
        self.validator = validator;
        self
    }

    /// Set the elevated administrative identity.
    pub fn with_admin_identity(mut self, identity: impl Into<String>) -> Self {
        self.admin_identity = identity.into();
        self
    }

    /// Set the fallback profile for cascading profile drops.
    pub fn with_default_profile(mut self, profile: impl Into<String>) -> Self {
        self.default_profile = profile.into();
        self
    }

    /// Set the drop behavior used when none is passed explicitly.
    pub fn with_default_drop_behavior(mut self, behavior: DropBehavior) -> Self {
        self.default_drop_behavior = behavior;
        self
    }

    /// Enable or disable the single retry after a context-leak discard.
    pub fn with_leak_retry(mut self, retry: bool) -> Self {
        self.retry_on_context_leak = retry;
        self
    }

    /// Set the per-call operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.admin_identity, "SEC_ADMIN");
        assert_eq!(config.default_profile, "DEFAULT");
        assert_eq!(config.default_drop_behavior, DropBehavior::Restrict);
        assert!(config.retry_on_context_leak);
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::new()
            .with_admin_identity("GUARD_ADMIN")
            .with_default_profile("BASELINE")
            .with_leak_retry(false)
            .with_operation_timeout(Duration::from_secs(5));
        assert_eq!(config.admin_identity, "GUARD_ADMIN");
        assert_eq!(config.default_profile, "BASELINE");
        assert!(!config.retry_on_context_leak);
        assert_eq!(config.operation_timeout, Duration::from_secs(5));
    }
}
