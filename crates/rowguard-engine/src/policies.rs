//! Audit and redaction policy verbs.

use rowguard_core::model::{AuditPolicyRecord, RedactionPolicyRecord};
use rowguard_core::statement::{
    self, ActivationPredicate, AuditAction, AuditCondition, AuditGranularity, AuditPolicySpec,
    MaskingFunction, RedactionPolicySpec,
};
use rowguard_core::{Error, Result};
use rowguard_pool::AdminBackend;

use crate::engine::{combine, leak_retry, SecurityEngine};

/// Raw capture condition, validated by the engine into an
/// [`AuditCondition`].
#[derive(Debug, Clone)]
pub enum AuditConditionRequest {
    /// Capture when a session context key holds a value.
    ContextEquals {
        /// Context key.
        key: String,
        /// Expected value.
        value: String,
    },
    /// Capture when a column exceeds a threshold.
    ColumnGreaterThan {
        /// Column name.
        column: String,
        /// Threshold.
        threshold: i64,
    },
}

/// Raw inputs for creating an audit policy.
#[derive(Debug, Clone)]
pub struct AuditPolicyCreate {
    /// Policy name.
    pub name: String,
    /// Object whose statements are captured.
    pub object: String,
    /// Captured statement kinds; empty means ALL.
    pub actions: Vec<AuditAction>,
    /// Audited column, fine-grained only.
    pub column: Option<String>,
    /// Capture condition, fine-grained only.
    pub condition: Option<AuditConditionRequest>,
    /// Coarse or fine-grained.
    pub granularity: AuditGranularity,
}

/// Raw inputs for adding a redaction policy.
#[derive(Debug, Clone)]
pub struct RedactionPolicyCreate {
    /// Policy name.
    pub name: String,
    /// Object the masked column belongs to.
    pub object: String,
    /// Masked column.
    pub column: String,
    /// Masking function.
    pub function: MaskingFunction,
    /// Raw activation predicate.
    pub predicate: PredicateRequest,
}

/// Raw activation predicate, validated into an [`ActivationPredicate`].
#[derive(Debug, Clone)]
pub enum PredicateRequest {
    /// Always mask.
    Always,
    /// Never mask.
    Never,
    /// Mask when a session context key holds a value.
    ContextEquals {
        /// Context key.
        key: String,
        /// Activating value.
        value: String,
    },
}

impl<B: AdminBackend> SecurityEngine<B> {
    /// Create an audit policy. Coarse policies must afterwards be enabled
    /// with [`SecurityEngine::enable_audit_policy`]; fine-grained policies
    /// capture from the moment they are registered.
    pub async fn create_audit_policy(&self, request: &AuditPolicyCreate) -> Result<()> {
        let v = self.validator();
        let name = v.validate_identifier(&request.name)?;
        let object = v.validate_identifier(&request.object)?;
        if request.granularity == AuditGranularity::Coarse
            && (request.column.is_some() || request.condition.is_some())
        {
            return Err(Error::InvalidLiteral(
                "column and condition require a fine-grained audit policy".to_string(),
            ));
        }
        let column = request
            .column
            .as_deref()
            .map(|c| v.validate_identifier(c))
            .transpose()?;
        let condition = request
            .condition
            .as_ref()
            .map(|c| {
                Ok::<_, Error>(match c {
                    AuditConditionRequest::ContextEquals { key, value } => {
                        AuditCondition::ContextEquals {
                            key: v.validate_identifier(key)?,
                            value: v.validate_identifier(value)?,
                        }
                    }
                    AuditConditionRequest::ColumnGreaterThan { column, threshold } => {
                        AuditCondition::ColumnGreaterThan {
                            column: v.validate_identifier(column)?,
                            threshold: *threshold,
                        }
                    }
                })
            })
            .transpose()?;

        let stmt = statement::create_audit_policy(&AuditPolicySpec {
            name: name.clone(),
            object,
            actions: request.actions.clone(),
            column,
            condition,
            granularity: request.granularity,
        });
        self.execute_admin(&stmt).await?;
        tracing::info!(policy = %name, "audit policy created");
        Ok(())
    }

    /// Enable a coarse audit policy.
    pub async fn enable_audit_policy(&self, name: &str) -> Result<()> {
        let name = self.validator().validate_identifier(name)?;
        self.execute_admin(&statement::set_audit_policy_enabled(&name, true))
            .await?;
        Ok(())
    }

    /// Disable a coarse audit policy.
    pub async fn disable_audit_policy(&self, name: &str) -> Result<()> {
        let name = self.validator().validate_identifier(name)?;
        self.execute_admin(&statement::set_audit_policy_enabled(&name, false))
            .await?;
        Ok(())
    }

    /// Drop an audit policy, dispatching on its recorded granularity.
    pub async fn drop_audit_policy(&self, name: &str) -> Result<()> {
        let name = self.validator().validate_identifier(name)?;
        leak_retry!(self, self.drop_audit_policy_once(&name))?;
        tracing::info!(policy = %name, "audit policy dropped");
        Ok(())
    }

    async fn drop_audit_policy_once(&self, name: &rowguard_core::SafeIdentifier) -> Result<()> {
        let mut lease = self.admin_lease().await?;
        let executed = self
            .timed(async {
                let granularity = lease
                    .fetch_audit_policies()
                    .await?
                    .into_iter()
                    .find(|p| p.name == name.as_str())
                    .map(|p| {
                        if p.fine_grained {
                            AuditGranularity::Fine
                        } else {
                            AuditGranularity::Coarse
                        }
                    })
                    // unknown policies go down the coarse path so the
                    // database's own diagnostic surfaces
                    .unwrap_or(AuditGranularity::Coarse);
                lease
                    .execute(&statement::drop_audit_policy(name, granularity))
                    .await?;
                Ok(())
            })
            .await;
        let released = self.release(lease).await;
        combine(executed, released)
    }

    /// List every audit policy.
    pub async fn list_audit_policies(&self) -> Result<Vec<AuditPolicyRecord>> {
        leak_retry!(self, self.list_audit_policies_once())
    }

    async fn list_audit_policies_once(&self) -> Result<Vec<AuditPolicyRecord>> {
        let mut lease = self.admin_lease().await?;
        let fetched = self.timed(lease.fetch_audit_policies()).await;
        let released = self.release(lease).await;
        combine(fetched, released)
    }

    /// Register a redaction policy.
    pub async fn add_redaction_policy(&self, request: &RedactionPolicyCreate) -> Result<()> {
        let v = self.validator();
        let name = v.validate_identifier(&request.name)?;
        let predicate = match &request.predicate {
            PredicateRequest::Always => ActivationPredicate::Always,
            PredicateRequest::Never => ActivationPredicate::Never,
            PredicateRequest::ContextEquals { key, value } => ActivationPredicate::ContextEquals {
                key: v.validate_identifier(key)?,
                value: v.validate_identifier(value)?,
            },
        };
        let stmt = statement::add_redaction_policy(&RedactionPolicySpec {
            name: name.clone(),
            object: v.validate_identifier(&request.object)?,
            column: v.validate_identifier(&request.column)?,
            function: request.function,
            predicate,
        });
        self.execute_admin(&stmt).await?;
        tracing::info!(policy = %name, "redaction policy added");
        Ok(())
    }

    /// Remove a redaction policy from an object.
    pub async fn drop_redaction_policy(&self, name: &str, object: &str) -> Result<()> {
        let v = self.validator();
        let name = v.validate_identifier(name)?;
        let object = v.validate_identifier(object)?;
        self.execute_admin(&statement::drop_redaction_policy(&name, &object))
            .await?;
        tracing::info!(policy = %name, "redaction policy dropped");
        Ok(())
    }

    /// List every redaction policy.
    pub async fn list_redaction_policies(&self) -> Result<Vec<RedactionPolicyRecord>> {
        leak_retry!(self, self.list_redaction_policies_once())
    }

    async fn list_redaction_policies_once(&self) -> Result<Vec<RedactionPolicyRecord>> {
        let mut lease = self.admin_lease().await?;
        let fetched = self.timed(lease.fetch_redaction_policies()).await;
        let released = self.release(lease).await;
        combine(fetched, released)
    }
}
