//! Row-filter binding maintenance.
//!
//! Bindings map a logical caller identity to the context key/value pairs
//! the database's row-filter function resolves at context-set time. They
//! live in the database's binding table and travel on the DML channel with
//! bound parameters.

use rowguard_core::model::RowFilterBindingRecord;
use rowguard_core::statement::{self, ContextPair};
use rowguard_core::Result;
use rowguard_pool::AdminBackend;

use crate::engine::{combine, leak_retry, SecurityEngine};

impl<B: AdminBackend> SecurityEngine<B> {
    /// Register or update the context pairs for a caller identity.
    pub async fn bind_row_filter(&self, caller: &str, pairs: &[(String, String)]) -> Result<()> {
        let v = self.validator();
        let caller = v.validate_identifier(caller)?;
        let mut typed = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            typed.push(ContextPair {
                key: v.validate_identifier(key)?,
                value: value.clone(),
            });
        }
        leak_retry!(self, self.bind_row_filter_once(&caller, &typed))?;
        tracing::info!(caller = %caller, pairs = typed.len(), "row-filter binding updated");
        Ok(())
    }

    async fn bind_row_filter_once(
        &self,
        caller: &rowguard_core::SafeIdentifier,
        pairs: &[ContextPair],
    ) -> Result<()> {
        let mut lease = self.admin_lease().await?;
        let executed = self
            .timed(async {
                for pair in pairs {
                    lease
                        .execute(&statement::bind_row_filter_pair(caller, pair))
                        .await?;
                }
                Ok(())
            })
            .await;
        let released = self.release(lease).await;
        combine(executed, released)
    }

    /// Remove a caller's binding. Returns how many pairs were removed.
    pub async fn unbind_row_filter(&self, caller: &str) -> Result<u64> {
        let caller = self.validator().validate_identifier(caller)?;
        let removed = leak_retry!(self, self.unbind_row_filter_once(&caller))?;
        tracing::info!(caller = %caller, removed, "row-filter binding removed");
        Ok(removed)
    }

    async fn unbind_row_filter_once(
        &self,
        caller: &rowguard_core::SafeIdentifier,
    ) -> Result<u64> {
        let mut lease = self.admin_lease().await?;
        let executed = self
            .timed(lease.execute(&statement::unbind_row_filter(caller)))
            .await;
        let released = self.release(lease).await;
        combine(executed, released)
    }

    /// List every registered binding.
    pub async fn list_row_filter_bindings(&self) -> Result<Vec<RowFilterBindingRecord>> {
        leak_retry!(self, self.list_row_filter_bindings_once())
    }

    async fn list_row_filter_bindings_once(&self) -> Result<Vec<RowFilterBindingRecord>> {
        let mut lease = self.admin_lease().await?;
        let fetched = self.timed(lease.fetch_row_filter_bindings()).await;
        let released = self.release(lease).await;
        combine(fetched, released)
    }
}
