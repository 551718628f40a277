//! Audit queries: fetch both log sources over one lease and merge.

use rowguard_core::audit::{merge_events, AuditFilter, AuditPage};
use rowguard_core::Result;
use rowguard_pool::AdminBackend;

use crate::engine::{combine, leak_retry, SecurityEngine};

impl<B: AdminBackend> SecurityEngine<B> {
    /// Query the merged audit stream.
    ///
    /// Both sources are read under one lease, then merged and paged by the
    /// pure normalization layer. Read-only; restart with the cursor the
    /// returned page carries.
    pub async fn query_audit_events(&self, filter: &AuditFilter) -> Result<AuditPage> {
        leak_retry!(self, self.query_audit_events_once(filter))
    }

    async fn query_audit_events_once(&self, filter: &AuditFilter) -> Result<AuditPage> {
        let mut lease = self.admin_lease().await?;
        let fetched = self
            .timed(async {
                let object = filter.object.as_deref();
                let coarse = lease.fetch_coarse_audit(object).await?;
                let fine = lease.fetch_fine_audit(object).await?;
                Ok((coarse, fine))
            })
            .await;
        let released = self.release(lease).await;
        let (coarse, fine) = combine(fetched, released)?;
        Ok(merge_events(coarse, fine, filter))
    }
}
