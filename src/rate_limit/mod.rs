//! Upload quotas per client identity.

mod memory;

use async_trait::async_trait;

pub use memory::InMemoryQuota;

/// Decides whether a client may submit another upload.
#[async_trait]
pub trait QuotaGuard: Send + Sync {
    /// Record an attempt by `identity`; false when the ceiling is reached.
    async fn allow(&self, identity: &str) -> bool;
}
