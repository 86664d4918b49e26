use std::time::Duration;

use async_trait::async_trait;
use leasehold_core::{AppResult, LeaseId, LeaseKey};

/// Remote store enforcing exclusive, time-bounded leases by key.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Acquires a lease on `key` for `lease_duration`.
    ///
    /// Fails with `AppError::Conflict` when another holder is active and with
    /// `AppError::NotFound` when the lockable resource does not exist yet.
    async fn acquire(&self, key: &LeaseKey, lease_duration: Duration) -> AppResult<LeaseId>;

    /// Extends a held lease by its original duration.
    ///
    /// Fails with `AppError::LeaseInvalid` when the lease expired or another
    /// holder took it over.
    async fn renew(&self, key: &LeaseKey, lease_id: &LeaseId) -> AppResult<()>;

    /// Releases a held lease. Releasing a stale id leaves other holders intact.
    async fn release(&self, key: &LeaseKey, lease_id: &LeaseId) -> AppResult<()>;

    /// Creates the lockable resource if it does not exist.
    ///
    /// Succeeds when the resource already exists or is currently leased.
    async fn initialize(&self, key: &LeaseKey) -> AppResult<()>;
}
