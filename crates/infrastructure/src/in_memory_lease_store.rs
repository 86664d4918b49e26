use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use leasehold_application::LeaseStore;
use leasehold_core::{AppError, AppResult, LeaseId, LeaseKey};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct HeldLease {
    lease_id: LeaseId,
    lease_duration: Duration,
    expires_at: Instant,
}

impl HeldLease {
    fn is_active(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local lease store with time-based expiry.
///
/// Expiry follows the Tokio clock, so paused-time tests observe it exactly.
#[derive(Debug, Default)]
pub struct InMemoryLeaseStore {
    resources: RwLock<HashMap<LeaseKey, Option<HeldLease>>>,
}

impl InMemoryLeaseStore {
    /// Creates an empty in-memory lease store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deletes a lockable resource together with any lease on it.
    ///
    /// Returns false when the resource did not exist.
    pub async fn delete_resource(&self, key: &LeaseKey) -> bool {
        self.resources.write().await.remove(key).is_some()
    }

    /// Expires the current lease on `key` as if its duration had elapsed.
    ///
    /// Returns false when no lease was active.
    pub async fn expire_lease(&self, key: &LeaseKey) -> bool {
        let now = Instant::now();
        let mut resources = self.resources.write().await;
        match resources.get_mut(key) {
            Some(slot) if slot.as_ref().is_some_and(|held| held.is_active(now)) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Returns true while some holder has an unexpired lease on `key`.
    pub async fn is_leased(&self, key: &LeaseKey) -> bool {
        let now = Instant::now();
        self.resources
            .read()
            .await
            .get(key)
            .and_then(Option::as_ref)
            .is_some_and(|held| held.is_active(now))
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn acquire(&self, key: &LeaseKey, lease_duration: Duration) -> AppResult<LeaseId> {
        if lease_duration.is_zero() {
            return Err(AppError::Validation(
                "lease_duration must be greater than zero".to_owned(),
            ));
        }

        let now = Instant::now();
        let mut resources = self.resources.write().await;
        let Some(slot) = resources.get_mut(key) else {
            return Err(AppError::NotFound(format!(
                "lockable resource '{key}' does not exist"
            )));
        };

        if slot.as_ref().is_some_and(|held| held.is_active(now)) {
            return Err(AppError::Conflict(format!(
                "lockable resource '{key}' is already leased"
            )));
        }

        let lease_id = LeaseId::generate();
        *slot = Some(HeldLease {
            lease_id: lease_id.clone(),
            lease_duration,
            expires_at: now + lease_duration,
        });

        Ok(lease_id)
    }

    async fn renew(&self, key: &LeaseKey, lease_id: &LeaseId) -> AppResult<()> {
        let now = Instant::now();
        let mut resources = self.resources.write().await;
        match resources.get_mut(key).and_then(Option::as_mut) {
            Some(held) if held.lease_id == *lease_id && held.is_active(now) => {
                held.expires_at = now + held.lease_duration;
                Ok(())
            }
            _ => Err(AppError::LeaseInvalid(format!(
                "lease '{lease_id}' on '{key}' is expired or held by another owner"
            ))),
        }
    }

    async fn release(&self, key: &LeaseKey, lease_id: &LeaseId) -> AppResult<()> {
        let mut resources = self.resources.write().await;
        if let Some(slot) = resources.get_mut(key) {
            if slot
                .as_ref()
                .is_some_and(|held| held.lease_id == *lease_id)
            {
                *slot = None;
            }
        }

        Ok(())
    }

    async fn initialize(&self, key: &LeaseKey) -> AppResult<()> {
        let mut resources = self.resources.write().await;
        if !resources.contains_key(key) {
            resources.insert(key.clone(), None);
            debug!(lease_key = %key, "lockable resource created");
        }

        Ok(())
    }
}
