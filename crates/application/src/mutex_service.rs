//! Distributed mutex facade over a lease store.
//!
//! Translates store-level conflict and not-found responses into typed
//! outcomes and provisions the lockable resource lazily: the first
//! acquisition against a missing resource initializes it and retries once.

mod config;
mod lease;

use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use leasehold_core::{AppError, AppResult, LeaseId, LeaseKey};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::lease_ports::LeaseStore;
use crate::renewal_service::AutoRenewedLease;

pub use config::{
    DEFAULT_CHECK_INTERVAL, DEFAULT_LEASE_DURATION, DEFAULT_RENEWAL_PERIOD, LeaseSettings,
};
pub use lease::Lease;

/// Exclusive lock on one key of a lease store.
///
/// Instances are cheap to clone and hold no state beyond identity, so any
/// number of them may target the same key; the store decides the winner.
#[derive(Clone)]
pub struct DistributedMutex {
    store: Arc<dyn LeaseStore>,
    key: LeaseKey,
    settings: LeaseSettings,
}

impl DistributedMutex {
    /// Creates a mutex with default lease settings.
    #[must_use]
    pub fn new(store: Arc<dyn LeaseStore>, key: LeaseKey) -> Self {
        Self::with_settings(store, key, LeaseSettings::default())
    }

    /// Creates a mutex with explicit lease settings.
    #[must_use]
    pub fn with_settings(store: Arc<dyn LeaseStore>, key: LeaseKey, settings: LeaseSettings) -> Self {
        Self {
            store,
            key,
            settings,
        }
    }

    /// Returns the locked resource name.
    #[must_use]
    pub fn key(&self) -> &LeaseKey {
        &self.key
    }

    /// Returns the lease timing configuration.
    #[must_use]
    pub fn settings(&self) -> LeaseSettings {
        self.settings
    }

    /// Acquires the lock.
    ///
    /// Returns `AppError::ConcurrentAccess` when another holder owns it.
    /// Other store failures are returned unchanged.
    pub async fn acquire(&self) -> AppResult<Lease> {
        match self.acquire_once().await {
            Err(AppError::NotFound(reason)) => {
                debug!(
                    lease_key = %self.key,
                    reason = %reason,
                    "lockable resource missing, initializing"
                );
                self.store.initialize(&self.key).await?;
                self.acquire_once().await
            }
            result => result,
        }
    }

    /// Acquires the lock, or returns `None` when another holder owns it.
    pub async fn try_acquire(&self) -> AppResult<Option<Lease>> {
        match self.acquire().await {
            Ok(lease) => Ok(Some(lease)),
            Err(AppError::ConcurrentAccess(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Polls [`Self::try_acquire`] every `poll_interval` until the lock is
    /// obtained or `cancellation` fires.
    ///
    /// An in-flight store call is never abandoned, so cancellation is
    /// observed between attempts and during the wait.
    pub async fn acquire_or_wait(
        &self,
        cancellation: &CancellationToken,
        poll_interval: Duration,
    ) -> AppResult<Lease> {
        if poll_interval.is_zero() {
            return Err(AppError::Validation(
                "poll_interval must be greater than zero".to_owned(),
            ));
        }

        loop {
            if cancellation.is_cancelled() {
                return Err(self.cancelled_error());
            }

            if let Some(lease) = self.try_acquire().await? {
                return Ok(lease);
            }

            debug!(
                lease_key = %self.key,
                poll_interval_ms = poll_interval.as_millis(),
                "lock is taken, waiting for next attempt"
            );

            tokio::select! {
                biased;
                () = cancellation.cancelled() => return Err(self.cancelled_error()),
                () = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    /// Acquires the lock with background renewal, or returns `None` when
    /// another holder owns it.
    pub async fn try_acquire_auto_renewed(&self) -> AppResult<Option<AutoRenewedLease>> {
        Ok(self
            .try_acquire()
            .await?
            .map(|lease| AutoRenewedLease::start(lease, self.settings.renewal_period())))
    }

    /// Waits for the lock like [`Self::acquire_or_wait`] and starts
    /// background renewal once obtained.
    pub async fn acquire_auto_renewed_or_wait(
        &self,
        cancellation: &CancellationToken,
        poll_interval: Duration,
    ) -> AppResult<AutoRenewedLease> {
        let lease = self.acquire_or_wait(cancellation, poll_interval).await?;
        Ok(AutoRenewedLease::start(lease, self.settings.renewal_period()))
    }

    /// Renews the lease identified by `lease_id`.
    pub async fn renew(&self, lease_id: &LeaseId) -> AppResult<()> {
        self.store.renew(&self.key, lease_id).await
    }

    /// Releases the lease identified by `lease_id`.
    pub async fn release(&self, lease_id: &LeaseId) -> AppResult<()> {
        self.store.release(&self.key, lease_id).await
    }

    async fn acquire_once(&self) -> AppResult<Lease> {
        match self
            .store
            .acquire(&self.key, self.settings.lease_duration())
            .await
        {
            Ok(lease_id) => {
                debug!(lease_key = %self.key, lease_id = %lease_id, "lease acquired");
                Ok(Lease::new(lease_id, self.clone()))
            }
            Err(AppError::Conflict(_)) => Err(AppError::ConcurrentAccess(format!(
                "failed to acquire lock '{}', it is already taken",
                self.key
            ))),
            Err(error) => Err(error),
        }
    }

    fn cancelled_error(&self) -> AppError {
        AppError::Cancelled(format!("waiting for lock '{}' was cancelled", self.key))
    }
}

impl Debug for DistributedMutex {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DistributedMutex")
            .field("key", &self.key)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
