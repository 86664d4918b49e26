use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU8, Ordering};

use leasehold_core::{AppError, AppResult, LeaseId, LeaseKey};
use tracing::{debug, error, warn};

use super::DistributedMutex;

const LIVE: u8 = 0;
const LOST: u8 = 1;
const RELEASED: u8 = 2;

/// One successfully acquired lease.
///
/// A lease is live until it is released or confirmed lost. Retired leases
/// reject renewal without contacting the store, and release runs at most
/// once. Dropping a lease that was never released schedules a best-effort
/// release on the current Tokio runtime.
pub struct Lease {
    id: LeaseId,
    mutex: DistributedMutex,
    state: AtomicU8,
}

impl Lease {
    pub(crate) fn new(id: LeaseId, mutex: DistributedMutex) -> Self {
        Self {
            id,
            mutex,
            state: AtomicU8::new(LIVE),
        }
    }

    /// Returns the store-issued lease token.
    #[must_use]
    pub fn id(&self) -> &LeaseId {
        &self.id
    }

    /// Returns the locked resource name.
    #[must_use]
    pub fn key(&self) -> &LeaseKey {
        self.mutex.key()
    }

    /// Returns true while the lease may still be renewed.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state.load(Ordering::Acquire) == LIVE
    }

    /// Extends the lease through the issuing mutex.
    ///
    /// A store-reported `LeaseInvalid` retires the lease as lost.
    pub async fn renew(&self) -> AppResult<()> {
        if !self.is_live() {
            return Err(AppError::LeaseInvalid(format!(
                "lease '{}' on '{}' is retired",
                self.id,
                self.key()
            )));
        }

        match self.mutex.renew(&self.id).await {
            Err(error @ AppError::LeaseInvalid(_)) => {
                self.mark_lost();
                Err(error)
            }
            result => result,
        }
    }

    /// Releases the lease once.
    ///
    /// Subsequent calls return immediately. Store failures are logged and
    /// never returned, so teardown cannot mask an error already in flight.
    pub async fn release(&self) {
        if self.state.swap(RELEASED, Ordering::AcqRel) == RELEASED {
            return;
        }

        match self.mutex.release(&self.id).await {
            Ok(()) => debug!(lease_key = %self.key(), lease_id = %self.id, "lease released"),
            Err(error) => error!(
                lease_key = %self.key(),
                lease_id = %self.id,
                error = %error,
                "failed to release lease"
            ),
        }
    }

    pub(crate) fn mark_lost(&self) {
        let _ = self
            .state
            .compare_exchange(LIVE, LOST, Ordering::AcqRel, Ordering::Acquire);
    }
}

impl Debug for Lease {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Lease")
            .field("id", &self.id)
            .field("key", self.key())
            .field("state", &self.state.load(Ordering::Acquire))
            .finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if *self.state.get_mut() == RELEASED {
            return;
        }
        *self.state.get_mut() = RELEASED;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                lease_key = %self.key(),
                lease_id = %self.id,
                "lease dropped outside a runtime, leaving it to expire"
            );
            return;
        };

        warn!(
            lease_key = %self.key(),
            lease_id = %self.id,
            "lease dropped without release, releasing in background"
        );

        let mutex = self.mutex.clone();
        let lease_id = self.id.clone();
        runtime.spawn(async move {
            if let Err(error) = mutex.release(&lease_id).await {
                error!(
                    lease_key = %mutex.key(),
                    lease_id = %lease_id,
                    error = %error,
                    "failed to release dropped lease"
                );
            }
        });
    }
}
