use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::mutex_service::Lease;

use super::{RenewalLoop, RenewalState};

/// Lease kept alive by a spawned [`RenewalLoop`].
///
/// [`Self::release`] stops the timer, waits for the renewal task and then
/// releases the lease best-effort. Dropping the handle only stops renewal;
/// the inner lease then releases itself in the background.
pub struct AutoRenewedLease {
    lease: Arc<Lease>,
    stop: CancellationToken,
    lease_lost: CancellationToken,
    state: watch::Receiver<RenewalState>,
    renewal: Option<JoinHandle<RenewalState>>,
    finished: Option<RenewalState>,
}

impl AutoRenewedLease {
    /// Starts renewing `lease` every `renewal_period` on the current runtime.
    #[must_use]
    pub fn start(lease: Lease, renewal_period: Duration) -> Self {
        let lease = Arc::new(lease);
        let renewal_loop = RenewalLoop::new(Arc::clone(&lease), renewal_period);
        let lease_lost = renewal_loop.lease_lost();
        let state = renewal_loop.subscribe();
        let stop = CancellationToken::new();
        let renewal = tokio::spawn(renewal_loop.run(stop.clone()));

        Self {
            lease,
            stop,
            lease_lost,
            state,
            renewal: Some(renewal),
            finished: None,
        }
    }

    /// Returns the renewed lease.
    #[must_use]
    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    /// Returns the signal cancelled when renewal fails.
    #[must_use]
    pub fn lease_lost(&self) -> CancellationToken {
        self.lease_lost.clone()
    }

    /// Returns the latest renewal state.
    #[must_use]
    pub fn state(&self) -> RenewalState {
        self.finished.unwrap_or_else(|| *self.state.borrow())
    }

    /// Waits until the renewal task ends on its own or after a stop request.
    ///
    /// Cancel-safe: dropping the returned future keeps the task joinable.
    pub async fn renewal_finished(&mut self) -> RenewalState {
        if let Some(state) = self.finished {
            return state;
        }

        let state = match self.renewal.as_mut() {
            Some(handle) => match handle.await {
                Ok(state) => state,
                Err(join_error) => {
                    self.lease.mark_lost();
                    self.lease_lost.cancel();
                    error!(
                        lease_key = %self.lease.key(),
                        lease_id = %self.lease.id(),
                        error = %join_error,
                        "lease renewal task terminated abnormally"
                    );
                    RenewalState::Lost
                }
            },
            None => RenewalState::Stopped,
        };

        self.renewal = None;
        self.finished = Some(state);
        state
    }

    /// Stops renewal and waits for the task to finish.
    ///
    /// Returns `Lost` if the lease was lost before the stop took effect.
    pub async fn stop_renewal(&mut self) -> RenewalState {
        self.stop.cancel();
        self.renewal_finished().await
    }

    /// Stops renewal, then releases the lease once.
    pub async fn release(mut self) {
        let state = self.stop_renewal().await;
        debug!(
            lease_key = %self.lease.key(),
            lease_id = %self.lease.id(),
            renewal_state = state.as_str(),
            "renewal stopped, releasing lease"
        );
        self.lease.release().await;
    }
}

impl Drop for AutoRenewedLease {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
