//! Background lease renewal.
//!
//! A [`RenewalLoop`] renews one lease on a fixed cadence. The first failed
//! renewal is treated as loss: the loop stops for good and latches a
//! one-way lease-lost signal instead of raising the error.

mod auto_renewed;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::mutex_service::Lease;

pub use auto_renewed::AutoRenewedLease;

/// Lifecycle of one renewal loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalState {
    /// Loop constructed but not yet running.
    Idle,
    /// Lease is renewed on every tick.
    Renewing,
    /// A renewal failed; the lease is gone.
    Lost,
    /// Renewal was stopped on request.
    Stopped,
}

impl RenewalState {
    /// Returns stable label for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Renewing => "renewing",
            Self::Lost => "lost",
            Self::Stopped => "stopped",
        }
    }

    /// Returns true once the loop can never tick again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Lost | Self::Stopped)
    }
}

/// Periodic renewal of a shared lease.
///
/// The loop only renews; releasing the lease stays with its owner.
pub struct RenewalLoop {
    lease: Arc<Lease>,
    period: Duration,
    lease_lost: CancellationToken,
    state: watch::Sender<RenewalState>,
}

impl RenewalLoop {
    /// Creates an idle loop renewing `lease` every `period`.
    #[must_use]
    pub fn new(lease: Arc<Lease>, period: Duration) -> Self {
        let (state, _) = watch::channel(RenewalState::Idle);
        Self {
            lease,
            period,
            lease_lost: CancellationToken::new(),
            state,
        }
    }

    /// Returns the signal cancelled when the lease is lost.
    #[must_use]
    pub fn lease_lost(&self) -> CancellationToken {
        self.lease_lost.clone()
    }

    /// Subscribes to state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RenewalState> {
        self.state.subscribe()
    }

    /// Runs until renewal fails or `stop` fires, returning the terminal state.
    ///
    /// The first renewal happens one full period after start. A stop request
    /// raised during a renewal round trip takes effect once it returns.
    pub async fn run(self, stop: CancellationToken) -> RenewalState {
        self.state.send_replace(RenewalState::Renewing);

        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let terminal = loop {
            tokio::select! {
                biased;
                () = stop.cancelled() => break RenewalState::Stopped,
                _ = ticker.tick() => {
                    match self.lease.renew().await {
                        Ok(()) => debug!(
                            lease_key = %self.lease.key(),
                            lease_id = %self.lease.id(),
                            "lease renewed"
                        ),
                        Err(error) => {
                            self.lease.mark_lost();
                            self.lease_lost.cancel();
                            error!(
                                lease_key = %self.lease.key(),
                                lease_id = %self.lease.id(),
                                error = %error,
                                "failed to auto renew lease"
                            );
                            break RenewalState::Lost;
                        }
                    }
                }
            }
        };

        self.state.send_replace(terminal);
        terminal
    }
}
