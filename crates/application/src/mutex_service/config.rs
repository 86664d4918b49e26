use std::time::Duration;

use leasehold_core::{AppError, AppResult};

/// Default server-side lease time-to-live.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(60);

/// Default cadence of background lease renewal.
pub const DEFAULT_RENEWAL_PERIOD: Duration = Duration::from_secs(15);

/// Default polling cadence while waiting for a held lease.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Timing configuration for leases acquired through a mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseSettings {
    lease_duration: Duration,
    renewal_period: Duration,
    check_interval: Duration,
}

impl LeaseSettings {
    /// Creates validated lease settings.
    ///
    /// The renewal period must be shorter than the lease duration, otherwise
    /// the lease expires server-side between two renewals.
    pub fn new(
        lease_duration: Duration,
        renewal_period: Duration,
        check_interval: Duration,
    ) -> AppResult<Self> {
        if lease_duration.is_zero() {
            return Err(AppError::Validation(
                "lease_duration must be greater than zero".to_owned(),
            ));
        }

        if renewal_period.is_zero() {
            return Err(AppError::Validation(
                "renewal_period must be greater than zero".to_owned(),
            ));
        }

        if check_interval.is_zero() {
            return Err(AppError::Validation(
                "check_interval must be greater than zero".to_owned(),
            ));
        }

        if renewal_period >= lease_duration {
            return Err(AppError::Validation(format!(
                "renewal_period ({renewal_period:?}) must be shorter than lease_duration ({lease_duration:?})"
            )));
        }

        Ok(Self {
            lease_duration,
            renewal_period,
            check_interval,
        })
    }

    /// Returns the server-side lease time-to-live.
    #[must_use]
    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// Returns the background renewal cadence.
    #[must_use]
    pub fn renewal_period(&self) -> Duration {
        self.renewal_period
    }

    /// Returns the default acquisition polling cadence.
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self {
            lease_duration: DEFAULT_LEASE_DURATION,
            renewal_period: DEFAULT_RENEWAL_PERIOD,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}
