//! Application services and ports.

#![forbid(unsafe_code)]

mod lease_ports;
mod mutex_service;
mod renewal_service;
mod single_instance_service;

#[cfg(test)]
mod test_support;

pub use lease_ports::LeaseStore;
pub use mutex_service::{
    DEFAULT_CHECK_INTERVAL, DEFAULT_LEASE_DURATION, DEFAULT_RENEWAL_PERIOD, DistributedMutex,
    Lease, LeaseSettings,
};
pub use renewal_service::{AutoRenewedLease, RenewalLoop, RenewalState};
pub use single_instance_service::{
    RunOutcome, SingleInstanceJob, SingleInstanceJobFuture, SingleInstanceRunner,
};
