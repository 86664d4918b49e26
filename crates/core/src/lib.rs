//! Shared primitives for all Rust crates in Leasehold.

#![forbid(unsafe_code)]

/// Lease identity primitives shared across layers.
pub mod lease;

use thiserror::Error;

pub use lease::{LeaseId, LeaseKey};

/// Result type used across Leasehold crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
///
/// `NotFound`, `Conflict` and `LeaseInvalid` are reported by lease stores.
/// The mutex layer translates `Conflict` into `ConcurrentAccess`, and the
/// single-instance runner reports `LeaseLost` and `Cancelled`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Lockable resource does not exist in the store.
    #[error("not found: {0}")]
    NotFound(String),

    /// Another holder currently owns the lease.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Lease expired or was taken over by another holder.
    #[error("lease invalid: {0}")]
    LeaseInvalid(String),

    /// Acquisition failed because the lock is already taken.
    #[error("concurrent access: {0}")]
    ConcurrentAccess(String),

    /// A held lease could not be kept alive while work was running.
    #[error("lease lost: {0}")]
    LeaseLost(String),

    /// Work was cancelled by the caller.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns true for caller-initiated cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns true when the lock guarantee was broken mid-run.
    #[must_use]
    pub fn is_lease_lost(&self) -> bool {
        matches!(self, Self::LeaseLost(_))
    }
}
