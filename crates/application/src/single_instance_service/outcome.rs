use leasehold_core::{AppError, AppResult, LeaseKey};

use crate::renewal_service::RenewalState;

/// Terminal outcome of one single-instance run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome<T> {
    /// Job finished successfully while the lease was held.
    Completed(T),
    /// Job, acquisition or store failed with its own error.
    Failed(AppError),
    /// Caller cancellation unrelated to lease loss.
    Cancelled(String),
    /// Lease renewal failed while the job was running.
    LeaseLost(String),
}

impl<T> RunOutcome<T> {
    /// Reconciles the job result with how renewal ended.
    ///
    /// Loss takes priority over anything the job reported, including its
    /// own cancellation triggered by that loss.
    pub(crate) fn classify(
        job_result: AppResult<T>,
        renewal_state: RenewalState,
        key: &LeaseKey,
    ) -> Self {
        if renewal_state == RenewalState::Lost {
            return Self::LeaseLost(format!("lease on '{key}' was lost while the job was running"));
        }

        Self::from_result(job_result)
    }

    pub(crate) fn from_result(result: AppResult<T>) -> Self {
        match result {
            Ok(value) => Self::Completed(value),
            Err(AppError::Cancelled(reason)) => Self::Cancelled(reason),
            Err(error) => Self::Failed(error),
        }
    }

    /// Returns stable label for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
            Self::Cancelled(_) => "cancelled",
            Self::LeaseLost(_) => "lease_lost",
        }
    }

    /// Converts the outcome into the shared error taxonomy.
    pub fn into_result(self) -> AppResult<T> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Failed(error) => Err(error),
            Self::Cancelled(reason) => Err(AppError::Cancelled(reason)),
            Self::LeaseLost(reason) => Err(AppError::LeaseLost(reason)),
        }
    }
}
