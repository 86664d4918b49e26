//! Runs caller work under a fleet-wide exclusive lease.
//!
//! The job and the lease's renewal loop race each other. Whichever ends
//! first cancels the shared scope, both are drained, the lease is released,
//! and exactly one [`RunOutcome`] is produced.

mod outcome;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use leasehold_core::AppResult;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::mutex_service::DistributedMutex;
use crate::renewal_service::RenewalState;

pub use outcome::RunOutcome;

/// Boxed future returned by a job wrapped with
/// [`SingleInstanceRunner::ensure_single_instance`].
pub type SingleInstanceJobFuture<T> = Pin<Box<dyn Future<Output = AppResult<T>> + Send>>;

/// Cancellable job that always runs as a single instance.
pub type SingleInstanceJob<T> =
    Arc<dyn Fn(CancellationToken) -> SingleInstanceJobFuture<T> + Send + Sync>;

enum FirstFinished<T> {
    Job(AppResult<T>),
    Renewal(RenewalState),
}

/// Application service running jobs on at most one node at a time.
#[derive(Clone, Debug)]
pub struct SingleInstanceRunner {
    mutex: DistributedMutex,
    check_interval: Duration,
}

impl SingleInstanceRunner {
    /// Creates a runner polling at the mutex's configured check interval.
    #[must_use]
    pub fn new(mutex: DistributedMutex) -> Self {
        let check_interval = mutex.settings().check_interval();
        Self {
            mutex,
            check_interval,
        }
    }

    /// Overrides how often a taken lock is polled.
    #[must_use]
    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    /// Returns the underlying mutex.
    #[must_use]
    pub fn mutex(&self) -> &DistributedMutex {
        &self.mutex
    }

    /// Returns the acquisition polling cadence.
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Runs `job` once the lease is obtained and returns its result.
    ///
    /// Fails with `AppError::LeaseLost` when renewal failed mid-run and with
    /// `AppError::Cancelled` when `cancellation` fired.
    pub async fn run<F, Fut, T>(&self, job: F, cancellation: CancellationToken) -> AppResult<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        self.run_with_outcome(job, cancellation).await.into_result()
    }

    /// Runs `job` once the lease is obtained and classifies how it ended.
    ///
    /// The job receives a token cancelled by the caller's `cancellation` or
    /// as soon as the lease is lost. The lease is released only after both
    /// the job and renewal have stopped.
    pub async fn run_with_outcome<F, Fut, T>(
        &self,
        job: F,
        cancellation: CancellationToken,
    ) -> RunOutcome<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut lease = match self
            .mutex
            .acquire_auto_renewed_or_wait(&cancellation, self.check_interval)
            .await
        {
            Ok(lease) => lease,
            Err(error) => return RunOutcome::from_result(Err(error)),
        };

        let lease_key = lease.lease().key().clone();
        let lease_id = lease.lease().id().clone();
        info!(lease_key = %lease_key, lease_id = %lease_id, "single-instance lease acquired");

        let scope = cancellation.child_token();
        let job_future = job(scope.clone());
        tokio::pin!(job_future);

        let first = tokio::select! {
            job_result = &mut job_future => FirstFinished::Job(job_result),
            renewal_state = lease.renewal_finished() => FirstFinished::Renewal(renewal_state),
        };
        scope.cancel();

        let (job_result, renewal_state) = match first {
            FirstFinished::Job(job_result) => (job_result, lease.stop_renewal().await),
            FirstFinished::Renewal(renewal_state) => {
                warn!(
                    lease_key = %lease_key,
                    lease_id = %lease_id,
                    renewal_state = renewal_state.as_str(),
                    "lease renewal ended before the job, waiting for the job to stop"
                );
                (job_future.await, renewal_state)
            }
        };

        lease.release().await;

        let outcome = RunOutcome::classify(job_result, renewal_state, &lease_key);
        match &outcome {
            RunOutcome::LeaseLost(_) => warn!(
                lease_key = %lease_key,
                lease_id = %lease_id,
                "single-instance run interrupted by lease loss"
            ),
            other => info!(
                lease_key = %lease_key,
                lease_id = %lease_id,
                outcome = other.as_str(),
                "single-instance run finished"
            ),
        }

        outcome
    }

    /// Wraps `job` so every invocation goes through [`Self::run`].
    #[must_use]
    pub fn ensure_single_instance<F, Fut, T>(self, job: F) -> SingleInstanceJob<T>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let job = Arc::new(job);
        Arc::new(
            move |cancellation: CancellationToken| -> SingleInstanceJobFuture<T> {
                let runner = self.clone();
                let job = Arc::clone(&job);
                Box::pin(async move { runner.run(move |scope| job(scope), cancellation).await })
            },
        )
    }
}
