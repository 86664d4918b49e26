use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leasehold_core::{AppError, AppResult, LeaseId, LeaseKey};
use tokio::sync::Mutex;

use crate::lease_ports::LeaseStore;
use crate::mutex_service::{DistributedMutex, LeaseSettings};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CallCounts {
    pub acquire: u32,
    pub renew: u32,
    pub release: u32,
    pub initialize: u32,
}

#[derive(Default)]
struct FakeState {
    resources: HashMap<LeaseKey, Option<LeaseId>>,
    counts: CallCounts,
    fail_acquires: bool,
    fail_renewals: bool,
    fail_releases: bool,
}

/// Lease store fake without expiry: a lease lives until released or revoked.
#[derive(Default)]
pub(crate) struct FakeLeaseStore {
    state: Mutex<FakeState>,
}

impl FakeLeaseStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) async fn provision(&self, key: &LeaseKey) {
        self.state
            .lock()
            .await
            .resources
            .entry(key.clone())
            .or_insert(None);
    }

    /// Deletes the resource under a live lease.
    pub(crate) async fn revoke(&self, key: &LeaseKey) {
        self.state.lock().await.resources.remove(key);
    }

    pub(crate) async fn holder(&self, key: &LeaseKey) -> Option<LeaseId> {
        self.state
            .lock()
            .await
            .resources
            .get(key)
            .cloned()
            .flatten()
    }

    pub(crate) async fn counts(&self) -> CallCounts {
        self.state.lock().await.counts
    }

    pub(crate) async fn fail_acquires(&self) {
        self.state.lock().await.fail_acquires = true;
    }

    pub(crate) async fn fail_renewals(&self) {
        self.state.lock().await.fail_renewals = true;
    }

    pub(crate) async fn fail_releases(&self) {
        self.state.lock().await.fail_releases = true;
    }
}

#[async_trait]
impl LeaseStore for FakeLeaseStore {
    async fn acquire(&self, key: &LeaseKey, _lease_duration: Duration) -> AppResult<LeaseId> {
        let mut state = self.state.lock().await;
        state.counts.acquire += 1;
        if state.fail_acquires {
            return Err(AppError::Internal("store unavailable".to_owned()));
        }

        match state.resources.get_mut(key) {
            None => Err(AppError::NotFound(format!("resource '{key}' not found"))),
            Some(Some(_)) => Err(AppError::Conflict(format!("resource '{key}' is leased"))),
            Some(holder) => {
                let lease_id = LeaseId::generate();
                *holder = Some(lease_id.clone());
                Ok(lease_id)
            }
        }
    }

    async fn renew(&self, key: &LeaseKey, lease_id: &LeaseId) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.counts.renew += 1;
        if state.fail_renewals {
            return Err(AppError::Internal("store unavailable".to_owned()));
        }

        match state.resources.get(key) {
            Some(Some(holder)) if holder == lease_id => Ok(()),
            _ => Err(AppError::LeaseInvalid(format!(
                "lease '{lease_id}' on '{key}' is not held"
            ))),
        }
    }

    async fn release(&self, key: &LeaseKey, lease_id: &LeaseId) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.counts.release += 1;
        if state.fail_releases {
            return Err(AppError::Internal("store unavailable".to_owned()));
        }

        if let Some(holder) = state.resources.get_mut(key) {
            if holder.as_ref() == Some(lease_id) {
                *holder = None;
            }
        }

        Ok(())
    }

    async fn initialize(&self, key: &LeaseKey) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.counts.initialize += 1;
        state.resources.entry(key.clone()).or_insert(None);
        Ok(())
    }
}

/// Lease store fake replaying a fixed queue of acquire results.
///
/// Once the queue is drained every further acquire reports `NotFound`.
pub(crate) struct ScriptedLeaseStore {
    acquire_results: Mutex<VecDeque<AppResult<LeaseId>>>,
    counts: Mutex<CallCounts>,
}

impl ScriptedLeaseStore {
    pub(crate) fn new(acquire_results: Vec<AppResult<LeaseId>>) -> Arc<Self> {
        Arc::new(Self {
            acquire_results: Mutex::new(acquire_results.into()),
            counts: Mutex::new(CallCounts::default()),
        })
    }

    pub(crate) async fn counts(&self) -> CallCounts {
        *self.counts.lock().await
    }
}

#[async_trait]
impl LeaseStore for ScriptedLeaseStore {
    async fn acquire(&self, key: &LeaseKey, _lease_duration: Duration) -> AppResult<LeaseId> {
        self.counts.lock().await.acquire += 1;
        self.acquire_results
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(AppError::NotFound(format!("resource '{key}' not found"))))
    }

    async fn renew(&self, _key: &LeaseKey, _lease_id: &LeaseId) -> AppResult<()> {
        self.counts.lock().await.renew += 1;
        Ok(())
    }

    async fn release(&self, _key: &LeaseKey, _lease_id: &LeaseId) -> AppResult<()> {
        self.counts.lock().await.release += 1;
        Ok(())
    }

    async fn initialize(&self, _key: &LeaseKey) -> AppResult<()> {
        self.counts.lock().await.initialize += 1;
        Ok(())
    }
}

pub(crate) fn lease_key(name: &str) -> LeaseKey {
    LeaseKey::new(name).unwrap_or_else(|_| unreachable!())
}

pub(crate) fn mutex(store: &Arc<FakeLeaseStore>, name: &str) -> DistributedMutex {
    DistributedMutex::new(store.clone(), lease_key(name))
}

pub(crate) fn fast_settings() -> LeaseSettings {
    LeaseSettings::new(
        Duration::from_secs(60),
        Duration::from_secs(15),
        Duration::from_secs(10),
    )
    .unwrap_or_else(|_| unreachable!())
}
