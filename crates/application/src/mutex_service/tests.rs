use std::time::Duration;

use leasehold_core::AppError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::test_support::{FakeLeaseStore, ScriptedLeaseStore, lease_key, mutex};

use super::{DistributedMutex, LeaseSettings};

#[tokio::test]
async fn acquire_initializes_missing_resource_once() {
    let store = FakeLeaseStore::new();
    let mutex = mutex(&store, "mutex");

    let lease = mutex.acquire().await;
    assert!(lease.is_ok());

    let counts = store.counts().await;
    assert_eq!(counts.initialize, 1);
    assert_eq!(counts.acquire, 2);
    assert!(store.holder(&lease_key("mutex")).await.is_some());
}

#[tokio::test]
async fn acquire_skips_initialization_for_existing_resource() {
    let store = FakeLeaseStore::new();
    store.provision(&lease_key("mutex")).await;

    let lease = mutex(&store, "mutex").acquire().await;
    assert!(lease.is_ok());

    let counts = store.counts().await;
    assert_eq!(counts.initialize, 0);
    assert_eq!(counts.acquire, 1);
}

#[tokio::test]
async fn concurrent_acquire_reports_concurrent_access() {
    let store = FakeLeaseStore::new();
    let held = mutex(&store, "mutex").acquire().await;
    assert!(held.is_ok());

    let concurrent = mutex(&store, "mutex").acquire().await;
    assert!(matches!(concurrent, Err(AppError::ConcurrentAccess(_))));

    let polled = mutex(&store, "mutex").try_acquire().await;
    assert!(matches!(polled, Ok(None)));
}

#[tokio::test]
async fn conflict_after_initialization_reports_lock_taken() {
    let store = ScriptedLeaseStore::new(vec![
        Err(AppError::NotFound("resource 'mutex' not found".to_owned())),
        Err(AppError::Conflict("resource 'mutex' is leased".to_owned())),
    ]);
    let mutex = DistributedMutex::new(store.clone(), lease_key("mutex"));

    let polled = mutex.try_acquire().await;
    assert!(matches!(polled, Ok(None)));

    let counts = store.counts().await;
    assert_eq!(counts.acquire, 2);
    assert_eq!(counts.initialize, 1);
}

#[tokio::test]
async fn resource_still_missing_after_initialization_is_retried_once() {
    let store = ScriptedLeaseStore::new(Vec::new());
    let mutex = DistributedMutex::new(store.clone(), lease_key("mutex"));

    let polled = mutex.try_acquire().await;
    assert!(matches!(polled, Err(AppError::NotFound(_))));

    let counts = store.counts().await;
    assert_eq!(counts.acquire, 2);
    assert_eq!(counts.initialize, 1);
}

#[tokio::test]
async fn different_keys_do_not_contend() {
    let store = FakeLeaseStore::new();
    let left = mutex(&store, "left").acquire().await;
    let right = mutex(&store, "right").acquire().await;

    assert!(left.is_ok());
    assert!(right.is_ok());
}

#[tokio::test]
async fn other_store_failures_propagate_unchanged() {
    let store = FakeLeaseStore::new();
    store.fail_acquires().await;

    let acquired = mutex(&store, "mutex").try_acquire().await;
    assert!(matches!(acquired, Err(AppError::Internal(_))));
    assert_eq!(store.counts().await.initialize, 0);
}

#[tokio::test]
async fn releasing_twice_contacts_store_once() {
    let store = FakeLeaseStore::new();
    let lease = mutex(&store, "mutex").acquire().await;
    assert!(lease.is_ok());
    let lease = lease.unwrap_or_else(|_| unreachable!());

    lease.release().await;
    lease.release().await;
    assert_eq!(store.counts().await.release, 1);
    assert!(!lease.is_live());

    let reacquired = mutex(&store, "mutex").try_acquire().await;
    assert!(matches!(reacquired, Ok(Some(_))));
}

#[tokio::test]
async fn release_failure_is_not_surfaced() {
    let store = FakeLeaseStore::new();
    let lease = mutex(&store, "mutex").acquire().await;
    assert!(lease.is_ok());
    let lease = lease.unwrap_or_else(|_| unreachable!());
    store.fail_releases().await;

    lease.release().await;
    lease.release().await;

    assert_eq!(store.counts().await.release, 1);
}

#[tokio::test]
async fn renew_keeps_lock_exclusive() {
    let store = FakeLeaseStore::new();
    let lease = mutex(&store, "mutex").acquire().await;
    assert!(lease.is_ok());
    let lease = lease.unwrap_or_else(|_| unreachable!());

    assert!(lease.renew().await.is_ok());

    let concurrent = mutex(&store, "mutex").acquire().await;
    assert!(matches!(concurrent, Err(AppError::ConcurrentAccess(_))));
}

#[tokio::test]
async fn renew_after_revocation_retires_lease() {
    let store = FakeLeaseStore::new();
    let lease = mutex(&store, "mutex").acquire().await;
    assert!(lease.is_ok());
    let lease = lease.unwrap_or_else(|_| unreachable!());
    store.revoke(&lease_key("mutex")).await;

    let renewed = lease.renew().await;
    assert!(matches!(renewed, Err(AppError::LeaseInvalid(_))));
    assert!(!lease.is_live());

    let renewed_again = lease.renew().await;
    assert!(matches!(renewed_again, Err(AppError::LeaseInvalid(_))));
    assert_eq!(store.counts().await.renew, 1);
}

#[tokio::test]
async fn renew_after_release_does_not_contact_store() {
    let store = FakeLeaseStore::new();
    let lease = mutex(&store, "mutex").acquire().await;
    assert!(lease.is_ok());
    let lease = lease.unwrap_or_else(|_| unreachable!());

    lease.release().await;
    let renewed = lease.renew().await;

    assert!(matches!(renewed, Err(AppError::LeaseInvalid(_))));
    assert_eq!(store.counts().await.renew, 0);
}

#[tokio::test]
async fn dropped_lease_is_released_in_background() {
    let store = FakeLeaseStore::new();
    let lease = mutex(&store, "mutex").acquire().await;
    assert!(lease.is_ok());
    drop(lease);

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert!(store.holder(&lease_key("mutex")).await.is_none());
    assert_eq!(store.counts().await.release, 1);
}

#[tokio::test(start_paused = true)]
async fn acquire_or_wait_polls_until_released() {
    let store = FakeLeaseStore::new();
    let held = mutex(&store, "mutex").acquire().await;
    assert!(held.is_ok());
    let held = held.unwrap_or_else(|_| unreachable!());

    let waiter: DistributedMutex = mutex(&store, "mutex");
    let started = Instant::now();
    let waiting = tokio::spawn(async move {
        let cancellation = CancellationToken::new();
        waiter
            .acquire_or_wait(&cancellation, Duration::from_secs(10))
            .await
    });

    tokio::time::sleep(Duration::from_secs(25)).await;
    held.release().await;

    let acquired = waiting.await;
    assert!(matches!(acquired, Ok(Ok(_))));
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert!(started.elapsed() < Duration::from_secs(31));
}

#[tokio::test(start_paused = true)]
async fn acquire_or_wait_observes_cancellation_between_polls() {
    let store = FakeLeaseStore::new();
    let held = mutex(&store, "mutex").acquire().await;
    assert!(held.is_ok());
    let acquires_before_wait = store.counts().await.acquire;

    let cancellation = CancellationToken::new();
    let trigger = cancellation.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let acquired = mutex(&store, "mutex")
        .acquire_or_wait(&cancellation, Duration::from_secs(60))
        .await;

    assert!(matches!(acquired, Err(AppError::Cancelled(_))));
    assert!(started.elapsed() < Duration::from_secs(60));
    assert_eq!(store.counts().await.acquire, acquires_before_wait + 1);
}

#[tokio::test]
async fn acquire_or_wait_with_cancelled_token_skips_store() {
    let store = FakeLeaseStore::new();
    let cancellation = CancellationToken::new();
    cancellation.cancel();

    let acquired = mutex(&store, "mutex")
        .acquire_or_wait(&cancellation, Duration::from_secs(1))
        .await;

    assert!(matches!(acquired, Err(AppError::Cancelled(_))));
    assert_eq!(store.counts().await.acquire, 0);
}

#[tokio::test]
async fn acquire_or_wait_rejects_zero_interval() {
    let store = FakeLeaseStore::new();
    let acquired = mutex(&store, "mutex")
        .acquire_or_wait(&CancellationToken::new(), Duration::ZERO)
        .await;

    assert!(matches!(acquired, Err(AppError::Validation(_))));
}

#[test]
fn settings_require_renewal_shorter_than_lease() {
    let settings = LeaseSettings::new(
        Duration::from_secs(15),
        Duration::from_secs(15),
        Duration::from_secs(60),
    );
    assert!(matches!(settings, Err(AppError::Validation(_))));

    let zero = LeaseSettings::new(Duration::from_secs(60), Duration::ZERO, Duration::from_secs(1));
    assert!(zero.is_err());
}

#[test]
fn default_settings_match_store_defaults() {
    let settings = LeaseSettings::default();
    assert_eq!(settings.lease_duration(), Duration::from_secs(60));
    assert_eq!(settings.renewal_period(), Duration::from_secs(15));
    assert_eq!(settings.check_interval(), Duration::from_secs(60));
    assert!(
        LeaseSettings::new(
            settings.lease_duration(),
            settings.renewal_period(),
            settings.check_interval()
        )
        .is_ok()
    );
}

#[tokio::test]
async fn mutex_shares_store_across_clones() {
    let store = FakeLeaseStore::new();
    let original = DistributedMutex::new(store.clone(), lease_key("mutex"));
    let cloned = original.clone();

    let lease = original.acquire().await;
    assert!(lease.is_ok());
    assert!(matches!(cloned.try_acquire().await, Ok(None)));
}
