//! Leasehold single-instance worker runtime.

#![forbid(unsafe_code)]

use std::env;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use leasehold_application::{
    DistributedMutex, LeaseSettings, LeaseStore, SingleInstanceJob, SingleInstanceRunner,
};
use leasehold_core::{AppError, AppResult, LeaseKey};
use leasehold_infrastructure::{InMemoryLeaseStore, RedisLeaseStore};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
enum LeaseStoreConfig {
    Memory,
    Redis { redis_url: String },
}

#[derive(Debug, Clone)]
struct WorkerConfig {
    lease_store: LeaseStoreConfig,
    key_prefix: String,
    lease_key: LeaseKey,
    worker_id: String,
    lease_seconds: u64,
    renewal_seconds: u64,
    check_interval_ms: u64,
    job_tick_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let settings = LeaseSettings::new(
        Duration::from_secs(config.lease_seconds),
        Duration::from_secs(config.renewal_seconds),
        Duration::from_millis(config.check_interval_ms),
    )?;
    let store = build_lease_store(&config)?;
    let mutex = DistributedMutex::with_settings(store, config.lease_key.clone(), settings);
    let runner = SingleInstanceRunner::new(mutex);

    let shutdown = CancellationToken::new();
    spawn_shutdown_listener(shutdown.clone(), tokio::signal::ctrl_c());

    info!(
        worker_id = %config.worker_id,
        lease_key = %config.lease_key,
        key_prefix = %config.key_prefix,
        lease_seconds = config.lease_seconds,
        renewal_seconds = config.renewal_seconds,
        check_interval_ms = config.check_interval_ms,
        "leasehold-worker started"
    );

    let worker_id = config.worker_id.clone();
    let job_tick = Duration::from_millis(config.job_tick_ms);
    let job = runner.ensure_single_instance(move |cancellation| {
        tick_job(worker_id.clone(), job_tick, cancellation)
    });

    run_until_stopped(config.worker_id.as_str(), job, shutdown).await
}

/// Runs `job` until it finishes or `shutdown` fires, re-acquiring after
/// every lease loss.
async fn run_until_stopped(
    worker_id: &str,
    job: SingleInstanceJob<u64>,
    shutdown: CancellationToken,
) -> AppResult<()> {
    loop {
        match job(shutdown.clone()).await {
            Ok(ticks) => {
                info!(worker_id = %worker_id, ticks, "single-instance job finished");
                return Ok(());
            }
            Err(AppError::Cancelled(reason)) => {
                info!(worker_id = %worker_id, reason = %reason, "leasehold-worker stopped");
                return Ok(());
            }
            Err(AppError::LeaseLost(reason)) => {
                warn!(
                    worker_id = %worker_id,
                    reason = %reason,
                    "lease lost, re-entering acquisition"
                );
            }
            Err(error) => return Err(error),
        }
    }
}

async fn tick_job(
    worker_id: String,
    tick: Duration,
    cancellation: CancellationToken,
) -> AppResult<u64> {
    let mut ticks = 0_u64;
    let mut interval = tokio::time::interval(tick);

    loop {
        tokio::select! {
            () = cancellation.cancelled() => {
                info!(worker_id = %worker_id, ticks, "single-instance job cancelled");
                return Err(AppError::Cancelled("single-instance job cancelled".to_owned()));
            }
            _ = interval.tick() => {
                ticks = ticks.saturating_add(1);
                info!(worker_id = %worker_id, ticks, "single-instance job tick");
            }
        }
    }
}

fn build_lease_store(config: &WorkerConfig) -> AppResult<Arc<dyn LeaseStore>> {
    match &config.lease_store {
        LeaseStoreConfig::Memory => Ok(Arc::new(InMemoryLeaseStore::new())),
        LeaseStoreConfig::Redis { redis_url } => {
            let client = redis::Client::open(redis_url.as_str()).map_err(|error| {
                AppError::Validation(format!("invalid REDIS_URL: {error}"))
            })?;
            Ok(Arc::new(RedisLeaseStore::new(
                client,
                config.key_prefix.as_str(),
                config.worker_id.as_str(),
            )?))
        }
    }
}

fn spawn_shutdown_listener<S>(shutdown: CancellationToken, signal: S) -> JoinHandle<()>
where
    S: Future<Output = std::io::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                info!("shutdown signal received");
                shutdown.cancel();
            }
            Err(error) => warn!(
                error = %error,
                "failed to listen for shutdown signal, running until the job ends"
            ),
        }
    })
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let lease_store = match env::var("LEASE_STORE")
            .unwrap_or_else(|_| "redis".to_owned())
            .as_str()
        {
            "memory" => LeaseStoreConfig::Memory,
            "redis" => LeaseStoreConfig::Redis {
                redis_url: required_env("REDIS_URL")?,
            },
            other => {
                return Err(AppError::Validation(format!(
                    "LEASE_STORE must be either 'memory' or 'redis', got '{other}'"
                )));
            }
        };

        let key_prefix = env::var("LEASE_KEY_PREFIX").unwrap_or_else(|_| "leasehold".to_owned());
        let lease_key = LeaseKey::new(
            env::var("LEASE_KEY").unwrap_or_else(|_| "singleton".to_owned()),
        )
        .map_err(|error| AppError::Validation(format!("invalid LEASE_KEY: {error}")))?;
        let worker_id = env::var("WORKER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));
        let lease_seconds = parse_env_u64("LEASE_SECONDS", 60)?;
        let renewal_seconds = parse_env_u64("RENEWAL_SECONDS", 15)?;
        let check_interval_ms = parse_env_u64("CHECK_INTERVAL_MS", 60_000)?;
        let job_tick_ms = parse_env_u64("JOB_TICK_MS", 5_000)?;

        if job_tick_ms == 0 {
            return Err(AppError::Validation(
                "JOB_TICK_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            lease_store,
            key_prefix,
            lease_key,
            worker_id,
            lease_seconds,
            renewal_seconds,
            check_interval_ms,
            job_tick_ms,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    parse_u64_value(name, env::var(name).ok().as_deref(), default)
}

fn parse_u64_value(name: &str, value: Option<&str>, default: u64) -> AppResult<u64> {
    match value {
        Some(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}
