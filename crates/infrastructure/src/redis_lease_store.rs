//! Redis-backed lease store.
//!
//! Each lockable resource is a marker key; its lease lives in a hash at
//! `<marker>:lease` holding the token and duration, expiring with `PEXPIRE`.

use std::time::Duration;

use async_trait::async_trait;
use leasehold_application::LeaseStore;
use leasehold_core::{AppError, AppResult, LeaseId, LeaseKey};
use redis::{AsyncCommands, Script};
use tracing::debug;

const ACQUIRE_LEASE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return -1
end
if redis.call('EXISTS', KEYS[2]) == 1 then
  return 0
end
redis.call('HSET', KEYS[2], 'lease_id', ARGV[1], 'duration_ms', ARGV[2])
redis.call('PEXPIRE', KEYS[2], ARGV[2])
return 1
"#;

const RENEW_LEASE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
if redis.call('HGET', KEYS[2], 'lease_id') == ARGV[1] then
  return redis.call('PEXPIRE', KEYS[2], redis.call('HGET', KEYS[2], 'duration_ms'))
else
  return 0
end
"#;

const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'lease_id') == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Redis implementation of the lease store port.
#[derive(Clone)]
pub struct RedisLeaseStore {
    client: redis::Client,
    key_prefix: String,
    holder_id: String,
}

impl RedisLeaseStore {
    /// Creates one store adapter.
    ///
    /// `holder_id` prefixes every issued token so a lease can be traced back
    /// to the process holding it.
    pub fn new(
        client: redis::Client,
        key_prefix: impl Into<String>,
        holder_id: impl Into<String>,
    ) -> AppResult<Self> {
        let holder_id = holder_id.into();
        if holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "redis lease store holder_id must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
            holder_id,
        })
    }

    /// Deletes a lockable resource together with any lease on it.
    pub async fn delete_resource(&self, key: &LeaseKey) -> AppResult<()> {
        let mut connection = self.connection().await?;
        connection
            .del::<_, ()>(vec![self.resource_key(key), self.lease_key(key)])
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to delete lockable resource: {error}"))
            })
    }

    fn resource_key(&self, key: &LeaseKey) -> String {
        format!("{}:{key}", self.key_prefix)
    }

    fn lease_key(&self, key: &LeaseKey) -> String {
        format!("{}:{key}:lease", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn acquire(&self, key: &LeaseKey, lease_duration: Duration) -> AppResult<LeaseId> {
        let lease_ms = u64::try_from(lease_duration.as_millis()).map_err(|error| {
            AppError::Validation(format!("invalid lease duration: {error}"))
        })?;
        if lease_ms == 0 {
            return Err(AppError::Validation(
                "lease duration must be at least one millisecond".to_owned(),
            ));
        }

        let lease_id = LeaseId::new(format!("{}:{}", self.holder_id, uuid::Uuid::new_v4()))?;
        let mut connection = self.connection().await?;

        let script = Script::new(ACQUIRE_LEASE_SCRIPT);
        let acquired = script
            .key(self.resource_key(key))
            .key(self.lease_key(key))
            .arg(lease_id.as_str())
            .arg(lease_ms)
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| AppError::Internal(format!("failed to acquire lease: {error}")))?;

        match acquired {
            1 => Ok(lease_id),
            0 => Err(AppError::Conflict(format!(
                "lockable resource '{key}' is already leased"
            ))),
            _ => Err(AppError::NotFound(format!(
                "lockable resource '{key}' does not exist"
            ))),
        }
    }

    async fn renew(&self, key: &LeaseKey, lease_id: &LeaseId) -> AppResult<()> {
        let mut connection = self.connection().await?;

        let script = Script::new(RENEW_LEASE_SCRIPT);
        let renewed = script
            .key(self.resource_key(key))
            .key(self.lease_key(key))
            .arg(lease_id.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| AppError::Internal(format!("failed to renew lease: {error}")))?;

        if renewed > 0 {
            Ok(())
        } else {
            Err(AppError::LeaseInvalid(format!(
                "lease '{lease_id}' on '{key}' is expired or held by another owner"
            )))
        }
    }

    async fn release(&self, key: &LeaseKey, lease_id: &LeaseId) -> AppResult<()> {
        let mut connection = self.connection().await?;

        let script = Script::new(RELEASE_LEASE_SCRIPT);
        script
            .key(self.lease_key(key))
            .arg(lease_id.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| AppError::Internal(format!("failed to release lease: {error}")))?;

        Ok(())
    }

    async fn initialize(&self, key: &LeaseKey) -> AppResult<()> {
        let mut connection = self.connection().await?;

        let created: bool = connection
            .set_nx(self.resource_key(key), "")
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to create lockable resource: {error}"))
            })?;

        if created {
            debug!(lease_key = %key, "lockable resource created");
        }

        Ok(())
    }
}
