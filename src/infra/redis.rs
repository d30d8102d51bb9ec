//! Redis-backed [`KeyValueStore`].

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime, redis};

use crate::cache::{KeyValueStore, KvError};

use super::error::InfraError;

#[derive(Clone)]
pub struct RedisKeyValueStore {
    pool: Pool,
}

impl RedisKeyValueStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a pool for `url`. Connections are opened lazily on first use.
    pub fn connect(url: &str, max_connections: usize) -> Result<Self, InfraError> {
        let mut config = Config::from_url(url);
        config.pool = Some(PoolConfig::new(max_connections));
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|err| InfraError::cache(format!("failed to create redis pool: {err}")))?;
        Ok(Self::new(pool))
    }

    pub async fn health_check(&self) -> Result<(), KvError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_redis_error)
    }

    async fn connection(&self) -> Result<Connection, KvError> {
        self.pool.get().await.map_err(KvError::unavailable)
    }
}

#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.connection().await?;
        redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut conn = self.connection().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn create_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, KvError> {
        let mut conn = self.connection().await?;
        // SET NX replies OK when created and nil when the key already exists.
        let reply = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.connection().await?;
        let removed = redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(removed > 0)
    }
}

/// Redis rejects a zero expiry, so sub-millisecond TTLs round up to one.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn map_redis_error(err: redis::RedisError) -> KvError {
    if err.is_timeout() {
        KvError::Timeout
    } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        KvError::unavailable(err)
    } else {
        KvError::protocol(err)
    }
}
