use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info};

use trailhead_core::coordination::{ExecutionHistory, ExecutionRecord, LeaseStore};
use trailhead_core::{CoreError, CoreResult};

fn history_key(workflow_id: &str) -> String {
    format!("workflow:history:{}", workflow_id)
}

fn store_error(err: redis::RedisError) -> CoreError {
    CoreError::InternalError(format!("redis: {}", err))
}

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        // Fail at start-up rather than on the first workflow run
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Connected to Redis");
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    /// SET NX EX: only set if key does not exist
    pub async fn set_nx_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool, redis::RedisError> {
        let mut conn = self.connection().await?;
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    /// Delete `key` only while it still holds `value`.
    pub async fn del_if_value(&self, key: &str, value: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.connection().await?;
        let script = redis::Script::new(r#"
            if redis.call("GET", KEYS[1]) == ARGV[1] then
                return redis.call("DEL", KEYS[1])
            else
                return 0
            end
        "#);

        let deleted: i64 = script.key(key).arg(value).invoke_async(&mut conn).await?;
        Ok(deleted == 1)
    }

    /// LPUSH + LTRIM + EXPIRE in one MULTI block.
    pub async fn push_capped(
        &self,
        key: &str,
        value: &str,
        limit: usize,
        ttl_seconds: u64,
    ) -> Result<(), redis::RedisError> {
        let mut conn = self.connection().await?;
        let stop = limit.saturating_sub(1) as isize;

        let _: () = redis::pipe()
            .atomic()
            .lpush(key, value)
            .ignore()
            .ltrim(key, 0, stop)
            .ignore()
            .expire(key, ttl_seconds as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    pub async fn lrange(&self, key: &str, limit: usize) -> Result<Vec<String>, redis::RedisError> {
        let mut conn = self.connection().await?;
        let stop = limit.saturating_sub(1) as isize;
        conn.lrange(key, 0, stop).await
    }
}

/// Workflow execution history as capped Redis lists.
pub struct RedisExecutionHistory {
    redis: RedisClient,
    limit: usize,
    retention: Duration,
}

impl RedisExecutionHistory {
    pub fn new(redis: RedisClient, limit: usize, retention: Duration) -> Self {
        Self {
            redis,
            limit: limit.max(1),
            retention,
        }
    }
}

#[async_trait]
impl ExecutionHistory for RedisExecutionHistory {
    async fn append(&self, record: &ExecutionRecord) -> CoreResult<()> {
        let payload = serde_json::to_string(record).map_err(CoreError::internal)?;
        self.redis
            .push_capped(
                &history_key(&record.workflow_id),
                &payload,
                self.limit,
                self.retention.as_secs(),
            )
            .await
            .map_err(store_error)
    }

    async fn recent(&self, workflow_id: &str, limit: usize) -> CoreResult<Vec<ExecutionRecord>> {
        let raw = self
            .redis
            .lrange(&history_key(workflow_id), limit.min(self.limit))
            .await
            .map_err(store_error)?;

        Ok(raw
            .iter()
            .filter_map(|entry| match serde_json::from_str::<ExecutionRecord>(entry) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(workflow_id, error = %e, "Skipping unreadable history entry");
                    None
                }
            })
            .collect())
    }
}

/// Scheduler leases as `SET NX EX` keys holding the owner id.
pub struct RedisLeaseStore {
    redis: RedisClient,
}

impl RedisLeaseStore {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> CoreResult<bool> {
        self.redis
            .set_nx_ex(key, owner, ttl.as_secs().max(1))
            .await
            .map_err(store_error)
    }

    async fn release(&self, key: &str, owner: &str) -> CoreResult<()> {
        self.redis
            .del_if_value(key, owner)
            .await
            .map(|_| ())
            .map_err(store_error)
    }
}
