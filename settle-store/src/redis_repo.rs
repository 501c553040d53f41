use async_trait::async_trait;
use settle_core::lock::{DistributedLock, LockToken};
use settle_core::BoxError;
use std::time::Duration;
use tracing::debug;

// Delete only while the key still carries our token
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl DistributedLock for RedisClient {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, BoxError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let token = LockToken::generate();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        // SET NX PX: create-if-absent with the expiry attached in the same command
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(result.map(|_| token))
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, BoxError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let removed: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await?;

        if removed == 0 {
            debug!("Lock {} no longer held by this token", key);
        }
        Ok(removed == 1)
    }
}
