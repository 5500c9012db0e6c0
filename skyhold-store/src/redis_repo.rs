use redis::RedisResult;
use tracing::info;

/// Redis access used by the HTTP layer. Holds never live here: seat and
/// reservation state is read from Postgres inside each transaction.
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        info!("Redis client configured");
        Ok(Self { client })
    }

    /// Counts one request against `key`; true while the window budget holds.
    ///
    /// The window starts at the first request. `EXPIRE ... NX` (Redis 7+)
    /// only sets a TTL on a key that has none, so later requests never
    /// push the window back.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .cmd("EXPIRE")
            .arg(key)
            .arg(window_seconds)
            .arg("NX")
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

pub fn rate_limit_key(client: &str) -> String {
    format!("skyhold:ratelimit:{}", client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_key() {
        assert_eq!(rate_limit_key("10.0.0.1"), "skyhold:ratelimit:10.0.0.1");
    }

    #[tokio::test]
    #[ignore = "requires REDIS_URL"]
    async fn test_window_is_not_extended_by_later_requests() {
        let url = std::env::var("REDIS_URL").expect("REDIS_URL must be set");
        let client = RedisClient::new(&url).await.unwrap();
        let key = rate_limit_key(&format!("window-test-{}", std::process::id()));

        let mut conn = client.client.get_multiplexed_async_connection().await.unwrap();
        let _: i64 = redis::cmd("DEL").arg(&key).query_async(&mut conn).await.unwrap();

        assert!(client.check_rate_limit(&key, 2, 2).await.unwrap());
        assert!(client.check_rate_limit(&key, 2, 2).await.unwrap());
        assert!(!client.check_rate_limit(&key, 2, 2).await.unwrap());

        // Keep hitting the limit inside the window; none of these may move the expiry.
        tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
        assert!(!client.check_rate_limit(&key, 2, 2).await.unwrap());
        let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut conn).await.unwrap();
        assert!(ttl <= 1, "window was extended, ttl = {ttl}");

        tokio::time::sleep(std::time::Duration::from_millis(1200)).await;
        assert!(client.check_rate_limit(&key, 2, 2).await.unwrap());
    }
}
