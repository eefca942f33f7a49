use redis::RedisResult;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. Returns `true` while `key` is within `limit`.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = rate_limit_pipeline(key, window_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

/// `SET .. NX EX` starts the window and its TTL only if the key is absent;
/// `INCR` keeps the TTL, so later hits never push the expiry out.
fn rate_limit_pipeline(key: &str, window_seconds: i64) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("SET")
        .arg(key)
        .arg(0)
        .arg("NX")
        .arg("EX")
        .arg(window_seconds)
        .ignore()
        .incr(key, 1);
    pipe
}

pub fn rate_limit_key(client_ip: &str) -> String {
    format!("ratelimit:{}", client_ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_key() {
        assert_eq!(rate_limit_key("10.0.0.1"), "ratelimit:10.0.0.1");
    }

    #[test]
    fn test_rejects_malformed_url() {
        assert!(RedisClient::new("not a redis url").is_err());
    }

    #[test]
    fn test_window_ttl_is_set_only_on_first_hit() {
        let packed = rate_limit_pipeline("ratelimit:10.0.0.1", 60).get_packed_pipeline();
        let text = String::from_utf8_lossy(&packed);

        assert!(text.contains("MULTI"));
        assert!(text.contains("NX"));
        assert!(text.contains("INCR"));
        assert!(!text.contains("EXPIRE"));
    }

    // Needs a running Redis: REDIS_URL=redis://127.0.0.1/ cargo test -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_later_hits_do_not_extend_window() {
        let Ok(url) = std::env::var("REDIS_URL") else {
            return;
        };
        let redis = RedisClient::new(&url).unwrap();
        let key = format!("ratelimit:test-{}", std::process::id());
        let mut conn = redis.client.get_multiplexed_async_connection().await.unwrap();
        let _: () = redis::cmd("DEL").arg(&key).query_async(&mut conn).await.unwrap();

        assert!(redis.check_rate_limit(&key, 1, 30).await.unwrap());
        let _: () = redis::cmd("EXPIRE").arg(&key).arg(5).query_async(&mut conn).await.unwrap();

        // Over the limit, and the shortened TTL survives the extra hit
        assert!(!redis.check_rate_limit(&key, 1, 30).await.unwrap());
        let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut conn).await.unwrap();
        assert!(ttl <= 5 && ttl > 0, "ttl was {}", ttl);

        let _: () = redis::cmd("DEL").arg(&key).query_async(&mut conn).await.unwrap();
    }
}
