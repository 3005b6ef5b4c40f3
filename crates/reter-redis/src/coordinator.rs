//! Redis implementation of [`CoordinationBackend`]
//!
//! Keys:
//! - `<prefix>last-run:<task>` holds the RFC3339 last-run record
//! - `<prefix>lock:<task>` holds the random token of the current lock holder
//!
//! Locks are taken with `SET NX PX` and released with a compare-and-delete
//! script, so a holder whose lock expired cannot delete a successor's lock.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{RedisError, Script};
use reter_core::{CoordinationBackend, CoordinationError, CoordinationResult, LockHandle};
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::settings::{redact, RedisSettings};

static RELEASE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#,
    )
});

struct Endpoint {
    name: String,
    client: redis::Client,
}

/// Connection state shared by the coordinator and its lock handles
struct Shared {
    endpoints: Vec<Endpoint>,
    connection: Mutex<Option<MultiplexedConnection>>,
    dial_timeout: Duration,
    verbose_warnings: bool,
}

impl Shared {
    fn report(&self, endpoint: &str, message: &str, error: &dyn fmt::Display) {
        if self.verbose_warnings {
            warn!(endpoint = %endpoint, error = %error, "{}", message);
        } else {
            debug!(endpoint = %endpoint, error = %error, "{}", message);
        }
    }

    /// Cached connection, or the first endpoint that accepts one
    async fn connection(&self) -> CoordinationResult<MultiplexedConnection> {
        let mut cached = self.connection.lock().await;
        if let Some(conn) = cached.as_ref() {
            return Ok(conn.clone());
        }

        let mut last_error = String::from("no endpoints configured");
        for endpoint in &self.endpoints {
            let attempt = tokio::time::timeout(
                self.dial_timeout,
                endpoint.client.get_multiplexed_async_connection(),
            )
            .await;

            match attempt {
                Ok(Ok(conn)) => {
                    debug!(endpoint = %endpoint.name, "Connected to Redis");
                    *cached = Some(conn.clone());
                    return Ok(conn);
                }
                Ok(Err(e)) => {
                    self.report(&endpoint.name, "Redis endpoint unreachable", &e);
                    last_error = format!("{}: {}", endpoint.name, e);
                }
                Err(_) => {
                    let e = format!("dial timed out after {:?}", self.dial_timeout);
                    self.report(&endpoint.name, "Redis endpoint unreachable", &e);
                    last_error = format!("{}: {}", endpoint.name, e);
                }
            }
        }

        Err(CoordinationError::Unavailable(last_error))
    }

    /// Map a command failure, dropping the cached connection when it broke
    async fn failure(&self, command: &str, e: RedisError) -> CoordinationError {
        let message = format!("Redis {} failed: {}", command, e);
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
        {
            self.connection.lock().await.take();
            self.report("cached", "Dropping Redis connection", &e);
            CoordinationError::Unavailable(message)
        } else {
            CoordinationError::Backend(message)
        }
    }

    async fn get(&self, key: &str) -> CoordinationResult<Option<String>> {
        let mut conn = self.connection().await?;
        match redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await
        {
            Ok(value) => Ok(value),
            Err(e) => Err(self.failure("GET", e).await),
        }
    }

    async fn set(&self, key: &str, value: &str) -> CoordinationResult<()> {
        let mut conn = self.connection().await?;
        match redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => Err(self.failure("SET", e).await),
        }
    }

    /// `SET key token NX PX ttl`; true when the key was set
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> CoordinationResult<bool> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.connection().await?;
        match redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<Option<String>>(&mut conn)
            .await
        {
            Ok(reply) => Ok(reply.is_some()),
            Err(e) => Err(self.failure("SET NX", e).await),
        }
    }

    /// Delete `key` only while it still holds `token`; true when deleted
    async fn delete_if_owner(&self, key: &str, token: &str) -> CoordinationResult<bool> {
        let mut conn = self.connection().await?;
        match RELEASE_SCRIPT
            .key(key)
            .arg(token)
            .invoke_async::<i64>(&mut conn)
            .await
        {
            Ok(deleted) => Ok(deleted > 0),
            Err(e) => Err(self.failure("lock release", e).await),
        }
    }
}

/// Coordination backend backed by one or more Redis endpoints
#[derive(Clone)]
pub struct RedisCoordinator {
    shared: Arc<Shared>,
    key_prefix: String,
}

impl RedisCoordinator {
    /// Create a coordinator; no connection is made until the first call
    ///
    /// # Errors
    ///
    /// Returns error if no endpoint is configured or an endpoint URL is invalid
    pub fn new(settings: RedisSettings) -> CoordinationResult<Self> {
        if settings.endpoints.is_empty() {
            return Err(CoordinationError::Unavailable(
                "no Redis endpoints configured".to_string(),
            ));
        }

        let endpoints = settings
            .endpoints
            .iter()
            .map(|url| {
                let name = redact(url);
                redis::Client::open(url.as_str())
                    .map(|client| Endpoint {
                        name: name.clone(),
                        client,
                    })
                    .map_err(|e| {
                        CoordinationError::Backend(format!(
                            "invalid Redis endpoint {}: {}",
                            name, e
                        ))
                    })
            })
            .collect::<CoordinationResult<Vec<_>>>()?;

        Ok(Self {
            shared: Arc::new(Shared {
                endpoints,
                connection: Mutex::new(None),
                dial_timeout: settings.dial_timeout,
                verbose_warnings: settings.verbose_warnings,
            }),
            key_prefix: settings.key_prefix,
        })
    }

    /// Redis key of the last-run record of `task`
    pub fn last_run_key(&self, task: &str) -> String {
        format!("{}last-run:{}", self.key_prefix, task)
    }

    /// Redis key of the lock of `task`
    pub fn lock_key(&self, task: &str) -> String {
        format!("{}lock:{}", self.key_prefix, task)
    }

    /// Configured endpoints with credentials removed
    pub fn endpoints(&self) -> Vec<String> {
        self.shared
            .endpoints
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }
}

impl fmt::Debug for RedisCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCoordinator")
            .field("endpoints", &self.endpoints())
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CoordinationBackend for RedisCoordinator {
    async fn get(&self, key: &str) -> CoordinationResult<Option<String>> {
        self.shared.get(&self.last_run_key(key)).await
    }

    async fn put(&self, key: &str, value: &str) -> CoordinationResult<()> {
        self.shared.set(&self.last_run_key(key), value).await
    }

    async fn acquire_lock(
        &self,
        key: &str,
        ttl: Duration,
    ) -> CoordinationResult<Box<dyn LockHandle>> {
        let redis_key = self.lock_key(key);
        let token = Uuid::new_v4().to_string();

        if !self.shared.set_if_absent(&redis_key, &token, ttl).await? {
            return Err(CoordinationError::AlreadyLocked {
                key: key.to_string(),
            });
        }
        trace!(key = %redis_key, "Redis lock acquired");

        Ok(Box::new(RedisLock {
            key: key.to_string(),
            redis_key,
            token,
            shared: self.shared.clone(),
        }))
    }
}

struct RedisLock {
    key: String,
    redis_key: String,
    token: String,
    shared: Arc<Shared>,
}

#[async_trait]
impl LockHandle for RedisLock {
    fn key(&self) -> &str {
        &self.key
    }

    async fn release(self: Box<Self>) -> CoordinationResult<()> {
        if self
            .shared
            .delete_if_owner(&self.redis_key, &self.token)
            .await?
        {
            trace!(key = %self.redis_key, "Redis lock released");
            Ok(())
        } else {
            Err(CoordinationError::LockLost { key: self.key })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_keys_use_prefix() {
        let coordinator =
            assert_ok!(RedisCoordinator::new(RedisSettings::default().with_key_prefix("jobs:")));
        assert_eq!(coordinator.last_run_key("t1"), "jobs:last-run:t1");
        assert_eq!(coordinator.lock_key("t1"), "jobs:lock:t1");
    }

    #[test]
    fn test_rejects_empty_endpoints() {
        let err = assert_err!(RedisCoordinator::new(RedisSettings::new(Vec::<String>::new())));
        assert!(matches!(err, CoordinationError::Unavailable(_)));
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        let err = assert_err!(RedisCoordinator::new(RedisSettings::new(["not-a-url"])));
        assert!(matches!(err, CoordinationError::Backend(_)));
    }

    #[test]
    fn test_endpoints_are_redacted() {
        let coordinator = RedisCoordinator::new(RedisSettings::new([
            "redis://:secret@primary:6379",
            "redis://replica:6379",
        ]))
        .unwrap();
        assert_eq!(
            coordinator.endpoints(),
            vec!["redis://primary:6379", "redis://replica:6379"]
        );
        assert!(!format!("{:?}", coordinator).contains("secret"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let coordinator = RedisCoordinator::new(
            RedisSettings::new(["redis://127.0.0.1:1"]).with_dial_timeout(Duration::from_secs(1)),
        )
        .unwrap();

        let err = assert_err!(coordinator.get("t1").await);
        assert!(matches!(err, CoordinationError::Unavailable(_)));
    }

    // Redis tests require a running Redis instance
    // Run with: cargo test --features redis-tests
    #[cfg(feature = "redis-tests")]
    mod live {
        use super::*;

        fn coordinator(prefix: &str) -> RedisCoordinator {
            let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
            RedisCoordinator::new(RedisSettings::new([url]).with_key_prefix(prefix)).unwrap()
        }

        #[tokio::test]
        async fn test_last_run_round_trip() {
            let store = coordinator(&format!("test:{}:", Uuid::new_v4()));
            assert_eq!(store.get("t1").await.unwrap(), None);

            assert_ok!(store.put("t1", "2024-01-01T00:00:00Z").await);
            assert_eq!(
                store.get("t1").await.unwrap().as_deref(),
                Some("2024-01-01T00:00:00Z")
            );
        }

        #[tokio::test]
        async fn test_lock_contention_and_release() {
            let prefix = format!("test:{}:", Uuid::new_v4());
            let first = coordinator(&prefix);
            let second = coordinator(&prefix);
            let ttl = Duration::from_secs(10);

            let lock = assert_ok!(first.acquire_lock("t1", ttl).await);
            let err = second.acquire_lock("t1", ttl).await.err().unwrap();
            assert!(err.is_contention());

            assert_ok!(lock.release().await);
            let lock = assert_ok!(second.acquire_lock("t1", ttl).await);
            assert_ok!(lock.release().await);
        }

        #[tokio::test]
        async fn test_expired_lock_is_lost() {
            let store = coordinator(&format!("test:{}:", Uuid::new_v4()));

            let stale = store.acquire_lock("t1", Duration::from_millis(50)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(150)).await;
            let fresh = store.acquire_lock("t1", Duration::from_secs(10)).await.unwrap();

            assert_eq!(
                stale.release().await,
                Err(CoordinationError::LockLost {
                    key: "t1".to_string()
                })
            );
            assert_ok!(fresh.release().await);
        }

        #[tokio::test]
        async fn test_fails_over_to_next_endpoint() {
            let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
            let store = RedisCoordinator::new(
                RedisSettings::new(["redis://127.0.0.1:1".to_string(), url])
                    .with_key_prefix(format!("test:{}:", Uuid::new_v4()))
                    .with_dial_timeout(Duration::from_secs(1)),
            )
            .unwrap();

            assert_eq!(store.get("t1").await.unwrap(), None);
        }
    }
}
