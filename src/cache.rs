// Disclaimer status cache
// Caches has_active_disclaimer per user in Redis; a no-op cache is used when
// Redis is not configured. Cache failures are logged and treated as misses.
// Each value records the content version it was computed against, so a newly
// published version turns every older cached value into a miss.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use rust_decimal::Decimal;

/// Seconds a cached status stays valid
pub const STATUS_TTL_SECS: u64 = 6000;

/// Cache key for a user's active-disclaimer flag
pub fn status_key(user_id: i32) -> String {
    format!("user_{}_active_disclaimer", user_id)
}

/// Stored form: "true|2.0"
fn encode_status(active: bool, version: Decimal) -> String {
    format!("{}|{}", active, version)
}

/// None when the value is malformed or was computed for another version
fn decode_status(value: &str, current_version: Decimal) -> Option<bool> {
    let (active, version) = value.split_once('|')?;
    let version: Decimal = version.parse().ok()?;
    if version != current_version {
        return None;
    }
    active.parse().ok()
}

#[async_trait]
pub trait StatusCache: Send + Sync {
    async fn get(&self, user_id: i32, current_version: Decimal) -> Option<bool>;
    async fn set(&self, user_id: i32, current_version: Decimal, active: bool);
    async fn invalidate(&self, user_id: i32);
}

/// Cache used when no Redis URL is configured
pub struct NoopStatusCache;

#[async_trait]
impl StatusCache for NoopStatusCache {
    async fn get(&self, _user_id: i32, _current_version: Decimal) -> Option<bool> {
        None
    }

    async fn set(&self, _user_id: i32, _current_version: Decimal, _active: bool) {}

    async fn invalidate(&self, _user_id: i32) {}
}

/// Redis-backed status cache
pub struct RedisStatusCache {
    conn: ConnectionManager,
}

impl RedisStatusCache {
    /// Connect to Redis at `url`
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to Redis disclaimer status cache");
        Ok(Self { conn })
    }
}

#[async_trait]
impl StatusCache for RedisStatusCache {
    async fn get(&self, user_id: i32, current_version: Decimal) -> Option<bool> {
        let mut conn = self.conn.clone();
        let result = redis::cmd("GET")
            .arg(status_key(user_id))
            .query_async::<_, Option<String>>(&mut conn)
            .await;
        match result {
            Ok(value) => value.and_then(|v| decode_status(&v, current_version)),
            Err(e) => {
                tracing::warn!("Redis GET failed for user {}: {}", user_id, e);
                None
            }
        }
    }

    async fn set(&self, user_id: i32, current_version: Decimal, active: bool) {
        let mut conn = self.conn.clone();
        let result = redis::cmd("SET")
            .arg(status_key(user_id))
            .arg(encode_status(active, current_version))
            .arg("EX")
            .arg(STATUS_TTL_SECS)
            .query_async::<_, ()>(&mut conn)
            .await;
        if let Err(e) = result {
            tracing::warn!("Redis SET failed for user {}: {}", user_id, e);
        }
    }

    async fn invalidate(&self, user_id: i32) {
        let mut conn = self.conn.clone();
        let result = redis::cmd("DEL")
            .arg(status_key(user_id))
            .query_async::<_, ()>(&mut conn)
            .await;
        if let Err(e) = result {
            tracing::warn!("Redis DEL failed for user {}: {}", user_id, e);
        }
    }
}

/// In-process cache holding the same encoded values as Redis
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStatusCache {
    values: tokio::sync::Mutex<std::collections::HashMap<i32, String>>,
}

#[cfg(test)]
#[async_trait]
impl StatusCache for MemoryStatusCache {
    async fn get(&self, user_id: i32, current_version: Decimal) -> Option<bool> {
        let values = self.values.lock().await;
        values
            .get(&user_id)
            .and_then(|v| decode_status(v, current_version))
    }

    async fn set(&self, user_id: i32, current_version: Decimal, active: bool) {
        self.values
            .lock()
            .await
            .insert(user_id, encode_status(active, current_version));
    }

    async fn invalidate(&self, user_id: i32) {
        self.values.lock().await.remove(&user_id);
    }
}
