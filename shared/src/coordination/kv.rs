//! The KV store capability (spec §4.1, §6): a Redis-like service offering
//! an atomic "set-if-absent with TTL" primitive and a compare-and-delete
//! release, grounded on vaultfs's `CacheService`
//! (`src/services/cache.rs`), which wraps `deadpool_redis::Pool` behind
//! plain `get`/`set`/`delete` methods. The locks, notifying-order
//! records, and blacklist entries in this module are all built on top of
//! the same handful of primitives.

use async_trait::async_trait;
use redis::AsyncCommands;

/// Everything §4.1's coordination primitives need from the KV store.
/// `set_if_absent`/`compare_delete`/`compare_expire` are the scripted,
/// atomic operations; `get`/`set_ex`/`delete` back the notifying-order
/// and blacklist records, which have no compare-and-swap requirement.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// `SET key value NX EX ttl_secs`. `true` iff the key was absent and
    /// is now set to `value`.
    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> anyhow::Result<bool>;

    /// Delete `key` only if its current value equals `expected`. `true`
    /// iff the delete happened. The release half of every named lock.
    async fn compare_delete(&self, key: &str, expected: &str) -> anyhow::Result<bool>;

    /// Reset `key`'s TTL only if its current value equals `expected`.
    /// The extension half of the dispatch lock.
    async fn compare_expire(&self, key: &str, expected: &str, ttl_secs: u64) -> anyhow::Result<bool>;

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> anyhow::Result<()>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    async fn exists(&self, key: &str) -> anyhow::Result<bool>;
}

/// Production implementation over a pooled Redis connection.
pub struct RedisKvStore {
    pool: deadpool_redis::Pool,
}

impl RedisKvStore {
    pub fn new(pool: deadpool_redis::Pool) -> Self {
        Self { pool }
    }
}

const COMPARE_DELETE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

const COMPARE_EXPIRE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("expire", KEYS[1], ARGV[2])
else
    return 0
end
"#;

#[async_trait]
impl KvStore for RedisKvStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> anyhow::Result<bool> {
        let mut conn = self.pool.get().await?;
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    async fn compare_delete(&self, key: &str, expected: &str) -> anyhow::Result<bool> {
        let mut conn = self.pool.get().await?;
        let result: i64 = redis::Script::new(COMPARE_DELETE_SCRIPT)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(result == 1)
    }

    async fn compare_expire(&self, key: &str, expected: &str, ttl_secs: u64) -> anyhow::Result<bool> {
        let mut conn = self.pool.get().await?;
        let result: i64 = redis::Script::new(COMPARE_EXPIRE_SCRIPT)
            .key(key)
            .arg(expected)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;
        Ok(result == 1)
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let mut conn = self.pool.get().await?;
        Ok(conn.exists(key).await?)
    }
}
