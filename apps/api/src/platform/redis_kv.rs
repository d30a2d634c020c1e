use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::debug;

use crate::platform::{KeyValueStore, KvEntry, KvListing, PlatformError};

/// Key-value storage on Redis. Every key is stored under `<namespace>:` so
/// `flush` and `list` only ever touch this app's keys.
pub struct RedisKeyValue {
    client: redis::Client,
    namespace: String,
}

impl RedisKeyValue {
    pub fn new(client: redis::Client, namespace: &str) -> Self {
        Self {
            client,
            namespace: format!("{namespace}:"),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection, PlatformError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(kv_error)
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{key}", self.namespace)
    }

    fn strip<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(&self.namespace).unwrap_or(key)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, PlatformError> {
        let mut conn = self.connection().await?;
        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = conn
                .scan_match::<_, String>(self.namespaced(pattern))
                .await
                .map_err(kv_error)?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

fn kv_error(e: redis::RedisError) -> PlatformError {
    PlatformError::KeyValue(e.to_string())
}

#[async_trait]
impl KeyValueStore for RedisKeyValue {
    async fn get(&self, key: &str) -> Result<Option<String>, PlatformError> {
        let mut conn = self.connection().await?;
        conn.get(self.namespaced(key)).await.map_err(kv_error)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PlatformError> {
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(self.namespaced(key), value)
            .await
            .map_err(kv_error)
    }

    async fn delete(&self, key: &str) -> Result<bool, PlatformError> {
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(self.namespaced(key)).await.map_err(kv_error)?;
        Ok(removed > 0)
    }

    async fn list(&self, pattern: &str, with_values: bool) -> Result<KvListing, PlatformError> {
        let keys = self.scan(pattern).await?;
        if !with_values {
            return Ok(KvListing::Keys(
                keys.iter().map(|k| self.strip(k).to_string()).collect(),
            ));
        }
        if keys.is_empty() {
            return Ok(KvListing::Entries(Vec::new()));
        }

        let mut conn = self.connection().await?;
        let values: Vec<Option<String>> = conn.mget(&keys).await.map_err(kv_error)?;

        // Keys deleted between SCAN and MGET come back as nil and are dropped.
        let entries = keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| {
                value.map(|value| KvEntry {
                    key: self.strip(key).to_string(),
                    value,
                })
            })
            .collect();
        Ok(KvListing::Entries(entries))
    }

    async fn flush(&self) -> Result<(), PlatformError> {
        let keys = self.scan("*").await?;
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(&keys).await.map_err(kv_error)?;
        debug!("Flushed {removed} keys under {}", self.namespace);
        Ok(())
    }
}
