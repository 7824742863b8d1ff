use std::collections::HashMap;
use std::future::Future;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::RwLock;

use super::DashboardError;

/// 仪表盘查询结果缓存，以 SQL 文本为键，进程存活期间不失效
#[derive(Default)]
pub struct QueryCache {
    entries: RwLock<HashMap<String, Value>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn get_or_fetch<T, F, Fut>(&self, key: &str, fetch: F) -> Result<T, DashboardError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        // 尝试从缓存获取
        if let Some(cached) = self.entries.read().await.get(key) {
            tracing::debug!("dashboard query served from cache");
            return Ok(T::deserialize(cached)?);
        }

        let fresh = fetch().await?;
        let value = serde_json::to_value(&fresh)?;
        self.entries.write().await.insert(key.to_string(), value);
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn second_lookup_hits_the_cache() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let rows: Vec<i64> = cache
                .get_or_fetch("SELECT 1", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await
                .unwrap();
            assert_eq!(rows, [1, 2, 3]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = QueryCache::new();
        let err = cache
            .get_or_fetch::<Vec<i64>, _, _>("SELECT broken", || async {
                Err(sqlx::Error::RowNotFound)
            })
            .await;
        assert!(err.is_err());
        assert!(cache.is_empty().await);

        let ok: Vec<i64> = cache
            .get_or_fetch("SELECT broken", || async { Ok(vec![7]) })
            .await
            .unwrap();
        assert_eq!(ok, [7]);
    }
}
