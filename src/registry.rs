//! 快取適配器註冊表
//!
//! 以名稱對應建構函式。註冊表在應用程式組裝時建立並傳遞，不使用全域狀態。

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

use crate::redis::operations::cache::{CacheError, CacheOperations, SentinelCache};

/// Sentinel 快取的註冊名稱
pub const SENTINEL_ADAPTER: &str = "redis-sentinel";

/// 以配置字串建立快取實例的建構函式
pub type CacheConstructor = Arc<
    dyn Fn(String) -> BoxFuture<'static, Result<Box<dyn CacheOperations>, CacheError>>
        + Send
        + Sync,
>;

async fn start_sentinel(config: String) -> Result<Box<dyn CacheOperations>, CacheError> {
    let cache = SentinelCache::start(&config).await?;
    Ok(Box::new(cache) as Box<dyn CacheOperations>)
}

/// 快取適配器註冊表
#[derive(Clone, Default)]
pub struct CacheRegistry {
    constructors: HashMap<String, CacheConstructor>,
}

impl CacheRegistry {
    /// 創建空的註冊表
    pub fn new() -> Self {
        Self::default()
    }

    /// 創建已註冊 `redis-sentinel` 的註冊表
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.constructors.insert(
            SENTINEL_ADAPTER.to_string(),
            Arc::new(|config| start_sentinel(config).boxed()),
        );
        registry
    }

    /// 註冊適配器，名稱重複時返回錯誤
    pub fn register<F, Fut>(&mut self, name: &str, constructor: F) -> Result<(), CacheError>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Box<dyn CacheOperations>, CacheError>> + Send + 'static,
    {
        if self.constructors.contains_key(name) {
            return Err(CacheError::DuplicateAdapter(name.to_string()));
        }

        self.constructors.insert(
            name.to_string(),
            Arc::new(move |config| constructor(config).boxed()),
        );
        debug!("已註冊快取適配器: {}", name);
        Ok(())
    }

    /// 依名稱與配置字串建立快取
    pub async fn new_cache(
        &self,
        name: &str,
        config: &str,
    ) -> Result<Box<dyn CacheOperations>, CacheError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| CacheError::UnknownAdapter(name.to_string()))?;

        let cache = constructor(config.to_string()).await?;
        info!("已建立快取適配器: {}", name);
        Ok(cache)
    }

    /// 已註冊的適配器名稱（排序後）
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
