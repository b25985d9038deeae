use async_trait::async_trait;
use redis::{cmd, RedisError};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::types::SentinelCacheConfig;
use crate::config::validation::{ValidationError, Validator};
use crate::redis::pool::{RedisPoolError, SentinelPool};

/// 快取操作錯誤
#[derive(Error, Debug)]
pub enum CacheError {
    /// 配置錯誤（啟動時致命）
    #[error("快取配置錯誤: {0}")]
    Configuration(#[from] ValidationError),

    /// Redis連接錯誤
    #[error("Redis連接錯誤: {0}")]
    ConnectionError(#[from] RedisPoolError),

    /// 已取得連接後的傳輸或指令錯誤
    #[error("Redis操作錯誤: {0}")]
    Transport(#[from] RedisError),

    #[error("無效的快取鍵: 鍵不可為空")]
    InvalidKey,

    /// 過期時間截斷為整秒後為零
    #[error("無效的過期時間 {0:?}: 至少需要一秒")]
    InvalidTtl(Duration),

    /// 序列化錯誤
    #[error("數據序列化錯誤: {0}")]
    SerializationError(String),

    #[error("未註冊的快取適配器: {0}")]
    UnknownAdapter(String),

    #[error("快取適配器重複註冊: {0}")]
    DuplicateAdapter(String),
}

/// 快取操作接口
///
/// 值以原始位元組存取；`get_multi` 與 `exists` 不回報錯誤，失敗時分別退化為全部未命中與 `false`。
#[async_trait]
pub trait CacheOperations: Send + Sync + 'static {
    /// 從快取獲取值，不存在時返回None
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// 批量獲取，結果與輸入一一對應
    async fn get_multi(&self, keys: &[&str]) -> Vec<Option<Vec<u8>>>;

    /// 存儲值到快取，並記錄到追蹤鍵集合
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;

    /// 從快取與追蹤鍵集合中刪除鍵
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// 檢查快取中是否存在鍵
    async fn exists(&self, key: &str) -> bool;

    /// 原子加一，返回新值
    async fn increment(&self, key: &str) -> Result<i64, CacheError>;

    /// 原子減一，返回新值
    async fn decrement(&self, key: &str) -> Result<i64, CacheError>;

    /// 刪除所有追蹤中的鍵以及追蹤鍵集合本身
    async fn clear_all(&self) -> Result<(), CacheError>;
}

/// 將過期時間截斷為整秒，不足一秒視為錯誤
fn ttl_seconds(ttl: Duration) -> Result<u64, CacheError> {
    match ttl.as_secs() {
        0 => Err(CacheError::InvalidTtl(ttl)),
        secs => Ok(secs),
    }
}

fn check_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey);
    }
    Ok(())
}

/// 以 Sentinel 高可用部署為後端的快取
///
/// 每個操作只借用一條連接，並在返回前歸還。
#[derive(Clone)]
pub struct SentinelCache {
    pool: SentinelPool,
    config: SentinelCacheConfig,
}

impl SentinelCache {
    /// 以 JSON 配置字串啟動快取
    ///
    /// 配置錯誤或無法連接主節點時立即失敗。
    pub async fn start(raw_config: &str) -> Result<Self, CacheError> {
        let config = SentinelCacheConfig::from_json(raw_config)?;
        Self::new(config).await
    }

    /// 以已解析的配置建立快取，並借出一條連接確認主節點可達
    pub async fn new(config: SentinelCacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        let pool = SentinelPool::new(&config)?;

        let conn = pool.borrow().await?;
        info!(
            "Sentinel快取已啟動，主節點 {} 位於 {}，追蹤鍵集合: {}",
            config.master_name,
            conn.primary_addr(),
            config.key
        );
        pool.release(conn);

        Ok(Self { pool, config })
    }

    pub fn config(&self) -> &SentinelCacheConfig {
        &self.config
    }

    pub fn pool(&self) -> &SentinelPool {
        &self.pool
    }

    /// 追蹤鍵集合名稱
    pub fn tracked_key(&self) -> &str {
        &self.config.key
    }

    /// 序列化為JSON後存入快取
    pub async fn put_json<V: Serialize + Sync>(
        &self,
        key: &str,
        value: &V,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let serialized = serde_json::to_vec(value)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        self.put(key, &serialized, ttl).await
    }

    /// 讀取並反序列化JSON值
    pub async fn get_json<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>, CacheError> {
        match self.get(key).await? {
            Some(raw) => serde_json::from_slice(&raw).map(Some).map_err(|e| {
                warn!("快取值反序列化失敗: {}", e);
                CacheError::SerializationError(e.to_string())
            }),
            None => Ok(None),
        }
    }

    /// 檢查快取健康狀態
    pub async fn check_health(&self) -> bool {
        self.pool.check_health().await
    }

    async fn try_get_multi(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>, CacheError> {
        let mut conn = self.pool.borrow().await?;

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("GET").arg(*key);
        }
        Ok(pipe.query_async(&mut conn).await?)
    }

    async fn adjust(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        check_key(key)?;
        let mut conn = self.pool.borrow().await?;

        match cmd("INCRBY")
            .arg(key)
            .arg(delta)
            .query_async::<i64>(&mut conn)
            .await
        {
            Ok(value) => {
                debug!("計數器 {} 調整 {}，新值 {}", key, delta, value);
                Ok(value)
            }
            Err(e) => {
                error!("計數器調整失敗 {}: {}", key, e);
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl CacheOperations for SentinelCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        check_key(key)?;
        let mut conn = self.pool.borrow().await?;

        match cmd("GET").arg(key).query_async::<Option<Vec<u8>>>(&mut conn).await {
            Ok(Some(value)) => {
                debug!("快取命中: {}", key);
                Ok(Some(value))
            }
            Ok(None) => {
                debug!("快取未命中: {}", key);
                Ok(None)
            }
            Err(e) => {
                error!("快取讀取失敗: {}", e);
                Err(e.into())
            }
        }
    }

    async fn get_multi(&self, keys: &[&str]) -> Vec<Option<Vec<u8>>> {
        if keys.is_empty() {
            return Vec::new();
        }

        match self.try_get_multi(keys).await {
            Ok(values) if values.len() == keys.len() => values,
            Ok(values) => {
                warn!(
                    "批量讀取回覆數量不符 (預期 {}，實際 {})，全部視為未命中",
                    keys.len(),
                    values.len()
                );
                vec![None; keys.len()]
            }
            Err(e) => {
                warn!("批量讀取失敗，全部視為未命中: {}", e);
                vec![None; keys.len()]
            }
        }
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        check_key(key)?;
        let secs = ttl_seconds(ttl)?;
        let mut conn = self.pool.borrow().await?;

        if let Err(e) = cmd("SETEX")
            .arg(key)
            .arg(secs)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
        {
            error!("快取設置失敗 {}: {}", key, e);
            return Err(e.into());
        }

        // 值已寫入；追蹤失敗時鍵仍在快取中但不會被 clear_all 清除
        if let Err(e) = cmd("HSET")
            .arg(self.tracked_key())
            .arg(key)
            .arg(true)
            .query_async::<()>(&mut conn)
            .await
        {
            error!("追蹤鍵記錄失敗 {}: {}", key, e);
            return Err(e.into());
        }

        debug!("快取設置成功: {} ({}秒)", key, secs);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        check_key(key)?;
        let mut conn = self.pool.borrow().await?;

        cmd("DEL").arg(key).query_async::<()>(&mut conn).await.map_err(|e| {
            error!("快取刪除失敗 {}: {}", key, e);
            e
        })?;

        cmd("HDEL")
            .arg(self.tracked_key())
            .arg(key)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| {
                error!("追蹤鍵移除失敗 {}: {}", key, e);
                e
            })?;

        debug!("快取刪除: {}", key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> bool {
        if key.is_empty() {
            return false;
        }

        let mut conn = match self.pool.borrow().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("快取鍵檢查無法獲取連接: {}", e);
                return false;
            }
        };

        let found = match cmd("EXISTS").arg(key).query_async::<bool>(&mut conn).await {
            Ok(found) => found,
            Err(e) => {
                warn!("快取鍵檢查失敗 {}: {}", key, e);
                return false;
            }
        };

        if !found {
            // 鍵已過期或不存在時順便清理追蹤記錄
            if let Err(e) = cmd("HDEL")
                .arg(self.tracked_key())
                .arg(key)
                .query_async::<()>(&mut conn)
                .await
            {
                warn!("清理過期追蹤鍵失敗 {}: {}", key, e);
            }
        }

        found
    }

    async fn increment(&self, key: &str) -> Result<i64, CacheError> {
        self.adjust(key, 1).await
    }

    async fn decrement(&self, key: &str) -> Result<i64, CacheError> {
        self.adjust(key, -1).await
    }

    async fn clear_all(&self) -> Result<(), CacheError> {
        let mut conn = self.pool.borrow().await?;

        let keys: Vec<String> = cmd("HKEYS")
            .arg(self.tracked_key())
            .query_async(&mut conn)
            .await?;

        for key in &keys {
            if let Err(e) = cmd("DEL").arg(key).query_async::<()>(&mut conn).await {
                error!("清除快取鍵失敗 {}，中止清除: {}", key, e);
                return Err(e.into());
            }
        }

        cmd("DEL")
            .arg(self.tracked_key())
            .query_async::<()>(&mut conn)
            .await?;

        info!("已清除 {} 個追蹤鍵及集合 {}", keys.len(), self.tracked_key());
        Ok(())
    }
}
