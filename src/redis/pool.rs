use deadpool::managed::{
    Manager, Metrics, Object, Pool, PoolError, QueueMode, RecycleError, RecycleResult, Status,
    TimeoutType,
};
use deadpool::Runtime;
use redis::aio::{ConnectionLike, MultiplexedConnection};
use redis::{cmd, Cmd, Pipeline, RedisError, RedisFuture, Value};
use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::sentinel::{format_host_port, open_connection, SentinelError, SentinelLocator};
use crate::config::types::SentinelCacheConfig;

/// Redis連接池錯誤
#[derive(Error, Debug)]
pub enum RedisPoolError {
    /// 連接池初始化錯誤
    #[error("Redis連接池初始化錯誤: {0}")]
    PoolInitError(String),

    /// 沒有任何 Sentinel 能回報主節點
    #[error("無可用主節點: {0}")]
    NoPrimaryAvailable(#[from] SentinelError),

    /// 連接、認證或選擇資料庫失敗
    #[error("無法連接主節點 {addr}: {source}")]
    DialFailed {
        addr: String,
        #[source]
        source: RedisError,
    },

    /// 等待可用連接超時
    #[error("連接池已耗盡，等待可用連接超時")]
    PoolExhausted,

    #[error("連接池已關閉")]
    Closed,

    /// 其他錯誤
    #[error("Redis連接池其他錯誤: {0}")]
    Other(String),
}

/// 從deadpool錯誤轉換為RedisPoolError
impl From<PoolError<RedisPoolError>> for RedisPoolError {
    fn from(error: PoolError<RedisPoolError>) -> Self {
        match error {
            PoolError::Backend(err) => err,
            PoolError::Timeout(TimeoutType::Wait) => RedisPoolError::PoolExhausted,
            PoolError::Closed => RedisPoolError::Closed,
            other => RedisPoolError::Other(other.to_string()),
        }
    }
}

/// 連接池中的一條連接，附帶最後一次歸還的時間
pub struct SentinelConnection {
    conn: MultiplexedConnection,
    addr: String,
    released_at: Instant,
}

impl SentinelConnection {
    /// 連接建立時所解析到的主節點位址
    pub fn primary_addr(&self) -> &str {
        &self.addr
    }

    fn idle_for(&self) -> Duration {
        self.released_at.elapsed()
    }
}

/// 透過 Sentinel 撥號並在借出前驗證角色的連接管理器
pub struct SentinelManager {
    locator: SentinelLocator,
    auth: Option<String>,
    db_num: u32,
    dial_timeout: Duration,
    idle_timeout: Duration,
}

impl SentinelManager {
    pub fn new(config: &SentinelCacheConfig) -> Self {
        Self {
            locator: SentinelLocator::new(
                config.addrs.clone(),
                config.master_name.clone(),
                config.dial_timeout(),
            ),
            auth: config.auth.clone(),
            db_num: config.db_num,
            dial_timeout: config.dial_timeout(),
            idle_timeout: config.idle_timeout(),
        }
    }

    async fn handshake(&self, conn: &mut MultiplexedConnection) -> Result<(), RedisError> {
        if let Some(password) = &self.auth {
            cmd("AUTH").arg(password).query_async::<()>(conn).await?;
        }
        cmd("SELECT").arg(self.db_num).query_async::<()>(conn).await
    }
}

impl Manager for SentinelManager {
    type Type = SentinelConnection;
    type Error = RedisPoolError;

    /// 每次撥號都重新向 Sentinel 解析主節點位址
    async fn create(&self) -> Result<SentinelConnection, RedisPoolError> {
        let (host, port) = self.locator.resolve_primary_address().await?;
        let addr = format_host_port(&host, port);

        let mut conn = open_connection(&host, port, self.dial_timeout)
            .await
            .map_err(|source| RedisPoolError::DialFailed {
                addr: addr.clone(),
                source,
            })?;

        if let Err(source) = self.handshake(&mut conn).await {
            error!("主節點 {} 認證或選擇資料庫失敗: {}", addr, source);
            return Err(RedisPoolError::DialFailed { addr, source });
        }

        info!("已連接主節點 {} (db {})", addr, self.db_num);
        Ok(SentinelConnection {
            conn,
            addr,
            released_at: Instant::now(),
        })
    }

    async fn recycle(
        &self,
        obj: &mut SentinelConnection,
        _metrics: &Metrics,
    ) -> RecycleResult<RedisPoolError> {
        let idle = obj.idle_for();
        if idle > self.idle_timeout {
            debug!("丟棄閒置 {:?} 的連接 {}", idle, obj.addr);
            return Err(RecycleError::Message(
                format!("連接閒置 {:?} 超過上限", idle).into(),
            ));
        }

        if !self.locator.is_primary(&mut obj.conn).await {
            warn!("連接 {} 未通過角色檢查，將重新解析主節點", obj.addr);
            return Err(RecycleError::Message("角色檢查失敗".into()));
        }

        Ok(())
    }
}

/// 借出的連接
///
/// 離開作用域時自動歸還連接池，並記錄歸還時間。
pub struct PooledConnection {
    inner: Object<SentinelManager>,
    pool: SentinelPool,
}

impl PooledConnection {
    pub fn primary_addr(&self) -> &str {
        self.inner.primary_addr()
    }
}

impl Deref for PooledConnection {
    type Target = MultiplexedConnection;

    fn deref(&self) -> &MultiplexedConnection {
        &self.inner.conn
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut MultiplexedConnection {
        &mut self.inner.conn
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.inner.released_at = Instant::now();
        // 本連接在此之後才回到閒置集合
        self.pool.trim_idle(self.pool.max_idle.saturating_sub(1));
    }
}

impl ConnectionLike for PooledConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        self.inner.conn.req_packed_command(cmd)
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        self.inner.conn.req_packed_commands(cmd, offset, count)
    }

    fn get_db(&self) -> i64 {
        self.inner.conn.get_db()
    }
}

/// 具故障轉移能力的 Redis 連接池
///
/// 借出時先驗證閒置連接仍指向主節點，否則重新透過 Sentinel 解析並撥號。
/// 主節點資訊最多落後一個借出週期。閒置連接數在借出與歸還時都會修剪至 `maxIdle` 以內。
#[derive(Clone)]
pub struct SentinelPool {
    pool: Pool<SentinelManager>,
    max_idle: usize,
    idle_timeout: Duration,
}

impl SentinelPool {
    /// 創建新的連接池（不會立即建立連接）
    pub fn new(config: &SentinelCacheConfig) -> Result<Self, RedisPoolError> {
        let mut builder = Pool::builder(SentinelManager::new(config))
            .max_size(config.max_active)
            .queue_mode(QueueMode::Fifo)
            .runtime(Runtime::Tokio1);

        if let Some(wait) = config.wait_timeout() {
            builder = builder.wait_timeout(Some(wait));
        }

        let pool = builder
            .build()
            .map_err(|e| RedisPoolError::PoolInitError(e.to_string()))?;

        info!(
            "Redis連接池初始化完成，主節點: {}，最大連接數: {}，最大閒置數: {}",
            config.master_name, config.max_active, config.max_idle
        );

        Ok(Self {
            pool,
            max_idle: config.max_idle,
            idle_timeout: config.idle_timeout(),
        })
    }

    /// 借出一條指向目前主節點的連接
    pub async fn borrow(&self) -> Result<PooledConnection, RedisPoolError> {
        self.trim_idle(self.max_idle);

        match self.pool.get().await {
            Ok(inner) => {
                debug!("從Redis連接池獲取連接成功: {}", inner.primary_addr());
                Ok(PooledConnection {
                    inner,
                    pool: self.clone(),
                })
            }
            Err(e) => {
                let err = RedisPoolError::from(e);
                error!("無法從Redis連接池獲取連接: {}", err);
                Err(err)
            }
        }
    }

    /// 歸還連接，等同於讓連接離開作用域
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    /// 丟棄閒置過久的連接，並只保留最多 `keep` 條閒置連接
    fn trim_idle(&self, keep: usize) {
        let kept = Cell::new(0usize);
        let idle_timeout = self.idle_timeout;

        self.pool.retain(|conn, _| {
            if conn.idle_for() > idle_timeout || kept.get() >= keep {
                return false;
            }
            kept.set(kept.get() + 1);
            true
        });
    }

    /// 檢查連接池健康狀態
    pub async fn check_health(&self) -> bool {
        match self.borrow().await {
            Ok(mut conn) => {
                let result: Result<String, RedisError> = cmd("PING").query_async(&mut conn).await;
                match result {
                    Ok(pong) => pong == "PONG",
                    Err(e) => {
                        error!("Redis健康檢查錯誤: {}", e);
                        false
                    }
                }
            }
            Err(e) => {
                error!("Redis健康檢查無法獲取連接: {}", e);
                false
            }
        }
    }

    pub fn status(&self) -> Status {
        self.pool.status()
    }

    pub fn max_active(&self) -> usize {
        self.pool.status().max_size
    }
}
