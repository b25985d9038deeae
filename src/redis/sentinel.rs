use redis::aio::{ConnectionLike, MultiplexedConnection};
use redis::{cmd, ErrorKind, RedisError, RedisResult, Value};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Sentinel 查詢錯誤
#[derive(Error, Debug)]
pub enum SentinelError {
    /// 所有 Sentinel 都無法回報主節點位址
    #[error("已查詢 {tried} 個 Sentinel，均無法取得主節點 `{master_name}` 的位址")]
    NoPrimaryAvailable { master_name: String, tried: usize },
}

/// 解析 `host:port` 形式的位址
///
/// 主機名稱為空時（例如 `:26379`）視為本機。IPv6 位址需以方括號包住。
pub fn parse_host_port(addr: &str) -> Result<(String, u16), String> {
    let addr = addr.trim();
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| format!("位址 `{}` 缺少埠號", addr))?;

    let port = port
        .parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| format!("位址 `{}` 的埠號無效", addr))?;

    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = if host.is_empty() { "127.0.0.1" } else { host };

    Ok((host.to_string(), port))
}

/// 將主機與埠號組合為顯示用位址
pub fn format_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// 建立帶逾時限制的非同步連接
pub(crate) async fn open_connection(
    host: &str,
    port: u16,
    dial_timeout: Duration,
) -> RedisResult<MultiplexedConnection> {
    let addr = format_host_port(host, port);
    let client = redis::Client::open(format!("redis://{}/", addr))?;

    match timeout(dial_timeout, client.get_multiplexed_async_connection()).await {
        Ok(Ok(conn)) => {
            debug!("成功建立Redis連接: {}", addr);
            Ok(conn)
        }
        Ok(Err(err)) => {
            error!("無法建立Redis連接 {}: {}", addr, err);
            Err(err)
        }
        Err(_) => {
            error!("Redis連接超時 ({}, {:?})", addr, dial_timeout);
            Err(RedisError::from(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("連接 {} 超時 ({:?})", addr, dial_timeout),
            )))
        }
    }
}

/// Sentinel 定位器
///
/// 依設定順序逐一詢問 Sentinel，取得主節點目前的位址；不記錄上次回應的 Sentinel。
#[derive(Debug, Clone)]
pub struct SentinelLocator {
    addrs: Vec<String>,
    master_name: String,
    dial_timeout: Duration,
}

impl SentinelLocator {
    pub fn new(addrs: Vec<String>, master_name: impl Into<String>, dial_timeout: Duration) -> Self {
        Self {
            addrs,
            master_name: master_name.into(),
            dial_timeout,
        }
    }

    pub fn master_name(&self) -> &str {
        &self.master_name
    }

    /// 解析主節點位址
    ///
    /// 每個 Sentinel 的連接與查詢合計受撥號逾時限制。
    /// 只有當所有 Sentinel 都無法連接或不認識該主節點時才會失敗。
    pub async fn resolve_primary_address(&self) -> Result<(String, u16), SentinelError> {
        for sentinel in &self.addrs {
            match timeout(self.dial_timeout, self.query_master_addr(sentinel)).await {
                Ok(Ok(Some((host, port)))) => {
                    debug!(
                        "Sentinel {} 回報主節點 {} 位於 {}",
                        sentinel,
                        self.master_name,
                        format_host_port(&host, port)
                    );
                    return Ok((host, port));
                }
                Ok(Ok(None)) => {
                    warn!("Sentinel {} 不認識主節點 {}", sentinel, self.master_name);
                }
                Ok(Err(err)) => {
                    warn!("查詢 Sentinel {} 失敗: {}", sentinel, err);
                }
                Err(_) => {
                    warn!("查詢 Sentinel {} 超時 ({:?})", sentinel, self.dial_timeout);
                }
            }
        }

        error!(
            "無法從任何 Sentinel 取得主節點 {} 的位址",
            self.master_name
        );
        Err(SentinelError::NoPrimaryAvailable {
            master_name: self.master_name.clone(),
            tried: self.addrs.len(),
        })
    }

    async fn query_master_addr(&self, sentinel: &str) -> RedisResult<Option<(String, u16)>> {
        let (host, port) = parse_host_port(sentinel).map_err(|detail| {
            RedisError::from((ErrorKind::InvalidClientConfig, "無效的 Sentinel 位址", detail))
        })?;
        let mut conn = open_connection(&host, port, self.dial_timeout).await?;

        let reply: Option<(String, String)> = cmd("SENTINEL")
            .arg("get-master-addr-by-name")
            .arg(&self.master_name)
            .query_async(&mut conn)
            .await?;

        match reply {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    RedisError::from((
                        ErrorKind::TypeError,
                        "Sentinel 回報了無效的埠號",
                        port.clone(),
                    ))
                })?;
                Ok(Some((host, port)))
            }
            None => Ok(None),
        }
    }

    /// 檢查連接的遠端是否仍自認為主節點
    ///
    /// 發送 `ROLE`；任何錯誤都視為「不是主節點」。
    pub async fn is_primary<C>(&self, conn: &mut C) -> bool
    where
        C: ConnectionLike + Send,
    {
        match cmd("ROLE").query_async::<Vec<Value>>(conn).await {
            Ok(reply) => {
                let primary = role_is_master(&reply);
                if !primary {
                    debug!("連接的遠端已不是主節點 {}", self.master_name);
                }
                primary
            }
            Err(err) => {
                warn!("角色檢查失敗: {}", err);
                false
            }
        }
    }
}

fn role_is_master(reply: &[Value]) -> bool {
    reply
        .first()
        .and_then(|role| redis::from_redis_value::<String>(role).ok())
        .map(|role| role == "master")
        .unwrap_or(false)
}
