//! 集中化的 Redis 測試配置
//!
//! 提供行程內的假 Redis / Sentinel 節點，只實作快取用到的指令，
//! 讓連接池與快取操作在沒有真實部署的情況下也能測試。

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

use crate::config::SentinelCacheConfig;

/// RESP 回覆
#[derive(Debug, Clone)]
enum Reply {
    Status(String),
    Error(String),
    Int(i64),
    Bulk(Vec<u8>),
    Nil,
    NilArray,
    Array(Vec<Reply>),
}

impl Reply {
    fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Reply::Status(s) => out.extend_from_slice(format!("+{}\r\n", s).as_bytes()),
            Reply::Error(e) => out.extend_from_slice(format!("-{}\r\n", e).as_bytes()),
            Reply::Int(n) => out.extend_from_slice(format!(":{}\r\n", n).as_bytes()),
            Reply::Bulk(b) => {
                out.extend_from_slice(format!("${}\r\n", b.len()).as_bytes());
                out.extend_from_slice(b);
                out.extend_from_slice(b"\r\n");
            }
            Reply::Nil => out.extend_from_slice(b"$-1\r\n"),
            Reply::NilArray => out.extend_from_slice(b"*-1\r\n"),
            Reply::Array(items) => {
                out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.encode(out);
                }
            }
        }
    }
}

/// 假節點的內部狀態
#[derive(Default)]
struct FakeState {
    role: String,
    master: Option<(String, u16)>,
    password: Option<String>,
    selected_db: Option<String>,
    failing: HashSet<String>,
    connections: usize,
    commands: Vec<String>,
    values: HashMap<String, (Vec<u8>, Option<Instant>)>,
    hashes: HashMap<String, BTreeMap<String, Vec<u8>>>,
}

impl FakeState {
    fn live_value(&mut self, key: &str) -> Option<Vec<u8>> {
        let expired = matches!(
            self.values.get(key),
            Some((_, Some(deadline))) if Instant::now() >= *deadline
        );
        if expired {
            self.values.remove(key);
        }
        self.values.get(key).map(|(value, _)| value.clone())
    }

    fn handle(&mut self, args: &[Vec<u8>]) -> Reply {
        let Some(name) = args.first() else {
            return Reply::Error("ERR empty command".to_string());
        };
        let name = String::from_utf8_lossy(name).to_ascii_uppercase();
        self.commands.push(name.clone());

        if self.failing.contains(&name) {
            return Reply::Error(format!("ERR injected failure for {}", name));
        }

        let arg = |i: usize| -> String {
            args.get(i)
                .map(|a| String::from_utf8_lossy(a).into_owned())
                .unwrap_or_default()
        };

        match name.as_str() {
            "PING" => Reply::Status("PONG".to_string()),
            "AUTH" => match &self.password {
                Some(password) if *password == arg(1) => Reply::ok(),
                Some(_) => Reply::Error("WRONGPASS invalid username-password pair".to_string()),
                None => Reply::Error(
                    "ERR AUTH <password> called without any password configured".to_string(),
                ),
            },
            "SELECT" => {
                self.selected_db = Some(arg(1));
                Reply::ok()
            }
            "ROLE" => Reply::Array(vec![
                Reply::Bulk(self.role.clone().into_bytes()),
                Reply::Int(0),
                Reply::Array(vec![]),
            ]),
            "SENTINEL" => match &self.master {
                Some((host, port)) => Reply::Array(vec![
                    Reply::Bulk(host.clone().into_bytes()),
                    Reply::Bulk(port.to_string().into_bytes()),
                ]),
                None => Reply::NilArray,
            },
            "GET" => match self.live_value(&arg(1)) {
                Some(value) => Reply::Bulk(value),
                None => Reply::Nil,
            },
            "SETEX" => match arg(2).parse::<u64>() {
                Ok(secs) if secs > 0 => {
                    let deadline = Instant::now() + Duration::from_secs(secs);
                    let value = args.get(3).cloned().unwrap_or_default();
                    self.values.insert(arg(1), (value, Some(deadline)));
                    Reply::ok()
                }
                _ => Reply::Error("ERR invalid expire time in 'setex' command".to_string()),
            },
            "DEL" => {
                let mut removed = 0;
                for i in 1..args.len() {
                    let key = arg(i);
                    if self.live_value(&key).is_some() {
                        self.values.remove(&key);
                        removed += 1;
                    } else if self.hashes.remove(&key).is_some() {
                        removed += 1;
                    }
                }
                Reply::Int(removed)
            }
            "EXISTS" => {
                let key = arg(1);
                let found = self.live_value(&key).is_some() || self.hashes.contains_key(&key);
                Reply::Int(found as i64)
            }
            "INCRBY" => {
                let key = arg(1);
                let delta = arg(2).parse::<i64>().unwrap_or_default();
                let current = self.live_value(&key);
                let parsed = match &current {
                    Some(raw) => String::from_utf8_lossy(raw).parse::<i64>().ok(),
                    None => Some(0),
                };
                match parsed {
                    Some(n) => {
                        let next = n + delta;
                        let deadline = self.values.get(&key).and_then(|(_, d)| *d);
                        self.values
                            .insert(key, (next.to_string().into_bytes(), deadline));
                        Reply::Int(next)
                    }
                    None => {
                        Reply::Error("ERR value is not an integer or out of range".to_string())
                    }
                }
            }
            "HSET" => {
                let value = args.get(3).cloned().unwrap_or_default();
                let added = self
                    .hashes
                    .entry(arg(1))
                    .or_default()
                    .insert(arg(2), value)
                    .is_none();
                Reply::Int(added as i64)
            }
            "HDEL" => {
                let collection = arg(1);
                let field = arg(2);
                let removed = self
                    .hashes
                    .get_mut(&collection)
                    .and_then(|fields| fields.remove(&field))
                    .is_some();
                if self.hashes.get(&collection).is_some_and(|f| f.is_empty()) {
                    self.hashes.remove(&collection);
                }
                Reply::Int(removed as i64)
            }
            "HKEYS" => Reply::Array(
                self.hashes
                    .get(&arg(1))
                    .map(|fields| {
                        fields
                            .keys()
                            .map(|k| Reply::Bulk(k.clone().into_bytes()))
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
            // CLIENT SETINFO 等連接初始化指令
            _ => Reply::ok(),
        }
    }
}

/// 行程內的假 Redis / Sentinel 節點
pub struct FakeRedis {
    port: u16,
    state: Arc<Mutex<FakeState>>,
    handle: JoinHandle<()>,
}

impl FakeRedis {
    async fn start(state: FakeState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("無法綁定測試埠");
        let port = listener.local_addr().expect("無法取得測試埠").port();
        let state = Arc::new(Mutex::new(state));

        let shared = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            // 中止接受迴圈時一併關閉所有已建立的連接
            let mut connections = JoinSet::new();
            while let Ok((stream, _)) = listener.accept().await {
                shared.lock().connections += 1;
                connections.spawn(serve(stream, Arc::clone(&shared)));
            }
        });

        Self {
            port,
            state,
            handle,
        }
    }

    /// 自認為主節點的假 Redis
    pub async fn primary() -> Self {
        Self::start(FakeState {
            role: "master".to_string(),
            ..FakeState::default()
        })
        .await
    }

    /// 回報指定主節點位址的假 Sentinel
    pub async fn sentinel(master: Option<(String, u16)>) -> Self {
        Self::start(FakeState {
            role: "sentinel".to_string(),
            master,
            ..FakeState::default()
        })
        .await
    }

    /// 指向 `primary` 的假 Sentinel
    pub async fn sentinel_for(primary: &FakeRedis) -> Self {
        Self::sentinel(Some(("127.0.0.1".to_string(), primary.port))).await
    }

    pub fn addr(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn set_role(&self, role: &str) {
        self.state.lock().role = role.to_string();
    }

    pub fn set_master(&self, primary: &FakeRedis) {
        self.state.lock().master = Some(("127.0.0.1".to_string(), primary.port));
    }

    pub fn require_password(&self, password: &str) {
        self.state.lock().password = Some(password.to_string());
    }

    pub fn fail_command(&self, name: &str) {
        self.state.lock().failing.insert(name.to_ascii_uppercase());
    }

    pub fn recover_command(&self, name: &str) {
        self.state.lock().failing.remove(&name.to_ascii_uppercase());
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections
    }

    pub fn command_count(&self, name: &str) -> usize {
        let name = name.to_ascii_uppercase();
        self.state
            .lock()
            .commands
            .iter()
            .filter(|c| **c == name)
            .count()
    }

    pub fn selected_db(&self) -> Option<String> {
        self.state.lock().selected_db.clone()
    }

    /// 追蹤鍵集合目前的欄位
    pub fn hash_fields(&self, collection: &str) -> Vec<String> {
        self.state
            .lock()
            .hashes
            .get(collection)
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// 直接寫入一個不經快取追蹤的值
    pub fn insert_raw(&self, key: &str, value: &[u8]) {
        self.state
            .lock()
            .values
            .insert(key.to_string(), (value.to_vec(), None));
    }

    pub fn has_value(&self, key: &str) -> bool {
        self.state.lock().live_value(key).is_some()
    }

    /// 關閉節點，已建立的連接隨之中斷
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for FakeRedis {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(stream: TcpStream, state: Arc<Mutex<FakeState>>) {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    while let Ok(Some(args)) = read_command(&mut reader).await {
        let mut out = Vec::new();
        state.lock().handle(&args).encode(&mut out);
        if write.write_all(&out).await.is_err() {
            return;
        }
    }
}

async fn read_command<R>(reader: &mut R) -> io::Result<Option<Vec<Vec<u8>>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    let count = parse_header(&line, '*')?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line).await?;
        let len = parse_header(&line, '$')?;
        let mut buf = vec![0u8; len + 2];
        reader.read_exact(&mut buf).await?;
        buf.truncate(len);
        args.push(buf);
    }
    Ok(Some(args))
}

fn parse_header(line: &str, marker: char) -> io::Result<usize> {
    line.trim_end()
        .strip_prefix(marker)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unexpected RESP header"))
}

/// 建立指向假 Sentinel 的標準測試配置
pub fn create_test_config(sentinels: &[&FakeRedis]) -> SentinelCacheConfig {
    SentinelCacheConfig {
        addrs: sentinels.iter().map(|s| s.addr()).collect(),
        ..SentinelCacheConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_node_speaks_resp() {
        let node = FakeRedis::primary().await;
        let client = redis::Client::open(format!("redis://{}/", node.addr())).unwrap();
        let mut conn = client.get_multiplexed_async_connection().await.unwrap();

        let pong: String = redis::cmd("PING").query_async(&mut conn).await.unwrap();
        assert_eq!(pong, "PONG");

        let _: () = redis::cmd("SETEX")
            .arg("k")
            .arg(10)
            .arg("v")
            .query_async(&mut conn)
            .await
            .unwrap();
        let value: Option<String> = redis::cmd("GET").arg("k").query_async(&mut conn).await.unwrap();
        assert_eq!(value.as_deref(), Some("v"));
        assert_eq!(node.connection_count(), 1);
    }
}
