use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

use crate::config::validation::{ValidationError, ValidationUtils, Validator};
use crate::redis::sentinel::parse_host_port;
use crate::utils::serde_helpers::{
    comma_separated, empty_string_as_none, optional_string_or_number, string_or_number,
};

/// 追蹤鍵集合的預設名稱
pub const DEFAULT_KEY: &str = "beecacheRedis";

/// 預設的主節點（replica set）名稱
pub const DEFAULT_MASTER_NAME: &str = "mymaster";

/// Sentinel 快取配置
///
/// 對應配置字串中的欄位，例如：
///
/// ```json
/// {"Addrs": ":26379,10.0.0.2:26379", "MasterName": "mymaster", "dbNum": "0", "Auth": ""}
/// ```
///
/// 欄位名稱同時接受 snake_case 別名，以便從 TOML 檔案或環境變數載入。
#[derive(Debug, Clone, Deserialize)]
pub struct SentinelCacheConfig {
    /// Sentinel 位址列表（依序查詢）
    #[serde(
        rename = "Addrs",
        alias = "addrs",
        default,
        deserialize_with = "comma_separated"
    )]
    pub addrs: Vec<String>,

    /// 主節點名稱
    #[serde(
        rename = "MasterName",
        alias = "master_name",
        default = "default_master_name"
    )]
    pub master_name: String,

    /// 邏輯資料庫編號
    #[serde(
        rename = "dbNum",
        alias = "db_num",
        default,
        deserialize_with = "string_or_number"
    )]
    pub db_num: u32,

    /// 認證密碼，空字串表示不認證
    #[serde(
        rename = "Auth",
        alias = "auth",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    pub auth: Option<String>,

    /// 追蹤鍵集合名稱
    #[serde(default = "default_key")]
    pub key: String,

    #[serde(
        rename = "maxIdle",
        alias = "max_idle",
        default = "default_max_idle",
        deserialize_with = "string_or_number"
    )]
    pub max_idle: usize,

    #[serde(
        rename = "maxActive",
        alias = "max_active",
        default = "default_max_active",
        deserialize_with = "string_or_number"
    )]
    pub max_active: usize,

    /// 閒置連接的最長保留時間（秒）
    #[serde(
        rename = "idleTimeout",
        alias = "idle_timeout",
        default = "default_idle_timeout",
        deserialize_with = "string_or_number"
    )]
    pub idle_timeout_secs: u64,

    /// 連接池已滿時的最長等待時間（秒），None 表示無限等待
    #[serde(
        rename = "waitTimeout",
        alias = "wait_timeout",
        default,
        deserialize_with = "optional_string_or_number"
    )]
    pub wait_timeout_secs: Option<u64>,

    /// 撥號（Sentinel 及主節點）逾時（毫秒）
    #[serde(
        rename = "dialTimeout",
        alias = "dial_timeout",
        default = "default_dial_timeout",
        deserialize_with = "string_or_number"
    )]
    pub dial_timeout_ms: u64,
}

fn default_master_name() -> String {
    DEFAULT_MASTER_NAME.to_string()
}

fn default_key() -> String {
    DEFAULT_KEY.to_string()
}

const fn default_max_idle() -> usize {
    3
}

const fn default_max_active() -> usize {
    64
}

const fn default_idle_timeout() -> u64 {
    300
}

const fn default_dial_timeout() -> u64 {
    500
}

impl Default for SentinelCacheConfig {
    fn default() -> Self {
        Self {
            addrs: Vec::new(),
            master_name: default_master_name(),
            db_num: 0,
            auth: None,
            key: default_key(),
            max_idle: default_max_idle(),
            max_active: default_max_active(),
            idle_timeout_secs: default_idle_timeout(),
            wait_timeout_secs: None,
            dial_timeout_ms: default_dial_timeout(),
        }
    }
}

impl SentinelCacheConfig {
    /// 解析並驗證 JSON 配置字串
    ///
    /// 配置必須是 JSON 物件；陣列等其他形式一律視為格式錯誤。
    pub fn from_json(raw: &str) -> Result<Self, ValidationError> {
        let fields: Map<String, Value> =
            serde_json::from_str(raw).map_err(|e| ValidationError::Malformed(e.to_string()))?;
        let config: Self = serde_json::from_value(Value::Object(fields))
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        config.validate()?;
        debug!(
            "配置解析完成: sentinels={:?}, master={}, db={}",
            config.addrs, config.master_name, config.db_num
        );
        Ok(config)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }
}

impl Validator for SentinelCacheConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.addrs.is_empty() {
            return Err(ValidationError::MissingField("Addrs".to_string()));
        }
        for addr in &self.addrs {
            parse_host_port(addr).map_err(ValidationError::InvalidValue)?;
        }
        ValidationUtils::not_empty(&self.master_name, "MasterName")?;
        ValidationUtils::not_empty(&self.key, "key")?;
        ValidationUtils::in_range(self.max_active, 1, 10_000, "maxActive")?;
        ValidationUtils::not_greater(self.max_idle, self.max_active, "maxIdle", "maxActive")?;
        ValidationUtils::in_range(self.dial_timeout_ms, 1, 60_000, "dialTimeout")?;

        Ok(())
    }
}
