use config::{Config, Environment as ConfigEnvironment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::types::SentinelCacheConfig;
use crate::config::validation::{ValidationError, Validator};

/// 環境變數前綴，例如 `SENTINEL_CACHE__ADDRS`
pub const ENV_PREFIX: &str = "SENTINEL_CACHE";

/// 配置加載器，負責合併配置檔案與環境變數
pub struct ConfigLoader;

impl ConfigLoader {
    /// 預設配置檔路徑，可由 `CONFIG_DIR` 環境變數改變目錄
    pub fn default_path() -> PathBuf {
        let config_dir = env::var("CONFIG_DIR").unwrap_or_else(|_| "config".into());
        Path::new(&config_dir).join("sentinel_cache.toml")
    }

    /// 載入配置
    ///
    /// 檔案為選用；環境變數的優先級高於檔案配置。
    pub fn load(path: &Path) -> Result<SentinelCacheConfig, ValidationError> {
        debug!("從 {} 及環境變數加載配置", path.display());

        let source = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(ConfigEnvironment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let config: SentinelCacheConfig = source.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}
