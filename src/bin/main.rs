use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use sentinel_cache::config::ConfigLoader;
use sentinel_cache::redis::{CacheOperations, SentinelCache};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "sentinel_cache", about = "Sentinel 快取命令行工具")]
struct Cli {
    /// 配置檔路徑（預設為 $CONFIG_DIR/sentinel_cache.toml）
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 讀取鍵值
    Get { key: String },

    /// 寫入鍵值
    Put {
        key: String,
        value: String,
        /// 過期秒數
        #[arg(short, long, default_value_t = 60)]
        ttl: u64,
    },

    /// 刪除鍵
    Delete { key: String },

    /// 檢查鍵是否存在
    Exists { key: String },

    /// 計數器加一
    Incr { key: String },

    /// 計數器減一
    Decr { key: String },

    /// 清除所有追蹤中的鍵
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日誌系統
    init_logging()?;

    // 解析命令行參數
    let cli = Cli::parse();

    let path = cli.config.unwrap_or_else(ConfigLoader::default_path);
    let config = ConfigLoader::load(&path)
        .with_context(|| format!("無法載入配置 {}", path.display()))?;

    let cache = SentinelCache::new(config)
        .await
        .context("無法啟動 Sentinel 快取")?;

    match cli.command {
        Commands::Get { key } => match cache.get(&key).await? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(nil)"),
        },
        Commands::Put { key, value, ttl } => {
            cache
                .put(&key, value.as_bytes(), Duration::from_secs(ttl))
                .await?;
            println!("OK");
        }
        Commands::Delete { key } => {
            cache.delete(&key).await?;
            println!("OK");
        }
        Commands::Exists { key } => println!("{}", cache.exists(&key).await),
        Commands::Incr { key } => println!("{}", cache.increment(&key).await?),
        Commands::Decr { key } => println!("{}", cache.decrement(&key).await?),
        Commands::Clear => {
            cache.clear_all().await?;
            println!("OK");
        }
    }

    info!("操作完成");
    Ok(())
}

// 初始化日誌系統
fn init_logging() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("設置日誌系統失敗: {}", e))?;

    Ok(())
}
