//! Redis存儲模組
//!
//! 此模組提供以 Redis Sentinel 高可用部署為後端的快取功能。包括 Sentinel 主節點定位、
//! 具故障轉移能力的連接池，以及快取操作的實現。

pub mod operations;
pub mod pool;
pub mod sentinel;

#[cfg(test)]
pub mod test_config;

pub use operations::cache::*;
pub use pool::*;
pub use sentinel::*;
