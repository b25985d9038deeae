//! Redis操作模組
//!
//! 提供高級的Redis操作功能，封裝常見Redis使用方案。
//! 目前包含以 Sentinel 連接池為後端、帶追蹤鍵集合的快取操作。

pub mod cache;

pub use cache::*;
