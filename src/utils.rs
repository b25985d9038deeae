// utils.rs - 公共工具模組
//
// 提供各種通用的工具函數和輔助方法，用於簡化系統其他部分的代碼。

pub mod serde_helpers;

pub use serde_helpers::{
    comma_separated, empty_string_as_none, optional_string_or_number, string_or_number,
};
