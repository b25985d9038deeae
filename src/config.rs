/// 配置管理模組
///
/// 本模組負責解析、驗證快取配置。
/// 支持快取註冊時使用的 JSON 配置字串，以及由檔案與環境變數合併的分層配置。
// 宣告子模組
pub mod loader;
pub mod types;
pub mod validation;

// 重新導出常用組件
pub use loader::ConfigLoader;
pub use types::*;
pub use validation::{ValidationError, ValidationUtils, Validator};
