use thiserror::Error;

/// 配置驗證錯誤
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("缺少必要配置項: {0}")]
    MissingField(String),

    #[error("無效的配置值: {0}")]
    InvalidValue(String),

    #[error("配置範圍錯誤: {field} 的值 {value} 不在範圍 {min}..{max} 內")]
    RangeError {
        field: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("依賴錯誤: {dependent} 不可大於 {dependency}")]
    DependencyError {
        dependent: String,
        dependency: String,
    },

    #[error("配置格式錯誤: {0}")]
    Malformed(String),

    #[error("配置來源錯誤: {0}")]
    Source(#[from] config::ConfigError),
}

/// 配置驗證器trait
pub trait Validator {
    /// 驗證配置
    fn validate(&self) -> Result<(), ValidationError>;
}

/// 驗證工具函數
pub struct ValidationUtils;

impl ValidationUtils {
    /// 驗證配置值是否在指定範圍內
    pub fn in_range<T>(value: T, min: T, max: T, field_name: &str) -> Result<(), ValidationError>
    where
        T: PartialOrd + ToString,
    {
        if value < min || value > max {
            return Err(ValidationError::RangeError {
                field: field_name.to_string(),
                value: value.to_string(),
                min: min.to_string(),
                max: max.to_string(),
            });
        }
        Ok(())
    }

    /// 檢查必要的字串欄位是否有值
    pub fn not_empty(value: &str, field_name: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField(field_name.to_string()));
        }
        Ok(())
    }

    /// 檢查 `lower` 欄位不超過 `upper` 欄位
    pub fn not_greater<T>(
        lower: T,
        upper: T,
        lower_name: &str,
        upper_name: &str,
    ) -> Result<(), ValidationError>
    where
        T: PartialOrd,
    {
        if lower > upper {
            return Err(ValidationError::DependencyError {
                dependent: lower_name.to_string(),
                dependency: upper_name.to_string(),
            });
        }
        Ok(())
    }
}
