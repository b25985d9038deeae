// utils/serde_helpers.rs - 序列化與反序列化輔助函數
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

/// 將空字符串反序列化為None
///
/// 在配置文件中，經常需要將空字符串解析為None以表示不存在的值。
/// 這個函數可用於serde的自定義反序列化器。
///
/// # 使用範例
///
/// ```
/// use serde::Deserialize;
/// use sentinel_cache::utils::serde_helpers::empty_string_as_none;
///
/// #[derive(Deserialize)]
/// struct Config {
///     #[serde(default, deserialize_with = "empty_string_as_none")]
///     optional_value: Option<String>,
/// }
///
/// let cfg: Config = serde_json::from_str(r#"{"optional_value": ""}"#).unwrap();
/// assert!(cfg.optional_value.is_none());
/// ```
pub fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    Ok(s.filter(|s| !s.is_empty()))
}

/// 接受數字或數字字串的訪問器，空字串與null視為缺值
struct LenientNumber<T>(PhantomData<T>);

impl<'de, T> Visitor<'de> for LenientNumber<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    type Value = Option<T>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("數字或數字字串")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        let v = v.trim();
        if v.is_empty() {
            return Ok(None);
        }
        v.parse::<T>()
            .map(Some)
            .map_err(|e| E::custom(format!("無法解析數值 `{}`: {}", v, e)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        self.visit_str(&v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        self.visit_str(&v.to_string())
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

/// 將數字或數字字串反序列化為數值
///
/// 配置字串中的數值欄位習慣以字串表示（例如 `"dbNum": "0"`），
/// 同時也接受 JSON 數字。無法解析的內容會回報錯誤而不是默默歸零。
pub fn string_or_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    deserializer
        .deserialize_any(LenientNumber(PhantomData))?
        .ok_or_else(|| de::Error::custom("數值不可為空"))
}

/// 與 [`string_or_number`] 相同，但空值解析為None
pub fn optional_string_or_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    deserializer.deserialize_any(LenientNumber(PhantomData))
}

struct CommaSeparated;

impl<'de> Visitor<'de> for CommaSeparated {
    type Value = Vec<String>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("逗號分隔的字串或字串陣列")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        if v.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(v.split(',').map(|s| s.trim().to_string()).collect())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element::<String>()? {
            items.push(item.trim().to_string());
        }
        Ok(items)
    }
}

/// 將 `"a:1,b:2"` 形式的字串（或字串陣列）反序列化為 `Vec<String>`
pub fn comma_separated<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(CommaSeparated)
}
