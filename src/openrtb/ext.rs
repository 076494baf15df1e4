// src/openrtb/ext.rs

use serde::de::Deserializer;
use serde::ser::{Error as _, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{Map, Value};

use crate::CompatError;

/// ext 槽位的原文容器。
///
/// 协议实体上的 ext 是调用方自定义的开放 JSON 对象，本层不解释其内容，
/// 因此按原文字符串保存，解析推迟到真正需要合并的时刻。
/// 序列化时原文内嵌输出（经由 `RawValue`），反序列化时截取原文，
/// 往返不丢失任何无关键值。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ext(String);

impl Ext {
    pub fn new(raw: impl Into<String>) -> Self {
        Ext(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for Ext {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // 原文直接内嵌；如果槽位里是坏 JSON，序列化按错误上抛
        let raw = RawValue::from_string(self.0.clone()).map_err(S::Error::custom)?;
        raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Ext {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        Ok(Ext(raw.get().to_owned()))
    }
}

/// 往 ext 对象里插入（或覆盖）一个键，返回合并后的新 ext。
///
/// - `existing` 为空时新建单键对象；
/// - 已有内容必须是合法 JSON 对象，否则以 `MalformedExt` 失败；
/// - 其余键值原样保留；
/// - 输出按键名字典序排列（serde_json 的 Map 默认即有序），
///   两个语义相同的 ext 序列化结果逐字节一致。
pub fn merge_ext(existing: Option<&Ext>, key: &str, value: Value) -> Result<Ext, CompatError> {
    let mut fields: Map<String, Value> = match existing {
        Some(ext) if !ext.as_str().trim().is_empty() => serde_json::from_str(ext.as_str())?,
        _ => Map::new(),
    };
    fields.insert(key.to_owned(), value);
    Ok(Ext::new(serde_json::to_string(&fields)?))
}
