// src/lib.rs

use thiserror::Error;

pub mod bidding;
pub mod compat;
pub mod openrtb;

pub use compat::clear::{clear_202211_fields, clear_26_fields};
pub use compat::downgrade::downgrade_to_25;
pub use compat::pods::expand_pod_impressions;
pub use openrtb::ext::{merge_ext, Ext};

/// 兼容层的错误类型。
///
/// 降级管线只会产生 `MalformedExt`：某个 ext 槽位里已经存放了
/// 非法 JSON，无法在不破坏调用方数据的情况下继续合并。
/// 底层解析诊断原文通过 `transparent` 原样透出，错误消息保持稳定，
/// 可以直接做黄金断言。
#[derive(Debug, Error)]
pub enum CompatError {
    /// ext 槽位中已有内容不是合法 JSON
    #[error(transparent)]
    MalformedExt(#[from] serde_json::Error),

    /// bid 的 impid 在请求的 imp 列表里找不到对应项
    #[error("unmatched impression id: {0}")]
    UnmatchedImp(String),

    /// bid 扩展里声明了无法识别的物料类型
    #[error("invalid media type: {0}")]
    InvalidMediaType(String),
}
