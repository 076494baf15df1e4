// src/openrtb/request.rs

use serde::{Deserialize, Serialize};

use crate::openrtb::ext::Ext;

/// OpenRTB 2.6 BidRequest 对象图。
///
/// 所有可选子对象建模为 `Option<T>`，缺省即 `None`，不存在空指针语义；
/// 每个实体上的 ext 槽位保存原文 JSON（见 ext.rs），由兼容层负责合并与重建。
/// 降级管线会原地改写这棵对象图。
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct BidRequest {
    pub id: String,

    /// 广告展示请求列表（imp），保持请求内的原始顺序
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imp: Vec<Imp>,

    /// 网站信息（与 app / dooh 互斥）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<Site>,

    /// 应用信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<App>,

    /// 数字户外信息（2.6 新增渠道，2.5 没有对应表示）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dooh: Option<Dooh>,

    /// 设备信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,

    /// 用户信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,

    /// 请求来源信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,

    /// 隐私法规信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regs: Option<Regs>,

    // 其它简单字段
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmax: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wseat: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bseat: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allimps: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cur: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wlang: Option<Vec<String>>,
    /// IETF BCP 47 语言白名单（2.6 新增）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wlangb: Option<Vec<String>>,
    /// 内容分类体系标识（2.6 新增）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cattax: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bcat: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badv: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 单个广告展示机会
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Imp {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<Banner>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<Video>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<Audio>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native: Option<Native>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmp: Option<Pmp>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instl: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidfloor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidfloorcur: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// 激励广告标记（2.6 新增，2.5 侧迁入 ext）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rwdd: Option<i8>,
    /// 服务端广告拼接方式（2.6 新增）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssai: Option<i8>,
    /// 展示数量乘数（DOOH 场景，202211 新增）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<Qty>,
    /// 预计履约时间戳（202211 新增）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dt: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// Banner 广告描述
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Banner {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub format: Vec<Format>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 可投放尺寸
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Format {
    pub w: i64,
    pub h: i64,
}

/// Video 广告描述，含 2.6 的 pod 相关字段
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Video {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mimes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minduration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxduration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub startdelay: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocols: Option<Vec<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<i64>,

    /// pod 内最大广告数（2.6）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxseq: Option<i64>,
    /// pod 总时长，秒（2.6）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poddur: Option<i64>,
    /// pod 标识（2.6）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub podid: Option<i64>,
    /// pod 在内容流中的位置（2.6）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub podseq: Option<i8>,
    /// 各槽位要求的时长列表（2.6）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rqddurs: Option<Vec<i64>>,
    /// 槽位在 pod 内的位置（2.6）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slotinpod: Option<i8>,
    /// 每秒最低出价（2.6）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mincpmpersec: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// Audio 广告描述，pod 字段与 Video 对应
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Audio {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mimes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minduration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxduration: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxseq: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poddur: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub podid: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub podseq: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rqddurs: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slotinpod: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mincpmpersec: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// Native 广告描述
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Native {
    pub request: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 私有交易信息
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Pmp {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_auction: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deals: Vec<Deal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// pmp 中的交易条目
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Deal {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidfloor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidfloorcur: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 展示数量乘数（DOOH 一次播放对应多人观看）
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Qty {
    pub multiplier: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sourcetype: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
}

/// 网站信息
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Site {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cattax: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    /// 关键词数组形式（2.6 新增）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kwarray: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<Publisher>,
    /// 库存合作方域名（202211 新增）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventorypartnerdomain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 应用信息
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct App {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cattax: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kwarray: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<Publisher>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inventorypartnerdomain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 数字户外（DOOH）渠道信息，2.5 没有任何对应槽位
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Dooh {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venuetype: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venuetypetax: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<Publisher>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 媒体内容描述
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cattax: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kwarray: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// IETF BCP 47 语言码（2.6 新增，替代 language）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub langb: Option<String>,
    /// 内容分发网络（2.6 新增）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    /// 内容频道（2.6 新增）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<Producer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 内容分发网络
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Network {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 内容频道
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Channel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 内容制作方
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Producer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cattax: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 媒体发布方
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Publisher {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cattax: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 设备信息
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Device {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ua: Option<String>,
    /// 结构化 User-Agent（2.6 新增）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sua: Option<UserAgent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dnt: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lmt: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// IETF BCP 47 语言码（2.6 新增）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub langb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 结构化 User-Agent
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct UserAgent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<i8>,
    // 可扩展其它字段
}

/// 用户信息
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyeruid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yob: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kwarray: Option<Vec<String>>,
    /// 用户授权字符串（2.6 新增，2.5 侧迁入 ext）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent: Option<String>,
    /// 扩展身份集（2.6 新增，2.5 侧迁入 ext）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eids: Option<Vec<Eid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 单个身份源条目
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Eid {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uids: Vec<Uid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 身份源下的单个用户标识
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Uid {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atype: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 请求来源信息
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Source {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fd: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pchain: Option<String>,
    /// 供应链对象（2.6 新增，2.5 侧迁入 ext）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schain: Option<SupplyChain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 供应链对象
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SupplyChain {
    pub complete: i8,
    pub nodes: Vec<SupplyChainNode>,
    pub ver: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 供应链节点
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SupplyChainNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hp: Option<i8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}

/// 隐私法规信息
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Regs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coppa: Option<i8>,
    /// GDPR 适用标记（2.6 新增）。0 是合法取值，
    /// 「存在且为 0」与「缺失」必须可区分，所以用 Option 表示存在性
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gdpr: Option<i8>,
    /// 美国隐私字符串（2.6 新增）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub us_privacy: Option<String>,
    /// 全球隐私平台字符串（202211 新增）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpp: Option<String>,
    /// GPP 分节标识列表（202211 新增）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpp_sid: Option<Vec<i8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}
