// src/bidding/media.rs

use std::collections::{BTreeSet, HashMap};

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::openrtb::request::BidRequest;
use crate::openrtb::response::{Bid, BidResponse};
use crate::CompatError;

// native1 事件常量：曝光事件 / 图片像素上报
const EVENT_IMPRESSION: i64 = 1;
const METHOD_IMAGE: i64 = 1;

/// bid 对应的物料类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Banner,
    Video,
    Audio,
    Native,
}

/// 解析出物料类型后的 bid
#[derive(Debug, Clone, PartialEq)]
pub struct TypedBid {
    pub bid: Bid,
    pub media_type: MediaType,
}

/// bid.ext 里下游声明的类型块：{"prebid":{"type":"video"}}
#[derive(Deserialize, Debug, Default)]
struct BidExt {
    #[serde(default)]
    prebid: Option<BidExtPrebid>,
}

#[derive(Deserialize, Debug, Default)]
struct BidExtPrebid {
    #[serde(default, rename = "type")]
    media_type: Option<String>,
}

fn parse_media_type(name: &str) -> Result<MediaType, CompatError> {
    match name {
        "banner" => Ok(MediaType::Banner),
        "video" => Ok(MediaType::Video),
        "audio" => Ok(MediaType::Audio),
        "native" => Ok(MediaType::Native),
        other => Err(CompatError::InvalidMediaType(other.to_string())),
    }
}

/// 请求侧各 imp 的物料类型，供响应侧按 impid 回查。
/// 多形态 imp 按 banner > video > native > audio 取第一个
pub fn imp_media_types(req: &BidRequest) -> HashMap<String, MediaType> {
    let mut types = HashMap::new();
    for imp in &req.imp {
        let media_type = if imp.banner.is_some() {
            MediaType::Banner
        } else if imp.video.is_some() {
            MediaType::Video
        } else if imp.native.is_some() {
            MediaType::Native
        } else if imp.audio.is_some() {
            MediaType::Audio
        } else {
            continue;
        };
        types.insert(imp.id.clone(), media_type);
    }
    types
}

/// 解析单个 bid 的物料类型。
/// 优先级：mtype 标记 > bid.ext 声明 > 按 impid 回查请求；
/// 回查不到就报 `UnmatchedImp`
pub fn media_type_for_bid(
    bid: &Bid,
    imp_types: &HashMap<String, MediaType>,
) -> Result<MediaType, CompatError> {
    match bid.mtype {
        Some(1) => return Ok(MediaType::Banner),
        Some(2) => return Ok(MediaType::Video),
        Some(3) => return Ok(MediaType::Audio),
        Some(4) => return Ok(MediaType::Native),
        _ => {}
    }

    if let Some(ext) = bid.ext.as_ref() {
        // ext 解析失败不算错，继续走 impid 回查
        if let Ok(parsed) = serde_json::from_str::<BidExt>(ext.as_str()) {
            if let Some(name) = parsed
                .prebid
                .and_then(|prebid| prebid.media_type)
                .filter(|name| !name.is_empty())
            {
                return parse_media_type(&name);
            }
        }
    }

    match imp_types.get(&bid.impid) {
        Some(media_type) => Ok(*media_type),
        None => Err(CompatError::UnmatchedImp(bid.impid.clone())),
    }
}

/// 把 native markup 里 eventtrackers 声明的图片曝光像素并进
/// imptrackers 列表，去重并排序。
///
/// markup 可能包在 {"native": {...}} 里，也可能就是裸响应对象；
/// 解析失败或没有 eventtrackers 时返回 None，表示 adm 不需要重写。
/// 重写走 serde_json 序列化，URL 不会被 HTML/unicode 转义。
pub fn merge_native_imp_trackers(adm: &str) -> Option<String> {
    let mut markup: Value = serde_json::from_str(adm).ok()?;
    let native = if markup.get("native").is_some_and(Value::is_object) {
        markup.get_mut("native").unwrap()
    } else {
        &mut markup
    };
    let response = native.as_object_mut()?;

    let event_trackers = match response.get("eventtrackers").and_then(Value::as_array) {
        Some(trackers) if !trackers.is_empty() => trackers,
        _ => return None,
    };

    let mut pixels: BTreeSet<String> = response
        .get("imptrackers")
        .and_then(Value::as_array)
        .map(|urls| {
            urls.iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    for tracker in event_trackers {
        let is_imp_pixel = tracker.get("event").and_then(Value::as_i64) == Some(EVENT_IMPRESSION)
            && tracker.get("method").and_then(Value::as_i64) == Some(METHOD_IMAGE);
        if is_imp_pixel {
            if let Some(url) = tracker.get("url").and_then(Value::as_str) {
                pixels.insert(url.to_owned());
            }
        }
    }

    let merged: Vec<Value> = pixels.into_iter().map(Value::String).collect();
    response.insert("imptrackers".to_string(), Value::Array(merged));
    serde_json::to_string(&markup).ok()
}

/// 响应侧整形：为每个 bid 解析物料类型，native bid 顺带重写
/// markup 里的曝光追踪列表。单个 bid 的解析失败不拖垮整个响应，
/// 错误逐条收集返回
pub fn collect_typed_bids(req: &BidRequest, resp: &BidResponse) -> (Vec<TypedBid>, Vec<CompatError>) {
    let imp_types = imp_media_types(req);
    let mut typed = Vec::new();
    let mut errs = Vec::new();

    for seatbid in &resp.seatbid {
        for bid in &seatbid.bid {
            match media_type_for_bid(bid, &imp_types) {
                Ok(media_type) => {
                    let mut bid = bid.clone();
                    if media_type == MediaType::Native {
                        if let Some(merged) =
                            bid.adm.as_deref().and_then(merge_native_imp_trackers)
                        {
                            bid.adm = Some(merged);
                        }
                    }
                    typed.push(TypedBid { bid, media_type });
                }
                Err(err) => errs.push(err),
            }
        }
    }

    info!(
        request_id = %req.id,
        imp_count = req.imp.len(),
        bid_count = typed.len(),
        "typed bid response"
    );
    (typed, errs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openrtb::ext::Ext;
    use crate::openrtb::request::{Banner, Imp, Video};
    use crate::openrtb::response::SeatBid;

    fn bid(impid: &str) -> Bid {
        Bid {
            id: "b1".to_string(),
            impid: impid.to_string(),
            price: 1.5,
            ..Default::default()
        }
    }

    #[test]
    fn mtype_marker_wins() {
        let types = HashMap::new();
        for (mtype, expected) in [
            (1, MediaType::Banner),
            (2, MediaType::Video),
            (3, MediaType::Audio),
            (4, MediaType::Native),
        ] {
            let bid = Bid {
                mtype: Some(mtype),
                ..bid("imp1")
            };
            assert_eq!(media_type_for_bid(&bid, &types).unwrap(), expected);
        }
    }

    #[test]
    fn ext_declared_type_beats_imp_lookup() {
        let mut types = HashMap::new();
        types.insert("imp1".to_string(), MediaType::Banner);
        let bid = Bid {
            ext: Some(Ext::new(r#"{"prebid":{"type":"video"}}"#)),
            ..bid("imp1")
        };
        assert_eq!(
            media_type_for_bid(&bid, &types).unwrap(),
            MediaType::Video
        );
    }

    #[test]
    fn unknown_ext_type_is_an_error() {
        let types = HashMap::new();
        let bid = Bid {
            ext: Some(Ext::new(r#"{"prebid":{"type":"popup"}}"#)),
            ..bid("imp1")
        };
        let err = media_type_for_bid(&bid, &types).unwrap_err();
        assert_eq!(err.to_string(), "invalid media type: popup");
    }

    #[test]
    fn falls_back_to_imp_lookup_and_errors_when_unmatched() {
        let req = BidRequest {
            id: "r1".to_string(),
            imp: vec![
                Imp {
                    id: "imp1".to_string(),
                    banner: Some(Banner::default()),
                    ..Default::default()
                },
                Imp {
                    id: "imp2".to_string(),
                    video: Some(Video::default()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let types = imp_media_types(&req);
        assert_eq!(
            media_type_for_bid(&bid("imp2"), &types).unwrap(),
            MediaType::Video
        );

        let err = media_type_for_bid(&bid("nope"), &types).unwrap_err();
        assert_eq!(err.to_string(), "unmatched impression id: nope");
    }

    #[test]
    fn merges_image_impression_pixels_sorted_and_deduped() {
        let adm = r#"{"imptrackers":["https://b.example/px","https://a.example/px"],"eventtrackers":[{"event":1,"method":1,"url":"https://c.example/px"},{"event":1,"method":1,"url":"https://b.example/px"},{"event":1,"method":2,"url":"https://js.example/t.js"},{"event":2,"method":1,"url":"https://mrc.example/px"}]}"#;
        let merged = merge_native_imp_trackers(adm).unwrap();
        let value: Value = serde_json::from_str(&merged).unwrap();
        assert_eq!(
            value.get("imptrackers").unwrap(),
            &serde_json::json!([
                "https://a.example/px",
                "https://b.example/px",
                "https://c.example/px"
            ])
        );
    }

    #[test]
    fn handles_wrapped_native_markup() {
        let adm = r#"{"native":{"eventtrackers":[{"event":1,"method":1,"url":"https://a.example/px?q=1&r=<2>"}]}}"#;
        let merged = merge_native_imp_trackers(adm).unwrap();
        // URL 原样输出，不做 HTML/unicode 转义
        assert!(merged.contains(r#""https://a.example/px?q=1&r=<2>""#));
        let value: Value = serde_json::from_str(&merged).unwrap();
        assert!(value.get("native").unwrap().get("imptrackers").is_some());
    }

    #[test]
    fn leaves_non_native_or_trackerless_adm_alone() {
        assert_eq!(merge_native_imp_trackers("<html></html>"), None);
        assert_eq!(merge_native_imp_trackers(r#"{"assets":[]}"#), None);
    }

    #[test]
    fn collect_typed_bids_reports_errors_per_bid() {
        let req = BidRequest {
            id: "r1".to_string(),
            imp: vec![Imp {
                id: "imp1".to_string(),
                banner: Some(Banner::default()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let resp = BidResponse {
            id: "r1".to_string(),
            seatbid: vec![SeatBid {
                bid: vec![bid("imp1"), bid("ghost")],
                ..Default::default()
            }],
            ..Default::default()
        };

        let (typed, errs) = collect_typed_bids(&req, &resp);
        assert_eq!(typed.len(), 1);
        assert_eq!(typed[0].media_type, MediaType::Banner);
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].to_string(), "unmatched impression id: ghost");
    }
}
