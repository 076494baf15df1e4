// src/bidding/outbound.rs

use std::collections::BTreeSet;

use serde::Deserialize;
use tracing::{info, warn};

use crate::compat::downgrade::downgrade_to_25;
use crate::compat::pods::expand_pod_impressions;
use crate::openrtb::request::{Banner, BidRequest, Format, Imp, Publisher};
use crate::CompatError;

/// 单个下游请求默认最多携带的 imp 数
pub const DEFAULT_MAX_IMPS: usize = 20;

/// imp.ext 中下游关心的定向块：{"bidder":{"siteId":"..."}}
#[derive(Deserialize, Debug, Default)]
struct ImpExt {
    #[serde(default)]
    bidder: Option<ImpExtBidder>,
}

#[derive(Deserialize, Debug, Default)]
struct ImpExtBidder {
    #[serde(default, rename = "siteId")]
    site_id: Option<String>,
}

/// 出站前的请求整形，最后执行 2.6 → 2.5 降级。
///
/// - 超过 `max_imps` 的 imp 直接截断；
/// - 逐个 imp 归一化 banner 尺寸、收集 ext 里的 siteId；
///   ext 解析失败的 imp 从出站请求中剔除，对应错误收集后返回；
/// - 恰好收集到一个 siteId 且请求带 site 时，写入 site.publisher.id，
///   出现多个不同 siteId 只告警不改写；
/// - `expand_pods` 为真时在降级前把 pod imp 展开成离散 imp
///   （降级会清掉 pod 声明字段，顺序不能反）。
///
/// 降级失败说明某个 ext 槽位已被坏数据污染，整个请求作废，
/// 错误直接上抛；被剔除 imp 的错误作为 Ok 值返回，调用方自行决定上报。
pub fn prepare_outbound(
    req: &mut BidRequest,
    max_imps: usize,
    expand_pods: bool,
) -> Result<Vec<CompatError>, CompatError> {
    if req.imp.len() > max_imps {
        req.imp.truncate(max_imps);
    }
    info!(
        request_id = %req.id,
        imp_count = req.imp.len(),
        "preparing outbound bid request"
    );

    let mut errs = Vec::new();
    let mut site_ids = BTreeSet::new();
    let mut kept = Vec::with_capacity(req.imp.len());
    for mut imp in std::mem::take(&mut req.imp) {
        match placement_site_id(&imp) {
            Ok(Some(site_id)) => {
                site_ids.insert(site_id);
            }
            Ok(None) => {}
            Err(err) => {
                errs.push(err);
                continue;
            }
        }
        normalize_banner(imp.banner.as_mut());
        kept.push(imp);
    }
    req.imp = kept;

    if site_ids.len() > 1 {
        warn!(
            request_id = %req.id,
            site_ids = ?site_ids,
            "multiple distinct site ids in one request"
        );
    } else if let (Some(site), Some(site_id)) = (req.site.as_mut(), site_ids.iter().next()) {
        site.publisher
            .get_or_insert_with(Publisher::default)
            .id = Some(site_id.clone());
    }

    if expand_pods {
        expand_pod_impressions(req);
    }
    downgrade_to_25(req)?;
    Ok(errs)
}

/// 读取 imp.ext 里的 siteId。ext 缺失视为没有定向信息，不算错误
fn placement_site_id(imp: &Imp) -> Result<Option<String>, CompatError> {
    let Some(ext) = imp.ext.as_ref() else {
        return Ok(None);
    };
    let parsed: ImpExt = serde_json::from_str(ext.as_str())?;
    Ok(parsed
        .bidder
        .and_then(|bidder| bidder.site_id)
        .filter(|site_id| !site_id.is_empty()))
}

/// banner 尺寸归一化：没有 format 但有 w/h 就补一个；
/// 恰好一个 format 时把尺寸回填到顶层 w/h
fn normalize_banner(banner: Option<&mut Banner>) {
    let Some(banner) = banner else {
        return;
    };
    if banner.format.is_empty() {
        if let (Some(w), Some(h)) = (banner.w, banner.h) {
            banner.format = vec![Format { w, h }];
        }
    }
    if banner.format.len() == 1 {
        banner.w = Some(banner.format[0].w);
        banner.h = Some(banner.format[0].h);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openrtb::ext::Ext;
    use crate::openrtb::request::{Banner, Imp, Site, Video};

    fn imp_with_ext(id: &str, ext: &str) -> Imp {
        Imp {
            id: id.to_string(),
            ext: Some(Ext::new(ext)),
            ..Default::default()
        }
    }

    #[test]
    fn banner_without_format_gains_one() {
        let mut banner = Banner {
            w: Some(300),
            h: Some(250),
            ..Default::default()
        };
        normalize_banner(Some(&mut banner));
        assert_eq!(banner.format, vec![Format { w: 300, h: 250 }]);
        assert_eq!((banner.w, banner.h), (Some(300), Some(250)));
    }

    #[test]
    fn single_format_fills_top_level_size() {
        let mut banner = Banner {
            format: vec![Format { w: 728, h: 90 }],
            ..Default::default()
        };
        normalize_banner(Some(&mut banner));
        assert_eq!((banner.w, banner.h), (Some(728), Some(90)));
    }

    #[test]
    fn multi_format_banner_is_left_alone() {
        let mut banner = Banner {
            format: vec![Format { w: 728, h: 90 }, Format { w: 300, h: 250 }],
            ..Default::default()
        };
        normalize_banner(Some(&mut banner));
        assert_eq!((banner.w, banner.h), (None, None));
    }

    #[test]
    fn single_site_id_lands_on_publisher() {
        let mut req = BidRequest {
            id: "anyID".to_string(),
            site: Some(Site::default()),
            imp: vec![
                imp_with_ext("1", r#"{"bidder":{"siteId":"123"}}"#),
                imp_with_ext("2", r#"{"bidder":{"siteId":"123"}}"#),
            ],
            ..Default::default()
        };
        let errs = prepare_outbound(&mut req, DEFAULT_MAX_IMPS, false).unwrap();
        assert!(errs.is_empty());
        assert_eq!(
            req.site.unwrap().publisher.unwrap().id,
            Some("123".to_string())
        );
    }

    #[test]
    fn conflicting_site_ids_leave_publisher_untouched() {
        let mut req = BidRequest {
            id: "anyID".to_string(),
            site: Some(Site::default()),
            imp: vec![
                imp_with_ext("1", r#"{"bidder":{"siteId":"123"}}"#),
                imp_with_ext("2", r#"{"bidder":{"siteId":"456"}}"#),
            ],
            ..Default::default()
        };
        prepare_outbound(&mut req, DEFAULT_MAX_IMPS, false).unwrap();
        assert_eq!(req.site.unwrap().publisher, None);
    }

    #[test]
    fn malformed_imp_ext_is_dropped_with_error() {
        let mut req = BidRequest {
            id: "anyID".to_string(),
            imp: vec![
                imp_with_ext("bad", "malformed"),
                imp_with_ext("good", r#"{"bidder":{"siteId":"123"}}"#),
            ],
            ..Default::default()
        };
        let errs = prepare_outbound(&mut req, DEFAULT_MAX_IMPS, false).unwrap();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].to_string(), "expected value at line 1 column 1");
        assert_eq!(req.imp.len(), 1);
        assert_eq!(req.imp[0].id, "good");
    }

    #[test]
    fn excess_impressions_are_truncated() {
        let mut req = BidRequest {
            id: "anyID".to_string(),
            imp: (0..5)
                .map(|i| Imp {
                    id: i.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        prepare_outbound(&mut req, 3, false).unwrap();
        assert_eq!(req.imp.len(), 3);
    }

    #[test]
    fn pods_expand_before_downgrade_clears_declarations() {
        let mut req = BidRequest {
            id: "anyID".to_string(),
            imp: vec![Imp {
                id: "pod".to_string(),
                video: Some(Video {
                    poddur: Some(60),
                    maxseq: Some(4),
                    w: Some(600),
                    h: Some(500),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        };
        prepare_outbound(&mut req, DEFAULT_MAX_IMPS, true).unwrap();
        assert_eq!(req.imp.len(), 4);
        assert_eq!(req.imp[0].id, "0_0");
        assert_eq!(req.imp[0].video.as_ref().unwrap().maxduration, Some(15));
    }
}
