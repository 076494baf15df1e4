// src/compat/pods.rs

use crate::openrtb::request::{BidRequest, Imp};

/// 把声明了 pod（总时长 + 槽位数）的 imp 展开为逐槽位的离散 imp。
///
/// 每个 pod imp 产出 maxseq 个副本，id 统一为「原始下标_槽位序号」，
/// 槽位时长取 poddur / maxseq 向下取整，分配出去的总时长不会超过
/// 原始 pod 时长；尺寸与 MIME 列表原样继承，pod 专属字段全部清空。
/// 非 pod imp 原样保留，输出顺序与输入一致。
///
/// 槽位数为 0 或负数的声明属于调用方违约，这里不做校验。
pub fn expand_pod_impressions(req: &mut BidRequest) {
    let imps = std::mem::take(&mut req.imp);
    let mut expanded = Vec::with_capacity(imps.len());

    for (pos, imp) in imps.into_iter().enumerate() {
        let Some((poddur, maxseq)) = pod_declaration(&imp) else {
            expanded.push(imp);
            continue;
        };
        let slot_duration = poddur / maxseq;
        for slot in 0..maxseq {
            let mut split = imp.clone();
            split.id = format!("{}_{}", pos, slot);
            if let Some(video) = split.video.as_mut() {
                if video.poddur.is_some() {
                    video.maxduration = Some(slot_duration);
                    video.maxseq = None;
                    video.poddur = None;
                    video.podid = None;
                    video.podseq = None;
                    video.rqddurs = None;
                    video.slotinpod = None;
                    video.mincpmpersec = None;
                }
            }
            if let Some(audio) = split.audio.as_mut() {
                if audio.poddur.is_some() {
                    audio.maxduration = Some(slot_duration);
                    audio.maxseq = None;
                    audio.poddur = None;
                    audio.podid = None;
                    audio.podseq = None;
                    audio.rqddurs = None;
                    audio.slotinpod = None;
                    audio.mincpmpersec = None;
                }
            }
            expanded.push(split);
        }
    }

    req.imp = expanded;
}

/// 读取 imp 上的 pod 声明：(总时长, 槽位数)。video 优先于 audio
fn pod_declaration(imp: &Imp) -> Option<(i64, i64)> {
    if let Some(video) = imp.video.as_ref() {
        if let (Some(poddur), Some(maxseq)) = (video.poddur, video.maxseq) {
            if poddur > 0 && maxseq >= 1 {
                return Some((poddur, maxseq));
            }
        }
    }
    if let Some(audio) = imp.audio.as_ref() {
        if let (Some(poddur), Some(maxseq)) = (audio.poddur, audio.maxseq) {
            if poddur > 0 && maxseq >= 1 {
                return Some((poddur, maxseq));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openrtb::request::{Audio, Video};
    use proptest::prelude::*;

    #[test]
    fn expands_video_pod_into_slots() {
        let mut req = BidRequest {
            id: "1".to_string(),
            imp: vec![Imp {
                id: "1".to_string(),
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

        expand_pod_impressions(&mut req);

        let slot = |id: &str| Imp {
            id: id.to_string(),
            video: Some(Video {
                maxduration: Some(15),
                w: Some(600),
                h: Some(500),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            req.imp,
            vec![slot("0_0"), slot("0_1"), slot("0_2"), slot("0_3")]
        );
    }

    #[test]
    fn keeps_non_pod_impressions_in_order() {
        let mut req = BidRequest {
            id: "1".to_string(),
            imp: vec![
                Imp {
                    id: "lead".to_string(),
                    video: Some(Video {
                        maxduration: Some(30),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                Imp {
                    id: "pod".to_string(),
                    video: Some(Video {
                        poddur: Some(45),
                        maxseq: Some(2),
                        mimes: vec!["video/mp4".to_string()],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                Imp {
                    id: "tail".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        expand_pod_impressions(&mut req);

        let ids: Vec<&str> = req.imp.iter().map(|imp| imp.id.as_str()).collect();
        assert_eq!(ids, vec!["lead", "1_0", "1_1", "tail"]);
        // 22 * 2 <= 45，继承 MIME 列表
        assert_eq!(req.imp[1].video.as_ref().unwrap().maxduration, Some(22));
        assert_eq!(
            req.imp[1].video.as_ref().unwrap().mimes,
            vec!["video/mp4".to_string()]
        );
        assert_eq!(req.imp[2].video.as_ref().unwrap().poddur, None);
    }

    #[test]
    fn expands_audio_pod_too() {
        let mut req = BidRequest {
            id: "1".to_string(),
            imp: vec![Imp {
                id: "a".to_string(),
                audio: Some(Audio {
                    poddur: Some(90),
                    maxseq: Some(3),
                    mimes: vec!["audio/mp4".to_string()],
                    podid: Some(7),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        };

        expand_pod_impressions(&mut req);

        assert_eq!(req.imp.len(), 3);
        for (slot, imp) in req.imp.iter().enumerate() {
            assert_eq!(imp.id, format!("0_{}", slot));
            let audio = imp.audio.as_ref().unwrap();
            assert_eq!(audio.maxduration, Some(30));
            assert_eq!(audio.poddur, None);
            assert_eq!(audio.podid, None);
            assert_eq!(audio.mimes, vec!["audio/mp4".to_string()]);
        }
    }

    proptest! {
        // 槽位数恒等于 maxseq，分配的总时长不超过 poddur
        #[test]
        fn slot_arithmetic_never_overshoots(poddur in 0i64..36_000, maxseq in 1i64..64) {
            let mut req = BidRequest {
                id: "1".to_string(),
                imp: vec![Imp {
                    id: "1".to_string(),
                    video: Some(Video {
                        poddur: Some(poddur),
                        maxseq: Some(maxseq),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            };

            expand_pod_impressions(&mut req);

            if poddur > 0 {
                prop_assert_eq!(req.imp.len() as i64, maxseq);
                let total: i64 = req
                    .imp
                    .iter()
                    .map(|imp| imp.video.as_ref().unwrap().maxduration.unwrap())
                    .sum();
                prop_assert!(total <= poddur);
            } else {
                // 没有正时长就不算 pod 声明
                prop_assert_eq!(req.imp.len(), 1);
            }
        }
    }
}
