// src/compat/clear.rs

use crate::openrtb::request::{BidRequest, Content};

/// 清掉 2.5 完全没有定义、也没有 ext 迁移目标的 2.6 结构化字段。
///
/// 纯结构遍历，不解析任何 JSON，没有失败路径；重复执行结果不变。
/// 不触碰 regs.coppa、source.tid、user.id 以及任何 ext 槽位。
pub fn clear_26_fields(req: &mut BidRequest) {
    req.wlangb = None;
    req.cattax = None;

    if let Some(app) = req.app.as_mut() {
        app.cattax = None;
        app.kwarray = None;
        clear_26_content(app.content.as_mut());
        if let Some(publisher) = app.publisher.as_mut() {
            publisher.cattax = None;
        }
    }

    if let Some(site) = req.site.as_mut() {
        site.cattax = None;
        site.kwarray = None;
        clear_26_content(site.content.as_mut());
        if let Some(publisher) = site.publisher.as_mut() {
            publisher.cattax = None;
        }
    }

    if let Some(device) = req.device.as_mut() {
        device.sua = None;
        device.langb = None;
    }

    if let Some(regs) = req.regs.as_mut() {
        regs.gdpr = None;
        regs.us_privacy = None;
    }

    if let Some(source) = req.source.as_mut() {
        source.schain = None;
    }

    if let Some(user) = req.user.as_mut() {
        user.kwarray = None;
        user.consent = None;
        user.eids = None;
    }

    for imp in &mut req.imp {
        imp.rwdd = None;
        imp.ssai = None;
        if let Some(audio) = imp.audio.as_mut() {
            audio.maxseq = None;
            audio.poddur = None;
            audio.podid = None;
            audio.podseq = None;
            audio.rqddurs = None;
            audio.slotinpod = None;
            audio.mincpmpersec = None;
        }
        if let Some(video) = imp.video.as_mut() {
            video.maxseq = None;
            video.poddur = None;
            video.podid = None;
            video.podseq = None;
            video.rqddurs = None;
            video.slotinpod = None;
            video.mincpmpersec = None;
        }
    }
}

/// content 子树的 2.6 字段：分类体系、关键词数组、语言码，
/// network / channel 整个丢弃（id 等在 2.5 里无处安放）
fn clear_26_content(content: Option<&mut Content>) {
    let Some(content) = content else {
        return;
    };
    content.cattax = None;
    content.kwarray = None;
    content.langb = None;
    content.network = None;
    content.channel = None;
    if let Some(producer) = content.producer.as_mut() {
        producer.cattax = None;
    }
}

/// 清掉 2022-11 规范增量引入的字段。
///
/// app / site 只是去掉新增字段、对象本身保留；dooh 在 2.5 系里
/// 没有任何对应渠道表示，整个对象直接丢弃。
pub fn clear_202211_fields(req: &mut BidRequest) {
    if let Some(app) = req.app.as_mut() {
        app.inventorypartnerdomain = None;
    }
    if let Some(site) = req.site.as_mut() {
        site.inventorypartnerdomain = None;
    }
    req.dooh = None;

    if let Some(regs) = req.regs.as_mut() {
        regs.gpp = None;
        regs.gpp_sid = None;
    }

    for imp in &mut req.imp {
        imp.qty = None;
        imp.dt = None;
    }
}
