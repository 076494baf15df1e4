// src/compat/downgrade.rs

use serde_json::json;

use crate::openrtb::ext::merge_ext;
use crate::openrtb::request::{BidRequest, Imp};
use crate::CompatError;

/// 把 2.6 请求降级为 2.5 形态。
///
/// 固定顺序执行各个字段迁移（互相不触碰对方的字段，顺序只影响报错先后），
/// 全部成功后再做两轮结构化清除。任何一个 ext 槽位里有坏 JSON 都会立刻
/// 中止并返回 `MalformedExt`；此时请求上已完成的迁移不回滚，调用方必须
/// 整体丢弃这个请求，不能复用。
pub fn downgrade_to_25(req: &mut BidRequest) -> Result<(), CompatError> {
    move_supply_chain(req)?;
    move_gdpr(req)?;
    move_consent(req)?;
    move_us_privacy(req)?;
    move_eids(req)?;
    move_gpp(req)?;
    move_gpp_sid(req)?;
    for imp in &mut req.imp {
        move_rewarded(imp)?;
    }
    super::clear::clear_26_fields(req);
    super::clear::clear_202211_fields(req);
    Ok(())
}

/// source.schain → source.ext["schain"]
fn move_supply_chain(req: &mut BidRequest) -> Result<(), CompatError> {
    let Some(source) = req.source.as_mut() else {
        return Ok(());
    };
    let value = match source.schain.as_ref() {
        Some(schain) => serde_json::to_value(schain)?,
        None => return Ok(()),
    };
    source.ext = Some(merge_ext(source.ext.as_ref(), "schain", value)?);
    source.schain = None;
    Ok(())
}

/// regs.gdpr → regs.ext["gdpr"]。0 也是要迁移的取值，只有缺失才跳过
fn move_gdpr(req: &mut BidRequest) -> Result<(), CompatError> {
    let Some(regs) = req.regs.as_mut() else {
        return Ok(());
    };
    let Some(gdpr) = regs.gdpr else {
        return Ok(());
    };
    regs.ext = Some(merge_ext(regs.ext.as_ref(), "gdpr", json!(gdpr))?);
    regs.gdpr = None;
    Ok(())
}

/// user.consent → user.ext["consent"]
fn move_consent(req: &mut BidRequest) -> Result<(), CompatError> {
    let Some(user) = req.user.as_mut() else {
        return Ok(());
    };
    let value = match user.consent.as_deref() {
        Some(consent) if !consent.is_empty() => json!(consent),
        _ => return Ok(()),
    };
    user.ext = Some(merge_ext(user.ext.as_ref(), "consent", value)?);
    user.consent = None;
    Ok(())
}

/// regs.us_privacy → regs.ext["us_privacy"]
fn move_us_privacy(req: &mut BidRequest) -> Result<(), CompatError> {
    let Some(regs) = req.regs.as_mut() else {
        return Ok(());
    };
    let value = match regs.us_privacy.as_deref() {
        Some(us_privacy) if !us_privacy.is_empty() => json!(us_privacy),
        _ => return Ok(()),
    };
    regs.ext = Some(merge_ext(regs.ext.as_ref(), "us_privacy", value)?);
    regs.us_privacy = None;
    Ok(())
}

/// user.eids → user.ext["eids"]。空列表不迁移也不改动
fn move_eids(req: &mut BidRequest) -> Result<(), CompatError> {
    let Some(user) = req.user.as_mut() else {
        return Ok(());
    };
    let value = match user.eids.as_ref() {
        Some(eids) if !eids.is_empty() => serde_json::to_value(eids)?,
        _ => return Ok(()),
    };
    user.ext = Some(merge_ext(user.ext.as_ref(), "eids", value)?);
    user.eids = None;
    Ok(())
}

/// regs.gpp → regs.ext["gpp"]
fn move_gpp(req: &mut BidRequest) -> Result<(), CompatError> {
    let Some(regs) = req.regs.as_mut() else {
        return Ok(());
    };
    let value = match regs.gpp.as_deref() {
        Some(gpp) if !gpp.is_empty() => json!(gpp),
        _ => return Ok(()),
    };
    regs.ext = Some(merge_ext(regs.ext.as_ref(), "gpp", value)?);
    regs.gpp = None;
    Ok(())
}

/// regs.gpp_sid → regs.ext["gpp_sid"]
fn move_gpp_sid(req: &mut BidRequest) -> Result<(), CompatError> {
    let Some(regs) = req.regs.as_mut() else {
        return Ok(());
    };
    let value = match regs.gpp_sid.as_ref() {
        Some(sid) if !sid.is_empty() => json!(sid),
        _ => return Ok(()),
    };
    regs.ext = Some(merge_ext(regs.ext.as_ref(), "gpp_sid", value)?);
    regs.gpp_sid = None;
    Ok(())
}

/// imp.rwdd → imp.ext["prebid"]["is_rewarded_inventory"]。
/// 下游按整个 "prebid" 键读取，所以这里整键覆盖
fn move_rewarded(imp: &mut Imp) -> Result<(), CompatError> {
    let Some(rwdd) = imp.rwdd.filter(|v| *v != 0) else {
        return Ok(());
    };
    let value = json!({ "is_rewarded_inventory": rwdd });
    imp.ext = Some(merge_ext(imp.ext.as_ref(), "prebid", value)?);
    imp.rwdd = None;
    Ok(())
}
