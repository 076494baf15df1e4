// src/openrtb/response.rs

use serde::{Deserialize, Serialize};

use crate::openrtb::ext::Ext;

/// OpenRTB Bid Response
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct BidResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seatbid: Vec<SeatBid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bidid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cur: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customdata: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbr: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SeatBid {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bid: Vec<Bid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Bid {
    pub id: String,
    pub impid: String,
    pub price: f64,
    /// Ad markup (HTML / VAST / native JSON)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cat: Option<Vec<String>>,
    /// 物料类型标记：1 banner、2 video、3 audio、4 native
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtype: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<Ext>,
}
