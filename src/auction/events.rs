/// 감사(Audit) 이벤트 모델
/// 추가 전용(append-only) 스트림이며, 수정/삭제되지 않는다.
/// 분쟁 해결의 일차 근거 자료이므로 로트/비드 상태 변화는
/// 반드시 같은 트랜잭션 안에서 1건 이상의 감사 이벤트를 남긴다.
// region:    --- Imports
use crate::auction::model::{Amount, AuctionId, LotId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- Audit Kind

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    BidPlaced,
    BidRejected,
    ProxyTriggered,
    OutbidOccurred,
    SoftCloseTriggered,
    LotClosed,
    ReserveMet,
    BuyNowExecuted,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::BidPlaced => "bid_placed",
            AuditKind::BidRejected => "bid_rejected",
            AuditKind::ProxyTriggered => "proxy_triggered",
            AuditKind::OutbidOccurred => "outbid_occurred",
            AuditKind::SoftCloseTriggered => "soft_close_triggered",
            AuditKind::LotClosed => "lot_closed",
            AuditKind::ReserveMet => "reserve_met",
            AuditKind::BuyNowExecuted => "buy_now_executed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bid_placed" => Some(AuditKind::BidPlaced),
            "bid_rejected" => Some(AuditKind::BidRejected),
            "proxy_triggered" => Some(AuditKind::ProxyTriggered),
            "outbid_occurred" => Some(AuditKind::OutbidOccurred),
            "soft_close_triggered" => Some(AuditKind::SoftCloseTriggered),
            "lot_closed" => Some(AuditKind::LotClosed),
            "reserve_met" => Some(AuditKind::ReserveMet),
            "buy_now_executed" => Some(AuditKind::BuyNowExecuted),
            _ => None,
        }
    }
}

// endregion: --- Audit Kind

// region:    --- Audit Record

/// 저장 전 감사 이벤트 (삽입 입력)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub auction_id: AuctionId,
    pub lot_id: LotId,
    pub bidder_id: Option<UserId>,
    pub kind: AuditKind,
    pub previous_amount: Option<Amount>,
    pub new_amount: Option<Amount>,
    pub result_code: Option<String>,
    pub result_message: Option<String>,
    /// 결정 시점의 JSON 스냅샷
    pub snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// 저장된 감사 이벤트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub auction_id: AuctionId,
    pub lot_id: LotId,
    pub bidder_id: Option<UserId>,
    pub kind: AuditKind,
    pub previous_amount: Option<Amount>,
    pub new_amount: Option<Amount>,
    pub result_code: Option<String>,
    pub result_message: Option<String>,
    pub snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// endregion: --- Audit Record
