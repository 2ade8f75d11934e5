/// 로트(출품물)와 비드(입찰 기록) 모델
// region:    --- Imports
use crate::auction::model::{Amount, AuctionId, BidId, IncrementTier, LotId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- Lot Status

/// 로트 상태. 전이는 단조롭다:
/// pending → active → {sold | unsold | withdrawn}, 역행 없음.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    Pending,
    Active,
    Closed,
    Sold,
    Unsold,
    Withdrawn,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Pending => "pending",
            LotStatus::Active => "active",
            LotStatus::Closed => "closed",
            LotStatus::Sold => "sold",
            LotStatus::Unsold => "unsold",
            LotStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(LotStatus::Pending),
            "active" => Some(LotStatus::Active),
            "closed" => Some(LotStatus::Closed),
            "sold" => Some(LotStatus::Sold),
            "unsold" => Some(LotStatus::Unsold),
            "withdrawn" => Some(LotStatus::Withdrawn),
            _ => None,
        }
    }

    /// 입찰이 끝난 상태인지
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LotStatus::Closed | LotStatus::Sold | LotStatus::Unsold | LotStatus::Withdrawn
        )
    }
}

// endregion: --- Lot Status

// region:    --- Lot

/// 로트 모델. 라이브 입찰 스냅샷(current_bid, current_bidder_id, bid_count,
/// reserve_met)을 함께 가진다. current_close_at은 소프트 클로즈로만 늘어난다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub auction_id: AuctionId,
    /// 경매 내 유일
    pub lot_number: i64,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub quantity: i64,
    pub location: Option<String>,
    pub shipping_available: bool,
    pub tags: Vec<String>,
    pub starting_bid: Amount,
    pub reserve_price: Option<Amount>,
    pub buy_now_price: Option<Amount>,
    /// 로트별 증분 구간 재정의 (없으면 경매 규칙 사용)
    pub increment_rules_override: Option<Vec<IncrementTier>>,
    pub original_close_at: DateTime<Utc>,
    pub current_close_at: DateTime<Utc>,
    pub extension_count: i64,
    pub status: LotStatus,
    pub current_bid: Amount,
    pub current_bidder_id: Option<UserId>,
    pub bid_count: i64,
    pub reserve_met: bool,
    /// 인보이스 배송비 항목 (기본 0, 로트별 설정 가능)
    pub shipping_amount: Amount,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 로트 생성 입력 (임포터/관리용)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLot {
    pub auction_id: AuctionId,
    pub lot_number: i64,
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub quantity: i64,
    pub location: Option<String>,
    pub shipping_available: bool,
    pub tags: Vec<String>,
    pub starting_bid: Amount,
    pub reserve_price: Option<Amount>,
    pub buy_now_price: Option<Amount>,
    pub increment_rules_override: Option<Vec<IncrementTier>>,
    pub original_close_at: DateTime<Utc>,
    pub status: LotStatus,
    pub shipping_amount: Amount,
}

// endregion: --- Lot

// region:    --- Lot Snapshot

/// 클라이언트에 노출되는 로트 스냅샷. 시간은 Unix epoch 초로 직렬화한다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotSnapshot {
    pub lot_id: LotId,
    pub auction_id: AuctionId,
    pub lot_number: i64,
    pub status: LotStatus,
    pub starting_bid: Amount,
    pub current_bid: Amount,
    pub current_bidder_id: Option<UserId>,
    pub bid_count: i64,
    pub reserve_met: bool,
    pub buy_now_price: Option<Amount>,
    pub original_close_at: i64,
    pub current_close_at: i64,
    pub extension_count: i64,
}

impl LotSnapshot {
    pub fn of(lot: &Lot) -> Self {
        Self {
            lot_id: lot.id,
            auction_id: lot.auction_id,
            lot_number: lot.lot_number,
            status: lot.status,
            starting_bid: lot.starting_bid,
            current_bid: lot.current_bid,
            current_bidder_id: lot.current_bidder_id,
            bid_count: lot.bid_count,
            reserve_met: lot.reserve_met,
            buy_now_price: lot.buy_now_price,
            original_close_at: lot.original_close_at.timestamp(),
            current_close_at: lot.current_close_at.timestamp(),
            extension_count: lot.extension_count,
        }
    }
}

// endregion: --- Lot Snapshot

// region:    --- Bid

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidType {
    Manual,
    Proxy,
}

impl BidType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BidType::Manual => "manual",
            BidType::Proxy => "proxy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(BidType::Manual),
            "proxy" => Some(BidType::Proxy),
            _ => None,
        }
    }
}

/// 비드 레코드 상태. 로트 마감 시점에만 won/lost로 전이된다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    Active,
    Won,
    Lost,
}

impl BidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BidStatus::Active => "active",
            BidStatus::Won => "won",
            BidStatus::Lost => "lost",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BidStatus::Active),
            "won" => Some(BidStatus::Won),
            "lost" => Some(BidStatus::Lost),
            _ => None,
        }
    }
}

/// 비드 레코드. 추가 전용이며 amount/bidder/시간은 절대 바뀌지 않는다.
/// is_winning, max_bid_active, status 플래그만 전이한다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: BidId,
    pub lot_id: LotId,
    pub bidder_id: UserId,
    pub amount: Amount,
    pub bid_type: BidType,
    /// 입찰자가 제시한 상한 (제시한 경우에만 저장)
    pub max_bid: Option<Amount>,
    /// 이 입찰자의 프록시 상한이 아직 유효한지
    pub max_bid_active: bool,
    pub is_winning: bool,
    pub buy_now: bool,
    pub status: BidStatus,
    /// 직전 로트 스냅샷 (이 비드 직전의 현재가/현재 입찰자)
    pub previous_amount: Option<Amount>,
    pub previous_bidder_id: Option<UserId>,
    pub outbid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 비드 삽입 입력
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBid {
    pub lot_id: LotId,
    pub bidder_id: UserId,
    pub amount: Amount,
    pub bid_type: BidType,
    pub max_bid: Option<Amount>,
    pub max_bid_active: bool,
    pub is_winning: bool,
    pub buy_now: bool,
    pub status: BidStatus,
    pub previous_amount: Option<Amount>,
    pub previous_bidder_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

// endregion: --- Bid
