/// 경매(옥션) 도메인 모델
/// 모든 금액은 i64 센트, 모든 요율은 i64 베이시스 포인트(bp)로 다룬다.
// region:    --- Imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- Id / Amount Aliases

pub type UserId = i64;
pub type AuctionId = i64;
pub type LotId = i64;
pub type BidId = i64;
pub type InvoiceId = i64;
pub type BatchId = i64;
pub type MappingId = i64;

/// 센트 단위 금액
pub type Amount = i64;
/// 베이시스 포인트 요율 (10000bp = 100%)
pub type RateBp = i64;

// endregion: --- Id / Amount Aliases

// region:    --- Increment / Premium Tiers

/// 입찰 증분 구간: `min ≤ current < max` 구간에 step이 적용된다.
/// max가 None이면 상한 없음. 구간은 목록 순서대로 평가되고 첫 매치가 이긴다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementTier {
    pub min: Amount,
    pub max: Option<Amount>,
    pub step: Amount,
}

/// 구매자 수수료(프리미엄) 구간: 낙찰가 구간별 요율(bp)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumTier {
    pub min: Amount,
    pub max: Option<Amount>,
    pub rate_bp: RateBp,
}

// endregion: --- Increment / Premium Tiers

// region:    --- Auction Status

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Draft,
    Published,
    Active,
    Closed,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Draft => "draft",
            AuctionStatus::Published => "published",
            AuctionStatus::Active => "active",
            AuctionStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(AuctionStatus::Draft),
            "published" => Some(AuctionStatus::Published),
            "active" => Some(AuctionStatus::Active),
            "closed" => Some(AuctionStatus::Closed),
            _ => None,
        }
    }
}

// endregion: --- Auction Status

// region:    --- Auction

/// 경매 모델. 로트의 묶음과 타이밍, 소프트 클로즈 파라미터, 요율 테이블을 가진다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub title: String,
    pub status: AuctionStatus,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub soft_close_enabled: bool,
    /// 마감 전 이 시간 이내의 입찰이 연장을 유발한다 (초)
    pub trigger_window_secs: i64,
    /// 연장 길이 (초)
    pub extension_secs: i64,
    pub increment_rules: Vec<IncrementTier>,
    pub premium_rules: Vec<PremiumTier>,
    /// None이면 비과세
    pub tax_rate_bp: Option<RateBp>,
    pub created_at: DateTime<Utc>,
}

/// 경매 생성 입력
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuction {
    pub title: String,
    pub status: AuctionStatus,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub soft_close_enabled: bool,
    pub trigger_window_secs: i64,
    pub extension_secs: i64,
    pub increment_rules: Vec<IncrementTier>,
    pub premium_rules: Vec<PremiumTier>,
    pub tax_rate_bp: Option<RateBp>,
}

// endregion: --- Auction

// region:    --- User / Identity

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Guest,
    Bidder,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Bidder => "bidder",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "guest" => Some(Role::Guest),
            "bidder" => Some(Role::Bidder),
            "staff" => Some(Role::Staff),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    /// 스태프 이상(운영 권한) 여부
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Staff | Role::Admin)
    }
}

/// 인증 협력자가 검증해 넘겨주는 신원. 세션 발급은 외부 소관이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

// endregion: --- User / Identity
