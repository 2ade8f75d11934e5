/// 엔진 전역 오류 타입과 안정적인 결과 코드
// region:    --- Imports
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// endregion: --- Imports

// region:    --- Result Code

/// 클라이언트에 노출되는 안정적인 결과 코드.
/// 사람이 읽는 메시지는 바뀔 수 있지만 코드 문자열은 바뀌지 않는다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Accepted,
    InvalidAmount,
    InvalidMaxBid,
    LotNotActive,
    AuctionClosed,
    BidTooLow,
    SelfOutbid,
    OutbidByProxy,
    MaxBidTied,
    TransientConflict,
    NoBuyNow,
    NotActive,
    NotFound,
    NotClosed,
    AlreadyGenerated,
    InvalidCsv,
}

impl ResultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::Accepted => "ACCEPTED",
            ResultCode::InvalidAmount => "INVALID_AMOUNT",
            ResultCode::InvalidMaxBid => "INVALID_MAX_BID",
            ResultCode::LotNotActive => "LOT_NOT_ACTIVE",
            ResultCode::AuctionClosed => "AUCTION_CLOSED",
            ResultCode::BidTooLow => "BID_TOO_LOW",
            ResultCode::SelfOutbid => "SELF_OUTBID",
            ResultCode::OutbidByProxy => "OUTBID_BY_PROXY",
            ResultCode::MaxBidTied => "MAX_BID_TIED",
            ResultCode::TransientConflict => "TRANSIENT_CONFLICT",
            ResultCode::NoBuyNow => "NO_BUY_NOW",
            ResultCode::NotActive => "NOT_ACTIVE",
            ResultCode::NotFound => "NOT_FOUND",
            ResultCode::NotClosed => "NOT_CLOSED",
            ResultCode::AlreadyGenerated => "ALREADY_GENERATED",
            ResultCode::InvalidCsv => "INVALID_CSV",
        }
    }

    /// 결과 코드 → HTTP 상태 매핑
    /// OUTBID_BY_PROXY는 상태가 변경되었으므로 200으로 응답한다 (success=false 본문).
    pub fn http_status(&self) -> StatusCode {
        match self {
            ResultCode::Accepted | ResultCode::OutbidByProxy => StatusCode::OK,
            ResultCode::TransientConflict => StatusCode::SERVICE_UNAVAILABLE,
            ResultCode::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// endregion: --- Result Code

// region:    --- Store Error

/// 저장소 계층의 타입 오류
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("대상을 찾을 수 없습니다")]
    NotFound,

    #[error("제약 조건 충돌: {0}")]
    Conflict(String),

    #[error("직렬화 충돌, 재시도 필요")]
    Aborted,

    #[error("데이터베이스 오류: {0}")]
    Database(#[from] sqlx::Error),

    #[error("직렬화/역직렬화 오류: {0}")]
    Codec(#[from] serde_json::Error),
}

// endregion: --- Store Error

// region:    --- Engine Error

/// 입찰 엔진 오류. 정책 거절은 오류가 아니라 구조화된 결과로 반환되므로
/// 여기에는 저장소 전파와 불변식 위반만 남는다.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("불변식 위반: {0}")]
    Invariant(String),
}

impl EngineError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            EngineError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            EngineError::Store(StoreError::Aborted) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EngineError::Invariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// endregion: --- Engine Error

// region:    --- Tests


// endregion: --- Tests
