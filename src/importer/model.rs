/// 임포트 배치 모델: 로트 CSV와 이미지 파일명 매핑의 행 단위 결과
// region:    --- Imports
use crate::auction::model::{AuctionId, BatchId, LotId, MappingId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- Batch

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    LotsCsv,
    Images,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::LotsCsv => "lots_csv",
            BatchKind::Images => "images",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "lots_csv" => Some(BatchKind::LotsCsv),
            "images" => Some(BatchKind::Images),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Completed,
    Rejected,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Completed => "completed",
            BatchStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(BatchStatus::Completed),
            "rejected" => Some(BatchStatus::Rejected),
            _ => None,
        }
    }
}

/// 행 단위 오류. row는 1부터 세는 데이터 행 번호 (헤더 제외).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub field: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: BatchId,
    pub auction_id: AuctionId,
    pub kind: BatchKind,
    pub status: BatchStatus,
    pub total_rows: i64,
    pub ok_rows: i64,
    pub error_rows: i64,
    pub errors: Vec<RowError>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewImportBatch {
    pub auction_id: AuctionId,
    pub kind: BatchKind,
    pub status: BatchStatus,
    pub total_rows: i64,
    pub ok_rows: i64,
    pub error_rows: i64,
    pub errors: Vec<RowError>,
    pub created_at: DateTime<Utc>,
}

// endregion: --- Batch

// region:    --- Image Mapping

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStatus {
    Matched,
    Unmatched,
    Conflict,
    Manual,
}

impl MappingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingStatus::Matched => "matched",
            MappingStatus::Unmatched => "unmatched",
            MappingStatus::Conflict => "conflict",
            MappingStatus::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "matched" => Some(MappingStatus::Matched),
            "unmatched" => Some(MappingStatus::Unmatched),
            "conflict" => Some(MappingStatus::Conflict),
            "manual" => Some(MappingStatus::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMapping {
    pub id: MappingId,
    pub batch_id: BatchId,
    pub auction_id: AuctionId,
    pub filename: String,
    pub stored_url: String,
    /// 파일명에서 파싱된 로트 번호 (파싱 실패면 None)
    pub lot_number: Option<i64>,
    pub photo_order: Option<i64>,
    /// 매칭/수동 배정된 로트
    pub lot_id: Option<LotId>,
    pub status: MappingStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewImageMapping {
    pub filename: String,
    pub stored_url: String,
    pub lot_number: Option<i64>,
    pub photo_order: Option<i64>,
    pub lot_id: Option<LotId>,
    pub status: MappingStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

// endregion: --- Image Mapping
