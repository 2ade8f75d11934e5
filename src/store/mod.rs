/// 저장소 계층.
/// 로트 단위의 배타 트랜잭션(LotTxn)과 엔티티별 원자 연산(Store)을 분리한다.
/// 같은 로트를 겨냥한 변경 연산은 커밋까지 직렬로 실행되는 것이 계약이다.
// region:    --- Imports
use crate::auction::events::{AuditEvent, AuditKind, AuditRecord};
use crate::auction::model::{
    Auction, AuctionId, AuctionStatus, BidId, Identity, LotId, NewAuction, UserId,
};
use crate::bidding::model::{Bid, Lot, NewBid, NewLot};
use crate::error::StoreError;
use crate::importer::model::{ImageMapping, ImportBatch, NewImageMapping, NewImportBatch};
use crate::invoice::model::{InvoiceWithItems, NewInvoice};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

// endregion: --- Imports

pub mod memory;
pub mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

// region:    --- Lot Transaction

/// 한 로트에 대한 배타 트랜잭션 가드.
/// begin_lot에서 로트/경매 행을 잠그고 읽어두며, 가드가 살아있는 동안
/// 같은 로트의 다른 변경자는 대기하거나 Aborted로 밀려난다.
/// 쓰기는 커밋 전에도 이 가드의 읽기에 반영된다 (read-your-writes).
#[async_trait]
pub trait LotTxn: Send {
    /// 잠금 시점(이후 쓰기 반영)의 로트
    fn lot(&self) -> &Lot;

    /// 로트가 속한 경매
    fn auction(&self) -> &Auction;

    /// 해당 입찰자의 유효한 최대 입찰(max_bid_active = true) 레코드
    async fn active_max_bid(&mut self, bidder_id: UserId) -> Result<Option<Bid>, StoreError>;

    /// 현재 승자 비드 (is_winning = true)
    async fn winning_bid(&mut self) -> Result<Option<Bid>, StoreError>;

    async fn insert_bid(&mut self, bid: NewBid) -> Result<Bid, StoreError>;

    /// 비드의 is_winning을 내린다. outbid_at은 다른 입찰자에게
    /// 밀려난 경우에만 기록한다 (자기 프록시로 대체되면 None).
    async fn mark_bid_not_winning(
        &mut self,
        bid_id: BidId,
        outbid_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// 해당 입찰자의 이 로트 max_bid_active를 전부 내린다
    async fn deactivate_max_bids(&mut self, bidder_id: UserId) -> Result<(), StoreError>;

    /// 로트 행 전체를 갱신한다 (가드 캐시에도 반영)
    async fn update_lot(&mut self, lot: &Lot) -> Result<(), StoreError>;

    /// 마감 정산: winner는 won, 나머지는 전부 lost.
    /// winner가 None이면(유찰) 전부 lost.
    async fn settle_bids(&mut self, winner: Option<BidId>) -> Result<(), StoreError>;

    async fn append_audit(&mut self, audit: AuditRecord) -> Result<(), StoreError>;

    /// 이 로트에 해당 종류의 감사 이벤트가 이미 있는지 (lot_closed 중복 방지)
    async fn has_audit(&mut self, kind: AuditKind) -> Result<bool, StoreError>;

    /// 전체 커밋. 실패하면 아무것도 반영되지 않는다.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

// endregion: --- Lot Transaction

// region:    --- Store Trait

/// 영속 계층. 각 메서드는 자체적으로 원자적이다.
#[async_trait]
pub trait Store: Send + Sync {
    /// 로트 배타 트랜잭션 시작. 잠금 경합은 Aborted로 보고된다.
    async fn begin_lot(&self, lot_id: LotId) -> Result<Box<dyn LotTxn>, StoreError>;

    // -- 경매
    async fn insert_auction(&self, auction: NewAuction) -> Result<Auction, StoreError>;
    async fn fetch_auction(&self, auction_id: AuctionId) -> Result<Auction, StoreError>;
    async fn update_auction_status(
        &self,
        auction_id: AuctionId,
        status: AuctionStatus,
    ) -> Result<(), StoreError>;

    // -- 스케줄러 스윕
    /// published → active (start_at ≤ now). 전이된 경매 id 목록.
    async fn activate_due_auctions(&self, now: DateTime<Utc>) -> Result<Vec<AuctionId>, StoreError>;
    /// 활성 경매의 pending 로트를 active로 올린다. 전이 건수.
    async fn activate_pending_lots(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
    /// 마감 시각이 지난 active 로트 id 목록
    async fn due_lot_ids(&self, now: DateTime<Utc>) -> Result<Vec<LotId>, StoreError>;
    /// 열린 로트가 하나도 없는 active 경매 id 목록
    async fn active_auctions_with_no_open_lots(&self) -> Result<Vec<AuctionId>, StoreError>;

    // -- 로트
    async fn insert_lot(&self, lot: NewLot) -> Result<Lot, StoreError>;
    /// 배치 삽입. (auction_id, lot_number) 중복은 Conflict로 전체 실패.
    async fn insert_lots(&self, lots: Vec<NewLot>) -> Result<Vec<Lot>, StoreError>;
    async fn fetch_lot(&self, lot_id: LotId) -> Result<Lot, StoreError>;
    async fn lots_for_auction(&self, auction_id: AuctionId) -> Result<Vec<Lot>, StoreError>;
    /// 경매 내 lot_number → lot id 매핑
    async fn lot_numbers(&self, auction_id: AuctionId)
        -> Result<HashMap<i64, LotId>, StoreError>;

    // -- 비드 / 감사 (읽기)
    /// 최신순 입찰 이력
    async fn bid_history(&self, lot_id: LotId) -> Result<Vec<Bid>, StoreError>;
    async fn audit_for_lot(&self, lot_id: LotId) -> Result<Vec<AuditEvent>, StoreError>;
    /// 트랜잭션 밖 감사 기록 (존재하지 않는 로트에 대한 거절 등)
    async fn append_audit(&self, audit: AuditRecord) -> Result<(), StoreError>;

    // -- 워치리스트 (멱등)
    async fn add_watch(&self, user_id: UserId, lot_id: LotId) -> Result<(), StoreError>;
    async fn remove_watch(&self, user_id: UserId, lot_id: LotId) -> Result<(), StoreError>;
    async fn watchlist(&self, user_id: UserId) -> Result<Vec<LotId>, StoreError>;

    // -- 사용자 / 세션 (발급은 외부 소관, 조회만 담당)
    async fn insert_user(&self, username: &str, role: &str) -> Result<UserId, StoreError>;
    async fn insert_session(
        &self,
        token: &str,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    async fn resolve_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, StoreError>;

    // -- 인보이스
    async fn invoices_exist(&self, auction_id: AuctionId) -> Result<bool, StoreError>;
    /// 경매의 모든 인보이스를 한 번에 삽입. 이미 존재하면 Conflict.
    async fn insert_invoices(
        &self,
        auction_id: AuctionId,
        invoices: Vec<NewInvoice>,
    ) -> Result<Vec<InvoiceWithItems>, StoreError>;
    async fn invoices_for_auction(
        &self,
        auction_id: AuctionId,
    ) -> Result<Vec<InvoiceWithItems>, StoreError>;
    /// 전역 인보이스 번호 시퀀스
    async fn next_invoice_seq(&self) -> Result<i64, StoreError>;

    // -- 임포트
    async fn insert_import_batch(&self, batch: NewImportBatch) -> Result<ImportBatch, StoreError>;
    async fn insert_image_mappings(
        &self,
        batch_id: i64,
        auction_id: AuctionId,
        mappings: Vec<NewImageMapping>,
    ) -> Result<Vec<ImageMapping>, StoreError>;
    async fn fetch_image_mapping(&self, mapping_id: i64) -> Result<ImageMapping, StoreError>;
    /// 수동 배정: status = manual
    async fn assign_image_mapping(
        &self,
        mapping_id: i64,
        lot_id: LotId,
        photo_order: i64,
        now: DateTime<Utc>,
    ) -> Result<ImageMapping, StoreError>;
    /// 이미 점유된 (lot_id, photo_order) 쌍
    async fn occupied_photo_orders(
        &self,
        auction_id: AuctionId,
    ) -> Result<HashSet<(LotId, i64)>, StoreError>;
}

pub type SharedStore = Arc<dyn Store>;

// endregion: --- Store Trait
