/// 읽기 경로 프로젝션: 비즈니스 로직 없이 조회와 응답 성형만 한다.
/// 입찰자 신원과 비밀 상한(max_bid)은 관리자/본인이 아니면 가린다.
// region:    --- Imports
use crate::auction::model::{Auction, Identity, UserId};
use crate::bidding::model::{Bid, BidStatus, BidType, LotSnapshot};
use crate::error::StoreError;
use crate::invoice::model::InvoiceWithItems;
use crate::store::SharedStore;
use serde::{Deserialize, Serialize};
use tracing::info;

// endregion: --- Imports

// region:    --- Views

/// 입찰 이력 한 건. 시간은 epoch 초.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidView {
    pub id: i64,
    pub lot_id: i64,
    /// 관리자/본인이 아니면 None
    pub bidder_id: Option<UserId>,
    pub amount: i64,
    pub bid_type: BidType,
    /// 비밀 상한: 관리자/본인 외에는 노출하지 않는다
    pub max_bid: Option<i64>,
    pub is_winning: bool,
    pub buy_now: bool,
    pub status: BidStatus,
    pub previous_amount: Option<i64>,
    pub created_at: i64,
}

/// 경매 요약 뷰. 시간은 epoch 초.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionView {
    pub id: i64,
    pub title: String,
    pub status: crate::auction::model::AuctionStatus,
    pub start_at: i64,
    pub end_at: i64,
    pub soft_close_enabled: bool,
    pub trigger_window_secs: i64,
    pub extension_secs: i64,
    pub tax_rate_bp: Option<i64>,
}

impl AuctionView {
    pub fn of(auction: &Auction) -> Self {
        Self {
            id: auction.id,
            title: auction.title.clone(),
            status: auction.status,
            start_at: auction.start_at.timestamp(),
            end_at: auction.end_at.timestamp(),
            soft_close_enabled: auction.soft_close_enabled,
            trigger_window_secs: auction.trigger_window_secs,
            extension_secs: auction.extension_secs,
            tax_rate_bp: auction.tax_rate_bp,
        }
    }
}

/// 입찰자 신원/상한 가리기
pub fn bid_view(bid: &Bid, viewer: &Identity) -> BidView {
    let privileged = viewer.role.is_staff() || bid.bidder_id == viewer.user_id;
    BidView {
        id: bid.id,
        lot_id: bid.lot_id,
        bidder_id: privileged.then_some(bid.bidder_id),
        amount: bid.amount,
        bid_type: bid.bid_type,
        max_bid: if privileged { bid.max_bid } else { None },
        is_winning: bid.is_winning,
        buy_now: bid.buy_now,
        status: bid.status,
        previous_amount: bid.previous_amount,
        created_at: bid.created_at.timestamp(),
    }
}

// endregion: --- Views

// region:    --- Query Handlers

/// 입찰 이력 조회 (최신순, 신원 가림 적용)
pub async fn get_bid_history(
    store: &SharedStore,
    viewer: &Identity,
    lot_id: i64,
) -> Result<Vec<BidView>, StoreError> {
    info!("{:<12} --> 입찰 이력 조회 id: {}", "Query", lot_id);
    let bids = store.bid_history(lot_id).await?;
    Ok(bids.iter().map(|bid| bid_view(bid, viewer)).collect())
}

/// 로트 스냅샷 조회
pub async fn get_lot_snapshot(store: &SharedStore, lot_id: i64) -> Result<LotSnapshot, StoreError> {
    info!("{:<12} --> 로트 조회 id: {}", "Query", lot_id);
    let lot = store.fetch_lot(lot_id).await?;
    Ok(LotSnapshot::of(&lot))
}

/// 경매 상태 조회
pub async fn get_auction_view(
    store: &SharedStore,
    auction_id: i64,
) -> Result<AuctionView, StoreError> {
    info!("{:<12} --> 경매 상태 조회 id: {}", "Query", auction_id);
    let auction = store.fetch_auction(auction_id).await?;
    Ok(AuctionView::of(&auction))
}

/// 경매의 로트 목록 조회
pub async fn get_auction_lots(
    store: &SharedStore,
    auction_id: i64,
) -> Result<Vec<LotSnapshot>, StoreError> {
    info!("{:<12} --> 경매 로트 목록 조회 id: {}", "Query", auction_id);
    // 경매 존재 확인
    store.fetch_auction(auction_id).await?;
    let lots = store.lots_for_auction(auction_id).await?;
    Ok(lots.iter().map(LotSnapshot::of).collect())
}

/// 최고 입찰가 조회
pub async fn get_highest_bid(store: &SharedStore, lot_id: i64) -> Result<Option<i64>, StoreError> {
    info!("{:<12} --> 최고 입찰가 조회 id: {}", "Query", lot_id);
    let lot = store.fetch_lot(lot_id).await?;
    Ok((lot.bid_count > 0).then_some(lot.current_bid))
}

/// 워치리스트 조회
pub async fn get_watchlist(
    store: &SharedStore,
    user_id: UserId,
) -> Result<Vec<LotSnapshot>, StoreError> {
    info!("{:<12} --> 워치리스트 조회 user: {}", "Query", user_id);
    let lot_ids = store.watchlist(user_id).await?;
    let mut snapshots = Vec::with_capacity(lot_ids.len());
    for lot_id in lot_ids {
        match store.fetch_lot(lot_id).await {
            Ok(lot) => snapshots.push(LotSnapshot::of(&lot)),
            // 워치 등록 후 삭제된 로트는 건너뛴다
            Err(StoreError::NotFound) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(snapshots)
}

/// 경매 인보이스 목록 조회
pub async fn get_invoices(
    store: &SharedStore,
    auction_id: i64,
) -> Result<Vec<InvoiceWithItems>, StoreError> {
    info!("{:<12} --> 인보이스 조회 auction: {}", "Query", auction_id);
    store.fetch_auction(auction_id).await?;
    store.invoices_for_auction(auction_id).await
}

// endregion: --- Query Handlers

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::model::Role;
    use chrono::{TimeZone, Utc};

    fn bid_fixture() -> Bid {
        Bid {
            id: 1,
            lot_id: 10,
            bidder_id: 7,
            amount: 5_000,
            bid_type: BidType::Manual,
            max_bid: Some(20_000),
            max_bid_active: true,
            is_winning: true,
            buy_now: false,
            status: BidStatus::Active,
            previous_amount: None,
            previous_bidder_id: None,
            outbid_at: None,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn stranger_sees_redacted_bid() {
        let view = bid_view(
            &bid_fixture(),
            &Identity {
                user_id: 99,
                role: Role::Bidder,
            },
        );
        assert_eq!(view.bidder_id, None);
        assert_eq!(view.max_bid, None);
        assert_eq!(view.amount, 5_000);
    }

    #[test]
    fn self_and_staff_see_full_bid() {
        let own = bid_view(
            &bid_fixture(),
            &Identity {
                user_id: 7,
                role: Role::Bidder,
            },
        );
        assert_eq!(own.bidder_id, Some(7));
        assert_eq!(own.max_bid, Some(20_000));

        let staff = bid_view(
            &bid_fixture(),
            &Identity {
                user_id: 1,
                role: Role::Staff,
            },
        );
        assert_eq!(staff.bidder_id, Some(7));
        assert_eq!(staff.max_bid, Some(20_000));
    }
}

// endregion: --- Tests
