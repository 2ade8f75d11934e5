/// 경매 상태 스케줄러와 클로저(마감 처리기).
/// 1초 주기로 경매/로트 활성화, 마감 도래 로트 마감, 전 로트 마감된
/// 경매의 마감 + 인보이스 생성을 수행한다. 관리자 트리거로도 호출된다.
/// 마감은 멱등이다: 이미 마감된 로트에 다시 실행해도 no-op.
// region:    --- Imports
use crate::auction::events::{AuditKind, AuditRecord};
use crate::auction::model::{Auction, AuctionId, AuctionStatus, LotId};
use crate::bidding::model::{Lot, LotSnapshot, LotStatus};
use crate::clock::SharedClock;
use crate::error::{EngineError, StoreError};
use crate::hub::{LiveEvent, LiveEventKind, LotHub};
use crate::invoice::{InvoiceError, Invoicer};
use crate::notifier::SharedNotifier;
use crate::store::SharedStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Closer

/// 직렬화 충돌 재시도 백오프 (place_bid와 동일 정책)
const ABORT_BACKOFF_MS: [u64; 3] = [1, 5, 25];

pub struct Closer {
    store: SharedStore,
    clock: SharedClock,
    hub: Arc<LotHub>,
    notifier: SharedNotifier,
    invoicer: Arc<Invoicer>,
}

impl Closer {
    pub fn new(
        store: SharedStore,
        clock: SharedClock,
        hub: Arc<LotHub>,
        notifier: SharedNotifier,
        invoicer: Arc<Invoicer>,
    ) -> Self {
        Self {
            store,
            clock,
            hub,
            notifier,
            invoicer,
        }
    }

    /// 로트 마감. 이미 마감된 로트는 현재 스냅샷을 돌려주는 no-op.
    pub async fn close_lot(&self, lot_id: LotId) -> Result<LotSnapshot, EngineError> {
        let mut attempt = 0usize;
        loop {
            match self.try_close_lot(lot_id).await {
                Err(EngineError::Store(StoreError::Aborted))
                    if attempt < ABORT_BACKOFF_MS.len() =>
                {
                    tokio::time::sleep(Duration::from_millis(ABORT_BACKOFF_MS[attempt])).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn try_close_lot(&self, lot_id: LotId) -> Result<LotSnapshot, EngineError> {
        let now = self.clock.now();
        let mut txn = self.store.begin_lot(lot_id).await?;
        let lot = txn.lot().clone();

        if lot.status != LotStatus::Active {
            // 멱등: 재실행은 관찰 가능한 상태를 바꾸지 않는다
            debug!("{:<12} --> 이미 마감된 로트: {}", "Closer", lot_id);
            return Ok(LotSnapshot::of(&lot));
        }

        // sold 판정: 입찰자가 있고 (리저브 없음 또는 충족)
        let sold = lot.current_bidder_id.is_some()
            && (lot.reserve_price.is_none() || lot.reserve_met);
        let winner = txn.winning_bid().await?;
        if let (Some(winning), Some(holder)) = (&winner, lot.current_bidder_id) {
            if winning.bidder_id != holder {
                return Err(EngineError::Invariant(format!(
                    "승자 비드({})와 현재 입찰자({})가 불일치",
                    winning.bidder_id, holder
                )));
            }
        }
        if sold && winner.is_none() {
            return Err(EngineError::Invariant(
                "sold 판정인데 승자 비드가 없습니다".to_string(),
            ));
        }

        // 정산: 낙찰 비드는 won, 나머지는 lost. 유찰이면 전부 lost.
        if sold {
            txn.settle_bids(winner.as_ref().map(|w| w.id)).await?;
        } else {
            txn.settle_bids(None).await?;
        }

        let mut updated = lot.clone();
        updated.status = if sold { LotStatus::Sold } else { LotStatus::Unsold };
        updated.closed_at = Some(now);
        txn.update_lot(&updated).await?;

        // lot_closed 감사는 로트당 정확히 한 번
        if !txn.has_audit(AuditKind::LotClosed).await? {
            txn.append_audit(AuditRecord {
                auction_id: updated.auction_id,
                lot_id: updated.id,
                bidder_id: updated.current_bidder_id,
                kind: AuditKind::LotClosed,
                previous_amount: None,
                new_amount: Some(updated.current_bid),
                result_code: None,
                result_message: Some(format!("최종 상태: {}", updated.status.as_str())),
                snapshot: serde_json::to_value(LotSnapshot::of(&updated))
                    .map_err(StoreError::Codec)?,
                created_at: now,
            })
            .await?;
        }
        txn.commit().await?;

        self.publish_closed(&updated).await;
        info!(
            "{:<12} --> 로트 마감: lot={}, 상태={}, 최종가={}",
            "Closer",
            updated.id,
            updated.status.as_str(),
            updated.current_bid
        );
        Ok(LotSnapshot::of(&updated))
    }

    /// 열리지 않은(pending) 로트는 경매 강제 마감 시 철회된다
    async fn withdraw_pending_lot(&self, lot_id: LotId) -> Result<(), EngineError> {
        let now = self.clock.now();
        let mut txn = self.store.begin_lot(lot_id).await?;
        let lot = txn.lot().clone();
        if lot.status != LotStatus::Pending {
            return Ok(());
        }
        let mut updated = lot.clone();
        updated.status = LotStatus::Withdrawn;
        updated.closed_at = Some(now);
        txn.update_lot(&updated).await?;
        if !txn.has_audit(AuditKind::LotClosed).await? {
            txn.append_audit(AuditRecord {
                auction_id: updated.auction_id,
                lot_id: updated.id,
                bidder_id: None,
                kind: AuditKind::LotClosed,
                previous_amount: None,
                new_amount: None,
                result_code: None,
                result_message: Some("미개시 로트 철회".to_string()),
                snapshot: serde_json::to_value(LotSnapshot::of(&updated))
                    .map_err(StoreError::Codec)?,
                created_at: now,
            })
            .await?;
        }
        txn.commit().await?;
        self.publish_closed(&updated).await;
        Ok(())
    }

    /// 경매 마감: 남은 로트를 모두 마감/철회하고 인보이스를 생성한다.
    pub async fn close_auction(&self, auction_id: AuctionId) -> Result<Auction, EngineError> {
        let auction = self.store.fetch_auction(auction_id).await?;
        if auction.status == AuctionStatus::Closed {
            return Ok(auction);
        }

        let lots = self.store.lots_for_auction(auction_id).await?;
        for lot in &lots {
            match lot.status {
                LotStatus::Active => {
                    self.close_lot(lot.id).await?;
                }
                LotStatus::Pending => {
                    self.withdraw_pending_lot(lot.id).await?;
                }
                _ => {}
            }
        }

        self.store
            .update_auction_status(auction_id, AuctionStatus::Closed)
            .await?;
        info!("{:<12} --> 경매 마감: auction={}", "Closer", auction_id);

        // 마감 직후 인보이스 생성. 이미 생성된 경우는 무시한다.
        match self.invoicer.generate_invoices(auction_id).await {
            Ok(invoices) => {
                info!(
                    "{:<12} --> 마감 인보이스 {}건 생성: auction={}",
                    "Closer",
                    invoices.len(),
                    auction_id
                );
            }
            Err(InvoiceError::AlreadyGenerated) => {}
            Err(e) => {
                warn!(
                    "{:<12} --> 인보이스 생성 실패: auction={}, {:?}",
                    "Closer", auction_id, e
                );
            }
        }

        let mut closed = auction;
        closed.status = AuctionStatus::Closed;
        Ok(closed)
    }

    async fn publish_closed(&self, lot: &Lot) {
        let event = LiveEvent {
            kind: LiveEventKind::LotClosed,
            lot: LotSnapshot::of(lot),
            at: self.clock.now().timestamp_millis(),
        };
        self.hub.publish(lot.id, event.clone());
        self.notifier.publish(&event).await;
    }
}

// endregion: --- Closer

// region:    --- Auction Scheduler

/// 경매 상태 업데이트 스케줄러
pub struct AuctionScheduler {
    store: SharedStore,
    clock: SharedClock,
    closer: Arc<Closer>,
    tick: Duration,
}

/// 경매 상태 업데이트 스케줄러 생성/실행
impl AuctionScheduler {
    pub fn new(store: SharedStore, clock: SharedClock, closer: Arc<Closer>, tick: Duration) -> Self {
        Self {
            store,
            clock,
            closer,
            tick,
        }
    }

    /// 스케줄러 시작
    pub async fn start(&self) {
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let closer = Arc::clone(&self.closer);
        let tick = self.tick;
        tokio::spawn(async move {
            let mut ticker = interval(tick);
            loop {
                ticker.tick().await;
                if let Err(e) = Self::sweep(&store, &clock, &closer).await {
                    error!(
                        "{:<12} --> 경매 상태 업데이트 중 오류 발생: {:?}",
                        "Scheduler", e
                    );
                }
            }
        });
    }

    /// 한 번의 스윕 (테스트에서 직접 호출 가능)
    pub async fn sweep(
        store: &SharedStore,
        clock: &SharedClock,
        closer: &Arc<Closer>,
    ) -> Result<(), EngineError> {
        let now: DateTime<Utc> = clock.now();

        // published → active
        for auction_id in store.activate_due_auctions(now).await? {
            info!("{:<12} --> 경매 활성화: auction={}", "Scheduler", auction_id);
        }
        // 활성 경매의 pending 로트 → active
        let activated = store.activate_pending_lots(now).await?;
        if activated > 0 {
            debug!("{:<12} --> 로트 {}건 활성화", "Scheduler", activated);
        }

        // 마감 도래 로트
        for lot_id in store.due_lot_ids(now).await? {
            if let Err(e) = closer.close_lot(lot_id).await {
                error!(
                    "{:<12} --> 로트 마감 실패: lot={}, {:?}",
                    "Scheduler", lot_id, e
                );
            }
        }

        // 모든 로트가 끝난 경매 마감 (+ 인보이스)
        for auction_id in store.active_auctions_with_no_open_lots().await? {
            if let Err(e) = closer.close_auction(auction_id).await {
                error!(
                    "{:<12} --> 경매 마감 실패: auction={}, {:?}",
                    "Scheduler", auction_id, e
                );
            }
        }
        Ok(())
    }
}

// endregion: --- Auction Scheduler
