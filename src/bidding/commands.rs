/// 입찰 관련 커맨드 처리
/// 1. 입찰 (프록시 해석, 소프트 클로즈 포함)
/// 2. 즉시 구매
///
/// 모든 변경은 로트 단위 배타 트랜잭션 안에서 일어나고,
/// 허브/노티파이어 발행은 커밋 이후에만 수행된다.
// region:    --- Imports
use crate::auction::events::{AuditKind, AuditRecord};
use crate::auction::model::{Amount, Auction, UserId};
use crate::bidding::model::{Bid, BidStatus, BidType, Lot, LotSnapshot, LotStatus, NewBid};
use crate::bidding::rules;
use crate::clock::SharedClock;
use crate::error::{EngineError, ResultCode, StoreError};
use crate::hub::{LiveEventKind, LotHub};
use crate::notifier::SharedNotifier;
use crate::store::{LotTxn, SharedStore};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Commands

/// 입찰 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaceBidCommand {
    pub lot_id: i64,
    pub amount: Amount,
    pub max_bid: Option<Amount>,
}

/// 즉시 구매 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BuyNowCommand {
    pub lot_id: i64,
}

/// 커맨드 처리 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidOutcome {
    pub result_code: ResultCode,
    /// 호출자가 선두가 되었는지
    pub accepted: bool,
    /// 로트 상태가 실제로 바뀌었는지 (OUTBID_BY_PROXY에서도 true)
    pub state_changed: bool,
    pub proxy_triggered: bool,
    pub outbid_occurred: bool,
    /// BID_TOO_LOW일 때 보고되는 최소 다음 입찰가
    pub floor: Option<Amount>,
    pub lot: Option<LotSnapshot>,
}

impl BidOutcome {
    fn rejected(code: ResultCode, floor: Option<Amount>, lot: Option<LotSnapshot>) -> Self {
        Self {
            result_code: code,
            accepted: false,
            state_changed: false,
            proxy_triggered: false,
            outbid_occurred: false,
            floor,
            lot,
        }
    }
}

// endregion: --- Commands

// region:    --- Retry Policy

/// 직렬화 충돌 재시도: 최대 3회, 지수 백오프
const ABORT_BACKOFF_MS: [u64; 3] = [1, 5, 25];

async fn with_lot_retry<F, Fut>(mut op: F) -> Result<BidOutcome, EngineError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<BidOutcome, EngineError>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Err(EngineError::Store(StoreError::Aborted)) if attempt < ABORT_BACKOFF_MS.len() => {
                warn!(
                    "{:<12} --> 직렬화 충돌, 재시도 {}/{}",
                    "Engine",
                    attempt + 1,
                    ABORT_BACKOFF_MS.len()
                );
                tokio::time::sleep(std::time::Duration::from_millis(ABORT_BACKOFF_MS[attempt]))
                    .await;
                attempt += 1;
            }
            Err(EngineError::Store(StoreError::Aborted)) => {
                // 재시도 소진: 상태 변경도, bid_placed 감사도 없다
                return Ok(BidOutcome::rejected(
                    ResultCode::TransientConflict,
                    None,
                    None,
                ));
            }
            other => return other,
        }
    }
}

// endregion: --- Retry Policy

// region:    --- Bidding Engine

pub struct BiddingEngine {
    store: SharedStore,
    clock: SharedClock,
    hub: Arc<LotHub>,
    notifier: SharedNotifier,
}

impl BiddingEngine {
    pub fn new(
        store: SharedStore,
        clock: SharedClock,
        hub: Arc<LotHub>,
        notifier: SharedNotifier,
    ) -> Self {
        Self {
            store,
            clock,
            hub,
            notifier,
        }
    }

    /// 1. 입찰
    pub async fn place_bid(
        &self,
        bidder_id: UserId,
        cmd: PlaceBidCommand,
    ) -> Result<BidOutcome, EngineError> {
        info!(
            "{:<12} --> 입찰 요청 처리 시작: bidder={}, {:?}",
            "Engine", bidder_id, cmd
        );
        with_lot_retry(|| self.try_place_bid(bidder_id, cmd.clone())).await
    }

    async fn try_place_bid(
        &self,
        bidder_id: UserId,
        cmd: PlaceBidCommand,
    ) -> Result<BidOutcome, EngineError> {
        let now = self.clock.now();

        // 입력 검증은 로트 조회보다 먼저다 (검증 순서 1)
        let input_invalid = if cmd.amount <= 0 {
            Some(ResultCode::InvalidAmount)
        } else if cmd.max_bid.is_some_and(|m| m < cmd.amount) {
            Some(ResultCode::InvalidMaxBid)
        } else {
            None
        };
        if let Some(code) = input_invalid {
            return self
                .reject_without_lock(cmd.lot_id, bidder_id, cmd.amount, code, now)
                .await;
        }

        let mut txn = match self.store.begin_lot(cmd.lot_id).await {
            Ok(txn) => txn,
            Err(StoreError::NotFound) => {
                // 존재하지 않는 로트는 활성이 아니다 (검증 순서 2)
                return self
                    .reject_without_lock(
                        cmd.lot_id,
                        bidder_id,
                        cmd.amount,
                        ResultCode::LotNotActive,
                        now,
                    )
                    .await;
            }
            Err(e) => return Err(e.into()),
        };

        let lot = txn.lot().clone();
        let auction = txn.auction().clone();
        let tiers = effective_tiers(&lot, &auction);
        let floor = rules::min_next_bid(lot.current_bid, lot.starting_bid, tiers);

        // 전제 조건 검증 (순서 고정, 첫 실패가 단락)
        let rejection = if lot.status != LotStatus::Active {
            Some((ResultCode::LotNotActive, None))
        } else if now >= lot.current_close_at {
            Some((ResultCode::AuctionClosed, None))
        } else if cmd.amount < floor {
            Some((ResultCode::BidTooLow, Some(floor)))
        } else if lot.current_bidder_id == Some(bidder_id) {
            Some((ResultCode::SelfOutbid, None))
        } else {
            None
        };

        if let Some((code, floor)) = rejection {
            return self
                .reject(txn, &lot, bidder_id, cmd.amount, code, floor, now)
                .await;
        }

        // 프록시 해석: 현재 선두의 유효한 최대 입찰을 본다
        let step = rules::increment(lot.current_bid, tiers);
        let incumbent_max = match lot.current_bidder_id {
            Some(holder) => txn.active_max_bid(holder).await?,
            None => None,
        };

        match incumbent_max {
            // A. 방어할 상한 없음 → 단순 수락
            None => {
                self.accept_simple(txn, &lot, &auction, bidder_id, &cmd, now)
                    .await
            }
            Some(defender_max) => {
                let h_max = defender_max.max_bid.unwrap_or(defender_max.amount);
                if cmd.max_bid == Some(h_max) {
                    // D. 상한 동률 → 선착순 우선, 거절
                    return self
                        .reject(
                            txn,
                            &lot,
                            bidder_id,
                            cmd.amount,
                            ResultCode::MaxBidTied,
                            None,
                            now,
                        )
                        .await;
                }
                let cap = cmd.max_bid.unwrap_or(cmd.amount);
                if cap > h_max {
                    // B. 새 입찰자가 상한을 넘어섬
                    self.accept_overtake(
                        txn,
                        &lot,
                        &auction,
                        bidder_id,
                        &cmd,
                        &defender_max,
                        h_max,
                        step,
                        now,
                    )
                    .await
                } else {
                    // C. 기존 선두가 프록시로 방어
                    self.defend_by_proxy(
                        txn,
                        &lot,
                        &auction,
                        bidder_id,
                        &cmd,
                        &defender_max,
                        h_max,
                        cap,
                        step,
                        now,
                    )
                    .await
                }
            }
        }
    }

    /// 정책 거절: bid_rejected 감사만 남기고 커밋
    #[allow(clippy::too_many_arguments)]
    async fn reject(
        &self,
        mut txn: Box<dyn LotTxn>,
        lot: &Lot,
        bidder_id: UserId,
        amount: Amount,
        code: ResultCode,
        floor: Option<Amount>,
        now: DateTime<Utc>,
    ) -> Result<BidOutcome, EngineError> {
        txn.append_audit(AuditRecord {
            auction_id: lot.auction_id,
            lot_id: lot.id,
            bidder_id: Some(bidder_id),
            kind: AuditKind::BidRejected,
            previous_amount: Some(lot.current_bid),
            new_amount: Some(amount),
            result_code: Some(code.as_str().to_string()),
            result_message: Some(rejection_message(code).to_string()),
            snapshot: serde_json::to_value(LotSnapshot::of(lot)).map_err(StoreError::Codec)?,
            created_at: now,
        })
        .await?;
        txn.commit().await?;
        info!(
            "{:<12} --> 입찰 거절: lot={}, bidder={}, code={}",
            "Engine", lot.id, bidder_id, code
        );
        Ok(BidOutcome::rejected(
            code,
            floor,
            Some(LotSnapshot::of(lot)),
        ))
    }

    /// 로트 잠금 없이 거절을 기록한다: 입력 불량(검증 1)과 미존재 로트(검증 2).
    /// 로트가 있으면 감사를 로트에 앵커하고 스냅샷도 함께 돌려준다.
    async fn reject_without_lock(
        &self,
        lot_id: i64,
        bidder_id: UserId,
        amount: Amount,
        code: ResultCode,
        now: DateTime<Utc>,
    ) -> Result<BidOutcome, EngineError> {
        let lot = self.store.fetch_lot(lot_id).await.ok();
        let (auction_id, snapshot) = match &lot {
            Some(lot) => (lot.auction_id, Some(LotSnapshot::of(lot))),
            None => (0, None),
        };
        self.store
            .append_audit(AuditRecord {
                auction_id,
                lot_id,
                bidder_id: Some(bidder_id),
                kind: AuditKind::BidRejected,
                previous_amount: lot.as_ref().map(|l| l.current_bid),
                new_amount: Some(amount),
                result_code: Some(code.as_str().to_string()),
                result_message: Some(rejection_message(code).to_string()),
                snapshot: snapshot
                    .as_ref()
                    .map(|s| serde_json::to_value(s).map_err(StoreError::Codec))
                    .transpose()?
                    .unwrap_or(serde_json::Value::Null),
                created_at: now,
            })
            .await?;
        info!(
            "{:<12} --> 입찰 거절(잠금 전): lot={}, bidder={}, code={}",
            "Engine", lot_id, bidder_id, code
        );
        Ok(BidOutcome::rejected(code, None, snapshot))
    }

    /// A. 방어 상한 없음: 제시액 그대로 수락
    async fn accept_simple(
        &self,
        mut txn: Box<dyn LotTxn>,
        lot: &Lot,
        auction: &Auction,
        bidder_id: UserId,
        cmd: &PlaceBidCommand,
        now: DateTime<Utc>,
    ) -> Result<BidOutcome, EngineError> {
        let prev_winning = txn.winning_bid().await?;
        let prev_snapshot = previous_of(lot);

        // 본인의 이전 상한은 교체된다
        txn.deactivate_max_bids(bidder_id).await?;
        // 승자 유일 인덱스: 기존 승자 해제가 새 승자 삽입보다 먼저다
        if let Some(prev) = &prev_winning {
            txn.mark_bid_not_winning(prev.id, Some(now)).await?;
        }
        txn.insert_bid(NewBid {
            lot_id: lot.id,
            bidder_id,
            amount: cmd.amount,
            bid_type: BidType::Manual,
            max_bid: cmd.max_bid,
            max_bid_active: cmd.max_bid.is_some(),
            is_winning: true,
            buy_now: false,
            status: BidStatus::Active,
            previous_amount: prev_snapshot.0,
            previous_bidder_id: prev_snapshot.1,
            created_at: now,
        })
        .await?;

        let mut updated = lot.clone();
        updated.current_bid = cmd.amount;
        updated.current_bidder_id = Some(bidder_id);
        updated.bid_count += 1;
        let reserve_flipped = update_reserve(&mut updated);
        let soft_closed = apply_soft_close(&mut updated, auction, now);
        txn.update_lot(&updated).await?;

        self.append_standard_audits(
            &mut txn,
            &updated,
            StandardAudits {
                placed: Some((bidder_id, lot.current_bid, cmd.amount, ResultCode::Accepted)),
                proxy: None,
                outbid: prev_winning
                    .as_ref()
                    .map(|prev| (prev.bidder_id, prev.amount)),
                reserve_flipped,
                soft_closed,
            },
            now,
        )
        .await?;

        txn.commit().await?;
        self.publish_bid_events(&updated, soft_closed).await;
        info!(
            "{:<12} --> 입찰 수락: lot={}, bidder={}, 현재가={}",
            "Engine", updated.id, bidder_id, updated.current_bid
        );
        Ok(BidOutcome {
            result_code: ResultCode::Accepted,
            accepted: true,
            state_changed: true,
            proxy_triggered: false,
            outbid_occurred: prev_winning.is_some(),
            floor: None,
            lot: Some(LotSnapshot::of(&updated)),
        })
    }

    /// B. 새 상한이 기존 상한을 넘어섬: 새 입찰자가 선두
    #[allow(clippy::too_many_arguments)]
    async fn accept_overtake(
        &self,
        mut txn: Box<dyn LotTxn>,
        lot: &Lot,
        auction: &Auction,
        bidder_id: UserId,
        cmd: &PlaceBidCommand,
        defender_max: &Bid,
        h_max: Amount,
        step: Amount,
        now: DateTime<Utc>,
    ) -> Result<BidOutcome, EngineError> {
        let defender_id = defender_max.bidder_id;
        let cap = cmd.max_bid.unwrap_or(cmd.amount);
        let new_current = cap.min(h_max + step);
        let prev_winning = txn.winning_bid().await?;
        let prev_snapshot = previous_of(lot);

        // 방어자 상한 소진
        txn.deactivate_max_bids(defender_id).await?;
        if let Some(prev) = &prev_winning {
            txn.mark_bid_not_winning(prev.id, Some(now)).await?;
        }
        // 방어자의 마지막 프록시 응찰 (상한까지, 패배 기록)
        txn.insert_bid(NewBid {
            lot_id: lot.id,
            bidder_id: defender_id,
            amount: h_max,
            bid_type: BidType::Proxy,
            max_bid: None,
            max_bid_active: false,
            is_winning: false,
            buy_now: false,
            status: BidStatus::Active,
            previous_amount: prev_snapshot.0,
            previous_bidder_id: prev_snapshot.1,
            created_at: now,
        })
        .await?;
        // 새 선두
        txn.deactivate_max_bids(bidder_id).await?;
        txn.insert_bid(NewBid {
            lot_id: lot.id,
            bidder_id,
            amount: new_current,
            bid_type: BidType::Manual,
            max_bid: cmd.max_bid,
            max_bid_active: cmd.max_bid.is_some(),
            is_winning: true,
            buy_now: false,
            status: BidStatus::Active,
            previous_amount: Some(h_max),
            previous_bidder_id: Some(defender_id),
            created_at: now,
        })
        .await?;

        let mut updated = lot.clone();
        updated.current_bid = new_current;
        updated.current_bidder_id = Some(bidder_id);
        updated.bid_count += 2;
        let reserve_flipped = update_reserve(&mut updated);
        let soft_closed = apply_soft_close(&mut updated, auction, now);
        txn.update_lot(&updated).await?;

        self.append_standard_audits(
            &mut txn,
            &updated,
            StandardAudits {
                placed: Some((bidder_id, h_max, new_current, ResultCode::Accepted)),
                proxy: Some((defender_id, lot.current_bid, h_max)),
                outbid: None,
                reserve_flipped,
                soft_closed,
            },
            now,
        )
        .await?;

        txn.commit().await?;
        self.publish_bid_events(&updated, soft_closed).await;
        info!(
            "{:<12} --> 상한 추월 수락: lot={}, bidder={}, 현재가={}",
            "Engine", updated.id, bidder_id, updated.current_bid
        );
        Ok(BidOutcome {
            result_code: ResultCode::Accepted,
            accepted: true,
            state_changed: true,
            proxy_triggered: true,
            outbid_occurred: true,
            floor: None,
            lot: Some(LotSnapshot::of(&updated)),
        })
    }

    /// C. 기존 선두가 프록시로 방어: 도전자는 즉시 추월당한다
    #[allow(clippy::too_many_arguments)]
    async fn defend_by_proxy(
        &self,
        mut txn: Box<dyn LotTxn>,
        lot: &Lot,
        auction: &Auction,
        bidder_id: UserId,
        cmd: &PlaceBidCommand,
        defender_max: &Bid,
        h_max: Amount,
        cap: Amount,
        step: Amount,
        now: DateTime<Utc>,
    ) -> Result<BidOutcome, EngineError> {
        let defender_id = defender_max.bidder_id;
        let defended = h_max.min(cap + step);
        let prev_winning = txn.winning_bid().await?;
        let prev_snapshot = previous_of(lot);

        // 도전자의 응찰 기록 (상한까지 제시했으나 패배, 상한 소진)
        txn.deactivate_max_bids(bidder_id).await?;
        txn.insert_bid(NewBid {
            lot_id: lot.id,
            bidder_id,
            amount: cap,
            bid_type: BidType::Manual,
            max_bid: cmd.max_bid,
            max_bid_active: false,
            is_winning: false,
            buy_now: false,
            status: BidStatus::Active,
            previous_amount: prev_snapshot.0,
            previous_bidder_id: prev_snapshot.1,
            created_at: now,
        })
        .await?;
        // 방어자의 프록시 응찰이 새 선두 행이 된다 (기존 상한은 유효 유지)
        if let Some(prev) = &prev_winning {
            txn.mark_bid_not_winning(prev.id, None).await?;
        }
        let defense = txn
            .insert_bid(NewBid {
                lot_id: lot.id,
                bidder_id: defender_id,
                amount: defended,
                bid_type: BidType::Proxy,
                max_bid: None,
                max_bid_active: false,
                is_winning: true,
                buy_now: false,
                status: BidStatus::Active,
                previous_amount: prev_snapshot.0,
                previous_bidder_id: prev_snapshot.1,
                created_at: now,
            })
            .await?;
        debug_assert_eq!(defense.bidder_id, defender_id);

        let mut updated = lot.clone();
        updated.current_bid = defended;
        updated.current_bidder_id = Some(defender_id);
        updated.bid_count += 2;
        let reserve_flipped = update_reserve(&mut updated);
        let soft_closed = apply_soft_close(&mut updated, auction, now);
        txn.update_lot(&updated).await?;

        self.append_standard_audits(
            &mut txn,
            &updated,
            StandardAudits {
                placed: Some((bidder_id, lot.current_bid, cap, ResultCode::OutbidByProxy)),
                proxy: Some((defender_id, lot.current_bid, defended)),
                outbid: None,
                reserve_flipped,
                soft_closed,
            },
            now,
        )
        .await?;

        txn.commit().await?;
        self.publish_bid_events(&updated, soft_closed).await;
        info!(
            "{:<12} --> 프록시 방어: lot={}, 도전자={}, 방어자={}, 현재가={}",
            "Engine", updated.id, bidder_id, defender_id, updated.current_bid
        );
        Ok(BidOutcome {
            result_code: ResultCode::OutbidByProxy,
            accepted: false,
            state_changed: true,
            proxy_triggered: true,
            outbid_occurred: true,
            floor: None,
            lot: Some(LotSnapshot::of(&updated)),
        })
    }

    /// 2. 즉시 구매: 수락 즉시 로트를 sold로 마감한다
    pub async fn buy_now(
        &self,
        bidder_id: UserId,
        cmd: BuyNowCommand,
    ) -> Result<BidOutcome, EngineError> {
        info!(
            "{:<12} --> 즉시 구매 요청 처리 시작: bidder={}, {:?}",
            "Engine", bidder_id, cmd
        );
        with_lot_retry(|| self.try_buy_now(bidder_id, cmd.clone())).await
    }

    async fn try_buy_now(
        &self,
        bidder_id: UserId,
        cmd: BuyNowCommand,
    ) -> Result<BidOutcome, EngineError> {
        let now = self.clock.now();
        let mut txn = match self.store.begin_lot(cmd.lot_id).await {
            Ok(txn) => txn,
            Err(StoreError::NotFound) => {
                return Ok(BidOutcome::rejected(ResultCode::LotNotActive, None, None));
            }
            Err(e) => return Err(e.into()),
        };
        let lot = txn.lot().clone();

        let rejection = if lot.status != LotStatus::Active {
            Some(ResultCode::LotNotActive)
        } else if now >= lot.current_close_at {
            Some(ResultCode::AuctionClosed)
        } else if lot.buy_now_price.is_none() {
            Some(ResultCode::NoBuyNow)
        } else if lot.current_bidder_id == Some(bidder_id) {
            Some(ResultCode::SelfOutbid)
        } else {
            None
        };
        if let Some(code) = rejection {
            return self
                .reject(txn, &lot, bidder_id, lot.buy_now_price.unwrap_or(0), code, None, now)
                .await;
        }
        let price = lot
            .buy_now_price
            .ok_or_else(|| EngineError::Invariant("buy_now_price 검증 후 소실".to_string()))?;

        let prev_winning = txn.winning_bid().await?;
        let prev_snapshot = previous_of(&lot);
        if let Some(prev) = &prev_winning {
            txn.mark_bid_not_winning(prev.id, Some(now)).await?;
        }
        txn.deactivate_max_bids(bidder_id).await?;
        let winning = txn
            .insert_bid(NewBid {
                lot_id: lot.id,
                bidder_id,
                amount: price,
                bid_type: BidType::Manual,
                max_bid: None,
                max_bid_active: false,
                is_winning: true,
                buy_now: true,
                status: BidStatus::Active,
                previous_amount: prev_snapshot.0,
                previous_bidder_id: prev_snapshot.1,
                created_at: now,
            })
            .await?;
        txn.settle_bids(Some(winning.id)).await?;

        let mut updated = lot.clone();
        updated.current_bid = price;
        updated.current_bidder_id = Some(bidder_id);
        updated.bid_count += 1;
        let reserve_flipped = update_reserve(&mut updated);
        updated.status = LotStatus::Sold;
        updated.closed_at = Some(now);
        txn.update_lot(&updated).await?;

        let snapshot = serde_json::to_value(LotSnapshot::of(&updated)).map_err(StoreError::Codec)?;
        if reserve_flipped {
            txn.append_audit(reserve_audit(&updated, now, snapshot.clone()))
                .await?;
        }
        txn.append_audit(AuditRecord {
            auction_id: updated.auction_id,
            lot_id: updated.id,
            bidder_id: Some(bidder_id),
            kind: AuditKind::BuyNowExecuted,
            previous_amount: Some(lot.current_bid),
            new_amount: Some(price),
            result_code: Some(ResultCode::Accepted.as_str().to_string()),
            result_message: None,
            snapshot: snapshot.clone(),
            created_at: now,
        })
        .await?;
        txn.append_audit(AuditRecord {
            auction_id: updated.auction_id,
            lot_id: updated.id,
            bidder_id: Some(bidder_id),
            kind: AuditKind::LotClosed,
            previous_amount: None,
            new_amount: Some(price),
            result_code: None,
            result_message: None,
            snapshot,
            created_at: now,
        })
        .await?;

        txn.commit().await?;
        self.publish(LiveEventKind::Bid, &updated).await;
        self.publish(LiveEventKind::LotClosed, &updated).await;
        info!(
            "{:<12} --> 즉시 구매 낙찰: lot={}, buyer={}, 가격={}",
            "Engine", updated.id, bidder_id, price
        );
        Ok(BidOutcome {
            result_code: ResultCode::Accepted,
            accepted: true,
            state_changed: true,
            proxy_triggered: false,
            outbid_occurred: prev_winning.is_some(),
            floor: None,
            lot: Some(LotSnapshot::of(&updated)),
        })
    }

    async fn append_standard_audits(
        &self,
        txn: &mut Box<dyn LotTxn>,
        updated: &Lot,
        audits: StandardAudits,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let snapshot = serde_json::to_value(LotSnapshot::of(updated)).map_err(StoreError::Codec)?;

        if let Some((bidder, previous, amount, code)) = audits.placed {
            txn.append_audit(AuditRecord {
                auction_id: updated.auction_id,
                lot_id: updated.id,
                bidder_id: Some(bidder),
                kind: AuditKind::BidPlaced,
                previous_amount: Some(previous),
                new_amount: Some(amount),
                result_code: Some(code.as_str().to_string()),
                result_message: None,
                snapshot: snapshot.clone(),
                created_at: now,
            })
            .await?;
        }
        if let Some((defender, previous, amount)) = audits.proxy {
            txn.append_audit(AuditRecord {
                auction_id: updated.auction_id,
                lot_id: updated.id,
                bidder_id: Some(defender),
                kind: AuditKind::ProxyTriggered,
                previous_amount: Some(previous),
                new_amount: Some(amount),
                result_code: None,
                result_message: None,
                snapshot: snapshot.clone(),
                created_at: now,
            })
            .await?;
        }
        if let Some((loser, at_amount)) = audits.outbid {
            txn.append_audit(AuditRecord {
                auction_id: updated.auction_id,
                lot_id: updated.id,
                bidder_id: Some(loser),
                kind: AuditKind::OutbidOccurred,
                previous_amount: Some(at_amount),
                new_amount: Some(updated.current_bid),
                result_code: None,
                result_message: None,
                snapshot: snapshot.clone(),
                created_at: now,
            })
            .await?;
        }
        if audits.reserve_flipped {
            txn.append_audit(reserve_audit(updated, now, snapshot.clone()))
                .await?;
        }
        if audits.soft_closed {
            txn.append_audit(AuditRecord {
                auction_id: updated.auction_id,
                lot_id: updated.id,
                bidder_id: None,
                kind: AuditKind::SoftCloseTriggered,
                previous_amount: None,
                new_amount: None,
                result_code: None,
                result_message: Some(format!(
                    "마감 연장 {}회차, 새 마감 {}",
                    updated.extension_count,
                    updated.current_close_at.timestamp()
                )),
                snapshot,
                created_at: now,
            })
            .await?;
        }
        Ok(())
    }

    async fn publish_bid_events(&self, lot: &Lot, soft_closed: bool) {
        self.publish(LiveEventKind::Bid, lot).await;
        if soft_closed {
            self.publish(LiveEventKind::SoftClose, lot).await;
        }
    }

    async fn publish(&self, kind: LiveEventKind, lot: &Lot) {
        let event = crate::hub::LiveEvent {
            kind,
            lot: LotSnapshot::of(lot),
            at: self.clock.now().timestamp_millis(),
        };
        self.hub.publish(lot.id, event.clone());
        self.notifier.publish(&event).await;
    }
}

struct StandardAudits {
    /// (입찰자, 직전가, 금액, 결과 코드)
    placed: Option<(UserId, Amount, Amount, ResultCode)>,
    /// (방어자, 직전가, 방어가)
    proxy: Option<(UserId, Amount, Amount)>,
    /// (밀려난 입찰자, 밀려난 시점 금액)
    outbid: Option<(UserId, Amount)>,
    reserve_flipped: bool,
    soft_closed: bool,
}

// endregion: --- Bidding Engine

// region:    --- Pure Helpers

/// 로트 재정의가 있으면 그것을, 없으면 경매 규칙을 쓴다
pub fn effective_tiers<'a>(lot: &'a Lot, auction: &'a Auction) -> &'a [crate::auction::model::IncrementTier] {
    lot.increment_rules_override
        .as_deref()
        .unwrap_or(&auction.increment_rules)
}

/// 이 비드 직전의 로트 스냅샷
fn previous_of(lot: &Lot) -> (Option<Amount>, Option<UserId>) {
    if lot.bid_count > 0 {
        (Some(lot.current_bid), lot.current_bidder_id)
    } else {
        (None, None)
    }
}

/// reserve_met 갱신. 한 번 true가 되면 되돌아가지 않는다.
fn update_reserve(lot: &mut Lot) -> bool {
    if lot.reserve_met {
        return false;
    }
    match lot.reserve_price {
        Some(reserve) if lot.current_bid >= reserve => {
            lot.reserve_met = true;
            true
        }
        _ => false,
    }
}

/// 소프트 클로즈: 마감까지 trigger_window 이내의 수락된 입찰이 마감을 연장한다.
/// current_close_at은 절대 줄어들지 않는다.
fn apply_soft_close(lot: &mut Lot, auction: &Auction, now: DateTime<Utc>) -> bool {
    if !auction.soft_close_enabled {
        return false;
    }
    let remaining = lot.current_close_at - now;
    if remaining > Duration::seconds(auction.trigger_window_secs) {
        return false;
    }
    let extended = now + Duration::seconds(auction.extension_secs);
    if extended <= lot.current_close_at {
        return false;
    }
    lot.current_close_at = extended;
    lot.extension_count += 1;
    true
}

fn reserve_audit(lot: &Lot, now: DateTime<Utc>, snapshot: serde_json::Value) -> AuditRecord {
    AuditRecord {
        auction_id: lot.auction_id,
        lot_id: lot.id,
        bidder_id: lot.current_bidder_id,
        kind: AuditKind::ReserveMet,
        previous_amount: None,
        new_amount: Some(lot.current_bid),
        result_code: None,
        result_message: None,
        snapshot,
        created_at: now,
    }
}

fn rejection_message(code: ResultCode) -> &'static str {
    match code {
        ResultCode::InvalidAmount => "입찰 금액이 유효하지 않습니다.",
        ResultCode::InvalidMaxBid => "최대 입찰가는 입찰 금액 이상이어야 합니다.",
        ResultCode::LotNotActive => "입찰할 수 없는 로트입니다.",
        ResultCode::AuctionClosed => "경매가 이미 종료되었습니다.",
        ResultCode::BidTooLow => "입찰 금액이 최소 다음 입찰가보다 낮습니다.",
        ResultCode::SelfOutbid => "이미 최고 입찰자입니다.",
        ResultCode::MaxBidTied => "동일한 최대 입찰가가 이미 존재합니다 (선착순 우선).",
        ResultCode::NoBuyNow => "즉시 구매가 설정되지 않은 로트입니다.",
        _ => "입찰이 거절되었습니다.",
    }
}

// endregion: --- Pure Helpers

// region:    --- Tests


// endregion: --- Tests
