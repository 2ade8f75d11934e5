/// 인메모리 저장소.
/// Postgres 구현과 동일한 계약을 제공하며 단위/속성/통합 테스트가 사용한다.
/// 로트 직렬화는 로트별 비동기 뮤텍스로, 원자성은 작업 사본 + 일괄 반영으로 지킨다.
// region:    --- Imports
use crate::auction::events::{AuditEvent, AuditKind, AuditRecord};
use crate::auction::model::{
    Auction, AuctionId, AuctionStatus, BidId, Identity, LotId, NewAuction, Role, UserId,
};
use crate::bidding::model::{Bid, BidStatus, Lot, LotStatus, NewBid, NewLot};
use crate::error::StoreError;
use crate::importer::model::{
    ImageMapping, ImportBatch, MappingStatus, NewImageMapping, NewImportBatch,
};
use crate::invoice::model::{
    FulfillmentStatus, Invoice, InvoiceItem, InvoiceWithItems, NewInvoice, PaymentStatus,
};
use crate::store::{LotTxn, Store};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

// endregion: --- Imports

// region:    --- Inner State

#[derive(Default)]
struct Inner {
    auctions: HashMap<AuctionId, Auction>,
    lots: HashMap<LotId, Lot>,
    bids: BTreeMap<BidId, Bid>,
    audits: Vec<AuditEvent>,
    watchlist: HashSet<(UserId, LotId)>,
    users: HashMap<UserId, Role>,
    sessions: HashMap<String, (UserId, DateTime<Utc>)>,
    invoices: Vec<InvoiceWithItems>,
    batches: HashMap<i64, ImportBatch>,
    mappings: BTreeMap<i64, ImageMapping>,
    next_id: i64,
    invoice_seq: i64,
}

impl Inner {
    fn alloc_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

// endregion: --- Inner State

// region:    --- MemStore

pub struct MemStore {
    inner: Arc<StdMutex<Inner>>,
    lot_locks: StdMutex<HashMap<LotId, Arc<AsyncMutex<()>>>>,
    /// 테스트 훅: begin_lot를 n회 Aborted로 실패시킨다
    inject_aborts: AtomicUsize,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StdMutex::new(Inner::default())),
            lot_locks: StdMutex::new(HashMap::new()),
            inject_aborts: AtomicUsize::new(0),
        }
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// 직렬화 충돌 재시도 경로 테스트용
    pub fn inject_aborted(&self, count: usize) {
        self.inject_aborts.store(count, Ordering::SeqCst);
    }

    fn lot_lock(&self, lot_id: LotId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.lot_locks.lock().expect("lot_locks 잠금");
        Arc::clone(locks.entry(lot_id).or_default())
    }
}

// endregion: --- MemStore

// region:    --- Mem Lot Transaction

struct MemLotTxn {
    inner: Arc<StdMutex<Inner>>,
    _guard: OwnedMutexGuard<()>,
    lot: Lot,
    auction: Auction,
    /// 이 로트의 비드 작업 사본 (커밋 시 일괄 반영)
    bids: BTreeMap<BidId, Bid>,
    audits: Vec<AuditRecord>,
}

#[async_trait]
impl LotTxn for MemLotTxn {
    fn lot(&self) -> &Lot {
        &self.lot
    }

    fn auction(&self) -> &Auction {
        &self.auction
    }

    async fn active_max_bid(&mut self, bidder_id: UserId) -> Result<Option<Bid>, StoreError> {
        Ok(self
            .bids
            .values()
            .filter(|b| b.bidder_id == bidder_id && b.max_bid_active && b.max_bid.is_some())
            .max_by_key(|b| b.id)
            .cloned())
    }

    async fn winning_bid(&mut self) -> Result<Option<Bid>, StoreError> {
        Ok(self.bids.values().find(|b| b.is_winning).cloned())
    }

    async fn insert_bid(&mut self, bid: NewBid) -> Result<Bid, StoreError> {
        let id = self.inner.lock().expect("inner 잠금").alloc_id();
        let stored = Bid {
            id,
            lot_id: bid.lot_id,
            bidder_id: bid.bidder_id,
            amount: bid.amount,
            bid_type: bid.bid_type,
            max_bid: bid.max_bid,
            max_bid_active: bid.max_bid_active,
            is_winning: bid.is_winning,
            buy_now: bid.buy_now,
            status: bid.status,
            previous_amount: bid.previous_amount,
            previous_bidder_id: bid.previous_bidder_id,
            outbid_at: None,
            created_at: bid.created_at,
        };
        self.bids.insert(id, stored.clone());
        Ok(stored)
    }

    async fn mark_bid_not_winning(
        &mut self,
        bid_id: BidId,
        outbid_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let bid = self.bids.get_mut(&bid_id).ok_or(StoreError::NotFound)?;
        bid.is_winning = false;
        if outbid_at.is_some() {
            bid.outbid_at = outbid_at;
        }
        Ok(())
    }

    async fn deactivate_max_bids(&mut self, bidder_id: UserId) -> Result<(), StoreError> {
        for bid in self.bids.values_mut() {
            if bid.bidder_id == bidder_id {
                bid.max_bid_active = false;
            }
        }
        Ok(())
    }

    async fn update_lot(&mut self, lot: &Lot) -> Result<(), StoreError> {
        self.lot = lot.clone();
        Ok(())
    }

    async fn settle_bids(&mut self, winner: Option<BidId>) -> Result<(), StoreError> {
        for bid in self.bids.values_mut() {
            bid.status = if Some(bid.id) == winner {
                BidStatus::Won
            } else {
                BidStatus::Lost
            };
        }
        Ok(())
    }

    async fn append_audit(&mut self, audit: AuditRecord) -> Result<(), StoreError> {
        self.audits.push(audit);
        Ok(())
    }

    async fn has_audit(&mut self, kind: AuditKind) -> Result<bool, StoreError> {
        if self.audits.iter().any(|a| a.kind == kind) {
            return Ok(true);
        }
        let inner = self.inner.lock().expect("inner 잠금");
        Ok(inner
            .audits
            .iter()
            .any(|a| a.lot_id == self.lot.id && a.kind == kind))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("inner 잠금");
        inner.lots.insert(self.lot.id, self.lot.clone());
        for (id, bid) in &self.bids {
            inner.bids.insert(*id, bid.clone());
        }
        for record in self.audits {
            let id = inner.alloc_id();
            inner.audits.push(stored_audit(id, record));
        }
        Ok(())
    }
}

fn stored_audit(id: i64, r: AuditRecord) -> AuditEvent {
    AuditEvent {
        id,
        auction_id: r.auction_id,
        lot_id: r.lot_id,
        bidder_id: r.bidder_id,
        kind: r.kind,
        previous_amount: r.previous_amount,
        new_amount: r.new_amount,
        result_code: r.result_code,
        result_message: r.result_message,
        snapshot: r.snapshot,
        created_at: r.created_at,
    }
}

// endregion: --- Mem Lot Transaction

// region:    --- Store Impl

#[async_trait]
impl Store for MemStore {
    async fn begin_lot(&self, lot_id: LotId) -> Result<Box<dyn LotTxn>, StoreError> {
        loop {
            let pending = self.inject_aborts.load(Ordering::SeqCst);
            if pending == 0 {
                break;
            }
            if self
                .inject_aborts
                .compare_exchange(pending, pending - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return Err(StoreError::Aborted);
            }
        }

        let guard = self.lot_lock(lot_id).lock_owned().await;
        let (lot, auction, bids) = {
            let inner = self.inner.lock().expect("inner 잠금");
            let lot = inner.lots.get(&lot_id).cloned().ok_or(StoreError::NotFound)?;
            let auction = inner
                .auctions
                .get(&lot.auction_id)
                .cloned()
                .ok_or(StoreError::NotFound)?;
            let bids: BTreeMap<BidId, Bid> = inner
                .bids
                .values()
                .filter(|b| b.lot_id == lot_id)
                .map(|b| (b.id, b.clone()))
                .collect();
            (lot, auction, bids)
        };
        Ok(Box::new(MemLotTxn {
            inner: Arc::clone(&self.inner),
            _guard: guard,
            lot,
            auction,
            bids,
            audits: Vec::new(),
        }))
    }

    async fn insert_auction(&self, auction: NewAuction) -> Result<Auction, StoreError> {
        let mut inner = self.inner.lock().expect("inner 잠금");
        let id = inner.alloc_id();
        let stored = Auction {
            id,
            title: auction.title,
            status: auction.status,
            start_at: auction.start_at,
            end_at: auction.end_at,
            soft_close_enabled: auction.soft_close_enabled,
            trigger_window_secs: auction.trigger_window_secs,
            extension_secs: auction.extension_secs,
            increment_rules: auction.increment_rules,
            premium_rules: auction.premium_rules,
            tax_rate_bp: auction.tax_rate_bp,
            created_at: auction.start_at,
        };
        inner.auctions.insert(id, stored.clone());
        Ok(stored)
    }

    async fn fetch_auction(&self, auction_id: AuctionId) -> Result<Auction, StoreError> {
        let inner = self.inner.lock().expect("inner 잠금");
        inner
            .auctions
            .get(&auction_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_auction_status(
        &self,
        auction_id: AuctionId,
        status: AuctionStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("inner 잠금");
        let auction = inner
            .auctions
            .get_mut(&auction_id)
            .ok_or(StoreError::NotFound)?;
        auction.status = status;
        Ok(())
    }

    async fn activate_due_auctions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuctionId>, StoreError> {
        let mut inner = self.inner.lock().expect("inner 잠금");
        let mut activated = Vec::new();
        for auction in inner.auctions.values_mut() {
            if auction.status == AuctionStatus::Published && auction.start_at <= now {
                auction.status = AuctionStatus::Active;
                activated.push(auction.id);
            }
        }
        Ok(activated)
    }

    async fn activate_pending_lots(&self, _now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().expect("inner 잠금");
        let active: HashSet<AuctionId> = inner
            .auctions
            .values()
            .filter(|a| a.status == AuctionStatus::Active)
            .map(|a| a.id)
            .collect();
        let mut count = 0;
        for lot in inner.lots.values_mut() {
            if lot.status == LotStatus::Pending && active.contains(&lot.auction_id) {
                lot.status = LotStatus::Active;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn due_lot_ids(&self, now: DateTime<Utc>) -> Result<Vec<LotId>, StoreError> {
        let inner = self.inner.lock().expect("inner 잠금");
        let mut ids: Vec<LotId> = inner
            .lots
            .values()
            .filter(|l| l.status == LotStatus::Active && l.current_close_at <= now)
            .map(|l| l.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn active_auctions_with_no_open_lots(&self) -> Result<Vec<AuctionId>, StoreError> {
        let inner = self.inner.lock().expect("inner 잠금");
        let mut open: HashMap<AuctionId, i64> = HashMap::new();
        for lot in inner.lots.values() {
            if !lot.status.is_terminal() {
                *open.entry(lot.auction_id).or_insert(0) += 1;
            }
        }
        let mut ids: Vec<AuctionId> = inner
            .auctions
            .values()
            .filter(|a| a.status == AuctionStatus::Active && !open.contains_key(&a.id))
            .map(|a| a.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn insert_lot(&self, lot: NewLot) -> Result<Lot, StoreError> {
        self.insert_lots(vec![lot])
            .await
            .map(|mut lots| lots.remove(0))
    }

    async fn insert_lots(&self, lots: Vec<NewLot>) -> Result<Vec<Lot>, StoreError> {
        let mut inner = self.inner.lock().expect("inner 잠금");
        let mut seen: HashSet<(AuctionId, i64)> = inner
            .lots
            .values()
            .map(|l| (l.auction_id, l.lot_number))
            .collect();
        for lot in &lots {
            if !seen.insert((lot.auction_id, lot.lot_number)) {
                return Err(StoreError::Conflict(format!(
                    "로트 번호 중복: {}",
                    lot.lot_number
                )));
            }
        }
        let now = Utc::now();
        let mut stored = Vec::with_capacity(lots.len());
        for lot in lots {
            let id = inner.alloc_id();
            let row = Lot {
                id,
                auction_id: lot.auction_id,
                lot_number: lot.lot_number,
                title: lot.title,
                description: lot.description,
                category: lot.category,
                condition: lot.condition,
                quantity: lot.quantity,
                location: lot.location,
                shipping_available: lot.shipping_available,
                tags: lot.tags,
                starting_bid: lot.starting_bid,
                reserve_price: lot.reserve_price,
                buy_now_price: lot.buy_now_price,
                increment_rules_override: lot.increment_rules_override,
                original_close_at: lot.original_close_at,
                current_close_at: lot.original_close_at,
                extension_count: 0,
                status: lot.status,
                current_bid: 0,
                current_bidder_id: None,
                bid_count: 0,
                reserve_met: false,
                shipping_amount: lot.shipping_amount,
                closed_at: None,
                created_at: now,
            };
            inner.lots.insert(id, row.clone());
            stored.push(row);
        }
        Ok(stored)
    }

    async fn fetch_lot(&self, lot_id: LotId) -> Result<Lot, StoreError> {
        let inner = self.inner.lock().expect("inner 잠금");
        inner.lots.get(&lot_id).cloned().ok_or(StoreError::NotFound)
    }

    async fn lots_for_auction(&self, auction_id: AuctionId) -> Result<Vec<Lot>, StoreError> {
        let inner = self.inner.lock().expect("inner 잠금");
        let mut lots: Vec<Lot> = inner
            .lots
            .values()
            .filter(|l| l.auction_id == auction_id)
            .cloned()
            .collect();
        lots.sort_by_key(|l| l.lot_number);
        Ok(lots)
    }

    async fn lot_numbers(
        &self,
        auction_id: AuctionId,
    ) -> Result<HashMap<i64, LotId>, StoreError> {
        let inner = self.inner.lock().expect("inner 잠금");
        Ok(inner
            .lots
            .values()
            .filter(|l| l.auction_id == auction_id)
            .map(|l| (l.lot_number, l.id))
            .collect())
    }

    async fn bid_history(&self, lot_id: LotId) -> Result<Vec<Bid>, StoreError> {
        let inner = self.inner.lock().expect("inner 잠금");
        if !inner.lots.contains_key(&lot_id) {
            return Err(StoreError::NotFound);
        }
        let mut bids: Vec<Bid> = inner
            .bids
            .values()
            .filter(|b| b.lot_id == lot_id)
            .cloned()
            .collect();
        bids.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(bids)
    }

    async fn audit_for_lot(&self, lot_id: LotId) -> Result<Vec<AuditEvent>, StoreError> {
        let inner = self.inner.lock().expect("inner 잠금");
        Ok(inner
            .audits
            .iter()
            .filter(|a| a.lot_id == lot_id)
            .cloned()
            .collect())
    }

    async fn append_audit(&self, audit: AuditRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("inner 잠금");
        let id = inner.alloc_id();
        inner.audits.push(stored_audit(id, audit));
        Ok(())
    }

    async fn add_watch(&self, user_id: UserId, lot_id: LotId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("inner 잠금");
        if !inner.lots.contains_key(&lot_id) {
            return Err(StoreError::NotFound);
        }
        inner.watchlist.insert((user_id, lot_id));
        Ok(())
    }

    async fn remove_watch(&self, user_id: UserId, lot_id: LotId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("inner 잠금");
        if !inner.lots.contains_key(&lot_id) {
            return Err(StoreError::NotFound);
        }
        inner.watchlist.remove(&(user_id, lot_id));
        Ok(())
    }

    async fn watchlist(&self, user_id: UserId) -> Result<Vec<LotId>, StoreError> {
        let inner = self.inner.lock().expect("inner 잠금");
        let mut lots: Vec<LotId> = inner
            .watchlist
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, l)| *l)
            .collect();
        lots.sort_unstable();
        Ok(lots)
    }

    async fn insert_user(&self, _username: &str, role: &str) -> Result<UserId, StoreError> {
        let role = Role::parse(role)
            .ok_or_else(|| StoreError::Conflict(format!("알 수 없는 역할: {role}")))?;
        let mut inner = self.inner.lock().expect("inner 잠금");
        let id = inner.alloc_id();
        inner.users.insert(id, role);
        Ok(id)
    }

    async fn insert_session(
        &self,
        token: &str,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("inner 잠금");
        if !inner.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        inner.sessions.insert(token.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn resolve_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, StoreError> {
        let inner = self.inner.lock().expect("inner 잠금");
        let Some((user_id, expires_at)) = inner.sessions.get(token) else {
            return Ok(None);
        };
        if *expires_at <= now {
            return Ok(None);
        }
        Ok(inner.users.get(user_id).map(|role| Identity {
            user_id: *user_id,
            role: *role,
        }))
    }

    async fn invoices_exist(&self, auction_id: AuctionId) -> Result<bool, StoreError> {
        let inner = self.inner.lock().expect("inner 잠금");
        Ok(inner
            .invoices
            .iter()
            .any(|i| i.invoice.auction_id == auction_id))
    }

    async fn insert_invoices(
        &self,
        auction_id: AuctionId,
        invoices: Vec<NewInvoice>,
    ) -> Result<Vec<InvoiceWithItems>, StoreError> {
        let mut inner = self.inner.lock().expect("inner 잠금");
        if inner
            .invoices
            .iter()
            .any(|i| i.invoice.auction_id == auction_id)
        {
            return Err(StoreError::Conflict("인보이스가 이미 생성됨".to_string()));
        }
        let mut stored = Vec::with_capacity(invoices.len());
        for inv in invoices {
            let invoice_id = inner.alloc_id();
            let items: Vec<InvoiceItem> = inv
                .items
                .iter()
                .map(|item| {
                    let id = inner.alloc_id();
                    InvoiceItem {
                        id,
                        invoice_id,
                        lot_id: item.lot_id,
                        lot_number: item.lot_number,
                        winning_bid: item.winning_bid,
                        premium_rate_bp: item.premium_rate_bp,
                        premium_amount: item.premium_amount,
                        tax_rate_bp: item.tax_rate_bp,
                        tax_amount: item.tax_amount,
                        shipping_amount: item.shipping_amount,
                        line_total: item.line_total,
                    }
                })
                .collect();
            let with_items = InvoiceWithItems {
                invoice: Invoice {
                    id: invoice_id,
                    invoice_number: inv.invoice_number,
                    auction_id: inv.auction_id,
                    bidder_id: inv.bidder_id,
                    subtotal: inv.subtotal,
                    premium: inv.premium,
                    tax: inv.tax,
                    shipping: inv.shipping,
                    total: inv.total,
                    payment_status: PaymentStatus::Unpaid,
                    fulfillment_status: FulfillmentStatus::Pending,
                    created_at: inv.created_at,
                },
                items,
            };
            inner.invoices.push(with_items.clone());
            stored.push(with_items);
        }
        Ok(stored)
    }

    async fn invoices_for_auction(
        &self,
        auction_id: AuctionId,
    ) -> Result<Vec<InvoiceWithItems>, StoreError> {
        let inner = self.inner.lock().expect("inner 잠금");
        Ok(inner
            .invoices
            .iter()
            .filter(|i| i.invoice.auction_id == auction_id)
            .cloned()
            .collect())
    }

    async fn next_invoice_seq(&self) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().expect("inner 잠금");
        inner.invoice_seq += 1;
        Ok(inner.invoice_seq)
    }

    async fn insert_import_batch(&self, batch: NewImportBatch) -> Result<ImportBatch, StoreError> {
        let mut inner = self.inner.lock().expect("inner 잠금");
        let id = inner.alloc_id();
        let stored = ImportBatch {
            id,
            auction_id: batch.auction_id,
            kind: batch.kind,
            status: batch.status,
            total_rows: batch.total_rows,
            ok_rows: batch.ok_rows,
            error_rows: batch.error_rows,
            errors: batch.errors,
            created_at: batch.created_at,
        };
        inner.batches.insert(id, stored.clone());
        Ok(stored)
    }

    async fn insert_image_mappings(
        &self,
        batch_id: i64,
        auction_id: AuctionId,
        mappings: Vec<NewImageMapping>,
    ) -> Result<Vec<ImageMapping>, StoreError> {
        let mut inner = self.inner.lock().expect("inner 잠금");
        let mut stored = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            let id = inner.alloc_id();
            let row = ImageMapping {
                id,
                batch_id,
                auction_id,
                filename: mapping.filename,
                stored_url: mapping.stored_url,
                lot_number: mapping.lot_number,
                photo_order: mapping.photo_order,
                lot_id: mapping.lot_id,
                status: mapping.status,
                reason: mapping.reason,
                created_at: mapping.created_at,
            };
            inner.mappings.insert(id, row.clone());
            stored.push(row);
        }
        Ok(stored)
    }

    async fn fetch_image_mapping(&self, mapping_id: i64) -> Result<ImageMapping, StoreError> {
        let inner = self.inner.lock().expect("inner 잠금");
        inner
            .mappings
            .get(&mapping_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn assign_image_mapping(
        &self,
        mapping_id: i64,
        lot_id: LotId,
        photo_order: i64,
        _now: DateTime<Utc>,
    ) -> Result<ImageMapping, StoreError> {
        let mut inner = self.inner.lock().expect("inner 잠금");
        if !inner.lots.contains_key(&lot_id) {
            return Err(StoreError::NotFound);
        }
        let mapping = inner
            .mappings
            .get_mut(&mapping_id)
            .ok_or(StoreError::NotFound)?;
        mapping.lot_id = Some(lot_id);
        mapping.photo_order = Some(photo_order);
        mapping.status = MappingStatus::Manual;
        mapping.reason = None;
        Ok(mapping.clone())
    }

    async fn occupied_photo_orders(
        &self,
        auction_id: AuctionId,
    ) -> Result<HashSet<(LotId, i64)>, StoreError> {
        let inner = self.inner.lock().expect("inner 잠금");
        Ok(inner
            .mappings
            .values()
            .filter(|m| {
                m.auction_id == auction_id
                    && matches!(m.status, MappingStatus::Matched | MappingStatus::Manual)
            })
            .filter_map(|m| Some((m.lot_id?, m.photo_order?)))
            .collect())
    }
}

// endregion: --- Store Impl
