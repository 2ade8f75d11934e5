/// Postgres 저장소.
/// 로트 배타성은 `FOR UPDATE NOWAIT` 행 잠금으로 지키고, 잠금 경합과
/// 직렬화 실패는 Aborted로 변환해 엔진의 재시도 루프에 넘긴다.
// region:    --- Imports
use crate::auction::events::{AuditEvent, AuditKind, AuditRecord};
use crate::auction::model::{
    Auction, AuctionId, AuctionStatus, BidId, Identity, IncrementTier, LotId, NewAuction,
    PremiumTier, Role, UserId,
};
use crate::bidding::model::{Bid, BidStatus, BidType, Lot, LotStatus, NewBid, NewLot};
use crate::error::StoreError;
use crate::importer::model::{
    ImageMapping, ImportBatch, MappingStatus, NewImageMapping, NewImportBatch,
};
use crate::invoice::model::{
    FulfillmentStatus, Invoice, InvoiceItem, InvoiceWithItems, NewInvoice, PaymentStatus,
};
use crate::query::queries;
use crate::store::{LotTxn, Store};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::collections::{HashMap, HashSet};
use tracing::info;

// endregion: --- Imports

// region:    --- Error Mapping

/// sqlx 오류를 저장소 오류로 변환한다.
/// 40001(직렬화 실패), 55P03(NOWAIT 잠금 실패), 40P01(교착)은 재시도 대상이다.
fn map_db(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(code) = db.code() {
            match code.as_ref() {
                "40001" | "55P03" | "40P01" => return StoreError::Aborted,
                "23505" | "23503" => return StoreError::Conflict(db.message().to_string()),
                _ => {}
            }
        }
    }
    if matches!(err, sqlx::Error::RowNotFound) {
        return StoreError::NotFound;
    }
    StoreError::Database(err)
}

fn corrupt(field: &str) -> StoreError {
    StoreError::Codec(<serde_json::Error as serde::de::Error>::custom(format!(
        "손상된 컬럼: {field}"
    )))
}

// endregion: --- Error Mapping

// region:    --- Row Mappers

fn auction_from_row(row: &PgRow) -> Result<Auction, StoreError> {
    let status: String = row.try_get("status").map_err(map_db)?;
    let increment_rules: serde_json::Value = row.try_get("increment_rules").map_err(map_db)?;
    let premium_rules: serde_json::Value = row.try_get("premium_rules").map_err(map_db)?;
    Ok(Auction {
        id: row.try_get("id").map_err(map_db)?,
        title: row.try_get("title").map_err(map_db)?,
        status: AuctionStatus::parse(&status).ok_or_else(|| corrupt("auctions.status"))?,
        start_at: row.try_get("start_at").map_err(map_db)?,
        end_at: row.try_get("end_at").map_err(map_db)?,
        soft_close_enabled: row.try_get("soft_close_enabled").map_err(map_db)?,
        trigger_window_secs: row.try_get("trigger_window_secs").map_err(map_db)?,
        extension_secs: row.try_get("extension_secs").map_err(map_db)?,
        increment_rules: serde_json::from_value::<Vec<IncrementTier>>(increment_rules)?,
        premium_rules: serde_json::from_value::<Vec<PremiumTier>>(premium_rules)?,
        tax_rate_bp: row.try_get("tax_rate_bp").map_err(map_db)?,
        created_at: row.try_get("created_at").map_err(map_db)?,
    })
}

fn lot_from_row(row: &PgRow) -> Result<Lot, StoreError> {
    let status: String = row.try_get("status").map_err(map_db)?;
    let override_rules: Option<serde_json::Value> =
        row.try_get("increment_rules_override").map_err(map_db)?;
    Ok(Lot {
        id: row.try_get("id").map_err(map_db)?,
        auction_id: row.try_get("auction_id").map_err(map_db)?,
        lot_number: row.try_get("lot_number").map_err(map_db)?,
        title: row.try_get("title").map_err(map_db)?,
        description: row.try_get("description").map_err(map_db)?,
        category: row.try_get("category").map_err(map_db)?,
        condition: row.try_get("condition").map_err(map_db)?,
        quantity: row.try_get("quantity").map_err(map_db)?,
        location: row.try_get("location").map_err(map_db)?,
        shipping_available: row.try_get("shipping_available").map_err(map_db)?,
        tags: row.try_get("tags").map_err(map_db)?,
        starting_bid: row.try_get("starting_bid").map_err(map_db)?,
        reserve_price: row.try_get("reserve_price").map_err(map_db)?,
        buy_now_price: row.try_get("buy_now_price").map_err(map_db)?,
        increment_rules_override: override_rules
            .map(serde_json::from_value::<Vec<IncrementTier>>)
            .transpose()?,
        original_close_at: row.try_get("original_close_at").map_err(map_db)?,
        current_close_at: row.try_get("current_close_at").map_err(map_db)?,
        extension_count: row.try_get("extension_count").map_err(map_db)?,
        status: LotStatus::parse(&status).ok_or_else(|| corrupt("lots.status"))?,
        current_bid: row.try_get("current_bid").map_err(map_db)?,
        current_bidder_id: row.try_get("current_bidder_id").map_err(map_db)?,
        bid_count: row.try_get("bid_count").map_err(map_db)?,
        reserve_met: row.try_get("reserve_met").map_err(map_db)?,
        shipping_amount: row.try_get("shipping_amount").map_err(map_db)?,
        closed_at: row.try_get("closed_at").map_err(map_db)?,
        created_at: row.try_get("created_at").map_err(map_db)?,
    })
}

fn bid_from_row(row: &PgRow) -> Result<Bid, StoreError> {
    let bid_type: String = row.try_get("bid_type").map_err(map_db)?;
    let status: String = row.try_get("status").map_err(map_db)?;
    Ok(Bid {
        id: row.try_get("id").map_err(map_db)?,
        lot_id: row.try_get("lot_id").map_err(map_db)?,
        bidder_id: row.try_get("bidder_id").map_err(map_db)?,
        amount: row.try_get("amount").map_err(map_db)?,
        bid_type: BidType::parse(&bid_type).ok_or_else(|| corrupt("bids.bid_type"))?,
        max_bid: row.try_get("max_bid").map_err(map_db)?,
        max_bid_active: row.try_get("max_bid_active").map_err(map_db)?,
        is_winning: row.try_get("is_winning").map_err(map_db)?,
        buy_now: row.try_get("buy_now").map_err(map_db)?,
        status: BidStatus::parse(&status).ok_or_else(|| corrupt("bids.status"))?,
        previous_amount: row.try_get("previous_amount").map_err(map_db)?,
        previous_bidder_id: row.try_get("previous_bidder_id").map_err(map_db)?,
        outbid_at: row.try_get("outbid_at").map_err(map_db)?,
        created_at: row.try_get("created_at").map_err(map_db)?,
    })
}

fn audit_from_row(row: &PgRow) -> Result<AuditEvent, StoreError> {
    let kind: String = row.try_get("kind").map_err(map_db)?;
    Ok(AuditEvent {
        id: row.try_get("id").map_err(map_db)?,
        auction_id: row.try_get("auction_id").map_err(map_db)?,
        lot_id: row.try_get("lot_id").map_err(map_db)?,
        bidder_id: row.try_get("bidder_id").map_err(map_db)?,
        kind: AuditKind::parse(&kind).ok_or_else(|| corrupt("audit_events.kind"))?,
        previous_amount: row.try_get("previous_amount").map_err(map_db)?,
        new_amount: row.try_get("new_amount").map_err(map_db)?,
        result_code: row.try_get("result_code").map_err(map_db)?,
        result_message: row.try_get("result_message").map_err(map_db)?,
        snapshot: row.try_get("snapshot").map_err(map_db)?,
        created_at: row.try_get("created_at").map_err(map_db)?,
    })
}

fn invoice_from_row(row: &PgRow) -> Result<Invoice, StoreError> {
    let payment: String = row.try_get("payment_status").map_err(map_db)?;
    let fulfillment: String = row.try_get("fulfillment_status").map_err(map_db)?;
    Ok(Invoice {
        id: row.try_get("id").map_err(map_db)?,
        invoice_number: row.try_get("invoice_number").map_err(map_db)?,
        auction_id: row.try_get("auction_id").map_err(map_db)?,
        bidder_id: row.try_get("bidder_id").map_err(map_db)?,
        subtotal: row.try_get("subtotal").map_err(map_db)?,
        premium: row.try_get("premium").map_err(map_db)?,
        tax: row.try_get("tax").map_err(map_db)?,
        shipping: row.try_get("shipping").map_err(map_db)?,
        total: row.try_get("total").map_err(map_db)?,
        payment_status: PaymentStatus::parse(&payment)
            .ok_or_else(|| corrupt("invoices.payment_status"))?,
        fulfillment_status: FulfillmentStatus::parse(&fulfillment)
            .ok_or_else(|| corrupt("invoices.fulfillment_status"))?,
        created_at: row.try_get("created_at").map_err(map_db)?,
    })
}

fn invoice_item_from_row(row: &PgRow) -> Result<InvoiceItem, StoreError> {
    Ok(InvoiceItem {
        id: row.try_get("id").map_err(map_db)?,
        invoice_id: row.try_get("invoice_id").map_err(map_db)?,
        lot_id: row.try_get("lot_id").map_err(map_db)?,
        lot_number: row.try_get("lot_number").map_err(map_db)?,
        winning_bid: row.try_get("winning_bid").map_err(map_db)?,
        premium_rate_bp: row.try_get("premium_rate_bp").map_err(map_db)?,
        premium_amount: row.try_get("premium_amount").map_err(map_db)?,
        tax_rate_bp: row.try_get("tax_rate_bp").map_err(map_db)?,
        tax_amount: row.try_get("tax_amount").map_err(map_db)?,
        shipping_amount: row.try_get("shipping_amount").map_err(map_db)?,
        line_total: row.try_get("line_total").map_err(map_db)?,
    })
}

fn mapping_from_row(row: &PgRow) -> Result<ImageMapping, StoreError> {
    let status: String = row.try_get("status").map_err(map_db)?;
    Ok(ImageMapping {
        id: row.try_get("id").map_err(map_db)?,
        batch_id: row.try_get("batch_id").map_err(map_db)?,
        auction_id: row.try_get("auction_id").map_err(map_db)?,
        filename: row.try_get("filename").map_err(map_db)?,
        stored_url: row.try_get("stored_url").map_err(map_db)?,
        lot_number: row.try_get("lot_number").map_err(map_db)?,
        photo_order: row.try_get("photo_order").map_err(map_db)?,
        lot_id: row.try_get("lot_id").map_err(map_db)?,
        status: MappingStatus::parse(&status).ok_or_else(|| corrupt("image_mappings.status"))?,
        reason: row.try_get("reason").map_err(map_db)?,
        created_at: row.try_get("created_at").map_err(map_db)?,
    })
}

// endregion: --- Row Mappers

// region:    --- PgStore

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// 연결 풀 생성
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 데이터베이스 초기화 (재생성 + 스키마)
    pub async fn initialize_database(&self) -> Result<(), sqlx::Error> {
        let recreate_sql = include_str!("../sql/00-recreate-db.sql");
        self.execute_multi_query(recreate_sql).await?;

        let schema_sql = include_str!("../sql/01-create-schema.sql");
        self.execute_multi_query(schema_sql).await?;

        info!("{:<12} --> 데이터베이스 초기화 완료", "PgStore");
        Ok(())
    }

    /// 여러 쿼리 실행
    async fn execute_multi_query(&self, sql: &str) -> Result<(), sqlx::Error> {
        for query in sql.split(';') {
            let query = query.trim();
            if !query.is_empty() {
                sqlx::query(query).execute(&self.pool).await?;
            }
        }
        Ok(())
    }
}

// endregion: --- PgStore

// region:    --- Pg Lot Transaction

struct PgLotTxn {
    tx: Transaction<'static, Postgres>,
    lot: Lot,
    auction: Auction,
}

#[async_trait]
impl LotTxn for PgLotTxn {
    fn lot(&self) -> &Lot {
        &self.lot
    }

    fn auction(&self) -> &Auction {
        &self.auction
    }

    async fn active_max_bid(&mut self, bidder_id: UserId) -> Result<Option<Bid>, StoreError> {
        let row = sqlx::query(&queries::get_active_max_bid())
            .bind(self.lot.id)
            .bind(bidder_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db)?;
        row.as_ref().map(bid_from_row).transpose()
    }

    async fn winning_bid(&mut self) -> Result<Option<Bid>, StoreError> {
        let row = sqlx::query(&queries::get_winning_bid())
            .bind(self.lot.id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db)?;
        row.as_ref().map(bid_from_row).transpose()
    }

    async fn insert_bid(&mut self, bid: NewBid) -> Result<Bid, StoreError> {
        let sql = format!(
            "INSERT INTO bids (lot_id, bidder_id, amount, bid_type, max_bid, max_bid_active, \
             is_winning, buy_now, status, previous_amount, previous_bidder_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {}",
            queries::BID_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(bid.lot_id)
            .bind(bid.bidder_id)
            .bind(bid.amount)
            .bind(bid.bid_type.as_str())
            .bind(bid.max_bid)
            .bind(bid.max_bid_active)
            .bind(bid.is_winning)
            .bind(bid.buy_now)
            .bind(bid.status.as_str())
            .bind(bid.previous_amount)
            .bind(bid.previous_bidder_id)
            .bind(bid.created_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_db)?;
        bid_from_row(&row)
    }

    async fn mark_bid_not_winning(
        &mut self,
        bid_id: BidId,
        outbid_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE bids SET is_winning = FALSE, outbid_at = COALESCE($2, outbid_at) \
             WHERE id = $1",
        )
        .bind(bid_id)
        .bind(outbid_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db)?;
        Ok(())
    }

    async fn deactivate_max_bids(&mut self, bidder_id: UserId) -> Result<(), StoreError> {
        sqlx::query("UPDATE bids SET max_bid_active = FALSE WHERE lot_id = $1 AND bidder_id = $2")
            .bind(self.lot.id)
            .bind(bidder_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db)?;
        Ok(())
    }

    async fn update_lot(&mut self, lot: &Lot) -> Result<(), StoreError> {
        let override_rules = lot
            .increment_rules_override
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        sqlx::query(
            "UPDATE lots SET current_bid = $2, current_bidder_id = $3, bid_count = $4, \
             reserve_met = $5, current_close_at = $6, extension_count = $7, status = $8, \
             closed_at = $9, increment_rules_override = $10 WHERE id = $1",
        )
        .bind(lot.id)
        .bind(lot.current_bid)
        .bind(lot.current_bidder_id)
        .bind(lot.bid_count)
        .bind(lot.reserve_met)
        .bind(lot.current_close_at)
        .bind(lot.extension_count)
        .bind(lot.status.as_str())
        .bind(lot.closed_at)
        .bind(override_rules)
        .execute(&mut *self.tx)
        .await
        .map_err(map_db)?;
        self.lot = lot.clone();
        Ok(())
    }

    async fn settle_bids(&mut self, winner: Option<BidId>) -> Result<(), StoreError> {
        match winner {
            Some(winner_id) => {
                sqlx::query(
                    "UPDATE bids SET status = CASE WHEN id = $2 THEN 'won' ELSE 'lost' END \
                     WHERE lot_id = $1",
                )
                .bind(self.lot.id)
                .bind(winner_id)
                .execute(&mut *self.tx)
                .await
                .map_err(map_db)?;
            }
            None => {
                sqlx::query("UPDATE bids SET status = 'lost' WHERE lot_id = $1")
                    .bind(self.lot.id)
                    .execute(&mut *self.tx)
                    .await
                    .map_err(map_db)?;
            }
        }
        Ok(())
    }

    async fn append_audit(&mut self, audit: AuditRecord) -> Result<(), StoreError> {
        insert_audit(&mut self.tx, &audit).await
    }

    async fn has_audit(&mut self, kind: AuditKind) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM audit_events WHERE lot_id = $1 AND kind = $2) AS present",
        )
        .bind(self.lot.id)
        .bind(kind.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db)?;
        row.try_get("present").map_err(map_db)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(map_db)
    }
}

async fn insert_audit(
    tx: &mut Transaction<'static, Postgres>,
    audit: &AuditRecord,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO audit_events (auction_id, lot_id, bidder_id, kind, previous_amount, \
         new_amount, result_code, result_message, snapshot, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(audit.auction_id)
    .bind(audit.lot_id)
    .bind(audit.bidder_id)
    .bind(audit.kind.as_str())
    .bind(audit.previous_amount)
    .bind(audit.new_amount)
    .bind(&audit.result_code)
    .bind(&audit.result_message)
    .bind(&audit.snapshot)
    .bind(audit.created_at)
    .execute(&mut **tx)
    .await
    .map_err(map_db)?;
    Ok(())
}

// endregion: --- Pg Lot Transaction

// region:    --- Store Impl

#[async_trait]
impl Store for PgStore {
    async fn begin_lot(&self, lot_id: LotId) -> Result<Box<dyn LotTxn>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db)?;
        let row = sqlx::query(&queries::get_lot_for_update())
            .bind(lot_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db)?
            .ok_or(StoreError::NotFound)?;
        let lot = lot_from_row(&row)?;
        let row = sqlx::query(&queries::get_auction())
            .bind(lot.auction_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db)?;
        let auction = auction_from_row(&row)?;
        Ok(Box::new(PgLotTxn { tx, lot, auction }))
    }

    async fn insert_auction(&self, auction: NewAuction) -> Result<Auction, StoreError> {
        let sql = format!(
            "INSERT INTO auctions (title, status, start_at, end_at, soft_close_enabled, \
             trigger_window_secs, extension_secs, increment_rules, premium_rules, tax_rate_bp, \
             created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $3) RETURNING {}",
            queries::AUCTION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&auction.title)
            .bind(auction.status.as_str())
            .bind(auction.start_at)
            .bind(auction.end_at)
            .bind(auction.soft_close_enabled)
            .bind(auction.trigger_window_secs)
            .bind(auction.extension_secs)
            .bind(serde_json::to_value(&auction.increment_rules)?)
            .bind(serde_json::to_value(&auction.premium_rules)?)
            .bind(auction.tax_rate_bp)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
        auction_from_row(&row)
    }

    async fn fetch_auction(&self, auction_id: AuctionId) -> Result<Auction, StoreError> {
        let row = sqlx::query(&queries::get_auction())
            .bind(auction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db)?
            .ok_or(StoreError::NotFound)?;
        auction_from_row(&row)
    }

    async fn update_auction_status(
        &self,
        auction_id: AuctionId,
        status: AuctionStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE auctions SET status = $2 WHERE id = $1")
            .bind(auction_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_db)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn activate_due_auctions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<AuctionId>, StoreError> {
        let rows = sqlx::query(
            "UPDATE auctions SET status = 'active' \
             WHERE status = 'published' AND start_at <= $1 RETURNING id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db)?;
        rows.iter()
            .map(|row| row.try_get("id").map_err(map_db))
            .collect()
    }

    async fn activate_pending_lots(&self, _now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE lots SET status = 'active' WHERE status = 'pending' \
             AND auction_id IN (SELECT id FROM auctions WHERE status = 'active')",
        )
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(result.rows_affected())
    }

    async fn due_lot_ids(&self, now: DateTime<Utc>) -> Result<Vec<LotId>, StoreError> {
        let rows = sqlx::query(
            "SELECT id FROM lots WHERE status = 'active' AND current_close_at <= $1 ORDER BY id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db)?;
        rows.iter()
            .map(|row| row.try_get("id").map_err(map_db))
            .collect()
    }

    async fn active_auctions_with_no_open_lots(&self) -> Result<Vec<AuctionId>, StoreError> {
        let rows = sqlx::query(
            "SELECT a.id FROM auctions a WHERE a.status = 'active' AND NOT EXISTS \
             (SELECT 1 FROM lots l WHERE l.auction_id = a.id \
              AND l.status IN ('pending', 'active')) ORDER BY a.id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_db)?;
        rows.iter()
            .map(|row| row.try_get("id").map_err(map_db))
            .collect()
    }

    async fn insert_lot(&self, lot: NewLot) -> Result<Lot, StoreError> {
        self.insert_lots(vec![lot])
            .await
            .map(|mut lots| lots.remove(0))
    }

    async fn insert_lots(&self, lots: Vec<NewLot>) -> Result<Vec<Lot>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db)?;
        let sql = format!(
            "INSERT INTO lots (auction_id, lot_number, title, description, category, condition, \
             quantity, location, shipping_available, tags, starting_bid, reserve_price, \
             buy_now_price, increment_rules_override, original_close_at, current_close_at, \
             status, shipping_amount, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15, \
             $16, $17, $18) RETURNING {}",
            queries::LOT_COLUMNS
        );
        let now = Utc::now();
        let mut stored = Vec::with_capacity(lots.len());
        for lot in lots {
            let override_rules = lot
                .increment_rules_override
                .as_ref()
                .map(serde_json::to_value)
                .transpose()?;
            let row = sqlx::query(&sql)
                .bind(lot.auction_id)
                .bind(lot.lot_number)
                .bind(&lot.title)
                .bind(&lot.description)
                .bind(&lot.category)
                .bind(&lot.condition)
                .bind(lot.quantity)
                .bind(&lot.location)
                .bind(lot.shipping_available)
                .bind(&lot.tags)
                .bind(lot.starting_bid)
                .bind(lot.reserve_price)
                .bind(lot.buy_now_price)
                .bind(override_rules)
                .bind(lot.original_close_at)
                .bind(lot.status.as_str())
                .bind(lot.shipping_amount)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_db)?;
            stored.push(lot_from_row(&row)?);
        }
        tx.commit().await.map_err(map_db)?;
        Ok(stored)
    }

    async fn fetch_lot(&self, lot_id: LotId) -> Result<Lot, StoreError> {
        let row = sqlx::query(&queries::get_lot())
            .bind(lot_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db)?
            .ok_or(StoreError::NotFound)?;
        lot_from_row(&row)
    }

    async fn lots_for_auction(&self, auction_id: AuctionId) -> Result<Vec<Lot>, StoreError> {
        let rows = sqlx::query(&queries::get_lots_for_auction())
            .bind(auction_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
        rows.iter().map(lot_from_row).collect()
    }

    async fn lot_numbers(
        &self,
        auction_id: AuctionId,
    ) -> Result<HashMap<i64, LotId>, StoreError> {
        let rows = sqlx::query("SELECT id, lot_number FROM lots WHERE auction_id = $1")
            .bind(auction_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
        let mut map = HashMap::with_capacity(rows.len());
        for row in &rows {
            let id: LotId = row.try_get("id").map_err(map_db)?;
            let number: i64 = row.try_get("lot_number").map_err(map_db)?;
            map.insert(number, id);
        }
        Ok(map)
    }

    async fn bid_history(&self, lot_id: LotId) -> Result<Vec<Bid>, StoreError> {
        // 로트 존재 확인 (없으면 NotFound)
        self.fetch_lot(lot_id).await?;
        let rows = sqlx::query(&queries::get_bid_history())
            .bind(lot_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
        rows.iter().map(bid_from_row).collect()
    }

    async fn audit_for_lot(&self, lot_id: LotId) -> Result<Vec<AuditEvent>, StoreError> {
        let rows = sqlx::query(&queries::get_audit_for_lot())
            .bind(lot_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
        rows.iter().map(audit_from_row).collect()
    }

    async fn append_audit(&self, audit: AuditRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db)?;
        insert_audit(&mut tx, &audit).await?;
        tx.commit().await.map_err(map_db)
    }

    async fn add_watch(&self, user_id: UserId, lot_id: LotId) -> Result<(), StoreError> {
        self.fetch_lot(lot_id).await?;
        sqlx::query(
            "INSERT INTO watchlist (user_id, lot_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(lot_id)
        .execute(&self.pool)
        .await
        .map_err(map_db)?;
        Ok(())
    }

    async fn remove_watch(&self, user_id: UserId, lot_id: LotId) -> Result<(), StoreError> {
        self.fetch_lot(lot_id).await?;
        sqlx::query("DELETE FROM watchlist WHERE user_id = $1 AND lot_id = $2")
            .bind(user_id)
            .bind(lot_id)
            .execute(&self.pool)
            .await
            .map_err(map_db)?;
        Ok(())
    }

    async fn watchlist(&self, user_id: UserId) -> Result<Vec<LotId>, StoreError> {
        let rows = sqlx::query(queries::GET_WATCHLIST)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
        rows.iter()
            .map(|row| row.try_get("lot_id").map_err(map_db))
            .collect()
    }

    async fn insert_user(&self, username: &str, role: &str) -> Result<UserId, StoreError> {
        let row = sqlx::query("INSERT INTO users (username, role) VALUES ($1, $2) RETURNING id")
            .bind(username)
            .bind(role)
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
        row.try_get("id").map_err(map_db)
    }

    async fn insert_session(
        &self,
        token: &str,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(token)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(map_db)?;
        Ok(())
    }

    async fn resolve_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, StoreError> {
        let row = sqlx::query(queries::RESOLVE_TOKEN)
            .bind(token)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let user_id: UserId = row.try_get("user_id").map_err(map_db)?;
        let role: String = row.try_get("role").map_err(map_db)?;
        let role = Role::parse(&role).ok_or_else(|| corrupt("users.role"))?;
        Ok(Some(Identity { user_id, role }))
    }

    async fn invoices_exist(&self, auction_id: AuctionId) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM invoices WHERE auction_id = $1) AS present",
        )
        .bind(auction_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db)?;
        row.try_get("present").map_err(map_db)
    }

    async fn insert_invoices(
        &self,
        auction_id: AuctionId,
        invoices: Vec<NewInvoice>,
    ) -> Result<Vec<InvoiceWithItems>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db)?;

        // 경매 행 잠금으로 동시 생성 직렬화
        sqlx::query("SELECT id FROM auctions WHERE id = $1 FOR UPDATE")
            .bind(auction_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_db)?
            .ok_or(StoreError::NotFound)?;

        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM invoices WHERE auction_id = $1) AS present",
        )
        .bind(auction_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db)?;
        let present: bool = row.try_get("present").map_err(map_db)?;
        if present {
            return Err(StoreError::Conflict("인보이스가 이미 생성됨".to_string()));
        }

        let invoice_sql =
            "INSERT INTO invoices (invoice_number, auction_id, bidder_id, subtotal, premium, \
             tax, shipping, total, payment_status, fulfillment_status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'unpaid', 'pending', $9) RETURNING id";
        let item_sql =
            "INSERT INTO invoice_items (invoice_id, lot_id, lot_number, winning_bid, \
             premium_rate_bp, premium_amount, tax_rate_bp, tax_amount, shipping_amount, \
             line_total) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING id";

        let mut stored = Vec::with_capacity(invoices.len());
        for inv in invoices {
            let row = sqlx::query(invoice_sql)
                .bind(&inv.invoice_number)
                .bind(inv.auction_id)
                .bind(inv.bidder_id)
                .bind(inv.subtotal)
                .bind(inv.premium)
                .bind(inv.tax)
                .bind(inv.shipping)
                .bind(inv.total)
                .bind(inv.created_at)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_db)?;
            let invoice_id: i64 = row.try_get("id").map_err(map_db)?;

            let mut items = Vec::with_capacity(inv.items.len());
            for item in &inv.items {
                let row = sqlx::query(item_sql)
                    .bind(invoice_id)
                    .bind(item.lot_id)
                    .bind(item.lot_number)
                    .bind(item.winning_bid)
                    .bind(item.premium_rate_bp)
                    .bind(item.premium_amount)
                    .bind(item.tax_rate_bp)
                    .bind(item.tax_amount)
                    .bind(item.shipping_amount)
                    .bind(item.line_total)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_db)?;
                let item_id: i64 = row.try_get("id").map_err(map_db)?;
                items.push(InvoiceItem {
                    id: item_id,
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
                });
            }

            stored.push(InvoiceWithItems {
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
            });
        }
        tx.commit().await.map_err(map_db)?;
        Ok(stored)
    }

    async fn invoices_for_auction(
        &self,
        auction_id: AuctionId,
    ) -> Result<Vec<InvoiceWithItems>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, invoice_number, auction_id, bidder_id, subtotal, premium, tax, \
             shipping, total, payment_status, fulfillment_status, created_at \
             FROM invoices WHERE auction_id = $1 ORDER BY id",
        )
        .bind(auction_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db)?;
        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let invoice = invoice_from_row(row)?;
            let item_rows = sqlx::query(
                "SELECT id, invoice_id, lot_id, lot_number, winning_bid, premium_rate_bp, \
                 premium_amount, tax_rate_bp, tax_amount, shipping_amount, line_total \
                 FROM invoice_items WHERE invoice_id = $1 ORDER BY lot_number",
            )
            .bind(invoice.id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db)?;
            let items = item_rows
                .iter()
                .map(invoice_item_from_row)
                .collect::<Result<Vec<_>, _>>()?;
            result.push(InvoiceWithItems { invoice, items });
        }
        Ok(result)
    }

    async fn next_invoice_seq(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT nextval('invoice_number_seq') AS seq")
            .fetch_one(&self.pool)
            .await
            .map_err(map_db)?;
        row.try_get("seq").map_err(map_db)
    }

    async fn insert_import_batch(&self, batch: NewImportBatch) -> Result<ImportBatch, StoreError> {
        let row = sqlx::query(
            "INSERT INTO import_batches (auction_id, kind, status, total_rows, ok_rows, \
             error_rows, errors, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id",
        )
        .bind(batch.auction_id)
        .bind(batch.kind.as_str())
        .bind(batch.status.as_str())
        .bind(batch.total_rows)
        .bind(batch.ok_rows)
        .bind(batch.error_rows)
        .bind(serde_json::to_value(&batch.errors)?)
        .bind(batch.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db)?;
        let id: i64 = row.try_get("id").map_err(map_db)?;
        Ok(ImportBatch {
            id,
            auction_id: batch.auction_id,
            kind: batch.kind,
            status: batch.status,
            total_rows: batch.total_rows,
            ok_rows: batch.ok_rows,
            error_rows: batch.error_rows,
            errors: batch.errors,
            created_at: batch.created_at,
        })
    }

    async fn insert_image_mappings(
        &self,
        batch_id: i64,
        auction_id: AuctionId,
        mappings: Vec<NewImageMapping>,
    ) -> Result<Vec<ImageMapping>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_db)?;
        let sql = "INSERT INTO image_mappings (batch_id, auction_id, filename, stored_url, \
             lot_number, photo_order, lot_id, status, reason, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING id, batch_id, auction_id, filename, stored_url, lot_number, \
             photo_order, lot_id, status, reason, created_at";
        let mut stored = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            let row = sqlx::query(sql)
                .bind(batch_id)
                .bind(auction_id)
                .bind(&mapping.filename)
                .bind(&mapping.stored_url)
                .bind(mapping.lot_number)
                .bind(mapping.photo_order)
                .bind(mapping.lot_id)
                .bind(mapping.status.as_str())
                .bind(&mapping.reason)
                .bind(mapping.created_at)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_db)?;
            stored.push(mapping_from_row(&row)?);
        }
        tx.commit().await.map_err(map_db)?;
        Ok(stored)
    }

    async fn fetch_image_mapping(&self, mapping_id: i64) -> Result<ImageMapping, StoreError> {
        let row = sqlx::query(
            "SELECT id, batch_id, auction_id, filename, stored_url, lot_number, photo_order, \
             lot_id, status, reason, created_at FROM image_mappings WHERE id = $1",
        )
        .bind(mapping_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db)?
        .ok_or(StoreError::NotFound)?;
        mapping_from_row(&row)
    }

    async fn assign_image_mapping(
        &self,
        mapping_id: i64,
        lot_id: LotId,
        photo_order: i64,
        _now: DateTime<Utc>,
    ) -> Result<ImageMapping, StoreError> {
        self.fetch_lot(lot_id).await?;
        let row = sqlx::query(
            "UPDATE image_mappings SET lot_id = $2, photo_order = $3, status = 'manual', \
             reason = NULL WHERE id = $1 \
             RETURNING id, batch_id, auction_id, filename, stored_url, lot_number, \
             photo_order, lot_id, status, reason, created_at",
        )
        .bind(mapping_id)
        .bind(lot_id)
        .bind(photo_order)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db)?
        .ok_or(StoreError::NotFound)?;
        mapping_from_row(&row)
    }

    async fn occupied_photo_orders(
        &self,
        auction_id: AuctionId,
    ) -> Result<HashSet<(LotId, i64)>, StoreError> {
        let rows = sqlx::query(
            "SELECT lot_id, photo_order FROM image_mappings WHERE auction_id = $1 \
             AND status IN ('matched', 'manual') \
             AND lot_id IS NOT NULL AND photo_order IS NOT NULL",
        )
        .bind(auction_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db)?;
        let mut occupied = HashSet::with_capacity(rows.len());
        for row in &rows {
            let lot_id: LotId = row.try_get("lot_id").map_err(map_db)?;
            let order: i64 = row.try_get("photo_order").map_err(map_db)?;
            occupied.insert((lot_id, order));
        }
        Ok(occupied)
    }
}

// endregion: --- Store Impl
