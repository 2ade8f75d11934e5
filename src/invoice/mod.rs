/// 인보이스 생성기.
/// 경매 마감 후 sold 로트를 낙찰자별로 묶어 (경매, 낙찰자)당 정확히 한 번
/// 인보이스를 만든다. 합계는 항목 합으로 구성해 센트 단위 항등식
/// total = subtotal + premium + tax + shipping 이 정확히 성립한다.
// region:    --- Imports
use crate::auction::model::{Auction, AuctionId, AuctionStatus, UserId};
use crate::bidding::model::{Lot, LotStatus};
use crate::bidding::rules;
use crate::clock::SharedClock;
use crate::error::StoreError;
use crate::invoice::model::{InvoiceWithItems, NewInvoice, NewInvoiceItem};
use crate::store::SharedStore;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

// endregion: --- Imports

pub mod model;

// region:    --- Invoice Error

#[derive(Error, Debug)]
pub enum InvoiceError {
    #[error("경매를 찾을 수 없습니다")]
    NotFound,

    #[error("경매가 아직 마감되지 않았습니다")]
    NotClosed,

    #[error("인보이스가 이미 생성되었습니다")]
    AlreadyGenerated,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for InvoiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => InvoiceError::NotFound,
            StoreError::Conflict(_) => InvoiceError::AlreadyGenerated,
            other => InvoiceError::Store(other),
        }
    }
}

// endregion: --- Invoice Error

// region:    --- Invoicer

pub struct Invoicer {
    store: SharedStore,
    clock: SharedClock,
}

impl Invoicer {
    pub fn new(store: SharedStore, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// 경매당 한 번 실행된다. 두 번째 호출은 AlreadyGenerated.
    pub async fn generate_invoices(
        &self,
        auction_id: AuctionId,
    ) -> Result<Vec<InvoiceWithItems>, InvoiceError> {
        let auction = self.store.fetch_auction(auction_id).await?;
        if auction.status != AuctionStatus::Closed {
            return Err(InvoiceError::NotClosed);
        }
        if self.store.invoices_exist(auction_id).await? {
            return Err(InvoiceError::AlreadyGenerated);
        }

        let lots = self.store.lots_for_auction(auction_id).await?;
        let mut by_bidder: BTreeMap<UserId, Vec<&Lot>> = BTreeMap::new();
        for lot in &lots {
            if lot.status == LotStatus::Sold {
                if let Some(bidder) = lot.current_bidder_id {
                    by_bidder.entry(bidder).or_default().push(lot);
                }
            }
        }

        let now = self.clock.now();
        let date_part = now.format("%Y%m%d").to_string();
        let mut invoices = Vec::with_capacity(by_bidder.len());
        for (bidder_id, won_lots) in by_bidder {
            let seq = self.store.next_invoice_seq().await?;
            let invoice_number = format!("INV-{date_part}-{seq:05}");
            invoices.push(build_invoice(
                &auction,
                bidder_id,
                invoice_number,
                &won_lots,
                now,
            ));
        }

        let stored = self.store.insert_invoices(auction_id, invoices).await?;
        info!(
            "{:<12} --> 인보이스 생성 완료: auction={}, 건수={}",
            "Invoicer",
            auction_id,
            stored.len()
        );
        Ok(stored)
    }
}

/// 낙찰자 한 명의 인보이스를 구성한다 (순수 계산)
fn build_invoice(
    auction: &Auction,
    bidder_id: UserId,
    invoice_number: String,
    won_lots: &[&Lot],
    now: chrono::DateTime<chrono::Utc>,
) -> NewInvoice {
    let tax_rate_bp = auction.tax_rate_bp.unwrap_or(0);
    let mut items = Vec::with_capacity(won_lots.len());
    for lot in won_lots {
        let winning_bid = lot.current_bid;
        let premium_rate_bp = rules::premium_rate_bp(winning_bid, &auction.premium_rules);
        let premium_amount = rules::half_up_bp(winning_bid, premium_rate_bp);
        let tax_amount = rules::half_up_bp(winning_bid + premium_amount, tax_rate_bp);
        let shipping_amount = lot.shipping_amount;
        items.push(NewInvoiceItem {
            lot_id: lot.id,
            lot_number: lot.lot_number,
            winning_bid,
            premium_rate_bp,
            premium_amount,
            tax_rate_bp,
            tax_amount,
            shipping_amount,
            line_total: winning_bid + premium_amount + tax_amount + shipping_amount,
        });
    }

    // 합계는 항목 필드의 합 — 항등식이 구성적으로 성립한다
    let subtotal: i64 = items.iter().map(|i| i.winning_bid).sum();
    let premium: i64 = items.iter().map(|i| i.premium_amount).sum();
    let tax: i64 = items.iter().map(|i| i.tax_amount).sum();
    let shipping: i64 = items.iter().map(|i| i.shipping_amount).sum();
    NewInvoice {
        auction_id: auction.id,
        bidder_id,
        invoice_number,
        subtotal,
        premium,
        tax,
        shipping,
        total: subtotal + premium + tax + shipping,
        created_at: now,
        items,
    }
}

// endregion: --- Invoicer

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::model::PremiumTier;
    use chrono::{TimeZone, Utc};

    fn auction_fixture(premium_bp: i64, tax_bp: Option<i64>) -> Auction {
        Auction {
            id: 1,
            title: "정산 테스트".to_string(),
            status: AuctionStatus::Closed,
            start_at: Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap(),
            end_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            soft_close_enabled: false,
            trigger_window_secs: 0,
            extension_secs: 0,
            increment_rules: rules::default_increment_tiers(),
            premium_rules: vec![PremiumTier {
                min: 0,
                max: None,
                rate_bp: premium_bp,
            }],
            tax_rate_bp: tax_bp,
            created_at: Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap(),
        }
    }

    fn sold_lot(id: i64, number: i64, winning_bid: i64) -> Lot {
        Lot {
            id,
            auction_id: 1,
            lot_number: number,
            title: format!("로트 {number}"),
            description: String::new(),
            category: None,
            condition: None,
            quantity: 1,
            location: None,
            shipping_available: false,
            tags: vec![],
            starting_bid: 0,
            reserve_price: None,
            buy_now_price: None,
            increment_rules_override: None,
            original_close_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            current_close_at: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            extension_count: 0,
            status: LotStatus::Sold,
            current_bid: winning_bid,
            current_bidder_id: Some(9),
            bid_count: 3,
            reserve_met: true,
            shipping_amount: 0,
            closed_at: None,
            created_at: Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn rounding_scenario_is_exact_to_the_cent() {
        // 낙찰가 [100.00, 250.55], 프리미엄 15%, 세금 0
        let auction = auction_fixture(1_500, None);
        let lot_a = sold_lot(1, 1, 10_000);
        let lot_b = sold_lot(2, 2, 25_055);
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        let invoice = build_invoice(
            &auction,
            9,
            "INV-20250602-00001".to_string(),
            &[&lot_a, &lot_b],
            now,
        );

        // (100.00, 15%, 15.00, 115.00)
        assert_eq!(invoice.items[0].premium_amount, 1_500);
        assert_eq!(invoice.items[0].line_total, 11_500);
        // (250.55, 15%, 37.5825 → 37.58, 288.13)
        assert_eq!(invoice.items[1].premium_amount, 3_758);
        assert_eq!(invoice.items[1].line_total, 28_813);
        // subtotal=350.55, premium=52.58, total=403.13
        assert_eq!(invoice.subtotal, 35_055);
        assert_eq!(invoice.premium, 5_258);
        assert_eq!(invoice.total, 40_313);
        assert_eq!(
            invoice.total,
            invoice.subtotal + invoice.premium + invoice.tax + invoice.shipping
        );
        let item_sum: i64 = invoice.items.iter().map(|i| i.line_total).sum();
        assert_eq!(item_sum, invoice.total);
    }

    #[test]
    fn tax_applies_to_bid_plus_premium() {
        // 10% 프리미엄 + 10% 세금
        let auction = auction_fixture(1_000, Some(1_000));
        let lot = sold_lot(1, 1, 10_000);
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        let invoice = build_invoice(&auction, 9, "INV-20250602-00002".to_string(), &[&lot], now);
        // premium 10.00, tax = (100.00 + 10.00) × 10% = 11.00
        assert_eq!(invoice.items[0].premium_amount, 1_000);
        assert_eq!(invoice.items[0].tax_amount, 1_100);
        assert_eq!(invoice.total, 12_100);
    }

    #[test]
    fn shipping_defaults_to_lot_amount() {
        let auction = auction_fixture(0, None);
        let mut lot = sold_lot(1, 1, 10_000);
        lot.shipping_amount = 750;
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        let invoice = build_invoice(&auction, 9, "INV-20250602-00003".to_string(), &[&lot], now);
        assert_eq!(invoice.shipping, 750);
        assert_eq!(invoice.total, 10_750);
    }
}

// endregion: --- Tests
