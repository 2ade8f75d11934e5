/// 인보이스 모델. 금액 필드는 생성 이후 절대 바뀌지 않는다
/// (결제/이행 상태만 전이 가능).
// region:    --- Imports
use crate::auction::model::{Amount, AuctionId, InvoiceId, LotId, RateBp, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- Status

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unpaid" => Some(PaymentStatus::Unpaid),
            "paid" => Some(PaymentStatus::Paid),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Pending,
    Shipped,
    Completed,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "pending",
            FulfillmentStatus::Shipped => "shipped",
            FulfillmentStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FulfillmentStatus::Pending),
            "shipped" => Some(FulfillmentStatus::Shipped),
            "completed" => Some(FulfillmentStatus::Completed),
            _ => None,
        }
    }
}

// endregion: --- Status

// region:    --- Invoice

/// (경매, 낙찰자)당 정확히 하나 생성된다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    /// `INV-YYYYMMDD-NNNNN`, 시스템 전역 유일
    pub invoice_number: String,
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    pub subtotal: Amount,
    pub premium: Amount,
    pub tax: Amount,
    pub shipping: Amount,
    pub total: Amount,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: i64,
    pub invoice_id: InvoiceId,
    pub lot_id: LotId,
    pub lot_number: i64,
    pub winning_bid: Amount,
    pub premium_rate_bp: RateBp,
    pub premium_amount: Amount,
    pub tax_rate_bp: RateBp,
    pub tax_amount: Amount,
    pub shipping_amount: Amount,
    pub line_total: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceWithItems {
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

// endregion: --- Invoice

// region:    --- New Invoice

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoiceItem {
    pub lot_id: LotId,
    pub lot_number: i64,
    pub winning_bid: Amount,
    pub premium_rate_bp: RateBp,
    pub premium_amount: Amount,
    pub tax_rate_bp: RateBp,
    pub tax_amount: Amount,
    pub shipping_amount: Amount,
    pub line_total: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    pub invoice_number: String,
    pub subtotal: Amount,
    pub premium: Amount,
    pub tax: Amount,
    pub shipping: Amount,
    pub total: Amount,
    pub created_at: DateTime<Utc>,
    pub items: Vec<NewInvoiceItem>,
}

// endregion: --- New Invoice
