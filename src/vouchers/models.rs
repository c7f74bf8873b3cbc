// Voucher data models and DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// What a voucher pays for: event bookings or blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VoucherKind {
    Event,
    Block,
}

impl VoucherKind {
    /// Plural noun for the items the voucher applies to
    pub fn items(&self) -> &'static str {
        match self {
            VoucherKind::Event => "bookings",
            VoucherKind::Block => "blocks",
        }
    }

    /// Plural noun for the item types the voucher is limited to
    pub fn item_types(&self) -> &'static str {
        match self {
            VoucherKind::Event => "bookings",
            VoucherKind::Block => "block types",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Voucher {
    pub id: i32,
    pub kind: VoucherKind,
    pub code: String,
    /// Percentage off, 1 to 100
    pub discount: i32,
    pub start_date: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    /// Uses allowed across all users
    pub max_vouchers: Option<i32>,
    pub max_per_user: Option<i32>,
    /// False for gift vouchers not yet paid for
    pub activated: bool,
    /// Event type ids (event vouchers) or block type ids (block vouchers)
    #[sqlx(skip)]
    pub applicable_type_ids: Vec<i32>,
}

impl Voucher {
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.map_or(false, |expiry| expiry < now)
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.start_date < now && self.activated
    }

    pub fn applies_to(&self, type_id: i32) -> bool {
        self.applicable_type_ids.contains(&type_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewVoucher {
    pub kind: VoucherKind,
    pub code: String,
    pub discount: i32,
    pub start_date: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub max_vouchers: Option<i32>,
    pub max_per_user: Option<i32>,
    pub activated: bool,
    pub applicable_type_ids: Vec<i32>,
}

/// One redemption of a voucher against a paid item
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UsedVoucher {
    pub id: i32,
    pub voucher_id: i32,
    pub user_id: i32,
    /// Booking id or block id, per the voucher kind
    pub item_id: i32,
    pub used_at: DateTime<Utc>,
}

/// Redemptions so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCounts {
    pub total: i64,
    pub by_user: i64,
}

/// An unpaid booking or block the voucher might pay for
#[derive(Debug, Clone, PartialEq, Serialize, FromRow, ToSchema)]
pub struct UnpaidItem {
    pub id: i32,
    /// Event type id or block type id
    pub type_id: i32,
    /// Shown when the voucher cannot be used for this type
    pub type_name: String,
    pub cost: Decimal,
}

/// How marking an item paid changes it
#[derive(Debug, Clone, PartialEq)]
pub enum PaidItem {
    Booking(i32),
    /// Blocks restart on payment
    Block {
        id: i32,
        start_date: DateTime<Utc>,
        expiry_date: DateTime<Utc>,
    },
}

impl PaidItem {
    pub fn id(&self) -> i32 {
        match self {
            PaidItem::Booking(id) => *id,
            PaidItem::Block { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Redemption {
    pub voucher_id: i32,
    pub user_id: i32,
    pub item: PaidItem,
    pub used_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum RedemptionOutcome {
    Recorded(UsedVoucher),
    /// This voucher was already redeemed against the item
    AlreadyRecorded(UsedVoucher),
    /// A cap was reached between quoting and redeeming
    CapReached,
}

/// Create voucher request DTO
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateVoucherRequest {
    pub kind: VoucherKind,
    #[validate(length(min = 1, max = 255, message = "Code must be 1-255 characters"))]
    pub code: String,
    #[validate(range(min = 1, max = 100, message = "Enter a number between 1 and 100"))]
    pub discount: i32,
    /// Defaults to today
    pub start_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    #[validate(range(min = 1, message = "Must be at least 1"))]
    pub max_vouchers: Option<i32>,
    #[validate(range(min = 1, message = "Must be at least 1"))]
    #[serde(default = "default_max_per_user")]
    pub max_per_user: Option<i32>,
    #[serde(default = "default_activated")]
    pub activated: bool,
    #[validate(length(min = 1, message = "Choose at least one type"))]
    pub applicable_type_ids: Vec<i32>,
}

fn default_max_per_user() -> Option<i32> {
    Some(1)
}

fn default_activated() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RedeemVoucherRequest {
    /// Booking ids or block ids, in the order the discount should apply
    #[validate(length(min = 1, message = "No items to pay for"))]
    pub item_ids: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DiscountedItem {
    pub item_id: i32,
    pub original_cost: Decimal,
    pub cost: Decimal,
}

/// Result of applying a voucher to the user's unpaid items
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VoucherQuote {
    pub code: String,
    pub kind: VoucherKind,
    /// False when the code cannot be used at all; `messages` says why
    pub valid: bool,
    pub discounted: Vec<DiscountedItem>,
    /// Sum over all unpaid items, discounted where applied
    pub total: Decimal,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RedemptionResponse {
    pub code: String,
    /// Items fully covered by the voucher, now marked paid
    pub redeemed: Vec<DiscountedItem>,
    /// Items this voucher had already been redeemed against
    pub already_redeemed: Vec<i32>,
    /// Discounted items that still need payment; nothing is recorded for them
    pub awaiting_payment: Vec<DiscountedItem>,
    /// Sum of the discounted costs in `awaiting_payment`
    pub amount_due: Decimal,
    pub messages: Vec<String>,
}
