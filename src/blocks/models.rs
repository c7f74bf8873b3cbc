// Events, block types, blocks and bookings

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Event category: class, event or room hire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text")]
pub enum EventCategory {
    #[serde(rename = "CL")]
    #[sqlx(rename = "CL")]
    Class,
    #[serde(rename = "EV")]
    #[sqlx(rename = "EV")]
    Event,
    #[serde(rename = "RH")]
    #[sqlx(rename = "RH")]
    RoomHire,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct EventType {
    pub id: i32,
    pub category: EventCategory,
    pub subtype: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Event {
    pub id: i32,
    pub name: String,
    pub event_type_id: i32,
    pub date: DateTime<Utc>,
    pub cost: Decimal,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BlockType {
    pub id: i32,
    pub event_type_id: i32,
    /// "free class" and "transferred" mark system block types
    pub identifier: Option<String>,
    pub size: i32,
    pub cost: Decimal,
    pub duration_months: Option<i32>,
    pub duration_weeks: Option<i32>,
    pub active: bool,
    pub assign_free_class_on_completion: bool,
}

impl BlockType {
    pub fn is_free_class(&self) -> bool {
        self.identifier.as_deref() == Some(super::allocation::FREE_CLASS_IDENTIFIER)
    }
}

/// Block type created on demand by the system, never sold directly
#[derive(Debug, Clone, PartialEq)]
pub struct SystemBlockType {
    pub identifier: &'static str,
    pub size: i32,
    pub cost: Decimal,
    pub duration_months: Option<i32>,
    pub duration_weeks: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Block {
    pub id: i32,
    pub user_id: i32,
    pub block_type_id: i32,
    pub start_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub paid: bool,
    /// Set on auto-created free class blocks
    pub parent_id: Option<i32>,
    /// Set on transfer blocks: the cancelled booking they credit
    pub transferred_booking_id: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewBlock {
    pub user_id: i32,
    pub block_type_id: i32,
    pub start_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub paid: bool,
    pub parent_id: Option<i32>,
    pub transferred_booking_id: Option<i32>,
}

/// A block with its type and how many bookings it currently holds
#[derive(Debug, Clone)]
pub struct BlockState {
    pub block: Block,
    pub block_type: BlockType,
    pub bookings_made: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingStatus {
    Open,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Booking {
    pub id: i32,
    pub user_id: i32,
    pub event_id: i32,
    pub block_id: Option<i32>,
    pub status: BookingStatus,
    pub paid: bool,
    pub payment_confirmed: bool,
    pub free_class: bool,
    pub date_booked: DateTime<Utc>,
}

/// Booking, event and event type loaded together
#[derive(Debug, Clone)]
pub struct BookingContext {
    pub booking: Booking,
    pub event: Event,
    pub event_type: EventType,
}

/// Write set for putting a booking on a block
#[derive(Debug, Clone)]
pub struct Assignment {
    pub booking_id: i32,
    pub block_id: i32,
    /// Size of the block type; the write re-checks capacity under lock
    pub block_size: i32,
    pub free_class: bool,
    /// Free class child to create if this booking fills the block
    pub free_class_block: Option<NewBlock>,
}

#[derive(Debug, Clone)]
pub enum AssignOutcome {
    Assigned {
        booking: Booking,
        free_class_block: Option<Block>,
    },
    /// Another booking took the last space first
    BlockFull,
}

/// What to do with a parent's free class child when a booking leaves the parent
#[derive(Debug, Clone, PartialEq)]
pub enum FreeClassAction {
    None,
    /// The free class was used; move that booking onto the parent
    MoveToParent { booking_id: i32, parent_id: i32 },
    /// The free class was never used; remove it
    DeleteBlock(i32),
}

/// Write set for a cancellation, applied in one transaction
#[derive(Debug, Clone)]
pub struct CancellationPlan {
    pub booking: Booking,
    pub free_class_action: FreeClassAction,
    pub transfer_block: Option<NewBlock>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BlockAllocationResponse {
    pub booking: Booking,
    /// None when the user has no usable block for this event
    pub block_id: Option<i32>,
    /// Free class block granted because this booking filled the block
    pub free_class_block: Option<Block>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CancellationResponse {
    pub booking: Booking,
    pub transfer_block: Option<Block>,
}
