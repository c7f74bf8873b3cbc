// Block allocation rules
//
// Pure functions over loaded blocks and bookings: expiry dates, which block a
// booking should use, whether a booking may be put on a block, when a free
// class is earned and what a cancellation changes.

use chrono::{DateTime, Duration, Months, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::blocks::error::BlockError;
use crate::blocks::models::{
    Block, BlockState, BlockType, BookingContext, BookingStatus, CancellationPlan, EventCategory,
    FreeClassAction, NewBlock, SystemBlockType,
};

pub const FREE_CLASS_IDENTIFIER: &str = "free class";
pub const TRANSFER_IDENTIFIER: &str = "transferred";

/// Single free class granted when a qualifying block is used up
pub fn free_class_block_type() -> SystemBlockType {
    SystemBlockType {
        identifier: FREE_CLASS_IDENTIFIER,
        size: 1,
        cost: Decimal::ZERO,
        duration_months: Some(1),
        duration_weeks: None,
    }
}

/// Credit for a cancelled, directly paid class
pub fn transfer_block_type() -> SystemBlockType {
    SystemBlockType {
        identifier: TRANSFER_IDENTIFIER,
        size: 1,
        cost: Decimal::ZERO,
        duration_months: None,
        duration_weeks: Some(2),
    }
}

/// 23:59:59 UTC on the day of `at`
pub fn end_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = Utc.from_utc_datetime(&at.date_naive().and_time(NaiveTime::default()));
    midnight + Duration::days(1) - Duration::seconds(1)
}

/// Expiry for a block starting at `start` with the given duration
///
/// Weeks take precedence when both are set.
pub fn expiry_date(
    start: DateTime<Utc>,
    duration_months: Option<i32>,
    duration_weeks: Option<i32>,
) -> DateTime<Utc> {
    let end = match (duration_weeks, duration_months) {
        (Some(weeks), _) => start + Duration::weeks(weeks as i64),
        (None, Some(months)) => start
            .checked_add_months(Months::new(months.max(0) as u32))
            .unwrap_or(start),
        (None, None) => start,
    };
    end_of_day(end)
}

pub fn expiry_for(start: DateTime<Utc>, block_type: &BlockType) -> DateTime<Utc> {
    expiry_date(start, block_type.duration_months, block_type.duration_weeks)
}

pub fn is_expired(block: &Block, now: DateTime<Utc>) -> bool {
    block.expiry_date < now
}

pub fn is_full(state: &BlockState) -> bool {
    state.bookings_made >= state.block_type.size as i64
}

/// Paid, not expired and with space left
pub fn is_active(state: &BlockState, now: DateTime<Utc>) -> bool {
    state.block.paid && !is_expired(&state.block, now) && !is_full(state)
}

/// Earliest-starting active block for the event type, if any
pub fn find_eligible_block(
    candidates: &[BlockState],
    event_type_id: i32,
    now: DateTime<Utc>,
) -> Option<&BlockState> {
    candidates
        .iter()
        .filter(|s| s.block_type.event_type_id == event_type_id && is_active(s, now))
        .min_by_key(|s| (s.block.start_date, s.block.id))
}

/// Check that `ctx.booking` may be put on `state.block`
pub fn check_assign(
    ctx: &BookingContext,
    state: &BlockState,
    now: DateTime<Utc>,
) -> Result<(), BlockError> {
    if ctx.event.cancelled {
        return Err(BlockError::EventCancelled);
    }
    if ctx.booking.status == BookingStatus::Cancelled {
        return Err(BlockError::BookingCancelled);
    }
    if ctx.booking.block_id == Some(state.block.id) {
        return Err(BlockError::AlreadyOnBlock(state.block.id));
    }
    if ctx.booking.paid {
        return Err(BlockError::AlreadyPaid);
    }
    if state.block.user_id != ctx.booking.user_id {
        return Err(BlockError::WrongUser);
    }
    if state.block_type.event_type_id != ctx.event.event_type_id {
        return Err(BlockError::EventTypeMismatch);
    }
    if is_full(state) {
        return Err(BlockError::BlockFull);
    }
    if !state.block.paid || is_expired(&state.block, now) {
        return Err(BlockError::BlockInactive);
    }
    Ok(())
}

/// Whether one more booking on this block earns a free class
///
/// The block must credit free classes, be paid and unexpired, and the booking
/// must take its last space. The one-child-per-parent check is made by the
/// write itself.
pub fn free_class_due(state: &BlockState, now: DateTime<Utc>) -> bool {
    state.block_type.assign_free_class_on_completion
        && state.block.paid
        && !is_expired(&state.block, now)
        && state.bookings_made + 1 >= state.block_type.size as i64
}

/// Free class child: same start and duration as the parent, already paid
pub fn new_free_class_block(parent: &BlockState, free_type: &BlockType) -> NewBlock {
    NewBlock {
        user_id: parent.block.user_id,
        block_type_id: free_type.id,
        start_date: parent.block.start_date,
        expiry_date: expiry_for(parent.block.start_date, &parent.block_type),
        paid: true,
        parent_id: Some(parent.block.id),
        transferred_booking_id: None,
    }
}

/// A new block of `block_type` starting now; zero-cost types start paid
pub fn new_block(user_id: i32, block_type: &BlockType, now: DateTime<Utc>) -> NewBlock {
    NewBlock {
        user_id,
        block_type_id: block_type.id,
        start_date: now,
        expiry_date: expiry_for(now, block_type),
        paid: block_type.cost == Decimal::ZERO,
        parent_id: None,
        transferred_booking_id: None,
    }
}

/// Directly paid classes and room hires are credited with a transfer block
///
/// Bookings paid by a block or free class, and "Event" bookings, are not.
pub fn needs_transfer_block(ctx: &BookingContext) -> bool {
    ctx.booking.paid
        && ctx.booking.block_id.is_none()
        && !ctx.booking.free_class
        && ctx.event_type.category != EventCategory::Event
}

/// Work out every change a cancellation makes
///
/// `free_child` is the free class child of the booking's block, with the id of
/// the booking using it if any. `transfer_type` must be given when
/// [`needs_transfer_block`] holds.
pub fn plan_cancellation(
    ctx: &BookingContext,
    free_child: Option<(&Block, Option<i32>)>,
    transfer_type: Option<&BlockType>,
    now: DateTime<Utc>,
) -> Result<CancellationPlan, BlockError> {
    if ctx.booking.status == BookingStatus::Cancelled {
        return Err(BlockError::AlreadyCancelled);
    }

    let mut booking = ctx.booking.clone();
    let mut free_class_action = FreeClassAction::None;
    let mut transfer_block = None;

    if let Some(block_id) = booking.block_id {
        free_class_action = match free_child {
            Some((_, Some(used_by))) => FreeClassAction::MoveToParent {
                booking_id: used_by,
                parent_id: block_id,
            },
            Some((child, None)) => FreeClassAction::DeleteBlock(child.id),
            None => FreeClassAction::None,
        };
        booking.block_id = None;
        booking.paid = false;
    } else if needs_transfer_block(ctx) {
        if let Some(block_type) = transfer_type {
            let mut block = new_block(booking.user_id, block_type, now);
            block.transferred_booking_id = Some(booking.id);
            transfer_block = Some(block);
            booking.paid = false;
        }
    }

    if booking.free_class {
        booking.free_class = false;
        booking.paid = false;
    }
    booking.status = BookingStatus::Cancelled;
    booking.payment_confirmed = false;

    Ok(CancellationPlan {
        booking,
        free_class_action,
        transfer_block,
    })
}
