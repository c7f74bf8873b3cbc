// Storage for events, blocks and bookings

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;

use crate::blocks::models::{
    AssignOutcome, Assignment, Block, BlockState, BlockType, Booking, BookingContext,
    CancellationPlan, Event, EventType, FreeClassAction, NewBlock, SystemBlockType,
};
use crate::db::StoreError;

const BLOCK_COLUMNS: &str =
    "id, user_id, block_type_id, start_date, expiry_date, paid, parent_id, transferred_booking_id";

const BLOCK_TYPE_COLUMNS: &str = "id, event_type_id, identifier, size, cost, duration_months, \
     duration_weeks, active, assign_free_class_on_completion";

const BOOKING_COLUMNS: &str =
    "id, user_id, event_id, block_id, status, paid, payment_confirmed, free_class, date_booked";

#[async_trait]
pub trait BlockRepository: Send + Sync {
    /// Booking with its event and event type
    async fn find_booking_context(&self, booking_id: i32)
        -> Result<Option<BookingContext>, StoreError>;

    async fn find_block_state(&self, block_id: i32) -> Result<Option<BlockState>, StoreError>;

    /// Every block the user owns, in any state
    async fn user_block_states(&self, user_id: i32) -> Result<Vec<BlockState>, StoreError>;

    async fn find_child_block(&self, parent_id: i32) -> Result<Option<Block>, StoreError>;

    async fn booking_ids_on_block(&self, block_id: i32) -> Result<Vec<i32>, StoreError>;

    /// Fetch the system block type for an event type, creating it on first use
    async fn get_or_create_block_type(
        &self,
        event_type_id: i32,
        system_type: &SystemBlockType,
    ) -> Result<BlockType, StoreError>;

    /// Put a booking on a block, re-checking capacity under a row lock and
    /// creating the free class child in the same transaction
    async fn assign_block(&self, assignment: &Assignment) -> Result<AssignOutcome, StoreError>;

    /// Apply a cancellation; returns the transfer block if one was created
    async fn apply_cancellation(&self, plan: &CancellationPlan) -> Result<Option<Block>, StoreError>;
}

pub struct PgBlockRepository {
    pool: PgPool,
}

impl PgBlockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_state(&self, blocks: Vec<Block>) -> Result<Vec<BlockState>, StoreError> {
        if blocks.is_empty() {
            return Ok(Vec::new());
        }
        let block_ids: Vec<i32> = blocks.iter().map(|b| b.id).collect();
        let type_ids: Vec<i32> = blocks.iter().map(|b| b.block_type_id).collect();

        let types: HashMap<i32, BlockType> = sqlx::query_as::<_, BlockType>(&format!(
            "SELECT {} FROM block_types WHERE id = ANY($1)",
            BLOCK_TYPE_COLUMNS
        ))
        .bind(&type_ids)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|bt| (bt.id, bt))
        .collect();

        let counts: HashMap<i32, i64> = sqlx::query_as::<_, (i32, i64)>(
            "SELECT block_id, COUNT(*) FROM bookings WHERE block_id = ANY($1) GROUP BY block_id",
        )
        .bind(&block_ids)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .collect();

        Ok(blocks
            .into_iter()
            .filter_map(|block| {
                let block_type = types.get(&block.block_type_id)?.clone();
                let bookings_made = counts.get(&block.id).copied().unwrap_or(0);
                Some(BlockState {
                    block,
                    block_type,
                    bookings_made,
                })
            })
            .collect())
    }
}

/// Insert a block; a second free class child for the same parent is skipped
async fn insert_block(conn: &mut PgConnection, new: &NewBlock) -> Result<Option<Block>, StoreError> {
    let block = sqlx::query_as::<_, Block>(&format!(
        "INSERT INTO blocks (user_id, block_type_id, start_date, expiry_date, paid, parent_id, \
         transferred_booking_id) VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (parent_id) WHERE parent_id IS NOT NULL DO NOTHING RETURNING {}",
        BLOCK_COLUMNS
    ))
    .bind(new.user_id)
    .bind(new.block_type_id)
    .bind(new.start_date)
    .bind(new.expiry_date)
    .bind(new.paid)
    .bind(new.parent_id)
    .bind(new.transferred_booking_id)
    .fetch_optional(conn)
    .await?;
    Ok(block)
}

#[async_trait]
impl BlockRepository for PgBlockRepository {
    async fn find_booking_context(
        &self,
        booking_id: i32,
    ) -> Result<Option<BookingContext>, StoreError> {
        let Some(booking) = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let event = sqlx::query_as::<_, Event>(
            "SELECT id, name, event_type_id, date, cost, cancelled FROM events WHERE id = $1",
        )
        .bind(booking.event_id)
        .fetch_one(&self.pool)
        .await?;

        let event_type = sqlx::query_as::<_, EventType>(
            "SELECT id, category, subtype FROM event_types WHERE id = $1",
        )
        .bind(event.event_type_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(BookingContext {
            booking,
            event,
            event_type,
        }))
    }

    async fn find_block_state(&self, block_id: i32) -> Result<Option<BlockState>, StoreError> {
        let blocks = sqlx::query_as::<_, Block>(&format!(
            "SELECT {} FROM blocks WHERE id = $1",
            BLOCK_COLUMNS
        ))
        .bind(block_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(self.with_state(blocks).await?.into_iter().next())
    }

    async fn user_block_states(&self, user_id: i32) -> Result<Vec<BlockState>, StoreError> {
        let blocks = sqlx::query_as::<_, Block>(&format!(
            "SELECT {} FROM blocks WHERE user_id = $1 ORDER BY start_date, id",
            BLOCK_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        self.with_state(blocks).await
    }

    async fn find_child_block(&self, parent_id: i32) -> Result<Option<Block>, StoreError> {
        let block = sqlx::query_as::<_, Block>(&format!(
            "SELECT {} FROM blocks WHERE parent_id = $1",
            BLOCK_COLUMNS
        ))
        .bind(parent_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(block)
    }

    async fn booking_ids_on_block(&self, block_id: i32) -> Result<Vec<i32>, StoreError> {
        let ids = sqlx::query_scalar::<_, i32>(
            "SELECT id FROM bookings WHERE block_id = $1 ORDER BY id",
        )
        .bind(block_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn get_or_create_block_type(
        &self,
        event_type_id: i32,
        system_type: &SystemBlockType,
    ) -> Result<BlockType, StoreError> {
        let inserted = sqlx::query(
            "INSERT INTO block_types (event_type_id, identifier, size, cost, duration_months, \
             duration_weeks, active, assign_free_class_on_completion) \
             VALUES ($1, $2, $3, $4, $5, $6, FALSE, FALSE) \
             ON CONFLICT (event_type_id, identifier) \
             WHERE identifier IN ('free class', 'transferred') DO NOTHING",
        )
        .bind(event_type_id)
        .bind(system_type.identifier)
        .bind(system_type.size)
        .bind(system_type.cost)
        .bind(system_type.duration_months)
        .bind(system_type.duration_weeks)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            tracing::info!(
                "Created '{}' block type for event type {}",
                system_type.identifier,
                event_type_id
            );
        }

        let block_type = sqlx::query_as::<_, BlockType>(&format!(
            "SELECT {} FROM block_types WHERE event_type_id = $1 AND identifier = $2",
            BLOCK_TYPE_COLUMNS
        ))
        .bind(event_type_id)
        .bind(system_type.identifier)
        .fetch_one(&self.pool)
        .await?;
        Ok(block_type)
    }

    async fn assign_block(&self, assignment: &Assignment) -> Result<AssignOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM blocks WHERE id = $1 FOR UPDATE")
            .bind(assignment.block_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("block {}", assignment.block_id)))?;

        let used: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE block_id = $1")
            .bind(assignment.block_id)
            .fetch_one(&mut *tx)
            .await?;
        if used >= assignment.block_size as i64 {
            return Ok(AssignOutcome::BlockFull);
        }

        let booking = sqlx::query_as::<_, Booking>(&format!(
            "UPDATE bookings SET block_id = $2, paid = TRUE, payment_confirmed = TRUE, \
             free_class = $3 WHERE id = $1 RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(assignment.booking_id)
        .bind(assignment.block_id)
        .bind(assignment.free_class)
        .fetch_one(&mut *tx)
        .await?;

        let mut free_class_block = None;
        if let Some(new) = &assignment.free_class_block {
            if used + 1 >= assignment.block_size as i64 {
                free_class_block = insert_block(&mut tx, new).await?;
            }
        }

        tx.commit().await?;
        Ok(AssignOutcome::Assigned {
            booking,
            free_class_block,
        })
    }

    async fn apply_cancellation(&self, plan: &CancellationPlan) -> Result<Option<Block>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let booking = &plan.booking;

        sqlx::query(
            "UPDATE bookings SET block_id = $2, status = $3, paid = $4, payment_confirmed = $5, \
             free_class = $6 WHERE id = $1",
        )
        .bind(booking.id)
        .bind(booking.block_id)
        .bind(booking.status)
        .bind(booking.paid)
        .bind(booking.payment_confirmed)
        .bind(booking.free_class)
        .execute(&mut *tx)
        .await?;

        match &plan.free_class_action {
            FreeClassAction::None => {}
            FreeClassAction::MoveToParent {
                booking_id,
                parent_id,
            } => {
                sqlx::query("UPDATE bookings SET block_id = $2, free_class = FALSE WHERE id = $1")
                    .bind(booking_id)
                    .bind(parent_id)
                    .execute(&mut *tx)
                    .await?;
            }
            FreeClassAction::DeleteBlock(block_id) => {
                sqlx::query("DELETE FROM blocks WHERE id = $1")
                    .bind(block_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let transfer_block = match &plan.transfer_block {
            Some(new) => insert_block(&mut tx, new).await?,
            None => None,
        };

        tx.commit().await?;
        Ok(transfer_block)
    }
}
