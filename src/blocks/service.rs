// Block service - allocating bookings to blocks, free classes and cancellations

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::activity_log::ActivityLogger;
use crate::auth::AuthenticatedUser;
use crate::blocks::{
    allocation::{self, free_class_block_type, transfer_block_type},
    error::BlockError,
    models::{
        AssignOutcome, Assignment, BlockAllocationResponse, BlockState, BookingContext,
        CancellationResponse, FreeClassAction,
    },
    repository::BlockRepository,
};

pub struct BlockService {
    repo: Arc<dyn BlockRepository>,
    activity: ActivityLogger,
}

impl BlockService {
    pub fn new(repo: Arc<dyn BlockRepository>, activity: ActivityLogger) -> Self {
        Self { repo, activity }
    }

    /// Load a booking the acting user may manage (their own, or any for staff)
    async fn load_booking(
        &self,
        acting: &AuthenticatedUser,
        booking_id: i32,
    ) -> Result<BookingContext, BlockError> {
        let ctx = self
            .repo
            .find_booking_context(booking_id)
            .await?
            .ok_or(BlockError::BookingNotFound(booking_id))?;
        if ctx.booking.user_id != acting.user_id && !acting.is_staff {
            return Err(BlockError::NotYourBooking);
        }
        Ok(ctx)
    }

    /// The block a booking for `event_type_id` would use, if the user has one
    pub async fn find_eligible_block(
        &self,
        user_id: i32,
        event_type_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<BlockState>, BlockError> {
        let blocks = self.repo.user_block_states(user_id).await?;
        Ok(allocation::find_eligible_block(&blocks, event_type_id, now).cloned())
    }

    /// Pay for a booking with the user's eligible block
    ///
    /// Having no usable block is not an error; the booking is returned
    /// unchanged with no block id.
    pub async fn allocate(
        &self,
        acting: &AuthenticatedUser,
        booking_id: i32,
        now: DateTime<Utc>,
    ) -> Result<BlockAllocationResponse, BlockError> {
        let ctx = self.load_booking(acting, booking_id).await?;
        match self
            .find_eligible_block(ctx.booking.user_id, ctx.event.event_type_id, now)
            .await?
        {
            Some(state) => self.assign_to(ctx, state, now).await,
            None => {
                tracing::info!(
                    "No usable block for booking {} (user {})",
                    booking_id,
                    ctx.booking.user_id
                );
                Ok(BlockAllocationResponse {
                    booking: ctx.booking,
                    block_id: None,
                    free_class_block: None,
                })
            }
        }
    }

    /// Pay for a booking with a specific block
    pub async fn assign(
        &self,
        acting: &AuthenticatedUser,
        booking_id: i32,
        block_id: i32,
        now: DateTime<Utc>,
    ) -> Result<BlockAllocationResponse, BlockError> {
        let ctx = self.load_booking(acting, booking_id).await?;
        let state = self
            .repo
            .find_block_state(block_id)
            .await?
            .ok_or(BlockError::BlockNotFound(block_id))?;
        self.assign_to(ctx, state, now).await
    }

    async fn assign_to(
        &self,
        ctx: BookingContext,
        state: BlockState,
        now: DateTime<Utc>,
    ) -> Result<BlockAllocationResponse, BlockError> {
        allocation::check_assign(&ctx, &state, now)?;

        let free_class_block = if allocation::free_class_due(&state, now)
            && self.repo.find_child_block(state.block.id).await?.is_none()
        {
            let free_type = self
                .repo
                .get_or_create_block_type(state.block_type.event_type_id, &free_class_block_type())
                .await?;
            Some(allocation::new_free_class_block(&state, &free_type))
        } else {
            None
        };

        let assignment = Assignment {
            booking_id: ctx.booking.id,
            block_id: state.block.id,
            block_size: state.block_type.size,
            free_class: state.block_type.is_free_class(),
            free_class_block,
        };

        match self.repo.assign_block(&assignment).await? {
            AssignOutcome::BlockFull => Err(BlockError::BlockFull),
            AssignOutcome::Assigned {
                booking,
                free_class_block,
            } => {
                self.activity
                    .log(format!(
                        "Booking {} for {} paid with block {} (user {})",
                        booking.id, ctx.event.name, state.block.id, booking.user_id
                    ))
                    .await;
                if let Some(free) = &free_class_block {
                    self.activity
                        .log(format!(
                            "Free class block created with booking {}. Block id {}, parent block id {}, user {}",
                            booking.id, free.id, state.block.id, booking.user_id
                        ))
                        .await;
                }
                Ok(BlockAllocationResponse {
                    booking,
                    block_id: Some(state.block.id),
                    free_class_block,
                })
            }
        }
    }

    /// Cancel a booking
    ///
    /// A booking leaving a block hands a used free class back to the parent
    /// block, or removes an unused one. A directly paid class is credited
    /// with a transfer block.
    pub async fn cancel(
        &self,
        acting: &AuthenticatedUser,
        booking_id: i32,
        now: DateTime<Utc>,
    ) -> Result<CancellationResponse, BlockError> {
        let ctx = self.load_booking(acting, booking_id).await?;

        let free_child = match ctx.booking.block_id {
            Some(block_id) => match self.repo.find_child_block(block_id).await? {
                Some(child) => {
                    let used_by = self.repo.booking_ids_on_block(child.id).await?.first().copied();
                    Some((child, used_by))
                }
                None => None,
            },
            None => None,
        };

        let transfer_type = if allocation::needs_transfer_block(&ctx) {
            Some(
                self.repo
                    .get_or_create_block_type(ctx.event_type.id, &transfer_block_type())
                    .await?,
            )
        } else {
            None
        };

        let plan = allocation::plan_cancellation(
            &ctx,
            free_child.as_ref().map(|(child, used_by)| (child, *used_by)),
            transfer_type.as_ref(),
            now,
        )?;
        let transfer_block = self.repo.apply_cancellation(&plan).await?;

        let user_id = ctx.booking.user_id;
        match (&plan.free_class_action, ctx.booking.block_id) {
            (FreeClassAction::MoveToParent { booking_id: moved, .. }, Some(block_id)) => {
                self.activity
                    .log(format!(
                        "Booking {} cancelled from block {} (user {}); free booking {} moved to parent block",
                        booking_id, block_id, user_id, moved
                    ))
                    .await;
            }
            (FreeClassAction::DeleteBlock(_), Some(block_id)) => {
                self.activity
                    .log(format!(
                        "Booking {} cancelled from block {} (user {}); unused free class block deleted",
                        booking_id, block_id, user_id
                    ))
                    .await;
            }
            _ => {}
        }
        if let Some(block) = &transfer_block {
            self.activity
                .log(format!(
                    "Transfer block {} created for user {} from cancelled booking {}",
                    block.id, user_id, booking_id
                ))
                .await;
        }
        self.activity
            .log(format!(
                "Booking id {} for event {} was cancelled by user {}",
                booking_id, ctx.event.name, acting.username
            ))
            .await;

        Ok(CancellationResponse {
            booking: plan.booking,
            transfer_block,
        })
    }
}
