// Voucher service - quoting and redeeming discount codes

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::activity_log::ActivityLogger;
use crate::auth::AuthenticatedUser;
use crate::blocks::{allocation, BlockError, BlockRepository};
use crate::db::StoreError;
use crate::vouchers::{
    discount,
    error::VoucherError,
    models::{
        CreateVoucherRequest, PaidItem, RedeemVoucherRequest, Redemption, RedemptionOutcome,
        RedemptionResponse, UnpaidItem, Voucher, VoucherKind, VoucherQuote,
    },
    repository::VoucherRepository,
    rules,
};

pub struct VoucherService {
    repo: Arc<dyn VoucherRepository>,
    blocks: Arc<dyn BlockRepository>,
    activity: ActivityLogger,
}

impl VoucherService {
    pub fn new(
        repo: Arc<dyn VoucherRepository>,
        blocks: Arc<dyn BlockRepository>,
        activity: ActivityLogger,
    ) -> Self {
        Self {
            repo,
            blocks,
            activity,
        }
    }

    pub async fn create(
        &self,
        request: CreateVoucherRequest,
        today: NaiveDate,
    ) -> Result<Voucher, VoucherError> {
        let new = rules::new_voucher(request, today)?;
        let voucher = self.repo.create(&new).await.map_err(|e| match e {
            StoreError::Duplicate(_) => VoucherError::DuplicateCode(new.code.clone()),
            other => VoucherError::Storage(other),
        })?;

        tracing::info!("Voucher {} ({:?}) created", voucher.code, voucher.kind);
        self.activity
            .log(format!(
                "{} voucher {} created: {}% discount",
                match voucher.kind {
                    VoucherKind::Event => "Event",
                    VoucherKind::Block => "Block",
                },
                voucher.code,
                voucher.discount
            ))
            .await;
        Ok(voucher)
    }

    /// Find a voucher by code ("No code provided" / "Invalid code" otherwise)
    pub async fn lookup(&self, kind: VoucherKind, code: &str) -> Result<Voucher, VoucherError> {
        let code = rules::check_code(code)?;
        tracing::debug!("Looking up {:?} voucher {}", kind, code);
        self.repo
            .find_by_code(kind, code)
            .await?
            .ok_or(VoucherError::InvalidCode)
    }

    /// Price the user's unpaid items with the voucher applied
    ///
    /// A voucher that exists but cannot be used is not an error here: the
    /// quote comes back with `valid: false`, full prices and the reason.
    pub async fn quote(
        &self,
        kind: VoucherKind,
        code: &str,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> Result<VoucherQuote, VoucherError> {
        let voucher = self.lookup(kind, code).await?;
        let usage = self.repo.usage(voucher.id, user_id).await?;
        let unpaid = self.repo.unpaid_items(kind, user_id, now).await?;

        match rules::validate(&voucher, usage, &unpaid, now) {
            Ok(()) => {
                let application = discount::apply(&voucher, &unpaid, usage);
                Ok(VoucherQuote {
                    code: voucher.code,
                    kind,
                    valid: true,
                    discounted: application.discounted,
                    total: application.total,
                    messages: application.messages,
                })
            }
            Err(VoucherError::Rejected(reason)) => Ok(VoucherQuote {
                code: voucher.code,
                kind,
                valid: false,
                discounted: Vec::new(),
                total: unpaid.iter().map(|item| item.cost).sum(),
                messages: vec![reason],
            }),
            Err(other) => Err(other),
        }
    }

    /// Pay for items with the voucher, recording one use per fully discounted item
    ///
    /// Only items the discount brings to zero are marked paid. Discounted items
    /// with money still owed come back priced in `awaiting_payment` and the
    /// voucher is not counted against them. Items the voucher was already
    /// redeemed against are reported, not counted again.
    pub async fn redeem(
        &self,
        kind: VoucherKind,
        code: &str,
        user: &AuthenticatedUser,
        request: RedeemVoucherRequest,
        now: DateTime<Utc>,
    ) -> Result<RedemptionResponse, VoucherError> {
        let voucher = self.lookup(kind, code).await?;

        let mut already_redeemed = Vec::new();
        let mut pending = Vec::new();
        for item_id in request.item_ids {
            if already_redeemed.contains(&item_id) || pending.contains(&item_id) {
                continue;
            }
            match self.repo.find_redemption(voucher.id, item_id).await? {
                Some(_) => already_redeemed.push(item_id),
                None => pending.push(item_id),
            }
        }

        let mut response = RedemptionResponse {
            code: voucher.code.clone(),
            redeemed: Vec::new(),
            already_redeemed,
            awaiting_payment: Vec::new(),
            amount_due: Decimal::ZERO,
            messages: Vec::new(),
        };
        if pending.is_empty() {
            return Ok(response);
        }

        let unpaid = self.repo.unpaid_items(kind, user.user_id, now).await?;
        let items = pending
            .iter()
            .map(|id| {
                unpaid
                    .iter()
                    .find(|item| item.id == *id)
                    .cloned()
                    .ok_or(VoucherError::ItemNotUnpaid(*id))
            })
            .collect::<Result<Vec<UnpaidItem>, _>>()?;

        let usage = self.repo.usage(voucher.id, user.user_id).await?;
        rules::validate(&voucher, usage, &items, now)?;
        let application = discount::apply(&voucher, &items, usage);

        let (free, owed): (Vec<_>, Vec<_>) = application
            .discounted
            .into_iter()
            .partition(|item| item.cost.is_zero());
        if !owed.is_empty() {
            response.amount_due = owed.iter().map(|item| item.cost).sum();
            response.messages.push(format!(
                "Payment still due for some {}; voucher applied at checkout.",
                kind.items()
            ));
            response.awaiting_payment = owed;
        }

        for item in free {
            let paid_item = self.paid_item(kind, item.item_id, now).await?;
            let redemption = Redemption {
                voucher_id: voucher.id,
                user_id: user.user_id,
                item: paid_item,
                used_at: now,
            };
            match self.repo.record_redemption(&voucher, &redemption).await? {
                RedemptionOutcome::Recorded(_) => {
                    self.activity
                        .log(format!(
                            "Voucher code {} used by {} for {} id {}",
                            voucher.code,
                            user.username,
                            match kind {
                                VoucherKind::Event => "booking",
                                VoucherKind::Block => "block",
                            },
                            item.item_id
                        ))
                        .await;
                    response.redeemed.push(item);
                }
                RedemptionOutcome::AlreadyRecorded(_) => {
                    response.already_redeemed.push(item.item_id);
                }
                RedemptionOutcome::CapReached => {
                    tracing::warn!(
                        "Voucher {} reached its limit while redeeming for user {}",
                        voucher.code,
                        user.user_id
                    );
                    response.messages.push(format!(
                        "Voucher not applied to some {}; voucher has limited number of total uses.",
                        kind.items()
                    ));
                    break;
                }
            }
        }

        response.messages.extend(application.messages);
        Ok(response)
    }

    /// What marking this item paid changes; a block without a parent restarts now
    async fn paid_item(
        &self,
        kind: VoucherKind,
        item_id: i32,
        now: DateTime<Utc>,
    ) -> Result<PaidItem, VoucherError> {
        match kind {
            VoucherKind::Event => Ok(PaidItem::Booking(item_id)),
            VoucherKind::Block => {
                let state = self
                    .blocks
                    .find_block_state(item_id)
                    .await?
                    .ok_or(BlockError::BlockNotFound(item_id))?;
                let start_date = if state.block.parent_id.is_none() {
                    now
                } else {
                    state.block.start_date
                };
                Ok(PaidItem::Block {
                    id: item_id,
                    start_date,
                    expiry_date: allocation::expiry_for(start_date, &state.block_type),
                })
            }
        }
    }
}
