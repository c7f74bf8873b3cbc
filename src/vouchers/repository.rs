// Voucher storage and atomic redemption

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::db::StoreError;
use crate::vouchers::models::{
    NewVoucher, PaidItem, Redemption, RedemptionOutcome, UnpaidItem, UsageCounts, UsedVoucher,
    Voucher, VoucherKind,
};
use crate::vouchers::rules;

const VOUCHER_COLUMNS: &str =
    "id, kind, code, discount, start_date, expiry_date, max_vouchers, max_per_user, activated";

const USED_COLUMNS: &str = "id, voucher_id, user_id, item_id, used_at";

#[async_trait]
pub trait VoucherRepository: Send + Sync {
    /// Exact, case-sensitive code match within a kind
    async fn find_by_code(&self, kind: VoucherKind, code: &str)
        -> Result<Option<Voucher>, StoreError>;

    async fn create(&self, voucher: &NewVoucher) -> Result<Voucher, StoreError>;

    async fn usage(&self, voucher_id: i32, user_id: i32) -> Result<UsageCounts, StoreError>;

    /// The user's unpaid bookings for upcoming events, or unpaid unexpired blocks
    async fn unpaid_items(
        &self,
        kind: VoucherKind,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Vec<UnpaidItem>, StoreError>;

    async fn find_redemption(
        &self,
        voucher_id: i32,
        item_id: i32,
    ) -> Result<Option<UsedVoucher>, StoreError>;

    /// Record a redemption and mark the item paid in one transaction
    ///
    /// The voucher row is locked while both caps are re-checked, so concurrent
    /// redemptions cannot overshoot them. Redeeming the same item twice returns
    /// the first record.
    async fn record_redemption(
        &self,
        voucher: &Voucher,
        redemption: &Redemption,
    ) -> Result<RedemptionOutcome, StoreError>;
}

pub struct PgVoucherRepository {
    pool: PgPool,
}

impl PgVoucherRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VoucherRepository for PgVoucherRepository {
    async fn find_by_code(
        &self,
        kind: VoucherKind,
        code: &str,
    ) -> Result<Option<Voucher>, StoreError> {
        let Some(mut voucher) = sqlx::query_as::<_, Voucher>(&format!(
            "SELECT {} FROM vouchers WHERE kind = $1 AND code = $2",
            VOUCHER_COLUMNS
        ))
        .bind(kind)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        voucher.applicable_type_ids = sqlx::query_scalar(
            "SELECT type_id FROM voucher_applicable_types WHERE voucher_id = $1 ORDER BY type_id",
        )
        .bind(voucher.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(Some(voucher))
    }

    async fn create(&self, new: &NewVoucher) -> Result<Voucher, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut voucher = sqlx::query_as::<_, Voucher>(&format!(
            "INSERT INTO vouchers (kind, code, discount, start_date, expiry_date, max_vouchers, \
             max_per_user, activated) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            VOUCHER_COLUMNS
        ))
        .bind(new.kind)
        .bind(&new.code)
        .bind(new.discount)
        .bind(new.start_date)
        .bind(new.expiry_date)
        .bind(new.max_vouchers)
        .bind(new.max_per_user)
        .bind(new.activated)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::from_write(e, "voucher code"))?;

        sqlx::query(
            "INSERT INTO voucher_applicable_types (voucher_id, type_id) \
             SELECT $1, UNNEST($2::INTEGER[])",
        )
        .bind(voucher.id)
        .bind(&new.applicable_type_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        voucher.applicable_type_ids = new.applicable_type_ids.clone();
        Ok(voucher)
    }

    async fn usage(&self, voucher_id: i32, user_id: i32) -> Result<UsageCounts, StoreError> {
        let (total, by_user): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE user_id = $2) \
             FROM used_vouchers WHERE voucher_id = $1",
        )
        .bind(voucher_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(UsageCounts { total, by_user })
    }

    async fn unpaid_items(
        &self,
        kind: VoucherKind,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Vec<UnpaidItem>, StoreError> {
        let sql = match kind {
            VoucherKind::Event => {
                "SELECT b.id, e.event_type_id AS type_id, et.subtype AS type_name, e.cost \
                 FROM bookings b \
                 JOIN events e ON e.id = b.event_id \
                 JOIN event_types et ON et.id = e.event_type_id \
                 WHERE b.user_id = $1 AND b.paid = FALSE AND b.status = 'OPEN' \
                 AND e.cancelled = FALSE AND e.date >= $2 AND e.cost > 0 \
                 ORDER BY e.date, b.id"
            }
            VoucherKind::Block => {
                "SELECT bl.id, bt.id AS type_id, \
                 et.subtype || COALESCE(' (' || bt.identifier || ')', '') || ' - quantity ' || bt.size AS type_name, \
                 bt.cost \
                 FROM blocks bl \
                 JOIN block_types bt ON bt.id = bl.block_type_id \
                 JOIN event_types et ON et.id = bt.event_type_id \
                 WHERE bl.user_id = $1 AND bl.paid = FALSE AND bl.expiry_date >= $2 \
                 ORDER BY bl.start_date, bl.id"
            }
        };
        let items = sqlx::query_as::<_, UnpaidItem>(sql)
            .bind(user_id)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    async fn find_redemption(
        &self,
        voucher_id: i32,
        item_id: i32,
    ) -> Result<Option<UsedVoucher>, StoreError> {
        let used = sqlx::query_as::<_, UsedVoucher>(&format!(
            "SELECT {} FROM used_vouchers WHERE voucher_id = $1 AND item_id = $2",
            USED_COLUMNS
        ))
        .bind(voucher_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(used)
    }

    async fn record_redemption(
        &self,
        voucher: &Voucher,
        redemption: &Redemption,
    ) -> Result<RedemptionOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let item_id = redemption.item.id();

        sqlx::query("SELECT id FROM vouchers WHERE id = $1 FOR UPDATE")
            .bind(voucher.id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("voucher {}", voucher.id)))?;

        if let Some(existing) = sqlx::query_as::<_, UsedVoucher>(&format!(
            "SELECT {} FROM used_vouchers WHERE voucher_id = $1 AND item_id = $2",
            USED_COLUMNS
        ))
        .bind(voucher.id)
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?
        {
            return Ok(RedemptionOutcome::AlreadyRecorded(existing));
        }

        let (total, by_user): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE user_id = $2) \
             FROM used_vouchers WHERE voucher_id = $1",
        )
        .bind(voucher.id)
        .bind(redemption.user_id)
        .fetch_one(&mut *tx)
        .await?;
        if !rules::has_allowance(voucher, UsageCounts { total, by_user }) {
            return Ok(RedemptionOutcome::CapReached);
        }

        let used = sqlx::query_as::<_, UsedVoucher>(&format!(
            "INSERT INTO used_vouchers (voucher_id, user_id, item_id, used_at) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            USED_COLUMNS
        ))
        .bind(voucher.id)
        .bind(redemption.user_id)
        .bind(item_id)
        .bind(redemption.used_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StoreError::from_write(e, "voucher already used for this item"))?;

        match &redemption.item {
            PaidItem::Booking(id) => {
                sqlx::query(
                    "UPDATE bookings SET paid = TRUE, payment_confirmed = TRUE \
                     WHERE id = $1 AND user_id = $2",
                )
                .bind(id)
                .bind(redemption.user_id)
                .execute(&mut *tx)
                .await?;
            }
            PaidItem::Block {
                id,
                start_date,
                expiry_date,
            } => {
                sqlx::query(
                    "UPDATE blocks SET paid = TRUE, start_date = $3, expiry_date = $4 \
                     WHERE id = $1 AND user_id = $2",
                )
                .bind(id)
                .bind(redemption.user_id)
                .bind(start_date)
                .bind(expiry_date)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(RedemptionOutcome::Recorded(used))
    }
}
