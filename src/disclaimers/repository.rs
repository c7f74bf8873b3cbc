// Storage for signed, paper and archived disclaimers

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::db::StoreError;
use crate::disclaimers::lifecycle::VALIDITY_DAYS;
use crate::disclaimers::models::{
    ArchivedDisclaimer, DisclaimerDetails, NewArchivedDisclaimer, NewNonRegisteredDisclaimer,
    NewOnlineDisclaimer, NonRegisteredDisclaimer, OnlineDisclaimer, PrintDisclaimer, SweepSelection,
};

const DETAIL_COLUMNS: &str = "name, dob, address, postcode, home_phone, mobile_phone, \
    emergency_contact1_name, emergency_contact1_relationship, emergency_contact1_phone, \
    emergency_contact2_name, emergency_contact2_relationship, emergency_contact2_phone, \
    medical_conditions, medical_conditions_details, joint_problems, joint_problems_details, \
    allergies, allergies_details, medical_treatment_permission, terms_accepted, age_over_18_confirmed";

/// Number of columns in DETAIL_COLUMNS
const DETAIL_COLUMN_COUNT: usize = 21;

fn placeholders(from: usize, count: usize) -> String {
    (from..from + count)
        .map(|n| format!("${}", n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn bind_details<'q, O>(
    query: sqlx::query::QueryAs<'q, Postgres, O, sqlx::postgres::PgArguments>,
    d: &'q DisclaimerDetails,
) -> sqlx::query::QueryAs<'q, Postgres, O, sqlx::postgres::PgArguments> {
    query
        .bind(&d.name)
        .bind(d.dob)
        .bind(&d.address)
        .bind(&d.postcode)
        .bind(&d.home_phone)
        .bind(&d.mobile_phone)
        .bind(&d.emergency_contact1_name)
        .bind(&d.emergency_contact1_relationship)
        .bind(&d.emergency_contact1_phone)
        .bind(&d.emergency_contact2_name)
        .bind(&d.emergency_contact2_relationship)
        .bind(&d.emergency_contact2_phone)
        .bind(d.medical_conditions)
        .bind(&d.medical_conditions_details)
        .bind(d.joint_problems)
        .bind(&d.joint_problems_details)
        .bind(d.allergies)
        .bind(&d.allergies_details)
        .bind(d.medical_treatment_permission)
        .bind(d.terms_accepted)
        .bind(d.age_over_18_confirmed)
}

#[async_trait]
pub trait DisclaimerRepository: Send + Sync {
    /// A user's online disclaimers, newest first
    async fn list_for_user(&self, user_id: i32) -> Result<Vec<OnlineDisclaimer>, StoreError>;

    async fn find_online(&self, id: i32) -> Result<Option<OnlineDisclaimer>, StoreError>;

    async fn list_online(&self) -> Result<Vec<OnlineDisclaimer>, StoreError>;

    /// Insert unless the user already holds a disclaimer active against `new.version`;
    /// that case fails with `StoreError::Duplicate`
    async fn insert_online(&self, new: &NewOnlineDisclaimer) -> Result<OnlineDisclaimer, StoreError>;

    /// Overwrite the answers and `date_updated` of an existing row; fails with
    /// `StoreError::Duplicate` when another of the user's disclaimers is active
    /// against `current_version` and the edited one would be too
    async fn update_online(
        &self,
        disclaimer: &OnlineDisclaimer,
        current_version: Decimal,
    ) -> Result<OnlineDisclaimer, StoreError>;

    /// Delete, writing `archive` in the same transaction when given
    async fn delete_online(
        &self,
        id: i32,
        archive: Option<&NewArchivedDisclaimer>,
    ) -> Result<bool, StoreError>;

    async fn find_print(&self, user_id: i32) -> Result<Option<PrintDisclaimer>, StoreError>;

    async fn list_print(&self) -> Result<Vec<PrintDisclaimer>, StoreError>;

    async fn insert_print(&self, user_id: i32, date: DateTime<Utc>) -> Result<PrintDisclaimer, StoreError>;

    async fn insert_non_registered(
        &self,
        new: &NewNonRegisteredDisclaimer,
    ) -> Result<NonRegisteredDisclaimer, StoreError>;

    async fn find_non_registered(&self, id: i32) -> Result<Option<NonRegisteredDisclaimer>, StoreError>;

    async fn list_non_registered(&self) -> Result<Vec<NonRegisteredDisclaimer>, StoreError>;

    async fn delete_non_registered(
        &self,
        id: i32,
        archive: Option<&NewArchivedDisclaimer>,
    ) -> Result<bool, StoreError>;

    async fn list_archived(&self) -> Result<Vec<ArchivedDisclaimer>, StoreError>;

    /// Users with a paid booking for an event dated after `since`
    async fn users_with_paid_bookings_since(&self, since: DateTime<Utc>) -> Result<Vec<i32>, StoreError>;

    /// Remove every selected row in one transaction
    async fn delete_swept(&self, selection: &SweepSelection) -> Result<(), StoreError>;
}

pub struct PgDisclaimerRepository {
    pool: PgPool,
}

impl PgDisclaimerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn online_select() -> String {
        format!(
            "SELECT id, user_id, date, date_updated, version, {} FROM online_disclaimers",
            DETAIL_COLUMNS
        )
    }

    fn non_registered_select() -> String {
        format!(
            "SELECT id, first_name, last_name, email, event_date, user_uuid, date, version, {} \
             FROM non_registered_disclaimers",
            DETAIL_COLUMNS
        )
    }

    async fn insert_archive(
        tx: &mut Transaction<'_, Postgres>,
        archive: &NewArchivedDisclaimer,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO archived_disclaimers (date, date_updated, date_archived, event_date, version, {}) \
             VALUES ($1, $2, $3, $4, $5, {}) RETURNING id",
            DETAIL_COLUMNS,
            placeholders(6, DETAIL_COLUMN_COUNT)
        );
        let query = sqlx::query_as::<_, (i32,)>(&sql)
            .bind(archive.date)
            .bind(archive.date_updated)
            .bind(archive.date_archived)
            .bind(archive.event_date)
            .bind(archive.version);
        bind_details(query, &archive.details).fetch_one(&mut **tx).await?;
        Ok(())
    }
}

#[async_trait]
impl DisclaimerRepository for PgDisclaimerRepository {
    async fn list_for_user(&self, user_id: i32) -> Result<Vec<OnlineDisclaimer>, StoreError> {
        let rows = sqlx::query_as::<_, OnlineDisclaimer>(&format!(
            "{} WHERE user_id = $1 ORDER BY date DESC, id DESC",
            Self::online_select()
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_online(&self, id: i32) -> Result<Option<OnlineDisclaimer>, StoreError> {
        let row = sqlx::query_as::<_, OnlineDisclaimer>(&format!("{} WHERE id = $1", Self::online_select()))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_online(&self) -> Result<Vec<OnlineDisclaimer>, StoreError> {
        let rows = sqlx::query_as::<_, OnlineDisclaimer>(&format!("{} ORDER BY id", Self::online_select()))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn insert_online(&self, new: &NewOnlineDisclaimer) -> Result<OnlineDisclaimer, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serialise concurrent submissions for the same user
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(new.user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let cutoff = new.date - Duration::days(VALIDITY_DAYS);
        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM online_disclaimers \
             WHERE user_id = $1 AND version = $2 AND COALESCE(date_updated, date) > $3",
        )
        .bind(new.user_id)
        .bind(new.version)
        .bind(cutoff)
        .fetch_one(&mut *tx)
        .await?;
        if active > 0 {
            return Err(StoreError::Duplicate("Active disclaimer already exists".into()));
        }

        let sql = format!(
            "INSERT INTO online_disclaimers (user_id, date, date_updated, version, {}) \
             VALUES ($1, $2, $3, $4, {}) RETURNING id, user_id, date, date_updated, version, {}",
            DETAIL_COLUMNS,
            placeholders(5, DETAIL_COLUMN_COUNT),
            DETAIL_COLUMNS
        );
        let query = sqlx::query_as::<_, OnlineDisclaimer>(&sql)
            .bind(new.user_id)
            .bind(new.date)
            .bind(new.date_updated)
            .bind(new.version);
        let created = bind_details(query, &new.details).fetch_one(&mut *tx).await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn update_online(
        &self,
        disclaimer: &OnlineDisclaimer,
        current_version: Decimal,
    ) -> Result<OnlineDisclaimer, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(disclaimer.user_id)
            .fetch_optional(&mut *tx)
            .await?;

        let signed_at = disclaimer.date_updated.unwrap_or(disclaimer.date);
        if disclaimer.version == current_version {
            let active: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM online_disclaimers \
                 WHERE user_id = $1 AND version = $2 AND id <> $3 \
                 AND COALESCE(date_updated, date) > $4",
            )
            .bind(disclaimer.user_id)
            .bind(current_version)
            .bind(disclaimer.id)
            .bind(signed_at - Duration::days(VALIDITY_DAYS))
            .fetch_one(&mut *tx)
            .await?;
            if active > 0 {
                return Err(StoreError::Duplicate("Active disclaimer already exists".into()));
            }
        }

        let assignments = DETAIL_COLUMNS
            .split(", ")
            .enumerate()
            .map(|(i, column)| format!("{} = ${}", column.trim(), i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE online_disclaimers SET date_updated = $2, {} WHERE id = $1 \
             RETURNING id, user_id, date, date_updated, version, {}",
            assignments, DETAIL_COLUMNS
        );
        let query = sqlx::query_as::<_, OnlineDisclaimer>(&sql)
            .bind(disclaimer.id)
            .bind(disclaimer.date_updated);
        let updated = bind_details(query, &disclaimer.details)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("online disclaimer {}", disclaimer.id)))?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_online(
        &self,
        id: i32,
        archive: Option<&NewArchivedDisclaimer>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        if let Some(archive) = archive {
            Self::insert_archive(&mut tx, archive).await?;
        }
        let result = sqlx::query("DELETE FROM online_disclaimers WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            // Nothing deleted: drop the archive row with the transaction
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn find_print(&self, user_id: i32) -> Result<Option<PrintDisclaimer>, StoreError> {
        let row = sqlx::query_as::<_, PrintDisclaimer>(
            "SELECT id, user_id, date FROM print_disclaimers WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_print(&self) -> Result<Vec<PrintDisclaimer>, StoreError> {
        let rows = sqlx::query_as::<_, PrintDisclaimer>("SELECT id, user_id, date FROM print_disclaimers ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn insert_print(&self, user_id: i32, date: DateTime<Utc>) -> Result<PrintDisclaimer, StoreError> {
        sqlx::query_as::<_, PrintDisclaimer>(
            "INSERT INTO print_disclaimers (user_id, date) VALUES ($1, $2) RETURNING id, user_id, date",
        )
        .bind(user_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_write(e, "print disclaimer already recorded"))
    }

    async fn insert_non_registered(
        &self,
        new: &NewNonRegisteredDisclaimer,
    ) -> Result<NonRegisteredDisclaimer, StoreError> {
        let sql = format!(
            "INSERT INTO non_registered_disclaimers \
             (first_name, last_name, email, event_date, user_uuid, date, version, {}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, {}) \
             RETURNING id, first_name, last_name, email, event_date, user_uuid, date, version, {}",
            DETAIL_COLUMNS,
            placeholders(8, DETAIL_COLUMN_COUNT),
            DETAIL_COLUMNS
        );
        let query = sqlx::query_as::<_, NonRegisteredDisclaimer>(&sql)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.email)
            .bind(new.event_date)
            .bind(new.user_uuid)
            .bind(new.date)
            .bind(new.version);
        bind_details(query, &new.details)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::from_write(e, "non-registered disclaimer uuid already used"))
    }

    async fn find_non_registered(&self, id: i32) -> Result<Option<NonRegisteredDisclaimer>, StoreError> {
        let row = sqlx::query_as::<_, NonRegisteredDisclaimer>(&format!(
            "{} WHERE id = $1",
            Self::non_registered_select()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_non_registered(&self) -> Result<Vec<NonRegisteredDisclaimer>, StoreError> {
        let rows = sqlx::query_as::<_, NonRegisteredDisclaimer>(&format!(
            "{} ORDER BY id",
            Self::non_registered_select()
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_non_registered(
        &self,
        id: i32,
        archive: Option<&NewArchivedDisclaimer>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        if let Some(archive) = archive {
            Self::insert_archive(&mut tx, archive).await?;
        }
        let result = sqlx::query("DELETE FROM non_registered_disclaimers WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn list_archived(&self) -> Result<Vec<ArchivedDisclaimer>, StoreError> {
        let rows = sqlx::query_as::<_, ArchivedDisclaimer>(&format!(
            "SELECT id, date, date_updated, date_archived, event_date, version, {} \
             FROM archived_disclaimers ORDER BY id",
            DETAIL_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn users_with_paid_bookings_since(&self, since: DateTime<Utc>) -> Result<Vec<i32>, StoreError> {
        let users: Vec<i32> = sqlx::query_scalar(
            "SELECT DISTINCT b.user_id FROM bookings b JOIN events e ON e.id = b.event_id \
             WHERE b.paid = TRUE AND e.date > $1",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn delete_swept(&self, selection: &SweepSelection) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for (table, ids) in [
            ("online_disclaimers", &selection.online_ids),
            ("print_disclaimers", &selection.print_ids),
            ("non_registered_disclaimers", &selection.non_registered_ids),
            ("archived_disclaimers", &selection.archived_ids),
        ] {
            if ids.is_empty() {
                continue;
            }
            sqlx::query(&format!("DELETE FROM {} WHERE id = ANY($1)", table))
                .bind(ids)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
