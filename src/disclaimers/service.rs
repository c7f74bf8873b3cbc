// Disclaimer service - signing, editing, deletion and the expiry sweep

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::activity_log::ActivityLogger;
use crate::auth::AuthService;
use crate::cache::StatusCache;
use crate::content::ContentService;
use crate::disclaimers::{
    error::DisclaimerError,
    lifecycle::{self, DeleteRetentionPolicy, SweepRetentionPolicy},
    models::{
        ArchivedDisclaimer, DeleteDisclaimerResponse, DisclaimerStatusResponse,
        NewNonRegisteredDisclaimer, NewOnlineDisclaimer, NonRegisteredDisclaimer,
        NonRegisteredDisclaimerRequest, OnlineDisclaimer, PrintDisclaimer, SignDisclaimerRequest,
        SweepSelection, UpdateDisclaimerRequest,
    },
    repository::DisclaimerRepository,
};

fn display_date(date: DateTime<Utc>) -> String {
    date.format("%d %b %Y, %H:%M").to_string()
}

/// What one run of the expiry sweep removed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// Names of users whose online disclaimers were deleted
    pub online_users: Vec<String>,
    /// Names of users whose paper disclaimers were deleted
    pub print_users: Vec<String>,
    pub non_registered: usize,
    pub archived: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.online_users.is_empty()
            && self.print_users.is_empty()
            && self.non_registered == 0
            && self.archived == 0
    }
}

pub struct DisclaimerService {
    repo: Arc<dyn DisclaimerRepository>,
    content: Arc<ContentService>,
    auth: Arc<AuthService>,
    cache: Arc<dyn StatusCache>,
    activity: ActivityLogger,
    delete_policy: DeleteRetentionPolicy,
    sweep_policy: SweepRetentionPolicy,
}

impl DisclaimerService {
    pub fn new(
        repo: Arc<dyn DisclaimerRepository>,
        content: Arc<ContentService>,
        auth: Arc<AuthService>,
        cache: Arc<dyn StatusCache>,
        activity: ActivityLogger,
    ) -> Self {
        Self {
            repo,
            content,
            auth,
            cache,
            activity,
            delete_policy: DeleteRetentionPolicy::default(),
            sweep_policy: SweepRetentionPolicy::default(),
        }
    }

    async fn published_version(&self) -> Result<Decimal, DisclaimerError> {
        let version = self.content.current_disclaimer_version().await?;
        if version == Decimal::ZERO {
            return Err(DisclaimerError::NoPublishedContent);
        }
        Ok(version)
    }

    /// Whether the user holds an active online disclaimer or a paper one
    pub async fn has_active_disclaimer(&self, user_id: i32) -> Result<bool, DisclaimerError> {
        let version = self.content.current_disclaimer_version().await?;
        self.has_active_disclaimer_for(user_id, version, Utc::now()).await
    }

    /// Same as [`Self::has_active_disclaimer`] against an already-loaded version
    pub async fn has_active_disclaimer_for(
        &self,
        user_id: i32,
        current_version: Decimal,
        now: DateTime<Utc>,
    ) -> Result<bool, DisclaimerError> {
        if let Some(cached) = self.cache.get(user_id, current_version).await {
            tracing::debug!("Disclaimer status cache hit for user {}", user_id);
            return Ok(cached);
        }

        let online = self.repo.list_for_user(user_id).await?;
        let active = online
            .iter()
            .any(|d| lifecycle::is_active(d, current_version, now))
            || self.repo.find_print(user_id).await?.is_some();

        self.cache.set(user_id, current_version, active).await;
        Ok(active)
    }

    pub async fn status(&self, user_id: i32) -> Result<DisclaimerStatusResponse, DisclaimerError> {
        let current_version = self.content.current_disclaimer_version().await?;
        let has_active_disclaimer = self
            .has_active_disclaimer_for(user_id, current_version, Utc::now())
            .await?;
        let has_expired_disclaimer =
            !has_active_disclaimer && !self.repo.list_for_user(user_id).await?.is_empty();
        Ok(DisclaimerStatusResponse {
            has_active_disclaimer,
            has_expired_disclaimer,
            current_version,
        })
    }

    /// Sign a new online disclaimer for `user_id`
    ///
    /// This method:
    /// 1. Re-confirms the user's password
    /// 2. Checks the answers (details given, age, boxes ticked)
    /// 3. Rejects the submission if an active disclaimer exists
    /// 4. Inserts with a locked re-check and clears the cached status
    pub async fn sign(
        &self,
        user_id: i32,
        request: SignDisclaimerRequest,
        now: DateTime<Utc>,
    ) -> Result<OnlineDisclaimer, DisclaimerError> {
        let user = self.auth.confirm_password(user_id, &request.password).await?;
        lifecycle::check_details(&request.details, now.date_naive())?;

        let version = self.published_version().await?;
        let existing = self.repo.list_for_user(user_id).await?;
        lifecycle::check_can_create(&existing, version, now)?;

        let created = self
            .repo
            .insert_online(&NewOnlineDisclaimer {
                user_id,
                date: now,
                date_updated: None,
                version,
                details: request.details,
            })
            .await?;

        self.cache.invalidate(user_id).await;
        tracing::info!("Online disclaimer {} created for user {}", created.id, user_id);
        self.activity
            .log(format!(
                "Online disclaimer created: {} - {}",
                user.username,
                display_date(created.date)
            ))
            .await;
        Ok(created)
    }

    /// Studioadmin edit; the staff member's password must be re-entered
    pub async fn update(
        &self,
        staff_id: i32,
        disclaimer_id: i32,
        request: UpdateDisclaimerRequest,
        now: DateTime<Utc>,
    ) -> Result<OnlineDisclaimer, DisclaimerError> {
        let staff = self.auth.confirm_password(staff_id, &request.password).await?;
        lifecycle::check_details(&request.details, now.date_naive())?;

        let mut disclaimer = self
            .repo
            .find_online(disclaimer_id)
            .await?
            .ok_or(DisclaimerError::NotFound(disclaimer_id))?;
        disclaimer.details = request.details;
        disclaimer.date_updated = Some(now);

        let version = self.content.current_disclaimer_version().await?;
        let existing = self.repo.list_for_user(disclaimer.user_id).await?;
        lifecycle::check_can_update(&existing, &disclaimer, version, now)?;

        let updated = self.repo.update_online(&disclaimer, version).await?;
        self.cache.invalidate(updated.user_id).await;
        self.activity
            .log(format!(
                "Online disclaimer {} for user {} updated by admin user {}",
                updated.id, updated.user_id, staff.username
            ))
            .await;
        Ok(updated)
    }

    /// Delete an online disclaimer, archiving it while inside the retention period
    pub async fn delete_online(
        &self,
        disclaimer_id: i32,
        now: DateTime<Utc>,
    ) -> Result<DeleteDisclaimerResponse, DisclaimerError> {
        let disclaimer = self
            .repo
            .find_online(disclaimer_id)
            .await?
            .ok_or(DisclaimerError::NotFound(disclaimer_id))?;

        let archive = self
            .delete_policy
            .should_archive(&disclaimer, now)
            .then(|| lifecycle::archive_online(&disclaimer, now));
        let deleted = self.repo.delete_online(disclaimer_id, archive.as_ref()).await?;
        self.cache.invalidate(disclaimer.user_id).await;

        let archived = deleted && archive.is_some();
        if deleted {
            self.activity
                .log(format!(
                    "Online disclaimer {} for user {} deleted{}",
                    disclaimer_id,
                    disclaimer.user_id,
                    if archived { " and archived" } else { "" }
                ))
                .await;
        }
        Ok(DeleteDisclaimerResponse { deleted, archived })
    }

    /// Disclaimer for one event, signed without an account
    pub async fn create_non_registered(
        &self,
        request: NonRegisteredDisclaimerRequest,
        now: DateTime<Utc>,
    ) -> Result<NonRegisteredDisclaimer, DisclaimerError> {
        lifecycle::check_confirm_name(&request.first_name, &request.last_name, &request.confirm_name)?;
        lifecycle::check_details(&request.details, now.date_naive())?;
        let version = self.published_version().await?;

        let created = self
            .repo
            .insert_non_registered(&NewNonRegisteredDisclaimer {
                first_name: request.first_name,
                last_name: request.last_name,
                email: request.email,
                event_date: request.event_date,
                user_uuid: Uuid::new_v4(),
                date: now,
                version,
                details: request.details,
            })
            .await?;
        self.activity
            .log(format!(
                "Disclaimer created for non-registered user {} {} for event on {}",
                created.first_name,
                created.last_name,
                created.event_date.format("%d %b %Y")
            ))
            .await;
        Ok(created)
    }

    pub async fn delete_non_registered(
        &self,
        disclaimer_id: i32,
        now: DateTime<Utc>,
    ) -> Result<DeleteDisclaimerResponse, DisclaimerError> {
        let disclaimer = self
            .repo
            .find_non_registered(disclaimer_id)
            .await?
            .ok_or(DisclaimerError::NotFound(disclaimer_id))?;

        let archive = self
            .delete_policy
            .should_archive(&disclaimer, now)
            .then(|| lifecycle::archive_non_registered(&disclaimer, now));
        let deleted = self
            .repo
            .delete_non_registered(disclaimer_id, archive.as_ref())
            .await?;
        let archived = deleted && archive.is_some();
        if deleted {
            self.activity
                .log(format!(
                    "Non-registered disclaimer {} ({} {}) deleted{}",
                    disclaimer_id,
                    disclaimer.first_name,
                    disclaimer.last_name,
                    if archived { " and archived" } else { "" }
                ))
                .await;
        }
        Ok(DeleteDisclaimerResponse { deleted, archived })
    }

    /// Record a paper disclaimer handed in at the studio
    pub async fn record_print(&self, user_id: i32, now: DateTime<Utc>) -> Result<PrintDisclaimer, DisclaimerError> {
        let user = self.auth.get_user(user_id).await?;
        let created = self.repo.insert_print(user_id, now).await?;
        self.cache.invalidate(user_id).await;
        self.activity
            .log(format!(
                "Print disclaimer recorded: {} - {}",
                user.username,
                display_date(created.date)
            ))
            .await;
        Ok(created)
    }

    pub async fn list_archived(&self) -> Result<Vec<ArchivedDisclaimer>, DisclaimerError> {
        Ok(self.repo.list_archived().await?)
    }

    async fn user_name(&self, user_id: i32) -> String {
        match self.auth.get_user(user_id).await {
            Ok(user) => user.full_name(),
            Err(e) => {
                tracing::warn!("Could not load user {} for sweep report: {}", user_id, e);
                format!("user {}", user_id)
            }
        }
    }

    /// Remove disclaimer records past the retention period
    ///
    /// Online and paper disclaimers of users with a paid booking for an event
    /// within the last year are kept whatever their age.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport, DisclaimerError> {
        let policy = self.sweep_policy;
        let recent: HashSet<i32> = self
            .repo
            .users_with_paid_bookings_since(policy.recent_booking_cutoff(now))
            .await?
            .into_iter()
            .collect();

        let online: Vec<OnlineDisclaimer> = self
            .repo
            .list_online()
            .await?
            .into_iter()
            .filter(|d| policy.should_delete(d, recent.contains(&d.user_id), now))
            .collect();
        let print: Vec<PrintDisclaimer> = self
            .repo
            .list_print()
            .await?
            .into_iter()
            .filter(|d| policy.should_delete(d, recent.contains(&d.user_id), now))
            .collect();
        let non_registered: Vec<i32> = self
            .repo
            .list_non_registered()
            .await?
            .iter()
            .filter(|d| policy.is_expired(*d, now))
            .map(|d| d.id)
            .collect();
        let archived: Vec<i32> = self
            .repo
            .list_archived()
            .await?
            .iter()
            .filter(|d| policy.is_expired(*d, now))
            .map(|d| d.id)
            .collect();

        let selection = SweepSelection {
            online_ids: online.iter().map(|d| d.id).collect(),
            print_ids: print.iter().map(|d| d.id).collect(),
            non_registered_ids: non_registered,
            archived_ids: archived,
        };
        if selection.is_empty() {
            self.activity
                .log("Delete disclaimers job run; no expired disclaimers")
                .await;
            return Ok(SweepReport::default());
        }

        self.repo.delete_swept(&selection).await?;

        let mut report = SweepReport {
            non_registered: selection.non_registered_ids.len(),
            archived: selection.archived_ids.len(),
            ..Default::default()
        };
        for disclaimer in &online {
            self.cache.invalidate(disclaimer.user_id).await;
            report.online_users.push(self.user_name(disclaimer.user_id).await);
        }
        for disclaimer in &print {
            self.cache.invalidate(disclaimer.user_id).await;
            report.print_users.push(self.user_name(disclaimer.user_id).await);
        }

        tracing::info!(
            online = report.online_users.len(),
            print = report.print_users.len(),
            non_registered = report.non_registered,
            archived = report.archived,
            "Expired disclaimers deleted"
        );
        self.activity
            .log(format!(
                "Online disclaimers deleted for expired users: {}",
                report.online_users.join(", ")
            ))
            .await;
        self.activity
            .log(format!(
                "Print disclaimers deleted for expired users: {}",
                report.print_users.join(", ")
            ))
            .await;
        self.activity
            .log(format!(
                "{} non-registered and {} archived disclaimers deleted",
                report.non_registered, report.archived
            ))
            .await;
        Ok(report)
    }
}
