// Disclaimer lifecycle rules
//
// A disclaimer is active while it was signed (or last updated) within the
// validity window and against the current published content version. Two
// retention policies govern removal: the delete policy decides whether a
// deleted disclaimer is archived, the sweep policy decides which rows the
// scheduled job removes. They are deliberately kept separate.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::disclaimers::error::DisclaimerError;
use crate::disclaimers::models::{
    ArchivedDisclaimer, DisclaimerDetails, NewArchivedDisclaimer, NonRegisteredDisclaimer,
    OnlineDisclaimer, PrintDisclaimer,
};

/// Days a signed disclaimer stays valid
pub const VALIDITY_DAYS: i64 = 365;

/// Retention period for disclaimer records (6 years)
pub const RETENTION_DAYS: i64 = 6 * 365;

/// Window in which a paid booking exempts a user from the expiry sweep
pub const RECENT_BOOKING_DAYS: i64 = 365;

/// Anything with a signing date and a content version
pub trait Signed {
    fn date(&self) -> DateTime<Utc>;

    fn date_updated(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn version(&self) -> Option<Decimal>;

    /// Latest of creation and update
    fn signed_at(&self) -> DateTime<Utc> {
        self.date_updated().unwrap_or_else(|| self.date())
    }
}

impl Signed for OnlineDisclaimer {
    fn date(&self) -> DateTime<Utc> {
        self.date
    }

    fn date_updated(&self) -> Option<DateTime<Utc>> {
        self.date_updated
    }

    fn version(&self) -> Option<Decimal> {
        Some(self.version)
    }
}

impl Signed for NonRegisteredDisclaimer {
    fn date(&self) -> DateTime<Utc> {
        self.date
    }

    fn version(&self) -> Option<Decimal> {
        Some(self.version)
    }
}

impl Signed for ArchivedDisclaimer {
    fn date(&self) -> DateTime<Utc> {
        self.date
    }

    fn date_updated(&self) -> Option<DateTime<Utc>> {
        self.date_updated
    }

    fn version(&self) -> Option<Decimal> {
        Some(self.version)
    }
}

/// Paper disclaimers carry no content version
impl Signed for PrintDisclaimer {
    fn date(&self) -> DateTime<Utc> {
        self.date
    }

    fn version(&self) -> Option<Decimal> {
        None
    }
}

/// True when `disclaimer` is within the validity window and signed against `current_version`
pub fn is_active<D: Signed>(disclaimer: &D, current_version: Decimal, now: DateTime<Utc>) -> bool {
    disclaimer.signed_at() + Duration::days(VALIDITY_DAYS) > now
        && disclaimer.version() == Some(current_version)
}

/// Fails when the user already holds an active online disclaimer
pub fn check_can_create(
    existing: &[OnlineDisclaimer],
    current_version: Decimal,
    now: DateTime<Utc>,
) -> Result<(), DisclaimerError> {
    if existing.iter().any(|d| is_active(d, current_version, now)) {
        return Err(DisclaimerError::ActiveDisclaimerExists);
    }
    Ok(())
}

/// Fails when saving `edited` would leave the user with two active online disclaimers
pub fn check_can_update(
    existing: &[OnlineDisclaimer],
    edited: &OnlineDisclaimer,
    current_version: Decimal,
    now: DateTime<Utc>,
) -> Result<(), DisclaimerError> {
    if !is_active(edited, current_version, now) {
        return Ok(());
    }
    let others: Vec<OnlineDisclaimer> =
        existing.iter().filter(|d| d.id != edited.id).cloned().collect();
    check_can_create(&others, current_version, now)
}

/// Whole years between `dob` and `today`
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }
    age
}

fn missing(details: &Option<String>) -> bool {
    details.as_deref().map_or(true, |d| d.trim().is_empty())
}

/// Cross-field checks on disclaimer answers
pub fn check_details(details: &DisclaimerDetails, today: NaiveDate) -> Result<(), DisclaimerError> {
    if details.medical_conditions && missing(&details.medical_conditions_details) {
        return Err(DisclaimerError::InvalidDetails(
            "Please provide details of medical conditions".into(),
        ));
    }
    if details.joint_problems && missing(&details.joint_problems_details) {
        return Err(DisclaimerError::InvalidDetails(
            "Please provide details of knee/back/shoulder/ankle/hip/neck problems".into(),
        ));
    }
    if details.allergies && missing(&details.allergies_details) {
        return Err(DisclaimerError::InvalidDetails(
            "Please provide details of allergies".into(),
        ));
    }
    if age_on(details.dob, today) < 18 {
        return Err(DisclaimerError::InvalidDetails(
            "You must be over 18 years in order to register".into(),
        ));
    }
    if !(details.terms_accepted
        && details.medical_treatment_permission
        && details.age_over_18_confirmed)
    {
        return Err(DisclaimerError::InvalidDetails(
            "You must check this box to continue".into(),
        ));
    }
    Ok(())
}

/// Non-registered signers confirm by typing their name exactly
pub fn check_confirm_name(first_name: &str, last_name: &str, confirm_name: &str) -> Result<(), DisclaimerError> {
    if confirm_name.trim() != format!("{} {}", first_name.trim(), last_name.trim()) {
        return Err(DisclaimerError::InvalidDetails(
            "Please enter your first and last name exactly as on the form (case sensitive) to confirm."
                .into(),
        ));
    }
    Ok(())
}

/// Retention rule applied when a single disclaimer is deleted
#[derive(Debug, Clone, Copy)]
pub struct DeleteRetentionPolicy {
    pub retention: Duration,
}

impl Default for DeleteRetentionPolicy {
    fn default() -> Self {
        Self {
            retention: Duration::days(RETENTION_DAYS),
        }
    }
}

impl DeleteRetentionPolicy {
    /// Archive when the disclaimer was signed or updated inside the retention period
    pub fn should_archive<D: Signed>(&self, disclaimer: &D, now: DateTime<Utc>) -> bool {
        disclaimer.signed_at() > now - self.retention
    }
}

/// Retention rule applied by the scheduled expiry sweep
#[derive(Debug, Clone, Copy)]
pub struct SweepRetentionPolicy {
    pub retention: Duration,
    pub recent_booking_window: Duration,
}

impl Default for SweepRetentionPolicy {
    fn default() -> Self {
        Self {
            retention: Duration::days(RETENTION_DAYS),
            recent_booking_window: Duration::days(RECENT_BOOKING_DAYS),
        }
    }
}

impl SweepRetentionPolicy {
    /// Events after this instant count as recent bookings
    pub fn recent_booking_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.recent_booking_window
    }

    /// True when the record is older than the retention period
    pub fn is_expired<D: Signed>(&self, disclaimer: &D, now: DateTime<Utc>) -> bool {
        disclaimer.signed_at() < now - self.retention
    }

    /// A recent paid booking keeps an expired user-owned disclaimer
    pub fn should_delete<D: Signed>(
        &self,
        disclaimer: &D,
        has_recent_paid_booking: bool,
        now: DateTime<Utc>,
    ) -> bool {
        !has_recent_paid_booking && self.is_expired(disclaimer, now)
    }
}

/// Archive snapshot of an online disclaimer
pub fn archive_online(disclaimer: &OnlineDisclaimer, now: DateTime<Utc>) -> NewArchivedDisclaimer {
    NewArchivedDisclaimer {
        date: disclaimer.date,
        date_updated: disclaimer.date_updated,
        date_archived: now,
        event_date: None,
        version: disclaimer.version,
        details: disclaimer.details.clone(),
    }
}

/// Archive snapshot of a non-registered disclaimer; keeps the event date
pub fn archive_non_registered(
    disclaimer: &NonRegisteredDisclaimer,
    now: DateTime<Utc>,
) -> NewArchivedDisclaimer {
    NewArchivedDisclaimer {
        date: disclaimer.date,
        date_updated: None,
        date_archived: now,
        event_date: Some(disclaimer.event_date),
        version: disclaimer.version,
        details: disclaimer.details.clone(),
    }
}
