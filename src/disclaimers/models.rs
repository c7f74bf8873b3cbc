// Disclaimer models and DTOs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Personal and medical answers shared by every disclaimer kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Validate, ToSchema)]
pub struct DisclaimerDetails {
    /// Full name as stated on the disclaimer
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    pub dob: NaiveDate,
    #[validate(length(min = 1, max = 512, message = "Address is required"))]
    pub address: String,
    #[validate(custom = "crate::validation::validate_postcode")]
    pub postcode: String,
    pub home_phone: Option<String>,
    #[validate(custom = "crate::validation::validate_phone")]
    pub mobile_phone: String,
    #[validate(length(min = 1, max = 255))]
    pub emergency_contact1_name: String,
    #[validate(length(min = 1, max = 255))]
    pub emergency_contact1_relationship: String,
    #[validate(custom = "crate::validation::validate_phone")]
    pub emergency_contact1_phone: String,
    #[validate(length(min = 1, max = 255))]
    pub emergency_contact2_name: String,
    #[validate(length(min = 1, max = 255))]
    pub emergency_contact2_relationship: String,
    #[validate(custom = "crate::validation::validate_phone")]
    pub emergency_contact2_phone: String,
    pub medical_conditions: bool,
    #[validate(length(max = 2048))]
    pub medical_conditions_details: Option<String>,
    pub joint_problems: bool,
    #[validate(length(max = 2048))]
    pub joint_problems_details: Option<String>,
    pub allergies: bool,
    #[validate(length(max = 2048))]
    pub allergies_details: Option<String>,
    pub medical_treatment_permission: bool,
    pub terms_accepted: bool,
    pub age_over_18_confirmed: bool,
}

/// Disclaimer signed online by a registered user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct OnlineDisclaimer {
    pub id: i32,
    pub user_id: i32,
    pub date: DateTime<Utc>,
    pub date_updated: Option<DateTime<Utc>>,
    #[schema(value_type = String, example = "2.0")]
    pub version: Decimal,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub details: DisclaimerDetails,
}

/// Paper disclaimer recorded by staff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PrintDisclaimer {
    pub id: i32,
    pub user_id: i32,
    pub date: DateTime<Utc>,
}

/// Disclaimer signed for a single event by someone without an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct NonRegisteredDisclaimer {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub event_date: NaiveDate,
    pub user_uuid: Uuid,
    pub date: DateTime<Utc>,
    #[schema(value_type = String, example = "2.0")]
    pub version: Decimal,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub details: DisclaimerDetails,
}

/// Snapshot kept when a disclaimer inside the retention period is deleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ArchivedDisclaimer {
    pub id: i32,
    pub date: DateTime<Utc>,
    pub date_updated: Option<DateTime<Utc>>,
    pub date_archived: DateTime<Utc>,
    pub event_date: Option<NaiveDate>,
    #[schema(value_type = String, example = "2.0")]
    pub version: Decimal,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub details: DisclaimerDetails,
}

/// Insert payload for an online disclaimer
#[derive(Debug, Clone)]
pub struct NewOnlineDisclaimer {
    pub user_id: i32,
    pub date: DateTime<Utc>,
    pub date_updated: Option<DateTime<Utc>>,
    pub version: Decimal,
    pub details: DisclaimerDetails,
}

/// Insert payload for a non-registered disclaimer
#[derive(Debug, Clone)]
pub struct NewNonRegisteredDisclaimer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub event_date: NaiveDate,
    pub user_uuid: Uuid,
    pub date: DateTime<Utc>,
    pub version: Decimal,
    pub details: DisclaimerDetails,
}

/// Insert payload for an archive snapshot
#[derive(Debug, Clone)]
pub struct NewArchivedDisclaimer {
    pub date: DateTime<Utc>,
    pub date_updated: Option<DateTime<Utc>>,
    pub date_archived: DateTime<Utc>,
    pub event_date: Option<NaiveDate>,
    pub version: Decimal,
    pub details: DisclaimerDetails,
}

/// Rows removed in one pass of the expiry sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepSelection {
    pub online_ids: Vec<i32>,
    pub print_ids: Vec<i32>,
    pub non_registered_ids: Vec<i32>,
    pub archived_ids: Vec<i32>,
}

impl SweepSelection {
    pub fn is_empty(&self) -> bool {
        self.online_ids.is_empty()
            && self.print_ids.is_empty()
            && self.non_registered_ids.is_empty()
            && self.archived_ids.is_empty()
    }
}

/// Self-service disclaimer submission
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SignDisclaimerRequest {
    /// The signing user's own password
    #[validate(length(min = 1, message = "Please enter your password to submit your data"))]
    pub password: String,
    #[serde(flatten)]
    #[validate]
    pub details: DisclaimerDetails,
}

/// Studioadmin edit of a user's disclaimer
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateDisclaimerRequest {
    /// The staff member's password
    #[validate(length(min = 1, message = "Please re-enter your password to confirm"))]
    pub password: String,
    #[serde(flatten)]
    #[validate]
    pub details: DisclaimerDetails,
}

/// Disclaimer submitted for a single event without an account
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NonRegisteredDisclaimerRequest {
    #[validate(length(min = 1, max = 255, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 255, message = "Last name is required"))]
    pub last_name: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    pub event_date: NaiveDate,
    /// Must repeat "first last" exactly
    pub confirm_name: String,
    #[serde(flatten)]
    #[validate]
    pub details: DisclaimerDetails,
}

/// Staff record of a paper disclaimer
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PrintDisclaimerRequest {
    pub user_id: i32,
}

/// Disclaimer state for the signed-in user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DisclaimerStatusResponse {
    pub has_active_disclaimer: bool,
    pub has_expired_disclaimer: bool,
    #[schema(value_type = String)]
    pub current_version: Decimal,
}

/// Outcome of a disclaimer deletion
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteDisclaimerResponse {
    pub deleted: bool,
    pub archived: bool,
}
