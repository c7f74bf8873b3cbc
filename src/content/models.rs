// Versioned content models and DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;
use validator::Validate;

/// One version of the disclaimer terms users sign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct DisclaimerContent {
    #[schema(value_type = String, example = "2.0")]
    pub version: Decimal,
    pub disclaimer_terms: String,
    pub medical_treatment_terms: String,
    pub over_18_statement: String,
    pub is_draft: bool,
    pub issue_date: DateTime<Utc>,
}

impl DisclaimerContent {
    pub fn terms(&self) -> DisclaimerTerms {
        DisclaimerTerms {
            disclaimer_terms: self.disclaimer_terms.clone(),
            medical_treatment_terms: self.medical_treatment_terms.clone(),
            over_18_statement: self.over_18_statement.clone(),
        }
    }
}

/// The three text fields that make up disclaimer content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DisclaimerTerms {
    pub disclaimer_terms: String,
    pub medical_treatment_terms: String,
    pub over_18_statement: String,
}

/// Studio policy documents versioned the same way as disclaimer content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    DataPrivacy,
    Cookie,
}

impl PolicyKind {
    /// Value stored in the `kind` column
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::DataPrivacy => "data_privacy",
            PolicyKind::Cookie => "cookie",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::DataPrivacy => write!(f, "Data Privacy Policy"),
            PolicyKind::Cookie => write!(f, "Cookie Policy"),
        }
    }
}

/// One version of a policy document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct PolicyDocument {
    #[schema(value_type = String, example = "1.0")]
    pub version: Decimal,
    pub content: String,
    pub issue_date: DateTime<Utc>,
}

/// Request to create a new disclaimer content version
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateDisclaimerContentRequest {
    /// Omit to use the next whole version number
    #[schema(value_type = Option<String>)]
    pub version: Option<Decimal>,
    #[validate(length(min = 1, message = "Disclaimer terms are required"))]
    pub disclaimer_terms: String,
    #[validate(length(min = 1, message = "Medical treatment terms are required"))]
    pub medical_treatment_terms: String,
    #[validate(length(min = 1, message = "Over 18 statement is required"))]
    pub over_18_statement: String,
    #[serde(default)]
    pub is_draft: bool,
}

/// Request to edit (and optionally publish) a draft version
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateDisclaimerContentRequest {
    #[validate(length(min = 1))]
    pub disclaimer_terms: Option<String>,
    #[validate(length(min = 1))]
    pub medical_treatment_terms: Option<String>,
    #[validate(length(min = 1))]
    pub over_18_statement: Option<String>,
    /// true publishes the draft
    #[serde(default)]
    pub publish: bool,
}

/// Request to create a new policy version
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePolicyRequest {
    #[schema(value_type = Option<String>)]
    pub version: Option<Decimal>,
    #[validate(length(min = 1, message = "Policy content is required"))]
    pub content: String,
}

/// Response for current-version lookups
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CurrentVersionResponse {
    #[schema(value_type = String)]
    pub version: Decimal,
}
