// Mailing-list data models

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::User;

/// Local group holding the users subscribed to the mailing list
pub const SUBSCRIBED_GROUP: &str = "subscribed";

/// Subscriber as listed by `GET /api/mailing-list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MailingListMember {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<User> for MailingListMember {
    fn from(user: User) -> Self {
        Self {
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Subscribed,
    Unsubscribed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeFields {
    #[serde(rename = "FNAME")]
    pub first_name: String,
    #[serde(rename = "LNAME")]
    pub last_name: String,
}

/// One member in a batch update sent to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberUpdate {
    pub email_address: String,
    pub status: MemberStatus,
    pub status_if_new: MemberStatus,
    pub merge_fields: MergeFields,
}

impl MemberUpdate {
    pub fn new(email: &str, status: MemberStatus, user: &User) -> Self {
        Self {
            email_address: email.to_string(),
            status,
            status_if_new: status,
            merge_fields: MergeFields {
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
            },
        }
    }
}

/// Member as returned by the provider's list endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderMember {
    pub email_address: String,
    pub status: String,
}

/// Change to push to the provider for one user
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    Subscribe,
    Unsubscribe,
    UpdateProfile,
    /// The provider cannot rename an address: the old one is unsubscribed first
    UpdateEmail { old_email: String },
}

/// Form-encoded webhook body sent by the provider
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct WebhookPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "data[list_id]")]
    pub list_id: String,
    #[serde(rename = "data[email]")]
    pub email: Option<String>,
    #[serde(rename = "data[old_email]")]
    pub old_email: Option<String>,
    #[serde(rename = "data[new_email]")]
    pub new_email: Option<String>,
    #[serde(rename = "data[merges][FNAME]")]
    pub first_name: Option<String>,
    #[serde(rename = "data[merges][LNAME]")]
    pub last_name: Option<String>,
}

/// Webhook event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAction {
    Subscribe,
    Unsubscribe,
    Profile,
    UpEmail,
}

impl WebhookAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "subscribe" => Some(WebhookAction::Subscribe),
            "unsubscribe" => Some(WebhookAction::Unsubscribe),
            "profile" => Some(WebhookAction::Profile),
            "upemail" => Some(WebhookAction::UpEmail),
            _ => None,
        }
    }
}

/// Result of the `create_mailing_list` command
#[derive(Debug, Clone, PartialEq)]
pub enum MailingListSetup {
    Created { users_added: usize },
    AlreadyExists,
}
