// Mailing-list provider API client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::MailchimpConfig;
use crate::mailing_list::error::MailingListError;
use crate::mailing_list::models::{MemberUpdate, ProviderMember};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[async_trait]
pub trait MailingListClient: Send + Sync {
    /// Create or update members in one batch
    async fn update_members(&self, members: &[MemberUpdate]) -> Result<(), MailingListError>;

    /// Every member of the list with their status
    async fn list_members(&self) -> Result<Vec<ProviderMember>, MailingListError>;
}

#[derive(Serialize)]
struct BatchUpdate<'a> {
    members: &'a [MemberUpdate],
    update_existing: bool,
}

#[derive(Deserialize)]
struct MembersPage {
    members: Vec<ProviderMember>,
    total_items: Option<usize>,
}

pub struct MailchimpClient {
    client: Client,
    config: MailchimpConfig,
}

impl MailchimpClient {
    pub fn new(config: MailchimpConfig) -> Result<Self, MailingListError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, MailingListError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(MailingListError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl MailingListClient for MailchimpClient {
    async fn update_members(&self, members: &[MemberUpdate]) -> Result<(), MailingListError> {
        let response = self
            .client
            .post(self.config.list_url())
            .basic_auth("studio", Some(&self.config.api_key))
            .json(&BatchUpdate {
                members,
                update_existing: true,
            })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list_members(&self) -> Result<Vec<ProviderMember>, MailingListError> {
        const PAGE_SIZE: usize = 1000;
        let mut members = Vec::new();
        loop {
            let response = self
                .client
                .get(self.config.members_url())
                .basic_auth("studio", Some(&self.config.api_key))
                .query(&[
                    ("fields", "members.email_address,members.status,total_items".to_string()),
                    ("count", PAGE_SIZE.to_string()),
                    ("offset", members.len().to_string()),
                ])
                .send()
                .await?;
            let page: MembersPage = Self::check(response).await?.json().await?;
            let fetched = page.members.len();
            members.extend(page.members);

            let total = page.total_items.unwrap_or(members.len());
            if fetched < PAGE_SIZE || members.len() >= total {
                break;
            }
        }
        tracing::debug!("Fetched {} mailing list members", members.len());
        Ok(members)
    }
}

/// Client that records calls instead of sending them
#[cfg(test)]
#[derive(Default)]
pub struct RecordingClient {
    pub updates: tokio::sync::Mutex<Vec<Vec<MemberUpdate>>>,
    pub members: Vec<ProviderMember>,
    pub fail: bool,
}

#[cfg(test)]
#[async_trait]
impl MailingListClient for RecordingClient {
    async fn update_members(&self, members: &[MemberUpdate]) -> Result<(), MailingListError> {
        if self.fail {
            return Err(MailingListError::Api {
                status: 500,
                body: "unavailable".into(),
            });
        }
        self.updates.lock().await.push(members.to_vec());
        Ok(())
    }

    async fn list_members(&self) -> Result<Vec<ProviderMember>, MailingListError> {
        Ok(self.members.clone())
    }
}
