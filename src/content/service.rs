// Content service - business logic for versioned documents

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::activity_log::ActivityLogger;
use crate::content::{
    error::ContentError,
    models::{
        CreateDisclaimerContentRequest, CreatePolicyRequest, DisclaimerContent, DisclaimerTerms,
        PolicyDocument, PolicyKind, UpdateDisclaimerContentRequest,
    },
    repository::ContentRepository,
    versioning::{self, Versioned},
};

pub struct ContentService {
    repo: Arc<dyn ContentRepository>,
    activity: ActivityLogger,
}

impl ContentService {
    pub fn new(repo: Arc<dyn ContentRepository>, activity: ActivityLogger) -> Self {
        Self { repo, activity }
    }

    /// Highest published disclaimer version (0 when none is published)
    pub async fn current_disclaimer_version(&self) -> Result<Decimal, ContentError> {
        Ok(self.repo.current_disclaimer_version().await?)
    }

    /// The published disclaimer content for the current version
    pub async fn current_disclaimer_content(&self) -> Result<Option<DisclaimerContent>, ContentError> {
        let version = self.current_disclaimer_version().await?;
        if version == Decimal::ZERO {
            return Ok(None);
        }
        Ok(self.repo.find_disclaimer_content(version).await?)
    }

    pub async fn list_disclaimer_content(&self) -> Result<Vec<DisclaimerContent>, ContentError> {
        Ok(self.repo.list_disclaimer_content().await?)
    }

    pub async fn get_disclaimer_content(&self, version: Decimal) -> Result<DisclaimerContent, ContentError> {
        self.repo
            .find_disclaimer_content(version)
            .await?
            .ok_or(ContentError::VersionNotFound(version))
    }

    /// Create a new disclaimer content version
    ///
    /// This method:
    /// 1. Loads the latest version (drafts included)
    /// 2. Assigns the next whole version when none is given
    /// 3. Rejects non-increasing versions and unchanged content
    /// 4. Stores the row and records the activity
    pub async fn create_disclaimer_content(
        &self,
        request: CreateDisclaimerContentRequest,
    ) -> Result<DisclaimerContent, ContentError> {
        let latest = self.repo.latest_disclaimer_content().await?;
        let version = request
            .version
            .unwrap_or_else(|| versioning::next_version(latest.as_ref().map(|c| c.version)));

        let candidate = DisclaimerContent {
            version,
            disclaimer_terms: request.disclaimer_terms,
            medical_treatment_terms: request.medical_treatment_terms,
            over_18_statement: request.over_18_statement,
            is_draft: request.is_draft,
            issue_date: Utc::now(),
        };
        versioning::check_new_version(&candidate, latest.as_ref())?;

        let created = self.repo.insert_disclaimer_content(&candidate).await?;
        self.activity
            .log(format!(
                "Disclaimer content version {} created ({})",
                created.version,
                if created.is_draft { "draft" } else { "published" }
            ))
            .await;
        Ok(created)
    }

    /// Edit a draft version, optionally publishing it
    pub async fn update_disclaimer_content(
        &self,
        version: Decimal,
        request: UpdateDisclaimerContentRequest,
    ) -> Result<DisclaimerContent, ContentError> {
        let rows = self.repo.list_disclaimer_content().await?;
        let existing = rows
            .iter()
            .find(|c| c.version == version)
            .ok_or(ContentError::VersionNotFound(version))?;
        let previous = rows
            .iter()
            .filter(|c| c.version < version)
            .max_by(|a, b| a.version.cmp(&b.version));

        let updated = versioning::apply_disclaimer_update(existing, &request, previous, Utc::now())?;
        if existing.is_published() {
            return Ok(updated);
        }

        let saved = self
            .repo
            .update_disclaimer_draft(&updated)
            .await?
            .ok_or(ContentError::ReadOnly("is_draft"))?;

        if saved.is_published() {
            tracing::info!("Disclaimer content version {} published", saved.version);
            self.activity
                .log(format!("Disclaimer content version {} published", saved.version))
                .await;
        }
        Ok(saved)
    }

    /// Look up a version for imported data, creating it from the backup's terms if absent
    ///
    /// Imports restore history, so the increment and no-change rules do not apply.
    pub async fn ensure_disclaimer_version(
        &self,
        version: Decimal,
        terms: DisclaimerTerms,
    ) -> Result<DisclaimerContent, ContentError> {
        if let Some(existing) = self.repo.find_disclaimer_content(version).await? {
            return Ok(existing);
        }
        if version <= Decimal::ZERO {
            return Err(ContentError::InvalidVersion(version));
        }
        let created = self
            .repo
            .insert_disclaimer_content(&DisclaimerContent {
                version,
                disclaimer_terms: terms.disclaimer_terms,
                medical_treatment_terms: terms.medical_treatment_terms,
                over_18_statement: terms.over_18_statement,
                is_draft: false,
                issue_date: Utc::now(),
            })
            .await?;
        self.activity
            .log(format!(
                "Disclaimer content version {} created from backup data",
                created.version
            ))
            .await;
        Ok(created)
    }

    pub async fn list_policies(&self, kind: PolicyKind) -> Result<Vec<PolicyDocument>, ContentError> {
        Ok(self.repo.list_policies(kind).await?)
    }

    /// The current version of a policy, if any
    pub async fn current_policy(&self, kind: PolicyKind) -> Result<Option<PolicyDocument>, ContentError> {
        let rows = self.repo.list_policies(kind).await?;
        Ok(versioning::current(&rows).cloned())
    }

    /// Create a new policy version (policies are published on creation)
    pub async fn create_policy(
        &self,
        kind: PolicyKind,
        request: CreatePolicyRequest,
    ) -> Result<PolicyDocument, ContentError> {
        let rows = self.repo.list_policies(kind).await?;
        let latest = versioning::latest(&rows);
        let version = request
            .version
            .unwrap_or_else(|| versioning::next_version(latest.map(|p| p.version)));

        let candidate = PolicyDocument {
            version,
            content: request.content,
            issue_date: Utc::now(),
        };
        versioning::check_new_version(&candidate, latest)?;

        let created = self.repo.insert_policy(kind, &candidate).await?;
        self.activity
            .log(format!("{} - Version {} created", kind, created.version))
            .await;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use rust_decimal_macros::dec;

    fn service() -> (ContentService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = ContentService::new(store.clone(), ActivityLogger::new(store.clone()));
        (service, store)
    }

    fn create_request(terms: &str, is_draft: bool) -> CreateDisclaimerContentRequest {
        CreateDisclaimerContentRequest {
            version: None,
            disclaimer_terms: terms.to_string(),
            medical_treatment_terms: "I consent to treatment".to_string(),
            over_18_statement: "I am over 18".to_string(),
            is_draft,
        }
    }

    #[tokio::test]
    async fn test_versions_assigned_in_sequence() {
        let (service, _) = service();
        assert_eq!(service.current_disclaimer_version().await.unwrap(), Decimal::ZERO);

        let first = service.create_disclaimer_content(create_request("v1", false)).await.unwrap();
        let second = service.create_disclaimer_content(create_request("v2", false)).await.unwrap();

        assert_eq!(first.version, dec!(1));
        assert_eq!(second.version, dec!(2));
        assert_eq!(service.current_disclaimer_version().await.unwrap(), dec!(2));
    }

    #[tokio::test]
    async fn test_identical_publish_rejected() {
        let (service, _) = service();
        service.create_disclaimer_content(create_request("same", false)).await.unwrap();
        let result = service.create_disclaimer_content(create_request("same", false)).await;
        assert!(matches!(result, Err(ContentError::NoChanges(_))));
    }

    #[tokio::test]
    async fn test_draft_not_current_until_published() {
        let (service, _) = service();
        service.create_disclaimer_content(create_request("v1", false)).await.unwrap();
        let draft = service.create_disclaimer_content(create_request("v2", true)).await.unwrap();
        assert_eq!(service.current_disclaimer_version().await.unwrap(), dec!(1));

        let published = service
            .update_disclaimer_content(
                draft.version,
                UpdateDisclaimerContentRequest {
                    publish: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!published.is_draft);
        assert_eq!(service.current_disclaimer_version().await.unwrap(), dec!(2));
    }

    #[tokio::test]
    async fn test_published_content_cannot_change() {
        let (service, _) = service();
        let published = service.create_disclaimer_content(create_request("v1", false)).await.unwrap();
        let result = service
            .update_disclaimer_content(
                published.version,
                UpdateDisclaimerContentRequest {
                    over_18_statement: Some("changed".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(ContentError::ReadOnly("over_18_statement"))));
    }

    #[tokio::test]
    async fn test_ensure_version_creates_historical_row_once() {
        let (service, _) = service();
        service.create_disclaimer_content(create_request("v3", false)).await.unwrap();
        let terms = DisclaimerTerms {
            disclaimer_terms: "old".into(),
            medical_treatment_terms: "old medical".into(),
            over_18_statement: "old 18".into(),
        };
        let restored = service.ensure_disclaimer_version(dec!(0.5), terms.clone()).await.unwrap();
        assert_eq!(restored.version, dec!(0.5));
        let again = service.ensure_disclaimer_version(dec!(0.5), terms).await.unwrap();
        assert_eq!(again, restored);
        // historical rows do not move the current version
        assert_eq!(service.current_disclaimer_version().await.unwrap(), dec!(1));
    }

    #[tokio::test]
    async fn test_policy_versioning() {
        let (service, store) = service();
        assert!(service.current_policy(PolicyKind::Cookie).await.unwrap().is_none());

        service
            .create_policy(PolicyKind::Cookie, CreatePolicyRequest { version: None, content: "Foo".into() })
            .await
            .unwrap();
        service
            .create_policy(
                PolicyKind::Cookie,
                CreatePolicyRequest { version: Some(dec!(2.6)), content: "Foo2".into() },
            )
            .await
            .unwrap();
        let third = service
            .create_policy(PolicyKind::Cookie, CreatePolicyRequest { version: None, content: "Foo3".into() })
            .await
            .unwrap();
        assert_eq!(third.version, dec!(3));

        let duplicate = service
            .create_policy(PolicyKind::Cookie, CreatePolicyRequest { version: None, content: "Foo3".into() })
            .await;
        assert!(matches!(duplicate, Err(ContentError::NoChanges(_))));

        // policies are independent of each other
        assert!(service.current_policy(PolicyKind::DataPrivacy).await.unwrap().is_none());

        let log = store.activity_entries().await;
        assert!(log.iter().any(|l| l == "Cookie Policy - Version 3 created"));
    }
}
