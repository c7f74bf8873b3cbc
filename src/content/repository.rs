// Storage for disclaimer content and policy versions

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::content::models::{DisclaimerContent, PolicyDocument, PolicyKind};
use crate::db::StoreError;

const CONTENT_COLUMNS: &str =
    "version, disclaimer_terms, medical_treatment_terms, over_18_statement, is_draft, issue_date";

#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// All disclaimer content rows, lowest version first
    async fn list_disclaimer_content(&self) -> Result<Vec<DisclaimerContent>, StoreError>;

    async fn find_disclaimer_content(
        &self,
        version: Decimal,
    ) -> Result<Option<DisclaimerContent>, StoreError>;

    /// Highest version, drafts included
    async fn latest_disclaimer_content(&self) -> Result<Option<DisclaimerContent>, StoreError>;

    /// Highest published version, 0 when none
    async fn current_disclaimer_version(&self) -> Result<Decimal, StoreError>;

    async fn insert_disclaimer_content(
        &self,
        content: &DisclaimerContent,
    ) -> Result<DisclaimerContent, StoreError>;

    /// Overwrite a draft row; returns None when the row is missing or already published
    async fn update_disclaimer_draft(
        &self,
        content: &DisclaimerContent,
    ) -> Result<Option<DisclaimerContent>, StoreError>;

    async fn list_policies(&self, kind: PolicyKind) -> Result<Vec<PolicyDocument>, StoreError>;

    async fn insert_policy(
        &self,
        kind: PolicyKind,
        policy: &PolicyDocument,
    ) -> Result<PolicyDocument, StoreError>;
}

pub struct PgContentRepository {
    pool: PgPool,
}

impl PgContentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentRepository for PgContentRepository {
    async fn list_disclaimer_content(&self) -> Result<Vec<DisclaimerContent>, StoreError> {
        let rows = sqlx::query_as::<_, DisclaimerContent>(&format!(
            "SELECT {} FROM disclaimer_content ORDER BY version ASC",
            CONTENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_disclaimer_content(
        &self,
        version: Decimal,
    ) -> Result<Option<DisclaimerContent>, StoreError> {
        let row = sqlx::query_as::<_, DisclaimerContent>(&format!(
            "SELECT {} FROM disclaimer_content WHERE version = $1",
            CONTENT_COLUMNS
        ))
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn latest_disclaimer_content(&self) -> Result<Option<DisclaimerContent>, StoreError> {
        let row = sqlx::query_as::<_, DisclaimerContent>(&format!(
            "SELECT {} FROM disclaimer_content ORDER BY version DESC LIMIT 1",
            CONTENT_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn current_disclaimer_version(&self) -> Result<Decimal, StoreError> {
        let version: Option<Decimal> = sqlx::query_scalar(
            "SELECT MAX(version) FROM disclaimer_content WHERE is_draft = FALSE",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(version.unwrap_or(Decimal::ZERO))
    }

    async fn insert_disclaimer_content(
        &self,
        content: &DisclaimerContent,
    ) -> Result<DisclaimerContent, StoreError> {
        sqlx::query_as::<_, DisclaimerContent>(&format!(
            "INSERT INTO disclaimer_content ({cols}) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {cols}",
            cols = CONTENT_COLUMNS
        ))
        .bind(content.version)
        .bind(&content.disclaimer_terms)
        .bind(&content.medical_treatment_terms)
        .bind(&content.over_18_statement)
        .bind(content.is_draft)
        .bind(content.issue_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_write(e, "disclaimer content version already exists"))
    }

    async fn update_disclaimer_draft(
        &self,
        content: &DisclaimerContent,
    ) -> Result<Option<DisclaimerContent>, StoreError> {
        // The is_draft guard makes published rows unwritable even if a caller skips the checks
        let row = sqlx::query_as::<_, DisclaimerContent>(&format!(
            "UPDATE disclaimer_content \
             SET disclaimer_terms = $2, medical_treatment_terms = $3, over_18_statement = $4, \
                 is_draft = $5, issue_date = $6 \
             WHERE version = $1 AND is_draft = TRUE RETURNING {}",
            CONTENT_COLUMNS
        ))
        .bind(content.version)
        .bind(&content.disclaimer_terms)
        .bind(&content.medical_treatment_terms)
        .bind(&content.over_18_statement)
        .bind(content.is_draft)
        .bind(content.issue_date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_policies(&self, kind: PolicyKind) -> Result<Vec<PolicyDocument>, StoreError> {
        let rows = sqlx::query_as::<_, PolicyDocument>(
            "SELECT version, content, issue_date FROM policy_documents WHERE kind = $1 ORDER BY version ASC",
        )
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_policy(
        &self,
        kind: PolicyKind,
        policy: &PolicyDocument,
    ) -> Result<PolicyDocument, StoreError> {
        sqlx::query_as::<_, PolicyDocument>(
            "INSERT INTO policy_documents (kind, version, content, issue_date) \
             VALUES ($1, $2, $3, $4) RETURNING version, content, issue_date",
        )
        .bind(kind.as_str())
        .bind(policy.version)
        .bind(&policy.content)
        .bind(policy.issue_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_write(e, "policy version already exists"))
    }
}
