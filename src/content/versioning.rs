// Version rules shared by disclaimer content and policy documents
//
// Versions only ever increase, a new version must change the content, and a
// published row's text is frozen. Nothing here touches storage; callers pass
// the rows they loaded.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::content::error::ContentError;
use crate::content::models::{
    DisclaimerContent, DisclaimerTerms, PolicyDocument, UpdateDisclaimerContentRequest,
};

/// A row in an append-only versioned document table
pub trait Versioned {
    fn version(&self) -> Decimal;

    /// Drafts do not count towards the current version
    fn is_published(&self) -> bool {
        true
    }

    /// True when the user-visible text of both rows is identical
    fn same_content(&self, other: &Self) -> bool;

    /// Label used in "no changes" messages
    fn content_label() -> &'static str;
}

impl Versioned for DisclaimerContent {
    fn version(&self) -> Decimal {
        self.version
    }

    fn is_published(&self) -> bool {
        !self.is_draft
    }

    fn same_content(&self, other: &Self) -> bool {
        self.disclaimer_terms == other.disclaimer_terms
            && self.medical_treatment_terms == other.medical_treatment_terms
            && self.over_18_statement == other.over_18_statement
    }

    fn content_label() -> &'static str {
        "disclaimer content (terms, medical terms or age confirmation statement)"
    }
}

impl Versioned for PolicyDocument {
    fn version(&self) -> Decimal {
        self.version
    }

    fn same_content(&self, other: &Self) -> bool {
        self.content == other.content
    }

    fn content_label() -> &'static str {
        "policy content"
    }
}

/// Highest published version, or 0 when nothing is published
pub fn current_version<T: Versioned>(rows: &[T]) -> Decimal {
    current(rows).map(|row| row.version()).unwrap_or(Decimal::ZERO)
}

/// The published row with the highest version
pub fn current<T: Versioned>(rows: &[T]) -> Option<&T> {
    rows.iter()
        .filter(|row| row.is_published())
        .max_by(|a, b| a.version().cmp(&b.version()))
}

/// The row with the highest version, drafts included
pub fn latest<T: Versioned>(rows: &[T]) -> Option<&T> {
    rows.iter().max_by(|a, b| a.version().cmp(&b.version()))
}

/// Version assigned when none is given: next whole number above the latest
pub fn next_version(latest: Option<Decimal>) -> Decimal {
    match latest {
        Some(version) => version.floor() + Decimal::ONE,
        None => Decimal::ONE,
    }
}

/// Check a candidate row against the most recent existing version
///
/// This method:
/// 1. Rejects non-positive versions
/// 2. Rejects versions not strictly greater than the latest
/// 3. Rejects content identical to the latest version
pub fn check_new_version<T: Versioned>(candidate: &T, latest: Option<&T>) -> Result<(), ContentError> {
    if candidate.version() <= Decimal::ZERO {
        return Err(ContentError::InvalidVersion(candidate.version()));
    }
    if let Some(latest) = latest {
        if candidate.version() <= latest.version() {
            return Err(ContentError::VersionNotIncremented {
                latest: latest.version(),
            });
        }
        if candidate.same_content(latest) {
            return Err(ContentError::NoChanges(T::content_label()));
        }
    }
    Ok(())
}

/// Apply an edit to a stored disclaimer content row
///
/// Published rows are read-only: any change to their terms fails. Publishing
/// a draft stamps `issue_date` with `now`; the draft must still differ from
/// the previous version.
pub fn apply_disclaimer_update(
    existing: &DisclaimerContent,
    update: &UpdateDisclaimerContentRequest,
    previous: Option<&DisclaimerContent>,
    now: DateTime<Utc>,
) -> Result<DisclaimerContent, ContentError> {
    let mut updated = existing.clone();
    if let Some(terms) = &update.disclaimer_terms {
        updated.disclaimer_terms = terms.clone();
    }
    if let Some(terms) = &update.medical_treatment_terms {
        updated.medical_treatment_terms = terms.clone();
    }
    if let Some(statement) = &update.over_18_statement {
        updated.over_18_statement = statement.clone();
    }

    if existing.is_published() {
        check_read_only(existing, &updated.terms())?;
        // Nothing left to change on a published row
        return Ok(existing.clone());
    }

    if update.publish {
        if let Some(previous) = previous {
            if updated.same_content(previous) {
                return Err(ContentError::NoChanges(DisclaimerContent::content_label()));
            }
        }
        updated.is_draft = false;
        updated.issue_date = now;
    }
    Ok(updated)
}

/// Fail with the first frozen field that `terms` would change
pub fn check_read_only(existing: &DisclaimerContent, terms: &DisclaimerTerms) -> Result<(), ContentError> {
    if !existing.is_published() {
        return Ok(());
    }
    if existing.disclaimer_terms != terms.disclaimer_terms {
        return Err(ContentError::ReadOnly("disclaimer_terms"));
    }
    if existing.medical_treatment_terms != terms.medical_treatment_terms {
        return Err(ContentError::ReadOnly("medical_treatment_terms"));
    }
    if existing.over_18_statement != terms.over_18_statement {
        return Err(ContentError::ReadOnly("over_18_statement"));
    }
    Ok(())
}
