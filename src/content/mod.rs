// Versioned content module
// Disclaimer terms and studio policies: append-only versions, read-only once published

pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod service;
pub mod versioning;

pub use error::ContentError;
pub use models::{DisclaimerContent, DisclaimerTerms, PolicyDocument, PolicyKind};
pub use repository::{ContentRepository, PgContentRepository};
pub use service::ContentService;
