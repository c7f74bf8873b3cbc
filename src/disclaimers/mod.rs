// Disclaimer module
// Signed liability and medical disclaimers: activity window, archive on delete,
// expiry sweep and backups

pub mod backup;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod models;
pub mod repository;
pub mod service;

pub use backup::{BackupError, DisclaimerBackup};
pub use error::DisclaimerError;
pub use models::{ArchivedDisclaimer, NonRegisteredDisclaimer, OnlineDisclaimer, PrintDisclaimer};
pub use repository::{DisclaimerRepository, PgDisclaimerRepository};
pub use service::{DisclaimerService, SweepReport};
