// Management commands
// Each command returns the lines to print; the `manage` binary wires the
// dependencies from configuration and writes them to stdout.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::activity_log::ActivityLogger;
use crate::config::MailConfig;
use crate::disclaimers::backup::checksum;
use crate::disclaimers::{BackupError, DisclaimerBackup, DisclaimerError, DisclaimerService};
use crate::mailer::{self, Mailer, OutgoingMail};
use crate::mailing_list::{MailingListError, MailingListService, MailingListSetup};

pub const DEFAULT_EXPORT_FILE: &str = "disclaimers_bu.csv";
pub const DEFAULT_ENCRYPTED_FILE: &str = "disclaimers.bu";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Disclaimer(#[from] DisclaimerError),

    #[error(transparent)]
    MailingList(#[from] MailingListError),

    #[error("Could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub struct Commands {
    backup: DisclaimerBackup,
    disclaimers: Arc<DisclaimerService>,
    mailing_list: Arc<MailingListService>,
    mailer: Arc<dyn Mailer>,
    activity: ActivityLogger,
    mail: MailConfig,
    backup_password: Option<String>,
}

impl Commands {
    pub fn new(
        backup: DisclaimerBackup,
        disclaimers: Arc<DisclaimerService>,
        mailing_list: Arc<MailingListService>,
        mailer: Arc<dyn Mailer>,
        activity: ActivityLogger,
        mail: MailConfig,
        backup_password: Option<String>,
    ) -> Self {
        Self {
            backup,
            disclaimers,
            mailing_list,
            mailer,
            activity,
            mail,
            backup_password,
        }
    }

    /// Write the online, non-registered and archived CSV backups
    pub async fn export_disclaimers(&self, file: &Path) -> Result<Vec<String>, CommandError> {
        let exported = self.backup.export_csv(file).await?;
        let lines: Vec<String> = exported
            .iter()
            .map(|f| format!("{} disclaimer records written to {}", f.records, f.path.display()))
            .collect();
        self.activity
            .log(format!("Disclaimer CSV backup written to {}", file.display()))
            .await;
        Ok(lines)
    }

    /// Encrypt the online disclaimers and email the file to support
    ///
    /// The email carries the file's SHA-256 so the copy can be verified. A
    /// failed email is logged; the file on disk is still the backup.
    pub async fn export_encrypted_disclaimers(
        &self,
        file: &Path,
    ) -> Result<Vec<String>, CommandError> {
        let exported = self
            .backup
            .export_encrypted(file, self.backup_password.as_deref())
            .await?;
        let bytes = std::fs::read(&exported.path).map_err(|source| CommandError::Read {
            path: exported.path.clone(),
            source,
        })?;
        let digest = checksum(&bytes);
        let file_name = exported
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| DEFAULT_ENCRYPTED_FILE.to_string());

        let mail = OutgoingMail::new(
            self.mail.support_email.clone(),
            "Disclaimer backup",
            format!(
                "Encrypted disclaimer back up file attached\nSHA-256: {}",
                digest
            ),
        )
        .with_attachment(file_name, bytes);
        mailer::send_or_log(self.mailer.as_ref(), mail).await;

        self.activity
            .log(format!(
                "{} disclaimer records encrypted and backed up",
                exported.records
            ))
            .await;
        Ok(vec![format!(
            "{} disclaimer records encrypted and written to {}",
            exported.records,
            exported.path.display()
        )])
    }

    /// Import online disclaimers from a CSV backup
    pub async fn import_disclaimer_data(&self, file: &Path) -> Result<Vec<String>, CommandError> {
        let report = self.backup.import_csv(file).await?;
        let summary = format!(
            "Import complete: {} imported, {} skipped",
            report.imported, report.skipped
        );
        self.activity
            .log(format!("Disclaimer data imported from {}; {}", file.display(), summary))
            .await;
        let mut lines = report.lines;
        lines.push(summary);
        Ok(lines)
    }

    /// Run the expiry sweep and tell the studio who was removed
    pub async fn delete_expired_disclaimers(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, CommandError> {
        let report = self.disclaimers.sweep_expired(now).await?;
        if report.is_empty() {
            return Ok(vec!["No disclaimers to delete".to_string()]);
        }

        let mut body = String::from(
            "Disclaimers have been deleted for users with no paid booking in the past year.\n",
        );
        if !report.online_users.is_empty() {
            body.push_str(&format!(
                "\nOnline disclaimers: {}\n",
                report.online_users.join(", ")
            ));
        }
        if !report.print_users.is_empty() {
            body.push_str(&format!(
                "\nPrint disclaimers: {}\n",
                report.print_users.join(", ")
            ));
        }
        body.push_str(&format!(
            "\nExpired non-registered disclaimers: {}\nExpired archived disclaimers: {}\n",
            report.non_registered, report.archived
        ));
        mailer::send_or_log(
            self.mailer.as_ref(),
            OutgoingMail::new(
                self.mail.studio_email.clone(),
                "Disclaimers deleted for expired users",
                body,
            ),
        )
        .await;

        Ok(vec![format!(
            "Disclaimers deleted: {} online, {} print, {} non-registered, {} archived",
            report.online_users.len(),
            report.print_users.len(),
            report.non_registered,
            report.archived
        )])
    }

    pub async fn create_mailing_list(&self, recreate: bool) -> Result<Vec<String>, CommandError> {
        let line = match self.mailing_list.create_mailing_list(recreate).await? {
            MailingListSetup::Created { users_added } => format!(
                "Subscription group created; {} users added from Mailchimp data",
                users_added
            ),
            MailingListSetup::AlreadyExists => {
                "Subscription group already exists; mailing list has not been recreated"
                    .to_string()
            }
        };
        Ok(vec![line])
    }
}
