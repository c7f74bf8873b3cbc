// Disclaimer backups
//
// Plain CSV export (one file per disclaimer category), passphrase-encrypted
// export of online disclaimers, and CSV import of online disclaimers.
// Timestamps use "%Y-%m-%d %H:%M:%S:%6f %z", dates of birth "%Y-%m-%d",
// booleans "Yes"/"No".

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::UserRepository;
use crate::content::{ContentError, ContentService, DisclaimerContent, DisclaimerTerms};
use crate::db::StoreError;
use crate::disclaimers::models::{DisclaimerDetails, NewOnlineDisclaimer};
use crate::disclaimers::repository::DisclaimerRepository;
use crate::encryption::{self, EncryptionError};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S:%6f %z";
pub const DOB_FORMAT: &str = "%Y-%m-%d";
pub const FIELD_DELIMITER: &str = "@@@@@";
pub const ROW_DELIMITER: &str = "&&&&&";

/// Columns of an online disclaimer row
const ONLINE_COLUMNS: usize = 29;

const SHARED_HEADER: [&str; 24] = [
    "DOB",
    "Address",
    "Postcode",
    "Home Phone",
    "Mobile Phone",
    "Emergency Contact 1: Name",
    "Emergency Contact 1: Relationship",
    "Emergency Contact 1: Phone",
    "Emergency Contact 2: Name",
    "Emergency Contact 2: Relationship",
    "Emergency Contact 2: Phone",
    "Medical Conditions",
    "Medical Conditions Details",
    "Joint Problems",
    "Joint Problems Details",
    "Allergies",
    "Allergies Details",
    "Medical Treatment Terms",
    "Medical Treatment Accepted",
    "Disclaimer Terms",
    "Disclaimer Terms Accepted",
    "Over 18 Statement",
    "Over 18 Confirmed",
    "Disclaimer Version",
];

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("DISCLAIMER_BACKUP_PASSWORD is not set; encrypted export refused")]
    MissingPassword,
}

/// Result of writing one export file
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFile {
    pub path: PathBuf,
    pub records: usize,
}

/// Result of an import run; `lines` are the per-row messages in order
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub lines: Vec<String>,
    pub imported: usize,
    pub skipped: usize,
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

fn optional_timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map(timestamp).unwrap_or_default()
}

fn yes_no(value: bool) -> String {
    if value { "Yes" } else { "No" }.to_string()
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Answers plus terms text for the shared columns
fn shared_fields(details: &DisclaimerDetails, content: Option<&DisclaimerContent>, version: Decimal) -> Vec<String> {
    let (medical_terms, disclaimer_terms, over_18_statement) = content
        .map(|c| {
            (
                c.medical_treatment_terms.clone(),
                c.disclaimer_terms.clone(),
                c.over_18_statement.clone(),
            )
        })
        .unwrap_or_default();
    vec![
        details.dob.format(DOB_FORMAT).to_string(),
        details.address.clone(),
        details.postcode.clone(),
        details.home_phone.clone().unwrap_or_default(),
        details.mobile_phone.clone(),
        details.emergency_contact1_name.clone(),
        details.emergency_contact1_relationship.clone(),
        details.emergency_contact1_phone.clone(),
        details.emergency_contact2_name.clone(),
        details.emergency_contact2_relationship.clone(),
        details.emergency_contact2_phone.clone(),
        yes_no(details.medical_conditions),
        details.medical_conditions_details.clone().unwrap_or_default(),
        yes_no(details.joint_problems),
        details.joint_problems_details.clone().unwrap_or_default(),
        yes_no(details.allergies),
        details.allergies_details.clone().unwrap_or_default(),
        medical_terms,
        yes_no(details.medical_treatment_permission),
        disclaimer_terms,
        yes_no(details.terms_accepted),
        over_18_statement,
        yes_no(details.age_over_18_confirmed),
        version.to_string(),
    ]
}

fn online_header() -> Vec<String> {
    ["ID", "User", "Date", "Date Updated", "Name (as stated on disclaimer)"]
        .iter()
        .chain(SHARED_HEADER.iter())
        .map(|s| s.to_string())
        .collect()
}

fn non_registered_header() -> Vec<String> {
    [
        "ID",
        "First Name",
        "Last Name",
        "Email",
        "Event Date",
        "User UUID",
        "Date",
        "Name",
    ]
    .iter()
    .chain(SHARED_HEADER.iter())
    .map(|s| s.to_string())
    .collect()
}

fn archived_header() -> Vec<String> {
    ["ID", "Name", "Date", "Date Updated", "Date Archived", "Event Date"]
        .iter()
        .chain(SHARED_HEADER.iter())
        .map(|s| s.to_string())
        .collect()
}

/// `<dir>/<prefix>_<file name>` next to the template path
pub fn prefixed_path(template: &Path, prefix: &str) -> PathBuf {
    let name = template
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "disclaimers_bu.csv".to_string());
    let dir = template.parent().unwrap_or_else(|| Path::new(""));
    dir.join(format!("{}_{}", prefix, name))
}

/// Hex SHA-256 of a backup file's bytes, sent with the emailed copy
pub fn checksum(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

pub struct DisclaimerBackup {
    disclaimers: Arc<dyn DisclaimerRepository>,
    users: Arc<dyn UserRepository>,
    content: Arc<ContentService>,
}

impl DisclaimerBackup {
    pub fn new(
        disclaimers: Arc<dyn DisclaimerRepository>,
        users: Arc<dyn UserRepository>,
        content: Arc<ContentService>,
    ) -> Self {
        Self {
            disclaimers,
            users,
            content,
        }
    }

    async fn content_by_version(&self) -> Result<HashMap<Decimal, DisclaimerContent>, BackupError> {
        Ok(self
            .content
            .list_disclaimer_content()
            .await?
            .into_iter()
            .map(|c| (c.version, c))
            .collect())
    }

    async fn usernames(&self, user_ids: impl Iterator<Item = i32>) -> Result<HashMap<i32, String>, BackupError> {
        let mut names = HashMap::new();
        for user_id in user_ids {
            if names.contains_key(&user_id) {
                continue;
            }
            let username = self
                .users
                .find_by_id(user_id)
                .await?
                .map(|u| u.username)
                .unwrap_or_else(|| format!("user {}", user_id));
            names.insert(user_id, username);
        }
        Ok(names)
    }

    /// Online disclaimer rows, header first
    async fn online_rows(&self) -> Result<Vec<Vec<String>>, BackupError> {
        let content = self.content_by_version().await?;
        let disclaimers = self.disclaimers.list_online().await?;
        let usernames = self.usernames(disclaimers.iter().map(|d| d.user_id)).await?;

        let mut rows = vec![online_header()];
        for d in &disclaimers {
            let mut row = vec![
                d.id.to_string(),
                usernames.get(&d.user_id).cloned().unwrap_or_default(),
                timestamp(d.date),
                optional_timestamp(d.date_updated),
                d.details.name.clone(),
            ];
            row.extend(shared_fields(&d.details, content.get(&d.version), d.version));
            rows.push(row);
        }
        Ok(rows)
    }

    async fn non_registered_rows(&self) -> Result<Vec<Vec<String>>, BackupError> {
        let content = self.content_by_version().await?;
        let mut rows = vec![non_registered_header()];
        for d in self.disclaimers.list_non_registered().await? {
            let mut row = vec![
                d.id.to_string(),
                d.first_name.clone(),
                d.last_name.clone(),
                d.email.clone(),
                d.event_date.format(DOB_FORMAT).to_string(),
                d.user_uuid.to_string(),
                timestamp(d.date),
                d.details.name.clone(),
            ];
            row.extend(shared_fields(&d.details, content.get(&d.version), d.version));
            rows.push(row);
        }
        Ok(rows)
    }

    async fn archived_rows(&self) -> Result<Vec<Vec<String>>, BackupError> {
        let content = self.content_by_version().await?;
        let mut rows = vec![archived_header()];
        for d in self.disclaimers.list_archived().await? {
            let mut row = vec![
                d.id.to_string(),
                d.details.name.clone(),
                timestamp(d.date),
                optional_timestamp(d.date_updated),
                timestamp(d.date_archived),
                d.event_date
                    .map(|e| e.format(DOB_FORMAT).to_string())
                    .unwrap_or_default(),
            ];
            row.extend(shared_fields(&d.details, content.get(&d.version), d.version));
            rows.push(row);
        }
        Ok(rows)
    }

    fn write_csv<W: Write>(writer: W, rows: &[Vec<String>]) -> Result<(), BackupError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in rows {
            csv_writer.write_record(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Write `online_`, `non_registered_` and `archived_` CSV files next to `template`
    pub async fn export_csv(&self, template: &Path) -> Result<Vec<ExportedFile>, BackupError> {
        let mut exported = Vec::new();
        for (prefix, rows) in [
            ("online", self.online_rows().await?),
            ("non_registered", self.non_registered_rows().await?),
            ("archived", self.archived_rows().await?),
        ] {
            let path = prefixed_path(template, prefix);
            let file = std::fs::File::create(&path)?;
            Self::write_csv(file, &rows)?;
            let records = rows.len() - 1;
            tracing::info!("{} disclaimer records written to {}", records, path.display());
            exported.push(ExportedFile { path, records });
        }
        Ok(exported)
    }

    /// Online disclaimers joined with the field and row delimiters, then encrypted
    pub async fn export_encrypted(
        &self,
        path: &Path,
        passphrase: Option<&str>,
    ) -> Result<ExportedFile, BackupError> {
        let passphrase = passphrase.ok_or(BackupError::MissingPassword)?;
        let rows = self.online_rows().await?;
        let text = rows
            .iter()
            .map(|row| row.join(FIELD_DELIMITER))
            .collect::<Vec<_>>()
            .join(ROW_DELIMITER);

        let encrypted = encryption::encrypt(text.as_bytes(), passphrase)?;
        std::fs::write(path, &encrypted)?;
        let records = rows.len() - 1;
        tracing::info!("{} disclaimer records encrypted and backed up", records);
        Ok(ExportedFile {
            path: path.to_path_buf(),
            records,
        })
    }

    /// Import online disclaimers from a CSV produced by [`Self::export_csv`]
    ///
    /// Unknown users are skipped, and a user who already has a disclaimer
    /// keeps it untouched. Content versions missing locally are recreated
    /// from the terms in the file.
    pub async fn import_csv(&self, path: &Path) -> Result<ImportReport, BackupError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;
        let mut report = ImportReport::default();

        for (index, record) in reader.records().enumerate() {
            let row_number = index + 1;
            let record = record?;
            let skipped = report.skipped;
            let line = self.import_row(&record, row_number, &mut report).await?;
            if report.skipped > skipped {
                tracing::warn!("{}", line);
            } else {
                tracing::info!("{}", line);
            }
            report.lines.push(line);
        }
        Ok(report)
    }

    async fn import_row(
        &self,
        record: &csv::StringRecord,
        row_number: usize,
        report: &mut ImportReport,
    ) -> Result<String, BackupError> {
        let field = |i: usize| record.get(i).unwrap_or("");
        let username = field(1);

        if record.len() < ONLINE_COLUMNS {
            report.skipped += 1;
            return Ok(format!(
                "Row {} has {} columns, expected {}; data not imported",
                row_number,
                record.len(),
                ONLINE_COLUMNS
            ));
        }

        let Some(user) = self.users.find_by_username(username).await? else {
            report.skipped += 1;
            return Ok(format!(
                "Unknown user {} in backup data; data on row {} not imported",
                username, row_number
            ));
        };

        let (Some(date), Some(dob), Ok(version)) = (
            parse_timestamp(field(2)),
            NaiveDate::parse_from_str(field(5), DOB_FORMAT).ok(),
            Decimal::from_str(field(28)),
        ) else {
            report.skipped += 1;
            return Ok(format!(
                "Invalid dates or version on row {} for {}; data not imported",
                row_number, user.username
            ));
        };
        let date_updated = parse_timestamp(field(3));

        let existing = self.disclaimers.list_for_user(user.id).await?;
        if let Some(current) = existing.first() {
            report.skipped += 1;
            let dates_match = current.date == date && current.date_updated == date_updated;
            return Ok(format!(
                "Disclaimer for {} already exists and has not been overwritten with backup data. \
                 Dates in db and back up {}match.",
                user.username,
                if dates_match { "" } else { "DO NOT " }
            ));
        }

        self.content
            .ensure_disclaimer_version(
                version,
                DisclaimerTerms {
                    disclaimer_terms: field(24).to_string(),
                    medical_treatment_terms: field(22).to_string(),
                    over_18_statement: field(26).to_string(),
                },
            )
            .await?;

        let yes = |i: usize| field(i) == "Yes";
        let details = DisclaimerDetails {
            name: field(4).to_string(),
            dob,
            address: field(6).to_string(),
            postcode: field(7).to_string(),
            home_phone: non_empty(field(8)),
            mobile_phone: field(9).to_string(),
            emergency_contact1_name: field(10).to_string(),
            emergency_contact1_relationship: field(11).to_string(),
            emergency_contact1_phone: field(12).to_string(),
            emergency_contact2_name: field(13).to_string(),
            emergency_contact2_relationship: field(14).to_string(),
            emergency_contact2_phone: field(15).to_string(),
            medical_conditions: yes(16),
            medical_conditions_details: non_empty(field(17)),
            joint_problems: yes(18),
            joint_problems_details: non_empty(field(19)),
            allergies: yes(20),
            allergies_details: non_empty(field(21)),
            medical_treatment_permission: yes(23),
            terms_accepted: yes(25),
            age_over_18_confirmed: yes(27),
        };
        self.disclaimers
            .insert_online(&NewOnlineDisclaimer {
                user_id: user.id,
                date,
                date_updated,
                version,
                details,
            })
            .await?;

        report.imported += 1;
        Ok(format!("Disclaimer for {} imported from backup.", user.username))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity_log::ActivityLogger;
    use crate::auth::models::NewUser;
    use crate::content::models::CreateDisclaimerContentRequest;
    use crate::content::ContentRepository;
    use crate::disclaimers::lifecycle::tests::details;
    use crate::memory::MemoryStore;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    async fn setup() -> (DisclaimerBackup, Arc<MemoryStore>, i32) {
        let store = Arc::new(MemoryStore::new());
        let content = Arc::new(ContentService::new(store.clone(), ActivityLogger::new(store.clone())));
        content
            .create_disclaimer_content(CreateDisclaimerContentRequest {
                version: None,
                disclaimer_terms: "disclaimer terms".into(),
                medical_treatment_terms: "medical terms".into(),
                over_18_statement: "over 18 statement".into(),
                is_draft: false,
            })
            .await
            .unwrap();
        let user = store
            .create_user(NewUser {
                username: "alice".into(),
                email: "alice@example.com".into(),
                first_name: "Alice".into(),
                last_name: "Adams".into(),
                password_hash: "x".into(),
                is_staff: false,
            })
            .await
            .unwrap();
        let backup = DisclaimerBackup::new(store.clone(), store.clone(), content);
        (backup, store, user.id)
    }

    async fn sign(store: &MemoryStore, user_id: i32, date: DateTime<Utc>) {
        store
            .insert_online(&NewOnlineDisclaimer {
                user_id,
                date,
                date_updated: None,
                version: dec!(1),
                details: details(),
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_timestamp_format_round_trips_microseconds() {
        let value = DateTime::parse_from_rfc3339("2019-03-04T10:11:12.345678Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(timestamp(value), "2019-03-04 10:11:12:345678 +0000");
        assert_eq!(parse_timestamp("2019-03-04 10:11:12:345678 +0000"), Some(value));
    }

    #[test]
    fn test_prefixed_path() {
        let path = prefixed_path(Path::new("/tmp/log/disclaimers_bu.csv"), "online");
        assert_eq!(path, PathBuf::from("/tmp/log/online_disclaimers_bu.csv"));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_header_layout() {
        let header = online_header();
        assert_eq!(header.len(), ONLINE_COLUMNS);
        assert_eq!(header[1], "User");
        assert_eq!(header[22], "Medical Treatment Terms");
        assert_eq!(header[24], "Disclaimer Terms");
        assert_eq!(header[26], "Over 18 Statement");
        assert_eq!(header[28], "Disclaimer Version");
    }

    #[test]
    fn test_checksum_is_hex_sha256() {
        assert_eq!(
            checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_export_writes_three_files() {
        let (backup, store, user_id) = setup().await;
        sign(&store, user_id, Utc::now()).await;
        let dir = tempfile::tempdir().unwrap();

        let files = backup.export_csv(&dir.path().join("disclaimers_bu.csv")).await.unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].records, 1);
        assert_eq!(files[1].records, 0);

        let text = std::fs::read_to_string(&files[0].path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("ID,User,Date,Date Updated"));
        let row = lines.next().unwrap();
        assert!(row.contains(",alice,"));
        assert!(row.contains("medical terms"));
        assert!(row.ends_with(",1"));
    }

    #[tokio::test]
    async fn test_encrypted_export_requires_password() {
        let (backup, _, _) = setup().await;
        let dir = tempfile::tempdir().unwrap();
        let result = backup.export_encrypted(&dir.path().join("d.bu"), None).await;
        assert!(matches!(result, Err(BackupError::MissingPassword)));
    }

    #[tokio::test]
    async fn test_encrypted_export_decrypts_to_delimited_rows() {
        let (backup, store, user_id) = setup().await;
        sign(&store, user_id, Utc::now()).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disclaimers.bu");

        let exported = backup.export_encrypted(&path, Some("pass")).await.unwrap();
        assert_eq!(exported.records, 1);

        let plain = encryption::decrypt(&std::fs::read(&path).unwrap(), "pass").unwrap();
        let text = String::from_utf8(plain).unwrap();
        let rows: Vec<&str> = text.split(ROW_DELIMITER).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].split(FIELD_DELIMITER).nth(1), Some("alice"));
    }

    #[tokio::test]
    async fn test_import_restores_exported_disclaimer() {
        let (backup, store, user_id) = setup().await;
        // stored at the precision the file keeps
        let signed_at = parse_timestamp(&timestamp(Utc::now() - Duration::days(20))).unwrap();
        sign(&store, user_id, signed_at).await;
        let dir = tempfile::tempdir().unwrap();
        let files = backup.export_csv(&dir.path().join("bu.csv")).await.unwrap();

        // existing disclaimer is never overwritten
        let report = backup.import_csv(&files[0].path).await.unwrap();
        assert_eq!(report.imported, 0);
        assert!(report.lines[0].starts_with("Disclaimer for alice already exists"));
        assert!(report.lines[0].ends_with("Dates in db and back up match."));

        // after removal the row comes back from the file
        let existing = store.list_for_user(user_id).await.unwrap();
        store.delete_online(existing[0].id, None).await.unwrap();
        let report = backup.import_csv(&files[0].path).await.unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.lines, vec!["Disclaimer for alice imported from backup.".to_string()]);

        let restored = store.list_for_user(user_id).await.unwrap();
        assert_eq!(restored[0].details, details());
        assert_eq!(restored[0].version, dec!(1));
    }

    #[tokio::test]
    async fn test_import_unknown_user_and_new_version() {
        let (backup, store, user_id) = setup().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import.csv");

        let mut known = vec![
            "1".to_string(),
            "alice".to_string(),
            "2018-01-02 10:00:00:000000 +0000".to_string(),
            String::new(),
            "Alice Adams".to_string(),
        ];
        let mut shared = shared_fields(&details(), None, dec!(0.5));
        shared[17] = "old medical".into();
        shared[19] = "old terms".into();
        shared[21] = "old statement".into();
        known.extend(shared);
        let mut unknown = known.clone();
        unknown[1] = "nobody".into();

        let mut writer = csv::Writer::from_path(&path).unwrap();
        writer.write_record(online_header()).unwrap();
        writer.write_record(&unknown).unwrap();
        writer.write_record(&known).unwrap();
        writer.flush().unwrap();

        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let report = backup.import_csv(&path).await.unwrap();
        let logged = logs.contents();
        assert!(logged
            .lines()
            .any(|l| l.contains("WARN") && l.contains("Unknown user nobody")));
        assert!(logged
            .lines()
            .any(|l| l.contains("INFO") && l.contains("Disclaimer for alice imported")));
        assert_eq!(
            report.lines[0],
            "Unknown user nobody in backup data; data on row 1 not imported"
        );
        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 1);

        let restored = store.list_for_user(user_id).await.unwrap();
        assert_eq!(restored[0].version, dec!(0.5));
        let version = store.find_disclaimer_content(dec!(0.5)).await.unwrap().unwrap();
        assert_eq!(version.disclaimer_terms, "old terms");
        assert_eq!(version.medical_treatment_terms, "old medical");
    }
}
