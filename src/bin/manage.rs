// Studio management commands: disclaimer backups, expiry sweep and mailing list setup

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use studio_api::activity_log::{ActivityLogger, PgActivityLogRepository};
use studio_api::auth::PgUserRepository;
use studio_api::commands::{Commands, DEFAULT_ENCRYPTED_FILE, DEFAULT_EXPORT_FILE};
use studio_api::config::AppConfig;
use studio_api::disclaimers::{DisclaimerBackup, PgDisclaimerRepository};
use studio_api::{db, mailer, AppState};

#[derive(Debug, Parser)]
#[command(name = "manage", about = "Studio management commands")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write online, non-registered and archived disclaimers to CSV
    ExportDisclaimers {
        /// Output file; defaults to disclaimers_bu.csv in the log folder
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Encrypt online disclaimers to a file and email it to support
    ExportEncryptedDisclaimers {
        /// Output file; defaults to disclaimers.bu in the log folder
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Import online disclaimers from a CSV backup
    ImportDisclaimerData {
        #[arg(long)]
        file: PathBuf,
    },
    /// Delete disclaimers past their retention period
    DeleteExpiredDisclaimers,
    /// Create the subscribed group from the provider's list members
    CreateMailingList {
        /// Drop and rebuild the group if it already exists
        #[arg(long)]
        recreate: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().expect("Invalid configuration");

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");

    let state = AppState::from_config(pool.clone(), &config)
        .await
        .expect("Failed to configure mailing list client");
    let activity = ActivityLogger::new(Arc::new(PgActivityLogRepository::new(pool.clone())));
    let backup = DisclaimerBackup::new(
        Arc::new(PgDisclaimerRepository::new(pool.clone())),
        Arc::new(PgUserRepository::new(pool)),
        state.content_service.clone(),
    );
    let commands = Commands::new(
        backup,
        state.disclaimer_service.clone(),
        state.mailing_list_service.clone(),
        Arc::from(mailer::from_config(&config.mail)),
        activity,
        config.mail.clone(),
        config.backup_password.clone(),
    );

    let result = match cli.command {
        Command::ExportDisclaimers { file } => {
            let file = file.unwrap_or_else(|| config.log_folder.join(DEFAULT_EXPORT_FILE));
            commands.export_disclaimers(&file).await
        }
        Command::ExportEncryptedDisclaimers { file } => {
            let file = file.unwrap_or_else(|| config.log_folder.join(DEFAULT_ENCRYPTED_FILE));
            commands.export_encrypted_disclaimers(&file).await
        }
        Command::ImportDisclaimerData { file } => commands.import_disclaimer_data(&file).await,
        Command::DeleteExpiredDisclaimers => commands.delete_expired_disclaimers(Utc::now()).await,
        Command::CreateMailingList { recreate } => commands.create_mailing_list(recreate).await,
    };

    match result {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
        }
        Err(e) => {
            tracing::error!("Command failed: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_import_requires_file() {
        assert!(Cli::try_parse_from(["manage", "import-disclaimer-data"]).is_err());
    }

    #[test]
    fn test_create_mailing_list_recreate_flag() {
        let cli = Cli::try_parse_from(["manage", "create-mailing-list", "--recreate"]).unwrap();
        assert!(matches!(cli.command, Command::CreateMailingList { recreate: true }));
    }
}
