// Application configuration
// Reads every setting from the environment (after dotenv) into one typed struct

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading configuration from the environment
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Outbound mail settings
///
/// When `smtp_host` is None, mail is skipped and only logged.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub from_email: String,
    pub support_email: String,
    pub studio_email: String,
}

/// Mailing-list provider credentials
#[derive(Debug, Clone)]
pub struct MailchimpConfig {
    pub api_key: String,
    pub list_id: String,
}

impl MailchimpConfig {
    /// Data centre suffix of the API key ("abc123-us6" -> "us6")
    pub fn data_center(&self) -> &str {
        self.api_key
            .rsplit_once('-')
            .map(|(_, dc)| dc)
            .unwrap_or("us1")
    }

    /// Base URL of the members endpoint for the configured list
    pub fn members_url(&self) -> String {
        format!(
            "https://{}.api.mailchimp.com/3.0/lists/{}/members",
            self.data_center(),
            self.list_id
        )
    }

    /// Base URL of the list itself (batch member updates are posted here)
    pub fn list_url(&self) -> String {
        format!(
            "https://{}.api.mailchimp.com/3.0/lists/{}",
            self.data_center(),
            self.list_id
        )
    }
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub redis_url: Option<String>,
    pub log_folder: PathBuf,
    pub backup_password: Option<String>,
    pub mail: MailConfig,
    pub mailchimp: Option<MailchimpConfig>,
}

impl AppConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let port = match get("PORT") {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value,
            })?,
            None => 8080,
        };

        let smtp_port = match get("SMTP_PORT") {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "SMTP_PORT",
                value,
            })?,
            None => 25,
        };

        let from_email =
            get("DEFAULT_FROM_EMAIL").unwrap_or_else(|| "noreply@studio.local".to_string());

        let mail = MailConfig {
            smtp_host: get("SMTP_HOST"),
            smtp_port,
            support_email: get("SUPPORT_EMAIL").unwrap_or_else(|| from_email.clone()),
            studio_email: get("DEFAULT_STUDIO_EMAIL").unwrap_or_else(|| from_email.clone()),
            from_email,
        };

        let mailchimp = match (get("MAILCHIMP_API_KEY"), get("MAILCHIMP_LIST_ID")) {
            (Some(api_key), Some(list_id)) => Some(MailchimpConfig { api_key, list_id }),
            _ => None,
        };

        Ok(Self {
            database_url,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            jwt_secret,
            redis_url: get("REDIS_URL"),
            log_folder: PathBuf::from(get("LOG_FOLDER").unwrap_or_else(|| "log".to_string())),
            backup_password: get("DISCLAIMER_BACKUP_PASSWORD"),
            mail,
            mailchimp,
        })
    }

    /// Address the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
