// Outbound email
// SMTP delivery through lettre; when SMTP is not configured messages are only logged.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;

use crate::config::MailConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address {0}")]
    InvalidAddress(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Failed to send email: {0}")]
    Send(String),
}

/// An email ready to send
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    /// (file name, bytes)
    pub attachment: Option<(String, Vec<u8>)>,
}

impl OutgoingMail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: vec![to.into()],
            subject: subject.into(),
            body: body.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.attachment = Some((file_name.into(), bytes));
        self
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// Send and log failures instead of returning them
pub async fn send_or_log(mailer: &dyn Mailer, mail: OutgoingMail) -> bool {
    let subject = mail.subject.clone();
    match mailer.send(mail).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Email '{}' not sent: {}", subject, e);
            false
        }
    }
}

/// SMTP mailer
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(host: &str, port: u16, from: String) -> Self {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .build();
        Self { transport, from }
    }

    fn build_message(&self, mail: OutgoingMail) -> Result<Message, MailError> {
        let from: Mailbox = self
            .from
            .parse()
            .map_err(|_| MailError::InvalidAddress(self.from.clone()))?;

        let mut builder = Message::builder().from(from).subject(mail.subject);
        for recipient in &mail.to {
            let to: Mailbox = recipient
                .parse()
                .map_err(|_| MailError::InvalidAddress(recipient.clone()))?;
            builder = builder.to(to);
        }

        let text = SinglePart::builder()
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body);

        let message = match mail.attachment {
            Some((file_name, bytes)) => {
                let content_type = "application/octet-stream"
                    .parse::<ContentType>()
                    .map_err(|e| MailError::Build(e.to_string()))?;
                let attachment = Attachment::new(file_name).body(bytes, content_type);
                builder.multipart(MultiPart::mixed().singlepart(text).singlepart(attachment))
            }
            None => builder.singlepart(text),
        };

        message.map_err(|e| MailError::Build(e.to_string()))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let recipients = mail.to.join(", ");
        let message = self.build_message(mail)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Send(e.to_string()))?;
        tracing::info!("Email sent to {}", recipients);
        Ok(())
    }
}

/// Mailer used when SMTP is not configured
pub struct LogOnlyMailer;

#[async_trait]
impl Mailer for LogOnlyMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        tracing::warn!(
            "SMTP not configured; email '{}' to {} not sent",
            mail.subject,
            mail.to.join(", ")
        );
        Ok(())
    }
}

/// Pick the mailer for the configured environment
pub fn from_config(config: &MailConfig) -> Box<dyn Mailer> {
    match &config.smtp_host {
        Some(host) => Box::new(SmtpMailer::new(host, config.smtp_port, config.from_email.clone())),
        None => Box::new(LogOnlyMailer),
    }
}

/// Mailer that keeps sent messages in memory
#[cfg(test)]
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: tokio::sync::Mutex<Vec<OutgoingMail>>,
    pub fail: bool,
}

#[cfg(test)]
#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Send("connection refused".into()));
        }
        self.sent.lock().await.push(mail);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_with_attachment_builds() {
        let mailer = SmtpMailer::new("localhost", 25, "studio@example.com".to_string());
        let mail = OutgoingMail::new("support@example.com", "Backup", "attached")
            .with_attachment("backup.bin", vec![1, 2, 3]);
        assert!(mailer.build_message(mail).is_ok());
    }

    #[test]
    fn test_invalid_recipient_rejected() {
        let mailer = SmtpMailer::new("localhost", 25, "studio@example.com".to_string());
        let mail = OutgoingMail::new("not an address", "Backup", "body");
        assert!(matches!(mailer.build_message(mail), Err(MailError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_send_or_log_swallows_failure() {
        let mailer = RecordingMailer { fail: true, ..Default::default() };
        let sent = send_or_log(&mailer, OutgoingMail::new("a@b.com", "s", "b")).await;
        assert!(!sent);
    }
}
