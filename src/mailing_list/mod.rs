// Mailing list module
// Local "subscribed" group kept in step with the Mailchimp list

pub mod client;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod service;

pub use client::{MailchimpClient, MailingListClient};
pub use error::MailingListError;
pub use models::{MailingListMember, MailingListSetup};
pub use repository::{GroupRepository, PgGroupRepository};
pub use service::MailingListService;
