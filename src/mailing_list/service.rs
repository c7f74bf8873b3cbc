// Mailing-list service - provider sync, webhook handling and list setup

use std::sync::Arc;

use crate::activity_log::ActivityLogger;
use crate::auth::{User, UserRepository};
use crate::db::StoreError;
use crate::mailing_list::{
    client::MailingListClient,
    error::MailingListError,
    models::{
        MailingListMember, MailingListSetup, MemberStatus, MemberUpdate, SyncAction,
        WebhookAction, WebhookPayload, SUBSCRIBED_GROUP,
    },
    repository::GroupRepository,
};

const VIA_PROVIDER: &str = "via API request from MailChimp";

pub struct MailingListService {
    groups: Arc<dyn GroupRepository>,
    users: Arc<dyn UserRepository>,
    client: Option<Arc<dyn MailingListClient>>,
    list_id: Option<String>,
    activity: ActivityLogger,
}

impl MailingListService {
    pub fn new(
        groups: Arc<dyn GroupRepository>,
        users: Arc<dyn UserRepository>,
        client: Option<Arc<dyn MailingListClient>>,
        list_id: Option<String>,
        activity: ActivityLogger,
    ) -> Self {
        Self {
            groups,
            users,
            client,
            list_id,
            activity,
        }
    }

    pub async fn subscribers(&self) -> Result<Vec<MailingListMember>, MailingListError> {
        let users = self.groups.members(SUBSCRIBED_GROUP).await?;
        Ok(users.into_iter().map(MailingListMember::from).collect())
    }

    pub async fn is_subscribed(&self, user_id: i32) -> Result<bool, MailingListError> {
        Ok(self.groups.is_member(SUBSCRIBED_GROUP, user_id).await?)
    }

    /// Push one change to the provider
    ///
    /// Provider failures are logged and reported as `false`; local state is
    /// never rolled back because of them.
    pub async fn sync(&self, user: &User, action: SyncAction) -> bool {
        let Some(client) = &self.client else {
            tracing::debug!("Mailing list not configured; skipping sync for {}", user.username);
            return false;
        };

        let status = match &action {
            SyncAction::Subscribe => MemberStatus::Subscribed,
            SyncAction::Unsubscribe => MemberStatus::Unsubscribed,
            SyncAction::UpdateProfile | SyncAction::UpdateEmail { .. } => {
                match self.groups.is_member(SUBSCRIBED_GROUP, user.id).await {
                    Ok(true) => MemberStatus::Subscribed,
                    Ok(false) => MemberStatus::Unsubscribed,
                    Err(e) => {
                        tracing::error!("Mailing list sync for {} failed: {}", user.username, e);
                        return false;
                    }
                }
            }
        };

        if let SyncAction::UpdateEmail { old_email } = &action {
            let old = MemberUpdate::new(old_email, MemberStatus::Unsubscribed, user);
            if let Err(e) = client.update_members(&[old]).await {
                tracing::error!(
                    "Mailing list: failed to unsubscribe old address {} for {}: {}",
                    old_email,
                    user.username,
                    e
                );
                return false;
            }
        }

        let update = MemberUpdate::new(&user.email, status, user);
        match client.update_members(&[update]).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Mailing list sync for {} failed: {}", user.username, e);
                false
            }
        }
    }

    /// Push a user's own profile edit; returns `false` when nothing was sent
    pub async fn profile_changed(&self, before: &User, after: &User) -> bool {
        let action = if !before.email.eq_ignore_ascii_case(&after.email) {
            SyncAction::UpdateEmail {
                old_email: before.email.clone(),
            }
        } else if before.first_name != after.first_name || before.last_name != after.last_name {
            SyncAction::UpdateProfile
        } else {
            return false;
        };
        self.sync(after, action).await
    }

    async fn load_user(&self, user_id: i32) -> Result<User, MailingListError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)).into())
    }

    /// Subscribe a user locally and at the provider
    pub async fn subscribe(&self, user_id: i32) -> Result<(), MailingListError> {
        let user = self.load_user(user_id).await?;
        self.groups.ensure_group(SUBSCRIBED_GROUP).await?;
        self.groups.add_member(SUBSCRIBED_GROUP, user.id).await?;
        self.sync(&user, SyncAction::Subscribe).await;
        self.activity
            .log(format!(
                "User {} ({}) subscribed to mailing list",
                user.full_name(),
                user.username
            ))
            .await;
        Ok(())
    }

    pub async fn unsubscribe(&self, user_id: i32) -> Result<(), MailingListError> {
        let user = self.load_user(user_id).await?;
        self.groups.remove_member(SUBSCRIBED_GROUP, user.id).await?;
        self.sync(&user, SyncAction::Unsubscribe).await;
        self.activity
            .log(format!(
                "User {} ({}) unsubscribed from mailing list",
                user.full_name(),
                user.username
            ))
            .await;
        Ok(())
    }

    /// Apply a change reported by the provider's webhook
    pub async fn handle_webhook(&self, payload: WebhookPayload) -> Result<(), MailingListError> {
        if self.list_id.as_deref() != Some(payload.list_id.as_str()) {
            return Err(MailingListError::UnexpectedListId);
        }
        let action = WebhookAction::parse(&payload.event_type)
            .ok_or_else(|| MailingListError::UnknownAction(payload.event_type.clone()))?;

        let lookup_email = match action {
            WebhookAction::UpEmail => payload.old_email.as_deref(),
            _ => payload.email.as_deref(),
        }
        .ok_or(MailingListError::MissingField(match action {
            WebhookAction::UpEmail => "data[old_email]",
            _ => "data[email]",
        }))?;

        let user = self
            .users
            .find_by_email(lookup_email)
            .await?
            .ok_or_else(|| MailingListError::UserNotFound(lookup_email.to_string()))?;

        match action {
            WebhookAction::Unsubscribe => {
                self.groups.remove_member(SUBSCRIBED_GROUP, user.id).await?;
                self.activity
                    .log(format!(
                        "User {} {} ({}) unsubscribed from mailing list {}",
                        user.first_name, user.last_name, user.username, VIA_PROVIDER
                    ))
                    .await;
            }
            WebhookAction::Subscribe => {
                self.groups.ensure_group(SUBSCRIBED_GROUP).await?;
                self.groups.add_member(SUBSCRIBED_GROUP, user.id).await?;
                self.activity
                    .log(format!(
                        "User {} {} ({}) subscribed to mailing list {}",
                        user.first_name, user.last_name, user.username, VIA_PROVIDER
                    ))
                    .await;
            }
            WebhookAction::Profile => self.update_profile(&user, &payload).await?,
            WebhookAction::UpEmail => {
                let new_email = payload
                    .new_email
                    .as_deref()
                    .ok_or(MailingListError::MissingField("data[new_email]"))?;
                self.update_email(&user, new_email).await?;
            }
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        user: &User,
        payload: &WebhookPayload,
    ) -> Result<(), MailingListError> {
        let first_name = payload.first_name.as_deref().unwrap_or(&user.first_name);
        let last_name = payload.last_name.as_deref().unwrap_or(&user.last_name);

        let mut changed = Vec::new();
        if first_name != user.first_name {
            changed.push("first name");
        }
        if last_name != user.last_name {
            changed.push("last name");
        }
        if changed.is_empty() {
            tracing::debug!("Profile webhook for {} changed nothing", user.username);
            return Ok(());
        }

        self.users.update_names(user.id, first_name, last_name).await?;
        self.activity
            .log(format!(
                "User profile updated for {} ({}); {} changed {}",
                user.username,
                user.email,
                changed.join(" and "),
                VIA_PROVIDER
            ))
            .await;
        Ok(())
    }

    async fn update_email(&self, user: &User, new_email: &str) -> Result<(), MailingListError> {
        if user.email.eq_ignore_ascii_case(new_email) {
            return Ok(());
        }

        let taken = match self.users.find_by_email(new_email).await? {
            Some(other) => other.id != user.id,
            None => false,
        };
        let result = if taken {
            Err(MailingListError::EmailTaken(new_email.to_string()))
        } else {
            match self.users.update_email(user.id, new_email).await {
                Err(StoreError::Duplicate(_)) => {
                    Err(MailingListError::EmailTaken(new_email.to_string()))
                }
                other => other.map_err(MailingListError::from),
            }
        };

        match result {
            Ok(()) => {
                self.activity
                    .log(format!(
                        "Email address updated for {} (from {} to {}) {}",
                        user.username, user.email, new_email, VIA_PROVIDER
                    ))
                    .await;
                Ok(())
            }
            Err(MailingListError::EmailTaken(email)) => {
                self.activity
                    .log(format!(
                        "Mailchimp API request to update email address for {} (from {} to {}) \
                         failed; another user with this email already exists",
                        user.username, user.email, email
                    ))
                    .await;
                Err(MailingListError::EmailTaken(email))
            }
            Err(e) => Err(e),
        }
    }

    /// Create the local subscription group, seeded from the provider's subscribers
    ///
    /// With `recreate` the existing group is dropped first.
    pub async fn create_mailing_list(
        &self,
        recreate: bool,
    ) -> Result<MailingListSetup, MailingListError> {
        let client = self.client.clone().ok_or(MailingListError::NotConfigured)?;

        if recreate && self.groups.delete_group(SUBSCRIBED_GROUP).await? {
            tracing::info!("Deleted existing subscription group");
        }
        if !self.groups.ensure_group(SUBSCRIBED_GROUP).await? {
            return Ok(MailingListSetup::AlreadyExists);
        }

        let emails: Vec<String> = client
            .list_members()
            .await?
            .into_iter()
            .filter(|m| m.status == "subscribed")
            .map(|m| m.email_address)
            .collect();
        let users_added = self
            .groups
            .add_members_by_email(SUBSCRIBED_GROUP, &emails)
            .await?;

        self.activity
            .log(format!(
                "Mailing list subscription group created; {} users added",
                users_added
            ))
            .await;
        Ok(MailingListSetup::Created { users_added })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::NewUser;
    use crate::mailing_list::client::RecordingClient;
    use crate::mailing_list::models::ProviderMember;
    use crate::memory::MemoryStore;

    const LIST_ID: &str = "list-1";

    struct Fixture {
        service: MailingListService,
        store: Arc<MemoryStore>,
        client: Arc<RecordingClient>,
        user: User,
    }

    async fn add_user(store: &MemoryStore, username: &str, first: &str, last: &str) -> User {
        store
            .create_user(NewUser {
                username: username.into(),
                email: format!("{}@example.com", username),
                first_name: first.into(),
                last_name: last.into(),
                password_hash: "x".into(),
                is_staff: false,
            })
            .await
            .unwrap()
    }

    async fn fixture_with(client: RecordingClient) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let client = Arc::new(client);
        let user = add_user(&store, "alice", "Alice", "Adams").await;
        let service = MailingListService::new(
            store.clone(),
            store.clone(),
            Some(client.clone() as Arc<dyn MailingListClient>),
            Some(LIST_ID.into()),
            ActivityLogger::new(store.clone()),
        );
        Fixture {
            service,
            store,
            client,
            user,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(RecordingClient::default()).await
    }

    fn webhook(event_type: &str, email: &str) -> WebhookPayload {
        WebhookPayload {
            event_type: event_type.into(),
            list_id: LIST_ID.into(),
            email: Some(email.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_subscribe_adds_to_group_and_provider() {
        let f = fixture().await;
        f.service.subscribe(f.user.id).await.unwrap();

        assert!(f.service.is_subscribed(f.user.id).await.unwrap());
        let updates = f.client.updates.lock().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0][0].email_address, "alice@example.com");
        assert_eq!(updates[0][0].status, MemberStatus::Subscribed);
    }

    #[tokio::test]
    async fn test_provider_failure_keeps_local_change() {
        let f = fixture_with(RecordingClient {
            fail: true,
            ..Default::default()
        })
        .await;
        f.service.subscribe(f.user.id).await.unwrap();
        assert!(f.service.is_subscribed(f.user.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_email_unsubscribes_old_address_first() {
        let f = fixture().await;
        f.service.subscribe(f.user.id).await.unwrap();
        f.client.updates.lock().await.clear();

        let mut user = f.user.clone();
        user.email = "alice.new@example.com".into();
        let synced = f
            .service
            .sync(
                &user,
                SyncAction::UpdateEmail {
                    old_email: "alice@example.com".into(),
                },
            )
            .await;

        assert!(synced);
        let updates = f.client.updates.lock().await;
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0][0].email_address, "alice@example.com");
        assert_eq!(updates[0][0].status, MemberStatus::Unsubscribed);
        assert_eq!(updates[1][0].email_address, "alice.new@example.com");
        assert_eq!(updates[1][0].status, MemberStatus::Subscribed);
    }

    #[tokio::test]
    async fn test_profile_changed_picks_sync_action() {
        let f = fixture().await;
        f.service.subscribe(f.user.id).await.unwrap();
        f.client.updates.lock().await.clear();

        assert!(!f.service.profile_changed(&f.user, &f.user).await);
        assert!(f.client.updates.lock().await.is_empty());

        let mut renamed = f.user.clone();
        renamed.first_name = "Ali".into();
        assert!(f.service.profile_changed(&f.user, &renamed).await);
        {
            let updates = f.client.updates.lock().await;
            assert_eq!(updates.len(), 1);
            assert_eq!(updates[0][0].email_address, "alice@example.com");
            assert_eq!(updates[0][0].status, MemberStatus::Subscribed);
        }
        f.client.updates.lock().await.clear();

        let mut moved = f.user.clone();
        moved.email = "alice@new.example.com".into();
        assert!(f.service.profile_changed(&f.user, &moved).await);
        let updates = f.client.updates.lock().await;
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0][0].email_address, "alice@example.com");
        assert_eq!(updates[0][0].status, MemberStatus::Unsubscribed);
        assert_eq!(updates[1][0].email_address, "alice@new.example.com");
    }

    #[tokio::test]
    async fn test_profile_sync_uses_membership_status() {
        let f = fixture().await;
        assert!(f.service.sync(&f.user, SyncAction::UpdateProfile).await);
        let updates = f.client.updates.lock().await;
        assert_eq!(updates[0][0].status, MemberStatus::Unsubscribed);
    }

    #[tokio::test]
    async fn test_sync_without_client_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let user = add_user(&store, "bob", "Bob", "Brown").await;
        let service = MailingListService::new(
            store.clone(),
            store.clone(),
            None,
            None,
            ActivityLogger::new(store.clone()),
        );
        assert!(!service.sync(&user, SyncAction::Subscribe).await);
    }

    #[tokio::test]
    async fn test_webhook_rejects_other_list() {
        let f = fixture().await;
        let mut payload = webhook("subscribe", "alice@example.com");
        payload.list_id = "other".into();
        let err = f.service.handle_webhook(payload).await.unwrap_err();
        assert!(matches!(err, MailingListError::UnexpectedListId));
    }

    #[tokio::test]
    async fn test_webhook_subscribe_and_unsubscribe() {
        let f = fixture().await;
        f.service
            .handle_webhook(webhook("subscribe", "ALICE@example.com"))
            .await
            .unwrap();
        assert!(f.service.is_subscribed(f.user.id).await.unwrap());

        f.service
            .handle_webhook(webhook("unsubscribe", "alice@example.com"))
            .await
            .unwrap();
        assert!(!f.service.is_subscribed(f.user.id).await.unwrap());

        let log = f.store.activity_entries().await;
        assert!(log.iter().any(|l| l
            == "User Alice Adams (alice) unsubscribed from mailing list via API request from MailChimp"));
        // Webhook changes are not echoed back to the provider
        assert!(f.client.updates.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_webhook_unknown_user() {
        let f = fixture().await;
        let err = f
            .service
            .handle_webhook(webhook("subscribe", "nobody@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, MailingListError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_webhook_profile_updates_names() {
        let f = fixture().await;
        let mut payload = webhook("profile", "alice@example.com");
        payload.first_name = Some("Alicia".into());
        payload.last_name = Some("Adams".into());
        f.service.handle_webhook(payload).await.unwrap();

        let user = f.store.find_by_id(f.user.id).await.unwrap().unwrap();
        assert_eq!(user.first_name, "Alicia");
        let log = f.store.activity_entries().await;
        assert!(log.iter().any(|l| l.contains("first name changed")));
    }

    #[tokio::test]
    async fn test_webhook_email_change() {
        let f = fixture().await;
        let payload = WebhookPayload {
            event_type: "upemail".into(),
            list_id: LIST_ID.into(),
            old_email: Some("alice@example.com".into()),
            new_email: Some("alice@new.example.com".into()),
            ..Default::default()
        };
        f.service.handle_webhook(payload).await.unwrap();
        let user = f.store.find_by_id(f.user.id).await.unwrap().unwrap();
        assert_eq!(user.email, "alice@new.example.com");
    }

    #[tokio::test]
    async fn test_webhook_email_change_to_taken_address() {
        let f = fixture().await;
        add_user(&f.store, "bob", "Bob", "Brown").await;
        let payload = WebhookPayload {
            event_type: "upemail".into(),
            list_id: LIST_ID.into(),
            old_email: Some("alice@example.com".into()),
            new_email: Some("bob@example.com".into()),
            ..Default::default()
        };
        let err = f.service.handle_webhook(payload).await.unwrap_err();
        assert!(matches!(err, MailingListError::EmailTaken(_)));

        let user = f.store.find_by_id(f.user.id).await.unwrap().unwrap();
        assert_eq!(user.email, "alice@example.com");
        let log = f.store.activity_entries().await;
        assert!(log.iter().any(|l| l.contains("another user with this email already exists")));
    }

    #[tokio::test]
    async fn test_create_mailing_list_from_provider() {
        let f = fixture_with(RecordingClient {
            members: vec![
                ProviderMember {
                    email_address: "Alice@Example.com".into(),
                    status: "subscribed".into(),
                },
                ProviderMember {
                    email_address: "bob@example.com".into(),
                    status: "unsubscribed".into(),
                },
                ProviderMember {
                    email_address: "stranger@example.com".into(),
                    status: "subscribed".into(),
                },
            ],
            ..Default::default()
        })
        .await;
        add_user(&f.store, "bob", "Bob", "Brown").await;

        let setup = f.service.create_mailing_list(false).await.unwrap();
        assert_eq!(setup, MailingListSetup::Created { users_added: 1 });
        let members = f.service.subscribers().await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].email, "alice@example.com");

        let again = f.service.create_mailing_list(false).await.unwrap();
        assert_eq!(again, MailingListSetup::AlreadyExists);

        let recreated = f.service.create_mailing_list(true).await.unwrap();
        assert_eq!(recreated, MailingListSetup::Created { users_added: 1 });
    }

    #[tokio::test]
    async fn test_subscribers_sorted_by_name() {
        let f = fixture().await;
        let zed = add_user(&f.store, "zed", "Aaron", "Zed").await;
        f.service.subscribe(f.user.id).await.unwrap();
        f.service.subscribe(zed.id).await.unwrap();

        let names: Vec<String> = f
            .service
            .subscribers()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.first_name)
            .collect();
        assert_eq!(names, vec!["Aaron", "Alice"]);
    }
}
