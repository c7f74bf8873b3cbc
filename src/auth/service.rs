// Authentication service - business logic layer

use std::sync::Arc;

use crate::auth::{
    error::AuthError,
    models::{AuthResponse, UpdateProfileRequest, User},
    password::PasswordService,
    repository::UserRepository,
    token::TokenService,
};
use crate::db::StoreError;

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, tokens: Arc<TokenService>) -> Self {
        Self { users, tokens }
    }

    /// Login a user by username and password
    ///
    /// Unknown usernames and wrong passwords return the same error.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let user = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !PasswordService::verify_password(password, &user.password_hash)? {
            tracing::warn!("Failed login for username {}", username);
            return Err(AuthError::InvalidCredentials);
        }

        let access_token = self.tokens.generate_access_token(&user)?;
        tracing::info!("User {} logged in", user.id);
        Ok(AuthResponse {
            access_token,
            user: user.into(),
        })
    }

    /// Re-confirm a staff member's password before a privileged change
    pub async fn confirm_password(&self, user_id: i32, password: &str) -> Result<User, AuthError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound(user_id))?;

        if !PasswordService::verify_password(password, &user.password_hash)? {
            tracing::warn!("Password re-confirmation failed for staff user {}", user_id);
            return Err(AuthError::PasswordConfirmationFailed);
        }
        Ok(user)
    }

    pub async fn get_user(&self, user_id: i32) -> Result<User, AuthError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound(user_id))
    }

    /// Save a user's own name and email edits
    ///
    /// Returns the account as it was before and after the change.
    pub async fn update_profile(
        &self,
        user_id: i32,
        request: UpdateProfileRequest,
    ) -> Result<(User, User), AuthError> {
        let before = self.get_user(user_id).await?;
        let first_name = request.first_name.trim();
        let last_name = request.last_name.trim();
        let email = request.email.trim();

        if first_name != before.first_name || last_name != before.last_name {
            self.users.update_names(user_id, first_name, last_name).await?;
        }
        if !email.eq_ignore_ascii_case(&before.email) {
            if let Some(other) = self.users.find_by_email(email).await? {
                if other.id != user_id {
                    return Err(AuthError::EmailTaken(email.to_string()));
                }
            }
            self.users
                .update_email(user_id, email)
                .await
                .map_err(|e| match e {
                    StoreError::Duplicate(_) => AuthError::EmailTaken(email.to_string()),
                    other => AuthError::Storage(other),
                })?;
        }

        let after = self.get_user(user_id).await?;
        tracing::info!("User {} updated their profile", user_id);
        Ok((before, after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::NewUser;
    use crate::memory::MemoryStore;

    async fn service_with_user(password: &str, is_staff: bool) -> (AuthService, User) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .create_user(NewUser {
                username: "instructor".into(),
                email: "instructor@example.com".into(),
                first_name: "Tess".into(),
                last_name: "Teacher".into(),
                password_hash: PasswordService::hash_password(password).unwrap(),
                is_staff,
            })
            .await
            .unwrap();
        let service = AuthService::new(store, Arc::new(TokenService::new("secret".into())));
        (service, user)
    }

    #[tokio::test]
    async fn test_login_success_returns_token() {
        let (service, user) = service_with_user("s3cret-pass", true).await;
        let response = service.login("instructor", "s3cret-pass").await.unwrap();
        assert!(!response.access_token.is_empty());
        assert_eq!(response.user.id, user.id);
        assert!(response.user.is_staff);
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let (service, _) = service_with_user("s3cret-pass", false).await;
        let result = service.login("instructor", "nope").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_login_unknown_user() {
        let (service, _) = service_with_user("s3cret-pass", false).await;
        let result = service.login("nobody", "s3cret-pass").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_update_profile_saves_names_and_email() {
        let (service, user) = service_with_user("s3cret-pass", false).await;
        let (before, after) = service
            .update_profile(
                user.id,
                UpdateProfileRequest {
                    first_name: " Tessa ".into(),
                    last_name: "Teacher".into(),
                    email: "tessa@example.com".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(before.first_name, "Tess");
        assert_eq!(before.email, "instructor@example.com");
        assert_eq!(after.first_name, "Tessa");
        assert_eq!(after.email, "tessa@example.com");
    }

    #[tokio::test]
    async fn test_update_profile_rejects_taken_email() {
        let (service, user) = service_with_user("s3cret-pass", false).await;
        service
            .users
            .create_user(NewUser {
                username: "other".into(),
                email: "other@example.com".into(),
                first_name: "O".into(),
                last_name: "Ther".into(),
                password_hash: "x".into(),
                is_staff: false,
            })
            .await
            .unwrap();
        let result = service
            .update_profile(
                user.id,
                UpdateProfileRequest {
                    first_name: "Tess".into(),
                    last_name: "Teacher".into(),
                    email: "other@example.com".into(),
                },
            )
            .await;
        assert!(matches!(result, Err(AuthError::EmailTaken(_))));
        assert_eq!(service.get_user(user.id).await.unwrap().email, "instructor@example.com");
    }

    #[tokio::test]
    async fn test_confirm_password() {
        let (service, user) = service_with_user("s3cret-pass", true).await;
        assert!(service.confirm_password(user.id, "s3cret-pass").await.is_ok());
        assert!(matches!(
            service.confirm_password(user.id, "wrong").await,
            Err(AuthError::PasswordConfirmationFailed)
        ));
    }
}
