// User group storage (the mailing list is the "subscribed" group)

use async_trait::async_trait;
use sqlx::PgPool;

use crate::auth::User;
use crate::db::StoreError;

#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Create the group if missing; true when it was created
    async fn ensure_group(&self, name: &str) -> Result<bool, StoreError>;

    /// Delete the group and its memberships; true when it existed
    async fn delete_group(&self, name: &str) -> Result<bool, StoreError>;

    /// Members ordered by first then last name
    async fn members(&self, name: &str) -> Result<Vec<User>, StoreError>;

    async fn is_member(&self, name: &str, user_id: i32) -> Result<bool, StoreError>;

    async fn add_member(&self, name: &str, user_id: i32) -> Result<(), StoreError>;

    async fn remove_member(&self, name: &str, user_id: i32) -> Result<(), StoreError>;

    /// Add every user whose email is listed (case-insensitive); returns how many matched
    async fn add_members_by_email(&self, name: &str, emails: &[String]) -> Result<usize, StoreError>;
}

pub struct PgGroupRepository {
    pool: PgPool,
}

impl PgGroupRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupRepository for PgGroupRepository {
    async fn ensure_group(&self, name: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("INSERT INTO user_groups (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_group(&self, name: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM user_groups WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn members(&self, name: &str) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT u.id, u.username, u.email, u.first_name, u.last_name, u.password_hash, \
             u.is_staff, u.created_at \
             FROM users u \
             JOIN user_group_members m ON m.user_id = u.id \
             JOIN user_groups g ON g.id = m.group_id \
             WHERE g.name = $1 \
             ORDER BY u.first_name, u.last_name",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn is_member(&self, name: &str, user_id: i32) -> Result<bool, StoreError> {
        let member: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM user_group_members m \
             JOIN user_groups g ON g.id = m.group_id WHERE g.name = $1 AND m.user_id = $2)",
        )
        .bind(name)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(member)
    }

    async fn add_member(&self, name: &str, user_id: i32) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_group_members (group_id, user_id) \
             SELECT id, $2 FROM user_groups WHERE name = $1 ON CONFLICT DO NOTHING",
        )
        .bind(name)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_member(&self, name: &str, user_id: i32) -> Result<(), StoreError> {
        sqlx::query(
            "DELETE FROM user_group_members m USING user_groups g \
             WHERE g.id = m.group_id AND g.name = $1 AND m.user_id = $2",
        )
        .bind(name)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_members_by_email(&self, name: &str, emails: &[String]) -> Result<usize, StoreError> {
        let lowered: Vec<String> = emails.iter().map(|e| e.to_lowercase()).collect();
        let mut tx = self.pool.begin().await?;

        let matched: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE LOWER(email) = ANY($1)")
            .bind(&lowered)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO user_group_members (group_id, user_id) \
             SELECT g.id, u.id FROM user_groups g, users u \
             WHERE g.name = $1 AND LOWER(u.email) = ANY($2) ON CONFLICT DO NOTHING",
        )
        .bind(name)
        .bind(&lowered)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(matched as usize)
    }
}
