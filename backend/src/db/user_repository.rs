use leafscan_shared::UserId;
use sqlx::SqlitePool;

use super::RepositoryError;
use super::models::{User, UserRow};

#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_user_by_id(&self, user_id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, email, role FROM users WHERE id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let total = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }
}

#[cfg(test)]
impl UserRepository {
    pub async fn create_user(
        &self,
        email: &str,
        role: crate::auth::models::Role,
    ) -> Result<UserId, RepositoryError> {
        let result = sqlx::query("INSERT INTO users (email, role) VALUES (?, ?)")
            .bind(email)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;
        Ok(UserId(result.last_insert_rowid()))
    }
}
