use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub session_token: Option<String>,
    pub reset_token: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Single-field lookup key for [`UserStore::find_user_by`].
#[derive(Debug, Clone)]
pub enum UserQuery {
    Id(Uuid),
    Email(String),
    SessionToken(String),
    ResetToken(String),
}

/// Column updates applied to an existing user.
///
/// Outer `None` leaves the column untouched; `Some(None)` clears a nullable
/// column.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub password_hash: Option<String>,
    pub session_token: Option<Option<String>>,
    pub reset_token: Option<Option<String>>,
}

impl UserPatch {
    pub fn session_token(token: Option<String>) -> Self {
        Self {
            session_token: Some(token),
            ..Default::default()
        }
    }

    pub fn reset_token(token: Option<String>) -> Self {
        Self {
            reset_token: Some(token),
            ..Default::default()
        }
    }

    /// Replace the password hash and consume the reset token in one update.
    pub fn password_update(hash: String) -> Self {
        Self {
            password_hash: Some(hash),
            reset_token: Some(None),
            ..Default::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no matching user")]
    NotFound,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Persistence boundary for user records.
///
/// Lookup misses are values, not errors: `find_user_by` reports them as
/// `Ok(None)`, only `update_user` signals [`StoreError::NotFound`].
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by(&self, query: UserQuery) -> Result<Option<User>, StoreError>;

    async fn add_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<(), StoreError>;
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, session_token, reset_token, created_at";

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_user_by(&self, query: UserQuery) -> Result<Option<User>, StoreError> {
        let user = match query {
            UserQuery::Id(id) => {
                sqlx::query_as::<_, User>(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
                ))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
            }
            UserQuery::Email(email) => {
                sqlx::query_as::<_, User>(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
                ))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?
            }
            UserQuery::SessionToken(token) => {
                sqlx::query_as::<_, User>(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE session_token = $1"
                ))
                .bind(token)
                .fetch_optional(&self.pool)
                .await?
            }
            UserQuery::ResetToken(token) => {
                sqlx::query_as::<_, User>(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE reset_token = $1"
                ))
                .bind(token)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(user)
    }

    async fn add_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, password_hash)
            VALUES ($1, $2)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<(), StoreError> {
        // Single statement so concurrent token overwrites stay last-write-wins.
        let result = sqlx::query(
            r#"
            UPDATE users
               SET password_hash = COALESCE($2, password_hash),
                   session_token = CASE WHEN $3 THEN $4 ELSE session_token END,
                   reset_token   = CASE WHEN $5 THEN $6 ELSE reset_token END
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(patch.password_hash)
        .bind(patch.session_token.is_some())
        .bind(patch.session_token.flatten())
        .bind(patch.reset_token.is_some())
        .bind(patch.reset_token.flatten())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

/// In-process store used by tests and `AppState::fake()`.
#[derive(Default)]
pub struct MemoryUserStore {
    users: tokio::sync::Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_user_by(&self, query: UserQuery) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().await;
        let found = users
            .iter()
            .find(|u| match &query {
                UserQuery::Id(id) => u.id == *id,
                UserQuery::Email(email) => u.email == *email,
                UserQuery::SessionToken(token) => u.session_token.as_deref() == Some(token),
                UserQuery::ResetToken(token) => u.reset_token.as_deref() == Some(token),
            })
            .cloned();
        Ok(found)
    }

    async fn add_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            session_token: None,
            reset_token: None,
            created_at: OffsetDateTime::now_utc(),
        };
        self.users.lock().await.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<(), StoreError> {
        let mut users = self.users.lock().await;
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound)?;
        if let Some(hash) = patch.password_hash {
            user.password_hash = hash;
        }
        if let Some(token) = patch.session_token {
            user.session_token = token;
        }
        if let Some(token) = patch.reset_token {
            user.reset_token = token;
        }
        Ok(())
    }
}
