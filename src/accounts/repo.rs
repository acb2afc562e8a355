use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::accounts::repo_types::{Profile, ProfileChanges, User, DEFAULT_AVATAR};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    Duplicate,
    #[error("store failure: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        let duplicate = e
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        if duplicate {
            StoreError::Duplicate
        } else {
            StoreError::Backend(e.into())
        }
    }
}

/// Persistent user state. Every call reads or writes current rows; nothing is cached.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Creates the user and its profile atomically.
    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<(User, Profile), StoreError>;

    /// Flips `is_verified` if it is still false. Returns whether this call flipped it.
    async fn mark_verified(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Stores a new hash and bumps the session version.
    /// Returns the updated user, or `None` if it no longer exists.
    async fn set_password(&self, id: Uuid, password_hash: &str)
        -> Result<Option<User>, StoreError>;

    /// Bumps the session version alone, ending every outstanding session.
    async fn bump_session(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError>;
    async fn update_profile(
        &self,
        user_id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Option<Profile>, StoreError>;
}

const USER_COLUMNS: &str = "id, email, password_hash, is_verified, is_active, is_staff, \
     is_superuser, session_version, created_at, updated_at";

const PROFILE_COLUMNS: &str =
    "id, user_id, first_name, last_name, image, description, created_at, updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<(User, Profile), StoreError> {
        let mut tx = self.db.begin().await?;

        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash) VALUES ($1, $2) RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await?;

        let profile = sqlx::query_as::<_, Profile>(&format!(
            "INSERT INTO profiles (user_id, image) VALUES ($1, $2) RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(user.id)
        .bind(DEFAULT_AVATAR)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((user, profile))
    }

    async fn mark_verified(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET is_verified = TRUE, updated_at = now()
             WHERE id = $1 AND is_verified = FALSE
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET password_hash = $2,
                   session_version = session_version + 1,
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn bump_session(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET session_version = session_version + 1,
                   updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(profile)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Option<Profile>, StoreError> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            r#"
            UPDATE profiles
               SET first_name = COALESCE($2, first_name),
                   last_name = COALESCE($3, last_name),
                   image = COALESCE($4, image),
                   description = COALESCE($5, description),
                   updated_at = now()
             WHERE user_id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(changes.first_name.as_deref())
        .bind(changes.last_name.as_deref())
        .bind(changes.image.as_deref())
        .bind(changes.description.as_deref())
        .fetch_optional(&self.db)
        .await?;
        Ok(profile)
    }
}
