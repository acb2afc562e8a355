use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Avatar path assigned to every new profile.
pub const DEFAULT_AVATAR: &str = "accounts/avatars/default.jpg";

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String, // unique, lowercased
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub is_verified: bool,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub session_version: i32, // bumped on every password change
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// One per user, created together with the user row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image: String,
    pub description: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Partial profile update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image: Option<String>,
    pub description: Option<String>,
}

#[cfg(test)]
impl User {
    pub(crate) fn for_tests(email: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: String::new(),
            is_verified: false,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            session_version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
