use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::accounts::{
    repo::{StoreError, UserStore},
    repo_types::{Profile, ProfileChanges, User, DEFAULT_AVATAR},
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    profiles: HashMap<Uuid, Profile>,
}

/// In-process store used by tests in place of Postgres.
#[derive(Default)]
pub struct MemoryUserStore {
    tables: Mutex<Tables>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<(User, Profile), StoreError> {
        let mut t = self.tables.lock().await;
        if t.users.values().any(|u| u.email == email) {
            return Err(StoreError::Duplicate);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            is_verified: false,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            session_version: 0,
            created_at: now,
            updated_at: now,
        };
        let profile = Profile {
            id: Uuid::new_v4(),
            user_id: user.id,
            first_name: None,
            last_name: None,
            image: DEFAULT_AVATAR.to_string(),
            description: None,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(user.id, user.clone());
        t.profiles.insert(user.id, profile.clone());
        Ok((user, profile))
    }

    async fn mark_verified(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut t = self.tables.lock().await;
        match t.users.get_mut(&id) {
            Some(u) if !u.is_verified => {
                u.is_verified = true;
                u.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_password(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<Option<User>, StoreError> {
        let mut t = self.tables.lock().await;
        Ok(t.users.get_mut(&id).map(|u| {
            u.password_hash = password_hash.to_string();
            u.session_version += 1;
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }

    async fn bump_session(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let mut t = self.tables.lock().await;
        Ok(t.users.get_mut(&id).map(|u| {
            u.session_version += 1;
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }

    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>, StoreError> {
        Ok(self.tables.lock().await.profiles.get(&user_id).cloned())
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<Option<Profile>, StoreError> {
        let mut t = self.tables.lock().await;
        Ok(t.profiles.get_mut(&user_id).map(|p| {
            if let Some(v) = &changes.first_name {
                p.first_name = Some(v.clone());
            }
            if let Some(v) = &changes.last_name {
                p.last_name = Some(v.clone());
            }
            if let Some(v) = &changes.image {
                p.image = v.clone();
            }
            if let Some(v) = &changes.description {
                p.description = Some(v.clone());
            }
            p.updated_at = OffsetDateTime::now_utc();
            p.clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_account_rejects_duplicate_email() {
        let store = MemoryUserStore::new();
        store.create_account("a@x.com", "h").await.unwrap();
        let err = store.create_account("a@x.com", "h").await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate));
    }

    #[tokio::test]
    async fn mark_verified_flips_once() {
        let store = MemoryUserStore::new();
        let (user, profile) = store.create_account("a@x.com", "h").await.unwrap();
        assert_eq!(profile.user_id, user.id);
        assert!(store.mark_verified(user.id).await.unwrap());
        assert!(!store.mark_verified(user.id).await.unwrap());
        assert!(store.find_by_id(user.id).await.unwrap().unwrap().is_verified);
    }

    #[tokio::test]
    async fn set_password_bumps_session_version() {
        let store = MemoryUserStore::new();
        let (user, _) = store.create_account("a@x.com", "old").await.unwrap();
        let updated = store.set_password(user.id, "new").await.unwrap().unwrap();
        assert_eq!(updated.password_hash, "new");
        assert_eq!(updated.session_version, user.session_version + 1);
        assert!(store.set_password(Uuid::new_v4(), "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bump_session_keeps_password() {
        let store = MemoryUserStore::new();
        let (user, _) = store.create_account("a@x.com", "h").await.unwrap();
        let updated = store.bump_session(user.id).await.unwrap().unwrap();
        assert_eq!(updated.session_version, user.session_version + 1);
        assert_eq!(updated.password_hash, "h");
        assert!(store.bump_session(Uuid::new_v4()).await.unwrap().is_none());
    }
}
