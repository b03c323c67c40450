use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::UserStore;
use crate::error::{ StoreError, StoreResult };
use crate::models::account::{ LoginSession, User };

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    by_email: HashMap<String, String>,
    logins: HashMap<String, LoginSession>,
}

#[derive(Default)]
pub struct MemoryUserStore {
    tables: RwLock<Tables>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert_user(&self, user: User) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.by_email.contains_key(&user.email) {
            return Err(StoreError::AlreadyExists(user.email));
        }
        tables.by_email.insert(user.email.clone(), user.id.clone());
        tables.users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.by_email.get(email).and_then(|id| tables.users.get(id)).cloned())
    }

    async fn find_by_id(&self, user_id: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(user_id).cloned())
    }

    /// Expired logins are dropped on every save.
    async fn save_login(&self, login: LoginSession) -> StoreResult<()> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        tables.logins.retain(|_, existing| existing.expires_at > now);
        tables.logins.insert(login.token_id.clone(), login);
        Ok(())
    }

    async fn find_login(&self, token_id: &str) -> StoreResult<Option<LoginSession>> {
        let mut tables = self.tables.write().await;
        let expired = tables.logins
            .get(token_id)
            .is_some_and(|login| login.expires_at <= Utc::now());
        if expired {
            tables.logins.remove(token_id);
            return Ok(None);
        }
        Ok(tables.logins.get(token_id).cloned())
    }

    async fn delete_login(&self, token_id: &str) -> StoreResult<()> {
        self.tables.write().await.logins.remove(token_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn login(token_id: &str, expires_in: Duration) -> LoginSession {
        LoginSession {
            token_id: token_id.into(),
            user_id: "u1".into(),
            expires_at: Utc::now() + expires_in,
            device_info: None,
        }
    }

    #[tokio::test]
    async fn expired_logins_are_pruned_on_save() {
        let store = MemoryUserStore::new();
        store.save_login(login("old", Duration::seconds(-5))).await.unwrap();
        store.save_login(login("fresh", Duration::hours(1))).await.unwrap();

        let tables = store.tables.read().await;
        assert_eq!(tables.logins.len(), 1);
        assert!(tables.logins.contains_key("fresh"));
    }

    #[tokio::test]
    async fn expired_login_is_not_found() {
        let store = MemoryUserStore::new();
        store.save_login(login("old", Duration::seconds(-5))).await.unwrap();

        assert!(store.find_login("old").await.unwrap().is_none());
        assert!(store.tables.read().await.logins.is_empty());
        assert!(store.find_login("missing").await.unwrap().is_none());
    }
}
