use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use roster_auth::User;
use roster_core::UserId;

use super::{StoreError, UserStore};

/// In-memory user store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    inner: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Backend("user store lock poisoned".to_string())
}

fn email_taken(map: &HashMap<UserId, User>, email: &str, except: Option<UserId>) -> bool {
    map.values()
        .any(|u| u.email == email && Some(u.id) != except)
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let map = self.inner.read().map_err(poisoned)?;
        Ok(map.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let map = self.inner.read().map_err(poisoned)?;
        Ok(map.values().find(|u| u.email == email).cloned())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let map = self.inner.read().map_err(poisoned)?;
        let mut users: Vec<User> = map.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn insert(&self, user: User) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        if map.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("user {} already exists", user.id)));
        }
        if email_taken(&map, &user.email, None) {
            return Err(StoreError::DuplicateEmail(user.email));
        }
        map.insert(user.id, user);
        Ok(())
    }

    async fn update(&self, user: User) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        let stored = map.get(&user.id).ok_or(StoreError::NotFound)?;

        if stored.revision + 1 != user.revision {
            return Err(StoreError::Conflict(format!(
                "stale revision (stored: {}, incoming: {})",
                stored.revision, user.revision
            )));
        }
        if email_taken(&map, &user.email, Some(user.id)) {
            return Err(StoreError::DuplicateEmail(user.email));
        }

        map.insert(user.id, user);
        Ok(())
    }

    async fn delete(&self, id: &UserId) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        map.remove(id).map(|_| ()).ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use roster_auth::{NewUser, Role, UserUpdate};

    use super::*;

    fn user(email: &str) -> User {
        let input = NewUser {
            name: "Test".to_string(),
            email: email.to_string(),
            password: "pw".to_string(),
            role: Role::User,
        };
        User::register(&input, "$argon2id$fake".to_string(), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn insert_get_and_find() {
        let store = InMemoryUserStore::new();
        let u = user("a@example.com");
        store.insert(u.clone()).await.unwrap();

        assert_eq!(store.get(&u.id).await.unwrap(), Some(u.clone()));
        assert_eq!(store.find_by_email("a@example.com").await.unwrap(), Some(u));
        assert_eq!(store.find_by_email("b@example.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = InMemoryUserStore::new();
        store.insert(user("a@example.com")).await.unwrap();

        let err = store.insert(user("a@example.com")).await.unwrap_err();
        assert_eq!(err, StoreError::DuplicateEmail("a@example.com".to_string()));
    }

    #[tokio::test]
    async fn update_checks_revision_and_email() {
        let store = InMemoryUserStore::new();
        let a = user("a@example.com");
        let b = user("b@example.com");
        store.insert(a.clone()).await.unwrap();
        store.insert(b.clone()).await.unwrap();

        let mut changed = a.clone();
        changed
            .apply_update(
                UserUpdate {
                    email: Some("b@example.com".to_string()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap();
        assert!(matches!(
            store.update(changed).await,
            Err(StoreError::DuplicateEmail(_))
        ));

        let mut renamed = a.clone();
        renamed
            .apply_update(
                UserUpdate {
                    name: Some("Renamed".to_string()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap();
        store.update(renamed.clone()).await.unwrap();

        // Same revision again is stale.
        assert!(matches!(
            store.update(renamed).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.get(&a.id).await.unwrap().unwrap().name, "Renamed");
    }

    #[tokio::test]
    async fn list_is_oldest_first() {
        let store = InMemoryUserStore::new();
        let mut older = user("old@example.com");
        older.created_at = Utc::now() - Duration::hours(1);
        let newer = user("new@example.com");

        store.insert(newer.clone()).await.unwrap();
        store.insert(older.clone()).await.unwrap();

        let ids: Vec<UserId> = store.list().await.unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![older.id, newer.id]);
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let store = InMemoryUserStore::new();
        let u = user("a@example.com");
        store.insert(u.clone()).await.unwrap();

        store.delete(&u.id).await.unwrap();
        assert_eq!(store.delete(&u.id).await, Err(StoreError::NotFound));
        assert_eq!(store.get(&u.id).await.unwrap(), None);
    }
}
