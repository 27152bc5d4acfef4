use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::users::{
    repo::UserStore,
    repo_types::{NewUser, PublicUser, Role, User, UserChanges},
};

/// `UserStore` held in memory, with the same unique constraints as the table.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<Rows>,
}

#[derive(Default)]
struct Rows {
    next_id: i64,
    users: Vec<User>,
}

impl Rows {
    fn taken(&self, id: Option<i64>, username: Option<&str>, email: Option<&str>) -> bool {
        self.users.iter().any(|u| {
            Some(u.id) != id
                && (username.is_some_and(|n| same_username(n, &u.username))
                    || email.is_some_and(|e| e == u.email))
        })
    }
}

/// Usernames compare like the `lower(username)` unique index.
fn same_username(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored hash for a username, for assertions on what reached the store.
    pub fn password_hash_of(&self, username: &str) -> Option<String> {
        self.inner
            .lock()
            .users
            .iter()
            .find(|u| u.username == username)
            .map(|u| u.password_hash.clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_all(&self) -> Vec<PublicUser> {
        self.inner.lock().users.iter().cloned().map(PublicUser::from).collect()
    }

    async fn count(&self) -> Option<i64> {
        Some(self.inner.lock().users.len() as i64)
    }

    async fn find_by_id(&self, id: i64) -> Option<PublicUser> {
        let rows = self.inner.lock();
        rows.users.iter().find(|u| u.id == id).cloned().map(PublicUser::from)
    }

    async fn find_by_username(&self, username: &str) -> Option<User> {
        let rows = self.inner.lock();
        rows.users.iter().find(|u| same_username(&u.username, username)).cloned()
    }

    async fn find_by_email(&self, email: &str) -> Option<User> {
        let rows = self.inner.lock();
        rows.users.iter().find(|u| u.email == email).cloned()
    }

    async fn create(&self, user: NewUser) -> Option<PublicUser> {
        let mut rows = self.inner.lock();
        if rows.taken(None, Some(&user.username), Some(&user.email)) {
            return None;
        }
        rows.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let row = User {
            id: rows.next_id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        rows.users.push(row.clone());
        Some(row.into())
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Option<PublicUser> {
        if changes.is_empty() {
            return None;
        }
        let mut rows = self.inner.lock();
        if rows.taken(Some(id), changes.username.as_deref(), changes.email.as_deref()) {
            return None;
        }
        let row = rows.users.iter_mut().find(|u| u.id == id)?;
        if let Some(username) = changes.username {
            row.username = username;
        }
        if let Some(email) = changes.email {
            row.email = email;
        }
        if let Some(hash) = changes.password_hash {
            row.password_hash = hash;
        }
        row.updated_at = OffsetDateTime::now_utc();
        Some(row.clone().into())
    }

    async fn update_role(&self, id: i64, role: Role) -> Option<PublicUser> {
        let mut rows = self.inner.lock();
        let row = rows.users.iter_mut().find(|u| u.id == id)?;
        row.role = role;
        row.updated_at = OffsetDateTime::now_utc();
        Some(row.clone().into())
    }

    async fn delete(&self, id: i64) -> bool {
        let mut rows = self.inner.lock();
        let before = rows.users.len();
        rows.users.retain(|u| u.id != id);
        rows.users.len() < before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "hash".into(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn create_assigns_ids_and_enforces_uniqueness() {
        let store = MemoryUserStore::new();
        let alice = store.create(new_user("alice", "a@x.com")).await.unwrap();
        let bob = store.create(new_user("bob", "b@x.com")).await.unwrap();
        assert_ne!(alice.id, bob.id);

        assert!(store.create(new_user("alice", "other@x.com")).await.is_none());
        assert!(store.create(new_user("carol", "a@x.com")).await.is_none());
        assert_eq!(store.count().await, Some(2));
    }

    #[tokio::test]
    async fn usernames_ignore_case() {
        let store = MemoryUserStore::new();
        let alice = store.create(new_user("alice", "a@x.com")).await.unwrap();

        assert!(store.create(new_user("Alice", "other@x.com")).await.is_none());
        assert_eq!(store.find_by_username("ALICE").await.unwrap().id, alice.id);
        // Re-casing your own name is not a clash.
        let renamed = store
            .update(
                alice.id,
                UserChanges {
                    username: Some("Alice".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.username, "Alice");
    }

    #[tokio::test]
    async fn update_changes_only_supplied_fields() {
        let store = MemoryUserStore::new();
        let alice = store.create(new_user("alice", "a@x.com")).await.unwrap();
        let updated = store
            .update(
                alice.id,
                UserChanges {
                    email: Some("alice@x.com".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.username, "alice");
        assert_eq!(updated.email, "alice@x.com");
        assert!(updated.updated_at >= alice.updated_at);
        assert!(store.update(alice.id, UserChanges::default()).await.is_none());
        assert!(store
            .update(
                999,
                UserChanges {
                    username: Some("ghost".into()),
                    ..Default::default()
                }
            )
            .await
            .is_none());
    }

    #[tokio::test]
    async fn update_role_and_delete() {
        let store = MemoryUserStore::new();
        let alice = store.create(new_user("alice", "a@x.com")).await.unwrap();
        let promoted = store.update_role(alice.id, Role::Admin).await.unwrap();
        assert_eq!(promoted.role, Role::Admin);

        assert!(store.delete(alice.id).await);
        assert!(!store.delete(alice.id).await);
        assert!(store.find_by_id(alice.id).await.is_none());
    }
}
