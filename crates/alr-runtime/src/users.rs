//! User directory port

use alr_core::UserId;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A user and their roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub roles: BTreeSet<String>,
}

impl User {
    /// User with the given roles
    pub fn new<I, S>(id: impl Into<UserId>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the user carries `role`
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Where users are kept
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Insert or replace; `true` when the user is new
    async fn upsert(&self, user: User) -> bool;

    async fn get(&self, id: &UserId) -> Option<User>;

    async fn remove(&self, id: &UserId) -> Option<User>;

    /// All users ordered by id
    async fn list(&self) -> Vec<User>;
}

/// Process-local directory
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<BTreeMap<UserId, User>>,
}

impl InMemoryUserDirectory {
    /// Empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn upsert(&self, user: User) -> bool {
        self.users.write().insert(user.id.clone(), user).is_none()
    }

    async fn get(&self, id: &UserId) -> Option<User> {
        self.users.read().get(id).cloned()
    }

    async fn remove(&self, id: &UserId) -> Option<User> {
        self.users.write().remove(id)
    }

    async fn list(&self) -> Vec<User> {
        self.users.read().values().cloned().collect()
    }
}
