pub mod postgres;

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::authz::{AccountStatus, Role};

pub use postgres::PgCredentialStore;

/// Stored user row as seen by the auth core. The full kindergarten entity
/// schema lives with the business-data collaborator; this is only what the
/// envelope needs.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub real_name: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub status: AccountStatus,
    pub email_verified: bool,
    pub kindergarten_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub real_name: Option<String>,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate {0}")]
    Duplicate(&'static str),
    #[error("record not found")]
    NotFound,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Adapter over the external user/role/permission store. Typed lookups
/// only; the auth core never writes business entities through this.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, StoreError>;
    async fn update_password_hash(&self, id: Uuid, hash: String) -> Result<(), StoreError>;
    async fn list_permissions(&self, id: Uuid) -> Result<HashSet<String>, StoreError>;
    async fn set_email_verified(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Permission codes granted to each role out of the box. Fine-grained
/// grants on top of these come from the store's role_permissions rows.
pub fn role_default_permissions(role: Role) -> &'static [&'static str] {
    match role {
        Role::SuperAdmin | Role::Admin => &[],
        Role::Principal => &[
            "dashboard:view",
            "enrollment:overview:view",
            "enrollment:plans:view",
            "enrollment:applications:view",
            "activity:view",
            "finance:view",
            "report:read",
            "report:generate",
        ],
        Role::Teacher => &[
            "activity:view",
            "activity:manage",
            "task:view",
            "task:manage",
            "enrollment:interview:view",
        ],
        Role::Parent => &[
            "parent:view",
            "children:view",
            "activity:view",
            "notification:view",
        ],
    }
}

#[derive(Default)]
struct MemoryInner {
    users: HashMap<Uuid, UserRecord>,
    grants: HashMap<Uuid, HashSet<String>>,
}

/// In-memory credential store for development and tests. Seed it with
/// [`MemoryCredentialStore::insert_user`]; role defaults are granted
/// automatically.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: UserRecord) {
        let mut inner = self.inner.lock().unwrap();
        let defaults: HashSet<String> =
            role_default_permissions(user.role).iter().map(|s| s.to_string()).collect();
        inner.grants.entry(user.id).or_default().extend(defaults);
        inner.users.insert(user.id, user);
    }

    pub fn grant_permission(&self, id: Uuid, code: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.grants.entry(id).or_default().insert(code.to_string());
    }

    pub fn set_status(&self, id: Uuid, status: AccountStatus) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(user) = inner.users.get_mut(&id) {
            user.status = status;
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate("username"));
        }
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate("email"));
        }

        let record = UserRecord {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            real_name: user.real_name,
            password_hash: user.password_hash,
            role: user.role,
            status: AccountStatus::Active,
            email_verified: false,
            kindergarten_id: None,
        };

        let defaults: HashSet<String> =
            role_default_permissions(record.role).iter().map(|s| s.to_string()).collect();
        inner.grants.insert(record.id, defaults);
        inner.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_password_hash(&self, id: Uuid, hash: String) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.password_hash = hash;
        Ok(())
    }

    async fn list_permissions(&self, id: Uuid) -> Result<HashSet<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.grants.get(&id).cloned().unwrap_or_default())
    }

    async fn set_email_verified(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let user = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.email_verified = true;
        Ok(())
    }
}
