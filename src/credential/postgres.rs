use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{CredentialStore, NewUser, StoreError, UserRecord};
use crate::authz::{AccountStatus, Role};

/// Postgres-backed credential store. Schema follows the platform's
/// users / roles / permissions layout: `users` carries the credential
/// columns, `role_permissions` joins fine-grained grants onto roles.
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "id, username, email, real_name, password_hash, role, status, email_verified, kindergarten_id";

fn user_from_row(row: &PgRow) -> Result<UserRecord, StoreError> {
    let role_code: String = row.try_get("role").map_err(backend)?;
    let status_code: String = row.try_get("status").map_err(backend)?;

    let role = Role::parse(&role_code)
        .ok_or_else(|| StoreError::Backend(format!("unrecognized role code: {role_code}")))?;
    let status = match status_code.as_str() {
        "active" => AccountStatus::Active,
        _ => AccountStatus::Disabled,
    };

    Ok(UserRecord {
        id: row.try_get("id").map_err(backend)?,
        username: row.try_get("username").map_err(backend)?,
        email: row.try_get("email").map_err(backend)?,
        real_name: row.try_get("real_name").map_err(backend)?,
        password_hash: row.try_get("password_hash").map_err(backend)?,
        role,
        status,
        email_verified: row.try_get("email_verified").map_err(backend)?,
        kindergarten_id: row.try_get("kindergarten_id").map_err(backend)?,
    })
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|d| d.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO users (id, username, email, real_name, password_hash, role, status, email_verified) \
             VALUES ($1, $2, $3, $4, $5, $6, 'active', false) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.real_name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate("username")
            } else {
                backend(e)
            }
        })?;

        user_from_row(&row)
    }

    async fn update_password_hash(&self, id: Uuid, hash: String) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(&hash)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_permissions(&self, id: Uuid) -> Result<HashSet<String>, StoreError> {
        // Role-default grants plus any fine-grained rows linked to the role.
        let user = self.find_by_id(id).await?.ok_or(StoreError::NotFound)?;
        let mut permissions: HashSet<String> = super::role_default_permissions(user.role)
            .iter()
            .map(|s| s.to_string())
            .collect();

        let rows = sqlx::query(
            "SELECT p.code FROM permissions p \
             INNER JOIN role_permissions rp ON rp.permission_id = p.id \
             INNER JOIN roles r ON r.id = rp.role_id \
             WHERE r.code = $1 AND p.status = 1",
        )
        .bind(user.role.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        for row in rows {
            permissions.insert(row.try_get("code").map_err(backend)?);
        }
        Ok(permissions)
    }

    async fn set_email_verified(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET email_verified = true WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
