//! Postgres-backed user store.
//!
//! Uses runtime-checked queries so the crate builds without a live database.
//! `ensure_schema` creates the `users` table on startup; the DDL lives in
//! `migrations/0001_create_users.sql`.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use roster_auth::{Role, User};
use roster_core::UserId;

use super::{StoreError, UserStore};

const SCHEMA: &str = include_str!("../../migrations/0001_create_users.sql");

const COLUMNS: &str =
    "id, name, email, role, provider, password_hash, created_at, updated_at, revision";

pub struct PostgresUserStore {
    pool: PgPool,
}

impl PostgresUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await.map_err(backend)?;
        Ok(Self::new(pool))
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await.map_err(backend)?;
        tracing::info!("users schema ensured");
        Ok(())
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Map a write error, turning the email unique index into `DuplicateEmail`.
fn write_error(e: sqlx::Error, email: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            if db.constraint() == Some("users_pkey") {
                StoreError::Conflict("user already exists".to_string())
            } else {
                StoreError::DuplicateEmail(email.to_string())
            }
        }
        _ => backend(e),
    }
}

fn row_to_user(row: &PgRow) -> Result<User, StoreError> {
    let role: String = row.try_get("role").map_err(backend)?;
    let role = Role::from_str(&role).map_err(|e| StoreError::Backend(e.to_string()))?;
    let revision: i64 = row.try_get("revision").map_err(backend)?;

    Ok(User {
        id: UserId::from_uuid(row.try_get("id").map_err(backend)?),
        name: row.try_get("name").map_err(backend)?,
        email: row.try_get("email").map_err(backend)?,
        role,
        provider: row.try_get("provider").map_err(backend)?,
        password_hash: row.try_get("password_hash").map_err(backend)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(backend)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(backend)?,
        revision: u64::try_from(revision).map_err(|e| StoreError::Backend(e.to_string()))?,
    })
}

fn revision_param(revision: u64) -> Result<i64, StoreError> {
    i64::try_from(revision).map_err(|e| StoreError::Backend(e.to_string()))
}

#[async_trait]
impl UserStore for PostgresUserStore {
    async fn get(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM users ORDER BY created_at, id"))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(row_to_user).collect()
    }

    async fn insert(&self, user: User) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO users ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.provider)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(revision_param(user.revision)?)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &user.email))?;
        Ok(())
    }

    async fn update(&self, user: User) -> Result<(), StoreError> {
        let expected = user
            .revision
            .checked_sub(1)
            .ok_or_else(|| StoreError::Conflict("update without a revision bump".to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE users
               SET name = $2, email = $3, role = $4, provider = $5,
                   password_hash = $6, updated_at = $7, revision = $8
             WHERE id = $1 AND revision = $9
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.provider)
        .bind(&user.password_hash)
        .bind(user.updated_at)
        .bind(revision_param(user.revision)?)
        .bind(revision_param(expected)?)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &user.email))?;

        if result.rows_affected() == 0 {
            return match self.get(&user.id).await? {
                None => Err(StoreError::NotFound),
                Some(stored) => Err(StoreError::Conflict(format!(
                    "stale revision (stored: {}, incoming: {})",
                    stored.revision, user.revision
                ))),
            };
        }
        Ok(())
    }

    async fn delete(&self, id: &UserId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
