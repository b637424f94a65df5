use crate::error::{Error, Result};
use crate::resolver::DirectoryEntry;
use async_trait::async_trait;
use sqlx::mysql::MySqlPool;
use sqlx::postgres::PgPool;
use tracing::debug;

/// The application's persisted representation of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub enabled: bool,
    pub created_at: String,
    pub last_modified: String,
}

impl LocalUser {
    /// A fresh record mirroring a directory entry, with no local credential.
    pub fn from_entry(entry: &DirectoryEntry) -> Self {
        let now = chrono::Utc::now().to_rfc3339();

        Self {
            username: entry.username.clone(),
            email: entry.email.clone(),
            password_hash: None,
            enabled: true,
            created_at: now.clone(),
            last_modified: now,
        }
    }
}

type UserRow = (String, Option<String>, Option<String>, bool, String, String);

fn row_to_user(row: UserRow) -> LocalUser {
    let (username, email, password_hash, enabled, created_at, last_modified) = row;
    LocalUser { username, email, password_hash, enabled, created_at, last_modified }
}

/// Local identity store keyed by a model identifier (the table holding the
/// user records).
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_username(&self, model: &str, username: &str) -> Result<Option<LocalUser>>;
    async fn upsert(&self, model: &str, user: &LocalUser) -> Result<()>;
}

pub enum DatabaseBackend {
    MySql(MySqlPool),
    Postgres(PgPool),
}

pub struct SqlUserStore {
    backend: DatabaseBackend,
}

impl SqlUserStore {
    pub async fn connect(backend: &str, url: &str) -> Result<Self> {
        let backend = match backend.to_lowercase().as_str() {
            "mysql" => {
                let pool = MySqlPool::connect(url)
                    .await
                    .map_err(|e| Error::Config(format!("Failed to connect to MySQL database: {e}")))?;
                DatabaseBackend::MySql(pool)
            }
            "postgres" | "pgsql" | "postgresql" => {
                let pool = PgPool::connect(url)
                    .await
                    .map_err(|e| Error::Config(format!("Failed to connect to Postgres database: {e}")))?;
                DatabaseBackend::Postgres(pool)
            }
            _ => return Err(Error::Config(format!("Unsupported database backend: {backend}"))),
        };

        Ok(Self { backend })
    }

    // Table names cannot be bound as statement parameters, so the model
    // identifier is interpolated and must be a plain identifier.
    fn check_model(model: &str) -> Result<()> {
        let valid = !model.is_empty()
            && model.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

        if valid {
            Ok(())
        } else {
            Err(Error::Config(format!("Invalid model identifier: {model}")))
        }
    }
}

#[async_trait]
impl UserStore for SqlUserStore {
    async fn find_by_username(&self, model: &str, username: &str) -> Result<Option<LocalUser>> {
        Self::check_model(model)?;

        let row: Option<UserRow> = match &self.backend {
            DatabaseBackend::MySql(pool) => {
                let sql = format!(
                    "SELECT username, email, password_hash, enabled, created_at, last_modified \
                     FROM {model} WHERE username = ?"
                );
                sqlx::query_as(&sql).bind(username).fetch_optional(pool).await?
            }
            DatabaseBackend::Postgres(pool) => {
                let sql = format!(
                    "SELECT username, email, password_hash, enabled, created_at, last_modified \
                     FROM {model} WHERE username = $1"
                );
                sqlx::query_as(&sql).bind(username).fetch_optional(pool).await?
            }
        };

        if row.is_none() {
            debug!("User '{}' not found in {}", username, model);
        }

        Ok(row.map(row_to_user))
    }

    async fn upsert(&self, model: &str, user: &LocalUser) -> Result<()> {
        Self::check_model(model)?;

        match &self.backend {
            DatabaseBackend::MySql(pool) => {
                let sql = format!(
                    "INSERT INTO {model} \
                     (username, email, password_hash, enabled, created_at, last_modified) \
                     VALUES (?, ?, ?, ?, ?, ?) \
                     ON DUPLICATE KEY UPDATE email = VALUES(email), \
                     password_hash = VALUES(password_hash), enabled = VALUES(enabled), \
                     last_modified = VALUES(last_modified)"
                );
                sqlx::query(&sql)
                    .bind(&user.username)
                    .bind(&user.email)
                    .bind(&user.password_hash)
                    .bind(user.enabled)
                    .bind(&user.created_at)
                    .bind(&user.last_modified)
                    .execute(pool)
                    .await?;
            }
            DatabaseBackend::Postgres(pool) => {
                let sql = format!(
                    "INSERT INTO {model} \
                     (username, email, password_hash, enabled, created_at, last_modified) \
                     VALUES ($1, $2, $3, $4, $5, $6) \
                     ON CONFLICT (username) DO UPDATE SET email = EXCLUDED.email, \
                     password_hash = EXCLUDED.password_hash, enabled = EXCLUDED.enabled, \
                     last_modified = EXCLUDED.last_modified"
                );
                sqlx::query(&sql)
                    .bind(&user.username)
                    .bind(&user.email)
                    .bind(&user.password_hash)
                    .bind(user.enabled)
                    .bind(&user.created_at)
                    .bind(&user.last_modified)
                    .execute(pool)
                    .await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        SqlUserStore::check_model("users").unwrap();
        SqlUserStore::check_model("ldap_users2").unwrap();
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        assert!(SqlUserStore::check_model("").is_err());
        assert!(SqlUserStore::check_model("users; DROP TABLE users").is_err());
        assert!(SqlUserStore::check_model("users.other").is_err());
    }
}
