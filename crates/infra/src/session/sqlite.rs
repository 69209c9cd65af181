use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::instrument;

use keystone_core::DomainResult;

use super::{SessionStore, SessionToken, expiry};
use crate::store::bounded;
use crate::store::sqlite::map_sqlx_error;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS auth_session (
        token      TEXT    PRIMARY KEY,
        username   TEXT    NOT NULL,
        expires_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS auth_session_by_expiry ON auth_session (expires_at)",
    "CREATE INDEX IF NOT EXISTS auth_session_by_username ON auth_session (username)",
];

/// Sessions persisted next to the relationship tables.
///
/// Expiry is stored as unix seconds.
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> DomainResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate_sessions", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    #[instrument(skip(self), err)]
    async fn create(&self, username: &str, ttl: Duration) -> DomainResult<SessionToken> {
        let expires_at = expiry(ttl)?.timestamp();
        let token = SessionToken::generate();
        bounded(self.timeout, "create_session", async {
            sqlx::query("INSERT INTO auth_session (token, username, expires_at) VALUES (?, ?, ?)")
                .bind(token.as_str())
                .bind(username)
                .bind(expires_at)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("create_session", e))?;
            Ok(())
        })
        .await?;
        Ok(token)
    }

    async fn resolve(&self, token: &SessionToken) -> DomainResult<Option<String>> {
        bounded(self.timeout, "resolve_session", async {
            sqlx::query_scalar("SELECT username FROM auth_session WHERE token = ? AND expires_at > ?")
                .bind(token.as_str())
                .bind(Utc::now().timestamp())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("resolve_session", e))
        })
        .await
    }

    async fn destroy(&self, token: &SessionToken) -> DomainResult<()> {
        bounded(self.timeout, "destroy_session", async {
            sqlx::query("DELETE FROM auth_session WHERE token = ?")
                .bind(token.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("destroy_session", e))?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self), err)]
    async fn destroy_for_user(&self, username: &str) -> DomainResult<u64> {
        bounded(self.timeout, "destroy_user_sessions", async {
            let result = sqlx::query("DELETE FROM auth_session WHERE username = ?")
                .bind(username)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("destroy_user_sessions", e))?;
            Ok(result.rows_affected())
        })
        .await
    }

    #[instrument(skip(self), err)]
    async fn purge_expired(&self) -> DomainResult<u64> {
        bounded(self.timeout, "purge_sessions", async {
            let result = sqlx::query("DELETE FROM auth_session WHERE expires_at <= ?")
                .bind(Utc::now().timestamp())
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("purge_sessions", e))?;
            Ok(result.rows_affected())
        })
        .await
    }
}
