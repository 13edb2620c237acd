use std::time::Duration;

use lucky_core::error::{LuckyError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{quote_ident, BackendError, BackendResult, BoxFuture, MigrationBackend};

/// Backend holding a direct Postgres connection.
///
/// Statements go through the simple query protocol, so a whole file body
/// with several statements can be sent at once.
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a single-connection pool; migrations are strictly sequential.
    pub async fn connect(url: &str, timeout_secs: u64) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(timeout_secs))
            .connect(url)
            .await
            .map_err(|e| LuckyError::Backend(format!("Failed to connect to database: {}", e)))?;

        Ok(Self::new(pool))
    }
}

fn map_sqlx_error(e: sqlx::Error) -> BackendError {
    match &e {
        sqlx::Error::Database(db) => {
            BackendError::from_code(db.code().map(|c| c.into_owned()), db.message())
        }
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            BackendError::transport(e.to_string())
        }
        _ => BackendError::from_code(None, e.to_string()),
    }
}

impl MigrationBackend for PgBackend {
    fn is_applied<'a>(&'a self, table: &'a str, name: &'a str) -> BoxFuture<'a, BackendResult<bool>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT EXISTS (SELECT 1 FROM {} WHERE name = $1)",
                quote_ident(table)
            );
            sqlx::query_scalar::<_, bool>(&sql)
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)
        })
    }

    fn execute<'a>(&'a self, sql: &'a str) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            sqlx::raw_sql(sql)
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(map_sqlx_error)
        })
    }

    fn record_applied<'a>(
        &'a self,
        table: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            let sql = format!("INSERT INTO {} (name) VALUES ($1)", quote_ident(table));
            sqlx::query(&sql)
                .bind(name)
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(map_sqlx_error)
        })
    }

    fn probe_table<'a>(&'a self, table: &'a str) -> BoxFuture<'a, BackendResult<()>> {
        Box::pin(async move {
            let sql = format!("SELECT name FROM {} LIMIT 1", quote_ident(table));
            sqlx::query(&sql)
                .fetch_optional(&self.pool)
                .await
                .map(|_| ())
                .map_err(map_sqlx_error)
        })
    }

    fn describe(&self) -> String {
        "postgres (direct)".to_string()
    }
}
