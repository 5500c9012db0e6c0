use async_trait::async_trait;
use skyhold_core::{LedgerError, LedgerResult, TransactionManager};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Transaction};
use std::time::Duration;
use tracing::info;

use crate::app_config::DatabaseConfig;

/// Transaction handle the Postgres ledgers operate on.
pub type PgTx = Transaction<'static, Postgres>;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        info!(
            url = %mask_password(&config.url),
            max_connections = config.max_connections,
            "Connecting to Postgres"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

#[async_trait]
impl TransactionManager for DbClient {
    type Tx = PgTx;

    async fn begin(&self) -> LedgerResult<PgTx> {
        self.pool.begin().await.map_err(LedgerError::storage)
    }

    async fn commit(&self, tx: PgTx) -> LedgerResult<()> {
        tx.commit().await.map_err(LedgerError::storage)
    }

    async fn rollback(&self, tx: PgTx) -> LedgerResult<()> {
        tx.rollback().await.map_err(LedgerError::storage)
    }
}

/// Hides the password part of a database URL for logging.
fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
            if colon_pos > scheme_end {
                return format!("{}:****@{}", &url[..colon_pos], &url[at_pos + 1..]);
            }
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_password() {
        assert_eq!(
            mask_password("postgres://skyhold:secret@db:5432/skyhold"),
            "postgres://skyhold:****@db:5432/skyhold"
        );
        assert_eq!(mask_password("postgres://db:5432/skyhold"), "postgres://db:5432/skyhold");
    }
}
