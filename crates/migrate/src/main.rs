//! Applies the hubstock schema to the configured Postgres database.

use anyhow::Context;

use hubstock_infra::{db, LedgerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hubstock_observability::init();

    let config = LedgerConfig::from_env().context("load configuration")?;
    let pool = db::connect(&config).await?;

    db::migrate(&pool).await.context("apply schema")?;
    tracing::info!(statements = db::SCHEMA.len(), "schema up to date");

    pool.close().await;
    Ok(())
}
