//! Postgres connection and schema bootstrap.

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::LedgerConfig;

/// Tables, partial unique indexes on live codes, and CHECK constraints
/// backing the counter invariants. Every statement is idempotent.
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS sellers (
        id          UUID PRIMARY KEY,
        tenant_id   UUID NOT NULL,
        name        VARCHAR(255) NOT NULL DEFAULT '',
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_sellers_tenant ON sellers (tenant_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS hubs (
        id           UUID PRIMARY KEY,
        tenant_id    UUID NOT NULL,
        code         VARCHAR(100) NOT NULL,
        name         VARCHAR(255) NOT NULL,
        description  VARCHAR(1000) NOT NULL DEFAULT '',
        is_active    BOOLEAN NOT NULL DEFAULT TRUE,
        address      VARCHAR(500) NOT NULL DEFAULT '',
        city         VARCHAR(100) NOT NULL DEFAULT '',
        state        VARCHAR(100) NOT NULL DEFAULT '',
        country      VARCHAR(100) NOT NULL DEFAULT '',
        postal_code  VARCHAR(100) NOT NULL DEFAULT '',
        created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at   TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS uq_hubs_tenant_code_live
        ON hubs (tenant_id, code) WHERE deleted_at IS NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS skus (
        id              UUID PRIMARY KEY,
        tenant_id       UUID NOT NULL,
        seller_id       UUID NOT NULL REFERENCES sellers (id),
        code            VARCHAR(100) NOT NULL,
        name            VARCHAR(255) NOT NULL,
        description     VARCHAR(1000) NOT NULL DEFAULT '',
        is_active       BOOLEAN NOT NULL DEFAULT TRUE,
        barcode         VARCHAR(100) NOT NULL DEFAULT '',
        weight          DOUBLE PRECISION NOT NULL DEFAULT 0,
        weight_unit     VARCHAR(100) NOT NULL DEFAULT '',
        length          DOUBLE PRECISION NOT NULL DEFAULT 0,
        width           DOUBLE PRECISION NOT NULL DEFAULT 0,
        height          DOUBLE PRECISION NOT NULL DEFAULT 0,
        dimension_unit  VARCHAR(100) NOT NULL DEFAULT '',
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        deleted_at      TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS uq_skus_tenant_code_live
        ON skus (tenant_id, code) WHERE deleted_at IS NULL
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_skus_tenant_seller ON skus (tenant_id, seller_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inventories (
        id          UUID PRIMARY KEY,
        tenant_id   UUID NOT NULL,
        hub_id      UUID NOT NULL REFERENCES hubs (id),
        sku_id      UUID NOT NULL REFERENCES skus (id),
        quantity    BIGINT NOT NULL DEFAULT 0,
        available   BIGINT NOT NULL DEFAULT 0,
        reserved    BIGINT NOT NULL DEFAULT 0,
        in_transit  BIGINT NOT NULL DEFAULT 0,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT uq_inventories_tenant_hub_sku UNIQUE (tenant_id, hub_id, sku_id),
        CONSTRAINT ck_inventories_available CHECK (available >= 0),
        CONSTRAINT ck_inventories_reserved CHECK (reserved >= 0),
        CONSTRAINT ck_inventories_in_transit CHECK (in_transit >= 0),
        CONSTRAINT ck_inventories_committed CHECK (available + reserved <= quantity)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_inventories_tenant_sku ON inventories (tenant_id, sku_id)
    "#,
];

/// Open a pool against `config.database_url`.
pub async fn connect(config: &LedgerConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_db_connections)
        .acquire_timeout(config.op_timeout)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to Postgres at {}", redacted(&config.database_url)))
}

/// Apply [`SCHEMA`] in one transaction.
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    let mut tx = pool.begin().await.context("failed to begin schema transaction")?;
    for (index, statement) in SCHEMA.iter().enumerate() {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("schema statement {index} failed"))?;
    }
    tx.commit().await.context("failed to commit schema")?;
    tracing::info!(statements = SCHEMA.len(), "schema applied");
    Ok(())
}

/// Strip the password from a connection URL for logging.
fn redacted(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let credentials = &url[scheme_end + 3..at];
            match credentials.split_once(':') {
                Some((user, _)) => format!("{}{}:***{}", &url[..scheme_end + 3], user, &url[at..]),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passwords_never_reach_the_logs() {
        assert_eq!(
            redacted("postgres://app:s3cret@db:5432/hubstock"),
            "postgres://app:***@db:5432/hubstock"
        );
        assert_eq!(redacted("postgres://localhost/hubstock"), "postgres://localhost/hubstock");
    }

    #[test]
    fn schema_backs_counter_invariants() {
        let inventories = SCHEMA
            .iter()
            .find(|s| s.contains("CREATE TABLE IF NOT EXISTS inventories"))
            .unwrap();
        assert!(inventories.contains("available + reserved <= quantity"));
        assert!(inventories.contains("UNIQUE (tenant_id, hub_id, sku_id)"));
    }
}
