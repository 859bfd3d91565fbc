//! Ledger configuration.
//!
//! Built by the process entry point and handed to [`crate::LedgerServices`];
//! nothing below this module reads the environment.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/hubstock";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub database_url: String,
    /// `None` keeps the cache in-process.
    pub redis_url: Option<String>,
    pub max_db_connections: u32,
    /// Hub/SKU lookups by id and by code.
    pub entity_ttl: Duration,
    /// Inventory point queries.
    pub item_ttl: Duration,
    /// Unfiltered inventory listings.
    pub listing_ttl: Duration,
    pub cache_timeout: Duration,
    pub op_timeout: Duration,
    pub batch_chunk_size: usize,
    /// Re-attempts of a guarded update that lost a race before giving up with
    /// `ConcurrentModification`.
    pub max_conflict_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            redis_url: None,
            max_db_connections: 10,
            entity_ttl: Duration::from_secs(60 * 60),
            item_ttl: Duration::from_secs(5 * 60),
            listing_ttl: Duration::from_secs(5 * 60),
            cache_timeout: Duration::from_millis(250),
            op_timeout: Duration::from_secs(5),
            batch_chunk_size: 100,
            max_conflict_retries: 3,
        }
    }
}

impl LedgerConfig {
    /// Read `HUBSTOCK_*` variables, falling back to defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`LedgerConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url = lookup("HUBSTOCK_DATABASE_URL").unwrap_or_else(|| {
            tracing::warn!("HUBSTOCK_DATABASE_URL not set; using local dev default");
            defaults.database_url.clone()
        });
        let redis_url = lookup("HUBSTOCK_REDIS_URL").filter(|url| !url.trim().is_empty());

        Ok(Self {
            database_url,
            redis_url,
            max_db_connections: parse(&lookup, "HUBSTOCK_DB_MAX_CONNECTIONS", defaults.max_db_connections)?,
            entity_ttl: secs(&lookup, "HUBSTOCK_CACHE_ENTITY_TTL_SECS", defaults.entity_ttl)?,
            item_ttl: secs(&lookup, "HUBSTOCK_CACHE_ITEM_TTL_SECS", defaults.item_ttl)?,
            listing_ttl: secs(&lookup, "HUBSTOCK_CACHE_LISTING_TTL_SECS", defaults.listing_ttl)?,
            cache_timeout: millis(&lookup, "HUBSTOCK_CACHE_TIMEOUT_MS", defaults.cache_timeout)?,
            op_timeout: millis(&lookup, "HUBSTOCK_OP_TIMEOUT_MS", defaults.op_timeout)?,
            batch_chunk_size: positive(&lookup, "HUBSTOCK_BATCH_CHUNK_SIZE", defaults.batch_chunk_size)?,
            max_conflict_retries: parse(&lookup, "HUBSTOCK_MAX_CONFLICT_RETRIES", defaults.max_conflict_retries)?,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => {
            let parsed: Result<T, T::Err> = value.trim().parse();
            parsed.map_err(|e| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            })
        }
    }
}

fn positive(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: usize) -> Result<usize, ConfigError> {
    let value = parse(lookup, var, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

/// Longest accepted cache TTL (30 days).
pub const MAX_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Cache TTLs in whole seconds, at most [`MAX_TTL`].
fn secs(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    let value = parse(lookup, var, default.as_secs())?;
    if value > MAX_TTL.as_secs() {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: format!("must be at most {} seconds", MAX_TTL.as_secs()),
        });
    }
    Ok(Duration::from_secs(value))
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    parse(lookup, var, default.as_millis() as u64).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        let config = LedgerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.batch_chunk_size, 100);
        assert_eq!(config.entity_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = LedgerConfig::from_lookup(lookup_from(&[
            ("HUBSTOCK_REDIS_URL", "redis://cache:6379"),
            ("HUBSTOCK_CACHE_ITEM_TTL_SECS", "30"),
            ("HUBSTOCK_OP_TIMEOUT_MS", "1500"),
        ]))
        .unwrap();
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.item_ttl, Duration::from_secs(30));
        assert_eq!(config.op_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn garbage_is_rejected_with_the_variable_name() {
        let err = LedgerConfig::from_lookup(lookup_from(&[("HUBSTOCK_BATCH_CHUNK_SIZE", "lots")])).unwrap_err();
        assert!(err.to_string().contains("HUBSTOCK_BATCH_CHUNK_SIZE"));

        let err = LedgerConfig::from_lookup(lookup_from(&[("HUBSTOCK_BATCH_CHUNK_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "HUBSTOCK_BATCH_CHUNK_SIZE", .. }));
    }

    #[test]
    fn oversized_ttl_is_rejected() {
        let err = LedgerConfig::from_lookup(lookup_from(&[(
            "HUBSTOCK_CACHE_ENTITY_TTL_SECS",
            "18446744073709551615",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "HUBSTOCK_CACHE_ENTITY_TTL_SECS", .. }));

        let at_cap = MAX_TTL.as_secs().to_string();
        let config = LedgerConfig::from_lookup(lookup_from(&[("HUBSTOCK_CACHE_LISTING_TTL_SECS", at_cap.as_str())])).unwrap();
        assert_eq!(config.listing_ttl, MAX_TTL);
    }
}
