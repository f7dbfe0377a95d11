//! Runtime configuration loaded from the environment.

use std::env;
use std::net::SocketAddr;

use chrono::FixedOffset;

use crate::error::{AppError, Result};

/// Default offset for America/Asuncion (UTC-3)
const DEFAULT_UTC_OFFSET_MINUTES: i32 = -180;

/// Service configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    /// Offset used to interpret dates and "HH:00" slots as academy-local time
    pub utc_offset: FixedOffset,
    pub currency: String,
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| AppError::Validation("DATABASE_URL is required".to_string()))?;

        let bind_addr = lookup("AGENDO_BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|_| AppError::Validation("Invalid AGENDO_BIND_ADDR".to_string()))?;

        let db_max_connections = lookup("AGENDO_DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let run_migrations = lookup("AGENDO_RUN_MIGRATIONS")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(true);

        let offset_minutes: i32 = match lookup("AGENDO_UTC_OFFSET_MINUTES") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                AppError::Validation("Invalid AGENDO_UTC_OFFSET_MINUTES".to_string())
            })?,
            None => DEFAULT_UTC_OFFSET_MINUTES,
        };
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            AppError::Validation("AGENDO_UTC_OFFSET_MINUTES out of range".to_string())
        })?;

        let currency = lookup("AGENDO_CURRENCY").unwrap_or_else(|| "PYG".to_string());

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections,
            run_migrations,
            utc_offset,
            currency,
        })
    }
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
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://x")])).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.db_max_connections, 10);
        assert!(config.run_migrations);
        assert_eq!(config.utc_offset.local_minus_utc(), -3 * 3600);
        assert_eq!(config.currency, "PYG");
    }

    #[test]
    fn test_missing_database_url() {
        assert!(Config::from_lookup(lookup_from(&[])).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("AGENDO_BIND_ADDR", "127.0.0.1:3000"),
            ("AGENDO_UTC_OFFSET_MINUTES", "0"),
            ("AGENDO_RUN_MIGRATIONS", "false"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.utc_offset.local_minus_utc(), 0);
        assert!(!config.run_migrations);
    }

    #[test]
    fn test_invalid_offset() {
        let result = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("AGENDO_UTC_OFFSET_MINUTES", "abc"),
        ]));
        assert!(result.is_err());
    }
}
