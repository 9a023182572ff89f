//! Configuration loading and representation.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `STOCKLOCK_BIND` | `0.0.0.0:8080` |
//! | `DATABASE_URL` | unset (in-memory store) |
//! | `STOCKLOCK_DB_MAX_CONNECTIONS` | `20` |
//! | `STOCKLOCK_MAX_ATTEMPTS` | `3` |
//! | `STOCKLOCK_BACKOFF_BASE_MS` | `50` |
//! | `STOCKLOCK_SEED` | `1:Super Widget:100;2:Mega Gadget:50` |
//! | `STOCKLOCK_SEED_ON_START` | `true` |

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use stocklock_inventory::SeedCatalog;

use crate::retry::RetryPolicy;

/// Process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    /// Postgres connection string; `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub retry: RetryPolicy,
    pub seed: SeedCatalog,
    pub seed_on_start: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            max_connections: 20,
            retry: RetryPolicy::default(),
            seed: SeedCatalog::default(),
            seed_on_start: true,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup (environment, test maps).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = parse_or(get("STOCKLOCK_BIND"), "STOCKLOCK_BIND", defaults.bind_addr)?;
        let max_connections = parse_or(
            get("STOCKLOCK_DB_MAX_CONNECTIONS"),
            "STOCKLOCK_DB_MAX_CONNECTIONS",
            defaults.max_connections,
        )?;
        let max_attempts = parse_or(
            get("STOCKLOCK_MAX_ATTEMPTS"),
            "STOCKLOCK_MAX_ATTEMPTS",
            defaults.retry.max_attempts,
        )?;
        let base_ms = parse_or(
            get("STOCKLOCK_BACKOFF_BASE_MS"),
            "STOCKLOCK_BACKOFF_BASE_MS",
            defaults.retry.base_delay.as_millis() as u64,
        )?;
        let seed = match get("STOCKLOCK_SEED") {
            Some(raw) => raw
                .parse::<SeedCatalog>()
                .with_context(|| format!("invalid STOCKLOCK_SEED '{raw}'"))?,
            None => defaults.seed,
        };
        let seed_on_start = parse_or(
            get("STOCKLOCK_SEED_ON_START"),
            "STOCKLOCK_SEED_ON_START",
            defaults.seed_on_start,
        )?;

        Ok(Self {
            bind_addr,
            database_url: get("DATABASE_URL"),
            max_connections,
            retry: RetryPolicy::exponential(max_attempts, Duration::from_millis(base_ms)),
            seed,
            seed_on_start,
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key} '{raw}'")),
        None => Ok(default),
    }
}
