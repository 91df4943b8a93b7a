//! Configuration management.
//!
//! Loads settings from environment variables with defaults suitable for local runs.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::retry::RetryPolicy;

/// Process configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub server: ServerSettings,
    /// `PostgreSQL` connection; `None` runs against the in-memory store.
    pub database: Option<DatabaseSettings>,
    /// Redis URL for the stock cache and the sweep lease; `None` keeps both in-process.
    pub redis_url: Option<String>,
    pub reservation: ReservationSettings,
    /// Insert a demo product at startup (local development only).
    pub seed_demo_product: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

/// Knobs of the reservation protocol itself.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationSettings {
    /// How long a hold stays valid after creation.
    pub hold_window: Duration,
    pub stock_cache_ttl: Duration,
    /// Attempts to resolve an order named by a payment notification.
    pub order_lookup_attempts: u32,
    pub order_lookup_delay: Duration,
    pub sweep_lease_ttl: Duration,
    pub sweep_interval: Duration,
    /// Upper bound on any row-lock wait.
    pub lock_timeout: Duration,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            hold_window: Duration::from_secs(120),
            stock_cache_ttl: Duration::from_secs(5),
            order_lookup_attempts: 5,
            order_lookup_delay: Duration::from_millis(200),
            sweep_lease_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
            lock_timeout: Duration::from_secs(10),
        }
    }
}

impl ReservationSettings {
    pub fn order_lookup_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.order_lookup_attempts, self.order_lookup_delay)
    }
}

impl Settings {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());
        let secs = |key: &str, default: Duration| parsed(key).map(Duration::from_secs).unwrap_or(default);
        let millis =
            |key: &str, default: Duration| parsed(key).map(Duration::from_millis).unwrap_or(default);
        let defaults = ReservationSettings::default();

        Self {
            server: ServerSettings {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "PORT", 8080),
            },
            database: lookup("DATABASE_URL")
                .filter(|url| !url.trim().is_empty())
                .map(|url| DatabaseSettings {
                    url,
                    max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10),
                }),
            redis_url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),
            reservation: ReservationSettings {
                hold_window: secs("HOLD_WINDOW_SECS", defaults.hold_window),
                stock_cache_ttl: secs("STOCK_CACHE_TTL_SECS", defaults.stock_cache_ttl),
                order_lookup_attempts: parse_or(
                    &lookup,
                    "ORDER_LOOKUP_ATTEMPTS",
                    defaults.order_lookup_attempts,
                ),
                order_lookup_delay: millis("ORDER_LOOKUP_DELAY_MS", defaults.order_lookup_delay),
                sweep_lease_ttl: secs("SWEEP_LEASE_SECS", defaults.sweep_lease_ttl),
                sweep_interval: secs("SWEEP_INTERVAL_SECS", defaults.sweep_interval),
                lock_timeout: millis("LOCK_TIMEOUT_MS", defaults.lock_timeout),
            },
            seed_demo_product: parse_or(&lookup, "SEED_DEMO_PRODUCT", false),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let s = settings(&[]);
        assert_eq!(s.server.bind_addr(), "0.0.0.0:8080");
        assert!(s.database.is_none());
        assert!(s.redis_url.is_none());
        assert!(!s.seed_demo_product);
        assert_eq!(s.reservation.hold_window, Duration::from_secs(120));
        assert_eq!(s.reservation.stock_cache_ttl, Duration::from_secs(5));
        assert_eq!(s.reservation.order_lookup_attempts, 5);
        assert_eq!(s.reservation.order_lookup_delay, Duration::from_millis(200));
        assert_eq!(s.reservation.sweep_lease_ttl, Duration::from_secs(60));
        assert_eq!(s.reservation.lock_timeout, Duration::from_secs(10));
    }

    #[test]
    fn overrides_are_applied_and_garbage_is_ignored() {
        let s = settings(&[
            ("PORT", "9000"),
            ("DATABASE_URL", "postgres://localhost/flash"),
            ("DATABASE_MAX_CONNECTIONS", "32"),
            ("HOLD_WINDOW_SECS", "30"),
            ("ORDER_LOOKUP_DELAY_MS", "not-a-number"),
            ("SEED_DEMO_PRODUCT", "true"),
        ]);

        assert_eq!(s.server.port, 9000);
        let db = s.database.unwrap();
        assert_eq!(db.url, "postgres://localhost/flash");
        assert_eq!(db.max_connections, 32);
        assert_eq!(s.reservation.hold_window, Duration::from_secs(30));
        assert_eq!(s.reservation.order_lookup_delay, Duration::from_millis(200));
        assert!(s.seed_demo_product);
    }

    #[test]
    fn blank_urls_mean_in_memory() {
        let s = settings(&[("DATABASE_URL", " "), ("REDIS_URL", "")]);
        assert!(s.database.is_none());
        assert!(s.redis_url.is_none());
    }
}
