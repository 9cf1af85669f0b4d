//! Typed settings read from the merged config document.
//!
//! Every key is optional; absent keys take the defaults below. A key that is
//! present with the wrong type or out of range is an error, never silently
//! replaced by its default.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stk_schemas::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

pub const DEFAULT_URL_ENV: &str = "STK_DATABASE_URL";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 5;

/// Accepted spellings of `/orders/transition_policy`.
pub const TRANSITION_POLICIES: &[&str] = &["permissive", "strict"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Name of the env var holding the connection URL (never the URL itself).
    pub url_env: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSettings {
    /// One of [`TRANSITION_POLICIES`].
    pub transition_policy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationSettings {
    pub default_limit: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    pub database: DatabaseSettings,
    pub orders: OrderSettings,
    pub pagination: PaginationSettings,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database: DatabaseSettings {
                url_env: DEFAULT_URL_ENV.to_string(),
                max_connections: DEFAULT_MAX_CONNECTIONS,
                acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
            },
            orders: OrderSettings {
                transition_policy: TRANSITION_POLICIES[0].to_string(),
            },
            pagination: PaginationSettings {
                default_limit: DEFAULT_PAGE_LIMIT,
            },
        }
    }
}

impl StoreSettings {
    pub fn from_config_json(config: &Value) -> Result<Self> {
        let d = Self::default();

        let url_env = read_str(config, "/database/url_env")?.unwrap_or(d.database.url_env);
        if url_env.is_empty() {
            bail!("CONFIG_INVALID /database/url_env: must not be empty");
        }

        let max_connections = match read_u64(config, "/database/max_connections")? {
            None => d.database.max_connections,
            Some(n) if n >= 1 && n <= u64::from(u32::MAX) => n as u32,
            Some(n) => bail!("CONFIG_INVALID /database/max_connections: {n} must be >= 1"),
        };

        let acquire_timeout_secs = match read_u64(config, "/database/acquire_timeout_secs")? {
            None => d.database.acquire_timeout_secs,
            Some(0) => bail!("CONFIG_INVALID /database/acquire_timeout_secs: must be >= 1"),
            Some(n) => n,
        };

        let transition_policy = match read_str(config, "/orders/transition_policy")? {
            None => d.orders.transition_policy,
            Some(p) if TRANSITION_POLICIES.contains(&p.as_str()) => p,
            Some(p) => bail!(
                "CONFIG_INVALID /orders/transition_policy: '{p}'; expected one of: {}",
                TRANSITION_POLICIES.join(" | ")
            ),
        };

        let default_limit = match read_u64(config, "/pagination/default_limit")? {
            None => d.pagination.default_limit,
            Some(n) if n >= 1 && n <= MAX_PAGE_LIMIT as u64 => n as i64,
            Some(n) => bail!(
                "CONFIG_INVALID /pagination/default_limit: {n} must be between 1 and {MAX_PAGE_LIMIT}"
            ),
        };

        Ok(Self {
            database: DatabaseSettings {
                url_env,
                max_connections,
                acquire_timeout_secs,
            },
            orders: OrderSettings { transition_policy },
            pagination: PaginationSettings { default_limit },
        })
    }
}

fn read_str(config: &Value, pointer: &str) -> Result<Option<String>> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => bail!("CONFIG_INVALID {pointer}: expected a string, got {other}"),
    }
}

fn read_u64(config: &Value, pointer: &str) -> Result<Option<u64>> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => match v.as_u64() {
            Some(n) => Ok(Some(n)),
            None => bail!("CONFIG_INVALID {pointer}: expected a non-negative integer, got {v}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_yields_defaults() {
        let s = StoreSettings::from_config_json(&json!({})).unwrap();
        assert_eq!(s, StoreSettings::default());
        assert_eq!(s.database.url_env, "STK_DATABASE_URL");
        assert_eq!(s.pagination.default_limit, 50);
    }

    #[test]
    fn wrong_types_and_ranges_are_rejected() {
        let err = StoreSettings::from_config_json(&json!({"database": {"max_connections": "ten"}}))
            .unwrap_err();
        assert!(err.to_string().contains("/database/max_connections"));

        let err = StoreSettings::from_config_json(&json!({"pagination": {"default_limit": 500}}))
            .unwrap_err();
        assert!(err.to_string().contains("between 1 and 200"));

        let err =
            StoreSettings::from_config_json(&json!({"orders": {"transition_policy": "lenient"}}))
                .unwrap_err();
        assert!(err.to_string().contains("permissive | strict"));
    }
}
