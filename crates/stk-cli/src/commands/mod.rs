//! Command handlers for the `stk` binary.
//!
//! Shared wiring (config, pool, repositories, payload loading, JSON output)
//! lives here; product and order commands live in the submodules.

pub mod order;
pub mod product;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Serialize;
use serde_json::Value;
use stk_config::{StoreSettings, UnusedKeyPolicy};
use stk_db::{PgGateway, PoolSettings};
use stk_inventory::{OrderRepository, StockRepository, TransitionPolicy};
use stk_schemas::Pagination;
use tracing::{info, warn};

use crate::{PageArgs, PayloadArgs};

/// Everything a store command needs, built once per invocation.
pub struct Context {
    pub settings: StoreSettings,
    pub gateway: Arc<PgGateway>,
    pub stock: StockRepository<PgGateway>,
    pub orders: OrderRepository<PgGateway>,
}

impl Context {
    /// Load settings from `config_paths` (defaults when empty), resolve the
    /// database URL from the env var they name and open the pool.
    pub async fn load(config_paths: &[String]) -> Result<Self> {
        let settings = load_settings(config_paths)?;
        let url = stk_config::resolve_database_url(&settings.database)?;
        let policy = TransitionPolicy::parse(&settings.orders.transition_policy)
            .with_context(|| {
                format!(
                    "unknown transition policy '{}'",
                    settings.orders.transition_policy
                )
            })?;

        let gateway = Arc::new(
            PgGateway::connect(
                url.url(),
                PoolSettings {
                    max_connections: settings.database.max_connections,
                    acquire_timeout: Duration::from_secs(settings.database.acquire_timeout_secs),
                },
            )
            .await
            .with_context(|| format!("connect via env var {}", url.env_var))?,
        );
        info!(
            env_var = %url.env_var,
            max_connections = settings.database.max_connections,
            policy = policy.as_str(),
            "store connected"
        );

        Ok(Self {
            stock: StockRepository::new(Arc::clone(&gateway)),
            orders: OrderRepository::with_policy(Arc::clone(&gateway), policy),
            gateway,
            settings,
        })
    }

    pub fn pagination(&self, page: &PageArgs) -> Pagination {
        Pagination::new(
            page.limit.unwrap_or(self.settings.pagination.default_limit),
            page.page,
        )
    }
}

fn load_settings(config_paths: &[String]) -> Result<StoreSettings> {
    if config_paths.is_empty() {
        return Ok(StoreSettings::default());
    }
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = stk_config::load_layered_yaml(&path_refs)?;
    warn_unused_keys(&loaded.config_json)?;
    StoreSettings::from_config_json(&loaded.config_json)
}

fn warn_unused_keys(config_json: &Value) -> Result<()> {
    let report = stk_config::report_unused_keys(config_json, UnusedKeyPolicy::Warn)?;
    for pointer in &report.unused_leaf_pointers {
        warn!(pointer = %pointer, "config key is not read by anything");
    }
    Ok(())
}

/// `stk config-hash`: print the hash and canonical JSON of the merged layers.
pub fn config_hash(paths: &[String], strict_keys: bool) -> Result<()> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = stk_config::load_layered_yaml(&path_refs)?;

    let policy = if strict_keys {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = stk_config::report_unused_keys(&loaded.config_json, policy)?;
    for pointer in &report.unused_leaf_pointers {
        warn!(pointer = %pointer, "config key is not read by anything");
    }
    // Typed extraction must also succeed for the hash to be meaningful.
    StoreSettings::from_config_json(&loaded.config_json)?;

    println!("config_hash={}", loaded.config_hash);
    println!("{}", loaded.canonical_json);
    Ok(())
}

/// Load a payload from either an inline JSON string or a file path.
pub fn load_payload(args: &PayloadArgs) -> Result<Value> {
    if let Some(p) = &args.payload_file {
        let bytes = fs::read(p).with_context(|| format!("read payload-file failed: {p}"))?;
        let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
        let raw = std::str::from_utf8(bytes).context("payload-file must be UTF-8 text")?;
        return serde_json::from_str(raw.trim()).context("payload-file must contain valid JSON");
    }

    let raw = args
        .payload
        .as_deref()
        .context("must provide --payload or --payload-file")?;
    serde_json::from_str(raw.trim()).context("--payload must be valid JSON")
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
