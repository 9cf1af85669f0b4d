//! Database URL resolution.
//!
//! # Contract
//! - Config YAML stores only the **env var NAME** (`database.url_env`).
//! - Callers resolve the URL once at startup and pass it to the gateway.
//! - `Debug` on [`ResolvedDatabaseUrl`] redacts the value.
//! - Error messages reference the env var **NAME**, never the value.

use anyhow::{bail, Result};

use crate::settings::DatabaseSettings;

#[derive(Clone)]
pub struct ResolvedDatabaseUrl {
    /// Name of the env var the URL came from.
    pub env_var: String,
    url: String,
}

impl ResolvedDatabaseUrl {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for ResolvedDatabaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedDatabaseUrl")
            .field("env_var", &self.env_var)
            .field("url", &"<REDACTED>")
            .finish()
    }
}

/// Read the env var named by `settings.url_env`.
///
/// # Errors
/// `SECRETS_MISSING` naming the variable when it is unset or blank.
pub fn resolve_database_url(settings: &DatabaseSettings) -> Result<ResolvedDatabaseUrl> {
    match std::env::var(&settings.url_env) {
        Ok(v) if !v.trim().is_empty() => Ok(ResolvedDatabaseUrl {
            env_var: settings.url_env.clone(),
            url: v.trim().to_string(),
        }),
        _ => bail!(
            "SECRETS_MISSING: required env var '{}' (database url) is not set or empty",
            settings.url_env
        ),
    }
}
