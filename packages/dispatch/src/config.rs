use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::domains::dispatch::{
    DispatchSettings, RedispatchPolicy, DEFAULT_ACCEPTANCE_TIMEOUT_SECS, MAX_CONFLICT_RETRIES,
};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Postgres connection string. `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub port: u16,
    pub acceptance_timeout_secs: i64,
    pub redispatch_policy: RedispatchPolicy,
    pub sweep_interval: Duration,
    pub seed_demo_helpers: bool,
    /// CORS origins. Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment, or a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let acceptance_timeout_secs: i64 = lookup("ACCEPTANCE_TIMEOUT_SECS")
            .unwrap_or_else(|| DEFAULT_ACCEPTANCE_TIMEOUT_SECS.to_string())
            .parse()
            .context("ACCEPTANCE_TIMEOUT_SECS must be a whole number of seconds")?;
        if acceptance_timeout_secs <= 0 {
            anyhow::bail!("ACCEPTANCE_TIMEOUT_SECS must be positive");
        }

        let sweep_interval_ms: u64 = lookup("SWEEP_INTERVAL_MS")
            .unwrap_or_else(|| "1000".to_string())
            .parse()
            .context("SWEEP_INTERVAL_MS must be a valid number")?;
        if sweep_interval_ms == 0 {
            anyhow::bail!("SWEEP_INTERVAL_MS must be positive");
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            port: lookup("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            acceptance_timeout_secs,
            redispatch_policy: lookup("REDISPATCH_POLICY")
                .map(|s| s.parse::<RedispatchPolicy>())
                .transpose()
                .context("REDISPATCH_POLICY must be 'immediate' or 'deferred'")?
                .unwrap_or_default(),
            sweep_interval: Duration::from_millis(sweep_interval_ms),
            seed_demo_helpers: lookup("SEED_DEMO_HELPERS")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            allowed_origins: lookup("ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|origin| origin.trim().to_string())
                        .filter(|origin| !origin.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            acceptance_timeout: chrono::Duration::seconds(self.acceptance_timeout_secs),
            redispatch: self.redispatch_policy,
            max_conflict_retries: MAX_CONFLICT_RETRIES,
        }
    }
}
