//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub detection: DetectionSection,
    pub sources: SourcesSection,
    #[serde(default)]
    pub registry: RegistrySection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionSection {
    /// Seconds between detection cycles.
    pub interval_secs: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Active chain at startup.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Active owner address at startup, if already known.
    #[serde(default)]
    pub owner_address: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesSection {
    /// JSON-RPC endpoint for the batched balance call.
    pub rpc_url: String,
    /// Address of the deployed single-call balance-checker contract.
    pub balance_checker: String,
    /// Marketplace API base URL.
    pub marketplace_url: String,
    /// Env var holding the marketplace API key (optional).
    #[serde(default)]
    pub marketplace_api_key_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RegistrySection {
    /// Optional TOML file replacing the compiled-in contract registry.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_chain_id() -> u64 {
    1
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
