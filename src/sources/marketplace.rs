//! Marketplace collectible-ownership client.
//!
//! Queries the marketplace's assets endpoint for everything an owner
//! currently holds. Reads are public; an API key raises the rate limit
//! and is sent as an `X-API-KEY` header when configured.
//!
//! Known limitation: detection reads exactly one page of results
//! (`PAGE_LIMIT` items). An owner holding more than one page gets a
//! truncated view, which is logged loudly rather than hidden.

use alloy_primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{ApiCollectible, CollectibleSource};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Hard upper bound on a single ownership query. An expired fetch is
/// abandoned and treated as empty by the engine, bounding worst-case
/// cycle latency.
const OWNERSHIP_TIMEOUT_SECS: u64 = 15;

/// Maximum items the marketplace returns per request; detection caps at
/// one page.
const PAGE_LIMIT: u32 = 50;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// Envelope returned by `GET /assets`.
#[derive(Debug, Deserialize)]
struct AssetsResponse {
    #[serde(default)]
    assets: Vec<ApiCollectible>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Marketplace-backed collectible ownership source.
pub struct MarketplaceClient {
    http: Client,
    base_url: String,
    /// Optional API key for higher rate limits.
    api_key: Option<SecretString>,
}

impl MarketplaceClient {
    pub fn new(base_url: String, api_key: Option<SecretString>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(OWNERSHIP_TIMEOUT_SECS))
            .user_agent("ASSETWATCH/0.1.0 (asset-detection-engine)")
            .build()
            .context("Failed to build HTTP client for marketplace")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn assets_url(&self, owner: Address) -> String {
        format!(
            "{}/assets?owner={}&limit={}",
            self.base_url,
            owner.to_checksum(None),
            PAGE_LIMIT,
        )
    }
}

#[async_trait]
impl CollectibleSource for MarketplaceClient {
    async fn fetch_owned(&self, owner: Address) -> Result<Vec<ApiCollectible>> {
        let url = self.assets_url(owner);
        debug!(url = %url, "Fetching owned collectibles");

        let mut request = self.http.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-KEY", key.expose_secret());
        }

        let resp = request
            .send()
            .await
            .context("Marketplace assets request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Marketplace API error {status}: {body}");
        }

        let parsed: AssetsResponse = resp
            .json()
            .await
            .context("Failed to parse marketplace assets response")?;

        if parsed.assets.len() as u32 >= PAGE_LIMIT {
            warn!(
                owner = %owner.to_checksum(None),
                limit = PAGE_LIMIT,
                "Owned list hit the page cap; detection only sees the first page"
            );
        }

        info!(
            owner = %owner.to_checksum(None),
            count = parsed.assets.len(),
            "Marketplace ownership fetched"
        );

        Ok(parsed.assets)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
