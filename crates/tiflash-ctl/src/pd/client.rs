//! HTTP client for the PD Region API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::form_urlencoded::byte_serialize;

use super::types::{Region, RegionStatsResponse, RegionsResponse};
use super::RegionSource;
use crate::codec::TikvKey;
use crate::error::{CtlError, Result};

const API_PREFIX: &str = "pd/api/v1";

/// Client for one PD instance.
pub struct PdClient {
    client: reqwest::Client,
    base_url: String,
}

impl PdClient {
    /// Create a client for `address` (`host:port`, with or without scheme).
    pub fn new(address: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CtlError::MetadataLookup(format!("building HTTP client: {}", e)))?;

        let address = address.trim_end_matches('/');
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            format!("{}/{}", address, API_PREFIX)
        } else {
            format!("http://{}/{}", address, API_PREFIX)
        };

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        let start = Instant::now();
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        debug!("GET {} => {} ({}ms)", url, status, start.elapsed().as_millis());

        if !status.is_success() {
            return Err(CtlError::MetadataLookup(format!(
                "GET {} returned {}: {}",
                url,
                status,
                body.trim()
            )));
        }
        serde_json::from_str(&body).map_err(|e| {
            CtlError::MetadataLookup(format!("unexpected response from {}: {} ({})", url, e, body))
        })
    }
}

/// Escape raw key bytes the way PD expects them in paths and query strings.
fn escape_key(key: &TikvKey) -> String {
    byte_serialize(key.as_bytes()).collect()
}

#[async_trait]
impl RegionSource for PdClient {
    async fn region_by_key(&self, key: &TikvKey) -> Result<Region> {
        let url = format!("{}/region/key/{}", self.base_url, escape_key(key));
        let region: Region = self.get(url).await?;
        if region.id == 0 {
            return Err(CtlError::MetadataLookup(format!(
                "no Region covers key {}",
                key
            )));
        }
        Ok(region)
    }

    async fn regions_from(&self, key: &TikvKey, limit: usize) -> Result<Vec<Region>> {
        let url = format!(
            "{}/regions/key?key={}&limit={}",
            self.base_url,
            escape_key(key),
            limit
        );
        let resp: RegionsResponse = self.get(url).await?;
        Ok(resp.regions)
    }

    async fn count_regions_between(&self, start: &TikvKey, end: &TikvKey) -> Result<i64> {
        let url = format!(
            "{}/stats/region?start_key={}&end_key={}",
            self.base_url,
            escape_key(start),
            escape_key(end)
        );
        let resp: RegionStatsResponse = self.get(url).await?;
        Ok(resp.count)
    }
}
