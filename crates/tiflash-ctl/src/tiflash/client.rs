//! HTTP client for the TiFlash debug endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use super::TiflashHttp;
use crate::error::{CtlError, Result};

/// Posts commands to `http://<host>:<port>/post`.
pub struct TiflashClient {
    client: reqwest::Client,
    http_port: u16,
}

impl TiflashClient {
    pub fn new(http_port: u16, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CtlError::TiflashRequest(format!("building HTTP client: {}", e)))?;
        Ok(Self { client, http_port })
    }

    pub fn post_url(&self, host: &str) -> String {
        format!("http://{}:{}/post", host, self.http_port)
    }
}

#[async_trait]
impl TiflashHttp for TiflashClient {
    async fn post(&self, host: &str, command: &str) -> Result<String> {
        let url = self.post_url(host);
        let start = Instant::now();
        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/html")
            .body(command.to_string())
            .send()
            .await
            .map_err(|e| CtlError::TiflashRequest(format!("POST {}: {}", url, e)))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| CtlError::TiflashRequest(format!("reading {}: {}", url, e)))?;
        debug!("POST {} => {} ({}ms)", url, status, start.elapsed().as_millis());

        if !status.is_success() {
            return Err(CtlError::TiflashRequest(format!(
                "POST {} returned {}: {}",
                url,
                status,
                body.trim()
            )));
        }
        Ok(body)
    }
}
