//! CoinGlass funding-rate page source.
//!
//! A plain GET of the public HTML page with a browser-like user agent.
//! No API key; the page is served to anonymous clients.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::PageSource;
use crate::config::ScraperConfig;

pub struct CoinglassSource {
    http: Client,
    url: String,
}

impl CoinglassSource {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to build HTTP client for CoinGlass")?;

        Ok(Self {
            http,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PageSource for CoinglassSource {
    async fn fetch_page(&self) -> Result<String> {
        debug!(url = %self.url, "Fetching funding-rate page");

        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("CoinGlass request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("CoinGlass page error: {status}");
        }

        let body = resp
            .text()
            .await
            .context("Failed to read CoinGlass response body")?;

        debug!(bytes = body.len(), "Funding-rate page fetched");
        Ok(body)
    }
}
