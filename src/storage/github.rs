//! GitHub contents API store.
//!
//! API docs: https://docs.github.com/en/rest/repos/contents
//! Endpoints: `GET` / `PUT /repos/{repo}/contents/{path}`
//! Auth: `Authorization: Bearer {token}` (static token).
//!
//! Updates are conditional on the file's current blob `sha`, which is
//! re-read right before each write. A missing file is written without a
//! `sha` (first write creates it).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{build_put_request, decode_content, ContentsResponse, SignalStore};
use crate::config::GitHubConfig;
use crate::types::{RemoteDocument, RevisionToken, Signal};

const API_VERSION: &str = "2022-11-28";

pub struct GitHubStore {
    http: Client,
    token: SecretString,
    contents_url: String,
    repo: String,
    path: String,
}

impl GitHubStore {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("funding-signal-bot/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for GitHub")?;

        Ok(Self {
            http,
            token: SecretString::new(config.token.expose_secret().clone()),
            contents_url: contents_url(&config.api_base, &config.repo, &config.signals_path),
            repo: config.repo.clone(),
            path: config.signals_path.clone(),
        })
    }

    pub fn contents_url(&self) -> &str {
        &self.contents_url
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("Authorization", format!("Bearer {}", self.token.expose_secret()))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Fetch the file metadata. `Ok(None)` when the file does not exist.
    async fn fetch_contents(&self) -> Result<Option<ContentsResponse>> {
        let resp = self
            .authed(self.http.get(&self.contents_url))
            .send()
            .await
            .context("GitHub contents request failed")?;

        match resp.status() {
            StatusCode::OK => {
                let body: ContentsResponse = resp
                    .json()
                    .await
                    .context("Failed to parse GitHub contents response")?;
                Ok(Some(body))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("GitHub contents API error {status}: {body}");
            }
        }
    }

    /// Read and decode the currently published document.
    pub async fn read_document(&self) -> Result<Option<RemoteDocument>> {
        let Some(contents) = self.fetch_contents().await? else {
            return Ok(None);
        };

        let signals = match contents.content.as_deref() {
            Some(content) if !content.trim().is_empty() => decode_content(content)?,
            _ => Vec::new(),
        };

        Ok(Some(RemoteDocument {
            signals,
            revision: contents.sha.map(RevisionToken),
        }))
    }
}

#[async_trait]
impl SignalStore for GitHubStore {
    async fn get_revision(&self) -> Option<RevisionToken> {
        match self.fetch_contents().await {
            Ok(Some(contents)) => {
                let sha = contents.sha.map(RevisionToken);
                if sha.is_none() {
                    warn!(path = %self.path, "GitHub contents response has no sha");
                }
                sha
            }
            Ok(None) => {
                debug!(repo = %self.repo, path = %self.path, "Signals file does not exist yet");
                None
            }
            Err(e) => {
                warn!(error = %e, "Error getting SHA");
                None
            }
        }
    }

    async fn write(&self, document: &[Signal]) -> bool {
        let revision = self.get_revision().await;

        let payload = match build_put_request(document, revision.as_ref(), &Local::now()) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Failed to encode signals document");
                return false;
            }
        };

        debug!(
            url = %self.contents_url,
            has_sha = payload.sha.is_some(),
            message = %payload.message,
            "Pushing signals"
        );

        let resp = match self
            .authed(self.http.put(&self.contents_url))
            .json(&payload)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "✗ Push error");
                return false;
            }
        };

        let status = resp.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            info!(pairs = document.len(), repo = %self.repo, "✓ Signals pushed to GitHub");
            true
        } else {
            let body = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "✗ GitHub push failed");
            false
        }
    }
}

/// `{api_base}/repos/{repo}/contents/{path}` with each path segment
/// percent-encoded.
fn contents_url(api_base: &str, repo: &str, path: &str) -> String {
    let encoded_path = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!(
        "{}/repos/{}/contents/{}",
        api_base.trim_end_matches('/'),
        repo.trim_matches('/'),
        encoded_path
    )
}
