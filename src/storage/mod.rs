//! Persistence layer.
//!
//! The signal list lives in a single JSON file in a GitHub repository and
//! is written through the contents API. Every write replaces the whole
//! document; there is no local cache and no history.
//!
//! Document encoding: UTF-8 JSON, pretty-printed with 2-space indent,
//! non-ASCII kept as-is, then standard base64 for the API envelope.

pub mod github;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::types::{format_timestamp, RevisionToken, Signal};

/// Remote home of the published signal document.
///
/// Implementations never fail loudly: errors are logged and reported as
/// `None` / `false` so the scheduler keeps running.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Current revision of the document, or `None` if it does not exist
    /// or could not be read.
    async fn get_revision(&self) -> Option<RevisionToken>;

    /// Replace the document with `document`. True only on success.
    async fn write(&self, document: &[Signal]) -> bool;
}

// ---------------------------------------------------------------------------
// Contents API envelopes
// ---------------------------------------------------------------------------

/// Body of `PUT /repos/{repo}/contents/{path}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutContentsRequest {
    pub message: String,
    /// Base64 of the encoded document.
    pub content: String,
    /// Required when the file already exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

/// The subset of `GET /repos/{repo}/contents/{path}` we read.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentsResponse {
    #[serde(default)]
    pub sha: Option<String>,
    /// Base64, wrapped with newlines by the API.
    #[serde(default)]
    pub content: Option<String>,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Serialize signals to the document format and base64 it.
pub fn encode_content(signals: &[Signal]) -> Result<String> {
    let json = serde_json::to_string_pretty(signals).context("Failed to serialise signals")?;
    Ok(general_purpose::STANDARD.encode(json.as_bytes()))
}

/// Inverse of [`encode_content`]. Whitespace inside the base64 is ignored.
pub fn decode_content(content: &str) -> Result<Vec<Signal>> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(compact.as_bytes())
        .context("Document content is not valid base64")?;
    let signals = serde_json::from_slice(&bytes).context("Document is not a signal list")?;
    Ok(signals)
}

pub fn commit_message(at: &DateTime<Local>) -> String {
    format!("Update: {}", format_timestamp(at))
}

/// Build the PUT body; `sha` is present only when a revision is known.
pub fn build_put_request(
    signals: &[Signal],
    revision: Option<&RevisionToken>,
    at: &DateTime<Local>,
) -> Result<PutContentsRequest> {
    Ok(PutContentsRequest {
        message: commit_message(at),
        content: encode_content(signals)?,
        sha: revision.map(|r| r.as_str().to_string()),
    })
}
