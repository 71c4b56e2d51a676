//! Shared types for the funding signal bot.
//!
//! These types form the data model used across the scraper, storage and
//! engine modules. `Signal` is also the wire format of the published
//! `signals.json`, so its field names are fixed.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Format used for signal timestamps and commit messages.
///
/// Local wall-clock time with a literal `CET` suffix; no timezone
/// conversion takes place.
pub const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M CET";

/// Exchange label written into every signal.
pub const EXCHANGE_LABEL: &str = "Binance";

/// Render a local wall-clock time in [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

// ---------------------------------------------------------------------------
// Trading pair
// ---------------------------------------------------------------------------

/// A `BASE/QUOTE` symbol pair, e.g. `BTC/USDT`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for TradingPair {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None)
                if !base.trim().is_empty() && !quote.trim().is_empty() =>
            {
                Ok(Self::new(base.trim(), quote.trim()))
            }
            _ => Err(BotError::InvalidPair(s.to_string())),
        }
    }
}

impl TryFrom<String> for TradingPair {
    type Error = BotError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TradingPair> for String {
    fn from(pair: TradingPair) -> Self {
        pair.to_string()
    }
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// What the bot recommends for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Funding pays shorts: hold spot, short the perpetual.
    #[serde(rename = "LONG SPOT, SHORT PERP")]
    LongSpotShortPerp,
    #[serde(rename = "Warte")]
    Wait,
}

impl Action {
    pub fn from_profitable(profitable: bool) -> Self {
        if profitable {
            Action::LongSpotShortPerp
        } else {
            Action::Wait
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::LongSpotShortPerp => "LONG SPOT, SHORT PERP",
            Action::Wait => "Warte",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One funding-rate observation for one pair, as published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub pair: String,
    /// Rate in percent, three decimals and a trailing `%`.
    pub funding: String,
    /// Rate as a fraction, six decimals.
    pub funding_decimal: String,
    pub profitable: bool,
    pub action: Action,
    pub timestamp: String,
    pub exchange: String,
}

impl Signal {
    /// Build a signal from a parsed percentage.
    ///
    /// `profitable` is strictly `rate_pct > threshold_pct`.
    pub fn from_rate(
        pair: &TradingPair,
        rate_pct: f64,
        threshold_pct: f64,
        timestamp: String,
    ) -> Self {
        let rate_decimal = rate_pct / 100.0;
        let profitable = rate_pct > threshold_pct;
        Self {
            pair: pair.to_string(),
            funding: format!("{rate_pct:.3}%"),
            funding_decimal: format!("{rate_decimal:.6}"),
            profitable,
            action: Action::from_profitable(profitable),
            timestamp,
            exchange: EXCHANGE_LABEL.to_string(),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} - {}", self.pair, self.funding, self.action)
    }
}

// ---------------------------------------------------------------------------
// Remote document
// ---------------------------------------------------------------------------

/// Opaque revision identifier (`sha`) required for conditional updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionToken(pub String);

impl RevisionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The published signal list together with its current revision.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub signals: Vec<Signal>,
    pub revision: Option<RevisionToken>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("Invalid trading pair (expected BASE/QUOTE): {0:?}")]
    InvalidPair(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
