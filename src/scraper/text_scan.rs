//! Heuristic funding-rate extraction by text search.
//!
//! For each pair the scanner finds the first case-insensitive occurrence
//! of the base symbol, cuts a window of text around it, looks for an
//! exchange marker inside the window and takes the first percentage that
//! follows the marker. There is no markup parsing: when the page layout
//! shifts, pairs are silently skipped.
//!
//! All positions are counted in characters, not bytes. Case folding maps
//! every character to exactly one character, so an index into the folded
//! text is also an index into the original.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use regex::Regex;
use std::fmt;
use tracing::{debug, info};

use super::RateExtractor;
use crate::config::ExtractorConfig;
use crate::types::{format_timestamp, Signal, TradingPair};

/// Optional sign, digits, optional fraction, optional whitespace, `%`.
const RATE_PATTERN: &str = r"([-+]?\d+\.?\d*)\s*%";

/// Why a pair produced no signal.
#[derive(Debug, Clone, PartialEq)]
enum SkipReason {
    SymbolNotFound,
    NoExchangeMarker,
    NoPercentage,
    Unparseable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SymbolNotFound => f.write_str("symbol not on page"),
            SkipReason::NoExchangeMarker => f.write_str("no exchange marker near symbol"),
            SkipReason::NoPercentage => f.write_str("no percentage after marker"),
            SkipReason::Unparseable(text) => write!(f, "unparseable rate {text:?}"),
        }
    }
}

pub struct TextScanExtractor {
    config: ExtractorConfig,
    /// Markers pre-folded, empty ones dropped.
    markers: Vec<Vec<char>>,
    rate_pattern: Regex,
}

impl TextScanExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let rate_pattern = Regex::new(RATE_PATTERN).context("Invalid rate pattern")?;
        let markers = config
            .markers
            .iter()
            .filter(|m| !m.is_empty())
            .map(|m| fold_str(m))
            .collect();

        Ok(Self {
            config,
            markers,
            rate_pattern,
        })
    }

    /// Extract signals, stamping each with `at`.
    pub fn extract_at(
        &self,
        page_text: &str,
        pairs: &[TradingPair],
        at: DateTime<Local>,
    ) -> Vec<Signal> {
        let folded = fold_str(page_text);
        let timestamp = format_timestamp(&at);
        let mut signals = Vec::new();

        for pair in pairs {
            match self.scan_pair(&folded, pair) {
                Ok(rate_pct) => {
                    let signal = Signal::from_rate(
                        pair,
                        rate_pct,
                        self.config.profit_threshold_pct,
                        timestamp.clone(),
                    );
                    info!(
                        pair = %signal.pair,
                        funding = %signal.funding,
                        action = %signal.action,
                        "  ✓ Funding rate found"
                    );
                    signals.push(signal);
                }
                Err(reason) => {
                    debug!(pair = %pair, reason = %reason, "Pair skipped");
                }
            }
        }

        signals
    }

    /// Locate the rate for one pair in the folded page text.
    fn scan_pair(&self, folded: &[char], pair: &TradingPair) -> Result<f64, SkipReason> {
        let symbol = fold_str(&pair.base);
        let pos = find_chars(folded, &symbol).ok_or(SkipReason::SymbolNotFound)?;

        let start = pos.saturating_sub(self.config.window_before);
        let end = pos.saturating_add(self.config.window_after).min(folded.len());
        let window = &folded[start..end];

        let marker_pos = self
            .markers
            .iter()
            .find_map(|m| find_chars(window, m))
            .ok_or(SkipReason::NoExchangeMarker)?;

        let scan_end = marker_pos
            .saturating_add(self.config.scan_distance)
            .min(window.len());
        let after_marker: String = window[marker_pos..scan_end].iter().collect();

        let rate_text = self
            .rate_pattern
            .captures(&after_marker)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or(SkipReason::NoPercentage)?;

        rate_text
            .parse::<f64>()
            .map_err(|_| SkipReason::Unparseable(rate_text.clone()))
    }
}

impl RateExtractor for TextScanExtractor {
    fn extract(&self, page_text: &str, pairs: &[TradingPair]) -> Result<Vec<Signal>> {
        Ok(self.extract_at(page_text, pairs, Local::now()))
    }
}

// ---------------------------------------------------------------------------
// Character helpers
// ---------------------------------------------------------------------------

fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn fold_str(s: &str) -> Vec<char> {
    s.chars().map(fold_char).collect()
}

/// Index of the first occurrence of `needle` in `haystack`.
fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
