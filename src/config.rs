//! Configuration with environment variable resolution.
//!
//! Everything has a built-in default, so the bot runs with no
//! configuration at all. Tunables can be overridden by pointing
//! `SIGNAL_BOT_CONFIG` at a TOML file; the GitHub token and target
//! repository always come from the environment (`GITHUB_TOKEN`,
//! `GITHUB_REPO`) and fall back to placeholders.
//!
//! The resulting `AppConfig` is built once in `main` and handed to each
//! component; nothing reads the environment after startup.

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use std::fs;

use crate::types::{BotError, TradingPair};

/// Env var naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "SIGNAL_BOT_CONFIG";
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";
pub const REPO_ENV: &str = "GITHUB_REPO";

/// Placeholder used when `GITHUB_TOKEN` is unset. Not a real credential.
pub const PLACEHOLDER_TOKEN: &str = "ghp_YOUR_TOKEN_HERE";
pub const DEFAULT_REPO: &str = "esslinger-co/Funding-Rate-Signal-Bot";

pub const DEFAULT_PAGE_URL: &str = "https://www.coinglass.com/FundingRate";
pub const DEFAULT_BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
pub const DEFAULT_SIGNALS_PATH: &str = "signals.json";

pub const DEFAULT_PAIRS: &[&str] = &[
    "BTC/USDT",
    "ETH/USDT",
    "SOL/USDT",
    "XRP/USDT",
    "DOGE/USDT",
    "ADA/USDT",
    "AVAX/USDT",
    "MATIC/USDT",
];

/// Characters of page text kept before a symbol match.
pub const WINDOW_BEFORE: usize = 300;
/// Characters of page text kept after a symbol match.
pub const WINDOW_AFTER: usize = 500;
/// Characters scanned for a percentage after the exchange marker.
pub const SCAN_DISTANCE: usize = 200;
/// Rates strictly above this percentage are flagged profitable.
pub const PROFIT_THRESHOLD_PCT: f64 = 0.05;

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub extractor: ExtractorConfig,
    pub github: GitHubConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScraperConfig {
    pub url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub pairs: Vec<TradingPair>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PAGE_URL.to_string(),
            user_agent: DEFAULT_BROWSER_UA.to_string(),
            timeout_secs: 15,
            pairs: DEFAULT_PAIRS
                .iter()
                .filter_map(|p| p.parse().ok())
                .collect(),
        }
    }
}

/// Tuning for the text-scan extractor. The defaults match one specific
/// page layout.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExtractorConfig {
    pub window_before: usize,
    pub window_after: usize,
    pub scan_distance: usize,
    pub profit_threshold_pct: f64,
    /// Exchange markers, tried in order.
    pub markers: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            window_before: WINDOW_BEFORE,
            window_after: WINDOW_AFTER,
            scan_distance: SCAN_DISTANCE,
            profit_threshold_pct: PROFIT_THRESHOLD_PCT,
            markers: vec!["binance".to_string(), "okx".to_string()],
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_base: String,
    pub repo: String,
    pub signals_path: String,
    pub timeout_secs: u64,
    /// Only ever set from the environment.
    #[serde(skip, default = "placeholder_token")]
    pub token: SecretString,
}

fn placeholder_token() -> SecretString {
    SecretString::new(PLACEHOLDER_TOKEN.to_string())
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_GITHUB_API.to_string(),
            repo: DEFAULT_REPO.to_string(),
            signals_path: DEFAULT_SIGNALS_PATH.to_string(),
            timeout_secs: 10,
            token: placeholder_token(),
        }
    }
}

impl GitHubConfig {
    /// Whether the token is still the built-in placeholder.
    pub fn has_placeholder_token(&self) -> bool {
        self.token.expose_secret() == PLACEHOLDER_TOKEN
    }
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_base", &self.api_base)
            .field("repo", &self.repo)
            .field("signals_path", &self.signals_path)
            .field("timeout_secs", &self.timeout_secs)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Delay after a completed cycle.
    pub interval_secs: u64,
    /// Delay after a cycle that failed unexpectedly.
    pub error_backoff_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            error_backoff_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration using `lookup` in place of the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match lookup(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Some(token) = lookup(TOKEN_ENV).filter(|v| !v.is_empty()) {
            cfg.github.token = SecretString::new(token);
        }
        if let Some(repo) = lookup(REPO_ENV).filter(|v| !v.is_empty()) {
            cfg.github.repo = repo;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Load tunables from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }

    /// Reject configurations the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scraper.pairs.is_empty() {
            return Err(config_error("scraper.pairs must not be empty"));
        }
        if self.scraper.url.is_empty() {
            return Err(config_error("scraper.url must not be empty"));
        }
        if self.extractor.markers.iter().all(|m| m.is_empty()) {
            return Err(config_error("extractor.markers must contain a non-empty marker"));
        }
        if self.github.repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(config_error("github.repo must look like owner/name"));
        }
        if self.github.signals_path.is_empty() {
            return Err(config_error("github.signals_path must not be empty"));
        }
        if self.scheduler.interval_secs == 0 || self.scheduler.error_backoff_secs == 0 {
            return Err(config_error("scheduler intervals must be greater than zero"));
        }
        Ok(())
    }
}

fn config_error(msg: &str) -> anyhow::Error {
    BotError::Config(msg.to_string()).into()
}
