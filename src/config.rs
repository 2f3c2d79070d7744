// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;

const ENV_SELECTORS_PATH: &str = "SELECTORS_PATH";
const DEFAULT_SELECTORS_PATH: &str = "config/selectors.toml";

/// Fatal configuration problems. Anything here aborts the process before
/// the monitor loop ever starts.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("BOT_TOKEN is not set in the environment")]
    MissingToken,
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub list_url: String,
    pub poll_interval_secs: u64,
    pub max_list_items: usize,
    pub seen_cap: usize,
    pub webdriver_url: String,
    pub fetch_timeout_secs: u64,
    pub headless: bool,
    pub owner_chat_id: Option<i64>,
    pub http_addr: String,
}

impl Config {
    /// Read configuration from the environment. Only `BOT_TOKEN` is
    /// mandatory; everything else has a default matching the page the
    /// monitor was built for.
    pub fn from_env() -> Result<Self, StartupError> {
        let bot_token = match std::env::var("BOT_TOKEN") {
            Ok(t) if !t.trim().is_empty() => t,
            _ => return Err(StartupError::MissingToken),
        };

        Ok(Self {
            bot_token,
            list_url: env_or("LIST_URL", "https://laborx.com/jobs"),
            poll_interval_secs: env_parse("POLL_INTERVAL_SECS", 600)?,
            max_list_items: env_parse("MAX_LIST_ITEMS", 5)?,
            seen_cap: env_parse("SEEN_CAP", 50)?,
            webdriver_url: env_or("WEBDRIVER_URL", "http://localhost:4444"),
            fetch_timeout_secs: env_parse("FETCH_TIMEOUT_SECS", 45)?,
            headless: env_parse("HEADLESS", true)?,
            owner_chat_id: env_parse_opt("OWNER_CHAT_ID")?,
            http_addr: env_or("HTTP_ADDR", "127.0.0.1:8080"),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr>(key: &'static str, default: T) -> Result<T, StartupError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| StartupError::InvalidValue { key, value: v }),
        _ => Ok(default),
    }
}

fn env_parse_opt<T: FromStr>(key: &'static str) -> Result<Option<T>, StartupError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| StartupError::InvalidValue { key, value: v }),
        _ => Ok(None),
    }
}

/// CSS selectors for the listing page. Markup drift on the source site is
/// absorbed here instead of in the fetcher code.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Selectors {
    /// One element per listing card, in page order.
    pub card: String,
    /// Anchor inside the card carrying the listing link.
    pub link: String,
    /// Element inside the card carrying the title text.
    pub title: String,
    /// Optional: card-level description snippet.
    pub description: String,
    /// Optional: posted-time marker ("2 hours ago" etc.).
    pub posted: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            card: ".root.job-card.child-card".to_string(),
            link: ".job-title.job-link.row".to_string(),
            title: ".job-title.job-link.row".to_string(),
            description: ".job-card-description".to_string(),
            posted: ".job-card-date".to_string(),
        }
    }
}

/// Load selectors from an explicit TOML file.
pub fn load_selectors_from(path: &Path) -> Result<Selectors> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading selectors from {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

/// Load selectors using env var + fallbacks:
/// 1) $SELECTORS_PATH
/// 2) config/selectors.toml
/// 3) built-in defaults
pub fn load_selectors_default() -> Result<Selectors> {
    if let Ok(p) = std::env::var(ENV_SELECTORS_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_selectors_from(&pb);
        }
        anyhow::bail!("SELECTORS_PATH points to non-existent path");
    }
    let toml_p = PathBuf::from(DEFAULT_SELECTORS_PATH);
    if toml_p.exists() {
        return load_selectors_from(&toml_p);
    }
    Ok(Selectors::default())
}
