// src/listing.rs
use once_cell::sync::OnceCell;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Description cap applied at normalization time. The message formatter in
/// `notify` assumes descriptions never exceed this.
pub const DESCRIPTION_MAX_CHARS: usize = 1500;

/// One listing card as scraped from the page, before normalization.
/// Produced fresh each fetch cycle and discarded right after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListing {
    pub title: String,
    pub url: String,
    pub description: String,
    /// Posted-time marker as rendered ("2 hours ago", "Jan 5", ...).
    pub posted: String,
    /// Position in the page's top-listing order, 0 = topmost.
    pub order: usize,
}

/// Canonical listing record with a stable identity key.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Listing {
    /// Deterministic dedup key: the listing URL when present, otherwise a
    /// hash of title + posted marker.
    pub identity: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub posted: String,
    /// Position in the current batch, 0 = top of page (newest).
    pub order: usize,
}

impl Listing {
    pub fn from_raw(raw: RawListing) -> Self {
        let title = collapse_ws(&raw.title);
        let url = raw.url.trim().to_string();
        let posted = collapse_ws(&raw.posted);
        let mut description = collapse_ws(&raw.description);
        if description.chars().count() > DESCRIPTION_MAX_CHARS {
            description = description.chars().take(DESCRIPTION_MAX_CHARS).collect();
        }

        let identity = if url.is_empty() {
            content_key(&title, &posted)
        } else {
            url.clone()
        };

        Self {
            identity,
            title,
            url,
            description,
            posted,
            order: raw.order,
        }
    }
}

/// Collapse whitespace runs and trim.
fn collapse_ws(s: &str) -> String {
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re.replace_all(s, " ").trim().to_string()
}

/// Fallback identity for listings without a usable URL.
fn content_key(title: &str, posted: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(posted.as_bytes());
    format!("{:x}", hasher.finalize())
}
