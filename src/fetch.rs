// src/fetch.rs
// Drives a WebDriver session to render the listing page (listings are
// populated client-side), then parses the page source off-line.

use std::time::Duration;

use fantoccini::{Client, ClientBuilder, Locator};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::config::Selectors;
use crate::listing::RawListing;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out waiting for the listing page")]
    Timeout,
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("extraction failed: {0}")]
    Extraction(String),
}

/// Listing acquisition seam. The monitor loop only knows this trait;
/// tests drive it with scripted in-memory sources.
#[async_trait::async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawListing>, FetchError>;
}

/// Fetches the live page through a WebDriver endpoint (geckodriver or
/// chromedriver). One session per fetch: connect, render, grab the source,
/// close. The session is released on every exit path.
pub struct WebListingSource {
    webdriver_url: String,
    list_url: String,
    selectors: Selectors,
    max_items: usize,
    timeout: Duration,
    headless: bool,
}

impl WebListingSource {
    pub fn new(webdriver_url: &str, list_url: &str, selectors: Selectors) -> Self {
        Self {
            webdriver_url: webdriver_url.to_string(),
            list_url: list_url.to_string(),
            selectors,
            max_items: 5,
            timeout: Duration::from_secs(45),
            headless: true,
        }
    }

    pub fn with_max_items(mut self, n: usize) -> Self {
        self.max_items = n.max(1);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    async fn connect(&self) -> Result<Client, FetchError> {
        let mut caps = serde_json::Map::new();
        if self.headless {
            caps.insert(
                "moz:firefoxOptions".to_string(),
                serde_json::json!({ "args": ["-headless"] }),
            );
            caps.insert(
                "goog:chromeOptions".to_string(),
                serde_json::json!({ "args": ["--headless=new", "--disable-gpu"] }),
            );
        }
        ClientBuilder::native()
            .capabilities(caps)
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| FetchError::Navigation(format!("webdriver connect: {e}")))
    }

    async fn render_and_extract(&self, client: &Client) -> Result<Vec<RawListing>, FetchError> {
        client
            .goto(&self.list_url)
            .await
            .map_err(|e| FetchError::Navigation(format!("goto {}: {e}", self.list_url)))?;

        client
            .wait()
            .at_most(self.timeout)
            .for_element(Locator::Css(&self.selectors.card))
            .await
            .map_err(|_| FetchError::Timeout)?;

        let html = client
            .source()
            .await
            .map_err(|e| FetchError::Extraction(format!("page source: {e}")))?;

        extract_listings(&html, &self.selectors, self.max_items, &self.list_url)
    }
}

#[async_trait::async_trait]
impl ListingSource for WebListingSource {
    async fn fetch(&self) -> Result<Vec<RawListing>, FetchError> {
        let client = self.connect().await?;

        let outcome =
            tokio::time::timeout(self.timeout, self.render_and_extract(&client)).await;

        // Release the session whatever happened above.
        if let Err(e) = client.clone().close().await {
            tracing::debug!(error = %e, "webdriver session close failed");
        }

        match outcome {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }
}

/// Parse rendered page HTML into raw listings, top-of-page first.
///
/// A card missing its title or link is skipped with a log line; the rest of
/// the batch still goes through. Zero cards is not an error here; the
/// monitor treats an empty batch as a transient anomaly.
pub fn extract_listings(
    html: &str,
    selectors: &Selectors,
    max_items: usize,
    base_url: &str,
) -> Result<Vec<RawListing>, FetchError> {
    let card_sel = parse_selector(&selectors.card)?;
    let link_sel = parse_selector(&selectors.link)?;
    let title_sel = parse_selector(&selectors.title)?;
    let desc_sel = parse_selector(&selectors.description)?;
    let posted_sel = parse_selector(&selectors.posted)?;

    let doc = Html::parse_document(html);
    let mut out = Vec::new();

    for (idx, card) in doc.select(&card_sel).enumerate() {
        if out.len() >= max_items {
            break;
        }
        let title = first_text(&card, &title_sel);
        let href = card
            .select(&link_sel)
            .next()
            .and_then(|n| n.value().attr("href"))
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string);

        let (Some(title), Some(href)) = (title, href) else {
            tracing::warn!(card = idx, "listing card missing title or link, skipped");
            continue;
        };

        out.push(RawListing {
            title,
            url: absolutize(base_url, &href),
            description: first_text(&card, &desc_sel).unwrap_or_default(),
            posted: first_text(&card, &posted_sel).unwrap_or_default(),
            order: idx,
        });
    }

    Ok(out)
}

fn parse_selector(s: &str) -> Result<Selector, FetchError> {
    Selector::parse(s).map_err(|e| FetchError::Extraction(format!("selector {s:?}: {e}")))
}

fn first_text(card: &ElementRef<'_>, sel: &Selector) -> Option<String> {
    card.select(sel)
        .next()
        .map(|n| n.text().collect::<String>())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Join card hrefs against the list URL; relative links are the norm on
/// the source page.
fn absolutize(base_url: &str, href: &str) -> String {
    match reqwest::Url::parse(base_url).and_then(|b| b.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="root job-card child-card">
            <a class="job-title job-link row" href="/jobs/rust-dev-301">Rust developer</a>
            <div class="job-card-description">Build a scraper.</div>
            <div class="job-card-date">1 hour ago</div>
          </div>
          <div class="root job-card child-card">
            <a class="job-title job-link row" href="/jobs/go-dev-300">Go developer</a>
          </div>
          <div class="root job-card child-card">
            <span class="job-card-date">broken card, no link</span>
          </div>
          <div class="root job-card child-card">
            <a class="job-title job-link row" href="/jobs/zig-dev-299">Zig developer</a>
          </div>
        </body></html>"#;

    #[test]
    fn extracts_cards_in_page_order_with_absolute_urls() {
        let out =
            extract_listings(PAGE, &Selectors::default(), 10, "https://laborx.com/jobs").unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].title, "Rust developer");
        assert_eq!(out[0].url, "https://laborx.com/jobs/rust-dev-301");
        assert_eq!(out[0].description, "Build a scraper.");
        assert_eq!(out[0].posted, "1 hour ago");
        assert_eq!(out[1].title, "Go developer");
        assert_eq!(out[1].description, "");
        assert_eq!(out[2].title, "Zig developer");
    }

    #[test]
    fn broken_card_is_skipped_not_fatal() {
        let out =
            extract_listings(PAGE, &Selectors::default(), 10, "https://laborx.com/jobs").unwrap();
        // Card index 2 has no link; its DOM position is preserved in `order`.
        let orders: Vec<usize> = out.iter().map(|l| l.order).collect();
        assert_eq!(orders, vec![0, 1, 3]);
    }

    #[test]
    fn top_n_cap_applies() {
        let out =
            extract_listings(PAGE, &Selectors::default(), 2, "https://laborx.com/jobs").unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].title, "Go developer");
    }

    #[test]
    fn empty_page_yields_empty_batch() {
        let out = extract_listings(
            "<html><body></body></html>",
            &Selectors::default(),
            5,
            "https://laborx.com/jobs",
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn bad_selector_is_an_extraction_error() {
        let mut sel = Selectors::default();
        sel.card = ":::".to_string();
        let err = extract_listings(PAGE, &sel, 5, "https://laborx.com/jobs").unwrap_err();
        assert!(matches!(err, FetchError::Extraction(_)));
    }
}
