// src/notify/telegram.rs
use std::time::Duration;

use html_escape::encode_text;

use super::{ChatId, DeliveryError, Notifier};
use crate::listing::Listing;
use crate::telegram::TelegramClient;

/// Working budget below Telegram's 4096-char message ceiling, leaving
/// headroom for entity markup.
pub const MESSAGE_LIMIT: usize = 3900;

pub struct TelegramNotifier {
    api: TelegramClient,
    max_retries: u8,
}

impl TelegramNotifier {
    pub fn new(api: TelegramClient) -> Self {
        Self {
            api,
            max_retries: 3,
        }
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn dispatch(&self, item: &Listing, destination: ChatId) -> Result<(), DeliveryError> {
        let text = format_listing_message(item);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.api.send_message(destination, &text).await {
                Ok(()) => return Ok(()),
                Err(e @ DeliveryError::Permanent { .. }) => return Err(e),
                Err(e @ DeliveryError::Transient { .. }) => {
                    if attempt >= self.max_retries {
                        return Err(e);
                    }
                    let wait = match &e {
                        DeliveryError::Transient {
                            retry_after_secs: Some(secs),
                            ..
                        } => Duration::from_secs(*secs),
                        _ => Duration::from_millis(500u64 << (attempt - 1)),
                    };
                    tracing::debug!(
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        identity = %item.identity,
                        "transient delivery failure, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

/// One listing, one message: bold title, description, posted marker, link.
/// All scraped text is HTML-escaped; the result stays under
/// [`MESSAGE_LIMIT`].
pub fn format_listing_message(item: &Listing) -> String {
    let title = encode_text(&item.title);
    let posted = encode_text(&item.posted);
    let url = encode_text(&item.url);

    let mut tail = String::new();
    if !item.posted.is_empty() {
        tail.push_str(&format!("Posted: {posted}\n"));
    }
    tail.push_str(&url);

    let head = format!("<b>{title}</b>");
    let mut description = item.description.clone();
    loop {
        let desc = encode_text(&description);
        let msg = if desc.is_empty() {
            format!("{head}\n\n{tail}")
        } else {
            format!("{head}\n\n{desc}\n\n{tail}")
        };
        if msg.chars().count() <= MESSAGE_LIMIT || description.is_empty() {
            return msg;
        }
        // Escaping can only grow the text, so shrinking the raw description
        // by the overflow converges in a couple of rounds.
        let over = msg.chars().count() - MESSAGE_LIMIT;
        let keep = description.chars().count().saturating_sub(over.max(16));
        description = description.chars().take(keep).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::RawListing;

    fn listing(title: &str, description: &str) -> Listing {
        Listing::from_raw(RawListing {
            title: title.into(),
            url: "https://example.com/jobs/demo-1".into(),
            description: description.into(),
            posted: "2 hours ago".into(),
            order: 0,
        })
    }

    #[test]
    fn message_contains_title_link_and_posted_marker() {
        let msg = format_listing_message(&listing("Rust engineer", "Build things."));
        assert!(msg.starts_with("<b>Rust engineer</b>"));
        assert!(msg.contains("Build things."));
        assert!(msg.contains("Posted: 2 hours ago"));
        assert!(msg.contains("https://example.com/jobs/demo-1"));
    }

    #[test]
    fn scraped_text_is_html_escaped() {
        let msg = format_listing_message(&listing("a <b> & c", "x < y"));
        assert!(msg.contains("a &lt;b&gt; &amp; c"));
        assert!(msg.contains("x &lt; y"));
        assert!(!msg.contains("<b> &"));
    }

    #[test]
    fn long_description_is_trimmed_under_the_ceiling() {
        // Normalization caps descriptions well below the ceiling, but the
        // formatter holds the bound on its own too.
        let mut l = listing("t", "");
        l.description = "&".repeat(MESSAGE_LIMIT);
        let msg = format_listing_message(&l);
        assert!(msg.chars().count() <= MESSAGE_LIMIT);
        assert!(msg.contains("https://example.com/jobs/demo-1"));
    }

    #[test]
    fn empty_description_produces_no_blank_block() {
        let msg = format_listing_message(&listing("t", ""));
        assert!(!msg.contains("\n\n\n"));
    }
}
