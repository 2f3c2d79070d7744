//! One-shot fetch against the live listing page. Useful for checking the
//! selectors after a site layout change without running the whole bot.
//!
//! Needs a WebDriver endpoint (geckodriver/chromedriver) like the monitor
//! itself: `WEBDRIVER_URL` and `LIST_URL` are honored, defaults apply.

use jobwatch::config::load_selectors_default;
use jobwatch::fetch::{ListingSource, WebListingSource};
use jobwatch::listing::Listing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let webdriver_url = std::env::var("WEBDRIVER_URL")
        .unwrap_or_else(|_| "http://localhost:4444".to_string());
    let list_url =
        std::env::var("LIST_URL").unwrap_or_else(|_| "https://laborx.com/jobs".to_string());
    let selectors = load_selectors_default()?;

    let source = WebListingSource::new(&webdriver_url, &list_url, selectors).with_max_items(10);
    let raw = source.fetch().await?;

    println!("{} listing(s) extracted from {list_url}", raw.len());
    for r in raw {
        let l = Listing::from_raw(r);
        println!("[{}] {}\n    {}\n    id={}", l.order, l.title, l.url, l.identity);
    }
    Ok(())
}
