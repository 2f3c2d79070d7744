// tests/extract_cards.rs
// Extraction against a captured listing-page fixture.

use jobwatch::config::Selectors;
use jobwatch::fetch::extract_listings;
use jobwatch::listing::Listing;

const PAGE: &str = include_str!("fixtures/listing_page.html");
const BASE: &str = "https://laborx.com/jobs";

#[test]
fn fixture_page_extracts_cards_in_order() {
    let raw = extract_listings(PAGE, &Selectors::default(), 10, BASE).unwrap();
    let titles: Vec<&str> = raw.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "Senior Rust engineer",
            "Smart contract auditor",
            "DevOps engineer",
            "Technical writer",
        ]
    );
    // The promo card without a link was skipped; DOM positions survive.
    let orders: Vec<usize> = raw.iter().map(|r| r.order).collect();
    assert_eq!(orders, vec![0, 1, 3, 4]);
}

#[test]
fn relative_and_absolute_links_both_resolve() {
    let raw = extract_listings(PAGE, &Selectors::default(), 10, BASE).unwrap();
    assert_eq!(raw[0].url, "https://laborx.com/jobs/senior-rust-engineer-4812");
    assert_eq!(raw[2].url, "https://partners.example.com/jobs/devops-4790");
}

#[test]
fn normalization_produces_stable_identities_from_fixture() {
    let raw = extract_listings(PAGE, &Selectors::default(), 10, BASE).unwrap();
    let listings: Vec<Listing> = raw.clone().into_iter().map(Listing::from_raw).collect();
    let again: Vec<Listing> = raw.into_iter().map(Listing::from_raw).collect();
    for (a, b) in listings.iter().zip(&again) {
        assert_eq!(a.identity, b.identity);
    }
    // Multi-line description collapsed to single-spaced text.
    assert_eq!(
        listings[0].description,
        "Build and maintain a high-throughput matching engine. Remote, long term."
    );
    // Entity decoded by the HTML parser, then escaped only at send time.
    assert_eq!(
        listings[1].description,
        "Audit Solidity & Vyper contracts before mainnet launch."
    );
}

#[test]
fn top_n_matches_the_configured_cap() {
    let raw = extract_listings(PAGE, &Selectors::default(), 2, BASE).unwrap();
    assert_eq!(raw.len(), 2);
}
