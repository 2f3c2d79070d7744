// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod bot;
pub mod config;
pub mod diff;
pub mod fetch;
pub mod listing;
pub mod metrics;
pub mod monitor;
pub mod notify;
pub mod seen;
pub mod telegram;

// ---- Re-exports for stable public API ----
pub use crate::config::{Config, Selectors, StartupError};
pub use crate::fetch::{FetchError, ListingSource, WebListingSource};
pub use crate::listing::{Listing, RawListing};
pub use crate::monitor::{MonitorCfg, MonitorHandle, MonitorState};
pub use crate::notify::{ChatId, DeliveryError, Notifier, TelegramNotifier};
pub use crate::seen::SeenStore;
