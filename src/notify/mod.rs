// src/notify/mod.rs
pub mod telegram;

use thiserror::Error;

use crate::listing::Listing;

pub use telegram::TelegramNotifier;

/// Telegram chat that receives notifications. Bound on the first `/start`
/// and fixed for the process lifetime afterwards.
pub type ChatId = i64;

/// Delivery failure taxonomy. Transient errors are worth retrying inside
/// the dispatcher; permanent ones are surfaced to the monitor loop, which
/// leaves the item uncommitted so a later cycle can try again.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transient delivery failure: {reason}")]
    Transient {
        reason: String,
        /// Server-suggested wait, when the transport provides one (429).
        retry_after_secs: Option<u64>,
    },
    #[error("permanent delivery failure: {reason}")]
    Permanent { reason: String },
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transient { .. })
    }
}

/// Outbound delivery seam. The monitor loop only knows this trait; tests
/// drive it with in-memory implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Format and deliver one listing to the destination chat, retrying
    /// transient transport failures up to the implementation's bound.
    async fn dispatch(&self, item: &Listing, destination: ChatId) -> Result<(), DeliveryError>;
}
