// src/diff.rs
use std::collections::HashSet;

use crate::listing::Listing;
use crate::seen::SeenStore;

/// Select the not-yet-notified subset of a freshly fetched batch, ordered
/// for delivery.
///
/// The batch arrives in page order (index 0 = top = newest). The result is
/// reversed so a burst of new listings reads chronologically in the chat.
/// Does not touch the store; identities are committed only after a
/// successful dispatch.
pub fn diff(batch: &[Listing], seen: &SeenStore) -> Vec<Listing> {
    let mut picked: HashSet<&str> = HashSet::with_capacity(batch.len());
    let mut fresh: Vec<Listing> = batch
        .iter()
        .filter(|l| !seen.has(&l.identity) && picked.insert(l.identity.as_str()))
        .cloned()
        .collect();
    fresh.reverse();
    fresh
}
