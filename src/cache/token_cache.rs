use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::cache::token::TokenRecord;

/// Slot holding the second secret of a two-secret setup, published as-is
pub const MAIL_CREDS_SLOT: &str = "mail_creds";

type Slots = HashMap<String, Arc<TokenRecord>>;

/// Slot name -> latest token record.
///
/// Readers never wait: `load` is a single atomic pointer load. Writers
/// build a new map and swap it in with a compare-and-swap loop, so two
/// workers storing into different slots at the same moment both land.
/// Cloning the cache shares the same underlying slots.
#[derive(Debug, Clone)]
pub struct TokenCache {
    inner: Arc<ArcSwap<Slots>>,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    pub fn new() -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(HashMap::new())) }
    }

    /// Replace the record for `slot`. Last writer wins.
    pub fn store(&self, slot: &str, record: TokenRecord) {
        let record = Arc::new(record);
        self.inner.rcu(|current| {
            let mut next = Slots::clone(current);
            next.insert(slot.to_owned(), Arc::clone(&record));
            next
        });
        debug!(slot, "token record stored");
    }

    /// Latest completed store for `slot`, `None` until the first one
    pub fn load(&self, slot: &str) -> Option<Arc<TokenRecord>> {
        self.inner.load().get(slot).cloned()
    }

    pub fn contains(&self, slot: &str) -> bool {
        self.inner.load().contains_key(slot)
    }

    /// Names of populated slots, sorted
    pub fn slots(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.load().keys().cloned().collect();
        names.sort();
        names
    }
}
