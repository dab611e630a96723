//! The in-memory response store.
//!
//! Entries are keyed by the primary key extended with the Vary signature:
//! one flat keyspace, because the hasher itself appends the memoised
//! signature once a `Vary` header has been observed, and lookups with an
//! already-extended key must land on the same entry that an admit with a
//! bare key wrote. A side map remembers the `Vary` header last observed per
//! key so lookups can compute the signature for an incoming request before
//! the caller has seen any response.
//!
//! Entries are only ever replaced, never expired: freshness is computed at
//! lookup time by the validator, and unbounded growth is accepted until
//! process recycling.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::response::CachedResponse;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Arc<CachedResponse>>>,
    vary: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Stores a response under the primary key extended by the Vary
    /// signature, overwriting any previous representation (last writer
    /// wins).
    pub fn insert(&self, primary: &str, signature: &str, response: Arc<CachedResponse>) {
        self.entries
            .write()
            .insert(format!("{primary}{signature}"), response);
    }

    pub fn get(&self, primary: &str, signature: &str) -> Option<Arc<CachedResponse>> {
        self.entries
            .read()
            .get(&format!("{primary}{signature}"))
            .cloned()
    }

    /// The `Vary` header last observed for this primary key.
    pub fn vary(&self, primary: &str) -> Option<String> {
        self.vary.read().get(primary).cloned()
    }

    pub fn memoize_vary(&self, primary: &str, vary: &str) {
        self.vary
            .write()
            .insert(primary.to_owned(), vary.to_owned());
    }
}
