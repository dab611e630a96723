//! The cache core: cacheability policy, request hashing, response
//! standardisation and the in-memory store.
//!
//! [`Cacher`] is the contract the mediator and the coalescer program
//! against; [`DefaultCacher`] is the in-memory implementation.

use std::sync::Arc;

use anyhow::Result;

use crate::config::CacheOptions;
use crate::types::{OriginResponse, ProxyRequest, X_HONEY_VARY};

pub mod control;
pub mod key;
pub mod policy;
pub mod response;
pub mod store;

pub use control::{CacheControl, StaleIfError};
pub use response::CachedResponse;

use policy::Policy;
use store::MemoryStore;

/// The interface the reverse proxy uses to decide whether a request may be
/// cached, to key it, and to save and load responses.
pub trait Cacher: Send + Sync + 'static {
    /// Whether a request is eligible for cacheing at all.
    fn can_cache(&self, request: &ProxyRequest) -> bool;

    /// The key under which a request is saved. Requests hashing to the same
    /// value are served the same response.
    fn hash(&self, request: &ProxyRequest) -> String;

    /// Normalises a backend response into a shareable [`CachedResponse`].
    fn standardize(&self, origin: &mut OriginResponse) -> Arc<CachedResponse>;

    /// Saves a response under the supplied hash.
    fn cache(&self, hash: &str, response: Arc<CachedResponse>);

    /// Retrieves the response for the supplied hash, honoring the Vary
    /// header observed for it.
    fn load(&self, hash: &str, request: &ProxyRequest) -> Option<Arc<CachedResponse>>;

    /// The cookie names the cache lets through, in configured order.
    fn allowed_cookies(&self) -> &[String];
}

/// The in-memory [`Cacher`].
#[derive(Debug)]
pub struct DefaultCacher {
    policy: Policy,
    allowed_cookies: Vec<String>,
    store: MemoryStore,
}

impl DefaultCacher {
    pub fn new(options: &CacheOptions) -> Result<Self> {
        Ok(DefaultCacher {
            policy: Policy::new(&options.skip_urls, &options.skip_paths)?,
            allowed_cookies: options.allowed_cookies.clone(),
            store: MemoryStore::new(),
        })
    }
}

impl Default for DefaultCacher {
    fn default() -> Self {
        DefaultCacher::new(&CacheOptions::default()).expect("default options are valid")
    }
}

impl Cacher for DefaultCacher {
    fn can_cache(&self, request: &ProxyRequest) -> bool {
        self.policy
            .can_cache(&request.method, &request.url, &request.headers)
    }

    fn hash(&self, request: &ProxyRequest) -> String {
        let mut hash = key::fingerprint(
            &request.method,
            &request.url,
            &request.headers,
            &self.allowed_cookies,
        );
        if let Some(vary) = self.store.vary(&hash) {
            hash.push_str(&key::vary_signature(
                &vary,
                &request.headers,
                request,
                &self.allowed_cookies,
            ));
        }
        // Set by the coalescer to steer a follow-up fetch into its own
        // bucket; appended verbatim.
        if let Some(value) = request.header(X_HONEY_VARY.as_str()) {
            hash.push_str(value);
        }
        hash
    }

    fn standardize(&self, origin: &mut OriginResponse) -> Arc<CachedResponse> {
        Arc::new(response::standardize(origin, &self.allowed_cookies))
    }

    fn cache(&self, hash: &str, response: Arc<CachedResponse>) {
        let vary = response.vary().to_owned();
        if !vary.is_empty() {
            self.store.memoize_vary(hash, &vary);
        }
        let signature = key::vary_signature(
            &vary,
            response.request_headers(),
            &key::HeaderCookies(response.request_headers()),
            &self.allowed_cookies,
        );
        self.store.insert(hash, &signature, response);
    }

    fn load(&self, hash: &str, request: &ProxyRequest) -> Option<Arc<CachedResponse>> {
        let signature = match self.store.vary(hash) {
            Some(vary) => {
                key::vary_signature(&vary, &request.headers, request, &self.allowed_cookies)
            }
            None => String::new(),
        };
        self.store.get(hash, &signature)
    }

    fn allowed_cookies(&self) -> &[String] {
        &self.allowed_cookies
    }
}
