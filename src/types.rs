//! Request and response types shared across the proxy core.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use url::Url;

use crate::cache::key::{self, CookieLookup};

/// Cache disposition of a response: `HIT`, `MISS`, `MISS (MULTIPLEXED)`,
/// `STALE` or `NO-CACHE`.
pub const X_HONEY_CACHE: HeaderName = HeaderName::from_static("x-honey-cache");

/// Why a stale response was served: `Backend gave HTTP Status <n>`.
pub const X_HONEY_STALE: HeaderName = HeaderName::from_static("x-honey-stale");

/// Internal: forces a distinct coalescer bucket on a re-fetch. Set and
/// consumed by the proxy only.
pub const X_HONEY_VARY: HeaderName = HeaderName::from_static("x-honey-vary");

/// The scheme the client used to reach the proxy, set unless a downstream
/// proxy already did.
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// A buffered client request as it travels through the mediator.
///
/// The URL is rewritten to target the backend before any cache key is
/// computed; the original host survives in [`host`](Self::host) and is sent
/// upstream via the `Host` header.
#[derive(Clone, Debug)]
pub struct ProxyRequest {
    pub method: Method,
    pub url: Url,
    pub host: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    /// A convenience constructor for GET requests, primarily used in tests.
    pub fn get(url: Url) -> Self {
        let host = url.host_str().unwrap_or_default().to_owned();
        ProxyRequest {
            method: Method::GET,
            url,
            host,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn set_header(&mut self, name: http::HeaderName, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
    }
}

impl CookieLookup for ProxyRequest {
    fn cookie(&self, name: &str) -> Option<String> {
        key::HeaderCookies(&self.headers).cookie(name)
    }
}

/// A fully buffered backend response, paired with the request that produced
/// it (the Forwarder contract hands both to the response-modifier hook).
#[derive(Clone, Debug)]
pub struct OriginResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub request: ProxyRequest,
}

/// The response finally written to a client.
#[derive(Clone, Debug)]
pub struct Outgoing {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Outgoing {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Outgoing {
            status,
            headers,
            body,
        }
    }

    /// A bodiless response with default headers.
    pub fn empty(status: StatusCode) -> Self {
        Outgoing::new(status, HeaderMap::new(), Bytes::new())
    }

    pub fn set_header(&mut self, name: http::HeaderName, value: &str) {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}
