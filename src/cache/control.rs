//! Cache-Control directive extraction.
//!
//! Directive presence is tested by substring containment and numeric values
//! are pulled out with quoted-value-tolerant patterns. Containment means
//! `no-cache` also matches `no-cache="set-cookie"`; callers that care about
//! the field form check for the full token.

use http::header::CACHE_CONTROL;
use http::HeaderMap;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref S_MAXAGE: Regex = Regex::new(r#"s-maxage=(?:")?(\d+)(?:")?(?:,|$)"#).unwrap();
    static ref MAX_AGE: Regex = Regex::new(r#"max-age=(?:")?(\d+)(?:")?(?:,|$)"#).unwrap();
    static ref STALE_WHILE_REVALIDATE: Regex =
        Regex::new(r#"stale-while-revalidate=(?:")?(\d+)(?:")?(?:,|$)"#).unwrap();
    static ref STALE_IF_ERROR: Regex =
        Regex::new(r#"stale-if-error=(?:")?(\d+|\*+)(?:")?(?:,|$)"#).unwrap();
}

/// The value of a `stale-if-error` directive (RFC 5861 section 4).
///
/// `*` is an extension: serve from cache indefinitely when the backend
/// errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaleIfError {
    Always,
    Window(u64),
}

/// A parsed-on-demand view over a `Cache-Control` header value.
#[derive(Clone, Debug, Default)]
pub struct CacheControl {
    value: String,
}

impl CacheControl {
    pub fn new(value: impl Into<String>) -> Self {
        CacheControl {
            value: value.into(),
        }
    }

    /// Reads the first `Cache-Control` header from a header map. A missing
    /// header behaves like an empty one.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let value = headers
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        CacheControl::new(value)
    }

    pub fn raw(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Whether the directive occurs anywhere in the header value.
    pub fn has(&self, directive: &str) -> bool {
        self.value.contains(directive)
    }

    /// The `s-maxage` value (RFC 7234 section 5.2.2.8).
    pub fn s_maxage(&self) -> Option<u64> {
        if !self.has("s-maxage") {
            return None;
        }
        capture_u64(&S_MAXAGE, &self.value)
    }

    /// The `max-age` value (RFC 7234 section 5.2.2.9).
    ///
    /// Guarded by an `s-maxage` check first because the shorter token is a
    /// substring of the longer one.
    pub fn max_age(&self) -> Option<u64> {
        if self.has("s-maxage") || !self.has("max-age") {
            return None;
        }
        capture_u64(&MAX_AGE, &self.value)
    }

    /// The freshness lifetime: `s-maxage` overrides `max-age`.
    pub fn effective_max_age(&self) -> Option<u64> {
        self.s_maxage().or_else(|| self.max_age())
    }

    /// The `stale-while-revalidate` window (RFC 5861 section 3).
    pub fn stale_while_revalidate(&self) -> Option<u64> {
        if !self.has("stale-while-revalidate") {
            return None;
        }
        capture_u64(&STALE_WHILE_REVALIDATE, &self.value)
    }

    /// The `stale-if-error` window (RFC 5861 section 4).
    pub fn stale_if_error(&self) -> Option<StaleIfError> {
        if !self.has("stale-if-error") {
            return None;
        }
        let capture = STALE_IF_ERROR.captures(&self.value)?;
        let raw = capture.get(1)?.as_str();
        if raw.starts_with('*') {
            return Some(StaleIfError::Always);
        }
        raw.parse().ok().map(StaleIfError::Window)
    }
}

fn capture_u64(regex: &Regex, value: &str) -> Option<u64> {
    regex
        .captures(value)?
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
}
