//! The immutable cached response artifact.
//!
//! A [`CachedResponse`] is produced by [`standardize`] and never mutated
//! afterwards; concurrent readers share it through an `Arc` without locking.
//! It knows its own status, headers, body, the cookies it set, the request
//! headers that produced it (needed to recompute its Vary signature on
//! admission) and its birth time.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use http::header::{
    CACHE_CONTROL, ETAG, EXPIRES, IF_MODIFIED_SINCE, IF_UNMODIFIED_SINCE, LAST_MODIFIED,
    SET_COOKIE,
};
use http::{HeaderMap, HeaderValue, StatusCode};

use crate::cache::control::CacheControl;
use crate::cache::key::CookieLookup;
use crate::types::OriginResponse;
use crate::utils::http_date;

type Blake2b256 = Blake2b<U32>;

/// The freshness lifetime added when the origin specified none.
const DEFAULT_MAX_AGE: u64 = 300;

/// An immutable response as stored in the cache.
#[derive(Debug)]
pub struct CachedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    cookies: HashMap<String, String>,
    request_headers: HeaderMap,
    created: DateTime<Utc>,
}

impl CachedResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The headers of the origin request that produced this response.
    pub fn request_headers(&self) -> &HeaderMap {
        &self.request_headers
    }

    /// Seconds since standardisation.
    pub fn age(&self) -> u64 {
        (Utc::now() - self.created).num_seconds().max(0) as u64
    }

    /// The `Age` header value for this response.
    pub fn age_header(&self) -> String {
        self.age().to_string()
    }

    /// The stored `ETag`, if one was computed.
    pub fn etag(&self) -> Option<&str> {
        self.headers.get(ETAG).and_then(|value| value.to_str().ok())
    }

    /// The `Vary` header observed on this response.
    pub fn vary(&self) -> &str {
        self.headers
            .get(http::header::VARY)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    }

    pub fn cache_control(&self) -> CacheControl {
        CacheControl::from_headers(&self.headers)
    }

    /// Whether the response is still usable for the given request headers,
    /// along with the status code to reply with when it is served without a
    /// body.
    ///
    /// When the request demands revalidation (`must-revalidate` or
    /// `proxy-revalidate`), freshness is computed from the response's
    /// `s-maxage`/`max-age`, falling back to the `Expires` header parsed as
    /// RFC 1123, RFC 850, ANSI C or RFC 1123 with a numeric zone, in that
    /// order. Conditional requests compare against `Last-Modified`. Any
    /// parse failure degrades to invalid.
    pub fn validate(&self, request: &HeaderMap) -> (bool, Option<StatusCode>) {
        let request_cc = CacheControl::from_headers(request);
        if request_cc.has("must-revalidate") || request_cc.has("proxy-revalidate") {
            if let Some(max_age) = self.cache_control().effective_max_age() {
                return (self.age() < max_age, Some(StatusCode::NOT_MODIFIED));
            }
            let expires = self
                .headers
                .get(EXPIRES)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            if expires.is_empty() || expires == "0" {
                return (false, None);
            }
            return match http_date::parse_expires(expires) {
                Some(expires) => (Utc::now() < expires, Some(StatusCode::NOT_MODIFIED)),
                None => (false, None),
            };
        }

        let if_modified_since = header_str(request, IF_MODIFIED_SINCE.as_str());
        let if_unmodified_since = header_str(request, IF_UNMODIFIED_SINCE.as_str());
        if if_modified_since.is_some() || if_unmodified_since.is_some() {
            let Some(modified) = header_str(&self.headers, LAST_MODIFIED.as_str())
                .and_then(http_date::parse_rfc1123)
            else {
                return (false, None);
            };
            if let Some(since) = if_modified_since {
                let Some(since) = http_date::parse_rfc1123(since) else {
                    return (false, None);
                };
                // 304 when the resource has not changed after the client's copy.
                return (modified <= since, Some(StatusCode::NOT_MODIFIED));
            }
            let Some(since) = if_unmodified_since.and_then(http_date::parse_rfc1123) else {
                return (false, None);
            };
            // A changed resource fails the precondition; the cache may
            // short-circuit with 412 instead of fetching.
            if since <= modified {
                return (true, Some(StatusCode::PRECONDITION_FAILED));
            }
            return (false, Some(StatusCode::OK));
        }

        (true, Some(StatusCode::NOT_MODIFIED))
    }

    #[cfg(test)]
    pub(crate) fn backdate(&mut self, seconds: i64) {
        self.created -= Duration::seconds(seconds);
    }
}

impl CookieLookup for CachedResponse {
    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.get(name).cloned()
    }
}

/// Normalises a backend response into a [`CachedResponse`].
///
/// In order: non-allow-listed `Set-Cookie` headers are removed from the
/// forwarded response, `Cache-Control` is canonicalised (`no-cache="set-cookie"`
/// honored, `public` added unless `private`, `max-age=300` defaulted),
/// `Last-Modified` and `Expires` are defaulted, and unless `no-store` is set
/// an `ETag` over the body is computed and set on both the stored and the
/// forwarded headers. The forwarded body stays replayable because it is
/// fully buffered.
pub fn standardize(origin: &mut OriginResponse, allowed_cookies: &[String]) -> CachedResponse {
    let cookies = retain_allowed_cookies(&mut origin.headers, allowed_cookies);

    let mut headers = origin.headers.clone();
    let now = Utc::now();

    let mut cache_control = CacheControl::from_headers(&headers);
    if cache_control.has(r#"no-cache="set-cookie""#) {
        headers.remove(SET_COOKIE);
        cache_control = strip_directive(&cache_control, r#"no-cache="set-cookie""#);
    }
    if !cache_control.has("private") && !cache_control.has("public") {
        cache_control = append_directive(&cache_control, "public");
    }
    if !cache_control.has("no-cache") && !cache_control.has("max-age") {
        cache_control = append_directive(&cache_control, &format!("max-age={DEFAULT_MAX_AGE}"));
    }
    if let Ok(value) = HeaderValue::from_str(cache_control.raw()) {
        headers.insert(CACHE_CONTROL, value);
    }

    if !headers.contains_key(LAST_MODIFIED) {
        set_date(&mut headers, LAST_MODIFIED, now);
    }
    if !headers.contains_key(EXPIRES) {
        set_date(&mut headers, EXPIRES, now + Duration::hours(1));
    }

    if !cache_control.has("no-store") {
        let etag = format!("\"{}\"", BASE64.encode(Blake2b256::digest(&origin.body)));
        if let Ok(value) = HeaderValue::from_str(&etag) {
            headers.insert(ETAG, value.clone());
            origin.headers.insert(ETAG, value);
        }
    }

    CachedResponse {
        status: origin.status,
        headers,
        body: origin.body.clone(),
        cookies,
        request_headers: origin.request.headers.clone(),
        created: now,
    }
}

/// Drops `Set-Cookie` headers whose cookie name is not allow-listed and
/// returns the cookies that survived. Malformed values are left in place.
fn retain_allowed_cookies(
    headers: &mut HeaderMap,
    allowed_cookies: &[String],
) -> HashMap<String, String> {
    let mut kept = Vec::new();
    let mut cookies = HashMap::new();
    for value in headers.get_all(SET_COOKIE) {
        match value.to_str().ok().and_then(parse_set_cookie) {
            Some((name, cookie_value)) => {
                if allowed_cookies.iter().any(|allowed| *allowed == name) {
                    cookies.insert(name, cookie_value);
                    kept.push(value.clone());
                }
            }
            None => kept.push(value.clone()),
        }
    }
    headers.remove(SET_COOKIE);
    for value in kept {
        headers.append(SET_COOKIE, value);
    }
    cookies
}

fn parse_set_cookie(value: &str) -> Option<(String, String)> {
    let pair = value.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    Some((name.to_owned(), value.to_owned()))
}

fn strip_directive(cache_control: &CacheControl, directive: &str) -> CacheControl {
    let value = cache_control
        .raw()
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty() && *token != directive)
        .collect::<Vec<_>>()
        .join(", ");
    CacheControl::new(value)
}

fn append_directive(cache_control: &CacheControl, directive: &str) -> CacheControl {
    if cache_control.is_empty() {
        return CacheControl::new(directive);
    }
    CacheControl::new(format!("{}, {}", cache_control.raw(), directive))
}

fn set_date(headers: &mut HeaderMap, name: http::HeaderName, date: DateTime<Utc>) {
    if let Ok(value) = HeaderValue::from_str(&http_date::format_rfc1123(date)) {
        headers.insert(name, value);
    }
}

fn header_str<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Whether a request's `If-None-Match` matches the stored `ETag`.
pub fn matches_etag(request: &HeaderMap, response: &CachedResponse) -> bool {
    match header_str(request, http::header::IF_NONE_MATCH.as_str()) {
        Some(if_none_match) if !if_none_match.is_empty() => {
            response.etag() == Some(if_none_match)
        }
        _ => false,
    }
}
