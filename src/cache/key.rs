//! Cache key construction.
//!
//! The primary key is a fingerprint over method, URL and `Accept-Encoding`,
//! extended with any allow-listed request cookies. The secondary key is the
//! Vary signature: a string derived from the request headers named by a
//! response's `Vary` header. ` :: ` is the field separator, so `::` inside a
//! cookie name or value is doubled to keep the key unambiguous.

use http::header::{ACCEPT_ENCODING, COOKIE};
use http::{HeaderMap, Method};
use url::Url;

/// Looks up cookies by name.
///
/// Requests resolve against their `Cookie` header, cached responses against
/// the cookies retained from `Set-Cookie` at standardisation.
pub trait CookieLookup {
    fn cookie(&self, name: &str) -> Option<String>;
}

/// [`CookieLookup`] over a request header map.
pub struct HeaderCookies<'a>(pub &'a HeaderMap);

impl CookieLookup for HeaderCookies<'_> {
    fn cookie(&self, name: &str) -> Option<String> {
        request_cookies(self.0)
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Parses the request `Cookie` headers into name/value pairs, preserving
/// header order.
pub fn request_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    let mut cookies = Vec::new();
    for value in headers.get_all(COOKIE) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            match pair.split_once('=') {
                Some((name, value)) => cookies.push((name.to_owned(), value.to_owned())),
                None => cookies.push((pair.to_owned(), String::new())),
            }
        }
    }
    cookies
}

fn escape(value: &str) -> String {
    value.replace("::", "::::")
}

/// Builds the primary-key fingerprint for a request.
///
/// Two requests agreeing on method, URL, `Accept-Encoding` and allow-listed
/// cookies produce the same fingerprint regardless of any other headers.
pub fn fingerprint(
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
    allowed_cookies: &[String],
) -> String {
    let accept_encoding = headers
        .get(ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let mut key = format!("{method} :: {url} :: {accept_encoding}");
    for (name, value) in request_cookies(headers) {
        if allowed_cookies.iter().any(|allowed| *allowed == name) {
            key.push_str(&format!(" :: {} :: {}", escape(&name), escape(&value)));
        }
    }
    key
}

/// Computes the Vary signature of a request against a response's `Vary`
/// header value.
///
/// For every listed header except `cookie` the request's header value is
/// appended. For `cookie`, the allow-listed cookie names are appended in
/// configured order with their values, or with a sentinel empty value when
/// the cookie is absent. An empty `Vary` yields the empty signature.
pub fn vary_signature(
    vary: &str,
    headers: &HeaderMap,
    cookies: &dyn CookieLookup,
    allowed_cookies: &[String],
) -> String {
    if vary.is_empty() {
        return String::new();
    }
    let mut signature = String::new();
    for name in vary.split(',') {
        let name = name.trim();
        if !name.eq_ignore_ascii_case("cookie") {
            signature.push_str("::");
            if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
                signature.push_str(value);
            }
        } else {
            for cookie_name in allowed_cookies {
                match cookies.cookie(cookie_name) {
                    Some(value) => signature.push_str(&format!(
                        " :: {} :: {}",
                        escape(cookie_name),
                        escape(&value)
                    )),
                    None => signature.push_str(&format!(" :: {} :: ", escape(cookie_name))),
                }
            }
        }
    }
    signature
}
