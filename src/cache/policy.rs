//! The cacheability policy.
//!
//! Decides whether a request may be served through the cache at all. The
//! policy is pure: it inspects the request and the configured skip rules and
//! has no side effects. The default skip pattern keeps Wordpress feeds and
//! admin pages out of the cache.

use std::collections::HashSet;

use anyhow::{Context, Result};
use http::header::AUTHORIZATION;
use http::{HeaderMap, Method};
use regex::Regex;
use url::Url;

/// The default path pattern excluded from cacheing.
pub const DEFAULT_SKIP_PATTERN: &str = "/(feed|wp-admin|wp-login)";

/// Request eligibility rules, configured once at startup.
#[derive(Debug)]
pub struct Policy {
    skip_urls: HashSet<String>,
    skip_regex: Vec<Regex>,
}

impl Default for Policy {
    fn default() -> Self {
        Policy::new(&[], &[DEFAULT_SKIP_PATTERN.to_owned()]).expect("default pattern compiles")
    }
}

impl Policy {
    pub fn new(skip_urls: &[String], skip_patterns: &[String]) -> Result<Self> {
        let skip_regex = skip_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).with_context(|| format!("invalid skip pattern: {pattern}"))
            })
            .collect::<Result<_>>()?;
        Ok(Policy {
            skip_urls: skip_urls.iter().cloned().collect(),
            skip_regex,
        })
    }

    /// Whether a request is eligible for cache handling.
    ///
    /// Only GET and HEAD requests to non-static, non-authorized,
    /// non-preview URLs outside the skip rules qualify.
    pub fn can_cache(&self, method: &Method, url: &Url, headers: &HeaderMap) -> bool {
        if *method != Method::GET && *method != Method::HEAD {
            return false;
        }
        if is_static_file(url.path()) {
            return false;
        }
        if headers.contains_key(AUTHORIZATION) {
            return false;
        }
        if url
            .query_pairs()
            .any(|(name, value)| name == "preview" && value == "true")
        {
            return false;
        }
        if self.skip_urls.contains(url.path()) {
            return false;
        }
        !self.skip_regex.iter().any(|regex| regex.is_match(url.path()))
    }
}

/// Whether a path carries a file extension assumed to be a static asset.
pub fn is_static_file(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(index) => STATIC_EXTENSIONS.contains(&name[index..].to_ascii_lowercase().as_str()),
        None => false,
    }
}

static STATIC_EXTENSIONS: &[&str] = &[
    ".7z", ".avi", ".bmp", ".bz2", ".css", ".csv", ".doc", ".docx", ".eot", ".flac", ".flv",
    ".gif", ".gz", ".ico", ".jpeg", ".jpg", ".js", ".less", ".mka", ".mkv", ".mov", ".mp3",
    ".mp4", ".mpeg", ".mpg", ".odt", ".otf", ".ogg", ".ogm", ".opus", ".pdf", ".png", ".ppt",
    ".pptx", ".rar", ".rtf", ".svg", ".svgz", ".swf", ".tar", ".tbz", ".tgz", ".ttf", ".txt",
    ".txz", ".wav", ".webm", ".webp", ".woff", ".woff2", ".xls", ".xlsx", ".xml", ".xz", ".zip",
];
