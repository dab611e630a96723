//! Honey.
//!
//! Honey is a request-coalescing HTTP reverse-proxy cache. It decides
//! cacheability per request, serves responses from an in-memory store with
//! RFC 7234/5861 freshness, validation and stale-serving semantics, and on a
//! miss guarantees that at most one backend request flies per cache key,
//! fanning the response out to all waiting clients, including clients that
//! need a different representation via the `Vary` header.

#![warn(clippy::all)]

#[macro_use]
pub mod metrics;

pub mod cache;
pub mod cli;
pub mod coalesce;
pub mod config;
pub mod endpoints;
pub mod forward;
pub mod logging;
pub mod server;
pub mod service;
pub mod types;
pub mod utils;
