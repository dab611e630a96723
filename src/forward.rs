//! The backend fetch.
//!
//! [`Forwarder`] is the seam between the cache core and the actual HTTP
//! client: given a rewritten request it eventually yields the origin
//! response, paired with that request so the response-modifier hook can
//! recompute the flight key. [`ReqwestForwarder`] is the production
//! implementation; tests substitute scripted ones.

use std::time::Duration;

use futures::future::BoxFuture;
use http::header::HOST;
use http::HeaderValue;
use thiserror::Error;
use url::Url;

use crate::config::Config;
use crate::types::{OriginResponse, ProxyRequest, X_FORWARDED_PROTO};

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("backend request timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

pub trait Forwarder: Send + Sync + 'static {
    /// Fetches the request from the backend and returns the buffered
    /// response together with the request that produced it.
    fn forward(&self, request: ProxyRequest)
        -> BoxFuture<'static, Result<OriginResponse, ForwardError>>;
}

/// Rewrites a request to target the configured backend.
///
/// The original host moves into the `Host` header, `X-Forwarded-Proto` is
/// set from the original scheme unless a downstream proxy already set it,
/// and the URL's host and scheme are swapped to the backend's. This happens
/// before any cache key is computed so that keys match what the backend is
/// asked for.
pub fn switch_backend(request: &mut ProxyRequest, backend: &Url) {
    request.host = match request.url.port() {
        Some(port) => format!("{}:{port}", request.url.host_str().unwrap_or_default()),
        None => request.url.host_str().unwrap_or_default().to_owned(),
    };
    if request.header(X_FORWARDED_PROTO.as_str()).is_none() {
        let scheme = request.url.scheme().to_owned();
        request.set_header(X_FORWARDED_PROTO, &scheme);
    }
    let _ = request.url.set_scheme(backend.scheme());
    let _ = request.url.set_host(backend.host_str());
    let _ = request.url.set_port(backend.port());
}

/// The production [`Forwarder`], backed by a shared [`reqwest::Client`].
///
/// Redirects are not followed (the client sees them) and no automatic
/// decompression is enabled, so `Accept-Encoding` representations reach the
/// cache untouched.
#[derive(Clone, Debug)]
pub struct ReqwestForwarder {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl ReqwestForwarder {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;
        Ok(ReqwestForwarder {
            client,
            request_timeout: config.request_timeout,
        })
    }
}

impl Forwarder for ReqwestForwarder {
    fn forward(
        &self,
        request: ProxyRequest,
    ) -> BoxFuture<'static, Result<OriginResponse, ForwardError>> {
        let client = self.client.clone();
        let request_timeout = self.request_timeout;
        Box::pin(async move {
            let mut headers = request.headers.clone();
            if let Ok(host) = HeaderValue::from_str(&request.host) {
                headers.insert(HOST, host);
            }

            let result = client
                .request(request.method.clone(), request.url.clone())
                .headers(headers)
                .body(request.body.clone())
                .send()
                .await;
            let response = match result {
                Ok(response) => response,
                Err(error) if error.is_timeout() => {
                    return Err(ForwardError::Timeout(request_timeout));
                }
                Err(error) => return Err(ForwardError::Transport(error)),
            };

            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;

            Ok(OriginResponse {
                status,
                headers,
                body,
                request,
            })
        })
    }
}
