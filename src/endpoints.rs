//! Web endpoints: the healthcheck and the catch-all proxy route.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::StatusCode;
use url::Url;

use crate::service::ProxyService;
use crate::types::{Outgoing, ProxyRequest, X_FORWARDED_PROTO};

/// The largest request body the proxy will buffer.
const MAX_BODY: usize = 100 * 1024 * 1024;

pub async fn healthcheck() -> &'static str {
    metric!(counter("healthcheck") += 1);
    "ok"
}

pub fn create_app(service: ProxyService) -> Router {
    Router::new()
        // every method and path that is not a honey endpoint is proxied
        .fallback(proxy)
        .with_state(service)
        .route("/healthcheck", get(healthcheck))
}

/// Feeds every request that is not a honey endpoint into the mediator.
async fn proxy(State(service): State<ProxyService>, request: Request) -> Response {
    let start = std::time::Instant::now();
    let (parts, body) = request.into_parts();
    let Ok(body) = axum::body::to_bytes(body, MAX_BODY).await else {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    };
    let Some(request) = build_request(&parts, body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let outgoing = service.handle(request).await;
    metric!(time("requests.duration") = start.elapsed());
    into_response(outgoing)
}

/// Reconstructs the client's full request URL from the incoming parts.
///
/// TLS termination happens upstream, so the original scheme is whatever a
/// downstream proxy recorded in `X-Forwarded-Proto`, defaulting to plain
/// HTTP.
fn build_request(parts: &http::request::Parts, body: Bytes) -> Option<ProxyRequest> {
    let host = parts
        .headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| parts.uri.authority().map(|authority| authority.as_str()))?
        .to_owned();
    let scheme = parts
        .headers
        .get(X_FORWARDED_PROTO)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let url: Url = format!("{scheme}://{host}{path_and_query}").parse().ok()?;
    Some(ProxyRequest {
        method: parts.method.clone(),
        url,
        host,
        headers: parts.headers.clone(),
        body,
    })
}

fn into_response(outgoing: Outgoing) -> Response {
    let mut headers = outgoing.headers;
    // The body was re-buffered; let the server frame it.
    headers.remove(CONTENT_LENGTH);
    headers.remove(TRANSFER_ENCODING);

    let mut response = Response::new(Body::from(outgoing.body));
    *response.status_mut() = outgoing.status;
    *response.headers_mut() = headers;
    response
}
