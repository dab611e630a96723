//! The mediator: ties cacheability, store, validation and the coalescer
//! together for every incoming request.
//!
//! Flow per request: rewrite to the backend, bypass ineligible requests
//! (`NO-CACHE`), serve usable cache hits (`HIT`), serve within the
//! stale-while-revalidate window while refreshing in the background, answer
//! `only-if-cached` misses with 504, and otherwise coalesce: the first
//! request for a key leads the origin fetch, everyone else waits for the
//! fan-out.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::Utc;
use futures::future::BoxFuture;
use http::header::WARNING;
use http::StatusCode;
use tokio::sync::mpsc::UnboundedSender;

use crate::cache::response::matches_etag;
use crate::cache::{CacheControl, CachedResponse, Cacher, DefaultCacher, StaleIfError};
use crate::coalesce::{Dispatch, FlightRegistry, Handler, LeadOrJoin};
use crate::config::Config;
use crate::forward::{self, Forwarder, ReqwestForwarder};
use crate::types::{OriginResponse, Outgoing, ProxyRequest, X_HONEY_CACHE, X_HONEY_STALE};
use crate::utils::http_date;

/// The proxy service. Cheap to clone; all state lives behind an `Arc`.
#[derive(Clone)]
pub struct ProxyService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    backend: url::Url,
    cacher: Arc<dyn Cacher>,
    forwarder: Arc<dyn Forwarder>,
    flights: FlightRegistry,
    coalesce_timeout: Duration,
    /// Fired after a background fan-out completes; used by tests to
    /// synchronise on cache admission.
    write_done: Option<UnboundedSender<()>>,
}

impl ProxyService {
    pub fn create(config: &Config) -> Result<Self> {
        let backend = config
            .backend
            .clone()
            .context("no backend configured; set `backend` in the config file")?;
        let cacher = Arc::new(DefaultCacher::new(&config.cache)?);
        let forwarder = Arc::new(ReqwestForwarder::new(config)?);
        Ok(Self::with_parts(
            backend,
            cacher,
            forwarder,
            config.coalesce_timeout,
        ))
    }

    /// Assembles a service from parts. The seam tests use to substitute a
    /// scripted [`Forwarder`].
    pub fn with_parts(
        backend: url::Url,
        cacher: Arc<dyn Cacher>,
        forwarder: Arc<dyn Forwarder>,
        coalesce_timeout: Duration,
    ) -> Self {
        ProxyService {
            inner: Arc::new(ServiceInner {
                backend,
                cacher,
                forwarder,
                flights: FlightRegistry::new(),
                coalesce_timeout,
                write_done: None,
            }),
        }
    }

    /// Registers a channel fired after every background fan-out.
    pub fn with_write_done(mut self, sender: UnboundedSender<()>) -> Self {
        let inner = Arc::get_mut(&mut self.inner)
            .expect("write_done must be registered before the service is shared");
        inner.write_done = Some(sender);
        self
    }

    /// Handles one client request to completion.
    pub fn handle(&self, request: ProxyRequest) -> BoxFuture<'static, Outgoing> {
        let service = self.clone();
        Box::pin(async move { service.handle_request(request).await })
    }

    async fn handle_request(&self, mut request: ProxyRequest) -> Outgoing {
        metric!(counter("requests.total") += 1);
        forward::switch_backend(&mut request, &self.inner.backend);

        if !self.inner.cacher.can_cache(&request) {
            metric!(counter("requests.no_cache") += 1);
            return self.forward_uncached(request).await;
        }

        let hash = self.inner.cacher.hash(&request);
        let request_cc = CacheControl::from_headers(&request.headers);
        let pragma_no_cache = request.header("pragma") == Some("no-cache");

        if !request_cc.has("no-cache") && !pragma_no_cache {
            if let Some(response) = self.inner.cacher.load(&hash, &request) {
                let revalidate = request_cc.has("must-revalidate")
                    || request_cc.has("proxy-revalidate")
                    || request_cc.has("max-age");
                let (valid, status) = if revalidate {
                    response.validate(&request.headers)
                } else {
                    // A hit with no revalidation intent is assumed fresh.
                    (true, Some(StatusCode::NOT_MODIFIED))
                };
                if valid {
                    metric!(counter("cache.hit") += 1);
                    return serve_hit(&response, &request, status);
                }
                if revalidate {
                    // RFC 5861: within the stale-while-revalidate window the
                    // stale body is served now and a detached refresh brings
                    // the cache up to date. The request's directives win;
                    // otherwise the response's own grace window applies.
                    let (window, max_age) = match request_cc.stale_while_revalidate() {
                        Some(window) => (Some(window), request_cc.effective_max_age()),
                        None => {
                            let response_cc = response.cache_control();
                            (
                                response_cc.stale_while_revalidate(),
                                response_cc.effective_max_age(),
                            )
                        }
                    };
                    if let Some(window) = window {
                        if response.age() < max_age.unwrap_or(0) + window {
                            metric!(counter("cache.stale_served") += 1);
                            self.spawn_refresh(request.clone());
                            return serve_hit(&response, &request, status);
                        }
                    }
                }
            }
        }

        // RFC 7234 section 5.2.1.7: nothing cached, and the client only
        // wants it if it is cached.
        if request_cc.has("only-if-cached") {
            return Outgoing::empty(StatusCode::GATEWAY_TIMEOUT);
        }

        self.coalesce_and_fetch(hash, request).await
    }

    /// Forwards a request the policy rejected, marking the response.
    async fn forward_uncached(&self, request: ProxyRequest) -> Outgoing {
        let mut outgoing = match self.inner.forwarder.forward(request).await {
            Ok(origin) => Outgoing::new(origin.status, origin.headers, origin.body),
            Err(error) => {
                tracing::warn!(
                    error = &error as &dyn std::error::Error,
                    "backend fetch failed"
                );
                Outgoing::empty(StatusCode::BAD_GATEWAY)
            }
        };
        outgoing.set_header(X_HONEY_CACHE, "NO-CACHE");
        outgoing
    }

    /// Registers with the flight for `hash`, leading the fetch when none is
    /// in progress and waiting on the fan-out otherwise.
    async fn coalesce_and_fetch(&self, hash: String, request: ProxyRequest) -> Outgoing {
        let lead_or_join = self.inner.flights.lead_or_join(
            &hash,
            &request,
            Arc::clone(&self.inner.cacher),
            self.handler(),
        );
        match lead_or_join {
            LeadOrJoin::Join(rx) => {
                metric!(counter("coalesce.waiter") += 1);
                match tokio::time::timeout(self.inner.coalesce_timeout, rx).await {
                    Ok(Ok(Dispatch::Response(outgoing))) => outgoing,
                    Ok(Ok(Dispatch::Released)) => Outgoing::empty(StatusCode::OK),
                    // The leader vanished without writing.
                    Ok(Err(_)) => Outgoing::empty(StatusCode::BAD_GATEWAY),
                    Err(_) => {
                        metric!(counter("coalesce.watchdog_timeout") += 1);
                        tracing::warn!(hash = %hash, "flight watchdog expired");
                        self.inner.flights.remove(&hash);
                        Outgoing::empty(StatusCode::BAD_GATEWAY)
                    }
                }
            }
            LeadOrJoin::Lead(flight) => {
                metric!(counter("coalesce.leader") += 1);
                metric!(counter("cache.miss") += 1);
                // Detached so a leader whose client disconnects still
                // completes the fetch and releases its waiters.
                let service = self.clone();
                let fetch = tokio::spawn(async move {
                    match service.inner.forwarder.forward(request).await {
                        Ok(origin) => service.on_origin_response(origin).await,
                        Err(error) => {
                            tracing::warn!(
                                error = &error as &dyn std::error::Error,
                                "backend fetch failed; releasing flight"
                            );
                            flight.fail(StatusCode::BAD_GATEWAY);
                            service.inner.flights.remove(&hash);
                            Outgoing::empty(StatusCode::BAD_GATEWAY)
                        }
                    }
                });
                match fetch.await {
                    Ok(outgoing) => outgoing,
                    Err(_) => Outgoing::empty(StatusCode::BAD_GATEWAY),
                }
            }
        }
    }

    /// The response-modifier hook, invoked with the raw origin response of a
    /// leader fetch.
    ///
    /// Standardises the response, admits it to the store unless `no-store`
    /// or a server error, arranges the stale-if-error fallback, fans out to
    /// the flight in the background and finally adjusts the response the
    /// leader gets (downgrading to 304 or the validation status where the
    /// request allows a bodiless reply).
    pub async fn on_origin_response(&self, mut origin: OriginResponse) -> Outgoing {
        let hash = self.inner.cacher.hash(&origin.request);
        let Some(flight) = self.inner.flights.get(&hash) else {
            // A response with no flight is a protocol violation; count it
            // and let the raw response through to the leader.
            metric!(counter("coalesce.missing_group") += 1);
            tracing::error!(hash = %hash, "no flight registered for backend response");
            return Outgoing::new(origin.status, origin.headers, origin.body);
        };

        let response = self.inner.cacher.standardize(&mut origin);
        let cache_control = response.cache_control();
        if !cache_control.has("no-store") && origin.status.as_u16() < 500 {
            metric!(counter("cache.store") += 1);
            self.inner.cacher.cache(&hash, Arc::clone(&response));
        }

        let stale = if origin.status.as_u16() >= 500 {
            self.stale_fallback(&origin, &cache_control)
        } else {
            None
        };
        let broadcast = stale.clone().unwrap_or_else(|| Arc::clone(&response));

        {
            let service = self.clone();
            let flight = Arc::clone(&flight);
            let broadcast = Arc::clone(&broadcast);
            let hash = hash.clone();
            tokio::spawn(async move {
                flight.write(broadcast).await;
                service.inner.flights.remove(&hash);
                if let Some(done) = &service.inner.write_done {
                    let _ = done.send(());
                }
            });
        }

        let mut outgoing = match &stale {
            Some(prior) => {
                metric!(counter("cache.stale_served") += 1);
                let mut outgoing =
                    Outgoing::new(prior.status(), prior.headers().clone(), prior.body().clone());
                outgoing.set_header(
                    WARNING,
                    &format!(
                        r#"110 Honey "Response is Stale" "{}""#,
                        http_date::format_rfc1123(Utc::now())
                    ),
                );
                outgoing.set_header(X_HONEY_CACHE, "STALE");
                outgoing.set_header(
                    X_HONEY_STALE,
                    &format!("Backend gave HTTP Status {}", origin.status.as_u16()),
                );
                outgoing
            }
            None => {
                let mut outgoing =
                    Outgoing::new(origin.status, origin.headers.clone(), origin.body.clone());
                outgoing.set_header(X_HONEY_CACHE, "MISS");
                outgoing
            }
        };

        if matches_etag(&origin.request.headers, &broadcast) {
            outgoing.status = StatusCode::NOT_MODIFIED;
            outgoing.body = Bytes::new();
        } else if wants_validation(&origin.request) {
            if let (true, Some(status)) = broadcast.validate(&origin.request.headers) {
                outgoing.status = status;
                outgoing.body = Bytes::new();
            }
        }
        outgoing
    }

    /// RFC 5861 stale-if-error: on a server error, a prior response for the
    /// same key may be served instead, indefinitely for `*` or while
    /// `age - max-age` is within the window.
    fn stale_fallback(
        &self,
        origin: &OriginResponse,
        cache_control: &CacheControl,
    ) -> Option<Arc<CachedResponse>> {
        let stale_if_error = cache_control.stale_if_error()?;
        let hash = self.inner.cacher.hash(&origin.request);
        let prior = self.inner.cacher.load(&hash, &origin.request)?;
        let within_window = match stale_if_error {
            StaleIfError::Always => true,
            StaleIfError::Window(window) => match cache_control.effective_max_age() {
                Some(max_age) => (prior.age() as i64 - max_age as i64) < window as i64,
                None => false,
            },
        };
        within_window.then_some(prior)
    }

    /// The callback the coalescer uses to serve waiters in a foreign Vary
    /// bucket: re-enter the mediator with `X-Honey-Vary` steering the
    /// request into its own flight.
    fn handler(&self) -> Handler {
        let service = self.clone();
        Arc::new(move |request| service.handle(request))
    }

    /// Kicks off a detached refresh of a stale entry. The originator's
    /// response is not touched; the refreshed response lands in the cache.
    fn spawn_refresh(&self, request: ProxyRequest) {
        let service = self.clone();
        tokio::spawn(async move {
            let hash = service.inner.cacher.hash(&request);
            let _ = service.coalesce_and_fetch(hash, request).await;
        });
    }
}

/// Serves a cache hit, downgrading to the validation status when the
/// request's `If-None-Match` matches the stored `ETag`.
fn serve_hit(
    response: &Arc<CachedResponse>,
    request: &ProxyRequest,
    status: Option<StatusCode>,
) -> Outgoing {
    let mut outgoing = Outgoing::new(
        response.status(),
        response.headers().clone(),
        response.body().clone(),
    );
    outgoing.set_header(X_HONEY_CACHE, "HIT");
    if matches_etag(&request.headers, response) {
        outgoing.status = status.unwrap_or(StatusCode::NOT_MODIFIED);
        outgoing.body = Bytes::new();
    }
    outgoing
}

fn wants_validation(request: &ProxyRequest) -> bool {
    let cache_control = CacheControl::from_headers(&request.headers);
    cache_control.has("must-revalidate")
        || cache_control.has("proxy-revalidate")
        || request.header("if-modified-since").is_some()
        || request.header("if-unmodified-since").is_some()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use http::header::{CACHE_CONTROL, IF_NONE_MATCH};
    use http::HeaderMap;
    use tokio::sync::mpsc;

    use crate::forward::ForwardError;

    use super::*;

    /// A scripted [`Forwarder`]: pops the next (status, headers, body) for
    /// every fetch and counts invocations.
    struct MockForwarder {
        calls: AtomicUsize,
        script: Mutex<Vec<(StatusCode, Vec<(String, String)>, String)>>,
    }

    impl MockForwarder {
        fn new(script: Vec<(StatusCode, Vec<(String, String)>, String)>) -> Arc<Self> {
            Arc::new(MockForwarder {
                calls: AtomicUsize::new(0),
                script: Mutex::new(script),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Forwarder for MockForwarder {
        fn forward(
            &self,
            request: ProxyRequest,
        ) -> BoxFuture<'static, Result<OriginResponse, ForwardError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let (status, headers, body) = if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            };
            Box::pin(async move {
                let mut map = HeaderMap::new();
                for (name, value) in &headers {
                    map.append(
                        http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                        value.parse().unwrap(),
                    );
                }
                Ok(OriginResponse {
                    status,
                    headers: map,
                    body: Bytes::from(body),
                    request,
                })
            })
        }
    }

    fn service(forwarder: Arc<MockForwarder>) -> (ProxyService, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = ProxyService::with_parts(
            "http://origin.internal".parse().unwrap(),
            Arc::new(DefaultCacher::default()),
            forwarder,
            Duration::from_secs(5),
        )
        .with_write_done(tx);
        (service, rx)
    }

    fn request(url: &str) -> ProxyRequest {
        ProxyRequest::get(url.parse().unwrap())
    }

    fn ok_script(body: &str) -> Vec<(StatusCode, Vec<(String, String)>, String)> {
        vec![(StatusCode::OK, vec![], body.to_owned())]
    }

    #[tokio::test]
    async fn cold_miss_then_hit() {
        let forwarder = MockForwarder::new(ok_script("hello"));
        let (service, mut done) = service(Arc::clone(&forwarder));

        let first = service.handle(request("https://site/")).await;
        assert_eq!(first.status, StatusCode::OK);
        assert_eq!(first.body, Bytes::from_static(b"hello"));
        assert_eq!(first.header(X_HONEY_CACHE.as_str()), Some("MISS"));
        assert!(first.header("etag").is_some());

        done.recv().await.unwrap();

        let second = service.handle(request("https://site/")).await;
        assert_eq!(second.status, StatusCode::OK);
        assert_eq!(second.body, Bytes::from_static(b"hello"));
        assert_eq!(second.header(X_HONEY_CACHE.as_str()), Some("HIT"));
        assert_eq!(forwarder.calls(), 1);
    }

    #[tokio::test]
    async fn post_requests_bypass_the_cache() {
        let forwarder = MockForwarder::new(ok_script("created"));
        let (service, _done) = service(Arc::clone(&forwarder));

        let mut req = request("https://site/submit");
        req.method = http::Method::POST;
        let response = service.handle(req).await;
        assert_eq!(response.header(X_HONEY_CACHE.as_str()), Some("NO-CACHE"));
        assert_eq!(forwarder.calls(), 1);
    }

    #[tokio::test]
    async fn only_if_cached_miss_is_504_without_fetch() {
        let forwarder = MockForwarder::new(ok_script("hello"));
        let (service, _done) = service(Arc::clone(&forwarder));

        let mut req = request("https://site/");
        req.headers.insert(
            CACHE_CONTROL,
            "no-cache, only-if-cached".parse().unwrap(),
        );
        let response = service.handle(req).await;
        assert_eq!(response.status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(forwarder.calls(), 0);
    }

    #[tokio::test]
    async fn must_revalidate_is_served_fresh_within_max_age() {
        let forwarder = MockForwarder::new(vec![(
            StatusCode::OK,
            vec![("cache-control".to_owned(), "max-age=100".to_owned())],
            "fresh".to_owned(),
        )]);
        let (service, mut done) = service(Arc::clone(&forwarder));

        service.handle(request("https://site/")).await;
        done.recv().await.unwrap();

        let mut req = request("https://site/");
        req.headers
            .insert(CACHE_CONTROL, "must-revalidate".parse().unwrap());
        let response = service.handle(req).await;
        assert_eq!(response.header(X_HONEY_CACHE.as_str()), Some("HIT"));
        assert_eq!(response.body, Bytes::from_static(b"fresh"));
        assert_eq!(forwarder.calls(), 1);
    }

    #[tokio::test]
    async fn if_none_match_hit_yields_304_with_empty_body() {
        let forwarder = MockForwarder::new(ok_script("hello"));
        let (service, mut done) = service(Arc::clone(&forwarder));

        let first = service.handle(request("https://site/")).await;
        let etag = first.header("etag").unwrap().to_owned();
        done.recv().await.unwrap();

        let mut req = request("https://site/");
        req.headers
            .insert(IF_NONE_MATCH, etag.parse().unwrap());
        let response = service.handle(req).await;
        assert_eq!(response.status, StatusCode::NOT_MODIFIED);
        assert!(response.body.is_empty());
        assert_eq!(response.header(X_HONEY_CACHE.as_str()), Some("HIT"));
    }

    #[tokio::test]
    async fn stale_while_revalidate_serves_stale_and_refreshes() {
        let forwarder = MockForwarder::new(ok_script("new"));
        let (service, mut done) = service(Arc::clone(&forwarder));

        // Plant a response that is 80s old: past its max-age of 60 but
        // still inside a stale-while-revalidate window of 30.
        let mut rewritten = request("https://site/");
        forward::switch_backend(&mut rewritten, &service.inner.backend);
        let hash = service.inner.cacher.hash(&rewritten);
        let mut origin = OriginResponse {
            status: StatusCode::OK,
            headers: {
                let mut map = HeaderMap::new();
                map.insert(CACHE_CONTROL, "max-age=60".parse().unwrap());
                map
            },
            body: Bytes::from_static(b"old"),
            request: rewritten,
        };
        let mut aged = crate::cache::response::standardize(&mut origin, &[]);
        aged.backdate(80);
        service.inner.cacher.cache(&hash, Arc::new(aged));

        let mut req = request("https://site/");
        req.headers.insert(
            CACHE_CONTROL,
            "must-revalidate, max-age=60, stale-while-revalidate=30"
                .parse()
                .unwrap(),
        );
        let response = service.handle(req).await;
        assert_eq!(response.header(X_HONEY_CACHE.as_str()), Some("HIT"));
        assert_eq!(response.body, Bytes::from_static(b"old"));

        // The detached refresh fetches in the background and updates the
        // cache.
        done.recv().await.unwrap();
        assert_eq!(forwarder.calls(), 1);

        let after = service.handle(request("https://site/")).await;
        assert_eq!(after.body, Bytes::from_static(b"new"));
        assert_eq!(after.header(X_HONEY_CACHE.as_str()), Some("HIT"));
    }

    #[tokio::test]
    async fn response_side_stale_while_revalidate_also_applies() {
        let forwarder = MockForwarder::new(ok_script("new"));
        let (service, mut done) = service(Arc::clone(&forwarder));

        // The grace window lives on the cached response this time.
        let mut rewritten = request("https://site/");
        forward::switch_backend(&mut rewritten, &service.inner.backend);
        let hash = service.inner.cacher.hash(&rewritten);
        let mut origin = OriginResponse {
            status: StatusCode::OK,
            headers: {
                let mut map = HeaderMap::new();
                map.insert(
                    CACHE_CONTROL,
                    "max-age=60, stale-while-revalidate=30".parse().unwrap(),
                );
                map
            },
            body: Bytes::from_static(b"old"),
            request: rewritten,
        };
        let mut aged = crate::cache::response::standardize(&mut origin, &[]);
        aged.backdate(80);
        service.inner.cacher.cache(&hash, Arc::new(aged));

        let mut req = request("https://site/");
        req.headers
            .insert(CACHE_CONTROL, "must-revalidate".parse().unwrap());
        let response = service.handle(req).await;
        assert_eq!(response.header(X_HONEY_CACHE.as_str()), Some("HIT"));
        assert_eq!(response.body, Bytes::from_static(b"old"));

        done.recv().await.unwrap();
        assert_eq!(forwarder.calls(), 1);
    }

    #[tokio::test]
    async fn stale_if_error_serves_prior_response() {
        let forwarder = MockForwarder::new(vec![
            (StatusCode::OK, vec![], "good".to_owned()),
            (
                StatusCode::BAD_GATEWAY,
                vec![("cache-control".to_owned(), "stale-if-error=*".to_owned())],
                "bad".to_owned(),
            ),
        ]);
        let (service, mut done) = service(Arc::clone(&forwarder));

        service.handle(request("https://site/")).await;
        done.recv().await.unwrap();

        let mut req = request("https://site/");
        req.headers
            .insert(CACHE_CONTROL, "no-cache".parse().unwrap());
        let response = service.handle(req).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, Bytes::from_static(b"good"));
        assert_eq!(response.header(X_HONEY_CACHE.as_str()), Some("STALE"));
        assert_eq!(
            response.header(X_HONEY_STALE.as_str()),
            Some("Backend gave HTTP Status 502")
        );
        assert!(response
            .header("warning")
            .unwrap()
            .starts_with(r#"110 Honey "Response is Stale""#));
    }

    #[tokio::test]
    async fn server_errors_are_not_admitted() {
        let forwarder = MockForwarder::new(vec![
            (StatusCode::INTERNAL_SERVER_ERROR, vec![], "oops".to_owned()),
            (StatusCode::OK, vec![], "recovered".to_owned()),
        ]);
        let (service, mut done) = service(Arc::clone(&forwarder));

        let first = service.handle(request("https://site/")).await;
        assert_eq!(first.status, StatusCode::INTERNAL_SERVER_ERROR);
        done.recv().await.unwrap();

        let second = service.handle(request("https://site/")).await;
        assert_eq!(second.body, Bytes::from_static(b"recovered"));
        assert_eq!(forwarder.calls(), 2);
    }

    #[tokio::test]
    async fn no_store_is_dispatched_but_not_admitted() {
        let forwarder = MockForwarder::new(vec![(
            StatusCode::OK,
            vec![("cache-control".to_owned(), "no-store".to_owned())],
            "volatile".to_owned(),
        )]);
        let (service, mut done) = service(Arc::clone(&forwarder));

        let first = service.handle(request("https://site/")).await;
        assert_eq!(first.body, Bytes::from_static(b"volatile"));
        done.recv().await.unwrap();

        // Not retrievable: the second request fetches again.
        service.handle(request("https://site/")).await;
        done.recv().await.unwrap();
        assert_eq!(forwarder.calls(), 2);
    }
}
