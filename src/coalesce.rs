//! The single-flight coalescer.
//!
//! When the cache has no usable entry for a key, the first request becomes
//! the leader of a flight and performs the only origin fetch; every
//! concurrent request for the same key joins the flight as a waiter and is
//! written exactly once when the leader's response arrives. Waiters whose
//! Vary signature differs from the leader's are re-dispatched through the
//! handler with `X-Honey-Vary` set, which steers them into a primary key
//! (and thus a flight) of their own.
//!
//! A flight moves through `Collecting → Writing → Done`, monotonically. The
//! registry holds the only strong reference to a flight between creation
//! and completion; waiters borrow it transiently while blocked.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{join_all, BoxFuture};
use http::header::AGE;
use http::StatusCode;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{oneshot, watch};

use crate::cache::key::{self, HeaderCookies};
use crate::cache::response::matches_etag;
use crate::cache::{CachedResponse, Cacher};
use crate::types::{Outgoing, ProxyRequest, X_HONEY_CACHE, X_HONEY_VARY};

/// Serves a waiter that needs a different representation than the leader's
/// response. In production this is the mediator itself.
pub type Handler = Arc<dyn Fn(ProxyRequest) -> BoxFuture<'static, Outgoing> + Send + Sync>;

#[derive(Debug, Error)]
pub enum CoalesceError {
    /// [`Flight::cacheable`] was asked before the flight was written.
    #[error("no response yet")]
    NotReady,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FlightState {
    Collecting,
    Writing,
    Done,
}

/// What a waiter receives when its flight completes.
#[derive(Debug)]
pub enum Dispatch {
    Response(Outgoing),
    /// The response was not eligible for fan-out (`private`, `no-store` or
    /// `Vary: *`); the waiter is released without a body.
    Released,
}

struct Waiter {
    request: ProxyRequest,
    tx: oneshot::Sender<Dispatch>,
}

struct FlightInner {
    state: FlightState,
    waiters: Vec<Waiter>,
    response: Option<Arc<CachedResponse>>,
    cacheable: bool,
    failure: Option<StatusCode>,
}

/// One in-flight origin fetch and the waiters coalesced onto it.
pub struct Flight {
    cacher: Arc<dyn Cacher>,
    handler: Handler,
    inner: Mutex<FlightInner>,
    done: watch::Sender<bool>,
}

impl Flight {
    pub fn new(cacher: Arc<dyn Cacher>, handler: Handler) -> Self {
        let (done, _) = watch::channel(false);
        Flight {
            cacher,
            handler,
            inner: Mutex::new(FlightInner {
                state: FlightState::Collecting,
                waiters: Vec::new(),
                response: None,
                cacheable: true,
                failure: None,
            }),
            done,
        }
    }

    /// Registers a waiter. The returned channel yields exactly one
    /// [`Dispatch`] once the flight is written.
    ///
    /// If the flight is already done, the stored outcome is replayed into
    /// this waiter using the same dispatch rules as the broadcast.
    pub fn add_writer(self: &Arc<Self>, request: ProxyRequest) -> oneshot::Receiver<Dispatch> {
        let (tx, rx) = oneshot::channel();
        let waiter = Waiter { request, tx };
        let replay = {
            let mut inner = self.inner.lock();
            if inner.state == FlightState::Done {
                Some((waiter, inner.response.clone(), inner.cacheable, inner.failure))
            } else {
                inner.waiters.push(waiter);
                None
            }
        };

        if let Some((waiter, response, cacheable, failure)) = replay {
            metric!(counter("coalesce.replay") += 1);
            if let Some(status) = failure {
                let _ = waiter.tx.send(Dispatch::Response(Outgoing::empty(status)));
            } else if let Some(response) = response.filter(|_| cacheable) {
                let leader_signature = self.leader_signature(&response);
                if let Some(followup) = self.dispatch(&response, &leader_signature, waiter) {
                    tokio::spawn(followup);
                }
            } else {
                let _ = waiter.tx.send(Dispatch::Released);
            }
        }
        rx
    }

    /// Broadcasts the leader's response to every waiter and completes the
    /// flight. Returns whether the response was eligible for fan-out.
    ///
    /// Waiters in the leader's Vary bucket receive the response directly;
    /// every other bucket is re-dispatched through the handler with
    /// `X-Honey-Vary` forcing a distinct primary key, so unrelated
    /// representations proceed without re-coalescing against this bucket.
    pub async fn write(&self, response: Arc<CachedResponse>) -> bool {
        let cache_control = response.cache_control();
        let eligible = !cache_control.has("private")
            && !cache_control.has("no-store")
            && response.vary() != "*";
        {
            let mut inner = self.inner.lock();
            inner.state = FlightState::Writing;
            inner.response = Some(Arc::clone(&response));
            inner.cacheable = eligible;
        }
        if !eligible {
            metric!(counter("coalesce.uncacheable") += 1);
        }

        let leader_signature = self.leader_signature(&response);
        loop {
            let batch = {
                let mut inner = self.inner.lock();
                if inner.waiters.is_empty() {
                    inner.state = FlightState::Done;
                    break;
                }
                std::mem::take(&mut inner.waiters)
            };

            let mut followups = Vec::new();
            for waiter in batch {
                if !eligible {
                    let _ = waiter.tx.send(Dispatch::Released);
                    continue;
                }
                if let Some(followup) = self.dispatch(&response, &leader_signature, waiter) {
                    followups.push(followup);
                }
            }
            join_all(followups).await;
        }

        let _ = self.done.send(true);
        eligible
    }

    /// Releases every waiter with a bodiless error status. Used when the
    /// leader's fetch fails or times out, so no flight outlives its leader.
    pub fn fail(&self, status: StatusCode) {
        let waiters = {
            let mut inner = self.inner.lock();
            inner.state = FlightState::Done;
            inner.failure = Some(status);
            inner.cacheable = false;
            std::mem::take(&mut inner.waiters)
        };
        for waiter in waiters {
            let _ = waiter.tx.send(Dispatch::Response(Outgoing::empty(status)));
        }
        let _ = self.done.send(true);
    }

    /// Whether the written response was eligible for fan-out. Errors with
    /// [`CoalesceError::NotReady`] before [`write`](Self::write).
    pub fn cacheable(&self) -> Result<bool, CoalesceError> {
        let inner = self.inner.lock();
        if inner.response.is_none() && inner.failure.is_none() {
            return Err(CoalesceError::NotReady);
        }
        Ok(inner.cacheable)
    }

    /// Blocks until every dispatch has finished.
    pub async fn wait(&self) {
        let mut done = self.done.subscribe();
        while !*done.borrow() {
            if done.changed().await.is_err() {
                return;
            }
        }
    }

    fn leader_signature(&self, response: &CachedResponse) -> String {
        key::vary_signature(
            response.vary(),
            response.request_headers(),
            &HeaderCookies(response.request_headers()),
            self.cacher.allowed_cookies(),
        )
    }

    /// Writes one waiter: directly when its Vary bucket matches the
    /// leader's, otherwise via a steered handler invocation.
    fn dispatch(
        &self,
        response: &Arc<CachedResponse>,
        leader_signature: &str,
        waiter: Waiter,
    ) -> Option<BoxFuture<'static, ()>> {
        let signature = key::vary_signature(
            response.vary(),
            &waiter.request.headers,
            &waiter.request,
            self.cacher.allowed_cookies(),
        );
        if signature == leader_signature {
            let _ = waiter
                .tx
                .send(Dispatch::Response(multiplexed(response, &waiter.request)));
            return None;
        }

        let mut request = waiter.request;
        request.set_header(X_HONEY_VARY, &signature);
        let handler = Arc::clone(&self.handler);
        let tx = waiter.tx;
        Some(Box::pin(async move {
            let outgoing = handler(request).await;
            let _ = tx.send(Dispatch::Response(outgoing));
        }))
    }
}

/// Builds the response written to a coalesced waiter.
fn multiplexed(response: &Arc<CachedResponse>, request: &ProxyRequest) -> Outgoing {
    let mut outgoing = Outgoing::new(
        StatusCode::OK,
        response.headers().clone(),
        response.body().clone(),
    );
    outgoing.set_header(X_HONEY_CACHE, "MISS (MULTIPLEXED)");
    outgoing.set_header(AGE, &response.age_header());
    if matches_etag(&request.headers, response) {
        outgoing.status = StatusCode::NOT_MODIFIED;
        outgoing.body = Bytes::new();
    } else {
        outgoing.status = response.status();
    }
    outgoing
}

/// The process-wide map of in-flight fetches, keyed by primary key.
/// Insert-if-absent is atomic: two concurrent leaders cannot exist for the
/// same key.
#[derive(Default)]
pub struct FlightRegistry {
    flights: Mutex<HashMap<String, Arc<Flight>>>,
}

/// The outcome of [`FlightRegistry::lead_or_join`].
pub enum LeadOrJoin {
    /// No flight existed; the caller is now the leader and must fetch.
    Lead(Arc<Flight>),
    /// An in-flight fetch exists; await the dispatch.
    Join(oneshot::Receiver<Dispatch>),
}

impl FlightRegistry {
    pub fn new() -> Self {
        FlightRegistry::default()
    }

    pub fn lead_or_join(
        &self,
        hash: &str,
        request: &ProxyRequest,
        cacher: Arc<dyn Cacher>,
        handler: Handler,
    ) -> LeadOrJoin {
        let mut created = None;
        let existing = {
            let mut flights = self.flights.lock();
            match flights.entry(hash.to_owned()) {
                Entry::Occupied(entry) => Some(Arc::clone(entry.get())),
                Entry::Vacant(entry) => {
                    let flight = Arc::new(Flight::new(cacher, handler));
                    entry.insert(Arc::clone(&flight));
                    created = Some(flight);
                    None
                }
            }
        };
        match existing {
            Some(flight) => LeadOrJoin::Join(flight.add_writer(request.clone())),
            None => LeadOrJoin::Lead(created.expect("flight created above")),
        }
    }

    pub fn get(&self, hash: &str) -> Option<Arc<Flight>> {
        self.flights.lock().get(hash).cloned()
    }

    pub fn remove(&self, hash: &str) {
        self.flights.lock().remove(hash);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::header::IF_NONE_MATCH;
    use http::HeaderMap;

    use crate::cache::response::standardize;
    use crate::cache::DefaultCacher;
    use crate::types::OriginResponse;

    use super::*;

    fn cacher() -> Arc<dyn Cacher> {
        Arc::new(DefaultCacher::default())
    }

    fn noop_handler() -> Handler {
        Arc::new(|_| Box::pin(async { Outgoing::empty(StatusCode::OK) }))
    }

    fn counting_handler(calls: Arc<AtomicUsize>) -> Handler {
        Arc::new(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Outgoing::empty(StatusCode::OK) })
        })
    }

    fn response(headers: &[(&str, &str)], body: &str) -> Arc<CachedResponse> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(
                http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        let mut origin = OriginResponse {
            status: StatusCode::OK,
            headers: map,
            body: Bytes::copy_from_slice(body.as_bytes()),
            request: ProxyRequest::get("https://www.example.com/".parse().unwrap()),
        };
        Arc::new(standardize(&mut origin, &[]))
    }

    fn request() -> ProxyRequest {
        ProxyRequest::get("https://www.example.com/".parse().unwrap())
    }

    #[tokio::test]
    async fn broadcasts_to_matching_waiters() {
        let flight = Arc::new(Flight::new(cacher(), noop_handler()));
        let rx1 = flight.add_writer(request());
        let rx2 = flight.add_writer(request());

        assert!(flight.write(response(&[], "visitor 1")).await);

        for rx in [rx1, rx2] {
            match rx.await.unwrap() {
                Dispatch::Response(outgoing) => {
                    assert_eq!(outgoing.status, StatusCode::OK);
                    assert_eq!(outgoing.body, Bytes::from_static(b"visitor 1"));
                    assert_eq!(
                        outgoing.header(X_HONEY_CACHE.as_str()),
                        Some("MISS (MULTIPLEXED)")
                    );
                    assert!(outgoing.header("age").is_some());
                }
                Dispatch::Released => panic!("waiter should receive the response"),
            }
        }
        flight.wait().await;
        assert!(flight.cacheable().unwrap());
    }

    #[tokio::test]
    async fn matching_etag_downgrades_to_not_modified() {
        let flight = Arc::new(Flight::new(cacher(), noop_handler()));
        let stored = response(&[], "hello");
        let etag = stored.etag().unwrap().to_owned();

        let mut req = request();
        req.headers.insert(IF_NONE_MATCH, etag.parse().unwrap());
        let rx = flight.add_writer(req);

        flight.write(stored).await;
        match rx.await.unwrap() {
            Dispatch::Response(outgoing) => {
                assert_eq!(outgoing.status, StatusCode::NOT_MODIFIED);
                assert!(outgoing.body.is_empty());
            }
            Dispatch::Released => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn foreign_buckets_are_redispatched_with_vary_header() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = {
            let calls = Arc::clone(&calls);
            let seen = Arc::clone(&seen);
            Arc::new(move |request| {
                calls.fetch_add(1, Ordering::SeqCst);
                seen.lock()
                    .push(request.header(X_HONEY_VARY.as_str()).map(str::to_owned));
                Box::pin(async { Outgoing::empty(StatusCode::OK) })
            })
        };
        let flight = Arc::new(Flight::new(cacher(), handler));

        let mut ru = request();
        ru.headers
            .insert(http::header::ACCEPT_LANGUAGE, "ru".parse().unwrap());
        let rx = flight.add_writer(ru);

        // The leader's request carried Accept-Language: en.
        let mut origin = OriginResponse {
            status: StatusCode::OK,
            headers: {
                let mut map = HeaderMap::new();
                map.insert(http::header::VARY, "Accept-Language".parse().unwrap());
                map
            },
            body: Bytes::from_static(b"english"),
            request: {
                let mut req = request();
                req.headers
                    .insert(http::header::ACCEPT_LANGUAGE, "en".parse().unwrap());
                req
            },
        };
        let stored = Arc::new(standardize(&mut origin, &[]));

        flight.write(stored).await;
        match rx.await.unwrap() {
            Dispatch::Response(outgoing) => assert_eq!(outgoing.status, StatusCode::OK),
            Dispatch::Released => panic!("expected a handler response"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(seen.lock().as_slice(), &[Some("::ru".to_owned())]);
    }

    #[tokio::test]
    async fn private_responses_release_waiters_without_body() {
        let flight = Arc::new(Flight::new(cacher(), noop_handler()));
        let rx = flight.add_writer(request());

        let eligible = flight
            .write(response(&[("cache-control", "private")], "secret"))
            .await;
        assert!(!eligible);
        assert!(matches!(rx.await.unwrap(), Dispatch::Released));
        assert!(!flight.cacheable().unwrap());
    }

    #[tokio::test]
    async fn vary_star_is_not_eligible() {
        let flight = Arc::new(Flight::new(cacher(), noop_handler()));
        let rx = flight.add_writer(request());
        assert!(!flight.write(response(&[("vary", "*")], "x")).await);
        assert!(matches!(rx.await.unwrap(), Dispatch::Released));
    }

    #[tokio::test]
    async fn late_waiters_get_a_replay() {
        let flight = Arc::new(Flight::new(cacher(), noop_handler()));
        flight.write(response(&[], "hello")).await;

        let rx = flight.add_writer(request());
        match rx.await.unwrap() {
            Dispatch::Response(outgoing) => {
                assert_eq!(outgoing.body, Bytes::from_static(b"hello"));
                assert_eq!(
                    outgoing.header(X_HONEY_CACHE.as_str()),
                    Some("MISS (MULTIPLEXED)")
                );
            }
            Dispatch::Released => panic!("expected a replay"),
        }
    }

    #[tokio::test]
    async fn cacheable_before_write_is_not_ready() {
        let flight = Arc::new(Flight::new(cacher(), noop_handler()));
        assert!(matches!(flight.cacheable(), Err(CoalesceError::NotReady)));
    }

    #[tokio::test]
    async fn failed_flights_release_with_status() {
        let flight = Arc::new(Flight::new(cacher(), noop_handler()));
        let rx = flight.add_writer(request());
        flight.fail(StatusCode::BAD_GATEWAY);

        match rx.await.unwrap() {
            Dispatch::Response(outgoing) => assert_eq!(outgoing.status, StatusCode::BAD_GATEWAY),
            Dispatch::Released => panic!("expected a status"),
        }
        // Late joiners see the failure too.
        let rx = flight.add_writer(request());
        match rx.await.unwrap() {
            Dispatch::Response(outgoing) => assert_eq!(outgoing.status, StatusCode::BAD_GATEWAY),
            Dispatch::Released => panic!("expected a status"),
        }
    }

    #[tokio::test]
    async fn registry_insert_if_absent_is_atomic() {
        let registry = FlightRegistry::new();
        let cacher = cacher();

        let first = registry.lead_or_join("key", &request(), Arc::clone(&cacher), noop_handler());
        assert!(matches!(first, LeadOrJoin::Lead(_)));

        let second = registry.lead_or_join("key", &request(), Arc::clone(&cacher), noop_handler());
        assert!(matches!(second, LeadOrJoin::Join(_)));

        registry.remove("key");
        assert!(registry.get("key").is_none());
        let third = registry.lead_or_join("key", &request(), cacher, noop_handler());
        assert!(matches!(third, LeadOrJoin::Lead(_)));
    }

    #[tokio::test]
    async fn handler_is_not_called_for_matching_bucket() {
        let calls = Arc::new(AtomicUsize::new(0));
        let flight = Arc::new(Flight::new(cacher(), counting_handler(Arc::clone(&calls))));
        let rx = flight.add_writer(request());
        flight.write(response(&[], "same bucket")).await;
        rx.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
