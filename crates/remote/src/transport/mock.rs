//! In-memory transport for testing.

use super::{Request, Response, Transport};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

type Handler = Box<dyn Fn(&Request) -> Result<Response> + Send + Sync>;

/// In-memory [`Transport`] for testing.
///
/// Every request is recorded before it is answered, so tests can assert on
/// how many network calls were made and with which URLs. Requests can be
/// held open with [`hold`](Self::hold) until [`release`](Self::release) is
/// called, which makes "request still in flight" states deterministic.
///
/// # Examples
///
/// ```
/// use reel_remote::{Method, MockTransport, RemoteClient, Response};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = MockTransport::with_routes([
///     ("https://img.example/w185/a.png", Response::ok(&b"\x89PNG\r\n\x1a\n"[..])),
/// ]);
/// let client = RemoteClient::new(transport.clone());
/// let body = client.download("https://img.example/w185/a.png").await?;
/// assert_eq!(&body[..4], b"\x89PNG");
/// assert_eq!(transport.call_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MockTransport {
    inner: std::sync::Arc<Inner>,
}
struct Inner {
    handler: Handler,
    calls: Mutex<Vec<Request>>,
    recorded: watch::Sender<usize>,
    open: watch::Sender<bool>,
}

impl MockTransport {
    /// Answer every request with the given closure.
    pub fn from_fn(handler: impl Fn(&Request) -> Result<Response> + Send + Sync + 'static) -> Self {
        Self {
            inner: std::sync::Arc::new(Inner {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
                recorded: watch::Sender::new(0),
                open: watch::Sender::new(true),
            }),
        }
    }

    /// Answer requests by URL, ignoring the query string. Unknown URLs get a
    /// `404`.
    pub fn with_routes(routes: impl IntoIterator<Item = (impl Into<String>, Response)>) -> Self {
        let routes: HashMap<String, Response> = routes.into_iter().map(|(url, response)| (url.into(), response)).collect();
        Self::from_fn(move |request| Ok(routes.get(&route_key(&request.url)).cloned().unwrap_or(Response::status(404))))
    }

    /// Fail every request as if the network were unreachable.
    pub fn unreachable() -> Self {
        Self::from_fn(|request| exn::bail!(ErrorKind::Transport(request.url.to_string())))
    }

    /// Hold every request (including ones already waiting) until
    /// [`release`](Self::release) is called.
    pub fn hold(&self) {
        self.inner.open.send_replace(false);
    }

    /// Let held requests, and every later one, through.
    pub fn release(&self) {
        self.inner.open.send_replace(true);
    }

    /// Every request received so far, in arrival order.
    pub fn calls(&self) -> Vec<Request> {
        self.lock_calls().clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    /// Number of requests received for `url`, ignoring the query string.
    pub fn calls_to(&self, url: &str) -> usize {
        self.lock_calls().iter().filter(|request| route_key(&request.url) == url).count()
    }

    /// Wait until at least `count` requests have been received.
    pub async fn wait_for_calls(&self, count: usize) {
        let mut recorded = self.inner.recorded.subscribe();
        // The sender lives as long as `self`; this cannot fail.
        _ = recorded.wait_for(|seen| *seen >= count).await;
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<Request>> {
        // A panicking handler must not take every later assertion down with it.
        self.inner.calls.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn route_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let count = {
            let mut calls = self.lock_calls();
            calls.push(request.clone());
            calls.len()
        };
        self.inner.recorded.send_replace(count);
        let mut open = self.inner.open.subscribe();
        if open.wait_for(|open| *open).await.is_err() {
            exn::bail!(ErrorKind::Transport("mock transport dropped".to_string()));
        }
        (self.inner.handler)(&request)
    }
}
