//! Network availability signal.
//!
//! The engine only ever reads [`Connectivity::current_status`]; starting and
//! stopping a monitor belongs to whoever constructed it.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::instrument;

pub trait Connectivity: Send + Sync {
    /// Begin monitoring. Calling it on a running monitor does nothing.
    fn start(&self);
    /// Stop monitoring. The last observed status is kept.
    fn stop(&self);
    /// Whether the network was reachable when last observed.
    fn current_status(&self) -> bool;
}

/// A status set by hand; used offline and in tests.
#[derive(Debug, Default)]
pub struct StaticConnectivity {
    online: AtomicBool,
}
impl StaticConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
    }
}
impl Connectivity for StaticConnectivity {
    fn start(&self) {}

    fn stop(&self) {}

    fn current_status(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }
}

/// Periodically opens a TCP connection to a host; reachable means online.
///
/// Reports offline until the first probe completes.
#[derive(Debug)]
pub struct ProbeConnectivity {
    inner: Arc<ProbeInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}
#[derive(Debug)]
struct ProbeInner {
    host: String,
    port: u16,
    interval: Duration,
    online: AtomicBool,
}

impl ProbeInner {
    async fn probe(&self) -> bool {
        let connect = TcpStream::connect((self.host.as_str(), self.port));
        let online = matches!(tokio::time::timeout(self.interval, connect).await, Ok(Ok(_)));
        let previous = self.online.swap(online, Ordering::Relaxed);
        if previous != online {
            tracing::info!(host = %self.host, online, "Connectivity changed");
        }
        online
    }
}

impl ProbeConnectivity {
    /// Monitor the host serving `endpoint`, probing every `interval`.
    pub fn for_endpoint(endpoint: &str, interval: Duration) -> Result<Self> {
        let url = reel_remote::parse_endpoint(endpoint).or_raise(|| ErrorKind::ProbeEndpoint(endpoint.to_string()))?;
        let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default()) else {
            exn::bail!(ErrorKind::ProbeEndpoint(endpoint.to_string()));
        };
        Ok(Self {
            inner: Arc::new(ProbeInner {
                host: host.to_string(),
                port,
                interval,
                online: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
        })
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn port(&self) -> u16 {
        self.inner.port
    }

    /// Probe once now and record the result.
    #[instrument(skip(self), fields(host = %self.inner.host, port = self.inner.port))]
    pub async fn refresh(&self) -> bool {
        self.inner.probe().await
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().unwrap_or_else(PoisonError::into_inner).as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Connectivity for ProbeConnectivity {
    /// Spawns the probe loop on the current Tokio runtime. Outside a runtime
    /// nothing is started and the status stays as it was.
    fn start(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!(host = %self.inner.host, "No async runtime; connectivity monitor not started");
            return;
        };
        let inner = Arc::clone(&self.inner);
        *task = Some(handle.spawn(async move {
            loop {
                inner.probe().await;
                tokio::time::sleep(inner.interval).await;
            }
        }));
        tracing::debug!(host = %self.inner.host, port = self.inner.port, "Connectivity monitor started");
    }

    fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
            tracing::debug!(host = %self.inner.host, "Connectivity monitor stopped");
        }
    }

    fn current_status(&self) -> bool {
        self.inner.online.load(Ordering::Relaxed)
    }
}

impl Drop for ProbeConnectivity {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tokio::net::TcpListener;

    #[test]
    fn test_static_connectivity() {
        let connectivity = StaticConnectivity::default();
        assert!(!connectivity.current_status());
        connectivity.set_online(true);
        connectivity.start();
        assert!(connectivity.current_status());
        connectivity.stop();
        assert!(connectivity.current_status());
    }

    #[rstest]
    #[case("https://api.example/3/discover/movie", "api.example", 443)]
    #[case("http://api.example/3", "api.example", 80)]
    #[case("http://127.0.0.1:8080/", "127.0.0.1", 8080)]
    fn test_reachability_target(#[case] endpoint: &str, #[case] host: &str, #[case] port: u16) {
        let connectivity = ProbeConnectivity::for_endpoint(endpoint, Duration::from_secs(1)).unwrap();
        assert_eq!(connectivity.host(), host);
        assert_eq!(connectivity.port(), port);
        assert!(!connectivity.current_status());
    }

    #[rstest]
    #[case("not a url")]
    #[case("mailto:someone@example.com")]
    fn test_rejects_unusable_endpoint(#[case] endpoint: &str) {
        let err = ProbeConnectivity::for_endpoint(endpoint, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::ProbeEndpoint(_)));
    }

    #[tokio::test]
    async fn test_refresh_reports_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let endpoint = format!("http://127.0.0.1:{port}/");
        let connectivity = ProbeConnectivity::for_endpoint(&endpoint, Duration::from_secs(1)).unwrap();
        assert!(connectivity.refresh().await);
        assert!(connectivity.current_status());

        drop(listener);
        assert!(!connectivity.refresh().await);
        assert!(!connectivity.current_status());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let endpoint = format!("http://127.0.0.1:{port}/");
        let connectivity = ProbeConnectivity::for_endpoint(&endpoint, Duration::from_millis(20)).unwrap();
        connectivity.start();
        connectivity.start();
        assert!(connectivity.is_running());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !connectivity.current_status() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(connectivity.current_status());

        connectivity.stop();
        assert!(!connectivity.is_running());
        assert!(connectivity.current_status());
    }
}
