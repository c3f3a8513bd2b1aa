use super::{Request, Response, Transport};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::instrument;

/// [`Transport`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport whose requests time out after `timeout`.
    ///
    /// Listing pages and full-resolution artwork can be slow; callers that
    /// want "no practical timeout" should pass a very large value rather than
    /// rely on reqwest's default of none.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("reel/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Transport("cannot build HTTP client".to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    async fn send(&self, request: Request) -> Result<Response> {
        let Request { method, url, body } = request;
        let mut builder = self.client.request(method.into(), url.clone());
        if let Some(body) = body {
            builder = builder.header(CONTENT_TYPE, "application/json").body(body);
        }
        let response = builder.send().await.or_raise(|| ErrorKind::Transport(url.to_string()))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.or_raise(|| ErrorKind::Transport(url.to_string()))?;
        tracing::debug!(status, bytes = body.len(), "Received response");
        Ok(Response { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_with_long_timeout() {
        assert!(HttpTransport::new(Duration::from_secs(100_000)).is_ok());
    }
}
