//! Transport trait and implementations.
//!
//! A [`Transport`] moves one fully-built [`Request`] over the wire and hands
//! back whatever the server answered. It does not interpret status codes or
//! bodies; that is the [`RemoteClient`](crate::RemoteClient)'s job.

mod http;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::http::HttpTransport;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockTransport;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use derive_more::Display;
use reqwest::Url;

/// HTTP methods understood by the client.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Method {
    #[display("GET")]
    Get,
    #[display("POST")]
    Post,
    #[display("PUT")]
    Put,
    #[display("PATCH")]
    Patch,
    #[display("DELETE")]
    Delete,
}
impl Method {
    /// Read methods carry their parameters in the query string; every other
    /// method sends them as a JSON body.
    pub fn is_read(self) -> bool {
        matches!(self, Self::Get)
    }
}
impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
        }
    }
}

/// A fully-built outgoing request.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    /// JSON body, only ever present for non-read methods.
    pub body: Option<Vec<u8>>,
}

/// Raw answer from the server.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Bytes,
}
impl Response {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A `200 OK` response with the given body.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200, body)
    }

    /// A `200 OK` response carrying a JSON document.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::ok(value.to_string())
    }

    /// An empty response with the given status.
    pub fn status(status: u16) -> Self {
        Self::new(status, Bytes::new())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Moves requests over the wire.
///
/// Implementations must not retry, and must not treat non-success statuses
/// as errors: they are returned as a normal [`Response`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response>;
}
