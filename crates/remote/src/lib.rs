//! Remote listing API client.
//!
//! [`RemoteClient`] builds requests (query string for reads, JSON body for
//! writes), sends them through a pluggable [`Transport`], rejects non-success
//! statuses, and decodes JSON bodies through the `reel-codec` layer. Paginated
//! listings come back as a [`PageEnvelope`].
//!
//! No request is ever retried here; retrying is up to the caller.

mod client;
mod envelope;
pub mod error;
mod transport;

pub use crate::client::{Params, RemoteClient, parse_endpoint};
pub use crate::envelope::PageEnvelope;
pub use crate::error::{Error, ErrorKind, Result};
#[cfg(any(test, feature = "mock"))]
pub use crate::transport::MockTransport;
pub use crate::transport::{HttpTransport, Method, Request, Response, Transport};
