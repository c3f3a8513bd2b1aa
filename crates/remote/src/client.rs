use crate::envelope::PageEnvelope;
use crate::error::{ErrorKind, Result};
use crate::transport::{HttpTransport, Method, Request, Transport};
use bytes::Bytes;
use exn::ResultExt;
use reel_codec::{Decode, Json, decode_field, decode_value};
use reqwest::Url;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Request parameters, keyed by name.
pub type Params = BTreeMap<String, Json>;

/// Parse an absolute endpoint URL that paths and query strings can be
/// appended to.
pub fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint).or_raise(|| ErrorKind::UrlConstruction(endpoint.to_string()))?;
    if url.cannot_be_a_base() {
        exn::bail!(ErrorKind::UrlConstruction(endpoint.to_string()));
    }
    Ok(url)
}

/// Client for the remote listing API and its binary assets.
///
/// Cheap to clone; clones share the same transport.
#[derive(Clone)]
pub struct RemoteClient {
    transport: Arc<dyn Transport>,
}
impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient").finish_non_exhaustive()
    }
}

impl RemoteClient {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    /// A client speaking real HTTP, with the given request timeout.
    pub fn http(timeout: Duration) -> Result<Self> {
        Ok(Self::new(HttpTransport::new(timeout)?))
    }

    /// Build the request for `endpoint`.
    ///
    /// For read methods every parameter is cast to a string and appended to
    /// the query string; otherwise the parameters become a JSON object body.
    fn build(endpoint: &str, params: &Params, method: Method) -> Result<Request> {
        let mut url = parse_endpoint(endpoint)?;
        if !method.is_read() {
            let body = serde_json::to_vec(params).or_raise(|| ErrorKind::UrlConstruction(endpoint.to_string()))?;
            return Ok(Request {
                method,
                url,
                body: Some(body),
            });
        }
        if !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, &decode_field::<String>(Some(value)));
            }
        }
        Ok(Request { method, url, body: None })
    }

    /// Issue a request and return the raw response body.
    ///
    /// Non-success statuses are failures; their bodies are never returned.
    #[instrument(skip(self, params, method), fields(%method))]
    pub async fn request(&self, endpoint: &str, params: &Params, method: Method) -> Result<Bytes> {
        let request = Self::build(endpoint, params, method)?;
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            tracing::debug!(status = response.status, "Request failed");
            exn::bail!(ErrorKind::Status(response.status));
        }
        Ok(response.body)
    }

    /// Issue a request and decode the JSON response body into `T`.
    pub async fn typed_request<T: Decode>(&self, endpoint: &str, params: &Params, method: Method) -> Result<T> {
        let body = self.request(endpoint, params, method).await?;
        let json: Json = serde_json::from_slice(&body).or_raise(|| ErrorKind::Decode)?;
        decode_value(&json).or_raise(|| ErrorKind::Decode)
    }

    /// Fetch one page of a paginated listing.
    pub async fn page<E: Decode>(&self, endpoint: &str, params: &Params) -> Result<PageEnvelope<E>> {
        self.typed_request(endpoint, params, Method::Get).await
    }

    /// Fetch the raw bytes behind a fully resolved locator.
    pub async fn download(&self, locator: &str) -> Result<Bytes> {
        self.request(locator, &Params::new(), Method::Get).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockTransport, Response};
    use reel_codec::Fields;
    use rstest::rstest;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    struct Title {
        id: i64,
        title: String,
    }
    impl Decode for Title {
        fn decode(fields: &Fields<'_>) -> reel_codec::Result<Self> {
            Ok(Self {
                id: fields.get("id"),
                title: fields.get("title"),
            })
        }
    }

    fn params() -> Params {
        Params::from([
            ("api_key".to_string(), json!("secret")),
            ("include_adult".to_string(), json!("false")),
            ("page".to_string(), json!(3)),
            ("ratio".to_string(), json!(1.0)),
        ])
    }

    #[test]
    fn test_read_params_go_in_query() {
        let request = RemoteClient::build("https://api.example/3/discover", &params(), Method::Get).unwrap();
        assert_eq!(request.body, None);
        let query: BTreeMap<_, _> = request.url.query_pairs().into_owned().collect();
        assert_eq!(query["api_key"], "secret");
        assert_eq!(query["include_adult"], "false");
        assert_eq!(query["page"], "3");
        assert_eq!(query["ratio"], "1.0");
    }

    #[test]
    fn test_no_params_no_query() {
        let request = RemoteClient::build("https://img.example/w185/a.jpg", &Params::new(), Method::Get).unwrap();
        assert_eq!(request.url.as_str(), "https://img.example/w185/a.jpg");
    }

    #[rstest]
    #[case(Method::Post)]
    #[case(Method::Put)]
    #[case(Method::Patch)]
    #[case(Method::Delete)]
    fn test_write_params_go_in_body(#[case] method: Method) {
        let request = RemoteClient::build("https://api.example/3/list", &params(), method).unwrap();
        assert_eq!(request.url.query(), None);
        let body: Json = serde_json::from_slice(&request.body.unwrap()).unwrap();
        assert_eq!(body["page"], json!(3));
        assert_eq!(body["include_adult"], json!("false"));
    }

    #[rstest]
    #[case("")]
    #[case("not a url")]
    #[case("/relative/path")]
    #[case("mailto:someone@example.com")]
    fn test_url_construction_error(#[case] endpoint: &str) {
        let err = RemoteClient::build(endpoint, &Params::new(), Method::Get).unwrap_err();
        assert!(matches!(&*err, ErrorKind::UrlConstruction(_)));
    }

    #[tokio::test]
    async fn test_status_is_transport_failure() {
        let client = RemoteClient::new(MockTransport::from_fn(|_| Ok(Response::new(500, "{\"page\": 1}"))));
        let err = client.request("https://api.example/", &Params::new(), Method::Get).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Status(500));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_typed_request() {
        let transport = MockTransport::with_routes([(
            "https://api.example/title",
            Response::json(&json!({"id": "7", "title": "Heat"})),
        )]);
        let client = RemoteClient::new(transport.clone());
        let title: Title = client.typed_request("https://api.example/title", &params(), Method::Get).await.unwrap();
        assert_eq!(
            title,
            Title {
                id: 7,
                title: "Heat".to_string()
            }
        );
        assert_eq!(transport.calls()[0].url.query_pairs().count(), 4);
    }

    #[rstest]
    #[case(Response::ok("<html>oops</html>"))]
    #[case(Response::json(&json!(["not", "an", "object"])))]
    #[tokio::test]
    async fn test_typed_request_decode_error(#[case] response: Response) {
        let client = RemoteClient::new(MockTransport::from_fn(move |_| Ok(response.clone())));
        let err = client.typed_request::<Title>("https://api.example/", &Params::new(), Method::Get).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_page() {
        let transport = MockTransport::from_fn(|request| {
            let page = request.url.query_pairs().find(|(key, _)| key == "page").map(|(_, v)| v.into_owned());
            Ok(Response::json(&json!({
                "page": page,
                "results": [{"id": 1, "title": "A"}],
                "total_pages": 2,
                "total_results": 2,
            })))
        });
        let client = RemoteClient::new(transport);
        let mut params = Params::new();
        params.insert("page".to_string(), json!("2"));
        let envelope = client.page::<Title>("https://api.example/discover", &params).await.unwrap();
        assert_eq!(envelope.page, 2);
        assert_eq!(envelope.results.len(), 1);
        assert!(!envelope.has_next_page());
    }

    #[tokio::test]
    async fn test_download_transport_error() {
        let client = RemoteClient::new(MockTransport::unreachable());
        let err = client.download("https://img.example/a.jpg").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Transport(url) if url == "https://img.example/a.jpg"));
    }
}
