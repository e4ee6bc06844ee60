//! JQL API Client
//!
//! Submits a rendered query to the Mixpanel JQL endpoint and streams the
//! result rows back.
//!
//! The HTTP exchange sits behind the [`Transport`] trait:
//! [`HttpTransport`] does it with reqwest (basic auth, form body, gzip,
//! streamed body) and tests plug in their own.

use crate::query::Jql;
use crate::stream::{decode_stream, BoxRowStream, DecodeError};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Form field holding the script
const SCRIPT_FIELD: &str = "script";

/// Longest error body kept in [`ClientError::ApiError`]
const MAX_ERROR_BODY: usize = 64 * 1024;

/// Lazily decoded result rows
pub type RowStream = BoxRowStream<ClientError>;

/// Raw response body chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// Configuration for the JQL client
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Endpoint URL; `{version}` is replaced by `api_version`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Whole-request timeout; none by default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_endpoint() -> String {
    "https://mixpanel.com/api/{version}/jql".to_string()
}

fn default_api_version() -> String {
    "2.0".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_version: default_api_version(),
            timeout_secs: None,
        }
    }
}

impl ClientConfig {
    /// The endpoint with the API version filled in
    pub fn url(&self) -> String {
        self.endpoint.replace("{version}", &self.api_version)
    }
}

/// Status and body of a JQL response
pub struct TransportResponse {
    pub status: u16,
    pub body: ByteStream,
}

/// Sends a script to the JQL endpoint
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `script` to `url`, authenticating with `api_secret`
    ///
    /// Returns once the status is known; the body is read lazily.
    async fn post(
        &self,
        url: &str,
        api_secret: &str,
        script: &str,
    ) -> Result<TransportResponse, ClientError>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let mut builder = Client::builder()
            .user_agent(concat!("mixpanel-jql/", env!("CARGO_PKG_VERSION")))
            .gzip(true);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        api_secret: &str,
        script: &str,
    ) -> Result<TransportResponse, ClientError> {
        let response = self
            .client
            .post(url)
            .basic_auth(api_secret, Some(""))
            .form(&[(SCRIPT_FIELD, script)])
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.bytes_stream().map_err(map_reqwest_error);

        Ok(TransportResponse {
            status,
            body: Box::pin(body),
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else if e.is_connect() {
        ClientError::Unavailable
    } else {
        ClientError::Request(e)
    }
}

/// Client for the Mixpanel JQL API
#[derive(Clone)]
pub struct JqlClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl JqlClient {
    /// Create a client that talks HTTP
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client over a custom transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Submit a query and stream its rows
    ///
    /// Fails before yielding anything if the endpoint answers with a
    /// non-success status. The returned stream reads the body as rows are
    /// consumed and releases it when dropped.
    pub async fn stream(&self, query: &Jql) -> Result<RowStream, ClientError> {
        let request_id = Uuid::new_v4();
        let url = self.config.url();
        let script = query.script();

        info!(%request_id, operations = query.operations().len(), "Submitting JQL query");
        debug!(%request_id, %url, %script, "JQL script");

        let response = self
            .transport
            .post(&url, query.api_secret(), &script)
            .await?;

        if !(200..300).contains(&response.status) {
            let message = read_error_body(response.body).await;
            warn!(%request_id, status = response.status, "JQL query rejected: {}", message);
            return Err(ClientError::ApiError {
                status: response.status,
                message,
            });
        }

        debug!(%request_id, status = response.status, "Streaming JQL results");
        Ok(decode_stream(response.body))
    }

    /// Submit a query and collect every row
    pub async fn collect(&self, query: &Jql) -> Result<Vec<Value>, ClientError> {
        self.stream(query).await?.try_collect().await
    }
}

impl Jql {
    /// Submit this query with `client` and stream its rows
    pub async fn send(&self, client: &JqlClient) -> Result<RowStream, ClientError> {
        client.stream(self).await
    }
}

/// Read an error body as text, bounded and best-effort
async fn read_error_body(mut body: ByteStream) -> String {
    let mut buf = Vec::new();
    while let Some(Ok(chunk)) = body.next().await {
        let room = MAX_ERROR_BODY - buf.len();
        buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if buf.len() >= MAX_ERROR_BODY {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

// ============================================
// Errors
// ============================================

/// Errors that can occur when submitting a query
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("JQL endpoint unavailable")]
    Unavailable,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid response: {0}")]
    Decode(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Events, Reducer};
    use futures_util::stream;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::task::{Context, Poll};

    /// Records requests and answers with canned chunks
    struct MockTransport {
        status: u16,
        chunks: Vec<&'static [u8]>,
        requests: Mutex<Vec<(String, String, String)>>,
        released: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(status: u16, chunks: Vec<&'static [u8]>) -> Self {
            Self {
                status,
                chunks,
                requests: Mutex::new(Vec::new()),
                released: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    /// Body stream that flags when it is dropped
    struct TrackedBody {
        inner: ByteStream,
        released: Arc<AtomicBool>,
    }

    impl Stream for TrackedBody {
        type Item = Result<Bytes, ClientError>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.inner.as_mut().poll_next(cx)
        }
    }

    impl Drop for TrackedBody {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn post(
            &self,
            url: &str,
            api_secret: &str,
            script: &str,
        ) -> Result<TransportResponse, ClientError> {
            self.requests.lock().unwrap().push((
                url.to_string(),
                api_secret.to_string(),
                script.to_string(),
            ));
            let chunks: Vec<Result<Bytes, ClientError>> = self
                .chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c)))
                .collect();
            Ok(TransportResponse {
                status: self.status,
                body: Box::pin(TrackedBody {
                    inner: Box::pin(stream::iter(chunks)),
                    released: Arc::clone(&self.released),
                }),
            })
        }
    }

    fn query() -> Jql {
        Jql::events("secret", Events::default())
            .filter("e.x == 'y'")
            .reduce(Reducer::count())
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.url(), "https://mixpanel.com/api/2.0/jql");
        assert!(config.timeout_secs.is_none());
    }

    #[tokio::test]
    async fn test_stream_rows() {
        let transport = Arc::new(MockTransport::new(200, vec![b"[{\"a\":1},", b"{\"a\":2}]"]));
        let client = JqlClient::with_transport(ClientConfig::default(), transport.clone());

        let q = query();
        let rows = client.collect(&q).await.unwrap();
        assert_eq!(rows, vec![json!({"a": 1}), json!({"a": 2})]);

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "https://mixpanel.com/api/2.0/jql");
        assert_eq!(requests[0].1, "secret");
        assert_eq!(requests[0].2, q.script());
    }

    #[tokio::test]
    async fn test_error_status_fails_before_rows() {
        let transport = Arc::new(MockTransport::new(400, vec![b"{\"error\": \"bad script\"}"]));
        let client = JqlClient::with_transport(ClientConfig::default(), transport.clone());

        match query().send(&client).await {
            Err(ClientError::ApiError { status, message }) => {
                assert_eq!(status, 400);
                assert!(message.contains("bad script"));
            }
            other => panic!("expected API error, got {:?}", other.map(|_| ())),
        }
        assert!(transport.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_decode_error_after_rows() {
        let transport = Arc::new(MockTransport::new(200, vec![b"[1,2,{oops}]"]));
        let client = JqlClient::with_transport(ClientConfig::default(), transport);

        let items: Vec<Result<Value, ClientError>> =
            client.stream(&query()).await.unwrap().collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap(), &json!(1));
        assert_eq!(items[1].as_ref().unwrap(), &json!(2));
        assert!(matches!(
            items[2],
            Err(ClientError::Decode(DecodeError::Malformed { offset: 5, .. }))
        ));
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_body() {
        let transport = Arc::new(MockTransport::new(200, vec![b"[1,", b"2,", b"3]"]));
        let client = JqlClient::with_transport(ClientConfig::default(), transport.clone());

        let mut rows = client.stream(&query()).await.unwrap();
        assert_eq!(rows.next().await.unwrap().unwrap(), json!(1));
        assert!(!transport.released.load(Ordering::SeqCst));

        drop(rows);
        assert!(transport.released.load(Ordering::SeqCst));
    }

    mod http {
        use super::*;
        use axum::{
            http::{header, HeaderMap, StatusCode},
            routing::post,
            Form, Router,
        };
        use std::collections::HashMap;

        async fn jql(
            headers: HeaderMap,
            Form(form): Form<HashMap<String, String>>,
        ) -> (StatusCode, String) {
            let auth = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            // base64("secret:")
            if auth != "Basic c2VjcmV0Og==" {
                return (StatusCode::UNAUTHORIZED, "bad credentials".to_string());
            }
            let script = form.get("script").cloned().unwrap_or_default();
            (
                StatusCode::OK,
                json!([{"script": script}, {"n": 2}]).to_string(),
            )
        }

        async fn spawn_server() -> ClientConfig {
            let app = Router::new().route("/api/2.0/jql", post(jql));
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            ClientConfig {
                endpoint: format!("http://{}/api/{{version}}/jql", addr),
                timeout_secs: Some(10),
                ..ClientConfig::default()
            }
        }

        #[tokio::test]
        async fn test_http_transport_posts_script_with_basic_auth() {
            let client = JqlClient::new(spawn_server().await).unwrap();
            let q = query();

            let rows = client.collect(&q).await.unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0]["script"], json!(q.script()));
            assert_eq!(rows[1], json!({"n": 2}));
        }

        async fn jql_gzip() -> impl axum::response::IntoResponse {
            use flate2::{write::GzEncoder, Compression};
            use std::io::Write;

            let rows: Vec<Value> = (0..500).map(|i| json!({"i": i, "name": "é"})).collect();
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(serde_json::to_string(&rows).unwrap().as_bytes())
                .unwrap();
            (
                [
                    (header::CONTENT_ENCODING, "gzip"),
                    (header::CONTENT_TYPE, "application/json"),
                ],
                encoder.finish().unwrap(),
            )
        }

        #[tokio::test]
        async fn test_http_transport_decodes_gzip_body() {
            let app = Router::new().route("/api/2.0/jql", post(jql_gzip));
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            let client = JqlClient::new(ClientConfig {
                endpoint: format!("http://{}/api/{{version}}/jql", addr),
                ..ClientConfig::default()
            })
            .unwrap();
            let rows = client.collect(&query()).await.unwrap();
            assert_eq!(rows.len(), 500);
            assert_eq!(rows[0], json!({"i": 0, "name": "é"}));
            assert_eq!(rows[499]["i"], json!(499));
        }

        #[tokio::test]
        async fn test_http_transport_reports_status() {
            let client = JqlClient::new(spawn_server().await).unwrap();
            let q = Jql::events("wrong", Events::default());

            match client.stream(&q).await {
                Err(ClientError::ApiError { status, message }) => {
                    assert_eq!(status, 401);
                    assert_eq!(message, "bad credentials");
                }
                other => panic!("expected API error, got {:?}", other.map(|_| ())),
            }
        }
    }
}
