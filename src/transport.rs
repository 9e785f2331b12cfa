use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::{Client, Method, StatusCode};
use tracing::debug;

use crate::config::DavConfig;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::{TransferError, TransferResult};
use crate::request::{DavRequest, RequestBody};

pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Raw response handed back by a transport: status plus a streaming body.
/// Status-to-outcome mapping happens in the transfer layer so transports
/// stay dumb pipes.
pub struct TransportResponse {
    pub status: StatusCode,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl TransportResponse {
    /// Convenience constructor for scripted transports in tests.
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            content_length: Some(0),
            body: futures_util::stream::empty().boxed(),
        }
    }
}

/// The one capability the engine needs from an HTTP stack: submit a request,
/// get a response. Connection pooling, TLS and redirects live behind it; so
/// do the scripted backends the tests run against.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: DavRequest) -> TransferResult<TransportResponse>;
}

/// Production transport over a shared reqwest client.
pub struct HttpTransport {
    client: Client,
    credentials: Arc<dyn CredentialStore>,
}

impl HttpTransport {
    pub fn new(config: &DavConfig, credentials: Arc<dyn CredentialStore>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, credentials })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: DavRequest) -> TransferResult<TransportResponse> {
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            TransferError::recoverable(format!("invalid method '{}': {e}", request.method))
        })?;

        debug!("{} {}", request.method, request.url);

        let mut builder = self.client.request(method, request.url.clone());

        builder = match self.credentials.current() {
            Credentials::Basic { username, password } => builder.basic_auth(username, Some(password)),
            Credentials::Bearer(token) => builder.bearer_auth(token),
            Credentials::Cookie(cookie) => builder.header(reqwest::header::COOKIE, cookie),
        };

        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        builder = match request.body {
            RequestBody::None => builder,
            RequestBody::Xml(text) => builder.body(text),
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Stream { len, stream } => builder
                .header(reqwest::header::CONTENT_LENGTH, len)
                .body(reqwest::Body::wrap_stream(stream)),
        };

        let response = builder.send().await.map_err(|e| TransferError::Recoverable {
            status: None,
            message: format!("request failed: {e}"),
        })?;

        let status = response.status();
        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map_err(io::Error::other)
            .boxed();

        Ok(TransportResponse {
            status,
            content_length,
            body,
        })
    }
}
