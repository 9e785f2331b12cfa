use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{TransferError, TransferResult};
use crate::request::DavRequest;
use crate::transport::{ByteStream, Transport};

/// Progress callback: `(bytes_transferred, total)`. Bytes-transferred is
/// monotonically non-decreasing; the total is `None` when the server did not
/// announce one.
pub type ProgressFn = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Fully-received outcome of a successful operation.
#[derive(Debug)]
pub struct TransferPayload {
    pub status: StatusCode,
    pub body: Bytes,
}

/// One request/response cycle.
///
/// Exactly one network request per instance; there are no hidden retries at
/// this layer. The operation resolves exactly once: with a payload, with a
/// `TransferError`, or with `Cancelled` when its token fires first — a
/// cancelled operation produces neither success nor failure and abandons any
/// in-flight bytes.
pub struct TransferOperation {
    request: DavRequest,
    token: CancellationToken,
    progress: Option<ProgressFn>,
}

impl TransferOperation {
    pub fn new(request: DavRequest) -> Self {
        Self {
            request,
            token: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Handle for cancelling this operation from elsewhere.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn run(self, transport: &dyn Transport) -> TransferResult<TransferPayload> {
        if self.token.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let method = self.request.method;
        let url = self.request.url.clone();

        let response = tokio::select! {
            _ = self.token.cancelled() => return Err(TransferError::Cancelled),
            response = transport.execute(self.request) => response?,
        };

        let status = response.status;
        if let Err(e) = check_status(status) {
            // Pull a little of the body for the error message, then give up.
            let detail = collect_body(response.body, &self.token, None, None)
                .await
                .ok()
                .and_then(|b| String::from_utf8(b.to_vec()).ok())
                .unwrap_or_default();
            debug!("{} {} failed with {}: {}", method, url, status, detail.trim());
            return Err(match e {
                TransferError::Recoverable { status, .. } => TransferError::Recoverable {
                    status,
                    message: format!("HTTP {} - {}", status_str(status), truncate(&detail, 200)),
                },
                other => other,
            });
        }

        let body = collect_body(
            response.body,
            &self.token,
            self.progress.as_ref(),
            response.content_length,
        )
        .await?;

        debug!("{} {} completed with {} ({} bytes)", method, url, status, body.len());
        Ok(TransferPayload { status, body })
    }
}

/// Success is 2xx plus 207 (multistatus); 401/407 are credential rejections,
/// everything else is left to the caller's retry policy.
fn check_status(status: StatusCode) -> TransferResult<()> {
    if status.is_success() || status.as_u16() == 207 {
        return Ok(());
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::PROXY_AUTHENTICATION_REQUIRED {
        return Err(TransferError::CredentialFailure { status });
    }
    Err(TransferError::Recoverable {
        status: Some(status),
        message: String::new(),
    })
}

async fn collect_body(
    mut body: ByteStream,
    token: &CancellationToken,
    progress: Option<&ProgressFn>,
    total: Option<u64>,
) -> TransferResult<Bytes> {
    let mut received: u64 = 0;
    let mut collected = BytesMut::new();

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => return Err(TransferError::Cancelled),
            next = body.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                received += chunk.len() as u64;
                collected.extend_from_slice(&chunk);
                if let Some(callback) = progress {
                    callback(received, total);
                }
            }
            Some(Err(e)) => {
                return Err(TransferError::recoverable(format!("body read failed: {e}")));
            }
            None => break,
        }
    }

    Ok(collected.freeze())
}

fn status_str(status: Option<StatusCode>) -> String {
    status.map(|s| s.to_string()).unwrap_or_else(|| "?".to_string())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
