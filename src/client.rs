use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::chunk::ChunkDescriptor;
use crate::config::{ConcurrencyConfig, DavConfig};
use crate::credentials::CredentialStore;
use crate::error::{TransferError, TransferResult};
use crate::multistatus::{parse_multistatus, ResourceEntry, ResourceTree};
use crate::path::RemotePath;
use crate::queue::OperationQueue;
use crate::request::{Depth, RequestBuilder};
use crate::transfer::{ProgressFn, TransferOperation, TransferPayload};
use crate::transport::{HttpTransport, Transport};
use crate::upload::ChunkUploadCoordinator;

/// Session handle for one WebDAV server.
///
/// Cheap to clone; clones share the transport, the operation queue, and the
/// root cancellation token, so `cancel_all` on any clone halts everything
/// the session has in flight.
#[derive(Clone)]
pub struct DavClient {
    config: DavConfig,
    builder: RequestBuilder,
    transport: Arc<dyn Transport>,
    queue: Arc<OperationQueue>,
    root: CancellationToken,
}

impl DavClient {
    pub fn new(config: DavConfig, credentials: Arc<dyn CredentialStore>) -> anyhow::Result<Self> {
        config.validate()?;
        let transport = Arc::new(HttpTransport::new(&config, credentials)?);
        Ok(Self::with_transport(
            config,
            transport,
            ConcurrencyConfig::default(),
        )?)
    }

    /// Wires the client over an explicit transport. This is how tests swap
    /// in scripted transports, and how callers tune concurrency.
    pub fn with_transport(
        config: DavConfig,
        transport: Arc<dyn Transport>,
        concurrency: ConcurrencyConfig,
    ) -> TransferResult<Self> {
        let builder = RequestBuilder::new(&config)?;
        Ok(Self {
            config,
            builder,
            transport,
            queue: Arc::new(OperationQueue::new(concurrency.max_concurrent_transfers)),
            root: CancellationToken::new(),
        })
    }

    /// Cancels every operation this session has in flight and every one
    /// submitted afterwards. Used when the surrounding task is torn down
    /// (application shutdown, background time expiring).
    pub fn cancel_all(&self) {
        info!("🛑 Cancelling all in-flight WebDAV operations");
        self.root.cancel();
    }

    /// Lists the direct members of a collection. The returned tree holds the
    /// collection itself first, then its children in server order, all with
    /// paths relative to the DAV root.
    pub async fn list(&self, path: &RemotePath) -> TransferResult<ResourceTree> {
        info!("📁 Listing collection: {}", path);
        let request = self.builder.propfind(path, Depth::One)?;
        let payload = self.execute(TransferOperation::new(request)).await?;
        let tree = parse_multistatus(&utf8_body(payload.body)?)?;
        debug!("📁 {} holds {} entries", path, tree.len());
        Ok(tree.rebase(&self.config.dav_root_path()))
    }

    /// Fetches the properties of a single resource.
    pub async fn properties(&self, path: &RemotePath) -> TransferResult<ResourceEntry> {
        let request = self.builder.propfind(path, Depth::Zero)?;
        let payload = self.execute(TransferOperation::new(request)).await?;
        let tree = parse_multistatus(&utf8_body(payload.body)?)?;
        tree.rebase(&self.config.dav_root_path())
            .entries
            .into_iter()
            .next()
            .ok_or_else(|| {
                TransferError::MalformedResponse("multistatus carried no response elements".to_string())
            })
    }

    pub async fn mkcol(&self, path: &RemotePath) -> TransferResult<()> {
        info!("📂 Creating collection: {}", path);
        let request = self.builder.mkcol(path)?;
        self.execute(TransferOperation::new(request)).await?;
        Ok(())
    }

    pub async fn delete(&self, path: &RemotePath) -> TransferResult<()> {
        info!("🗑️ Deleting: {}", path);
        let request = self.builder.delete(path)?;
        self.execute(TransferOperation::new(request)).await?;
        Ok(())
    }

    pub async fn copy(&self, source: &RemotePath, destination: &RemotePath) -> TransferResult<()> {
        info!("📋 Copying {} -> {}", source, destination);
        let request = self.builder.copy(source, destination)?;
        self.execute(TransferOperation::new(request)).await?;
        Ok(())
    }

    pub async fn mv(&self, source: &RemotePath, destination: &RemotePath) -> TransferResult<()> {
        info!("🚚 Moving {} -> {}", source, destination);
        let request = self.builder.mv(source, destination)?;
        self.execute(TransferOperation::new(request)).await?;
        Ok(())
    }

    /// Downloads a file into memory. Progress reports bytes received against
    /// the server's Content-Length when it sends one.
    pub async fn get(
        &self,
        path: &RemotePath,
        progress: Option<ProgressFn>,
    ) -> TransferResult<Bytes> {
        info!("⬇️ Downloading: {}", path);
        let request = self.builder.get(path)?;
        let mut operation = TransferOperation::new(request);
        if let Some(progress) = progress {
            operation = operation.with_progress(progress);
        }
        let payload = self.execute(operation).await?;
        Ok(payload.body)
    }

    /// Uploads a whole in-memory body as a single PUT. For anything large
    /// enough to be worth resuming, use [`DavClient::chunked_upload`].
    pub async fn put(
        &self,
        path: &RemotePath,
        data: Bytes,
        progress: Option<ProgressFn>,
    ) -> TransferResult<()> {
        info!("⬆️ Uploading {} bytes to {}", data.len(), path);
        let total = data.len() as u64;
        let body = crate::chunk::ChunkInputStream::from_bytes(data).into_body(0, total, progress);
        let request = self.builder.put(path, body)?;
        self.execute(TransferOperation::new(request)).await?;
        Ok(())
    }

    /// Builds a chunked-upload coordinator bound to this session. The
    /// coordinator shares the session's transport, queue, and cancellation
    /// root; see [`ChunkUploadCoordinator::run`] for resume semantics.
    pub fn chunked_upload(
        &self,
        destination: RemotePath,
        chunks: Vec<ChunkDescriptor>,
    ) -> TransferResult<ChunkUploadCoordinator> {
        ChunkUploadCoordinator::new(
            Arc::clone(&self.transport),
            self.builder.clone(),
            Arc::clone(&self.queue),
            destination,
            chunks,
            self.root.child_token(),
        )
    }

    async fn execute(&self, operation: TransferOperation) -> TransferResult<TransferPayload> {
        let operation = operation.with_cancellation(self.root.child_token());
        self.queue.run(operation.run(self.transport.as_ref())).await
    }
}

fn utf8_body(body: Bytes) -> TransferResult<String> {
    String::from_utf8(body.to_vec())
        .map_err(|_| TransferError::MalformedResponse("response body is not UTF-8".to_string()))
}
