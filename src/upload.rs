use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunk::{ChunkDescriptor, ChunkSource};
use crate::error::{ChunkUploadError, TransferError, TransferResult};
use crate::path::RemotePath;
use crate::queue::OperationQueue;
use crate::request::RequestBuilder;
use crate::transfer::{ProgressFn, TransferOperation};
use crate::transport::Transport;

/// Sequences a file's chunks into ordered PUT operations.
///
/// A run is a single deterministic pass: chunk `i+1` is never issued before
/// chunk `i` succeeded, and the first failure of any kind stops the run and
/// reports the failing index. There is no retry loop in here — credential
/// refresh and retry policy belong to the caller, which resumes with
/// `run(source, failed_index, progress)` against the same chunk paths.
pub struct ChunkUploadCoordinator {
    transport: Arc<dyn Transport>,
    builder: RequestBuilder,
    queue: Arc<OperationQueue>,
    destination: RemotePath,
    chunks: Vec<ChunkDescriptor>,
    total_bytes: u64,
    token: CancellationToken,
}

impl ChunkUploadCoordinator {
    /// Builds a coordinator over a validated chunk sequence. The sequence
    /// must be a gap-free total order starting at index 0, because chunk
    /// identifiers are positional and reassembly depends on them.
    pub fn new(
        transport: Arc<dyn Transport>,
        builder: RequestBuilder,
        queue: Arc<OperationQueue>,
        destination: RemotePath,
        chunks: Vec<ChunkDescriptor>,
        token: CancellationToken,
    ) -> TransferResult<Self> {
        for (position, chunk) in chunks.iter().enumerate() {
            if chunk.index != position {
                return Err(TransferError::InvalidPath {
                    path: destination.as_str().to_string(),
                    reason: format!(
                        "chunk sequence has a gap: expected index {position}, found {}",
                        chunk.index
                    ),
                });
            }
        }

        let total_bytes = chunks.iter().map(|c| c.size).sum();
        Ok(Self {
            transport,
            builder,
            queue,
            destination,
            chunks,
            total_bytes,
            token,
        })
    }

    /// Handle for cancelling this upload. Cancelling halts further chunk
    /// submission and cancels the in-flight chunk; chunks already
    /// acknowledged stay uploaded.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Uploads chunks `start_index..`, strictly in order.
    ///
    /// Progress is cumulative across the whole file: bytes of chunks before
    /// `start_index` count as already transferred, and the final callback
    /// reports the file total.
    pub async fn run(
        &self,
        source: &mut dyn ChunkSource,
        start_index: usize,
        progress: Option<ProgressFn>,
    ) -> Result<(), ChunkUploadError> {
        if start_index > self.chunks.len() {
            return Err(self.fail(
                start_index,
                TransferError::InvalidPath {
                    path: self.destination.as_str().to_string(),
                    reason: format!(
                        "start index {start_index} is past the last chunk ({})",
                        self.chunks.len()
                    ),
                },
            ));
        }

        let mut cumulative: u64 = self.chunks[..start_index].iter().map(|c| c.size).sum();

        info!(
            "⬆️ Uploading {} in {} chunks ({} bytes), starting at chunk {}",
            self.destination,
            self.chunks.len(),
            self.total_bytes,
            start_index
        );

        for chunk in &self.chunks[start_index..] {
            // Cancellation is observed here, before each chunk is issued,
            // and inside the transfer while it is in flight.
            if self.token.is_cancelled() {
                return Err(self.fail(chunk.index, TransferError::Cancelled));
            }

            debug!(
                "⬆️ Chunk {}/{} of {} -> {} ({} bytes)",
                chunk.index + 1,
                self.chunks.len(),
                self.destination,
                chunk.remote_path,
                chunk.size
            );

            // Exactly one ChunkInputStream open at a time; this one is
            // dropped with the request whether the chunk succeeds or fails.
            let stream = source
                .open(chunk)
                .await
                .map_err(|e| self.fail(chunk.index, e))?;
            let body = stream.into_body(cumulative, self.total_bytes, progress.clone());
            let request = self
                .builder
                .put_chunk(&chunk.remote_path, body)
                .map_err(|e| self.fail(chunk.index, e))?;

            let operation = TransferOperation::new(request).with_cancellation(self.token.child_token());
            self.queue
                .run(operation.run(self.transport.as_ref()))
                .await
                .map_err(|e| self.fail(chunk.index, e))?;

            cumulative += chunk.size;
            if let Some(callback) = &progress {
                callback(cumulative, Some(self.total_bytes));
            }
        }

        info!(
            "✅ Upload of {} complete ({} chunks, {} bytes)",
            self.destination,
            self.chunks.len(),
            self.total_bytes
        );
        Ok(())
    }

    fn fail(&self, chunk_index: usize, source: TransferError) -> ChunkUploadError {
        if !source.is_cancelled() {
            warn!(
                "❌ Upload of {} halted at chunk {}: {}",
                self.destination, chunk_index, source
            );
        }
        ChunkUploadError {
            destination: self.destination.clone(),
            chunk_index,
            source,
        }
    }
}
