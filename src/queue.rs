use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{TransferError, TransferResult};

/// Bounded execution of transfer operations.
///
/// Permits are handed out FIFO by the semaphore, so waiting operations make
/// progress and cannot starve. Ordering of chunked uploads is not this
/// queue's job: a coordinator only ever submits one chunk at a time, so its
/// order is enforced upstream.
pub struct OperationQueue {
    permits: Arc<Semaphore>,
}

impl OperationQueue {
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_in_flight)),
        }
    }

    /// Runs a transfer future in place under the concurrency bound.
    pub async fn run<T>(&self, fut: impl Future<Output = TransferResult<T>>) -> TransferResult<T> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| TransferError::Cancelled)?;
        fut.await
    }

    /// Spawns a transfer future under the concurrency bound and returns a
    /// handle that can cancel it.
    pub fn submit<T, F>(&self, token: CancellationToken, fut: F) -> QueuedOperation<T>
    where
        T: Send + 'static,
        F: Future<Output = TransferResult<T>> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| TransferError::Cancelled)?;
            tokio::select! {
                _ = task_token.cancelled() => Err(TransferError::Cancelled),
                result = fut => result,
            }
        });

        QueuedOperation { handle, token }
    }
}

/// Cancel-by-handle for a spawned operation.
pub struct QueuedOperation<T> {
    handle: JoinHandle<TransferResult<T>>,
    token: CancellationToken,
}

impl<T> QueuedOperation<T> {
    /// Requests cancellation. Cooperative: the operation resolves
    /// `Cancelled` at its next suspension point.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits for the operation's single terminal outcome.
    pub async fn join(self) -> TransferResult<T> {
        self.handle.await.map_err(|_| TransferError::Cancelled)?
    }
}
