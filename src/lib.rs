//! Client-side WebDAV transfer engine: collection listing over PROPFIND,
//! namespace operations (MKCOL, COPY, MOVE, DELETE), whole-file GET/PUT,
//! and resumable chunked uploads, with cooperative cancellation and
//! cumulative progress reporting throughout.
//!
//! [`DavClient`] is the entry point; one per server session.

pub mod chunk;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod multistatus;
pub mod path;
pub mod queue;
pub mod request;
pub mod transfer;
pub mod transport;
pub mod upload;

pub use chunk::{
    plan_chunks, ChunkDescriptor, ChunkInputStream, ChunkSource, FileChunkSource,
    DEFAULT_CHUNK_SIZE,
};
pub use client::DavClient;
pub use config::{ConcurrencyConfig, DavConfig, ServerType};
pub use credentials::{CredentialStore, Credentials, StaticCredentials};
pub use error::{ChunkUploadError, TransferError, TransferResult};
pub use multistatus::{parse_multistatus, PropertyRecord, ResourceEntry, ResourceTree};
pub use path::{chunk_remote_path, RemotePath};
pub use queue::{OperationQueue, QueuedOperation};
pub use request::{Depth, DavRequest, RequestBody, RequestBuilder};
pub use transfer::{ProgressFn, TransferOperation, TransferPayload};
pub use transport::{HttpTransport, Transport, TransportResponse};
pub use upload::ChunkUploadCoordinator;
