use std::io::SeekFrom;
use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::error::{TransferError, TransferResult};
use crate::path::{chunk_remote_path, RemotePath};
use crate::request::RequestBody;
use crate::transfer::ProgressFn;

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;

/// One piece of a file being uploaded: its position in the sequence and the
/// remote location it is delivered to. Immutable; descriptors for one file
/// form a gap-free total order by index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDescriptor {
    pub index: usize,
    pub offset: u64,
    pub size: u64,
    pub remote_path: RemotePath,
}

/// Splits a file of `total_size` bytes into the ordered chunk sequence for
/// an upload to `destination`.
///
/// Chunk remote paths are a pure function of the destination and the index,
/// so a resumed attempt targets the exact same locations. A zero-byte file
/// still gets one (empty) chunk so the remote file is created.
pub fn plan_chunks(destination: &RemotePath, total_size: u64, chunk_size: u64) -> Vec<ChunkDescriptor> {
    let chunk_size = if chunk_size == 0 { DEFAULT_CHUNK_SIZE } else { chunk_size };
    let count = (total_size.div_ceil(chunk_size)).max(1) as usize;

    (0..count)
        .map(|index| {
            let offset = index as u64 * chunk_size;
            ChunkDescriptor {
                index,
                offset,
                size: (total_size - offset).min(chunk_size),
                remote_path: chunk_remote_path(destination, count, index),
            }
        })
        .collect()
}

/// A byte source bound to exactly one chunk: a reader plus the number of
/// bytes it will yield. Owned by the upload coordinator for the duration of
/// that chunk's transfer and dropped as soon as the chunk finishes, whatever
/// the outcome.
pub struct ChunkInputStream {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    len: u64,
}

impl std::fmt::Debug for ChunkInputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkInputStream")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl ChunkInputStream {
    pub fn new(reader: Box<dyn AsyncRead + Send + Unpin>, len: u64) -> Self {
        Self { reader, len }
    }

    pub fn from_bytes(data: bytes::Bytes) -> Self {
        let len = data.len() as u64;
        Self::new(Box::new(std::io::Cursor::new(data)), len)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Turns the stream into a request body that reports cumulative progress
    /// as it is consumed: every frame adds to `base` and reports against
    /// `total`, keeping multi-chunk progress monotonic across boundaries.
    pub(crate) fn into_body(self, base: u64, total: u64, progress: Option<ProgressFn>) -> RequestBody {
        let len = self.len;
        let mut sent: u64 = 0;
        let stream = ReaderStream::new(self.reader)
            .map(move |frame| {
                if let Ok(bytes) = &frame {
                    sent += bytes.len() as u64;
                    if let Some(callback) = &progress {
                        callback(base + sent, Some(total));
                    }
                }
                frame
            })
            .boxed();
        RequestBody::Stream { len, stream }
    }
}

/// Capability that opens the byte source for a chunk. The coordinator calls
/// it once per chunk and never holds two open streams at a time.
#[async_trait]
pub trait ChunkSource: Send {
    async fn open(&mut self, chunk: &ChunkDescriptor) -> TransferResult<ChunkInputStream>;
}

/// Chunk source backed by a local file: seek to the chunk's offset, read its
/// length. Local I/O failures are reported as recoverable — re-reading the
/// chunk is a legitimate retry.
pub struct FileChunkSource {
    path: PathBuf,
}

impl FileChunkSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ChunkSource for FileChunkSource {
    async fn open(&mut self, chunk: &ChunkDescriptor) -> TransferResult<ChunkInputStream> {
        let mut file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            TransferError::recoverable(format!("cannot open {}: {e}", self.path.display()))
        })?;
        file.seek(SeekFrom::Start(chunk.offset)).await.map_err(|e| {
            TransferError::recoverable(format!("cannot seek {}: {e}", self.path.display()))
        })?;
        let reader = file.take(chunk.size);
        Ok(ChunkInputStream::new(Box::new(reader), chunk.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_plan_chunks_covers_file_without_gaps() {
        let dest = RemotePath::new("/big.bin").unwrap();
        let chunks = plan_chunks(&dest, 2_500_000, 1_000_000);

        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[0].size, 1_000_000);
        assert_eq!(chunks[1].offset, 1_000_000);
        assert_eq!(chunks[2].offset, 2_000_000);
        assert_eq!(chunks[2].size, 500_000);
        assert_eq!(chunks.iter().map(|c| c.size).sum::<u64>(), 2_500_000);

        assert_eq!(chunks[0].remote_path.as_str(), "/big.bin-chunking-3-0");
        assert_eq!(chunks[2].remote_path.as_str(), "/big.bin-chunking-3-2");
    }

    #[test]
    fn test_plan_chunks_zero_byte_file() {
        let dest = RemotePath::new("/empty.txt").unwrap();
        let chunks = plan_chunks(&dest, 0, 1024);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].size, 0);
    }

    #[test]
    fn test_plan_chunks_default_size() {
        let dest = RemotePath::new("/f").unwrap();
        let chunks = plan_chunks(&dest, DEFAULT_CHUNK_SIZE * 2, 0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_plan_chunks_is_reproducible() {
        let dest = RemotePath::new("/same.bin").unwrap();
        let first = plan_chunks(&dest, 10_000, 3_000);
        let again = plan_chunks(&dest, 10_000, 3_000);
        assert_eq!(first, again);
    }

    #[tokio::test]
    async fn test_file_chunk_source_reads_the_right_window() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();

        let dest = RemotePath::new("/window.bin").unwrap();
        let chunks = plan_chunks(&dest, 10, 4);
        let mut source = FileChunkSource::new(tmp.path());

        let stream = source.open(&chunks[1]).await.unwrap();
        assert_eq!(stream.len(), 4);
        let mut reader = stream.reader;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(&out, b"4567");
    }

    #[tokio::test]
    async fn test_file_chunk_source_missing_file_is_recoverable() {
        let dest = RemotePath::new("/gone.bin").unwrap();
        let chunks = plan_chunks(&dest, 10, 4);
        let mut source = FileChunkSource::new("/definitely/not/here.bin");
        let err = source.open(&chunks[0]).await.unwrap_err();
        assert!(err.is_recoverable());
    }
}
