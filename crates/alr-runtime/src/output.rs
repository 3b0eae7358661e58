//! Output cache and deferred writers
//!
//! Outputs are cached by `(artifact, content hash, output type, format)`.
//! Any data write changes the hash, so stale entries are never hit; moka's
//! size bound drops them eventually.

use alr_core::{ArtifactId, ContentHash};
use moka::future::Cache;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Cache key of one produced output
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputKey {
    artifact: ArtifactId,
    hash: ContentHash,
    output_type: String,
    format: String,
}

impl OutputKey {
    /// Key for one rendering of one content hash
    pub fn new(artifact: ArtifactId, hash: ContentHash, output_type: &str, format: &str) -> Self {
        Self {
            artifact,
            hash,
            output_type: output_type.to_string(),
            format: format.to_string(),
        }
    }
}

/// Produced outputs, shared across calls
#[derive(Debug, Clone)]
pub struct OutputCache {
    inner: Cache<OutputKey, Arc<[u8]>>,
}

impl OutputCache {
    /// Cache bounded to `max_capacity` bytes
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Cached bytes for `key`
    pub async fn get(&self, key: &OutputKey) -> Option<Arc<[u8]>> {
        self.inner.get(key).await
    }

    /// Cache `bytes` under `key`
    pub async fn insert(&self, key: OutputKey, bytes: Arc<[u8]>) {
        self.inner.insert(key, bytes).await;
    }

    /// Approximate; moka applies writes lazily
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

/// An output ready to be streamed to a sink
#[derive(Debug, Clone)]
pub struct OutputWriter {
    bytes: Arc<[u8]>,
    from_cache: bool,
}

impl OutputWriter {
    pub(crate) fn new(bytes: Arc<[u8]>, from_cache: bool) -> Self {
        Self { bytes, from_cache }
    }

    /// Whether the behavior was skipped
    #[inline]
    #[must_use]
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    /// Rendered bytes
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the rendering is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Write the whole output and flush, returning the byte count
    ///
    /// # Errors
    /// Any I/O error from `sink`.
    pub async fn write_to<W>(&self, sink: &mut W) -> std::io::Result<usize>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        sink.write_all(&self.bytes).await?;
        sink.flush().await?;
        Ok(self.bytes.len())
    }
}
