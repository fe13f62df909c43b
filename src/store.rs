// src/store.rs

use crate::digest::Digester;
use crate::limiter::SpeedLimiter;
use crate::models::Descriptor;
use crate::target::{Content, Target, TransferError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Content-addressed blob store held in memory.
///
/// Every push is verified against the declared size and digest.
#[derive(Debug)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, Arc<[u8]>>>,
    tags: RwLock<HashMap<String, Descriptor>>,
    limiter: SpeedLimiter,
    chunk_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_limiter(SpeedLimiter::unlimited())
    }

    /// Ingests no faster than `limiter` allows.
    pub fn with_limiter(limiter: SpeedLimiter) -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            tags: RwLock::new(HashMap::new()),
            limiter,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub async fn fetch(&self, desc: &Descriptor) -> Option<Arc<[u8]>> {
        self.blobs.read().await.get(&desc.digest).cloned()
    }

    pub async fn resolve(&self, reference: &str) -> Option<Descriptor> {
        self.tags.read().await.get(reference).cloned()
    }

    /// Points `reference` at an already stored blob.
    pub async fn tag(&self, desc: &Descriptor, reference: &str) -> Result<(), TransferError> {
        if !self.blobs.read().await.contains_key(&desc.digest) {
            return Err(TransferError::NotFound(desc.digest.clone()));
        }
        self.tags
            .write()
            .await
            .insert(reference.to_string(), desc.clone());
        tracing::debug!("MemoryStore: tagged {} as {}", desc.digest, reference);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn ingest(
        &self,
        expected: &Descriptor,
        content: Content<'_>,
    ) -> Result<Arc<[u8]>, TransferError> {
        let mut data = Vec::with_capacity(expected.size.min(64 * 1024 * 1024) as usize);
        let mut digester = Digester::new();
        let mut chunk = vec![0u8; self.chunk_size];

        loop {
            let n = content.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            self.limiter.take(n as u64).await;
            digester.update(&chunk[..n]);
            data.extend_from_slice(&chunk[..n]);
        }

        if data.len() as u64 != expected.size {
            return Err(TransferError::SizeMismatch {
                expected: expected.size,
                actual: data.len() as u64,
            });
        }
        let actual = digester.finish();
        if actual != expected.digest {
            return Err(TransferError::DigestMismatch {
                expected: expected.digest.clone(),
                actual,
            });
        }
        Ok(data.into())
    }
}

#[async_trait]
impl Target for MemoryStore {
    async fn push(&self, expected: &Descriptor, content: Content<'_>) -> Result<(), TransferError> {
        if self.exists(expected).await? {
            return Err(TransferError::AlreadyExists(expected.digest.clone()));
        }
        let data = self.ingest(expected, content).await?;
        self.blobs
            .write()
            .await
            .insert(expected.digest.clone(), data);
        tracing::debug!("MemoryStore: stored {} ({} bytes)", expected.digest, expected.size);
        Ok(())
    }

    async fn push_reference(
        &self,
        expected: &Descriptor,
        content: Content<'_>,
        reference: &str,
    ) -> Result<(), TransferError> {
        let data = self.ingest(expected, content).await?;
        self.blobs
            .write()
            .await
            .entry(expected.digest.clone())
            .or_insert(data);
        self.tag(expected, reference).await
    }

    async fn exists(&self, target: &Descriptor) -> Result<bool, TransferError> {
        Ok(self.blobs.read().await.contains_key(&target.digest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::sha256_bytes;

    fn describe(data: &[u8]) -> Descriptor {
        Descriptor::new("application/octet-stream", sha256_bytes(data), data.len() as u64)
    }

    #[tokio::test]
    async fn stores_verified_blobs() {
        let store = MemoryStore::new().with_chunk_size(3);
        let desc = describe(b"hello world");

        store.push(&desc, &mut &b"hello world"[..]).await.unwrap();
        assert!(store.exists(&desc).await.unwrap());
        assert_eq!(&*store.fetch(&desc).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn rejects_duplicate_pushes() {
        let store = MemoryStore::new();
        let desc = describe(b"abc");
        store.push(&desc, &mut &b"abc"[..]).await.unwrap();

        let err = store.push(&desc, &mut &b"abc"[..]).await.unwrap_err();
        assert!(matches!(err, TransferError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn rejects_size_and_digest_mismatches() {
        let store = MemoryStore::new();

        let mut desc = describe(b"abc");
        desc.size = 4;
        let err = store.push(&desc, &mut &b"abc"[..]).await.unwrap_err();
        assert!(matches!(err, TransferError::SizeMismatch { expected: 4, actual: 3 }));

        let desc = describe(b"abc");
        let err = store.push(&desc, &mut &b"abd"[..]).await.unwrap_err();
        assert!(matches!(err, TransferError::DigestMismatch { .. }));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn push_reference_tags_the_blob() {
        let store = MemoryStore::new();
        let desc = describe(b"{}");
        store
            .push_reference(&desc, &mut &b"{}"[..], "latest")
            .await
            .unwrap();
        assert_eq!(store.resolve("latest").await, Some(desc));
    }

    #[tokio::test]
    async fn tagging_unknown_blob_fails() {
        let store = MemoryStore::new();
        let err = store.tag(&describe(b"nope"), "latest").await.unwrap_err();
        assert!(matches!(err, TransferError::NotFound(_)));
    }
}
