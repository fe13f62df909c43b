// src/target.rs

use crate::manager::{Manager, ManagerError};
use crate::models::{Descriptor, Prompts};
use crate::reader::TrackedReader;
use crate::status::Message;
use async_trait::async_trait;
use std::io;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Byte stream handed to a [`Target`].
pub type Content<'a> = &'a mut (dyn AsyncRead + Send + Unpin);

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}: already exists")]
    AlreadyExists(String),
    #[error("{0}: not found")]
    NotFound(String),
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },
    #[error("progress tracking failed: {0}")]
    Tracking(#[from] ManagerError),
}

/// Destination of content pushes.
#[async_trait]
pub trait Target: Send + Sync {
    async fn push(&self, expected: &Descriptor, content: Content<'_>) -> Result<(), TransferError>;

    /// Pushes `content` and points `reference` at it.
    async fn push_reference(
        &self,
        expected: &Descriptor,
        content: Content<'_>,
        reference: &str,
    ) -> Result<(), TransferError>;

    async fn exists(&self, target: &Descriptor) -> Result<bool, TransferError>;
}

/// A [`Target`] that draws one tracked line per push.
pub struct TrackedStore<T> {
    inner: T,
    manager: Manager,
    prompts: Prompts,
}

/// Wraps `target` so every push is tracked by `manager`.
pub fn wrap<T: Target>(target: T, manager: Manager, prompts: Prompts) -> TrackedStore<T> {
    TrackedStore::new(target, manager, prompts)
}

impl<T: Target> TrackedStore<T> {
    pub fn new(inner: T, manager: Manager, prompts: Prompts) -> Self {
        Self {
            inner,
            manager,
            prompts,
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn prompts(&self) -> &Prompts {
        &self.prompts
    }

    /// Shows a completed line for `desc` without transferring anything.
    pub async fn prompt(&self, desc: &Descriptor, prompt: &str) -> Result<(), ManagerError> {
        let mut handle = self.manager.register().await?;
        handle
            .deliver(Message::progress(prompt, desc.clone(), desc.size))
            .await;
        handle.deliver(Message::end()).await;
        Ok(())
    }

    pub async fn report_exists(&self, desc: &Descriptor) -> Result<(), ManagerError> {
        self.prompt(desc, &self.prompts.exists).await
    }

    pub async fn report_skipped(&self, desc: &Descriptor) -> Result<(), ManagerError> {
        self.prompt(desc, &self.prompts.skipped).await
    }

    pub async fn report_tagged(&self, desc: &Descriptor) -> Result<(), ManagerError> {
        self.prompt(desc, &self.prompts.tagged).await
    }

    /// Stops the underlying manager; see [`Manager::stop`].
    pub async fn stop(&self) -> Result<(), ManagerError> {
        self.manager.stop().await
    }

    async fn tracked_reader<'a>(
        &self,
        expected: &Descriptor,
        content: Content<'a>,
    ) -> Result<TrackedReader<Content<'a>>, TransferError> {
        let handle = self.manager.register().await?;
        Ok(TrackedReader::new(
            content,
            expected.clone(),
            self.prompts.clone(),
            handle,
        ))
    }
}

#[async_trait]
impl<T: Target> Target for TrackedStore<T> {
    async fn push(&self, expected: &Descriptor, content: Content<'_>) -> Result<(), TransferError> {
        let mut reader = self.tracked_reader(expected, content).await?;
        // On error the reader is dropped without a done marker, leaving the
        // last good progress on screen.
        self.inner.push(expected, &mut reader).await?;
        reader.finish().await;
        Ok(())
    }

    async fn push_reference(
        &self,
        expected: &Descriptor,
        content: Content<'_>,
        reference: &str,
    ) -> Result<(), TransferError> {
        let mut reader = self.tracked_reader(expected, content).await?;
        self.inner
            .push_reference(expected, &mut reader, reference)
            .await?;
        reader.finish().await;
        Ok(())
    }

    async fn exists(&self, target: &Descriptor) -> Result<bool, TransferError> {
        self.inner.exists(target).await
    }
}
