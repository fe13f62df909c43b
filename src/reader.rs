// src/reader.rs

use crate::manager::Handle;
use crate::models::{Descriptor, Prompts};
use crate::status::Message;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// The start marker has not been queued yet.
    Pending,
    Reading,
    /// Source exhausted at the declared size; the final offset is being queued.
    Flushing,
    Exhausted,
}

/// Reports the progress of reads from `inner` to a tracked line.
///
/// Intermediate offsets are best effort. The start marker and the final
/// offset wait for queue capacity, so they are never dropped.
pub struct TrackedReader<R> {
    inner: R,
    descriptor: Descriptor,
    prompts: Prompts,
    handle: Handle,
    offset: u64,
    phase: Phase,
}

impl<R> TrackedReader<R> {
    pub fn new(inner: R, descriptor: Descriptor, prompts: Prompts, handle: Handle) -> Self {
        Self {
            inner,
            descriptor,
            prompts,
            handle,
            offset: 0,
            phase: Phase::Pending,
        }
    }

    /// Bytes read so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Marks the transfer as done and releases the tracked line.
    pub async fn finish(mut self) {
        let done = Message::progress(
            self.prompts.done.clone(),
            self.descriptor.clone(),
            self.descriptor.size,
        );
        self.handle.deliver(done).await;
        self.handle.deliver(Message::end()).await;
    }

    fn progress(&self, offset: u64) -> Message {
        Message::progress(self.prompts.action.clone(), self.descriptor.clone(), offset)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for TrackedReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.phase == Phase::Pending {
            ready!(this.handle.poll_deliver(cx, Message::start));
            this.phase = Phase::Reading;
        }

        if this.phase == Phase::Reading {
            let had_room = buf.remaining() > 0;
            let before = buf.filled().len();
            ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
            let n = buf.filled().len() - before;

            if n > 0 || !had_room {
                this.offset += n as u64;
                this.handle.offer(this.progress(this.offset));
                return Poll::Ready(Ok(()));
            }

            if this.offset != this.descriptor.size {
                tracing::debug!(
                    "TrackedReader: {} ended after {} of {} bytes",
                    this.descriptor.digest,
                    this.offset,
                    this.descriptor.size
                );
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "unexpected end of stream",
                )));
            }
            this.phase = Phase::Flushing;
        }

        if this.phase == Phase::Flushing {
            let size = this.descriptor.size;
            let msg = this.progress(size);
            ready!(this.handle.poll_deliver(cx, move || msg));
            this.phase = Phase::Exhausted;
        }

        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerOptions;
    use crate::console::{Surface, TerminalSize};
    use crate::manager::Manager;
    use tokio::io::AsyncReadExt;

    struct NullSurface;

    impl Surface for NullSurface {
        fn size(&self) -> TerminalSize {
            TerminalSize::default()
        }
        fn save(&mut self) -> io::Result<()> {
            Ok(())
        }
        fn new_row(&mut self) -> io::Result<()> {
            Ok(())
        }
        fn output_at(&mut self, _: usize, _: &str) -> io::Result<()> {
            Ok(())
        }
        fn restore(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn manager() -> Manager {
        Manager::with_surface(NullSurface, ManagerOptions::default()).unwrap()
    }

    fn blob(len: usize) -> (Vec<u8>, Descriptor) {
        let data = vec![7u8; len];
        let desc = Descriptor::new("application/octet-stream", "sha256:test", len as u64);
        (data, desc)
    }

    #[tokio::test]
    async fn reads_through_and_reports_final_offset() {
        let manager = manager();
        let (data, desc) = blob(10_000);
        let handle = manager.register().await.unwrap();
        let mut reader = TrackedReader::new(&data[..], desc.clone(), Prompts::push(), handle);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, data);
        assert_eq!(reader.offset(), 10_000);
        assert_eq!(reader.descriptor(), &desc);
        drop(reader);

        manager.stop().await.unwrap();
        let lines = manager.snapshot().await;
        assert_eq!(lines[0].transferred(), 10_000);
        assert_eq!(lines[0].prompt(), "Uploading");
        assert!(lines[0].started_at().is_some());
        assert!(!lines[0].is_done());
    }

    #[tokio::test]
    async fn short_stream_is_an_error_and_never_completes() {
        let manager = manager();
        let (data, mut desc) = blob(100);
        desc.size = 150;
        let handle = manager.register().await.unwrap();
        let mut reader = TrackedReader::new(&data[..], desc, Prompts::push(), handle);

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(err.to_string(), "unexpected end of stream");
        drop(reader);

        manager.stop().await.unwrap();
        let lines = manager.snapshot().await;
        assert!(!lines[0].is_done());
        assert!(lines[0].ended_at().is_none());
        assert!(lines[0].transferred() <= 100);
    }

    #[tokio::test]
    async fn long_stream_is_an_error() {
        let manager = manager();
        let (data, mut desc) = blob(100);
        desc.size = 60;
        let handle = manager.register().await.unwrap();
        let mut reader = TrackedReader::new(&data[..], desc, Prompts::push(), handle);

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        drop(reader);
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn finish_marks_line_done() {
        let manager = manager();
        let (data, desc) = blob(64);
        let handle = manager.register().await.unwrap();
        let mut reader = TrackedReader::new(&data[..], desc, Prompts::push(), handle);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        reader.finish().await;

        manager.stop().await.unwrap();
        let line = &manager.snapshot().await[0];
        assert!(line.is_done());
        assert_eq!(line.prompt(), "Uploaded");
        assert_eq!(line.percent(), 100.0);
    }

    #[tokio::test]
    async fn empty_blob_completes_at_full_percent() {
        let manager = manager();
        let (data, desc) = blob(0);
        let handle = manager.register().await.unwrap();
        let mut reader = TrackedReader::new(&data[..], desc, Prompts::push(), handle);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        drop(reader);

        manager.stop().await.unwrap();
        assert_eq!(manager.snapshot().await[0].percent(), 100.0);
    }

    #[tokio::test]
    async fn final_offset_survives_a_saturated_queue() {
        let manager = Manager::with_surface(
            NullSurface,
            ManagerOptions::default().with_queue_capacity(1),
        )
        .unwrap();
        let (data, desc) = blob(50_000);
        let handle = manager.register().await.unwrap();
        let mut reader = TrackedReader::new(&data[..], desc, Prompts::push(), handle);

        let mut chunk = [0u8; 7];
        loop {
            let n = reader.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
        }
        drop(reader);

        manager.stop().await.unwrap();
        assert_eq!(manager.snapshot().await[0].transferred(), 50_000);
    }
}
