// src/manager.rs

use crate::config::ManagerOptions;
use crate::console::{Console, ConsoleError, Surface};
use crate::status::{Delivery, Message, StatusLine, ROWS_PER_LINE};
use futures_util::future::poll_fn;
use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, Weak};
use std::task::{ready, Context, Poll};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, PollSender};
use tokio_util::task::TaskTracker;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("terminal unavailable: {0}")]
    Console(#[from] ConsoleError),
    #[error("progress manager has already been stopped")]
    Stopped,
    #[error("terminal write failed: {0}")]
    Io(#[from] io::Error),
    #[error("rendering failed: {0}")]
    Render(io::Error),
    #[error("no tokio runtime to run the render worker on")]
    NoRuntime,
}

type Slots = Arc<RwLock<Vec<StatusLine>>>;

/// Owns the terminal region and every tracked line drawn into it.
///
/// Cloning is cheap; all clones drive the same region. Exactly one
/// [`Manager::stop`] call must follow once every [`Handle`] is dropped.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<Inner>,
}

struct Inner {
    surface: Mutex<Box<dyn Surface>>,
    slots: Slots,
    options: ManagerOptions,
    updaters: TaskTracker,
    // Cancelled by `stop` to end periodic rendering.
    ticking: CancellationToken,
    // Cancelled once every update worker has exited.
    drained: CancellationToken,
    renderer: std::sync::Mutex<Option<JoinHandle<()>>>,
    fault: std::sync::Mutex<Option<io::Error>>,
    stopped: AtomicBool,
}

impl Manager {
    /// Takes over `device`, which must be an interactive terminal.
    ///
    /// Fails with [`ManagerError::NoRuntime`] outside a tokio runtime.
    pub fn new<W>(device: W) -> Result<Self, ManagerError>
    where
        W: Write + IsTerminal + Send + 'static,
    {
        Self::with_options(device, ManagerOptions::default())
    }

    pub fn with_options<W>(device: W, options: ManagerOptions) -> Result<Self, ManagerError>
    where
        W: Write + IsTerminal + Send + 'static,
    {
        let console = Console::new(device)?;
        Self::with_surface(console, options)
    }

    /// Starts tracking on an arbitrary surface.
    pub fn with_surface<S>(mut surface: S, options: ManagerOptions) -> Result<Self, ManagerError>
    where
        S: Surface + 'static,
    {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ManagerError::NoRuntime)?;
        let options = options.normalized();
        surface.save()?;

        let inner = Arc::new(Inner {
            surface: Mutex::new(Box::new(surface)),
            slots: Arc::new(RwLock::new(Vec::new())),
            options,
            updaters: TaskTracker::new(),
            ticking: CancellationToken::new(),
            drained: CancellationToken::new(),
            renderer: std::sync::Mutex::new(None),
            fault: std::sync::Mutex::new(None),
            stopped: AtomicBool::new(false),
        });

        let handle = runtime.spawn(run_renderer(
            Arc::downgrade(&inner),
            inner.options.refresh_interval,
            inner.ticking.clone(),
            inner.drained.clone(),
        ));
        *inner
            .renderer
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        tracing::debug!(
            "Manager: started, refreshing every {:?}",
            inner.options.refresh_interval
        );
        Ok(Self { inner })
    }

    /// Allocates a new tracked line below the existing ones.
    ///
    /// Shares the surface lock with rendering, so it waits for an ongoing
    /// redraw to finish.
    pub async fn register(&self) -> Result<Handle, ManagerError> {
        if self.inner.stopped.load(Ordering::SeqCst) {
            return Err(ManagerError::Stopped);
        }

        // The surface lock is held until the slot exists, so a render pass
        // never sees a slot without its rows or rows without their slot.
        let index = {
            let mut surface = self.inner.surface.lock().await;
            for _ in 0..ROWS_PER_LINE {
                surface.new_row()?;
            }
            let mut slots = self.inner.slots.write().await;
            slots.push(StatusLine::new());
            slots.len() - 1
        };

        let (tx, rx) = mpsc::channel(self.inner.options.queue_capacity);
        self.inner
            .updaters
            .spawn(drain_updates(self.inner.slots.clone(), index, rx));

        tracing::debug!("Manager: registered tracked line {}", index);
        Ok(Handle::new(index, tx))
    }

    /// Paints the final frame and hands the terminal back.
    ///
    /// Waits for every update worker, so all handles must be dropped first.
    pub async fn stop(&self) -> Result<(), ManagerError> {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return Err(ManagerError::Stopped);
        }
        tracing::debug!("Manager: stopping");

        self.inner.ticking.cancel();
        self.inner.updaters.close();
        self.inner.updaters.wait().await;
        self.inner.drained.cancel();

        let renderer = self
            .inner
            .renderer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(renderer) = renderer {
            if let Err(e) = renderer.await {
                tracing::warn!("Manager: render worker ended abnormally: {}", e);
            }
        }

        let fault = self.inner.take_fault();
        let restored = self.inner.surface.lock().await.restore();
        match (fault, restored) {
            (Some(fault), Err(e)) => {
                tracing::warn!("Manager: terminal restore failed: {}", e);
                Err(ManagerError::Render(fault))
            }
            (Some(fault), Ok(())) => Err(ManagerError::Render(fault)),
            (None, Err(e)) => Err(ManagerError::Io(e)),
            (None, Ok(())) => {
                tracing::debug!("Manager: terminal restored");
                Ok(())
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Number of tracked lines registered so far.
    pub async fn len(&self) -> usize {
        self.inner.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Copies the current state of every tracked line, in registration order.
    pub async fn snapshot(&self) -> Vec<StatusLine> {
        self.inner.slots.read().await.clone()
    }
}

impl Inner {
    async fn render(&self) {
        let mut surface = self.surface.lock().await;
        let size = surface.size();
        let count = self.slots.read().await.len();
        let visible = (size.height / ROWS_PER_LINE).min(count);
        let now = Instant::now();

        // Oldest lines that don't fit are skipped entirely.
        for index in (count - visible)..count {
            let (header, sub) = {
                let slots = self.slots.read().await;
                slots[index].render(size.width, now)
            };
            let up = (count - index) * ROWS_PER_LINE;
            let written = surface
                .output_at(up, &header)
                .and_then(|_| surface.output_at(up - 1, &sub));
            if let Err(e) = written {
                self.record_fault(e);
                return;
            }
        }
    }

    fn record_fault(&self, e: io::Error) {
        let mut fault = self.fault.lock().unwrap_or_else(PoisonError::into_inner);
        if fault.is_none() {
            tracing::warn!("Manager: render pass failed, retrying next tick: {}", e);
            *fault = Some(e);
        } else {
            tracing::debug!("Manager: render pass failed again: {}", e);
        }
    }

    fn take_fault(&self) -> Option<io::Error> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

async fn run_renderer(
    inner: Weak<Inner>,
    interval: Duration,
    ticking: CancellationToken,
    drained: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticking.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else { return };
                inner.render().await;
            }
        }
    }

    // The last frame must reflect every message sent before the handles closed.
    drained.cancelled().await;
    if let Some(inner) = inner.upgrade() {
        inner.render().await;
    }
}

async fn drain_updates(slots: Slots, index: usize, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        let mut slots = slots.write().await;
        if let Some(line) = slots.get_mut(index) {
            line.apply(msg);
        }
    }
    tracing::trace!("Manager: tracked line {} closed", index);
}

/// Sending side of one tracked line's queue.
///
/// Dropping the handle tells the manager no more messages will follow.
pub struct Handle {
    index: usize,
    tx: PollSender<Message>,
}

impl Handle {
    fn new(index: usize, tx: mpsc::Sender<Message>) -> Self {
        Self {
            index,
            tx: PollSender::new(tx),
        }
    }

    /// Position of the tracked line in registration order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub async fn send(&mut self, msg: Message, delivery: Delivery) -> bool {
        match delivery {
            Delivery::BestEffort => self.offer(msg),
            Delivery::Guaranteed => self.deliver(msg).await,
        }
    }

    /// Queues `msg` only if there is spare capacity.
    pub fn offer(&self, msg: Message) -> bool {
        let Some(tx) = self.tx.get_ref() else {
            return false;
        };
        match tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::trace!("Manager: queue of line {} full, update dropped", self.index);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Queues `msg`, waiting for capacity if needed.
    pub async fn deliver(&mut self, msg: Message) -> bool {
        if poll_fn(|cx| self.tx.poll_reserve(cx)).await.is_err() {
            return false;
        }
        self.tx.send_item(msg).is_ok()
    }

    /// Poll-based [`Handle::deliver`]; `msg` is only built once a slot is
    /// reserved.
    pub fn poll_deliver(
        &mut self,
        cx: &mut Context<'_>,
        msg: impl FnOnce() -> Message,
    ) -> Poll<bool> {
        match ready!(self.tx.poll_reserve(cx)) {
            Ok(()) => Poll::Ready(self.tx.send_item(msg()).is_ok()),
            Err(_) => Poll::Ready(false),
        }
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle").field("index", &self.index).finish()
    }
}
