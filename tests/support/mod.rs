#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};
use trackline::console::{Surface, TerminalSize};

/// Everything a [`RecordingSurface`] was asked to draw.
#[derive(Debug, Default)]
pub struct Recording {
    pub saved: bool,
    pub restored: bool,
    pub reserved: usize,
    /// Latest text per row, counted from the top of the tracked region.
    pub rows: BTreeMap<usize, String>,
    pub writes: usize,
    pub failed_writes: usize,
}

impl Recording {
    pub fn row(&self, index: usize) -> Option<&str> {
        self.rows.get(&index).map(String::as_str)
    }
}

/// In-memory terminal that records rows instead of emitting escape codes.
#[derive(Clone)]
pub struct RecordingSurface {
    size: TerminalSize,
    // Number of writes to reject before succeeding; `usize::MAX` rejects all.
    fail_writes: usize,
    fail_restore: bool,
    state: Arc<Mutex<Recording>>,
}

impl RecordingSurface {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            size: TerminalSize::new(width, height),
            fail_writes: 0,
            fail_restore: false,
            state: Arc::default(),
        }
    }

    pub fn failing(self) -> Self {
        self.fail_first(usize::MAX)
    }

    /// Rejects the first `n` row writes, then behaves normally.
    pub fn fail_first(mut self, n: usize) -> Self {
        self.fail_writes = n;
        self
    }

    pub fn failing_restore(mut self) -> Self {
        self.fail_restore = true;
        self
    }

    pub fn recording(&self) -> std::sync::MutexGuard<'_, Recording> {
        self.state.lock().unwrap()
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> TerminalSize {
        self.size
    }

    fn save(&mut self) -> io::Result<()> {
        self.recording().saved = true;
        Ok(())
    }

    fn new_row(&mut self) -> io::Result<()> {
        self.recording().reserved += 1;
        Ok(())
    }

    fn output_at(&mut self, from_bottom: usize, text: &str) -> io::Result<()> {
        let mut rec = self.recording();
        if rec.failed_writes < self.fail_writes {
            rec.failed_writes += 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal went away"));
        }
        if from_bottom == 0 || from_bottom > rec.reserved {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("row {from_bottom} is outside the reserved region"),
            ));
        }
        let row = rec.reserved - from_bottom;
        rec.rows.insert(row, text.to_string());
        rec.writes += 1;
        Ok(())
    }

    fn restore(&mut self) -> io::Result<()> {
        if self.fail_restore {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "terminal went away"));
        }
        self.recording().restored = true;
        Ok(())
    }
}
