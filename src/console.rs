// src/console.rs

//! Cursor-relative drawing on an interactive terminal.
//!
//! The tracked region sits directly above a saved cursor position (the
//! baseline). Rows are addressed by how far above the baseline they are, so
//! the region keeps working after the terminal scrolls.

use crossterm::{
    cursor::{Hide, MoveToColumn, MoveToPreviousLine, RestorePosition, SavePosition, Show},
    queue,
    style::Print,
    terminal::{self, Clear, ClearType},
};
use std::io::{self, IsTerminal, Write};
use thiserror::Error;

pub const MIN_WIDTH: usize = 80;
pub const MIN_HEIGHT: usize = 10;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("output is not an interactive terminal")]
    NotInteractive,
    #[error("terminal write failed: {0}")]
    Io(#[from] io::Error),
}

/// Usable terminal dimensions, never below [`MIN_WIDTH`] x [`MIN_HEIGHT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub width: usize,
    pub height: usize,
}

impl TerminalSize {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width: width.max(MIN_WIDTH),
            height: height.max(MIN_HEIGHT),
        }
    }

    /// Queries the terminal, substituting the minimums when it can't answer.
    pub fn detect() -> Self {
        match terminal::size() {
            Ok((cols, rows)) => Self::new(cols as usize, rows as usize),
            Err(e) => {
                tracing::debug!("terminal size unavailable, using minimums: {}", e);
                Self::new(0, 0)
            }
        }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::new(MIN_WIDTH, MIN_HEIGHT)
    }
}

/// The drawing primitives the tracking manager needs.
pub trait Surface: Send {
    fn size(&self) -> TerminalSize;

    /// Remembers the current cursor position as the baseline.
    fn save(&mut self) -> io::Result<()>;

    /// Reserves one more row above the baseline, scrolling if needed.
    fn new_row(&mut self) -> io::Result<()>;

    /// Overwrites the row `from_bottom` rows above the baseline.
    fn output_at(&mut self, from_bottom: usize, text: &str) -> io::Result<()>;

    /// Returns to the baseline and clears everything below it.
    fn restore(&mut self) -> io::Result<()>;
}

/// [`Surface`] backed by a real terminal device.
pub struct Console<W: Write> {
    out: W,
}

impl<W: Write + IsTerminal> Console<W> {
    /// Fails fast if `out` is not attached to a terminal.
    pub fn new(out: W) -> Result<Self, ConsoleError> {
        if !out.is_terminal() {
            return Err(ConsoleError::NotInteractive);
        }
        Ok(Self { out })
    }
}

impl<W: Write + Send> Surface for Console<W> {
    fn size(&self) -> TerminalSize {
        TerminalSize::detect()
    }

    fn save(&mut self) -> io::Result<()> {
        queue!(self.out, Hide, SavePosition)?;
        self.out.flush()
    }

    fn new_row(&mut self) -> io::Result<()> {
        queue!(self.out, RestorePosition, Print("\n"), SavePosition)?;
        self.out.flush()
    }

    fn output_at(&mut self, from_bottom: usize, text: &str) -> io::Result<()> {
        // A zero move is read by terminals as one row up.
        if from_bottom == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "row 0 is the baseline, not a tracked row",
            ));
        }
        let up = u16::try_from(from_bottom).unwrap_or(u16::MAX);
        queue!(
            self.out,
            RestorePosition,
            MoveToPreviousLine(up),
            Print(text),
            Clear(ClearType::UntilNewLine)
        )?;
        self.out.flush()
    }

    fn restore(&mut self) -> io::Result<()> {
        queue!(
            self.out,
            RestorePosition,
            MoveToColumn(0),
            Clear(ClearType::FromCursorDown),
            Show
        )?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_is_clamped_to_minimums() {
        assert_eq!(TerminalSize::new(0, 0), TerminalSize::new(MIN_WIDTH, MIN_HEIGHT));
        assert_eq!(TerminalSize::new(120, 5).height, MIN_HEIGHT);
        assert_eq!(TerminalSize::new(120, 40).width, 120);
    }

    #[test]
    fn detect_never_reports_below_minimums() {
        let size = TerminalSize::detect();
        assert!(size.width >= MIN_WIDTH);
        assert!(size.height >= MIN_HEIGHT);
    }

    fn written(console: &mut Console<Vec<u8>>) -> String {
        String::from_utf8(std::mem::take(&mut console.out)).unwrap()
    }

    #[test]
    fn primitives_emit_cursor_relative_sequences() {
        let mut console = Console { out: Vec::new() };

        console.save().unwrap();
        assert_eq!(written(&mut console), "\x1b[?25l\x1b7");

        console.new_row().unwrap();
        assert_eq!(written(&mut console), "\x1b8\n\x1b7");

        console.output_at(1, "hi").unwrap();
        assert_eq!(written(&mut console), "\x1b8\x1b[1Fhi\x1b[K");

        console.output_at(12, "deep").unwrap();
        assert_eq!(written(&mut console), "\x1b8\x1b[12Fdeep\x1b[K");

        console.restore().unwrap();
        assert_eq!(written(&mut console), "\x1b8\x1b[1G\x1b[J\x1b[?25h");
    }

    #[test]
    fn baseline_row_is_never_addressed() {
        let mut console = Console { out: Vec::new() };
        let err = console.output_at(0, "nope").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(!written(&mut console).contains("\x1b[0F"));
    }

    #[test]
    fn redirected_output_is_rejected() {
        let path = std::env::temp_dir().join(format!("trackline-console-{}", std::process::id()));
        let file = std::fs::File::create(&path).unwrap();
        assert!(matches!(Console::new(file), Err(ConsoleError::NotInteractive)));
        let _ = std::fs::remove_file(&path);
    }
}
