// src/status.rs

//! Per-operation display state and its two-line rendering.
//!
//! Header layout, padded so the right segment ends exactly at `width`:
//!
//! ```text
//! [left--------------------------------------][margin][right--------------------------]
//! mark(1) bar(22) prompt name                         transferred/total percent elapsed
//!   └─ digest
//! ```

use crate::models::Descriptor;
use crossterm::style::Stylize;
use std::time::{Duration, Instant};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Number of cells inside the progress bar brackets.
pub const BAR_LENGTH: usize = 20;
/// Terminal rows occupied by one tracked line.
pub const ROWS_PER_LINE: usize = 2;

const SPINNER: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
const SPINNER_FRAME: Duration = Duration::from_millis(100);
const DONE_MARK: char = '✓';
const TRUNCATION_MARK: char = '.';
const SUB_PREFIX: &str = "  └─ ";
const LOADING_STATUS: &str = "loading status...";
const LOADING_DIGEST: &str = "loading digest...";
const ZERO_DURATION: &str = "0s";

/// How hard a sender tries to get a message into a full queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Dropped when the queue has no spare capacity.
    BestEffort,
    /// Waits for capacity; never dropped.
    Guaranteed,
}

/// Bytes transferred so far for a given target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub descriptor: Descriptor,
    pub offset: u64,
}

/// A partial update: only the provided fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Update {
    pub prompt: Option<String>,
    pub position: Option<Position>,
}

/// What travels through a tracked line's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Update(Update),
    StartTiming(Instant),
    /// Marks the line as finished.
    EndTiming(Instant),
}

impl Message {
    pub fn progress(prompt: impl Into<String>, descriptor: Descriptor, offset: u64) -> Self {
        Message::Update(Update {
            prompt: Some(prompt.into()),
            position: Some(Position { descriptor, offset }),
        })
    }

    /// An update that changes the prompt but keeps the recorded progress.
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Message::Update(Update {
            prompt: Some(prompt.into()),
            position: None,
        })
    }

    pub fn start() -> Self {
        Message::StartTiming(Instant::now())
    }

    pub fn end() -> Self {
        Message::EndTiming(Instant::now())
    }
}

/// Transient state of one tracked operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusLine {
    done: bool,
    prompt: String,
    target: Option<Descriptor>,
    transferred: u64,
    started_at: Option<Instant>,
    ended_at: Option<Instant>,
}

impl StatusLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn target(&self) -> Option<&Descriptor> {
        self.target.as_ref()
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<Instant> {
        self.ended_at
    }

    /// Declared size of the target, 0 until a position arrives.
    pub fn total(&self) -> u64 {
        self.target.as_ref().map_or(0, |t| t.size)
    }

    /// Merges `msg` into the line.
    ///
    /// A position overwrites the target and can only move `transferred`
    /// forward, so a late or reordered update never erases progress.
    pub fn apply(&mut self, msg: Message) {
        match msg {
            Message::Update(update) => {
                if let Some(Position { descriptor, offset }) = update.position {
                    self.transferred = self.transferred.max(offset);
                    self.target = Some(descriptor);
                }
                if let Some(prompt) = update.prompt {
                    self.prompt = prompt;
                }
            }
            Message::StartTiming(at) => {
                if self.started_at.is_none() {
                    self.started_at = Some(at);
                }
            }
            Message::EndTiming(at) => {
                if self.ended_at.is_none() {
                    self.ended_at = Some(at);
                }
                self.done = true;
            }
        }
    }

    /// Completion in `0.0..=1.0`. An empty target counts as complete as soon
    /// as any position was recorded.
    pub fn ratio(&self) -> f64 {
        if self.done {
            return 1.0;
        }
        match self.total() {
            _ if self.target.is_none() => 0.0,
            0 => 1.0,
            total => (self.transferred as f64 / total as f64).clamp(0.0, 1.0),
        }
    }

    pub fn percent(&self) -> f64 {
        self.ratio() * 100.0
    }

    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        let started = self.started_at?;
        let until = self.ended_at.unwrap_or(now);
        Some(until.saturating_duration_since(started))
    }

    /// Renders the header and the digest line, each at most `width` columns
    /// wide for any `width` of at least 80.
    pub fn render(&self, width: usize, now: Instant) -> (String, String) {
        let target = match (&self.target, self.done) {
            (Some(target), _) => target.clone(),
            (None, true) => Descriptor::default(),
            (None, false) => {
                let header = format!("{} {}", self.mark(now), LOADING_STATUS);
                let sub = format!("{SUB_PREFIX}{LOADING_DIGEST}");
                return (truncate(&header, width), truncate(&sub, width));
            }
        };

        let ratio = self.ratio();
        let shown = if self.done {
            self.transferred.max(target.size)
        } else {
            self.transferred
        };
        let elapsed = self
            .elapsed(now)
            .map_or_else(|| ZERO_DURATION.to_string(), format_elapsed);
        let right = format!(
            " {}/{} {:6.2}% {}",
            format_bytes(shown),
            format_bytes(target.size),
            ratio * 100.0,
            elapsed
        );

        let (prefix, prefix_width) = if self.done {
            (format!("{DONE_MARK} "), 2)
        } else {
            let filled = ((ratio * BAR_LENGTH as f64) as usize).min(BAR_LENGTH);
            let solid = if filled > 0 {
                " ".repeat(filled).reverse().to_string()
            } else {
                String::new()
            };
            let bar = format!("[{}{}]", solid, ".".repeat(BAR_LENGTH - filled));
            // mark, space, bar with brackets, space
            (format!("{} {} ", self.mark(now), bar), BAR_LENGTH + 5)
        };

        let name = target.display_name();
        let mut text = match (self.prompt.is_empty(), name.is_empty()) {
            (true, _) => name.to_string(),
            (false, true) => self.prompt.clone(),
            (false, false) => format!("{} {}", self.prompt, name),
        };

        let budget = width.saturating_sub(prefix_width + right.width());
        if text.width() > budget {
            text = truncate(&text, budget.saturating_sub(1));
            text.push(TRUNCATION_MARK);
        }
        let margin = budget.saturating_sub(text.width());

        let header = format!("{}{}{}{}", prefix, text, " ".repeat(margin), right);
        let sub = truncate(&format!("{SUB_PREFIX}{}", target.digest), width);
        (header, sub)
    }

    fn mark(&self, now: Instant) -> char {
        if self.done {
            return DONE_MARK;
        }
        let frame = self
            .elapsed(now)
            .map_or(0, |d| (d.as_millis() / SPINNER_FRAME.as_millis()) as usize);
        SPINNER[frame % SPINNER.len()]
    }
}

/// Cuts `text` to at most `max_width` display columns.
fn truncate(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > max_width {
            break;
        }
        used += w;
        out.push(ch);
    }
    out
}

/// Format bytes in human-readable form.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Formats an elapsed time, coarsening the precision as it grows.
pub fn format_elapsed(d: Duration) -> String {
    const MICROSECOND: Duration = Duration::from_micros(1);
    const MILLISECOND: Duration = Duration::from_millis(1);
    const SECOND: Duration = Duration::from_secs(1);
    const MINUTE: Duration = Duration::from_secs(60);

    if d >= MINUTE {
        let secs = round_to(d, SECOND).as_secs();
        let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        if h > 0 {
            format!("{h}h{m}m{s}s")
        } else {
            format!("{m}m{s}s")
        }
    } else if d >= SECOND {
        format!("{:.1}s", round_to(d, Duration::from_millis(100)).as_secs_f64())
    } else if d >= MILLISECOND {
        format!("{}ms", round_to(d, MILLISECOND).as_millis())
    } else if d >= MICROSECOND {
        let nanos = round_to(d, Duration::from_nanos(10)).as_nanos();
        format!("{:.2}µs", nanos as f64 / 1000.0)
    } else if d.is_zero() {
        ZERO_DURATION.to_string()
    } else {
        format!("{}ns", round_to(d, Duration::from_nanos(10)).as_nanos())
    }
}

fn round_to(d: Duration, unit: Duration) -> Duration {
    let unit = unit.as_nanos().max(1);
    let rounded = (d.as_nanos() + unit / 2) / unit * unit;
    Duration::from_nanos(u64::try_from(rounded).unwrap_or(u64::MAX))
}
