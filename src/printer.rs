// src/printer.rs

//! Serialized line output shared by everything that writes to stdout directly.

use crate::models::Descriptor;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// Cloneable handle granting exclusive, line-at-a-time access to a writer.
#[derive(Clone)]
pub struct Printer {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Printer {
    pub fn new<W: Write + Send + 'static>(out: W) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Writes `line` and a newline without interleaving with other clones.
    pub fn println(&self, line: &str) -> io::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}")?;
        out.flush()
    }

    /// Plain rendering of a transfer event: `<prompt> <digest> <name>`.
    pub fn status(&self, prompt: &str, desc: &Descriptor) -> io::Result<()> {
        let name = desc.display_name();
        if name.is_empty() {
            self.println(&format!("{} {}", prompt, desc.digest))
        } else {
            self.println(&format!("{} {} {}", prompt, desc.digest, name))
        }
    }
}

impl std::fmt::Debug for Printer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Printer").finish_non_exhaustive()
    }
}
