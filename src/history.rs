use rustyline::error::ReadlineError;
use rustyline::history::{FileHistory, History as _};
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

/// Maximum number of remembered lines; the oldest are dropped first.
pub const HISTORY_LIMIT: usize = 1000;

/// Lines entered in this and earlier sessions, kept in a rustyline
/// [`FileHistory`] so the file format matches the line editor's.
pub struct History {
    lines: FileHistory,
}

impl History {
    pub fn new() -> Self {
        let mut lines = FileHistory::new();
        if let Err(e) = lines.set_max_len(HISTORY_LIMIT) {
            log::warn!("cannot size history: {e}");
        }
        // Repeated commands are still listed by `history`.
        if let Err(e) = lines.ignore_dups(false) {
            log::warn!("cannot configure history: {e}");
        }
        Self { lines }
    }

    /// Remember a line. Blank lines are ignored.
    pub fn add(&mut self, line: &str) {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            return;
        }
        if let Err(e) = self.lines.add(line) {
            log::warn!("cannot record history line: {e}");
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Append the lines of a history file. A missing file is not an error.
    pub fn load(&mut self, path: &Path) -> rustyline::Result<()> {
        match self.lines.load(path) {
            Err(ReadlineError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    pub fn save(&mut self, path: &Path) -> rustyline::Result<()> {
        self.lines.save(path)
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History").field("len", &self.len()).finish()
    }
}
