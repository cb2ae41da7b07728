use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::status::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Error,
}

/// One structured log line: a message, an optional context value (usually a
/// store or folder name) and, for errors, the status code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            message: message.into(),
            detail: None,
            status: None,
        }
    }

    pub fn error(message: impl Into<String>, status: Status) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
            detail: None,
            status: Some(status),
        }
    }

    /// An error that did not come from the subsystem, so has no status.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
            detail: None,
            status: None,
        }
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn render(&self) -> String {
        match (self.status, self.detail.as_deref()) {
            (None, None) => self.message.clone(),
            (None, Some(detail)) => format!("{}{}", self.message, detail),
            (Some(status), None) => format!("{}{}", self.message, status.code()),
            (Some(status), Some(detail)) => {
                format!("{}{}  hr={}", self.message, detail, status.code())
            }
        }
    }
}

/// Console sink with an optional duplicate log file.
///
/// Write failures on either side are ignored; logging never aborts a run.
pub struct ProbeLog {
    console: RefCell<Box<dyn Write>>,
    file: RefCell<Option<(PathBuf, File)>>,
    entries: RefCell<Vec<LogEntry>>,
}

impl ProbeLog {
    pub fn stdout() -> Self {
        Self::with_console(io::stdout())
    }

    pub fn silent() -> Self {
        Self::with_console(io::sink())
    }

    pub fn with_console(console: impl Write + 'static) -> Self {
        Self {
            console: RefCell::new(Box::new(console)),
            file: RefCell::new(None),
            entries: RefCell::new(Vec::new()),
        }
    }

    /// Creates or truncates `path` and duplicates every later entry into it.
    pub fn open_file(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        *self.file.borrow_mut() = Some((path.to_path_buf(), file));
        Ok(())
    }

    pub fn close_file(&self) {
        if let Some((_, mut file)) = self.file.borrow_mut().take() {
            let _ = file.flush();
        }
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        self.file.borrow().as_ref().map(|(path, _)| path.clone())
    }

    pub fn write(&self, entry: LogEntry) {
        let line = entry.render();
        {
            let mut console = self.console.borrow_mut();
            let _ = writeln!(console, "{}", line);
            let _ = console.flush();
        }
        if let Some((_, file)) = self.file.borrow_mut().as_mut() {
            let _ = writeln!(file, "{}", line);
        }
        self.entries.borrow_mut().push(entry);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.borrow().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries.borrow().iter().map(LogEntry::render).collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries
            .borrow()
            .iter()
            .any(|entry| entry.render().contains(needle))
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.level == Level::Error)
            .count()
    }
}

impl Drop for ProbeLog {
    fn drop(&mut self) {
        self.close_file();
    }
}
