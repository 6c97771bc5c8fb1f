use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;

/// Severity attached to a run-log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warning => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Sink for run diagnostics. Passed explicitly to every operation that
/// reports something; there is no process-wide logger.
pub trait RunLog {
    fn emit(&self, level: Level, message: &str);
}

/// Prints every message to stderr.
pub struct StderrLog;

impl RunLog for StderrLog {
    fn emit(&self, level: Level, message: &str) {
        eprintln!("[{}] {}", level.tag(), message);
    }
}

/// Appends timestamped lines to a log file, optionally echoing to stderr.
pub struct FileLog {
    file: Mutex<File>,
    echo: bool,
}

impl FileLog {
    pub fn open(path: &Path, echo: bool) -> anyhow::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
            echo,
        })
    }
}

impl RunLog for FileLog {
    fn emit(&self, level: Level, message: &str) {
        let line = format!(
            "{} [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            level.tag(),
            message
        );
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{}", line);
        }
        if self.echo {
            eprintln!("{}", line);
        }
    }
}

/// Collects messages in memory, for tests and embedding callers.
#[derive(Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<(Level, String)>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().unwrap().clone()
    }

    /// Messages at `level` or worse.
    pub fn at_least(&self, level: Level) -> Vec<String> {
        let rank = |l: Level| l as u8;
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| rank(*l) >= rank(level))
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl RunLog for MemoryLog {
    fn emit(&self, level: Level, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_string()));
    }
}
