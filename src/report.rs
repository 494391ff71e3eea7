//! Operator-facing output sink.
//!
//! Every topology operation reports per-target success/failure lines
//! through an injected [`Reporter`] so the surrounding tool (console,
//! shell host, log collector) decides how to render them. The structured
//! outcome of a fan-out is returned separately as a
//! [`FanoutReport`](crate::topology::FanoutReport); the reporter carries
//! the human-readable narration only.

use parking_lot::Mutex;

/// Sink for human-readable operation output.
pub trait Reporter: Send + Sync {
    /// Report a success or progress line.
    fn write_line(&self, message: &str);

    /// Report an error line.
    fn write_error_line(&self, message: &str);
}

/// Reporter that forwards lines to `tracing` at info/error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn write_line(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn write_error_line(&self, message: &str) {
        tracing::error!("{message}");
    }
}

/// A reported line with its severity, as captured by [`BufferReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportedLine {
    /// A success or progress line.
    Info(String),
    /// An error line.
    Error(String),
}

/// Reporter that buffers lines in memory.
///
/// Used by tests to assert on operator output; also handy for callers that
/// render the narration after the operation completes.
#[derive(Debug, Default)]
pub struct BufferReporter {
    lines: Mutex<Vec<ReportedLine>>,
}

impl BufferReporter {
    /// Create an empty buffer reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line reported so far.
    pub fn lines(&self) -> Vec<ReportedLine> {
        self.lines.lock().clone()
    }

    /// Error lines only, as plain strings.
    pub fn error_lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter_map(|l| match l {
                ReportedLine::Error(m) => Some(m.clone()),
                ReportedLine::Info(_) => None,
            })
            .collect()
    }

    /// Whether any line (info or error) contains the given fragment.
    pub fn contains(&self, fragment: &str) -> bool {
        self.lines.lock().iter().any(|l| match l {
            ReportedLine::Info(m) | ReportedLine::Error(m) => m.contains(fragment),
        })
    }
}

impl Reporter for BufferReporter {
    fn write_line(&self, message: &str) {
        self.lines.lock().push(ReportedLine::Info(message.to_string()));
    }

    fn write_error_line(&self, message: &str) {
        self.lines.lock().push(ReportedLine::Error(message.to_string()));
    }
}
