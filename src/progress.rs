use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{error, info, warn};

/// Severity of a milestone message. The surrounding task layer decides how
/// to persist or surface these; the pipeline only emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressLevel {
    Info,
    Warn,
    Error,
}

impl ProgressLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressLevel::Info => "info",
            ProgressLevel::Warn => "warning",
            ProgressLevel::Error => "error",
        }
    }
}

/// One immutable milestone emitted by a pipeline subtask.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub level: ProgressLevel,
    pub message: String,
}

impl ProgressEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: ProgressLevel::Info,
            message: message.into(),
        }
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            level: ProgressLevel::Warn,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: ProgressLevel::Error,
            message: message.into(),
        }
    }
}

/// Where milestone messages end up: a plain leveled callback.
pub trait ProgressSink: Send + Sync {
    fn report(&self, level: ProgressLevel, message: &str);
}

/// Sink that forwards every milestone to the tracing subscriber.
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn report(&self, level: ProgressLevel, message: &str) {
        match level {
            ProgressLevel::Info => info!("{message}"),
            ProgressLevel::Warn => warn!("{message}"),
            ProgressLevel::Error => error!("{message}"),
        }
    }
}

/// Fan-in point for subtask milestones.
///
/// Subtasks each hold a cloned sender and never touch shared state; the
/// single pump owns the receiving end and is the only place any counter
/// lives.
pub struct ProgressHub {
    send: Sender<ProgressEvent>,
    receive: Receiver<ProgressEvent>,
}

impl ProgressHub {
    pub fn new() -> Self {
        let (send, receive) = unbounded();
        Self { send, receive }
    }

    /// A sender half for one subtask.
    pub fn sender(&self) -> Sender<ProgressEvent> {
        self.send.clone()
    }

    /// Forward events into the sink until every sender is gone.
    /// Returns how many Error-level events went through.
    pub fn pump(self, sink: &dyn ProgressSink) -> usize {
        // Without this the hub's own sender would keep the channel open
        drop(self.send);

        let mut errors = 0;
        for event in self.receive {
            if event.level == ProgressLevel::Error {
                errors += 1;
            }
            sink.report(event.level, &event.message);
        }
        errors
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}
