use std::fmt;
use std::path::PathBuf;

use crossbeam_channel::Sender;

use crate::state::{RunState, Termination};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Success => "SUCCESS",
        };
        f.write_str(s)
    }
}

/// What a sink did when flushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkReport {
    Written {
        path: PathBuf,
        rows: usize,
        duplicates: usize,
    },
    Empty,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub termination: Termination,
    pub pages_visited: usize,
    pub items_visited: usize,
    pub items_extracted: usize,
    pub sink: Result<SinkReport, String>,
}

impl RunSummary {
    pub fn state(&self) -> RunState {
        self.termination.run_state()
    }
}

#[derive(Debug, Clone)]
pub enum CrawlEvent {
    Progress {
        current: usize,
        total: Option<usize>,
    },
    Log {
        level: LogLevel,
        message: String,
    },
    State(RunState),
    Finished(RunSummary),
}

/// Worker side of the event channel.
///
/// Sending never blocks and never fails the run: a dropped receiver only
/// means nobody is listening anymore.
#[derive(Debug, Clone)]
pub struct EventTx {
    tx: Sender<CrawlEvent>,
}

impl EventTx {
    pub fn new(tx: Sender<CrawlEvent>) -> Self {
        Self { tx }
    }

    pub fn send(&self, event: CrawlEvent) {
        self.tx.send(event).ok();
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => log::info!("{message}"),
            LogLevel::Warning => log::warn!("{message}"),
            LogLevel::Error => log::error!("{message}"),
        }
        self.send(CrawlEvent::Log { level, message });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message)
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(LogLevel::Success, message)
    }

    pub fn progress(&self, current: usize, total: Option<usize>) {
        self.send(CrawlEvent::Progress { current, total });
    }

    pub fn state(&self, state: RunState) {
        log::debug!("Run state: {state:?}");
        self.send(CrawlEvent::State(state));
    }
}
