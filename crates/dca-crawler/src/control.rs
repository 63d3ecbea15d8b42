use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use tokio::sync::watch;

use crate::events::RunSummary;
use crate::state::RunState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Run,
    Pause,
    Cancel,
}

/// Worker side of the command channel.
#[derive(Debug)]
pub struct Gate {
    rx: watch::Receiver<Command>,
}

impl Gate {
    pub fn new(rx: watch::Receiver<Command>) -> Self {
        Self { rx }
    }

    pub fn command(&mut self) -> Command {
        *self.rx.borrow_and_update()
    }

    /// Waits for the next command. A vanished controller counts as a cancel.
    pub async fn next_command(&mut self) -> Command {
        match self.rx.changed().await {
            Ok(()) => self.command(),
            Err(_) => Command::Cancel,
        }
    }

    /// Resolves once a cancel has been requested.
    pub async fn cancelled(&mut self) {
        loop {
            if self.command() == Command::Cancel {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

pub fn channel() -> (watch::Sender<Command>, Gate) {
    let (tx, rx) = watch::channel(Command::Run);
    (tx, Gate::new(rx))
}

/// Control side of one running crawl.
///
/// Dropping the handle cancels the run without waiting for it.
#[derive(Debug)]
pub struct CrawlHandle {
    tx_cmd: watch::Sender<Command>,
    rx_state: watch::Receiver<RunState>,
    rx_done: Receiver<RunSummary>,
    worker: Option<thread::JoinHandle<()>>,
    summary: Option<RunSummary>,
    exited: bool,
}

impl CrawlHandle {
    pub(crate) fn new(
        tx_cmd: watch::Sender<Command>,
        rx_state: watch::Receiver<RunState>,
        rx_done: Receiver<RunSummary>,
        worker: thread::JoinHandle<()>,
    ) -> Self {
        Self {
            tx_cmd,
            rx_state,
            rx_done,
            worker: Some(worker),
            summary: None,
            exited: false,
        }
    }

    pub fn state(&self) -> RunState {
        *self.rx_state.borrow()
    }

    /// Requests a pause, honored at the next checkpoint.
    pub fn pause(&self) -> bool {
        self.command(Command::Pause)
    }

    pub fn resume(&self) -> bool {
        self.command(Command::Run)
    }

    fn command(&self, cmd: Command) -> bool {
        let current = *self.tx_cmd.borrow();
        match (current, cmd) {
            (Command::Cancel, _) => false,
            (current, cmd) if current == cmd => false,
            _ => {
                self.tx_cmd.send_replace(cmd);
                true
            }
        }
    }

    /// Whether the worker is done, cleanup included.
    pub fn is_finished(&mut self) -> bool {
        self.poll_summary();
        self.summary.is_some() || self.exited
    }

    pub fn summary(&mut self) -> Option<&RunSummary> {
        self.poll_summary();
        self.summary.as_ref()
    }

    fn poll_summary(&mut self) {
        if self.summary.is_some() || self.exited {
            return;
        }
        match self.rx_done.try_recv() {
            Ok(summary) => self.finish(summary),
            Err(TryRecvError::Empty) => (),
            Err(TryRecvError::Disconnected) => self.lost(),
        }
    }

    fn lost(&mut self) {
        log::error!("Crawl worker exited without a summary");
        if let Some(worker) = self.worker.take() {
            worker.join().ok();
        }
        self.exited = true;
    }

    fn finish(&mut self, summary: RunSummary) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Crawl worker panicked after reporting");
            }
        }
        self.summary = Some(summary);
    }

    /// Blocks until the run is over.
    pub fn wait(&mut self) -> Option<RunSummary> {
        if self.summary.is_none() && !self.exited {
            match self.rx_done.recv() {
                Ok(summary) => self.finish(summary),
                Err(_) => self.lost(),
            }
        }
        self.summary.clone()
    }

    /// Cancels the run and waits at most `timeout` for it to unwind.
    ///
    /// Returns `None` when the worker didn't stop in time. The run then
    /// finishes its cleanup on its own and the handle keeps tracking it:
    /// [`is_finished`](Self::is_finished) stays false until it reports.
    pub fn cancel(&mut self, timeout: Duration) -> Option<RunSummary> {
        self.tx_cmd.send_replace(Command::Cancel);
        if self.summary.is_none() && !self.exited {
            match self.rx_done.recv_timeout(timeout) {
                Ok(summary) => self.finish(summary),
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!("Crawl worker didn't stop within {timeout:?}");
                    return None;
                }
                Err(RecvTimeoutError::Disconnected) => self.lost(),
            }
        }
        self.summary.clone()
    }
}

impl Drop for CrawlHandle {
    fn drop(&mut self) {
        if self.summary.is_none() {
            self.tx_cmd.send_replace(Command::Cancel);
        }
    }
}
