use std::marker::PhantomData;
use std::time::Duration;

use chrono::NaiveDate;
use crossbeam_channel::{unbounded, Receiver};

use crate::config::CrawlerConfig;
use crate::control::CrawlHandle;
use crate::crawler::spawn_crawl;
use crate::events::{CrawlEvent, EventTx, RunSummary};
use crate::renderer::Renderer;
use crate::scrapable::{Scrapable, Sink};
use crate::state::{RunSettings, RunState};
use crate::url::FilterSelection;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("A crawl is already running")]
    AlreadyRunning,
    #[error("No crawl is running")]
    NotRunning,
    #[error("Couldn't start the crawl worker: {0}")]
    Spawn(#[from] anyhow::Error),
}

/// Command surface over at most one crawl at a time.
///
/// Settings changed while a run is active apply to the next run.
pub struct Session<T, R, S>
where
    T: Scrapable,
    R: Renderer,
    S: Sink<T::Record>,
{
    crawler_conf: CrawlerConfig,
    scraper_conf: T::Config,
    renderer_conf: R::Config,
    sink_conf: S::Config,
    settings: RunSettings,
    events: EventTx,
    active: Option<CrawlHandle>,
    _sink: PhantomData<fn() -> S>,
}

impl<T, R, S> Session<T, R, S>
where
    T: Scrapable + 'static,
    R: Renderer + 'static,
    S: Sink<T::Record> + 'static,
{
    /// Creates a session and the receiving end of its events.
    pub fn new(
        crawler_conf: CrawlerConfig,
        scraper_conf: T::Config,
        renderer_conf: R::Config,
        sink_conf: S::Config,
    ) -> (Self, Receiver<CrawlEvent>) {
        let (tx, rx) = unbounded();
        let session = Self {
            crawler_conf,
            scraper_conf,
            renderer_conf,
            sink_conf,
            settings: RunSettings::default(),
            events: EventTx::new(tx),
            active: None,
            _sink: PhantomData,
        };
        (session, rx)
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn set_max_items(&mut self, max_items: Option<usize>) {
        self.settings.max_items = max_items;
    }

    pub fn set_date_range(&mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) {
        if let (Some(from), Some(to)) = (from, to) {
            if from > to {
                self.events
                    .warn(format!("Start date {from} is after end date {to}"));
            }
        }
        self.settings.date_from = from;
        self.settings.date_to = to;
    }

    pub fn set_filters(&mut self, countries: Vec<String>, languages: Vec<String>, tags: Vec<String>) {
        self.settings.filters = FilterSelection {
            countries,
            languages,
            tags,
        };
    }

    pub fn state(&mut self) -> RunState {
        match self.active.as_mut() {
            Some(handle) => {
                if handle.is_finished() {
                    RunState::Idle
                } else {
                    handle.state()
                }
            }
            None => RunState::Idle,
        }
    }

    /// Whether a run has been started and not yet finished its cleanup.
    pub fn is_active(&mut self) -> bool {
        self.active
            .as_mut()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.is_active() {
            self.events.warn("Scraper is already running.");
            return Err(SessionError::AlreadyRunning);
        }

        let handle = spawn_crawl::<T, R, S>(
            self.crawler_conf.clone(),
            self.settings.clone(),
            self.scraper_conf.clone(),
            self.renderer_conf.clone(),
            self.sink_conf.clone(),
            self.events.clone(),
        )?;
        self.active = Some(handle);
        self.events.success("Scraper initialised and started.");
        Ok(())
    }

    fn running(&mut self) -> Result<&mut CrawlHandle, SessionError> {
        match self.active.as_mut() {
            Some(handle) => {
                if handle.is_finished() {
                    Err(SessionError::NotRunning)
                } else {
                    Ok(handle)
                }
            }
            None => Err(SessionError::NotRunning),
        }
    }

    pub fn pause(&mut self) -> Result<bool, SessionError> {
        Ok(self.running()?.pause())
    }

    pub fn resume(&mut self) -> Result<bool, SessionError> {
        Ok(self.running()?.resume())
    }

    /// Cancels the active run, waiting at most the configured join timeout.
    pub fn cancel(&mut self) -> Result<Option<RunSummary>, SessionError> {
        let timeout = self.crawler_conf.join_timeout();
        self.cancel_within(timeout)
    }

    /// Cancels the active run, waiting at most `timeout` for it to unwind.
    ///
    /// A run that doesn't stop in time still counts as active until its
    /// cleanup is over, so no other run can start meanwhile.
    pub fn cancel_within(&mut self, timeout: Duration) -> Result<Option<RunSummary>, SessionError> {
        self.running()?;
        self.events.warn("Cancelling scraper...");
        let summary = self.active.as_mut().and_then(|handle| handle.cancel(timeout));
        match &summary {
            Some(_) => {
                self.active = None;
                self.events.success("Scraper has been successfully killed.");
            }
            None => self
                .events
                .warn("Scraper didn't stop in time, it will clean up in the background."),
        }
        Ok(summary)
    }

    /// Blocks until the active run ends.
    pub fn wait(&mut self) -> Option<RunSummary> {
        self.active.as_mut().and_then(|handle| handle.wait())
    }
}
