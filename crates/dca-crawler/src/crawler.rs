use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::thread;

use futures::FutureExt;
use tokio::runtime;
use tokio::sync::watch;

use crate::config::{CrawlerConfig, OnError};
use crate::control::{self, Command, CrawlHandle, Gate};
use crate::events::{CrawlEvent, EventTx, RunSummary, SinkReport};
use crate::renderer::{RenderError, Renderer};
use crate::scrapable::{Scrapable, Sink};
use crate::state::{CrawlState, RunSettings, RunState, Termination};
use crate::url::build_url;

/// Result of driving the controller to a termination.
#[derive(Debug)]
pub struct CrawlOutcome<R> {
    pub termination: Termination,
    pub state: CrawlState,
    pub records: Vec<R>,
}

/// The pagination-and-crawl controller.
///
/// Borrows its collaborators for the duration of one run. Acquiring and
/// releasing them is left to the caller, see [`spawn_crawl`].
pub struct Crawler<'a, T, R, S>
where
    T: Scrapable,
{
    config: &'a CrawlerConfig,
    scraper: &'a mut T,
    renderer: &'a mut R,
    sink: &'a mut S,
    gate: &'a mut Gate,
    events: &'a EventTx,
    tx_state: Option<&'a watch::Sender<RunState>>,
    run_state: RunState,
    state: CrawlState,
    records: Vec<T::Record>,
    page_skips: usize,
}

impl<'a, T, R, S> Crawler<'a, T, R, S>
where
    T: Scrapable,
    R: Renderer,
    S: Sink<T::Record>,
{
    pub fn new(
        config: &'a CrawlerConfig,
        settings: RunSettings,
        scraper: &'a mut T,
        renderer: &'a mut R,
        sink: &'a mut S,
        gate: &'a mut Gate,
        events: &'a EventTx,
    ) -> Self {
        Self {
            config,
            scraper,
            renderer,
            sink,
            gate,
            events,
            tx_state: None,
            run_state: RunState::Idle,
            state: CrawlState::new(settings),
            records: vec![],
            page_skips: 0,
        }
    }

    pub fn with_state_watch(mut self, tx_state: &'a watch::Sender<RunState>) -> Self {
        self.tx_state = Some(tx_state);
        self
    }

    pub async fn run(mut self) -> CrawlOutcome<T::Record> {
        self.set_state(RunState::Running);
        self.events.info("Starting scraper...");

        let termination = match AssertUnwindSafe(self.run_pages()).catch_unwind().await {
            Ok(termination) => termination,
            Err(panic) => Termination::Fatal(format!(
                "An unexpected error occurred: {}",
                panic_message(&*panic)
            )),
        };

        match &termination {
            Termination::NoMoreItems | Termination::RepeatedItem | Termination::ItemCapReached => {
                self.events.success(format!(
                    "Scraping finished ({termination}): {} items from {} pages.",
                    self.state.items_extracted, self.state.pages_visited
                ))
            }
            Termination::Cancelled => self.events.warn("Scraping cancelled."),
            Termination::Fatal(e) => self.events.error(format!("Scraping failed: {e}")),
        }
        self.set_state(termination.run_state());

        CrawlOutcome {
            termination,
            state: self.state,
            records: self.records,
        }
    }

    fn set_state(&mut self, state: RunState) {
        if self.run_state == state {
            return;
        }
        self.run_state = state;
        if let Some(tx) = self.tx_state {
            tx.send_replace(state);
        }
        self.events.state(state);
    }

    async fn run_pages(&mut self) -> Termination {
        loop {
            if let Err(termination) = self.visit_page().await {
                return termination;
            }
        }
    }

    /// Honors pending pause and cancel requests.
    async fn checkpoint(&mut self) -> Result<(), Termination> {
        let mut cmd = self.gate.command();
        loop {
            match cmd {
                Command::Run => {
                    if self.run_state == RunState::Paused {
                        self.set_state(RunState::Running);
                        self.events.info("Scraping resumed.");
                    }
                    return Ok(());
                }
                Command::Cancel => {
                    self.events.warn("Killing scraper.");
                    return Err(Termination::Cancelled);
                }
                Command::Pause => {
                    if self.run_state != RunState::Paused {
                        self.set_state(RunState::Paused);
                        self.events.warn("Scraping paused.");
                    }
                    cmd = self.gate.next_command().await;
                }
            }
        }
    }

    /// Skips the current listing page after a recoverable load failure.
    fn skip_page(&mut self, e: RenderError) -> Result<(), Termination> {
        if e.is_fatal() || !matches!(e, RenderError::Timeout(_)) {
            return Err(fatal(e));
        }
        if self.config.on_page_timeout == OnError::Fail {
            return Err(fatal(e));
        }

        self.page_skips += 1;
        if self.page_skips > self.config.max_page_skips {
            return Err(Termination::Fatal(format!(
                "Gave up after {} consecutive listing page timeouts",
                self.page_skips
            )));
        }

        self.events.error(format!(
            "Timed out waiting for page {} to load, skipping to next page.",
            self.state.page
        ));
        self.state.skip_page();
        Ok(())
    }

    /// Processes one listing page. `Ok` means keep going.
    async fn visit_page(&mut self) -> Result<(), Termination> {
        self.checkpoint().await?;

        let visited_before = self.state.visited_len();
        let url = build_url(&self.config.listing, &self.state.query());

        self.events.info(format!(
            "Scraping page {} in {} order.",
            self.state.page, self.state.direction
        ));
        self.events.info(format!(
            "Total pages scraped: {}, total items scraped: {}",
            self.state.pages_visited, self.state.items_extracted
        ));
        self.events.info(format!("Navigating to: {url}"));

        if let Err(e) = interruptible(&mut *self.gate, self.renderer.goto(&url)).await? {
            return self.skip_page(e);
        }

        let selector = self.scraper.item_selector();
        let timeout = self.config.listing_timeout();
        match interruptible(&mut *self.gate, self.renderer.wait_for(selector, timeout)).await? {
            Ok(()) => (),
            Err(RenderError::Timeout(_)) => {
                self.events.warn("No more items found...");
                return Err(Termination::NoMoreItems);
            }
            Err(e) => return Err(fatal(e)),
        }

        if !self.state.pagination_read() {
            self.read_pagination()?;
        }

        let links = {
            let page_url = self.renderer.current_url().unwrap_or(&url).to_string();
            let content = self.renderer.content().map_err(fatal)?;
            self.scraper.item_links(content, &page_url)
        };
        if links.is_empty() {
            self.events.info("No more pages to process...");
            return Err(Termination::NoMoreItems);
        }
        self.page_skips = 0;

        for link in links {
            self.checkpoint().await?;

            if self.state.is_visited(&link) {
                self.events.info(format!("Detected a repeated page: {link}"));
                return Err(Termination::RepeatedItem);
            }
            self.state.mark_visited(&link);

            self.events.info(format!("Processing: {link}"));
            let navigated = self.visit_item(&link).await?;

            self.events
                .progress(self.state.items_extracted, self.state.target());

            if self.state.cap_reached() {
                self.events.info(format!(
                    "Reached the item limit of {}...",
                    self.state.items_extracted
                ));
                return Err(Termination::ItemCapReached);
            }

            if navigated {
                if let Err(e) = interruptible(&mut *self.gate, self.renderer.back()).await? {
                    return self.skip_page(e);
                }
            }
            let selector = self.scraper.item_selector();
            let timeout = self.config.back_timeout();
            if let Err(e) =
                interruptible(&mut *self.gate, self.renderer.wait_for(selector, timeout)).await?
            {
                return self.skip_page(e);
            }
        }

        if self.state.visited_len() == visited_before {
            self.events.info("No new items found, ending scrape.");
            return Err(Termination::NoMoreItems);
        }

        self.state.complete_page();

        if self.state.try_switch_direction() {
            self.events.info(format!(
                "Halfway reached, switching to {} order.",
                self.state.direction
            ));
        }

        Ok(())
    }

    fn read_pagination(&mut self) -> Result<(), Termination> {
        let (last_page, total_items) = {
            let content = self.renderer.content().map_err(fatal)?;
            (
                self.scraper.last_page(content),
                self.scraper.total_items(content),
            )
        };
        self.state.set_pagination(last_page, total_items);

        match self.state.half_page() {
            Some(half) => log::debug!("Last listing page {last_page:?}, midpoint at page {half}"),
            None => self.events.warn(
                "Pagination elements not found. Ignore this if scraping a small amount of items",
            ),
        }
        if let Some(total) = total_items {
            self.events
                .info(format!("Total items found from filters: {total}"));
        }
        self.events.progress(0, self.state.target());

        Ok(())
    }

    /// Navigates to an item and extracts it. Returns whether the renderer left
    /// the listing page.
    async fn visit_item(&mut self, link: &str) -> Result<bool, Termination> {
        let loaded = interruptible(&mut *self.gate, self.renderer.goto(link)).await?;
        let navigated = loaded.is_ok();

        let extracted = match loaded {
            Err(e) if e.is_fatal() => return Err(fatal(e)),
            Err(e) => Err(anyhow::Error::from(e)),
            Ok(()) => {
                let content = self.renderer.content().map_err(fatal)?;
                self.scraper.scrap(content, link)
            }
        };

        match extracted {
            Ok(record) => {
                if let Err(e) = self.sink.append(&record) {
                    self.events
                        .error(format!("Couldn't hand {link} to the sink: {e}"));
                }
                self.records.push(record);
                self.state.items_extracted += 1;
            }
            Err(e) => match self.config.on_item_error {
                OnError::SkipAndLog => {
                    self.events.error(format!("Error scraping {link}: {e:#}"));
                }
                OnError::Fail => {
                    return Err(Termination::Fatal(format!("Error scraping {link}: {e:#}")));
                }
            },
        }

        Ok(navigated)
    }
}

fn fatal(e: RenderError) -> Termination {
    Termination::Fatal(e.to_string())
}

/// Runs a renderer call unless a cancel arrives first.
async fn interruptible<F, O>(gate: &mut Gate, fut: F) -> Result<O, Termination>
where
    F: Future<Output = O>,
{
    tokio::select! {
        biased;
        _ = gate.cancelled() => Err(Termination::Cancelled),
        out = fut => Ok(out),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("panic")
    }
}

/// Starts a crawl on a dedicated worker thread.
///
/// The worker acquires the scraper, the sink and the renderer session, runs
/// the controller, and then always closes the renderer and flushes the sink
/// once, whatever way the run ended.
pub fn spawn_crawl<T, R, S>(
    config: CrawlerConfig,
    settings: RunSettings,
    scraper_conf: T::Config,
    renderer_conf: R::Config,
    sink_conf: S::Config,
    events: EventTx,
) -> anyhow::Result<CrawlHandle>
where
    T: Scrapable + 'static,
    R: Renderer + 'static,
    S: Sink<T::Record> + 'static,
{
    let (tx_cmd, gate) = control::channel();
    let (tx_state, rx_state) = watch::channel(RunState::Running);
    let (tx_done, rx_done) = crossbeam_channel::bounded::<RunSummary>(1);

    let worker = thread::Builder::new()
        .name(String::from("dca-crawler"))
        .spawn(move || {
            let summary = run_worker::<T, R, S>(
                &config,
                settings,
                &scraper_conf,
                &renderer_conf,
                &sink_conf,
                gate,
                &events,
                &tx_state,
            );
            tx_state.send_replace(RunState::Idle);
            events.send(CrawlEvent::Finished(summary.clone()));
            events.state(RunState::Idle);
            tx_done.send(summary).ok();
        })?;

    Ok(CrawlHandle::new(tx_cmd, rx_state, rx_done, worker))
}

#[allow(clippy::too_many_arguments)]
fn run_worker<T, R, S>(
    config: &CrawlerConfig,
    settings: RunSettings,
    scraper_conf: &T::Config,
    renderer_conf: &R::Config,
    sink_conf: &S::Config,
    mut gate: Gate,
    events: &EventTx,
    tx_state: &watch::Sender<RunState>,
) -> RunSummary
where
    T: Scrapable,
    R: Renderer,
    S: Sink<T::Record>,
{
    let failed = |e: String| {
        events.error(format!("Initialisation error: {e}"));
        tx_state.send_replace(RunState::Failed);
        events.state(RunState::Failed);
        RunSummary {
            termination: Termination::Fatal(e),
            pages_visited: 0,
            items_visited: 0,
            items_extracted: 0,
            sink: Ok(SinkReport::Empty),
        }
    };

    let rt = match runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => return failed(e.to_string()),
    };
    let mut scraper = match T::new(scraper_conf) {
        Ok(scraper) => scraper,
        Err(e) => return failed(format!("{e:#}")),
    };
    let mut sink = match S::open(sink_conf) {
        Ok(sink) => sink,
        Err(e) => return failed(format!("{e:#}")),
    };

    rt.block_on(async {
        let mut renderer = match interruptible(&mut gate, R::open(renderer_conf)).await {
            Ok(Ok(renderer)) => renderer,
            Ok(Err(e)) => {
                let summary = failed(e.to_string());
                return RunSummary {
                    sink: flush_sink::<T::Record, S>(&mut sink, events),
                    ..summary
                };
            }
            Err(_) => {
                events.warn("Cancelled before the renderer session opened.");
                tx_state.send_replace(RunState::Cancelled);
                events.state(RunState::Cancelled);
                return RunSummary {
                    termination: Termination::Cancelled,
                    pages_visited: 0,
                    items_visited: 0,
                    items_extracted: 0,
                    sink: flush_sink::<T::Record, S>(&mut sink, events),
                };
            }
        };
        events.success("Renderer session opened.");

        let outcome = Crawler::new(
            config,
            settings,
            &mut scraper,
            &mut renderer,
            &mut sink,
            &mut gate,
            events,
        )
        .with_state_watch(tx_state)
        .run()
        .await;

        match renderer.close().await {
            Ok(()) => events.success("Renderer closed."),
            Err(e) => events.error(format!("Exception during renderer closure: {e}")),
        }

        let sink_report = flush_sink::<T::Record, S>(&mut sink, events);

        RunSummary {
            termination: outcome.termination,
            pages_visited: outcome.state.pages_visited,
            items_visited: outcome.state.items_visited,
            items_extracted: outcome.state.items_extracted,
            sink: sink_report,
        }
    })
}

fn flush_sink<R, S>(sink: &mut S, events: &EventTx) -> Result<SinkReport, String>
where
    S: Sink<R>,
{
    events.info("Sorting and cleaning data...");
    match sink.flush() {
        Ok(SinkReport::Written {
            path,
            rows,
            duplicates,
        }) => {
            events.success(format!(
                "Data saved to: {} ({rows} rows, {duplicates} duplicates removed)",
                path.display()
            ));
            Ok(SinkReport::Written {
                path,
                rows,
                duplicates,
            })
        }
        Ok(SinkReport::Empty) => {
            events.warn("No data found. CSV file will not be created");
            Ok(SinkReport::Empty)
        }
        Err(e) => {
            events.error(format!("An error occurred while writing output: {e}"));
            Err(e.to_string())
        }
    }
}
