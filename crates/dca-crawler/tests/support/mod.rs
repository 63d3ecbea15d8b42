#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dca_crawler::{
    async_trait, build_url, CrawlEvent, CrawlerConfig, Direction, FilterSelection, ListingConfig,
    ListingQuery, LogLevel, RenderError, Renderer, Scrapable, Sink, SinkError, SinkReport,
};

pub const BASE: &str = "/cases";

#[derive(Debug, Clone)]
pub enum Response {
    Page(String),
    /// An HTTP error status.
    Status(u16),
    Timeout,
    Hang,
    SessionLost,
}

/// A scripted archive served by [`FakeRenderer`].
#[derive(Debug, Default)]
pub struct Archive {
    responses: Mutex<HashMap<String, Response>>,
    navigations: Mutex<Vec<String>>,
    stuck_back: Mutex<HashSet<String>>,
    hang_on_open: AtomicBool,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
}

impl Archive {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: impl Into<String>, response: Response) {
        self.responses.lock().unwrap().insert(url.into(), response);
    }

    /// Serves a listing page and a default case page for each of its items.
    pub fn listing(
        &self,
        direction: Direction,
        page: usize,
        items: &[&str],
        last_page: Option<usize>,
        total: Option<usize>,
    ) {
        let mut content = String::new();
        if let Some(last) = last_page {
            content.push_str(&format!("last {last}\n"));
        }
        if let Some(total) = total {
            content.push_str(&format!("total {total}\n"));
        }
        for item in items {
            content.push_str(&format!("item {}\n", item_url(item)));
            self.serve_default_case(item);
        }
        self.serve(listing_url(direction, page), Response::Page(content));
    }

    /// Makes navigating back from `url` time out.
    pub fn stuck_back_from(&self, url: impl Into<String>) {
        self.stuck_back.lock().unwrap().insert(url.into());
    }

    /// Makes opening a renderer session never complete.
    pub fn hang_on_open(&self) {
        self.hang_on_open.store(true, Ordering::SeqCst);
    }

    fn serve_default_case(&self, item: &str) {
        let mut responses = self.responses.lock().unwrap();
        responses
            .entry(item_url(item))
            .or_insert_with(|| Response::Page(format!("case {item}\n")));
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn visited_items(&self) -> Vec<String> {
        self.navigations()
            .into_iter()
            .filter(|url| url.starts_with("/case/"))
            .collect()
    }

    fn respond(&self, url: &str) -> Response {
        self.navigations.lock().unwrap().push(url.to_string());
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Response::Page(String::new()))
    }
}

pub fn item_url(item: &str) -> String {
    format!("/case/{item}")
}

pub fn listing_url(direction: Direction, page: usize) -> String {
    let filters = FilterSelection::default();
    build_url(
        &listing_config(),
        &ListingQuery {
            page,
            direction,
            date_from: None,
            date_to: None,
            filters: &filters,
        },
    )
}

pub fn listing_config() -> ListingConfig {
    ListingConfig {
        base_url: BASE.into(),
        ..Default::default()
    }
}

pub fn crawler_config() -> CrawlerConfig {
    CrawlerConfig {
        listing: listing_config(),
        join_timeout_ms: 2_000,
        ..Default::default()
    }
}

pub struct FakeRenderer {
    archive: Arc<Archive>,
    history: Vec<(String, String)>,
    closed: bool,
}

#[async_trait]
impl Renderer for FakeRenderer {
    type Config = Arc<Archive>;

    async fn open(config: &Arc<Archive>) -> Result<Self, RenderError> {
        config.opens.fetch_add(1, Ordering::SeqCst);
        if config.hang_on_open.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        Ok(Self {
            archive: config.clone(),
            history: vec![],
            closed: false,
        })
    }

    async fn goto(&mut self, url: &str) -> Result<(), RenderError> {
        if self.closed {
            return Err(RenderError::SessionLost("closed".into()));
        }
        match self.archive.respond(url) {
            Response::Page(content) => {
                self.history.push((url.to_string(), content));
                Ok(())
            }
            Response::Status(code) => Err(RenderError::Navigation {
                url: url.to_string(),
                message: format!("HTTP status {code}"),
            }),
            Response::Timeout => Err(RenderError::Timeout(url.to_string())),
            Response::SessionLost => Err(RenderError::SessionLost("browser window closed".into())),
            Response::Hang => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> Result<(), RenderError> {
        let (url, content) = self
            .history
            .last()
            .ok_or_else(|| RenderError::SessionLost("no page".into()))?;
        let prefix = format!("{selector} ");
        if content.lines().any(|l| l.starts_with(&prefix)) {
            Ok(())
        } else {
            Err(RenderError::Timeout(url.clone()))
        }
    }

    fn content(&self) -> Result<&str, RenderError> {
        if self.closed {
            return Err(RenderError::SessionLost("closed".into()));
        }
        self.history
            .last()
            .map(|(_, content)| content.as_str())
            .ok_or_else(|| RenderError::SessionLost("no page".into()))
    }

    fn current_url(&self) -> Option<&str> {
        self.history.last().map(|(url, _)| url.as_str())
    }

    async fn back(&mut self) -> Result<(), RenderError> {
        if let Some((url, _)) = self.history.last() {
            if self.archive.stuck_back.lock().unwrap().contains(url) {
                return Err(RenderError::Timeout(url.clone()));
            }
        }
        self.history.pop();
        match self.history.last() {
            Some(_) => Ok(()),
            None => Err(RenderError::Timeout("history".into())),
        }
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        self.closed = true;
        self.archive.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Reads the line-based markup served by [`Archive`].
pub struct LineScraper;

fn field<'a>(page: &'a str, key: &str) -> impl Iterator<Item = &'a str> + 'a {
    let prefix = format!("{key} ");
    page.lines()
        .filter_map(move |line| line.strip_prefix(prefix.as_str()))
}

impl Scrapable for LineScraper {
    type Config = ();
    type Record = String;

    fn new(_config: &()) -> anyhow::Result<Self> {
        Ok(Self)
    }

    fn item_selector(&self) -> &str {
        "item"
    }

    fn item_links(&self, page: &str, _page_url: &str) -> Vec<String> {
        field(page, "item").map(String::from).collect()
    }

    fn last_page(&self, page: &str) -> Option<usize> {
        field(page, "last").next().and_then(|n| n.parse().ok())
    }

    fn total_items(&self, page: &str) -> Option<usize> {
        field(page, "total").next().and_then(|n| n.parse().ok())
    }

    fn scrap(&mut self, page: &str, url: &str) -> anyhow::Result<String> {
        if page.contains("broken") {
            anyhow::bail!("missing case body at {url}");
        }
        field(page, "case")
            .next()
            .map(String::from)
            .ok_or_else(|| anyhow::anyhow!("not a case page: {url}"))
    }
}

/// [`LineScraper`] that blocks its thread for a while on every case page.
pub struct SlowScraper {
    delay: Duration,
}

impl Scrapable for SlowScraper {
    type Config = Duration;
    type Record = String;

    fn new(delay: &Duration) -> anyhow::Result<Self> {
        Ok(Self { delay: *delay })
    }

    fn item_selector(&self) -> &str {
        "item"
    }

    fn item_links(&self, page: &str, page_url: &str) -> Vec<String> {
        LineScraper.item_links(page, page_url)
    }

    fn last_page(&self, page: &str) -> Option<usize> {
        LineScraper.last_page(page)
    }

    fn total_items(&self, page: &str) -> Option<usize> {
        LineScraper.total_items(page)
    }

    fn scrap(&mut self, page: &str, url: &str) -> anyhow::Result<String> {
        thread::sleep(self.delay);
        LineScraper.scrap(page, url)
    }
}

#[derive(Debug, Default)]
pub struct SinkLog {
    pub records: Vec<String>,
    pub flushes: usize,
}

pub type SharedSinkLog = Arc<Mutex<SinkLog>>;

pub struct VecSink {
    log: SharedSinkLog,
}

impl VecSink {
    pub fn open_shared(log: &SharedSinkLog) -> Self {
        Self { log: log.clone() }
    }
}

impl Sink<String> for VecSink {
    type Config = SharedSinkLog;

    fn open(config: &SharedSinkLog) -> anyhow::Result<Self> {
        Ok(Self { log: config.clone() })
    }

    fn append(&mut self, record: &String) -> Result<(), SinkError> {
        self.log.lock().unwrap().records.push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<SinkReport, SinkError> {
        let mut log = self.log.lock().unwrap();
        log.flushes += 1;
        if log.records.is_empty() {
            Ok(SinkReport::Empty)
        } else {
            Ok(SinkReport::Written {
                path: PathBuf::from("memory"),
                rows: log.records.len(),
                duplicates: 0,
            })
        }
    }
}

pub fn drain(rx: &crossbeam_channel::Receiver<CrawlEvent>) -> Vec<CrawlEvent> {
    rx.try_iter().collect()
}

pub fn logs(events: &[CrawlEvent], level: LogLevel) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            CrawlEvent::Log { level: l, message } if *l == level => Some(message.clone()),
            _ => None,
        })
        .collect()
}

pub fn names(prefix: &str, range: std::ops::RangeInclusive<usize>) -> Vec<String> {
    range.map(|i| format!("{prefix}{i}")).collect()
}
