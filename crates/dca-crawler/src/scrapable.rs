use crate::events::SinkReport;

/// Archive-specific markup knowledge.
pub trait Scrapable: Send {
    type Config: Clone + Send + 'static;
    type Record: Clone + Send + 'static;

    fn new(config: &Self::Config) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// CSS selector matching item links on a listing page.
    fn item_selector(&self) -> &str;

    /// Absolute item URLs of a listing page, in page order.
    fn item_links(&self, page: &str, page_url: &str) -> Vec<String>;

    /// Number of the last listing page, read from the pagination control.
    fn last_page(&self, page: &str) -> Option<usize>;

    /// Total number of results announced by the listing page.
    fn total_items(&self, page: &str) -> Option<usize>;

    /// Extracts one record from a rendered item page.
    fn scrap(&mut self, page: &str, url: &str) -> anyhow::Result<Self::Record>;
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(String),
}

/// Durable destination of extracted records.
pub trait Sink<R>: Send {
    type Config: Clone + Send + 'static;

    fn open(config: &Self::Config) -> anyhow::Result<Self>
    where
        Self: Sized;

    fn append(&mut self, record: &R) -> Result<(), SinkError>;

    /// Writes everything appended so far, without duplicates.
    fn flush(&mut self) -> Result<SinkReport, SinkError>;
}
