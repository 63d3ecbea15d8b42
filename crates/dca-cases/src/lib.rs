mod filters;
mod record;
mod scraper;
pub mod writer;

pub use filters::{FilterCatalog, FilterError, FilterKind, FilterTable};
pub use record::{CaseRecord, CASE_HEADERS};
pub use scraper::{CaseScraper, ITEM_SELECTOR};
pub use writer::{merge_csv, read_cases, CsvSink, CsvSinkConfig, CsvWriterConfig};

pub use dca_crawler;

/// The crawl session specialised for the case archive.
pub type CaseSession<R = dca_crawler::HttpRenderer> =
    dca_crawler::Session<CaseScraper, R, CsvSink<CaseRecord>>;
