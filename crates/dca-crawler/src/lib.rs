mod config;
mod control;
mod crawler;
mod events;
mod renderer;
mod scrapable;
mod session;
mod state;
mod url;

pub use config::{CrawlerConfig, FilterParams, HttpRendererConfig, ListingConfig, OnError};
pub use control::{channel as control_channel, Command, CrawlHandle, Gate};
pub use crawler::{spawn_crawl, CrawlOutcome, Crawler};
pub use events::{CrawlEvent, EventTx, LogLevel, RunSummary, SinkReport};
pub use renderer::{has_match, HttpRenderer, RenderError, Renderer};
pub use scrapable::{Scrapable, Sink, SinkError};
pub use session::{Session, SessionError};
pub use state::{CrawlState, RunSettings, RunState, Termination};
pub use url::{build_url, parse_date, Direction, FilterSelection, ListingQuery, DATE_FORMAT};

pub use anyhow;
pub use async_trait::async_trait;
