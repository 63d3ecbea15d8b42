use std::io::prelude::*;
use std::time::Duration;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use scraper::{Html, Selector};
use tokio::time::{sleep, Instant};

use crate::config::HttpRendererConfig;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Timed out loading {0}")]
    Timeout(String),
    #[error("Renderer session lost: {0}")]
    SessionLost(String),
    #[error("Couldn't navigate to {url}: {message}")]
    Navigation { url: String, message: String },
    #[error("Invalid selector {0:?}")]
    Selector(String),
}

impl RenderError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionLost(_) | Self::Selector(_))
    }
}

/// A page-rendering session, exclusively owned by one run.
#[async_trait]
pub trait Renderer: Sized + Send {
    type Config: Clone + Send + 'static;

    async fn open(config: &Self::Config) -> Result<Self, RenderError>;

    async fn goto(&mut self, url: &str) -> Result<(), RenderError>;

    /// Waits until the current page contains at least one `selector` match.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), RenderError>;

    fn content(&self) -> Result<&str, RenderError>;

    fn current_url(&self) -> Option<&str>;

    async fn back(&mut self) -> Result<(), RenderError>;

    async fn close(&mut self) -> Result<(), RenderError>;
}

pub fn has_match(content: &str, selector: &str) -> Result<bool, RenderError> {
    let selector =
        Selector::parse(selector).map_err(|_| RenderError::Selector(selector.to_string()))?;
    let html = Html::parse_document(content);
    let found = html.select(&selector).next().is_some();
    Ok(found)
}

/// Pages kept for [`Renderer::back`]: the current one and the one before.
const HISTORY_LEN: usize = 2;

#[derive(Debug)]
struct Page {
    url: String,
    content: String,
}

/// Plain HTTP renderer: pages are fetched, not executed.
pub struct HttpRenderer {
    client: Option<reqwest::Client>,
    config: HttpRendererConfig,
    history: Vec<Page>,
}

impl HttpRenderer {
    fn client(&self) -> Result<&reqwest::Client, RenderError> {
        self.client
            .as_ref()
            .ok_or_else(|| RenderError::SessionLost("renderer closed".into()))
    }

    async fn download(&self, url: &str) -> Result<String, RenderError> {
        let nav_err = |e: reqwest::Error| {
            if e.is_timeout() {
                RenderError::Timeout(url.to_string())
            } else {
                RenderError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let resp = self
            .client()?
            .get(url)
            .header(USER_AGENT, &self.config.user_agent)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(nav_err)?;

        let gzipped = matches!(
            resp.headers().get(CONTENT_TYPE),
            Some(c) if c == "application/x-gzip" || c == "application/gzip"
        );

        if gzipped {
            let compressed = resp.bytes().await.map_err(nav_err)?;
            let mut gz = GzDecoder::new(&compressed[..]);
            let mut page = String::new();
            gz.read_to_string(&mut page)
                .map_err(|e| RenderError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            Ok(page)
        } else {
            resp.text().await.map_err(nav_err)
        }
    }

    fn current(&self) -> Result<&Page, RenderError> {
        self.client()?;
        self.history
            .last()
            .ok_or_else(|| RenderError::Navigation {
                url: String::new(),
                message: "no page loaded".into(),
            })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    type Config = HttpRendererConfig;

    async fn open(config: &HttpRendererConfig) -> Result<Self, RenderError> {
        let client = reqwest::ClientBuilder::new()
            .gzip(true)
            .deflate(true)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| RenderError::SessionLost(e.to_string()))?;

        Ok(Self {
            client: Some(client),
            config: config.clone(),
            history: vec![],
        })
    }

    async fn goto(&mut self, url: &str) -> Result<(), RenderError> {
        let content = self.download(url).await?;
        self.history.push(Page {
            url: url.to_string(),
            content,
        });
        let excess = self.history.len().saturating_sub(HISTORY_LEN);
        self.history.drain(..excess);
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), RenderError> {
        let deadline = Instant::now() + timeout;
        let poll = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            let url = {
                let page = self.current()?;
                if has_match(&page.content, selector)? {
                    return Ok(());
                }
                page.url.clone()
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(RenderError::Timeout(url));
            }
            sleep(poll.min(deadline - now)).await;

            let content = self.download(&url).await?;
            if let Some(page) = self.history.last_mut() {
                page.content = content;
            }
        }
    }

    fn content(&self) -> Result<&str, RenderError> {
        self.current().map(|p| p.content.as_str())
    }

    fn current_url(&self) -> Option<&str> {
        self.history.last().map(|p| p.url.as_str())
    }

    async fn back(&mut self) -> Result<(), RenderError> {
        self.client()?;
        if self.history.len() < 2 {
            return Err(RenderError::Navigation {
                url: String::new(),
                message: "no previous page".into(),
            });
        }
        self.history.pop();
        let url = self.current()?.url.clone();
        let content = self.download(&url).await?;
        if let Some(page) = self.history.last_mut() {
            page.content = content;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        self.history.clear();
        match self.client.take() {
            Some(_) => Ok(()),
            None => Err(RenderError::SessionLost("renderer already closed".into())),
        }
    }
}
