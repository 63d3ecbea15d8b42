use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default)]
    pub listing: ListingConfig,

    #[serde(default = "default_listing_timeout_ms")]
    pub listing_timeout_ms: u64,

    #[serde(default = "default_back_timeout_ms")]
    pub back_timeout_ms: u64,

    #[serde(default = "default_on_item_error")]
    pub on_item_error: OnError,

    #[serde(default = "default_on_page_timeout")]
    pub on_page_timeout: OnError,

    #[serde(default = "default_max_page_skips")]
    pub max_page_skips: usize,

    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            listing: ListingConfig::default(),
            listing_timeout_ms: default_listing_timeout_ms(),
            back_timeout_ms: default_back_timeout_ms(),
            on_item_error: default_on_item_error(),
            on_page_timeout: default_on_page_timeout(),
            max_page_skips: default_max_page_skips(),
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

impl CrawlerConfig {
    pub fn listing_timeout(&self) -> Duration {
        Duration::from_millis(self.listing_timeout_ms)
    }

    pub fn back_timeout(&self) -> Duration {
        Duration::from_millis(self.back_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

fn default_listing_timeout_ms() -> u64 {
    3_000
}

fn default_back_timeout_ms() -> u64 {
    5_000
}

fn default_on_item_error() -> OnError {
    OnError::SkipAndLog
}

fn default_on_page_timeout() -> OnError {
    OnError::SkipAndLog
}

fn default_max_page_skips() -> usize {
    5
}

fn default_join_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OnError {
    Fail,
    SkipAndLog,
}

/// Shape of the archive's listing URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_view")]
    pub view: String,

    #[serde(default)]
    pub params: FilterParams,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            page_size: default_page_size(),
            view: default_view(),
            params: FilterParams::default(),
        }
    }
}

fn default_base_url() -> String {
    String::from("https://euvsdisinfo.eu/disinformation-cases")
}

fn default_page_size() -> usize {
    60
}

fn default_view() -> String {
    String::from("grid")
}

/// Query parameter names used for the repeated filter codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterParams {
    #[serde(default = "default_country_param")]
    pub country: String,
    #[serde(default = "default_language_param")]
    pub language: String,
    #[serde(default = "default_tag_param")]
    pub tag: String,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            country: default_country_param(),
            language: default_language_param(),
            tag: default_tag_param(),
        }
    }
}

fn default_country_param() -> String {
    String::from("country[]")
}

fn default_language_param() -> String {
    String::from("language[]")
}

fn default_tag_param() -> String {
    String::from("tag[]")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRendererConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for HttpRendererConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            request_timeout_ms: default_request_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_user_agent() -> String {
    String::from("Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0")
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let conf: CrawlerConfig = serde_yaml::from_str(
            r#"
listingTimeoutMs: 1500
onItemError: Fail
listing:
  params:
    country: "disinfo_countries[]"
"#,
        )
        .unwrap();

        assert_eq!(conf.listing_timeout_ms, 1500);
        assert_eq!(conf.on_item_error, OnError::Fail);
        assert_eq!(conf.on_page_timeout, OnError::SkipAndLog);
        assert_eq!(conf.back_timeout_ms, 5_000);
        assert_eq!(conf.listing.page_size, 60);
        assert_eq!(conf.listing.params.country, "disinfo_countries[]");
        assert_eq!(conf.listing.params.language, "language[]");
    }

    #[test]
    fn empty_yaml_is_default() {
        let conf: CrawlerConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(conf.listing, ListingConfig::default());
        assert_eq!(conf.max_page_skips, 5);
    }
}
