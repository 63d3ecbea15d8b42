use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::ListingConfig;

pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Listing sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    NewestFirst,
    OldestFirst,
}

impl Direction {
    pub fn as_param(&self) -> &'static str {
        match self {
            Self::NewestFirst => "desc",
            Self::OldestFirst => "asc",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewestFirst => write!(f, "newest-first"),
            Self::OldestFirst => write!(f, "oldest-first"),
        }
    }
}

/// Filter codes selected for a run, in selection order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub countries: Vec<String>,
    pub languages: Vec<String>,
    pub tags: Vec<String>,
}

impl FilterSelection {
    pub fn is_empty(&self) -> bool {
        self.countries.is_empty() && self.languages.is_empty() && self.tags.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ListingQuery<'a> {
    pub page: usize,
    pub direction: Direction,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub filters: &'a FilterSelection,
}

/// Builds the listing URL for one page of results.
///
/// `{base}[/page/{n}/]?view=..&numberposts=..&sort=..[&date=..][&country[]=..]*[&language[]=..]*[&tag[]=..]*`
pub fn build_url(listing: &ListingConfig, query: &ListingQuery) -> String {
    let base = listing.base_url.trim_end_matches('/');

    let mut url = if query.page > 1 {
        format!("{base}/page/{}/?", query.page)
    } else {
        format!("{base}?")
    };

    url.push_str(&format!(
        "view={}&numberposts={}&sort={}",
        listing.view,
        listing.page_size,
        query.direction.as_param()
    ));

    if let (Some(from), Some(to)) = (query.date_from, query.date_to) {
        url.push_str(&format!(
            "&date={}%20-%20{}",
            from.format(DATE_FORMAT),
            to.format(DATE_FORMAT)
        ));
    }

    let params = &listing.params;
    for (name, codes) in [
        (&params.country, &query.filters.countries),
        (&params.language, &query.filters.languages),
        (&params.tag, &query.filters.tags),
    ] {
        for code in codes {
            url.push_str(&format!("&{name}={}", urlencoding::encode(code)));
        }
    }

    url
}

pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|e| anyhow::anyhow!("Invalid date {s:?}, expected dd.mm.yyyy: {e}"))
}
