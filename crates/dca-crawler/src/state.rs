use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::url::{Direction, FilterSelection, ListingQuery};

/// Caller-chosen parameters of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSettings {
    pub max_items: Option<usize>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub filters: FilterSelection,
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    NoMoreItems,
    RepeatedItem,
    ItemCapReached,
    Cancelled,
    Fatal(String),
}

impl Termination {
    pub fn run_state(&self) -> RunState {
        match self {
            Self::NoMoreItems | Self::RepeatedItem | Self::ItemCapReached => RunState::Completed,
            Self::Cancelled => RunState::Cancelled,
            Self::Fatal(_) => RunState::Failed,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMoreItems => write!(f, "no more items"),
            Self::RepeatedItem => write!(f, "repeated item detected"),
            Self::ItemCapReached => write!(f, "item cap reached"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Fatal(e) => write!(f, "failed: {e}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }
}

/// Traversal state of a single run, owned by the worker.
#[derive(Debug)]
pub struct CrawlState {
    pub settings: RunSettings,
    pub page: usize,
    pub direction: Direction,
    pub pages_visited: usize,
    pub items_visited: usize,
    pub items_extracted: usize,
    pub last_page: Option<usize>,
    pub total_items: Option<usize>,
    pagination_read: bool,
    switched: bool,
    visited: HashSet<String>,
}

impl CrawlState {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            settings,
            page: 1,
            direction: Direction::NewestFirst,
            pages_visited: 0,
            items_visited: 0,
            items_extracted: 0,
            last_page: None,
            total_items: None,
            pagination_read: false,
            switched: false,
            visited: HashSet::new(),
        }
    }

    pub fn query(&self) -> ListingQuery<'_> {
        ListingQuery {
            page: self.page,
            direction: self.direction,
            date_from: self.settings.date_from,
            date_to: self.settings.date_to,
            filters: &self.settings.filters,
        }
    }

    pub fn pagination_read(&self) -> bool {
        self.pagination_read
    }

    /// Records the pagination info of the first listing page. Later calls are ignored.
    pub fn set_pagination(&mut self, last_page: Option<usize>, total_items: Option<usize>) {
        if self.pagination_read {
            return;
        }
        self.last_page = last_page;
        self.total_items = total_items;
        self.pagination_read = true;
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    /// Returns false if `url` was already visited during this run.
    pub fn mark_visited(&mut self, url: &str) -> bool {
        if !self.visited.insert(url.to_string()) {
            return false;
        }
        self.items_visited += 1;
        true
    }

    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }

    pub fn cap_reached(&self) -> bool {
        matches!(self.settings.max_items, Some(cap) if self.items_extracted >= cap)
    }

    /// Progress target: the item cap when set, the archive's result count otherwise.
    pub fn target(&self) -> Option<usize> {
        self.settings.max_items.or(self.total_items)
    }

    pub fn complete_page(&mut self) {
        self.pages_visited += 1;
        self.page += 1;
    }

    pub fn skip_page(&mut self) {
        self.page += 1;
    }

    pub fn half_page(&self) -> Option<usize> {
        self.last_page.map(|last| last.div_ceil(2))
    }

    pub fn switched(&self) -> bool {
        self.switched
    }

    /// Flips to oldest-first from page 1 once the midpoint is reached.
    ///
    /// Works around the archive serving unstable results for deep pages of a
    /// single sort order. Fires at most once per run.
    pub fn try_switch_direction(&mut self) -> bool {
        match self.half_page() {
            Some(half) if !self.switched && self.page >= half => {
                self.direction = Direction::OldestFirst;
                self.page = 1;
                self.switched = true;
                true
            }
            _ => false,
        }
    }
}
