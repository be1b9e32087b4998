//! Query pipeline deriving the displayed appointment list.
//!
//! Pipeline: Search → Status filter → Date filter → Sort (date, then time)
//!
//! Every step is a pure function of the snapshot and the [`QueryState`].

mod summary;

pub use summary::*;

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{AppointmentRecord, AppointmentStatus, UnknownStatus};

/// Status filter with an "any" sentinel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    #[default]
    Any,
    Only(AppointmentStatus),
}

impl StatusFilter {
    pub fn matches(self, status: AppointmentStatus) -> bool {
        match self {
            StatusFilter::Any => true,
            StatusFilter::Only(wanted) => wanted == status,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "any" | "all" => Ok(StatusFilter::Any),
            _ => s.parse().map(StatusFilter::Only),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::Any => f.write_str("all"),
            StatusFilter::Only(status) => f.write_str(status.as_str()),
        }
    }
}

/// UI-owned query parameters. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct QueryState {
    /// Free-text search term (empty matches everything)
    pub search: String,
    /// Status filter
    pub status: StatusFilter,
    /// Selected day; `None` shows every day
    pub date: Option<NaiveDate>,
}

impl QueryState {
    /// Scope the view to a single day.
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Self::default()
        }
    }

    /// Show appointments on every day.
    pub fn all_dates() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = status;
        self
    }
}

/// Case-insensitive substring match against patient name, category, or ID.
///
/// The term is trimmed first, so a blank term matches everything.
pub fn matches_search(record: &AppointmentRecord, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return true;
    }
    [
        record.subject.name.as_str(),
        record.category.label(),
        record.id.as_str(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(&term))
}

/// Run the full pipeline over a snapshot.
pub fn run_query(records: &[AppointmentRecord], query: &QueryState) -> Vec<AppointmentRecord> {
    let mut results: Vec<AppointmentRecord> = records
        .iter()
        .filter(|r| matches_search(r, &query.search))
        .filter(|r| query.status.matches(r.status))
        .filter(|r| query.date.map_or(true, |date| r.date == date))
        .cloned()
        .collect();

    // Stable: equal date+time keeps snapshot order
    results.sort_by_key(AppointmentRecord::starts_at);
    results
}
