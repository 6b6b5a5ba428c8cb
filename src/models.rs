// src/models.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of pages in the canonical mushaf.
pub const TOTAL_PAGES: u16 = 604;

/// Pages read on a single local calendar day.
///
/// Serialized with the date as `YYYY-MM-DD`, which is also the store key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingLogEntry {
    pub date: NaiveDate,
    pub pages_read: u32,
}

impl ReadingLogEntry {
    pub fn new(date: NaiveDate, pages_read: u32) -> Self {
        Self { date, pages_read }
    }

    /// The store key for this entry's day.
    pub fn key(&self) -> String {
        day_key(self.date)
    }
}

/// Formats a calendar day as the fixed-width key used by the reading log.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// The user's completion goal, tracked by the page they are on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KhatamTarget {
    pub user_name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_date: DateTime<Utc>,
    pub current_page: u16,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
    pub is_active: bool,
}

impl KhatamTarget {
    pub fn new(user_name: String, start_page: u16, now: DateTime<Utc>) -> Self {
        Self {
            user_name,
            start_date: now,
            current_page: start_page,
            last_updated: now,
            is_active: true,
        }
    }

    /// Pages still ahead of the reader.
    pub fn remaining_pages(&self) -> u16 {
        TOTAL_PAGES.saturating_sub(self.current_page)
    }

    pub fn is_complete(&self) -> bool {
        self.current_page >= TOTAL_PAGES
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub page: u16,
    pub label: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// A note attached to a page, or a free-standing reflection when `page` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub page: Option<u16>,
    pub text: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new(page: Option<u16>, text: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            page,
            text,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_journal_entry(&self) -> bool {
        self.page.is_none()
    }
}

/// Counters of a single bulk download. Lives only as long as the call that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub total_units: u16,
    /// Units processed so far, fetched, skipped or failed. Only ever increases.
    pub completed: u16,
    pub fetched: u16,
    pub skipped: u16,
    pub errors: u16,
}

impl DownloadJob {
    pub fn new(total_units: u16) -> Self {
        Self {
            total_units,
            completed: 0,
            fetched: 0,
            skipped: 0,
            errors: 0,
        }
    }

    /// Whole-number percentage, rounded down.
    pub fn percent(&self) -> u8 {
        if self.total_units == 0 {
            return 100;
        }
        (u32::from(self.completed) * 100 / u32::from(self.total_units)) as u8
    }
}
