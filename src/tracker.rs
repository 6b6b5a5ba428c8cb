// src/tracker.rs

use crate::clock::{Clock, SystemClock};
use crate::events::{EventBus, TrackerEvent};
use crate::models::{day_key, KhatamTarget, ReadingLogEntry, TOTAL_PAGES};
use crate::state_manager::{StateError, StateManager};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

const LOG_COLLECTION: &str = "reading_log";
const TARGET_COLLECTION: &str = "khatam";
const ACTIVE_TARGET_KEY: &str = "active";

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("state manager error: {0}")]
    State(#[from] StateError),
    #[error("no active khatam target")]
    NoActiveTarget,
    #[error("page {0} is outside 1..=604")]
    InvalidPage(u16),
}

fn check_page(page: u16) -> Result<u16, TrackerError> {
    if (1..=TOTAL_PAGES).contains(&page) {
        Ok(page)
    } else {
        Err(TrackerError::InvalidPage(page))
    }
}

/// Daily reading log plus the single active completion target.
///
/// Every call reads and writes through the store; nothing is cached here.
/// Two overlapping `advance` calls are last-write-wins.
#[derive(Clone)]
pub struct ReadingTracker {
    store: StateManager,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl ReadingTracker {
    pub fn new(store: StateManager, events: EventBus) -> Self {
        Self::with_clock(store, events, Arc::new(SystemClock))
    }

    pub fn with_clock(store: StateManager, events: EventBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            events,
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Starts a new target, replacing any previous one.
    pub async fn start_target(
        &self,
        user_name: &str,
        start_page: u16,
    ) -> Result<KhatamTarget, TrackerError> {
        let target = KhatamTarget::new(user_name.to_owned(), check_page(start_page)?, self.clock.now());
        self.store
            .set(TARGET_COLLECTION, ACTIVE_TARGET_KEY, &target)
            .await?;
        info!(user = %target.user_name, page = start_page, "khatam target started");
        self.events.publish(TrackerEvent::Changed);
        Ok(target)
    }

    pub async fn active_target(&self) -> Result<Option<KhatamTarget>, TrackerError> {
        let target: Option<KhatamTarget> =
            self.store.get(TARGET_COLLECTION, ACTIVE_TARGET_KEY).await?;
        Ok(target.filter(|t| t.is_active))
    }

    /// Moves the page pointer of the active target to `new_page`.
    ///
    /// Only forward movement is logged as reading. Reaching the last page
    /// publishes [`TrackerEvent::Completed`] on every call, and the target
    /// stays active until [`reset_target`](Self::reset_target).
    pub async fn advance(&self, new_page: u16) -> Result<KhatamTarget, TrackerError> {
        let new_page = check_page(new_page)?;
        let mut target = self
            .active_target()
            .await?
            .ok_or(TrackerError::NoActiveTarget)?;

        let delta = i32::from(new_page) - i32::from(target.current_page);
        if delta > 0 {
            self.add_to_today(delta as u32).await?;
        }

        target.current_page = new_page;
        target.last_updated = self.clock.now();
        self.store
            .set(TARGET_COLLECTION, ACTIVE_TARGET_KEY, &target)
            .await?;
        debug!(page = new_page, delta, "khatam target advanced");

        self.events.publish(TrackerEvent::Changed);
        if target.is_complete() {
            info!(user = %target.user_name, "khatam completed");
            self.events.publish(TrackerEvent::Completed(target.clone()));
        }
        Ok(target)
    }

    /// Deactivates the current target. Returns it, if there was one.
    pub async fn reset_target(&self) -> Result<Option<KhatamTarget>, TrackerError> {
        let Some(mut target) = self.active_target().await? else {
            return Ok(None);
        };
        target.is_active = false;
        target.last_updated = self.clock.now();
        self.store
            .set(TARGET_COLLECTION, ACTIVE_TARGET_KEY, &target)
            .await?;
        info!(user = %target.user_name, page = target.current_page, "khatam target reset");
        self.events.publish(TrackerEvent::Changed);
        Ok(Some(target))
    }

    /// Adds pages to today's log entry without touching the target.
    pub async fn record_pages(&self, pages: u32) -> Result<ReadingLogEntry, TrackerError> {
        let entry = self.add_to_today(pages).await?;
        self.events.publish(TrackerEvent::Changed);
        Ok(entry)
    }

    /// All log entries, oldest first.
    pub async fn log(&self) -> Result<Vec<ReadingLogEntry>, TrackerError> {
        let mut entries: Vec<ReadingLogEntry> = self.store.list(LOG_COLLECTION).await?;
        entries.sort_by_key(|e| e.date);
        Ok(entries)
    }

    pub async fn today(&self) -> Result<ReadingLogEntry, TrackerError> {
        let today = self.clock.today();
        let entry = self.store.get(LOG_COLLECTION, &day_key(today)).await?;
        Ok(entry.unwrap_or_else(|| ReadingLogEntry::new(today, 0)))
    }

    async fn add_to_today(&self, pages: u32) -> Result<ReadingLogEntry, TrackerError> {
        let mut entry = self.today().await?;
        entry.pages_read = entry.pages_read.saturating_add(pages);
        self.store.set(LOG_COLLECTION, &entry.key(), &entry).await?;
        Ok(entry)
    }
}
