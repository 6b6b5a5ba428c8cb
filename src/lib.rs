pub mod analytics;
pub mod annotations;
pub mod cache;
pub mod clock;
pub mod config;
pub mod downloader;
pub mod editions;
pub mod events;
pub mod limiter;
pub mod models;
pub mod state_manager;
pub mod tracker;

/// Re-exports of the types most callers need.
pub mod prelude {
    pub use crate::analytics::{calculate_khatam_analytics, calculate_streak, heatmap, KhatamAnalytics};
    pub use crate::annotations::Annotations;
    pub use crate::cache::{DiskCache, MemoryCache, PageCache, PageSource, ResourceCache};
    pub use crate::config::Config;
    pub use crate::downloader::{DownloadError, DownloadReport, EditionDownloader, HttpFetcher};
    pub use crate::editions::{Edition, EditionRegistry};
    pub use crate::events::{EventBus, TrackerEvent};
    pub use crate::models::{KhatamTarget, ReadingLogEntry, TOTAL_PAGES};
    pub use crate::state_manager::StateManager;
    pub use crate::tracker::ReadingTracker;
}
