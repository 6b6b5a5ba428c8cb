// src/downloader.rs

use crate::cache::{CacheError, PageKey, ResourceCache};
use crate::limiter::RequestLimiter;
use crate::models::DownloadJob;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Failure to fetch a single page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected status {status} for {url}")]
    Status { status: u16, url: String },
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download cancelled")]
    Cancelled,
    #[error("too many failed pages: {failed} of {total}")]
    TooManyFailures { failed: u16, total: u16 },
    #[error("offline cache is not available")]
    CacheUnavailable,
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

impl DownloadError {
    /// Cancellation is a user decision rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }
}

/// Plain GET by URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        (**self).fetch(url).await
    }
}

/// Tunables for bulk downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// The job fails once more than this many pages could not be fetched.
    pub max_failures: u16,
    /// Zero means no pacing beyond the sequential loop itself.
    pub requests_per_second: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_failures: 50,
            requests_per_second: 0,
            request_timeout_secs: 30,
            user_agent: format!("mushaf/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// [`Fetcher`] backed by a shared `reqwest` client. Non-2xx responses are failures.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(settings: &DownloadSettings) -> Result<Self, FetchError> {
        let mut builder = Client::builder().user_agent(settings.user_agent.clone());
        if settings.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(settings.request_timeout_secs));
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }
        Ok(resp.bytes().await?)
    }
}

/// Outcome of a download that stayed within its failure budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    pub fetched: u16,
    pub skipped: u16,
    pub failed: u16,
}

/// Fills the offline cache with every page of an edition, one page at a time.
///
/// Pages already cached are skipped, so re-running an interrupted download
/// only fetches what is missing. Concurrent calls are not coordinated here.
pub struct EditionDownloader<F: Fetcher> {
    cache: ResourceCache,
    fetcher: F,
    limiter: RequestLimiter,
    max_failures: u16,
}

impl<F: Fetcher> EditionDownloader<F> {
    pub fn new(cache: ResourceCache, fetcher: F, settings: &DownloadSettings) -> Self {
        Self {
            cache,
            fetcher,
            limiter: RequestLimiter::new(settings.requests_per_second),
            max_failures: settings.max_failures,
        }
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Downloads every missing page of `edition_id`.
    ///
    /// `on_progress` receives the rounded-down percentage of processed pages
    /// after each page, whether it succeeded or not. The cache keeps whatever
    /// was stored when the job is cancelled or fails.
    pub async fn download<P>(
        &self,
        edition_id: Option<&str>,
        mut on_progress: P,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport, DownloadError>
    where
        P: FnMut(u8),
    {
        let edition = self.cache.edition(edition_id);
        let backend = self
            .cache
            .backend()
            .ok_or(DownloadError::CacheUnavailable)?;
        let mut job = DownloadJob::new(edition.total_units);
        info!(edition = %edition.id, total = job.total_units, "starting download");

        for unit in edition.units() {
            if cancel.is_cancelled() {
                info!(edition = %edition.id, completed = job.completed, "download cancelled");
                return Err(DownloadError::Cancelled);
            }

            let key = PageKey::new(&edition.partition, unit);
            let url = edition.page_url(unit);

            let cached = match backend.contains(&key).await {
                Ok(cached) => cached,
                Err(e) => {
                    warn!(unit, error = %e, "cache lookup failed, fetching anyway");
                    false
                }
            };

            if cached {
                job.skipped += 1;
            } else {
                self.limiter.acquire().await;
                let fetched = tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(edition = %edition.id, unit, "download cancelled mid-request");
                        return Err(DownloadError::Cancelled);
                    }
                    result = self.fetcher.fetch(&url) => result,
                };

                match fetched {
                    Ok(data) => match backend.put(&key, data).await {
                        Ok(()) => {
                            job.fetched += 1;
                            debug!(unit, "page cached");
                        }
                        Err(e) => {
                            job.errors += 1;
                            warn!(unit, error = %e, "failed to store page");
                        }
                    },
                    Err(e) => {
                        job.errors += 1;
                        warn!(unit, %url, error = %e, "failed to fetch page");
                    }
                }
            }

            job.completed += 1;
            on_progress(job.percent());
        }

        if job.errors > self.max_failures {
            warn!(edition = %edition.id, failed = job.errors, "download failed");
            return Err(DownloadError::TooManyFailures {
                failed: job.errors,
                total: job.total_units,
            });
        }

        info!(
            edition = %edition.id,
            fetched = job.fetched,
            skipped = job.skipped,
            failed = job.errors,
            "download finished"
        );
        Ok(DownloadReport {
            fetched: job.fetched,
            skipped: job.skipped,
            failed: job.errors,
        })
    }
}
