use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use mushaf_core::cache::{DiskCache, MemoryCache, PageCache, PageKey, PageSource, ResourceCache};
use mushaf_core::downloader::{
    DownloadError, DownloadSettings, EditionDownloader, FetchError, Fetcher, HttpFetcher,
};
use mushaf_core::editions::{Edition, EditionRegistry};
use rstest::*;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Records every requested URL; fails or hangs on chosen pages.
#[derive(Default)]
struct ScriptedFetcher {
    requests: Mutex<Vec<String>>,
    failing: HashSet<u16>,
    hanging: HashSet<u16>,
}

impl ScriptedFetcher {
    fn failing(units: impl IntoIterator<Item = u16>) -> Self {
        Self {
            failing: units.into_iter().collect(),
            ..Self::default()
        }
    }

    fn hanging_at(unit: u16) -> Self {
        Self {
            hanging: HashSet::from([unit]),
            ..Self::default()
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Page number from the `NNN.ext` tail of a page URL.
fn unit_of(url: &str) -> u16 {
    let stem = url.rsplit('/').next().unwrap().split('.').next().unwrap();
    stem[stem.len() - 3..].parse().unwrap()
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        self.requests.lock().unwrap().push(url.to_owned());
        let unit = unit_of(url);
        if self.hanging.contains(&unit) {
            std::future::pending::<()>().await;
        }
        if self.failing.contains(&unit) {
            return Err(FetchError::Status {
                status: 503,
                url: url.to_owned(),
            });
        }
        Ok(Bytes::from(format!("page {unit}")))
    }
}

#[fixture]
fn backend() -> Arc<MemoryCache> {
    Arc::new(MemoryCache::new())
}

fn cache_over(backend: Arc<MemoryCache>) -> ResourceCache {
    ResourceCache::new(EditionRegistry::builtin(), backend)
}

fn downloader(
    cache: ResourceCache,
    fetcher: &Arc<ScriptedFetcher>,
) -> EditionDownloader<Arc<ScriptedFetcher>> {
    EditionDownloader::new(cache, fetcher.clone(), &DownloadSettings::default())
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test]
async fn full_download_caches_every_page(backend: Arc<MemoryCache>) {
    let cache = cache_over(backend.clone());
    let fetcher = Arc::new(ScriptedFetcher::default());
    let report = downloader(cache.clone(), &fetcher)
        .download(Some("madani"), |_| {}, &CancellationToken::new())
        .await
        .expect("download should succeed");

    assert_eq!(report.fetched, 604);
    assert_eq!(fetcher.requests().len(), 604);
    assert!(cache.is_fully_cached(Some("madani")).await);
    assert!(!cache.is_fully_cached(Some("tajweed")).await);
    assert_eq!(
        cache.resolve(604, Some("madani")).await,
        PageSource::Cached(Bytes::from("page 604"))
    );
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test]
async fn rerun_only_fetches_missing_pages(backend: Arc<MemoryCache>) {
    for unit in 1..=300 {
        backend
            .put(&PageKey::new("madani", unit), Bytes::from_static(b"old"))
            .await
            .unwrap();
    }
    let fetcher = Arc::new(ScriptedFetcher::default());
    let report = downloader(cache_over(backend.clone()), &fetcher)
        .download(Some("madani"), |_| {}, &CancellationToken::new())
        .await
        .unwrap();

    let requests = fetcher.requests();
    assert_eq!(requests.len(), 304);
    assert!(requests.iter().all(|url| unit_of(url) > 300));
    assert_eq!((report.fetched, report.skipped), (304, 300));

    // A second run finds everything cached.
    let again = Arc::new(ScriptedFetcher::default());
    downloader(cache_over(backend), &again)
        .download(Some("madani"), |_| {}, &CancellationToken::new())
        .await
        .unwrap();
    assert!(again.requests().is_empty());
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test]
async fn already_cancelled_makes_no_requests(backend: Arc<MemoryCache>) {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let fetcher = Arc::new(ScriptedFetcher::default());
    let mut progress = Vec::new();

    let err = downloader(cache_over(backend.clone()), &fetcher)
        .download(None, |p| progress.push(p), &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(fetcher.requests().is_empty());
    assert!(progress.is_empty());
    assert!(backend.is_empty().await);
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test]
async fn cancelling_mid_request_keeps_earlier_pages(backend: Arc<MemoryCache>) {
    let cancel = CancellationToken::new();
    let fetcher = Arc::new(ScriptedFetcher::hanging_at(10));
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = downloader(cache_over(backend.clone()), &fetcher)
        .download(Some("madani"), |_| {}, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, DownloadError::Cancelled));
    assert_eq!(backend.len().await, 9);
    assert_eq!(fetcher.requests().len(), 10);
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test]
async fn fifty_one_failures_exceed_budget(backend: Arc<MemoryCache>) {
    let cache = cache_over(backend);
    let fetcher = Arc::new(ScriptedFetcher::failing((1..=604).step_by(11).take(51)));
    assert_eq!(fetcher.failing.len(), 51);
    let mut last_progress = 0;

    let err = downloader(cache.clone(), &fetcher)
        .download(Some("madani"), |p| last_progress = p, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DownloadError::TooManyFailures { failed: 51, total: 604 }
    ));
    assert_eq!(last_progress, 100);
    assert!(!cache.is_fully_cached(Some("madani")).await);
    assert_eq!(cache.cached_count(Some("madani")).await, 553);
    for unit in 1..=604u16 {
        let cached = cache.resolve(unit, Some("madani")).await.is_cached();
        assert_eq!(cached, !fetcher.failing.contains(&unit), "unit {unit}");
    }
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test]
async fn fifty_failures_stay_within_budget(backend: Arc<MemoryCache>) {
    let fetcher = Arc::new(ScriptedFetcher::failing(1..=50));
    let report = downloader(cache_over(backend), &fetcher)
        .download(Some("madani"), |_| {}, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!((report.fetched, report.failed), (554, 50));
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test]
async fn progress_is_monotonic_and_reaches_100(backend: Arc<MemoryCache>) {
    let fetcher = Arc::new(ScriptedFetcher::failing([3, 300]));
    let mut progress = Vec::new();
    downloader(cache_over(backend), &fetcher)
        .download(Some("tajweed"), |p| progress.push(p), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(progress.len(), 604);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress[301], 50);
    assert_eq!(*progress.last().unwrap(), 100);
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test]
async fn delete_all_then_redownload(backend: Arc<MemoryCache>) {
    let cache = cache_over(backend);
    let first = Arc::new(ScriptedFetcher::default());
    downloader(cache.clone(), &first)
        .download(Some("madani"), |_| {}, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(cache.delete_all(Some("madani")).await.unwrap(), 604);
    assert!(!cache.resolve(1, Some("madani")).await.is_cached());

    let second = Arc::new(ScriptedFetcher::default());
    downloader(cache, &second)
        .download(Some("madani"), |_| {}, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.requests().len(), 604);
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test]
async fn disk_backed_download_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let mut edition = Edition::new("mini", "https://cdn.test/mini/", "mini", ".png");
    edition.total_units = 12;
    let registry = EditionRegistry::new(vec![edition], "mini").unwrap();

    {
        let disk = DiskCache::open(dir.path()).await.unwrap();
        let cache = ResourceCache::new(registry.clone(), Arc::new(disk));
        let fetcher = Arc::new(ScriptedFetcher::failing([5]));
        downloader(cache, &fetcher)
            .download(None, |_| {}, &CancellationToken::new())
            .await
            .unwrap();
    }

    let disk = DiskCache::open(dir.path()).await.unwrap();
    let cache = ResourceCache::new(registry, Arc::new(disk));
    assert_eq!(cache.cached_count(None).await, 11);
    assert!(!cache.is_fully_cached(None).await);

    let fetcher = Arc::new(ScriptedFetcher::default());
    downloader(cache.clone(), &fetcher)
        .download(None, |_| {}, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(fetcher.requests(), vec!["https://cdn.test/mini/005.png".to_owned()]);
    assert!(cache.is_fully_cached(None).await);
}

/// Serves `<n>.png` paths with 200 and anything else with 404, one request per connection.
async fn serve_pages() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let request = String::from_utf8_lossy(&buf);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_owned();
                let response = if path.ends_with(".png") {
                    let body = format!("image at {path}");
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    )
                } else {
                    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_owned()
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

/// Ignores proxy settings from the environment so requests reach the local server.
fn local_fetcher() -> HttpFetcher {
    HttpFetcher::with_client(reqwest::Client::builder().no_proxy().build().unwrap())
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test]
async fn http_fetcher_treats_non_2xx_as_failure() {
    let base = serve_pages().await;
    let fetcher = local_fetcher();

    let body = fetcher.fetch(&format!("{base}/pages/001.png")).await.unwrap();
    assert_eq!(body, Bytes::from("image at /pages/001.png"));

    let err = fetcher.fetch(&format!("{base}/pages/001.gif")).await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }));
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test]
async fn http_download_against_local_server() {
    let base = serve_pages().await;
    let mut good = Edition::new("good", &format!("{base}/good/"), "good", ".png");
    good.total_units = 5;
    let mut bad = Edition::new("bad", &format!("{base}/bad/"), "bad", ".jpg");
    bad.total_units = 5;
    let registry = EditionRegistry::new(vec![good, bad], "good").unwrap();
    let cache = ResourceCache::new(registry, Arc::new(MemoryCache::new()));
    let settings = DownloadSettings {
        max_failures: 2,
        ..DownloadSettings::default()
    };
    let downloader = EditionDownloader::new(cache.clone(), local_fetcher(), &settings);

    let report = downloader
        .download(Some("good"), |_| {}, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.fetched, 5);

    let err = downloader
        .download(Some("bad"), |_| {}, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::TooManyFailures { failed: 5, total: 5 }));
    assert_eq!(cache.cached_count(Some("bad")).await, 0);
}
