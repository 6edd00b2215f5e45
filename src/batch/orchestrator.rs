// src/batch/orchestrator.rs
use crate::batch::job::{dedup_urls, percent, BatchJob, BatchStatus};
use crate::batch::pagination;
use crate::extractors::{ExtractionEngine, RemoteExtractor};
use crate::loader::{LoadOptions, PageSource};
use crate::model::{ScrapeResult, ScrapedRecord, Selector};
use crate::utils::error::{BatchError, BatchItemError};
use async_trait::async_trait;
use scraper::Html;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const DEFAULT_DELAY_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Pause between consecutive requests.
    pub inter_request_delay_ms: u64,
    /// Upper bound on pages processed, pagination included. 0 means no limit.
    pub max_pages: usize,
    pub follow_pagination: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            inter_request_delay_ms: DEFAULT_DELAY_MS,
            max_pages: 0,
            follow_pagination: false,
        }
    }
}

/// What scraping one page produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageOutcome {
    pub records: Vec<ScrapedRecord>,
    pub next_page: Option<String>,
}

/// One URL in, records out. The orchestrator only talks to this.
#[async_trait]
pub trait PageScraper: Send + Sync {
    async fn scrape_page(&self, url: &str, selectors: &[Selector]) -> Result<PageOutcome, BatchItemError>;
}

/// Loads pages through a `PageSource` and extracts them locally.
pub struct LocalPipeline<S> {
    source: S,
    engine: ExtractionEngine,
    load: LoadOptions,
}

impl<S: PageSource> LocalPipeline<S> {
    pub fn new(source: S, engine: ExtractionEngine, load: LoadOptions) -> Self {
        Self { source, engine, load }
    }
}

#[async_trait]
impl<S: PageSource> PageScraper for LocalPipeline<S> {
    async fn scrape_page(&self, url: &str, selectors: &[Selector]) -> Result<PageOutcome, BatchItemError> {
        let markup = self.source.fetch(url, &self.load).await?;
        Ok(extract_page(&self.engine, &markup, url, selectors))
    }
}

// Parsed trees stay inside this sync call and never cross an await.
fn extract_page(engine: &ExtractionEngine, markup: &str, url: &str, selectors: &[Selector]) -> PageOutcome {
    let document = Html::parse_document(markup);
    let records = engine.extract(&document, selectors);
    let next_page = pagination::find_next_page(&document, url);
    tracing::debug!("{}: {} records, next page {:?}", url, records.len(), next_page);
    PageOutcome { records, next_page }
}

/// Delegates each page to the server-side extraction endpoint.
pub struct RemotePipeline {
    extractor: RemoteExtractor,
    load: LoadOptions,
}

impl RemotePipeline {
    pub fn new(extractor: RemoteExtractor, load: LoadOptions) -> Self {
        Self { extractor, load }
    }
}

#[async_trait]
impl PageScraper for RemotePipeline {
    async fn scrape_page(&self, url: &str, selectors: &[Selector]) -> Result<PageOutcome, BatchItemError> {
        let records = self
            .extractor
            .extract(url, selectors, &self.load)
            .await
            .map_err(|e| BatchItemError::Remote {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(PageOutcome {
            records,
            next_page: None,
        })
    }
}

/// Requests a running batch to stop after its current URL.
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        tracing::info!("Stop requested");
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Settles the published job when `run` is dropped before it finishes.
struct RunGuard<'a> {
    state: &'a watch::Sender<BatchJob>,
    settled: bool,
}

impl RunGuard<'_> {
    fn finish(mut self, status: BatchStatus) {
        self.state.send_modify(|job| job.finish(status));
        self.settled = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("Batch cancelled mid-run, marking it stopped");
            self.state.send_modify(|job| job.finish(BatchStatus::Stopped));
        }
    }
}

/// Runs URL queues through a `PageScraper`, strictly one URL at a time.
pub struct BatchOrchestrator<P> {
    scraper: P,
    stop: StopHandle,
    state: watch::Sender<BatchJob>,
}

impl<P: PageScraper> BatchOrchestrator<P> {
    pub fn new(scraper: P) -> Self {
        let (state, _) = watch::channel(BatchJob::default());
        Self {
            scraper,
            stop: StopHandle {
                flag: Arc::new(AtomicBool::new(false)),
            },
            state,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Progress snapshots, one per processed URL plus the final state.
    pub fn subscribe(&self) -> watch::Receiver<BatchJob> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> BatchJob {
        self.state.borrow().clone()
    }

    pub async fn run<I, S>(
        &self,
        urls: I,
        selectors: &[Selector],
        options: &BatchOptions,
    ) -> Result<Vec<ScrapeResult>, BatchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls = dedup_urls(urls);
        if urls.is_empty() {
            return Err(BatchError::EmptyQueue);
        }
        if selectors.is_empty() {
            return Err(BatchError::NoSelectors);
        }

        let mut already_running = false;
        self.state.send_if_modified(|job| {
            if job.status == BatchStatus::Running {
                already_running = true;
                false
            } else {
                *job = BatchJob::start(urls.clone());
                true
            }
        });
        if already_running {
            return Err(BatchError::AlreadyRunning);
        }
        let guard = RunGuard {
            state: &self.state,
            settled: false,
        };
        self.stop.flag.store(false, Ordering::SeqCst);

        let limit = if options.max_pages == 0 { usize::MAX } else { options.max_pages };
        let mut seen: HashSet<String> = urls.iter().cloned().collect();
        let mut queue: VecDeque<String> = urls.into();
        let mut results: Vec<ScrapeResult> = Vec::new();
        tracing::info!("Starting batch over {} URLs", queue.len());

        let status = loop {
            if self.stop.is_requested() {
                tracing::info!("Batch stopped after {} URLs", results.len());
                break BatchStatus::Stopped;
            }
            if results.len() >= limit {
                tracing::info!("Reached page limit of {}", limit);
                break BatchStatus::Completed;
            }
            let Some(url) = queue.pop_front() else {
                break BatchStatus::Completed;
            };

            let index = results.len();
            self.state.send_modify(|job| job.current_index = index);
            tracing::info!("[{}] Scraping {}", index + 1, url);

            let mut discovered = None;
            match self.scraper.scrape_page(&url, selectors).await {
                Ok(outcome) => {
                    tracing::info!("{} records from {}", outcome.records.len(), url);
                    if options.follow_pagination {
                        discovered = outcome.next_page.filter(|next| seen.insert(next.clone()));
                    }
                    results.push(ScrapeResult::success(&url, outcome.records));
                }
                Err(e) => {
                    tracing::error!("Failed to scrape {}: {}", url, e);
                    results.push(ScrapeResult::failure(&url, &e));
                }
            }

            if let Some(next) = &discovered {
                tracing::debug!("Queueing next page {}", next);
                queue.push_back(next.clone());
            }
            let remaining = queue.len().min(limit.saturating_sub(results.len()));
            let done = results.len();
            self.state.send_modify(|job| {
                if let Some(next) = discovered {
                    job.urls.push(next);
                }
                job.progress_percent = percent(done, done + remaining);
            });

            if remaining > 0 && options.inter_request_delay_ms > 0 && !self.stop.is_requested() {
                tokio::time::sleep(Duration::from_millis(options.inter_request_delay_ms)).await;
            }
        };

        guard.finish(status);
        let failures = results.iter().filter(|r| r.is_error()).count();
        tracing::info!(
            "Batch {:?}: {} URLs processed, {} failed",
            status,
            results.len(),
            failures
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExtractionType, FieldValue};
    use crate::utils::error::LoadError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned pages; unknown URLs fail like an exhausted proxy chain.
    #[derive(Default)]
    struct StaticSite {
        pages: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    impl StaticSite {
        fn with(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages.iter().map(|(u, p)| (u.to_string(), p.to_string())).collect(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageSource for StaticSite {
        async fn fetch(&self, url: &str, _options: &LoadOptions) -> Result<String, LoadError> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| LoadError::Exhausted {
                url: url.to_string(),
                primary: "HTTP error: 502 Bad Gateway".into(),
                fallback: "request timed out".into(),
            })
        }
    }

    fn title() -> Vec<Selector> {
        vec![Selector::new("h1", ExtractionType::Text).unwrap().named("title")]
    }

    fn fast() -> BatchOptions {
        BatchOptions {
            inter_request_delay_ms: 0,
            ..BatchOptions::default()
        }
    }

    fn pipeline(site: StaticSite) -> LocalPipeline<StaticSite> {
        LocalPipeline::new(site, ExtractionEngine::new(), LoadOptions::default())
    }

    #[tokio::test]
    async fn test_failed_url_is_isolated() {
        let site = StaticSite::with(&[
            ("https://a.test/1", "<h1>One</h1>"),
            ("https://a.test/3", "<h1>Three</h1>"),
        ]);
        let orchestrator = BatchOrchestrator::new(pipeline(site));
        let results = orchestrator
            .run(["https://a.test/1", "https://a.test/2", "https://a.test/3"], &title(), &fast())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].error.is_none());
        assert_eq!(results[0].records[0].get("title"), Some(&FieldValue::from("One")));
        assert!(results[1].error.as_deref().unwrap().contains("https://a.test/2"));
        assert!(results[1].records.is_empty());
        assert!(results[2].error.is_none());
        assert_eq!(results[2].records[0].get("title"), Some(&FieldValue::from("Three")));

        let job = orchestrator.snapshot();
        assert_eq!(job.status, BatchStatus::Completed);
        assert_eq!(job.progress_percent, 100);
    }

    #[tokio::test]
    async fn test_duplicates_are_processed_once_in_order() {
        let site = StaticSite::with(&[("https://a.test/1", "<h1>One</h1>"), ("https://a.test/2", "<h1>Two</h1>")]);
        let orchestrator = BatchOrchestrator::new(pipeline(site));
        let results = orchestrator
            .run(
                ["https://a.test/2", "https://a.test/1", " https://a.test/2 "],
                &title(),
                &fast(),
            )
            .await
            .unwrap();
        let urls: Vec<_> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.test/2", "https://a.test/1"]);
        assert_eq!(orchestrator.scraper.source.requested.lock().unwrap().len(), 2);
    }

    /// Requests a stop from inside the first scrape, the way a UI would mid-run.
    struct StopsAfterFirst {
        inner: LocalPipeline<StaticSite>,
        stop: Mutex<Option<StopHandle>>,
    }

    #[async_trait]
    impl PageScraper for StopsAfterFirst {
        async fn scrape_page(&self, url: &str, selectors: &[Selector]) -> Result<PageOutcome, BatchItemError> {
            let handle = self.stop.lock().unwrap().take();
            if let Some(handle) = handle {
                handle.request_stop();
            }
            self.inner.scrape_page(url, selectors).await
        }
    }

    #[tokio::test]
    async fn test_stop_finishes_current_url() {
        let site = StaticSite::with(&[("https://a.test/1", "<h1>One</h1>"), ("https://a.test/2", "<h1>Two</h1>")]);
        let orchestrator = BatchOrchestrator::new(StopsAfterFirst {
            inner: pipeline(site),
            stop: Mutex::new(None),
        });
        *orchestrator.scraper.stop.lock().unwrap() = Some(orchestrator.stop_handle());

        let mut progress = orchestrator.subscribe();
        let results = orchestrator
            .run(["https://a.test/1", "https://a.test/2"], &title(), &fast())
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].error.is_none(), "in-flight URL completes");
        let job = progress.borrow_and_update().clone();
        assert_eq!(job.status, BatchStatus::Stopped);
        assert_eq!(job.progress_percent, 100);
    }

    #[tokio::test]
    async fn test_pagination_respects_max_pages() {
        let site = StaticSite::with(&[
            ("https://a.test/p/1", r#"<h1>P1</h1><a rel="next" href="/p/2">next</a>"#),
            ("https://a.test/p/2", r#"<h1>P2</h1><a rel="next" href="/p/3">next</a>"#),
            ("https://a.test/p/3", r#"<h1>P3</h1><a rel="next" href="/p/1">wrap</a>"#),
        ]);
        let orchestrator = BatchOrchestrator::new(pipeline(site));

        let options = BatchOptions {
            follow_pagination: true,
            max_pages: 2,
            ..fast()
        };
        let results = orchestrator.run(["https://a.test/p/1"], &title(), &options).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].url, "https://a.test/p/2");

        // unlimited: follows to the end and does not revisit p/1
        let options = BatchOptions {
            follow_pagination: true,
            ..fast()
        };
        let results = orchestrator.run(["https://a.test/p/1"], &title(), &options).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(orchestrator.snapshot().urls.len(), 3);
    }

    #[tokio::test]
    async fn test_rejects_empty_input_and_overlap() {
        let orchestrator = BatchOrchestrator::new(pipeline(StaticSite::default()));
        assert_eq!(
            orchestrator.run(Vec::<String>::new(), &title(), &fast()).await.unwrap_err(),
            BatchError::EmptyQueue
        );
        assert_eq!(
            orchestrator.run(["https://a.test"], &[], &fast()).await.unwrap_err(),
            BatchError::NoSelectors
        );

        orchestrator.state.send_modify(|job| job.status = BatchStatus::Running);
        assert_eq!(
            orchestrator.run(["https://a.test"], &title(), &fast()).await.unwrap_err(),
            BatchError::AlreadyRunning
        );
    }

    /// Never answers within a test's patience.
    struct Hangs;

    #[async_trait]
    impl PageScraper for Hangs {
        async fn scrape_page(&self, _url: &str, _selectors: &[Selector]) -> Result<PageOutcome, BatchItemError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(PageOutcome::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_does_not_stay_running() {
        let orchestrator = BatchOrchestrator::new(Hangs);
        let cancelled = tokio::time::timeout(
            Duration::from_secs(1),
            orchestrator.run(["https://a.test/1"], &title(), &fast()),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(orchestrator.snapshot().status, BatchStatus::Stopped);

        // a new run is accepted afterwards
        let results = orchestrator.run(["https://a.test/2"], &title(), &fast()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(orchestrator.snapshot().status, BatchStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_requests() {
        let site = StaticSite::with(&[("https://a.test/1", "<h1>1</h1>"), ("https://a.test/2", "<h1>2</h1>")]);
        let orchestrator = BatchOrchestrator::new(pipeline(site));
        let options = BatchOptions {
            inter_request_delay_ms: 5_000,
            ..BatchOptions::default()
        };
        let started = tokio::time::Instant::now();
        orchestrator
            .run(["https://a.test/1", "https://a.test/2"], &title(), &options)
            .await
            .unwrap();
        // one pause between two requests, none after the last
        assert_eq!(started.elapsed().as_secs(), 5);
    }
}
