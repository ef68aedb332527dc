//! Scan orchestration
//!
//! The engine owns the frontier, the worker pool and the scan counters.
//! Workers pull entries from the shared [`Frontier`], run them through
//! admission (global rate, global concurrency, per-host cap), fetch, parse
//! and fingerprint them, and hand every finding to the injected sink.
//!
//! A scan ends when the frontier's outstanding-work counter reaches zero,
//! when [`Engine::stop`] is called, or when a worker hits a fatal error.

use crate::config::{validate_scan_config, ScanConfig};
use crate::crawler::fingerprint::Fingerprinter;
use crate::crawler::frontier::{Frontier, FrontierEntry, Offer, Pop};
use crate::crawler::limiter::{HostLimiter, RateLimiter};
use crate::crawler::parser::{parse, ParsedPage};
use crate::crawler::session::SessionManager;
use crate::crawler::spider::{build_http_client, FetchError, FetchResult, Spider};
use crate::output::{
    DiscoveredUrl, ExtractedForm, FingerprintRecord, ScanSink, SinkResult, StatusReporter,
};
use crate::state::{CrawlStats, ScanStatus};
use crate::url::{url_registrable_domain, Normalizer, ScopeMatcher};
use crate::ReconError;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Hard cap on worker tasks, whatever the configured concurrency
pub const MAX_WORKERS: usize = 10;

/// A stats snapshot goes to the reporter every this many crawled pages
const PROGRESS_INTERVAL: u64 = 10;

/// Longest a worker blocks on an empty frontier before re-checking
const POP_WAIT: Duration = Duration::from_millis(250);

/// 401s within this window of the last session check do not trigger another
const REFRESH_COOLDOWN: Duration = Duration::from_secs(5);

/// Scan orchestrator
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use webrecon::output::{LoggingReporter, MemorySink};
/// use webrecon::{Engine, ScanConfig};
///
/// # async fn example() -> Result<(), webrecon::ReconError> {
/// let sink = Arc::new(MemorySink::new());
/// let engine = Engine::new(
///     ScanConfig::new("https://example.com/"),
///     sink.clone(),
///     Arc::new(LoggingReporter),
/// )?;
/// let stats = engine.run().await?;
/// println!("{} pages, {} forms", stats.urls_crawled, sink.forms().len());
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    config: Arc<ScanConfig>,
    sink: Arc<dyn ScanSink>,
    reporter: Arc<dyn StatusReporter>,
    status: Mutex<ScanStatus>,
    stats: Arc<Mutex<CrawlStats>>,
    cancel: CancellationToken,
}

impl Engine {
    /// Creates an engine for one scan
    ///
    /// The configuration is validated here, so one built in code gets the
    /// same checks as one loaded from TOML.
    pub fn new(
        config: ScanConfig,
        sink: Arc<dyn ScanSink>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Result<Self, ReconError> {
        validate_scan_config(&config)?;
        reporter.report_status(ScanStatus::Pending);

        Ok(Self {
            config: Arc::new(config),
            sink,
            reporter,
            status: Mutex::new(ScanStatus::Pending),
            stats: Arc::new(Mutex::new(CrawlStats::new())),
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn status(&self) -> ScanStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the scan counters
    pub fn stats(&self) -> CrawlStats {
        lock_stats(&self.stats).clone()
    }

    /// Token cancelled by [`Engine::stop`]; hand it to signal handlers
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Requests a cooperative stop
    ///
    /// In-flight fetches finish; no fetch starts once a worker has seen the
    /// flag. The scan then ends with status `cancelled`.
    pub fn stop(&self) {
        tracing::info!("Stop requested");
        self.cancel.cancel();
    }

    /// Scans the configured target URL
    pub async fn run(&self) -> Result<CrawlStats, ReconError> {
        let target = self.config.target_url.clone();
        self.start(&target).await
    }

    /// Scans `target` and returns the final counters
    ///
    /// Per-URL failures only increment `errors`. An `Err` means the scan
    /// itself failed (client initialization, a broken drain protocol, a
    /// crashed worker); the status is then `failed`.
    pub async fn start(&self, target: &str) -> Result<CrawlStats, ReconError> {
        self.transition(ScanStatus::Running)?;
        *lock_stats(&self.stats) = CrawlStats::new();
        tracing::info!("Starting scan of {}", target);

        let outcome = self.execute(target).await;

        let final_status = match &outcome {
            Err(_) => ScanStatus::Failed,
            Ok(()) if self.cancel.is_cancelled() => ScanStatus::Cancelled,
            Ok(()) => ScanStatus::Completed,
        };

        let stats = {
            let mut stats = lock_stats(&self.stats);
            stats.end_time = Some(Utc::now());
            stats.clone()
        };
        self.reporter.report_stats(&stats);
        self.transition(final_status)?;

        match outcome {
            Ok(()) => {
                tracing::info!(
                    "Scan {}: {} pages crawled, {} discovered, {} errors in {}s",
                    final_status,
                    stats.urls_crawled,
                    stats.urls_discovered,
                    stats.errors,
                    stats.elapsed().num_seconds()
                );
                Ok(stats)
            }
            Err(e) => {
                tracing::error!("Scan failed: {}", e);
                Err(e)
            }
        }
    }

    fn transition(&self, next: ScanStatus) -> Result<(), ReconError> {
        {
            let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
            if !status.can_transition_to(next) {
                return Err(ReconError::InvalidTransition {
                    from: *status,
                    to: next,
                });
            }
            *status = next;
        }
        self.reporter.report_status(next);
        Ok(())
    }

    async fn execute(&self, target: &str) -> Result<(), ReconError> {
        let normalizer = Normalizer::from_config(&self.config);
        let target = normalizer.normalize(target)?;
        let seed = Url::parse(&target)?;

        let client = build_http_client(&self.config).map_err(ReconError::ClientInit)?;
        let session = Arc::new(SessionManager::new(client));

        if let Some(auth) = &self.config.auth {
            // A failed login is not fatal; the scan proceeds unauthenticated
            if let Err(e) = session.configure(auth, &target).await {
                tracing::warn!("Authentication failed, continuing without it: {}", e);
            }
        }

        let worker_count = self.config.max_concurrent_requests.clamp(1, MAX_WORKERS);
        let shared = Arc::new(Worker {
            config: Arc::clone(&self.config),
            frontier: Frontier::new(self.config.max_pages),
            spider: Spider::new(&self.config, Arc::clone(&session)),
            session,
            rate: RateLimiter::new(self.config.requests_per_second),
            global: Semaphore::new(self.config.max_concurrent_requests),
            hosts: HostLimiter::new(self.config.max_requests_per_host),
            scope: ScopeMatcher::from_config(&self.config, &seed),
            normalizer,
            fingerprinter: Fingerprinter::new(),
            sink: Arc::clone(&self.sink),
            reporter: Arc::clone(&self.reporter),
            stats: Arc::clone(&self.stats),
            cancel: self.cancel.child_token(),
            last_refresh: Mutex::new(None),
        });

        if shared.frontier.seed(&target) == Offer::Enqueued {
            shared.update_stats(|s| s.urls_discovered += 1);
        }

        tracing::debug!("Launching {} workers", worker_count);
        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            let worker = Arc::clone(&shared);
            workers.spawn(async move { worker.run(id).await });
        }

        let mut fatal: Option<ReconError> = None;
        loop {
            tokio::select! {
                _ = shared.frontier.wait_drained() => {
                    tracing::debug!("Frontier drained");
                    break;
                }
                _ = self.cancel.cancelled() => break,
                joined = workers.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(e))) => {
                        fatal = Some(e);
                        break;
                    }
                    Some(Err(e)) => {
                        fatal = Some(ReconError::Worker(e));
                        break;
                    }
                },
            }
        }

        // Workers watch a child token, so this stops them without marking
        // the scan itself as cancelled
        shared.cancel.cancel();
        while let Some(joined) = workers.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(e) => ReconError::Worker(e),
            };
            if fatal.is_none() {
                fatal = Some(failure);
            } else {
                tracing::error!("Additional worker failure: {}", failure);
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn lock_stats(stats: &Mutex<CrawlStats>) -> MutexGuard<'_, CrawlStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared by the workers of one scan
struct Worker {
    config: Arc<ScanConfig>,
    frontier: Frontier,
    spider: Spider,
    session: Arc<SessionManager>,
    rate: RateLimiter,
    global: Semaphore,
    hosts: HostLimiter,
    scope: ScopeMatcher,
    normalizer: Normalizer,
    fingerprinter: Fingerprinter,
    sink: Arc<dyn ScanSink>,
    reporter: Arc<dyn StatusReporter>,
    stats: Arc<Mutex<CrawlStats>>,
    cancel: CancellationToken,
    last_refresh: Mutex<Option<Instant>>,
}

impl Worker {
    /// Pops and processes entries until the frontier drains or the scan stops
    ///
    /// Every popped entry is completed exactly once, whether it was
    /// processed, skipped or cut short by cancellation.
    async fn run(&self, id: usize) -> Result<(), ReconError> {
        loop {
            let entry = match self.frontier.pop(POP_WAIT, &self.cancel).await {
                Pop::Entry(entry) => entry,
                Pop::Idle => continue,
                Pop::Drained | Pop::Cancelled => {
                    tracing::trace!("Worker {} exiting", id);
                    return Ok(());
                }
            };

            if entry.depth > self.config.max_depth {
                tracing::debug!("Skipping {}: depth {} exceeds limit", entry.url, entry.depth);
            } else if self.frontier.is_visited(&entry.url) {
                tracing::debug!("Skipping {}: already visited", entry.url);
            } else {
                self.process(&entry).await;
            }

            self.frontier.complete()?;
        }
    }

    /// Fetches one URL and records everything learned from it
    ///
    /// # Processing Flow
    ///
    /// 1. Wait for the global rate limiter
    /// 2. Take a global concurrency permit, then a per-host permit
    /// 3. Mark visited and fetch; a failed fetch counts as one error
    /// 4. Record the discovered URL; on a 401 with auth configured, re-check
    ///    the session (rate limited, once per cooldown)
    /// 5. For HTML: record forms, enqueue in-scope links at depth + 1
    /// 6. Fingerprint the response and record it
    async fn process(&self, entry: &FrontierEntry) {
        if !self.rate.acquire(&self.cancel).await {
            return;
        }
        let _global = tokio::select! {
            _ = self.cancel.cancelled() => return,
            permit = self.global.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        let parsed = match Url::parse(&entry.url) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Unparseable frontier URL {}: {}", entry.url, e);
                self.update_stats(|s| s.errors += 1);
                return;
            }
        };
        let domain = url_registrable_domain(&parsed).unwrap_or_default();
        let crawl_delay = self.spider.crawl_delay(&parsed).await;
        let Some(_host) = self.hosts.acquire(&domain, crawl_delay, &self.cancel).await else {
            return;
        };

        // Last check before any request goes out
        if self.cancel.is_cancelled() || !self.frontier.mark_visited(&entry.url) {
            return;
        }

        let result = match self.spider.fetch(&entry.url).await {
            Ok(result) => result,
            Err(e) => {
                match &e {
                    FetchError::RobotsDisallowed(_) => tracing::debug!("{}", e),
                    _ => tracing::warn!("Failed to fetch {}: {}", entry.url, e),
                }
                self.update_stats(|s| s.errors += 1);
                return;
            }
        };

        tracing::debug!(
            "Fetched {} ({}, {} ms)",
            entry.url,
            result.status_code,
            result.response_time_ms
        );
        let crawled = self.update_stats(|s| {
            s.urls_crawled += 1;
            s.urls_crawled
        });

        self.record(
            "discovered URL",
            self.sink.record_discovered_url(&DiscoveredUrl::from_fetch(
                &result,
                entry.parent.as_deref(),
            )),
        );

        if result.status_code == 401 && self.session.has_auth() {
            self.refresh_session(&entry.url).await;
        }

        if result.is_html() {
            if let Some(body) = result.body.as_deref() {
                let page = parse(body, &result.final_url);
                self.record_forms(&result, &page);
                self.enqueue_links(entry, &page);
            }
        }

        let fingerprint = self.fingerprinter.analyze(&result);
        self.update_stats(|s| s.technologies_detected += fingerprint.technologies.len() as u64);
        match FingerprintRecord::from_fingerprint(&result.url, &fingerprint) {
            Ok(record) => self.record("fingerprint", self.sink.record_fingerprint(&record)),
            Err(e) => tracing::warn!("Failed to serialize fingerprint of {}: {}", result.url, e),
        }

        if crawled % PROGRESS_INTERVAL == 0 {
            let snapshot = self.update_stats(|s| s.clone());
            self.reporter.report_stats(&snapshot);
        }
    }

    /// Re-checks the session after a 401, at most once per cooldown
    ///
    /// The check request goes through the global rate limiter like any
    /// other request and is skipped once the scan is stopping.
    async fn refresh_session(&self, url: &str) {
        if self.cancel.is_cancelled() || !self.refresh_due() {
            return;
        }
        if !self.rate.acquire(&self.cancel).await {
            return;
        }

        match self.session.refresh().await {
            Ok(true) => tracing::info!("Session refreshed after 401 on {}", url),
            Ok(false) => {}
            Err(e) => tracing::warn!("Session refresh failed: {}", e),
        }
    }

    /// Claims the next refresh slot if the cooldown has passed
    fn refresh_due(&self) -> bool {
        let mut last = self.last_refresh.lock().unwrap_or_else(PoisonError::into_inner);
        if (*last).map_or(false, |at| at.elapsed() < REFRESH_COOLDOWN) {
            return false;
        }
        *last = Some(Instant::now());
        true
    }

    fn record_forms(&self, result: &FetchResult, page: &ParsedPage) {
        if page.forms.is_empty() {
            return;
        }

        for form in &page.forms {
            self.session.store_csrf_tokens(&form.csrf_tokens);
            match ExtractedForm::from_form(&result.url, form) {
                Ok(event) => self.record("form", self.sink.record_form(&event)),
                Err(e) => tracing::warn!("Failed to serialize form on {}: {}", result.url, e),
            }
        }
        self.update_stats(|s| s.forms_found += page.forms.len() as u64);
    }

    /// Offers in-scope links one level deeper than `entry`
    ///
    /// Stops offering once the discovered set is full; already queued work
    /// still drains.
    fn enqueue_links(&self, entry: &FrontierEntry, page: &ParsedPage) {
        let depth = entry.depth + 1;
        if depth > self.config.max_depth {
            return;
        }

        for link in &page.links {
            let normalized = match self.normalizer.normalize(link) {
                Ok(normalized) => normalized,
                Err(e) => {
                    tracing::trace!("Dropping link {}: {}", link, e);
                    continue;
                }
            };
            if !self.normalizer.is_valid(&normalized) || !self.scope.in_scope(&normalized) {
                continue;
            }

            match self.frontier.offer(&normalized, depth, Some(&entry.url)) {
                Offer::Enqueued => self.update_stats(|s| s.urls_discovered += 1),
                Offer::Duplicate => {}
                Offer::CapReached => {
                    tracing::debug!(
                        "max_pages ({}) reached, no further discovery",
                        self.frontier.max_pages()
                    );
                    break;
                }
            }
        }
    }

    fn record(&self, what: &str, outcome: SinkResult<()>) {
        if let Err(e) = outcome {
            tracing::warn!("Sink failed to record {}: {}", what, e);
        }
    }

    fn update_stats<T>(&self, f: impl FnOnce(&mut CrawlStats) -> T) -> T {
        f(&mut *lock_stats(&self.stats))
    }
}
