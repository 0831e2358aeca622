//! Runs planned queries against a search surface through the page fetcher.
//!
//! One task per query. Each task paginates, retries transient navigation
//! failures with exponential backoff, and reports what it finds to the
//! controller as `SearchMessage`s. Tasks never touch run state directly.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use leadscout_common::{Candidate, Config};

use crate::pipeline::surface::SearchSurface;
use crate::traits::{is_transient, PageFetcher};

/// Base backoff for navigation retries. Actual delay is base * 3^attempt + jitter.
const RETRY_BASE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub max_retries: u32,
    pub delay_between_requests: Duration,
    pub max_pages_per_query: u32,
    pub retry_base: Duration,
}

impl ExecutorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            delay_between_requests: Duration::from_millis(config.delay_between_requests_ms),
            max_pages_per_query: config.max_pages_per_query.max(1),
            retry_base: RETRY_BASE,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_between_requests: Duration::from_millis(1000),
            max_pages_per_query: 3,
            retry_base: RETRY_BASE,
        }
    }
}

/// Candidates read from one results page.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub candidates: Vec<Candidate>,
    /// The page had no results at all; later pages will not either.
    pub exhausted: bool,
}

/// What a query task reports. Messages from one task arrive in order.
#[derive(Debug)]
pub enum SearchMessage {
    Page {
        query: String,
        page: u32,
        candidates: Vec<Candidate>,
    },
    /// Navigation kept failing; the query was abandoned.
    Failed { query: String, error: String },
    Finished { query: String, pages: u32 },
}

pub struct SearchExecutor {
    fetcher: Arc<dyn PageFetcher>,
    surface: SearchSurface,
    settings: ExecutorSettings,
}

impl SearchExecutor {
    pub fn new(fetcher: Arc<dyn PageFetcher>, surface: SearchSurface, settings: ExecutorSettings) -> Self {
        Self {
            fetcher,
            surface,
            settings,
        }
    }

    pub fn surface(&self) -> &SearchSurface {
        &self.surface
    }

    /// Load and parse one results page, retrying transient failures up to
    /// `max_retries` times.
    pub async fn search_page(&self, query: &str, page: u32) -> Result<SearchPage> {
        let url = self.surface.page_url(query, page);
        let mut attempt = 0;
        let html = loop {
            match self.fetcher.fetch(&url).await {
                Ok(html) => break html,
                Err(e) if is_transient(&e) && attempt < self.settings.max_retries => {
                    let backoff = self.settings.retry_base * 3u32.pow(attempt);
                    let jitter_cap = self.settings.retry_base.as_millis().max(1) as u64;
                    let jitter = Duration::from_millis(rand::rng().random_range(0..jitter_cap));
                    warn!(
                        query,
                        page,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Search page failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff + jitter).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        let parsed = self.surface.parse_page(&html, query);
        debug!(
            query,
            page,
            rows = parsed.raw_count,
            profiles = parsed.candidates.len(),
            "Parsed results page"
        );
        Ok(SearchPage {
            exhausted: parsed.raw_count == 0,
            candidates: parsed.candidates,
        })
    }

    /// Randomized pause between page loads: the configured delay ±50%.
    fn page_delay(&self) -> Duration {
        let base = self.settings.delay_between_requests.as_millis() as u64;
        if base == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(base / 2..=base + base / 2))
    }

    /// Paginate one query until it runs dry, hits the page cap, fails, or is
    /// cancelled. Cancellation drops any in-flight navigation.
    pub async fn run_query(
        &self,
        query: String,
        cancel: CancellationToken,
        tx: mpsc::Sender<SearchMessage>,
    ) {
        let mut pages = 0;
        for page in 0..self.settings.max_pages_per_query {
            if page > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(self.page_delay()) => {}
                }
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                result = self.search_page(&query, page) => result,
            };
            pages += 1;

            match result {
                Ok(found) => {
                    let exhausted = found.exhausted;
                    if !found.candidates.is_empty() {
                        let message = SearchMessage::Page {
                            query: query.clone(),
                            page,
                            candidates: found.candidates,
                        };
                        if tx.send(message).await.is_err() {
                            return;
                        }
                    }
                    if exhausted {
                        break;
                    }
                }
                Err(e) => {
                    warn!(query = %query, page, error = %e, "Abandoning query");
                    let _ = tx
                        .send(SearchMessage::Failed {
                            query,
                            error: e.to_string(),
                        })
                        .await;
                    return;
                }
            }
        }

        info!(query = %query, pages, "Query finished");
        let _ = tx.send(SearchMessage::Finished { query, pages }).await;
    }
}
