// Test mocks for the lead pipeline.
//
// Three mocks matching the three trait boundaries:
// - MockLanguageModel (LanguageModel) — scripted responses, records prompts
// - MockFetcher (PageFetcher)         — (query, page) → results HTML
// - MockLeadStore (LeadStore)         — in-memory tables behind a Mutex
//
// Plus helpers for building results pages from profile rows.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use ai_client::{Completion, TokenUsage};
use browserless_client::BrowserlessError;
use leadscout_common::{AuditRecord, CostRecord, Lead, QueryRecord, SearchSurfaceKind};

use crate::pipeline::surface::SearchSurface;
use crate::traits::{CompletionRequest, InsertOutcome, LanguageModel, LeadStore, PageFetcher};

// ---------------------------------------------------------------------------
// MockLanguageModel
// ---------------------------------------------------------------------------

enum Scripted {
    Reply(String),
    Fail(String),
}

/// Replies are consumed in order; the last one repeats once the script runs
/// out. Every call reports the same token usage.
pub struct MockLanguageModel {
    model: String,
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    usage: TokenUsage,
    prompts: Mutex<Vec<String>>,
}

impl Default for MockLanguageModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLanguageModel {
    pub fn new() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            usage: TokenUsage {
                prompt_tokens: 1_000,
                completion_tokens: 200,
            },
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(self, content: impl Into<String>) -> Self {
        self.push(Scripted::Reply(content.into()))
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Scripted::Fail(message.into()))
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_usage(mut self, prompt_tokens: u32, completion_tokens: u32) -> Self {
        self.usage = TokenUsage {
            prompt_tokens,
            completion_tokens,
        };
        self
    }

    fn push(self, item: Scripted) -> Self {
        self.script.lock().unwrap().push_back(item);
        self
    }

    /// User prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        self.prompts.lock().unwrap().push(request.user);

        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        let step = match next {
            Some(step) => {
                *last = Some(match &step {
                    Scripted::Reply(s) => Scripted::Reply(s.clone()),
                    Scripted::Fail(s) => Scripted::Fail(s.clone()),
                });
                step
            }
            None => match last.as_ref() {
                Some(Scripted::Reply(s)) => Scripted::Reply(s.clone()),
                Some(Scripted::Fail(s)) => Scripted::Fail(s.clone()),
                None => bail!("MockLanguageModel: no response scripted"),
            },
        };

        match step {
            Scripted::Reply(content) => Ok(Completion {
                content,
                usage: self.usage,
            }),
            Scripted::Fail(message) => bail!("MockLanguageModel: {message}"),
        }
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Serves registered results pages by URL. Unregistered URLs get an empty
/// results page, which the executor treats as the end of a query.
pub struct MockFetcher {
    surface: SearchSurface,
    pages: HashMap<String, String>,
    fail_first: AtomicU32,
    latency: Duration,
    fetches: AtomicU32,
    released: AtomicBool,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            surface: SearchSurface::new(SearchSurfaceKind::Yahoo),
            pages: HashMap::new(),
            fail_first: AtomicU32::new(0),
            latency: Duration::ZERO,
            fetches: AtomicU32::new(0),
            released: AtomicBool::new(false),
        }
    }

    /// Register the Yahoo results page `page` for `query`.
    pub fn on_query(mut self, query: &str, page: u32, html: String) -> Self {
        self.pages.insert(self.surface.page_url(query, page), html);
        self
    }

    /// The first `n` fetches fail with a transient timeout.
    pub fn fail_first(self, n: u32) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    /// Delay every fetch, to simulate slow navigation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let failing = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BrowserlessError::Timeout.into());
        }
        Ok(self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| yahoo_results_page(&[])))
    }

    async fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockLeadStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    leads: Vec<Lead>,
    queries: Vec<QueryRecord>,
    costs: Vec<CostRecord>,
    audits: Vec<AuditRecord>,
}

/// In-memory store. `failing_logs()` makes every append-only log write fail
/// while lead inserts keep working.
#[derive(Default)]
pub struct MockLeadStore {
    state: Mutex<StoreState>,
    base_cost: f64,
    failing_logs: bool,
    unavailable: bool,
    insert_latency: Duration,
}

impl MockLeadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spend recorded by earlier runs.
    pub fn with_total_cost(mut self, usd: f64) -> Self {
        self.base_cost = usd;
        self
    }

    pub fn failing_logs(mut self) -> Self {
        self.failing_logs = true;
        self
    }

    /// Each lead insert sleeps first, like a slow disk.
    pub fn with_insert_latency(mut self, latency: Duration) -> Self {
        self.insert_latency = latency;
        self
    }

    /// Every call fails, as if the database were unreachable.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Pre-existing leads, by canonical handle.
    pub fn with_leads(self, handles: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for handle in handles {
                state.leads.push(Lead {
                    url: handle.to_string(),
                    profile_url: format!("https://www.linkedin.com/in/{handle}"),
                    name: String::new(),
                    job_title: String::new(),
                    company: String::new(),
                    location: "Unknown".to_string(),
                    emails: Default::default(),
                    bio: String::new(),
                });
            }
        }
        self
    }

    pub fn leads(&self) -> Vec<Lead> {
        self.state.lock().unwrap().leads.clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .queries
            .iter()
            .map(|q| q.query_text.clone())
            .collect()
    }

    pub fn cost_records(&self) -> Vec<CostRecord> {
        self.state.lock().unwrap().costs.clone()
    }

    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.state.lock().unwrap().audits.clone()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            bail!("MockLeadStore: database unavailable");
        }
        Ok(())
    }

    fn check_logs(&self) -> Result<()> {
        self.check_available()?;
        if self.failing_logs {
            bail!("MockLeadStore: log write failed");
        }
        Ok(())
    }
}

#[async_trait]
impl LeadStore for MockLeadStore {
    async fn insert_lead(&self, lead: &Lead) -> Result<InsertOutcome> {
        self.check_available()?;
        if !self.insert_latency.is_zero() {
            tokio::time::sleep(self.insert_latency).await;
        }
        let mut state = self.state.lock().unwrap();
        if state.leads.iter().any(|l| l.url == lead.url) {
            return Ok(InsertOutcome::Duplicate);
        }
        state.leads.push(lead.clone());
        Ok(InsertOutcome::Fresh)
    }

    async fn lead_urls(&self) -> Result<Vec<String>> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .leads
            .iter()
            .map(|l| l.url.clone())
            .collect())
    }

    async fn count_leads(&self) -> Result<u64> {
        self.check_available()?;
        Ok(self.state.lock().unwrap().leads.len() as u64)
    }

    async fn append_query(&self, query_text: &str) -> Result<()> {
        self.check_logs()?;
        let mut state = self.state.lock().unwrap();
        let id = state.queries.len() as i64 + 1;
        state.queries.push(QueryRecord {
            id,
            query_text: query_text.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn recent_queries(&self, limit: u32) -> Result<Vec<QueryRecord>> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .queries
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn append_cost(&self, record: &CostRecord) -> Result<()> {
        self.check_logs()?;
        self.state.lock().unwrap().costs.push(record.clone());
        Ok(())
    }

    async fn total_cost(&self) -> Result<f64> {
        self.check_available()?;
        let logged: f64 = self
            .state
            .lock()
            .unwrap()
            .costs
            .iter()
            .map(|c| c.cost_usd)
            .sum();
        Ok(self.base_cost + logged)
    }

    async fn append_audit(&self, record: &AuditRecord) -> Result<()> {
        self.check_logs()?;
        self.state.lock().unwrap().audits.push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Results page helpers
// ---------------------------------------------------------------------------

/// One profile result as a search engine would list it.
#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub host: String,
    pub handle: String,
    pub name: String,
    pub title: String,
    pub company: String,
    pub snippet: String,
}

impl ProfileRow {
    pub fn new(handle: &str, name: &str, title: &str, company: &str, snippet: &str) -> Self {
        Self {
            host: "in.linkedin.com".to_string(),
            handle: handle.to_string(),
            name: name.to_string(),
            title: title.to_string(),
            company: company.to_string(),
            snippet: snippet.to_string(),
        }
    }

    /// Serve the profile from another host, e.g. `ca.linkedin.com`.
    pub fn on_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn url(&self) -> String {
        format!("https://{}/in/{}", self.host, self.handle)
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A Yahoo results page listing `rows` in order. An empty slice gives a page
/// with no results.
pub fn yahoo_results_page(rows: &[ProfileRow]) -> String {
    let mut html = String::from("<html><body><div id=\"web\"><ol>");
    for row in rows {
        html.push_str(&format!(
            "<li><div class=\"dd algo\">\
             <div class=\"compTitle\"><h3 class=\"title\"><a href=\"{url}\">{name} - {title} - {company} | LinkedIn</a></h3></div>\
             <div class=\"compText\"><p>{snippet}</p></div>\
             </div></li>",
            url = escape(&row.url()),
            name = escape(&row.name),
            title = escape(&row.title),
            company = escape(&row.company),
            snippet = escape(&row.snippet),
        ));
    }
    html.push_str("</ol></div></body></html>");
    html
}
