// Trait seams for the run controller's collaborators.
//
// LanguageModel — prompt in, text + token usage out (OpenAI in production).
// PageFetcher   — navigate and return rendered HTML (Browserless in production).
// LeadStore     — insert-if-absent leads plus append-only logs (SQLite in production).
//
// Mocks for all three live in `testing.rs`, so the controller runs in tests
// with no network and an in-memory database.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use ai_client::{Completion, OpenAi};
use browserless_client::BrowserlessClient;
use leadscout_common::{AuditRecord, CostRecord, Lead, QueryRecord};

// ---------------------------------------------------------------------------
// LanguageModel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    /// Structured-output schema: `(name, schema)`.
    pub schema: Option<(String, Value)>,
    pub temperature: f32,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model name, used for pricing.
    fn model(&self) -> &str;

    /// Run one completion. The raw text is returned unparsed so a malformed
    /// body still reports its token usage.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}

#[async_trait]
impl LanguageModel for OpenAi {
    fn model(&self) -> &str {
        OpenAi::model(self)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let mut prompt = self.prompt(request.user).temperature(request.temperature);
        if !request.system.is_empty() {
            prompt = prompt.preamble(request.system);
        }
        if let Some((name, schema)) = request.schema {
            prompt = prompt.schema(name, schema);
        }
        Ok(prompt.send().await?)
    }
}

// ---------------------------------------------------------------------------
// PageFetcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Load a page and return its rendered HTML. Transient failures are
    /// reported as `BrowserlessError`s whose `is_transient()` is true.
    async fn fetch(&self, url: &str) -> Result<String>;

    /// Release browser resources at the end of a run.
    async fn release(&self) {}
}

#[async_trait]
impl PageFetcher for BrowserlessClient {
    async fn fetch(&self, url: &str) -> Result<String> {
        Ok(self.content(url).await?)
    }
}

/// Whether a fetch error is worth retrying.
pub fn is_transient(err: &anyhow::Error) -> bool {
    err.downcast_ref::<browserless_client::BrowserlessError>()
        .is_some_and(|e| e.is_transient())
}

// ---------------------------------------------------------------------------
// LeadStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Fresh,
    /// The canonical key already existed. Not an error.
    Duplicate,
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Insert if no lead with the same canonical `url` exists.
    async fn insert_lead(&self, lead: &Lead) -> Result<InsertOutcome>;

    /// Canonical keys of every persisted lead.
    async fn lead_urls(&self) -> Result<Vec<String>>;

    async fn count_leads(&self) -> Result<u64>;

    /// Always appends; repeated text produces repeated records.
    async fn append_query(&self, query_text: &str) -> Result<()>;

    /// Newest first.
    async fn recent_queries(&self, limit: u32) -> Result<Vec<QueryRecord>>;

    async fn append_cost(&self, record: &CostRecord) -> Result<()>;

    /// Sum of every cost record ever appended.
    async fn total_cost(&self) -> Result<f64>;

    async fn append_audit(&self, record: &AuditRecord) -> Result<()>;
}
