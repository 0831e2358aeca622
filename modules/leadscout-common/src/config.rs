use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::info;

use crate::error::LeadScoutError;

/// Which search results page the executor drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchSurfaceKind {
    #[default]
    Yahoo,
    DuckDuckGo,
}

impl FromStr for SearchSurfaceKind {
    type Err = LeadScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yahoo" | "google" | "bing" => Ok(SearchSurfaceKind::Yahoo),
            "duckduckgo" | "ddg" => Ok(SearchSurfaceKind::DuckDuckGo),
            other => Err(LeadScoutError::Config(format!(
                "SEARCH_SURFACE must be yahoo or duckduckgo, got {other:?}"
            ))),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // LLM
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,

    // Browser
    pub browserless_url: String,
    pub browserless_token: Option<String>,
    pub search_surface: SearchSurfaceKind,
    pub max_retries: u32,
    pub delay_between_requests_ms: u64,
    pub max_pages_per_query: u32,

    // Planning
    pub queries_per_round: usize,
    pub ledger_window: usize,
    pub default_budget_usd: f64,
    pub lexicon_path: Option<PathBuf>,

    // Persistence
    pub database_url: String,
    pub leads_mirror_path: PathBuf,
    pub exclusion_file: Option<PathBuf>,

    // Web server
    pub api_host: String,
    pub api_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Nothing is strictly required here: a missing `OPENAI_API_KEY` is
    /// reported when a run starts, not at boot.
    pub fn from_env() -> Result<Self, LeadScoutError> {
        Ok(Self {
            openai_api_key: optional_env("OPENAI_API_KEY"),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            openai_base_url: optional_env("OPENAI_BASE_URL"),
            browserless_url: env::var("BROWSERLESS_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            browserless_token: optional_env("BROWSERLESS_TOKEN"),
            search_surface: parsed_env("SEARCH_SURFACE", SearchSurfaceKind::Yahoo)?,
            max_retries: parsed_env("MAX_RETRIES", 3)?,
            delay_between_requests_ms: parsed_env("DELAY_BETWEEN_REQUESTS_MS", 1000)?,
            max_pages_per_query: parsed_env("MAX_PAGES_PER_QUERY", 3)?,
            queries_per_round: parsed_env("QUERIES_PER_ROUND", 15)?,
            ledger_window: parsed_env("LEDGER_WINDOW", 150)?,
            default_budget_usd: parsed_env("DEFAULT_BUDGET_USD", 1.0)?,
            lexicon_path: optional_env("LEXICON_PATH").map(PathBuf::from),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/leads.db".to_string()),
            leads_mirror_path: optional_env("LEADS_MIRROR_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/leads.csv")),
            exclusion_file: optional_env("EXCLUSION_FILE").map(PathBuf::from),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: parsed_env("API_PORT", 3001)?,
        })
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            openai_api_key = redact(self.openai_api_key.as_deref()),
            openai_model = %self.openai_model,
            browserless_url = %self.browserless_url,
            browserless_token = redact(self.browserless_token.as_deref()),
            search_surface = ?self.search_surface,
            max_retries = self.max_retries,
            delay_between_requests_ms = self.delay_between_requests_ms,
            max_pages_per_query = self.max_pages_per_query,
            queries_per_round = self.queries_per_round,
            ledger_window = self.ledger_window,
            database_url = %self.database_url,
            leads_mirror_path = %self.leads_mirror_path.display(),
            "Configuration loaded"
        );
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env<T: FromStr>(key: &str, default: T) -> Result<T, LeadScoutError> {
    match optional_env(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| LeadScoutError::Config(format!("{key} has an invalid value: {raw:?}"))),
        None => Ok(default),
    }
}

fn redact(secret: Option<&str>) -> &'static str {
    match secret {
        Some(_) => "<set>",
        None => "<unset>",
    }
}
