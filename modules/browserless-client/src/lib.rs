pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Per-navigation options forwarded to Browserless.
#[derive(Debug, Clone)]
pub struct ContentOptions {
    /// Navigation timeout in milliseconds.
    pub navigation_timeout_ms: u64,
    /// Extra settle time after DOMContentLoaded, in milliseconds.
    pub settle_ms: u64,
    pub user_agent: String,
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 30_000,
            settle_ms: 2_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    url: &'a str,
    goto_options: GotoOptions,
    wait_for_timeout: u64,
    user_agent: &'a str,
    reject_resource_types: [&'static str; 3],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GotoOptions {
    wait_until: &'static str,
    timeout: u64,
}

/// One shared browser instance. Every `content` call runs in its own page
/// context on the Browserless side, so concurrent calls do not share state.
pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    options: ContentOptions,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        Self::with_options(base_url, token, ContentOptions::default())
    }

    pub fn with_options(base_url: &str, token: Option<&str>, options: ContentOptions) -> Result<Self> {
        // Leave headroom over the in-browser navigation timeout.
        let http_timeout = Duration::from_millis(options.navigation_timeout_ms + options.settle_ms + 5_000);
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| BrowserlessError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()).map(String::from),
            options,
        })
    }

    fn endpoint(&self) -> String {
        match self.token {
            Some(ref token) => format!("{}/content?token={token}", self.base_url),
            None => format!("{}/content", self.base_url),
        }
    }

    /// Navigate to `url` and return the rendered HTML.
    pub async fn content(&self, url: &str) -> Result<String> {
        let body = ContentRequest {
            url,
            goto_options: GotoOptions {
                wait_until: "domcontentloaded",
                timeout: self.options.navigation_timeout_ms,
            },
            wait_for_timeout: self.options.settle_ms,
            user_agent: &self.options.user_agent,
            reject_resource_types: ["image", "font", "media"],
        };

        debug!(url, "Browserless content request");

        let resp = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}
