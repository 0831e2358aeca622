use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json,
    },
};
use futures::Stream;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use leadscout_common::Config;
use leadscout_scout::{EventSink, RunRequest};

use crate::AppState;

pub const SESSION_HEADER: &str = "x-session-id";

const DEFAULT_TARGET: u32 = 5;

/// Newline- or comma-separated text, or a JSON list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ExclusionList {
    List(Vec<String>),
    Text(String),
}

impl ExclusionList {
    fn into_entries(self) -> Vec<String> {
        let entries = match self {
            ExclusionList::List(items) => items,
            ExclusionList::Text(text) => text
                .split(['\n', ','])
                .map(str::to_string)
                .collect(),
        };
        entries
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeBody {
    #[serde(default, alias = "searchQuery")]
    pub query: String,
    #[serde(default)]
    pub num_results: Option<i64>,
    #[serde(default)]
    pub enable_dynamic_exclusions: Option<bool>,
    #[serde(default)]
    pub manual_exclusions: Option<ExclusionList>,
    #[serde(default)]
    pub budget_usd: Option<f64>,
}

impl ScrapeBody {
    pub fn into_request(self, session: &str, config: &Config) -> RunRequest {
        let target = self
            .num_results
            .map(|n| n.clamp(1, i64::from(leadscout_scout::pipeline::controller::MAX_TARGET)) as u32)
            .unwrap_or(DEFAULT_TARGET);
        let mut request = RunRequest::new(self.query, target);
        request.dynamic_exclusions = self.enable_dynamic_exclusions.unwrap_or(true);
        request.manual_exclusions = self
            .manual_exclusions
            .map(ExclusionList::into_entries)
            .unwrap_or_default();
        request.budget_usd = self
            .budget_usd
            .filter(|b| b.is_finite() && *b >= 0.0)
            .unwrap_or(config.default_budget_usd);
        request.session_id = Uuid::parse_str(session).unwrap_or_else(|_| Uuid::new_v4());
        request
    }
}

pub fn session_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Start a run and stream its events. Dropping the connection cancels it.
pub async fn api_scrape(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ScrapeBody>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = session_from(&headers).unwrap_or_else(|| Uuid::new_v4().to_string());
    let request = body.into_request(&session, &state.config);
    let ticket = state.runs.start(&session);
    info!(
        session = %session,
        run = ticket.id,
        target = request.target,
        budget_usd = request.budget_usd,
        "Scrape requested"
    );

    let (sink, mut rx) = EventSink::channel();
    let task_state = state.clone();
    let task_ticket = ticket.clone();
    tokio::spawn(async move {
        let outcome = task_state
            .controller
            .run(request, sink, task_ticket.cancel.clone())
            .await;
        task_state.runs.finish(&task_ticket);
        info!(session = %task_ticket.session, run = task_ticket.id, outcome = outcome.as_str(), "Scrape finished");
    });

    let disconnect_guard = ticket.cancel.drop_guard();
    let stream = async_stream::stream! {
        let _disconnect_guard = disconnect_guard;
        while let Some(event) = rx.recv().await {
            match Event::default().json_data(&event) {
                Ok(frame) => yield Ok::<_, Infallible>(frame),
                Err(e) => warn!(error = %e, kind = event.kind(), "Dropping unserializable event"),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Cancel the caller's active run.
pub async fn api_scrape_stop(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let stopped = session_from(&headers)
        .map(|session| state.runs.stop(&session))
        .unwrap_or(false);
    Json(serde_json::json!({ "stopped": stopped }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        let mut config = Config::from_env().unwrap();
        config.default_budget_usd = 2.0;
        config
    }

    #[test]
    fn body_defaults_and_clamps() {
        let body: ScrapeBody =
            serde_json::from_str(r#"{"searchQuery": "BTL managers in Mumbai", "numResults": 5000}"#).unwrap();
        let request = body.into_request("not-a-uuid", &config());
        assert_eq!(request.intent, "BTL managers in Mumbai");
        assert_eq!(request.target, 1000);
        assert!(request.dynamic_exclusions);
        assert_eq!(request.budget_usd, 2.0);

        let body: ScrapeBody = serde_json::from_str(r#"{"query": "x"}"#).unwrap();
        assert_eq!(body.into_request("s", &config()).target, DEFAULT_TARGET);
    }

    #[test]
    fn exclusions_accept_text_or_list() {
        let body: ScrapeBody = serde_json::from_str(
            r#"{"query": "x", "manualExclusions": "linkedin.com/in/a\n, linkedin.com/in/b\n"}"#,
        )
        .unwrap();
        assert_eq!(
            body.into_request("s", &config()).manual_exclusions,
            vec!["linkedin.com/in/a", "linkedin.com/in/b"]
        );

        let body: ScrapeBody =
            serde_json::from_str(r#"{"query": "x", "manualExclusions": ["a", " "], "budgetUsd": 0.5}"#).unwrap();
        let request = body.into_request("s", &config());
        assert_eq!(request.manual_exclusions, vec!["a"]);
        assert_eq!(request.budget_usd, 0.5);
    }

    #[test]
    fn session_uuid_is_reused_for_cost_records() {
        let id = Uuid::new_v4();
        let body: ScrapeBody = serde_json::from_str(r#"{"query": "x"}"#).unwrap();
        assert_eq!(body.into_request(&id.to_string(), &config()).session_id, id);
    }

    #[test]
    fn session_header_is_trimmed() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_from(&headers), None);
        headers.insert(SESSION_HEADER, " abc ".parse().unwrap());
        assert_eq!(session_from(&headers).as_deref(), Some("abc"));
    }
}
