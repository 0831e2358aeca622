use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use tracing::{info, warn};

use leadscout_scout::suggestions::suggest_intents;
use leadscout_scout::traits::LeadStore;

use crate::AppState;

pub const MAX_HISTORY: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    limit: Option<u32>,
}

/// Recent queries, newest first.
pub async fn api_queries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(MAX_HISTORY).clamp(1, MAX_HISTORY);
    match state.store.recent_queries(limit).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to load query history");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Three fresh intents. Always succeeds; falls back to static lists.
pub async fn api_suggestions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let suggestions = suggest_intents(state.llm.as_deref(), state.store.as_ref()).await;
    if let Some(usage) = suggestions.usage {
        info!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            source = ?suggestions.source,
            "Suggestions generated"
        );
    }
    Json(suggestions.intents)
}
