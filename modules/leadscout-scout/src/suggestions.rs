//! Fresh search intents for the dashboard, drawn from recent query history.

use ai_client::{extract_json_payload, TokenUsage};
use tracing::warn;
use uuid::Uuid;

use crate::infra::spend::SpendMeter;
use crate::traits::{CompletionRequest, LanguageModel, LeadStore};

pub const SUGGESTION_COUNT: usize = 3;
const HISTORY_SAMPLE: u32 = 15;
const SUGGESTION_TEMPERATURE: f32 = 0.8;

const NO_MODEL_FALLBACK: &[&str] = &[
    "Offline Marketing Managers in Mumbai",
    "BTL Strategy directors in Delhi",
];
const UNPARSEABLE_FALLBACK: &[&str] = &[
    "Trade Marketing professionals in FMCG companies",
    "Experiential Marketing professionals in Mumbai & Delhi",
    "Offline Marketing and Events Directors",
];
const FAILURE_FALLBACK: &[&str] = &[
    "Trade Marketing professionals in FMCG companies",
    "SaaS Founders in Bangalore",
    "BTL Agency Growth Heads",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionSource {
    Model,
    /// No model is configured.
    NoModel,
    /// The model answered with something other than a list of strings.
    Unparseable,
    /// History lookup or the model call failed.
    Failure,
}

#[derive(Debug, Clone)]
pub struct Suggestions {
    pub intents: Vec<String>,
    pub source: SuggestionSource,
    pub usage: Option<TokenUsage>,
}

impl Suggestions {
    fn fallback(source: SuggestionSource, list: &[&str], usage: Option<TokenUsage>) -> Self {
        Self {
            intents: list.iter().map(|s| s.to_string()).collect(),
            source,
            usage,
        }
    }
}

/// Suggest natural-language intents unlike the ones searched recently.
/// Never fails: every error path returns a static list.
pub async fn suggest_intents(llm: Option<&dyn LanguageModel>, store: &dyn LeadStore) -> Suggestions {
    let Some(llm) = llm else {
        return Suggestions::fallback(SuggestionSource::NoModel, NO_MODEL_FALLBACK, None);
    };

    let history = match store.recent_queries(HISTORY_SAMPLE).await {
        Ok(records) => records.into_iter().map(|r| r.query_text).collect::<Vec<_>>(),
        Err(e) => {
            warn!(error = %e, "Could not read query history for suggestions");
            return Suggestions::fallback(SuggestionSource::Failure, FAILURE_FALLBACK, None);
        }
    };

    let request = CompletionRequest {
        system: String::new(),
        user: suggestion_prompt(&history),
        schema: None,
        temperature: SUGGESTION_TEMPERATURE,
    };
    let completion = match llm.complete(request).await {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Suggestion call failed");
            return Suggestions::fallback(SuggestionSource::Failure, FAILURE_FALLBACK, None);
        }
    };

    // Each suggestions request is its own cost session.
    let mut spend = SpendMeter::new(Uuid::new_v4(), 0.0, 0.0);
    spend.charge(completion.usage, llm.model(), store).await;

    match parse_suggestions(&completion.content) {
        Some(intents) => Suggestions {
            intents,
            source: SuggestionSource::Model,
            usage: Some(completion.usage),
        },
        None => Suggestions::fallback(
            SuggestionSource::Unparseable,
            UNPARSEABLE_FALLBACK,
            Some(completion.usage),
        ),
    }
}

fn suggestion_prompt(history: &[String]) -> String {
    let history = serde_json::to_string(history).unwrap_or_else(|_| "[]".to_string());
    format!(
        "You help B2B marketers find leads on a professional network.\n\
         Suggest {SUGGESTION_COUNT} fresh, varied search intents in plain language, \
         such as \"Find Trade Marketing leads working in top FMCG companies\".\n\n\
         Recent searches (boolean / X-ray form): {history}\n\n\
         Each suggestion must target a different ideal customer profile from the recent \
         searches (experiential marketing, trade marketing, enterprise sales, founders, \
         HR heads and so on), be 6 to 12 words long, and read as natural language rather \
         than a boolean query. If the history is empty or unrelated, suggest general \
         high-quality B2B marketing or sales audiences.\n\n\
         Output only a JSON array of {SUGGESTION_COUNT} strings."
    )
}

fn parse_suggestions(content: &str) -> Option<Vec<String>> {
    let list: Vec<String> = serde_json::from_str(extract_json_payload(content)).ok()?;
    let list: Vec<String> = list
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(SUGGESTION_COUNT)
        .collect();
    (!list.is_empty()).then_some(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockLanguageModel, MockLeadStore};

    #[tokio::test]
    async fn no_model_uses_static_list() {
        let store = MockLeadStore::new();
        let s = suggest_intents(None, &store).await;
        assert_eq!(s.source, SuggestionSource::NoModel);
        assert_eq!(s.intents.len(), 2);
    }

    #[tokio::test]
    async fn model_suggestions_are_trimmed_and_capped() {
        let store = MockLeadStore::new();
        store.append_query("\"BTL Manager\" Mumbai").await.unwrap();
        let llm = MockLanguageModel::new()
            .respond("```json\n[\" SaaS founders in Pune \", \"HR heads in Chennai\", \"Retail category managers\", \"extra\"]\n```");
        let s = suggest_intents(Some(&llm), &store).await;
        assert_eq!(s.source, SuggestionSource::Model);
        assert_eq!(s.intents, vec!["SaaS founders in Pune", "HR heads in Chennai", "Retail category managers"]);
        assert!(llm.prompts()[0].contains("BTL Manager"));
    }

    #[tokio::test]
    async fn model_call_is_logged_as_cost() {
        let store = MockLeadStore::new();
        let llm = MockLanguageModel::new().respond("[\"SaaS founders in Pune\"]");
        suggest_intents(Some(&llm), &store).await;
        assert_eq!(store.cost_records().len(), 1);

        let llm = MockLanguageModel::new().respond("no list here");
        suggest_intents(Some(&llm), &store).await;
        let records = store.cost_records();
        assert_eq!(records.len(), 2);
        assert_ne!(records[0].session_id, records[1].session_id);
        assert!(records.iter().all(|r| r.cost_usd > 0.0 && r.model == "gpt-4o-mini"));
        assert!(store.total_cost().await.unwrap() > 0.0);
    }

    #[tokio::test]
    async fn no_model_logs_no_cost() {
        let store = MockLeadStore::new();
        suggest_intents(None, &store).await;
        assert!(store.cost_records().is_empty());
    }

    #[tokio::test]
    async fn prose_answer_falls_back() {
        let store = MockLeadStore::new();
        let llm = MockLanguageModel::new().respond("Sure! Here are some ideas.");
        let s = suggest_intents(Some(&llm), &store).await;
        assert_eq!(s.source, SuggestionSource::Unparseable);
        assert_eq!(s.intents.len(), 3);
        assert!(s.usage.is_some());
    }

    #[tokio::test]
    async fn provider_error_falls_back() {
        let store = MockLeadStore::new();
        let llm = MockLanguageModel::new().fail("rate limited");
        let s = suggest_intents(Some(&llm), &store).await;
        assert_eq!(s.source, SuggestionSource::Failure);
        assert!(s.intents.contains(&"SaaS Founders in Bangalore".to_string()));
    }
}
