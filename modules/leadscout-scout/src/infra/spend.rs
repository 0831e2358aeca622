use ai_client::TokenUsage;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use leadscout_common::CostRecord;

use crate::events::CostUpdate;
use crate::traits::LeadStore;

/// USD per one million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

/// Price table keyed by model-name prefix. The longest matching prefix wins,
/// so dated snapshots (`gpt-4o-2024-08-06`) price like their family.
const PRICES: &[(&str, ModelPrice)] = &[
    ("gpt-4o", ModelPrice { input_per_million: 2.50, output_per_million: 10.00 }),
    ("gpt-4o-mini", ModelPrice { input_per_million: 0.15, output_per_million: 0.60 }),
    ("gpt-4.1", ModelPrice { input_per_million: 2.00, output_per_million: 8.00 }),
    ("gpt-4.1-mini", ModelPrice { input_per_million: 0.40, output_per_million: 1.60 }),
    ("gpt-4.1-nano", ModelPrice { input_per_million: 0.10, output_per_million: 0.40 }),
    ("o3-mini", ModelPrice { input_per_million: 1.10, output_per_million: 4.40 }),
];

const DEFAULT_MODEL: &str = "gpt-4o";

pub fn price_for(model: &str) -> ModelPrice {
    let model = model.to_ascii_lowercase();
    PRICES
        .iter()
        .filter(|(prefix, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .or_else(|| PRICES.iter().find(|(prefix, _)| *prefix == DEFAULT_MODEL))
        .map(|(_, price)| *price)
        .unwrap_or(ModelPrice {
            input_per_million: 2.50,
            output_per_million: 10.00,
        })
}

pub fn cost_of(usage: TokenUsage, model: &str) -> f64 {
    let price = price_for(model);
    (usage.prompt_tokens as f64 * price.input_per_million
        + usage.completion_tokens as f64 * price.output_per_million)
        / 1_000_000.0
}

/// Tracks LLM spend for one run against its budget.
///
/// The all-time figure is the persisted total read at run start plus this
/// session's charges. The budget is checked between rounds, so a run can
/// overshoot it by at most one planner call.
pub struct SpendMeter {
    session_id: Uuid,
    /// Budget in USD. 0 = unlimited.
    budget_usd: f64,
    base_all_time: f64,
    session_total: f64,
    last_call: f64,
}

impl SpendMeter {
    pub fn new(session_id: Uuid, budget_usd: f64, base_all_time: f64) -> Self {
        Self {
            session_id,
            budget_usd: budget_usd.max(0.0),
            base_all_time,
            session_total: 0.0,
            last_call: 0.0,
        }
    }

    /// Record one call's usage. Returns its cost. The cost record is appended
    /// to the store; a failed append is logged and ignored.
    pub async fn charge(&mut self, usage: TokenUsage, model: &str, store: &dyn LeadStore) -> f64 {
        let cost = cost_of(usage, model);
        self.session_total += cost;
        self.last_call = cost;

        let record = CostRecord {
            session_id: self.session_id,
            model: model.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cost_usd: cost,
            created_at: Utc::now(),
        };
        if let Err(e) = store.append_cost(&record).await {
            warn!(error = %e, "Failed to append cost record");
        }
        cost
    }

    pub fn session_total(&self) -> f64 {
        self.session_total
    }

    pub fn all_time(&self) -> f64 {
        self.base_all_time + self.session_total
    }

    pub fn exceeded(&self) -> bool {
        self.budget_usd > 0.0 && self.session_total >= self.budget_usd
    }

    pub fn budget(&self) -> f64 {
        self.budget_usd
    }

    pub fn update(&self) -> CostUpdate {
        CostUpdate {
            session_cost: self.session_total,
            last_call_cost: self.last_call,
            all_time_cost: self.all_time(),
        }
    }

    pub fn log_status(&self) {
        info!(
            session_usd = self.session_total,
            all_time_usd = self.all_time(),
            budget_usd = self.budget_usd,
            "Spend status"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLeadStore;

    fn usage(prompt: u32, completion: u32) -> TokenUsage {
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
        }
    }

    #[test]
    fn longest_prefix_wins() {
        assert_eq!(price_for("gpt-4o-mini-2024-07-18").input_per_million, 0.15);
        assert_eq!(price_for("gpt-4o-2024-08-06").input_per_million, 2.50);
        assert_eq!(price_for("GPT-4.1-MINI").output_per_million, 1.60);
    }

    #[test]
    fn unknown_models_price_as_default() {
        assert_eq!(price_for("some-local-model"), price_for(DEFAULT_MODEL));
    }

    #[test]
    fn cost_is_per_million_tokens() {
        let cost = cost_of(usage(1_000_000, 100_000), "gpt-4o");
        assert!((cost - 3.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn charges_accumulate_and_are_logged() {
        let store = MockLeadStore::new().with_total_cost(2.0);
        let mut meter = SpendMeter::new(Uuid::new_v4(), 0.0, 2.0);
        let first = meter.charge(usage(10_000, 1_000), "gpt-4o", &store).await;
        meter.charge(usage(10_000, 1_000), "gpt-4o", &store).await;

        assert!((meter.session_total() - 2.0 * first).abs() < 1e-12);
        assert!((meter.all_time() - (2.0 + 2.0 * first)).abs() < 1e-12);
        assert_eq!(meter.update().last_call_cost, first);
        assert_eq!(store.cost_records().len(), 2);
        assert!(!meter.exceeded());
    }

    #[tokio::test]
    async fn budget_is_exceeded_once_reached() {
        let store = MockLeadStore::new();
        let mut meter = SpendMeter::new(Uuid::new_v4(), 0.01, 0.0);
        assert!(!meter.exceeded());
        meter.charge(usage(3_000, 0), "gpt-4o", &store).await;
        assert!(!meter.exceeded());
        meter.charge(usage(0, 1_000), "gpt-4o", &store).await;
        assert!(meter.exceeded());
    }

    #[tokio::test]
    async fn failed_cost_append_is_swallowed() {
        let store = MockLeadStore::new().failing_logs();
        let mut meter = SpendMeter::new(Uuid::new_v4(), 1.0, 0.0);
        let cost = meter.charge(usage(1_000, 1_000), "gpt-4o", &store).await;
        assert!(cost > 0.0);
        assert_eq!(meter.session_total(), cost);
    }
}
