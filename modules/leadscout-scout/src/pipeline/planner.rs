//! LLM query planning.
//!
//! Each call picks a search strategy, fills its prompt from the strategy
//! table, and asks the model for a batch of X-ray queries. A response that
//! does not parse, or a provider failure, falls back to one query built from
//! the intent so the run can continue.

use std::sync::Arc;

use ai_client::{extract_json_payload, StructuredOutput, TokenUsage};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};

use crate::icp::{ProfileType, TargetProfile};
use crate::lexicon::Lexicon;
use crate::pipeline::ledger::query_key;
use crate::traits::{CompletionRequest, LanguageModel};

pub const DEFAULT_BATCH_SIZE: usize = 15;

/// Recent queries shown to the model so it avoids repeating them.
pub const RECENT_SAMPLE: usize = 15;

const PLANNER_TEMPERATURE: f32 = 0.9;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    TitleCity,
    RoleCityKeyword,
    CityCompanyRole,
    CompanyRoleDisjunction,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::TitleCity => "title_city",
            Strategy::RoleCityKeyword => "role_city_keyword",
            Strategy::CityCompanyRole => "city_company_role",
            Strategy::CompanyRoleDisjunction => "company_role_disjunction",
        }
    }

    pub fn uses_companies(&self) -> bool {
        matches!(
            self,
            Strategy::CityCompanyRole | Strategy::CompanyRoleDisjunction
        )
    }
}

const PLAIN_ROTATION: &[Strategy] = &[
    Strategy::TitleCity,
    Strategy::RoleCityKeyword,
    Strategy::CityCompanyRole,
    Strategy::CompanyRoleDisjunction,
];

/// With a known industry, company-based strategies get four slots in six.
const INDUSTRY_ROTATION: &[Strategy] = &[
    Strategy::CityCompanyRole,
    Strategy::CompanyRoleDisjunction,
    Strategy::TitleCity,
    Strategy::CityCompanyRole,
    Strategy::CompanyRoleDisjunction,
    Strategy::RoleCityKeyword,
];

/// Strategy for the `call`-th planning call.
pub fn strategy_for_call(call: usize, has_industry: bool) -> Strategy {
    let rotation = if has_industry {
        INDUSTRY_ROTATION
    } else {
        PLAIN_ROTATION
    };
    rotation[call % rotation.len()]
}

/// Prompt ingredients for one (profile type, strategy) pair.
#[derive(Debug)]
pub struct StrategySpec {
    pub roles: &'static [&'static str],
    pub keywords: &'static [&'static str],
    /// Placeholders: `{roles}`, `{keywords}`, `{cities}`, `{companies}`.
    pub template: &'static str,
}

const ACTIVATION_ROLES: &[&str] = &[
    "BTL Manager",
    "Brand Activation Manager",
    "Trade Marketing Manager",
    "Experiential Marketing Manager",
    "Events Manager",
];
const ACTIVATION_KEYWORDS: &[&str] = &["BTL", "activation", "on-ground", "experiential", "sampling", "retail visibility"];
const BRAND_ROLES: &[&str] = &["Brand Manager", "Senior Brand Manager", "Category Manager", "Marketing Manager"];
const BRAND_KEYWORDS: &[&str] = &["brand", "ATL", "consumer marketing", "campaigns"];
const LEADERSHIP_ROLES: &[&str] = &["Head of Marketing", "Marketing Director", "VP Marketing", "CMO", "General Manager Marketing"];
const LEADERSHIP_KEYWORDS: &[&str] = &["marketing", "brand", "growth", "go-to-market"];
const GENERAL_ROLES: &[&str] = &["Marketing Manager", "Marketing Head", "Brand Manager", "Trade Marketing Manager"];
const GENERAL_KEYWORDS: &[&str] = &["marketing", "brand", "promotions", "events"];

const TITLE_CITY: &str = "Combine an exact job title in quotes with one city. \
Titles: {roles}. Cities: {cities}. Example shape: \"BTL Manager\" Mumbai";
const ROLE_CITY_KEYWORD: &str = "Combine a role, a city and one domain keyword. \
Roles: {roles}. Cities: {cities}. Keywords: {keywords}. Example shape: \"Trade Marketing\" Delhi sampling";
const CITY_COMPANY_ROLE: &str = "Target people at specific employers: one company name in quotes, \
one role, optionally one city. Companies: {companies}. Roles: {roles}. Cities: {cities}.";
const COMPANY_ROLE_DISJUNCTION: &str = "Group two or three companies with OR and pair them with a role. \
Companies: {companies}. Roles: {roles}. Example shape: (\"ITC\" OR \"Dabur\") \"Brand Manager\"";

/// Declarative strategy table. Looked up, never branched on.
const STRATEGY_TABLE: &[(ProfileType, Strategy, StrategySpec)] = &[
    (ProfileType::Activation, Strategy::TitleCity, StrategySpec { roles: ACTIVATION_ROLES, keywords: ACTIVATION_KEYWORDS, template: TITLE_CITY }),
    (ProfileType::Activation, Strategy::RoleCityKeyword, StrategySpec { roles: ACTIVATION_ROLES, keywords: ACTIVATION_KEYWORDS, template: ROLE_CITY_KEYWORD }),
    (ProfileType::Activation, Strategy::CityCompanyRole, StrategySpec { roles: ACTIVATION_ROLES, keywords: ACTIVATION_KEYWORDS, template: CITY_COMPANY_ROLE }),
    (ProfileType::Activation, Strategy::CompanyRoleDisjunction, StrategySpec { roles: ACTIVATION_ROLES, keywords: ACTIVATION_KEYWORDS, template: COMPANY_ROLE_DISJUNCTION }),
    (ProfileType::Brand, Strategy::TitleCity, StrategySpec { roles: BRAND_ROLES, keywords: BRAND_KEYWORDS, template: TITLE_CITY }),
    (ProfileType::Brand, Strategy::RoleCityKeyword, StrategySpec { roles: BRAND_ROLES, keywords: BRAND_KEYWORDS, template: ROLE_CITY_KEYWORD }),
    (ProfileType::Brand, Strategy::CityCompanyRole, StrategySpec { roles: BRAND_ROLES, keywords: BRAND_KEYWORDS, template: CITY_COMPANY_ROLE }),
    (ProfileType::Brand, Strategy::CompanyRoleDisjunction, StrategySpec { roles: BRAND_ROLES, keywords: BRAND_KEYWORDS, template: COMPANY_ROLE_DISJUNCTION }),
    (ProfileType::Leadership, Strategy::TitleCity, StrategySpec { roles: LEADERSHIP_ROLES, keywords: LEADERSHIP_KEYWORDS, template: TITLE_CITY }),
    (ProfileType::Leadership, Strategy::RoleCityKeyword, StrategySpec { roles: LEADERSHIP_ROLES, keywords: LEADERSHIP_KEYWORDS, template: ROLE_CITY_KEYWORD }),
    (ProfileType::Leadership, Strategy::CityCompanyRole, StrategySpec { roles: LEADERSHIP_ROLES, keywords: LEADERSHIP_KEYWORDS, template: CITY_COMPANY_ROLE }),
    (ProfileType::Leadership, Strategy::CompanyRoleDisjunction, StrategySpec { roles: LEADERSHIP_ROLES, keywords: LEADERSHIP_KEYWORDS, template: COMPANY_ROLE_DISJUNCTION }),
    (ProfileType::General, Strategy::TitleCity, StrategySpec { roles: GENERAL_ROLES, keywords: GENERAL_KEYWORDS, template: TITLE_CITY }),
    (ProfileType::General, Strategy::RoleCityKeyword, StrategySpec { roles: GENERAL_ROLES, keywords: GENERAL_KEYWORDS, template: ROLE_CITY_KEYWORD }),
    (ProfileType::General, Strategy::CityCompanyRole, StrategySpec { roles: GENERAL_ROLES, keywords: GENERAL_KEYWORDS, template: CITY_COMPANY_ROLE }),
    (ProfileType::General, Strategy::CompanyRoleDisjunction, StrategySpec { roles: GENERAL_ROLES, keywords: GENERAL_KEYWORDS, template: COMPANY_ROLE_DISJUNCTION }),
];

pub fn strategy_spec(profile_type: ProfileType, strategy: Strategy) -> &'static StrategySpec {
    STRATEGY_TABLE
        .iter()
        .find(|(p, s, _)| *p == profile_type && *s == strategy)
        .or_else(|| STRATEGY_TABLE.iter().find(|(p, _, _)| *p == ProfileType::General))
        .map(|(_, _, spec)| spec)
        .unwrap_or(&STRATEGY_TABLE[0].2)
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Shape the model is asked to return.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlannedBatch {
    pub queries: Vec<String>,
    #[serde(default)]
    pub negative_terms: Vec<String>,
}

pub struct PlanRequest<'a> {
    pub intent: &'a str,
    pub profile: &'a TargetProfile,
    /// Newest first.
    pub recent_queries: &'a [String],
    pub round: u32,
    pub dynamic_exclusions: bool,
    pub batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub queries: Vec<String>,
    pub negative_terms: Vec<String>,
    /// Set whenever the provider returned a response, parsed or not.
    pub usage: Option<TokenUsage>,
    pub fallback: bool,
    pub strategy: Strategy,
    /// Why the fallback was used.
    pub note: Option<String>,
}

pub struct QueryPlanner {
    llm: Arc<dyn LanguageModel>,
    lexicon: Arc<Lexicon>,
    calls: usize,
}

impl QueryPlanner {
    pub fn new(llm: Arc<dyn LanguageModel>, lexicon: Arc<Lexicon>) -> Self {
        Self {
            llm,
            lexicon,
            calls: 0,
        }
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    pub async fn plan(&mut self, request: PlanRequest<'_>) -> PlanOutcome {
        let strategy = strategy_for_call(self.calls, request.profile.industry.is_some());
        self.calls += 1;

        let completion = self
            .llm
            .complete(CompletionRequest {
                system: system_prompt(request.dynamic_exclusions),
                user: self.user_prompt(&request, strategy),
                schema: Some((PlannedBatch::type_name(), PlannedBatch::openai_schema())),
                temperature: PLANNER_TEMPERATURE,
            })
            .await;

        let completion = match completion {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, round = request.round, "Planner call failed, using fallback query");
                return fallback(&request, strategy, None, format!("planner call failed: {e}"));
            }
        };

        let Some(batch) = parse_batch(&completion.content) else {
            warn!(round = request.round, "Planner response was not valid JSON, using fallback query");
            return fallback(
                &request,
                strategy,
                Some(completion.usage),
                "planner response could not be parsed".to_string(),
            );
        };

        let queries = clean_queries(batch.queries, request.batch_size);
        if queries.is_empty() {
            return fallback(
                &request,
                strategy,
                Some(completion.usage),
                "planner returned no queries".to_string(),
            );
        }

        let negative_terms = if request.dynamic_exclusions {
            batch
                .negative_terms
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        } else {
            Vec::new()
        };

        info!(
            round = request.round,
            strategy = strategy.as_str(),
            queries = queries.len(),
            negative_terms = negative_terms.len(),
            "Planned query batch"
        );

        PlanOutcome {
            queries,
            negative_terms,
            usage: Some(completion.usage),
            fallback: false,
            strategy,
            note: None,
        }
    }

    fn user_prompt(&self, request: &PlanRequest<'_>, strategy: Strategy) -> String {
        let profile = request.profile;
        let spec = strategy_spec(profile.profile_type, strategy);

        let cities = if profile.cities.is_empty() {
            "any major city in the target market".to_string()
        } else {
            profile.cities.join(", ")
        };
        let companies = profile
            .industry_entry(&self.lexicon)
            .map(|i| i.companies.join(", "))
            .unwrap_or_else(|| "well-known employers in the target market".to_string());

        let guidance = spec
            .template
            .replace("{roles}", &spec.roles.join(", "))
            .replace("{keywords}", &spec.keywords.join(", "))
            .replace("{cities}", &cities)
            .replace("{companies}", &companies);

        let recent = if request.recent_queries.is_empty() {
            "(none yet)".to_string()
        } else {
            request
                .recent_queries
                .iter()
                .take(RECENT_SAMPLE)
                .map(|q| format!("- {q}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "Intent: {intent}\n\
             Target profile: {profile_type}{industry}\n\
             Round: {round}\n\
             Strategy: {strategy}\n{guidance}\n\n\
             Already searched (do not repeat or trivially reword):\n{recent}\n\n\
             Return up to {batch} new queries.",
            intent = request.intent.trim(),
            profile_type = profile.profile_type.as_str(),
            industry = profile
                .industry
                .as_deref()
                .map(|i| format!(", industry {i}"))
                .unwrap_or_default(),
            round = request.round,
            strategy = strategy.as_str(),
            batch = request.batch_size,
        )
    }
}

fn system_prompt(dynamic_exclusions: bool) -> String {
    let mut prompt = String::from(
        "You write search-engine queries that find public professional profiles. \
         The site restriction is added for you: never include site: operators. \
         Use quoted exact phrases for job titles and company names, OR for alternatives, \
         and keep each query under 12 words. Every query must differ meaningfully from \
         the ones already searched. Respond with JSON: {\"queries\": [...], \"negative_terms\": [...]}.",
    );
    if dynamic_exclusions {
        prompt.push_str(
            " In negative_terms, list single words or short phrases that mark profiles \
             outside the intent (for example agencies or unrelated functions).",
        );
    } else {
        prompt.push_str(" Leave negative_terms empty.");
    }
    prompt
}

/// Accepts the requested object or a bare array of queries, with or without
/// surrounding prose or code fences.
pub fn parse_batch(content: &str) -> Option<PlannedBatch> {
    let payload = extract_json_payload(content);
    if let Ok(batch) = serde_json::from_str::<PlannedBatch>(payload) {
        return Some(batch);
    }
    serde_json::from_str::<Vec<String>>(payload)
        .ok()
        .map(|queries| PlannedBatch {
            queries,
            negative_terms: Vec::new(),
        })
}

fn clean_queries(raw: Vec<String>, batch_size: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.into_iter()
        .map(|q| q.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|q| !q.is_empty() && seen.insert(query_key(q)))
        .take(batch_size.max(1))
        .collect()
}

const INTENT_FILLER: &[&str] = &[
    "find me",
    "find",
    "get me",
    "search for",
    "looking for",
    "show me",
    "i need",
    "i want",
];

/// One query made directly from the intent.
pub fn fallback_query(intent: &str) -> String {
    let compact = intent.split_whitespace().collect::<Vec<_>>().join(" ");
    let lower = compact.to_lowercase();
    for filler in INTENT_FILLER {
        if let Some(rest) = lower.strip_prefix(filler) {
            if rest.starts_with(' ') {
                return compact[filler.len()..].trim().to_string();
            }
        }
    }
    compact
}

fn fallback(
    request: &PlanRequest<'_>,
    strategy: Strategy,
    usage: Option<TokenUsage>,
    note: String,
) -> PlanOutcome {
    let query = fallback_query(request.intent);
    PlanOutcome {
        queries: if query.is_empty() { Vec::new() } else { vec![query] },
        negative_terms: Vec::new(),
        usage,
        fallback: true,
        strategy,
        note: Some(note),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLanguageModel;

    fn profile(intent: &str) -> (Arc<Lexicon>, TargetProfile) {
        let lex = Arc::new(Lexicon::builtin().unwrap());
        let p = TargetProfile::detect(intent, &lex);
        (lex, p)
    }

    fn request<'a>(intent: &'a str, profile: &'a TargetProfile, recent: &'a [String]) -> PlanRequest<'a> {
        PlanRequest {
            intent,
            profile,
            recent_queries: recent,
            round: 1,
            dynamic_exclusions: true,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[test]
    fn rotation_is_deterministic() {
        let plain: Vec<_> = (0..5).map(|c| strategy_for_call(c, false)).collect();
        assert_eq!(plain[0], Strategy::TitleCity);
        assert_eq!(plain[3], Strategy::CompanyRoleDisjunction);
        assert_eq!(plain[4], Strategy::TitleCity);
    }

    #[test]
    fn industry_rotation_favours_company_strategies() {
        let company_calls = (0..12)
            .filter(|c| strategy_for_call(*c, true).uses_companies())
            .count();
        let plain_company_calls = (0..12)
            .filter(|c| strategy_for_call(*c, false).uses_companies())
            .count();
        assert!(company_calls > plain_company_calls);
    }

    #[test]
    fn every_table_entry_is_reachable() {
        for pt in [ProfileType::Activation, ProfileType::Brand, ProfileType::Leadership, ProfileType::General] {
            for s in PLAIN_ROTATION {
                let spec = strategy_spec(pt, *s);
                assert!(!spec.roles.is_empty());
                assert!(spec.template.contains("{roles}"));
            }
        }
        assert_eq!(
            strategy_spec(ProfileType::Activation, Strategy::TitleCity).roles,
            ACTIVATION_ROLES
        );
    }

    #[test]
    fn parses_object_array_and_prose() {
        let batch = parse_batch("```json\n{\"queries\": [\"a\", \"b\"], \"negative_terms\": [\"agency\"]}\n```").unwrap();
        assert_eq!(batch.queries, vec!["a", "b"]);
        assert_eq!(batch.negative_terms, vec!["agency"]);

        let bare = parse_batch("Here are some: [\"x\", \"y\"]").unwrap();
        assert_eq!(bare.queries, vec!["x", "y"]);

        assert!(parse_batch("I cannot help with that.").is_none());
    }

    #[test]
    fn fallback_query_strips_filler() {
        assert_eq!(fallback_query("Find me  BTL managers in Mumbai"), "BTL managers in Mumbai");
        assert_eq!(fallback_query("Findlay marketing heads"), "Findlay marketing heads");
        assert_eq!(fallback_query("  "), "");
    }

    #[test]
    fn clean_queries_dedups_and_caps() {
        let raw = vec!["  a  b ".into(), "A B".into(), "".into(), "c".into(), "d".into()];
        assert_eq!(clean_queries(raw, 2), vec!["a b", "c"]);
    }

    #[tokio::test]
    async fn well_formed_response_is_used() {
        let (lex, p) = profile("BTL managers in Mumbai");
        let llm = MockLanguageModel::new()
            .respond(r#"{"queries": ["\"BTL Manager\" Mumbai", "\"Activation Manager\" Mumbai"], "negative_terms": ["agency"]}"#);
        let mut planner = QueryPlanner::new(Arc::new(llm), lex);
        let outcome = planner.plan(request("BTL managers in Mumbai", &p, &[])).await;
        assert!(!outcome.fallback);
        assert_eq!(outcome.queries.len(), 2);
        assert_eq!(outcome.negative_terms, vec!["agency"]);
        assert!(outcome.usage.is_some());
    }

    #[tokio::test]
    async fn negative_terms_dropped_when_dynamic_exclusions_off() {
        let (lex, p) = profile("BTL managers in Mumbai");
        let llm = MockLanguageModel::new()
            .respond(r#"{"queries": ["q1"], "negative_terms": ["agency"]}"#);
        let mut planner = QueryPlanner::new(Arc::new(llm), lex);
        let mut req = request("BTL managers in Mumbai", &p, &[]);
        req.dynamic_exclusions = false;
        let outcome = planner.plan(req).await;
        assert!(outcome.negative_terms.is_empty());
    }

    #[tokio::test]
    async fn non_json_response_falls_back_and_keeps_usage() {
        let (lex, p) = profile("BTL managers in Mumbai");
        let llm = MockLanguageModel::new().respond("Sorry, I can't produce JSON today.");
        let mut planner = QueryPlanner::new(Arc::new(llm), lex);
        let outcome = planner.plan(request("Find BTL managers in Mumbai", &p, &[])).await;
        assert!(outcome.fallback);
        assert_eq!(outcome.queries, vec!["BTL managers in Mumbai"]);
        assert!(outcome.usage.is_some());
        assert!(outcome.note.is_some());
    }

    #[tokio::test]
    async fn provider_error_falls_back_without_usage() {
        let (lex, p) = profile("BTL managers in Mumbai");
        let llm = MockLanguageModel::new().fail("upstream 500");
        let mut planner = QueryPlanner::new(Arc::new(llm), lex);
        let outcome = planner.plan(request("BTL managers in Mumbai", &p, &[])).await;
        assert!(outcome.fallback);
        assert!(outcome.usage.is_none());
    }

    #[tokio::test]
    async fn prompt_carries_recent_queries_and_companies() {
        let (lex, p) = profile("Brand managers at FMCG companies in Delhi");
        let llm = Arc::new(MockLanguageModel::new().respond(r#"{"queries": ["q"], "negative_terms": []}"#));
        let mut planner = QueryPlanner::new(llm.clone(), lex);
        let recent = vec!["\"Brand Manager\" Delhi".to_string()];
        planner.plan(request("Brand managers at FMCG companies in Delhi", &p, &recent)).await;

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("- \"Brand Manager\" Delhi"));
        assert!(prompts[0].contains("Hindustan Unilever"));
        assert!(prompts[0].contains("Strategy: city_company_role"));
    }
}
