//! Run controller: plan → dispatch → collect, round after round, until the
//! target is met, the budget runs out, the search space dries up, or the run
//! is cancelled.
//!
//! The controller is the only writer of run state. Query tasks report over an
//! mpsc channel and the collect loop consumes their messages one at a time, so
//! the collected set, exclusion set, ledger and spend meter need no locking.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use leadscout_common::{AuditRecord, AuditVerdict, Candidate, Config, Lead, LeadItem};

use crate::events::{EventSink, RunEvent};
use crate::handle::normalize_handle;
use crate::icp::TargetProfile;
use crate::infra::mirror::LeadMirror;
use crate::infra::spend::SpendMeter;
use crate::lexicon::Lexicon;
use crate::pipeline::classifier::{CandidateClassifier, RejectReason, Verdict};
use crate::pipeline::exclusion::{load_snapshot, ExclusionSet};
use crate::pipeline::executor::{ExecutorSettings, SearchExecutor, SearchMessage};
use crate::pipeline::ledger::QueryLedger;
use crate::pipeline::planner::{PlanRequest, QueryPlanner, DEFAULT_BATCH_SIZE, RECENT_SAMPLE};
use crate::pipeline::stats::RunTally;
use crate::pipeline::surface::SearchSurface;
use crate::traits::{InsertOutcome, LanguageModel, LeadStore, PageFetcher};

pub const MAX_TARGET: u32 = 1000;

/// Forced ledger evictions tolerated without a novel query in between.
pub const MAX_FORCED_EVICTIONS: u32 = 2;

/// Consecutive rounds without a new lead before the run is declared exhausted.
pub const STALL_ROUNDS: u32 = 12;

const MESSAGE_BUFFER: usize = 64;

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub intent: String,
    /// Clamped to `1..=MAX_TARGET`.
    pub target: u32,
    pub dynamic_exclusions: bool,
    pub manual_exclusions: Vec<String>,
    /// 0 = unlimited.
    pub budget_usd: f64,
    pub session_id: Uuid,
}

impl RunRequest {
    pub fn new(intent: impl Into<String>, target: u32) -> Self {
        Self {
            intent: intent.into(),
            target: target.clamp(1, MAX_TARGET),
            dynamic_exclusions: true,
            manual_exclusions: Vec::new(),
            budget_usd: 0.0,
            session_id: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The target was reached.
    Done,
    /// Planning or searching stopped producing anything new.
    Exhausted,
    Cancelled,
    BudgetExceeded,
    /// The run could not start (no model, empty intent, store unavailable).
    Failed,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Done => "done",
            RunOutcome::Exhausted => "exhausted",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::BudgetExceeded => "budget_exceeded",
            RunOutcome::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct RunController {
    llm: Option<Arc<dyn LanguageModel>>,
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn LeadStore>,
    lexicon: Arc<Lexicon>,
    surface: SearchSurface,
    settings: ExecutorSettings,
    mirror: Option<LeadMirror>,
    exclusion_file: Option<PathBuf>,
    queries_per_round: usize,
    ledger_window: usize,
}

/// State owned by one run.
struct RunState {
    session_id: Uuid,
    target: usize,
    classifier: CandidateClassifier,
    exclusions: ExclusionSet,
    collected: HashSet<String>,
    items: Vec<LeadItem>,
    ledger: QueryLedger,
    spend: SpendMeter,
    tally: RunTally,
    current_query: String,
}

impl RunState {
    fn target_reached(&self) -> bool {
        self.collected.len() >= self.target
    }
}

impl RunController {
    pub fn new(
        llm: Option<Arc<dyn LanguageModel>>,
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn LeadStore>,
        lexicon: Arc<Lexicon>,
    ) -> Self {
        Self {
            llm,
            fetcher,
            store,
            lexicon,
            surface: SearchSurface::default(),
            settings: ExecutorSettings::default(),
            mirror: None,
            exclusion_file: None,
            queries_per_round: DEFAULT_BATCH_SIZE,
            ledger_window: 150,
        }
    }

    /// Apply the engine, planning and persistence settings from `config`.
    pub fn configured(mut self, config: &Config) -> Self {
        self.surface = SearchSurface::new(config.search_surface);
        self.settings = ExecutorSettings::from_config(config);
        self.mirror = Some(LeadMirror::new(config.leads_mirror_path.clone()));
        self.exclusion_file = config.exclusion_file.clone();
        self.queries_per_round = config.queries_per_round.max(1);
        self.ledger_window = config.ledger_window.max(1);
        self
    }

    pub fn with_surface(mut self, surface: SearchSurface) -> Self {
        self.surface = surface;
        self
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_mirror(mut self, mirror: LeadMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn with_exclusion_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclusion_file = Some(path.into());
        self
    }

    pub fn with_queries_per_round(mut self, n: usize) -> Self {
        self.queries_per_round = n.max(1);
        self
    }

    pub fn with_ledger_window(mut self, window: usize) -> Self {
        self.ledger_window = window.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn LeadStore> {
        &self.store
    }

    /// Execute one run, streaming progress to `sink`. Every run that starts
    /// ends with a `done` event carrying the leads it collected.
    pub async fn run(
        &self,
        request: RunRequest,
        sink: EventSink,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let intent = request.intent.trim().to_string();
        if intent.is_empty() {
            sink.error("Query is required");
            return RunOutcome::Failed;
        }
        let Some(llm) = self.llm.clone() else {
            sink.error("OPENAI_API_KEY is not configured; cannot plan queries");
            return RunOutcome::Failed;
        };

        let mut state = match self.prepare(&intent, &request, &sink).await {
            Ok(state) => state,
            Err(message) => {
                sink.error(message);
                self.fetcher.release().await;
                return RunOutcome::Failed;
            }
        };

        let mut planner = QueryPlanner::new(llm, self.lexicon.clone());
        let outcome = self
            .run_rounds(&intent, &request, &mut planner, &mut state, &sink, &cancel)
            .await;

        self.fetcher.release().await;

        match outcome {
            RunOutcome::Done => sink.log(format!(
                "Target reached: {} leads collected",
                state.collected.len()
            )),
            RunOutcome::Exhausted => sink.log(format!(
                "Search exhausted after {} rounds with {} of {} leads",
                state.tally.rounds,
                state.collected.len(),
                state.target
            )),
            RunOutcome::Cancelled => sink.log(format!(
                "Run stopped with {} leads collected",
                state.collected.len()
            )),
            RunOutcome::BudgetExceeded | RunOutcome::Failed => {}
        }

        info!(
            session_id = %state.session_id,
            outcome = outcome.as_str(),
            kept = state.tally.kept,
            "Run finished"
        );
        info!("{}", state.tally);
        state.spend.log_status();

        sink.emit(RunEvent::Done(std::mem::take(&mut state.items)));
        outcome
    }

    /// Build run state and seed the exclusion set. Only an unavailable store
    /// is fatal; a missing snapshot file is reported and skipped.
    async fn prepare(
        &self,
        intent: &str,
        request: &RunRequest,
        sink: &EventSink,
    ) -> Result<RunState, String> {
        let profile = TargetProfile::detect(intent, &self.lexicon);
        info!(
            session_id = %request.session_id,
            profile = profile.profile_type.as_str(),
            industry = profile.industry.as_deref().unwrap_or("-"),
            target = request.target,
            "Starting lead run"
        );
        sink.log(format!(
            "Target profile: {}{}",
            profile.profile_type.as_str(),
            profile
                .industry
                .as_deref()
                .map(|i| format!(" ({i})"))
                .unwrap_or_default()
        ));

        let classifier = CandidateClassifier::new(self.lexicon.clone(), profile, intent)
            .map_err(|e| format!("Could not build classifier: {e}"))?;

        let mut exclusions = ExclusionSet::new();
        let persisted = self
            .store
            .lead_urls()
            .await
            .map_err(|e| format!("Lead store unavailable: {e}"))?;
        let from_store = exclusions.seed(&persisted);

        let mut from_file = 0;
        if let Some(path) = &self.exclusion_file {
            match load_snapshot(path) {
                Ok(handles) => from_file = exclusions.seed(&handles),
                Err(e) => {
                    warn!(error = %e, "Skipping exclusion snapshot");
                    sink.log(format!("Exclusion file skipped: {e}"));
                }
            }
        }
        let manual = exclusions.seed(&request.manual_exclusions);
        sink.log(format!(
            "Excluding {} known profiles ({from_store} stored, {from_file} from file, {manual} manual)",
            exclusions.len()
        ));

        let base_all_time = match self.store.total_cost().await {
            Ok(total) => total,
            Err(e) => {
                warn!(error = %e, "Could not read all-time spend, starting from zero");
                0.0
            }
        };
        let spend = SpendMeter::new(request.session_id, request.budget_usd, base_all_time);
        sink.emit(RunEvent::CostUpdate(spend.update()));

        Ok(RunState {
            session_id: request.session_id,
            target: request.target.clamp(1, MAX_TARGET) as usize,
            classifier,
            exclusions,
            collected: HashSet::new(),
            items: Vec::new(),
            ledger: QueryLedger::new(self.ledger_window),
            spend,
            tally: RunTally::default(),
            current_query: String::new(),
        })
    }

    async fn run_rounds(
        &self,
        intent: &str,
        request: &RunRequest,
        planner: &mut QueryPlanner,
        state: &mut RunState,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let executor = Arc::new(SearchExecutor::new(
            self.fetcher.clone(),
            self.surface.clone(),
            self.settings.clone(),
        ));
        let mut round: u32 = 0;
        let mut evictions_without_novel: u32 = 0;
        let mut stalled_rounds: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return RunOutcome::Cancelled;
            }
            if state.target_reached() {
                return RunOutcome::Done;
            }
            if state.spend.exceeded() {
                sink.log(format!(
                    "Budget of ${:.2} reached (spent ${:.4}); stopping",
                    state.spend.budget(),
                    state.spend.session_total()
                ));
                return RunOutcome::BudgetExceeded;
            }
            if stalled_rounds >= STALL_ROUNDS {
                return RunOutcome::Exhausted;
            }

            round += 1;
            sink.log(format!("Planning round {round}"));

            let recent = state.ledger.recent(RECENT_SAMPLE);
            let plan_request = PlanRequest {
                intent,
                profile: state.classifier.profile(),
                recent_queries: &recent,
                round,
                dynamic_exclusions: request.dynamic_exclusions,
                batch_size: self.queries_per_round,
            };
            let plan = tokio::select! {
                biased;
                _ = cancel.cancelled() => return RunOutcome::Cancelled,
                plan = planner.plan(plan_request) => plan,
            };

            if let Some(usage) = plan.usage {
                let model = planner.model().to_string();
                state.spend.charge(usage, &model, self.store.as_ref()).await;
                sink.emit(RunEvent::CostUpdate(state.spend.update()));
            }
            if plan.fallback {
                state.tally.fallback_plans += 1;
                sink.log(format!(
                    "Planner fallback ({}); searching the intent directly",
                    plan.note.as_deref().unwrap_or("no usable response")
                ));
            }
            match state.classifier.add_negative_terms(&plan.negative_terms) {
                Ok(0) => {}
                Ok(added) => sink.log(format!("Added {added} exclusion terms")),
                Err(e) => warn!(error = %e, "Ignoring planner negative terms"),
            }

            let novel: Vec<String> = plan
                .queries
                .into_iter()
                .filter(|q| state.ledger.add(q))
                .collect();

            if state.ledger.record_round(novel.len()) {
                state.tally.forced_evictions += 1;
                evictions_without_novel += 1;
                sink.log("No new queries for several rounds; freeing the oldest half of the query history");
            }
            if novel.is_empty() {
                stalled_rounds += 1;
                if evictions_without_novel > MAX_FORCED_EVICTIONS {
                    return RunOutcome::Exhausted;
                }
                debug!(round, "Planner produced no novel queries");
                continue;
            }
            evictions_without_novel = 0;

            let kept_before = state.collected.len();
            self.dispatch_round(round, novel, &executor, state, sink, cancel)
                .await;

            if state.collected.len() > kept_before {
                stalled_rounds = 0;
            } else {
                stalled_rounds += 1;
            }
        }
    }

    /// Run one batch of queries concurrently and consume their results until
    /// every task finishes, the target is reached, or the run is cancelled.
    async fn dispatch_round(
        &self,
        round: u32,
        queries: Vec<String>,
        executor: &Arc<SearchExecutor>,
        state: &mut RunState,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) {
        state.tally.rounds += 1;
        state.tally.queries_issued += queries.len() as u32;
        for query in &queries {
            if let Err(e) = self.store.append_query(query).await {
                warn!(error = %e, "Failed to record query");
            }
        }
        sink.log(format!("Round {round}: running {} queries", queries.len()));

        let round_token = cancel.child_token();
        let (tx, mut rx) = mpsc::channel(MESSAGE_BUFFER);
        let mut tasks = JoinSet::new();
        for query in queries {
            let executor = executor.clone();
            let token = round_token.clone();
            let tx = tx.clone();
            tasks.spawn(async move { executor.run_query(query, token, tx).await });
        }
        drop(tx);

        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = rx.recv() => message,
            };
            let Some(message) = message else { break };

            match message {
                SearchMessage::Page {
                    query,
                    page,
                    candidates,
                } => {
                    state.tally.pages_read += 1;
                    debug!(query = %query, page, count = candidates.len(), "Collecting page");
                    state.current_query = query;
                    for candidate in candidates {
                        if cancel.is_cancelled() || state.target_reached() {
                            break;
                        }
                        self.consider(candidate, state, sink, cancel).await;
                    }
                    sink.emit(RunEvent::Stats(state.tally.snapshot(&state.current_query)));
                    if cancel.is_cancelled() || state.target_reached() {
                        break;
                    }
                }
                SearchMessage::Failed { query, error } => {
                    state.tally.queries_failed += 1;
                    sink.log(format!("Query abandoned after retries: {query} ({error})"));
                }
                SearchMessage::Finished { query, pages } => {
                    debug!(query = %query, pages, "Query task finished");
                }
            }
        }

        round_token.cancel();
        drop(rx);
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    warn!(error = %e, "Query task panicked");
                }
            }
        }
    }

    /// Classify one candidate and persist it if accepted.
    async fn consider(
        &self,
        candidate: Candidate,
        state: &mut RunState,
        sink: &EventSink,
        cancel: &CancellationToken,
    ) {
        state.tally.candidates_scanned += 1;
        let key = normalize_handle(&candidate.url);

        let verdict =
            state
                .classifier
                .classify(&candidate, &state.exclusions, &state.collected);

        let verdict = match verdict {
            Verdict::Kept => {
                let location = state.classifier.infer_location(&candidate);
                let lead = Lead::from_candidate(key.clone(), &candidate, location);
                let inserted = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(key = %key, "Run cancelled before lead was stored");
                        return;
                    }
                    inserted = self.store.insert_lead(&lead) => inserted,
                };
                match inserted {
                    Ok(InsertOutcome::Fresh) => {
                        state.exclusions.add(&candidate.url);
                        state.collected.insert(key.clone());
                        state.tally.kept += 1;
                        if let Some(mirror) = &self.mirror {
                            if let Err(e) = mirror.append(&lead).await {
                                warn!(error = %e, path = %mirror.path().display(), "Failed to mirror lead");
                            }
                        }
                        let item = lead.to_item();
                        state.items.push(item.clone());
                        sink.emit(RunEvent::ItemExtracted(item));
                        Verdict::Kept
                    }
                    Ok(InsertOutcome::Duplicate) => {
                        state.exclusions.add(&candidate.url);
                        Verdict::Rejected(RejectReason::Duplicate)
                    }
                    Err(e) => {
                        warn!(error = %e, key = %key, "Failed to store lead");
                        sink.log(format!("Could not save {}: {e}", candidate.url));
                        return;
                    }
                }
            }
            rejected => rejected,
        };

        let (audit_verdict, reason) = match &verdict {
            Verdict::Kept => (AuditVerdict::Kept, "kept".to_string()),
            Verdict::Rejected(reason) => {
                state.tally.reject(reason);
                (AuditVerdict::Rejected, reason.to_string())
            }
        };
        let record = AuditRecord {
            session_id: state.session_id,
            url: candidate.url,
            canonical_key: key,
            verdict: audit_verdict,
            reason,
            query: candidate.query,
        };
        if let Err(e) = self.store.append_audit(&record).await {
            warn!(error = %e, "Failed to append audit record");
        }
    }
}
