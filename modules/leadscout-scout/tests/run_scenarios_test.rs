//! Integration tests: the run controller end to end against in-process mocks.
//!
//! No network, no browser. The planner talks to `MockLanguageModel`, pages
//! come from `MockFetcher`, and leads land in `MockLeadStore` or an
//! in-memory SQLite store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use leadscout_scout::infra::store::SqliteLeadStore;
use leadscout_scout::lexicon::Lexicon;
use leadscout_scout::pipeline::controller::STALL_ROUNDS;
use leadscout_scout::pipeline::executor::ExecutorSettings;
use leadscout_scout::testing::{
    yahoo_results_page, MockFetcher, MockLanguageModel, MockLeadStore, ProfileRow,
};
use leadscout_scout::traits::{LanguageModel, LeadStore, PageFetcher};
use leadscout_scout::{EventSink, RunController, RunEvent, RunOutcome, RunRequest};

const INTENT: &str = "BTL managers in Mumbai";
const QUERY: &str = "BTL Manager Mumbai";

fn fast_settings() -> ExecutorSettings {
    ExecutorSettings {
        max_retries: 1,
        delay_between_requests: Duration::ZERO,
        max_pages_per_query: 1,
        retry_base: Duration::from_millis(1),
    }
}

fn plan_json(queries: &[&str]) -> String {
    serde_json::json!({ "queries": queries, "negative_terms": [] }).to_string()
}

fn mumbai_row(i: usize) -> ProfileRow {
    ProfileRow::new(
        &format!("btl-manager-{i}"),
        &format!("Person {i}"),
        "BTL Manager",
        "Hindustan Unilever",
        "Mumbai, Maharashtra, India · 500+ connections",
    )
}

fn mumbai_rows(n: usize) -> Vec<ProfileRow> {
    (0..n).map(mumbai_row).collect()
}

fn controller(
    llm: Arc<dyn LanguageModel>,
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn LeadStore>,
) -> RunController {
    let lexicon = Arc::new(Lexicon::builtin().expect("builtin lexicon"));
    RunController::new(Some(llm), fetcher, store, lexicon).with_settings(fast_settings())
}

fn drain(mut rx: UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn extracted(events: &[RunEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            RunEvent::ItemExtracted(item) => Some(item.url.clone()),
            _ => None,
        })
        .collect()
}

fn done_items(events: &[RunEvent]) -> usize {
    match events.last() {
        Some(RunEvent::Done(items)) => items.len(),
        other => panic!("last event should be done, got {other:?}"),
    }
}

fn errors(events: &[RunEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Error(message) => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn logs(events: &[RunEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            RunEvent::Log(message) => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn assert_stats_consistent(events: &[RunEvent]) {
    for event in events {
        if let RunEvent::Stats(stats) = event {
            assert!(
                stats.kept + stats.rejected <= stats.raw_leads_found,
                "kept {} + rejected {} exceeds scanned {}",
                stats.kept,
                stats.rejected,
                stats.raw_leads_found
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reaches_target_exactly() {
    let llm = Arc::new(MockLanguageModel::new().respond(plan_json(&[QUERY])));
    let fetcher = Arc::new(MockFetcher::new().on_query(QUERY, 0, yahoo_results_page(&mumbai_rows(8))));
    let store = Arc::new(MockLeadStore::new());
    let ctl = controller(llm, fetcher.clone(), store.clone());

    let (sink, rx) = EventSink::channel();
    let outcome = ctl
        .run(RunRequest::new(INTENT, 5), sink, CancellationToken::new())
        .await;
    let events = drain(rx);

    assert_eq!(outcome, RunOutcome::Done);
    assert_eq!(extracted(&events).len(), 5);
    assert_eq!(done_items(&events), 5);
    assert_eq!(store.leads().len(), 5);
    assert!(errors(&events).is_empty());
    assert_stats_consistent(&events);
    assert!(fetcher.released());

    let lead = &store.leads()[0];
    assert_eq!(lead.url, "btl-manager-0");
    assert_eq!(lead.location, "Mumbai, Maharashtra, India");
    assert_eq!(store.queries(), vec![QUERY.to_string()]);
}

#[tokio::test]
async fn cost_updates_track_planner_calls() {
    let llm = Arc::new(MockLanguageModel::new().respond(plan_json(&[QUERY])));
    let fetcher = Arc::new(MockFetcher::new().on_query(QUERY, 0, yahoo_results_page(&mumbai_rows(3))));
    let store = Arc::new(MockLeadStore::new().with_total_cost(1.5));
    let ctl = controller(llm, fetcher, store.clone());

    let (sink, rx) = EventSink::channel();
    ctl.run(RunRequest::new(INTENT, 3), sink, CancellationToken::new())
        .await;
    let events = drain(rx);

    let updates: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::CostUpdate(u) => Some(*u),
            _ => None,
        })
        .collect();
    assert_eq!(updates.len(), 2, "initial snapshot plus one planner call");
    assert_eq!(updates[0].session_cost, 0.0);
    assert!((updates[0].all_time_cost - 1.5).abs() < 1e-9);
    assert!(updates[1].last_call_cost > 0.0);
    assert!((updates[1].all_time_cost - 1.5 - updates[1].session_cost).abs() < 1e-9);
    assert_eq!(store.cost_records().len(), 1);
}

#[tokio::test]
async fn budget_halts_before_next_round() {
    // One planner call costs more than the whole budget.
    let llm = Arc::new(MockLanguageModel::new().respond(plan_json(&[QUERY])));
    let fetcher = Arc::new(MockFetcher::new().on_query(QUERY, 0, yahoo_results_page(&mumbai_rows(2))));
    let store = Arc::new(MockLeadStore::new());
    let ctl = controller(llm.clone(), fetcher, store);

    let mut request = RunRequest::new(INTENT, 50);
    request.budget_usd = 0.0001;
    let (sink, rx) = EventSink::channel();
    let outcome = ctl.run(request, sink, CancellationToken::new()).await;
    let events = drain(rx);

    assert_eq!(outcome, RunOutcome::BudgetExceeded);
    assert_eq!(llm.calls(), 1);
    assert!(logs(&events).iter().any(|l| l.contains("Budget")));
    assert_eq!(done_items(&events), 2);
}

#[tokio::test]
async fn cancellation_is_prompt() {
    let llm = Arc::new(MockLanguageModel::new().respond(plan_json(&[QUERY, "Activation Manager Mumbai"])));
    let fetcher = Arc::new(MockFetcher::new().with_latency(Duration::from_secs(30)));
    let store = Arc::new(MockLeadStore::new());
    let ctl = controller(llm, fetcher.clone(), store);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let (sink, rx) = EventSink::channel();
    let started = Instant::now();
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        ctl.run(RunRequest::new(INTENT, 10), sink, cancel),
    )
    .await
    .expect("run should stop soon after cancellation");

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(fetcher.released());
    let events = drain(rx);
    assert_eq!(done_items(&events), 0);
    assert!(errors(&events).is_empty());
}

#[tokio::test]
async fn cancellation_stops_mid_page_with_slow_store() {
    let llm = Arc::new(MockLanguageModel::new().respond(plan_json(&[QUERY])));
    let fetcher = Arc::new(MockFetcher::new().on_query(QUERY, 0, yahoo_results_page(&mumbai_rows(10))));
    let store = Arc::new(MockLeadStore::new().with_insert_latency(Duration::from_millis(300)));
    let ctl = controller(llm, fetcher, store.clone());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let (sink, rx) = EventSink::channel();
    let started = Instant::now();
    let outcome = ctl.run(RunRequest::new(INTENT, 10), sink, cancel).await;
    let events = drain(rx);

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_millis(1500), "took {:?}", started.elapsed());
    let stored = store.leads().len();
    assert!(stored < 10, "{stored} leads stored after cancel");
    assert_eq!(extracted(&events).len(), stored);
    assert_eq!(done_items(&events), stored);
}

#[tokio::test]
async fn non_json_planner_response_falls_back_to_intent() {
    let intent = "Find BTL managers in Mumbai";
    let fallback = "BTL managers in Mumbai";
    let llm = Arc::new(MockLanguageModel::new().respond("You could try searching for BTL people."));
    let fetcher = Arc::new(MockFetcher::new().on_query(fallback, 0, yahoo_results_page(&mumbai_rows(4))));
    let store = Arc::new(MockLeadStore::new());
    let ctl = controller(llm, fetcher, store.clone());

    let (sink, rx) = EventSink::channel();
    let outcome = ctl
        .run(RunRequest::new(intent, 3), sink, CancellationToken::new())
        .await;
    let events = drain(rx);

    assert_eq!(outcome, RunOutcome::Done);
    assert!(errors(&events).is_empty());
    assert!(logs(&events).iter().any(|l| l.contains("Planner fallback")));
    assert_eq!(store.queries(), vec![fallback.to_string()]);
    assert_eq!(extracted(&events).len(), 3);
}

#[tokio::test]
async fn previously_stored_profiles_are_skipped() {
    let llm = Arc::new(MockLanguageModel::new().respond(plan_json(&[QUERY])));
    let fetcher = Arc::new(MockFetcher::new().on_query(QUERY, 0, yahoo_results_page(&mumbai_rows(4))));
    let store = Arc::new(MockLeadStore::new().with_leads(&["btl-manager-0", "btl-manager-1"]));
    let ctl = controller(llm, fetcher, store.clone());

    let (sink, rx) = EventSink::channel();
    let outcome = ctl
        .run(RunRequest::new(INTENT, 10), sink, CancellationToken::new())
        .await;
    let events = drain(rx);

    assert_eq!(outcome, RunOutcome::Exhausted);
    assert_eq!(
        extracted(&events),
        vec![
            "https://in.linkedin.com/in/btl-manager-2".to_string(),
            "https://in.linkedin.com/in/btl-manager-3".to_string(),
        ]
    );
    assert_eq!(store.leads().len(), 4);
    let duplicates = store
        .audit_records()
        .iter()
        .filter(|a| a.reason == "duplicate")
        .count();
    assert!(duplicates >= 2);
    assert_stats_consistent(&events);
}

#[tokio::test]
async fn manual_exclusions_match_any_url_variant() {
    let llm = Arc::new(MockLanguageModel::new().respond(plan_json(&[QUERY])));
    let fetcher = Arc::new(MockFetcher::new().on_query(QUERY, 0, yahoo_results_page(&mumbai_rows(3))));
    let store = Arc::new(MockLeadStore::new());
    let ctl = controller(llm, fetcher, store.clone());

    let mut request = RunRequest::new(INTENT, 2);
    request.manual_exclusions = vec!["http://www.linkedin.com/in/BTL-Manager-0/?trk=x".to_string()];
    let (sink, rx) = EventSink::channel();
    let outcome = ctl.run(request, sink, CancellationToken::new()).await;
    let events = drain(rx);

    assert_eq!(outcome, RunOutcome::Done);
    let urls = extracted(&events);
    assert!(!urls.iter().any(|u| u.ends_with("btl-manager-0")));
    assert_eq!(urls.len(), 2);
}

#[tokio::test]
async fn same_profile_from_two_queries_is_kept_once() {
    let other = "Activation Manager Mumbai";
    let llm = Arc::new(MockLanguageModel::new().respond(plan_json(&[QUERY, other])));
    let shared = mumbai_row(7);
    let fetcher = Arc::new(
        MockFetcher::new()
            .on_query(QUERY, 0, yahoo_results_page(&[shared.clone()]))
            .on_query(other, 0, yahoo_results_page(&[shared.on_host("www.linkedin.com")])),
    );
    let store = Arc::new(MockLeadStore::new());
    let ctl = controller(llm, fetcher, store.clone());

    let (sink, rx) = EventSink::channel();
    let outcome = ctl
        .run(RunRequest::new(INTENT, 5), sink, CancellationToken::new())
        .await;
    let events = drain(rx);

    assert_eq!(outcome, RunOutcome::Exhausted);
    assert_eq!(extracted(&events).len(), 1);
    assert_eq!(store.leads().len(), 1);
    assert!(store.audit_records().iter().any(|a| a.reason == "duplicate"));
}

#[tokio::test]
async fn non_local_subdomain_without_location_is_rejected() {
    let llm = Arc::new(MockLanguageModel::new().respond(plan_json(&["BTL Manager"])));
    let foreign = ProfileRow::new("maple-btl", "Test Person", "BTL Manager", "Acme", "Experienced field marketer")
        .on_host("ca.linkedin.com");
    let fetcher = Arc::new(MockFetcher::new().on_query(
        "BTL Manager",
        0,
        yahoo_results_page(&[foreign, mumbai_row(1)]),
    ));
    let store = Arc::new(MockLeadStore::new());
    let ctl = controller(llm, fetcher, store.clone());

    let (sink, rx) = EventSink::channel();
    let outcome = ctl
        .run(RunRequest::new("BTL managers", 1), sink, CancellationToken::new())
        .await;
    let events = drain(rx);

    assert_eq!(outcome, RunOutcome::Done);
    assert_eq!(extracted(&events), vec!["https://in.linkedin.com/in/btl-manager-1".to_string()]);
    assert!(store
        .audit_records()
        .iter()
        .any(|a| a.reason == "non_local_subdomain:ca"));
}

#[tokio::test]
async fn repeated_plans_exhaust_after_forced_evictions() {
    let first = plan_json(&["q a", "q b", "q c", "q d"]);
    let repeat = plan_json(&["q d"]);
    let llm = Arc::new(MockLanguageModel::new().respond(first).respond(repeat));
    let fetcher = Arc::new(MockFetcher::new());
    let store = Arc::new(MockLeadStore::new());
    let ctl = controller(llm.clone(), fetcher, store);

    let (sink, rx) = EventSink::channel();
    let outcome = ctl
        .run(RunRequest::new(INTENT, 5), sink, CancellationToken::new())
        .await;
    let events = drain(rx);

    assert_eq!(outcome, RunOutcome::Exhausted);
    assert_eq!(llm.calls(), 10);
    let evictions = logs(&events)
        .iter()
        .filter(|l| l.contains("freeing the oldest half"))
        .count();
    assert_eq!(evictions, 3);
    assert_eq!(done_items(&events), 0);
}

#[tokio::test]
async fn fruitless_rounds_end_the_run() {
    let llm = Arc::new(MockLanguageModel::new().respond(plan_json(&[QUERY])));
    let fetcher = Arc::new(MockFetcher::new());
    let store = Arc::new(MockLeadStore::new());
    let ctl = controller(llm.clone(), fetcher, store);

    let (sink, rx) = EventSink::channel();
    let outcome = ctl
        .run(RunRequest::new(INTENT, 5), sink, CancellationToken::new())
        .await;

    assert_eq!(outcome, RunOutcome::Exhausted);
    assert!(llm.calls() <= STALL_ROUNDS as usize);
    assert_eq!(done_items(&drain(rx)), 0);
}

#[tokio::test]
async fn transient_navigation_failures_are_retried() {
    let llm = Arc::new(MockLanguageModel::new().respond(plan_json(&[QUERY])));
    let fetcher = Arc::new(
        MockFetcher::new()
            .on_query(QUERY, 0, yahoo_results_page(&mumbai_rows(2)))
            .fail_first(1),
    );
    let store = Arc::new(MockLeadStore::new());
    let ctl = controller(llm, fetcher.clone(), store);

    let (sink, rx) = EventSink::channel();
    let outcome = ctl
        .run(RunRequest::new(INTENT, 2), sink, CancellationToken::new())
        .await;

    assert_eq!(outcome, RunOutcome::Done);
    assert_eq!(fetcher.fetch_count(), 2);
    assert_eq!(extracted(&drain(rx)).len(), 2);
}

#[tokio::test]
async fn failing_logs_do_not_stop_the_run() {
    let llm = Arc::new(MockLanguageModel::new().respond(plan_json(&[QUERY])));
    let fetcher = Arc::new(MockFetcher::new().on_query(QUERY, 0, yahoo_results_page(&mumbai_rows(3))));
    let store = Arc::new(MockLeadStore::new().failing_logs());
    let ctl = controller(llm, fetcher, store.clone());

    let (sink, rx) = EventSink::channel();
    let outcome = ctl
        .run(RunRequest::new(INTENT, 3), sink, CancellationToken::new())
        .await;
    let events = drain(rx);

    assert_eq!(outcome, RunOutcome::Done);
    assert!(errors(&events).is_empty());
    assert_eq!(store.leads().len(), 3);
    assert!(store.queries().is_empty());
}

// ---------------------------------------------------------------------------
// Start-up failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_model_reports_error_and_does_not_start() {
    let fetcher = Arc::new(MockFetcher::new());
    let lexicon = Arc::new(Lexicon::builtin().unwrap());
    let ctl = RunController::new(None, fetcher.clone(), Arc::new(MockLeadStore::new()), lexicon);

    let (sink, rx) = EventSink::channel();
    let outcome = ctl
        .run(RunRequest::new(INTENT, 5), sink, CancellationToken::new())
        .await;
    let events = drain(rx);

    assert_eq!(outcome, RunOutcome::Failed);
    assert_eq!(events.len(), 1);
    assert!(errors(&events)[0].contains("OPENAI_API_KEY"));
    assert_eq!(fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn empty_intent_is_rejected() {
    let llm = Arc::new(MockLanguageModel::new().respond(plan_json(&[QUERY])));
    let ctl = controller(llm.clone(), Arc::new(MockFetcher::new()), Arc::new(MockLeadStore::new()));

    let (sink, rx) = EventSink::channel();
    let outcome = ctl
        .run(RunRequest::new("   ", 5), sink, CancellationToken::new())
        .await;

    assert_eq!(outcome, RunOutcome::Failed);
    assert_eq!(errors(&drain(rx)).len(), 1);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn unavailable_store_is_an_error() {
    let llm = Arc::new(MockLanguageModel::new().respond(plan_json(&[QUERY])));
    let store = Arc::new(MockLeadStore::new().unavailable());
    let ctl = controller(llm.clone(), Arc::new(MockFetcher::new()), store);

    let (sink, rx) = EventSink::channel();
    let outcome = ctl
        .run(RunRequest::new(INTENT, 5), sink, CancellationToken::new())
        .await;

    assert_eq!(outcome, RunOutcome::Failed);
    assert!(errors(&drain(rx))[0].contains("Lead store unavailable"));
    assert_eq!(llm.calls(), 0);
}

// ---------------------------------------------------------------------------
// SQLite-backed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_run_against_same_database_finds_nothing_new() {
    let store = Arc::new(SqliteLeadStore::in_memory().await.unwrap());
    let page = yahoo_results_page(&mumbai_rows(3));

    let first = controller(
        Arc::new(MockLanguageModel::new().respond(plan_json(&[QUERY]))),
        Arc::new(MockFetcher::new().on_query(QUERY, 0, page.clone())),
        store.clone(),
    );
    let (sink, rx) = EventSink::channel();
    assert_eq!(
        first
            .run(RunRequest::new(INTENT, 3), sink, CancellationToken::new())
            .await,
        RunOutcome::Done
    );
    assert_eq!(extracted(&drain(rx)).len(), 3);

    let second = controller(
        Arc::new(MockLanguageModel::new().respond(plan_json(&[QUERY]))),
        Arc::new(MockFetcher::new().on_query(QUERY, 0, page)),
        store.clone(),
    );
    let (sink, rx) = EventSink::channel();
    let outcome = second
        .run(RunRequest::new(INTENT, 3), sink, CancellationToken::new())
        .await;

    assert_eq!(outcome, RunOutcome::Exhausted);
    assert!(extracted(&drain(rx)).is_empty());
    assert_eq!(store.count_leads().await.unwrap(), 3);
    assert!(store.total_cost().await.unwrap() > 0.0);
}
