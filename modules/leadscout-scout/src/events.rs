//! Progress events streamed to the caller of a run.
//!
//! Serialized as `{"type": <kind>, "data": <payload>}`, one per SSE frame.

use leadscout_common::LeadItem;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RunEvent {
    Log(String),
    Stats(RunStats),
    CostUpdate(CostUpdate),
    ItemExtracted(LeadItem),
    Error(String),
    /// Every lead accepted during the run. Always the last event of a run
    /// that did not fail.
    Done(Vec<LeadItem>),
}

impl RunEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RunEvent::Log(_) => "log",
            RunEvent::Stats(_) => "stats",
            RunEvent::CostUpdate(_) => "cost_update",
            RunEvent::ItemExtracted(_) => "item_extracted",
            RunEvent::Error(_) => "error",
            RunEvent::Done(_) => "done",
        }
    }
}

/// Counters shown on the dashboard. `raw_leads_found` counts every candidate
/// scanned, so `kept + rejected <= raw_leads_found` holds at all times.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub raw_leads_found: u32,
    pub rejected: u32,
    pub kept: u32,
    pub current_query: String,
    pub total_queries: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostUpdate {
    pub session_cost: f64,
    pub last_call_cost: f64,
    pub all_time_cost: f64,
}

/// Sending half of a run's event stream. Delivery is best effort: once the
/// receiver is gone, events are dropped silently.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }

    pub fn log(&self, message: impl Into<String>) {
        self.emit(RunEvent::Log(message.into()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(RunEvent::Error(message.into()));
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
