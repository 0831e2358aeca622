use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Active run per session. Starting a run cancels whatever that session was
/// already running.
#[derive(Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<String, (u64, CancellationToken)>>,
    next_id: AtomicU64,
}

/// Handle for one registered run.
#[derive(Debug, Clone)]
pub struct RunTicket {
    pub session: String,
    pub id: u64,
    pub cancel: CancellationToken,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, session: &str) -> RunTicket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let previous = self
            .lock()
            .insert(session.to_string(), (id, cancel.clone()));
        if let Some((old_id, old)) = previous {
            info!(session, old_run = old_id, "Cancelling previous run for session");
            old.cancel();
        }
        RunTicket {
            session: session.to_string(),
            id,
            cancel,
        }
    }

    /// Cancel the session's active run. Returns false when nothing was running.
    pub fn stop(&self, session: &str) -> bool {
        match self.lock().remove(session) {
            Some((_, cancel)) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Forget a finished run, unless a newer run has replaced it.
    pub fn finish(&self, ticket: &RunTicket) {
        let mut runs = self.lock();
        if runs.get(&ticket.session).is_some_and(|(id, _)| *id == ticket.id) {
            runs.remove(&ticket.session);
        }
    }

    pub fn active(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (u64, CancellationToken)>> {
        // Every critical section is a single insert or remove.
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }
}
