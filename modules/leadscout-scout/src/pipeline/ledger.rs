//! Bounded record of queries already issued in a run.

use std::collections::{HashSet, VecDeque};

/// Consecutive planning rounds with no novel query before the ledger frees
/// half its window.
pub const STARVATION_ROUNDS: u32 = 3;

/// Comparison form of a query: lowercased, whitespace collapsed.
pub fn query_key(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// FIFO set of the last `window` distinct queries.
#[derive(Debug)]
pub struct QueryLedger {
    window: usize,
    /// Oldest at the front. Holds `(key, original text)`.
    entries: VecDeque<(String, String)>,
    keys: HashSet<String>,
    empty_rounds: u32,
}

impl QueryLedger {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            entries: VecDeque::new(),
            keys: HashSet::new(),
            empty_rounds: 0,
        }
    }

    pub fn contains(&self, query: &str) -> bool {
        self.keys.contains(&query_key(query))
    }

    /// Record a query. Returns false (and changes nothing) if it is already
    /// present. Evicts the oldest entry when the window overflows.
    pub fn add(&mut self, query: &str) -> bool {
        let key = query_key(query);
        if key.is_empty() || !self.keys.insert(key.clone()) {
            return false;
        }
        self.entries.push_back((key, query.trim().to_string()));
        while self.entries.len() > self.window {
            if let Some((old, _)) = self.entries.pop_front() {
                self.keys.remove(&old);
            }
        }
        true
    }

    /// Up to `n` most recent queries, newest first.
    pub fn recent(&self, n: usize) -> Vec<String> {
        self.entries
            .iter()
            .rev()
            .take(n)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Drop the oldest half of the window. Returns how many were dropped.
    pub fn evict_oldest_half(&mut self) -> usize {
        let drop = self.entries.len().div_ceil(2);
        for (old, _) in self.entries.drain(..drop) {
            self.keys.remove(&old);
        }
        drop
    }

    /// Note the outcome of a planning round. After `STARVATION_ROUNDS`
    /// consecutive rounds without a novel query the oldest half is evicted
    /// and true is returned.
    pub fn record_round(&mut self, novel: usize) -> bool {
        if novel > 0 {
            self.empty_rounds = 0;
            return false;
        }
        self.empty_rounds += 1;
        if self.empty_rounds >= STARVATION_ROUNDS {
            self.empty_rounds = 0;
            self.evict_oldest_half();
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn window(&self) -> usize {
        self.window
    }
}
