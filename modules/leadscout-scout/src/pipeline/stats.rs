use std::collections::BTreeMap;

use crate::events::RunStats;
use crate::pipeline::classifier::RejectReason;

/// Running tally for one run.
#[derive(Debug, Default)]
pub struct RunTally {
    pub rounds: u32,
    pub queries_issued: u32,
    pub queries_failed: u32,
    pub pages_read: u32,
    pub candidates_scanned: u32,
    pub kept: u32,
    pub rejected: u32,
    pub fallback_plans: u32,
    pub forced_evictions: u32,
    /// Rejections by reason kind (`duplicate`, `anti_persona`, ...).
    pub rejected_by: BTreeMap<&'static str, u32>,
}

impl RunTally {
    pub fn reject(&mut self, reason: &RejectReason) {
        self.rejected += 1;
        *self.rejected_by.entry(reason.kind()).or_default() += 1;
    }

    pub fn snapshot(&self, current_query: &str) -> RunStats {
        RunStats {
            raw_leads_found: self.candidates_scanned,
            rejected: self.rejected,
            kept: self.kept,
            current_query: current_query.to_string(),
            total_queries: self.queries_issued,
        }
    }
}

impl std::fmt::Display for RunTally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Lead Run Complete ===")?;
        writeln!(f, "Rounds:             {}", self.rounds)?;
        writeln!(f, "Queries issued:     {}", self.queries_issued)?;
        writeln!(f, "Queries failed:     {}", self.queries_failed)?;
        writeln!(f, "Pages read:         {}", self.pages_read)?;
        writeln!(f, "Candidates scanned: {}", self.candidates_scanned)?;
        writeln!(f, "Kept:               {}", self.kept)?;
        writeln!(f, "Rejected:           {}", self.rejected)?;
        if !self.rejected_by.is_empty() {
            writeln!(f, "\nRejected by reason:")?;
            for (reason, count) in &self.rejected_by {
                writeln!(f, "  {reason:<20} {count}")?;
            }
        }
        if self.fallback_plans > 0 || self.forced_evictions > 0 {
            writeln!(f, "\nPlanner fallbacks:  {}", self.fallback_plans)?;
            writeln!(f, "Forced evictions:   {}", self.forced_evictions)?;
        }
        Ok(())
    }
}
