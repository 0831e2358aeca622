//! Candidate classification.
//!
//! Pure decision functions: given a candidate and the run's filtering
//! context, decide whether it becomes a lead. Rules are checked in a fixed
//! order and the first hit names the rejection reason.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;

use leadscout_common::Candidate;

use crate::handle::{normalize_handle, profile_subdomain};
use crate::icp::{ProfileType, TargetProfile};
use crate::lexicon::{Lexicon, TermMatcher};
use crate::pipeline::exclusion::ExclusionSet;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Already persisted, excluded, or collected earlier in this run.
    Duplicate,
    /// Matched a negative term proposed by the planner.
    AntiPersona(String),
    /// Matched the fixed list of unrelated roles.
    UnrelatedRole(String),
    /// No relevance signal for the target profile or industry.
    Irrelevant,
    ForeignLocation(String),
    NonLocalSubdomain(String),
}

impl RejectReason {
    pub fn kind(&self) -> &'static str {
        match self {
            RejectReason::Duplicate => "duplicate",
            RejectReason::AntiPersona(_) => "anti_persona",
            RejectReason::UnrelatedRole(_) => "unrelated_role",
            RejectReason::Irrelevant => "irrelevant",
            RejectReason::ForeignLocation(_) => "foreign_location",
            RejectReason::NonLocalSubdomain(_) => "non_local_subdomain",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Duplicate => write!(f, "duplicate"),
            RejectReason::AntiPersona(term) => write!(f, "anti_persona:{term}"),
            RejectReason::UnrelatedRole(term) => write!(f, "unrelated_role:{term}"),
            RejectReason::Irrelevant => write!(f, "irrelevant"),
            RejectReason::ForeignLocation(term) => write!(f, "foreign_location:{term}"),
            RejectReason::NonLocalSubdomain(sub) => write!(f, "non_local_subdomain:{sub}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Kept,
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_kept(&self) -> bool {
        matches!(self, Verdict::Kept)
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Filtering rules for one run: target profile, lexicon, and the negative
/// terms the planner has proposed so far.
pub struct CandidateClassifier {
    lexicon: Arc<Lexicon>,
    profile: TargetProfile,
    unrelated: TermMatcher,
    negative_terms: Vec<String>,
    negative: TermMatcher,
}

impl CandidateClassifier {
    pub fn new(lexicon: Arc<Lexicon>, profile: TargetProfile, intent: &str) -> Result<Self> {
        let unrelated = lexicon.unrelated_for(intent)?;
        Ok(Self {
            lexicon,
            profile,
            unrelated,
            negative_terms: Vec::new(),
            negative: TermMatcher::new::<&str>(&[])?,
        })
    }

    /// Add planner-proposed negative terms. Returns how many were new.
    pub fn add_negative_terms(&mut self, terms: &[String]) -> Result<usize> {
        let before = self.negative_terms.len();
        for term in terms {
            let term = term.trim().to_lowercase();
            if !term.is_empty() && !self.negative_terms.contains(&term) {
                self.negative_terms.push(term);
            }
        }
        let added = self.negative_terms.len() - before;
        if added > 0 {
            self.negative = TermMatcher::new(&self.negative_terms)?;
        }
        Ok(added)
    }

    pub fn negative_terms(&self) -> &[String] {
        &self.negative_terms
    }

    pub fn profile(&self) -> &TargetProfile {
        &self.profile
    }

    /// Decide on one candidate. `collected` holds canonical keys accepted
    /// earlier in this run.
    pub fn classify(
        &self,
        candidate: &Candidate,
        exclusions: &ExclusionSet,
        collected: &HashSet<String>,
    ) -> Verdict {
        let key = normalize_handle(&candidate.url);
        if exclusions.contains(&candidate.url) || collected.contains(&key) {
            return Verdict::Rejected(RejectReason::Duplicate);
        }

        let haystack = candidate.haystack();
        let role_text = format!("{} {}", candidate.title, candidate.bio);

        if let Some(term) = self.negative.find(&haystack) {
            return Verdict::Rejected(RejectReason::AntiPersona(term));
        }

        if let Some(term) = self.unrelated.find(&role_text) {
            return Verdict::Rejected(RejectReason::UnrelatedRole(term));
        }

        if !self.is_relevant(&haystack) {
            return Verdict::Rejected(RejectReason::Irrelevant);
        }

        let local = self.lexicon.local.is_match(&haystack);
        if !local {
            if let Some(term) = self.lexicon.foreign.find(&haystack) {
                return Verdict::Rejected(RejectReason::ForeignLocation(term));
            }
            if let Some(sub) = profile_subdomain(&candidate.url) {
                if !self.lexicon.is_local_subdomain(&sub) {
                    return Verdict::Rejected(RejectReason::NonLocalSubdomain(sub));
                }
            }
        }

        Verdict::Kept
    }

    fn is_relevant(&self, haystack: &str) -> bool {
        if relevance_signal(&self.lexicon, self.profile.profile_type, haystack).is_none() {
            return false;
        }
        match self.profile.industry_entry(&self.lexicon) {
            Some(industry) => industry.signal_in(haystack).is_some(),
            None => true,
        }
    }

    /// Best-effort location for a kept lead.
    pub fn infer_location(&self, candidate: &Candidate) -> String {
        infer_location(&self.lexicon, candidate)
    }
}

/// The term that makes a candidate relevant to the profile type, if any.
pub fn relevance_signal(lexicon: &Lexicon, profile_type: ProfileType, text: &str) -> Option<String> {
    match profile_type {
        ProfileType::Activation => lexicon.activation.find(text),
        ProfileType::Brand => lexicon
            .brand
            .find(text)
            .or_else(|| lexicon.marketing.find(text)),
        ProfileType::Leadership => {
            let seniority = lexicon.leadership.find(text)?;
            lexicon.marketing.is_match(text).then_some(seniority)
        }
        ProfileType::General => lexicon
            .marketing
            .find(text)
            .or_else(|| lexicon.activation.find(text))
            .or_else(|| lexicon.brand.find(text)),
    }
}

/// Location from the snippet's leading segment when it names a place,
/// else the first known city, else `"Unknown"`.
pub fn infer_location(lexicon: &Lexicon, candidate: &Candidate) -> String {
    let lead_segment = candidate
        .bio
        .split(['·', '|'])
        .next()
        .map(|s| s.trim().trim_end_matches('.').trim())
        .unwrap_or_default();
    if !lead_segment.is_empty()
        && lead_segment.len() <= 60
        && (lexicon.local.is_match(lead_segment) || lexicon.foreign.is_match(lead_segment))
    {
        return lead_segment.to_string();
    }

    let haystack = candidate.haystack();
    match lexicon.cities.find(&haystack) {
        Some(city) => title_case(&city),
        None => "Unknown".to_string(),
    }
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
