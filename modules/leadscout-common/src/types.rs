use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// One parsed search result row, before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,
    pub name: String,
    pub title: String,
    pub company: String,
    /// Result snippet text.
    pub bio: String,
    /// Email addresses found anywhere in the row.
    #[serde(default)]
    pub emails: Vec<String>,
    /// The search query that surfaced this row.
    #[serde(default)]
    pub query: String,
}

impl Candidate {
    /// Every free-text field joined, for keyword matching.
    pub fn haystack(&self) -> String {
        format!("{} {} {} {}", self.name, self.title, self.company, self.bio)
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// An accepted profile. `url` holds the canonical handle and is unique in storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub url: String,
    pub profile_url: String,
    pub name: String,
    pub job_title: String,
    pub company: String,
    pub location: String,
    pub emails: BTreeSet<String>,
    pub bio: String,
}

impl Lead {
    pub fn from_candidate(canonical_key: String, candidate: &Candidate, location: String) -> Self {
        Self {
            url: canonical_key,
            profile_url: candidate.url.clone(),
            name: candidate.name.clone(),
            job_title: candidate.title.clone(),
            company: candidate.company.clone(),
            location,
            emails: candidate.emails.iter().map(|e| e.to_lowercase()).collect(),
            bio: candidate.bio.clone(),
        }
    }

    /// Dashboard shape: `{ url, data: [ { name, jobTitle, ... } ] }`.
    pub fn to_item(&self) -> LeadItem {
        LeadItem {
            url: self.profile_url.clone(),
            data: vec![LeadData {
                name: self.name.clone(),
                job_title: self.job_title.clone(),
                company: self.company.clone(),
                location: self.location.clone(),
                emails: self.emails.iter().cloned().collect(),
                raw_bio: self.bio.clone(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadItem {
    pub url: String,
    pub data: Vec<LeadData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadData {
    pub name: String,
    pub job_title: String,
    pub company: String,
    pub location: String,
    pub emails: Vec<String>,
    pub raw_bio: String,
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: i64,
    pub query_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub session_id: Uuid,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditVerdict {
    Kept,
    Rejected,
}

impl AuditVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditVerdict::Kept => "kept",
            AuditVerdict::Rejected => "rejected",
        }
    }
}

/// One classification decision, kept or rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub session_id: Uuid,
    pub url: String,
    pub canonical_key: String,
    pub verdict: AuditVerdict,
    pub reason: String,
    pub query: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> Candidate {
        Candidate {
            url: "https://in.linkedin.com/in/rahul-sharma".into(),
            name: "Rahul Sharma".into(),
            title: "BTL Marketing Manager".into(),
            company: "Hindustan Unilever".into(),
            bio: "Mumbai, Maharashtra, India".into(),
            emails: vec!["Rahul@Example.com".into(), "rahul@example.com".into()],
            query: "btl manager mumbai".into(),
        }
    }

    #[test]
    fn lead_lowercases_and_dedups_emails() {
        let lead = Lead::from_candidate("rahul-sharma".into(), &candidate(), "Mumbai".into());
        assert_eq!(lead.emails.len(), 1);
        assert!(lead.emails.contains("rahul@example.com"));
    }

    #[test]
    fn lead_item_uses_dashboard_field_names() {
        let lead = Lead::from_candidate("rahul-sharma".into(), &candidate(), "Mumbai".into());
        let json = serde_json::to_value(lead.to_item()).unwrap();
        assert_eq!(json["url"], "https://in.linkedin.com/in/rahul-sharma");
        assert_eq!(json["data"][0]["jobTitle"], "BTL Marketing Manager");
        assert_eq!(json["data"][0]["rawBio"], "Mumbai, Maharashtra, India");
    }

    #[test]
    fn haystack_contains_every_field() {
        let hay = candidate().haystack();
        assert!(hay.contains("Rahul Sharma"));
        assert!(hay.contains("Hindustan Unilever"));
        assert!(hay.contains("Maharashtra"));
    }
}
