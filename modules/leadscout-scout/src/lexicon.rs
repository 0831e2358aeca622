//! Keyword tables used for profile detection and candidate filtering.
//!
//! Tables are plain data (`LexiconTables`, loadable from JSON) compiled once
//! into whole-word, case-insensitive matchers (`Lexicon`).

use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// One industry: how an intent names it, and how a candidate shows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryEntry {
    pub name: String,
    /// Terms in the user's intent that select this industry.
    pub intent_keywords: Vec<String>,
    /// Terms in a candidate's text that place them in this industry.
    pub candidate_keywords: Vec<String>,
    /// Well-known employers, used both as keywords and as planner seeds.
    pub companies: Vec<String>,
}

/// Raw keyword tables. Missing fields in a JSON file fall back to the
/// built-in defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexiconTables {
    pub activation_terms: Vec<String>,
    pub brand_terms: Vec<String>,
    pub leadership_terms: Vec<String>,
    pub marketing_terms: Vec<String>,
    pub industries: Vec<IndustryEntry>,
    pub cities: Vec<String>,
    pub regions: Vec<String>,
    pub foreign_terms: Vec<String>,
    pub local_subdomains: Vec<String>,
    pub unrelated_terms: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn industry(name: &str, intent: &[&str], candidate: &[&str], companies: &[&str]) -> IndustryEntry {
    IndustryEntry {
        name: name.to_string(),
        intent_keywords: strings(intent),
        candidate_keywords: strings(candidate),
        companies: strings(companies),
    }
}

impl Default for LexiconTables {
    fn default() -> Self {
        Self {
            activation_terms: strings(&[
                "btl",
                "below the line",
                "below-the-line",
                "activation",
                "activations",
                "brand activation",
                "experiential",
                "experiential marketing",
                "on-ground",
                "on ground",
                "offline marketing",
                "trade marketing",
                "event marketing",
                "events",
                "field marketing",
                "retail marketing",
                "shopper marketing",
                "sampling",
                "visibility",
                "rural marketing",
                "promotions",
            ]),
            brand_terms: strings(&[
                "brand manager",
                "brand management",
                "brand marketing",
                "brand strategy",
                "branding",
                "category manager",
                "consumer marketing",
                "atl",
                "integrated marketing",
            ]),
            leadership_terms: strings(&[
                "head",
                "director",
                "vp",
                "vice president",
                "avp",
                "cmo",
                "chief marketing officer",
                "general manager",
                "founder",
                "co-founder",
                "ceo",
                "president",
                "partner",
            ]),
            marketing_terms: strings(&[
                "marketing",
                "brand",
                "btl",
                "activation",
                "trade marketing",
                "events",
                "promotions",
                "experiential",
                "growth",
                "business development",
            ]),
            industries: vec![
                industry(
                    "FMCG",
                    &["fmcg", "cpg", "consumer goods", "consumer packaged goods"],
                    &["fmcg", "cpg", "consumer goods", "foods", "beverages", "personal care"],
                    &[
                        "Hindustan Unilever",
                        "HUL",
                        "ITC",
                        "Nestle",
                        "Dabur",
                        "Marico",
                        "Godrej",
                        "Britannia",
                        "PepsiCo",
                        "Coca-Cola",
                        "Procter & Gamble",
                        "Colgate-Palmolive",
                    ],
                ),
                industry(
                    "Automobile",
                    &["automobile", "automotive", "auto", "two wheeler", "cars"],
                    &["automobile", "automotive", "auto", "motors", "two wheeler"],
                    &[
                        "Maruti Suzuki",
                        "Tata Motors",
                        "Mahindra",
                        "Hyundai",
                        "Hero MotoCorp",
                        "Bajaj Auto",
                        "TVS Motor",
                    ],
                ),
                industry(
                    "Telecom",
                    &["telecom", "telecommunications", "telco"],
                    &["telecom", "telecommunications", "mobile network"],
                    &["Jio", "Reliance Jio", "Airtel", "Bharti Airtel", "Vodafone Idea", "BSNL"],
                ),
                industry(
                    "Pharma",
                    &["pharma", "pharmaceutical", "healthcare"],
                    &["pharma", "pharmaceutical", "healthcare", "otc"],
                    &["Sun Pharma", "Cipla", "Dr. Reddy's", "Lupin", "Abbott", "Mankind Pharma"],
                ),
                industry(
                    "Retail",
                    &["retail", "consumer durables", "electronics retail"],
                    &["retail", "stores", "consumer durables"],
                    &["Reliance Retail", "DMart", "Trent", "Shoppers Stop", "Croma", "Lifestyle"],
                ),
                industry(
                    "BFSI",
                    &["bfsi", "banking", "insurance", "financial services"],
                    &["bank", "banking", "insurance", "financial services", "bfsi"],
                    &["HDFC Bank", "ICICI", "SBI", "Kotak", "Axis Bank", "Bajaj Finserv"],
                ),
            ],
            cities: strings(&[
                "mumbai",
                "delhi",
                "new delhi",
                "ncr",
                "gurgaon",
                "gurugram",
                "noida",
                "bangalore",
                "bengaluru",
                "hyderabad",
                "chennai",
                "pune",
                "kolkata",
                "ahmedabad",
                "jaipur",
                "lucknow",
                "chandigarh",
                "kochi",
                "indore",
                "thane",
                "navi mumbai",
            ]),
            regions: strings(&[
                "india",
                "maharashtra",
                "karnataka",
                "tamil nadu",
                "telangana",
                "gujarat",
                "west bengal",
                "uttar pradesh",
                "haryana",
                "kerala",
                "rajasthan",
            ]),
            foreign_terms: strings(&[
                "united states",
                "usa",
                "new york",
                "california",
                "texas",
                "london",
                "united kingdom",
                "uk",
                "canada",
                "toronto",
                "australia",
                "sydney",
                "singapore",
                "dubai",
                "uae",
                "germany",
                "france",
                "philippines",
                "pakistan",
                "bangladesh",
                "nigeria",
            ]),
            local_subdomains: strings(&["www", "in"]),
            unrelated_terms: strings(&[
                "digital marketing",
                "seo",
                "sem",
                "social media",
                "performance marketing",
                "content marketing",
                "growth hacking",
                "software engineer",
                "developer",
                "data scientist",
                "recruiter",
                "talent acquisition",
                "human resources",
                "student",
                "intern",
                "fresher",
                "teacher",
                "professor",
            ]),
        }
    }
}

// ---------------------------------------------------------------------------
// TermMatcher
// ---------------------------------------------------------------------------

/// Case-insensitive whole-word matcher over a list of terms. A plural
/// suffix is tolerated so `manager` also matches `managers`.
#[derive(Debug, Clone)]
pub struct TermMatcher {
    regex: Option<Regex>,
}

impl TermMatcher {
    pub fn new<S: AsRef<str>>(terms: &[S]) -> Result<Self> {
        let alternatives: Vec<String> = terms
            .iter()
            .map(|t| t.as_ref().trim())
            .filter(|t| !t.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Ok(Self { regex: None });
        }
        let pattern = format!(r"(?i)\b(?:{})(?:s|es)?\b", alternatives.join("|"));
        let regex = Regex::new(&pattern).context("compiling term matcher")?;
        Ok(Self { regex: Some(regex) })
    }

    /// First matching term, lowercased.
    pub fn find(&self, text: &str) -> Option<String> {
        self.regex
            .as_ref()?
            .find(text)
            .map(|m| m.as_str().to_lowercase())
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.as_ref().is_some_and(|r| r.is_match(text))
    }

    /// Every distinct matching term, lowercased, in order of appearance.
    pub fn find_all(&self, text: &str) -> Vec<String> {
        let Some(regex) = &self.regex else {
            return Vec::new();
        };
        let mut found: Vec<String> = Vec::new();
        for m in regex.find_iter(text) {
            let term = m.as_str().to_lowercase();
            if !found.contains(&term) {
                found.push(term);
            }
        }
        found
    }
}

// ---------------------------------------------------------------------------
// Lexicon
// ---------------------------------------------------------------------------

/// Compiled industry entry.
#[derive(Debug, Clone)]
pub struct Industry {
    pub name: String,
    pub companies: Vec<String>,
    intent: TermMatcher,
    candidate: TermMatcher,
}

impl Industry {
    pub fn named_in(&self, intent: &str) -> bool {
        self.intent.is_match(intent)
    }

    /// Industry keyword or known employer found in candidate text.
    pub fn signal_in(&self, text: &str) -> Option<String> {
        self.candidate.find(text)
    }
}

/// Compiled lexicon shared by the planner and the classifier.
#[derive(Debug, Clone)]
pub struct Lexicon {
    pub tables: LexiconTables,
    pub activation: TermMatcher,
    pub brand: TermMatcher,
    pub leadership: TermMatcher,
    pub marketing: TermMatcher,
    pub cities: TermMatcher,
    pub local: TermMatcher,
    pub foreign: TermMatcher,
    pub industries: Vec<Industry>,
}

impl Lexicon {
    pub fn from_tables(tables: LexiconTables) -> Result<Self> {
        let industries = tables
            .industries
            .iter()
            .map(|entry| {
                let mut candidate_terms = entry.candidate_keywords.clone();
                candidate_terms.extend(entry.companies.iter().cloned());
                Ok(Industry {
                    name: entry.name.clone(),
                    companies: entry.companies.clone(),
                    intent: TermMatcher::new(&entry.intent_keywords)?,
                    candidate: TermMatcher::new(&candidate_terms)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let local_terms: Vec<&String> = tables.cities.iter().chain(&tables.regions).collect();

        Ok(Self {
            activation: TermMatcher::new(&tables.activation_terms)?,
            brand: TermMatcher::new(&tables.brand_terms)?,
            leadership: TermMatcher::new(&tables.leadership_terms)?,
            marketing: TermMatcher::new(&tables.marketing_terms)?,
            cities: TermMatcher::new(&tables.cities)?,
            local: TermMatcher::new(&local_terms)?,
            foreign: TermMatcher::new(&tables.foreign_terms)?,
            industries,
            tables,
        })
    }

    pub fn builtin() -> Result<Self> {
        Self::from_tables(LexiconTables::default())
    }

    /// Load tables from a JSON file, or the built-in defaults when no path is
    /// configured.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::builtin();
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading lexicon file {}", path.display()))?;
        let tables: LexiconTables = serde_json::from_str(&raw)
            .with_context(|| format!("parsing lexicon file {}", path.display()))?;
        info!(path = %path.display(), industries = tables.industries.len(), "Lexicon loaded");
        Self::from_tables(tables)
    }

    /// Unrelated-role matcher minus any term the intent itself asks for.
    pub fn unrelated_for(&self, intent: &str) -> Result<TermMatcher> {
        let intent_lower = intent.to_lowercase();
        let terms: Vec<&String> = self
            .tables
            .unrelated_terms
            .iter()
            .filter(|term| {
                TermMatcher::new(&[term.as_str()])
                    .map(|m| !m.is_match(&intent_lower))
                    .unwrap_or(true)
            })
            .collect();
        TermMatcher::new(&terms)
    }

    pub fn is_local_subdomain(&self, sub: &str) -> bool {
        self.tables
            .local_subdomains
            .iter()
            .any(|s| s.eq_ignore_ascii_case(sub))
    }
}
