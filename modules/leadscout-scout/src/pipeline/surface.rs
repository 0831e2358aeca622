//! Search results pages the executor can drive, and how to read them.
//!
//! Each surface knows how to build a page URL for a query and how to turn
//! the rendered HTML into profile candidates. Redirect wrappers are
//! unwrapped, non-profile results dropped, and profiles deduplicated within
//! the page by canonical handle.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use leadscout_common::{Candidate, SearchSurfaceKind};

use crate::handle::{is_profile_url, normalize_handle};

/// X-ray scope prepended to every query that does not carry its own `site:`.
pub const SITE_SCOPE: &str = "site:linkedin.com/in/ OR site:linkedin.com/pub/";

const YAHOO_PAGE_SIZE: u32 = 10;
const DDG_PAGE_SIZE: u32 = 30;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("valid email regex")
});

static YAHOO_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.compTitle").expect("static selector"));
static YAHOO_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector"));
static YAHOO_SNIPPET: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".compText").expect("static selector"));
static DDG_RESULT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.result").expect("static selector"));
static DDG_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.result__a[href]").expect("static selector"));
static DDG_SNIPPET: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a.result__snippet, div.result__snippet").expect("static selector")
});

/// One result row as it appears on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Everything read from one results page.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// Result rows of any kind. Zero means the query has no more results.
    pub raw_count: usize,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchSurface {
    kind: SearchSurfaceKind,
}

impl SearchSurface {
    pub fn new(kind: SearchSurfaceKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> SearchSurfaceKind {
        self.kind
    }

    /// URL of results page `page` (0-based) for `query`, site scope applied.
    pub fn page_url(&self, query: &str, page: u32) -> String {
        let scoped = scope_query(query);
        let mut params = url::form_urlencoded::Serializer::new(String::new());
        match self.kind {
            SearchSurfaceKind::Yahoo => {
                params
                    .append_pair("p", &scoped)
                    .append_pair("n", &YAHOO_PAGE_SIZE.to_string());
                if page > 0 {
                    params.append_pair("b", &(page * YAHOO_PAGE_SIZE + 1).to_string());
                }
                format!("https://search.yahoo.com/search?{}", params.finish())
            }
            SearchSurfaceKind::DuckDuckGo => {
                params.append_pair("q", &scoped);
                if page > 0 {
                    params.append_pair("s", &(page * DDG_PAGE_SIZE).to_string());
                }
                format!("https://html.duckduckgo.com/html/?{}", params.finish())
            }
        }
    }

    pub fn parse_results(&self, html: &str) -> Vec<RawResult> {
        let document = Html::parse_document(html);
        match self.kind {
            SearchSurfaceKind::Yahoo => parse_yahoo(&document),
            SearchSurfaceKind::DuckDuckGo => parse_ddg(&document),
        }
    }

    /// Parse a page into profile candidates for `query`.
    pub fn parse_page(&self, html: &str, query: &str) -> ParsedPage {
        let raw = self.parse_results(html);
        let mut seen = HashSet::new();
        let candidates = raw
            .iter()
            .filter(|r| is_profile_url(&r.url))
            .filter(|r| seen.insert(normalize_handle(&r.url)))
            .map(|r| to_candidate(r, query))
            .collect();
        ParsedPage {
            raw_count: raw.len(),
            candidates,
        }
    }
}

pub fn scope_query(query: &str) -> String {
    let query = query.trim();
    if query.to_lowercase().contains("site:") {
        query.to_string()
    } else {
        format!("{SITE_SCOPE} {query}")
    }
}

fn parse_yahoo(document: &Html) -> Vec<RawResult> {
    let mut out = Vec::new();
    for title_block in document.select(&YAHOO_TITLE) {
        let Some(anchor) = title_block.select(&YAHOO_ANCHOR).next() else {
            continue;
        };
        let Some(url) = anchor.value().attr("href").and_then(unwrap_redirect) else {
            continue;
        };
        let title = anchor
            .value()
            .attr("aria-label")
            .map(compact_ws)
            .unwrap_or_else(|| title_text(anchor));

        // The snippet is a sibling of the title block inside the result.
        let container = title_block
            .parent()
            .and_then(ElementRef::wrap)
            .unwrap_or(title_block);
        let snippet = container
            .select(&YAHOO_SNIPPET)
            .next()
            .map(|s| compact_ws(&s.text().collect::<Vec<_>>().join(" ")))
            .unwrap_or_default();

        out.push(RawResult { url, title, snippet });
    }
    out
}

fn parse_ddg(document: &Html) -> Vec<RawResult> {
    let mut out = Vec::new();
    for container in document.select(&DDG_RESULT) {
        let Some(anchor) = container.select(&DDG_ANCHOR).next() else {
            continue;
        };
        let Some(url) = anchor.value().attr("href").and_then(unwrap_redirect) else {
            continue;
        };
        let title = title_text(anchor);
        let snippet = container
            .select(&DDG_SNIPPET)
            .next()
            .map(|s| compact_ws(&s.text().collect::<Vec<_>>().join(" ")))
            .unwrap_or_default();
        out.push(RawResult { url, title, snippet });
    }
    out
}

/// Anchor text without the `host › in › handle` breadcrumb some engines
/// render inside the link.
fn title_text(anchor: ElementRef<'_>) -> String {
    let parts: Vec<&str> = anchor
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty() && !t.contains('›'))
        .collect();
    compact_ws(&parts.join(" "))
}

fn compact_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolve a result href to the target URL, unwrapping Yahoo (`/RU=`) and
/// DuckDuckGo (`uddg=`) redirects. Returns `None` for non-http links.
pub fn unwrap_redirect(href: &str) -> Option<String> {
    let href = href.trim();
    let absolute = if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&absolute).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();

    if host.ends_with("duckduckgo.com") {
        return parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned());
    }

    if host.contains("search.yahoo.com") {
        let segment = parsed.path().split('/').find_map(|s| s.strip_prefix("RU="))?;
        return Some(percent_decode(segment));
    }

    Some(absolute)
}

fn percent_decode(segment: &str) -> String {
    let encoded = segment.replace('+', "%2B");
    url::form_urlencoded::parse(format!("v={encoded}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| segment.to_string())
}

/// Split `"Name - Title - Company | LinkedIn"` into its parts.
pub fn split_title(title: &str) -> (String, String, String) {
    let head = title.split('|').next().unwrap_or_default().replace(" – ", " - ");
    let mut parts = head.split(" - ").map(str::trim).filter(|p| !p.is_empty());
    let name = parts.next().unwrap_or_default().to_string();
    let role = parts.next().unwrap_or_default().to_string();
    let company = parts.collect::<Vec<_>>().join(" - ");
    (name, role, company)
}

pub fn extract_emails(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for m in EMAIL_RE.find_iter(text) {
        let email = m.as_str().trim_end_matches('.').to_lowercase();
        if !found.contains(&email) {
            found.push(email);
        }
    }
    found
}

fn to_candidate(raw: &RawResult, query: &str) -> Candidate {
    let (name, title, company) = split_title(&raw.title);
    Candidate {
        url: raw.url.clone(),
        name,
        title,
        company,
        bio: raw.snippet.clone(),
        emails: extract_emails(&format!("{} {}", raw.title, raw.snippet)),
        query: query.to_string(),
    }
}
