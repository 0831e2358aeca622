//! Canonical profile handles.
//!
//! A handle is the dedup key for a profile: the identifier segment that
//! follows `/in/` or `/pub/` in a profile URL, lowercased. Everything that
//! varies between links to the same person (protocol, country subdomain,
//! locale suffix, query string, trailing slash or punctuation) is dropped.

use std::sync::LazyLock;

use regex::Regex;

const MARKERS: &[&str] = &["/in/", "/pub/", " › in › ", " › pub › "];

/// Characters that end a handle token.
const TOKEN_DELIMITERS: &[char] = &['/', '?', '#', ',', '"', '\'', ')', '(', '<', '>', '|', '›'];

/// Punctuation that trails a URL pasted into prose.
const TRAILING_PUNCTUATION: &[char] = &['/', '.', ',', ';', ':', '!', ')', '"', '\'', '>'];

const SCHEME_PREFIXES: &[&str] = &["https://", "http://", "www."];

static PROFILE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:https?://)?(?:[a-z]{0,3}\.)?linkedin\.com/(?:in|pub)/[^\s",?/]+"#)
        .expect("valid profile url regex")
});

/// Canonicalize a profile URL or pasted fragment into its dedup key.
///
/// Idempotent: `normalize_handle(&normalize_handle(x)) == normalize_handle(x)`.
pub fn normalize_handle(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let cleaned = clean(&lowered);

    match profile_token(cleaned) {
        Some(token) => strip_scheme(&token).to_string(),
        None => strip_scheme(cleaned).trim_start().to_string(),
    }
}

/// Drop query string, fragment, surrounding whitespace and trailing
/// slashes/punctuation.
fn clean(s: &str) -> &str {
    let cut = s.find(['?', '#']).unwrap_or(s.len());
    s[..cut]
        .trim_start()
        .trim_end_matches(|c: char| c.is_whitespace() || TRAILING_PUNCTUATION.contains(&c))
}

fn profile_token(cleaned: &str) -> Option<String> {
    MARKERS.iter().find_map(|marker| {
        let start = cleaned.find(marker)? + marker.len();
        let rest = &cleaned[start..];
        let end = rest
            .find(|c: char| c.is_whitespace() || TOKEN_DELIMITERS.contains(&c))
            .unwrap_or(rest.len());
        let token = rest[..end].trim_end_matches(TRAILING_PUNCTUATION);
        (!token.is_empty()).then(|| token.to_string())
    })
}

fn strip_scheme(s: &str) -> &str {
    let mut rest = s;
    loop {
        let next = SCHEME_PREFIXES.iter().find_map(|p| rest.strip_prefix(*p));
        match next {
            Some(stripped) => rest = stripped,
            None => return rest,
        }
    }
}

/// Find every profile reference in free text and return their handles,
/// in order of appearance, without duplicates.
pub fn extract_profile_handles(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    PROFILE_URL_RE
        .find_iter(text)
        .map(|m| normalize_handle(m.as_str()))
        .filter(|key| !key.is_empty() && seen.insert(key.clone()))
        .collect()
}

/// Whether a URL points at an individual profile page.
pub fn is_profile_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("linkedin.com/in/") || lower.contains("linkedin.com/pub/")
}

/// Country subdomain of a profile host: `ca` for `ca.linkedin.com`,
/// `None` for the bare domain.
pub fn profile_subdomain(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let sub = host.strip_suffix("linkedin.com")?.trim_end_matches('.');
    (!sub.is_empty()).then(|| sub.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_share_one_handle() {
        let variants = [
            "https://www.linkedin.com/in/John-Doe",
            "http://linkedin.com/in/john-doe/",
            "https://in.linkedin.com/in/john-doe?trk=public_profile",
            "https://ca.linkedin.com/in/john-doe/en",
            "linkedin.com/in/john-doe.",
            "  https://www.linkedin.com/in/john-doe#experience ",
            "in.linkedin.com › in › john-doe",
        ];
        for v in variants {
            assert_eq!(normalize_handle(v), "john-doe", "variant {v}");
        }
    }

    #[test]
    fn pub_urls_keep_only_the_name_segment() {
        assert_eq!(
            normalize_handle("https://www.linkedin.com/pub/priya-menon/12/345/678"),
            "priya-menon"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "https://www.linkedin.com/in/amit-patel-0a1b2c/",
            "https://https://example.com/about?x=1",
            "HTTP://WWW.Example.com/Team/",
            "linkedin.com/in/",
            "amit-patel",
            "",
            "   ",
            "in.linkedin.com › in › sneha-reddy › details",
        ];
        for input in inputs {
            let once = normalize_handle(input);
            assert_eq!(normalize_handle(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn falls_back_to_cleaned_url() {
        assert_eq!(
            normalize_handle("https://www.example.com/team/?ref=nav"),
            "example.com/team"
        );
    }

    #[test]
    fn extracts_handles_from_csv_text() {
        let csv = "name,url\n\
            \"Rahul Sharma\",https://in.linkedin.com/in/rahul-sharma\n\
            \"Rahul again\",linkedin.com/in/rahul-sharma/\n\
            \"Priya\",\"https://www.linkedin.com/pub/priya-menon/1/2/3\"\n";
        assert_eq!(extract_profile_handles(csv), vec!["rahul-sharma", "priya-menon"]);
    }

    #[test]
    fn subdomain_detection() {
        assert_eq!(
            profile_subdomain("https://ca.linkedin.com/in/john-doe").as_deref(),
            Some("ca")
        );
        assert_eq!(
            profile_subdomain("https://www.linkedin.com/in/john-doe").as_deref(),
            Some("www")
        );
        assert_eq!(profile_subdomain("https://linkedin.com/in/john-doe"), None);
        assert_eq!(profile_subdomain("not a url"), None);
    }

    #[test]
    fn profile_url_detection() {
        assert!(is_profile_url("https://IN.linkedin.com/in/x"));
        assert!(is_profile_url("https://www.linkedin.com/pub/x/1/2/3"));
        assert!(!is_profile_url("https://www.linkedin.com/company/acme"));
    }
}
