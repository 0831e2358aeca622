//! Set of canonical handles that must not be accepted again.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};

use crate::handle::{extract_profile_handles, normalize_handle};

/// Membership is always tested on the canonical handle, so any URL variant
/// of an excluded profile is excluded. The set only grows during a run.
#[derive(Debug, Default, Clone)]
pub struct ExclusionSet {
    keys: HashSet<String>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.keys.contains(&normalize_handle(url))
    }

    /// Returns true if the handle was not already present.
    pub fn add(&mut self, url: &str) -> bool {
        let key = normalize_handle(url);
        !key.is_empty() && self.keys.insert(key)
    }

    /// Add many entries. Returns how many were new.
    pub fn seed<I, S>(&mut self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        urls.into_iter().filter(|u| self.add(u.as_ref())).count()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Read an external history file (CSV or any text) and return every profile
/// handle it mentions.
pub fn load_snapshot(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading exclusion file {}", path.display()))?;
    Ok(extract_profile_handles(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_of_an_added_url_are_excluded() {
        let mut set = ExclusionSet::new();
        assert!(set.add("https://www.linkedin.com/in/rahul-sharma/"));
        assert!(set.contains("http://in.linkedin.com/in/Rahul-Sharma?trk=x"));
        assert!(!set.contains("https://in.linkedin.com/in/priya-menon"));
    }

    #[test]
    fn seeding_counts_new_entries_only() {
        let mut set = ExclusionSet::new();
        let added = set.seed(["rahul-sharma", "https://linkedin.com/in/rahul-sharma", "priya"]);
        assert_eq!(added, 2);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn empty_entries_are_ignored() {
        let mut set = ExclusionSet::new();
        assert!(!set.add("   "));
        assert!(set.is_empty());
    }

    #[test]
    fn snapshot_extracts_profile_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        std::fs::write(
            &path,
            "Name,Profile\nAmit,https://in.linkedin.com/in/amit-patel\nSneha,linkedin.com/in/sneha-reddy/\n",
        )
        .unwrap();
        let handles = load_snapshot(&path).unwrap();
        assert_eq!(handles, vec!["amit-patel", "sneha-reddy"]);
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        assert!(load_snapshot(Path::new("/definitely/not/here.csv")).is_err());
    }
}
