//! Maps log archive folder names to the job names reported by the jobs API.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::Job;

/// Lowercase `name` and collapse every run of non-alphanumeric characters
/// into a single `_`, trimming separators from both ends.
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            out.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    if out.ends_with('_') {
        out.pop();
    }
    out
}

/// Normalized key for an archive entry such as `2_Units (devel).txt` or
/// `Units (devel)/3_Run tests.txt`.
///
/// Archives number their top-level entries, so a leading ordinal is dropped.
pub fn folder_key(entry_name: &str) -> String {
    static ORDINAL: OnceLock<Regex> = OnceLock::new();
    let folder = entry_name.split('/').next().unwrap_or_default();
    let folder = folder.strip_suffix(".txt").unwrap_or(folder);
    let key = normalize(folder);
    let ordinal = ORDINAL.get_or_init(|| Regex::new(r"^\d+_").unwrap());
    ordinal.replace(&key, "").into_owned()
}

/// Failed jobs of a run, keyed by normalized name, in job list order.
#[derive(Debug, Clone, Default)]
pub struct JobTable {
    entries: Vec<(String, String)>,
}

impl JobTable {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut entries: Vec<(String, String)> = Vec::new();
        for job in jobs.into_iter().filter(|j| j.failed()) {
            let key = job.key();
            if entries.iter().any(|(k, _)| *k == key) {
                tracing::warn!("Duplicate job key {} ({})", key, job.name);
                continue;
            }
            entries.push((key, job.name.clone()));
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn len(&self) -> usize { self.entries.len() }

    /// The first entry whose key contains `key` or is contained by it.
    pub fn resolve(&self, key: &str) -> Option<&str> {
        if key.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|(k, _)| k.contains(key) || key.contains(k.as_str()))
            .map(|(_, name)| name.as_str())
    }

    pub fn resolve_entry(&self, entry_name: &str) -> Option<&str> {
        self.resolve(&folder_key(entry_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobConclusion;

    #[test]
    fn test_normalize() {
        let cases: &[(&str, &str)] = &[
            ("Units (devel)", "units_devel"),
            ("units__devel__000", "units_devel_000"),
            ("Sanity (stable-2.17)", "sanity_stable_2_17"),
            ("  --Lint--  ", "lint"),
            ("", ""),
            ("***", ""),
        ];
        for &(name, expected) in cases {
            assert_eq!(normalize(name), expected, "normalize({name:?})");
        }
    }

    #[test]
    fn test_folder_key() {
        let cases: &[(&str, &str)] = &[
            ("0_units_devel_.txt", "units_devel"),
            ("1_Units (devel).txt", "units_devel"),
            ("Units (devel)/3_Run tests.txt", "units_devel"),
            ("12_build.txt", "build"),
            ("units (devel).txt", "units_devel"),
        ];
        for &(entry, expected) in cases {
            assert_eq!(folder_key(entry), expected, "folder_key({entry:?})");
        }
    }

    #[test]
    fn test_containment_matches_padded_folder() {
        let jobs = [Job::new("Units (devel)", JobConclusion::Failure)];
        let table = JobTable::from_jobs(&jobs);
        assert_eq!(table.resolve(&normalize("units__devel__000")), Some("Units (devel)"));
        assert_eq!(table.resolve("units"), Some("Units (devel)"));
        assert_eq!(table.resolve("sanity"), None);
        assert_eq!(table.resolve(""), None);
    }

    #[test]
    fn test_only_failed_jobs_are_tabled() {
        let jobs = [
            Job::new("Lint", JobConclusion::Success),
            Job::new("Units", JobConclusion::Failure),
            Job::new("Docs", JobConclusion::Other),
        ];
        let table = JobTable::from_jobs(&jobs);
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve("lint"), None);
        assert_eq!(table.resolve_entry("2_Units.txt"), Some("Units"));
    }

    #[test]
    fn test_first_entry_wins() {
        let jobs = [
            Job::new("Units (devel)", JobConclusion::Failure),
            Job::new("Units (devel, py3.12)", JobConclusion::Failure),
        ];
        let table = JobTable::from_jobs(&jobs);
        // Both keys contain "units_devel"; table order decides.
        assert_eq!(table.resolve("units_devel"), Some("Units (devel)"));
        assert_eq!(table.resolve("units_devel_py3_12"), Some("Units (devel)"));
    }
}
