use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::resolve::normalize;

/// Substring identifying a status comment posted by the bot.
pub const STATUS_MARKER: &str = "CI Test Failures Detected";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
}

impl RunStatus {
    /// GitHub reports `queued`, `in_progress`, `waiting`, etc. for unfinished runs.
    pub fn from_api(status: &str) -> Self {
        if status == "completed" { Self::Completed } else { Self::Running }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobConclusion {
    Success,
    Failure,
    Other,
}

impl JobConclusion {
    pub fn from_api(conclusion: Option<&str>) -> Self {
        match conclusion {
            Some("success") => Self::Success,
            Some("failure") => Self::Failure,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub conclusion: JobConclusion,
}

impl Job {
    pub fn new(name: impl Into<String>, conclusion: JobConclusion) -> Self {
        Self { name: name.into(), conclusion }
    }

    pub fn key(&self) -> String { normalize(&self.name) }

    pub fn failed(&self) -> bool { self.conclusion == JobConclusion::Failure }
}

/// Snapshot of one CI execution for a commit.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WorkflowRun {
    pub id: u64,
    pub status: RunStatus,
    pub jobs: Vec<Job>,
}

/// Evidence for one failing job. `text` is already bounded.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ErrorSnippet {
    pub job: String,
    pub text: String,
}

/// Per-job snippets for a run, in the order they were first discovered.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Report {
    pub snippets: Vec<ErrorSnippet>,
}

impl Report {
    pub fn is_empty(&self) -> bool { self.snippets.is_empty() }

    pub fn len(&self) -> usize { self.snippets.len() }

    pub fn contains(&self, job: &str) -> bool { self.snippets.iter().any(|s| s.job == job) }

    pub fn get(&self, job: &str) -> Option<&ErrorSnippet> {
        self.snippets.iter().find(|s| s.job == job)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Outcome {
    AllPassed,
    FailedNoEvidence,
    FailedWithEvidence(Report),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllPassed => "all passed",
            Self::FailedNoEvidence => "failed without evidence",
            Self::FailedWithEvidence(_) => "failed with evidence",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BotComment {
    pub id: u64,
    pub body: String,
}

impl BotComment {
    pub fn new(id: u64, body: impl Into<String>) -> Self { Self { id, body: body.into() } }

    pub fn is_status(&self) -> bool { self.body.contains(STATUS_MARKER) }

    pub fn is_archived(&self) -> bool { self.body.trim_start().starts_with("<details>") }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Label {
    Success,
    StaleCi,
    NeedsRevision,
}

impl Label {
    pub const fn variants() -> &'static [Self] {
        &[Self::Success, Self::StaleCi, Self::NeedsRevision]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::StaleCi => "stale_ci",
            Self::NeedsRevision => "needs_revision",
        }
    }
}

impl FromStr for Label {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "stale_ci" => Ok(Self::StaleCi),
            "needs_revision" => Ok(Self::NeedsRevision),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_mapping() {
        assert_eq!(RunStatus::from_api("completed"), RunStatus::Completed);
        assert_eq!(RunStatus::from_api("in_progress"), RunStatus::Running);
        assert_eq!(JobConclusion::from_api(Some("failure")), JobConclusion::Failure);
        assert_eq!(JobConclusion::from_api(Some("cancelled")), JobConclusion::Other);
        assert_eq!(JobConclusion::from_api(None), JobConclusion::Other);
    }

    #[test]
    fn test_archived_comment() {
        let active = BotComment::new(1, "🚨 **CI Test Failures Detected**\n\nbody");
        assert!(active.is_status());
        assert!(!active.is_archived());
        let archived = BotComment::new(
            2,
            format!("<details>\n<summary>old</summary>\n\n{}\n</details>", active.body),
        );
        assert!(archived.is_status());
        assert!(archived.is_archived());
        assert!(!BotComment::new(3, "LGTM").is_status());
    }

    #[test]
    fn test_label_names() {
        for label in Label::variants() {
            assert_eq!(label.as_str().parse::<Label>(), Ok(*label));
        }
        assert!("bug".parse::<Label>().is_err());
    }
}
