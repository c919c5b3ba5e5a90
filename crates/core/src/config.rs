use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub github: GitHubConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub components: ComponentConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubConfig {
    /// Personal access token. Falls back to `GITHUB_TOKEN` when empty.
    #[serde(default)]
    pub token: String,
    /// Watched repository, `owner/name`.
    pub repo: String,
}

impl GitHubConfig {
    pub fn owner_repo(&self) -> Option<(&str, &str)> {
        let (owner, repo) = self.repo.split_once('/')?;
        (!owner.is_empty() && !repo.is_empty() && !repo.contains('/')).then_some((owner, repo))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_secs: u64,
    pub state_file: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { poll_interval_secs: 180, state_file: PathBuf::from("processed.json") }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration { Duration::from_secs(self.poll_interval_secs) }
}

/// Where modules named in an issue's "Component Name" section live.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ComponentConfig {
    pub path_prefix: String,
    pub branch: String,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self { path_prefix: "plugins/modules".to_string(), branch: "main".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    /// Phrases that make a cleaned log line a candidate error line.
    #[serde(default = "default_markers")]
    pub markers: Vec<String>,
    /// Phrases that suppress an otherwise matching line.
    #[serde(default = "default_noise")]
    pub noise: Vec<String>,
    #[serde(default)]
    pub case_insensitive: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { markers: default_markers(), noise: default_noise(), case_insensitive: false }
    }
}

fn default_markers() -> Vec<String> {
    [
        "FAILED",
        "FATAL",
        "ERROR",
        "ERROR:",
        "Traceback",
        "SyntaxError",
        "ImportError",
        "ModuleNotFoundError",
        "assert",
        "fatal:",
        "task failed",
        "collection failure",
        "sanity failure",
        "invalid value",
        "ansible-test sanity",
        "invalid-documentation-markup",
        "non-existing option",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_noise() -> Vec<String> {
    [
        "coverage:",
        "##[group]",
        "shell:",
        "Cleaning up orphan processes",
        "Post job cleanup",
        "ansible-test-gh-action",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_repo() {
        let cases: &[(&str, Option<(&str, &str)>)] = &[
            ("3A2DEV/a2dev.general", Some(("3A2DEV", "a2dev.general"))),
            ("owner/", None),
            ("/repo", None),
            ("owner", None),
            ("a/b/c", None),
        ];
        for &(repo, expected) in cases {
            let config = GitHubConfig { token: String::new(), repo: repo.to_string() };
            assert_eq!(config.owner_repo(), expected);
        }
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"server":{"port":10000},"github":{"repo":"owner/repo"}}"#)
                .unwrap();
        assert_eq!(config.worker.poll_interval(), Duration::from_secs(180));
        assert_eq!(config.components.path_prefix, "plugins/modules");
        assert!(config.analysis.markers.iter().any(|m| m == "Traceback"));
        assert!(!config.analysis.case_insensitive);
    }
}
