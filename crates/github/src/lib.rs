use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use ci_triage_core::{
    CommentSource, LabelSource,
    config::GitHubConfig,
    models::{BotComment, Job, JobConclusion, RunStatus, WorkflowRun},
};
use http::StatusCode;
use octocrab::{
    GitHubError, Octocrab,
    models::{CommentId, RunId},
    params,
};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct GitHub {
    pub client: Octocrab,
    pub owner: String,
    pub repo: String,
    /// Login of the authenticated account; only its comments are considered.
    pub login: String,
}

/// An open issue or pull request as seen by the worker.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Item {
    pub number: u64,
    pub is_pull_request: bool,
    pub labels: Vec<String>,
    pub body: Option<String>,
}

#[derive(Serialize)]
struct PageParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    per_page: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
}

#[derive(Serialize)]
struct RunParams<'a> {
    event: &'a str,
    head_sha: &'a str,
    per_page: u8,
}

#[derive(Deserialize)]
struct RunList {
    workflow_runs: Vec<RunInfo>,
}

#[derive(Deserialize)]
struct RunInfo {
    id: u64,
    status: Option<String>,
}

#[derive(Deserialize)]
struct JobList {
    total_count: u64,
    jobs: Vec<JobInfo>,
}

#[derive(Deserialize)]
struct JobInfo {
    name: String,
    conclusion: Option<String>,
}

impl From<JobInfo> for Job {
    fn from(value: JobInfo) -> Self {
        Job::new(value.name, JobConclusion::from_api(value.conclusion.as_deref()))
    }
}

/// Parse a saved response of the "list jobs for a workflow run" endpoint.
pub fn parse_jobs(data: &[u8]) -> Result<Vec<Job>> {
    let list: JobList = serde_json::from_slice(data).context("Failed to parse jobs list")?;
    Ok(list.jobs.into_iter().map(Job::from).collect())
}

/// Keep the comments written by `login`, in their original order.
fn own_comments(
    login: &str,
    comments: impl IntoIterator<Item = (u64, String, Option<String>)>,
) -> Vec<BotComment> {
    comments
        .into_iter()
        .filter(|(_, author, _)| author.eq_ignore_ascii_case(login))
        .map(|(id, _, body)| BotComment::new(id, body.unwrap_or_default()))
        .collect()
}

fn is_not_found(e: &octocrab::Error) -> bool {
    matches!(e, octocrab::Error::GitHub { source, .. }
        if matches!(**source, GitHubError { status_code: StatusCode::NOT_FOUND, .. }))
}

impl GitHub {
    pub async fn new(config: &GitHubConfig) -> Result<Arc<Self>> {
        let (owner, repo) = config
            .owner_repo()
            .with_context(|| format!("Invalid repository '{}', expected owner/name", config.repo))?;
        let token = if config.token.is_empty() {
            std::env::var("GITHUB_TOKEN").context("No GitHub token configured")?
        } else {
            config.token.clone()
        };
        let client = Octocrab::builder()
            .personal_token(token)
            .build()
            .context("Failed to create GitHub client")?;
        let profile = client.current().user().await.context("Failed to fetch current user")?;
        tracing::info!("Logged in as {}, watching {}/{}", profile.login, owner, repo);
        Ok(Arc::new(Self {
            client,
            owner: owner.to_string(),
            repo: repo.to_string(),
            login: profile.login,
        }))
    }

    /// Most recent `pull_request` run for a commit, with its jobs once completed.
    pub async fn fetch_workflow_run(&self, head_sha: &str) -> Result<Option<WorkflowRun>> {
        let route = format!("/repos/{}/{}/actions/runs", self.owner, self.repo);
        let runs: RunList = self
            .client
            .get(&route, Some(&RunParams { event: "pull_request", head_sha, per_page: 1 }))
            .await
            .with_context(|| format!("Failed to fetch workflow runs for {head_sha}"))?;
        let Some(run) = runs.workflow_runs.into_iter().next() else {
            return Ok(None);
        };
        let status = RunStatus::from_api(run.status.as_deref().unwrap_or_default());
        let jobs = match status {
            RunStatus::Completed => self.list_run_jobs(run.id).await?,
            RunStatus::Running => vec![],
        };
        Ok(Some(WorkflowRun { id: run.id, status, jobs }))
    }

    pub async fn list_run_jobs(&self, run_id: u64) -> Result<Vec<Job>> {
        let route = format!("/repos/{}/{}/actions/runs/{}/jobs", self.owner, self.repo, run_id);
        let mut page = 1;
        let mut response: JobList = self
            .client
            .get(&route, Some(&PageParams { per_page: Some(100), page: Some(page) }))
            .await
            .with_context(|| format!("Failed to fetch jobs for run {run_id}"))?;
        let mut jobs = response.jobs.into_iter().map(Job::from).collect::<Vec<_>>();
        while (jobs.len() as u64) < response.total_count {
            page += 1;
            response = self
                .client
                .get(&route, Some(&PageParams { per_page: Some(100), page: Some(page) }))
                .await
                .with_context(|| format!("Failed to fetch jobs page {page} for run {run_id}"))?;
            if response.jobs.is_empty() {
                break;
            }
            jobs.extend(response.jobs.into_iter().map(Job::from));
        }
        tracing::debug!("Run {} (jobs {})", run_id, jobs.len());
        Ok(jobs)
    }

    pub async fn download_run_logs(&self, run_id: u64) -> Result<Bytes> {
        self.client
            .actions()
            .download_workflow_run_logs(&self.owner, &self.repo, RunId(run_id))
            .await
            .with_context(|| format!("Failed to download logs for run {run_id}"))
    }

    /// Open issues and pull requests, newest first.
    pub async fn open_items(&self) -> Result<Vec<Item>> {
        let page = self
            .client
            .issues(&self.owner, &self.repo)
            .list()
            .state(params::State::Open)
            .sort(params::issues::Sort::Created)
            .direction(params::Direction::Descending)
            .per_page(100)
            .send()
            .await
            .context("Failed to list open issues")?;
        let issues = self.client.all_pages(page).await.context("Failed to list open issues")?;
        Ok(issues
            .into_iter()
            .map(|issue| Item {
                number: issue.number,
                is_pull_request: issue.pull_request.is_some(),
                labels: issue.labels.into_iter().map(|l| l.name).collect(),
                body: issue.body,
            })
            .collect())
    }

    pub async fn pull_request_head(&self, number: u64) -> Result<String> {
        let pull_request = self
            .client
            .pulls(&self.owner, &self.repo)
            .get(number)
            .await
            .with_context(|| format!("Failed to fetch pull request #{number}"))?;
        Ok(pull_request.head.sha)
    }

    pub async fn file_exists(&self, path: &str, branch: &str) -> Result<bool> {
        match self
            .client
            .repos(&self.owner, &self.repo)
            .get_content()
            .path(path)
            .r#ref(branch)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to look up {path}")),
        }
    }

    pub fn file_url(&self, path: &str, branch: &str) -> String {
        format!("https://github.com/{}/{}/blob/{}/{}", self.owner, self.repo, branch, path)
    }

    pub async fn create_comment(&self, number: u64, body: &str) -> Result<()> {
        self.client
            .issues(&self.owner, &self.repo)
            .create_comment(number, body)
            .await
            .with_context(|| format!("Failed to comment on #{number}"))?;
        Ok(())
    }

    pub fn item(&self, number: u64) -> IssueHandle<'_> { IssueHandle { github: self, number } }
}

/// Comments and labels of a single issue or pull request.
pub struct IssueHandle<'a> {
    github: &'a GitHub,
    number: u64,
}

impl IssueHandle<'_> {
    fn issues(&self) -> octocrab::issues::IssueHandler<'_> {
        self.github.client.issues(&self.github.owner, &self.github.repo)
    }
}

#[async_trait]
impl CommentSource for IssueHandle<'_> {
    async fn list_comments(&self) -> Result<Vec<BotComment>> {
        let page = self.issues().list_comments(self.number).per_page(100).send().await?;
        let comments = self.github.client.all_pages(page).await?;
        Ok(own_comments(
            &self.github.login,
            comments.into_iter().map(|c| (c.id.into_inner(), c.user.login, c.body)),
        ))
    }

    async fn post_comment(&self, body: &str) -> Result<()> {
        self.issues().create_comment(self.number, body).await?;
        Ok(())
    }

    async fn edit_comment(&self, id: u64, body: &str) -> Result<()> {
        self.issues().update_comment(CommentId(id), body).await?;
        Ok(())
    }
}

#[async_trait]
impl LabelSource for IssueHandle<'_> {
    async fn list_labels(&self) -> Result<Vec<String>> {
        let page = self.issues().list_labels_for_issue(self.number).per_page(100).send().await?;
        let labels = self.github.client.all_pages(page).await?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }

    async fn add_label(&self, name: &str) -> Result<()> {
        self.issues().add_labels(self.number, &[name.to_string()]).await?;
        Ok(())
    }

    async fn remove_label(&self, name: &str) -> Result<()> {
        match self.issues().remove_label(self.number, name).await {
            Ok(_) => Ok(()),
            // Already gone
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
