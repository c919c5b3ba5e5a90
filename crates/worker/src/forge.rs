use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use ci_triage_core::{CommentSource, LabelSource, models::WorkflowRun};
use ci_triage_github::{GitHub, Item};

/// Everything the worker needs from the hosting service.
#[async_trait]
pub trait Forge: Send + Sync {
    async fn open_items(&self) -> Result<Vec<Item>>;
    async fn pull_request_head(&self, number: u64) -> Result<String>;
    async fn fetch_workflow_run(&self, head_sha: &str) -> Result<Option<WorkflowRun>>;
    async fn download_run_logs(&self, run_id: u64) -> Result<Bytes>;
    async fn file_exists(&self, path: &str, branch: &str) -> Result<bool>;
    fn file_url(&self, path: &str, branch: &str) -> String;
    async fn create_comment(&self, number: u64, body: &str) -> Result<()>;
    fn comments(&self, number: u64) -> Box<dyn CommentSource + '_>;
    fn labels(&self, number: u64) -> Box<dyn LabelSource + '_>;
}

#[async_trait]
impl Forge for GitHub {
    async fn open_items(&self) -> Result<Vec<Item>> { GitHub::open_items(self).await }

    async fn pull_request_head(&self, number: u64) -> Result<String> {
        GitHub::pull_request_head(self, number).await
    }

    async fn fetch_workflow_run(&self, head_sha: &str) -> Result<Option<WorkflowRun>> {
        GitHub::fetch_workflow_run(self, head_sha).await
    }

    async fn download_run_logs(&self, run_id: u64) -> Result<Bytes> {
        GitHub::download_run_logs(self, run_id).await
    }

    async fn file_exists(&self, path: &str, branch: &str) -> Result<bool> {
        GitHub::file_exists(self, path, branch).await
    }

    fn file_url(&self, path: &str, branch: &str) -> String { GitHub::file_url(self, path, branch) }

    async fn create_comment(&self, number: u64, body: &str) -> Result<()> {
        GitHub::create_comment(self, number, body).await
    }

    fn comments(&self, number: u64) -> Box<dyn CommentSource + '_> { Box::new(self.item(number)) }

    fn labels(&self, number: u64) -> Box<dyn LabelSource + '_> { Box::new(self.item(number)) }
}
