mod component;
mod forge;
mod store;

use std::{collections::HashSet, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use ci_triage_core::{
    CommentSource, Extractor, Plan, analyze_run,
    config::{ComponentConfig, Config},
    models::{Job, Label, Outcome, RunStatus},
    reconcile,
};
use ci_triage_github::Item;
pub use component::{component_path, link_comment, parse_component_name};
pub use forge::Forge;
pub use store::{JsonFileStore, MemoryStore, SeenStore};
use tokio::sync::watch;

/// Runs reconciliation passes one after another.
///
/// The seen set is only extended once a pass has finished, so a crash
/// mid-pass redoes the pass.
pub struct Worker<F, S> {
    forge: Arc<F>,
    store: S,
    extractor: Extractor,
    components: ComponentConfig,
    interval: Duration,
    seen: HashSet<u64>,
}

/// Result of checking one pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    NoRun,
    Running,
    Reconciled { outcome: Outcome, plan: Plan },
}

impl<F: Forge, S: SeenStore> Worker<F, S> {
    pub fn new(forge: Arc<F>, store: S, config: &Config) -> Result<Self> {
        let extractor = Extractor::new(&config.analysis).context("Invalid analysis config")?;
        let seen = match store.load() {
            Ok(seen) => seen,
            Err(e) => {
                tracing::warn!("Failed to load seen items, starting empty: {:?}", e);
                HashSet::new()
            }
        };
        tracing::info!("Loaded {} seen items", seen.len());
        Ok(Self {
            forge,
            store,
            extractor,
            components: config.components.clone(),
            interval: config.worker.poll_interval(),
            seen,
        })
    }

    pub fn seen(&self) -> &HashSet<u64> { &self.seen }

    /// Loop until `shutdown` flips to `true`. A running pass is always finished.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!("Worker started, polling every {}s", self.interval.as_secs());
        loop {
            match self.run_pass().await {
                Ok(count) => tracing::info!("Pass complete, processed {} items", count),
                Err(e) => tracing::error!("Pass failed: {:?}", e),
            }
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Worker stopped");
        Ok(())
    }

    fn is_candidate(&self, item: &Item) -> bool {
        !self.seen.contains(&item.number)
            || item.labels.iter().any(|l| l.parse::<Label>().is_ok())
    }

    /// One full pass over open items. Returns the number of items handled.
    ///
    /// An item is marked seen only once everything it needed went through: a
    /// pull request must reach reconciliation and a component link must not
    /// have failed. Anything else is retried on the next pass.
    pub async fn run_pass(&mut self) -> Result<usize> {
        let items = self.forge.open_items().await.context("Failed to enumerate items")?;
        let mut handled = 0;
        let mut done = Vec::new();
        for item in items.iter().filter(|i| self.is_candidate(i)) {
            tracing::info!("Processing #{}", item.number);
            handled += 1;
            let mut complete = true;
            if item.is_pull_request {
                match self.check_pull_request(item.number).await {
                    Ok(result) => {
                        log_check_result(item.number, &result);
                        complete = matches!(result, CheckResult::Reconciled { .. });
                    }
                    Err(e) => {
                        tracing::error!("Failed to check CI for #{}: {:?}", item.number, e);
                        complete = false;
                    }
                }
            }
            if !self.seen.contains(&item.number)
                && let Err(e) = self.link_component(item).await
            {
                tracing::error!("Failed to link component for #{}: {:?}", item.number, e);
                complete = false;
            }
            if complete {
                done.push(item.number);
            }
        }
        self.seen.extend(done);
        self.store.save(&self.seen).context("Failed to save seen items")?;
        Ok(handled)
    }

    pub async fn check_pull_request(&self, number: u64) -> Result<CheckResult> {
        tracing::info!("Checking CI logs for PR #{}", number);
        let head = self.forge.pull_request_head(number).await?;
        let Some(run) = self.forge.fetch_workflow_run(&head).await? else {
            return Ok(CheckResult::NoRun);
        };
        if run.status != RunStatus::Completed {
            return Ok(CheckResult::Running);
        }
        let outcome = if run.jobs.iter().any(Job::failed) {
            let logs = self.forge.download_run_logs(run.id).await?;
            analyze_run(&run.jobs, &logs, &self.extractor)
                .with_context(|| format!("Failed to analyze logs of run {}", run.id))?
        } else {
            Outcome::AllPassed
        };
        let comments = self.forge.comments(number);
        let labels = self.forge.labels(number);
        let plan = reconcile(&outcome, comments.as_ref(), labels.as_ref()).await?;
        Ok(CheckResult::Reconciled { outcome, plan })
    }

    /// Comment with a link to the module named in the item's description.
    /// Returns whether a comment was posted. An identical link already on
    /// the item is not posted again.
    pub async fn link_component(&self, item: &Item) -> Result<bool> {
        let Some(name) = item.body.as_deref().and_then(parse_component_name) else {
            return Ok(false);
        };
        let path = component_path(&self.components.path_prefix, name);
        if !self.forge.file_exists(&path, &self.components.branch).await? {
            tracing::debug!("Component {} not found for #{}", path, item.number);
            return Ok(false);
        }
        let body = link_comment(&path, &self.forge.file_url(&path, &self.components.branch));
        let comments = self.forge.comments(item.number).list_comments().await?;
        if comments.iter().any(|c| c.body.trim() == body) {
            tracing::debug!("#{} already links {}", item.number, path);
            return Ok(false);
        }
        self.forge.create_comment(item.number, &body).await?;
        tracing::info!("Commented on #{} with module path {}", item.number, path);
        Ok(true)
    }
}

fn log_check_result(number: u64, result: &CheckResult) {
    match result {
        CheckResult::NoRun => tracing::info!("No CI runs found for #{}", number),
        CheckResult::Running => tracing::info!("CI is still running for #{}", number),
        CheckResult::Reconciled { outcome: Outcome::FailedNoEvidence, .. } => {
            tracing::info!("Some jobs failed for #{}, but no error snippets found", number)
        }
        CheckResult::Reconciled { outcome, .. } => {
            tracing::info!("CI for #{}: {}", number, outcome)
        }
    }
}
