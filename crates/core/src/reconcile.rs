//! Turns an outcome into at most one status comment write and a label delta.
//!
//! Planning is pure; [`apply`] performs the writes through the capability
//! traits so the same plan can be checked against in-memory fakes. Reapplying
//! the plan for an unchanged outcome writes nothing.

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::models::{BotComment, Label, Outcome, Report, STATUS_MARKER};

#[async_trait]
pub trait CommentSource: Send + Sync {
    /// Comments the bot wrote on the item, oldest first.
    async fn list_comments(&self) -> Result<Vec<BotComment>>;
    async fn post_comment(&self, body: &str) -> Result<()>;
    async fn edit_comment(&self, id: u64, body: &str) -> Result<()>;
}

#[async_trait]
pub trait LabelSource: Send + Sync {
    async fn list_labels(&self) -> Result<Vec<String>>;
    async fn add_label(&self, name: &str) -> Result<()>;
    async fn remove_label(&self, name: &str) -> Result<()>;
}

pub fn render_comment(report: &Report) -> String {
    let mut body = format!("🚨 **{STATUS_MARKER}**\n\n");
    for snippet in &report.snippets {
        body.push_str(&format!("### ⚙️ {}\n", snippet.job));
        body.push_str(&format!("```bash\n{}\n```\n\n", snippet.text));
    }
    body
}

/// Wrap a superseded status comment in a collapsed container.
pub fn archive_body(body: &str) -> String {
    format!(
        "<details>\n<summary>🕙 Outdated CI result (auto-archived by bot)</summary>\n\n{body}\n</details>"
    )
}

/// The most recent status comment that has not been archived yet.
pub fn active_comment(comments: &[BotComment]) -> Option<&BotComment> {
    comments.iter().rev().find(|c| c.is_status() && !c.is_archived())
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CommentAction {
    None,
    /// The active comment already shows this report.
    Skip,
    Post { body: String },
    Archive { id: u64, archived: String },
    ArchiveAndPost { id: u64, archived: String, body: String },
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct LabelDelta {
    pub add: Vec<Label>,
    pub remove: Vec<Label>,
}

impl LabelDelta {
    pub fn passed() -> Self {
        Self { add: vec![Label::Success], remove: vec![Label::StaleCi, Label::NeedsRevision] }
    }

    pub fn failed() -> Self {
        Self { add: vec![Label::StaleCi, Label::NeedsRevision], remove: vec![Label::Success] }
    }

    pub fn is_empty(&self) -> bool { self.add.is_empty() && self.remove.is_empty() }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Plan {
    pub action: CommentAction,
    pub labels: LabelDelta,
}

pub fn plan(outcome: &Outcome, comments: &[BotComment]) -> Plan {
    let active = active_comment(comments);
    match outcome {
        Outcome::AllPassed => Plan {
            action: match active {
                Some(comment) => {
                    CommentAction::Archive { id: comment.id, archived: archive_body(&comment.body) }
                }
                None => CommentAction::None,
            },
            labels: LabelDelta::passed(),
        },
        Outcome::FailedNoEvidence => {
            Plan { action: CommentAction::None, labels: LabelDelta::default() }
        }
        Outcome::FailedWithEvidence(report) => {
            let body = render_comment(report);
            match active {
                Some(comment) if comment.body.trim() == body.trim() => {
                    Plan { action: CommentAction::Skip, labels: LabelDelta::default() }
                }
                Some(comment) => Plan {
                    action: CommentAction::ArchiveAndPost {
                        id: comment.id,
                        archived: archive_body(&comment.body),
                        body,
                    },
                    labels: LabelDelta::failed(),
                },
                None => Plan { action: CommentAction::Post { body }, labels: LabelDelta::failed() },
            }
        }
    }
}

/// Apply a label delta against the current labels. Removals go first, so
/// `success` never coexists with the failure labels once this returns.
pub async fn apply_labels(delta: &LabelDelta, labels: &dyn LabelSource) -> Result<()> {
    if delta.is_empty() {
        return Ok(());
    }
    let current = labels.list_labels().await.context("Failed to list labels")?;
    let has = |label: &Label| current.iter().any(|name| name == label.as_str());
    for label in delta.remove.iter().filter(|l| has(*l)) {
        labels
            .remove_label(label.as_str())
            .await
            .with_context(|| format!("Failed to remove label {label}"))?;
        tracing::info!("Removed label '{}'", label);
    }
    for label in delta.add.iter().filter(|l| !has(*l)) {
        labels
            .add_label(label.as_str())
            .await
            .with_context(|| format!("Failed to add label {label}"))?;
        tracing::info!("Added label '{}'", label);
    }
    Ok(())
}

pub async fn apply(
    plan: &Plan,
    comments: &dyn CommentSource,
    labels: &dyn LabelSource,
) -> Result<()> {
    match &plan.action {
        CommentAction::None => {}
        CommentAction::Skip => tracing::info!("Same error content, skipping comment"),
        CommentAction::Post { body } => {
            comments.post_comment(body).await.context("Failed to post comment")?;
            tracing::info!("Posted first CI failure comment");
        }
        CommentAction::Archive { id, archived } => {
            comments.edit_comment(*id, archived).await.context("Failed to archive comment")?;
            tracing::info!("Archived CI comment {}", id);
        }
        CommentAction::ArchiveAndPost { id, archived, body } => {
            comments.edit_comment(*id, archived).await.context("Failed to archive comment")?;
            tracing::info!("Archived CI comment {}", id);
            comments.post_comment(body).await.context("Failed to post comment")?;
            tracing::info!("Posted updated CI failure comment");
        }
    }
    apply_labels(&plan.labels, labels).await
}

/// Read the comment history, plan, and apply. Returns the applied plan.
pub async fn reconcile(
    outcome: &Outcome,
    comments: &dyn CommentSource,
    labels: &dyn LabelSource,
) -> Result<Plan> {
    let history = comments.list_comments().await.context("Failed to list comments")?;
    let plan = plan(outcome, &history);
    apply(&plan, comments, labels).await?;
    Ok(plan)
}
