//! Owner-notification dispatch: resolves who owns a repository (CODEOWNERS,
//! falling back to the head commit's author/committer) and emails them when
//! a pipeline definition fails to render with a user-attributable error.

pub mod channel;
pub mod error;
pub mod recipients;

pub use channel::{MailChannel, MailChannelConfig};
pub use error::NotifyError;
pub use recipients::resolve_owner_recipients;

use std::sync::Arc;

use pipeline_scm::{GithubClient, RepoSlug};
use tracing::{debug, warn};

/// Fire-and-forget dispatcher wrapping a [`MailChannel`]. A `None` channel
/// means notifications are configured off; `notify_render_failure` then logs
/// and returns immediately, matching how the orchestrator treats a missing
/// `EmailConfig`.
pub struct OwnerNotifier {
    channel: Option<Arc<MailChannel>>,
}

impl OwnerNotifier {
    #[must_use]
    pub fn new(channel: Option<MailChannel>) -> Self {
        Self {
            channel: channel.map(Arc::new),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { channel: None }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.channel.is_some()
    }

    /// Resolves recipients for `repo` and sends the failure notification in a
    /// detached task. Returns immediately; delivery failures are logged, not
    /// propagated (matching the teacher's `Notifier::notify` fire-and-forget
    /// contract).
    pub fn notify_render_failure(
        &self,
        scm: Arc<dyn GithubClient>,
        repo: RepoSlug,
        git_ref: Option<String>,
        head_sha: String,
        pipeline_name: String,
        error_details: String,
    ) {
        let Some(channel) = self.channel.clone() else {
            debug!(%repo, pipeline = %pipeline_name, "owner notification skipped, no mail channel configured");
            return;
        };

        tokio::spawn(async move {
            let recipients =
                resolve_owner_recipients(scm.as_ref(), &repo, git_ref.as_deref(), &head_sha).await;
            if recipients.is_empty() {
                warn!(%repo, pipeline = %pipeline_name, "no recipients resolved, skipping owner notification");
                return;
            }

            let subject = format!("pipeline rendering failed: {pipeline_name}");
            let body = format!(
                "Rendering pipeline {pipeline_name} for {repo} failed:\n\n{error_details}\n"
            );

            match channel.send(&subject, &body, &recipients).await {
                Ok(()) => debug!(%repo, pipeline = %pipeline_name, recipient_count = recipients.len(), "sent owner notification"),
                Err(e) => warn!(%repo, pipeline = %pipeline_name, error = %e, "failed to send owner notification"),
            }
        });
    }

    /// Like [`OwnerNotifier::notify_render_failure`] but awaits delivery and
    /// surfaces the result, for tests and for CLI dry-runs that want a final
    /// exit code.
    pub async fn notify_render_failure_and_wait(
        &self,
        scm: &dyn GithubClient,
        repo: &RepoSlug,
        git_ref: Option<&str>,
        head_sha: &str,
        pipeline_name: &str,
        error_details: &str,
    ) -> Result<(), NotifyError> {
        let Some(channel) = &self.channel else {
            return Ok(());
        };
        let recipients = resolve_owner_recipients(scm, repo, git_ref, head_sha).await;
        if recipients.is_empty() {
            return Err(NotifyError::NoRecipients);
        }
        let subject = format!("pipeline rendering failed: {pipeline_name}");
        let body = format!("Rendering pipeline {pipeline_name} for {repo} failed:\n\n{error_details}\n");
        channel.send(&subject, &body, &recipients).await
    }
}
