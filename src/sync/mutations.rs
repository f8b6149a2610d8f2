//! Write-path gateway: mutations plus the re-fetches that settle them.
//!
//! Mutations never edit a polled collection locally. Each one goes to the
//! server and, win or lose, kicks the affected view into an immediate
//! re-fetch so the local snapshot converges on server truth.

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError};
use crate::auth::SessionState;
use crate::models::{Job, Notification};
use crate::sync::PollingView;

/// Submitting a job costs this many credits; the gateway rejects locally
/// below the threshold rather than burning a round trip on a known failure.
pub const MIN_JOB_CREDITS: i64 = 10;

/// Entry point for all state-changing calls against polled collections.
#[derive(Clone)]
pub struct MutationGateway {
    api: ApiClient,
    session: watch::Receiver<SessionState>,
    jobs: PollingView<Job>,
    notifications: PollingView<Notification>,
}

impl MutationGateway {
    pub fn new(
        api: ApiClient,
        session: watch::Receiver<SessionState>,
        jobs: PollingView<Job>,
        notifications: PollingView<Notification>,
    ) -> Self {
        Self {
            api,
            session,
            jobs,
            notifications,
        }
    }

    /// Submit text for summarization.
    ///
    /// Checked against the locally-known credit balance first: an
    /// insufficient balance is rejected without any network traffic. On
    /// settlement (success or server-side rejection alike) the jobs view is
    /// re-fetched.
    pub async fn submit_job(&self, input_text: &str) -> Result<Job, ApiError> {
        let credits = self.session.borrow().identity.as_ref().map(|i| i.credits);
        if let Some(credits) = credits {
            if credits < MIN_JOB_CREDITS {
                debug!(credits, "Job submit rejected locally, balance too low");
                return Err(ApiError::Validation {
                    detail: format!(
                        "Insufficient credits: a summarization job costs {} credits",
                        MIN_JOB_CREDITS
                    ),
                });
            }
        }

        let result = self.api.submit_job(input_text).await;
        match &result {
            Ok(job) => debug!(job_id = job.id, "Job submitted"),
            Err(e) => warn!(error = %e, "Job submit failed"),
        }
        self.jobs.force_refresh();
        result
    }

    /// Mark a notification read, then re-fetch the notifications view.
    ///
    /// A `NotFound` (e.g. the notification was deleted server-side) is
    /// reported as the error it is; the follow-up re-fetch reconciles the
    /// list either way.
    pub async fn mark_notification_read(&self, id: i64) -> Result<(), ApiError> {
        let result = self.api.mark_notification_read(id).await;
        if let Err(e) = &result {
            warn!(notification_id = id, error = %e, "Mark-read failed");
        }
        self.notifications.force_refresh();
        result
    }

    /// Purchase credits. Returns the server's new balance so the caller can
    /// apply it to the session immediately instead of waiting for the next
    /// identity refresh.
    pub async fn add_credits(&self, credits: i64) -> Result<i64, ApiError> {
        self.api.add_credits(credits).await
    }
}
