use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Server-driven job lifecycle. Completed and failed are terminal; no further
/// transitions occur after either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A summarization job. Created server-side on submission; state transitions
/// are observed via polling, never mutated by the client.
///
/// Timestamps arrive as naive ISO-8601 (the server does not attach a zone).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub status: JobStatus,
    pub created_at: NaiveDateTime,
    pub input_text: String,
    /// Populated only once the job reaches `Completed`.
    #[serde(default)]
    pub output_text: Option<String>,
}
