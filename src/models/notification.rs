use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A notification generated server-side when a job is submitted or changes
/// state. `is_read` is the only client-mutable field, and only ever moves
/// false -> true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub message: String,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
    /// Server-assigned category ("info", "success", ...).
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}
