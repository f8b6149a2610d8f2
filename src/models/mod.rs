//! Data models for Briefly entities.
//!
//! This module contains the data structures exchanged with the Briefly API:
//!
//! - `Identity`: the authenticated user, including the credit balance
//! - `Job`, `JobStatus`: summarization jobs and their server-driven lifecycle
//! - `Notification`: messages generated as a side effect of job transitions
//! - `Credential`: the access/renewal token pair

pub mod job;
pub mod notification;
pub mod user;

pub use job::{Job, JobStatus};
pub use notification::Notification;
pub use user::{Credential, Identity};
