//! REST API client module for the Briefly service.
//!
//! This module provides the `ApiClient` for the full consumed surface:
//! signup, token issuance and renewal, identity, jobs, notifications, and
//! credits. Protected calls carry a JWT bearer token and are transparently
//! retried once after credential renewal on a 401.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
