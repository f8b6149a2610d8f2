//! Client core for the Briefly text-summarization service.
//!
//! The crate owns the session and synchronization machinery a frontend
//! builds on:
//!
//! - [`auth::CredentialStore`] holds the live token pair and persists the
//!   access token across restarts
//! - [`api::ApiClient`] is the authenticated transport, with transparent
//!   single-flight credential renewal on 401
//! - [`auth::SessionManager`] runs the Resolving/Authenticated/Anonymous
//!   session phase machine
//! - [`sync::PollingView`] keeps per-collection read views fresh by polling
//! - [`sync::MutationGateway`] routes writes and settles them with re-fetches

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod sync;

pub use api::{ApiClient, ApiError};
pub use auth::{CredentialStore, SessionManager, SessionPhase, SessionState};
pub use config::Config;
pub use sync::{MutationGateway, PollingView};
