//! Authentication module for credentials and the session lifecycle.
//!
//! This module provides:
//! - `CredentialStore`: the single owned home of the live token pair, with
//!   access-token persistence across restarts
//! - `RenewalGate`: single-flight guard so concurrent 401s share one renewal
//! - `SessionManager`: the Resolving/Authenticated/Anonymous phase machine

pub mod credentials;
pub mod renewal;
pub mod session;

pub use credentials::CredentialStore;
pub use renewal::{Renewal, RenewalGate};
pub use session::{AuthEvent, SessionManager, SessionPhase, SessionState};
