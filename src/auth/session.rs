use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::auth::CredentialStore;
use crate::models::{Credential, Identity};

/// Signals sent by the transport when authentication fails terminally.
/// The session manager is the single owner of the resulting transition;
/// the transport itself never decides what the consumer should do about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SessionExpired,
}

/// Where the session currently stands. Consumers gated on `Authenticated`
/// must treat `Resolving` as a pending state, never as `Anonymous`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Resolving,
    Authenticated,
    Anonymous,
}

/// Published session snapshot. Invariant: `phase == Authenticated` exactly
/// when `identity` is present (and the credential store holds a credential).
#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub identity: Option<Identity>,
}

impl SessionState {
    fn resolving() -> Self {
        Self {
            phase: SessionPhase::Resolving,
            identity: None,
        }
    }
}

/// Owns the authenticated-identity lifecycle.
///
/// Startup begins in `Resolving` and settles exactly once from persisted
/// storage. Phase changes are published over a watch channel; the transport's
/// terminal-failure signals arrive over an mpsc channel and are drained by
/// `process_auth_events`.
pub struct SessionManager {
    api: ApiClient,
    credentials: Arc<CredentialStore>,
    auth_events: mpsc::Receiver<AuthEvent>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionManager {
    pub fn new(
        api: ApiClient,
        credentials: Arc<CredentialStore>,
        auth_events: mpsc::Receiver<AuthEvent>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::resolving());
        Self {
            api,
            credentials,
            auth_events,
            state_tx,
        }
    }

    /// Subscribe to phase changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state_tx.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state_tx.borrow().phase
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state_tx.borrow().identity.clone()
    }

    /// Resolve the session once from persisted storage: no stored credential
    /// means Anonymous; otherwise the identity fetch decides.
    pub async fn resolve(&mut self) {
        match self.credentials.restore() {
            Ok(true) => {
                debug!("Stored credential found, resolving identity");
                let result = self.api.fetch_me().await;
                self.apply_identity_result(result);
            }
            Ok(false) => {
                debug!("No stored credential, session is anonymous");
                self.transition_anonymous();
            }
            Err(e) => {
                warn!(error = %e, "Failed to restore credential");
                self.transition_anonymous();
            }
        }
    }

    /// Authenticate with username/password: obtains a token pair, then logs
    /// in with it.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), ApiError> {
        let credential = self.api.request_token(username, password).await?;
        self.login(credential).await
    }

    /// Store a freshly issued credential and re-resolve the identity.
    pub async fn login(&mut self, credential: Credential) -> Result<(), ApiError> {
        self.credentials
            .set(credential.access_token, credential.refresh_token);
        if let Err(e) = self.credentials.persist() {
            warn!(error = %e, "Failed to persist credential");
        }
        self.state_tx.send_replace(SessionState::resolving());

        match self.api.fetch_me().await {
            Ok(identity) => {
                info!(username = %identity.username, "Login succeeded");
                self.transition_authenticated(identity);
                Ok(())
            }
            Err(e) => {
                self.credentials.clear();
                if let Err(persist_err) = self.credentials.persist() {
                    warn!(error = %persist_err, "Failed to remove persisted credential");
                }
                self.transition_anonymous();
                Err(e)
            }
        }
    }

    /// Clear credential and identity locally. Never touches the network, so
    /// it succeeds even when the server is unreachable.
    pub fn logout(&mut self) {
        info!("Logging out");
        self.credentials.clear();
        if let Err(e) = self.credentials.persist() {
            warn!(error = %e, "Failed to remove persisted credential");
        }
        self.transition_anonymous();
    }

    /// Re-fetch the identity without changing the credential; used for
    /// periodic credit-balance reconciliation.
    ///
    /// Only an authorization failure ends the session - a dropped connection
    /// or server hiccup leaves it intact.
    pub async fn refresh_identity(&mut self) -> Result<(), ApiError> {
        match self.api.fetch_me().await {
            Ok(identity) => {
                self.transition_authenticated(identity);
                Ok(())
            }
            Err(e) => {
                self.note_refresh_failure(&e);
                Err(e)
            }
        }
    }

    /// Overwrite the credit balance optimistically after a successful
    /// credit-adding mutation. The next identity refresh reconciles it with
    /// the server's value.
    pub fn apply_credits(&mut self, credits: i64) {
        self.state_tx.send_if_modified(|state| {
            if let Some(identity) = state.identity.as_mut() {
                if identity.credits != credits {
                    identity.credits = credits;
                    return true;
                }
            }
            false
        });
    }

    /// Drain pending transport signals. A terminal authentication failure
    /// forces Anonymous; everything else is already handled at the call site.
    pub fn process_auth_events(&mut self) {
        while let Ok(event) = self.auth_events.try_recv() {
            match event {
                AuthEvent::SessionExpired => {
                    if self.phase() != SessionPhase::Anonymous {
                        info!("Transport reported expired session");
                        self.credentials.clear();
                        if let Err(e) = self.credentials.persist() {
                            warn!(error = %e, "Failed to remove persisted credential");
                        }
                        self.transition_anonymous();
                    }
                }
            }
        }
    }

    /// Apply the outcome of an identity fetch. Success authenticates; any
    /// failure during resolution falls back to Anonymous (a stored token the
    /// server rejects must not leave the client stuck in Resolving).
    fn apply_identity_result(&mut self, result: Result<Identity, ApiError>) {
        match result {
            Ok(identity) => {
                info!(username = %identity.username, "Session authenticated");
                self.transition_authenticated(identity);
            }
            Err(e) => {
                debug!(error = %e, "Identity fetch failed during resolution");
                self.credentials.clear();
                if let Err(e) = self.credentials.persist() {
                    warn!(error = %e, "Failed to remove persisted credential");
                }
                self.transition_anonymous();
            }
        }
    }

    /// A failed periodic refresh only ends the session when the failure is an
    /// authorization failure.
    fn note_refresh_failure(&mut self, err: &ApiError) {
        if err.is_auth_failure() {
            info!("Identity refresh rejected, session ends");
            self.credentials.clear();
            if let Err(e) = self.credentials.persist() {
                warn!(error = %e, "Failed to remove persisted credential");
            }
            self.transition_anonymous();
        } else {
            debug!(error = %err, "Transient identity refresh failure, session preserved");
        }
    }

    fn transition_authenticated(&mut self, identity: Identity) {
        self.state_tx.send_replace(SessionState {
            phase: SessionPhase::Authenticated,
            identity: Some(identity),
        });
    }

    fn transition_anonymous(&mut self) {
        self.state_tx.send_replace(SessionState {
            phase: SessionPhase::Anonymous,
            identity: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_identity() -> Identity {
        Identity {
            id: 1,
            username: "ada".to_string(),
            email: "ada@example.com".to_string(),
            credits: 100,
        }
    }

    fn manager() -> (SessionManager, Arc<CredentialStore>, mpsc::Sender<AuthEvent>, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let credentials = Arc::new(CredentialStore::new(dir.path().to_path_buf()));
        let (tx, rx) = mpsc::channel(8);
        let api = ApiClient::new("http://briefly.invalid", Arc::clone(&credentials), tx.clone())
            .expect("client");
        let manager = SessionManager::new(api, Arc::clone(&credentials), rx);
        (manager, credentials, tx, dir)
    }

    #[tokio::test]
    async fn test_initial_phase_is_resolving() {
        let (manager, _, _, _dir) = manager();
        assert_eq!(manager.phase(), SessionPhase::Resolving);
        assert!(manager.identity().is_none());
    }

    #[tokio::test]
    async fn test_identity_success_authenticates() {
        let (mut manager, credentials, _, _dir) = manager();
        credentials.set("token", None);

        manager.apply_identity_result(Ok(test_identity()));
        assert_eq!(manager.phase(), SessionPhase::Authenticated);
        assert_eq!(manager.identity().expect("identity").credits, 100);
    }

    #[tokio::test]
    async fn test_rejected_stored_token_resolves_anonymous() {
        let (mut manager, credentials, _, _dir) = manager();
        credentials.set("stale-token", None);

        // Stored token present, /auth/me says 401, no renewal credential:
        // resolution must land on Anonymous with the credential cleared.
        manager.apply_identity_result(Err(ApiError::Unauthorized));
        assert_eq!(manager.phase(), SessionPhase::Anonymous);
        assert!(manager.identity().is_none());
        assert!(credentials.current().is_none());
    }

    #[tokio::test]
    async fn test_resolve_without_stored_credential_is_anonymous() {
        let (mut manager, _, _, _dir) = manager();
        manager.resolve().await;
        assert_eq!(manager.phase(), SessionPhase::Anonymous);
    }

    #[tokio::test]
    async fn test_logout_is_local_and_synchronous() {
        let (mut manager, credentials, _, _dir) = manager();
        credentials.set("token", Some("refresh".to_string()));
        manager.apply_identity_result(Ok(test_identity()));

        manager.logout();
        assert_eq!(manager.phase(), SessionPhase::Anonymous);
        assert!(credentials.current().is_none());

        // A protected call after logout fails fast, before any network I/O.
        let err = manager.api.fetch_jobs().await.expect_err("must fail");
        assert!(matches!(err, ApiError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_transient_refresh_failure_preserves_session() {
        let (mut manager, credentials, _, _dir) = manager();
        credentials.set("token", None);
        manager.apply_identity_result(Ok(test_identity()));

        manager.note_refresh_failure(&ApiError::ServerError("500".to_string()));
        assert_eq!(manager.phase(), SessionPhase::Authenticated);
        assert!(credentials.current().is_some());
    }

    #[tokio::test]
    async fn test_auth_refresh_failure_ends_session() {
        let (mut manager, credentials, _, _dir) = manager();
        credentials.set("token", None);
        manager.apply_identity_result(Ok(test_identity()));

        manager.note_refresh_failure(&ApiError::Unauthorized);
        assert_eq!(manager.phase(), SessionPhase::Anonymous);
        assert!(credentials.current().is_none());
    }

    #[tokio::test]
    async fn test_session_expired_event_forces_anonymous() {
        let (mut manager, credentials, tx, _dir) = manager();
        credentials.set("token", None);
        manager.apply_identity_result(Ok(test_identity()));

        tx.try_send(AuthEvent::SessionExpired).expect("send");
        manager.process_auth_events();
        assert_eq!(manager.phase(), SessionPhase::Anonymous);
        assert!(credentials.current().is_none());
    }

    #[tokio::test]
    async fn test_apply_credits_is_optimistic_overwrite() {
        let (mut manager, credentials, _, _dir) = manager();
        credentials.set("token", None);
        manager.apply_identity_result(Ok(test_identity()));

        manager.apply_credits(250);
        assert_eq!(manager.identity().expect("identity").credits, 250);

        // Reconciliation: the next identity result is authoritative.
        let mut reconciled = test_identity();
        reconciled.credits = 190;
        manager.transition_authenticated(reconciled);
        assert_eq!(manager.identity().expect("identity").credits, 190);
    }

    #[tokio::test]
    async fn test_subscribers_observe_phase_changes() {
        let (mut manager, credentials, _, _dir) = manager();
        let rx = manager.subscribe();
        assert_eq!(rx.borrow().phase, SessionPhase::Resolving);

        credentials.set("token", None);
        manager.apply_identity_result(Ok(test_identity()));
        assert_eq!(rx.borrow().phase, SessionPhase::Authenticated);

        manager.logout();
        assert_eq!(rx.borrow().phase, SessionPhase::Anonymous);
    }
}
