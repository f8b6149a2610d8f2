//! API client for communicating with the Briefly REST API.
//!
//! This module provides the `ApiClient` struct for making authenticated
//! requests: it attaches the bearer token from the shared credential store,
//! renews the credential transparently on a 401 (retrying the failed request
//! exactly once), and signals the session manager on terminal authentication
//! failure instead of deciding anything about navigation itself.

use std::sync::Arc;

use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::auth::{AuthEvent, CredentialStore, RenewalGate};
use crate::models::{Credential, Identity, Job, Notification};

use super::ApiError;

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[allow(dead_code)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CreditsResponse {
    credits: i64,
}

/// API client for the Briefly service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling,
/// and the credential store and renewal gate are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
    renewal: Arc<RenewalGate>,
    auth_events: mpsc::Sender<AuthEvent>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Arc<CredentialStore>,
        auth_events: mpsc::Sender<AuthEvent>,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            credentials,
            renewal: Arc::new(RenewalGate::new()),
            auth_events,
        })
    }

    // ===== Public (unauthenticated) endpoints =====

    /// Register a new account. Conflicts surface the server's detail text.
    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "username": username,
            "email": email,
            "password": password,
        });
        let response = self.send_public(Method::POST, "/auth/signup", &body).await?;
        Self::check_response(response).await?;
        Ok(())
    }

    /// Exchange username/password for an access/renewal token pair.
    pub async fn request_token(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Credential, ApiError> {
        let body = serde_json::json!({
            "username": username,
            "password": password,
        });
        let response = self.send_public(Method::POST, "/auth/token", &body).await?;
        let response = Self::check_response(response).await?;
        let token: TokenResponse = Self::parse_json(response).await?;
        Ok(Credential::new(token.access_token, token.refresh_token))
    }

    // ===== Protected endpoints =====

    pub async fn fetch_me(&self) -> Result<Identity, ApiError> {
        self.get_authed("/auth/me").await
    }

    pub async fn fetch_jobs(&self) -> Result<Vec<Job>, ApiError> {
        self.get_authed("/jobs/my").await
    }

    pub async fn fetch_notifications(&self) -> Result<Vec<Notification>, ApiError> {
        self.get_authed("/notifications").await
    }

    pub async fn submit_job(&self, input_text: &str) -> Result<Job, ApiError> {
        let body = serde_json::json!({ "input_text": input_text });
        self.post_authed("/jobs/submit", &body).await
    }

    /// Mark a notification read. The server treats re-marking an already-read
    /// notification as an idempotent success.
    pub async fn mark_notification_read(&self, id: i64) -> Result<(), ApiError> {
        let path = format!("/notifications/{}/read", id);
        let body = serde_json::json!({});
        let _: MessageResponse = self.post_authed(&path, &body).await?;
        Ok(())
    }

    /// Add credits to the account. Returns the server's new balance.
    pub async fn add_credits(&self, credits: i64) -> Result<i64, ApiError> {
        let body = serde_json::json!({ "credits": credits });
        let response: CreditsResponse = self.post_authed("/credits/add", &body).await?;
        Ok(response.credits)
    }

    // ===== Request plumbing =====

    async fn get_authed<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send_authed(Method::GET, path, None).await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response).await
    }

    async fn post_authed<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ApiError> {
        let response = self.send_authed(Method::POST, path, Some(body)).await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response).await
    }

    async fn send_public(
        &self,
        method: Method,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        Ok(self
            .client
            .request(method, &url)
            .json(body)
            .send()
            .await?)
    }

    /// Send a bearer-authenticated request, renewing the credential and
    /// retrying once on 401.
    ///
    /// Fails fast with `NotAuthenticated` (no network traffic) when the
    /// credential store is empty, e.g. after logout.
    async fn send_authed(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut retried = false;

        loop {
            // Snapshot the renewal generation before reading the token, so
            // the snapshot covers the credential this request actually sends.
            // A 401 then justifies renewing this generation at most once.
            let observed = self.renewal.generation();
            let token = self
                .credentials
                .access_token()
                .ok_or(ApiError::NotAuthenticated)?;

            let mut request = self.client.request(method.clone(), &url).bearer_auth(&token);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            if retried {
                warn!(url = %url, "Still unauthorized after credential renewal");
                self.signal_session_expired();
                return Err(ApiError::Unauthorized);
            }

            let Some(refresh_token) = self.credentials.refresh_token() else {
                debug!(url = %url, "Unauthorized and no renewal credential available");
                self.signal_session_expired();
                return Err(ApiError::Unauthorized);
            };

            let renewed = self
                .renewal
                .renew(observed, || self.exchange_refresh_token(refresh_token.clone()))
                .await;

            match renewed {
                Ok(outcome) => {
                    debug!(?outcome, url = %url, "Credential renewed, retrying request");
                    retried = true;
                }
                Err(e) => {
                    warn!(error = %e, "Credential renewal failed");
                    self.credentials.clear();
                    if let Err(e) = self.credentials.persist() {
                        warn!(error = %e, "Failed to persist cleared credential");
                    }
                    self.signal_session_expired();
                    return Err(ApiError::Unauthorized);
                }
            }
        }
    }

    /// Exchange the renewal credential for a fresh access token and store it.
    async fn exchange_refresh_token(&self, refresh_token: String) -> Result<(), ApiError> {
        let url = format!("{}/auth/refresh", self.base_url);
        let body = serde_json::json!({ "refresh_token": refresh_token });

        let response = self.client.post(&url).json(&body).send().await?;
        let response = Self::check_response(response).await?;
        let renewed: RefreshResponse = Self::parse_json(response).await?;

        self.credentials.set(renewed.access_token, Some(refresh_token));
        if let Err(e) = self.credentials.persist() {
            warn!(error = %e, "Failed to persist renewed credential");
        }
        debug!("Access credential renewed");
        Ok(())
    }

    /// Check if a response is successful, turning an error status and body
    /// into a typed `ApiError`.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// The transport never navigates; it only tells the session manager that
    /// the user must re-authenticate.
    fn signal_session_expired(&self) {
        if let Err(e) = self.auth_events.try_send(AuthEvent::SessionExpired) {
            debug!(error = %e, "Session-expired signal not delivered");
        }
    }
}
