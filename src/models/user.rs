use serde::{Deserialize, Serialize};

/// The authenticated user as reported by `/auth/me`.
///
/// Read-only from the client's perspective except for `credits`, which may be
/// overwritten optimistically after a successful credit purchase and is
/// reconciled on the next identity refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub credits: i64,
}

/// The access/renewal token pair issued by `/auth/token`.
///
/// The access token is short-lived; the renewal token (when issued) is
/// longer-lived and used only to exchange for a fresh access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}
