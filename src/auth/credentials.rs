use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::Credential;

/// Token file name in the storage directory
const TOKEN_FILE: &str = "access_token.json";

#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
}

/// Owns the single live credential for the process.
///
/// The transport, session manager, and renewal path all share one store via
/// `Arc`; setting a new credential atomically replaces the previous one.
/// Only the access token is persisted across restarts - the renewal token is
/// session-scoped, matching the server's single durable storage key.
pub struct CredentialStore {
    storage_dir: PathBuf,
    current: Mutex<Option<Credential>>,
}

impl CredentialStore {
    pub fn new(storage_dir: PathBuf) -> Self {
        Self {
            storage_dir,
            current: Mutex::new(None),
        }
    }

    /// Replace the live credential.
    pub fn set(&self, access_token: impl Into<String>, refresh_token: Option<String>) {
        let mut current = self.current.lock().expect("credential lock poisoned");
        *current = Some(Credential::new(access_token, refresh_token));
    }

    /// Drop the live credential. Does not touch the network.
    pub fn clear(&self) {
        let mut current = self.current.lock().expect("credential lock poisoned");
        *current = None;
    }

    pub fn current(&self) -> Option<Credential> {
        self.current.lock().expect("credential lock poisoned").clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.current
            .lock()
            .expect("credential lock poisoned")
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.current
            .lock()
            .expect("credential lock poisoned")
            .as_ref()
            .and_then(|c| c.refresh_token.clone())
    }

    /// Write the current access token to disk, or remove the file if the
    /// store is empty.
    pub fn persist(&self) -> Result<()> {
        let path = self.token_path();
        match self.current() {
            Some(credential) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let stored = StoredToken {
                    access_token: credential.access_token,
                };
                let contents = serde_json::to_string_pretty(&stored)?;
                std::fs::write(&path, contents).context("Failed to write token file")?;
            }
            None => {
                if path.exists() {
                    std::fs::remove_file(&path).context("Failed to remove token file")?;
                }
            }
        }
        Ok(())
    }

    /// Load a persisted access token. Returns false when none is stored,
    /// which resolves the session to Anonymous on startup.
    pub fn restore(&self) -> Result<bool> {
        let path = self.token_path();
        if !path.exists() {
            return Ok(false);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read token file")?;
        let stored: StoredToken =
            serde_json::from_str(&contents).context("Failed to parse token file")?;
        debug!("Restored persisted access token");
        self.set(stored.access_token, None);
        Ok(true)
    }

    fn token_path(&self) -> PathBuf {
        self.storage_dir.join(TOKEN_FILE)
    }
}
