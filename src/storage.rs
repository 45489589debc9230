//! Secure terminal config storage using the OS credential store.
//!
//! On Windows this uses DPAPI (via the `keyring` crate), on macOS Keychain,
//! and on Linux the Secret Service API. The sync engine reads the order
//! service URL, API key, and terminal identity from here; nothing sensitive
//! lands in the SQLite file.

use keyring::Entry;
use tracing::{info, warn};

use crate::api;
use crate::error::SyncError;

const SERVICE_NAME: &str = "ordervault";

// Credential keys
const KEY_SERVICE_URL: &str = "order_service_url";
const KEY_API_KEY: &str = "pos_api_key";
const KEY_TERMINAL_ID: &str = "terminal_id";
const KEY_BRANCH_ID: &str = "branch_id";

/// All credential keys managed by this module.
const ALL_KEYS: &[&str] = &[KEY_SERVICE_URL, KEY_API_KEY, KEY_TERMINAL_ID, KEY_BRANCH_ID];

// ---------------------------------------------------------------------------
// Low-level helpers
// ---------------------------------------------------------------------------

/// Retrieve a single credential from the OS keyring. Returns `None` when the
/// entry does not exist (or the platform returns a "not found" error).
pub fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

/// Store a credential in the OS keyring.
pub fn set_credential(key: &str, value: &str) -> Result<(), SyncError> {
    let entry = Entry::new(SERVICE_NAME, key)
        .map_err(|e| SyncError::Storage(format!("keyring entry {key}: {e}")))?;
    entry
        .set_password(value)
        .map_err(|e| SyncError::Storage(format!("keyring write {key}: {e}")))?;
    Ok(())
}

/// Delete a credential from the OS keyring. Silently succeeds if the entry
/// does not exist.
pub fn delete_credential(key: &str) -> Result<(), SyncError> {
    let entry = Entry::new(SERVICE_NAME, key)
        .map_err(|e| SyncError::Storage(format!("keyring entry {key}: {e}")))?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(SyncError::Storage(format!("keyring delete {key}: {e}"))),
    }
}

// ---------------------------------------------------------------------------
// High-level API
// ---------------------------------------------------------------------------

/// Credentials required to talk to the order service.
#[derive(Debug, Clone)]
pub struct TerminalCredentials {
    pub service_url: String,
    pub api_key: String,
    pub terminal_id: String,
    pub branch_id: Option<String>,
}

/// The terminal is considered configured when service URL, terminal ID, and
/// API key are all present in the credential store.
pub fn is_configured() -> bool {
    get_credential(KEY_SERVICE_URL).is_some()
        && get_credential(KEY_TERMINAL_ID).is_some()
        && get_credential(KEY_API_KEY).is_some()
}

/// Load the full credential set, or `None` when any mandatory key is
/// missing.
pub fn load_credentials() -> Option<TerminalCredentials> {
    Some(TerminalCredentials {
        service_url: get_credential(KEY_SERVICE_URL)?,
        api_key: get_credential(KEY_API_KEY)?,
        terminal_id: get_credential(KEY_TERMINAL_ID)?,
        branch_id: get_credential(KEY_BRANCH_ID),
    })
}

/// Persist credentials received during onboarding.
pub fn save_credentials(creds: &TerminalCredentials) -> Result<(), SyncError> {
    set_credential(KEY_SERVICE_URL, &api::normalize_service_url(&creds.service_url))?;
    set_credential(KEY_API_KEY, creds.api_key.trim())?;
    set_credential(KEY_TERMINAL_ID, creds.terminal_id.trim())?;
    if let Some(branch_id) = creds.branch_id.as_deref() {
        set_credential(KEY_BRANCH_ID, branch_id)?;
    }
    info!(terminal_id = %creds.terminal_id, "terminal credentials updated");
    Ok(())
}

/// Configure the terminal from a pasted connection string (raw JSON or
/// url-safe base64 of `{ "url", "key", "tid" }`).
pub fn configure_from_connection_string(raw: &str) -> Result<TerminalCredentials, SyncError> {
    let service_url = api::extract_service_url_from_connection_string(raw)
        .ok_or(SyncError::NotConfigured)?;
    let api_key =
        api::extract_api_key_from_connection_string(raw).ok_or(SyncError::NotConfigured)?;
    let terminal_id =
        api::extract_terminal_id_from_connection_string(raw).ok_or(SyncError::NotConfigured)?;

    let creds = TerminalCredentials {
        service_url,
        api_key,
        terminal_id,
        branch_id: None,
    };
    save_credentials(&creds)?;
    Ok(creds)
}

/// Delete every stored credential (factory reset).
pub fn factory_reset() -> Result<(), SyncError> {
    info!("performing factory reset - deleting all credentials");
    for key in ALL_KEYS {
        delete_credential(key)?;
    }
    Ok(())
}
