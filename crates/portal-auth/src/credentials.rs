//! Durable credential storage
//!
//! Persists the current token pair, the decoded-claims cache and the selected
//! tenant to one JSON file. Writes use atomic temp-file + rename so a crash
//! mid-write leaves either the old or the new state on disk. A tokio Mutex
//! serializes writes; reads clone the in-memory copy.
//!
//! Storage failures never reach callers. An unreadable file loads as an empty
//! store and a failed write is logged; the in-memory copy stays authoritative
//! for the rest of the process, so the session keeps working until restart.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::claims::{Claims, Tenant};

/// Everything the store persists. Field names are the on-disk keys.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Cached projection of `access_token`'s claims.
    #[serde(rename = "user_payload", default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Claims>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_tenant: Option<Tenant>,
}

impl fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("claims", &self.claims)
            .field("selected_tenant", &self.selected_tenant)
            .finish()
    }
}

/// File-backed credential store.
pub struct CredentialStore {
    path: PathBuf,
    state: Mutex<StoredCredentials>,
}

impl CredentialStore {
    /// Open the store at `path`.
    ///
    /// A missing file is a cold start. An unreadable or corrupt file is
    /// logged and treated as empty: the user simply has to log in again.
    pub async fn open(path: PathBuf) -> Self {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<StoredCredentials>(&contents) {
                Ok(stored) => {
                    info!(
                        path = %path.display(),
                        has_access = stored.access_token.is_some(),
                        has_refresh = stored.refresh_token.is_some(),
                        "loaded stored credentials"
                    );
                    stored
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "credential file is corrupt, starting empty");
                    StoredCredentials::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "credential file not found, starting empty");
                StoredCredentials::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "credential file unreadable, starting empty");
                StoredCredentials::default()
            }
        };

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of everything stored.
    pub async fn load(&self) -> StoredCredentials {
        self.state.lock().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.state.lock().await.access_token.clone()
    }

    /// Replace the token pair and its claims cache in one write.
    ///
    /// The selected tenant is left alone; callers that change the tenant set
    /// follow up with `save_selected_tenant`.
    pub async fn save(&self, access_token: &str, refresh_token: &str, claims: &Claims) {
        let mut state = self.state.lock().await;
        state.access_token = Some(access_token.to_string());
        state.refresh_token = Some(refresh_token.to_string());
        state.claims = Some(claims.clone());
        debug!(subject = %claims.subject, "saved token pair");
        persist(&self.path, &state).await;
    }

    pub async fn save_selected_tenant(&self, tenant: Option<Tenant>) {
        let mut state = self.state.lock().await;
        if state.selected_tenant == tenant {
            return;
        }
        debug!(tenant = ?tenant.as_ref().map(|t| &t.id), "saved selected tenant");
        state.selected_tenant = tenant;
        persist(&self.path, &state).await;
    }

    /// Forget everything, in memory and on disk.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        *state = StoredCredentials::default();
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "removed credential file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove credential file"),
        }
    }
}

/// Write `state` to disk, logging instead of failing.
async fn persist(path: &Path, state: &StoredCredentials) {
    if let Err(e) = write_atomic(path, state).await {
        warn!(path = %path.display(), error = %e, "failed to persist credentials, keeping in-memory copy");
    }
}

/// Write credentials to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file holds bearer tokens.
async fn write_atomic(path: &Path, state: &StoredCredentials) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(state).map_err(std::io::Error::other)?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));
    tokio::fs::write(&tmp_path, json.as_bytes()).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    tokio::fs::rename(&tmp_path, path).await?;
    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
