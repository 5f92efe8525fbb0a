//! Durable persistence for the credential pair
//!
//! A [`TokenStore`] is a plain key/value surface: it never validates token
//! shape and never mutates itself. The session manager is its only writer.
//!
//! Two string entries are kept, `token` (access) and `refreshToken`
//! (refresh). Both are present or both are absent; a store holding only
//! one of them loads as absent.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{AuthError, Result};
use crate::types::CredentialPair;

/// Key of the access token entry
pub const ACCESS_TOKEN_KEY: &str = "token";
/// Key of the refresh token entry
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Persistence of the credential pair across process restarts
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Durably persist both values
    async fn save(&self, pair: &CredentialPair) -> Result<()>;

    /// Last saved pair, or `None` if never saved or cleared
    async fn load(&self) -> Result<Option<CredentialPair>>;

    /// Remove both values. Clearing an empty store succeeds.
    async fn clear(&self) -> Result<()>;
}

fn pair_from_entries(entries: &HashMap<String, String>) -> Option<CredentialPair> {
    match (
        entries.get(ACCESS_TOKEN_KEY),
        entries.get(REFRESH_TOKEN_KEY),
    ) {
        (Some(access), Some(refresh)) => Some(CredentialPair::new(access.clone(), refresh.clone())),
        (None, None) => None,
        _ => {
            warn!("Token store holds only one of the two credential entries; treating as absent");
            None
        }
    }
}

/// In-process store.
///
/// Clones share the same entries, so a process restart can be modelled by
/// building a fresh session manager over a clone of the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with an existing pair
    pub fn with_pair(pair: &CredentialPair) -> Self {
        let store = Self::new();
        store.write_pair(pair);
        store
    }

    /// Raw entry lookup, used by tests and diagnostics
    pub fn entry(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    /// Raw entry write, bypassing the pair invariant
    pub fn set_entry(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn write_pair(&self, pair: &CredentialPair) {
        let mut entries = self.entries.lock();
        entries.insert(ACCESS_TOKEN_KEY.to_string(), pair.access_token.clone());
        entries.insert(REFRESH_TOKEN_KEY.to_string(), pair.refresh_token.clone());
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn save(&self, pair: &CredentialPair) -> Result<()> {
        self.write_pair(pair);
        Ok(())
    }

    async fn load(&self) -> Result<Option<CredentialPair>> {
        Ok(pair_from_entries(&self.entries.lock()))
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.remove(ACCESS_TOKEN_KEY);
        entries.remove(REFRESH_TOKEN_KEY);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredEntries {
    #[serde(rename = "token", skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(rename = "refreshToken", skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

/// JSON file on local disk.
///
/// Writes go to a sibling temp file that is then renamed over the target,
/// so a crash mid-write leaves the previous pair intact.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn save(&self, pair: &CredentialPair) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let stored = StoredEntries {
            access_token: Some(pair.access_token.clone()),
            refresh_token: Some(pair.refresh_token.clone()),
        };
        let body = serde_json::to_vec_pretty(&stored)
            .map_err(|e| AuthError::Storage(format!("Failed to encode session file: {}", e)))?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, body).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!("Persisted credential pair to {}", self.path.display());
        Ok(())
    }

    async fn load(&self) -> Result<Option<CredentialPair>> {
        let body = match tokio::fs::read(&self.path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let stored: StoredEntries = match serde_json::from_slice(&body) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Ignoring unreadable session file {}: {}", self.path.display(), e);
                return Ok(None);
            }
        };

        let mut entries = HashMap::new();
        if let Some(access) = stored.access_token {
            entries.insert(ACCESS_TOKEN_KEY.to_string(), access);
        }
        if let Some(refresh) = stored.refresh_token {
            entries.insert(REFRESH_TOKEN_KEY.to_string(), refresh);
        }
        Ok(pair_from_entries(&entries))
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Removed session file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
