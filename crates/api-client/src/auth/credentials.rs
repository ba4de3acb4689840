//! Durable storage for the access/refresh token pair.
//!
//! The store is the single owner of credentials: only the refresh coordinator
//! and the explicit login/logout paths write to it, everything else reads
//! through the [`CredentialStore`] interface. Each token carries its own
//! absolute wall-clock expiry, mirroring cookie semantics: an expired access
//! token reads as absent while a still-valid refresh token remains usable.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::time::{Clock, expiry_from};

/// The token pair handed out by login, registration and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    /// Extract a pair from a (already envelope-unwrapped) response body.
    pub(crate) fn from_body(body: &serde_json::Value) -> Option<Self> {
        let access_token = body.get("access_token")?.as_str()?;
        let refresh_token = body.get("refresh_token")?.as_str()?;
        Some(Self {
            access_token: access_token.to_owned(),
            refresh_token: refresh_token.to_owned(),
        })
    }
}

#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("credential storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persisted form: each side of the pair has an absolute expiry stamp, not a
/// TTL counted from use.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedCredentials {
    access_token: String,
    access_expires_at: DateTime<Utc>,
    refresh_token: String,
    refresh_expires_at: DateTime<Utc>,
}

impl PersistedCredentials {
    fn stamped(
        pair: &TokenPair,
        now: DateTime<Utc>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_token: pair.access_token.clone(),
            access_expires_at: expiry_from(now, access_ttl),
            refresh_token: pair.refresh_token.clone(),
            refresh_expires_at: expiry_from(now, refresh_ttl),
        }
    }

    fn live_access(&self, now: DateTime<Utc>) -> Option<String> {
        (now < self.access_expires_at).then(|| self.access_token.clone())
    }

    fn live_refresh(&self, now: DateTime<Utc>) -> Option<String> {
        (now < self.refresh_expires_at).then(|| self.refresh_token.clone())
    }
}

/// Single owner of the credential pair.
///
/// The storage mechanism behind this interface is swappable per platform
/// (plain file, encrypted store, keychain); no other component may touch the
/// mechanism directly. Last-writer-wins is acceptable: the only writers are
/// the refresh coordinator and explicit login/logout.
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    /// The access token, if present and not past its expiry.
    fn access_token(&self) -> Option<String>;

    /// The refresh token, if present and not past its expiry.
    fn refresh_token(&self) -> Option<String>;

    /// Replace the stored pair wholesale, stamping fresh absolute expiries.
    fn set(
        &self,
        pair: &TokenPair,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<(), CredentialStoreError>;

    /// Drop the stored pair.
    fn clear(&self) -> Result<(), CredentialStoreError>;
}

/// In-memory store for tests and for platforms that bring their own
/// persistence. Same contract, nothing survives the process.
#[derive(Debug)]
pub struct MemoryCredentialStore {
    slot: RwLock<Option<PersistedCredentials>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCredentialStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: RwLock::new(None),
            clock,
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn access_token(&self) -> Option<String> {
        let now = self.clock.now();
        self.slot.read().as_ref()?.live_access(now)
    }

    fn refresh_token(&self) -> Option<String> {
        let now = self.clock.now();
        self.slot.read().as_ref()?.live_refresh(now)
    }

    fn set(
        &self,
        pair: &TokenPair,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<(), CredentialStoreError> {
        let stamped =
            PersistedCredentials::stamped(pair, self.clock.now(), access_ttl, refresh_ttl);
        *self.slot.write() = Some(stamped);
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialStoreError> {
        *self.slot.write() = None;
        Ok(())
    }
}

/// File-backed store: a small JSON document, written through on every change
/// so credentials survive process restarts.
///
/// Reads are served from an in-memory snapshot; a failed disk write leaves the
/// snapshot current so the running session keeps working.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    snapshot: RwLock<Option<PersistedCredentials>>,
    clock: Arc<dyn Clock>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        let path = path.into();
        let snapshot = RwLock::new(load_from_disk(&path));
        Self {
            path,
            snapshot,
            clock,
        }
    }

    fn write_to_disk(
        &self,
        credentials: &PersistedCredentials,
    ) -> Result<(), CredentialStoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_vec_pretty(credentials)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

fn load_from_disk(path: &Path) -> Option<PersistedCredentials> {
    let raw = std::fs::read(path).ok()?;
    match serde_json::from_slice(&raw) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unreadable credential file");
            None
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn access_token(&self) -> Option<String> {
        let now = self.clock.now();
        self.snapshot.read().as_ref()?.live_access(now)
    }

    fn refresh_token(&self) -> Option<String> {
        let now = self.clock.now();
        self.snapshot.read().as_ref()?.live_refresh(now)
    }

    fn set(
        &self,
        pair: &TokenPair,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<(), CredentialStoreError> {
        let stamped =
            PersistedCredentials::stamped(pair, self.clock.now(), access_ttl, refresh_ttl);
        // Snapshot first: a failed disk write must not lose the session.
        *self.snapshot.write() = Some(stamped.clone());
        self.write_to_disk(&stamped)?;
        debug!(path = %self.path.display(), "credentials persisted");
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialStoreError> {
        *self.snapshot.write() = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
