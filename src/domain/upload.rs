//! Upload State Machine
//!
//! ```text
//! Selecting → Uploading → ExtractingCid → AwaitingReplication → Verifying → Succeeded
//!     │           │             │
//!     └───────────┴─────────────┴──────────────────────────────────────────→ Failed
//! ```
//!
//! An [`UploadAttempt`] lives only for the duration of one orchestration call.
//! The staged temp copy is owned by [`StagedUpload`] and removed when it drops,
//! whichever way the call exits.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;
use uuid::Uuid;

use super::types::{Cid, NodeId, PinRecord};
use crate::error::{Error, Result};

const DEFAULT_MIMETYPE: &str = "application/octet-stream";

// =============================================================================
// States
// =============================================================================

/// States of one upload orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UploadState {
    Selecting,
    Uploading,
    ExtractingCid,
    AwaitingReplication,
    Verifying,
    Succeeded,
    Failed,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Succeeded | UploadState::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: UploadState) -> bool {
        use UploadState::*;
        matches!(
            (self, next),
            (Selecting, Uploading)
                | (Uploading, ExtractingCid)
                | (ExtractingCid, AwaitingReplication)
                | (AwaitingReplication, Verifying)
                | (Verifying, Succeeded)
                | (Selecting | Uploading | ExtractingCid, Failed)
        )
    }
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadState::Selecting => write!(f, "SELECTING"),
            UploadState::Uploading => write!(f, "UPLOADING"),
            UploadState::ExtractingCid => write!(f, "EXTRACTING_CID"),
            UploadState::AwaitingReplication => write!(f, "AWAITING_REPLICATION"),
            UploadState::Verifying => write!(f, "VERIFYING"),
            UploadState::Succeeded => write!(f, "SUCCEEDED"),
            UploadState::Failed => write!(f, "FAILED"),
        }
    }
}

// =============================================================================
// Attempt
// =============================================================================

/// Transient record of one orchestration call.
#[derive(Debug, Clone)]
pub struct UploadAttempt {
    pub id: Uuid,
    pub name: String,
    pub target: Option<NodeId>,
    pub started_at: DateTime<Utc>,
    state: UploadState,
    failure: Option<String>,
}

impl UploadAttempt {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            target: None,
            started_at: Utc::now(),
            state: UploadState::Selecting,
            failure: None,
        }
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Move to the next state.
    pub fn advance(&mut self, next: UploadState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::Internal(format!(
                "illegal upload transition {} -> {}",
                self.state, next
            )));
        }
        debug!(attempt = %self.id, from = %self.state, to = %next, "Upload transition");
        self.state = next;
        Ok(())
    }

    /// Record a failure; terminal states are left untouched.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        let reason = reason.into();
        debug!(attempt = %self.id, from = %self.state, %reason, "Upload failed");
        self.state = UploadState::Failed;
        self.failure = Some(reason);
    }
}

// =============================================================================
// Request / Staging
// =============================================================================

/// Where the upload bytes come from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    Bytes(Bytes),
    Path(PathBuf),
}

/// A file to commit to the cluster.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub name: String,
    pub mimetype: String,
    pub source: UploadSource,
}

impl UploadRequest {
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let name = name.into();
        Self {
            mimetype: guess_mimetype(&name).to_string(),
            name,
            source: UploadSource::Bytes(data.into()),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Self {
            mimetype: guess_mimetype(&name).to_string(),
            name,
            source: UploadSource::Path(path),
        }
    }

    /// Rename the upload; the mimetype is re-guessed from the new name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.mimetype = guess_mimetype(&self.name).to_string();
        self
    }

    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = mimetype.into();
        self
    }
}

/// Temporary local copy of the upload bytes.
///
/// The backing file is deleted when this value is dropped.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    pub name: String,
    pub mimetype: String,
    pub size: u64,
}

impl StagedUpload {
    /// Copy the request bytes into a fresh temp file under `dir`.
    pub async fn stage(dir: &Path, request: &UploadRequest) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let staging_dir = dir.to_path_buf();
        let file = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix("pinfleet-upload-")
                .tempfile_in(staging_dir)
        })
        .await
        .map_err(|e| Error::Internal(format!("staging task failed: {}", e)))??;

        match &request.source {
            UploadSource::Bytes(data) => tokio::fs::write(file.path(), data).await?,
            UploadSource::Path(src) => {
                tokio::fs::copy(src, file.path()).await?;
            }
        }
        let size = tokio::fs::metadata(file.path()).await?.len();

        debug!(path = %file.path().display(), size, name = %request.name, "Staged upload");

        Ok(Self {
            file,
            name: request.name.clone(),
            mimetype: request.mimetype.clone(),
            size,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

// =============================================================================
// Result
// =============================================================================

/// Outcome of a successful upload orchestration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub cid: Cid,
    pub name: String,
    pub size: u64,
    pub mimetype: String,
    /// Best-effort; `None` when verification could not read a status
    pub pin_status: Option<PinRecord>,
    pub added_at: DateTime<Utc>,
    pub node: String,
}

/// Guess a mimetype from the file extension.
pub fn guess_mimetype(name: &str) -> &'static str {
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return DEFAULT_MIMETYPE,
    };
    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "json" => "application/json",
        "js" => "text/javascript",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        _ => DEFAULT_MIMETYPE,
    }
}
