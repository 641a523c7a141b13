use std::path::Path;
use std::sync::Arc;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use super::errors::{Result, UploadError};

/// Unique identifier for an image slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct SlotId(pub Uuid);

impl SlotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a single image selection.
///
/// Transitions are one-directional within a selection:
/// `Idle → Selected → (Optimizing →) Uploading → (Complete | Failed)`.
/// Selecting a new file resets to `Selected` from any state.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum UploadState {
    /// No file selected
    Idle,
    /// File accepted by validation, payload prepared
    Selected,
    /// Client-side resize/re-encode in progress
    Optimizing,
    /// Multipart POST in flight, with percent complete (0-100)
    Uploading(u8),
    /// Server confirmed; a remote descriptor exists
    Complete,
    /// Validation, optimization or transfer failed
    Failed(String),
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Complete | UploadState::Failed(_))
    }
}

/// The binary the caller picked, before any processing.
#[derive(Debug, Clone)]
pub struct ImageSource {
    pub filename: String,
    pub mime: String,
    pub bytes: Bytes,
}

impl ImageSource {
    pub fn new(filename: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Read a file from disk, guessing the MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| UploadError::internal(format!("Invalid file path: {}", path.display())))?
            .to_string();
        let mime = mime_for_extension(path.extension().and_then(|ext| ext.to_str()));
        let bytes = tokio::fs::read(path).await?;

        Ok(Self::new(filename, mime, bytes))
    }
}

fn mime_for_extension(ext: Option<&str>) -> String {
    let mime = match ext.map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    };
    mime.to_string()
}

/// The active payload for transmission.
///
/// Exactly one payload exists per selection. When optimization ran, the
/// optimized bytes replace the raw ones and `optimized` is set; the
/// original filename is kept either way.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub filename: String,
    pub mime: String,
    pub bytes: Bytes,
    pub optimized: bool,
    pub last_modified: DateTime<Utc>,
}

impl ImagePayload {
    /// Wrap a source unchanged (the ≤ 1 MiB pass-through path).
    pub fn passthrough(source: &ImageSource) -> Self {
        Self {
            filename: source.filename.clone(),
            mime: source.mime.clone(),
            bytes: source.bytes.clone(),
            optimized: false,
            last_modified: Utc::now(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Server-side identity of a stored image. Present iff the slot state is
/// `Complete`; `url` is always non-empty.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RemoteDescriptor {
    pub url: String,
    pub public_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Events emitted by a slot
#[derive(Debug, Clone)]
pub enum SlotEvent {
    /// State transition
    StateChanged {
        slot_id: SlotId,
        old: UploadState,
        new: UploadState,
    },
    /// Bytes moved on the wire
    Progress {
        slot_id: SlotId,
        percent: u8,
    },
    /// Local preview is available (data URI)
    PreviewReady {
        slot_id: SlotId,
        data_uri: String,
    },
    /// Upload confirmed by the server
    Completed {
        slot_id: SlotId,
        url: String,
    },
    /// Selection, optimization or transfer failed
    Failed {
        slot_id: SlotId,
        reason: String,
    },
    /// Image removed, slot back to Idle
    Removed {
        slot_id: SlotId,
    },
}

/// Snapshot handed to the owning form whenever the committed value changes:
/// on a non-auto-upload selection, and on removal (all fields `None`).
#[derive(Debug, Clone)]
pub struct SelectionChange {
    pub preview: Option<String>,
    pub remote: Option<RemoteDescriptor>,
    pub payload: Option<ImagePayload>,
}

impl SelectionChange {
    pub fn cleared() -> Self {
        Self {
            preview: None,
            remote: None,
            payload: None,
        }
    }
}

pub type SelectionCallback = Arc<dyn Fn(SelectionChange) + Send + Sync>;

const _: () = {
    fn assert_send<T: Send>() {}
    fn assert_types() {
        assert_send::<ImagePayload>();
        assert_send::<SlotEvent>();
        assert_send::<RemoteDescriptor>();
    }
};
