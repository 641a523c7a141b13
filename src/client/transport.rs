use async_trait::async_trait;
use bytes::Bytes;
use crate::core::{RemoteDescriptor, Result};
use crate::progress::ProgressCallback;

/// Which upload endpoint and multipart field a payload targets.
///
/// Profile images go to the profile-specific endpoint (optionally scoped to
/// another user's id for admin on-behalf-of uploads) under the
/// `profileImage` field; everything else goes to the generic
/// `/api/upload/image/{type}` endpoint under `image`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageKind {
    Profile { target_user_id: Option<String> },
    Other(String),
}

impl ImageKind {
    pub fn from_config(image_type: &str, target_user_id: Option<String>) -> Self {
        if image_type.eq_ignore_ascii_case("profile") {
            ImageKind::Profile { target_user_id }
        } else {
            ImageKind::Other(image_type.to_string())
        }
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            ImageKind::Profile { .. } => "profileImage",
            ImageKind::Other(_) => "image",
        }
    }
}

/// One multipart POST worth of work.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub mime: String,
    pub bytes: Bytes,
    pub kind: ImageKind,
}

/// Seam between the slot state machine and the network. The production
/// implementation is [`HttpTransport`](super::HttpTransport); tests inject
/// in-process mocks.
#[async_trait]
pub trait ImageTransport: Send + Sync {
    async fn upload(
        &self,
        request: UploadRequest,
        progress: Option<ProgressCallback>,
    ) -> Result<RemoteDescriptor>;

    /// Best-effort removal of a stored image by its public id.
    async fn delete(&self, public_id: &str) -> Result<()>;
}
