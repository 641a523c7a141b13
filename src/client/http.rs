use std::sync::Arc;
use std::time::Duration;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;
use crate::config::ClientConfig;
use crate::core::{RemoteDescriptor, Result, UploadError};
use crate::progress::{ProgressCallback, ProgressStream, ProgressTracker};
use super::response::normalize_upload_response;
use super::transport::{ImageKind, ImageTransport, UploadRequest};

/// Body chunk size; small enough that progress events track the wire
/// closely, large enough to keep the stream overhead negligible.
const BODY_CHUNK_SIZE: usize = 64 * 1024;

/// reqwest-backed transport against the upload API.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        // Validate the base URL once at construction instead of on every call.
        Url::parse(&config.base_url)
            .map_err(|_| UploadError::internal(format!("Invalid base url: {}", config.base_url)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn upload_url(&self, kind: &ImageKind) -> String {
        match kind {
            ImageKind::Profile {
                target_user_id: Some(user_id),
            } => format!("{}/api/profile-image/upload/{}", self.base_url, user_id),
            ImageKind::Profile {
                target_user_id: None,
            } => format!("{}/api/profile-image/upload", self.base_url),
            ImageKind::Other(image_type) => {
                format!("{}/api/upload/image/{}", self.base_url, image_type)
            }
        }
    }

    fn delete_url(&self, public_id: &str) -> String {
        format!("{}/api/upload/image/{}", self.base_url, public_id)
    }
}

/// Split an in-memory payload into a chunk stream so the progress wrapper
/// sees bytes move instead of one opaque body.
fn chunk_stream(bytes: Bytes) -> futures::stream::Iter<std::vec::IntoIter<std::io::Result<Bytes>>> {
    let mut chunks = Vec::with_capacity(bytes.len() / BODY_CHUNK_SIZE + 1);
    let mut offset = 0;
    while offset < bytes.len() {
        let end = (offset + BODY_CHUNK_SIZE).min(bytes.len());
        chunks.push(Ok(bytes.slice(offset..end)));
        offset = end;
    }

    futures::stream::iter(chunks)
}

fn extract_message(payload: &Value) -> Option<String> {
    payload
        .get("message")
        .or_else(|| payload.get("error"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[async_trait::async_trait]
impl ImageTransport for HttpTransport {
    async fn upload(
        &self,
        request: UploadRequest,
        progress: Option<ProgressCallback>,
    ) -> Result<RemoteDescriptor> {
        let url = self.upload_url(&request.kind);
        let field_name = request.kind.field_name();
        let total_bytes = request.bytes.len() as u64;

        let body = match progress {
            Some(callback) => {
                let tracker = Arc::new(ProgressTracker::new(total_bytes).with_callback(callback));
                Body::wrap_stream(ProgressStream::new(chunk_stream(request.bytes), tracker))
            }
            None => Body::from(request.bytes),
        };

        let part = Part::stream_with_length(body, total_bytes)
            .file_name(request.filename.clone())
            .mime_str(&request.mime)?;
        let form = Form::new().part(field_name, part);

        debug!(%url, field_name, total_bytes, "starting multipart upload");

        let mut builder = self.client.post(&url).multipart(form);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        let payload: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(UploadError::server_error(
                status.as_u16(),
                extract_message(&payload).unwrap_or_default(),
            ));
        }

        if payload.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(UploadError::server_error(
                status.as_u16(),
                extract_message(&payload).unwrap_or_default(),
            ));
        }

        normalize_upload_response(&payload)
    }

    async fn delete(&self, public_id: &str) -> Result<()> {
        let url = self.delete_url(public_id);

        let mut builder = self.client.delete(&url);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();

        // Deleting an already-gone image is a success for our purposes.
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            let text = response.text().await.unwrap_or_default();
            let payload: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            warn!(%url, status = status.as_u16(), "remote delete failed");
            return Err(UploadError::server_error(
                status.as_u16(),
                extract_message(&payload)
                    .unwrap_or_else(|| format!("Failed to delete image {public_id}")),
            ));
        }

        Ok(())
    }
}
