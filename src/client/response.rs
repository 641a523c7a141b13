use serde_json::Value;
use crate::core::{RemoteDescriptor, Result, UploadError};

/// Collapse the two response shapes the upload API can return into one
/// descriptor. The flat shape is checked first:
///
/// ```json
/// { "success": true, "data": { "url": "...", "public_id": "...", "metadata": {} } }
/// ```
///
/// falling back to the legacy shape nested under `profileImage`:
///
/// ```json
/// { "success": true, "data": { "profileImage": { "url": "...", "metadata": { "publicId": "..." } } } }
/// ```
///
/// All shape ambiguity lives here; callers only ever see [`RemoteDescriptor`].
pub fn normalize_upload_response(payload: &Value) -> Result<RemoteDescriptor> {
    let data = match payload.get("data") {
        Some(data) if data.is_object() => data,
        _ => payload,
    };

    if let Some(descriptor) = from_flat(data) {
        return Ok(descriptor);
    }

    let nested = data
        .get("profileImage")
        .or_else(|| payload.get("profileImage"));
    if let Some(descriptor) = nested.and_then(from_nested) {
        return Ok(descriptor);
    }

    Err(UploadError::MalformedResponse(
        "no image url in upload response".to_string(),
    ))
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn from_flat(data: &Value) -> Option<RemoteDescriptor> {
    let url = non_empty_str(data.get("url"))?;
    let public_id = non_empty_str(data.get("public_id")).or_else(|| non_empty_str(data.get("publicId")));

    Some(RemoteDescriptor {
        url,
        public_id,
        metadata: data.get("metadata").cloned(),
    })
}

fn from_nested(profile_image: &Value) -> Option<RemoteDescriptor> {
    let url = non_empty_str(profile_image.get("url"))?;
    let metadata = profile_image.get("metadata");
    let public_id = metadata
        .and_then(|m| non_empty_str(m.get("publicId")).or_else(|| non_empty_str(m.get("public_id"))));

    Some(RemoteDescriptor {
        url,
        public_id,
        metadata: metadata.cloned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_shape_with_snake_case_id() {
        let payload = json!({
            "success": true,
            "data": { "url": "https://x/y.jpg", "public_id": "abc", "metadata": { "bytes": 123 } }
        });

        let descriptor = normalize_upload_response(&payload).unwrap();
        assert_eq!(descriptor.url, "https://x/y.jpg");
        assert_eq!(descriptor.public_id.as_deref(), Some("abc"));
        assert_eq!(descriptor.metadata, Some(json!({ "bytes": 123 })));
    }

    #[test]
    fn flat_shape_with_camel_case_id() {
        let payload = json!({
            "success": true,
            "data": { "url": "https://x/y.jpg", "publicId": "abc" }
        });

        let descriptor = normalize_upload_response(&payload).unwrap();
        assert_eq!(descriptor.public_id.as_deref(), Some("abc"));
    }

    #[test]
    fn nested_legacy_shape() {
        let payload = json!({
            "success": true,
            "data": {
                "profileImage": {
                    "url": "https://x/p.jpg",
                    "metadata": { "publicId": "pid-1" }
                }
            }
        });

        let descriptor = normalize_upload_response(&payload).unwrap();
        assert_eq!(descriptor.url, "https://x/p.jpg");
        assert_eq!(descriptor.public_id.as_deref(), Some("pid-1"));
    }

    #[test]
    fn nested_shape_at_top_level() {
        let payload = json!({
            "profileImage": { "url": "https://x/top.jpg", "metadata": {} }
        });

        let descriptor = normalize_upload_response(&payload).unwrap();
        assert_eq!(descriptor.url, "https://x/top.jpg");
        assert_eq!(descriptor.public_id, None);
    }

    #[test]
    fn flat_wins_when_both_shapes_present() {
        let payload = json!({
            "data": {
                "url": "https://x/flat.jpg",
                "public_id": "flat-id",
                "profileImage": { "url": "https://x/nested.jpg" }
            }
        });

        let descriptor = normalize_upload_response(&payload).unwrap();
        assert_eq!(descriptor.url, "https://x/flat.jpg");
    }

    #[test]
    fn missing_url_is_malformed() {
        let payload = json!({ "success": true, "data": { "public_id": "abc" } });
        let err = normalize_upload_response(&payload).unwrap_err();
        assert!(matches!(err, UploadError::MalformedResponse(_)));
    }

    #[test]
    fn empty_url_is_malformed() {
        let payload = json!({ "success": true, "data": { "url": "" } });
        assert!(normalize_upload_response(&payload).is_err());
    }
}
