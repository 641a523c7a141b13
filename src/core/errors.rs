use thiserror::Error;

/// Fallback string shown when a failure carries no server-provided message.
pub const GENERIC_UPLOAD_FAILURE: &str = "Failed to upload image. Please try again.";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("{0}")]
    Validation(String),

    #[error("Image optimization failed: {0}")]
    Optimization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error: status code {status_code}, message: {message}")]
    Server {
        status_code: u16,
        message: String,
    },

    #[error("Malformed upload response: {0}")]
    MalformedResponse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UploadError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status_code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The single string surfaced to the UI. Server messages pass through
    /// verbatim when present; transport-level failures collapse to a
    /// generic fallback.
    pub fn user_message(&self) -> String {
        match self {
            UploadError::Validation(msg) | UploadError::Optimization(msg) => msg.clone(),
            UploadError::Server { message, .. } if !message.is_empty() => message.clone(),
            UploadError::Server { .. }
            | UploadError::Http(_)
            | UploadError::Io(_)
            | UploadError::MalformedResponse(_) => GENERIC_UPLOAD_FAILURE.to_string(),
            UploadError::Internal(msg) => msg.clone(),
        }
    }
}

impl From<image::ImageError> for UploadError {
    fn from(err: image::ImageError) -> Self {
        UploadError::Optimization(err.to_string())
    }
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;
