use std::path::Path;
use anyhow::Context;
use serde::Deserialize;

/// Default cap for profile images.
pub const DEFAULT_MAX_SIZE: u64 = 5 * 1024 * 1024;

/// Per-slot behavior, supplied by the owning form.
#[derive(Debug, Clone)]
pub struct SlotConfig {
    /// Accepted MIME types; anything else fails validation immediately.
    pub accepted_types: Vec<String>,
    /// Maximum accepted size in bytes.
    pub max_size: u64,
    /// Human-facing field label.
    pub label: String,
    /// Whether the owning form treats the image as mandatory.
    pub required: bool,
    /// Endpoint discriminant; `"profile"` selects the profile endpoint.
    pub image_type: String,
    /// Upload right after the preview is ready, or wait for `upload()`.
    pub auto_upload: bool,
    /// Upload on behalf of another user (profile images only).
    pub target_user_id: Option<String>,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            accepted_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
            ],
            max_size: DEFAULT_MAX_SIZE,
            label: "Image".to_string(),
            required: false,
            image_type: "profile".to_string(),
            auto_upload: true,
            target_user_id: None,
        }
    }
}

impl SlotConfig {
    /// Parse the comma-joined MIME list the original components took
    /// (`"image/jpeg,image/png"`).
    pub fn parse_accepted_types(list: &str) -> Vec<String> {
        list.split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Demo binary configuration, read from `config.toml`.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub client: ClientConfig,
    pub file_path: String,
    #[serde(default = "default_image_type")]
    pub image_type: String,
    pub target_user_id: Option<String>,
}

fn default_image_type() -> String {
    "profile".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config file: {}", path.display()))
    }
}
