use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client configuration from vision-insight.yaml
///
/// Every section falls back to its defaults when missing from the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub camera: CameraSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Where and how to reach the inference service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Response header carrying the JSON detection metadata
    #[serde(default = "default_metadata_header")]
    pub metadata_header: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            metadata_header: default_metadata_header(),
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Which physical camera to prefer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Rear camera
    #[default]
    Environment,
    /// Front (selfie) camera
    User,
}

/// Requested stream constraints and snapshot encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    #[serde(default = "default_camera_width")]
    pub width: u32,

    #[serde(default = "default_camera_height")]
    pub height: u32,

    #[serde(default)]
    pub facing: FacingMode,

    /// JPEG quality for snapshots, 1-100
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: default_camera_width(),
            height: default_camera_height(),
            facing: FacingMode::default(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_console")]
    pub console: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            debug: false,
            console: default_console(),
        }
    }
}

impl ClientConfig {
    /// Reject values the services cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            bail!("api.base_url must not be empty");
        }
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            bail!("api.base_url must be an http(s) URL: {}", self.api.base_url);
        }
        if self.api.timeout_ms == 0 {
            bail!("api.timeout_ms must be greater than zero");
        }
        if self.api.metadata_header.trim().is_empty() {
            bail!("api.metadata_header must not be empty");
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            bail!(
                "camera resolution must be non-zero, got {}x{}",
                self.camera.width,
                self.camera.height
            );
        }
        if !(1..=100).contains(&self.camera.jpeg_quality) {
            bail!(
                "camera.jpeg_quality must be within 1-100, got {}",
                self.camera.jpeg_quality
            );
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_metadata_header() -> String {
    "X-Json-Data".to_string()
}

fn default_camera_width() -> u32 {
    1280
}

fn default_camera_height() -> u32 {
    720
}

fn default_jpeg_quality() -> u8 {
    90
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_console() -> bool {
    true
}
