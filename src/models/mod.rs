//! Data models for the vision-insight client.
//!
//! - [`ImageSource`]: normalized image bytes from an upload or a camera snapshot
//! - [`AnalysisResult`] / [`Detection`]: what one successful `/predict` call produced
//! - [`FeedbackRecord`] / [`FeedbackDraft`]: a correction being composed or submitted
//! - [`ClientConfig`]: settings loaded from `vision-insight.yaml`
//!
//! Images and results are immutable once built; session-level changes go through
//! [`SessionState`](crate::state::SessionState).

pub mod analysis;
pub mod config;
pub mod feedback;
pub mod image;

pub use analysis::{AnalysisResult, Detection, DetectionMetadata, NO_DETECTIONS_LABEL};
pub use config::{ApiSettings, CameraSettings, ClientConfig, FacingMode, LoggingSettings};
pub use feedback::{FeedbackDraft, FeedbackRecord};
pub use image::{ImageOrigin, ImageSource};
