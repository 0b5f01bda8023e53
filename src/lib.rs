// Vision Insight - capture, analyze and correct object detections
//
// This is the library crate containing the capture-and-analysis orchestration layer.
// The binary crate (main.rs) provides a command-line front end.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use error::{Result, VisionError};
pub use models::{AnalysisResult, ClientConfig, Detection, FeedbackRecord, ImageSource};
pub use state::{SessionEvent, SessionState};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
