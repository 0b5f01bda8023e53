//! Services module - capture, analysis and feedback orchestration.
//!
//! The services hold the business logic of the client and have no dependencies on any
//! display layer. The device and the notification sink are reached through traits so
//! every service can be driven from tests.
//!
//! # Components
//!
//! - [`CameraController`]: camera lifecycle state machine over a [`CaptureDevice`]:
//!   - `Idle -> Opening -> Streaming`, `Error` on rejection, `Idle` again on close
//!   - Still-frame snapshots encoded as JPEG
//!
//! - [`InferenceClient`]: the HTTP wire contract for `/predict` and `/feedback`,
//!   including the JSON metadata header that travels next to the annotated image.
//!
//! - [`AnalysisOrchestrator`]: one analysis in flight at a time, stale-response
//!   discard, and revocation of superseded annotated-image handles.
//!
//! - [`FeedbackCollector`]: draft, validate and submit a correction.
//!
//! - [`BlobStore`]: revocable handles the display layer resolves annotated images through.
//!
//! - [`Notifier`]: short user-facing messages; [`TracingNotifier`] logs them.
//!
//! # Usage Example
//!
//! ```ignore
//! use vision_insight::services::{AnalysisOrchestrator, BlobStore, InferenceClient};
//!
//! let client = InferenceClient::new(&config.api)?;
//! let orchestrator = AnalysisOrchestrator::new(client, BlobStore::new());
//!
//! let result = orchestrator.analyze(&image).await?;
//! for detection in result.detections() {
//!     println!("{} ({:.2})", detection.label, detection.confidence);
//! }
//! ```

pub mod analysis;
pub mod blob;
pub mod camera;
pub mod feedback;
pub mod inference;
pub mod notify;

pub use analysis::{AnalysisOrchestrator, AnalysisPhase};
pub use blob::{BlobHandle, BlobStore};
pub use camera::{
    CameraController, CameraState, CaptureDevice, DeviceError, MediaStream, NoCaptureDevice,
    StreamConstraints, encode_jpeg,
};
pub use feedback::{FeedbackCollector, FeedbackPhase};
pub use inference::{InferenceClient, PredictResponse};
pub use notify::{Notifier, NotifyLevel, TracingNotifier};
