use crate::models::ImageSource;
use crate::services::blob::BlobHandle;
use serde::{Deserialize, Serialize};

/// Disputed-label sentinel used when an analysis found nothing
pub const NO_DETECTIONS_LABEL: &str = "No objects detected";

/// One object reported by the inference service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// Passed through exactly as the server sent it
    pub confidence: f64,
}

/// Structured payload carried in the metadata response header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionMetadata {
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// Outcome of one successful analysis call.
///
/// Detections keep the server's order. The annotated image is exposed through a
/// [`BlobHandle`] owned by the [`AnalysisOrchestrator`](crate::services::AnalysisOrchestrator),
/// which revokes it when the result is superseded or cleared. Clones share the same handle.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    detections: Vec<Detection>,
    annotated_image: BlobHandle,
    source: ImageSource,
}

impl AnalysisResult {
    pub(crate) fn new(
        detections: Vec<Detection>,
        annotated_image: BlobHandle,
        source: ImageSource,
    ) -> Self {
        Self {
            detections,
            annotated_image,
            source,
        }
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn annotated_image(&self) -> &BlobHandle {
        &self.annotated_image
    }

    /// The image this result was produced from
    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn has_detections(&self) -> bool {
        !self.detections.is_empty()
    }

    /// Label string a correction would dispute.
    ///
    /// All detected labels joined with `", "`, or [`NO_DETECTIONS_LABEL`] when empty.
    pub fn disputed_label(&self) -> String {
        if self.detections.is_empty() {
            NO_DETECTIONS_LABEL.to_string()
        } else {
            self.detections
                .iter()
                .map(|d| d.label.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}
