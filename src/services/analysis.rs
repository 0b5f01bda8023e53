//! AnalysisOrchestrator - one `/predict` round trip at a time
//!
//! Owns the current [`AnalysisResult`] and its annotated-image handle. A new
//! successful analysis revokes the previous handle; [`clear`](AnalysisOrchestrator::clear)
//! revokes it and invalidates whatever request is still in flight.

use crate::models::{AnalysisResult, ImageSource};
use crate::services::blob::BlobStore;
use crate::services::inference::InferenceClient;
use crate::{Result, VisionError};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lifecycle of the most recent analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisPhase {
    #[default]
    Idle,
    Analyzing,
    Succeeded,
    Failed,
}

impl fmt::Display for AnalysisPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisPhase::Idle => f.write_str("idle"),
            AnalysisPhase::Analyzing => f.write_str("an analysis is in flight"),
            AnalysisPhase::Succeeded => f.write_str("analysis succeeded"),
            AnalysisPhase::Failed => f.write_str("analysis failed"),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    phase: AnalysisPhase,
    /// Bumped by every clear; responses from an older generation are discarded
    generation: u64,
    current: Option<AnalysisResult>,
}

/// Submits images for detection and manages the resulting handles.
///
/// Clones share state. The internal lock is never held across the network call.
#[derive(Debug, Clone)]
pub struct AnalysisOrchestrator {
    client: InferenceClient,
    blobs: BlobStore,
    inner: Arc<Mutex<Inner>>,
}

impl AnalysisOrchestrator {
    pub fn new(client: InferenceClient, blobs: BlobStore) -> Self {
        Self {
            client,
            blobs,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> AnalysisPhase {
        self.lock().phase
    }

    pub fn is_analyzing(&self) -> bool {
        self.phase() == AnalysisPhase::Analyzing
    }

    /// The installed result, if any. Failed analyses never replace it.
    pub fn current_result(&self) -> Option<AnalysisResult> {
        self.lock().current.clone()
    }

    /// Store the annotated-image handles are registered in
    pub fn blob_store(&self) -> &BlobStore {
        &self.blobs
    }

    /// Analyze one image.
    ///
    /// Fails with `InvalidState` while another analysis is in flight (no request is
    /// sent), with `AnalysisFailed` on transport errors and non-2xx statuses, and with
    /// `StaleResponse` when [`clear`](Self::clear) ran before the response arrived.
    pub async fn analyze(&self, image: &ImageSource) -> Result<AnalysisResult> {
        let generation = {
            let mut inner = self.lock();
            if inner.phase == AnalysisPhase::Analyzing {
                let err = VisionError::invalid_state("start an analysis", inner.phase);
                tracing::error!("{}", err);
                return Err(err);
            }
            inner.phase = AnalysisPhase::Analyzing;
            inner.generation
        };

        tracing::info!(
            "Analyzing {} image ({} bytes)",
            image.mime_type(),
            image.len()
        );

        let guard = AnalyzingGuard {
            inner: &self.inner,
            generation,
            armed: true,
        };
        let response = self.client.predict(image).await;
        guard.disarm();

        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::info!(
                "Discarding analysis response from generation {} (current {})",
                generation,
                inner.generation
            );
            return Err(VisionError::StaleResponse);
        }

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Analysis failed: {}", e);
                inner.phase = AnalysisPhase::Failed;
                return Err(e);
            }
        };

        if let Some(previous) = inner.current.take() {
            self.blobs.revoke(previous.annotated_image());
        }

        let handle = self
            .blobs
            .create(response.annotated_image, &response.content_type);
        let result = AnalysisResult::new(response.detections, handle, image.clone());

        inner.current = Some(result.clone());
        inner.phase = AnalysisPhase::Succeeded;

        tracing::info!(
            "Analysis completed with {} detections",
            result.detections().len()
        );
        Ok(result)
    }

    /// Drop the current result and discard any in-flight response
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.generation += 1;

        if let Some(previous) = inner.current.take() {
            self.blobs.revoke(previous.annotated_image());
            tracing::debug!("Cleared analysis result");
        }

        inner.phase = AnalysisPhase::Idle;
    }
}

/// Releases the single-flight slot when an `analyze` future is dropped mid-request
struct AnalyzingGuard<'a> {
    inner: &'a Mutex<Inner>,
    generation: u64,
    armed: bool,
}

impl AnalyzingGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AnalyzingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.generation == self.generation && inner.phase == AnalysisPhase::Analyzing {
            tracing::debug!("Analysis abandoned before the response arrived");
            inner.phase = AnalysisPhase::Idle;
        }
    }
}
