// Session state module
//
// SessionState is the composition root of one capture-and-analysis session. It owns
// the current image, the camera, the orchestrator and the feedback collector, and
// emits change events so a display layer never has to poll.

use crate::models::{
    AnalysisResult, ClientConfig, Detection, ImageOrigin, ImageSource, NO_DETECTIONS_LABEL,
};
use crate::services::notify::messages;
use crate::services::{
    AnalysisOrchestrator, BlobStore, CameraController, CameraState, CaptureDevice,
    FeedbackCollector, InferenceClient, Notifier, NotifyLevel,
};
use crate::{Result, VisionError};
use bytes::Bytes;
use camino::Utf8Path;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when the session moves
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// A new image replaced the previous one
    ImageSelected { origin: ImageOrigin },

    /// The current image and result were dropped
    ImageCleared,

    /// The camera moved to a new lifecycle state
    CameraStateChanged { state: CameraState },

    /// A `/predict` request was sent
    AnalysisStarted,

    /// A result was installed
    AnalysisCompleted { detections: Vec<Detection> },

    /// The analysis failed; the previous result, if any, is still installed
    AnalysisFailed { message: String },

    /// A feedback interaction was opened for the given disputed label
    FeedbackOpened { incorrect_label: String },

    /// The feedback interaction was dismissed or completed
    FeedbackClosed,

    /// A correction was accepted by the service
    FeedbackSubmitted,
}

/// Observable session fields
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    pub image: Option<ImageSource>,
    pub camera_state: CameraState,
    /// Disputed label of the open feedback interaction
    pub feedback_label: Option<String>,
}

impl SessionData {
    pub fn is_camera_open(&self) -> bool {
        self.camera_state != CameraState::Idle
    }

    pub fn is_feedback_open(&self) -> bool {
        self.feedback_label.is_some()
    }
}

/// Composition root for one capture-and-analysis session
///
/// - Holds the current [`ImageSource`] and reconciles every transition (new upload,
///   new capture, clear) with the orchestrator and the feedback collector
/// - Converts service failures into notifications plus a resettable state
/// - Emits [`SessionEvent`]s through a tokio broadcast channel
///
/// All operations take `&self`; the session can be shared behind an `Arc`.
pub struct SessionState {
    data: Arc<RwLock<SessionData>>,
    camera: CameraController,
    orchestrator: AnalysisOrchestrator,
    feedback: FeedbackCollector,
    notifier: Arc<dyn Notifier>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionState {
    /// Build a session from configuration
    pub fn new(
        config: &ClientConfig,
        device: Arc<dyn CaptureDevice>,
        notifier: Arc<dyn Notifier>,
    ) -> anyhow::Result<Self> {
        let client = InferenceClient::new(&config.api)?;
        let camera = CameraController::new(device, &config.camera);
        Ok(Self::from_parts(camera, client, notifier))
    }

    /// Build a session around already constructed services
    pub fn from_parts(
        camera: CameraController,
        client: InferenceClient,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            data: Arc::new(RwLock::new(SessionData::default())),
            camera,
            orchestrator: AnalysisOrchestrator::new(client.clone(), BlobStore::new()),
            feedback: FeedbackCollector::new(client),
            notifier,
            event_tx,
        }
    }

    /// Clone of the observable fields
    pub fn snapshot(&self) -> SessionData {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn current_image(&self) -> Option<ImageSource> {
        self.snapshot().image
    }

    pub fn current_result(&self) -> Option<AnalysisResult> {
        self.orchestrator.current_result()
    }

    pub fn orchestrator(&self) -> &AnalysisOrchestrator {
        &self.orchestrator
    }

    /// The feedback collector, for editing the open draft
    pub fn feedback(&self) -> &FeedbackCollector {
        &self.feedback
    }

    /// Resolve the current annotated image
    pub fn annotated_image(&self) -> Option<Bytes> {
        let result = self.current_result()?;
        self.orchestrator
            .blob_store()
            .resolve(result.annotated_image())
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Apply a mutation to the observable fields and emit the resulting events
    fn update<F>(&self, update_fn: F) -> Vec<SessionEvent>
    where
        F: FnOnce(&mut SessionData),
    {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let old = data.clone();

        update_fn(&mut data);

        let changes = detect_changes(&old, &data);
        for change in &changes {
            self.emit(change.clone());
        }

        changes
    }

    // Image selection

    /// Install a new image, dropping the previous result and any open feedback
    pub fn select_image(&self, image: ImageSource) -> Vec<SessionEvent> {
        self.orchestrator.clear();
        self.feedback.close();

        tracing::info!("Selected {:?} image ({} bytes)", image.origin(), image.len());
        self.update(|data| {
            data.image = Some(image);
            data.feedback_label = None;
        })
    }

    /// Install an uploaded file. Non-image files are ignored and yield `false`.
    pub fn select_upload(
        &self,
        file_name: impl Into<String>,
        declared_type: &str,
        bytes: impl Into<Bytes>,
    ) -> bool {
        match ImageSource::from_upload(file_name, declared_type, bytes) {
            Some(image) => {
                self.select_image(image);
                true
            }
            None => false,
        }
    }

    /// Read and install an image file from disk
    pub async fn select_path(&self, path: &Utf8Path) -> Result<bool> {
        match ImageSource::from_path(path).await? {
            Some(image) => {
                self.select_image(image);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop the current image and result
    pub fn clear(&self) -> Vec<SessionEvent> {
        self.orchestrator.clear();
        self.feedback.close();

        self.update(|data| {
            data.image = None;
            data.feedback_label = None;
        })
    }

    // Camera

    fn sync_camera_state(&self) {
        let state = self.camera.state();
        self.update(|data| data.camera_state = state);
    }

    /// Acquire the camera stream.
    ///
    /// Fails with `StaleResponse`, without a notification, when the camera was closed
    /// before the device answered.
    pub async fn open_camera(&self) -> Result<()> {
        if !self.camera.is_streaming() {
            self.update(|data| data.camera_state = CameraState::Opening);
        }

        let result = self.camera.open().await;
        self.sync_camera_state();

        match &result {
            Err(VisionError::StaleResponse) => {
                tracing::debug!("Camera closed before the device answered");
            }
            Err(e) => match self.camera.state() {
                CameraState::Error(cause) => self.notifier.notify(NotifyLevel::Error, &cause),
                _ => tracing::error!("{}", e),
            },
            Ok(()) => {}
        }
        result
    }

    /// Release the camera. Never waits for a pending `open_camera`.
    pub fn close_camera(&self) {
        self.camera.close();
        self.sync_camera_state();
    }

    /// Snapshot the live stream, close the camera and install the frame
    pub fn capture_from_camera(&self) -> Result<ImageSource> {
        let snapshot = self.camera.snapshot();

        match &snapshot {
            Ok(_) => self.camera.close(),
            Err(e) if e.is_contract_violation() => tracing::error!("{}", e),
            Err(e) => self.notifier.notify(NotifyLevel::Error, &e.to_string()),
        }
        self.sync_camera_state();

        let image = snapshot?;
        self.select_image(image.clone());
        Ok(image)
    }

    // Analysis

    /// Analyze the current image and install the result
    pub async fn analyze(&self) -> Result<AnalysisResult> {
        let Some(image) = self.current_image() else {
            let err = VisionError::invalid_state("analyze", "no image is selected");
            tracing::error!("{}", err);
            return Err(err);
        };

        if self.orchestrator.is_analyzing() {
            let err = VisionError::invalid_state("analyze", self.orchestrator.phase());
            tracing::error!("{}", err);
            return Err(err);
        }

        self.notifier.notify(NotifyLevel::Info, messages::ANALYZING);
        self.emit(SessionEvent::AnalysisStarted);

        match self.orchestrator.analyze(&image).await {
            Ok(result) => {
                self.notifier
                    .notify(NotifyLevel::Success, messages::ANALYSIS_COMPLETED);
                self.emit(SessionEvent::AnalysisCompleted {
                    detections: result.detections().to_vec(),
                });
                Ok(result)
            }
            Err(VisionError::StaleResponse) => {
                tracing::debug!("Analysis result arrived after the session moved on");
                Err(VisionError::StaleResponse)
            }
            Err(e) if e.is_contract_violation() => Err(e),
            Err(e) => {
                self.notifier
                    .notify(NotifyLevel::Error, messages::ANALYSIS_FAILED);
                self.emit(SessionEvent::AnalysisFailed {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    // Feedback

    /// Open a correction for the current image.
    ///
    /// The disputed label is the comma-joined detections of the current result, or
    /// `"No objects detected"` when there is none.
    pub fn open_feedback(&self) -> Result<String> {
        let Some(image) = self.current_image() else {
            let err = VisionError::invalid_state("open feedback", "no image is selected");
            tracing::error!("{}", err);
            return Err(err);
        };

        let label = self
            .current_result()
            .map(|result| result.disputed_label())
            .unwrap_or_else(|| NO_DETECTIONS_LABEL.to_string());

        self.open_feedback_for(image, label.clone());
        Ok(label)
    }

    /// Open a correction for the current image with an explicit disputed label
    pub fn open_feedback_with_label(&self, disputed_label: impl Into<String>) -> Result<()> {
        let Some(image) = self.current_image() else {
            let err = VisionError::invalid_state("open feedback", "no image is selected");
            tracing::error!("{}", err);
            return Err(err);
        };

        self.open_feedback_for(image, disputed_label.into());
        Ok(())
    }

    fn open_feedback_for(&self, image: ImageSource, label: String) {
        self.feedback.open(label.clone(), image);
        self.update(|data| data.feedback_label = Some(label));
    }

    pub fn close_feedback(&self) {
        self.feedback.close();
        self.update(|data| data.feedback_label = None);
    }

    /// Validate and submit the open feedback draft
    pub async fn submit_feedback(&self) -> Result<()> {
        let record = self.feedback.record().inspect_err(|e| {
            tracing::error!("{}", e);
        })?;

        if let Err(e) = record.validate() {
            if let VisionError::Validation(message) = &e {
                self.notifier.notify(NotifyLevel::Error, message);
            }
            return Err(e);
        }

        self.notifier
            .notify(NotifyLevel::Info, messages::SUBMITTING_FEEDBACK);

        match self.feedback.submit(record).await {
            Ok(()) => {
                self.notifier
                    .notify(NotifyLevel::Success, messages::FEEDBACK_THANKS);
                self.update(|data| data.feedback_label = None);
                self.emit(SessionEvent::FeedbackSubmitted);
                Ok(())
            }
            Err(VisionError::StaleResponse) => {
                tracing::debug!("Feedback response arrived after the interaction changed");
                Err(VisionError::StaleResponse)
            }
            Err(e) => {
                self.notifier
                    .notify(NotifyLevel::Error, messages::FEEDBACK_FAILED);
                Err(e)
            }
        }
    }

    /// Release everything the session holds: camera stream, annotated handle, feedback
    pub fn teardown(&self) {
        self.close_camera();
        self.clear();
        tracing::debug!(
            "Session torn down, {} live blob handles",
            self.orchestrator.blob_store().live_count()
        );
    }
}

/// Work out which events a change of the observable fields produces
fn detect_changes(old: &SessionData, new: &SessionData) -> Vec<SessionEvent> {
    let mut changes = Vec::new();

    let image_changed = match (&old.image, &new.image) {
        (Some(a), Some(b)) => !a.same_as(b),
        (None, None) => false,
        _ => true,
    };
    if image_changed {
        changes.push(match &new.image {
            Some(image) => SessionEvent::ImageSelected {
                origin: image.origin().clone(),
            },
            None => SessionEvent::ImageCleared,
        });
    }

    if old.camera_state != new.camera_state {
        changes.push(SessionEvent::CameraStateChanged {
            state: new.camera_state.clone(),
        });
    }

    if old.feedback_label != new.feedback_label {
        changes.push(match &new.feedback_label {
            Some(label) => SessionEvent::FeedbackOpened {
                incorrect_label: label.clone(),
            },
            None => SessionEvent::FeedbackClosed,
        });
    }

    changes
}
