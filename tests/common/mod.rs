//! Shared test doubles: an in-process inference service, a fake camera and a
//! recording notifier.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::{Response, StatusCode, header};
use axum::routing::post;
use image::{Rgb, RgbImage};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vision_insight::models::{ApiSettings, CameraSettings};
use vision_insight::services::notify::{Notifier, NotifyLevel};
use vision_insight::services::{
    CameraController, CaptureDevice, DeviceError, InferenceClient, MediaStream, StreamConstraints,
};

pub const CAT_METADATA: &str = r#"{"detections": [{"label": "Cat", "confidence": 0.87}]}"#;
pub const ANNOTATED_BODY: &[u8] = b"annotated-jpeg-bytes";

// ---------------------------------------------------------------------------
// Inference service stand-in
// ---------------------------------------------------------------------------

/// How the stand-in answers one `/predict` call
#[derive(Debug, Clone)]
pub struct PredictReply {
    pub status: u16,
    pub metadata: Option<String>,
    pub body: Vec<u8>,
    pub delay: Duration,
}

impl PredictReply {
    pub fn ok(metadata: Option<&str>, body: &[u8]) -> Self {
        Self {
            status: 200,
            metadata: metadata.map(str::to_string),
            body: body.to_vec(),
            delay: Duration::ZERO,
        }
    }

    pub fn cat() -> Self {
        Self::ok(Some(CAT_METADATA), ANNOTATED_BODY)
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            metadata: None,
            body: serde_json::json!({ "error": message }).to_string().into_bytes(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// One multipart field as the service received it
#[derive(Debug, Clone, Default)]
pub struct ReceivedField {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct ServiceState {
    predict_replies: Mutex<VecDeque<PredictReply>>,
    feedback_status: Mutex<u16>,
    feedback_delay: Mutex<Duration>,
    predict_calls: AtomicUsize,
    feedback_calls: AtomicUsize,
    predict_requests: Mutex<Vec<HashMap<String, ReceivedField>>>,
    feedback_requests: Mutex<Vec<HashMap<String, ReceivedField>>>,
}

/// Handle to a running stand-in service
pub struct MockService {
    pub base_url: String,
    state: Arc<ServiceState>,
    _server: tokio::task::JoinHandle<()>,
}

impl MockService {
    /// Queue the reply for the next `/predict` call. With an empty queue the
    /// service answers with [`PredictReply::cat`].
    pub fn push_predict(&self, reply: PredictReply) {
        self.state.predict_replies.lock().unwrap().push_back(reply);
    }

    pub fn set_feedback_status(&self, status: u16) {
        *self.state.feedback_status.lock().unwrap() = status;
    }

    /// Hold every `/feedback` reply back for `delay`
    pub fn set_feedback_delay(&self, delay: Duration) {
        *self.state.feedback_delay.lock().unwrap() = delay;
    }

    pub fn predict_calls(&self) -> usize {
        self.state.predict_calls.load(Ordering::SeqCst)
    }

    pub fn feedback_calls(&self) -> usize {
        self.state.feedback_calls.load(Ordering::SeqCst)
    }

    pub fn predict_requests(&self) -> Vec<HashMap<String, ReceivedField>> {
        self.state.predict_requests.lock().unwrap().clone()
    }

    pub fn feedback_requests(&self) -> Vec<HashMap<String, ReceivedField>> {
        self.state.feedback_requests.lock().unwrap().clone()
    }

    pub fn api_settings(&self) -> ApiSettings {
        ApiSettings {
            base_url: self.base_url.clone(),
            timeout_ms: 5_000,
            ..ApiSettings::default()
        }
    }

    pub fn client(&self) -> InferenceClient {
        InferenceClient::new(&self.api_settings()).unwrap()
    }
}

async fn read_fields(mut multipart: Multipart) -> HashMap<String, ReceivedField> {
    let mut fields = HashMap::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        fields.insert(
            name,
            ReceivedField {
                file_name,
                content_type,
                data,
            },
        );
    }
    fields
}

async fn predict(State(state): State<Arc<ServiceState>>, multipart: Multipart) -> Response<Body> {
    let fields = read_fields(multipart).await;
    state.predict_calls.fetch_add(1, Ordering::SeqCst);
    state.predict_requests.lock().unwrap().push(fields);

    let reply = state
        .predict_replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(PredictReply::cat);

    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }

    let status = StatusCode::from_u16(reply.status).unwrap();
    let content_type = if status.is_success() {
        "image/jpeg"
    } else {
        "application/json"
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(metadata) = reply.metadata {
        builder = builder.header("X-Json-Data", metadata);
    }
    builder.body(Body::from(reply.body)).unwrap()
}

async fn feedback(State(state): State<Arc<ServiceState>>, multipart: Multipart) -> Response<Body> {
    let fields = read_fields(multipart).await;
    state.feedback_calls.fetch_add(1, Ordering::SeqCst);
    state.feedback_requests.lock().unwrap().push(fields);

    let delay = *state.feedback_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let status = StatusCode::from_u16(*state.feedback_status.lock().unwrap()).unwrap();
    let body = if status.is_success() {
        serde_json::json!({ "message": "Feedback received" })
    } else {
        serde_json::json!({ "error": "Feedback store unavailable" })
    };

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Spawn the stand-in on an ephemeral loopback port
pub async fn spawn_service() -> MockService {
    let state = Arc::new(ServiceState {
        feedback_status: Mutex::new(200),
        ..ServiceState::default()
    });

    let router = Router::new()
        .route("/predict", post(predict))
        .route("/feedback", post(feedback))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let server = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    MockService {
        base_url: format!("http://{}", addr),
        state,
        _server: server,
    }
}

/// Poll until `condition` holds, failing the test after two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "Timed out waiting for condition"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// Camera
// ---------------------------------------------------------------------------

/// Camera that counts acquisitions and stopped streams
#[derive(Default)]
pub struct FakeCamera {
    pub deny: AtomicBool,
    /// How long `acquire` negotiates before answering, like a pending permission prompt
    delay: Mutex<Duration>,
    acquired: AtomicUsize,
    stopped: Arc<AtomicUsize>,
}

impl FakeCamera {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn denying() -> Arc<Self> {
        let camera = Self::default();
        camera.deny.store(true, Ordering::SeqCst);
        Arc::new(camera)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        let camera = Self::default();
        camera.set_delay(delay);
        Arc::new(camera)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Streams handed out and not yet stopped
    pub fn live_streams(&self) -> usize {
        self.acquired() - self.stopped()
    }
}

#[async_trait]
impl CaptureDevice for FakeCamera {
    async fn acquire(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, DeviceError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.deny.load(Ordering::SeqCst) {
            return Err(DeviceError::PermissionDenied);
        }

        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            // Devices negotiate their own size; report a smaller native frame
            width: constraints.width / 10,
            height: constraints.height / 10,
            stopped: self.stopped.clone(),
            running: true,
        }))
    }
}

struct FakeStream {
    width: u32,
    height: u32,
    stopped: Arc<AtomicUsize>,
    running: bool,
}

impl MediaStream for FakeStream {
    fn grab_frame(&mut self) -> Result<RgbImage, DeviceError> {
        if !self.running {
            return Err(DeviceError::StreamEnded);
        }
        Ok(RgbImage::from_pixel(self.width, self.height, Rgb([10, 120, 40])))
    }

    fn stop_tracks(&mut self) {
        if self.running {
            self.running = false;
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub fn camera_controller(device: Arc<FakeCamera>) -> CameraController {
    CameraController::new(device, &CameraSettings::default())
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(NotifyLevel, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<(NotifyLevel, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn contains(&self, level: NotifyLevel, message: &str) -> bool {
        self.messages()
            .iter()
            .any(|(l, m)| *l == level && m == message)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) {
        self.messages.lock().unwrap().push((level, message.to_string()));
    }
}
