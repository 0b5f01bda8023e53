use crate::models::{CameraSettings, FacingMode, ImageSource};
use crate::{Result, VisionError};
use async_trait::async_trait;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Constraints requested from the capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
    pub facing: FacingMode,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self::from(&CameraSettings::default())
    }
}

impl From<&CameraSettings> for StreamConstraints {
    fn from(settings: &CameraSettings) -> Self {
        Self {
            width: settings.width,
            height: settings.height,
            facing: settings.facing,
        }
    }
}

/// Failures reported by the capture device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Camera access denied. Please check device permissions.")]
    PermissionDenied,

    #[error("No camera device found")]
    NotFound,

    #[error("Camera cannot satisfy the requested constraints: {0}")]
    ConstraintsUnsatisfiable(String),

    #[error("Camera stream ended")]
    StreamEnded,

    #[error("Camera error: {0}")]
    Other(String),
}

/// Device media-capture collaborator.
///
/// Implementations negotiate the actual stream with the platform; the requested
/// resolution is a preference, not a guarantee.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn acquire(
        &self,
        constraints: &StreamConstraints,
    ) -> std::result::Result<Box<dyn MediaStream>, DeviceError>;
}

/// Device for hosts without a camera; every acquisition fails with `NotFound`
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCaptureDevice;

#[async_trait]
impl CaptureDevice for NoCaptureDevice {
    async fn acquire(
        &self,
        _constraints: &StreamConstraints,
    ) -> std::result::Result<Box<dyn MediaStream>, DeviceError> {
        Err(DeviceError::NotFound)
    }
}

/// A live video stream handed out by a [`CaptureDevice`]
#[cfg_attr(test, mockall::automock)]
pub trait MediaStream: Send {
    /// Current frame at the stream's native pixel dimensions
    fn grab_frame(&mut self) -> std::result::Result<RgbImage, DeviceError>;

    /// Stop every track of the stream
    fn stop_tracks(&mut self);
}

/// Camera lifecycle.
///
/// `Idle -> Opening -> Streaming`, `Opening -> Error`, and any state back to `Idle`
/// through [`CameraController::close`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CameraState {
    #[default]
    Idle,
    Opening,
    Streaming,
    Error(String),
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraState::Idle => f.write_str("camera is idle"),
            CameraState::Opening => f.write_str("camera is opening"),
            CameraState::Streaming => f.write_str("camera is streaming"),
            CameraState::Error(cause) => write!(f, "camera failed: {}", cause),
        }
    }
}

#[derive(Default)]
struct Inner {
    state: CameraState,
    stream: Option<Box<dyn MediaStream>>,
    /// Bumped by every open and close; an acquisition from an older attempt is discarded
    attempt: u64,
}

impl Inner {
    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop_tracks();
            tracing::info!("Camera stream stopped");
        }

        if self.state != CameraState::Idle {
            tracing::debug!("Camera closed ({})", self.state);
            self.state = CameraState::Idle;
        }
    }
}

/// Owns at most one open capture session.
///
/// The stream is released by [`close`](Self::close), which every exit path of the
/// capture view must call. Dropping a controller that still holds a stream stops it
/// as well and logs a warning.
///
/// The internal lock is never held while the device negotiates a stream, so `close`
/// returns immediately even while an `open` is pending.
pub struct CameraController {
    device: Arc<dyn CaptureDevice>,
    constraints: StreamConstraints,
    jpeg_quality: u8,
    inner: Mutex<Inner>,
}

/// Resets `Opening` to `Idle` when an `open` future is dropped before the device answers
struct OpeningGuard<'a> {
    inner: &'a Mutex<Inner>,
    attempt: u64,
    armed: bool,
}

impl OpeningGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for OpeningGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.attempt == self.attempt && inner.state == CameraState::Opening {
            tracing::debug!("Camera open abandoned before the device answered");
            inner.state = CameraState::Idle;
        }
    }
}

impl CameraController {
    pub fn new(device: Arc<dyn CaptureDevice>, settings: &CameraSettings) -> Self {
        Self {
            device,
            constraints: StreamConstraints::from(settings),
            jpeg_quality: settings.jpeg_quality,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CameraState {
        self.lock().state.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().state == CameraState::Streaming
    }

    pub fn constraints(&self) -> &StreamConstraints {
        &self.constraints
    }

    /// Acquire a stream from the device.
    ///
    /// A no-op while already streaming. On rejection the controller moves to
    /// [`CameraState::Error`] and the caller may retry by calling `open` again.
    /// When [`close`](Self::close) runs before the device answers, the late stream is
    /// stopped without being installed and the call fails with `StaleResponse`.
    pub async fn open(&self) -> Result<()> {
        let attempt = {
            let mut inner = self.lock();
            match inner.state {
                CameraState::Streaming => {
                    tracing::debug!("Camera already streaming, ignoring open");
                    return Ok(());
                }
                CameraState::Opening => {
                    return Err(VisionError::invalid_state("open the camera", &inner.state));
                }
                CameraState::Idle | CameraState::Error(_) => {}
            }

            inner.attempt += 1;
            inner.state = CameraState::Opening;
            inner.attempt
        };

        tracing::info!(
            "Opening camera: {}x{} facing {:?}",
            self.constraints.width,
            self.constraints.height,
            self.constraints.facing
        );

        let guard = OpeningGuard {
            inner: &self.inner,
            attempt,
            armed: true,
        };
        let acquired = self.device.acquire(&self.constraints).await;
        guard.disarm();

        let mut inner = self.lock();
        if inner.attempt != attempt {
            tracing::info!("Camera closed while opening, discarding the device answer");
            if let Ok(mut stream) = acquired {
                stream.stop_tracks();
            }
            return Err(VisionError::StaleResponse);
        }

        match acquired {
            Ok(stream) => {
                inner.stream = Some(stream);
                inner.state = CameraState::Streaming;
                tracing::info!("Camera streaming");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Camera access error: {}", e);
                let cause = e.to_string();
                inner.state = CameraState::Error(cause.clone());
                Err(VisionError::DeviceUnavailable(cause))
            }
        }
    }

    /// Stop all tracks and return to `Idle`. Safe to call from any state, and
    /// abandons a pending `open`.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.attempt += 1;
        inner.release();
    }

    /// Grab the current frame and encode it as a JPEG [`ImageSource`]
    pub fn snapshot(&self) -> Result<ImageSource> {
        let frame = {
            let mut inner = self.lock();
            if inner.state != CameraState::Streaming {
                return Err(VisionError::invalid_state("take a snapshot", &inner.state));
            }
            let Some(stream) = inner.stream.as_mut() else {
                return Err(VisionError::invalid_state("take a snapshot", &inner.state));
            };

            match stream.grab_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("Failed to grab frame: {}", e);
                    let cause = e.to_string();
                    inner.release();
                    inner.state = CameraState::Error(cause.clone());
                    return Err(VisionError::DeviceUnavailable(cause));
                }
            }
        };

        let jpeg = encode_jpeg(&frame, self.jpeg_quality)?;
        tracing::info!(
            "Captured {}x{} frame ({} bytes)",
            frame.width(),
            frame.height(),
            jpeg.len()
        );

        Ok(ImageSource::from_capture(jpeg))
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if inner.stream.is_some() {
            tracing::warn!("Camera controller dropped with an open stream, stopping it");
            inner.release();
        }
    }
}

/// Lossy-encode a frame at its native dimensions
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(VisionError::Encode("frame has no pixels".to_string()));
    }

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode_image(frame)
        .map_err(|e| VisionError::Encode(e.to_string()))?;

    Ok(buf)
}
