//! InferenceClient - HTTP adapter for the remote detection service
//!
//! ## Wire contract
//!
//! - `POST /predict`: multipart field `image`. The body of a 2xx response is the
//!   annotated image; the metadata header carries `{"detections": [...]}`.
//! - `POST /feedback`: multipart fields `image`, `incorrectLabel`, `correctLabel`,
//!   `comments`.
//!
//! Requests are sent exactly once. Anything other than a 2xx response is a failure.

use crate::VisionError;
use crate::models::{ApiSettings, Detection, DetectionMetadata, FeedbackRecord, ImageSource};
use anyhow::Context;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

/// Annotated image type assumed when the server omits `Content-Type`
const DEFAULT_ANNOTATED_MIME: &str = "image/jpeg";

/// Decoded 2xx response from `/predict`
#[derive(Debug, Clone)]
pub struct PredictResponse {
    pub detections: Vec<Detection>,
    pub annotated_image: Bytes,
    pub content_type: String,
}

/// Error body the service returns alongside non-2xx statuses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Clone, Copy)]
enum Endpoint {
    Predict,
    Feedback,
}

impl Endpoint {
    fn path(self) -> &'static str {
        match self {
            Endpoint::Predict => "predict",
            Endpoint::Feedback => "feedback",
        }
    }

    fn failure(self, status: Option<u16>, message: String) -> VisionError {
        match self {
            Endpoint::Predict => VisionError::AnalysisFailed { status, message },
            Endpoint::Feedback => VisionError::FeedbackFailed { status, message },
        }
    }
}

/// Client for the inference service
#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: reqwest::Client,
    base_url: String,
    metadata_header: String,
    timeout: Duration,
}

impl InferenceClient {
    /// Build a client from the `api` section of the configuration
    pub fn new(settings: &ApiSettings) -> anyhow::Result<Self> {
        let timeout = settings.timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            metadata_header: settings.metadata_header.clone(),
            timeout,
        })
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }

    /// Submit an image for detection
    pub async fn predict(&self, image: &ImageSource) -> crate::Result<PredictResponse> {
        let endpoint = Endpoint::Predict;
        let form = Form::new().part("image", image_part(image, "capture.jpg", endpoint)?);

        let resp = self.send(endpoint, form).await?;

        let detections = self.parse_metadata(resp.headers());
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(DEFAULT_ANNOTATED_MIME)
            .to_string();

        let annotated_image = resp
            .bytes()
            .await
            .map_err(|e| endpoint.failure(None, format!("Failed to read response body: {}", e)))?;

        tracing::info!(
            "Prediction returned {} detections and {} bytes of {}",
            detections.len(),
            annotated_image.len(),
            content_type
        );

        Ok(PredictResponse {
            detections,
            annotated_image,
            content_type,
        })
    }

    /// Submit a correction together with the original image
    pub async fn submit_feedback(&self, record: &FeedbackRecord) -> crate::Result<()> {
        let endpoint = Endpoint::Feedback;
        let form = Form::new()
            .part("image", image_part(&record.image, "feedback.jpg", endpoint)?)
            .text("incorrectLabel", record.incorrect_label.clone())
            .text("correctLabel", record.correct_label.clone())
            .text("comments", record.comments.clone());

        self.send(endpoint, form).await?;

        tracing::info!(
            "Feedback accepted: {:?} -> {:?}",
            record.incorrect_label,
            record.correct_label
        );
        Ok(())
    }

    /// Post a form once and turn transport errors and non-2xx statuses into failures
    async fn send(&self, endpoint: Endpoint, form: Form) -> crate::Result<reqwest::Response> {
        let url = self.url(endpoint);
        tracing::debug!("POST {}", url);

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Request to {} failed: {}", url, e);
                endpoint.failure(None, e.to_string())
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| {
                    status
                        .canonical_reason()
                        .unwrap_or("Request failed")
                        .to_string()
                });

            tracing::warn!("{} returned {}: {}", url, status, message);
            return Err(endpoint.failure(Some(status.as_u16()), message));
        }

        Ok(resp)
    }

    /// Read detections from the metadata header.
    ///
    /// A missing or malformed header degrades to an empty list.
    pub fn parse_metadata(&self, headers: &HeaderMap) -> Vec<Detection> {
        let Some(value) = headers.get(self.metadata_header.as_str()) else {
            tracing::debug!("No {} header in response", self.metadata_header);
            return Vec::new();
        };

        let parsed = value
            .to_str()
            .map_err(|e| e.to_string())
            .and_then(|raw| {
                serde_json::from_str::<DetectionMetadata>(raw).map_err(|e| e.to_string())
            });

        match parsed {
            Ok(metadata) => metadata.detections,
            Err(e) => {
                tracing::warn!(
                    "Ignoring malformed {} header: {}",
                    self.metadata_header,
                    e
                );
                Vec::new()
            }
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn image_part(image: &ImageSource, file_name: &str, endpoint: Endpoint) -> crate::Result<Part> {
    // Shares the image buffer instead of copying it
    let body = reqwest::Body::from(image.bytes().clone());
    Part::stream_with_length(body, image.len() as u64)
        .file_name(file_name.to_string())
        .mime_str(image.mime_type())
        .map_err(|e| {
            endpoint.failure(
                None,
                format!("Invalid image type {:?}: {}", image.mime_type(), e),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn client() -> InferenceClient {
        InferenceClient::new(&ApiSettings::default()).unwrap()
    }

    #[test]
    fn test_urls_join_base_and_endpoint() {
        let settings = ApiSettings {
            base_url: "http://detector.local:5000/".to_string(),
            ..ApiSettings::default()
        };
        let client = InferenceClient::new(&settings).unwrap();

        assert_eq!(client.base_url(), "http://detector.local:5000");
        assert_eq!(
            client.url(Endpoint::Predict),
            "http://detector.local:5000/predict"
        );
        assert_eq!(
            client.url(Endpoint::Feedback),
            "http://detector.local:5000/feedback"
        );
    }

    #[test]
    fn test_parse_metadata_reads_detections_in_order() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-json-data",
            HeaderValue::from_static(
                r#"{"detections": [{"label": "Dog", "confidence": 0.4}, {"label": "Cat", "confidence": 0.9}]}"#,
            ),
        );

        let detections = client().parse_metadata(&headers);

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].label, "Dog");
        assert_eq!(detections[1].label, "Cat");
    }

    #[test]
    fn test_parse_metadata_header_name_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-json-data",
            HeaderValue::from_static(r#"{"detections": [{"label": "Cat", "confidence": 0.87}]}"#),
        );

        assert_eq!(client().parse_metadata(&headers).len(), 1);
    }

    #[test]
    fn test_parse_metadata_missing_or_malformed_is_empty() {
        assert!(client().parse_metadata(&HeaderMap::new()).is_empty());

        let mut headers = HeaderMap::new();
        headers.insert("x-json-data", HeaderValue::from_static("{not json"));
        assert!(client().parse_metadata(&headers).is_empty());
    }

    #[test]
    fn test_endpoint_failures_map_to_taxonomy() {
        assert!(matches!(
            Endpoint::Predict.failure(Some(500), "boom".to_string()),
            VisionError::AnalysisFailed {
                status: Some(500),
                ..
            }
        ));
        assert!(matches!(
            Endpoint::Feedback.failure(None, "down".to_string()),
            VisionError::FeedbackFailed { status: None, .. }
        ));
    }
}
