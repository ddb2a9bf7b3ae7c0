//! Client for the external image-description backend.
//!
//! The backend accepts a multipart `POST` with the image under the `image`
//! field and answers with spoken audio (`audio/mpeg`). A `GET /health` probe
//! answers `{"status": "healthy"}`.

use crate::capture::CapturedImage;
use crate::config::DescriptionConfig;
use crate::error::{Result, SightError};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

/// Spoken description returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionAudio {
    pub bytes: Bytes,
    pub mime_type: String,
}

/// Something that turns an image into spoken audio.
#[async_trait]
pub trait DescriptionService: Send + Sync {
    /// Upload `image` and return the audio answer. Never retries.
    async fn describe(&self, image: &CapturedImage) -> Result<DescriptionAudio>;
}

/// HTTP implementation of [`DescriptionService`].
#[derive(Debug, Clone)]
pub struct HttpDescriptionClient {
    client: reqwest::Client,
    endpoint: String,
    health_url: String,
}

impl HttpDescriptionClient {
    /// Build a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SightError::Config`] if the HTTP client cannot be constructed.
    pub fn new(config: &DescriptionConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("sightsync/", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| SightError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim().to_owned(),
            health_url: config.health_url(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Probe the backend's health route.
    ///
    /// Returns `Ok(true)` only for a 2xx answer whose JSON `status` is
    /// `"healthy"`.
    ///
    /// # Errors
    ///
    /// Returns [`SightError::Network`] if the backend cannot be reached.
    pub async fn health(&self) -> Result<bool> {
        let response = self
            .client
            .get(&self.health_url)
            .send()
            .await
            .map_err(|e| SightError::Network(format!("health probe failed: {e}")))?;

        if !response.status().is_success() {
            warn!(status = response.status().as_u16(), "backend health probe not OK");
            return Ok(false);
        }

        let body: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!("backend health body is not JSON: {e}");
                return Ok(false);
            }
        };
        Ok(body["status"].as_str() == Some("healthy"))
    }

    fn build_form(image: &CapturedImage) -> Result<reqwest::multipart::Form> {
        let part = reqwest::multipart::Part::bytes(image.bytes().to_vec())
            .file_name(image.upload_file_name())
            .mime_str(image.mime_type())
            .map_err(|e| {
                SightError::UnsupportedType(format!("{}: {e}", image.mime_type()))
            })?;
        Ok(reqwest::multipart::Form::new().part(IMAGE_FIELD, part))
    }
}

#[async_trait]
impl DescriptionService for HttpDescriptionClient {
    async fn describe(&self, image: &CapturedImage) -> Result<DescriptionAudio> {
        let form = Self::build_form(image)?;
        info!(
            endpoint = %self.endpoint,
            bytes = image.len(),
            mime = image.mime_type(),
            "uploading image for description"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SightError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = server_error_message(&body);
            warn!(status = status.as_u16(), detail = ?message, "description request failed");
            return Err(SightError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .unwrap_or_default();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SightError::Network(format!("failed to read response body: {e}")))?;

        if bytes.is_empty() || !is_audio_mime(&mime_type) {
            debug!(mime = %mime_type, len = bytes.len(), "response carries no audio");
            return Err(SightError::EmptyResponse);
        }

        info!(bytes = bytes.len(), mime = %mime_type, "received description audio");
        Ok(DescriptionAudio {
            bytes,
            mime_type: if mime_type.is_empty() {
                "audio/mpeg".to_owned()
            } else {
                mime_type
            },
        })
    }
}

/// Missing content types are accepted; the decoder sniffs the bytes.
fn is_audio_mime(mime: &str) -> bool {
    mime.is_empty() || mime.starts_with("audio/") || mime == "application/octet-stream"
}

fn server_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(v) => v["error"].as_str().map(str::to_owned),
        Err(_) => Some(trimmed.chars().take(200).collect()),
    }
}
