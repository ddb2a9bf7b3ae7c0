//! Error types for the sightsync client.

use crate::controller::Mode;
use serde::{Deserialize, Serialize};

/// Top-level error type for the capture → describe → speak flow.
#[derive(Debug, thiserror::Error)]
pub enum SightError {
    /// The user (or platform policy) refused camera access.
    #[error("camera permission denied")]
    PermissionDenied,

    /// No camera matching the request exists.
    #[error("no camera device available")]
    NoDevice,

    /// The camera exists but another consumer holds it.
    #[error("camera device is busy")]
    DeviceBusy,

    /// The camera stream has not produced a usable frame yet.
    #[error("camera is not ready yet")]
    DeviceNotReady,

    /// Camera failure that does not fit the other categories.
    #[error("camera error: {0}")]
    CameraUnknown(String),

    /// Selected file is not an image.
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    /// The description backend could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The description backend answered with a non-2xx status.
    #[error("server error: {status}")]
    Server {
        status: u16,
        /// Detail from the backend's `{"error": ...}` body, when present.
        message: Option<String>,
    },

    /// The description backend answered 2xx without an audio payload.
    #[error("server returned no audio")]
    EmptyResponse,

    /// The platform refused to start playback (autoplay policy).
    #[error("audio playback was blocked")]
    PlaybackBlocked,

    /// A description request is already in flight.
    #[error("an image is already being processed")]
    AlreadyProcessing,

    /// The operation is not valid in the controller's current mode.
    #[error("cannot {operation} while {mode}")]
    InvalidState { operation: &'static str, mode: Mode },

    /// Audio device or decoding error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Host protocol error (malformed envelope or payload).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, SightError>;

/// Serializable projection of [`SightError`] used in UI state and host events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    PermissionDenied,
    NoDevice,
    DeviceBusy,
    DeviceNotReady,
    Unknown,
    UnsupportedType,
    NetworkError,
    ServerError { status: u16 },
    EmptyResponse,
    PlaybackBlocked,
    AlreadyProcessing,
    InvalidState,
    Internal,
}

impl ErrorKind {
    /// Sentence shown on screen and spoken when narration is enabled.
    #[must_use]
    pub fn user_message(self) -> String {
        match self {
            Self::PermissionDenied => {
                "Camera access was denied. Allow camera access and try again.".to_owned()
            }
            Self::NoDevice => "No camera was found on this device.".to_owned(),
            Self::DeviceBusy => {
                "The camera is being used by another app. Close it and try again.".to_owned()
            }
            Self::DeviceNotReady => "The camera is not ready yet. Try again.".to_owned(),
            Self::Unknown => "The camera could not be started.".to_owned(),
            Self::UnsupportedType => "That file is not an image. Choose a photo.".to_owned(),
            Self::NetworkError => {
                "Could not reach the description service. Check your connection and try again."
                    .to_owned()
            }
            Self::ServerError { status } => {
                format!("The description service failed with error {status}. Try again.")
            }
            Self::EmptyResponse => "The description service returned no audio.".to_owned(),
            Self::PlaybackBlocked => "Tap anywhere to play the description.".to_owned(),
            Self::AlreadyProcessing => "Still processing the image. Please wait.".to_owned(),
            Self::InvalidState => "That action is not available right now.".to_owned(),
            Self::Internal => "Something went wrong. Try again.".to_owned(),
        }
    }
}

impl SightError {
    /// Project the error onto its user-facing category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied => ErrorKind::PermissionDenied,
            Self::NoDevice => ErrorKind::NoDevice,
            Self::DeviceBusy => ErrorKind::DeviceBusy,
            Self::DeviceNotReady => ErrorKind::DeviceNotReady,
            Self::CameraUnknown(_) => ErrorKind::Unknown,
            Self::UnsupportedType(_) => ErrorKind::UnsupportedType,
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Server { status, .. } => ErrorKind::ServerError { status: *status },
            Self::EmptyResponse => ErrorKind::EmptyResponse,
            Self::PlaybackBlocked => ErrorKind::PlaybackBlocked,
            Self::AlreadyProcessing => ErrorKind::AlreadyProcessing,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Audio(_)
            | Self::Config(_)
            | Self::Protocol(_)
            | Self::Io(_)
            | Self::Channel(_) => ErrorKind::Internal,
        }
    }

    /// Map a browser `getUserMedia` `DOMException` name onto the camera taxonomy.
    ///
    /// Also accepts the snake_case [`ErrorKind`] spellings so native shells can
    /// report faults without knowing DOM names.
    #[must_use]
    pub fn from_camera_fault(name: &str) -> Self {
        match name.trim() {
            "NotAllowedError" | "SecurityError" | "PermissionDeniedError" | "permission_denied" => {
                Self::PermissionDenied
            }
            "NotFoundError" | "OverconstrainedError" | "DevicesNotFoundError" | "no_device" => {
                Self::NoDevice
            }
            "NotReadableError" | "AbortError" | "TrackStartError" | "device_busy" => {
                Self::DeviceBusy
            }
            other => Self::CameraUnknown(other.to_owned()),
        }
    }
}
