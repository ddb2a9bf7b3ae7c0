//! Versioned host command/event envelopes for native shell integration.

use serde::{Deserialize, Serialize};

/// Contract version for host command/event envelopes.
pub const EVENT_VERSION: u32 = 1;

/// Commands a native shell sends to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandName {
    #[serde(rename = "host.ping")]
    HostPing,
    #[serde(rename = "host.version")]
    HostVersion,
    #[serde(rename = "state.get")]
    StateGet,
    #[serde(rename = "camera.open")]
    CameraOpen,
    #[serde(rename = "camera.flip")]
    CameraFlip,
    #[serde(rename = "camera.close")]
    CameraClose,
    #[serde(rename = "camera.capture")]
    CameraCapture,
    #[serde(rename = "camera.frame")]
    CameraFrame,
    #[serde(rename = "camera.fault")]
    CameraFault,
    #[serde(rename = "image.select")]
    ImageSelect,
    #[serde(rename = "image.submit")]
    ImageSubmit,
    #[serde(rename = "narration.toggle")]
    NarrationToggle,
    #[serde(rename = "narration.finished")]
    NarrationFinished,
    #[serde(rename = "ui.hint")]
    UiHint,
    #[serde(rename = "playback.ended")]
    PlaybackEnded,
    #[serde(rename = "playback.blocked")]
    PlaybackBlocked,
    #[serde(rename = "playback.failed")]
    PlaybackFailed,
    #[serde(rename = "playback.resume")]
    PlaybackResume,
    #[serde(rename = "runtime.stop")]
    RuntimeStop,
}

impl CommandName {
    /// Render command name to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HostPing => "host.ping",
            Self::HostVersion => "host.version",
            Self::StateGet => "state.get",
            Self::CameraOpen => "camera.open",
            Self::CameraFlip => "camera.flip",
            Self::CameraClose => "camera.close",
            Self::CameraCapture => "camera.capture",
            Self::CameraFrame => "camera.frame",
            Self::CameraFault => "camera.fault",
            Self::ImageSelect => "image.select",
            Self::ImageSubmit => "image.submit",
            Self::NarrationToggle => "narration.toggle",
            Self::NarrationFinished => "narration.finished",
            Self::UiHint => "ui.hint",
            Self::PlaybackEnded => "playback.ended",
            Self::PlaybackBlocked => "playback.blocked",
            Self::PlaybackFailed => "playback.failed",
            Self::PlaybackResume => "playback.resume",
            Self::RuntimeStop => "runtime.stop",
        }
    }

    /// Parse a command name from wire format.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "host.ping" => Some(Self::HostPing),
            "host.version" => Some(Self::HostVersion),
            "state.get" => Some(Self::StateGet),
            "camera.open" => Some(Self::CameraOpen),
            "camera.flip" => Some(Self::CameraFlip),
            "camera.close" => Some(Self::CameraClose),
            "camera.capture" => Some(Self::CameraCapture),
            "camera.frame" => Some(Self::CameraFrame),
            "camera.fault" => Some(Self::CameraFault),
            "image.select" => Some(Self::ImageSelect),
            "image.submit" => Some(Self::ImageSubmit),
            "narration.toggle" => Some(Self::NarrationToggle),
            "narration.finished" => Some(Self::NarrationFinished),
            "ui.hint" => Some(Self::UiHint),
            "playback.ended" => Some(Self::PlaybackEnded),
            "playback.blocked" => Some(Self::PlaybackBlocked),
            "playback.failed" => Some(Self::PlaybackFailed),
            "playback.resume" => Some(Self::PlaybackResume),
            "runtime.stop" => Some(Self::RuntimeStop),
            _ => None,
        }
    }
}

/// Event names emitted to the shell.
pub mod events {
    pub const STATE_CHANGED: &str = "state.changed";
    pub const STATUS: &str = "status";
    pub const ERROR: &str = "error";
    pub const NARRATION_SPEAK: &str = "narration.speak";
    pub const NARRATION_CANCEL: &str = "narration.cancel";
    pub const CAMERA_START_REQUESTED: &str = "camera.start_requested";
    pub const CAMERA_STOP_REQUESTED: &str = "camera.stop_requested";
    pub const PLAYBACK_PLAY: &str = "playback.play";
    pub const PLAYBACK_STOP: &str = "playback.stop";
}

/// A versioned response envelope from client -> shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub v: u32,
    pub request_id: String,
    pub ok: bool,
    pub payload: serde_json::Value,
    pub error: Option<String>,
    /// Taxonomy of a failed operation, for shells that localise messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<crate::error::ErrorKind>,
}

impl ResponseEnvelope {
    /// Build a successful response envelope.
    #[must_use]
    pub fn ok(request_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: true,
            payload,
            error: None,
            error_kind: None,
        }
    }

    /// Build an error response envelope.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            ok: false,
            payload: serde_json::Value::Null,
            error: Some(message.into()),
            error_kind: None,
        }
    }

    /// Build an error response carrying the error's taxonomy.
    #[must_use]
    pub fn failure(request_id: impl Into<String>, err: &crate::error::SightError) -> Self {
        Self {
            error_kind: Some(err.kind()),
            ..Self::error(request_id, err.to_string())
        }
    }
}

/// A versioned command envelope from shell -> client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub v: u32,
    pub request_id: String,
    pub command: CommandName,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CommandEnvelope {
    /// Build a v1 command envelope.
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        command: CommandName,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            request_id: request_id.into(),
            command,
            payload,
        }
    }

    /// Validate envelope version and required identifiers.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        if self.request_id.trim().is_empty() {
            return Err(ContractError::new(
                ContractErrorKind::InvalidEnvelope,
                "request_id cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }
}

/// A versioned event envelope from client -> shell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub v: u32,
    pub event_id: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Build a v1 event envelope.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        event: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            v: EVENT_VERSION,
            event_id: event_id.into(),
            event: event.into(),
            payload,
        }
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidEnvelope,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}
