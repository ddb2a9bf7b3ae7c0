//! Fixed phrases shown on screen and spoken by the narrator.

use serde::{Deserialize, Serialize};

pub const STATUS_START: &str = "Take or select a photo to begin";
pub const STATUS_IMAGE_SELECTED: &str = "Image selected. Tap \"Describe & Speak\" to continue.";
pub const STATUS_PROCESSING: &str = "Processing image. Please wait.";
pub const STATUS_PLAYING: &str = "Playing audio description...";
pub const STATUS_CAMERA_OPENING: &str = "Opening camera.";
pub const STATUS_CAMERA_READY: &str = "Camera ready. Tap capture to take a photo.";
pub const STATUS_CAMERA_CLOSED: &str = "Camera closed.";
pub const STATUS_PHOTO_CAPTURED: &str = "Photo captured.";
pub const STATUS_TAP_TO_PLAY: &str = "Description ready. Tap to play.";
pub const NARRATION_ON: &str = "Voice guidance on";
pub const NARRATION_OFF: &str = "Voice guidance off";

/// Interactive controls that carry a spoken label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    Camera,
    Gallery,
    FlipCamera,
    Capture,
    CloseCamera,
    Describe,
    NarrationToggle,
    PlayDescription,
}

impl Control {
    /// Label spoken as tooltip narration.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Camera => "Camera. Open the camera to take a photo.",
            Self::Gallery => "Gallery. Choose a photo from your device.",
            Self::FlipCamera => "Switch between front and back camera.",
            Self::Capture => "Capture photo.",
            Self::CloseCamera => "Close camera.",
            Self::Describe => "Describe and speak the selected photo.",
            Self::NarrationToggle => "Turn voice guidance on or off.",
            Self::PlayDescription => "Play the description.",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "camera" => Some(Self::Camera),
            "gallery" | "upload" => Some(Self::Gallery),
            "flip_camera" | "flip" => Some(Self::FlipCamera),
            "capture" => Some(Self::Capture),
            "close_camera" | "close" => Some(Self::CloseCamera),
            "describe" => Some(Self::Describe),
            "narration_toggle" => Some(Self::NarrationToggle),
            "play_description" => Some(Self::PlayDescription),
            _ => None,
        }
    }
}

/// What drew attention to a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintTrigger {
    /// Pointer hover; only honoured where hover exists.
    Hover,
    /// Keyboard or screen-reader focus.
    Focus,
    /// Touch long-press.
    LongPress,
}
