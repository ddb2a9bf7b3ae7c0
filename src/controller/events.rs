//! Inputs consumed by the interaction controller.

use crate::capture::{CapturedImage, Facing};
use crate::description::DescriptionAudio;
use crate::error::Result;
use crate::playback::PlaybackEvent;
use crate::prompts::{Control, HintTrigger};

/// Identifier of one description request.
pub type RequestId = u64;

/// Every user action and asynchronous completion, funnelled through one queue.
#[derive(Debug)]
pub enum ControllerEvent {
    /// Open (or re-open) the camera. `None` keeps the last facing.
    OpenCamera { facing: Option<Facing> },
    FlipCamera,
    CloseCamera,
    Capture,
    /// File picker result; the mime type is validated by the controller.
    SelectFile {
        bytes: bytes::Bytes,
        mime_type: String,
        file_name: Option<String>,
    },
    /// An already-validated image (e.g. loaded from disk).
    SelectImage(CapturedImage),
    Submit,
    /// User gesture retrying blocked playback.
    ResumePlayback,
    ToggleNarration,
    /// Hover, focus or long-press on a control.
    Hint {
        control: Control,
        trigger: HintTrigger,
    },
    /// The camera stream produced a frame.
    CameraFrameReady,
    /// The camera stream died; `name` is a DOM error name or a taxonomy name.
    CameraFault { name: String },
    /// The description request finished.
    DescriptionFinished {
        request_id: RequestId,
        result: Result<DescriptionAudio>,
    },
    Playback(PlaybackEvent),
    /// Release every resource.
    Shutdown,
}

impl ControllerEvent {
    /// Short name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenCamera { .. } => "open_camera",
            Self::FlipCamera => "flip_camera",
            Self::CloseCamera => "close_camera",
            Self::Capture => "capture",
            Self::SelectFile { .. } => "select_file",
            Self::SelectImage(_) => "select_image",
            Self::Submit => "submit",
            Self::ResumePlayback => "resume_playback",
            Self::ToggleNarration => "toggle_narration",
            Self::Hint { .. } => "hint",
            Self::CameraFrameReady => "camera_frame_ready",
            Self::CameraFault { .. } => "camera_fault",
            Self::DescriptionFinished { .. } => "description_finished",
            Self::Playback(_) => "playback",
            Self::Shutdown => "shutdown",
        }
    }
}
