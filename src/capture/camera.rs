//! Camera capability and the session that owns an open stream.

use super::Facing;
use crate::error::{Result, SightError};
use tracing::{debug, info};

/// A decoded video frame, tightly packed RGB8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl VideoFrame {
    /// Build a frame, checking the buffer matches the dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`SightError::DeviceNotReady`] if the buffer length does not
    /// equal `width * height * 3`.
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(3);
        if rgb.len() != expected {
            debug!(width, height, len = rgb.len(), "frame buffer size mismatch");
            return Err(SightError::DeviceNotReady);
        }
        Ok(Self { width, height, rgb })
    }

    /// A frame with no pixels, or only black pixels, carries no picture yet.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.width == 0 || self.height == 0 || self.rgb.iter().all(|&b| b == 0)
    }
}

/// Parameters for opening a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraRequest {
    pub facing: Facing,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

/// Platform camera access.
pub trait CameraDevice: Send {
    /// Start a stream for `request`.
    ///
    /// Errors must use the camera taxonomy: [`SightError::PermissionDenied`],
    /// [`SightError::NoDevice`], [`SightError::DeviceBusy`] or
    /// [`SightError::CameraUnknown`].
    fn open(&mut self, request: &CameraRequest) -> Result<Box<dyn CameraStream>>;
}

/// A running camera stream.
pub trait CameraStream: Send {
    /// Most recent frame, or `None` before the first frame arrives.
    fn latest_frame(&mut self) -> Option<VideoFrame>;

    /// Release the device. Called at most once by [`CameraSession`].
    fn stop(&mut self);
}

/// Camera device for platforms without one.
#[derive(Debug, Default)]
pub struct NoCamera;

impl CameraDevice for NoCamera {
    fn open(&mut self, _request: &CameraRequest) -> Result<Box<dyn CameraStream>> {
        Err(SightError::NoDevice)
    }
}

/// An open camera stream plus the facing it was opened with.
///
/// Closing is idempotent, and dropping a session closes it.
pub struct CameraSession {
    stream: Option<Box<dyn CameraStream>>,
    facing: Facing,
    ready_announced: bool,
}

impl CameraSession {
    /// Open a session on `device`.
    ///
    /// # Errors
    ///
    /// Propagates the device's open error.
    pub fn open(device: &mut dyn CameraDevice, request: &CameraRequest) -> Result<Self> {
        let stream = device.open(request)?;
        info!(facing = request.facing.as_str(), "camera session opened");
        Ok(Self {
            stream: Some(stream),
            facing: request.facing,
            ready_announced: false,
        })
    }

    #[must_use]
    pub fn facing(&self) -> Facing {
        self.facing
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Grab the current frame.
    ///
    /// # Errors
    ///
    /// Returns [`SightError::DeviceNotReady`] when the session is closed, no
    /// frame has arrived yet, or the frame is blank.
    pub fn read_frame(&mut self) -> Result<VideoFrame> {
        let stream = self.stream.as_mut().ok_or(SightError::DeviceNotReady)?;
        match stream.latest_frame() {
            Some(frame) if !frame.is_blank() => Ok(frame),
            Some(_) => {
                debug!("camera frame is blank");
                Err(SightError::DeviceNotReady)
            }
            None => Err(SightError::DeviceNotReady),
        }
    }

    /// Returns `true` exactly once per session, the first time it is called.
    pub(crate) fn take_ready_announcement(&mut self) -> bool {
        if self.ready_announced || !self.is_open() {
            return false;
        }
        self.ready_announced = true;
        true
    }

    /// Stop the stream. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            info!(facing = self.facing.as_str(), "camera session closed");
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraSession")
            .field("facing", &self.facing)
            .field("open", &self.is_open())
            .finish()
    }
}
