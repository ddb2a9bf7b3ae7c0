//! Conversion between camera frames and encoded still images.

use super::camera::VideoFrame;
use super::CapturedImage;
use crate::error::{Result, SightError};
use image::codecs::jpeg::JpegEncoder;

/// Encode a frame as a JPEG snapshot.
///
/// # Errors
///
/// Returns [`SightError::DeviceNotReady`] for blank frames and
/// [`SightError::CameraUnknown`] if encoding fails.
pub fn encode_snapshot(frame: &VideoFrame, quality: u8) -> Result<CapturedImage> {
    if frame.is_blank() {
        return Err(SightError::DeviceNotReady);
    }
    let mut jpeg = Vec::with_capacity(frame.rgb.len() / 8);
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode(
            &frame.rgb,
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| SightError::CameraUnknown(format!("failed to encode snapshot: {e}")))?;
    Ok(CapturedImage::snapshot(jpeg))
}

/// Decode an encoded image (JPEG/PNG) pushed by a host shell into a frame.
///
/// # Errors
///
/// Returns [`SightError::Protocol`] if the bytes are not a decodable image.
pub fn decode_frame(encoded: &[u8]) -> Result<VideoFrame> {
    let rgb = image::load_from_memory(encoded)
        .map_err(|e| SightError::Protocol(format!("camera frame is not a decodable image: {e}")))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    VideoFrame::new(width, height, rgb.into_raw())
}
