//! Image acquisition: file selection and camera snapshots.
//!
//! Both paths produce a [`CapturedImage`]. A new capture replaces the previous
//! one wholesale; images are never mutated after creation.

pub mod camera;
pub mod snapshot;

use crate::error::{Result, SightError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use camera::{CameraDevice, CameraRequest, CameraSession, CameraStream, NoCamera, VideoFrame};

/// Which way the camera points.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Selfie camera (`facingMode: "user"`).
    Front,
    /// Rear camera (`facingMode: "environment"`).
    #[default]
    Back,
}

impl Facing {
    /// The opposite camera.
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Front => Self::Back,
            Self::Back => Self::Front,
        }
    }

    /// Media-constraints spelling of this facing.
    #[must_use]
    pub fn as_facing_mode(self) -> &'static str {
        match self {
            Self::Front => "user",
            Self::Back => "environment",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "front" | "user" | "selfie" => Some(Self::Front),
            "back" | "rear" | "environment" => Some(Self::Back),
            _ => None,
        }
    }
}

/// Where an image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    CameraSnapshot,
}

/// A still image ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    bytes: Bytes,
    mime_type: String,
    source: SourceKind,
    file_name: Option<String>,
}

impl CapturedImage {
    /// Wrap a file-picker selection.
    ///
    /// # Errors
    ///
    /// Returns [`SightError::UnsupportedType`] if `mime_type` is not `image/*`
    /// or the file is empty.
    pub fn from_file(
        bytes: impl Into<Bytes>,
        mime_type: &str,
        file_name: Option<String>,
    ) -> Result<Self> {
        let mime = normalize_image_mime(mime_type)?;
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(SightError::UnsupportedType(format!("{mime} (empty file)")));
        }
        Ok(Self {
            bytes,
            mime_type: mime,
            source: SourceKind::File,
            file_name: file_name.filter(|n| !n.trim().is_empty()),
        })
    }

    /// Read an image from disk, detecting its type from the content.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or
    /// [`SightError::UnsupportedType`] if it is not a recognised image.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let mime = sniff_image_mime(&bytes, path).ok_or_else(|| {
            SightError::UnsupportedType(format!("{} is not a recognised image", path.display()))
        })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned);
        Self::from_file(bytes, mime, file_name)
    }

    /// Wrap an encoded camera snapshot.
    pub(crate) fn snapshot(jpeg: Vec<u8>) -> Self {
        Self {
            bytes: Bytes::from(jpeg),
            mime_type: "image/jpeg".to_owned(),
            source: SourceKind::CameraSnapshot,
            file_name: None,
        }
    }

    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    #[must_use]
    pub fn source(&self) -> SourceKind {
        self.source
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File name sent with the multipart part.
    #[must_use]
    pub fn upload_file_name(&self) -> String {
        if let Some(ref name) = self.file_name {
            return name.clone();
        }
        let stem = match self.source {
            SourceKind::File => "image",
            SourceKind::CameraSnapshot => "capture",
        };
        format!("{stem}.{}", extension_for_mime(&self.mime_type))
    }
}

fn normalize_image_mime(raw: &str) -> Result<String> {
    // Drop parameters such as `; charset=...`.
    let essence = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match essence.strip_prefix("image/") {
        Some(subtype) if !subtype.is_empty() && !subtype.contains('/') => Ok(essence),
        _ => Err(SightError::UnsupportedType(if raw.trim().is_empty() {
            "<none>".to_owned()
        } else {
            raw.trim().to_owned()
        })),
    }
}

fn sniff_image_mime(bytes: &[u8], path: &Path) -> Option<&'static str> {
    let format = image::guess_format(bytes)
        .ok()
        .or_else(|| image::ImageFormat::from_path(path).ok())?;
    let mime = match format {
        image::ImageFormat::Jpeg => "image/jpeg",
        image::ImageFormat::Png => "image/png",
        image::ImageFormat::Gif => "image/gif",
        image::ImageFormat::WebP => "image/webp",
        image::ImageFormat::Bmp => "image/bmp",
        image::ImageFormat::Tiff => "image/tiff",
        image::ImageFormat::Avif => "image/avif",
        image::ImageFormat::Ico => "image/x-icon",
        _ => return None,
    };
    Some(mime)
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        "image/heic" => "heic",
        "image/tiff" => "tiff",
        _ => "img",
    }
}
