//! sightsync: spoken image descriptions for blind and low-vision users.
//!
//! A photo is taken with the camera or picked from a file, uploaded to a
//! description backend, and the returned audio is played back. Every control
//! can be narrated so the whole flow works without looking at the screen.
//!
//! # Architecture
//!
//! - **Capture**: camera sessions and image selection (`capture`)
//! - **Description**: multipart upload to the backend (`description`)
//! - **Playback**: decoding and output of the audio answer (`playback`)
//! - **Narration**: spoken status and control hints (`narration`)
//! - **Controller**: the single-owner state machine tying them together
//! - **Host**: JSON-lines bridge so a native shell can drive the controller

pub mod capture;
pub mod config;
pub mod controller;
pub mod description;
pub mod error;
pub mod host;
pub mod narration;
pub mod playback;
pub mod prompts;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::SightConfig;
pub use controller::{
    Capabilities, ControllerHandle, ControllerNotice, ControllerRuntime, InteractionController,
    Mode, UiState,
};
pub use error::{ErrorKind, Result, SightError};
