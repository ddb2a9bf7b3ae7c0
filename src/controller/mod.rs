//! Interaction controller: the single arbiter of what the user sees and hears.
//!
//! The controller owns the camera session, the selected image, the narration
//! engine and the playback slot. Every transition runs to completion on one
//! logical thread; the description request is the only operation that
//! suspends, and its result comes back as a [`ControllerEvent`] on the
//! loopback queue.
//!
//! The user-facing [`Mode`] is never stored. It is projected from the
//! entities above each time it is asked for.

pub mod events;
pub mod runtime;

use crate::capture::snapshot::encode_snapshot;
use crate::capture::{
    CameraDevice, CameraRequest, CameraSession, CapturedImage, Facing, SourceKind,
};
use crate::config::{CameraConfig, SightConfig};
use crate::description::{DescriptionAudio, DescriptionService};
use crate::error::{ErrorKind, Result, SightError};
use crate::narration::{NarrationEngine, NarrationStyle, SpeechSynthesizer, UtteranceId};
use crate::playback::{AudioOutput, PlaybackController, PlaybackEvent, PlaybackOutcome};
use crate::prompts::{self, Control, HintTrigger};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

pub use events::{ControllerEvent, RequestId};
pub use runtime::{ControllerHandle, ControllerRuntime};

const NOTICE_CAPACITY: usize = 64;

/// Composite interaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// No image, no camera.
    Idle,
    CameraOpen,
    /// An image is held and no request is in flight.
    ImageReady,
    Processing,
    PlayingResult,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::CameraOpen => "camera open",
            Self::ImageReady => "image ready",
            Self::Processing => "processing",
            Self::PlayingResult => "playing result",
        })
    }
}

/// Snapshot of everything the UI renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiState {
    pub mode: Mode,
    pub camera_open: bool,
    pub facing: Option<Facing>,
    pub has_image: bool,
    pub image_source: Option<SourceKind>,
    pub is_processing: bool,
    pub tts_enabled: bool,
    /// Description audio is waiting for a user gesture to play.
    pub awaiting_tap_to_play: bool,
    pub error: Option<ErrorKind>,
    pub status: String,
}

/// Published on every observable change.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerNotice {
    StateChanged(UiState),
    Status(String),
    Error { kind: ErrorKind, message: String },
}

/// Platform capabilities the controller drives.
pub struct Capabilities {
    pub camera: Box<dyn CameraDevice>,
    pub speech: Box<dyn SpeechSynthesizer>,
    pub audio: Box<dyn AudioOutput>,
    pub describer: Arc<dyn DescriptionService>,
}

pub struct InteractionController {
    camera_device: Box<dyn CameraDevice>,
    camera: Option<CameraSession>,
    facing: Facing,
    camera_config: CameraConfig,
    image: Option<CapturedImage>,
    /// Image held before the camera opened, restored if the session faults
    /// before its first frame.
    displaced_image: Option<CapturedImage>,
    narration: NarrationEngine,
    hover_supported: bool,
    auto_submit: bool,
    playback: PlaybackController,
    describer: Arc<dyn DescriptionService>,
    in_flight: Option<RequestId>,
    next_request_id: RequestId,
    loopback: mpsc::UnboundedSender<ControllerEvent>,
    notices: broadcast::Sender<ControllerNotice>,
    error: Option<ErrorKind>,
    status: String,
}

impl InteractionController {
    /// Build a controller. Description results are sent to `loopback`, which
    /// the owner must feed back into [`handle`](Self::handle).
    pub fn new(
        config: &SightConfig,
        capabilities: Capabilities,
        loopback: mpsc::UnboundedSender<ControllerEvent>,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            camera_device: capabilities.camera,
            camera: None,
            facing: config.camera.default_facing,
            camera_config: config.camera.clone(),
            image: None,
            displaced_image: None,
            narration: NarrationEngine::new(capabilities.speech, &config.narration),
            hover_supported: config.narration.hover_supported,
            auto_submit: config.behavior.auto_submit,
            playback: PlaybackController::new(capabilities.audio),
            describer: capabilities.describer,
            in_flight: None,
            next_request_id: 1,
            loopback,
            notices,
            error: None,
            status: prompts::STATUS_START.to_owned(),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerNotice> {
        self.notices.subscribe()
    }

    pub(crate) fn notice_sender(&self) -> broadcast::Sender<ControllerNotice> {
        self.notices.clone()
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        if self.in_flight.is_some() {
            Mode::Processing
        } else if self.playback.is_playing() {
            Mode::PlayingResult
        } else if self.camera_is_open() {
            Mode::CameraOpen
        } else if self.image.is_some() {
            Mode::ImageReady
        } else {
            Mode::Idle
        }
    }

    #[must_use]
    pub fn ui_state(&self) -> UiState {
        let camera_open = self.camera_is_open();
        UiState {
            mode: self.mode(),
            camera_open,
            facing: camera_open.then_some(self.facing),
            has_image: self.image.is_some(),
            image_source: self.image.as_ref().map(CapturedImage::source),
            is_processing: self.in_flight.is_some(),
            tts_enabled: self.narration.is_enabled(),
            awaiting_tap_to_play: self.playback.has_pending(),
            error: self.error,
            status: self.status.clone(),
        }
    }

    #[must_use]
    pub fn image(&self) -> Option<&CapturedImage> {
        self.image.as_ref()
    }

    /// Apply one event.
    ///
    /// # Errors
    ///
    /// Returns the failure of the requested operation. Failures have already
    /// been surfaced to the user when this returns.
    pub fn handle(&mut self, event: ControllerEvent) -> Result<()> {
        debug!(event = event.name(), mode = %self.mode(), "handling controller event");
        match event {
            ControllerEvent::OpenCamera { facing } => self.open_camera(facing),
            ControllerEvent::FlipCamera => self.flip_camera(),
            ControllerEvent::CloseCamera => self.close_camera(),
            ControllerEvent::Capture => self.capture(),
            ControllerEvent::SelectFile {
                bytes,
                mime_type,
                file_name,
            } => self.select_file(bytes, &mime_type, file_name),
            ControllerEvent::SelectImage(image) => self.select_image(image),
            ControllerEvent::Submit => self.submit(),
            ControllerEvent::ResumePlayback => self.resume_playback(),
            ControllerEvent::ToggleNarration => {
                self.toggle_narration();
                Ok(())
            }
            ControllerEvent::Hint { control, trigger } => {
                self.hint(control, trigger);
                Ok(())
            }
            ControllerEvent::CameraFrameReady => {
                self.camera_frame_ready();
                Ok(())
            }
            ControllerEvent::CameraFault { name } => {
                self.camera_fault(&name);
                Ok(())
            }
            ControllerEvent::DescriptionFinished { request_id, result } => {
                self.on_description_finished(request_id, result);
                Ok(())
            }
            ControllerEvent::Playback(event) => {
                self.on_playback_event(event);
                Ok(())
            }
            ControllerEvent::Shutdown => {
                self.shutdown();
                Ok(())
            }
        }
    }

    // ---- camera ----

    /// Open the camera, tearing down any existing session first.
    ///
    /// On failure the camera stays closed and the held image (if any) is kept.
    /// A held image is also restored if the new session faults before its
    /// first frame.
    ///
    /// # Errors
    ///
    /// Camera taxonomy errors, or [`SightError::InvalidState`] while a
    /// request is in flight or audio is playing.
    pub fn open_camera(&mut self, facing: Option<Facing>) -> Result<()> {
        if matches!(self.mode(), Mode::Processing | Mode::PlayingResult) {
            return Err(self.invalid("open the camera"));
        }
        let facing = facing.unwrap_or(self.facing);
        self.close_session();

        if let Err(e) = self.start_session(facing) {
            self.restore_displaced_image();
            return self.fail(e);
        }
        if let Some(image) = self.image.take() {
            self.displaced_image = Some(image);
        }
        self.playback.discard_pending();
        self.error = None;
        self.set_status(prompts::STATUS_CAMERA_OPENING, true);
        self.publish_state();
        Ok(())
    }

    /// Reopen the camera with the opposite facing. Falls back to
    /// [`Mode::Idle`] if the reopen fails.
    ///
    /// # Errors
    ///
    /// Camera taxonomy errors, or [`SightError::InvalidState`] outside
    /// [`Mode::CameraOpen`].
    pub fn flip_camera(&mut self) -> Result<()> {
        if self.mode() != Mode::CameraOpen {
            return Err(self.invalid("flip the camera"));
        }
        let next = self.facing.flipped();
        self.close_session();

        if let Err(e) = self.start_session(next) {
            self.displaced_image = None;
            self.set_status(prompts::STATUS_START, false);
            return self.fail(e);
        }
        self.error = None;
        self.set_status(prompts::STATUS_CAMERA_OPENING, true);
        self.publish_state();
        Ok(())
    }

    /// Close the camera. A no-op when no session is open.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` keeps the event signature uniform.
    pub fn close_camera(&mut self) -> Result<()> {
        if self.camera.is_none() {
            debug!("close requested with no camera session");
            return Ok(());
        }
        self.close_session();
        self.displaced_image = None;
        self.error = None;
        self.set_status(prompts::STATUS_CAMERA_CLOSED, true);
        self.publish_state();
        Ok(())
    }

    /// Snapshot the current frame and close the camera.
    ///
    /// # Errors
    ///
    /// [`SightError::DeviceNotReady`] (camera stays open) before the first
    /// usable frame, or [`SightError::InvalidState`] outside
    /// [`Mode::CameraOpen`].
    pub fn capture(&mut self) -> Result<()> {
        if self.mode() != Mode::CameraOpen {
            return Err(self.invalid("capture a photo"));
        }
        let quality = self.camera_config.snapshot_quality;
        let snapshot = match self.camera.as_mut() {
            Some(session) => session
                .read_frame()
                .and_then(|frame| encode_snapshot(&frame, quality)),
            None => Err(SightError::DeviceNotReady),
        };
        let image = match snapshot {
            Ok(image) => image,
            Err(e) => return self.fail(e),
        };

        self.close_session();
        info!(bytes = image.len(), "photo captured");
        self.displaced_image = None;
        self.image = Some(image);
        self.error = None;

        if self.auto_submit {
            return self.submit();
        }
        self.set_status(prompts::STATUS_PHOTO_CAPTURED, true);
        self.publish_state();
        Ok(())
    }

    /// A frame arrived; the first one of a session is announced.
    pub fn camera_frame_ready(&mut self) {
        let announce = self
            .camera
            .as_mut()
            .is_some_and(CameraSession::take_ready_announcement);
        if announce {
            if self.displaced_image.take().is_some() {
                debug!("camera streaming; releasing previously held image");
            }
            self.set_status(prompts::STATUS_CAMERA_READY, true);
            self.publish_state();
        }
    }

    /// The platform reported the camera stream failed.
    pub fn camera_fault(&mut self, name: &str) {
        if !self.camera_is_open() {
            debug!(name, "camera fault with no open session");
            return;
        }
        self.close_session();
        self.restore_displaced_image();
        self.set_status(self.idle_status(), false);
        let err = SightError::from_camera_fault(name);
        self.report_error(&err);
        self.publish_state();
    }

    // ---- image selection and description ----

    /// Accept a file-picker selection.
    ///
    /// # Errors
    ///
    /// [`SightError::UnsupportedType`] for non-images (prior image kept) or
    /// [`SightError::AlreadyProcessing`] while a request is in flight.
    pub fn select_file(
        &mut self,
        bytes: Bytes,
        mime_type: &str,
        file_name: Option<String>,
    ) -> Result<()> {
        if self.in_flight.is_some() {
            return self.fail(SightError::AlreadyProcessing);
        }
        match CapturedImage::from_file(bytes, mime_type, file_name) {
            Ok(image) => self.select_image(image),
            Err(e) => self.fail(e),
        }
    }

    /// Replace the held image, stopping any camera or playback.
    ///
    /// # Errors
    ///
    /// [`SightError::AlreadyProcessing`] while a request is in flight.
    pub fn select_image(&mut self, image: CapturedImage) -> Result<()> {
        if self.in_flight.is_some() {
            return self.fail(SightError::AlreadyProcessing);
        }
        self.playback.stop();
        self.playback.discard_pending();
        self.close_session();

        info!(
            bytes = image.len(),
            mime = image.mime_type(),
            "image selected"
        );
        self.displaced_image = None;
        self.image = Some(image);
        self.error = None;

        if self.auto_submit {
            return self.submit();
        }
        self.set_status(prompts::STATUS_IMAGE_SELECTED, true);
        self.publish_state();
        Ok(())
    }

    /// Send the held image to the description backend.
    ///
    /// # Errors
    ///
    /// [`SightError::AlreadyProcessing`] while a request is in flight (no
    /// second request is issued), or [`SightError::InvalidState`] outside
    /// [`Mode::ImageReady`].
    pub fn submit(&mut self) -> Result<()> {
        if self.in_flight.is_some() {
            return self.fail(SightError::AlreadyProcessing);
        }
        if self.mode() != Mode::ImageReady {
            return Err(self.invalid("submit"));
        }
        let Some(image) = self.image.clone() else {
            return Err(self.invalid("submit"));
        };

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.in_flight = Some(request_id);
        self.error = None;
        self.playback.discard_pending();
        self.set_status(prompts::STATUS_PROCESSING, true);
        self.publish_state();

        let describer = Arc::clone(&self.describer);
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            let result = describer.describe(&image).await;
            let finished = ControllerEvent::DescriptionFinished { request_id, result };
            if loopback.send(finished).is_err() {
                debug!(request_id, "controller gone before description finished");
            }
        });
        info!(request_id, "description request dispatched");
        Ok(())
    }

    /// Apply the result of a description request.
    pub fn on_description_finished(
        &mut self,
        request_id: RequestId,
        result: Result<DescriptionAudio>,
    ) {
        if self.in_flight != Some(request_id) {
            debug!(request_id, in_flight = ?self.in_flight, "ignoring stale description result");
            return;
        }
        self.in_flight = None;

        match result {
            Ok(audio) => {
                // Narration must not talk over the description.
                self.narration.stop();
                match self.playback.play(audio) {
                    Ok(_) => {
                        self.error = None;
                        self.set_status(prompts::STATUS_PLAYING, false);
                    }
                    Err(SightError::PlaybackBlocked) => {
                        self.set_status(prompts::STATUS_TAP_TO_PLAY, false);
                        self.report_error(&SightError::PlaybackBlocked);
                    }
                    Err(e) => {
                        self.set_status(self.idle_status(), false);
                        self.report_error(&e);
                    }
                }
            }
            Err(e) => {
                self.set_status(self.idle_status(), false);
                self.report_error(&e);
            }
        }
        self.publish_state();
    }

    // ---- playback ----

    /// Apply an audio output report.
    pub fn on_playback_event(&mut self, event: PlaybackEvent) {
        let Some(outcome) = self.playback.on_event(event) else {
            return;
        };
        match outcome {
            PlaybackOutcome::Completed(id) => {
                info!(id, "description playback ended");
                self.set_status(prompts::STATUS_START, true);
            }
            PlaybackOutcome::Blocked(id) => {
                warn!(id, "description playback blocked after start");
                self.set_status(prompts::STATUS_TAP_TO_PLAY, false);
                self.report_error(&SightError::PlaybackBlocked);
            }
            PlaybackOutcome::Failed(id, message) => {
                warn!(id, %message, "description playback failed");
                self.set_status(self.idle_status(), false);
                self.report_error(&SightError::Audio(message));
            }
        }
        self.publish_state();
    }

    /// Retry description audio that was blocked.
    ///
    /// # Errors
    ///
    /// [`SightError::InvalidState`] when nothing is waiting, or the output's
    /// error if it refuses again.
    pub fn resume_playback(&mut self) -> Result<()> {
        if !self.playback.has_pending() {
            return Err(self.invalid("resume playback"));
        }
        self.narration.stop();
        match self.playback.resume() {
            Ok(Some(_)) => {
                self.error = None;
                self.set_status(prompts::STATUS_PLAYING, false);
                self.publish_state();
                Ok(())
            }
            Ok(None) => Err(self.invalid("resume playback")),
            // Blocked again: the clip is pending and the prompt still holds.
            Err(SightError::PlaybackBlocked) => self.fail(SightError::PlaybackBlocked),
            Err(e) => {
                self.set_status(self.idle_status(), false);
                self.fail(e)
            }
        }
    }

    // ---- narration ----

    /// Flip narration on or off. Never changes the mode.
    pub fn toggle_narration(&mut self) -> bool {
        let enabled = !self.narration.is_enabled();
        self.narration.set_enabled(enabled);
        if enabled {
            self.narration
                .speak(prompts::NARRATION_ON, NarrationStyle::Ambient);
        }
        info!(enabled, "narration toggled");
        self.publish_state();
        enabled
    }

    /// Speak the label of `control`. Hover is ignored where hover does not exist.
    pub fn hint(&mut self, control: Control, trigger: HintTrigger) -> Option<UtteranceId> {
        if trigger == HintTrigger::Hover && !self.hover_supported {
            debug!(?control, "hover hint ignored on touch platform");
            return None;
        }
        self.narration.speak(control.label(), NarrationStyle::Tooltip)
    }

    /// Release every resource. In-flight results are ignored afterwards.
    pub fn shutdown(&mut self) {
        self.narration.stop();
        self.playback.stop();
        self.playback.discard_pending();
        self.close_session();
        self.displaced_image = None;
        if let Some(request_id) = self.in_flight.take() {
            debug!(request_id, "abandoning in-flight description request");
        }
        info!("interaction controller shut down");
    }

    // ---- helpers ----

    fn camera_is_open(&self) -> bool {
        self.camera.as_ref().is_some_and(CameraSession::is_open)
    }

    fn start_session(&mut self, facing: Facing) -> Result<()> {
        let request = CameraRequest {
            facing,
            ideal_width: self.camera_config.ideal_width,
            ideal_height: self.camera_config.ideal_height,
        };
        let session = CameraSession::open(self.camera_device.as_mut(), &request)?;
        self.facing = facing;
        self.camera = Some(session);
        Ok(())
    }

    fn close_session(&mut self) {
        if let Some(mut session) = self.camera.take() {
            session.close();
        }
    }

    fn restore_displaced_image(&mut self) {
        if let Some(image) = self.displaced_image.take() {
            debug!("camera failed before streaming; restoring held image");
            self.image = Some(image);
        }
    }

    fn idle_status(&self) -> &'static str {
        if self.image.is_some() {
            prompts::STATUS_IMAGE_SELECTED
        } else {
            prompts::STATUS_START
        }
    }

    fn invalid(&self, operation: &'static str) -> SightError {
        let err = SightError::InvalidState {
            operation,
            mode: self.mode(),
        };
        debug!("{err}");
        err
    }

    fn fail<T>(&mut self, err: SightError) -> Result<T> {
        self.report_error(&err);
        self.publish_state();
        Err(err)
    }

    fn report_error(&mut self, err: &SightError) {
        let kind = err.kind();
        warn!(error = %err, ?kind, mode = %self.mode(), "interaction failed");
        self.error = Some(kind);
        let message = kind.user_message();
        let _ = self.notices.send(ControllerNotice::Error {
            kind,
            message: message.clone(),
        });
        self.narration.speak(&message, NarrationStyle::Ambient);
    }

    fn set_status(&mut self, text: &str, speak: bool) {
        self.status = text.to_owned();
        let _ = self.notices.send(ControllerNotice::Status(self.status.clone()));
        if speak {
            self.narration.speak(text, NarrationStyle::Ambient);
        }
    }

    fn publish_state(&self) {
        let _ = self
            .notices
            .send(ControllerNotice::StateChanged(self.ui_state()));
    }
}

impl Drop for InteractionController {
    fn drop(&mut self) {
        self.playback.stop();
        self.close_session();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::test_utils::{
        FakeAudioOutput, FakeCamera, FakeDescription, FakeSpeech, OutputCall, SpeechCall,
    };

    struct Harness {
        controller: InteractionController,
        loopback: mpsc::UnboundedReceiver<ControllerEvent>,
        camera: FakeCamera,
        speech: FakeSpeech,
        audio: FakeAudioOutput,
        backend: FakeDescription,
    }

    impl Harness {
        fn new(config: &SightConfig) -> Self {
            let camera = FakeCamera::new();
            let speech = FakeSpeech::new();
            let audio = FakeAudioOutput::new();
            let backend = FakeDescription::new();
            let (loopback_tx, loopback) = mpsc::unbounded_channel();
            let controller = InteractionController::new(
                config,
                Capabilities {
                    camera: Box::new(camera.clone()),
                    speech: Box::new(speech.clone()),
                    audio: Box::new(audio.clone()),
                    describer: Arc::new(backend.clone()),
                },
                loopback_tx,
            );
            Self {
                controller,
                loopback,
                camera,
                speech,
                audio,
                backend,
            }
        }

        /// Manual submission, the way the earliest screens behaved.
        fn manual() -> Self {
            let mut config = SightConfig::default();
            config.behavior.auto_submit = false;
            Self::new(&config)
        }

        /// Deliver the next loopback event (the description result).
        async fn pump(&mut self) {
            let event = self.loopback.recv().await.unwrap();
            self.controller.handle(event).unwrap();
        }

        fn select_png(&mut self) {
            self.controller
                .select_file(
                    Bytes::from(vec![0x89u8; 500 * 1024]),
                    "image/png",
                    Some("photo.png".into()),
                )
                .unwrap();
        }

        fn open_with_frame(&mut self) {
            self.controller.open_camera(None).unwrap();
            self.camera.push_frame(FakeCamera::sample_frame());
        }
    }

    fn drain_modes(rx: &mut broadcast::Receiver<ControllerNotice>) -> Vec<Mode> {
        let mut modes: Vec<Mode> = Vec::new();
        while let Ok(notice) = rx.try_recv() {
            if let ControllerNotice::StateChanged(state) = notice {
                if modes.last() != Some(&state.mode) {
                    modes.push(state.mode);
                }
            }
        }
        modes
    }

    #[test]
    fn starts_idle() {
        let h = Harness::manual();
        let state = h.controller.ui_state();
        assert_eq!(state.mode, Mode::Idle);
        assert!(state.tts_enabled);
        assert_eq!(state.status, prompts::STATUS_START);
        assert!(state.error.is_none());
    }

    #[test]
    fn camera_sessions_never_overlap() {
        let mut h = Harness::manual();
        h.controller.open_camera(None).unwrap();
        h.controller.open_camera(Some(Facing::Front)).unwrap();
        h.controller.flip_camera().unwrap();
        h.controller.flip_camera().unwrap();
        h.controller.close_camera().unwrap();
        h.controller.close_camera().unwrap();
        assert_eq!(h.controller.mode(), Mode::Idle);
        assert_eq!(h.camera.open_streams(), 0);

        h.open_with_frame();
        h.controller.capture().unwrap();
        assert_eq!(h.controller.mode(), Mode::ImageReady);
        assert_eq!(h.camera.open_streams(), 0);
        assert_eq!(h.camera.max_open_streams(), 1);
        assert_eq!(
            h.camera.opened(),
            vec![
                Facing::Back,
                Facing::Front,
                Facing::Back,
                Facing::Front,
                Facing::Front
            ]
        );
    }

    #[test]
    fn capture_before_first_frame_keeps_camera_open() {
        let mut h = Harness::manual();
        h.controller.open_camera(None).unwrap();

        let err = h.controller.capture().unwrap_err();
        assert!(matches!(err, SightError::DeviceNotReady));
        assert_eq!(h.controller.mode(), Mode::CameraOpen);
        assert_eq!(h.camera.open_streams(), 1);
        assert_eq!(
            h.controller.ui_state().error,
            Some(ErrorKind::DeviceNotReady)
        );

        // Retry succeeds once a frame arrives.
        h.camera.push_frame(FakeCamera::sample_frame());
        h.controller.capture().unwrap();
        let image = h.controller.image().unwrap();
        assert_eq!(image.source(), SourceKind::CameraSnapshot);
        assert_eq!(image.mime_type(), "image/jpeg");
        assert!(h.controller.ui_state().error.is_none());
    }

    #[test]
    fn black_frame_is_not_captured() {
        let mut h = Harness::manual();
        h.controller.open_camera(None).unwrap();
        h.camera
            .push_frame(crate::capture::VideoFrame::new(2, 2, vec![0; 12]).unwrap());
        assert!(matches!(
            h.controller.capture(),
            Err(SightError::DeviceNotReady)
        ));
        assert!(h.controller.image().is_none());
    }

    #[test]
    fn permission_denied_leaves_camera_closed_and_idle() {
        let mut h = Harness::manual();
        h.camera
            .fail_next_open(SightError::from_camera_fault("NotAllowedError"));

        let err = h.controller.open_camera(Some(Facing::Back)).unwrap_err();
        assert!(matches!(err, SightError::PermissionDenied));
        let state = h.controller.ui_state();
        assert_eq!(state.mode, Mode::Idle);
        assert!(!state.camera_open);
        assert_eq!(state.error, Some(ErrorKind::PermissionDenied));
        assert_eq!(h.camera.open_streams(), 0);
        assert!(
            h.speech
                .spoken()
                .contains(&ErrorKind::PermissionDenied.user_message())
        );
    }

    #[test]
    fn failed_open_keeps_held_image() {
        let mut h = Harness::manual();
        h.select_png();
        h.camera.fail_next_open(SightError::NoDevice);

        assert!(h.controller.open_camera(None).is_err());
        assert_eq!(h.controller.mode(), Mode::ImageReady);
        assert!(h.controller.image().is_some());
    }

    #[test]
    fn successful_open_clears_held_image() {
        let mut h = Harness::manual();
        h.select_png();
        h.controller.open_camera(None).unwrap();
        assert_eq!(h.controller.mode(), Mode::CameraOpen);
        assert!(h.controller.image().is_none());
    }

    #[test]
    fn fault_before_first_frame_restores_held_image() {
        let mut h = Harness::manual();
        h.select_png();
        h.controller.open_camera(None).unwrap();
        assert!(h.controller.image().is_none());

        h.controller.camera_fault("NotAllowedError");
        let state = h.controller.ui_state();
        assert_eq!(state.mode, Mode::ImageReady);
        assert!(state.has_image);
        assert_eq!(state.image_source, Some(SourceKind::File));
        assert_eq!(state.error, Some(ErrorKind::PermissionDenied));
        assert_eq!(state.status, prompts::STATUS_IMAGE_SELECTED);
        assert_eq!(h.camera.open_streams(), 0);
    }

    #[test]
    fn fault_after_first_frame_drops_held_image() {
        let mut h = Harness::manual();
        h.select_png();
        h.controller.open_camera(None).unwrap();
        h.controller.camera_frame_ready();

        h.controller.camera_fault("NotReadableError");
        let state = h.controller.ui_state();
        assert_eq!(state.mode, Mode::Idle);
        assert!(!state.has_image);
        assert_eq!(state.status, prompts::STATUS_START);
    }

    #[test]
    fn closing_camera_does_not_bring_back_old_image() {
        let mut h = Harness::manual();
        h.select_png();
        h.controller.open_camera(None).unwrap();
        h.controller.close_camera().unwrap();
        h.controller.camera_fault("NotAllowedError");
        assert_eq!(h.controller.mode(), Mode::Idle);
        assert!(h.controller.image().is_none());
    }

    #[test]
    fn failed_flip_falls_back_to_idle() {
        let mut h = Harness::manual();
        h.controller.open_camera(None).unwrap();
        h.camera.fail_next_open(SightError::DeviceBusy);

        let err = h.controller.flip_camera().unwrap_err();
        assert!(matches!(err, SightError::DeviceBusy));
        assert_eq!(h.controller.mode(), Mode::Idle);
        assert_eq!(h.camera.open_streams(), 0);
        assert_eq!(h.controller.ui_state().error, Some(ErrorKind::DeviceBusy));
    }

    #[test]
    fn flip_outside_camera_mode_is_invalid() {
        let mut h = Harness::manual();
        let err = h.controller.flip_camera().unwrap_err();
        assert!(matches!(
            err,
            SightError::InvalidState {
                mode: Mode::Idle,
                ..
            }
        ));
        assert_eq!(err.to_string(), "cannot flip the camera while idle");
    }

    #[test]
    fn capture_outside_camera_mode_is_invalid() {
        let mut h = Harness::manual();
        assert!(matches!(
            h.controller.capture(),
            Err(SightError::InvalidState { .. })
        ));
    }

    #[test]
    fn camera_ready_is_announced_once_per_session() {
        let mut h = Harness::manual();
        h.controller.open_camera(None).unwrap();
        h.controller.camera_frame_ready();
        h.controller.camera_frame_ready();
        let ready = h
            .speech
            .spoken()
            .iter()
            .filter(|t| t.as_str() == prompts::STATUS_CAMERA_READY)
            .count();
        assert_eq!(ready, 1);

        h.controller.flip_camera().unwrap();
        h.controller.camera_frame_ready();
        let ready = h
            .speech
            .spoken()
            .iter()
            .filter(|t| t.as_str() == prompts::STATUS_CAMERA_READY)
            .count();
        assert_eq!(ready, 2);
    }

    #[test]
    fn camera_fault_closes_session() {
        let mut h = Harness::manual();
        h.controller.open_camera(None).unwrap();
        h.controller.camera_fault("NotReadableError");
        assert_eq!(h.controller.mode(), Mode::Idle);
        assert_eq!(h.camera.open_streams(), 0);
        assert_eq!(h.controller.ui_state().error, Some(ErrorKind::DeviceBusy));
    }

    #[test]
    fn select_file_rejects_non_images() {
        let mut h = Harness::manual();
        let err = h
            .controller
            .select_file(Bytes::from_static(b"%PDF-1.7"), "application/pdf", None)
            .unwrap_err();
        assert!(matches!(err, SightError::UnsupportedType(_)));
        assert_eq!(h.controller.mode(), Mode::Idle);
        assert_eq!(
            h.controller.ui_state().error,
            Some(ErrorKind::UnsupportedType)
        );
    }

    #[test]
    fn select_file_closes_open_camera() {
        let mut h = Harness::manual();
        h.controller.open_camera(None).unwrap();
        h.select_png();
        assert_eq!(h.controller.mode(), Mode::ImageReady);
        assert_eq!(h.camera.open_streams(), 0);
        assert_eq!(h.controller.ui_state().status, prompts::STATUS_IMAGE_SELECTED);
    }

    #[tokio::test]
    async fn photo_flow_reaches_playback_and_silences_narration() {
        let mut h = Harness::manual();
        let mut notices = h.controller.subscribe();

        h.select_png();
        h.controller.submit().unwrap();
        assert_eq!(h.controller.mode(), Mode::Processing);
        assert_eq!(
            h.speech.current().unwrap().text,
            "Processing image. Please wait."
        );

        h.pump().await;
        assert_eq!(h.controller.mode(), Mode::PlayingResult);
        assert_eq!(h.audio.play_count(), 1);
        assert!(h.speech.current().is_none());
        assert_eq!(h.speech.calls().last(), Some(&SpeechCall::Cancel));
        assert_eq!(h.controller.ui_state().status, prompts::STATUS_PLAYING);

        assert_eq!(
            drain_modes(&mut notices),
            vec![Mode::ImageReady, Mode::Processing, Mode::PlayingResult]
        );

        let request = &h.backend.requests()[0];
        assert_eq!(request.mime_type(), "image/png");
        assert_eq!(request.len(), 500 * 1024);
    }

    #[tokio::test]
    async fn playback_end_fires_once_and_keeps_image() {
        let mut h = Harness::manual();
        h.select_png();
        h.controller.submit().unwrap();
        h.pump().await;

        let id = h.audio.last_play().unwrap();
        let mut notices = h.controller.subscribe();
        h.controller
            .on_playback_event(PlaybackEvent::Finished { id });
        assert_eq!(h.controller.mode(), Mode::ImageReady);
        assert!(h.controller.image().is_some());
        assert_eq!(drain_modes(&mut notices), vec![Mode::ImageReady]);

        // Duplicate report is dropped without a state change.
        h.controller
            .on_playback_event(PlaybackEvent::Finished { id });
        assert!(drain_modes(&mut notices).is_empty());
        assert_eq!(h.audio.play_count(), 1);
    }

    #[tokio::test]
    async fn second_submit_while_processing_is_rejected() {
        let mut h = Harness::manual();
        h.select_png();
        h.controller.submit().unwrap();

        let err = h.controller.submit().unwrap_err();
        assert!(matches!(err, SightError::AlreadyProcessing));
        assert_eq!(h.controller.mode(), Mode::Processing);

        h.pump().await;
        assert_eq!(h.backend.call_count(), 1);
        assert_eq!(h.audio.play_count(), 1);
    }

    #[tokio::test]
    async fn select_file_while_processing_is_rejected() {
        let mut h = Harness::manual();
        h.select_png();
        h.controller.submit().unwrap();
        let err = h
            .controller
            .select_file(Bytes::from_static(b"\xff\xd8"), "image/jpeg", None)
            .unwrap_err();
        assert!(matches!(err, SightError::AlreadyProcessing));
        assert_eq!(h.controller.image().unwrap().mime_type(), "image/png");
        h.pump().await;
    }

    #[tokio::test]
    async fn server_error_returns_to_image_ready() {
        let mut h = Harness::manual();
        h.backend.push_response(Err(SightError::Server {
            status: 500,
            message: None,
        }));
        h.select_png();
        h.controller.submit().unwrap();
        h.pump().await;

        let state = h.controller.ui_state();
        assert_eq!(state.mode, Mode::ImageReady);
        assert_eq!(state.error, Some(ErrorKind::ServerError { status: 500 }));
        assert!(state.has_image);
        assert_eq!(h.audio.play_count(), 0);

        // Resubmission is available and goes out as a fresh request.
        h.controller.submit().unwrap();
        h.pump().await;
        assert_eq!(h.backend.call_count(), 2);
        assert_eq!(h.controller.mode(), Mode::PlayingResult);
    }

    #[tokio::test]
    async fn network_error_is_spoken() {
        let mut h = Harness::manual();
        h.backend
            .push_response(Err(SightError::Network("connection refused".into())));
        h.select_png();
        h.controller.submit().unwrap();
        h.pump().await;
        assert_eq!(h.controller.mode(), Mode::ImageReady);
        assert_eq!(
            h.speech.current().unwrap().text,
            ErrorKind::NetworkError.user_message()
        );
    }

    #[tokio::test]
    async fn capture_auto_submits_snapshot() {
        let mut h = Harness::new(&SightConfig::default());
        h.open_with_frame();
        h.controller.capture().unwrap();
        assert_eq!(h.controller.mode(), Mode::Processing);
        assert_eq!(h.camera.open_streams(), 0);

        h.pump().await;
        let requests = h.backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].source(), SourceKind::CameraSnapshot);
        assert_eq!(h.controller.mode(), Mode::PlayingResult);
    }

    #[tokio::test]
    async fn selecting_during_playback_stops_audio() {
        let mut h = Harness::manual();
        h.select_png();
        h.controller.submit().unwrap();
        h.pump().await;
        let first = h.audio.last_play().unwrap();

        h.select_png();
        assert_eq!(h.controller.mode(), Mode::ImageReady);
        assert_eq!(h.audio.calls(), vec![OutputCall::Play(first), OutputCall::Stop]);

        // The stopped playback never reports completion to the user.
        h.controller
            .on_playback_event(PlaybackEvent::Finished { id: first });
        assert_eq!(h.controller.ui_state().status, prompts::STATUS_IMAGE_SELECTED);
    }

    #[tokio::test]
    async fn blocked_playback_offers_tap_to_play() {
        let mut h = Harness::manual();
        h.audio.block_next_play();
        h.select_png();
        h.controller.submit().unwrap();
        h.pump().await;

        let state = h.controller.ui_state();
        assert_eq!(state.mode, Mode::ImageReady);
        assert!(state.awaiting_tap_to_play);
        assert_eq!(state.error, Some(ErrorKind::PlaybackBlocked));
        assert_eq!(state.status, prompts::STATUS_TAP_TO_PLAY);

        h.controller.resume_playback().unwrap();
        let state = h.controller.ui_state();
        assert_eq!(state.mode, Mode::PlayingResult);
        assert!(!state.awaiting_tap_to_play);
        assert!(state.error.is_none());
        assert_eq!(h.audio.play_count(), 1);
        assert_eq!(h.backend.call_count(), 1);
    }

    #[tokio::test]
    async fn playback_start_failure_leaves_processing_status() {
        let mut h = Harness::manual();
        h.audio
            .fail_next_play(SightError::Audio("no default output device".into()));
        h.select_png();
        h.controller.submit().unwrap();
        h.pump().await;

        let state = h.controller.ui_state();
        assert_eq!(state.mode, Mode::ImageReady);
        assert_eq!(state.status, prompts::STATUS_IMAGE_SELECTED);
        assert_eq!(state.error, Some(ErrorKind::Internal));
        assert!(!state.awaiting_tap_to_play);

        // The image is still there to resubmit.
        h.controller.submit().unwrap();
        h.pump().await;
        assert_eq!(h.controller.mode(), Mode::PlayingResult);
    }

    #[tokio::test]
    async fn playback_failure_mid_clip_returns_to_image_ready() {
        let mut h = Harness::manual();
        h.select_png();
        h.controller.submit().unwrap();
        h.pump().await;
        let id = h.audio.last_play().unwrap();

        h.controller.on_playback_event(PlaybackEvent::Failed {
            id,
            message: "device unplugged".into(),
        });
        let state = h.controller.ui_state();
        assert_eq!(state.mode, Mode::ImageReady);
        assert_eq!(state.status, prompts::STATUS_IMAGE_SELECTED);
        assert_eq!(state.error, Some(ErrorKind::Internal));
        assert_eq!(
            h.speech.current().unwrap().text,
            ErrorKind::Internal.user_message()
        );

        // A stale failure for the same clip is dropped.
        h.controller.on_playback_event(PlaybackEvent::Failed {
            id,
            message: "again".into(),
        });
        assert_eq!(h.controller.mode(), Mode::ImageReady);
    }

    #[tokio::test]
    async fn failed_resume_drops_tap_to_play_prompt() {
        let mut h = Harness::manual();
        h.audio.block_next_play();
        h.select_png();
        h.controller.submit().unwrap();
        h.pump().await;
        assert!(h.controller.ui_state().awaiting_tap_to_play);

        h.audio
            .fail_next_play(SightError::Audio("decoder gave up".into()));
        let err = h.controller.resume_playback().unwrap_err();
        assert!(matches!(err, SightError::Audio(_)));

        let state = h.controller.ui_state();
        assert_eq!(state.mode, Mode::ImageReady);
        assert!(!state.awaiting_tap_to_play);
        assert_ne!(state.status, prompts::STATUS_TAP_TO_PLAY);
        assert_eq!(state.status, prompts::STATUS_IMAGE_SELECTED);
        assert_eq!(state.error, Some(ErrorKind::Internal));
    }

    #[tokio::test]
    async fn resume_blocked_again_keeps_clip_pending() {
        let mut h = Harness::manual();
        h.audio.block_next_play();
        h.select_png();
        h.controller.submit().unwrap();
        h.pump().await;

        h.audio.block_next_play();
        assert!(matches!(
            h.controller.resume_playback(),
            Err(SightError::PlaybackBlocked)
        ));
        let state = h.controller.ui_state();
        assert!(state.awaiting_tap_to_play);
        assert_eq!(state.status, prompts::STATUS_TAP_TO_PLAY);

        h.controller.resume_playback().unwrap();
        assert_eq!(h.controller.mode(), Mode::PlayingResult);
    }

    #[test]
    fn resume_without_pending_audio_is_invalid() {
        let mut h = Harness::manual();
        assert!(matches!(
            h.controller.resume_playback(),
            Err(SightError::InvalidState { .. })
        ));
    }

    #[test]
    fn toggle_narration_never_changes_mode() {
        let mut h = Harness::manual();
        h.controller.open_camera(None).unwrap();

        assert!(!h.controller.toggle_narration());
        assert_eq!(h.controller.mode(), Mode::CameraOpen);
        assert!(!h.controller.ui_state().tts_enabled);
        assert!(h.speech.current().is_none());
        assert!(
            h.controller
                .hint(Control::Capture, HintTrigger::Focus)
                .is_none()
        );

        assert!(h.controller.toggle_narration());
        assert_eq!(h.controller.mode(), Mode::CameraOpen);
        assert_eq!(h.speech.current().unwrap().text, prompts::NARRATION_ON);
    }

    #[test]
    fn hover_hints_follow_pointer_capability() {
        let mut h = Harness::manual();
        assert!(
            h.controller
                .hint(Control::Camera, HintTrigger::Hover)
                .is_none()
        );
        assert!(
            h.controller
                .hint(Control::Camera, HintTrigger::Focus)
                .is_some()
        );
        assert!(
            h.controller
                .hint(Control::Gallery, HintTrigger::LongPress)
                .is_some()
        );
        assert_eq!(h.speech.current().unwrap().text, Control::Gallery.label());

        let mut config = SightConfig::default();
        config.narration.hover_supported = true;
        let mut desktop = Harness::new(&config);
        assert!(
            desktop
                .controller
                .hint(Control::Camera, HintTrigger::Hover)
                .is_some()
        );
        assert_eq!(desktop.controller.mode(), Mode::Idle);
    }

    #[test]
    fn tooltip_cancels_status_narration() {
        let mut h = Harness::manual();
        h.select_png();
        h.speech.clear_calls();
        h.controller.hint(Control::Describe, HintTrigger::Focus);
        assert_eq!(
            h.speech.calls(),
            vec![
                SpeechCall::Cancel,
                SpeechCall::Speak(Control::Describe.label().to_owned())
            ]
        );
        assert!(h.speech.completed().is_empty());
    }

    #[tokio::test]
    async fn shutdown_releases_everything_and_ignores_late_results() {
        let mut h = Harness::manual();
        h.select_png();
        h.controller.submit().unwrap();
        h.controller.shutdown();
        assert_eq!(h.controller.mode(), Mode::ImageReady);

        h.pump().await;
        assert_eq!(h.controller.mode(), Mode::ImageReady);
        assert_eq!(h.audio.play_count(), 0);
    }

    #[test]
    fn dropping_controller_closes_camera() {
        let mut h = Harness::manual();
        h.controller.open_camera(None).unwrap();
        let camera = h.camera.clone();
        drop(h);
        assert_eq!(camera.open_streams(), 0);
    }

    #[test]
    fn errors_are_published_as_notices() {
        let mut h = Harness::manual();
        let mut notices = h.controller.subscribe();
        h.camera.fail_next_open(SightError::NoDevice);
        let _ = h.controller.open_camera(None);

        let mut saw_error = false;
        while let Ok(notice) = notices.try_recv() {
            if let ControllerNotice::Error { kind, message } = notice {
                assert_eq!(kind, ErrorKind::NoDevice);
                assert_eq!(message, ErrorKind::NoDevice.user_message());
                saw_error = true;
            }
        }
        assert!(saw_error);
    }
}
