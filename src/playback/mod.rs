//! Single-slot playback of description audio.
//!
//! [`PlaybackController`] owns the one audio output. Starting new audio stops
//! the previous playback first, and each play reports its natural end exactly
//! once: late or duplicate completion events for superseded playbacks are
//! dropped here.

pub mod cpal_output;
pub mod decode;

use crate::description::DescriptionAudio;
use crate::error::{Result, SightError};
use tracing::{debug, info, warn};

pub use cpal_output::CpalAudioOutput;

/// Identifier of one `play` call.
pub type PlaybackId = u64;

/// Reports from an [`AudioOutput`] back to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Audio reached its natural end.
    Finished { id: PlaybackId },
    /// The platform refused to start audio after `play` returned.
    Blocked { id: PlaybackId },
    /// Decoding or the device failed mid-stream.
    Failed { id: PlaybackId, message: String },
}

impl PlaybackEvent {
    #[must_use]
    pub fn id(&self) -> PlaybackId {
        match self {
            Self::Finished { id } | Self::Blocked { id } | Self::Failed { id, .. } => *id,
        }
    }
}

/// Platform audio output.
///
/// Implementations report completion asynchronously through the
/// [`PlaybackEvent`] channel they were built with. A stopped playback must
/// not report `Finished`.
pub trait AudioOutput: Send {
    /// Start playing `audio`.
    ///
    /// # Errors
    ///
    /// [`SightError::PlaybackBlocked`] when the platform refuses to start, or
    /// [`SightError::Audio`] for device/decoder failures.
    fn play(&mut self, id: PlaybackId, audio: &DescriptionAudio) -> Result<()>;

    /// Stop and release the current playback, if any.
    fn stop(&mut self);
}

/// What a [`PlaybackEvent`] meant for the active playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed(PlaybackId),
    Blocked(PlaybackId),
    Failed(PlaybackId, String),
}

/// Owner of the audio output slot.
pub struct PlaybackController {
    output: Box<dyn AudioOutput>,
    active: Option<(PlaybackId, DescriptionAudio)>,
    /// Audio whose playback was blocked, kept for a user-initiated retry.
    pending: Option<DescriptionAudio>,
    next_id: PlaybackId,
}

impl PlaybackController {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            active: None,
            pending: None,
            next_id: 1,
        }
    }

    /// Play `audio`, replacing whatever is playing.
    ///
    /// # Errors
    ///
    /// Returns [`SightError::PlaybackBlocked`] (audio kept for
    /// [`resume`](Self::resume)) or the output's error.
    pub fn play(&mut self, audio: DescriptionAudio) -> Result<PlaybackId> {
        self.stop();
        self.pending = None;

        let id = self.next_id;
        self.next_id += 1;

        match self.output.play(id, &audio) {
            Ok(()) => {
                info!(id, bytes = audio.bytes.len(), "playback started");
                self.active = Some((id, audio));
                Ok(id)
            }
            Err(SightError::PlaybackBlocked) => {
                warn!(id, "playback blocked; waiting for user gesture");
                self.pending = Some(audio);
                Err(SightError::PlaybackBlocked)
            }
            Err(e) => Err(e),
        }
    }

    /// Retry audio whose playback was blocked.
    ///
    /// Returns `Ok(None)` when nothing is pending.
    ///
    /// # Errors
    ///
    /// Same as [`play`](Self::play).
    pub fn resume(&mut self) -> Result<Option<PlaybackId>> {
        match self.pending.take() {
            Some(audio) => self.play(audio).map(Some),
            None => Ok(None),
        }
    }

    /// Stop the active playback without reporting completion.
    pub fn stop(&mut self) {
        if let Some((id, _)) = self.active.take() {
            self.output.stop();
            info!(id, "playback stopped");
        }
    }

    /// Interpret an output report. Returns `None` for events that do not
    /// belong to the active playback.
    pub fn on_event(&mut self, event: PlaybackEvent) -> Option<PlaybackOutcome> {
        let active_id = self.active.as_ref().map(|(id, _)| *id);
        if active_id != Some(event.id()) {
            debug!(?event, ?active_id, "ignoring stale playback event");
            return None;
        }
        let (id, audio) = self.active.take()?;
        match event {
            PlaybackEvent::Finished { .. } => Some(PlaybackOutcome::Completed(id)),
            PlaybackEvent::Blocked { .. } => {
                self.pending = Some(audio);
                Some(PlaybackOutcome::Blocked(id))
            }
            PlaybackEvent::Failed { message, .. } => Some(PlaybackOutcome::Failed(id, message)),
        }
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub fn active_id(&self) -> Option<PlaybackId> {
        self.active.as_ref().map(|(id, _)| *id)
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop blocked audio the user no longer wants.
    pub fn discard_pending(&mut self) {
        self.pending = None;
    }
}
