//! Spoken UI narration through a single speech channel.
//!
//! [`NarrationEngine`] owns the one speech slot. Every `speak` cancels the
//! utterance in progress before starting the next, whatever its style, so
//! status and tooltip narration never interleave.

use crate::config::{NarrationConfig, VoicePreset};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Identifier of a dispatched utterance.
pub type UtteranceId = u64;

/// Narration style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationStyle {
    /// Status updates ("Processing image. Please wait.").
    Ambient,
    /// Label of the control under hover, focus or long-press.
    Tooltip,
}

/// One utterance handed to the speech capability.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: UtteranceId,
    pub text: String,
    pub style: NarrationStyle,
    pub voice: VoicePreset,
}

/// Platform speech synthesis.
pub trait SpeechSynthesizer: Send {
    /// Whether speech output exists on this platform.
    fn is_available(&self) -> bool;

    /// Start speaking. The engine has already cancelled any prior utterance.
    fn speak(&mut self, utterance: &Utterance) -> Result<()>;

    /// Cancel whatever is being spoken. Must be harmless when silent.
    fn cancel(&mut self);

    fn is_speaking(&self) -> bool;
}

/// Speech capability for platforms without one.
#[derive(Debug, Default)]
pub struct SilentSpeech;

impl SpeechSynthesizer for SilentSpeech {
    fn is_available(&self) -> bool {
        false
    }

    fn speak(&mut self, _utterance: &Utterance) -> Result<()> {
        Ok(())
    }

    fn cancel(&mut self) {}

    fn is_speaking(&self) -> bool {
        false
    }
}

/// Serializes narration onto one speech channel.
pub struct NarrationEngine {
    synth: Box<dyn SpeechSynthesizer>,
    enabled: bool,
    ambient: VoicePreset,
    tooltip: VoicePreset,
    next_id: UtteranceId,
}

impl NarrationEngine {
    pub fn new(synth: Box<dyn SpeechSynthesizer>, config: &NarrationConfig) -> Self {
        Self {
            synth,
            enabled: config.enabled,
            ambient: config.ambient,
            tooltip: config.tooltip,
            next_id: 1,
        }
    }

    /// Speak `text`, cancelling anything in progress.
    ///
    /// Returns `None` without error when narration is disabled, speech is
    /// unavailable, the text is blank, or the platform rejected the utterance.
    pub fn speak(&mut self, text: &str, style: NarrationStyle) -> Option<UtteranceId> {
        let text = text.trim();
        if !self.enabled || text.is_empty() || !self.synth.is_available() {
            return None;
        }

        self.synth.cancel();

        let id = self.next_id;
        self.next_id += 1;
        let utterance = Utterance {
            id,
            text: text.to_owned(),
            style,
            voice: match style {
                NarrationStyle::Ambient => self.ambient,
                NarrationStyle::Tooltip => self.tooltip,
            },
        };

        match self.synth.speak(&utterance) {
            Ok(()) => {
                debug!(id, ?style, text = %utterance.text, "narrating");
                Some(id)
            }
            Err(e) => {
                warn!("speech synthesis rejected utterance: {e}");
                None
            }
        }
    }

    /// Cancel the current utterance, if any.
    pub fn stop(&mut self) {
        if self.synth.is_available() {
            self.synth.cancel();
        }
    }

    /// Enable or disable narration. Disabling silences immediately.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.stop();
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.synth.is_available() && self.synth.is_speaking()
    }
}
