//! Capability implementations backed by a native shell.
//!
//! The shell owns the real camera, speech synthesizer and audio element. The
//! proxies here turn capability calls into [`EventEnvelope`]s, and the
//! command router feeds the shell's reports (frames, finished utterances,
//! playback ends) back through the shared handles.

use crate::capture::snapshot::decode_frame;
use crate::capture::{CameraDevice, CameraRequest, CameraStream, VideoFrame};
use crate::description::DescriptionAudio;
use crate::error::Result;
use crate::host::contract::{EventEnvelope, events};
use crate::narration::{SpeechSynthesizer, Utterance, UtteranceId};
use crate::playback::{AudioOutput, PlaybackId};
use base64::Engine as _;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

/// Broadcasts events to the shell with fresh event ids.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventSink {
    #[must_use]
    pub fn new(tx: broadcast::Sender<EventEnvelope>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: &str, payload: serde_json::Value) {
        let envelope =
            EventEnvelope::new(uuid::Uuid::new_v4().to_string(), event.to_owned(), payload);
        let _ = self.tx.send(envelope);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Camera
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct FrameSlot {
    streaming: bool,
    frame: Option<VideoFrame>,
}

/// Receiving side of shell camera frames.
#[derive(Debug, Clone, Default)]
pub struct CameraFeed {
    slot: Arc<Mutex<FrameSlot>>,
}

impl CameraFeed {
    /// Store an encoded frame (JPEG/PNG) pushed by the shell.
    ///
    /// Returns `Ok(false)` when no stream is open and the frame was dropped.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the frame cannot be decoded.
    pub fn push_encoded(&self, encoded: &[u8]) -> Result<bool> {
        let frame = decode_frame(encoded)?;
        Ok(self.push(frame))
    }

    /// Store a decoded frame. Returns `false` when no stream is open.
    pub fn push(&self, frame: VideoFrame) -> bool {
        let Ok(mut slot) = self.slot.lock() else {
            return false;
        };
        if !slot.streaming {
            debug!("dropping camera frame with no open stream");
            return false;
        }
        slot.frame = Some(frame);
        true
    }

    fn start(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.streaming = true;
            slot.frame = None;
        }
    }

    fn stop(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.streaming = false;
            slot.frame = None;
        }
    }

    fn latest(&self) -> Option<VideoFrame> {
        self.slot.lock().ok().and_then(|slot| slot.frame.clone())
    }
}

/// Camera whose stream lives in the shell.
///
/// Opening is optimistic: the shell reports refusal later with
/// `camera.fault`.
pub struct HostCamera {
    sink: EventSink,
    feed: CameraFeed,
}

impl HostCamera {
    #[must_use]
    pub fn new(sink: EventSink, feed: CameraFeed) -> Self {
        Self { sink, feed }
    }
}

impl CameraDevice for HostCamera {
    fn open(&mut self, request: &CameraRequest) -> Result<Box<dyn CameraStream>> {
        self.feed.start();
        self.sink.emit(
            events::CAMERA_START_REQUESTED,
            serde_json::json!({
                "facing": request.facing.as_str(),
                "facing_mode": request.facing.as_facing_mode(),
                "ideal_width": request.ideal_width,
                "ideal_height": request.ideal_height,
            }),
        );
        Ok(Box::new(HostCameraStream {
            sink: self.sink.clone(),
            feed: self.feed.clone(),
            stopped: false,
        }))
    }
}

struct HostCameraStream {
    sink: EventSink,
    feed: CameraFeed,
    stopped: bool,
}

impl CameraStream for HostCameraStream {
    fn latest_frame(&mut self) -> Option<VideoFrame> {
        if self.stopped {
            return None;
        }
        self.feed.latest()
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.feed.stop();
        self.sink
            .emit(events::CAMERA_STOP_REQUESTED, serde_json::json!({}));
    }
}

// ---------------------------------------------------------------------------
// Speech
// ---------------------------------------------------------------------------

/// Which utterance the shell is currently speaking.
#[derive(Debug, Clone, Default)]
pub struct SpeechTracker {
    current: Arc<Mutex<Option<UtteranceId>>>,
}

impl SpeechTracker {
    /// The shell finished (or gave up on) utterance `id`.
    pub fn finished(&self, id: UtteranceId) {
        if let Ok(mut current) = self.current.lock() {
            if *current == Some(id) {
                *current = None;
            }
        }
    }

    fn set(&self, id: Option<UtteranceId>) {
        if let Ok(mut current) = self.current.lock() {
            *current = id;
        }
    }

    fn get(&self) -> Option<UtteranceId> {
        self.current.lock().ok().and_then(|c| *c)
    }
}

/// Speech synthesis performed by the shell.
pub struct HostSpeech {
    sink: EventSink,
    tracker: SpeechTracker,
    available: bool,
}

impl HostSpeech {
    #[must_use]
    pub fn new(sink: EventSink, tracker: SpeechTracker, available: bool) -> Self {
        Self {
            sink,
            tracker,
            available,
        }
    }
}

impl SpeechSynthesizer for HostSpeech {
    fn is_available(&self) -> bool {
        self.available
    }

    fn speak(&mut self, utterance: &Utterance) -> Result<()> {
        self.tracker.set(Some(utterance.id));
        self.sink.emit(
            events::NARRATION_SPEAK,
            serde_json::json!({
                "id": utterance.id,
                "text": utterance.text,
                "style": utterance.style,
                "rate": utterance.voice.rate,
                "pitch": utterance.voice.pitch,
                "volume": utterance.voice.volume,
            }),
        );
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(id) = self.tracker.get() {
            self.tracker.set(None);
            self.sink
                .emit(events::NARRATION_CANCEL, serde_json::json!({ "id": id }));
        }
    }

    fn is_speaking(&self) -> bool {
        self.tracker.get().is_some()
    }
}

// ---------------------------------------------------------------------------
// Audio output
// ---------------------------------------------------------------------------

/// Description playback performed by the shell's audio element.
///
/// Natural end and autoplay refusal come back as `playback.ended` /
/// `playback.blocked` commands.
pub struct HostAudioOutput {
    sink: EventSink,
    current: Option<PlaybackId>,
}

impl HostAudioOutput {
    #[must_use]
    pub fn new(sink: EventSink) -> Self {
        Self {
            sink,
            current: None,
        }
    }
}

impl AudioOutput for HostAudioOutput {
    fn play(&mut self, id: PlaybackId, audio: &DescriptionAudio) -> Result<()> {
        self.current = Some(id);
        self.sink.emit(
            events::PLAYBACK_PLAY,
            serde_json::json!({
                "id": id,
                "mime_type": audio.mime_type,
                "data": base64::engine::general_purpose::STANDARD.encode(&audio.bytes),
            }),
        );
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(id) = self.current.take() {
            self.sink
                .emit(events::PLAYBACK_STOP, serde_json::json!({ "id": id }));
        }
    }
}
