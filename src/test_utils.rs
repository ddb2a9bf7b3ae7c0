//! Recording fakes for the platform capabilities, shared across unit tests.
//!
//! Each fake is `Clone` over shared state so a test can hand one copy to the
//! code under test and keep another for assertions.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::capture::{CameraDevice, CameraRequest, CameraStream, CapturedImage, Facing, VideoFrame};
use crate::description::{DescriptionAudio, DescriptionService};
use crate::error::{Result, SightError};
use crate::narration::{SpeechSynthesizer, Utterance};
use crate::playback::{AudioOutput, PlaybackId};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Small MPEG-ish payload; only the controller's bookkeeping looks at it.
pub fn sample_audio() -> DescriptionAudio {
    DescriptionAudio {
        bytes: Bytes::from_static(b"ID3\x04\x00fake-mpeg-frames"),
        mime_type: "audio/mpeg".to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Camera
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CameraState {
    frame: Option<VideoFrame>,
    open_streams: usize,
    max_open_streams: usize,
    stop_calls: usize,
    opened: Vec<Facing>,
    open_errors: VecDeque<SightError>,
}

#[derive(Clone, Default)]
pub struct FakeCamera {
    state: Arc<Mutex<CameraState>>,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// A 2x2 frame with visible content.
    pub fn sample_frame() -> VideoFrame {
        VideoFrame::new(2, 2, vec![200, 120, 40, 10, 20, 30, 90, 90, 90, 255, 0, 0]).unwrap()
    }

    /// Make the current stream deliver `frame`.
    pub fn push_frame(&self, frame: VideoFrame) {
        self.state.lock().unwrap().frame = Some(frame);
    }

    /// Fail the next `open` with `err`.
    pub fn fail_next_open(&self, err: SightError) {
        self.state.lock().unwrap().open_errors.push_back(err);
    }

    pub fn open_streams(&self) -> usize {
        self.state.lock().unwrap().open_streams
    }

    pub fn max_open_streams(&self) -> usize {
        self.state.lock().unwrap().max_open_streams
    }

    pub fn stop_calls(&self) -> usize {
        self.state.lock().unwrap().stop_calls
    }

    /// Facings of every successful open, in order.
    pub fn opened(&self) -> Vec<Facing> {
        self.state.lock().unwrap().opened.clone()
    }
}

impl CameraDevice for FakeCamera {
    fn open(&mut self, request: &CameraRequest) -> Result<Box<dyn CameraStream>> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.open_errors.pop_front() {
            return Err(err);
        }
        // A fresh stream has no frame until the test pushes one.
        state.frame = None;
        state.open_streams += 1;
        state.max_open_streams = state.max_open_streams.max(state.open_streams);
        state.opened.push(request.facing);
        Ok(Box::new(FakeStream {
            state: Arc::clone(&self.state),
            stopped: false,
        }))
    }
}

struct FakeStream {
    state: Arc<Mutex<CameraState>>,
    stopped: bool,
}

impl CameraStream for FakeStream {
    fn latest_frame(&mut self) -> Option<VideoFrame> {
        if self.stopped {
            return None;
        }
        self.state.lock().unwrap().frame.clone()
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let mut state = self.state.lock().unwrap();
        state.open_streams -= 1;
        state.stop_calls += 1;
    }
}

// ---------------------------------------------------------------------------
// Speech
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechCall {
    Cancel,
    Speak(String),
}

struct SpeechState {
    available: bool,
    current: Option<Utterance>,
    calls: Vec<SpeechCall>,
    completed: Vec<String>,
    fail_next: bool,
}

#[derive(Clone)]
pub struct FakeSpeech {
    state: Arc<Mutex<SpeechState>>,
}

impl FakeSpeech {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SpeechState {
                available: true,
                current: None,
                calls: Vec::new(),
                completed: Vec::new(),
                fail_next: false,
            })),
        }
    }

    /// Utterance currently being spoken.
    pub fn current(&self) -> Option<Utterance> {
        self.state.lock().unwrap().current.clone()
    }

    pub fn calls(&self) -> Vec<SpeechCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Texts of every `speak` call, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SpeechCall::Speak(text) => Some(text),
                SpeechCall::Cancel => None,
            })
            .collect()
    }

    /// Utterances that were allowed to finish.
    pub fn completed(&self) -> Vec<String> {
        self.state.lock().unwrap().completed.clone()
    }

    /// Let the current utterance run to its end.
    pub fn finish_current(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(utterance) = state.current.take() {
            state.completed.push(utterance.text);
        }
    }

    pub fn fail_next_speak(&self) {
        self.state.lock().unwrap().fail_next = true;
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }
}

impl SpeechSynthesizer for FakeSpeech {
    fn is_available(&self) -> bool {
        self.state.lock().unwrap().available
    }

    fn speak(&mut self, utterance: &Utterance) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next) {
            return Err(SightError::Audio("synthesis failed".to_owned()));
        }
        state.calls.push(SpeechCall::Speak(utterance.text.clone()));
        state.current = Some(utterance.clone());
        Ok(())
    }

    fn cancel(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(SpeechCall::Cancel);
        state.current = None;
    }

    fn is_speaking(&self) -> bool {
        self.state.lock().unwrap().current.is_some()
    }
}

// ---------------------------------------------------------------------------
// Audio output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputCall {
    Play(PlaybackId),
    Stop,
}

#[derive(Default)]
struct OutputState {
    calls: Vec<OutputCall>,
    next_failure: Option<SightError>,
}

#[derive(Clone, Default)]
pub struct FakeAudioOutput {
    state: Arc<Mutex<OutputState>>,
}

impl FakeAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `play` as an autoplay policy would.
    pub fn block_next_play(&self) {
        self.fail_next_play(SightError::PlaybackBlocked);
    }

    /// Make the next `play` fail with `err`.
    pub fn fail_next_play(&self, err: SightError) {
        self.state.lock().unwrap().next_failure = Some(err);
    }

    pub fn calls(&self) -> Vec<OutputCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn play_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, OutputCall::Play(_)))
            .count()
    }

    pub fn last_play(&self) -> Option<PlaybackId> {
        self.calls().iter().rev().find_map(|c| match c {
            OutputCall::Play(id) => Some(*id),
            OutputCall::Stop => None,
        })
    }
}

impl AudioOutput for FakeAudioOutput {
    fn play(&mut self, id: PlaybackId, _audio: &DescriptionAudio) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.next_failure.take() {
            return Err(err);
        }
        state.calls.push(OutputCall::Play(id));
        Ok(())
    }

    fn stop(&mut self) {
        self.state.lock().unwrap().calls.push(OutputCall::Stop);
    }
}

// ---------------------------------------------------------------------------
// Description backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DescriptionState {
    responses: VecDeque<Result<DescriptionAudio>>,
    requests: Vec<CapturedImage>,
}

/// Answers from a queue; an empty queue answers with [`sample_audio`].
#[derive(Clone, Default)]
pub struct FakeDescription {
    state: Arc<Mutex<DescriptionState>>,
}

impl FakeDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: Result<DescriptionAudio>) {
        self.state.lock().unwrap().responses.push_back(response);
    }

    pub fn requests(&self) -> Vec<CapturedImage> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }
}

#[async_trait]
impl DescriptionService for FakeDescription {
    async fn describe(&self, image: &CapturedImage) -> Result<DescriptionAudio> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(image.clone());
        state.responses.pop_front().unwrap_or_else(|| Ok(sample_audio()))
    }
}
