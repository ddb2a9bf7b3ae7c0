//! Description playback to system speakers via cpal.
//!
//! cpal streams are not `Send` on every host, so each playback gets its own
//! thread that opens the device, plays the clip and drops the stream. Startup
//! errors are handed back to [`AudioOutput::play`] before it returns; the end
//! of the clip, or a stream error while it plays, is reported on the
//! [`PlaybackEvent`] channel.

use super::decode::{decode_to_mono, resample};
use super::{AudioOutput, PlaybackEvent, PlaybackId};
use crate::config::AudioConfig;
use crate::description::DescriptionAudio;
use crate::error::{Result, SightError};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Upper bound on how long `play` waits for the device to open.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

struct ActivePlayback {
    id: PlaybackId,
    stop: Arc<AtomicBool>,
    thread: std::thread::JoinHandle<()>,
}

/// [`AudioOutput`] backed by the system's output device.
pub struct CpalAudioOutput {
    output_device: Option<String>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    active: Option<ActivePlayback>,
}

impl CpalAudioOutput {
    pub fn new(config: &AudioConfig, events: mpsc::UnboundedSender<PlaybackEvent>) -> Self {
        Self {
            output_device: config.output_device.clone(),
            events,
            active: None,
        }
    }

    /// List available output devices.
    ///
    /// # Errors
    ///
    /// Returns an error if devices cannot be enumerated.
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| SightError::Audio(format!("cannot enumerate devices: {e}")))?;

        let mut names = Vec::new();
        for device in devices {
            if let Ok(desc) = device.description() {
                names.push(desc.name().to_owned());
            }
        }
        Ok(names)
    }
}

impl AudioOutput for CpalAudioOutput {
    fn play(&mut self, id: PlaybackId, audio: &DescriptionAudio) -> Result<()> {
        self.stop();

        let decoded = decode_to_mono(audio)?;
        info!(
            id,
            secs = decoded.duration_secs(),
            rate = decoded.sample_rate,
            "decoded description audio"
        );

        let stop = Arc::new(AtomicBool::new(false));
        let (started_tx, started_rx) = std::sync::mpsc::sync_channel::<Result<()>>(1);
        let thread_stop = Arc::clone(&stop);
        let events = self.events.clone();
        let device_name = self.output_device.clone();

        let thread = std::thread::Builder::new()
            .name(format!("sightsync-playback-{id}"))
            .spawn(move || {
                run_playback(
                    id,
                    device_name.as_deref(),
                    decoded.samples,
                    decoded.sample_rate,
                    &thread_stop,
                    &started_tx,
                    &events,
                );
            })
            .map_err(|e| SightError::Audio(format!("failed to spawn playback thread: {e}")))?;

        match wait_for_start(&started_rx, STARTUP_TIMEOUT) {
            Ok(()) => {
                self.active = Some(ActivePlayback { id, stop, thread });
                Ok(())
            }
            Err(StartFailure::Stalled(e)) => {
                // The thread exits on its own once the device call returns.
                stop.store(true, Ordering::SeqCst);
                Err(e)
            }
            Err(StartFailure::Exited(e)) => {
                let _ = thread.join();
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.store(true, Ordering::SeqCst);
            if active.thread.join().is_err() {
                warn!(id = active.id, "playback thread panicked");
            }
        }
    }
}

impl Drop for CpalAudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

enum StartFailure {
    /// The device did not answer in time; the thread is still running.
    Stalled(SightError),
    /// The thread reported an error or exited.
    Exited(SightError),
}

/// Wait for the playback thread to report startup.
///
/// On a multi-threaded runtime the wait runs under `block_in_place` so the
/// controller's worker does not stall other tasks.
fn wait_for_start(
    started: &std::sync::mpsc::Receiver<Result<()>>,
    timeout: Duration,
) -> std::result::Result<(), StartFailure> {
    let recv = || started.recv_timeout(timeout);
    let outcome = match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(recv)
        }
        _ => recv(),
    };
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(StartFailure::Exited(e)),
        Err(RecvTimeoutError::Timeout) => Err(StartFailure::Stalled(SightError::Audio(format!(
            "output device did not start within {}s",
            timeout.as_secs()
        )))),
        Err(RecvTimeoutError::Disconnected) => Err(StartFailure::Exited(SightError::Audio(
            "playback thread exited during startup".into(),
        ))),
    }
}

/// How a clip's stream came to an end.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StreamEnd {
    Finished,
    Failed(String),
}

#[derive(Debug, Default)]
struct PlaybackBuffer {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
    failure: Option<String>,
}

impl PlaybackBuffer {
    /// Write the next frames into `data`, the mono source duplicated across
    /// every output channel.
    fn fill(&mut self, data: &mut [f32], channels: usize) {
        for frame in data.chunks_mut(channels.max(1)) {
            let sample = if self.position < self.samples.len() {
                let s = self.samples[self.position];
                self.position += 1;
                s
            } else {
                self.finished = true;
                0.0
            };
            frame.fill(sample);
        }
    }

    /// Keep the first stream error; the device is gone after it.
    fn record_error(&mut self, message: String) {
        if self.failure.is_none() {
            self.failure = Some(message);
        }
    }

    fn end(&self) -> Option<StreamEnd> {
        if let Some(message) = &self.failure {
            Some(StreamEnd::Failed(message.clone()))
        } else if self.finished {
            Some(StreamEnd::Finished)
        } else {
            None
        }
    }
}

fn open_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| SightError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| SightError::Audio(format!("output device '{name}' not found"))),
        None => host
            .default_output_device()
            .ok_or_else(|| SightError::Audio("no default output device".into())),
    }
}

fn start_stream(
    device_name: Option<&str>,
    samples: Vec<f32>,
    sample_rate: u32,
    buffer: &Arc<Mutex<PlaybackBuffer>>,
) -> Result<cpal::Stream> {
    let device = open_device(device_name)?;
    let default_config = device
        .default_output_config()
        .map_err(|e| SightError::Audio(format!("no default output config: {e}")))?;

    let native_rate = default_config.sample_rate();
    let native_channels = default_config.channels().max(1);
    let stream_config = StreamConfig {
        channels: native_channels,
        sample_rate: native_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    if let Ok(mut buf) = buffer.lock() {
        buf.samples = resample(&samples, sample_rate, native_rate);
    }

    let channels = usize::from(native_channels);
    let data_buffer = Arc::clone(buffer);
    let error_buffer = Arc::clone(buffer);
    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                if let Ok(mut buf) = data_buffer.lock() {
                    buf.fill(data, channels);
                }
            },
            move |err| {
                error!("audio output stream error: {err}");
                if let Ok(mut buf) = error_buffer.lock() {
                    buf.record_error(err.to_string());
                }
            },
            None,
        )
        .map_err(|e| SightError::Audio(format!("failed to build output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| SightError::Audio(format!("failed to start output stream: {e}")))?;
    Ok(stream)
}

fn run_playback(
    id: PlaybackId,
    device_name: Option<&str>,
    samples: Vec<f32>,
    sample_rate: u32,
    stop: &AtomicBool,
    started: &std::sync::mpsc::SyncSender<Result<()>>,
    events: &mpsc::UnboundedSender<PlaybackEvent>,
) {
    let buffer = Arc::new(Mutex::new(PlaybackBuffer::default()));

    let stream = match start_stream(device_name, samples, sample_rate, &buffer) {
        Ok(s) => s,
        Err(e) => {
            let _ = started.send(Err(e));
            return;
        }
    };
    let _ = started.send(Ok(()));

    let end = loop {
        if stop.load(Ordering::SeqCst) {
            info!(id, "playback interrupted");
            drop(stream);
            return;
        }
        std::thread::sleep(POLL_INTERVAL);
        match buffer.lock() {
            Ok(buf) => {
                if let Some(end) = buf.end() {
                    break end;
                }
            }
            Err(e) => break StreamEnd::Failed(format!("playback buffer lock poisoned: {e}")),
        }
    };

    drop(stream);
    if stop.load(Ordering::SeqCst) {
        return;
    }
    let event = match end {
        StreamEnd::Finished => {
            info!(id, "playback finished");
            PlaybackEvent::Finished { id }
        }
        StreamEnd::Failed(message) => {
            warn!(id, %message, "playback ended by stream error");
            PlaybackEvent::Failed { id, message }
        }
    };
    let _ = events.send(event);
}
