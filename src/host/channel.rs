//! Host command channel and router for native shell integrations.
//!
//! [`host_channel`] wires the interaction controller to shell-backed
//! capabilities. Shell commands are routed into controller events, and
//! controller notices are re-emitted as [`EventEnvelope`]s alongside the
//! capability events (`narration.speak`, `playback.play`, ...).

use crate::capture::Facing;
use crate::config::SightConfig;
use crate::controller::{
    Capabilities, ControllerEvent, ControllerHandle, ControllerNotice, ControllerRuntime,
};
use crate::description::DescriptionService;
use crate::error::{Result, SightError};
use crate::host::contract::{
    CommandEnvelope, CommandName, EVENT_VERSION, EventEnvelope, ResponseEnvelope, events,
};
use crate::host::proxies::{
    CameraFeed, EventSink, HostAudioOutput, HostCamera, HostSpeech, SpeechTracker,
};
use crate::playback::{PlaybackEvent, PlaybackId};
use crate::prompts::{Control, HintTrigger};
use base64::Engine as _;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct HostCommandRequest {
    envelope: CommandEnvelope,
    response_tx: oneshot::Sender<Result<ResponseEnvelope>>,
}

#[derive(Clone)]
pub struct HostCommandClient {
    request_tx: mpsc::Sender<HostCommandRequest>,
    sink: EventSink,
}

impl HostCommandClient {
    pub async fn send(&self, envelope: CommandEnvelope) -> Result<ResponseEnvelope> {
        envelope.validate().map_err(|e| {
            SightError::Protocol(format!(
                "invalid host command envelope {}: {}",
                envelope.request_id, e
            ))
        })?;

        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(HostCommandRequest {
                envelope,
                response_tx,
            })
            .await
            .map_err(|e| {
                SightError::Channel(format!("failed to send host command request: {e}"))
            })?;

        response_rx
            .await
            .map_err(|e| SightError::Channel(format!("host command response dropped: {e}")))?
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sink.subscribe()
    }
}

pub struct HostCommandServer {
    request_rx: mpsc::Receiver<HostCommandRequest>,
    controller: ControllerHandle,
    notices: broadcast::Receiver<ControllerNotice>,
    feed: CameraFeed,
    speech: SpeechTracker,
    playback_tx: mpsc::UnboundedSender<PlaybackEvent>,
    sink: EventSink,
    cancel: CancellationToken,
}

/// Build the shell-facing client, its router and the controller runtime.
///
/// The caller spawns [`ControllerRuntime::run`] and [`HostCommandServer::run`];
/// cancelling `cancel` (or a `runtime.stop` command) stops the runtime.
#[must_use]
pub fn host_channel(
    config: &SightConfig,
    describer: Arc<dyn DescriptionService>,
    request_capacity: usize,
    event_capacity: usize,
    cancel: CancellationToken,
) -> (HostCommandClient, HostCommandServer, ControllerRuntime) {
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));
    let sink = EventSink::new(event_tx);
    let feed = CameraFeed::default();
    let speech = SpeechTracker::default();
    let (playback_tx, playback_rx) = mpsc::unbounded_channel();

    let capabilities = Capabilities {
        camera: Box::new(HostCamera::new(sink.clone(), feed.clone())),
        speech: Box::new(HostSpeech::new(sink.clone(), speech.clone(), true)),
        audio: Box::new(HostAudioOutput::new(sink.clone())),
        describer,
    };
    let (controller, runtime) =
        ControllerRuntime::new(config, capabilities, playback_rx, request_capacity);
    let notices = controller.subscribe();
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));

    (
        HostCommandClient {
            request_tx,
            sink: sink.clone(),
        },
        HostCommandServer {
            request_rx,
            controller,
            notices,
            feed,
            speech,
            playback_tx,
            sink,
            cancel,
        },
        runtime,
    )
}

impl HostCommandServer {
    /// Serve commands until every client is dropped, forwarding controller
    /// notices to the shell in between.
    pub async fn run(mut self) {
        let mut notices_open = true;
        loop {
            tokio::select! {
                request = self.request_rx.recv() => {
                    let Some(request) = request else { break };
                    let response = self.route(&request.envelope).await;
                    let _ = request.response_tx.send(response);
                }
                notice = self.notices.recv(), if notices_open => match notice {
                    Ok(notice) => self.forward_notice(notice),
                    Err(RecvError::Lagged(n)) => {
                        warn!(lagged = n, "notice forwarder lagged; some notices were dropped");
                    }
                    Err(RecvError::Closed) => notices_open = false,
                },
            }
        }
    }

    /// Route a command envelope to the controller or capability handles.
    pub async fn route(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        match envelope.command {
            CommandName::HostPing => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({"pong": true}),
            )),
            CommandName::HostVersion => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({
                    "contract_version": EVENT_VERSION,
                    "channel": "sightsync_host_v1",
                    "version": env!("CARGO_PKG_VERSION"),
                }),
            )),
            CommandName::StateGet => {
                let state = self.controller.state().await?;
                Ok(ResponseEnvelope::ok(
                    envelope.request_id.clone(),
                    serde_json::json!({ "state": state }),
                ))
            }
            CommandName::CameraOpen => {
                let facing = parse_optional_facing(&envelope.payload)?;
                self.dispatch(envelope, ControllerEvent::OpenCamera { facing })
                    .await
            }
            CommandName::CameraFlip => self.dispatch(envelope, ControllerEvent::FlipCamera).await,
            CommandName::CameraClose => self.dispatch(envelope, ControllerEvent::CloseCamera).await,
            CommandName::CameraCapture => self.dispatch(envelope, ControllerEvent::Capture).await,
            CommandName::CameraFrame => self.handle_camera_frame(envelope).await,
            CommandName::CameraFault => {
                let name = parse_non_empty_field(&envelope.payload, "name", "camera.fault")?;
                self.dispatch(envelope, ControllerEvent::CameraFault { name })
                    .await
            }
            CommandName::ImageSelect => {
                let event = parse_image_select(&envelope.payload)?;
                self.dispatch(envelope, event).await
            }
            CommandName::ImageSubmit => self.dispatch(envelope, ControllerEvent::Submit).await,
            CommandName::NarrationToggle => {
                self.dispatch(envelope, ControllerEvent::ToggleNarration)
                    .await
            }
            CommandName::NarrationFinished => {
                let id = parse_id(&envelope.payload, "narration.finished")?;
                self.speech.finished(id);
                Ok(accepted(envelope))
            }
            CommandName::UiHint => {
                let (control, trigger) = parse_hint(&envelope.payload)?;
                self.dispatch(envelope, ControllerEvent::Hint { control, trigger })
                    .await
            }
            CommandName::PlaybackEnded => {
                let id = parse_id(&envelope.payload, "playback.ended")?;
                self.report_playback(envelope, PlaybackEvent::Finished { id })
            }
            CommandName::PlaybackBlocked => {
                let id = parse_id(&envelope.payload, "playback.blocked")?;
                self.report_playback(envelope, PlaybackEvent::Blocked { id })
            }
            CommandName::PlaybackFailed => {
                let id = parse_id(&envelope.payload, "playback.failed")?;
                let message = envelope
                    .payload
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("playback failed")
                    .to_owned();
                self.report_playback(envelope, PlaybackEvent::Failed { id, message })
            }
            CommandName::PlaybackResume => {
                self.dispatch(envelope, ControllerEvent::ResumePlayback)
                    .await
            }
            CommandName::RuntimeStop => {
                info!("runtime.stop requested by host");
                self.cancel.cancel();
                Ok(accepted(envelope))
            }
        }
    }

    async fn handle_camera_frame(&self, envelope: &CommandEnvelope) -> Result<ResponseEnvelope> {
        let data = parse_base64_field(&envelope.payload, "data", "camera.frame")?;
        if !self.feed.push_encoded(&data)? {
            return Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({"accepted": false, "reason": "no open camera stream"}),
            ));
        }
        self.dispatch(envelope, ControllerEvent::CameraFrameReady)
            .await
    }

    async fn dispatch(
        &self,
        envelope: &CommandEnvelope,
        event: ControllerEvent,
    ) -> Result<ResponseEnvelope> {
        match self.controller.send(event).await {
            Ok(state) => Ok(ResponseEnvelope::ok(
                envelope.request_id.clone(),
                serde_json::json!({"accepted": true, "state": state}),
            )),
            Err(e @ SightError::Channel(_)) => Err(e),
            Err(e) => Ok(ResponseEnvelope::failure(envelope.request_id.clone(), &e)),
        }
    }

    fn report_playback(
        &self,
        envelope: &CommandEnvelope,
        event: PlaybackEvent,
    ) -> Result<ResponseEnvelope> {
        self.playback_tx
            .send(event)
            .map_err(|e| SightError::Channel(format!("failed to forward playback report: {e}")))?;
        Ok(accepted(envelope))
    }

    fn forward_notice(&self, notice: ControllerNotice) {
        match notice {
            ControllerNotice::StateChanged(state) => self
                .sink
                .emit(events::STATE_CHANGED, serde_json::json!({ "state": state })),
            ControllerNotice::Status(text) => self
                .sink
                .emit(events::STATUS, serde_json::json!({ "text": text })),
            ControllerNotice::Error { kind, message } => self.sink.emit(
                events::ERROR,
                serde_json::json!({ "error": kind, "message": message }),
            ),
        }
    }
}

fn accepted(envelope: &CommandEnvelope) -> ResponseEnvelope {
    ResponseEnvelope::ok(
        envelope.request_id.clone(),
        serde_json::json!({"accepted": true}),
    )
}

fn parse_non_empty_field(
    payload: &serde_json::Value,
    field: &str,
    command: &str,
) -> Result<String> {
    let Some(raw) = payload.get(field).and_then(serde_json::Value::as_str) else {
        return Err(SightError::Protocol(format!(
            "{command} requires payload.{field}"
        )));
    };
    let value = raw.trim();
    if value.is_empty() {
        return Err(SightError::Protocol(format!(
            "{command} requires a non-empty payload.{field}"
        )));
    }
    Ok(value.to_owned())
}

fn parse_optional_facing(payload: &serde_json::Value) -> Result<Option<Facing>> {
    match payload.get("facing") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(raw)) => Facing::parse(raw).map(Some).ok_or_else(|| {
            SightError::Protocol(format!(
                "unsupported camera facing `{raw}` (expected front/back)"
            ))
        }),
        Some(_) => Err(SightError::Protocol(
            "camera.open payload.facing must be a string when provided".to_owned(),
        )),
    }
}

fn parse_base64_field(payload: &serde_json::Value, field: &str, command: &str) -> Result<Vec<u8>> {
    let raw = parse_non_empty_field(payload, field, command)?;
    base64::engine::general_purpose::STANDARD
        .decode(raw.as_bytes())
        .map_err(|e| SightError::Protocol(format!("{command} payload.{field} is not base64: {e}")))
}

fn parse_id(payload: &serde_json::Value, command: &str) -> Result<PlaybackId> {
    payload
        .get("id")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| SightError::Protocol(format!("{command} requires payload.id (integer)")))
}

fn parse_image_select(payload: &serde_json::Value) -> Result<ControllerEvent> {
    let data = parse_base64_field(payload, "data", "image.select")?;
    // Type validation belongs to the controller so the user hears about it.
    let mime_type = payload
        .get("mime_type")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let file_name = payload
        .get("file_name")
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned);
    Ok(ControllerEvent::SelectFile {
        bytes: data.into(),
        mime_type,
        file_name,
    })
}

fn parse_hint(payload: &serde_json::Value) -> Result<(Control, HintTrigger)> {
    let raw_control = parse_non_empty_field(payload, "control", "ui.hint")?;
    let control = Control::parse(&raw_control).ok_or_else(|| {
        SightError::Protocol(format!("unsupported ui.hint control `{raw_control}`"))
    })?;
    let raw_trigger = parse_non_empty_field(payload, "trigger", "ui.hint")?;
    let trigger = match raw_trigger.as_str() {
        "hover" => HintTrigger::Hover,
        "focus" => HintTrigger::Focus,
        "long_press" | "longpress" => HintTrigger::LongPress,
        other => {
            return Err(SightError::Protocol(format!(
                "unsupported ui.hint trigger `{other}` (expected hover/focus/long_press)"
            )));
        }
    };
    Ok((control, trigger))
}
