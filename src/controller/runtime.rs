//! Actor task that owns the [`InteractionController`].
//!
//! Requests arrive through a [`ControllerHandle`] and are answered with the
//! resulting [`UiState`]. Description results and playback reports are
//! drained from their own queues by the same loop, so every transition is
//! applied strictly one at a time.

use super::{
    Capabilities, ControllerEvent, ControllerNotice, InteractionController, UiState,
};
use crate::config::SightConfig;
use crate::error::{Result, SightError};
use crate::playback::PlaybackEvent;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

enum RequestKind {
    Event(ControllerEvent),
    State,
}

struct ControllerRequest {
    kind: RequestKind,
    reply: oneshot::Sender<Result<UiState>>,
}

/// Cloneable front door to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    request_tx: mpsc::Sender<ControllerRequest>,
    notice_tx: broadcast::Sender<ControllerNotice>,
}

impl ControllerHandle {
    /// Apply `event` and return the state it produced.
    ///
    /// # Errors
    ///
    /// The operation's own failure, or [`SightError::Channel`] if the
    /// controller task is gone.
    pub async fn send(&self, event: ControllerEvent) -> Result<UiState> {
        self.request(RequestKind::Event(event)).await
    }

    /// Current state without side effects.
    ///
    /// # Errors
    ///
    /// [`SightError::Channel`] if the controller task is gone.
    pub async fn state(&self) -> Result<UiState> {
        self.request(RequestKind::State).await
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerNotice> {
        self.notice_tx.subscribe()
    }

    async fn request(&self, kind: RequestKind) -> Result<UiState> {
        let (reply, reply_rx) = oneshot::channel();
        self.request_tx
            .send(ControllerRequest { kind, reply })
            .await
            .map_err(|e| SightError::Channel(format!("failed to send controller request: {e}")))?;

        reply_rx
            .await
            .map_err(|e| SightError::Channel(format!("controller response dropped: {e}")))?
    }
}

pub struct ControllerRuntime {
    controller: InteractionController,
    request_rx: mpsc::Receiver<ControllerRequest>,
    loopback_rx: mpsc::UnboundedReceiver<ControllerEvent>,
    playback_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
}

impl ControllerRuntime {
    /// Build the controller and its handle.
    ///
    /// `playback_rx` is the receiving end of the channel the audio output in
    /// `capabilities` reports on.
    #[must_use]
    pub fn new(
        config: &SightConfig,
        capabilities: Capabilities,
        playback_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
        request_capacity: usize,
    ) -> (ControllerHandle, Self) {
        let (loopback_tx, loopback_rx) = mpsc::unbounded_channel();
        let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));
        let controller = InteractionController::new(config, capabilities, loopback_tx);
        let handle = ControllerHandle {
            request_tx,
            notice_tx: controller.notice_sender(),
        };
        (
            handle,
            Self {
                controller,
                request_rx,
                loopback_rx,
                playback_rx,
            },
        )
    }

    /// Process events until cancelled or every handle is dropped, then shut
    /// the controller down.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("interaction controller running");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(event) = self.loopback_rx.recv() => self.dispatch(event),
                Some(event) = self.playback_rx.recv() => {
                    self.dispatch(ControllerEvent::Playback(event));
                }
                request = self.request_rx.recv() => {
                    let Some(request) = request else { break };
                    let response = match request.kind {
                        RequestKind::Event(event) => self
                            .controller
                            .handle(event)
                            .map(|()| self.controller.ui_state()),
                        RequestKind::State => Ok(self.controller.ui_state()),
                    };
                    let _ = request.reply.send(response);
                }
            }
        }
        self.controller.shutdown();
        info!("interaction controller stopped");
    }

    fn dispatch(&mut self, event: ControllerEvent) {
        let name = event.name();
        if let Err(e) = self.controller.handle(event) {
            debug!(event = name, "internal event failed: {e}");
        }
    }
}
