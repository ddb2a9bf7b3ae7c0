//! Stdin/stdout JSON bridge for the host command channel.
//!
//! Reads newline-delimited JSON `CommandEnvelope` messages, dispatches them
//! through the `HostCommandServer` router, and writes `ResponseEnvelope` and
//! `EventEnvelope` messages as newline-delimited JSON.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use crate::config::SightConfig;
use crate::description::DescriptionService;
use crate::error::{Result, SightError};
use crate::host::channel::{HostCommandClient, host_channel};
use crate::host::contract::{CommandEnvelope, CommandName, ResponseEnvelope};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Default request channel capacity for the stdio bridge.
const REQUEST_CAPACITY: usize = 64;

/// Default event broadcast channel capacity for the stdio bridge.
const EVENT_CAPACITY: usize = 256;

type SharedWriter<W> = Arc<Mutex<BufWriter<W>>>;

/// Run the JSON bridge over the process's stdin and stdout.
///
/// # Errors
///
/// Returns an error if stdin cannot be read or stdout cannot be written.
pub async fn run_stdio_bridge(
    config: &SightConfig,
    describer: Arc<dyn DescriptionService>,
) -> Result<()> {
    run_bridge(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        config,
        describer,
    )
    .await
}

/// Run the JSON bridge until `input` closes or a `runtime.stop` command is
/// received.
///
/// Four tasks operate concurrently: the line reader (this task), the event
/// forwarder, the command router and the controller runtime. When the
/// reader finishes the runtime is cancelled, which releases the camera,
/// speech and playback capabilities.
///
/// # Errors
///
/// Returns an error if `input` cannot be read or `output` cannot be written.
pub async fn run_bridge<R, W>(
    input: R,
    output: W,
    config: &SightConfig,
    describer: Arc<dyn DescriptionService>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let cancel = CancellationToken::new();
    let (client, server, runtime) = host_channel(
        config,
        describer,
        REQUEST_CAPACITY,
        EVENT_CAPACITY,
        cancel.clone(),
    );
    let writer: SharedWriter<W> = Arc::new(Mutex::new(BufWriter::new(output)));

    let runtime_handle = tokio::spawn(runtime.run(cancel.clone()));
    let server_handle = tokio::spawn(server.run());

    let event_writer = Arc::clone(&writer);
    let mut event_rx = client.subscribe_events();
    let event_handle = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event_envelope) => match serde_json::to_string(&event_envelope) {
                    Ok(json) => {
                        let mut w = event_writer.lock().await;
                        if let Err(e) = write_line(&mut w, &json).await {
                            tracing::warn!(
                                error = %e,
                                "failed to write event envelope; stopping event forwarder"
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize event envelope; skipping");
                    }
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event forwarder lagged; some events were dropped");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    tracing::info!("event broadcast channel closed; stopping event forwarder");
                    break;
                }
            }
        }
    });

    let reader_result = run_reader(input, client, Arc::clone(&writer), &cancel).await;

    // The client is gone, so the router drains and exits; the runtime needs
    // an explicit cancel.
    cancel.cancel();
    let _ = runtime_handle.await;
    let _ = server_handle.await;
    event_handle.abort();
    let _ = event_handle.await;

    reader_result
}

/// Read lines, dispatch each command, and write responses.
async fn run_reader<R, W>(
    mut input: R,
    client: HostCommandClient,
    writer: SharedWriter<W>,
    cancel: &CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = tokio::select! {
            () = cancel.cancelled() => {
                tracing::info!("runtime cancelled; shutting down stdio bridge");
                break;
            }
            read = input.read_line(&mut line) => read
                .map_err(|e| SightError::Channel(format!("failed to read from stdin: {e}")))?,
        };

        if bytes_read == 0 {
            tracing::info!("stdin closed (EOF); shutting down stdio bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CommandEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse command envelope");
                let response = ResponseEnvelope::error(
                    "parse-error",
                    format!("failed to parse command envelope: {e}"),
                );
                write_response(&writer, &response).await?;
                continue;
            }
        };

        let is_stop = envelope.command == CommandName::RuntimeStop;
        let request_id = envelope.request_id.clone();

        let response = match client.send(envelope).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, request_id, "host command rejected");
                ResponseEnvelope::failure(request_id, &e)
            }
        };
        write_response(&writer, &response).await?;

        if is_stop {
            tracing::info!("runtime.stop received; shutting down stdio bridge");
            break;
        }
    }

    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &SharedWriter<W>,
    response: &ResponseEnvelope,
) -> Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| SightError::Protocol(format!("failed to serialize response envelope: {e}")))?;
    let mut w = writer.lock().await;
    write_line(&mut w, &json).await
}

/// Write a single JSON line to the buffered writer and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, json: &str) -> Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| SightError::Channel(format!("failed to write to stdout: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| SightError::Channel(format!("failed to write newline to stdout: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| SightError::Channel(format!("failed to flush stdout: {e}")))?;
    Ok(())
}
