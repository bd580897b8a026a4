//! JSON-lines bridge between a host process and the worker.
//!
//! Each inbound line is `{"id": n, "event": {...}}`. The worker answers with
//! a `response` line for fetch events, then `completed` or `failed` once all
//! work for the event is done. Client commands (`show_notification`,
//! `open_window`, `claim_clients`) are interleaved on the same stream.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shellsync_client::{AssetResponse, ResponseType};
use shellsync_core::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::dispatcher::{Completion, Worker};
use crate::events::Event;
use crate::host::{ClientHost, Notification};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Inbound {
    pub id: u64,
    pub event: Event,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Response {
        id: u64,
        status: u16,
        url: String,
        response_type: ResponseType,
        headers: Vec<(String, String)>,
        /// Set when the body is valid UTF-8.
        #[serde(skip_serializing_if = "Option::is_none")]
        body_utf8: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        body_bytes: Option<Vec<u8>>,
    },
    FetchFailed {
        id: u64,
        error: String,
    },
    Completed {
        id: u64,
    },
    Failed {
        /// Absent when the inbound line could not be parsed.
        id: Option<u64>,
        error: String,
    },
    ShowNotification {
        notification: Notification,
    },
    OpenWindow {
        url: String,
    },
    ClaimClients,
}

impl Outbound {
    fn response(id: u64, response: AssetResponse) -> Self {
        let (body_utf8, body_bytes) = match String::from_utf8(response.body.to_vec()) {
            Ok(text) => (Some(text), None),
            Err(e) => (None, Some(e.into_bytes())),
        };
        Outbound::Response {
            id,
            status: response.status,
            url: response.url,
            response_type: response.response_type,
            headers: response.headers,
            body_utf8,
            body_bytes,
        }
    }
}

/// Sends client commands to the host over the outbound stream.
#[derive(Debug, Clone)]
pub struct StdioHost {
    tx: mpsc::UnboundedSender<Outbound>,
}

/// Create a host plus the receiver that [`serve`] writes out.
pub fn channel() -> (StdioHost, mpsc::UnboundedReceiver<Outbound>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StdioHost { tx }, rx)
}

impl StdioHost {
    fn send(&self, message: Outbound) -> Result<(), Error> {
        self.tx
            .send(message)
            .map_err(|_| Error::HandlerAborted("host output stream closed".into()))
    }
}

#[async_trait]
impl ClientHost for StdioHost {
    async fn show_notification(&self, notification: Notification) -> Result<(), Error> {
        self.send(Outbound::ShowNotification { notification })
    }

    async fn open_window(&self, url: &str) -> Result<(), Error> {
        self.send(Outbound::OpenWindow { url: url.to_string() })
    }

    async fn claim_clients(&self) -> Result<(), Error> {
        self.send(Outbound::ClaimClients)
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, message: &Outbound) -> io::Result<()> {
    let mut line = serde_json::to_vec(message).map_err(io::Error::other)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

async fn report(id: u64, mut completion: Completion, host: StdioHost) {
    if let Some(response) = completion.take_response() {
        let message = match response.await {
            Ok(Ok(response)) => Outbound::response(id, response),
            Ok(Err(e)) => Outbound::FetchFailed { id, error: e.to_string() },
            Err(_) => Outbound::FetchFailed { id, error: "handler dropped the response".into() },
        };
        let _ = host.send(message);
    }

    let message = match completion.finished().await {
        Ok(()) => Outbound::Completed { id },
        Err(e) => Outbound::Failed { id: Some(id), error: e.to_string() },
    };
    let _ = host.send(message);
}

/// Serve events from `reader` until it closes, writing replies to `writer`.
///
/// Returns after every dispatched event has completed and its replies have
/// been written.
pub async fn serve<R, W>(
    worker: Arc<Worker>, host: StdioHost, mut outbound: mpsc::UnboundedReceiver<Outbound>, reader: R, mut writer: W,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut pending = JoinSet::new();
    let mut input_open = true;

    while input_open || !pending.is_empty() {
        tokio::select! {
            line = lines.next_line(), if input_open => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match serde_json::from_str::<Inbound>(&line) {
                    Ok(inbound) => {
                        let completion = worker.dispatch(inbound.event);
                        pending.spawn(report(inbound.id, completion, host.clone()));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "unparseable inbound line");
                        write_line(&mut writer, &Outbound::Failed { id: None, error: e.to_string() }).await?;
                    }
                },
                None => {
                    tracing::info!("input closed, waiting for in-flight events");
                    input_open = false;
                }
            },
            Some(message) = outbound.recv() => write_line(&mut writer, &message).await?,
            Some(joined) = pending.join_next(), if !pending.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "reporter task failed");
                }
            }
        }
    }

    while let Ok(message) = outbound.try_recv() {
        write_line(&mut writer, &message).await?;
    }
    Ok(())
}
