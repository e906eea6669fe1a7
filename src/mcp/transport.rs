// mcp/transport -- one full-duplex connection and its reader task
//! Transport session: owns the write half of a connection and a background
//! task that drains the read half into the [`Correlator`].
//!
//! The session is transport-agnostic: anything that can be expressed as a
//! [`FrameSink`] plus a [`FrameStream`] works. [`TransportSession::connect`]
//! builds those from a WebSocket; [`memory_transport`] builds an in-process
//! pair.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;

use super::correlator::Correlator;
use super::error::McpError;

/// Outbound half: accepts one text frame per envelope.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = McpError> + Send>>;
/// Inbound half: yields text frames until the connection ends.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, McpError>> + Send>>;

/// How long `close` waits for an in-flight send before abandoning the writer.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

pub struct TransportSession {
    endpoint: String,
    writer: tokio::sync::Mutex<Option<FrameSink>>,
    open: Arc<AtomicBool>,
    shutdown: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl TransportSession {
    /// Open a WebSocket to `endpoint` and start the reader task.
    pub async fn connect(endpoint: &str, correlator: Arc<Correlator>) -> Result<Self, McpError> {
        let url = validate_endpoint(endpoint)?;

        let (ws, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| McpError::Connection {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                })?;
        tracing::info!("MCP: WebSocket connected to {}", endpoint);

        let (write, read) = ws.split();

        let sink = write
            .sink_map_err(|e| McpError::Transport(e.to_string()))
            .with(|frame: String| future::ready(Ok::<_, McpError>(Message::Text(frame.into()))));

        let stream = read.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        tracing::warn!("MCP: skipping non-UTF-8 binary frame ({} bytes)", bytes.len());
                        None
                    }
                },
                Ok(Message::Close(frame)) => Some(Err(McpError::Transport(match frame {
                    Some(f) => format!(
                        "peer closed the connection ({}: {})",
                        u16::from(f.code),
                        f.reason.as_str()
                    ),
                    None => "peer closed the connection".to_string(),
                }))),
                // Ping/pong are answered by tungstenite itself.
                Ok(_) => None,
                Err(e) => Some(Err(McpError::Transport(e.to_string()))),
            })
        });

        Ok(Self::from_parts(
            endpoint,
            Box::pin(sink),
            Box::pin(stream),
            correlator,
        ))
    }

    /// Wrap an already-established frame pair and start the reader task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_parts(
        endpoint: &str,
        sink: FrameSink,
        stream: FrameStream,
        correlator: Arc<Correlator>,
    ) -> Self {
        let open = Arc::new(AtomicBool::new(true));
        let shutdown = CancellationToken::new();
        let reader = tokio::spawn(read_loop(
            stream,
            correlator,
            Arc::clone(&open),
            shutdown.clone(),
        ));

        Self {
            endpoint: endpoint.to_string(),
            writer: tokio::sync::Mutex::new(Some(sink)),
            open,
            shutdown,
            reader: Mutex::new(Some(reader)),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `false` once the reader has stopped or the session was closed.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Write one frame. Concurrent senders are serialized; a failed write
    /// marks the whole session closed. Never retries.
    pub async fn send(&self, frame: String) -> Result<(), McpError> {
        if !self.is_open() {
            return Err(McpError::Transport("session is not open".to_string()));
        }

        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Err(McpError::Transport("session is not open".to_string()));
        };

        if let Err(e) = sink.send(frame).await {
            tracing::error!("MCP: send to {} failed: {}", self.endpoint, e);
            *writer = None;
            self.open.store(false, Ordering::SeqCst);
            self.shutdown.cancel();
            return Err(match e {
                McpError::Transport(_) => e,
                other => McpError::Transport(other.to_string()),
            });
        }
        Ok(())
    }

    /// Shut the session down: stop the reader, close the writer, join the
    /// reader task. Safe to call more than once.
    pub async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.shutdown.cancel();

        match tokio::time::timeout(CLOSE_GRACE, self.writer.lock()).await {
            Ok(mut writer) => {
                if let Some(mut sink) = writer.take() {
                    let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
                }
            }
            Err(_) => tracing::warn!("MCP: writer busy during close, abandoning it"),
        }

        let reader = self.reader.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = reader {
            if let Err(e) = handle.await {
                tracing::warn!("MCP: reader task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn read_loop(
    mut frames: FrameStream,
    correlator: Arc<Correlator>,
    open: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    let reason = loop {
        tokio::select! {
            _ = shutdown.cancelled() => break "session closed".to_string(),
            next = frames.next() => match next {
                Some(Ok(frame)) => correlator.dispatch_frame(&frame),
                Some(Err(e)) => break e.to_string(),
                None => break "connection closed by peer".to_string(),
            },
        }
    };

    open.store(false, Ordering::SeqCst);
    tracing::info!("MCP: reader stopped: {}", reason);
    correlator.close(&reason);
}

fn validate_endpoint(endpoint: &str) -> Result<url::Url, McpError> {
    let url = url::Url::parse(endpoint).map_err(|e| McpError::Connection {
        endpoint: endpoint.to_string(),
        reason: format!("invalid URL: {e}"),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(McpError::Connection {
            endpoint: endpoint.to_string(),
            reason: format!("unsupported scheme '{other}', expected ws or wss"),
        }),
    }
}

// ── In-memory transport ─────────────────────────────────────────────────────

/// Build an in-process frame pair. The returned [`MemoryPeer`] plays the
/// server side.
pub fn memory_transport() -> (FrameSink, FrameStream, MemoryPeer) {
    let (to_peer, from_client) = mpsc::unbounded_channel::<String>();
    let (to_client, from_peer) = mpsc::unbounded_channel::<String>();

    let sink = futures_util::sink::unfold(to_peer, |tx, frame: String| async move {
        tx.send(frame)
            .map_err(|_| McpError::Transport("memory peer hung up".to_string()))?;
        Ok::<_, McpError>(tx)
    });

    let stream = futures_util::stream::unfold(from_peer, |mut rx| async move {
        rx.recv().await.map(|frame| (Ok(frame), rx))
    });

    (
        Box::pin(sink),
        Box::pin(stream),
        MemoryPeer {
            incoming: from_client,
            outgoing: Some(to_client),
        },
    )
}

/// Server side of a [`memory_transport`].
pub struct MemoryPeer {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: Option<mpsc::UnboundedSender<String>>,
}

impl MemoryPeer {
    /// Next raw frame sent by the client, `None` once the client is gone.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    /// Next frame sent by the client, decoded. Undecodable frames are skipped.
    pub async fn next_request(&mut self) -> Option<Value> {
        loop {
            let frame = self.incoming.recv().await?;
            if let Ok(value) = serde_json::from_str(&frame) {
                return Some(value);
            }
        }
    }

    /// Push a raw frame to the client. `false` if the client side is gone.
    pub fn send_frame(&self, frame: impl Into<String>) -> bool {
        match &self.outgoing {
            Some(tx) => tx.send(frame.into()).is_ok(),
            None => false,
        }
    }

    pub fn reply(&self, id: &Value, result: Value) -> bool {
        self.send_frame(json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string())
    }

    pub fn reply_error(&self, id: &Value, code: i64, message: &str) -> bool {
        self.send_frame(
            json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
                .to_string(),
        )
    }

    /// Drop the server-to-client half; the client sees the connection end.
    pub fn hang_up(&mut self) {
        self.outgoing = None;
    }
}
