use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::monitor::{Heartbeat, Monitor};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("login failed: {0}")]
    Login(String),
    #[error("transport closed")]
    Closed,
}

/// Events delivered by the monitoring backend, already decoded off the wire
/// by the transport.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// Transport-level (re)connection established.
    Connected,
    /// Transport-level disconnect; the transport keeps retrying on its own.
    Disconnected { reason: String },
    /// Full monitor-list snapshot.
    MonitorList(Vec<Monitor>),
    Heartbeat(Heartbeat),
    AvgPing {
        monitor_id: i64,
        value: Option<f64>,
    },
    /// Rolling uptime sample; `period` selects the window ("24" for 24h).
    Uptime {
        monitor_id: i64,
        period: String,
        percentage: f64,
    },
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub ok: bool,
    pub message: Option<String>,
}

/// Opaque seam over the monitoring backend's wire protocol. The transport
/// owns the socket and its own automatic reconnection, surfacing lifecycle
/// transitions as [`SourceEvent`]s on the stream it hands out.
#[async_trait]
pub trait EventSourceTransport: Send + Sync {
    /// Opens the transport and returns the event stream. Resolves once the
    /// initial connection is up.
    async fn open(&self) -> Result<mpsc::Receiver<SourceEvent>, TransportError>;

    /// Runs the authentication handshake against the backend.
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, TransportError>;

    /// Kicks a manual reconnect, used when the built-in reconnection has
    /// gone quiet.
    async fn reconnect(&self);

    /// Whether the underlying socket is open. Authentication state is
    /// tracked by the connection manager, not here.
    fn is_open(&self) -> bool;

    async fn disconnect(&self);
}
