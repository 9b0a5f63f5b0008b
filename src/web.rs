use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::connection::ConnectionManager;
use crate::gateway::MessagingGateway;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub event_source_connected: bool,
    pub gateway_connected: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct HealthState {
    pub connection: Arc<ConnectionManager>,
    pub gateway: Arc<dyn MessagingGateway>,
}

/// Healthy only when both upstream links are live; otherwise 503 so an
/// orchestrator restarts the process.
pub fn health_snapshot(state: &HealthState) -> (StatusCode, HealthResponse) {
    let event_source_connected = state.connection.is_connected();
    let gateway_connected = state.gateway.is_connected();
    let healthy = event_source_connected && gateway_connected;
    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        event_source_connected,
        gateway_connected,
        timestamp: Utc::now(),
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, response)
}

async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, response) = health_snapshot(&state);
    (code, Json(response))
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// Serves the probe until the shutdown future resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: HealthState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Health endpoint listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MonitorCache;
    use crate::source::EventSourceTransport;
    use crate::testutil::{RecordingGateway, ScriptedTransport};

    fn state(gateway_connected: bool) -> (HealthState, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = Arc::new(MonitorCache::new());
        let connection = ConnectionManager::new(
            transport.clone() as Arc<dyn EventSourceTransport>,
            cache,
            "admin",
            "hunter2",
        );
        let gateway = Arc::new(RecordingGateway::new());
        gateway.set_connected(gateway_connected);
        (
            HealthState {
                connection,
                gateway,
            },
            transport,
        )
    }

    #[tokio::test]
    async fn unhealthy_until_event_source_is_up() {
        let (state, transport) = state(true);
        let (code, body) = health_snapshot(&state);
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "unhealthy");
        assert!(!body.event_source_connected);
        assert!(body.gateway_connected);

        // Bring the event source fully up.
        state.connection.connect().await.unwrap().abort();
        let (code, body) = health_snapshot(&state);
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.status, "healthy");
        drop(transport);
    }

    #[tokio::test]
    async fn unhealthy_when_gateway_drops() {
        let (state, _transport) = state(false);
        state.connection.connect().await.unwrap().abort();
        let (code, body) = health_snapshot(&state);
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "unhealthy");
        assert!(body.event_source_connected);
        assert!(!body.gateway_connected);
    }
}
