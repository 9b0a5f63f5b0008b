use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::cache::MonitorCache;
use crate::source::{EventSourceTransport, SourceEvent, TransportError};

/// Only the 24h rolling window feeds the cache; other periods are dropped.
const UPTIME_PERIOD_24H: &str = "24";

const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_FALLBACK_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("authentication timed out after {0:?}")]
    AuthTimeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
}

/// Owns the single upstream connection: authentication handshake, reconnect
/// fallback, and translation of raw events into cache mutations. Carries no
/// business logic beyond translation and lifecycle.
pub struct ConnectionManager {
    transport: Arc<dyn EventSourceTransport>,
    cache: Arc<MonitorCache>,
    username: String,
    password: String,
    state: Mutex<ConnectionState>,
    authenticated: AtomicBool,
    /// Whether Ready was ever reached; distinguishes a reconnect (re-auth,
    /// log on failure) from the first connect (auth failure is fatal).
    was_ready: AtomicBool,
    auth_timeout: Duration,
    fallback_delay: Duration,
    fallback: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn EventSourceTransport>,
        cache: Arc<MonitorCache>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Arc<Self> {
        Self::with_timings(
            transport,
            cache,
            username,
            password,
            DEFAULT_AUTH_TIMEOUT,
            DEFAULT_FALLBACK_DELAY,
        )
    }

    pub fn with_timings(
        transport: Arc<dyn EventSourceTransport>,
        cache: Arc<MonitorCache>,
        username: impl Into<String>,
        password: impl Into<String>,
        auth_timeout: Duration,
        fallback_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            cache,
            username: username.into(),
            password: password.into(),
            state: Mutex::new(ConnectionState::Disconnected),
            authenticated: AtomicBool::new(false),
            was_ready: AtomicBool::new(false),
            auth_timeout,
            fallback_delay,
            fallback: Mutex::new(None),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    /// Connected means the transport socket is open AND authentication
    /// completed; both must hold.
    pub fn is_connected(&self) -> bool {
        self.transport.is_open() && self.authenticated.load(Ordering::SeqCst)
    }

    /// First connect: opens the transport, authenticates (failure here is for
    /// the caller to escalate), and spawns the event loop.
    pub async fn connect(self: &Arc<Self>) -> Result<JoinHandle<()>, ConnectError> {
        self.set_state(ConnectionState::Connecting);
        info!("Connecting to event source");
        let rx = match self.transport.open().await {
            Ok(rx) => rx,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };
        self.authenticate().await?;

        let manager = Arc::clone(self);
        Ok(tokio::spawn(async move {
            manager.event_loop(rx).await;
        }))
    }

    async fn authenticate(&self) -> Result<(), ConnectError> {
        self.set_state(ConnectionState::Authenticating);
        info!("Authenticating with event source");
        let login = self.transport.login(&self.username, &self.password);
        let response = match tokio::time::timeout(self.auth_timeout, login).await {
            Err(_) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(ConnectError::AuthTimeout(self.auth_timeout));
            }
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e.into());
            }
            Ok(Ok(response)) => response,
        };
        if !response.ok {
            self.set_state(ConnectionState::Disconnected);
            let message = response
                .message
                .unwrap_or_else(|| "authentication rejected".to_string());
            return Err(ConnectError::AuthFailed(message));
        }
        self.authenticated.store(true, Ordering::SeqCst);
        self.was_ready.store(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Ready);
        info!("Authenticated with event source");
        Ok(())
    }

    async fn event_loop(self: Arc<Self>, mut rx: mpsc::Receiver<SourceEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                SourceEvent::Connected => self.on_connected().await,
                SourceEvent::Disconnected { reason } => self.on_disconnected(reason),
                SourceEvent::MonitorList(monitors) => self.cache.apply_monitor_list(monitors),
                SourceEvent::Heartbeat(heartbeat) => self.cache.apply_heartbeat(heartbeat),
                SourceEvent::AvgPing { monitor_id, value } => {
                    self.cache.apply_avg_ping(monitor_id, value)
                }
                SourceEvent::Uptime {
                    monitor_id,
                    period,
                    percentage,
                } => {
                    if period == UPTIME_PERIOD_24H {
                        self.cache.apply_uptime_24h(monitor_id, Some(percentage));
                    }
                }
            }
        }
        warn!("Event source stream ended");
        self.authenticated.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
    }

    async fn on_connected(self: &Arc<Self>) {
        self.cancel_fallback();
        if self.was_ready.load(Ordering::SeqCst) && !self.authenticated.load(Ordering::SeqCst) {
            info!("Reconnected to event source, re-authenticating");
            // A reconnect re-auth failure is logged and left to the next
            // transport reconnect attempt, never escalated.
            if let Err(e) = self.authenticate().await {
                error!(error = %e, "Re-authentication failed");
            }
        }
    }

    fn on_disconnected(self: &Arc<Self>, reason: String) {
        warn!(reason = %reason, "Event source disconnected");
        self.authenticated.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);

        // Guard against the transport's own reconnection silently giving up.
        self.cancel_fallback();
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(manager.fallback_delay).await;
            if !manager.is_connected() {
                info!("Transport has not recovered, kicking a manual reconnect");
                manager.transport.reconnect().await;
            }
        });
        *self.fallback.lock().unwrap() = Some(handle);
    }

    fn cancel_fallback(&self) {
        if let Some(handle) = self.fallback.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Out-of-band reconnect, driven by the tick loop after several
    /// consecutive disconnected ticks.
    pub async fn force_reconnect(&self) {
        debug!("Forcing event source reconnect");
        self.transport.reconnect().await;
    }

    pub async fn disconnect(&self) {
        self.cancel_fallback();
        self.transport.disconnect().await;
        self.authenticated.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Disconnected);
        info!("Disconnected from event source");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{Heartbeat, Monitor, MonitorStatus};
    use crate::testutil::ScriptedTransport;
    use chrono::Utc;

    fn monitor(id: i64, name: &str) -> Monitor {
        Monitor {
            id,
            name: name.to_string(),
            kind: "http".to_string(),
            url: None,
            active: true,
            interval_seconds: 60,
            tags: Vec::new(),
        }
    }

    fn manager(
        transport: &Arc<ScriptedTransport>,
        cache: &Arc<MonitorCache>,
    ) -> Arc<ConnectionManager> {
        ConnectionManager::with_timings(
            transport.clone() as Arc<dyn EventSourceTransport>,
            cache.clone(),
            "admin",
            "hunter2",
            Duration::from_millis(100),
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn first_connect_authenticates_and_reaches_ready() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = Arc::new(MonitorCache::new());
        let manager = manager(&transport, &cache);

        let handle = manager.connect().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Ready);
        assert!(manager.is_connected());
        assert_eq!(transport.login_calls(), 1);
        handle.abort();
    }

    #[tokio::test]
    async fn rejected_login_fails_first_connect() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_login_response(false, Some("bad password"));
        let cache = Arc::new(MonitorCache::new());
        let manager = manager(&transport, &cache);

        let err = manager.connect().await.unwrap_err();
        match err {
            ConnectError::AuthFailed(message) => assert_eq!(message, "bad password"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn slow_login_times_out() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_login_delay(Duration::from_millis(500));
        let cache = Arc::new(MonitorCache::new());
        let manager = manager(&transport, &cache);

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, ConnectError::AuthTimeout(_)));
    }

    #[tokio::test]
    async fn events_flow_into_the_cache() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = Arc::new(MonitorCache::new());
        let manager = manager(&transport, &cache);
        let handle = manager.connect().await.unwrap();

        transport
            .emit(SourceEvent::MonitorList(vec![monitor(1, "api")]))
            .await;
        transport
            .emit(SourceEvent::Heartbeat(Heartbeat {
                monitor_id: 1,
                status: MonitorStatus::Up,
                time: Utc::now(),
                message: String::new(),
                ping_ms: Some(10.0),
                important: true,
            }))
            .await;
        transport
            .emit(SourceEvent::AvgPing {
                monitor_id: 1,
                value: Some(12.0),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let health = &cache.snapshot(&[])[0];
        assert_eq!(health.status, MonitorStatus::Up);
        assert_eq!(health.avg_ping_ms, Some(12.0));
        handle.abort();
    }

    #[tokio::test]
    async fn only_24h_uptime_period_is_applied() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = Arc::new(MonitorCache::new());
        let manager = manager(&transport, &cache);
        let handle = manager.connect().await.unwrap();

        transport
            .emit(SourceEvent::MonitorList(vec![monitor(1, "api")]))
            .await;
        transport
            .emit(SourceEvent::Uptime {
                monitor_id: 1,
                period: "720".to_string(),
                percentage: 42.0,
            })
            .await;
        transport
            .emit(SourceEvent::Uptime {
                monitor_id: 1,
                period: "24".to_string(),
                percentage: 99.5,
            })
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.snapshot(&[])[0].uptime_24h, Some(99.5));
        handle.abort();
    }

    #[tokio::test]
    async fn disconnect_then_reconnect_reauthenticates() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = Arc::new(MonitorCache::new());
        let manager = manager(&transport, &cache);
        let handle = manager.connect().await.unwrap();
        assert_eq!(transport.login_calls(), 1);

        transport
            .emit(SourceEvent::Disconnected {
                reason: "transport error".to_string(),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_connected());

        transport.set_open(true);
        transport.emit(SourceEvent::Connected).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.login_calls(), 2);
        assert_eq!(manager.state(), ConnectionState::Ready);
        assert!(manager.is_connected());
        handle.abort();
    }

    #[tokio::test]
    async fn fallback_kicks_manual_reconnect_when_transport_stays_down() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = Arc::new(MonitorCache::new());
        let manager = manager(&transport, &cache);
        let handle = manager.connect().await.unwrap();

        transport.set_open(false);
        transport
            .emit(SourceEvent::Disconnected {
                reason: "gone".to_string(),
            })
            .await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(transport.reconnect_calls() >= 1);
        handle.abort();
    }

    #[tokio::test]
    async fn prompt_reconnect_cancels_the_fallback() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = Arc::new(MonitorCache::new());
        let manager = manager(&transport, &cache);
        let handle = manager.connect().await.unwrap();

        transport
            .emit(SourceEvent::Disconnected {
                reason: "blip".to_string(),
            })
            .await;
        transport.emit(SourceEvent::Connected).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(transport.reconnect_calls(), 0);
        handle.abort();
    }
}
