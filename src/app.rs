use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cache::{CacheEvent, MonitorCache};
use crate::commands::CommandService;
use crate::config::Config;
use crate::connection::{ConnectError, ConnectionManager};
use crate::gateway::{GatewayError, MessagingGateway};
use crate::reconcile::{CycleTrigger, Reconciler};
use crate::source::EventSourceTransport;
use crate::store::{TenantConfig, TenantStore};
use crate::web;

/// Consecutive disconnected ticks tolerated before kicking a manual
/// reconnect.
const DISCONNECTED_TICKS_BEFORE_RECONNECT: u32 = 3;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("event source connection failed: {0}")]
    Connect(#[from] ConnectError),
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wires the components together and owns the process lifecycle: startup
/// order, the periodic tick, event-driven refreshes, the health probe and
/// orderly shutdown.
pub struct App {
    config: Config,
    store: Arc<TenantStore>,
    cache: Arc<MonitorCache>,
    connection: Arc<ConnectionManager>,
    reconciler: Arc<Reconciler>,
    commands: Arc<CommandService>,
    gateway: Arc<dyn MessagingGateway>,
    shutting_down: AtomicBool,
    shutdown_notify: Arc<Notify>,
}

impl App {
    pub fn new(
        config: Config,
        gateway: Arc<dyn MessagingGateway>,
        transport: Arc<dyn EventSourceTransport>,
    ) -> Arc<Self> {
        let store = Arc::new(TenantStore::load_with_defaults(
            config.state_file(),
            TenantConfig {
                embed_color: config.embed_color,
                ..TenantConfig::default()
            },
        ));
        let cache = Arc::new(MonitorCache::new());
        let connection = ConnectionManager::new(
            transport,
            cache.clone(),
            config.event_source_username.clone(),
            config.event_source_password.clone(),
        );
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            cache.clone(),
            gateway.clone(),
        ));
        let commands = Arc::new(CommandService::new(
            store.clone(),
            cache.clone(),
            connection.clone(),
            gateway.clone(),
            config.admin_user_ids.clone(),
        ));
        Arc::new(Self {
            config,
            store,
            cache,
            connection,
            reconciler,
            commands,
            gateway,
            shutting_down: AtomicBool::new(false),
            shutdown_notify: Arc::new(Notify::new()),
        })
    }

    pub fn commands(&self) -> Arc<CommandService> {
        self.commands.clone()
    }

    pub fn connection(&self) -> Arc<ConnectionManager> {
        self.connection.clone()
    }

    /// Brings the service up: registers the command surface, connects to the
    /// event source (a first-connect auth failure is fatal), and spawns the
    /// background tasks. Returns their handles for supervision.
    pub async fn start(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>, AppError> {
        self.gateway
            .register_commands(&CommandService::specs())
            .await?;

        let event_loop = self.connection.connect().await?;
        let flusher = self.store.spawn_flusher();
        let cache_events = self.spawn_cache_event_loop();
        let ticker = self.spawn_tick_loop();
        let health = self.spawn_health_endpoint().await?;

        info!("Status relay started");
        Ok(vec![event_loop, flusher, cache_events, ticker, health])
    }

    /// Cache events drive immediate refreshes so status transitions reach
    /// the channels ahead of the next tick.
    fn spawn_cache_event_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let app = Arc::clone(self);
        let mut events = self.cache.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(CacheEvent::MonitorsUpdated) => {
                        app.reconciler.run_cycle(CycleTrigger::CacheEvent).await;
                    }
                    Ok(CacheEvent::StatusChanged {
                        monitor_id,
                        name,
                        from,
                        to,
                    }) => {
                        info!(
                            monitor = monitor_id,
                            name = %name,
                            from = ?from,
                            to = ?to,
                            "Monitor status changed"
                        );
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Cache event stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_tick_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let app = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(app.config.update_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut disconnected_ticks = 0u32;
            loop {
                interval.tick().await;
                if app.connection.is_connected() {
                    disconnected_ticks = 0;
                    app.reconciler.run_cycle(CycleTrigger::Timer).await;
                } else {
                    disconnected_ticks += 1;
                    warn!(ticks = disconnected_ticks, "Event source disconnected at tick");
                    if disconnected_ticks >= DISCONNECTED_TICKS_BEFORE_RECONNECT {
                        app.connection.force_reconnect().await;
                        disconnected_ticks = 0;
                    }
                }
            }
        })
    }

    async fn spawn_health_endpoint(self: &Arc<Self>) -> Result<JoinHandle<()>, AppError> {
        let listener =
            tokio::net::TcpListener::bind(("0.0.0.0", self.config.health_port)).await?;
        let state = web::HealthState {
            connection: self.connection.clone(),
            gateway: self.gateway.clone(),
        };
        let notify = self.shutdown_notify.clone();
        Ok(tokio::spawn(async move {
            let shutdown = async move { notify.notified().await };
            if let Err(e) = web::serve(listener, state, shutdown).await {
                error!(error = %e, "Health endpoint failed");
            }
        }))
    }

    /// Runs until a task exits or a termination signal arrives, then shuts
    /// down in order.
    pub async fn run(self: &Arc<Self>) -> Result<(), AppError> {
        let mut tasks = self.start().await?;
        tasks.push(tokio::spawn(async move {
            shutdown_signal().await;
            info!("Termination signal received");
        }));

        let (_, _, remaining) = futures::future::select_all(tasks).await;
        for task in remaining {
            task.abort();
        }
        self.shutdown().await;
        Ok(())
    }

    /// Idempotent orderly teardown: stop the probe, drop both upstream links
    /// and force a final store flush.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down");
        self.shutdown_notify.notify_waiters();
        self.connection.disconnect().await;
        self.gateway.disconnect().await;
        if let Err(e) = self.store.flush() {
            error!(error = %e, "Final store flush failed");
        }
        info!("Shutdown complete");
    }
}

/// Resolves on SIGINT or, on unix, SIGTERM. An uninstallable handler is
/// logged and that signal path simply never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
