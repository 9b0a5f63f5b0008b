//! Relays monitor health state from a monitoring backend into per-community
//! chat channels as live, editable status messages.
//!
//! The chat platform and the backend's wire protocol stay behind the
//! [`gateway::MessagingGateway`] and [`source::EventSourceTransport`] seams;
//! an embedding binary supplies both and drives [`app::App`].

pub mod app;
pub mod cache;
pub mod commands;
pub mod config;
pub mod connection;
pub mod gateway;
pub mod monitor;
pub mod reconcile;
pub mod render;
pub mod source;
pub mod store;
pub mod web;

#[cfg(test)]
pub(crate) mod testutil;

use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes logging: JSON to a daily-rotated file, human-readable to
/// stdout, filtered by `RUST_LOG` (default `info`).
pub fn init_logging() {
    let file_appender = rolling::daily("logs", "status-relay.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}
