use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub type MessageId = String;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
    #[error("unknown message: {0}")]
    UnknownMessage(String),
    #[error("gateway disconnected")]
    Disconnected,
}

/// One displayable unit sized to the gateway's per-message limits.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<PageField>,
    pub footer: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageField {
    pub name: String,
    pub value: String,
}

/// Typed descriptor for an operator command the gateway registers with the
/// chat platform.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub options: Vec<CommandOption>,
}

#[derive(Debug, Clone)]
pub struct CommandOption {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: OptionKind,
    pub required: bool,
    pub autocomplete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Text,
    Channel,
}

/// Opaque seam over the chat platform: connection, command registration and
/// message delivery live behind this trait. Delivery failures surface as
/// [`GatewayError`] so reconciliation can run its drift-repair path.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<(), GatewayError>;

    /// Posts a page to a channel, returning the new artifact identifier.
    async fn send_page(&self, channel_id: &str, page: &Page) -> Result<MessageId, GatewayError>;

    /// Edits a previously posted artifact in place.
    async fn edit_page(
        &self,
        channel_id: &str,
        message_id: &str,
        page: &Page,
    ) -> Result<(), GatewayError>;

    async fn delete_page(&self, channel_id: &str, message_id: &str) -> Result<(), GatewayError>;

    /// Resolves a channel reference, used to validate set-channel requests.
    async fn channel_exists(&self, channel_id: &str) -> Result<bool, GatewayError>;

    fn is_connected(&self) -> bool;

    async fn disconnect(&self);
}
