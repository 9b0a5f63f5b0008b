//! In-process doubles for the gateway and transport seams.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::gateway::{CommandSpec, GatewayError, MessageId, MessagingGateway, Page};
use crate::source::{EventSourceTransport, LoginResponse, SourceEvent, TransportError};

#[derive(Debug, Clone)]
pub enum GatewayCall {
    Register(usize),
    Send {
        channel: String,
        page: Page,
    },
    Edit {
        channel: String,
        message: String,
        page: Page,
    },
    Delete {
        channel: String,
        message: String,
    },
}

/// Gateway double that records every call and mints sequential message ids.
pub struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
    missing_channels: Mutex<HashSet<String>>,
    fail_edits: AtomicBool,
    connected: AtomicBool,
    next_id: AtomicU64,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            missing_channels: Mutex::new(HashSet::new()),
            fail_edits: AtomicBool::new(false),
            connected: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }

    pub fn mark_channel_missing(&self, channel_id: &str) {
        self.missing_channels
            .lock()
            .unwrap()
            .insert(channel_id.to_string());
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn send_count(&self) -> usize {
        self.count(|c| matches!(c, GatewayCall::Send { .. }))
    }

    pub fn edit_count(&self) -> usize {
        self.count(|c| matches!(c, GatewayCall::Edit { .. }))
    }

    pub fn delete_count(&self) -> usize {
        self.count(|c| matches!(c, GatewayCall::Delete { .. }))
    }

    pub fn register_count(&self) -> usize {
        self.count(|c| matches!(c, GatewayCall::Register(_)))
    }

    fn count(&self, pred: impl Fn(&GatewayCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn channel_missing(&self, channel_id: &str) -> bool {
        self.missing_channels.lock().unwrap().contains(channel_id)
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn register_commands(&self, commands: &[CommandSpec]) -> Result<(), GatewayError> {
        self.calls
            .lock()
            .unwrap()
            .push(GatewayCall::Register(commands.len()));
        Ok(())
    }

    async fn send_page(&self, channel_id: &str, page: &Page) -> Result<MessageId, GatewayError> {
        if self.channel_missing(channel_id) {
            return Err(GatewayError::UnknownChannel(channel_id.to_string()));
        }
        self.calls.lock().unwrap().push(GatewayCall::Send {
            channel: channel_id.to_string(),
            page: page.clone(),
        });
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("m{n}"))
    }

    async fn edit_page(
        &self,
        channel_id: &str,
        message_id: &str,
        page: &Page,
    ) -> Result<(), GatewayError> {
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(GatewayError::UnknownMessage(message_id.to_string()));
        }
        self.calls.lock().unwrap().push(GatewayCall::Edit {
            channel: channel_id.to_string(),
            message: message_id.to_string(),
            page: page.clone(),
        });
        Ok(())
    }

    async fn delete_page(&self, channel_id: &str, message_id: &str) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push(GatewayCall::Delete {
            channel: channel_id.to_string(),
            message: message_id.to_string(),
        });
        Ok(())
    }

    async fn channel_exists(&self, channel_id: &str) -> Result<bool, GatewayError> {
        Ok(!self.channel_missing(channel_id))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Transport double whose event stream is driven from the test body.
pub struct ScriptedTransport {
    tx: Mutex<Option<mpsc::Sender<SourceEvent>>>,
    open: AtomicBool,
    login_response: Mutex<LoginResponse>,
    login_delay: Mutex<Duration>,
    login_calls: AtomicUsize,
    reconnect_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            tx: Mutex::new(None),
            open: AtomicBool::new(false),
            login_response: Mutex::new(LoginResponse {
                ok: true,
                message: None,
            }),
            login_delay: Mutex::new(Duration::ZERO),
            login_calls: AtomicUsize::new(0),
            reconnect_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_login_response(&self, ok: bool, message: Option<&str>) {
        *self.login_response.lock().unwrap() = LoginResponse {
            ok,
            message: message.map(str::to_string),
        };
    }

    pub fn set_login_delay(&self, delay: Duration) {
        *self.login_delay.lock().unwrap() = delay;
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn reconnect_calls(&self) -> usize {
        self.reconnect_calls.load(Ordering::SeqCst)
    }

    pub async fn emit(&self, event: SourceEvent) {
        let tx = self.tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }
}

#[async_trait]
impl EventSourceTransport for ScriptedTransport {
    async fn open(&self) -> Result<mpsc::Receiver<SourceEvent>, TransportError> {
        let (tx, rx) = mpsc::channel(64);
        *self.tx.lock().unwrap() = Some(tx);
        self.open.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn login(&self, _username: &str, _password: &str) -> Result<LoginResponse, TransportError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.login_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.login_response.lock().unwrap().clone())
    }

    async fn reconnect(&self) {
        self.reconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.open.store(false, Ordering::SeqCst);
        *self.tx.lock().unwrap() = None;
    }
}
