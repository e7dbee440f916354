use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::{AdapterError, AdapterErrorKind};

/// Raw protocol event as delivered by the debugging session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportEvent {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl TransportEvent {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            session_id: None,
        }
    }

    pub fn from_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Where a command is addressed.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum CommandTarget {
    /// The top-level inspected tab.
    Tab,
    /// A flat-mode child session attached to a nested frame.
    Session(String),
}

#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn start(&self) -> Result<(), AdapterError>;
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
}

#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl CdpTransport for NoopTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        None
    }

    async fn send_command(
        &self,
        _target: CommandTarget,
        method: &str,
        _params: Value,
    ) -> Result<Value, AdapterError> {
        Err(AdapterError::new(AdapterErrorKind::Unavailable)
            .with_hint(format!("transport not available for method {method}")))
    }
}

pub type CommandResponder =
    Arc<dyn Fn(&CommandTarget, &str, &Value) -> Result<Value, AdapterError> + Send + Sync>;

/// Transport fed through an mpsc channel, used to replay recorded sessions.
///
/// The stream ends once every sender is dropped and the buffer drains.
pub struct ChannelTransport {
    rx: Mutex<mpsc::Receiver<TransportEvent>>,
    responder: Option<CommandResponder>,
    commands: AtomicUsize,
}

impl ChannelTransport {
    pub fn new_pair(buffer: usize) -> (Arc<Self>, mpsc::Sender<TransportEvent>) {
        Self::build(buffer, None)
    }

    pub fn with_responder(
        buffer: usize,
        responder: CommandResponder,
    ) -> (Arc<Self>, mpsc::Sender<TransportEvent>) {
        Self::build(buffer, Some(responder))
    }

    fn build(
        buffer: usize,
        responder: Option<CommandResponder>,
    ) -> (Arc<Self>, mpsc::Sender<TransportEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Arc::new(Self {
                rx: Mutex::new(rx),
                responder,
                commands: AtomicUsize::new(0),
            }),
            tx,
        )
    }

    /// Number of commands sent through this transport so far.
    pub fn command_count(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CdpTransport for ChannelTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        let mut guard = self.rx.lock().await;
        guard.recv().await
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        debug!(target: "cdp-adapter", ?target, method, "channel transport command");
        match &self.responder {
            Some(responder) => responder(&target, method, &params),
            None => Err(AdapterError::new(AdapterErrorKind::Unavailable)
                .with_hint(format!("replay transport cannot answer {method}"))),
        }
    }
}
