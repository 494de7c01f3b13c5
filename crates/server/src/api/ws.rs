//! WebSocket support for live registry and preview updates.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use imgbatch_core::{ConversionSettings, Job, JobId, PreviewEvent, RegistryEvent};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket message sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    JobsAdded { revision: u64, jobs: Vec<Job> },
    JobRemoved { revision: u64, id: JobId },
    /// Status, progress or output changes for existing jobs.
    JobsUpdated { revision: u64, jobs: Vec<Job> },
    JobsCleared { revision: u64, ids: Vec<JobId> },
    SettingsChanged {
        revision: u64,
        settings: ConversionSettings,
    },
    PreviewReady { id: JobId, path: PathBuf },
    /// The job will show "no preview available".
    PreviewFailed { id: JobId, error: String },
    /// Server heartbeat (sent periodically to keep connection alive).
    Heartbeat { timestamp: i64 },
}

impl WsMessage {
    fn kind(&self) -> &'static str {
        match self {
            Self::JobsAdded { .. } => "jobs_added",
            Self::JobRemoved { .. } => "job_removed",
            Self::JobsUpdated { .. } => "jobs_updated",
            Self::JobsCleared { .. } => "jobs_cleared",
            Self::SettingsChanged { .. } => "settings_changed",
            Self::PreviewReady { .. } => "preview_ready",
            Self::PreviewFailed { .. } => "preview_failed",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}

impl From<RegistryEvent> for WsMessage {
    fn from(event: RegistryEvent) -> Self {
        match event {
            RegistryEvent::JobsAdded { revision, jobs } => Self::JobsAdded { revision, jobs },
            RegistryEvent::JobRemoved { revision, id } => Self::JobRemoved { revision, id },
            RegistryEvent::JobsUpdated { revision, jobs } => Self::JobsUpdated { revision, jobs },
            RegistryEvent::Cleared { revision, ids } => Self::JobsCleared { revision, ids },
            RegistryEvent::SettingsChanged { revision, settings } => {
                Self::SettingsChanged { revision, settings }
            }
        }
    }
}

impl From<PreviewEvent> for WsMessage {
    fn from(event: PreviewEvent) -> Self {
        match event {
            PreviewEvent::Ready { id, path } => Self::PreviewReady { id, path },
            PreviewEvent::Failed { id, error } => Self::PreviewFailed { id, error },
        }
    }
}

/// Broadcaster for WebSocket messages using tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct WsBroadcaster {
    sender: broadcast::Sender<WsMessage>,
}

impl WsBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast a message to all connected clients.
    pub fn broadcast(&self, msg: WsMessage) {
        // No receivers just means no clients are connected.
        let _ = self.sender.send(msg);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsMessage> {
        self.sender.subscribe()
    }

    /// Relays registry and preview events to clients until both sources close.
    ///
    /// Also emits a heartbeat every 30 seconds.
    pub fn spawn_forwarder(
        &self,
        mut registry_rx: broadcast::Receiver<RegistryEvent>,
        mut preview_rx: broadcast::Receiver<PreviewEvent>,
    ) -> JoinHandle<()> {
        let broadcaster = self.clone();
        tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await;
            let mut registry_open = true;
            let mut preview_open = true;

            while registry_open || preview_open {
                tokio::select! {
                    result = registry_rx.recv(), if registry_open => match result {
                        Ok(event) => broadcaster.broadcast(event.into()),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Registry event forwarder lagged, skipped {} events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => registry_open = false,
                    },
                    result = preview_rx.recv(), if preview_open => match result {
                        Ok(event) => broadcaster.broadcast(event.into()),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Preview event forwarder lagged, skipped {} events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => preview_open = false,
                    },
                    _ = heartbeat.tick() => {
                        broadcaster.broadcast(WsMessage::Heartbeat {
                            timestamp: Utc::now().timestamp(),
                        });
                    }
                }
            }
            debug!("Event forwarder stopped");
        })
    }
}

impl Default for WsBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ws_broadcaster().subscribe();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    WS_MESSAGES_SENT.with_label_values(&[msg.kind()]).inc();

                    match serde_json::to_string(&msg) {
                        Ok(json) => {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                debug!("WebSocket send failed, client disconnected");
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Failed to serialize WsMessage: {}", e);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // The client resyncs from GET /jobs using the revision numbers.
                    warn!("WebSocket client lagged, skipped {} messages", n);
                    WS_LAG_EVENTS.inc();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Broadcast channel closed");
                    break;
                }
            }
        }
    });

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Close(_)) => {
                debug!("WebSocket client requested close");
                break;
            }
            Ok(Message::Text(text)) => {
                debug!("Ignoring client text message: {}", text);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!("WebSocket client disconnected");
}
