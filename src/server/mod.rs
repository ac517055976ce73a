pub mod protocol;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::season::Season;
use protocol::{ControlMessage, HealthStatus, SeasonEvent, SeasonSnapshot};

/// Shared state between connection handlers and the season driver.
pub struct ServerState {
    /// Current season snapshot message (JSON, ready to send).
    pub snapshot_json: RwLock<String>,
    /// Broadcast channel for season events.
    pub event_sender: broadcast::Sender<String>,
    /// Control messages from clients, consumed by the driver.
    pub control_sender: mpsc::Sender<ControlMessage>,
    pub health: RwLock<HealthStatus>,
    last_snapshot_tick: RwLock<u64>,
}

impl ServerState {
    pub fn new(season: &Season) -> (Self, mpsc::Receiver<ControlMessage>) {
        let (event_tx, _) = broadcast::channel(256);
        let (control_tx, control_rx) = mpsc::channel(64);
        let state = ServerState {
            snapshot_json: RwLock::new(build_snapshot_json(season)),
            event_sender: event_tx,
            control_sender: control_tx,
            health: RwLock::new(health_of(season, 0)),
            last_snapshot_tick: RwLock::new(season.tick),
        };
        (state, control_rx)
    }

    /// Refresh the snapshot and health data, then broadcast the event if any.
    pub async fn publish(&self, season: &Season, event: Option<&SeasonEvent>) {
        *self.snapshot_json.write().await = build_snapshot_json(season);
        let since = *self.last_snapshot_tick.read().await;
        *self.health.write().await = health_of(season, season.tick.saturating_sub(since));

        if let Some(event) = event {
            match serde_json::to_string(event) {
                // No receivers is fine.
                Ok(json) => {
                    let _ = self.event_sender.send(json);
                }
                Err(e) => warn!(error = %e, "Failed to encode season event"),
            }
        }
    }

    /// Record that a snapshot was written at `tick`.
    pub async fn snapshot_saved(&self, tick: u64) {
        *self.last_snapshot_tick.write().await = tick;
        self.health.write().await.snapshot_age_ticks = 0;
    }
}

fn health_of(season: &Season, snapshot_age_ticks: u64) -> HealthStatus {
    HealthStatus {
        season_id: season.id.to_string(),
        round: season.round,
        phase: season.phase.label(),
        tick: season.tick,
        paused: season.paused,
        speed: season.settings.speed.label(),
        snapshot_age_ticks,
    }
}

pub fn build_snapshot_json(season: &Season) -> String {
    serde_json::to_string(&SeasonSnapshot::from_season(season)).unwrap_or_else(|_| "{}".to_string())
}

/// Run the websocket feed and health endpoint until the listener fails.
pub async fn start_server(
    state: Arc<ServerState>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Spectator feed listening on ws://{}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, state).await {
                error!(%peer, "Connection error: {}", e);
            }
        });
    }
}

/// Route a TCP connection to the websocket feed or an HTTP handler.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buf = [0u8; 512];
    let n = stream.peek(&mut buf).await?;
    let request_line = String::from_utf8_lossy(&buf[..n]).to_lowercase();

    if request_line.contains("upgrade: websocket") {
        handle_websocket(stream, peer, state).await
    } else if request_line.contains("get /health") {
        handle_health_request(stream, state).await
    } else {
        handle_not_found(stream).await
    }
}

/// Send the snapshot, then stream events while forwarding control messages.
async fn handle_websocket(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    info!(%peer, "WebSocket connected");

    let (mut write, mut read) = futures_util::StreamExt::split(ws_stream);

    let snapshot = state.snapshot_json.read().await.clone();
    futures_util::SinkExt::send(&mut write, Message::Text(snapshot.into())).await?;

    let mut rx = state.event_sender.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(json) => {
                        if futures_util::SinkExt::send(&mut write, Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(%peer, lagged = n, "Client lagged behind on events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = futures_util::StreamExt::next(&mut read) => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ControlMessage>(&text) {
                            Ok(control) => {
                                debug!(%peer, ?control, "Control message");
                                if state.control_sender.send(control).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(%peer, error = %e, "Ignoring malformed control message"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    info!(%peer, "WebSocket disconnected");
    Ok(())
}

async fn handle_not_found(
    mut stream: TcpStream,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tokio::io::AsyncReadExt;
    use tokio::io::AsyncWriteExt;

    let mut buf = vec![0u8; 4096];
    let _ = stream.read(&mut buf).await?;

    let body = "Connect a websocket client for the season feed, or GET /health.\n";
    let response = format!(
        "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn handle_health_request(
    mut stream: TcpStream,
    state: Arc<ServerState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tokio::io::AsyncReadExt;
    use tokio::io::AsyncWriteExt;

    let mut buf = vec![0u8; 4096];
    let _ = stream.read(&mut buf).await?;

    let body = serde_json::to_string(&*state.health.read().await)?;
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;

    Ok(())
}
