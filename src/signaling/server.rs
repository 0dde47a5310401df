use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::RouterHandle;
use super::messages::{ClientMessage, ServerMessage};
use super::router::SignalingRouter;
use super::types::{OutboundMessage, PeerId};
use crate::config::Config;

/// Keepalive timings applied to every connection
#[derive(Debug, Clone, Copy)]
struct Keepalive {
    ping_interval: Duration,
    pong_timeout: Duration,
}

pub struct SignalingServer {
    listener: TcpListener,
    handle: RouterHandle,
    keepalive: Keepalive,
}

impl SignalingServer {
    /// Bind the listener and start the router actor
    pub async fn bind(config: &Config) -> std::io::Result<Self> {
        Self::bind_with_router(config, SignalingRouter::new()).await
    }

    pub async fn bind_with_router(
        config: &Config,
        router: SignalingRouter,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        info!("Signaling server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            handle: RouterHandle::spawn(router),
            keepalive: Keepalive {
                ping_interval: config.ping_interval(),
                pong_timeout: config.pong_timeout(),
            },
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let handle = self.handle.clone();
            let keepalive = self.keepalive;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, handle, keepalive).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: RouterHandle,
    keepalive: Keepalive,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let peer_id = handle.connect(tx.clone()).await?;
    info!("WebSocket connection from {} as peer {}", addr, peer_id);

    let mut ping_interval = tokio::time::interval(keepalive.ping_interval);
    // The first tick fires immediately; skip it so the first ping waits a full interval.
    ping_interval.tick().await;
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    let ws_msg = Message::Text(msg.into_inner());
                    if ws_tx.send(ws_msg).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    if ws_tx.send(ctrl_msg).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
    });

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", addr);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + keepalive.pong_timeout);
                debug!("Ping sent to {}", addr);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", addr);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        handle_text_message(&text, &tx, &handle, peer_id).await;
                    }
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", addr);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", addr);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    handle.disconnect(peer_id).await;

    send_task.abort();
    info!("WebSocket disconnected: {} (peer {})", addr, peer_id);

    Ok(())
}

/// Decode one frame and hand it to the router. Undecodable frames are
/// answered with an error to the sender only.
async fn handle_text_message(
    text: &str,
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    handle: &RouterHandle,
    peer_id: PeerId,
) {
    match text.parse::<ClientMessage>() {
        Ok(message) => handle.dispatch(peer_id, message).await,
        Err(e) => {
            debug!("Invalid message from {}: {}", peer_id, e);
            let err = ServerMessage::Error {
                message: e.to_string(),
            };
            if let Ok(msg) = err.to_outbound() {
                let _ = tx.send(msg);
            }
        }
    }
}
