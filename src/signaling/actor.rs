use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::messages::ClientMessage;
use super::router::{Delivery, SignalingRouter};
use super::types::{OutboundMessage, PeerId, SignalingError};

/// Commands sent to the router actor
pub(crate) enum RouterCommand {
    Connect {
        peer_tx: mpsc::UnboundedSender<OutboundMessage>,
        reply: oneshot::Sender<PeerId>,
    },
    Message {
        peer_id: PeerId,
        message: ClientMessage,
    },
    Disconnect {
        peer_id: PeerId,
    },
}

/// Single writer for all lobby and peer state. Commands are applied one at a
/// time; deliveries are pushed into per-peer channels without waiting.
pub(crate) async fn router_actor(mut router: SignalingRouter, mut rx: mpsc::Receiver<RouterCommand>) {
    let mut connections: HashMap<PeerId, mpsc::UnboundedSender<OutboundMessage>> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RouterCommand::Connect { peer_tx, reply } => {
                let peer_id = router.connect();
                connections.insert(peer_id, peer_tx);
                if reply.send(peer_id).is_err() {
                    // Connection went away before it learned its id.
                    connections.remove(&peer_id);
                    let deliveries = router.disconnect(peer_id);
                    deliver(&connections, deliveries);
                }
            }

            RouterCommand::Message { peer_id, message } => {
                let deliveries = router.handle(peer_id, message);
                deliver(&connections, deliveries);
            }

            RouterCommand::Disconnect { peer_id } => {
                connections.remove(&peer_id);
                let deliveries = router.disconnect(peer_id);
                deliver(&connections, deliveries);
            }
        }
    }
}

fn deliver(
    connections: &HashMap<PeerId, mpsc::UnboundedSender<OutboundMessage>>,
    deliveries: Vec<Delivery>,
) {
    for Delivery { to, message } in deliveries {
        let Some(tx) = connections.get(&to) else {
            debug!("Dropping message for disconnected peer {}", to);
            continue;
        };
        match message.to_outbound() {
            Ok(msg) => {
                let _ = tx.send(msg);
            }
            Err(e) => warn!("Failed to serialize message for {}: {}", to, e),
        }
    }
}

/// Handle to communicate with the router actor
#[derive(Clone)]
pub struct RouterHandle {
    pub(crate) tx: mpsc::Sender<RouterCommand>,
}

impl RouterHandle {
    /// Spawn the actor on the current runtime
    pub fn spawn(router: SignalingRouter) -> Self {
        let (tx, rx) = mpsc::channel::<RouterCommand>(1024);
        tokio::spawn(router_actor(router, rx));
        Self { tx }
    }

    /// Register a connection and get its peer id
    pub async fn connect(
        &self,
        peer_tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<PeerId, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RouterCommand::Connect {
                peer_tx,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))?;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }

    /// Hand an inbound message to the router
    pub async fn dispatch(&self, peer_id: PeerId, message: ClientMessage) {
        let _ = self
            .tx
            .send(RouterCommand::Message { peer_id, message })
            .await;
    }

    /// Report a closed connection
    pub async fn disconnect(&self, peer_id: PeerId) {
        let _ = self.tx.send(RouterCommand::Disconnect { peer_id }).await;
    }
}
