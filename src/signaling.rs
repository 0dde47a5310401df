//! WebSocket lobby and WebRTC signaling server

mod actor;
mod messages;
mod registry;
mod router;
mod server;
mod types;

pub use actor::RouterHandle;
pub use messages::{
    AliasPayload, ClientMessage, CreateLobbyPayload, EditLobbyPayload, GamePayload,
    JoinLobbyPayload, LobbyListing, LobbyUpdatePayload, PlayerDataPayload, PlayerInfo,
    ProtocolError, RelayKind, RelayPayload, ServerMessage,
};
pub use registry::{LobbyRegistry, PeerRegistry};
pub use router::{Delivery, SignalingRouter};
pub use server::SignalingServer;
pub use types::{
    HOST_ID, IdGenerator, Lobby, LobbyId, LobbySettings, OutboundMessage, Peer, PeerId,
    SignalingError, effective_id,
};
