use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Signaling server errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalingError {
    #[error("peer not found: {0}")]
    PeerNotFound(PeerId),

    #[error("lobby not found: {0}")]
    LobbyNotFound(LobbyId),

    #[error("peer {0} is not in a lobby")]
    NotInLobby(PeerId),

    #[error("peer {0} is not allowed to do that")]
    Forbidden(PeerId),

    #[error("lobby {0} is full")]
    CapacityExceeded(LobbyId),

    #[error("lobby {0} is sealed")]
    Sealed(LobbyId),

    #[error("wrong password for lobby {0}")]
    AuthFailed(LobbyId),

    #[error("invalid lobby settings: {0}")]
    InvalidSpec(String),

    #[error("peer {0} is already in lobby {1}")]
    AlreadyMember(PeerId, LobbyId),

    #[error("internal error: {0}")]
    Internal(String),
}

/// The address every lobby member uses to reach its host.
pub const HOST_ID: PeerId = PeerId(1);

/// Largest identifier handed out (31-bit positive).
const MAX_ID: u32 = i32::MAX as u32;

/// Peer identifier, a 31-bit positive integer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u32);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lobby identifier, a 31-bit positive integer on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LobbyId(pub u32);

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of a peer as seen by the other members of its lobby.
#[inline]
pub fn effective_id(id: PeerId, is_host: bool) -> PeerId {
    if is_host { HOST_ID } else { id }
}

/// Random identifier source for peers and lobbies.
///
/// Values are drawn uniformly from `2..=i32::MAX`, so neither zero nor
/// [`HOST_ID`] is ever produced. Uniqueness is not guaranteed; registries
/// check for collisions and draw again.
#[derive(Debug)]
pub struct IdGenerator {
    rng: StdRng,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic generator, for tests and benchmarks
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn next_id(&mut self) -> u32 {
        self.rng.random_range(HOST_ID.0 + 1..=MAX_ID)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub id: PeerId,
    pub is_host: bool,
    pub alias: String,
    pub game: String,
    pub lobby_id: Option<LobbyId>,
    /// Client supplied profile, forwarded verbatim in roster updates
    pub data: Value,
}

impl Peer {
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            is_host: false,
            alias: id.to_string(),
            game: String::new(),
            lobby_id: None,
            data: Value::Null,
        }
    }

    pub fn effective_id(&self) -> PeerId {
        effective_id(self.id, self.is_host)
    }
}

/// Settings a host supplies when creating or editing a lobby.
#[derive(Debug, Clone, PartialEq)]
pub struct LobbySettings {
    pub game: String,
    pub name: String,
    pub max_players: u32,
    pub password: String,
    pub data: Value,
}

impl LobbySettings {
    pub fn validate(&self) -> Result<(), SignalingError> {
        if self.max_players < 1 {
            return Err(SignalingError::InvalidSpec(format!(
                "maxPlayers must be at least 1, got {}",
                self.max_players
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lobby {
    pub id: LobbyId,
    pub game: String,
    pub host: PeerId,
    pub name: String,
    pub max_players: u32,
    /// Empty means no password
    pub password: String,
    pub data: Value,
    pub sealed: bool,
    /// Real peer ids in join order; the host is always first.
    pub members: Vec<PeerId>,
}

impl Lobby {
    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max_players as usize
    }

    pub fn player_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_member(&self, peer_id: PeerId) -> bool {
        self.members.contains(&peer_id)
    }
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    /// Create a new outbound message from any string type
    pub fn new(s: impl Into<Utf8Bytes>) -> Self {
        Self(s.into())
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
