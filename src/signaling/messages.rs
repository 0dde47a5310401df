use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{LobbyId, OutboundMessage, PeerId};

/// Inbound frame decoding errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Wire envelope shared by both directions: `{"type": ..., "payload": ...}`
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AliasPayload {
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GamePayload {
    pub game: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlayerDataPayload {
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLobbyPayload {
    /// Falls back to the creator's current game when absent
    #[serde(default)]
    pub game: Option<String>,
    pub max_players: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditLobbyPayload {
    pub id: LobbyId,
    #[serde(default)]
    pub name: String,
    pub max_players: u32,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JoinLobbyPayload {
    pub id: LobbyId,
    #[serde(default)]
    pub password: Option<String>,
}

/// WebRTC negotiation payload. Only `id` is interpreted; everything else
/// is relayed untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayPayload {
    pub id: PeerId,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    Offer,
    Answer,
    Candidate,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    SetAlias(AliasPayload),
    SetGame(GamePayload),
    SetPlayerData(PlayerDataPayload),
    CreateLobby(CreateLobbyPayload),
    EditLobby(EditLobbyPayload),
    JoinLobby(JoinLobbyPayload),
    LeaveLobby,
    SealLobby,
    DeleteLobby,
    Relay(RelayKind, RelayPayload),
}

fn payload<T: DeserializeOwned>(kind: &'static str, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

impl FromStr for ClientMessage {
    type Err = ProtocolError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let Envelope { kind, payload: value } = serde_json::from_str(text)?;

        let msg = match kind.as_str() {
            "SET_ALIAS" => ClientMessage::SetAlias(payload("SET_ALIAS", value)?),
            "SET_GAME" => ClientMessage::SetGame(payload("SET_GAME", value)?),
            "SET_PLAYER_DATA" => ClientMessage::SetPlayerData(payload("SET_PLAYER_DATA", value)?),
            "CREATE_LOBBY" => ClientMessage::CreateLobby(payload("CREATE_LOBBY", value)?),
            "EDIT_LOBBY" => ClientMessage::EditLobby(payload("EDIT_LOBBY", value)?),
            "JOIN_LOBBY" => ClientMessage::JoinLobby(payload("JOIN_LOBBY", value)?),
            "LEAVE_LOBBY" => ClientMessage::LeaveLobby,
            "SEAL_LOBBY" => ClientMessage::SealLobby,
            "DELETE_LOBBY" => ClientMessage::DeleteLobby,
            "OFFER" => ClientMessage::Relay(RelayKind::Offer, payload("OFFER", value)?),
            "ANSWER" => ClientMessage::Relay(RelayKind::Answer, payload("ANSWER", value)?),
            "CANDIDATE" => ClientMessage::Relay(RelayKind::Candidate, payload("CANDIDATE", value)?),
            _ => return Err(ProtocolError::UnknownType(kind)),
        };
        Ok(msg)
    }
}

/// One roster entry of a lobby update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub alias: String,
    pub is_host: bool,
    pub id: PeerId,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyUpdatePayload {
    pub id: LobbyId,
    pub name: String,
    pub has_password: bool,
    pub max_players: u32,
    pub sealed: bool,
    pub players: Vec<PlayerInfo>,
}

/// One row of the lobby browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyListing {
    pub id: LobbyId,
    pub game: String,
    pub name: String,
    pub player_count: usize,
    pub has_password: bool,
    pub max_players: u32,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// The recipient's own effective id in the lobby it just joined
    #[serde(rename = "ID")]
    AssignedId { id: PeerId },

    /// Another lobby member the recipient should connect to
    #[serde(rename = "PEER")]
    PeerAnnounce { id: PeerId },

    #[serde(rename = "REMOVE_PEER")]
    RemovePeer { id: PeerId },

    #[serde(rename = "LOBBY_UPDATE")]
    LobbyUpdate(LobbyUpdatePayload),

    #[serde(rename = "LOBBY_LIST")]
    LobbyList(Vec<LobbyListing>),

    #[serde(rename = "DELETE_LOBBY")]
    DeleteLobby { id: LobbyId },

    #[serde(rename = "OFFER")]
    Offer(RelayPayload),

    #[serde(rename = "ANSWER")]
    Answer(RelayPayload),

    #[serde(rename = "CANDIDATE")]
    Candidate(RelayPayload),

    /// Sent only when an inbound frame cannot be decoded
    #[serde(rename = "ERROR")]
    Error { message: String },
}

impl ServerMessage {
    pub fn relay(kind: RelayKind, payload: RelayPayload) -> Self {
        match kind {
            RelayKind::Offer => ServerMessage::Offer(payload),
            RelayKind::Answer => ServerMessage::Answer(payload),
            RelayKind::Candidate => ServerMessage::Candidate(payload),
        }
    }

    pub fn to_outbound(&self) -> Result<OutboundMessage, serde_json::Error> {
        serde_json::to_string(self).map(OutboundMessage::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_set_alias() {
        let json = r#"{"type": "SET_ALIAS", "payload": {"alias": "Horst"}}"#;
        let msg: ClientMessage = json.parse().unwrap();
        assert_eq!(
            msg,
            ClientMessage::SetAlias(AliasPayload {
                alias: "Horst".to_string()
            })
        );
    }

    #[test]
    fn parse_create_lobby_with_defaults() {
        let json = r#"{"type": "CREATE_LOBBY", "payload": {"game": "chess", "maxPlayers": 2, "name": "A's room"}}"#;
        let msg: ClientMessage = json.parse().unwrap();
        if let ClientMessage::CreateLobby(p) = msg {
            assert_eq!(p.game.as_deref(), Some("chess"));
            assert_eq!(p.max_players, 2);
            assert_eq!(p.name, "A's room");
            assert!(p.password.is_none());
            assert_eq!(p.data, Value::Null);
        } else {
            panic!("Expected CreateLobby");
        }
    }

    #[test]
    fn parse_join_lobby() {
        let json = r#"{"type": "JOIN_LOBBY", "payload": {"id": 4242, "password": "secret"}}"#;
        let msg: ClientMessage = json.parse().unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinLobby(JoinLobbyPayload {
                id: LobbyId(4242),
                password: Some("secret".to_string()),
            })
        );
    }

    #[test]
    fn parse_payloadless_kinds() {
        let leave: ClientMessage = r#"{"type": "LEAVE_LOBBY"}"#.parse().unwrap();
        assert_eq!(leave, ClientMessage::LeaveLobby);
        let seal: ClientMessage = r#"{"type": "SEAL_LOBBY", "payload": {}}"#.parse().unwrap();
        assert_eq!(seal, ClientMessage::SealLobby);
        let delete: ClientMessage = r#"{"type": "DELETE_LOBBY", "payload": null}"#.parse().unwrap();
        assert_eq!(delete, ClientMessage::DeleteLobby);
    }

    #[test]
    fn parse_candidate_keeps_negotiation_fields() {
        let json = r#"{"type": "CANDIDATE", "payload": {"id": 1, "sdp": "abc", "mid": 0}}"#;
        let msg: ClientMessage = json.parse().unwrap();
        if let ClientMessage::Relay(kind, p) = msg {
            assert_eq!(kind, RelayKind::Candidate);
            assert_eq!(p.id, PeerId(1));
            assert_eq!(p.rest.get("sdp"), Some(&json!("abc")));
            assert_eq!(p.rest.get("mid"), Some(&json!(0)));
            assert!(!p.rest.contains_key("id"));
        } else {
            panic!("Expected Relay");
        }
    }

    #[test]
    fn reject_unknown_type() {
        let err = r#"{"type": "START_SERVER", "payload": {}}"#
            .parse::<ClientMessage>()
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(ref t) if t == "START_SERVER"));
    }

    #[test]
    fn reject_bad_payload() {
        let err = r#"{"type": "CREATE_LOBBY", "payload": {"maxPlayers": -3}}"#
            .parse::<ClientMessage>()
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidPayload {
                kind: "CREATE_LOBBY",
                ..
            }
        ));
    }

    #[test]
    fn reject_malformed_json() {
        let err = "not json".parse::<ClientMessage>().unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }

    #[test]
    fn serialize_assigned_id() {
        let msg = ServerMessage::AssignedId { id: PeerId(1) };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"type": "ID", "payload": {"id": 1}}));
    }

    #[test]
    fn serialize_lobby_update() {
        let msg = ServerMessage::LobbyUpdate(LobbyUpdatePayload {
            id: LobbyId(8765),
            name: "Awesome Lobby!".to_string(),
            has_password: false,
            max_players: 4,
            sealed: false,
            players: vec![PlayerInfo {
                alias: "Horst".to_string(),
                is_host: true,
                id: PeerId(1),
                data: Value::Null,
            }],
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "LOBBY_UPDATE");
        assert_eq!(value["payload"]["hasPassword"], false);
        assert_eq!(value["payload"]["maxPlayers"], 4);
        assert_eq!(value["payload"]["players"][0]["isHost"], true);
        assert_eq!(value["payload"]["players"][0]["alias"], "Horst");
    }

    #[test]
    fn serialize_lobby_list_as_array() {
        let msg = ServerMessage::LobbyList(vec![LobbyListing {
            id: LobbyId(5),
            game: "chess".to_string(),
            name: "room".to_string(),
            player_count: 2,
            has_password: true,
            max_players: 2,
        }]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "LOBBY_LIST");
        assert!(value["payload"].is_array());
        assert_eq!(value["payload"][0]["playerCount"], 2);
    }

    #[test]
    fn serialize_relay_flattens_payload() {
        let mut rest = Map::new();
        rest.insert("sdp".to_string(), json!("v=0"));
        let msg = ServerMessage::relay(
            RelayKind::Offer,
            RelayPayload {
                id: PeerId(99),
                rest,
            },
        );
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"type": "OFFER", "payload": {"id": 99, "sdp": "v=0"}}));
    }

    #[test]
    fn serialize_error() {
        let msg = ServerMessage::Error {
            message: "unknown message type: FOO".to_string(),
        };
        let json = msg.to_outbound().unwrap();
        assert!(json.as_str().contains("ERROR"));
        assert!(json.as_str().contains("FOO"));
    }
}
