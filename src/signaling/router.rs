//! Lobby state machine and relay routing.
//!
//! The router owns both registries and is driven one message at a time.
//! Every call returns the deliveries it produced; sending them is up to the
//! caller.

use serde_json::Value;
use tracing::{debug, info};

use super::messages::{
    ClientMessage, CreateLobbyPayload, EditLobbyPayload, JoinLobbyPayload, LobbyListing,
    LobbyUpdatePayload, PlayerInfo, RelayKind, RelayPayload, ServerMessage,
};
use super::registry::{LobbyRegistry, PeerRegistry};
use super::types::{HOST_ID, IdGenerator, LobbyId, LobbySettings, PeerId, SignalingError};

/// A message addressed to one peer
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: PeerId,
    pub message: ServerMessage,
}

#[derive(Debug, Default)]
pub struct SignalingRouter {
    peers: PeerRegistry,
    lobbies: LobbyRegistry,
    ids: IdGenerator,
}

impl SignalingRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_generator(ids: IdGenerator) -> Self {
        Self {
            peers: PeerRegistry::default(),
            lobbies: LobbyRegistry::default(),
            ids,
        }
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn lobbies(&self) -> &LobbyRegistry {
        &self.lobbies
    }

    /// Register a newly connected peer
    pub fn connect(&mut self) -> PeerId {
        let peer_id = self.peers.register(&mut self.ids);
        info!("Peer connected: {}", peer_id);
        peer_id
    }

    /// Tear down everything a peer owns and tell the rest of the world.
    pub fn disconnect(&mut self, peer_id: PeerId) -> Vec<Delivery> {
        let mut out = Vec::new();
        if self.peers.get(peer_id).is_none() {
            return out;
        }

        if let Err(e) = self.remove_from_lobby(peer_id, &mut out) {
            debug!("Disconnect cleanup for {}: {}", peer_id, e);
        }
        self.peers.unregister(peer_id);
        self.lobby_list(&mut out);

        info!("Peer disconnected: {}", peer_id);
        out
    }

    /// Process one inbound message. Rejected requests produce no deliveries.
    pub fn handle(&mut self, peer_id: PeerId, msg: ClientMessage) -> Vec<Delivery> {
        let mut out = Vec::new();

        let result = match msg {
            ClientMessage::SetAlias(p) => self.set_alias(peer_id, p.alias, &mut out),
            ClientMessage::SetGame(p) => self.set_game(peer_id, p.game, &mut out),
            ClientMessage::SetPlayerData(p) => self.set_player_data(peer_id, p.data, &mut out),
            ClientMessage::CreateLobby(p) => self.create_lobby(peer_id, p, &mut out),
            ClientMessage::EditLobby(p) => self.edit_lobby(peer_id, p, &mut out),
            ClientMessage::JoinLobby(p) => self.join_lobby(peer_id, p, &mut out),
            ClientMessage::LeaveLobby => self.leave_lobby(peer_id, &mut out),
            ClientMessage::SealLobby => self.seal_lobby(peer_id, &mut out),
            ClientMessage::DeleteLobby => self.delete_lobby(peer_id, &mut out),
            ClientMessage::Relay(kind, p) => self.relay(peer_id, kind, p, &mut out),
        };

        if let Err(e) = result {
            debug!("Request from {} rejected: {}", peer_id, e);
        }
        out
    }

    fn set_alias(
        &mut self,
        peer_id: PeerId,
        alias: String,
        out: &mut Vec<Delivery>,
    ) -> Result<(), SignalingError> {
        let peer = self
            .peers
            .get_mut(peer_id)
            .ok_or(SignalingError::PeerNotFound(peer_id))?;
        peer.alias = alias;

        if let Some(lobby_id) = peer.lobby_id {
            self.lobby_update(lobby_id, out);
        }
        Ok(())
    }

    fn set_game(
        &mut self,
        peer_id: PeerId,
        game: String,
        out: &mut Vec<Delivery>,
    ) -> Result<(), SignalingError> {
        let peer = self
            .peers
            .get_mut(peer_id)
            .ok_or(SignalingError::PeerNotFound(peer_id))?;
        peer.game = game;

        self.lobby_list(out);
        Ok(())
    }

    fn set_player_data(
        &mut self,
        peer_id: PeerId,
        data: Value,
        out: &mut Vec<Delivery>,
    ) -> Result<(), SignalingError> {
        let peer = self
            .peers
            .get_mut(peer_id)
            .ok_or(SignalingError::PeerNotFound(peer_id))?;
        peer.data = data;

        if let Some(lobby_id) = peer.lobby_id {
            self.lobby_update(lobby_id, out);
        }
        Ok(())
    }

    fn create_lobby(
        &mut self,
        peer_id: PeerId,
        p: CreateLobbyPayload,
        out: &mut Vec<Delivery>,
    ) -> Result<(), SignalingError> {
        let peer = self
            .peers
            .get(peer_id)
            .ok_or(SignalingError::PeerNotFound(peer_id))?;
        if peer.is_host {
            return Err(SignalingError::Forbidden(peer_id));
        }

        let settings = LobbySettings {
            game: p.game.unwrap_or_else(|| peer.game.clone()),
            name: p.name,
            max_players: p.max_players,
            password: p.password.unwrap_or_default(),
            data: p.data,
        };
        // Must fail before the creator leaves its current lobby.
        settings.validate()?;

        if peer.lobby_id.is_some() {
            self.remove_from_lobby(peer_id, out)?;
        }

        let host = self
            .peers
            .get_mut(peer_id)
            .ok_or(SignalingError::PeerNotFound(peer_id))?;
        let lobby_id = self.lobbies.create(&mut self.ids, host, settings)?;
        info!("Lobby created: {} by peer {}", lobby_id, peer_id);

        self.announce_join(lobby_id, peer_id, out);
        Ok(())
    }

    fn edit_lobby(
        &mut self,
        peer_id: PeerId,
        p: EditLobbyPayload,
        out: &mut Vec<Delivery>,
    ) -> Result<(), SignalingError> {
        let lobby = self
            .lobbies
            .get_mut(p.id)
            .ok_or(SignalingError::LobbyNotFound(p.id))?;
        if lobby.host != peer_id {
            return Err(SignalingError::Forbidden(peer_id));
        }
        if p.max_players < 1 || (p.max_players as usize) < lobby.members.len() {
            return Err(SignalingError::InvalidSpec(format!(
                "maxPlayers {} does not fit {} members",
                p.max_players,
                lobby.members.len()
            )));
        }

        lobby.name = p.name;
        lobby.max_players = p.max_players;
        lobby.password = p.password.unwrap_or_default();
        lobby.data = p.data;

        self.lobby_update(p.id, out);
        self.lobby_list(out);
        Ok(())
    }

    fn join_lobby(
        &mut self,
        peer_id: PeerId,
        p: JoinLobbyPayload,
        out: &mut Vec<Delivery>,
    ) -> Result<(), SignalingError> {
        let password = p.password.unwrap_or_default();
        let peer = self
            .peers
            .get(peer_id)
            .ok_or(SignalingError::PeerNotFound(peer_id))?;
        self.lobbies.check_join(p.id, peer_id, &password)?;

        if peer.lobby_id.is_some() {
            self.remove_from_lobby(peer_id, out)?;
        }

        let peer = self
            .peers
            .get_mut(peer_id)
            .ok_or(SignalingError::PeerNotFound(peer_id))?;
        self.lobbies.join(p.id, peer, &password)?;
        info!("Peer {} joined lobby {}", peer_id, p.id);

        self.announce_join(p.id, peer_id, out);
        Ok(())
    }

    fn leave_lobby(&mut self, peer_id: PeerId, out: &mut Vec<Delivery>) -> Result<(), SignalingError> {
        self.remove_from_lobby(peer_id, out)?;
        self.lobby_list(out);
        Ok(())
    }

    fn seal_lobby(&mut self, peer_id: PeerId, out: &mut Vec<Delivery>) -> Result<(), SignalingError> {
        let lobby_id = self.hosted_lobby(peer_id)?;
        let lobby = self
            .lobbies
            .get_mut(lobby_id)
            .ok_or(SignalingError::LobbyNotFound(lobby_id))?;
        if lobby.sealed {
            return Ok(());
        }
        lobby.sealed = true;
        info!("Lobby {} sealed", lobby_id);

        self.lobby_update(lobby_id, out);
        self.lobby_list(out);
        Ok(())
    }

    fn delete_lobby(&mut self, peer_id: PeerId, out: &mut Vec<Delivery>) -> Result<(), SignalingError> {
        let lobby_id = self.hosted_lobby(peer_id)?;
        self.destroy_lobby(lobby_id, out);
        self.lobby_list(out);
        Ok(())
    }

    fn relay(
        &mut self,
        peer_id: PeerId,
        kind: RelayKind,
        mut payload: RelayPayload,
        out: &mut Vec<Delivery>,
    ) -> Result<(), SignalingError> {
        let sender = self
            .peers
            .get(peer_id)
            .ok_or(SignalingError::PeerNotFound(peer_id))?;

        let target = if payload.id == HOST_ID {
            let lobby_id = sender.lobby_id.ok_or(SignalingError::NotInLobby(peer_id))?;
            let lobby = self
                .lobbies
                .get(lobby_id)
                .ok_or(SignalingError::LobbyNotFound(lobby_id))?;
            if !lobby.is_member(peer_id) {
                return Err(SignalingError::NotInLobby(peer_id));
            }
            lobby.host
        } else {
            self.peers
                .get(payload.id)
                .map(|peer| peer.id)
                .ok_or(SignalingError::PeerNotFound(payload.id))?
        };

        if target == peer_id {
            debug!("Dropping {:?} from {} addressed to itself", kind, peer_id);
            return Ok(());
        }

        payload.id = sender.effective_id();
        out.push(Delivery {
            to: target,
            message: ServerMessage::relay(kind, payload),
        });
        Ok(())
    }

    /// The lobby `peer_id` hosts, or why it may not act as host.
    fn hosted_lobby(&self, peer_id: PeerId) -> Result<LobbyId, SignalingError> {
        let peer = self
            .peers
            .get(peer_id)
            .ok_or(SignalingError::PeerNotFound(peer_id))?;
        let lobby_id = peer.lobby_id.ok_or(SignalingError::NotInLobby(peer_id))?;
        let lobby = self
            .lobbies
            .get(lobby_id)
            .ok_or(SignalingError::LobbyNotFound(lobby_id))?;
        if lobby.host != peer_id {
            return Err(SignalingError::Forbidden(peer_id));
        }
        Ok(lobby_id)
    }

    /// Shared by leave, disconnect, and lobby switching: a departing host
    /// takes the lobby down with it, anyone else just leaves.
    fn remove_from_lobby(
        &mut self,
        peer_id: PeerId,
        out: &mut Vec<Delivery>,
    ) -> Result<(), SignalingError> {
        let peer = self
            .peers
            .get_mut(peer_id)
            .ok_or(SignalingError::PeerNotFound(peer_id))?;
        let lobby_id = peer.lobby_id.ok_or(SignalingError::NotInLobby(peer_id))?;
        let lobby = self
            .lobbies
            .get(lobby_id)
            .ok_or(SignalingError::LobbyNotFound(lobby_id))?;

        if lobby.host == peer_id {
            self.destroy_lobby(lobby_id, out);
            return Ok(());
        }

        let departed = peer.effective_id();
        if let Some(lobby) = self.lobbies.remove_member(lobby_id, peer) {
            for member in &lobby.members {
                out.push(Delivery {
                    to: *member,
                    message: ServerMessage::RemovePeer { id: departed },
                });
            }
        }
        info!("Peer {} left lobby {}", peer_id, lobby_id);

        self.lobby_update(lobby_id, out);
        Ok(())
    }

    fn destroy_lobby(&mut self, lobby_id: LobbyId, out: &mut Vec<Delivery>) {
        if let Some(lobby) = self.lobbies.delete(lobby_id, &mut self.peers) {
            for member in lobby.members {
                out.push(Delivery {
                    to: member,
                    message: ServerMessage::DeleteLobby { id: lobby_id },
                });
            }
            info!("Lobby {} deleted", lobby_id);
        }
    }

    /// Join fan-out: the joiner learns its own address, every existing
    /// member and the joiner learn each other, then roster and listings.
    fn announce_join(&self, lobby_id: LobbyId, joiner: PeerId, out: &mut Vec<Delivery>) {
        let (Some(lobby), Some(peer)) = (self.lobbies.get(lobby_id), self.peers.get(joiner)) else {
            return;
        };
        let joiner_addr = peer.effective_id();

        out.push(Delivery {
            to: joiner,
            message: ServerMessage::AssignedId { id: joiner_addr },
        });

        for member in lobby.members.iter().filter(|member| **member != joiner) {
            let Some(member_peer) = self.peers.get(*member) else {
                continue;
            };
            out.push(Delivery {
                to: joiner,
                message: ServerMessage::PeerAnnounce {
                    id: member_peer.effective_id(),
                },
            });
            out.push(Delivery {
                to: *member,
                message: ServerMessage::PeerAnnounce { id: joiner_addr },
            });
        }

        self.lobby_update(lobby_id, out);
        self.lobby_list(out);
    }

    /// Current roster to every member of the lobby.
    fn lobby_update(&self, lobby_id: LobbyId, out: &mut Vec<Delivery>) {
        let Some(lobby) = self.lobbies.get(lobby_id) else {
            return;
        };

        let players = lobby
            .members
            .iter()
            .filter_map(|member| self.peers.get(*member))
            .map(|peer| PlayerInfo {
                alias: peer.alias.clone(),
                is_host: peer.is_host,
                id: peer.effective_id(),
                data: peer.data.clone(),
            })
            .collect();

        let update = ServerMessage::LobbyUpdate(LobbyUpdatePayload {
            id: lobby.id,
            name: lobby.name.clone(),
            has_password: lobby.has_password(),
            max_players: lobby.max_players,
            sealed: lobby.sealed,
            players,
        });

        for member in &lobby.members {
            out.push(Delivery {
                to: *member,
                message: update.clone(),
            });
        }
    }

    /// Lobby browser to every connected peer, filtered by its game.
    fn lobby_list(&self, out: &mut Vec<Delivery>) {
        for peer in self.peers.all() {
            let listings = self
                .lobbies
                .list_by_game(&peer.game)
                .map(|lobby| LobbyListing {
                    id: lobby.id,
                    game: lobby.game.clone(),
                    name: lobby.name.clone(),
                    player_count: lobby.player_count(),
                    has_password: lobby.has_password(),
                    max_players: lobby.max_players,
                })
                .collect();

            out.push(Delivery {
                to: peer.id,
                message: ServerMessage::LobbyList(listings),
            });
        }
    }
}
