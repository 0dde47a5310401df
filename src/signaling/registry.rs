use std::collections::HashMap;

use super::types::{IdGenerator, Lobby, LobbyId, LobbySettings, Peer, PeerId, SignalingError};

/// Connected peers, keyed by real id.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<PeerId, Peer>,
}

impl PeerRegistry {
    /// Allocate an unused id and insert a peer with default attributes.
    pub(crate) fn register(&mut self, ids: &mut IdGenerator) -> PeerId {
        let id = loop {
            let candidate = PeerId(ids.next_id());
            if !self.peers.contains_key(&candidate) {
                break candidate;
            }
        };
        self.peers.insert(id, Peer::new(id));
        id
    }

    pub(crate) fn unregister(&mut self, id: PeerId) -> Option<Peer> {
        self.peers.remove(&id)
    }

    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(&id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Active lobbies, keyed by id and remembered in creation order.
#[derive(Debug, Default)]
pub struct LobbyRegistry {
    lobbies: HashMap<LobbyId, Lobby>,
    order: Vec<LobbyId>,
}

impl LobbyRegistry {
    /// Create a lobby with `host` as its only member and mark the host.
    pub(crate) fn create(
        &mut self,
        ids: &mut IdGenerator,
        host: &mut Peer,
        settings: LobbySettings,
    ) -> Result<LobbyId, SignalingError> {
        settings.validate()?;

        let id = loop {
            let candidate = LobbyId(ids.next_id());
            if !self.lobbies.contains_key(&candidate) {
                break candidate;
            }
        };

        let lobby = Lobby {
            id,
            game: settings.game,
            host: host.id,
            name: settings.name,
            max_players: settings.max_players,
            password: settings.password,
            data: settings.data,
            sealed: false,
            members: vec![host.id],
        };

        host.is_host = true;
        host.lobby_id = Some(id);

        self.lobbies.insert(id, lobby);
        self.order.push(id);
        Ok(id)
    }

    pub fn get(&self, id: LobbyId) -> Option<&Lobby> {
        self.lobbies.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: LobbyId) -> Option<&mut Lobby> {
        self.lobbies.get_mut(&id)
    }

    /// Whether `peer_id` would be admitted to the lobby right now.
    pub fn check_join(
        &self,
        id: LobbyId,
        peer_id: PeerId,
        password: &str,
    ) -> Result<(), SignalingError> {
        let lobby = self
            .lobbies
            .get(&id)
            .ok_or(SignalingError::LobbyNotFound(id))?;

        if lobby.is_member(peer_id) {
            return Err(SignalingError::AlreadyMember(peer_id, id));
        }
        if lobby.sealed {
            return Err(SignalingError::Sealed(id));
        }
        if lobby.is_full() {
            return Err(SignalingError::CapacityExceeded(id));
        }
        if lobby.password != password {
            return Err(SignalingError::AuthFailed(id));
        }
        Ok(())
    }

    /// Add `peer` as a member if the lobby accepts it.
    pub(crate) fn join(
        &mut self,
        id: LobbyId,
        peer: &mut Peer,
        password: &str,
    ) -> Result<&Lobby, SignalingError> {
        self.check_join(id, peer.id, password)?;

        let lobby = self
            .lobbies
            .get_mut(&id)
            .ok_or(SignalingError::LobbyNotFound(id))?;
        lobby.members.push(peer.id);
        peer.lobby_id = Some(id);
        Ok(lobby)
    }

    /// Drop a non-host member. Hosts go through [`LobbyRegistry::delete`].
    pub(crate) fn remove_member(&mut self, id: LobbyId, peer: &mut Peer) -> Option<&Lobby> {
        let lobby = self.lobbies.get_mut(&id)?;
        lobby.members.retain(|member| *member != peer.id);
        if peer.lobby_id == Some(id) {
            peer.lobby_id = None;
        }
        Some(lobby)
    }

    /// Remove the lobby and detach every member from it.
    pub(crate) fn delete(&mut self, id: LobbyId, peers: &mut PeerRegistry) -> Option<Lobby> {
        let lobby = self.lobbies.remove(&id)?;
        self.order.retain(|lobby_id| *lobby_id != id);

        for member in &lobby.members {
            if let Some(peer) = peers.get_mut(*member) {
                peer.lobby_id = None;
                if *member == lobby.host {
                    peer.is_host = false;
                }
            }
        }
        Some(lobby)
    }

    /// Open lobbies for `game`, oldest first. Sealed lobbies are not listed.
    pub fn list_by_game<'a>(&'a self, game: &'a str) -> impl Iterator<Item = &'a Lobby> + 'a {
        self.order
            .iter()
            .filter_map(|id| self.lobbies.get(id))
            .filter(move |lobby| lobby.game == game && !lobby.sealed)
    }

    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }
}
