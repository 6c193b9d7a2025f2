//! Room registry: roster, host authority and mutation history.

use dashmap::DashMap;
use inkroom_core::{Mutation, Role, RosterEntry, ServerMessage};
use tokio::sync::broadcast;

use crate::config::DEFAULT_CHANNEL_CAPACITY;

/// Who a broadcast is meant for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    /// Everyone in the room except the sender.
    Others,
    /// A single peer.
    Only(String),
}

/// A message travelling through a room's broadcast channel.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: String,
    pub to: Recipients,
    pub msg: ServerMessage,
}

impl Envelope {
    /// Whether `peer_id` should forward this envelope to its socket.
    pub fn is_for(&self, peer_id: &str) -> bool {
        match &self.to {
            Recipients::Others => self.from != peer_id,
            Recipients::Only(target) => target == peer_id,
        }
    }
}

#[derive(Debug, Clone)]
struct Peer {
    id: String,
    entry: RosterEntry,
}

/// Room state
struct Room {
    tx: broadcast::Sender<Envelope>,
    /// Connected peers in join order.
    peers: Vec<Peer>,
    /// Peer id of the current host.
    host: Option<String>,
    /// Every mutation the host has sent, in order.
    history: Vec<Mutation>,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            peers: Vec::new(),
            host: None,
            history: Vec::new(),
        }
    }

    fn roster(&self) -> Vec<RosterEntry> {
        self.peers.iter().map(|p| p.entry.clone()).collect()
    }

    fn host_name(&self) -> Option<&str> {
        let host = self.host.as_deref()?;
        self.peers
            .iter()
            .find(|p| p.id == host)
            .map(|p| p.entry.name.as_str())
    }

    fn send(&self, from: &str, to: Recipients, msg: ServerMessage) {
        // No receivers is not an error.
        let _ = self.tx.send(Envelope {
            from: from.to_string(),
            to,
            msg,
        });
    }
}

/// Errors returned to a peer as `error` messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomError {
    HostTaken { room: String },
    NotHost,
    NoHost,
    UnknownRoom,
}

impl std::fmt::Display for RoomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomError::HostTaken { room } => write!(f, "Room {} already has a host", room),
            RoomError::NotHost => write!(f, "Only the host may modify boards"),
            RoomError::NoHost => write!(f, "Room has no host"),
            RoomError::UnknownRoom => write!(f, "Not in a room"),
        }
    }
}

/// Everything a peer needs right after joining.
pub struct Joined {
    pub rx: broadcast::Receiver<Envelope>,
    pub roster: Vec<RosterEntry>,
    /// History for viewers, taken atomically with the subscription so that
    /// no mutation is missed or delivered twice.
    pub history: Option<Vec<Mutation>>,
}

/// Shared application state
pub struct AppState {
    rooms: DashMap<String, Room>,
    channel_capacity: usize,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl AppState {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Add a peer to a room and tell the others.
    ///
    /// A room has at most one host. A second host is refused unless it uses
    /// the current host's display name, in which case it replaces a
    /// connection that has not been noticed as dead yet.
    pub fn join(&self, room_id: &str, peer_id: &str, role: Role, name: &str) -> Result<Joined, RoomError> {
        let capacity = self.channel_capacity;
        let mut room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(capacity));

        if role == Role::Host {
            if let Some(current) = room.host.clone() {
                if room.host_name() != Some(name) {
                    return Err(RoomError::HostTaken {
                        room: room_id.to_string(),
                    });
                }
                tracing::info!("Host {} in room {} replaced by {}", current, room_id, peer_id);
                room.peers.retain(|p| p.id != current);
            }
            room.host = Some(peer_id.to_string());
        }

        room.peers.retain(|p| p.id != peer_id);
        room.peers.push(Peer {
            id: peer_id.to_string(),
            entry: RosterEntry {
                name: name.to_string(),
                role,
            },
        });

        let rx = room.tx.subscribe();
        let roster = room.roster();
        let history = (role == Role::Viewer).then(|| room.history.clone());
        room.send(
            peer_id,
            Recipients::Others,
            ServerMessage::RosterChanged {
                entries: roster.clone(),
            },
        );
        Ok(Joined { rx, roster, history })
    }

    /// Remove a peer. Empty rooms are dropped unless they hold history a
    /// reconnecting host will ask for.
    pub fn leave(&self, room_id: &str, peer_id: &str) {
        let Some(mut room) = self.rooms.get_mut(room_id) else {
            return;
        };
        room.peers.retain(|p| p.id != peer_id);
        if room.host.as_deref() == Some(peer_id) {
            room.host = None;
        }

        if room.peers.is_empty() && room.history.is_empty() {
            drop(room);
            self.rooms.remove_if(room_id, |_, room| room.peers.is_empty());
            return;
        }
        let entries = room.roster();
        room.send(peer_id, Recipients::Others, ServerMessage::RosterChanged { entries });
    }

    /// Record a host mutation and relay it to everyone else.
    pub fn record_mutation(&self, room_id: &str, peer_id: &str, mutation: Mutation) -> Result<(), RoomError> {
        let mut room = self.rooms.get_mut(room_id).ok_or(RoomError::UnknownRoom)?;
        if room.host.as_deref() != Some(peer_id) {
            return Err(RoomError::NotHost);
        }
        room.history.push(mutation.clone());
        room.send(peer_id, Recipients::Others, ServerMessage::Mutation { mutation });
        Ok(())
    }

    pub fn history(&self, room_id: &str) -> Vec<Mutation> {
        self.rooms
            .get(room_id)
            .map(|room| room.history.clone())
            .unwrap_or_default()
    }

    /// Fresh subscription plus the history it starts after, for a peer that
    /// fell behind the broadcast buffer.
    pub fn resync(&self, room_id: &str) -> Option<(broadcast::Receiver<Envelope>, Vec<Mutation>, Vec<RosterEntry>)> {
        let room = self.rooms.get(room_id)?;
        Some((room.tx.subscribe(), room.history.clone(), room.roster()))
    }

    /// Relay a viewer question to the host.
    pub fn ask_host(&self, room_id: &str, peer_id: &str, text: String) -> Result<(), RoomError> {
        let room = self.rooms.get(room_id).ok_or(RoomError::UnknownRoom)?;
        let host = room.host.clone().ok_or(RoomError::NoHost)?;
        let from = room
            .peers
            .iter()
            .find(|p| p.id == peer_id)
            .map(|p| p.entry.name.clone())
            .unwrap_or_default();
        room.send(peer_id, Recipients::Only(host), ServerMessage::Question { from, text });
        Ok(())
    }

    pub fn roster(&self, room_id: &str) -> Vec<RosterEntry> {
        self.rooms.get(room_id).map(|room| room.roster()).unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkroom_core::BoardId;

    fn drain(rx: &mut broadcast::Receiver<Envelope>, peer: &str) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            if envelope.is_for(peer) {
                out.push(envelope.msg);
            }
        }
        out
    }

    #[test]
    fn test_second_host_rejected() {
        let state = AppState::default();
        state.join("math", "p1", Role::Host, "Ada").unwrap();
        let result = state.join("math", "p2", Role::Host, "Bob");
        assert!(matches!(result, Err(RoomError::HostTaken { .. })));
        assert_eq!(state.roster("math").len(), 1);
    }

    #[test]
    fn test_host_takeover_by_same_name() {
        let state = AppState::default();
        state.join("math", "p1", Role::Host, "Ada").unwrap();
        state.join("math", "p2", Role::Host, "Ada").unwrap();

        assert_eq!(state.roster("math").len(), 1);
        assert_eq!(
            state.record_mutation("math", "p1", Mutation::BoardCreated),
            Err(RoomError::NotHost)
        );
        assert!(state.record_mutation("math", "p2", Mutation::BoardCreated).is_ok());
    }

    #[test]
    fn test_viewer_gets_history_snapshot() {
        let state = AppState::default();
        state.join("math", "host", Role::Host, "Ada").unwrap();
        state.record_mutation("math", "host", Mutation::BoardCreated).unwrap();

        let joined = state.join("math", "v1", Role::Viewer, "Bob").unwrap();
        assert_eq!(joined.history, Some(vec![Mutation::BoardCreated]));
        assert_eq!(joined.roster.len(), 2);

        let mut rx = joined.rx;
        state
            .record_mutation("math", "host", Mutation::BoardSwitched { board_id: BoardId(1) })
            .unwrap();
        assert_eq!(
            drain(&mut rx, "v1"),
            vec![ServerMessage::Mutation {
                mutation: Mutation::BoardSwitched { board_id: BoardId(1) }
            }]
        );
    }

    #[test]
    fn test_viewer_cannot_mutate() {
        let state = AppState::default();
        state.join("math", "v1", Role::Viewer, "Bob").unwrap();
        assert_eq!(
            state.record_mutation("math", "v1", Mutation::BoardCreated),
            Err(RoomError::NotHost)
        );
        assert!(state.history("math").is_empty());
    }

    #[test]
    fn test_room_with_history_survives_empty() {
        let state = AppState::default();
        state.join("math", "host", Role::Host, "Ada").unwrap();
        state.record_mutation("math", "host", Mutation::BoardCreated).unwrap();
        state.leave("math", "host");

        assert_eq!(state.room_count(), 1);
        assert_eq!(state.history("math"), vec![Mutation::BoardCreated]);

        state.join("scratch", "v1", Role::Viewer, "Bob").unwrap();
        state.leave("scratch", "v1");
        assert_eq!(state.room_count(), 1);
    }

    #[test]
    fn test_question_reaches_host_only() {
        let state = AppState::default();
        let mut host_rx = state.join("math", "host", Role::Host, "Ada").unwrap().rx;
        let mut other_rx = state.join("math", "v2", Role::Viewer, "Cy").unwrap().rx;
        state.join("math", "v1", Role::Viewer, "Bob").unwrap();

        state.ask_host("math", "v1", "Why?".into()).unwrap();

        let to_host = drain(&mut host_rx, "host");
        assert!(to_host.contains(&ServerMessage::Question {
            from: "Bob".into(),
            text: "Why?".into()
        }));
        let to_other = drain(&mut other_rx, "v2");
        assert!(!to_other.iter().any(|m| matches!(m, ServerMessage::Question { .. })));
    }

    #[test]
    fn test_question_without_host() {
        let state = AppState::default();
        state.join("math", "v1", Role::Viewer, "Bob").unwrap();
        assert_eq!(state.ask_host("math", "v1", "Hello?".into()), Err(RoomError::NoHost));
    }

    #[test]
    fn test_roster_change_broadcast_on_leave() {
        let state = AppState::default();
        let mut host_rx = state.join("math", "host", Role::Host, "Ada").unwrap().rx;
        state.join("math", "v1", Role::Viewer, "Bob").unwrap();
        state.leave("math", "v1");

        let messages = drain(&mut host_rx, "host");
        assert_eq!(
            messages.last(),
            Some(&ServerMessage::RosterChanged {
                entries: vec![RosterEntry {
                    name: "Ada".into(),
                    role: Role::Host
                }]
            })
        );
    }
}
