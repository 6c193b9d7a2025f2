//! Per-connection message handling.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use inkroom_core::{ClientMessage, Role, ServerMessage};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::rooms::{AppState, Envelope, RoomError};

/// What one socket knows about itself.
pub struct Connection {
    state: Arc<AppState>,
    peer_id: String,
    room: Option<String>,
    role: Role,
    rx: Option<broadcast::Receiver<Envelope>>,
}

impl Connection {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            peer_id: Uuid::new_v4().to_string(),
            room: None,
            role: Role::Viewer,
            rx: None,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// Handle one client message. Returns the replies for this peer only;
    /// everything for other peers goes through the room channel.
    pub fn handle(&mut self, msg: ClientMessage) -> Vec<ServerMessage> {
        match msg {
            ClientMessage::Join {
                room,
                role,
                display_name,
            } => self.join(room, role, display_name),
            ClientMessage::Leave => {
                self.leave();
                Vec::new()
            }
            ClientMessage::Mutation { mutation } => {
                let Some(room) = &self.room else {
                    return vec![error(RoomError::UnknownRoom)];
                };
                match self.state.record_mutation(room, &self.peer_id, mutation) {
                    Ok(()) => Vec::new(),
                    Err(e) => {
                        warn!("Rejected mutation from {}: {}", self.peer_id, e);
                        vec![error(e)]
                    }
                }
            }
            ClientMessage::HistoryRequest => match &self.room {
                Some(room) => {
                    let mutations = self.state.history(room);
                    info!("Replaying {} mutations to {}", mutations.len(), self.peer_id);
                    vec![ServerMessage::HistoryReplay { mutations }]
                }
                None => vec![error(RoomError::UnknownRoom)],
            },
            ClientMessage::Question { text } => {
                let Some(room) = &self.room else {
                    return vec![error(RoomError::UnknownRoom)];
                };
                if self.role == Role::Host {
                    debug!("Ignoring question from host {}", self.peer_id);
                    return Vec::new();
                }
                match self.state.ask_host(room, &self.peer_id, text) {
                    Ok(()) => Vec::new(),
                    Err(e) => vec![error(e)],
                }
            }
        }
    }

    fn join(&mut self, room: String, role: Role, display_name: String) -> Vec<ServerMessage> {
        self.leave();
        match self.state.join(&room, &self.peer_id, role, &display_name) {
            Ok(joined) => {
                info!("Peer {} joined room {} as {:?}", self.peer_id, room, role);
                self.rx = Some(joined.rx);
                self.role = role;
                self.room = Some(room.clone());
                let mut replies = vec![ServerMessage::Joined {
                    room,
                    roster: joined.roster,
                }];
                if let Some(mutations) = joined.history {
                    replies.push(ServerMessage::HistoryReplay { mutations });
                }
                replies
            }
            Err(e) => {
                warn!("Peer {} refused from room {}: {}", self.peer_id, room, e);
                vec![error(e)]
            }
        }
    }

    /// Leave the current room, if any.
    pub fn leave(&mut self) {
        if let Some(room) = self.room.take() {
            self.state.leave(&room, &self.peer_id);
            info!("Peer {} left room {}", self.peer_id, room);
        }
        self.rx = None;
        self.role = Role::Viewer;
    }

    /// Messages to forward after the room channel lagged: a viewer gets the
    /// full history again, everyone gets the current roster.
    fn resync(&mut self) -> Vec<ServerMessage> {
        let Some(room) = &self.room else {
            return Vec::new();
        };
        let Some((rx, mutations, entries)) = self.state.resync(room) else {
            return Vec::new();
        };
        self.rx = Some(rx);
        let mut replies = Vec::new();
        if self.role == Role::Viewer {
            replies.push(ServerMessage::HistoryReplay { mutations });
        }
        replies.push(ServerMessage::RosterChanged { entries });
        replies
    }

    /// Wait for the next room message addressed to this peer.
    async fn next_broadcast(&mut self) -> Vec<ServerMessage> {
        loop {
            let Some(rx) = &mut self.rx else {
                return std::future::pending().await;
            };
            match rx.recv().await {
                Ok(envelope) if envelope.is_for(&self.peer_id) => return vec![envelope.msg],
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Peer {} lagged by {} messages, resyncing", self.peer_id, skipped);
                    return self.resync();
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                }
            }
        }
    }
}

fn error(e: RoomError) -> ServerMessage {
    ServerMessage::Error { message: e.to_string() }
}

async fn send_all(sender: &mut SplitSink<WebSocket, Message>, messages: Vec<ServerMessage>) -> bool {
    for msg in messages {
        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode {:?}: {}", msg, e);
                continue;
            }
        };
        if sender.send(Message::Text(json.into())).await.is_err() {
            return false;
        }
    }
    true
}

/// Handle a WebSocket connection
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let mut conn = Connection::new(state);
    info!("New connection: {}", conn.peer_id());

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                let replies = match msg {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(client_msg) => conn.handle(client_msg),
                        Err(e) => {
                            warn!("Invalid message from {}: {}", conn.peer_id(), e);
                            vec![ServerMessage::Error {
                                message: format!("Invalid message: {}", e),
                            }]
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => Vec::new(),
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", conn.peer_id(), e);
                        break;
                    }
                };
                if !send_all(&mut sender, replies).await {
                    break;
                }
            }

            messages = conn.next_broadcast() => {
                if !send_all(&mut sender, messages).await {
                    break;
                }
            }
        }
    }

    conn.leave();
    info!("Connection closed: {}", conn.peer_id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkroom_core::{BoardId, Mutation};

    fn join(conn: &mut Connection, role: Role, name: &str) -> Vec<ServerMessage> {
        conn.handle(ClientMessage::Join {
            room: "math".into(),
            role,
            display_name: name.into(),
        })
    }

    #[test]
    fn test_viewer_join_includes_history() {
        let state = Arc::new(AppState::default());
        let mut host = Connection::new(state.clone());
        let mut viewer = Connection::new(state);

        let replies = join(&mut host, Role::Host, "Ada");
        assert_eq!(replies.len(), 1);
        host.handle(ClientMessage::Mutation {
            mutation: Mutation::BoardCreated,
        });

        let replies = join(&mut viewer, Role::Viewer, "Bob");
        assert!(matches!(replies[0], ServerMessage::Joined { ref roster, .. } if roster.len() == 2));
        assert_eq!(
            replies[1],
            ServerMessage::HistoryReplay {
                mutations: vec![Mutation::BoardCreated]
            }
        );
    }

    #[test]
    fn test_mutation_before_join() {
        let mut conn = Connection::new(Arc::new(AppState::default()));
        let replies = conn.handle(ClientMessage::Mutation {
            mutation: Mutation::BoardCreated,
        });
        assert!(matches!(replies[0], ServerMessage::Error { .. }));
    }

    #[test]
    fn test_viewer_mutation_rejected() {
        let mut viewer = Connection::new(Arc::new(AppState::default()));
        join(&mut viewer, Role::Viewer, "Bob");
        let replies = viewer.handle(ClientMessage::Mutation {
            mutation: Mutation::BoardDeleted { board_id: BoardId(1) },
        });
        assert_eq!(
            replies,
            vec![ServerMessage::Error {
                message: "Only the host may modify boards".into()
            }]
        );
    }

    #[test]
    fn test_history_request() {
        let state = Arc::new(AppState::default());
        let mut host = Connection::new(state.clone());
        join(&mut host, Role::Host, "Ada");
        host.handle(ClientMessage::Mutation {
            mutation: Mutation::BoardCreated,
        });
        host.leave();
        assert!(host.room().is_none());

        let mut again = Connection::new(state);
        join(&mut again, Role::Host, "Ada");
        let replies = again.handle(ClientMessage::HistoryRequest);
        assert_eq!(
            replies,
            vec![ServerMessage::HistoryReplay {
                mutations: vec![Mutation::BoardCreated]
            }]
        );
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let state = Arc::new(AppState::default());
        let mut host = Connection::new(state.clone());
        let mut viewer = Connection::new(state);
        join(&mut host, Role::Host, "Ada");
        join(&mut viewer, Role::Viewer, "Bob");

        host.handle(ClientMessage::Mutation {
            mutation: Mutation::BoardCreated,
        });

        let received = viewer.next_broadcast().await;
        assert_eq!(
            received,
            vec![ServerMessage::Mutation {
                mutation: Mutation::BoardCreated
            }]
        );
    }

    #[tokio::test]
    async fn test_lagged_viewer_resyncs() {
        let state = Arc::new(AppState::new(2));
        let mut host = Connection::new(state.clone());
        let mut viewer = Connection::new(state);
        join(&mut host, Role::Host, "Ada");
        join(&mut viewer, Role::Viewer, "Bob");

        for _ in 0..5 {
            host.handle(ClientMessage::Mutation {
                mutation: Mutation::BoardCreated,
            });
        }

        let received = viewer.next_broadcast().await;
        assert_eq!(
            received[0],
            ServerMessage::HistoryReplay {
                mutations: vec![Mutation::BoardCreated; 5]
            }
        );
    }
}
