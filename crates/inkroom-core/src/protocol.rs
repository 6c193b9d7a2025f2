//! Wire messages between participants and the relay.

use crate::board::BoardId;
use crate::tools::ToolSnapshot;
use serde::{Deserialize, Serialize};

/// A participant's role in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The single writer of a room.
    Host,
    #[default]
    Viewer,
}

/// One participant as listed in a room roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    pub role: Role,
}

/// A board-set mutation. Each maps to exactly one board-set operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    /// Create and activate the next board. Ids are not transmitted; every
    /// replica derives the same id from the same creation sequence.
    BoardCreated,
    BoardSwitched { board_id: BoardId },
    /// A point, or a stroke break when both coordinates are absent.
    Point {
        board_id: BoardId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
        #[serde(default)]
        dragging: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool: Option<ToolSnapshot>,
    },
    BoardRenamed { board_id: BoardId, new_name: String },
    BoardDeleted { board_id: BoardId },
}

impl Mutation {
    pub fn point(board_id: BoardId, x: f64, y: f64, dragging: bool, tool: ToolSnapshot) -> Self {
        Mutation::Point {
            board_id,
            x: Some(x),
            y: Some(y),
            dragging,
            tool: Some(tool),
        }
    }

    pub fn stroke_break(board_id: BoardId) -> Self {
        Mutation::Point {
            board_id,
            x: None,
            y: None,
            dragging: false,
            tool: None,
        }
    }

    /// The board this mutation targets; `None` for `board_created`.
    pub fn board_id_mut(&mut self) -> Option<&mut BoardId> {
        match self {
            Mutation::BoardCreated => None,
            Mutation::BoardSwitched { board_id }
            | Mutation::Point { board_id, .. }
            | Mutation::BoardRenamed { board_id, .. }
            | Mutation::BoardDeleted { board_id } => Some(board_id),
        }
    }
}

/// Messages sent to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room under a display name.
    Join {
        room: String,
        role: Role,
        display_name: String,
    },
    Leave,
    /// A host mutation, relayed to every other peer and buffered as history.
    Mutation { mutation: Mutation },
    /// Ask for the room's full mutation history.
    HistoryRequest,
    /// A viewer annotation, relayed to the host.
    Question { text: String },
}

/// Messages received from the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm room join.
    Joined { room: String, roster: Vec<RosterEntry> },
    Mutation { mutation: Mutation },
    /// Every mutation the host has sent to this room, in order.
    HistoryReplay { mutations: Vec<Mutation> },
    RosterChanged { entries: Vec<RosterEntry> },
    Question { from: String, text: String },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolKind;

    #[test]
    fn test_point_wire_format() {
        let mutation = Mutation::point(BoardId(2), 10.5, 20.0, true, ToolKind::Pen.defaults());
        let json: serde_json::Value = serde_json::to_value(&mutation).unwrap();

        assert_eq!(json["type"], "point");
        assert_eq!(json["board_id"], 2);
        assert_eq!(json["x"], 10.5);
        assert_eq!(json["dragging"], true);
        assert_eq!(json["tool"]["kind"], "pen");
    }

    #[test]
    fn test_break_omits_coordinates() {
        let json = serde_json::to_string(&Mutation::stroke_break(BoardId(1))).unwrap();
        assert!(!json.contains("\"x\""));
        assert!(!json.contains("\"tool\""));

        let parsed: Mutation = serde_json::from_str(r#"{"type":"point","board_id":1}"#).unwrap();
        assert_eq!(parsed, Mutation::stroke_break(BoardId(1)));
    }

    #[test]
    fn test_client_message_nesting() {
        let msg = ClientMessage::Mutation {
            mutation: Mutation::BoardRenamed {
                board_id: BoardId(3),
                new_name: "Plans".into(),
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"type":"mutation","mutation":{"type":"board_renamed","board_id":3,"new_name":"Plans"}}"#
        );
    }

    #[test]
    fn test_parse_server_messages() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{"type":"joined","room":"math","roster":[{"name":"Ada","role":"host"}]}"#,
        )
        .unwrap();
        assert!(matches!(msg, ServerMessage::Joined { ref roster, .. } if roster[0].role == Role::Host));

        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"history_replay","mutations":[{"type":"board_created"}]}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::HistoryReplay {
                mutations: vec![Mutation::BoardCreated]
            }
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<ServerMessage>(r#"{"type":"teleport"}"#).is_err());
    }
}
