//! InkRoom Core Library
//!
//! Platform-agnostic board state, stroke logs and host/viewer replication for
//! the InkRoom shared whiteboard.

pub mod board;
pub mod board_set;
pub mod clipboard;
pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod replication;
pub mod stroke_log;
pub mod style;
pub mod surface;
pub mod tools;
pub mod transport;

pub use board::{Board, BoardId, GROWTH_FACTOR, GROWTH_MARGIN};
pub use board_set::{BoardSet, BoardSetState, BoardState};
pub use clipboard::{ClipEntry, Clipboard};
pub use config::{ReconnectPolicy, SessionConfig};
pub use error::{BoardError, BoardResult};
pub use events::{BoardEvent, EventBus, SubscriptionId};
pub use protocol::{ClientMessage, Mutation, Role, RosterEntry, ServerMessage};
pub use replication::{Applied, ApplyMode, Session, apply_mutation};
pub use stroke_log::{DrawPoint, PointEvent, StrokeLog};
pub use style::{CompositeMode, LineCap, LineJoin, SerializableColor};
pub use surface::{RecordingSurface, StrokeSurface, SurfaceFactory, SurfaceOp};
pub use tools::{ToolKind, ToolRegistry, ToolSelection, ToolSnapshot};
pub use transport::{ConnectionState, PlatformWebSocket, TransportEvent};
