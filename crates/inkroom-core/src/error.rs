//! Error types shared by the board and replication layers.

use crate::board::BoardId;
use thiserror::Error;

/// Errors raised by board, board set and session operations.
#[derive(Debug, Error)]
pub enum BoardError {
    /// An operation referenced a board id that does not exist.
    #[error("Board not found: {0}")]
    NotFound(BoardId),
    /// Non-finite coordinates, a point without a tool, or a disallowed tool adjustment.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Connect failure or a dropped connection.
    #[error("Channel error: {0}")]
    Channel(String),
    /// A viewer attempted a host-only mutation.
    #[error("Only the host may modify boards")]
    ReadOnly,
    /// A wire message could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
}

/// Result type for board operations.
pub type BoardResult<T> = Result<T, BoardError>;
