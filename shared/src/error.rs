//! Error taxonomy shared by both ends of the wire
//!
//! Validation and directory errors are plain data so the server can ship them
//! back to a client inside a `Rejected` reply.

use crate::board::PlayerMark;
use serde::{Deserialize, Serialize};

/// A move or join that breaks the rules. Raised before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ValidationError {
    #[error("it is {expected}'s turn, not {actual}'s")]
    NotYourTurn {
        expected: PlayerMark,
        actual: PlayerMark,
    },

    #[error("column {0} is full")]
    ColumnFull(usize),

    #[error("column {column} is outside the board (0..{cols})")]
    InvalidColumn { column: usize, cols: usize },

    #[error("the roster is full")]
    RosterFull,

    #[error("mark {0} is already taken")]
    DuplicateMark(PlayerMark),

    #[error("the game has not started yet")]
    NotStarted,

    #[error("the game is over")]
    GameOver,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum DirectoryError {
    #[error("a game named '{0}' already exists")]
    NameAlreadyInUse(String),

    #[error("no game named '{0}'")]
    NameNotFound(String),
}

/// Typed failure returned to a remote caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum RemoteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("protocol error: {0}")]
    Protocol(String),
}
