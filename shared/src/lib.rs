//! Types shared by the four-in-a-line server and client
//!
//! Holds the board value types, the rule engine, the error taxonomy and the
//! UDP wire protocol. Every [`Packet`] is bincode-encoded into one datagram.

pub mod board;
pub mod engine;
pub mod error;

pub use board::{
    BoardSnapshot, CellCoord, GamePlayer, GameStatus, PlayerMark, DEFAULT_COLS, DEFAULT_ROWS,
};
pub use engine::{BoardEngine, DropResult, FourInARow};
pub use error::{DirectoryError, RemoteError, ValidationError};

use serde::{Deserialize, Serialize};

/// Largest datagram either side expects to receive
pub const MAX_PACKET_SIZE: usize = 8192;

/// Longest game or player name a server accepts, in bytes
pub const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Requests, client -> server
    CreateGame {
        sequence: u32,
        name: String,
    },
    ListGames {
        sequence: u32,
    },
    JoinGame {
        sequence: u32,
        game: String,
        player: String,
        mark: Option<PlayerMark>,
    },
    WatchGame {
        sequence: u32,
        game: String,
    },
    Play {
        sequence: u32,
        game: String,
        column: usize,
    },
    FetchSnapshot {
        sequence: u32,
        game: String,
    },
    Disconnect,

    // Replies, server -> client
    GameCreated {
        sequence: u32,
        name: String,
    },
    GameList {
        sequence: u32,
        names: Vec<String>,
    },
    Joined {
        sequence: u32,
        player: GamePlayer,
        snapshot: BoardSnapshot,
    },
    Snapshot {
        sequence: u32,
        snapshot: BoardSnapshot,
    },
    Rejected {
        sequence: u32,
        error: RemoteError,
    },

    // Pushes, server -> client
    SnapshotPush {
        game: String,
        snapshot: BoardSnapshot,
    },
    GameFinished {
        game: String,
    },
}

impl Packet {
    /// Request or reply sequence number; pushes and `Disconnect` have none
    pub fn sequence(&self) -> Option<u32> {
        match self {
            Packet::CreateGame { sequence, .. }
            | Packet::ListGames { sequence }
            | Packet::JoinGame { sequence, .. }
            | Packet::WatchGame { sequence, .. }
            | Packet::Play { sequence, .. }
            | Packet::FetchSnapshot { sequence, .. }
            | Packet::GameCreated { sequence, .. }
            | Packet::GameList { sequence, .. }
            | Packet::Joined { sequence, .. }
            | Packet::Snapshot { sequence, .. }
            | Packet::Rejected { sequence, .. } => Some(*sequence),
            Packet::Disconnect | Packet::SnapshotPush { .. } | Packet::GameFinished { .. } => None,
        }
    }

    /// Length in bytes of the longest game or player name the packet carries
    pub fn longest_name(&self) -> usize {
        match self {
            Packet::CreateGame { name, .. } | Packet::GameCreated { name, .. } => name.len(),
            Packet::JoinGame { game, player, .. } => game.len().max(player.len()),
            Packet::WatchGame { game, .. }
            | Packet::Play { game, .. }
            | Packet::FetchSnapshot { game, .. }
            | Packet::SnapshotPush { game, .. }
            | Packet::GameFinished { game } => game.len(),
            Packet::Joined { player, .. } => player.name.len(),
            Packet::GameList { names, .. } => names.iter().map(String::len).max().unwrap_or(0),
            Packet::ListGames { .. }
            | Packet::Disconnect
            | Packet::Snapshot { .. }
            | Packet::Rejected { .. } => 0,
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            Packet::GameCreated { .. }
                | Packet::GameList { .. }
                | Packet::Joined { .. }
                | Packet::Snapshot { .. }
                | Packet::Rejected { .. }
        )
    }
}

/// Encoded size of the largest board push a `rows` x `cols` game can produce
///
/// That is a board with every cell marked, a win line as long as the longest
/// side, and a game name of [`MAX_NAME_LEN`] bytes. Returns None when the
/// board has more cells than a datagram has bytes, since every cell costs
/// at least one byte.
pub fn largest_push_size(rows: usize, cols: usize) -> Option<usize> {
    let cells = rows.checked_mul(cols)?;
    if cells == 0 || cells > MAX_PACKET_SIZE {
        return None;
    }

    let mark = PlayerMark::ALL[PlayerMark::COUNT - 1];
    let grid = vec![vec![Some(mark); cols]; rows];
    let line = (0..rows.max(cols))
        .map(|i| CellCoord::new(i.min(rows - 1), i.min(cols - 1)))
        .collect();
    let snapshot = BoardSnapshot::from_rows(grid, mark, GameStatus::Won)?.won(line);

    let packet = Packet::SnapshotPush {
        game: "x".repeat(MAX_NAME_LEN),
        snapshot,
    };
    let size = bincode::serialized_size(&packet).ok()?;
    usize::try_from(size).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_serialization_play() {
        let packet = Packet::Play {
            sequence: 7,
            game: "alpha".to_string(),
            column: 3,
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Play {
                sequence,
                game,
                column,
            } => {
                assert_eq!(sequence, 7);
                assert_eq!(game, "alpha");
                assert_eq!(column, 3);
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_rejected() {
        let packet = Packet::Rejected {
            sequence: 3,
            error: ValidationError::NotYourTurn {
                expected: PlayerMark::A,
                actual: PlayerMark::B,
            }
            .into(),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();
        assert_eq!(deserialized, packet);
    }

    #[test]
    fn test_full_board_push_fits_in_a_datagram() {
        let mut board = BoardSnapshot::empty(DEFAULT_ROWS, DEFAULT_COLS);
        for row in 0..DEFAULT_ROWS {
            for col in 0..DEFAULT_COLS {
                board = board.with_mark(CellCoord::new(row, col), PlayerMark::ALL[(row + col) % 2]);
            }
        }
        let packet = Packet::SnapshotPush {
            game: "a-fairly-long-game-name".to_string(),
            snapshot: board,
        };
        assert!(bincode::serialize(&packet).unwrap().len() < MAX_PACKET_SIZE);
    }

    #[test]
    fn test_largest_push_covers_a_filled_board() {
        let largest = largest_push_size(DEFAULT_ROWS, DEFAULT_COLS).unwrap();
        assert!(largest < MAX_PACKET_SIZE);

        let mut board = BoardSnapshot::empty(DEFAULT_ROWS, DEFAULT_COLS);
        for row in 0..DEFAULT_ROWS {
            for col in 0..DEFAULT_COLS {
                board = board.with_mark(CellCoord::new(row, col), PlayerMark::A);
            }
        }
        let packet = Packet::SnapshotPush {
            game: "x".repeat(MAX_NAME_LEN),
            snapshot: board.won((0..4).map(|col| CellCoord::new(5, col)).collect()),
        };
        assert!(bincode::serialize(&packet).unwrap().len() <= largest);
    }

    #[test]
    fn test_largest_push_grows_past_the_datagram() {
        // Empty it is small, filled it no longer fits
        let empty = Packet::SnapshotPush {
            game: "alpha".to_string(),
            snapshot: BoardSnapshot::empty(45, 45),
        };
        assert!(bincode::serialize(&empty).unwrap().len() < MAX_PACKET_SIZE);
        assert!(largest_push_size(45, 45).unwrap() > MAX_PACKET_SIZE);

        assert_eq!(largest_push_size(0, 7), None);
        assert_eq!(largest_push_size(usize::MAX, 2), None);
        assert_eq!(largest_push_size(100, 100), None);
    }

    #[test]
    fn test_longest_name() {
        let join = Packet::JoinGame {
            sequence: 1,
            game: "alpha".to_string(),
            player: "bartholomew".to_string(),
            mark: None,
        };
        assert_eq!(join.longest_name(), 11);
        assert_eq!(Packet::ListGames { sequence: 1 }.longest_name(), 0);
    }

    #[test]
    fn test_sequence_numbers() {
        assert_eq!(Packet::ListGames { sequence: 9 }.sequence(), Some(9));
        assert_eq!(Packet::Disconnect.sequence(), None);
        assert_eq!(
            Packet::GameFinished {
                game: "alpha".to_string()
            }
            .sequence(),
            None
        );
    }

    #[test]
    fn test_reply_classification() {
        assert!(Packet::GameList {
            sequence: 1,
            names: Vec::new()
        }
        .is_reply());
        assert!(!Packet::ListGames { sequence: 1 }.is_reply());
        assert!(!Packet::GameFinished {
            game: "alpha".to_string()
        }
        .is_reply());
    }
}
