//! Immutable board values shared by the server and its clients
//!
//! A [`BoardSnapshot`] is the unit of synchronisation: the server replaces its
//! snapshot wholesale on every accepted move and ships full copies to clients,
//! which never receive explicit deltas.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_ROWS: usize = 6;
pub const DEFAULT_COLS: usize = 7;

/// One of the fixed set of player marks
///
/// Identity is by value. The enumeration order is the turn rotation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlayerMark {
    A,
    B,
}

/// Display identity for each mark, indexed by [`PlayerMark::index`]
const MARK_DISPLAY: [(char, &str); 2] = [('X', "yellow"), ('O', "red")];

impl PlayerMark {
    /// Every mark in turn order
    pub const ALL: [PlayerMark; 2] = [PlayerMark::A, PlayerMark::B];

    /// Number of marks, which is also the roster capacity of a session
    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        match self {
            PlayerMark::A => 0,
            PlayerMark::B => 1,
        }
    }

    /// The mark that plays after this one
    pub fn next(self) -> PlayerMark {
        Self::ALL[(self.index() + 1) % Self::COUNT]
    }

    /// Single-character glyph used by text renderers
    pub fn glyph(self) -> char {
        MARK_DISPLAY[self.index()].0
    }

    pub fn color_name(self) -> &'static str {
        MARK_DISPLAY[self.index()].1
    }
}

impl fmt::Display for PlayerMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.glyph(), self.color_name())
    }
}

/// A (row, column) board address; row 0 is the top row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub row: usize,
    pub col: usize,
}

impl CellCoord {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    Continue,
    Won,
    Tie,
}

/// A participant in a session
///
/// Name and mark are fixed once the player joins; only the score changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamePlayer {
    pub name: String,
    pub mark: PlayerMark,
    pub score: u32,
}

impl GamePlayer {
    pub fn new(name: impl Into<String>, mark: PlayerMark) -> Self {
        Self {
            name: name.into(),
            mark,
            score: 0,
        }
    }
}

/// Point-in-time board state
///
/// Cells are stored row-major. Every "mutating" method returns a new snapshot,
/// so a value that has been published can never change underneath a reader.
/// Equality compares the grid, the current player and the status; the win
/// line is derived data and does not take part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSnapshot {
    rows: usize,
    cols: usize,
    cells: Vec<Option<PlayerMark>>,
    current_player: PlayerMark,
    status: GameStatus,
    win_line: Vec<CellCoord>,
}

impl BoardSnapshot {
    /// An empty board with the first mark to play
    pub fn empty(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![None; rows * cols],
            current_player: PlayerMark::ALL[0],
            status: GameStatus::Continue,
            win_line: Vec::new(),
        }
    }

    /// Builds a snapshot from explicit rows, top row first
    ///
    /// Returns None when the rows are empty or ragged.
    pub fn from_rows(
        grid: Vec<Vec<Option<PlayerMark>>>,
        current_player: PlayerMark,
        status: GameStatus,
    ) -> Option<Self> {
        let rows = grid.len();
        let cols = grid.first().map(Vec::len)?;
        if cols == 0 || grid.iter().any(|row| row.len() != cols) {
            return None;
        }

        Some(Self {
            rows,
            cols,
            cells: grid.into_iter().flatten().collect(),
            current_player,
            status,
            win_line: Vec::new(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn current_player(&self) -> PlayerMark {
        self.current_player
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn win_line(&self) -> &[CellCoord] {
        &self.win_line
    }

    pub fn contains(&self, coord: CellCoord) -> bool {
        coord.row < self.rows && coord.col < self.cols
    }

    /// Mark at `coord`, or None for empty and out-of-range cells
    pub fn get(&self, coord: CellCoord) -> Option<PlayerMark> {
        if !self.contains(coord) {
            return None;
        }
        self.cells[coord.row * self.cols + coord.col]
    }

    pub fn same_dimensions(&self, other: &BoardSnapshot) -> bool {
        self.rows == other.rows && self.cols == other.cols
    }

    /// Iterates over every occupied cell in row-major order
    pub fn occupied(&self) -> impl Iterator<Item = (CellCoord, PlayerMark)> + '_ {
        self.cells.iter().enumerate().filter_map(move |(index, cell)| {
            cell.map(|mark| (CellCoord::new(index / self.cols, index % self.cols), mark))
        })
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }

    /// Lowest empty row of `col`, or None if the column is full or out of range
    pub fn landing_row(&self, col: usize) -> Option<usize> {
        if col >= self.cols {
            return None;
        }
        (0..self.rows)
            .rev()
            .find(|&row| self.get(CellCoord::new(row, col)).is_none())
    }

    /// Copy of this snapshot with `mark` written at `coord`
    pub fn with_mark(&self, coord: CellCoord, mark: PlayerMark) -> Self {
        let mut next = self.clone();
        if self.contains(coord) {
            next.cells[coord.row * self.cols + coord.col] = Some(mark);
        }
        next
    }

    /// Copy of this snapshot with the turn handed to `player`
    pub fn with_current_player(&self, player: PlayerMark) -> Self {
        Self {
            current_player: player,
            ..self.clone()
        }
    }

    /// Copy of this snapshot in the won state with the given line
    pub fn won(&self, line: Vec<CellCoord>) -> Self {
        Self {
            status: GameStatus::Won,
            win_line: line,
            ..self.clone()
        }
    }

    pub fn tied(&self) -> Self {
        Self {
            status: GameStatus::Tie,
            win_line: Vec::new(),
            ..self.clone()
        }
    }
}

impl PartialEq for BoardSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows
            && self.cols == other.cols
            && self.cells == other.cells
            && self.current_player == other.current_player
            && self.status == other.status
    }
}

impl Eq for BoardSnapshot {}
