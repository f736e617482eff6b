//! Rule and geometry collaborator used by the server's match sessions

use crate::board::{BoardSnapshot, CellCoord, PlayerMark};
use crate::error::ValidationError;

/// Outcome of a successful drop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropResult {
    /// Board with the new mark in place; turn and status are left untouched
    pub snapshot: BoardSnapshot,
    /// Cell the mark landed in
    pub cell: CellCoord,
    /// Winning line through `cell`, if the drop completed one
    pub win_line: Option<Vec<CellCoord>>,
}

/// Board rules. Sessions trust it for all placement and line detection.
pub trait BoardEngine: Send + Sync {
    fn drop_mark(
        &self,
        snapshot: &BoardSnapshot,
        column: usize,
        mark: PlayerMark,
    ) -> Result<DropResult, ValidationError>;

    fn is_full(&self, snapshot: &BoardSnapshot) -> bool;
}

/// Directions scanned for lines: horizontal, vertical, and both diagonals
const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// Gravity board where `line_length` aligned marks win
#[derive(Debug, Clone, Copy)]
pub struct FourInARow {
    pub line_length: usize,
}

impl Default for FourInARow {
    fn default() -> Self {
        Self { line_length: 4 }
    }
}

impl FourInARow {
    pub fn new(line_length: usize) -> Self {
        Self { line_length }
    }

    fn step(board: &BoardSnapshot, from: CellCoord, (dr, dc): (isize, isize)) -> Option<CellCoord> {
        let row = from.row.checked_add_signed(dr)?;
        let col = from.col.checked_add_signed(dc)?;
        let next = CellCoord::new(row, col);
        board.contains(next).then_some(next)
    }

    /// Longest contiguous run of `mark` through `cell` along `dir`, ordered end to end
    fn run_through(
        board: &BoardSnapshot,
        cell: CellCoord,
        mark: PlayerMark,
        dir: (isize, isize),
    ) -> Vec<CellCoord> {
        let back = (-dir.0, -dir.1);

        let mut start = cell;
        while let Some(prev) = Self::step(board, start, back) {
            if board.get(prev) != Some(mark) {
                break;
            }
            start = prev;
        }

        let mut run = vec![start];
        let mut cursor = start;
        while let Some(next) = Self::step(board, cursor, dir) {
            if board.get(next) != Some(mark) {
                break;
            }
            run.push(next);
            cursor = next;
        }
        run
    }

    /// Winning line through `cell`, if any
    pub fn line_through(&self, board: &BoardSnapshot, cell: CellCoord) -> Option<Vec<CellCoord>> {
        let mark = board.get(cell)?;
        DIRECTIONS
            .iter()
            .map(|&dir| Self::run_through(board, cell, mark, dir))
            .find(|run| run.len() >= self.line_length)
    }
}

impl BoardEngine for FourInARow {
    fn drop_mark(
        &self,
        snapshot: &BoardSnapshot,
        column: usize,
        mark: PlayerMark,
    ) -> Result<DropResult, ValidationError> {
        if column >= snapshot.cols() {
            return Err(ValidationError::InvalidColumn {
                column,
                cols: snapshot.cols(),
            });
        }

        let row = snapshot
            .landing_row(column)
            .ok_or(ValidationError::ColumnFull(column))?;
        let cell = CellCoord::new(row, column);
        let next = snapshot.with_mark(cell, mark);
        let win_line = self.line_through(&next, cell);

        Ok(DropResult {
            snapshot: next,
            cell,
            win_line,
        })
    }

    fn is_full(&self, snapshot: &BoardSnapshot) -> bool {
        (0..snapshot.cols()).all(|col| snapshot.landing_row(col).is_none())
    }
}
