//! Rendering surface driven by the sync pipeline
//!
//! [`BoardView`] is the seam between board state and whatever draws it. The
//! pipeline calls it only from inside its critical section, so an
//! implementation never sees two updates interleave.

use shared::{BoardSnapshot, CellCoord, GameStatus, PlayerMark};
use std::io::Write;

pub trait BoardView: Send {
    /// One animation frame: `snapshot` with the mark that lands at `target`
    /// drawn at `falling` instead
    fn draw_drop_frame(&mut self, snapshot: &BoardSnapshot, target: CellCoord, falling: CellCoord);

    /// Draws `snapshot` with `cell` marked as the last move
    fn highlight_move(&mut self, snapshot: &BoardSnapshot, cell: CellCoord);

    /// Draws `snapshot` from scratch
    fn redraw(&mut self, snapshot: &BoardSnapshot);

    fn show_message(&mut self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellStyle {
    Plain,
    LastMove,
    WinLine,
}

/// Renders `snapshot` as text, one line per row plus a column ruler and a
/// status line
pub fn render_board(
    snapshot: &BoardSnapshot,
    last_move: Option<CellCoord>,
    falling: Option<(CellCoord, CellCoord)>,
) -> String {
    let mut out = String::new();

    for row in 0..snapshot.rows() {
        for col in 0..snapshot.cols() {
            let cell = CellCoord::new(row, col);
            let mut mark = snapshot.get(cell);
            if let Some((target, at)) = falling {
                if cell == target {
                    mark = None;
                }
                if cell == at {
                    mark = snapshot.get(target);
                }
            }

            let style = if snapshot.win_line().contains(&cell) {
                CellStyle::WinLine
            } else if last_move == Some(cell) {
                CellStyle::LastMove
            } else {
                CellStyle::Plain
            };

            let glyph = mark.map(PlayerMark::glyph).unwrap_or('.');
            let (open, close) = match style {
                CellStyle::Plain => (' ', ' '),
                CellStyle::LastMove => ('*', '*'),
                CellStyle::WinLine => ('#', '#'),
            };
            out.push(open);
            out.push(glyph);
            out.push(close);
        }
        out.push('\n');
    }

    for col in 0..snapshot.cols() {
        out.push_str(&format!("{:^3}", col % 10));
    }
    out.push('\n');
    out.push_str(&status_line(snapshot));
    out.push('\n');
    out
}

pub fn status_line(snapshot: &BoardSnapshot) -> String {
    match snapshot.status() {
        GameStatus::Continue => format!("{} to play", snapshot.current_player()),
        GameStatus::Won => match snapshot.win_line().first().and_then(|&c| snapshot.get(c)) {
            Some(winner) => format!("{} wins", winner),
            None => "game won".to_string(),
        },
        GameStatus::Tie => "tie game".to_string(),
    }
}

/// Terminal implementation of [`BoardView`]
///
/// Identical consecutive frames are written once.
pub struct TextView<W: Write + Send> {
    out: W,
    last_frame: Option<String>,
}

impl<W: Write + Send> TextView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            last_frame: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_frame(&mut self, frame: String) {
        if self.last_frame.as_deref() == Some(frame.as_str()) {
            return;
        }
        // A closed terminal is not worth failing a board update over
        let _ = writeln!(self.out, "{}", frame).and_then(|_| self.out.flush());
        self.last_frame = Some(frame);
    }
}

impl<W: Write + Send> BoardView for TextView<W> {
    fn draw_drop_frame(&mut self, snapshot: &BoardSnapshot, target: CellCoord, falling: CellCoord) {
        self.write_frame(render_board(snapshot, None, Some((target, falling))));
    }

    fn highlight_move(&mut self, snapshot: &BoardSnapshot, cell: CellCoord) {
        self.write_frame(render_board(snapshot, Some(cell), None));
    }

    fn redraw(&mut self, snapshot: &BoardSnapshot) {
        self.write_frame(render_board(snapshot, None, None));
    }

    fn show_message(&mut self, message: &str) {
        let _ = writeln!(self.out, "{}", message).and_then(|_| self.out.flush());
    }
}
