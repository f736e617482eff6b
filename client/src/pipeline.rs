//! Serialized view state shared by the network and input paths
//!
//! Board updates reach the client from two places: pushes and polls from the
//! server, and the reply to the local player's own move. Both funnel through
//! [`ClientSyncPipeline`], which keeps the last confirmed board, the last
//! inferred move and the view behind one async mutex. Reconciling, animating
//! and local reads take turns on that mutex. Remote calls never run while it
//! is held.

use crate::error::ClientError;
use crate::reconcile::{infer_last_move, is_stale};
use crate::view::BoardView;
use async_trait::async_trait;
use log::{debug, warn};
use shared::{BoardSnapshot, CellCoord, GameStatus, PlayerMark, ValidationError};
use std::time::Duration;
use tokio::sync::Mutex;

/// Remote operations on the game this client is following
#[async_trait]
pub trait GameService: Send + Sync {
    /// Plays `column` as the seated player and returns the resulting board
    async fn play(&self, column: usize) -> Result<BoardSnapshot, ClientError>;

    async fn fetch_snapshot(&self) -> Result<BoardSnapshot, ClientError>;
}

/// What the pipeline did with an incoming board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A single move was inferred, animated and left highlighted
    Animated(CellCoord),
    /// The board was drawn from scratch
    Redrawn,
    /// The board was older than the retained one and was dropped
    Stale,
}

struct ViewState<V> {
    view: V,
    snapshot: Option<BoardSnapshot>,
    last_move: Option<CellCoord>,
}

pub struct ClientSyncPipeline<V: BoardView> {
    state: Mutex<ViewState<V>>,
    frame_delay: Duration,
    seat: Option<PlayerMark>,
}

impl<V: BoardView> ClientSyncPipeline<V> {
    pub fn new(view: V, frame_delay: Duration) -> Self {
        Self {
            state: Mutex::new(ViewState {
                view,
                snapshot: None,
                last_move: None,
            }),
            frame_delay,
            seat: None,
        }
    }

    /// Marks this client as playing `mark`; without a seat local moves are refused
    pub fn with_seat(mut self, mark: PlayerMark) -> Self {
        self.seat = Some(mark);
        self
    }

    pub fn seat(&self) -> Option<PlayerMark> {
        self.seat
    }

    /// Applies a board received from the server
    ///
    /// Reconciles against the retained board and stores the new one. A
    /// single inferred move is animated falling into place. It stays
    /// highlighted while the game goes on; any other case ends in a full
    /// redraw. A board older than the retained one is dropped untouched.
    pub async fn on_remote_update(&self, snapshot: BoardSnapshot) -> SyncOutcome {
        let mut state = self.state.lock().await;

        if let Some(retained) = state.snapshot.as_ref() {
            if is_stale(retained, &snapshot) {
                debug!(
                    "Dropping stale board with {} marks, holding {}",
                    snapshot.occupied_count(),
                    retained.occupied_count()
                );
                return SyncOutcome::Stale;
            }
        }

        let inferred = infer_last_move(state.snapshot.as_ref(), &snapshot);
        state.snapshot = Some(snapshot.clone());
        state.last_move = None;

        let Some(cell) = inferred else {
            state.view.redraw(&snapshot);
            return SyncOutcome::Redrawn;
        };

        debug!("Animating move at {}", cell);
        for row in 0..=cell.row {
            state
                .view
                .draw_drop_frame(&snapshot, cell, CellCoord::new(row, cell.col));
            if !self.frame_delay.is_zero() {
                tokio::time::sleep(self.frame_delay).await;
            }
        }

        if snapshot.status() == GameStatus::Continue {
            state.last_move = Some(cell);
            state.view.highlight_move(&snapshot, cell);
            SyncOutcome::Animated(cell)
        } else {
            state.view.redraw(&snapshot);
            SyncOutcome::Redrawn
        }
    }

    /// Submits the local player's move
    ///
    /// Refused locally when the client has no seat, no board yet, the game is
    /// over or it is the other player's turn. The move itself is sent without
    /// holding the state lock. Any failure is shown to the user and leaves the
    /// retained board untouched; on success the returned board goes through
    /// [`on_remote_update`](Self::on_remote_update).
    pub async fn on_local_user_action<S>(&self, service: &S, column: usize) -> Result<SyncOutcome, ClientError>
    where
        S: GameService + ?Sized,
    {
        let checked = {
            let state = self.state.lock().await;
            self.check_local_move(state.snapshot.as_ref())
        };

        let result = match checked {
            Ok(()) => service.play(column).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(snapshot) => Ok(self.on_remote_update(snapshot).await),
            Err(e) => {
                if e.is_transport() {
                    warn!("Move in column {} not delivered: {}", column, e);
                }
                self.show_message(&e.to_string()).await;
                Err(e)
            }
        }
    }

    fn check_local_move(&self, snapshot: Option<&BoardSnapshot>) -> Result<(), ClientError> {
        let mark = self.seat.ok_or(ClientError::NotSeated)?;
        let Some(snapshot) = snapshot else {
            return Err(ValidationError::NotStarted.into());
        };

        if snapshot.status() != GameStatus::Continue {
            return Err(ValidationError::GameOver.into());
        }
        if snapshot.current_player() != mark {
            return Err(ValidationError::NotYourTurn {
                expected: snapshot.current_player(),
                actual: mark,
            }
            .into());
        }
        Ok(())
    }

    /// Fetches the latest board and applies it
    ///
    /// On failure the retained board is kept as the last confirmed state.
    pub async fn refresh<S>(&self, service: &S) -> Result<SyncOutcome, ClientError>
    where
        S: GameService + ?Sized,
    {
        let snapshot = service.fetch_snapshot().await?;
        Ok(self.on_remote_update(snapshot).await)
    }

    pub async fn show_message(&self, message: &str) {
        self.state.lock().await.view.show_message(message);
    }

    /// Reads the retained board and last move under the lock
    pub async fn inspect<R>(&self, f: impl FnOnce(Option<&BoardSnapshot>, Option<CellCoord>) -> R) -> R {
        let state = self.state.lock().await;
        f(state.snapshot.as_ref(), state.last_move)
    }

    pub async fn snapshot(&self) -> Option<BoardSnapshot> {
        self.inspect(|snapshot, _| snapshot.cloned()).await
    }

    pub async fn last_move(&self) -> Option<CellCoord> {
        self.inspect(|_, last_move| last_move).await
    }
}
