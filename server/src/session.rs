//! Per-match state machine
//!
//! A [`MatchSession`] owns the authoritative board, the roster and the turn
//! pointer behind a single mutex. Every accepted move replaces the snapshot
//! and is then published to the session's observers before the lock is
//! released, so observers see transitions in the order they happened and never
//! see a half-applied move.

use log::{debug, info};
use shared::{BoardEngine, BoardSnapshot, GamePlayer, GameStatus, PlayerMark, ValidationError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Roster incomplete
    Forming,
    /// Game in progress
    Continue,
    Won,
    Tie,
    /// Shut down before reaching a result
    Abandoned,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Won | SessionState::Tie | SessionState::Abandoned
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        game: String,
        snapshot: BoardSnapshot,
    },
    Finished {
        game: String,
    },
}

/// Subscriber to a session's event stream
///
/// `notify` runs while the session lock is held and must not call back into
/// the same session.
pub trait SessionObserver: Send + Sync {
    fn notify(&self, event: &SessionEvent);

    /// Dead observers are dropped at the next publish
    fn is_live(&self) -> bool {
        true
    }
}

impl SessionObserver for mpsc::UnboundedSender<SessionEvent> {
    fn notify(&self, event: &SessionEvent) {
        if self.send(event.clone()).is_err() {
            debug!("Session event dropped, receiver is gone");
        }
    }

    fn is_live(&self) -> bool {
        !self.is_closed()
    }
}

struct SessionInner {
    snapshot: BoardSnapshot,
    roster: Vec<GamePlayer>,
    state: SessionState,
    observers: Vec<Arc<dyn SessionObserver>>,
    finished_sent: bool,
    last_activity: Instant,
}

impl SessionInner {
    fn publish(&mut self, event: SessionEvent) {
        self.observers.retain(|observer| observer.is_live());
        for observer in &self.observers {
            observer.notify(&event);
        }
    }

    fn publish_finished(&mut self, game: &str) {
        if self.finished_sent {
            return;
        }
        self.finished_sent = true;
        self.publish(SessionEvent::Finished {
            game: game.to_string(),
        });
    }

    fn join_checked(&mut self, game: &str, player: GamePlayer) -> Result<GamePlayer, ValidationError> {
        if self.roster.iter().any(|p| p.mark == player.mark) {
            return Err(ValidationError::DuplicateMark(player.mark));
        }

        info!("Player {} joined game {} as {}", player.name, game, player.mark);
        self.roster.push(player.clone());
        self.last_activity = Instant::now();

        if self.roster.len() == PlayerMark::COUNT {
            self.state = SessionState::Continue;
            info!("Game {} started", game);
            let snapshot = self.snapshot.clone();
            self.publish(SessionEvent::StateChanged {
                game: game.to_string(),
                snapshot,
            });
        }

        Ok(player)
    }

    fn ensure_forming(&self) -> Result<(), ValidationError> {
        if self.state != SessionState::Forming || self.roster.len() >= PlayerMark::COUNT {
            return Err(ValidationError::RosterFull);
        }
        Ok(())
    }
}

/// One running match, identified by its unique name
pub struct MatchSession {
    name: String,
    engine: Arc<dyn BoardEngine>,
    inner: Mutex<SessionInner>,
}

impl MatchSession {
    pub fn new(name: impl Into<String>, rows: usize, cols: usize, engine: Arc<dyn BoardEngine>) -> Self {
        Self {
            name: name.into(),
            engine,
            inner: Mutex::new(SessionInner {
                snapshot: BoardSnapshot::empty(rows, cols),
                roster: Vec::with_capacity(PlayerMark::COUNT),
                state: SessionState::Forming,
                observers: Vec::new(),
                finished_sent: false,
                last_activity: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe(&self, observer: Arc<dyn SessionObserver>) {
        self.lock().observers.push(observer);
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn roster(&self) -> Vec<GamePlayer> {
        self.lock().roster.clone()
    }

    /// First mark in enumeration order that nobody holds yet
    pub fn next_free_mark(&self) -> Option<PlayerMark> {
        let inner = self.lock();
        PlayerMark::ALL
            .into_iter()
            .find(|mark| inner.roster.iter().all(|p| p.mark != *mark))
    }

    /// Time since the last join or accepted move
    pub fn idle_for(&self) -> Duration {
        self.lock().last_activity.elapsed()
    }

    /// Adds `player` to the roster
    ///
    /// Only valid while forming. The session starts once every mark is taken.
    pub fn join(&self, player: GamePlayer) -> Result<(), ValidationError> {
        let mut inner = self.lock();
        inner.ensure_forming()?;
        inner.join_checked(&self.name, player).map(|_| ())
    }

    /// Joins `name` under the first free mark, chosen inside the same critical
    /// section as the insertion
    pub fn join_next_free(&self, name: impl Into<String>) -> Result<GamePlayer, ValidationError> {
        let mut inner = self.lock();
        inner.ensure_forming()?;
        let mark = PlayerMark::ALL
            .into_iter()
            .find(|mark| inner.roster.iter().all(|p| p.mark != *mark))
            .ok_or(ValidationError::RosterFull)?;
        inner.join_checked(&self.name, GamePlayer::new(name, mark))
    }

    /// Plays `mark` into `column`
    ///
    /// Turn check, placement and turn advance happen under one lock. On error
    /// nothing has been modified.
    pub fn play(&self, mark: PlayerMark, column: usize) -> Result<BoardSnapshot, ValidationError> {
        let mut inner = self.lock();

        match inner.state {
            SessionState::Forming => return Err(ValidationError::NotStarted),
            SessionState::Won | SessionState::Tie | SessionState::Abandoned => {
                return Err(ValidationError::GameOver)
            }
            SessionState::Continue => {}
        }

        let expected = inner.snapshot.current_player();
        if mark != expected {
            return Err(ValidationError::NotYourTurn {
                expected,
                actual: mark,
            });
        }

        let dropped = self.engine.drop_mark(&inner.snapshot, column, mark)?;
        let advanced = dropped.snapshot.with_current_player(mark.next());

        let next = if let Some(line) = dropped.win_line {
            inner.state = SessionState::Won;
            if let Some(winner) = inner.roster.iter_mut().find(|p| p.mark == mark) {
                winner.score += 1;
            }
            advanced.won(line)
        } else if self.engine.is_full(&advanced) {
            inner.state = SessionState::Tie;
            advanced.tied()
        } else {
            advanced
        };

        debug!("Game {}: {} played {}", self.name, mark, dropped.cell);
        inner.snapshot = next.clone();
        inner.last_activity = Instant::now();
        inner.publish(SessionEvent::StateChanged {
            game: self.name.clone(),
            snapshot: next.clone(),
        });

        if next.status() != GameStatus::Continue {
            info!("Game {} finished: {:?}", self.name, next.status());
            inner.publish_finished(&self.name);
        }

        Ok(next)
    }

    /// Forces the session to end
    ///
    /// A session that already finished is left alone; either way the finished
    /// notification goes out at most once.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        if !inner.state.is_terminal() {
            info!("Game {} abandoned", self.name);
            inner.state = SessionState::Abandoned;
        }
        inner.publish_finished(&self.name);
    }
}
