//! Process-wide registry of running match sessions
//!
//! The directory binds each session under a unique name. Creation and removal
//! take the write lock, lookups and listings the read lock, so a name is never
//! visible before its session is fully built and subscribed.
//!
//! Lock order is directory then session, and only `create` takes both (on a
//! session nobody else can reach yet). Anything that drives an existing
//! session (`reap_idle`, `shutdown_all`) copies the handles out first, since a
//! session finishing calls back into the directory to unbind itself.

use crate::session::{MatchSession, SessionEvent, SessionObserver};
use log::{debug, info};
use shared::{BoardEngine, DirectoryError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

pub type SessionHandle = Arc<MatchSession>;

struct DirectoryShared {
    sessions: RwLock<BTreeMap<String, SessionHandle>>,
    observers: Mutex<Vec<Arc<dyn SessionObserver>>>,
    engine: Arc<dyn BoardEngine>,
    rows: usize,
    cols: usize,
}

/// Unbinds a session from the directory when it reports completion
struct DirectoryCleanup {
    directory: Weak<DirectoryShared>,
    session: Weak<MatchSession>,
}

impl SessionObserver for DirectoryCleanup {
    fn notify(&self, event: &SessionEvent) {
        let SessionEvent::Finished { game } = event else {
            return;
        };
        let Some(shared) = self.directory.upgrade() else {
            return;
        };
        SessionDirectory { shared }.remove_bound(game, &self.session);
    }

    fn is_live(&self) -> bool {
        self.directory.strong_count() > 0
    }
}

/// Cheaply cloneable handle to a directory
#[derive(Clone)]
pub struct SessionDirectory {
    shared: Arc<DirectoryShared>,
}

impl SessionDirectory {
    /// Directory whose sessions all use a `rows` x `cols` board
    pub fn new(rows: usize, cols: usize, engine: Arc<dyn BoardEngine>) -> Self {
        Self {
            shared: Arc::new(DirectoryShared {
                sessions: RwLock::new(BTreeMap::new()),
                observers: Mutex::new(Vec::new()),
                engine,
                rows,
                cols,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, SessionHandle>> {
        self.shared
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, SessionHandle>> {
        self.shared
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an observer attached to every session created afterwards
    pub fn add_session_observer(&self, observer: Arc<dyn SessionObserver>) {
        self.shared
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Creates and binds a new session under `name`
    pub fn create(&self, name: &str) -> Result<SessionHandle, DirectoryError> {
        let mut sessions = self.write();
        if sessions.contains_key(name) {
            return Err(DirectoryError::NameAlreadyInUse(name.to_string()));
        }

        let session = Arc::new(MatchSession::new(
            name,
            self.shared.rows,
            self.shared.cols,
            Arc::clone(&self.shared.engine),
        ));
        session.subscribe(Arc::new(DirectoryCleanup {
            directory: Arc::downgrade(&self.shared),
            session: Arc::downgrade(&session),
        }));

        let observers = self
            .shared
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            session.subscribe(observer);
        }

        sessions.insert(name.to_string(), Arc::clone(&session));
        info!("Created game {}", name);
        Ok(session)
    }

    pub fn get(&self, name: &str) -> Result<SessionHandle, DirectoryError> {
        self.read()
            .get(name)
            .cloned()
            .ok_or_else(|| DirectoryError::NameNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    /// Names currently bound, in lexicographic order
    pub fn list(&self) -> BTreeSet<String> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Unbinds `name`. Returns false if it was not bound.
    pub fn remove(&self, name: &str) -> bool {
        if self.write().remove(name).is_some() {
            info!("Deleted game {}", name);
            true
        } else {
            debug!("Ignoring removal of unbound game {}", name);
            false
        }
    }

    /// Unbinds `name` only while it still refers to `session`
    fn remove_bound(&self, name: &str, session: &Weak<MatchSession>) -> bool {
        let mut sessions = self.write();
        let is_same = sessions
            .get(name)
            .is_some_and(|bound| std::ptr::eq(Arc::as_ptr(bound), session.as_ptr()));

        if is_same {
            sessions.remove(name);
            info!("Deleted game {}", name);
        } else {
            debug!("Ignoring finished notification for unbound game {}", name);
        }
        is_same
    }

    fn handles(&self) -> Vec<SessionHandle> {
        self.read().values().cloned().collect()
    }

    /// Shuts down every session idle for longer than `timeout`
    ///
    /// Returns the names that were shut down. Their bindings go away through
    /// the normal finished notification.
    pub fn reap_idle(&self, timeout: Duration) -> Vec<String> {
        let idle: Vec<SessionHandle> = self
            .handles()
            .into_iter()
            .filter(|session| session.idle_for() > timeout)
            .collect();

        idle.iter()
            .map(|session| {
                info!("Reaping idle game {}", session.name());
                session.shutdown();
                session.name().to_string()
            })
            .collect()
    }

    pub fn shutdown_all(&self) {
        for session in self.handles() {
            session.shutdown();
        }
    }
}
