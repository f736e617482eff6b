//! Remote peers the server pushes session updates to
//!
//! Each peer is keyed by its UDP address. A peer can watch several games and
//! holds at most one seat (a player mark) per game; the seat is how the server
//! decides whose turn a `Play` request is for.

use log::info;
use shared::PlayerMark;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A remote peer and the games it follows
#[derive(Debug)]
pub struct Subscriber {
    pub addr: SocketAddr,
    /// Last time we received any packet from this peer
    pub last_seen: Instant,
    /// Followed games, with the seat held in each (None when only watching)
    pub games: HashMap<String, Option<PlayerMark>>,
}

impl Subscriber {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            last_seen: Instant::now(),
            games: HashMap::new(),
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

pub struct SubscriberTable {
    subscribers: HashMap<SocketAddr, Subscriber>,
    max_subscribers: usize,
}

impl SubscriberTable {
    pub fn new(max_subscribers: usize) -> Self {
        Self {
            subscribers: HashMap::new(),
            max_subscribers,
        }
    }

    /// Records activity from `addr`, registering it if there is room
    ///
    /// Returns false when the peer is unknown and the table is full.
    pub fn touch(&mut self, addr: SocketAddr) -> bool {
        if let Some(subscriber) = self.subscribers.get_mut(&addr) {
            subscriber.last_seen = Instant::now();
            return true;
        }

        if self.subscribers.len() >= self.max_subscribers {
            return false;
        }

        info!("Peer {} connected", addr);
        self.subscribers.insert(addr, Subscriber::new(addr));
        true
    }

    /// Follows `game` without a seat; an existing seat is kept
    pub fn watch(&mut self, addr: SocketAddr, game: &str) {
        if let Some(subscriber) = self.subscribers.get_mut(&addr) {
            subscriber.games.entry(game.to_string()).or_insert(None);
        }
    }

    pub fn seat(&mut self, addr: SocketAddr, game: &str, mark: PlayerMark) {
        if let Some(subscriber) = self.subscribers.get_mut(&addr) {
            subscriber.games.insert(game.to_string(), Some(mark));
        }
    }

    /// Mark held by `addr` in `game`
    pub fn seat_of(&self, addr: SocketAddr, game: &str) -> Option<PlayerMark> {
        self.subscribers
            .get(&addr)
            .and_then(|subscriber| subscriber.games.get(game).copied().flatten())
    }

    pub fn followers_of(&self, game: &str) -> Vec<SocketAddr> {
        self.subscribers
            .values()
            .filter(|subscriber| subscriber.games.contains_key(game))
            .map(|subscriber| subscriber.addr)
            .collect()
    }

    /// Drops `game` from every peer, returning who was following it
    pub fn forget_game(&mut self, game: &str) -> Vec<SocketAddr> {
        self.subscribers
            .values_mut()
            .filter_map(|subscriber| subscriber.games.remove(game).map(|_| subscriber.addr))
            .collect()
    }

    pub fn remove(&mut self, addr: &SocketAddr) -> bool {
        if self.subscribers.remove(addr).is_some() {
            info!("Peer {} disconnected", addr);
            true
        } else {
            false
        }
    }

    /// Removes peers not heard from within `timeout`
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<SocketAddr> {
        let timed_out: Vec<SocketAddr> = self
            .subscribers
            .values()
            .filter(|subscriber| subscriber.is_timed_out(timeout))
            .map(|subscriber| subscriber.addr)
            .collect();

        for addr in &timed_out {
            self.remove(addr);
        }

        timed_out
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
