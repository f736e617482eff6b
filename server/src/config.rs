use shared::{largest_push_size, DEFAULT_COLS, DEFAULT_ROWS, MAX_PACKET_SIZE};
use std::time::Duration;

/// Settings a server refuses to start with
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("board of {rows}x{cols} has no cells")]
    EmptyBoard { rows: usize, cols: usize },

    #[error("a {rows}x{cols} board does not fit in a {limit} byte datagram once filled")]
    BoardTooLarge { rows: usize, cols: usize, limit: usize },

    #[error("winning line length must be at least 1")]
    ZeroLineLength,

    #[error("{0} must be longer than zero")]
    ZeroInterval(&'static str),
}

/// Runtime settings for a [`crate::network::Server`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub rows: usize,
    pub cols: usize,
    /// Aligned marks needed to win
    pub line_length: usize,
    /// Sessions and peers silent for longer than this are dropped
    pub idle_timeout: Duration,
    /// How often the idle checks run
    pub reap_interval: Duration,
    pub max_subscribers: usize,
}

impl ServerConfig {
    /// Checks that every board this config produces can be pushed in one datagram
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (rows, cols) = (self.rows, self.cols);
        if rows == 0 || cols == 0 {
            return Err(ConfigError::EmptyBoard { rows, cols });
        }
        match largest_push_size(rows, cols) {
            Some(size) if size <= MAX_PACKET_SIZE => {}
            _ => {
                return Err(ConfigError::BoardTooLarge {
                    rows,
                    cols,
                    limit: MAX_PACKET_SIZE,
                })
            }
        }
        if self.line_length == 0 {
            return Err(ConfigError::ZeroLineLength);
        }
        if self.reap_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("reap interval"));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            line_length: 4,
            idle_timeout: Duration::from_secs(600),
            reap_interval: Duration::from_secs(5),
            max_subscribers: 256,
        }
    }
}
