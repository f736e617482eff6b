//! # Four-in-a-line Game Server
//!
//! Hosts any number of concurrent four-in-a-line matches and makes them
//! reachable over UDP under unique names.
//!
//! ## Core Responsibilities
//!
//! ### Session Directory
//! [`directory::SessionDirectory`] binds each running match to a name. A name
//! becomes visible only once its session is fully built, and is unbound
//! exactly once when the session reports that it finished (or was shut down
//! for being idle). Binding the same name twice fails with
//! `NameAlreadyInUse`.
//!
//! ### Match State Machine
//! [`session::MatchSession`] owns the authoritative board, the roster and
//! the turn pointer behind one mutex. Moves are validated, applied and
//! published inside that critical section so turn order is enforced
//! atomically and observers never see a half-applied move.
//!
//! ### Change Notification
//! Sessions fan events out to an explicit list of observers. The directory's
//! cleanup hook and the network layer's push forwarder are two independent
//! subscribers to the same stream.
//!
//! ## Module Organization
//!
//! - `config`: runtime settings and their validation
//! - `error`: startup and runtime failures
//! - `directory`: name to session registry and idle reaping
//! - `session`: per-match state machine and its event stream
//! - `subscribers`: remote peers, their seats and followed games
//! - `network`: UDP request handling and state pushes
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), server::error::ServerError> {
//!     let mut server = Server::new("127.0.0.1:8080", ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod network;
pub mod session;
pub mod subscribers;
