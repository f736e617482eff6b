//! # Four-in-a-line Game Client
//!
//! Follows one game hosted by the server, either seated as a player or as a
//! spectator, and keeps a local view of its board in step with the server.
//!
//! ## Architecture Overview
//!
//! The server never sends move deltas, only whole boards, on two channels:
//! pushes after every accepted move and replies to periodic polls. Either one
//! can lag or skip moves, so the client works out the last move itself.
//!
//! ### Last-move inference
//! [`reconcile::infer_last_move`] compares the board last drawn with the one
//! that arrived and names the single new cell, or nothing when more than one
//! move landed in between. The very first move of a game is recovered even
//! when the empty board was never seen.
//!
//! ### Sync pipeline
//! [`pipeline::ClientSyncPipeline`] owns the retained board and the view
//! behind one async mutex. Remote updates are reconciled and animated inside
//! it; local moves are checked under it, sent outside it, and their reply
//! comes back in as a remote update.
//!
//! ## Module Organization
//!
//! - `config`: runtime settings
//! - `error`: client error type, transport failures vs typed refusals
//! - `input`: terminal commands
//! - `network`: UDP request client and the interactive run loop
//! - `pipeline`: serialized view state and the `GameService` seam
//! - `reconcile`: last-move inference
//! - `view`: rendering seam and the terminal renderer
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::ClientConfig;
//! use client::network::{Client, RemoteClient, RemoteGame};
//! use client::view::TextView;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), client::error::ClientError> {
//!     let config = ClientConfig::default();
//!     let (remote, pushes) = RemoteClient::connect(&config.server_addr, config.request_timeout).await?;
//!     let game = RemoteGame::new(Arc::new(remote), "alpha");
//!
//!     let view = TextView::new(std::io::stdout());
//!     let mut client = Client::join(game, pushes, "alice", view, &config).await?;
//!     let stdin = tokio::io::BufReader::new(tokio::io::stdin());
//!     client.run(stdin).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod input;
pub mod network;
pub mod pipeline;
pub mod reconcile;
pub mod view;
