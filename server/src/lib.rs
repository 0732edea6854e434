//! # Typing Race Server Library
//!
//! This library provides the server for a real-time, two-player typing race.
//! Racers connect over WebSocket, are paired first-come-first-served, receive
//! a shared passage and report their progress while the server relays the
//! opponent's speed and decides the winner.
//!
//! ## Core Responsibilities
//!
//! ### Matchmaking
//! A single registry actor owns the pool of waiting racers. Connections
//! arriving, connections closing and the periodic pairing sweep all go
//! through its command queue, so the pool is never touched concurrently.
//!
//! ### Match Sessions
//! Each matched pair gets a session with one ingestion task per racer.
//! Progress updates are applied under the session's own lock, relayed to the
//! opponent, and the first racer to reach the end of the passage wins.
//! Disconnects forfeit the match to the remaining racer.
//!
//! ### Connection Gateway
//! Upgrades TCP connections to WebSocket, gives each racer an identity and
//! shuttles JSON frames between the socket and the racer's message queues.
//!
//! ## Module Organization
//!
//! ### Participant Module (`participant`)
//! Racer identity, role state and the connection handle used to reach it.
//!
//! ### Registry Module (`registry`)
//! The waiting pool, the deterministic pairing sweep and the actor loop.
//!
//! ### Session Module (`session`)
//! The per-match state machine: `Starting → Active → Ending → Closed`.
//!
//! ### Launcher Module (`launcher`)
//! Runs a session per matched pair and returns racers to the pool afterwards.
//!
//! ### Passage Module (`passage`)
//! Loads the text to race on from a file, a directory or memory.
//!
//! ### Network Module (`network`)
//! TCP listener, WebSocket upgrade and per-connection frame pump.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use server::passage::PassageSource;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::new()
//!         .with_bind_addr("127.0.0.1:8080")
//!         .with_sweep_interval(Duration::from_millis(100))
//!         .with_passages(PassageSource::file("game_text.txt"));
//!
//!     // Binds the listener and starts the matchmaking registry
//!     let server = Server::bind(config).await?;
//!
//!     // Accepts racers until the registry is shut down
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Wire Protocol
//!
//! Every frame is a JSON object with a `type` field; see the `shared` crate
//! for the full message set.

pub mod config;
pub mod error;
pub mod launcher;
pub mod network;
pub mod participant;
pub mod passage;
pub mod registry;
pub mod session;
