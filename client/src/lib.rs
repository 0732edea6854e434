//! # Typing Race Client Library
//!
//! A headless racing bot for the typing race server. It connects over
//! WebSocket, waits to be matched, and "types" the passage it is given at a
//! configurable speed, reporting its progress the same way a browser client
//! would.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The simulated typist:
//! - Character progress at a target words-per-minute
//! - Random per-tick speed variation
//! - Start-time gating
//!
//! ### Network Module (`network`)
//! The connection loop:
//! - WebSocket connect with a display name
//! - Progress reports on a fixed tick
//! - Round bookkeeping (win, loss, opponent left, aborted)
//!
//! ## Usage
//!
//! ```no_run
//! use client::network::{Client, ClientConfig};
//!
//! # async fn example() -> Result<(), client::Error> {
//! let config = ClientConfig {
//!     server_url: "ws://127.0.0.1:8080".to_string(),
//!     name: "bot".to_string(),
//!     target_wpm: 80.0,
//!     jitter: 0.2,
//!     rounds: 1,
//! };
//! let rounds = Client::new(config).run().await?;
//! println!("{:?}", rounds);
//! # Ok(())
//! # }
//! ```

pub mod game;
pub mod network;

/// Boxed error returned by the client loop
pub type Error = Box<dyn std::error::Error + Send + Sync>;
