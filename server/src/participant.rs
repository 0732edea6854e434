//! Connected racers and the handles used to talk to them
//!
//! A [`Participant`] is owned by exactly one place at a time: the registry's
//! waiting pool while it waits for an opponent, or a running session while it
//! races. Its [`Connection`] moves with it, so whoever owns the participant is
//! the only reader of that racer's inbound frames.
//!
//! The socket itself lives in a separate connection task. The two sides are
//! joined by a pair of queues created with [`Connection::channel`]:
//! - outbound: typed [`ServerMessage`]s the server wants delivered
//! - inbound: raw text frames received from the racer

use crate::error::{RaceError, Result};
use shared::ServerMessage;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// Opaque, unique racer identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Generates a fresh random identity (UUID v4)
    pub fn generate() -> Self {
        ParticipantId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        ParticipantId(value.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(value: String) -> Self {
        ParticipantId(value)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which component currently owns a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleState {
    /// In the registry's waiting pool
    Waiting,
    /// Racing inside a session
    Playing,
    /// Connection gone; the participant is being discarded
    Done,
}

/// Cloneable send half of a racer's connection
///
/// Sends never block: messages are queued for the connection task, which
/// writes them to the socket in order.
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ConnectionSender {
    pub fn send(&self, message: ServerMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| RaceError::ConnectionClosed)
    }

    /// True once the connection task has stopped draining the queue
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The server's end of a racer connection
#[derive(Debug)]
pub struct Connection {
    sender: ConnectionSender,
    inbound: mpsc::UnboundedReceiver<String>,
    inbound_closed: bool,
}

/// The socket's end of a racer connection
///
/// Held by the connection task in production and by tests as a stand-in
/// for a remote racer.
#[derive(Debug)]
pub struct ConnectionPeer {
    pub outbound: mpsc::UnboundedReceiver<ServerMessage>,
    pub inbound: mpsc::UnboundedSender<String>,
}

impl Connection {
    /// Creates a connected server end and socket end
    pub fn channel() -> (Connection, ConnectionPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let connection = Connection {
            sender: ConnectionSender { tx: outbound_tx },
            inbound: inbound_rx,
            inbound_closed: false,
        };
        let peer = ConnectionPeer {
            outbound: outbound_rx,
            inbound: inbound_tx,
        };

        (connection, peer)
    }

    pub fn sender(&self) -> ConnectionSender {
        self.sender.clone()
    }

    pub fn send(&self, message: ServerMessage) -> Result<()> {
        self.sender.send(message)
    }

    /// Waits for the next inbound text frame
    ///
    /// Returns `None` once the racer's socket is closed. Cancel safe.
    pub async fn recv(&mut self) -> Option<String> {
        let frame = self.inbound.recv().await;
        if frame.is_none() {
            self.inbound_closed = true;
        }
        frame
    }

    /// Drops every frame already queued, returning how many were dropped
    pub fn discard_pending(&mut self) -> usize {
        let mut discarded = 0;
        loop {
            match self.inbound.try_recv() {
                Ok(_) => discarded += 1,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.inbound_closed = true;
                    break;
                }
            }
        }
        discarded
    }

    pub fn is_open(&self) -> bool {
        !self.inbound_closed && !self.sender.is_closed()
    }
}

impl ConnectionPeer {
    /// Queues a raw text frame as if the racer had sent it
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.inbound
            .send(text.into())
            .map_err(|_| RaceError::ConnectionClosed)
    }

    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.outbound.recv().await
    }

    /// Everything the server has queued for this racer so far
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            messages.push(message);
        }
        messages
    }
}

/// A connected racer
#[derive(Debug)]
pub struct Participant {
    id: ParticipantId,
    display_name: String,
    connection: Connection,
    role: RoleState,
    /// Identities only; sessions own participants, not each other
    opponents: Vec<ParticipantId>,
    queued_at: Instant,
}

impl Participant {
    /// Creates a participant in the `Waiting` state
    pub fn new(id: ParticipantId, display_name: impl Into<String>, connection: Connection) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            connection,
            role: RoleState::Waiting,
            opponents: Vec::new(),
            queued_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &ParticipantId {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn role(&self) -> RoleState {
        self.role
    }

    pub fn opponents(&self) -> &[ParticipantId] {
        &self.opponents
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_open()
    }

    /// How long the participant has been waiting for a match
    pub fn waiting_for(&self) -> Duration {
        self.queued_at.elapsed()
    }

    /// Links the participant to its opponent and hands ownership to a session
    pub fn begin_match(&mut self, opponent: ParticipantId) {
        self.role = RoleState::Playing;
        self.opponents = vec![opponent];
    }

    /// Returns the participant to the waiting pool state
    pub fn return_to_waiting(&mut self) {
        self.role = RoleState::Waiting;
        self.opponents.clear();
        self.queued_at = Instant::now();
    }

    /// Marks the participant as finished for good
    pub fn retire(&mut self) {
        self.role = RoleState::Done;
        self.opponents.clear();
    }
}
