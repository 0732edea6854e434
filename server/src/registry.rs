//! Matchmaking registry
//!
//! The registry is a single sequential actor that owns the waiting pool.
//! Every mutation arrives as a [`RegistryCommand`] on one queue, and the
//! periodic pairing sweep runs inside the same loop, so a connection
//! arriving, a connection closing and a sweep can never interleave.
//!
//! Pairing is first-come-first-served: the pool keeps arrival order and a
//! sweep pairs entries 0↔1, 2↔3, ... leaving an odd one out for the next
//! sweep. Matched pairs are handed to a [`MatchDispatcher`], which must not
//! block the actor.

use crate::error::{RaceError, Result};
use crate::participant::{Participant, ParticipantId, RoleState};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};

/// Two participants paired by a sweep, both already in the `Playing` state
#[derive(Debug)]
pub struct MatchedPair {
    pub first: Participant,
    pub second: Participant,
}

impl MatchedPair {
    fn new(mut first: Participant, mut second: Participant) -> Self {
        first.begin_match(second.id().clone());
        second.begin_match(first.id().clone());
        Self { first, second }
    }

    pub fn ids(&self) -> (ParticipantId, ParticipantId) {
        (self.first.id().clone(), self.second.id().clone())
    }
}

/// Receives matched pairs from the registry
///
/// Implementations must return promptly; the registry calls this from its
/// control loop and never waits for a match to finish.
pub trait MatchDispatcher: Send + 'static {
    fn dispatch(&self, pair: MatchedPair);
}

impl MatchDispatcher for mpsc::UnboundedSender<MatchedPair> {
    fn dispatch(&self, pair: MatchedPair) {
        if let Err(e) = self.send(pair) {
            warn!("Dropping matched pair, receiver is gone: {:?}", e.0.ids());
        }
    }
}

/// The waiting pool, in arrival order
#[derive(Debug, Default)]
pub struct WaitingPool {
    entries: Vec<Participant>,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a participant, replacing any entry with the same identity
    ///
    /// A replaced entry keeps its place in the pairing order and is returned.
    pub fn insert(&mut self, participant: Participant) -> Option<Participant> {
        match self
            .entries
            .iter()
            .position(|p| p.id() == participant.id())
        {
            Some(index) => Some(std::mem::replace(&mut self.entries[index], participant)),
            None => {
                self.entries.push(participant);
                None
            }
        }
    }

    pub fn remove(&mut self, id: &ParticipantId) -> Option<Participant> {
        let index = self.entries.iter().position(|p| p.id() == id)?;
        Some(self.entries.remove(index))
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.entries.iter().any(|p| p.id() == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Waiting identities in pairing order
    pub fn ids(&self) -> Vec<ParticipantId> {
        self.entries.iter().map(|p| p.id().clone()).collect()
    }

    /// Removes entries whose connection has already closed
    pub fn evict_closed(&mut self) -> Vec<Participant> {
        let (open, closed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|p| p.is_connected());
        self.entries = open;
        closed
    }

    /// Pairs waiting participants two at a time in pool order
    ///
    /// Paired participants leave the pool in the `Playing` state with their
    /// opponent linked. With an odd count the last entry stays behind.
    pub fn pair_off(&mut self) -> Vec<MatchedPair> {
        let mut pairs = Vec::with_capacity(self.entries.len() / 2);
        let mut waiting = std::mem::take(&mut self.entries).into_iter();

        while let Some(first) = waiting.next() {
            match waiting.next() {
                Some(second) => pairs.push(MatchedPair::new(first, second)),
                None => self.entries.push(first),
            }
        }

        pairs
    }
}

/// Commands accepted by the registry actor
#[derive(Debug)]
pub enum RegistryCommand {
    Add(Participant),
    Remove(ParticipantId),
    Snapshot(oneshot::Sender<Vec<ParticipantId>>),
    Shutdown,
}

/// Cloneable handle for enqueueing registry commands
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    tx: mpsc::UnboundedSender<RegistryCommand>,
}

impl RegistryHandle {
    /// Creates a handle and the command queue a [`Registry`] will consume
    pub fn channel() -> (RegistryHandle, mpsc::UnboundedReceiver<RegistryCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RegistryHandle { tx }, rx)
    }

    pub fn add(&self, participant: Participant) -> Result<()> {
        self.send(RegistryCommand::Add(participant))
    }

    pub fn remove(&self, id: ParticipantId) -> Result<()> {
        self.send(RegistryCommand::Remove(id))
    }

    /// Waiting identities in pairing order, as of when the command is handled
    pub async fn snapshot(&self) -> Result<Vec<ParticipantId>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RegistryCommand::Snapshot(reply_tx))?;
        reply_rx.await.map_err(|_| RaceError::RegistryClosed)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(RegistryCommand::Shutdown)
    }

    fn send(&self, command: RegistryCommand) -> Result<()> {
        self.tx.send(command).map_err(|_| RaceError::RegistryClosed)
    }
}

/// The matchmaking actor
pub struct Registry<D: MatchDispatcher> {
    pool: WaitingPool,
    commands: mpsc::UnboundedReceiver<RegistryCommand>,
    dispatcher: D,
    sweep_interval: Duration,
    sweeps: u64,
    matches_made: u64,
}

impl<D: MatchDispatcher> Registry<D> {
    pub fn new(
        commands: mpsc::UnboundedReceiver<RegistryCommand>,
        dispatcher: D,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            pool: WaitingPool::new(),
            commands,
            dispatcher,
            sweep_interval,
            sweeps: 0,
            matches_made: 0,
        }
    }

    /// Runs the control loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        let mut sweep_timer = interval(self.sweep_interval);
        sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Registry started (sweep every {}ms)",
            self.sweep_interval.as_millis()
        );

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(RegistryCommand::Shutdown) | None => {
                            info!("Registry shutting down with {} waiting", self.pool.len());
                            break;
                        }
                        Some(command) => self.handle_command(command),
                    }
                },

                _ = sweep_timer.tick() => {
                    self.sweep();
                },
            }
        }
    }

    fn handle_command(&mut self, command: RegistryCommand) {
        match command {
            RegistryCommand::Add(mut participant) => {
                if participant.role() != RoleState::Waiting {
                    warn!(
                        "Participant {} added while {:?}, resetting to Waiting",
                        participant.id(),
                        participant.role()
                    );
                    participant.return_to_waiting();
                }

                debug!(
                    "Participant {} ({}) waiting for a match",
                    participant.id(),
                    participant.display_name()
                );
                if let Some(previous) = self.pool.insert(participant) {
                    warn!(
                        "Duplicate identity {} added to registry, replacing previous entry",
                        previous.id()
                    );
                }
            }
            RegistryCommand::Remove(id) => {
                if self.pool.remove(&id).is_some() {
                    debug!("Participant {} left the waiting pool", id);
                }
            }
            RegistryCommand::Snapshot(reply) => {
                let _ = reply.send(self.pool.ids());
            }
            RegistryCommand::Shutdown => {}
        }
    }

    fn sweep(&mut self) {
        self.sweeps += 1;

        for mut gone in self.pool.evict_closed() {
            debug!("Evicting {} from waiting pool, connection closed", gone.id());
            gone.retire();
        }

        for pair in self.pool.pair_off() {
            self.matches_made += 1;
            info!(
                "Matched {} ({}) with {} ({}) after {}ms",
                pair.first.id(),
                pair.first.display_name(),
                pair.second.id(),
                pair.second.display_name(),
                pair.first.waiting_for().as_millis()
            );
            self.dispatcher.dispatch(pair);
        }

        // Periodic pool monitoring
        if self.sweeps % 100 == 0 && !self.pool.is_empty() {
            debug!(
                "Sweep {}: {} waiting, {} matches made",
                self.sweeps,
                self.pool.len(),
                self.matches_made
            );
        }
    }
}
