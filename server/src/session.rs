//! Match engine for one race between two participants
//!
//! A session moves through `Starting → Active → Ending → Closed`:
//! - `Starting`: the passage is loaded and `game_start` is sent to both racers
//! - `Active`: one ingestion loop per racer reads progress reports
//! - `Ending`: exactly one resolution fired (completion or disconnect)
//! - `Closed`: both loops returned and both racers are `Waiting` again
//!
//! Both loops mutate the shared progress under the session's own lock. The
//! lock is never held across a send; relays and outcome messages go out after
//! it is released. Whichever loop first decides the outcome under the lock is
//! the only resolver, and it wakes the other loop through a resolution signal
//! so a racer that never sends another frame cannot keep the session alive.

use crate::participant::{ConnectionSender, Participant, ParticipantId};
use crate::passage::{passage_length, PassageSource};
use crate::registry::MatchedPair;
use log::{debug, error, info, warn};
use shared::{unix_timestamp_secs, ClientMessage, GameResult, ServerMessage};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Starting,
    Active,
    Ending,
    Closed,
}

/// One of the two positions in a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    First,
    Second,
}

impl Seat {
    fn index(self) -> usize {
        match self {
            Seat::First => 0,
            Seat::Second => 1,
        }
    }

    pub fn opponent(self) -> Seat {
        match self {
            Seat::First => Seat::Second,
            Seat::Second => Seat::First,
        }
    }
}

/// Last progress report received from a racer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Progress {
    pub characters_typed: u64,
    pub wpm: f64,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A racer reached the end of the passage first
    Completed {
        winner: ParticipantId,
        loser: ParticipantId,
        winner_wpm: f64,
        loser_wpm: f64,
    },
    /// A racer's connection failed before the race was decided
    Forfeit { disconnected: ParticipantId },
    /// The session could not be created
    Aborted { reason: String },
}

/// What a finished session hands back to its launcher
#[derive(Debug)]
pub struct SessionReport {
    pub outcome: Outcome,
    /// Every participant that came back from the session, all `Waiting`
    pub participants: Vec<Participant>,
}

#[derive(Debug)]
struct MatchState {
    phase: SessionPhase,
    progress: [Progress; 2],
    outcome: Option<Outcome>,
}

enum LoopControl {
    Continue,
    Stop,
}

/// Shared state of one running match
pub struct Session {
    id: u64,
    passage: String,
    passage_len: u64,
    racers: [ParticipantId; 2],
    senders: [ConnectionSender; 2],
    state: Mutex<MatchState>,
    resolved: watch::Sender<bool>,
}

/// Creates and runs a session for a matched pair
///
/// Creation is guarded: if the passage cannot be loaded, both racers get a
/// `match_aborted` notice and come back `Waiting` without a session existing.
pub async fn start(
    pair: MatchedPair,
    passages: &PassageSource,
    start_delay: Duration,
) -> SessionReport {
    match passages.load().await {
        Ok(passage) => Arc::new(Session::new(&pair, passage)).run(pair, start_delay).await,
        Err(e) => {
            let (first, second) = pair.ids();
            error!("Failed to load passage for {} vs {}: {}", first, second, e);
            abort(pair, e.to_string())
        }
    }
}

fn abort(pair: MatchedPair, reason: String) -> SessionReport {
    let MatchedPair { first, second } = pair;
    let mut participants = vec![first, second];

    for participant in &mut participants {
        let notice = ServerMessage::MatchAborted {
            reason: reason.clone(),
        };
        if let Err(e) = participant.connection().send(notice) {
            warn!("Could not notify {} of aborted match: {}", participant.id(), e);
        }
        participant.return_to_waiting();
    }

    SessionReport {
        outcome: Outcome::Aborted { reason },
        participants,
    }
}

// Completes once the session has been resolved by either loop
async fn resolution(resolved: &mut watch::Receiver<bool>) {
    let _ = resolved.wait_for(|done| *done).await;
}

impl Session {
    pub fn new(pair: &MatchedPair, passage: String) -> Self {
        let (resolved, _) = watch::channel(false);
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            passage_len: passage_length(&passage) as u64,
            passage,
            racers: [pair.first.id().clone(), pair.second.id().clone()],
            senders: [
                pair.first.connection().sender(),
                pair.second.connection().sender(),
            ],
            state: Mutex::new(MatchState {
                phase: SessionPhase::Starting,
                progress: [Progress::default(); 2],
                outcome: None,
            }),
            resolved,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    pub async fn progress(&self, seat: Seat) -> Progress {
        self.state.lock().await.progress[seat.index()]
    }

    /// Drives the session from `Starting` to `Closed`
    pub async fn run(self: Arc<Self>, pair: MatchedPair, start_delay: Duration) -> SessionReport {
        let MatchedPair {
            mut first,
            mut second,
        } = pair;

        for participant in [&mut first, &mut second] {
            let stale = participant.connection_mut().discard_pending();
            if stale > 0 {
                debug!(
                    "Session {}: discarded {} frames {} sent while waiting",
                    self.id,
                    stale,
                    participant.id()
                );
            }
        }

        let game_start = ServerMessage::GameStart {
            text: self.passage.clone(),
            start_at: unix_timestamp_secs() + start_delay.as_secs(),
            text_length: self.passage_len as usize,
        };

        let mut failed_to_start = None;
        for seat in [Seat::First, Seat::Second] {
            if let Err(e) = self.senders[seat.index()].send(game_start.clone()) {
                warn!(
                    "Session {}: failed to start {}: {}",
                    self.id,
                    self.racers[seat.index()],
                    e
                );
                if failed_to_start.is_none() {
                    failed_to_start = Some(seat);
                }
            }
        }

        let participants = match failed_to_start {
            Some(seat) => {
                self.resolve_disconnect(seat).await;
                vec![first, second]
            }
            None => {
                self.set_phase(SessionPhase::Active).await;
                info!(
                    "Session {}: {} vs {} racing on {} chars",
                    self.id, self.racers[0], self.racers[1], self.passage_len
                );
                self.race(first, second).await
            }
        };

        self.close(participants).await
    }

    async fn race(self: &Arc<Self>, first: Participant, second: Participant) -> Vec<Participant> {
        let first_loop = tokio::spawn(Arc::clone(self).ingest(
            Seat::First,
            first,
            self.resolved.subscribe(),
        ));
        let second_loop = tokio::spawn(Arc::clone(self).ingest(
            Seat::Second,
            second,
            self.resolved.subscribe(),
        ));

        let (first, second) = tokio::join!(first_loop, second_loop);

        let mut participants = Vec::with_capacity(2);
        for result in [first, second] {
            match result {
                Ok(participant) => participants.push(participant),
                Err(e) => error!("Session {}: ingestion loop failed: {}", self.id, e),
            }
        }
        participants
    }

    /// Reads one racer's frames until the session is resolved
    async fn ingest(
        self: Arc<Self>,
        seat: Seat,
        mut participant: Participant,
        mut resolved: watch::Receiver<bool>,
    ) -> Participant {
        loop {
            let frame = tokio::select! {
                biased;
                _ = resolution(&mut resolved) => break,
                frame = participant.connection_mut().recv() => frame,
            };

            let Some(text) = frame else {
                debug!("Session {}: {} disconnected", self.id, participant.id());
                self.resolve_disconnect(seat).await;
                break;
            };

            match ClientMessage::parse(&text) {
                Some(ClientMessage::Progress {
                    characters_typed,
                    wpm,
                }) => {
                    let control = self.record_progress(seat, characters_typed, wpm).await;
                    if let LoopControl::Stop = control {
                        break;
                    }
                }
                Some(ClientMessage::Other) => {}
                None => debug!(
                    "Session {}: ignoring malformed frame from {}",
                    self.id,
                    participant.id()
                ),
            }
        }

        participant
    }

    async fn record_progress(&self, seat: Seat, characters_typed: u64, wpm: f64) -> LoopControl {
        let finished = {
            let mut state = self.state.lock().await;
            if state.outcome.is_some() {
                return LoopControl::Stop;
            }

            state.progress[seat.index()] = Progress {
                characters_typed,
                wpm,
            };

            if characters_typed >= self.passage_len {
                let winner_wpm = state.progress[seat.index()].wpm;
                let loser_wpm = state.progress[seat.opponent().index()].wpm;
                state.outcome = Some(Outcome::Completed {
                    winner: self.racers[seat.index()].clone(),
                    loser: self.racers[seat.opponent().index()].clone(),
                    winner_wpm,
                    loser_wpm,
                });
                state.phase = SessionPhase::Ending;
                Some((winner_wpm, loser_wpm))
            } else {
                None
            }
        };

        let opponent = seat.opponent();
        if let Err(e) = self.senders[opponent.index()].send(ServerMessage::OpponentWpm { wpm }) {
            warn!(
                "Session {}: failed to relay wpm to {}: {}",
                self.id,
                self.racers[opponent.index()],
                e
            );
        }

        match finished {
            Some((winner_wpm, loser_wpm)) => {
                self.announce_winner(seat, winner_wpm, loser_wpm);
                self.resolved.send_replace(true);
                LoopControl::Stop
            }
            None => LoopControl::Continue,
        }
    }

    fn announce_winner(&self, winner: Seat, winner_wpm: f64, loser_wpm: f64) {
        let loser = winner.opponent();
        info!(
            "Session {}: {} won at {:.1} wpm against {} at {:.1} wpm",
            self.id,
            self.racers[winner.index()],
            winner_wpm,
            self.racers[loser.index()],
            loser_wpm
        );

        let results = [
            (
                winner,
                ServerMessage::GameOver {
                    result: GameResult::Win,
                    your_wpm: winner_wpm,
                    opponent_wpm: loser_wpm,
                },
            ),
            (
                loser,
                ServerMessage::GameOver {
                    result: GameResult::Lose,
                    your_wpm: loser_wpm,
                    opponent_wpm: winner_wpm,
                },
            ),
        ];

        for (seat, message) in results {
            if let Err(e) = self.senders[seat.index()].send(message) {
                warn!(
                    "Session {}: failed to send result to {}: {}",
                    self.id,
                    self.racers[seat.index()],
                    e
                );
            }
        }
    }

    /// Resolves the match as a forfeit unless it was already decided
    async fn resolve_disconnect(&self, seat: Seat) {
        {
            let mut state = self.state.lock().await;
            if state.outcome.is_some() {
                return;
            }
            state.outcome = Some(Outcome::Forfeit {
                disconnected: self.racers[seat.index()].clone(),
            });
            state.phase = SessionPhase::Ending;
        }

        let survivor = seat.opponent();
        info!(
            "Session {}: {} disconnected, {} is notified",
            self.id,
            self.racers[seat.index()],
            self.racers[survivor.index()]
        );
        if let Err(e) = self.senders[survivor.index()].send(ServerMessage::OpponentDisconnected) {
            warn!(
                "Session {}: failed to notify {}: {}",
                self.id,
                self.racers[survivor.index()],
                e
            );
        }

        self.resolved.send_replace(true);
    }

    async fn set_phase(&self, phase: SessionPhase) {
        let mut state = self.state.lock().await;
        debug!("Session {}: {:?} -> {:?}", self.id, state.phase, phase);
        state.phase = phase;
    }

    async fn close(&self, mut participants: Vec<Participant>) -> SessionReport {
        let outcome = {
            let mut state = self.state.lock().await;
            state.phase = SessionPhase::Closed;
            state.outcome.clone()
        };

        for participant in &mut participants {
            participant.return_to_waiting();
        }

        let outcome = outcome.unwrap_or_else(|| {
            error!("Session {}: closed without an outcome", self.id);
            Outcome::Aborted {
                reason: "session ended without a result".to_string(),
            }
        });

        debug!("Session {}: closed ({:?})", self.id, outcome);
        SessionReport {
            outcome,
            participants,
        }
    }
}
