//! Starts a session for every matched pair and requeues racers afterwards

use crate::config::ServerConfig;
use crate::passage::PassageSource;
use crate::registry::{MatchDispatcher, MatchedPair, RegistryHandle};
use crate::session::{self, Outcome, SessionReport};
use log::{debug, warn};
use std::time::Duration;

/// Dispatches matched pairs onto their own tasks
///
/// Holds a registry handle so finished racers can rejoin the pool. Because
/// the registry in turn owns its launcher, the registry only stops on an
/// explicit shutdown command.
///
/// Racers from an aborted match wait `abort_backoff` before rejoining, so a
/// passage source that keeps failing does not re-abort them every sweep.
#[derive(Debug, Clone)]
pub struct SessionLauncher {
    registry: RegistryHandle,
    passages: PassageSource,
    start_delay: Duration,
    abort_backoff: Duration,
}

impl SessionLauncher {
    pub fn new(registry: RegistryHandle, config: &ServerConfig) -> Self {
        Self {
            registry,
            passages: config.passages.clone(),
            start_delay: config.start_delay,
            abort_backoff: config.abort_backoff,
        }
    }
}

impl MatchDispatcher for SessionLauncher {
    fn dispatch(&self, pair: MatchedPair) {
        let launcher = self.clone();
        tokio::spawn(async move {
            let report = session::start(pair, &launcher.passages, launcher.start_delay).await;
            if let Outcome::Aborted { reason } = &report.outcome {
                warn!(
                    "Match aborted ({}), requeueing racers in {}ms",
                    reason,
                    launcher.abort_backoff.as_millis()
                );
                tokio::time::sleep(launcher.abort_backoff).await;
            }
            requeue(&launcher.registry, report);
        });
    }
}

/// Returns connected racers to the waiting pool and retires the rest
///
/// Returns how many racers were requeued.
pub fn requeue(registry: &RegistryHandle, report: SessionReport) -> usize {
    let mut requeued = 0;

    for mut participant in report.participants {
        if !participant.is_connected() {
            debug!("Retiring {}, connection closed", participant.id());
            participant.retire();
            continue;
        }

        let id = participant.id().clone();
        match registry.add(participant) {
            Ok(()) => requeued += 1,
            Err(e) => warn!("Could not requeue {}: {}", id, e),
        }
    }

    requeued
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::{Connection, ConnectionPeer, Participant, ParticipantId};
    use crate::registry::{Registry, RegistryCommand};
    use shared::{ClientMessage, GameResult, ServerMessage};
    use tokio::time::timeout;

    fn participant(id: &str) -> (Participant, ConnectionPeer) {
        let (connection, peer) = Connection::channel();
        (Participant::new(id.into(), id, connection), peer)
    }

    async fn next(peer: &mut ConnectionPeer) -> ServerMessage {
        timeout(Duration::from_secs(2), peer.recv())
            .await
            .expect("message should arrive")
            .expect("connection should stay open")
    }

    fn start_server(passages: PassageSource) -> RegistryHandle {
        start_server_with_backoff(passages, Duration::ZERO)
    }

    fn start_server_with_backoff(passages: PassageSource, backoff: Duration) -> RegistryHandle {
        let config = ServerConfig::new()
            .with_sweep_interval(Duration::from_millis(10))
            .with_start_delay(Duration::ZERO)
            .with_passages(passages)
            .with_abort_backoff(backoff);
        let (handle, commands) = RegistryHandle::channel();
        let launcher = SessionLauncher::new(handle.clone(), &config);
        tokio::spawn(Registry::new(commands, launcher, config.sweep_interval).run());
        handle
    }

    #[tokio::test]
    async fn test_requeue_skips_closed_connections() {
        let (handle, mut commands) = RegistryHandle::channel();
        let (open, _open_peer) = participant("open");
        let (closed, closed_peer) = participant("closed");
        drop(closed_peer);

        let report = SessionReport {
            outcome: Outcome::Forfeit {
                disconnected: "closed".into(),
            },
            participants: vec![open, closed],
        };

        assert_eq!(requeue(&handle, report), 1);
        match commands.try_recv() {
            Ok(RegistryCommand::Add(p)) => assert_eq!(p.id().as_str(), "open"),
            other => panic!("Unexpected command: {:?}", other),
        }
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_racers_play_again_after_a_match() {
        let registry = start_server(PassageSource::inline("short text"));
        let (a, mut a_peer) = participant("a");
        let (b, mut b_peer) = participant("b");
        registry.add(a).unwrap();
        registry.add(b).unwrap();

        assert!(matches!(next(&mut a_peer).await, ServerMessage::GameStart { .. }));
        assert!(matches!(next(&mut b_peer).await, ServerMessage::GameStart { .. }));

        let finish = ClientMessage::Progress {
            characters_typed: 10,
            wpm: 72.0,
        };
        a_peer.send_text(finish.to_json().unwrap()).unwrap();

        assert!(matches!(
            next(&mut a_peer).await,
            ServerMessage::GameOver {
                result: GameResult::Win,
                ..
            }
        ));
        assert_eq!(next(&mut b_peer).await, ServerMessage::OpponentWpm { wpm: 72.0 });
        assert!(matches!(
            next(&mut b_peer).await,
            ServerMessage::GameOver {
                result: GameResult::Lose,
                ..
            }
        ));

        // Both are requeued and paired again
        assert!(matches!(next(&mut a_peer).await, ServerMessage::GameStart { .. }));
        assert!(matches!(next(&mut b_peer).await, ServerMessage::GameStart { .. }));
    }

    #[tokio::test]
    async fn test_abandoned_racer_is_not_requeued() {
        let registry = start_server(PassageSource::inline("short text"));
        let (a, mut a_peer) = participant("a");
        let (b, mut b_peer) = participant("b");
        registry.add(a).unwrap();
        registry.add(b).unwrap();

        assert!(matches!(next(&mut a_peer).await, ServerMessage::GameStart { .. }));
        assert!(matches!(next(&mut b_peer).await, ServerMessage::GameStart { .. }));
        drop(b_peer);

        assert_eq!(next(&mut a_peer).await, ServerMessage::OpponentDisconnected);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            registry.snapshot().await.unwrap(),
            vec![ParticipantId::from("a")]
        );
    }

    #[tokio::test]
    async fn test_aborted_match_returns_both_to_pool() {
        let registry = start_server(PassageSource::file("missing/passage.txt"));
        let (a, mut a_peer) = participant("a");
        let (b, mut b_peer) = participant("b");
        registry.add(a).unwrap();
        registry.add(b).unwrap();

        assert!(matches!(next(&mut a_peer).await, ServerMessage::MatchAborted { .. }));
        assert!(matches!(next(&mut b_peer).await, ServerMessage::MatchAborted { .. }));

        // Still no passage, so they keep being matched and aborted rather than lost
        assert!(matches!(next(&mut a_peer).await, ServerMessage::MatchAborted { .. }));
        registry.shutdown().unwrap();
    }

    #[tokio::test]
    async fn test_aborted_racers_back_off_before_rematch() {
        let backoff = Duration::from_millis(300);
        let registry = start_server_with_backoff(PassageSource::file("missing/passage.txt"), backoff);
        let (a, mut a_peer) = participant("a");
        let (b, mut b_peer) = participant("b");
        registry.add(a).unwrap();
        registry.add(b).unwrap();

        assert!(matches!(next(&mut a_peer).await, ServerMessage::MatchAborted { .. }));
        assert!(matches!(next(&mut b_peer).await, ServerMessage::MatchAborted { .. }));
        let first_abort = tokio::time::Instant::now();

        // Out of the pool while backing off
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.snapshot().await.unwrap().is_empty());
        assert!(a_peer.drain().is_empty());

        assert!(matches!(next(&mut a_peer).await, ServerMessage::MatchAborted { .. }));
        assert!(first_abort.elapsed() >= backoff - Duration::from_millis(50));
        registry.shutdown().unwrap();
    }
}
