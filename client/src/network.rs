use crate::game::TypingRace;
use crate::Error;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{unix_timestamp_secs, GameResult, ServerMessage};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TYPING_TICK: Duration = Duration::from_millis(200);

/// How a finished round ended for this client
#[derive(Debug, Clone, PartialEq)]
pub enum RoundSummary {
    Won { your_wpm: f64, opponent_wpm: f64 },
    Lost { your_wpm: f64, opponent_wpm: f64 },
    OpponentLeft,
    Aborted(String),
}

/// Racing bot settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub name: String,
    pub target_wpm: f64,
    /// Random per-tick speed variation, as a fraction of the target speed
    pub jitter: f64,
    /// Rounds to play before disconnecting; 0 plays forever
    pub rounds: usize,
}

impl ClientConfig {
    /// Server URL with the display name form-encoded into the query
    pub fn connect_url(&self) -> Result<String, Error> {
        let query = serde_urlencoded::to_string([("name", self.name.trim())])?;
        Ok(format!("{}/?{}", self.server_url.trim_end_matches('/'), query))
    }
}

pub struct Client {
    config: ClientConfig,
    race: Option<TypingRace>,
    rounds: Vec<RoundSummary>,
    rng: StdRng,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Client {
            config,
            race: None,
            rounds: Vec::new(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn current_race(&self) -> Option<&TypingRace> {
        self.race.as_ref()
    }

    pub fn rounds(&self) -> &[RoundSummary] {
        &self.rounds
    }

    /// True once the configured number of rounds has been played
    pub fn is_done(&self) -> bool {
        self.config.rounds > 0 && self.rounds.len() >= self.config.rounds
    }

    /// Connects, races until done or disconnected, and returns every round played
    pub async fn run(mut self) -> Result<Vec<RoundSummary>, Error> {
        let url = self.config.connect_url()?;
        info!("Connecting to {}", url);

        let (ws, _) = connect_async(url.as_str()).await?;
        let (mut sink, mut stream) = ws.split();
        info!("Connected as {}, waiting for an opponent", self.config.name);

        let mut typing_interval = interval(TYPING_TICK);
        typing_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.is_done() {
            tokio::select! {
                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => match ServerMessage::from_json(&text) {
                            Ok(message) => self.handle_message(message),
                            Err(e) => warn!("Ignoring malformed server message: {}", e),
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Server closed the connection");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                },

                _ = typing_interval.tick() => {
                    if let Some(report) = self.type_for(TYPING_TICK, unix_timestamp_secs()) {
                        sink.send(Message::Text(report)).await?;
                    }
                },
            }
        }

        let _ = sink.send(Message::Close(None)).await;
        info!("Played {} round(s)", self.rounds.len());

        Ok(self.rounds)
    }

    /// Advances the current race and returns the progress frame to send
    fn type_for(&mut self, dt: Duration, now_unix_secs: u64) -> Option<String> {
        let race = self.race.as_mut()?;
        if !race.has_started(now_unix_secs) {
            return None;
        }

        let jitter = self.config.jitter.clamp(0.0, 1.0);
        let speed_factor = if jitter > 0.0 {
            self.rng.gen_range(1.0 - jitter..=1.0 + jitter)
        } else {
            1.0
        };

        let report = race.tick(dt, speed_factor)?;
        match report.to_json() {
            Ok(json) => Some(json),
            Err(e) => {
                warn!("Could not encode progress: {}", e);
                None
            }
        }
    }

    pub fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::GameStart {
                text,
                start_at,
                text_length,
            } => {
                info!(
                    "Race starting at {}: {} characters, \"{}\"",
                    start_at,
                    text_length,
                    preview(&text)
                );
                self.race = Some(TypingRace::new(text_length, start_at, self.config.target_wpm));
            }
            ServerMessage::OpponentWpm { wpm } => {
                debug!("Opponent at {:.1} wpm", wpm);
                if let Some(race) = self.race.as_mut() {
                    race.opponent_wpm = wpm;
                }
            }
            ServerMessage::GameOver {
                result,
                your_wpm,
                opponent_wpm,
            } => {
                let summary = match result {
                    GameResult::Win => RoundSummary::Won {
                        your_wpm,
                        opponent_wpm,
                    },
                    GameResult::Lose => RoundSummary::Lost {
                        your_wpm,
                        opponent_wpm,
                    },
                };
                info!(
                    "Game over: {:?} ({:.1} wpm vs {:.1} wpm)",
                    result, your_wpm, opponent_wpm
                );
                self.finish_round(summary);
            }
            ServerMessage::OpponentDisconnected => {
                info!("Opponent disconnected, waiting for a new match");
                self.finish_round(RoundSummary::OpponentLeft);
            }
            ServerMessage::MatchAborted { reason } => {
                warn!("Match aborted: {}", reason);
                self.finish_round(RoundSummary::Aborted(reason));
            }
        }
    }

    fn finish_round(&mut self, summary: RoundSummary) {
        self.race = None;
        self.rounds.push(summary);
    }
}

fn preview(text: &str) -> String {
    const PREVIEW_CHARS: usize = 40;
    if text.chars().count() <= PREVIEW_CHARS {
        text.to_string()
    } else {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    }
}
