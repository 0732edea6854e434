//! Simulated typist used by the racing client

use shared::{words_per_minute, ClientMessage, CHARS_PER_WORD};
use std::time::Duration;

/// Local state of one race as seen by this client
#[derive(Debug, Clone)]
pub struct TypingRace {
    pub text_length: u64,
    pub start_at: u64,
    pub target_wpm: f64,
    pub characters_typed: u64,
    pub opponent_wpm: f64,
    typed_exact: f64,
    elapsed: Duration,
}

impl TypingRace {
    pub fn new(text_length: usize, start_at: u64, target_wpm: f64) -> Self {
        Self {
            text_length: text_length as u64,
            start_at,
            target_wpm: target_wpm.max(0.0),
            characters_typed: 0,
            opponent_wpm: 0.0,
            typed_exact: 0.0,
            elapsed: Duration::ZERO,
        }
    }

    /// The server's start time is advisory; the client holds off until then
    pub fn has_started(&self, now_unix_secs: u64) -> bool {
        now_unix_secs >= self.start_at
    }

    pub fn is_finished(&self) -> bool {
        self.characters_typed >= self.text_length
    }

    pub fn current_wpm(&self) -> f64 {
        words_per_minute(self.characters_typed, self.elapsed)
    }

    /// Types for `dt` at the target speed scaled by `speed_factor`
    ///
    /// Returns the progress report to send, or `None` once the passage is done.
    pub fn tick(&mut self, dt: Duration, speed_factor: f64) -> Option<ClientMessage> {
        if self.is_finished() {
            return None;
        }

        let chars_per_sec = self.target_wpm * CHARS_PER_WORD / 60.0;
        self.typed_exact += chars_per_sec * dt.as_secs_f64() * speed_factor.max(0.0);
        self.elapsed += dt;
        self.characters_typed = (self.typed_exact.floor() as u64).min(self.text_length);

        Some(ClientMessage::Progress {
            characters_typed: self.characters_typed,
            wpm: self.current_wpm(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_race_creation() {
        let race = TypingRace::new(120, 1_000, 60.0);
        assert_eq!(race.text_length, 120);
        assert_eq!(race.characters_typed, 0);
        assert!(!race.is_finished());
        assert_eq!(race.current_wpm(), 0.0);
    }

    #[test]
    fn test_start_time() {
        let race = TypingRace::new(10, 1_000, 60.0);
        assert!(!race.has_started(999));
        assert!(race.has_started(1_000));
        assert!(race.has_started(1_001));
    }

    #[test]
    fn test_tick_types_at_target_speed() {
        // 60 wpm is 5 characters per second
        let mut race = TypingRace::new(1_000, 0, 60.0);

        let report = race.tick(Duration::from_secs(2), 1.0);

        match report {
            Some(ClientMessage::Progress {
                characters_typed,
                wpm,
            }) => {
                assert_eq!(characters_typed, 10);
                assert_approx_eq!(wpm, 60.0);
            }
            other => panic!("Unexpected report: {:?}", other),
        }
    }

    #[test]
    fn test_speed_factor_scales_typing() {
        let mut slow = TypingRace::new(1_000, 0, 60.0);
        let mut fast = TypingRace::new(1_000, 0, 60.0);

        slow.tick(Duration::from_secs(4), 0.5);
        fast.tick(Duration::from_secs(4), 1.5);

        assert_eq!(slow.characters_typed, 10);
        assert_eq!(fast.characters_typed, 30);
    }

    #[test]
    fn test_progress_never_exceeds_passage() {
        let mut race = TypingRace::new(25, 0, 120.0);

        let mut reports = 0;
        while race.tick(Duration::from_millis(500), 1.0).is_some() {
            reports += 1;
            assert!(race.characters_typed <= 25);
        }

        assert!(race.is_finished());
        assert_eq!(race.characters_typed, 25);
        // 10 chars per second, 5 per tick
        assert_eq!(reports, 5);
        assert!(race.tick(Duration::from_secs(1), 1.0).is_none());
    }

    #[test]
    fn test_fractional_characters_accumulate() {
        // 1 character per second, in 400ms steps
        let mut race = TypingRace::new(100, 0, 12.0);

        race.tick(Duration::from_millis(400), 1.0);
        race.tick(Duration::from_millis(400), 1.0);
        assert_eq!(race.characters_typed, 0);

        race.tick(Duration::from_millis(400), 1.0);
        assert_eq!(race.characters_typed, 1);
    }
}
