use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 100;
pub const DEFAULT_START_DELAY_SECS: u64 = 3;
pub const CHARS_PER_WORD: f64 = 5.0;

/// Messages pushed from the server to a connected racer.
///
/// Encoded as one JSON object per text frame, discriminated by `type`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    GameStart {
        text: String,
        start_at: u64,
        text_length: usize,
    },
    OpponentWpm {
        wpm: f64,
    },
    OpponentDisconnected,
    GameOver {
        result: GameResult,
        your_wpm: f64,
        opponent_wpm: f64,
    },
    MatchAborted {
        reason: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    Win,
    Lose,
}

/// Messages a racer sends to the server.
///
/// Unknown `type` values decode as [`ClientMessage::Other`] and are ignored
/// by the server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Progress {
        #[serde(deserialize_with = "whole_characters")]
        characters_typed: u64,
        wpm: f64,
    },
    #[serde(other)]
    Other,
}

impl ClientMessage {
    /// Decodes a text frame, returning `None` for anything malformed.
    ///
    /// A progress report with a negative or non-finite WPM counts as malformed.
    pub fn parse(text: &str) -> Option<Self> {
        let message: ClientMessage = serde_json::from_str(text).ok()?;
        match message {
            ClientMessage::Progress { wpm, .. } if !wpm.is_finite() || wpm < 0.0 => None,
            message => Some(message),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// Any non-negative JSON number, truncated toward zero
fn whole_characters<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let count = f64::deserialize(deserializer)?;
    if !count.is_finite() || count < 0.0 {
        return Err(D::Error::custom(format!(
            "invalid character count {}",
            count
        )));
    }
    Ok(count.trunc() as u64)
}

impl ServerMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Standard typing speed: five characters make one word.
pub fn words_per_minute(characters: u64, elapsed: Duration) -> f64 {
    let minutes = elapsed.as_secs_f64() / 60.0;
    if minutes <= 0.0 {
        return 0.0;
    }
    (characters as f64 / CHARS_PER_WORD) / minutes
}

// Seconds since the unix epoch
pub fn unix_timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use serde_json::{json, Value};

    fn as_value(message: &ServerMessage) -> Value {
        serde_json::from_str(&message.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_game_start_wire_shape() {
        let message = ServerMessage::GameStart {
            text: "the quick brown fox".to_string(),
            start_at: 1_700_000_003,
            text_length: 19,
        };

        assert_eq!(
            as_value(&message),
            json!({
                "type": "game_start",
                "text": "the quick brown fox",
                "start_at": 1_700_000_003u64,
                "text_length": 19
            })
        );
    }

    #[test]
    fn test_game_over_wire_shape() {
        let message = ServerMessage::GameOver {
            result: GameResult::Lose,
            your_wpm: 0.0,
            opponent_wpm: 80.0,
        };

        assert_eq!(
            as_value(&message),
            json!({"type": "game_over", "result": "lose", "your_wpm": 0.0, "opponent_wpm": 80.0})
        );
    }

    #[test]
    fn test_notice_wire_shapes() {
        assert_eq!(
            as_value(&ServerMessage::OpponentDisconnected),
            json!({"type": "opponent_disconnected"})
        );
        assert_eq!(
            as_value(&ServerMessage::OpponentWpm { wpm: 42.5 }),
            json!({"type": "opponent_wpm", "wpm": 42.5})
        );
        assert_eq!(
            as_value(&ServerMessage::MatchAborted {
                reason: "no passage".to_string()
            }),
            json!({"type": "match_aborted", "reason": "no passage"})
        );
    }

    #[test]
    fn test_parse_progress() {
        let message = ClientMessage::parse(r#"{"type":"progress","characters_typed":12,"wpm":61.5}"#);

        match message {
            Some(ClientMessage::Progress {
                characters_typed,
                wpm,
            }) => {
                assert_eq!(characters_typed, 12);
                assert_approx_eq!(wpm, 61.5);
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_parse_integer_wpm() {
        let message = ClientMessage::parse(r#"{"type":"progress","characters_typed":50,"wpm":80}"#);
        assert_eq!(
            message,
            Some(ClientMessage::Progress {
                characters_typed: 50,
                wpm: 80.0
            })
        );
    }

    #[test]
    fn test_parse_fractional_characters_typed() {
        let accepted = [
            (r#"{"type":"progress","characters_typed":50.0,"wpm":80}"#, 50),
            (r#"{"type":"progress","characters_typed":3.5,"wpm":10}"#, 3),
            (r#"{"type":"progress","characters_typed":0.9,"wpm":10}"#, 0),
            (r#"{"type":"progress","characters_typed":1e2,"wpm":10}"#, 100),
        ];

        for (text, expected) in accepted {
            match ClientMessage::parse(text) {
                Some(ClientMessage::Progress {
                    characters_typed, ..
                }) => assert_eq!(characters_typed, expected, "Parsing {}", text),
                other => panic!("Should accept {}: {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_parse_unknown_type_is_other() {
        let message = ClientMessage::parse(r#"{"type":"identify","name":"ada"}"#);
        assert_eq!(message, Some(ClientMessage::Other));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let malformed = [
            "",
            "not json",
            r#"{"characters_typed":3,"wpm":10}"#,
            r#"{"type":"progress","wpm":10}"#,
            r#"{"type":"progress","characters_typed":"3","wpm":10}"#,
            r#"{"type":"progress","characters_typed":-3,"wpm":10}"#,
            r#"{"type":"progress","characters_typed":-0.5,"wpm":10}"#,
            r#"{"type":"progress","characters_typed":3,"wpm":-1}"#,
            r#"{"type":"progress","characters_typed":3}"#,
        ];

        for text in malformed {
            assert_eq!(ClientMessage::parse(text), None, "Should reject: {}", text);
        }
    }

    #[test]
    fn test_progress_serializes_with_tag() {
        let json = ClientMessage::Progress {
            characters_typed: 7,
            wpm: 30.0,
        }
        .to_json()
        .unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["type"], "progress");
        assert_eq!(value["characters_typed"], 7);
    }

    #[test]
    fn test_words_per_minute() {
        // 300 characters in one minute is 60 words
        assert_approx_eq!(words_per_minute(300, Duration::from_secs(60)), 60.0);
        assert_approx_eq!(words_per_minute(50, Duration::from_secs(10)), 60.0);
        assert_eq!(words_per_minute(100, Duration::ZERO), 0.0);
    }

    #[test]
    fn test_unix_timestamp_is_recent() {
        // 2023-01-01
        assert!(unix_timestamp_secs() > 1_672_531_200);
    }
}
