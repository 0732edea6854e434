//! Configuration for the race server

use crate::passage::PassageSource;
use shared::{DEFAULT_START_DELAY_SECS, DEFAULT_SWEEP_INTERVAL_MS};
use std::time::Duration;

/// Runtime settings for a [`Server`](crate::network::Server)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to
    pub bind_addr: String,

    /// How often the registry pairs waiting racers
    pub sweep_interval: Duration,

    /// Lead time between `game_start` and the advertised start timestamp
    pub start_delay: Duration,

    /// Where match passages come from
    pub passages: PassageSource,

    /// Pause before racers from an aborted match rejoin the pool
    pub abort_backoff: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
            start_delay: Duration::from_secs(DEFAULT_START_DELAY_SECS),
            passages: PassageSource::file("game_text.txt"),
            abort_backoff: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listener address
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Set the pairing sweep interval, never shorter than one millisecond
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set the countdown lead time announced in `game_start`
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Set the passage source
    pub fn with_passages(mut self, passages: PassageSource) -> Self {
        self.passages = passages;
        self
    }

    /// Set how long aborted racers wait before being matched again
    pub fn with_abort_backoff(mut self, backoff: Duration) -> Self {
        self.abort_backoff = backoff;
        self
    }
}
