#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

const DEFAULT_RESUME_TIMEOUT_DURATION: Duration = Duration::from_secs(15);
const DEFAULT_HANDSHAKE_TIMEOUT_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Configuration for gateway session behavior.
///
/// The heartbeat interval is not configurable: the server announces it in its welcome.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// How long a resume may take, counted from losing the transport, before the session gives
    /// up on replay and starts fresh
    pub resume_timeout: Duration,
    /// Maximum time between starting a connection and receiving its first envelope
    pub handshake_timeout: Duration,
    /// Reconnection strategy configuration
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resume_timeout: DEFAULT_RESUME_TIMEOUT_DURATION,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT_DURATION,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive failed reconnection attempts before the session closes
    /// with a terminal error. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Initial backoff duration for first reconnection attempt
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_RECONNECT_ATTEMPTS),
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl From<ReconnectConfig> for ExponentialBackoff {
    fn from(config: ReconnectConfig) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_max_interval(config.max_backoff)
            .with_multiplier(config.backoff_multiplier)
            .with_max_elapsed_time(None) // Attempts are capped by the supervisor
            .build()
    }
}

#[cfg(test)]
mod tests {
    use backoff::backoff::Backoff as _;

    use super::*;

    #[test]
    fn first_backoff_is_near_initial() {
        let mut backoff: ExponentialBackoff = ReconnectConfig::default().into();

        let first = backoff.next_backoff().expect("no elapsed-time limit");
        assert!(first >= Duration::from_millis(500) && first <= Duration::from_millis(1500));
    }

    #[test]
    fn backoff_respects_cap() {
        let config = ReconnectConfig {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 3.0,
            max_attempts: None,
        };
        let mut backoff: ExponentialBackoff = config.into();

        for _ in 0..10 {
            let _next = backoff.next_backoff();
        }

        // Capped at max_backoff, plus up to 50% randomization
        let duration = backoff.next_backoff().expect("no elapsed-time limit");
        assert!(duration <= Duration::from_secs(3));
    }

    #[test]
    fn default_budget_is_finite() {
        assert_eq!(
            Config::default().reconnect.max_attempts,
            Some(DEFAULT_MAX_RECONNECT_ATTEMPTS)
        );
    }
}
