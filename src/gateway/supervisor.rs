use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;
use reqwest::StatusCode;
use tokio::time::{Instant, sleep, timeout_at};
use tokio_tungstenite::tungstenite;
use url::Url;

use super::config::{Config, ReconnectConfig};
use super::connection::{self, Command, Disconnect, Link};
use super::error::GatewayError;
use super::session::Session;
use crate::Result;
use crate::auth::Token;
use crate::error::Error;

/// Paces reconnect attempts and enforces the attempt budget.
///
/// Attempts are counted by the [`Session`]: consecutive connection cycles that ended without
/// the session being active, reset whenever it becomes active again.
#[derive(Debug)]
pub struct ReconnectSupervisor {
    max_attempts: Option<u32>,
    backoff: ExponentialBackoff,
}

impl ReconnectSupervisor {
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff: config.into(),
        }
    }

    /// Delay before the retry that follows the `attempt`-th consecutive failure.
    ///
    /// The first failure of a streak restarts the schedule at the initial backoff. Once more
    /// than `max_attempts` failures have piled up the budget is spent and the terminal
    /// [`GatewayError::ReconnectExhausted`] is returned instead.
    pub fn next_delay(&mut self, attempt: u32) -> std::result::Result<Duration, GatewayError> {
        if attempt <= 1 {
            self.backoff.reset();
        }

        if let Some(max) = self.max_attempts
            && attempt > max
        {
            return Err(GatewayError::ReconnectExhausted { attempts: max });
        }

        Ok(self
            .backoff
            .next_backoff()
            .unwrap_or(self.backoff.max_interval))
    }
}

/// Runs a session until it closes: connects, drives each transport, and reconnects (resuming
/// where possible) until the handle closes it or a terminal error occurs.
pub(crate) async fn run(
    mut session: Session,
    mut link: Link,
    endpoint: Url,
    token: Token,
    config: Config,
) -> Result<()> {
    let mut supervisor = ReconnectSupervisor::new(config.reconnect.clone());

    let outcome = loop {
        if let Err(e) = session.connect() {
            break Err(e.into());
        }
        link.publish(&session);

        let resume_token = session.resume_token().map(str::to_owned);
        let handshake_deadline = Instant::now() + config.handshake_timeout;

        #[cfg(feature = "tracing")]
        tracing::info!(
            endpoint = %endpoint,
            resuming = resume_token.is_some(),
            attempt = session.context().attempt_count,
            "Connecting to gateway"
        );

        let opened = tokio::select! {
            opened = timeout_at(
                handshake_deadline,
                connection::open(&endpoint, &token, resume_token.as_deref()),
            ) => opened,
            command = link.commands.recv() => match command {
                Some(Command::Close) | None => break Ok(()),
            },
            () = connection::sleep_until_some(session.resume_deadline(config.resume_timeout)) => {
                session.resume_timed_out();
                continue;
            }
        };

        match opened {
            Ok(Ok(stream)) => {
                session.transport_opened();
                link.publish(&session);

                match connection::drive(stream, handshake_deadline, &mut session, &mut link, &config).await {
                    Disconnect::Requested => break Ok(()),
                    Disconnect::Fatal(e) => break Err(e.into()),
                    Disconnect::Restart | Disconnect::ResumeTimedOut => continue,
                    Disconnect::Lost => {}
                }
            }
            Ok(Err(e)) if is_rejected(&e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, "Gateway rejected the connection");
                break Err(e);
            }
            Ok(Err(e)) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Unable to connect to gateway");
                #[cfg(not(feature = "tracing"))]
                let _ = &e;
                session.transport_lost(Instant::now());
            }
            Err(_elapsed) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(timeout = ?config.handshake_timeout, "Gateway handshake timed out");
                session.transport_lost(Instant::now());
            }
        }
        link.publish(&session);

        let attempt = session.record_failed_attempt();
        let delay = match supervisor.next_delay(attempt) {
            Ok(delay) => delay,
            Err(e) => break Err(e.into()),
        };

        #[cfg(feature = "tracing")]
        tracing::info!(attempt, ?delay, state = %session.state(), "Reconnecting to gateway");

        tokio::select! {
            () = sleep(delay) => {}
            command = link.commands.recv() => match command {
                Some(Command::Close) | None => break Ok(()),
            },
        }
    };

    #[cfg(feature = "tracing")]
    match &outcome {
        Ok(()) => tracing::info!("Gateway session closed"),
        Err(e) => tracing::error!(error = %e, "Gateway session terminated"),
    }

    session.close();
    link.publish(&session);
    link.dispatch.close();

    outcome
}

/// A handshake refused for credentials will be refused again; retrying is pointless.
fn is_rejected(error: &Error) -> bool {
    matches!(
        error.downcast_ref::<GatewayError>(),
        Some(GatewayError::Connection(tungstenite::Error::Http(response)))
            if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
    )
}
