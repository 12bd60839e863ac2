//! Connection lifecycle of one gateway session, without any I/O.
//!
//! [`Session`] is fed what happened (transport opened, envelope received, heartbeat due,
//! transport lost, ...) and answers with what the driver must do next. Only the supervisor task
//! owns a `Session`, so every transition is applied by a single writer.
//!
//! ```text
//! Disconnected -> Connecting -> AwaitingWelcome --(op 1)--> Active
//!                                                          |   ^
//!                                  transport lost / 2 missed heartbeats
//!                                                          v   |(op 2)
//!                                                         Resuming
//! Active | Resuming | AwaitingWelcome --(close, violation, exhausted)--> Closed
//! ```

use std::time::Duration;

use tokio::time::Instant;

use super::codec::{Envelope, Opcode};
use super::error::GatewayError;

/// Consecutive heartbeat intervals without any inbound traffic after which the transport is
/// considered dead.
pub const MAX_MISSED_HEARTBEATS: u32 = 2;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum ConnectionState {
    /// Not connected, no replay position worth resuming from
    Disconnected,
    /// Opening a fresh transport
    Connecting,
    /// Transport open, waiting for the server's welcome
    AwaitingWelcome,
    /// Welcomed; events flow and heartbeats run
    Active,
    /// Transport lost; reconnecting with the last resume token until the server acknowledges
    Resuming,
    /// Terminal. A new session is required to connect again.
    Closed,
}

impl ConnectionState {
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Per-session bookkeeping that survives reconnects.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// Announced by the first welcome and fixed for the rest of the session
    pub heartbeat_interval: Option<Duration>,
    /// Id of the last event seen, sent back on reconnect to request a replay
    pub last_resume_token: Option<String>,
    /// Consecutive connection cycles that failed to become (or stay) active
    pub attempt_count: u32,
}

/// What the driver must do with an envelope it just fed to the session.
#[non_exhaustive]
#[derive(Debug)]
pub enum Step {
    /// Nothing more to do
    Continue,
    /// Hand the envelope to the dispatch table
    Dispatch,
    /// The server refused to resume: drop the transport and connect fresh
    Restart,
    /// The session is now closed
    Close(GatewayError),
}

/// Outcome of a heartbeat interval elapsing.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heartbeat {
    /// Send a ping
    Ping,
    /// Too many intervals passed in silence; the session moved on as if the transport dropped
    Dead,
}

/// The session state machine.
#[derive(Debug)]
pub struct Session {
    state: ConnectionState,
    context: SessionContext,
    missed_heartbeats: u32,
    resuming_since: Option<Instant>,
    /// Token presented by the current resume handshake
    presented_token: Option<String>,
    /// Whether events were replayed since that token was presented
    replayed: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            context: SessionContext::default(),
            missed_heartbeats: 0,
            resuming_since: None,
            presented_token: None,
            replayed: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Token to present on the next connection. Only a resuming session presents one.
    #[must_use]
    pub fn resume_token(&self) -> Option<&str> {
        match self.state {
            ConnectionState::Resuming => self.context.last_resume_token.as_deref(),
            _ => None,
        }
    }

    /// When a resume that has not been acknowledged by now should be abandoned.
    #[must_use]
    pub fn resume_deadline(&self, timeout: Duration) -> Option<Instant> {
        self.resuming_since.map(|since| since + timeout)
    }

    /// Starts a connection attempt.
    ///
    /// A fresh attempt moves to [`ConnectionState::Connecting`] and forgets the old replay
    /// position; a resuming session stays [`ConnectionState::Resuming`].
    pub fn connect(&mut self) -> Result<(), GatewayError> {
        match self.state {
            ConnectionState::Closed => return Err(GatewayError::SessionClosed),
            ConnectionState::Disconnected => {
                self.context.last_resume_token = None;
                self.state = ConnectionState::Connecting;
            }
            ConnectionState::Connecting
            | ConnectionState::AwaitingWelcome
            | ConnectionState::Active
            | ConnectionState::Resuming => {}
        }
        Ok(())
    }

    /// The transport handshake completed.
    pub fn transport_opened(&mut self) {
        self.missed_heartbeats = 0;
        self.replayed = false;
        self.presented_token = self.resume_token().map(ToOwned::to_owned);
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::AwaitingWelcome;
        }
    }

    /// Any inbound frame, including pings, pongs and undecodable text, proves the transport is alive.
    pub fn traffic(&mut self) {
        self.missed_heartbeats = 0;
    }

    /// Applies one decoded envelope.
    ///
    /// Event envelopes advance the resume token *before* [`Step::Dispatch`] is returned, so a
    /// subscriber failure can never lose the replay position.
    pub fn receive(&mut self, envelope: &Envelope) -> Step {
        self.traffic();

        match (self.state, envelope.opcode()) {
            (ConnectionState::Closed, _) => Step::Continue,
            (ConnectionState::Resuming, Opcode::Error) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    error = ?envelope.server_error().ok(),
                    "Resume rejected, falling back to a fresh connection"
                );
                self.fall_back_to_fresh();
                self.state = ConnectionState::Connecting;
                Step::Restart
            }
            (_, Opcode::Error) => {
                let message = envelope.server_error().map_or_else(
                    |_| "server reported an unspecified error".to_owned(),
                    |error| error.message,
                );
                self.fail(GatewayError::Server { message })
            }
            (ConnectionState::AwaitingWelcome, Opcode::Welcome) => match envelope.welcome() {
                Ok(welcome) => {
                    self.fix_heartbeat_interval(welcome.heartbeat_interval);
                    if self.context.last_resume_token.is_none() {
                        self.context.last_resume_token = welcome.last_message_id;
                    }
                    self.activate();
                    Step::Continue
                }
                Err(e) => self.fail(GatewayError::Decode(e)),
            },
            (ConnectionState::AwaitingWelcome, opcode) => {
                self.fail(GatewayError::ProtocolViolation {
                    state: ConnectionState::AwaitingWelcome,
                    opcode,
                })
            }
            (state @ (ConnectionState::Active | ConnectionState::Resuming), Opcode::Event) => {
                self.replayed |= state == ConnectionState::Resuming;
                if let Some(token) = envelope.resume_token() {
                    self.context.last_resume_token = Some(token.to_owned());
                }
                Step::Dispatch
            }
            (ConnectionState::Resuming, Opcode::Welcome) => {
                if let Ok(welcome) = envelope.welcome() {
                    self.fix_heartbeat_interval(welcome.heartbeat_interval);
                }
                Step::Continue
            }
            (ConnectionState::Resuming, Opcode::Resume) => {
                let acknowledged = envelope
                    .resume_ack()
                    .ok()
                    .and_then(|ack| ack.last_message_id);
                if !self.continues_presented_token(acknowledged.as_deref()) {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        presented = ?self.presented_token,
                        ?acknowledged,
                        "Resume acknowledged an id outside the presented token's lineage"
                    );
                }
                if let Some(token) = acknowledged {
                    self.context.last_resume_token = Some(token);
                }
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    token = ?self.context.last_resume_token,
                    "Resume acknowledged"
                );
                self.activate();
                Step::Continue
            }
            (_, _opcode) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(state = %self.state, opcode = %_opcode, "Ignoring envelope");
                Step::Continue
            }
        }
    }

    /// One heartbeat interval elapsed.
    pub fn heartbeat_due(&mut self, now: Instant) -> Heartbeat {
        self.missed_heartbeats = self.missed_heartbeats.saturating_add(1);
        if self.missed_heartbeats >= MAX_MISSED_HEARTBEATS {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                missed = self.missed_heartbeats,
                "No traffic for consecutive heartbeat intervals, treating transport as dead"
            );
            self.transport_lost(now);
            Heartbeat::Dead
        } else {
            Heartbeat::Ping
        }
    }

    /// The transport went away (closed, errored, or declared dead).
    pub fn transport_lost(&mut self, now: Instant) {
        self.missed_heartbeats = 0;
        match self.state {
            ConnectionState::Active if self.context.last_resume_token.is_some() => {
                self.state = ConnectionState::Resuming;
                self.resuming_since = Some(now);
            }
            ConnectionState::Active
            | ConnectionState::Connecting
            | ConnectionState::AwaitingWelcome => {
                self.state = ConnectionState::Disconnected;
            }
            ConnectionState::Resuming | ConnectionState::Disconnected | ConnectionState::Closed => {
            }
        }
    }

    /// No resume acknowledgement arrived in time: give up on replay.
    pub fn resume_timed_out(&mut self) {
        if self.state == ConnectionState::Resuming {
            #[cfg(feature = "tracing")]
            tracing::warn!("Resume timed out, falling back to a fresh connection");
            self.fall_back_to_fresh();
            self.state = ConnectionState::Disconnected;
        }
    }

    /// Counts a connection cycle that failed and returns the consecutive failure count.
    pub fn record_failed_attempt(&mut self) -> u32 {
        self.context.attempt_count = self.context.attempt_count.saturating_add(1);
        self.context.attempt_count
    }

    /// Explicit close. Idempotent.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
        self.resuming_since = None;
    }

    fn fail(&mut self, error: GatewayError) -> Step {
        self.close();
        Step::Close(error)
    }

    /// An acknowledged id continues the presented token when it echoes it, or when events were
    /// replayed past it on this connection.
    fn continues_presented_token(&self, acknowledged: Option<&str>) -> bool {
        match (acknowledged, self.presented_token.as_deref()) {
            (Some(acknowledged), Some(presented)) => acknowledged == presented || self.replayed,
            _ => true,
        }
    }

    fn activate(&mut self) {
        self.state = ConnectionState::Active;
        self.resuming_since = None;
        self.presented_token = None;
        self.replayed = false;
        self.context.attempt_count = 0;
    }

    fn fall_back_to_fresh(&mut self) {
        self.context.last_resume_token = None;
        self.resuming_since = None;
    }

    fn fix_heartbeat_interval(&mut self, announced: Duration) {
        match self.context.heartbeat_interval {
            None => self.context.heartbeat_interval = Some(announced),
            Some(_current) => {
                #[cfg(feature = "tracing")]
                if _current != announced {
                    tracing::debug!(
                        current = ?_current,
                        ?announced,
                        "Keeping the session's original heartbeat interval"
                    );
                }
            }
        }
    }
}
