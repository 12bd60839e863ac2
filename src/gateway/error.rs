#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

use super::codec::Opcode;
use super::session::ConnectionState;
use crate::error::{Details, Error, Failure, Kind};

/// Gateway error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum GatewayError {
    /// Error connecting to or communicating with the gateway
    Connection(tokio_tungstenite::tungstenite::Error),
    /// A single frame could not be decoded. Logged and skipped by the session.
    Decode(DecodeError),
    /// The server sent something the session cannot accept in its current state
    ProtocolViolation {
        state: ConnectionState,
        opcode: Opcode,
    },
    /// The server reported an error (opcode `8`)
    Server { message: String },
    /// The reconnect budget was used up
    ReconnectExhausted { attempts: u32 },
    /// The session is closed and cannot be reused
    SessionClosed,
}

impl GatewayError {
    /// The typed failure that terminates a session with this error.
    #[must_use]
    pub fn to_failure(&self) -> Failure {
        Failure::Gateway(Details::new(None, None, self.to_string()))
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "gateway connection error: {e}"),
            Self::Decode(e) => write!(f, "{e}"),
            Self::ProtocolViolation { state, opcode } => {
                write!(f, "protocol violation: opcode {opcode} while {state}")
            }
            Self::Server { message } => write!(f, "gateway error: {message}"),
            Self::ReconnectExhausted { attempts } => {
                write!(f, "gave up reconnecting after {attempts} attempts")
            }
            Self::SessionClosed => write!(f, "gateway session is closed"),
        }
    }
}

impl StdError for GatewayError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GatewayError> for Error {
    fn from(e: GatewayError) -> Self {
        let kind = match e {
            GatewayError::Decode(_) => Kind::Decode,
            _ => Kind::Gateway,
        };
        Error::with_source(kind, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::with_source(Kind::Gateway, GatewayError::Connection(e))
    }
}

/// A frame that could not be turned into an [`Envelope`](super::Envelope).
#[non_exhaustive]
#[derive(Debug)]
pub enum DecodeError {
    /// Not JSON, not an object, missing `op`, or an unknown opcode
    Malformed(serde_json::Error),
    /// Opcode `0` without an event name
    MissingEventName,
    /// The frame's payload does not match what its opcode requires
    InvalidPayload {
        opcode: Opcode,
        source: serde_json::Error,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "malformed gateway frame: {e}"),
            Self::MissingEventName => write!(f, "event frame without an event name"),
            Self::InvalidPayload { opcode, source } => {
                write!(f, "invalid payload for opcode {opcode}: {source}")
            }
        }
    }
}

impl StdError for DecodeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Malformed(e) | Self::InvalidPayload { source: e, .. } => Some(e),
            Self::MissingEventName => None,
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        GatewayError::Decode(e).into()
    }
}
