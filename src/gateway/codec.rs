//! Gateway frame decoding.
//!
//! Every text frame is one JSON object: `{"op": <u8>, "t": <event name>, "d": <data>, "s": <message id>}`.
//! `t` and `s` are only meaningful for [`Opcode::Event`] and are dropped from any other frame.

use std::fmt;
use std::time::Duration;

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_repr::{Deserialize_repr, Serialize_repr};
use serde_with::{DurationMilliSeconds, serde_as};

use super::error::DecodeError;

/// Role of a gateway frame.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Opcode {
    /// An event with data
    Event = 0,
    /// First frame of every connection, carries the heartbeat cadence
    Welcome = 1,
    /// Acknowledges that a resume has replayed everything that was missed
    Resume = 2,
    /// The server is reporting an error
    Error = 8,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} ({})", *self as u8)
    }
}

/// One decoded gateway frame. Immutable once decoded.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(rename = "op")]
    opcode: Opcode,
    #[serde(rename = "t", skip_serializing_if = "Option::is_none")]
    event_name: Option<String>,
    #[serde(rename = "d", skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(rename = "s", skip_serializing_if = "Option::is_none")]
    resume_token: Option<String>,
}

#[derive(Deserialize)]
struct Frame {
    op: Opcode,
    #[serde(default)]
    t: Option<String>,
    #[serde(default)]
    d: Option<Value>,
    #[serde(default)]
    s: Option<String>,
}

impl Envelope {
    /// An [`Opcode::Event`] envelope.
    #[must_use]
    pub fn event<S: Into<String>>(name: S, data: Value, resume_token: Option<String>) -> Self {
        Self {
            opcode: Opcode::Event,
            event_name: Some(name.into()),
            data: Some(data),
            resume_token,
        }
    }

    /// A control envelope (welcome, resume acknowledgement, error).
    #[must_use]
    pub fn control(opcode: Opcode, data: Option<Value>) -> Self {
        Self {
            opcode,
            event_name: None,
            data,
            resume_token: None,
        }
    }

    #[must_use]
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        self.event_name.as_deref()
    }

    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Id of the event this envelope carries; replay resumes after it.
    #[must_use]
    pub fn resume_token(&self) -> Option<&str> {
        self.resume_token.as_deref()
    }

    /// Parses the data of a [`Opcode::Welcome`] envelope.
    pub fn welcome(&self) -> Result<Welcome, DecodeError> {
        let welcome: Welcome = self.payload()?;
        if welcome.heartbeat_interval.is_zero() {
            return Err(DecodeError::InvalidPayload {
                opcode: self.opcode,
                source: serde_json::Error::custom("heartbeatIntervalMs must be positive"),
            });
        }
        Ok(welcome)
    }

    /// Parses the data of a [`Opcode::Resume`] envelope.
    pub fn resume_ack(&self) -> Result<ResumeAck, DecodeError> {
        match self.data {
            None | Some(Value::Null) => Ok(ResumeAck::default()),
            Some(_) => self.payload(),
        }
    }

    /// Parses the data of an [`Opcode::Error`] envelope.
    pub fn server_error(&self) -> Result<ServerError, DecodeError> {
        self.payload()
    }

    fn payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, DecodeError> {
        T::deserialize(self.data.as_ref().unwrap_or(&Value::Null)).map_err(|source| {
            DecodeError::InvalidPayload {
                opcode: self.opcode,
                source,
            }
        })
    }
}

/// Decodes one text frame into an [`Envelope`].
///
/// A [`DecodeError`] concerns this frame only; callers log it and keep reading.
pub fn decode(frame: &[u8]) -> Result<Envelope, DecodeError> {
    let Frame { op, t, d, s } = serde_json::from_slice(frame).map_err(DecodeError::Malformed)?;

    match op {
        Opcode::Event => {
            let event_name = t.ok_or(DecodeError::MissingEventName)?;
            Ok(Envelope {
                opcode: op,
                event_name: Some(event_name),
                data: d,
                resume_token: s,
            })
        }
        _ => Ok(Envelope::control(op, d)),
    }
}

/// Data of the [`Opcode::Welcome`] frame.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "heartbeatIntervalMs")]
    pub heartbeat_interval: Duration,
    /// Most recent event id, usable as the initial resume token
    #[serde(default)]
    pub last_message_id: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    /// The bot's user object
    #[serde(default)]
    pub user: Option<Value>,
}

/// Data of the [`Opcode::Resume`] frame.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeAck {
    #[serde(default)]
    pub last_message_id: Option<String>,
}

/// Data of the [`Opcode::Error`] frame.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerError {
    pub message: String,
}
