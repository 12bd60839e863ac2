//! Translation of non-successful REST responses into [`Failure`]s.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{Details, Failure};

/// Wait used for a `429` that says nothing about when to come back.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Error code the API uses for throttled calls.
pub const TOO_MANY_REQUESTS_CODE: &str = "TooManyRequests";

/// Body of a failed REST response.
///
/// `retryAfter` (milliseconds) and `isSlowmode` only appear on `429` responses. Both are also
/// accepted inside the `meta` object.
///
/// Fields are read one at a time, so a field of an unexpected type is skipped without losing
/// the others. `retryAfter` may be an integer, a float or a numeric string.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorBody {
    pub code: Option<String>,
    pub message: String,
    pub retry_after: Option<u64>,
    pub is_slowmode: Option<bool>,
    pub meta: Option<Value>,
}

impl<'de> Deserialize<'de> for ErrorBody {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_value(Value::deserialize(deserializer)?))
    }
}

impl ErrorBody {
    #[must_use]
    pub fn new(code: Option<String>, message: String) -> Self {
        Self {
            code,
            message,
            ..Self::default()
        }
    }

    /// Builds the body from a raw response.
    ///
    /// Non-JSON bodies become the message verbatim. A `Retry-After` header (whole seconds) is
    /// used when the body carries no `retryAfter` of its own.
    #[must_use]
    pub fn from_response(text: &str, headers: &HeaderMap) -> Self {
        let mut body = match serde_json::from_str::<Value>(text) {
            Ok(value @ Value::Object(_)) => Self::from_value(value),
            _ => Self::new(None, text.trim().to_owned()),
        };

        if body.retry_after_ms().is_none() {
            body.retry_after = headers
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(|seconds| seconds.saturating_mul(1000));
        }

        body
    }

    /// Reads a JSON error body. A bare string becomes the message; other non-objects carry nothing.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let mut fields = match value {
            Value::Object(fields) => fields,
            Value::String(message) => return Self::new(None, message),
            _ => return Self::default(),
        };

        let code = fields.remove("code").and_then(|code| match code {
            Value::String(code) => Some(code),
            Value::Number(code) => Some(code.to_string()),
            _ => None,
        });
        let message = match fields.remove("message") {
            Some(Value::String(message)) => message,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        Self {
            code,
            message,
            retry_after: fields.get("retryAfter").and_then(millis),
            is_slowmode: fields.get("isSlowmode").and_then(flag),
            meta: fields.remove("meta").filter(|meta| !meta.is_null()),
        }
    }

    fn meta_field(&self, name: &str) -> Option<&Value> {
        self.meta.as_ref()?.get(name)
    }

    fn retry_after_ms(&self) -> Option<u64> {
        self.retry_after
            .or_else(|| millis(self.meta_field("retryAfter")?))
    }

    fn slowmode(&self) -> bool {
        self.is_slowmode
            .or_else(|| flag(self.meta_field("isSlowmode")?))
            .unwrap_or(false)
    }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "Negative, non-finite and fractional waits are rejected or rounded before the cast"
)]
fn millis(value: &Value) -> Option<u64> {
    let from_float = |ms: f64| (ms.is_finite() && ms >= 0.0).then(|| ms.ceil() as u64);

    match value {
        Value::Number(ms) => ms.as_u64().or_else(|| from_float(ms.as_f64()?)),
        Value::String(ms) => {
            let ms = ms.trim();
            ms.parse::<u64>()
                .ok()
                .or_else(|| from_float(ms.parse::<f64>().ok()?))
        }
        _ => None,
    }
}

fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(flag) => flag.trim().parse::<bool>().ok(),
        _ => None,
    }
}

/// Maps a response status and its error body to exactly one [`Failure`].
///
/// | status | failure |
/// |---|---|
/// | `401` | [`Failure::Authorization`] |
/// | `403` | [`Failure::Permission`] |
/// | `400`, `422` | [`Failure::BadRequest`] |
/// | `404` | [`Failure::ResourceNotFound`] |
/// | `429` | [`Failure::TooManyRequests`] |
/// | anything else | [`Failure::Unknown`] |
///
/// Pure and total: the same input always yields the same failure and no status is dropped.
#[must_use]
pub fn map(status: StatusCode, body: ErrorBody) -> Failure {
    let wait = body
        .retry_after_ms()
        .map_or(DEFAULT_RETRY_AFTER, Duration::from_millis);
    let is_slowmode = body.slowmode()
        && body
            .code
            .as_deref()
            .is_none_or(|code| code == TOO_MANY_REQUESTS_CODE);

    let message = if body.message.is_empty() {
        status.canonical_reason().unwrap_or_default().to_owned()
    } else {
        body.message
    };
    let details = Details::new(Some(status), body.code, message);

    match status {
        StatusCode::UNAUTHORIZED => Failure::Authorization(details),
        StatusCode::FORBIDDEN => Failure::Permission(details),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Failure::BadRequest(details),
        StatusCode::NOT_FOUND => Failure::ResourceNotFound(details),
        StatusCode::TOO_MANY_REQUESTS => Failure::TooManyRequests {
            details,
            wait,
            is_slowmode,
        },
        _ => Failure::Unknown(details),
    }
}
