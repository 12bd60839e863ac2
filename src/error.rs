use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

/// HTTP method type, re-exported for use with error inspection.
pub use reqwest::Method;
/// HTTP status code type, re-exported for use with error inspection.
pub use reqwest::StatusCode;
use reqwest::header;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// The token is missing, malformed or revoked (`401`)
    Authorization,
    /// The bot lacks a permission required for the call (`403`)
    Permission,
    /// The request was rejected as malformed (`400` / `422`)
    BadRequest,
    /// The addressed resource does not exist (`404`)
    ResourceNotFound,
    /// The call was throttled (`429`), possibly by a channel's slowmode
    TooManyRequests,
    /// Terminal gateway failure: protocol violation, server error or exhausted reconnects
    Gateway,
    /// A single gateway frame could not be decoded. Never terminal.
    Decode,
    /// A response that does not fit any known failure family
    Unknown,
    /// The caller cancelled the operation
    Cancelled,
    /// The caller-supplied deadline elapsed
    Timeout,
    /// Error related to invalid input or state within guilded-client-sdk
    Validation,
    /// Internal error from dependencies
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    #[must_use]
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            source: None,
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    /// The typed REST/gateway failure behind this error, if there is one.
    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        self.downcast_ref::<Failure>()
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Validation {
            reason: message.into(),
        }
        .into()
    }

    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(Kind::Cancelled)
    }

    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self::with_source(Kind::Timeout, Elapsed { after })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// Diagnostics carried by every [`Failure`]: the original status, error code and message.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Details {
    /// HTTP status of the response. `None` for failures raised by the gateway.
    pub status: Option<StatusCode>,
    /// Machine-readable error code from the error body, e.g. `"ForbiddenError"`
    pub code: Option<String>,
    /// Human-readable message from the error body
    pub message: String,
}

impl Details {
    #[must_use]
    pub fn new(status: Option<StatusCode>, code: Option<String>, message: String) -> Self {
        Self {
            status,
            code,
            message,
        }
    }
}

impl fmt::Display for Details {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(status) = self.status {
            write!(f, "({status}) ")?;
        }
        if let Some(code) = &self.code {
            write!(f, "{code}: ")?;
        }
        f.write_str(&self.message)
    }
}

/// Closed set of failures a REST call or a gateway session can end with.
///
/// Every variant keeps the original [`Details`] for diagnostics. The set is intentionally
/// exhaustive so callers can `match` on it without a catch-all arm.
#[expect(
    clippy::exhaustive_enums,
    reason = "The failure taxonomy is closed so callers can match exhaustively"
)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Authorization(Details),
    Permission(Details),
    BadRequest(Details),
    ResourceNotFound(Details),
    TooManyRequests {
        details: Details,
        /// How long the server asked us to wait before trying again
        wait: Duration,
        /// Whether the throttle comes from the channel's slowmode rather than the API limiter
        is_slowmode: bool,
    },
    Gateway(Details),
    /// Never assumed recoverable
    Unknown(Details),
}

impl Failure {
    #[must_use]
    pub fn details(&self) -> &Details {
        match self {
            Self::Authorization(details)
            | Self::Permission(details)
            | Self::BadRequest(details)
            | Self::ResourceNotFound(details)
            | Self::TooManyRequests { details, .. }
            | Self::Gateway(details)
            | Self::Unknown(details) => details,
        }
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::Authorization(_) => Kind::Authorization,
            Self::Permission(_) => Kind::Permission,
            Self::BadRequest(_) => Kind::BadRequest,
            Self::ResourceNotFound(_) => Kind::ResourceNotFound,
            Self::TooManyRequests { .. } => Kind::TooManyRequests,
            Self::Gateway(_) => Kind::Gateway,
            Self::Unknown(_) => Kind::Unknown,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.details().message
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyRequests {
                details,
                wait,
                is_slowmode,
            } => write!(
                f,
                "too many requests, retry after {wait:?} (slowmode: {is_slowmode}): {details}"
            ),
            other => write!(f, "{:?} failure: {}", other.kind(), other.details()),
        }
    }
}

impl StdError for Failure {}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        Error::with_source(failure.kind(), failure)
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct Validation {
    pub reason: String,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid: {}", self.reason)
    }
}

impl StdError for Validation {}

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct Elapsed {
    pub after: Duration,
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deadline of {:?} elapsed", self.after)
    }
}

impl StdError for Elapsed {}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<header::InvalidHeaderValue> for Error {
    fn from(e: header::InvalidHeaderValue) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(message: &str) -> Details {
        Details::new(
            Some(StatusCode::FORBIDDEN),
            Some("ForbiddenError".to_owned()),
            message.to_owned(),
        )
    }

    #[test]
    fn failure_into_error_keeps_kind_and_details() {
        let error: Error = Failure::Permission(details("Missing permission")).into();

        assert_eq!(error.kind(), Kind::Permission);
        let failure = error.failure().expect("failure should be recoverable");
        assert_eq!(failure.message(), "Missing permission");
        assert_eq!(failure.details().status, Some(StatusCode::FORBIDDEN));
    }

    #[test]
    fn too_many_requests_display_should_succeed() {
        let failure = Failure::TooManyRequests {
            details: Details::new(
                Some(StatusCode::TOO_MANY_REQUESTS),
                Some("TooManyRequests".to_owned()),
                "Slow down".to_owned(),
            ),
            wait: Duration::from_millis(1500),
            is_slowmode: true,
        };

        assert_eq!(
            failure.to_string(),
            "too many requests, retry after 1.5s (slowmode: true): (429 Too Many Requests) TooManyRequests: Slow down"
        );
    }

    #[test]
    fn gateway_details_display_without_status() {
        let details = Details::new(None, None, "Invalid token".to_owned());
        assert_eq!(details.to_string(), "Invalid token");
    }

    #[test]
    fn cancelled_error_has_no_failure() {
        let error = Error::cancelled();
        assert_eq!(error.kind(), Kind::Cancelled);
        assert!(error.failure().is_none());
        assert_eq!(error.to_string(), "Cancelled");
    }
}
