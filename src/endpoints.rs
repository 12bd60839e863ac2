use url::Url;

use crate::Result;

/// Default REST API base.
pub const DEFAULT_REST_URL: &str = "https://www.guilded.gg/api/v1/";

/// Default gateway endpoint.
pub const DEFAULT_GATEWAY_URL: &str = "wss://www.guilded.gg/websocket/v1";

/// Where the REST client and the gateway connect to.
///
/// Built once and passed to [`crate::rest::Client`] and [`crate::gateway::Gateway`]; nothing in
/// the crate reads endpoints from global state.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Base URL every REST path is joined onto. Always ends with `/`.
    pub rest: Url,
    /// WebSocket URL for the gateway.
    pub gateway: Url,
}

impl Endpoints {
    /// Creates endpoints from custom URLs, e.g. a local mock server.
    ///
    /// A trailing `/` is appended to `rest` when missing so relative paths join underneath it.
    pub fn new(rest: &str, gateway: &str) -> Result<Self> {
        let rest = if rest.ends_with('/') {
            Url::parse(rest)?
        } else {
            Url::parse(&format!("{rest}/"))?
        };

        Ok(Self {
            rest,
            gateway: Url::parse(gateway)?,
        })
    }
}

impl Default for Endpoints {
    /// The production endpoints.
    ///
    /// # Panics
    ///
    /// Only if [`DEFAULT_REST_URL`] or [`DEFAULT_GATEWAY_URL`] were not valid URLs, which
    /// `default_endpoints_should_succeed` rules out.
    fn default() -> Self {
        Self::new(DEFAULT_REST_URL, DEFAULT_GATEWAY_URL)
            .expect("default endpoints are valid URLs")
    }
}
