use std::future::Future;
use std::time::Duration;

use bon::Builder;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client as ReqwestClient, Method, Request};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::error_mapper::{self, ErrorBody};
use super::rate_limit::{Decision, RateLimitPolicy};
use crate::auth::Token;
use crate::endpoints::Endpoints;
use crate::error::{Error, Failure};
use crate::{Result, ToQueryParams as _, serde_helpers};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_USER_AGENT: &str = "guilded-client-sdk";

/// Behaviour of a [`Client`].
#[derive(Clone, Debug, Builder)]
pub struct Config {
    /// Retry `429` responses after the wait the server asks for. Off by default: throttling is
    /// surfaced to the caller as [`Failure::TooManyRequests`].
    #[builder(default)]
    auto_retry: bool,
    /// Upper bound on attempts per call when `auto_retry` is on, the first attempt included.
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    max_attempts: u32,
    /// Deadline for a whole call, back-off sleeps included.
    timeout: Option<Duration>,
    #[builder(into, default = DEFAULT_USER_AGENT.to_owned())]
    user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Config {
    #[must_use]
    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(self.auto_retry, self.max_attempts)
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// HTTP client for the REST API.
///
/// Requests and responses are any `serde` models; failures come back as [`Error`]s whose
/// [`Error::failure`] is the mapped [`Failure`]. Cloning is cheap and shares the connection pool.
#[derive(Clone, Debug)]
pub struct Client {
    host: Url,
    client: ReqwestClient,
    config: Config,
}

impl Client {
    /// Creates a client authenticated with `token` against `endpoints.rest`.
    pub fn new(endpoints: &Endpoints, token: &Token, config: Config) -> Result<Self> {
        let mut headers = HeaderMap::new();

        headers.insert(AUTHORIZATION, token.bearer()?);
        headers.insert(USER_AGENT, HeaderValue::from_str(&config.user_agent)?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = ReqwestClient::builder().default_headers(headers).build()?;

        Ok(Self {
            host: endpoints.rest.clone(),
            client,
            config,
        })
    }

    /// Returns the base URL of the API.
    #[must_use]
    pub fn host(&self) -> &Url {
        &self.host
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.host.join(path.trim_start_matches('/'))?)
    }

    pub async fn get<Res: DeserializeOwned>(&self, path: &str) -> Result<Res> {
        let request = self.client.request(Method::GET, self.url(path)?).build()?;
        self.execute(request, None).await
    }

    pub async fn get_with_query<Query: Serialize, Res: DeserializeOwned>(
        &self,
        path: &str,
        query: &Query,
    ) -> Result<Res> {
        let url = format!("{}{}", self.url(path)?, query.query_params());
        let request = self.client.request(Method::GET, url).build()?;
        self.execute(request, None).await
    }

    pub async fn post<Req: Serialize, Res: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Res> {
        self.send_json(Method::POST, path, body).await
    }

    pub async fn put<Req: Serialize, Res: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Res> {
        self.send_json(Method::PUT, path, body).await
    }

    pub async fn patch<Req: Serialize, Res: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Res> {
        self.send_json(Method::PATCH, path, body).await
    }

    pub async fn delete<Res: DeserializeOwned>(&self, path: &str) -> Result<Res> {
        let request = self
            .client
            .request(Method::DELETE, self.url(path)?)
            .build()?;
        self.execute(request, None).await
    }

    async fn send_json<Req: Serialize, Res: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &Req,
    ) -> Result<Res> {
        let request = self
            .client
            .request(method, self.url(path)?)
            .json(body)
            .build()?;
        self.execute(request, None).await
    }

    /// Sends a prepared request, applying the configured timeout and rate-limit policy.
    ///
    /// When `cancellation` fires the call returns [`Kind::Cancelled`](crate::error::Kind)
    /// straight away, also while waiting out a `429`: cancellation always beats back-off.
    pub async fn execute<Res: DeserializeOwned>(
        &self,
        request: Request,
        cancellation: Option<&CancellationToken>,
    ) -> Result<Res> {
        let call = self.execute_with_retries(request, cancellation);

        match self.config.timeout {
            Some(after) => tokio::time::timeout(after, call)
                .await
                .map_err(|_elapsed| Error::timeout(after))?,
            None => call.await,
        }
    }

    async fn execute_with_retries<Res: DeserializeOwned>(
        &self,
        request: Request,
        cancellation: Option<&CancellationToken>,
    ) -> Result<Res> {
        let policy = self.config.rate_limit_policy();
        let mut attempts = 0_u32;

        loop {
            let attempt = request
                .try_clone()
                .ok_or_else(|| Error::validation("streaming request bodies cannot be sent"))?;
            attempts = attempts.saturating_add(1);

            let failure = match cancellable(send(&self.client, attempt), cancellation).await?? {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };

            match policy.decide(&failure, attempts) {
                Decision::Retry { after } => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        method = %request.method(),
                        path = request.url().path(),
                        attempts,
                        ?after,
                        "Request throttled, retrying"
                    );
                    cancellable(tokio::time::sleep(after), cancellation).await?;
                }
                Decision::Propagate => return Err(failure.into()),
            }
        }
    }
}

/// Runs `future` unless `cancellation` fires first.
async fn cancellable<F: Future>(
    future: F,
    cancellation: Option<&CancellationToken>,
) -> Result<F::Output> {
    match cancellation {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => Err(Error::cancelled()),
            output = future => Ok(output),
        },
        None => Ok(future.await),
    }
}

/// One round trip. Transport and decoding problems are `Err`, a non-2xx response is `Ok(Err)`.
#[cfg_attr(
    feature = "tracing",
    tracing::instrument(
        level = "debug",
        skip(client, request),
        fields(
            method = %request.method(),
            path = request.url().path(),
            status_code
        )
    )
)]
async fn send<Res: DeserializeOwned>(
    client: &ReqwestClient,
    request: Request,
) -> Result<std::result::Result<Res, Failure>> {
    let response = client.execute(request).await?;
    let status_code = response.status();

    #[cfg(feature = "tracing")]
    tracing::Span::current().record("status_code", status_code.as_u16());

    if !status_code.is_success() {
        let headers = response.headers().clone();
        let text = response.text().await.unwrap_or_default();
        let failure = error_mapper::map(status_code, ErrorBody::from_response(&text, &headers));

        #[cfg(feature = "tracing")]
        tracing::warn!(status = %status_code, failure = %failure, "API request failed");

        return Ok(Err(failure));
    }

    let bytes = response.bytes().await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };

    Ok(Ok(serde_helpers::deserialize_with_warnings(value)?))
}
