//! REST client with typed failure mapping and opt-in rate-limit back-off.
//!
//! **Feature flag:** `rest` (enabled by default)
//!
//! Every non-2xx response is turned into exactly one [`Failure`](crate::error::Failure)
//! by [`error_mapper::map`]. Only [`Failure::TooManyRequests`](crate::error::Failure) is ever
//! retried, and only when the [`Config`] opts into it; see [`RateLimitPolicy`].
//!
//! There is no limiter shared across requests: concurrent callers that hit a `429` each wait
//! and retry on their own.
//!
//! # Example
//!
//! ```no_run
//! use guilded_client_sdk::{Endpoints, Token};
//! use guilded_client_sdk::error::Failure;
//! use guilded_client_sdk::rest::{Client, Config};
//! use guilded_client_sdk::types::Value;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::builder().auto_retry(true).max_attempts(3).build();
//! let client = Client::new(&Endpoints::default(), &Token::from("gapi_..."), config)?;
//!
//! match client.get::<Value>("channels/00000000-0000-0000-0000-000000000000").await {
//!     Ok(channel) => println!("{channel}"),
//!     Err(e) => match e.failure() {
//!         Some(Failure::ResourceNotFound(details)) => println!("gone: {}", details.message),
//!         _ => return Err(e.into()),
//!     },
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error_mapper;
pub mod rate_limit;

pub use client::{Client, Config};
pub use error_mapper::ErrorBody;
pub use rate_limit::{Decision, RateLimitPolicy};
