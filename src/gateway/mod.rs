#![expect(
    clippy::module_name_repetitions,
    reason = "Re-exported names intentionally match their modules for API clarity"
)]

//! Gateway session: a resumable WebSocket connection that delivers typed events.
//!
//! **Feature flag:** `gateway` (enabled by default)
//!
//! # Architecture
//!
//! - [`codec`]: decodes text frames into [`Envelope`]s
//! - [`Session`]: the connection lifecycle as a state machine, free of I/O
//! - [`EventDispatchTable`]: routes events to handlers on a worker task
//! - [`ReconnectSupervisor`]: paces reconnects and enforces the attempt budget
//! - [`Gateway`]: the handle that ties them together in one background task
//!
//! Heartbeats are WebSocket pings sent at the interval the server announces in its welcome.
//! Two intervals without any inbound traffic count as a dead transport. After a drop the
//! session reconnects with the id of the last event it saw, and the server replays what was
//! missed before acknowledging the resume.
//!
//! # Example
//!
//! ```rust,no_run
//! use futures::StreamExt as _;
//! use guilded_client_sdk::gateway::{Config, Gateway};
//! use guilded_client_sdk::models::ChatMessageCreated;
//! use guilded_client_sdk::{Endpoints, Token};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gateway = Gateway::new(&Endpoints::default(), Token::from("gapi_..."), Config::default());
//!     let mut messages = Box::pin(gateway.events().stream::<ChatMessageCreated>());
//!
//!     gateway.connect()?;
//!     while let Some(event) = messages.next().await {
//!         println!("{:?}", event.message.content);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
mod connection;
pub mod dispatch;
pub mod error;
pub mod session;
pub mod supervisor;

pub use client::Gateway;
pub use codec::{Envelope, Opcode, decode};
pub use config::{Config, ReconnectConfig};
pub use connection::LAST_MESSAGE_ID_HEADER;
pub use dispatch::{Event, EventDispatchTable, RawEvent, SubscriptionId, WILDCARD};
pub use error::{DecodeError, GatewayError};
pub use session::{ConnectionState, Session, SessionContext};
pub use supervisor::ReconnectSupervisor;
