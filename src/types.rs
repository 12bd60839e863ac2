//! Re-exported types from external crates for convenience.
//!
//! These types appear in payloads and public signatures of this SDK and are re-exported here
//! so users don't need to add these dependencies to their `Cargo.toml`.

/// Timestamps in payloads (`createdAt`, `updatedAt`, ...).
pub use chrono::{DateTime, Utc};
/// Untyped JSON, used for opaque event data.
pub use serde_json::Value;
/// Identifier type used for messages and users.
pub use uuid::Uuid;
