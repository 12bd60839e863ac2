#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod auth;
pub mod endpoints;
pub mod error;
#[cfg(feature = "gateway")]
pub mod gateway;
pub mod models;
#[cfg(feature = "rest")]
pub mod rest;
pub(crate) mod serde_helpers;
pub mod types;

use serde::Serialize;

pub use crate::auth::Token;
pub use crate::endpoints::Endpoints;
use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Trait for converting request types to URL query parameters.
///
/// This trait is automatically implemented for all types that implement [`Serialize`].
/// It uses [`serde_html_form`] to serialize the struct fields into a query string.
/// Arrays are serialized as repeated keys (`key=val1&key=val2`).
pub trait ToQueryParams: Serialize {
    /// Converts the request to a URL query string.
    ///
    /// Returns an empty string if no parameters are set, otherwise returns
    /// a string starting with `?` followed by URL-encoded key-value pairs.
    fn query_params(&self) -> String {
        let params = serde_html_form::to_string(self)
            .inspect_err(|e| {
                #[cfg(feature = "tracing")]
                tracing::error!("Unable to convert to URL-encoded string {e:?}");
                #[cfg(not(feature = "tracing"))]
                let _: &serde_html_form::ser::Error = e;
            })
            .unwrap_or_default();

        if params.is_empty() {
            String::new()
        } else {
            format!("?{params}")
        }
    }
}

impl<T: Serialize> ToQueryParams for T {}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::ToQueryParams as _;

    #[derive(Serialize)]
    struct MessagesQuery {
        #[serde(skip_serializing_if = "Option::is_none")]
        before: Option<String>,
        limit: u32,
        #[serde(rename = "includePrivate")]
        include_private: bool,
    }

    #[test]
    fn query_params_should_succeed() {
        let query = MessagesQuery {
            before: None,
            limit: 50,
            include_private: true,
        };

        assert_eq!(query.query_params(), "?limit=50&includePrivate=true");
    }

    #[test]
    fn empty_query_params_should_be_empty() {
        assert_eq!(().query_params(), "");
    }
}
