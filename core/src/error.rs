//! Error types for the Sift client.
//!
//! # Design
//! Errors split into two tiers. `UnsupportedMethod`, `Serialization` and
//! `Transport` happen before a response exists. `Decode` and `Api` carry the
//! partially or fully populated `Response` so callers can still inspect the
//! HTTP status code and headers of a failed call.

use thiserror::Error;

use crate::types::Response;

/// Errors returned by `Client` and `Sift` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP verb is outside the set the API accepts. No request was sent.
    #[error("method {0} is not supported by the Sift API")]
    UnsupportedMethod(String),

    /// The request parameters could not be encoded as a JSON object.
    #[error("failed to serialize request parameters: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Connection failure, timeout, or a body that could not be read.
    #[error("transport error: {0}")]
    Transport(#[from] ureq::Error),

    /// The body of a non-empty response was not valid JSON for `Response`.
    /// Transport fields of `response` are populated, decoded fields are not.
    #[error("failed to decode response body: {source}")]
    Decode {
        response: Box<Response>,
        #[source]
        source: serde_json::Error,
    },

    /// The response decoded but the API reported failure. `message` is the
    /// API's `error_message` verbatim and may be empty.
    #[error("{message}")]
    Api {
        response: Box<Response>,
        message: String,
    },

    /// Malformed configuration blob or environment.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// The response attached to `Decode` and `Api` errors.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Decode { response, .. } | Self::Api { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Decode { response, .. } | Self::Api { response, .. } => Some(*response),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_api_error(&self) -> bool {
        matches!(self, Self::Api { .. })
    }

    /// The API-level status code if this is an API error.
    pub fn api_status(&self) -> Option<i64> {
        match self {
            Self::Api { response, .. } => Some(response.status),
            _ => None,
        }
    }
}
