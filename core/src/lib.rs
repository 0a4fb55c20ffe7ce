//! Synchronous client for the Sift Science fraud-scoring API.
//!
//! # Overview
//! `Sift` exposes the four API operations (track an event, fetch a score,
//! label and unlabel a user). Each one is a single blocking HTTP call made
//! through `Client`, which owns the `Config` and turns the reply into a
//! `Response`.
//!
//! # Design
//! - Composition is explicit: `Sift` holds a `Client`, `Client` holds a
//!   `Config`. Config is reached through `Sift::client_mut`.
//! - Defaults are resolved when a `Config` is built; reads never mutate it.
//! - `Client::send` is split into `build_request`, an ureq round-trip and
//!   `parse_response`, so request construction and response classification
//!   are testable without a network.
//! - Failures that happen after a response arrived (`Error::Decode`,
//!   `Error::Api`) carry that response.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod sift;
pub mod types;

pub use client::Client;
pub use config::Config;
pub use error::Error;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use sift::{Sift, TrackOptions};
pub use types::{describe_status, Action, Label, Reason, Response, Trigger};
