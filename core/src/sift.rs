//! Named Sift API operations.
//!
//! Each operation builds its endpoint URL and delegates to `Client::send`;
//! none of them keeps state between calls.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::client::Client;
use crate::config::Config;
use crate::error::Error;
use crate::types::Response;

/// Optional flags for `Sift::track`. Set flags are copied into the event
/// body under the same names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackOptions {
    /// Ask the API to include the user's score in the response.
    pub return_score: Option<bool>,
    /// Ask the API to include triggered workflow actions in the response.
    pub return_action: Option<bool>,
}

impl TrackOptions {
    #[must_use]
    pub fn return_score(mut self, value: bool) -> Self {
        self.return_score = Some(value);
        self
    }

    #[must_use]
    pub fn return_action(mut self, value: bool) -> Self {
        self.return_action = Some(value);
        self
    }
}

/// Entry point for the Sift API.
///
/// ```no_run
/// use serde_json::json;
/// use sift_core::{Sift, TrackOptions};
///
/// let sift = Sift::new("your-api-key");
/// let response = sift.track(
///     "$create_order",
///     &json!({"$user_id": "billy_jones_301", "$amount": 115940000}),
///     TrackOptions::default().return_score(true),
/// )?;
/// println!("score: {}", response.score);
/// # Ok::<(), sift_core::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Sift {
    client: Client,
}

impl Sift {
    /// Client with the default base URL, API version and timeout.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::from_config(Config::new(api_key))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    /// See `Config::from_json`.
    pub fn from_json(bytes: &[u8]) -> Result<Self, Error> {
        Config::from_json(bytes).map(Self::from_config)
    }

    /// See `Config::from_env`.
    pub fn from_env() -> Result<Self, Error> {
        Config::from_env().map(Self::from_config)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    /// Send an event. `event` is a reserved name such as `"$create_order"`
    /// or a custom name without the `$` prefix. `properties` must serialize
    /// to a JSON object. Non-finite floats in it are sent as `null`.
    pub fn track<P>(&self, event: &str, properties: &P, options: TrackOptions) -> Result<Response, Error>
    where
        P: Serialize + ?Sized,
    {
        let params = track_params(event, to_params(properties)?, options);
        self.client.send("POST", &self.client.events_url(), params)
    }

    /// Fetch the current score for `user_id`.
    pub fn score(&self, user_id: &str) -> Result<Response, Error> {
        let url = self.client.with_api_key_query(&self.client.score_url(user_id));
        self.client.send("GET", &url, Map::new())
    }

    /// Create or replace the label on `user_id`, e.g.
    /// `{"$is_bad": true, "$reasons": ["$chargeback"]}`.
    pub fn label<P>(&self, user_id: &str, properties: &P) -> Result<Response, Error>
    where
        P: Serialize + ?Sized,
    {
        let params = to_params(properties)?;
        self.client.send("POST", &self.client.label_url(user_id), params)
    }

    /// Remove the label from `user_id`. The API answers 204 on success.
    pub fn unlabel(&self, user_id: &str) -> Result<Response, Error> {
        let url = self.client.with_api_key_query(&self.client.label_url(user_id));
        self.client.send("DELETE", &url, Map::new())
    }
}

fn track_params(event: &str, mut params: Map<String, Value>, options: TrackOptions) -> Map<String, Value> {
    params.insert("$type".to_string(), Value::String(event.to_string()));
    if let Some(score) = options.return_score {
        params.insert("return_score".to_string(), Value::Bool(score));
    }
    if let Some(action) = options.return_action {
        params.insert("return_action".to_string(), Value::Bool(action));
    }
    params
}

/// Serialize caller properties into request params.
///
/// `serde_json` has no representation for NaN or infinity and writes them as
/// `null`; the API then sees the field as unset.
fn to_params<P>(properties: &P) -> Result<Map<String, Value>, Error>
where
    P: Serialize + ?Sized,
{
    match serde_json::to_value(properties).map_err(Error::Serialization)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Serialization(<serde_json::Error as serde::ser::Error>::custom(
            format!("properties must serialize to a JSON object, got {other}"),
        ))),
    }
}
