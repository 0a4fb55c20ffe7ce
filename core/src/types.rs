//! Response DTOs for the Sift API.
//!
//! # Design
//! `Response` mixes two kinds of data: transport metadata captured from the
//! HTTP exchange and the JSON envelope the API returns. Transport fields are
//! `#[serde(skip)]` so they are neither decoded from nor written to JSON.
//! Every decoded field, nested ones included, defaults when absent or
//! `null`, matching how the API omits empty values.

use serde::{Deserialize, Deserializer, Serialize};

/// HTTP status codes whose responses carry no JSON envelope.
pub const NO_CONTENT_STATUS_CODES: [u16; 2] = [204, 304];

/// Map an API status code to its documented meaning.
pub fn describe_status(code: i64) -> Option<&'static str> {
    let message = match code {
        -4 => "Service currently unavailable. Please try again later.",
        -3 => "Server-side timeout processing request. Please try again later.",
        -2 | -1 => "Unexpected server-side error",
        0 => "Success",
        51 => "Invalid API Key. Please check your credentials and try again.",
        52 => "Invalid characters in field name",
        53 => "Invalid characters in field value",
        54 => "Specified user_id has no scoreable events",
        55 => "Missing required field",
        56 => "Invalid JSON in request",
        57 => "Invalid HTTP body",
        60 => "Rate limited; too many events have been received in a short period of time",
        104 => "Invalid API version",
        105 => "Not a valid reserved field",
        _ => return None,
    };
    Some(message)
}

/// Treat an explicit JSON `null` the same as a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A decoded API response plus the transport metadata it arrived with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Response {
    /// Status line, e.g. `"400 Bad Request"`.
    #[serde(skip)]
    pub http_status: String,
    #[serde(skip)]
    pub http_status_code: u16,
    #[serde(skip)]
    pub http_headers: Vec<(String, String)>,
    #[serde(skip)]
    pub http_body: String,

    /// API status; 0 means success.
    #[serde(deserialize_with = "nullable")]
    pub status: i64,
    #[serde(deserialize_with = "nullable")]
    pub user_id: String,
    #[serde(deserialize_with = "nullable")]
    pub error_message: String,
    #[serde(deserialize_with = "nullable")]
    pub time: i64,
    #[serde(deserialize_with = "nullable")]
    pub score: f64,
    /// Echo of the payload the API received.
    #[serde(deserialize_with = "nullable")]
    pub request: String,
    #[serde(deserialize_with = "nullable")]
    pub actions: Vec<Action>,
    #[serde(deserialize_with = "nullable")]
    pub latest_label: Label,
    #[serde(deserialize_with = "nullable")]
    pub reasons: Vec<Reason>,
}

impl Response {
    /// Whether the call succeeded.
    ///
    /// For 204 and 304 the HTTP code alone decides (only 204 is OK). For any
    /// other code the API `status` field must be 0.
    pub fn is_ok(&self) -> bool {
        if NO_CONTENT_STATUS_CODES.contains(&self.http_status_code) {
            return self.http_status_code == 204;
        }
        self.status == 0
    }

    /// Documented meaning of the API status code, if any.
    pub fn status_description(&self) -> Option<&'static str> {
        describe_status(self.status)
    }

    /// Case-insensitive lookup of a captured response header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.http_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A workflow action the API applied to a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Action {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub action: ActionRef,
    #[serde(deserialize_with = "nullable")]
    pub entity: EntityRef,
    #[serde(deserialize_with = "nullable")]
    pub time: i64,
    #[serde(deserialize_with = "nullable")]
    pub triggers: Vec<Trigger>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionRef {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityRef {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
}

/// What caused an action to fire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trigger {
    #[serde(rename = "type", deserialize_with = "nullable")]
    pub kind: String,
    #[serde(deserialize_with = "nullable")]
    pub source: String,
    #[serde(deserialize_with = "nullable")]
    pub trigger: TriggerRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerRef {
    #[serde(deserialize_with = "nullable")]
    pub id: String,
}

/// The most recent label applied to a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Label {
    #[serde(deserialize_with = "nullable")]
    pub is_bad: bool,
    #[serde(deserialize_with = "nullable")]
    pub time: i64,
    #[serde(deserialize_with = "nullable")]
    pub reasons: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub description: String,
}

/// A signal contributing to a user's score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Reason {
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    #[serde(deserialize_with = "nullable")]
    pub value: i64,
    #[serde(deserialize_with = "nullable")]
    pub details: ReasonDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonDetails {
    #[serde(deserialize_with = "nullable")]
    pub users: String,
}
