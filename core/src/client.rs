//! HTTP transport for the Sift API.
//!
//! # Design
//! `Client` owns the `Config` and performs exactly one HTTP round-trip per
//! `send`. The call is split into three steps so the I/O boundary stays
//! explicit: `build_request` produces an `HttpRequest`, `execute` runs it
//! through ureq, and `parse_response` turns the `HttpResponse` into a
//! `Response` or an error. A fresh ureq agent is built per call so
//! configuration changes between calls (notably the timeout) always apply.

use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::{Map, Value};

use crate::config::Config;
use crate::error::Error;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{Response, NO_CONTENT_STATUS_CODES};

/// Body field the API reads the key from on POST and DELETE.
pub const API_KEY_FIELD: &str = "$api_key";

/// Characters escaped in a path segment such as a user id.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const QUERY_VALUE: &AsciiSet = &PATH_SEGMENT.add(b'&').add(b'=').add(b'+');

/// Synchronous transport client for the Sift API.
#[derive(Debug, Clone)]
pub struct Client {
    config: Config,
}

impl Client {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_base_url(&mut self, url: impl Into<String>) {
        self.config.set_base_url(url);
    }

    pub fn set_api_key(&mut self, key: impl Into<String>) {
        self.config.set_api_key(key);
    }

    pub fn set_api_version(&mut self, version: u32) {
        self.config.set_api_version(version);
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.set_timeout(timeout);
    }

    pub fn user_agent(&self) -> String {
        self.config.user_agent()
    }

    /// `"<base_url>/v<api_version>/<suffix>"`, using the defaults for an
    /// unset base URL or version.
    pub fn build_endpoint_url(&self, suffix: &str) -> String {
        format!(
            "{}/v{}/{}",
            self.config.effective_base_url(),
            self.config.effective_api_version(),
            suffix
        )
    }

    pub fn events_url(&self) -> String {
        self.build_endpoint_url("events")
    }

    pub fn score_url(&self, user_id: &str) -> String {
        self.build_endpoint_url(&format!("score/{}", encode_segment(user_id)))
    }

    pub fn label_url(&self, user_id: &str) -> String {
        self.build_endpoint_url(&format!("users/{}/labels", encode_segment(user_id)))
    }

    /// Append the API key as the `api_key` query parameter.
    pub fn with_api_key_query(&self, url: &str) -> String {
        let separator = if url.contains('?') { '&' } else { '?' };
        format!(
            "{url}{separator}api_key={}",
            utf8_percent_encode(self.config.api_key(), QUERY_VALUE)
        )
    }

    /// Build the request `send` would issue, without touching the network.
    ///
    /// Non-GET requests get the API key injected under `$api_key` and carry
    /// `params` as a JSON body. GET requests carry no body; the caller must
    /// already have put everything, key included, into `url`.
    pub fn build_request(
        &self,
        method: &str,
        url: &str,
        mut params: Map<String, Value>,
    ) -> Result<HttpRequest, Error> {
        let method: HttpMethod = method.parse()?;

        let body = if method.carries_body() {
            params.insert(
                API_KEY_FIELD.to_string(),
                Value::String(self.config.api_key().to_string()),
            );
            Some(serde_json::to_string(&params).map_err(Error::Serialization)?)
        } else {
            None
        };

        Ok(HttpRequest {
            method,
            url: url.to_string(),
            headers: vec![
                ("User-Agent".to_string(), self.user_agent()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body,
        })
    }

    /// Issue one request and classify the response.
    ///
    /// Returns `Ok` for 204 and 304 without decoding the body, and for any
    /// other code whose decoded `status` is 0. See `Error` for the failure
    /// cases and which of them carry the response.
    pub fn send(
        &self,
        method: &str,
        url: &str,
        params: Map<String, Value>,
    ) -> Result<Response, Error> {
        let request = self.build_request(method, url, params)?;
        let response = self.execute(request)?;
        self.parse_response(response)
    }

    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(self.config.timeout()))
            .build()
            .new_agent();

        tracing::debug!(
            method = %request.method,
            url = %strip_query(&request.url),
            "sending sift request"
        );

        let headers = &request.headers;
        let url = request.url.as_str();
        let mut response = match (request.method, request.body) {
            (HttpMethod::Get, _) => with_headers(agent.get(url), headers).call(),
            (HttpMethod::Post, Some(body)) => {
                with_headers(agent.post(url), headers).send(body.as_bytes())
            }
            (HttpMethod::Post, None) => with_headers(agent.post(url), headers).send_empty(),
            (HttpMethod::Delete, Some(body)) => with_headers(agent.delete(url), headers)
                .force_send_body()
                .send(body.as_bytes()),
            (HttpMethod::Delete, None) => with_headers(agent.delete(url), headers).call(),
        }?;

        let status = response.status();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        // Invalid UTF-8 is replaced, not rejected; decoding reports it.
        let body = response.body_mut().read_to_vec()?;
        let body = String::from_utf8_lossy(&body).into_owned();

        let response = HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        };
        tracing::debug!(
            status = %response.status_line(),
            bytes = response.body.len(),
            "received sift response"
        );
        tracing::trace!(headers = ?response.headers, body = %response.body);
        Ok(response)
    }

    /// Classify a raw HTTP response.
    pub fn parse_response(&self, response: HttpResponse) -> Result<Response, Error> {
        let transport = Response {
            http_status: response.status_line(),
            http_status_code: response.status,
            http_headers: response.headers,
            http_body: response.body,
            ..Response::default()
        };

        if NO_CONTENT_STATUS_CODES.contains(&transport.http_status_code) {
            return Ok(transport);
        }

        let decoded: Response = match serde_json::from_str(&transport.http_body) {
            Ok(decoded) => decoded,
            Err(source) => {
                return Err(Error::Decode {
                    response: Box::new(transport),
                    source,
                })
            }
        };
        let response = Response {
            http_status: transport.http_status,
            http_status_code: transport.http_status_code,
            http_headers: transport.http_headers,
            http_body: transport.http_body,
            ..decoded
        };

        if !response.is_ok() {
            // Empty when the API omits it; the status table is not consulted.
            let message = response.error_message.clone();
            return Err(Error::Api {
                response: Box::new(response),
                message,
            });
        }
        Ok(response)
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Drop the query string so the API key never reaches the logs.
fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(path, _)| path)
}
