//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts its own mock server on a random port on a background
//! tokio runtime, then drives the blocking client over real HTTP. The server
//! state handle is kept so tests can inspect exactly what went over the wire.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::time::Duration;

use mock_server::{MockState, ScriptedResponse, DEFAULT_SCORE};
use serde_json::json;
use sift_core::{Config, Error, Sift, TrackOptions};

const KEY: &str = "A";

fn start_server(state: MockState) -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener, state).await
        })
        .unwrap();
    });

    addr
}

/// A mock server plus a client pointed at it.
fn setup() -> (MockState, Sift) {
    let state = MockState::new(KEY);
    let addr = start_server(state.clone());
    let mut config = Config::new(KEY);
    config.set_base_url(format!("http://{addr}"));
    config.set_api_version(205);
    (state, Sift::from_config(config))
}

#[test]
fn track_sends_type_flags_and_api_key() {
    let (state, sift) = setup();

    let response = sift
        .track(
            "custom_event",
            &json!({"$user_id": "u1", "hello": "world"}),
            TrackOptions::default().return_score(true).return_action(true),
        )
        .unwrap();
    assert!(response.is_ok());
    assert_eq!(response.http_status_code, 200);
    assert_eq!(response.http_status, "200 OK");
    assert_eq!(response.user_id, "u1");
    assert_eq!(response.score, DEFAULT_SCORE);
    assert!(response.header("content-type").unwrap().starts_with("application/json"));

    let requests = state.requests();
    assert_eq!(requests.len(), 1);
    let sent = &requests[0];
    assert_eq!(sent.method, "POST");
    assert_eq!(sent.path, "/v205/events");
    assert_eq!(sent.header("content-type"), Some("application/json"));
    assert_eq!(sent.header("user-agent"), Some(sift.client().user_agent().as_str()));
    assert_eq!(
        sent.json().unwrap(),
        json!({
            "$user_id": "u1",
            "hello": "world",
            "$type": "custom_event",
            "return_score": true,
            "return_action": true,
            "$api_key": KEY
        })
    );
    // The API echoes what it received.
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&response.request).unwrap(),
        sent.json().unwrap()
    );
}

#[test]
fn score_puts_api_key_in_query() {
    let (state, sift) = setup();
    state.set_score("u1", 0.93);

    let response = sift.score("u1").unwrap();
    assert_eq!(response.score, 0.93);
    assert_eq!(response.user_id, "u1");
    assert_eq!(response.reasons.len(), 1);

    let sent = &state.requests()[0];
    assert_eq!(sent.method, "GET");
    assert_eq!(sent.path, "/v205/score/u1");
    assert_eq!(sent.query.as_deref(), Some("api_key=A"));
    assert!(sent.body.is_empty());
}

#[test]
fn label_score_unlabel_round_trip() {
    let (state, sift) = setup();
    state.set_score("u1", 0.7);

    let labeled = sift
        .label(
            "u1",
            &json!({"$is_bad": true, "$reasons": ["$chargeback"], "$description": "stolen card"}),
        )
        .unwrap();
    assert!(labeled.is_ok());
    let sent = &state.requests()[0];
    assert_eq!(sent.path, "/v205/users/u1/labels");
    assert_eq!(sent.json().unwrap()["$api_key"], KEY);

    let scored = sift.score("u1").unwrap();
    assert!(scored.latest_label.is_bad);
    assert_eq!(scored.latest_label.reasons, vec!["$chargeback"]);
    assert_eq!(scored.latest_label.description, "stolen card");

    let removed = sift.unlabel("u1").unwrap();
    assert_eq!(removed.http_status_code, 204);
    assert_eq!(removed.error_message, "");
    assert!(removed.is_ok());

    let sent = &state.requests()[2];
    assert_eq!(sent.method, "DELETE");
    assert_eq!(sent.query.as_deref(), Some("api_key=A"));
    assert_eq!(sent.json().unwrap(), json!({"$api_key": KEY}));
    assert!(state.label("u1").is_none());

    let rescored = sift.score("u1").unwrap();
    assert!(!rescored.latest_label.is_bad);
}

#[test]
fn invalid_api_key_surfaces_api_error() {
    let (state, mut sift) = setup();
    sift.client_mut().set_api_key("wrong");

    let err = sift
        .track("$login", &json!({"$user_id": "u1"}), TrackOptions::default())
        .unwrap_err();
    assert!(err.is_api_error());
    assert_eq!(
        err.to_string(),
        "Invalid API Key. Please check your credentials and try again."
    );
    let response = err.response().unwrap();
    assert_eq!(response.http_status_code, 400);
    assert_eq!(response.status, 51);
    assert!(!response.is_ok());
    assert_eq!(state.requests().len(), 1);
}

#[test]
fn api_error_without_message_is_empty() {
    let (state, sift) = setup();
    state.push_response(ScriptedResponse::new(400, r#"{"status": 55}"#));

    let err = sift.label("u1", &json!({})).unwrap_err();
    assert_eq!(err.to_string(), "");
    assert_eq!(err.api_status(), Some(55));
}

#[test]
fn not_modified_is_returned_without_error() {
    let (state, sift) = setup();
    state.push_response(ScriptedResponse::new(304, ""));

    let response = sift.score("u1").unwrap();
    assert_eq!(response.http_status_code, 304);
    assert!(!response.is_ok());
}

#[test]
fn non_json_body_returns_decode_error_with_response() {
    let (state, sift) = setup();
    state.push_response(ScriptedResponse::new(502, "<html>bad gateway</html>"));

    let err = sift
        .track("$login", &json!({"$user_id": "u1"}), TrackOptions::default())
        .unwrap_err();
    let Error::Decode { response, .. } = err else {
        panic!("expected decode error");
    };
    assert_eq!(response.http_status_code, 502);
    assert_eq!(response.http_body, "<html>bad gateway</html>");
}

/// Serve exactly one raw HTTP reply, bypassing axum so the status line and
/// body bytes are under the test's control.
fn start_raw_server(status_line: &'static str, body: &'static [u8]) -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let head = format!(
            "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).unwrap();
        stream.write_all(body).unwrap();
        stream.flush().unwrap();
    });

    addr
}

#[test]
fn non_utf8_body_is_decode_error_with_status() {
    let addr = start_raw_server("502 Upstream Broke", b"\xff\xfe garbage");
    let mut config = Config::new(KEY);
    config.set_base_url(format!("http://{addr}"));
    let sift = Sift::from_config(config);

    let err = sift.score("u1").unwrap_err();
    assert!(!err.is_transport());
    let Error::Decode { response, .. } = err else {
        panic!("expected decode error");
    };
    assert_eq!(response.http_status_code, 502);
    // Canonical phrase, not the one on the wire.
    assert_eq!(response.http_status, "502 Bad Gateway");
    assert_eq!(response.http_body, "\u{fffd}\u{fffd} garbage");
}

#[test]
fn unsupported_method_sends_nothing() {
    let (state, sift) = setup();
    let client = sift.client();

    let err = client
        .send("PATCH", &client.events_url(), serde_json::Map::new())
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedMethod(_)));
    assert!(state.requests().is_empty());
}

#[test]
fn non_object_properties_fail_before_sending() {
    let (state, sift) = setup();

    let err = sift
        .track("$login", &vec!["not", "an", "object"], TrackOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
    assert!(state.requests().is_empty());
}

#[test]
fn slow_reply_times_out_as_transport_error() {
    let (state, mut sift) = setup();
    sift.client_mut().set_timeout(Duration::from_millis(200));
    state.push_response(
        ScriptedResponse::new(200, r#"{"status":0}"#).delayed(Duration::from_secs(2)),
    );

    let err = sift.score("u1").unwrap_err();
    assert!(err.is_transport());
    assert!(err.response().is_none());
}

#[test]
fn connection_refused_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = Config::new(KEY);
    config.set_base_url(format!("http://{addr}"));
    let sift = Sift::from_config(config);

    let err = sift.unlabel("u1").unwrap_err();
    assert!(err.is_transport());
}

#[test]
fn method_names_are_case_insensitive_on_the_wire() {
    let (state, sift) = setup();
    let client = sift.client();

    let url = client.with_api_key_query(&client.label_url("u1"));
    let response = client.send("delete", &url, serde_json::Map::new()).unwrap();
    assert_eq!(response.http_status_code, 204);
    assert_eq!(state.requests()[0].method, "DELETE");
}
