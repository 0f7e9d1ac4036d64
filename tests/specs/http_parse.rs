// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP response parsing into gobj events.

use serde_json::json;
use yn_core::event::EVF_OUTPUT_EVENT;
use yn_core::gclass::GClassBuilder;
use yn_core::gobj::{Gobj, Runtime};
use yn_core::kw::{Kw, KwMap};
use yn_http::{GhttpParser, HttpParserType};

const EV_ON_MESSAGE: &str = "EV_ON_MESSAGE";

const RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 13\r\n\r\n{\"ok\":true}\r\n";

fn ac_on_message(rt: &mut Runtime, gobj: Gobj, _ev: &str, kw: Kw, _src: Gobj) -> i32 {
    rt.incr_stat(gobj, "messages", 1);
    let history = rt.read_user_data(gobj, "history").unwrap_or_else(|| json!([]));
    let mut history = history.as_array().cloned().unwrap_or_default();
    history.push(serde_json::Value::Object(kw.data));
    rt.write_user_data(gobj, "history", serde_json::Value::Array(history));
    0
}

fn client_runtime() -> (Runtime, Gobj) {
    let mut rt = Runtime::start_up();
    rt.register_gclass(
        GClassBuilder::new("C_HTTP_CLI")
            .ev_action("ST_CONNECTED", EV_ON_MESSAGE, Some(ac_on_message), None)
            .event_type(EV_ON_MESSAGE, EVF_OUTPUT_EVENT),
    )
    .unwrap();
    let owner = rt.create_yuno("client", "C_HTTP_CLI", KwMap::new()).unwrap();
    (rt, owner)
}

#[test]
fn response_parse_emits_one_message_event() {
    let (mut rt, owner) = client_runtime();
    let mut parser = GhttpParser::new(owner, HttpParserType::Response, EV_ON_MESSAGE, true);

    let consumed = parser.received(&mut rt, RESPONSE).unwrap();
    assert_eq!(consumed, RESPONSE.len());
    assert_eq!(rt.read_stat(owner, "messages"), 1);

    let history = rt.read_user_data(owner, "history").unwrap();
    let kw = &history[0];
    assert_eq!(kw["response_status_code"], json!(200));
    assert_eq!(kw["headers"]["CONTENT-TYPE"], json!("application/json"));
    assert_eq!(kw["headers"]["CONTENT-LENGTH"], json!("13"));
    assert_eq!(kw["body"], json!({"ok": true}));
}

#[test]
fn second_identical_feed_emits_second_identical_event() {
    let (mut rt, owner) = client_runtime();
    let mut parser = GhttpParser::new(owner, HttpParserType::Response, EV_ON_MESSAGE, true);

    parser.received(&mut rt, RESPONSE).unwrap();
    parser.received(&mut rt, RESPONSE).unwrap();
    assert_eq!(rt.read_stat(owner, "messages"), 2);

    let history = rt.read_user_data(owner, "history").unwrap();
    assert_eq!(history[0], history[1]);
}

#[test]
fn fragmented_feed_still_completes() {
    let (mut rt, owner) = client_runtime();
    let mut parser = GhttpParser::new(owner, HttpParserType::Response, EV_ON_MESSAGE, true);

    let (a, b) = RESPONSE.split_at(20);
    parser.received(&mut rt, a).unwrap();
    assert_eq!(rt.read_stat(owner, "messages"), 0);
    parser.received(&mut rt, b).unwrap();
    assert_eq!(rt.read_stat(owner, "messages"), 1);
}

#[test]
fn parse_failure_emits_nothing() {
    let (mut rt, owner) = client_runtime();
    let mut parser = GhttpParser::new(owner, HttpParserType::Response, EV_ON_MESSAGE, true);
    assert!(parser.received(&mut rt, b"bogus bytes\r\n\r\n").is_err());
    assert_eq!(rt.read_stat(owner, "messages"), 0);
}
