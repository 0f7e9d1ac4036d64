// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn map(v: serde_json::Value) -> KwMap {
    match v {
        serde_json::Value::Object(m) => m,
        _ => panic!("expected object"),
    }
}

#[test]
fn getters_return_values_and_defaults() {
    let kw = map(json!({"name": "router", "retries": 3, "rate": 0.5, "on": true}));
    assert_eq!(kw_get_str(&kw, "name", "", false), "router");
    assert_eq!(kw_get_str(&kw, "missing", "dflt", false), "dflt");
    assert_eq!(kw_get_int(&kw, "retries", 0, false), 3);
    assert_eq!(kw_get_int(&kw, "missing", 7, false), 7);
    assert_eq!(kw_get_real(&kw, "rate", 0.0, false), 0.5);
    assert!(kw_get_bool(&kw, "on", false, false));
}

#[test]
fn type_mismatch_yields_default() {
    let kw = map(json!({"retries": "three"}));
    assert_eq!(kw_get_int(&kw, "retries", -1, false), -1);
}

#[test]
fn merge_overwrites_and_adds() {
    let mut dst = map(json!({"a": 1, "b": 2}));
    let src = map(json!({"b": 20, "c": 30}));
    kw_merge(&mut dst, &src);
    assert_eq!(serde_json::Value::Object(dst), json!({"a": 1, "b": 20, "c": 30}));
}

#[test]
fn delete_keys_ignores_missing() {
    let mut kw = map(json!({"secret": "s", "payload": 1}));
    kw_delete_keys(&mut kw, &["secret".to_string(), "ghost".to_string()]);
    assert_eq!(serde_json::Value::Object(kw), json!({"payload": 1}));
}

#[test]
fn match_simple_all_keys_must_equal() {
    let kw = map(json!({"channel": "A", "n": 1}));
    assert!(kw_match_simple(&kw, &map(json!({"channel": "A"}))));
    assert!(kw_match_simple(&kw, &map(json!({"channel": "A", "n": 1}))));
    assert!(!kw_match_simple(&kw, &map(json!({"channel": "B"}))));
    assert!(!kw_match_simple(&kw, &map(json!({"missing": 1}))));
}

#[test]
fn match_simple_list_is_alternatives() {
    let kw = map(json!({"channel": "B"}));
    assert!(kw_match_simple(&kw, &map(json!({"channel": ["A", "B"]}))));
    assert!(!kw_match_simple(&kw, &map(json!({"channel": ["X", "Y"]}))));
}

#[test]
fn empty_filter_matches_everything() {
    let kw = map(json!({"anything": 1}));
    assert!(kw_match_simple(&kw, &KwMap::new()));
}

#[test]
#[serial_test::serial(mem_gauge)]
fn kw_carries_gbuf_rider() {
    let gbuf = crate::gbuf::GBuffer::create(16, 16).unwrap();
    gbuf.append(b"PING\n");
    let mut kw = Kw::from_map(map(json!({"n": 1}))).with_gbuf(gbuf);
    let taken = kw.take_gbuf().unwrap();
    assert_eq!(taken.leftbytes(), 5);
    assert!(kw.take_gbuf().is_none());
    assert_eq!(kw.data.len(), 1);
}
