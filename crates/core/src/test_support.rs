// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for runtime tests: a small connection-like gclass with
//! observable actions, and kw helpers.

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]

use crate::event::{EVF_NO_WARN_SUBS, EVF_OUTPUT_EVENT};
use crate::gclass::{mt, GClassBuilder, GobjMethods};
use crate::gobj::{Gobj, Runtime};
use crate::kw::{Kw, KwMap};

pub const C_SAMPLE: &str = "C_SAMPLE";
pub const C_PLAYER: &str = "C_PLAYER";

pub const ST_IDLE: &str = "ST_IDLE";
pub const ST_CONNECTED: &str = "ST_CONNECTED";

pub const EV_CONNECT: &str = "EV_CONNECT";
pub const EV_DISCONNECT: &str = "EV_DISCONNECT";
pub const EV_ON_MESSAGE: &str = "EV_ON_MESSAGE";
pub const EV_ON_OPEN: &str = "EV_ON_OPEN";
pub const EV_SILENT: &str = "EV_SILENT";

pub fn kwmap(v: serde_json::Value) -> KwMap {
    match v {
        serde_json::Value::Object(m) => m,
        _ => KwMap::new(),
    }
}

fn ac_connect(rt: &mut Runtime, gobj: Gobj, _event: &str, _kw: Kw, _src: Gobj) -> i32 {
    rt.incr_stat(gobj, "connects", 1);
    0
}

fn ac_disconnect(rt: &mut Runtime, gobj: Gobj, _event: &str, _kw: Kw, _src: Gobj) -> i32 {
    rt.incr_stat(gobj, "disconnects", 1);
    0
}

fn ac_on_message(rt: &mut Runtime, gobj: Gobj, _event: &str, kw: Kw, _src: Gobj) -> i32 {
    rt.incr_stat(gobj, "rx_msgs", 1);
    rt.write_user_data(gobj, "last_kw", serde_json::Value::Object(kw.data));
    // a gobj with user_data own_messages=true consumes the event
    if rt.read_user_data(gobj, "own_messages").and_then(|v| v.as_bool()) == Some(true) {
        return -1;
    }
    0
}

fn ac_state_probe(rt: &mut Runtime, gobj: Gobj, _event: &str, _kw: Kw, _src: Gobj) -> i32 {
    // record the states observed at action entry
    rt.write_user_data(
        gobj,
        "state_at_entry",
        serde_json::Value::String(rt.current_state(gobj)),
    );
    rt.write_user_data(
        gobj,
        "last_state_at_entry",
        serde_json::Value::String(rt.last_state(gobj)),
    );
    0
}

/// The standard test gclass: IDLE/CONNECTED with an OUTPUT message event.
pub fn sample_gclass() -> GClassBuilder {
    GClassBuilder::new(C_SAMPLE)
        .ev_action(ST_IDLE, EV_CONNECT, Some(ac_connect), Some(ST_CONNECTED))
        .ev_action(ST_IDLE, EV_ON_OPEN, Some(ac_state_probe), Some(ST_CONNECTED))
        .ev_action(ST_CONNECTED, EV_DISCONNECT, Some(ac_disconnect), Some(ST_IDLE))
        .ev_action(ST_CONNECTED, EV_ON_MESSAGE, Some(ac_on_message), None)
        .event_type(EV_ON_MESSAGE, EVF_OUTPUT_EVENT)
        .event_type(EV_SILENT, EVF_OUTPUT_EVENT | EVF_NO_WARN_SUBS)
        .trace_level("messages", "Trace messages")
        .trace_level("connections", "Trace connections")
}

/// Method table that records lifecycle hook invocations as stats.
pub struct PlayerMethods;

impl GobjMethods for PlayerMethods {
    fn defined(&self) -> u32 {
        mt::PLAY | mt::PAUSE | mt::WRITING
    }

    fn mt_create(&self, rt: &mut Runtime, gobj: Gobj) {
        rt.incr_stat(gobj, "mt_create", 1);
    }

    fn mt_start(&self, rt: &mut Runtime, gobj: Gobj) -> Result<(), crate::error::GobjError> {
        rt.incr_stat(gobj, "mt_start", 1);
        Ok(())
    }

    fn mt_stop(&self, rt: &mut Runtime, gobj: Gobj) -> Result<(), crate::error::GobjError> {
        rt.incr_stat(gobj, "mt_stop", 1);
        Ok(())
    }

    fn mt_play(&self, rt: &mut Runtime, gobj: Gobj) -> Result<(), crate::error::GobjError> {
        rt.incr_stat(gobj, "mt_play", 1);
        Ok(())
    }

    fn mt_pause(&self, rt: &mut Runtime, gobj: Gobj) -> Result<(), crate::error::GobjError> {
        rt.incr_stat(gobj, "mt_pause", 1);
        Ok(())
    }

    fn mt_writing(&self, rt: &mut Runtime, gobj: Gobj, name: &str) {
        rt.incr_stat(gobj, &format!("wrote_{name}"), 1);
    }
}

/// A gclass with lifecycle hooks and a writable/required attribute set.
pub fn player_gclass() -> GClassBuilder {
    use crate::attr::{SdataDesc, ATTR_RD, ATTR_REQUIRED, ATTR_VOLATIL, ATTR_WR};
    GClassBuilder::new(C_PLAYER)
        .state(ST_IDLE)
        .methods(PlayerMethods)
        .attrs(vec![
            SdataDesc::str("url", ATTR_RD | ATTR_WR | ATTR_REQUIRED, "", "Peer url"),
            SdataDesc::int("timeout", ATTR_RD | ATTR_WR, "5000", "Timeout ms"),
            SdataDesc::int("tries", ATTR_RD | ATTR_WR | ATTR_VOLATIL, "0", "Tries this run"),
        ])
}

/// A runtime with both fixture gclasses registered and a yuno created.
pub fn runtime_with_yuno() -> (Runtime, Gobj) {
    let mut rt = Runtime::start_up();
    rt.register_gclass(sample_gclass()).unwrap_or_else(|e| panic!("register: {e}"));
    rt.register_gclass(player_gclass()).unwrap_or_else(|e| panic!("register: {e}"));
    let yuno = rt
        .create_yuno("yuno", C_SAMPLE, KwMap::new())
        .unwrap_or_else(|e| panic!("create yuno: {e}"));
    (rt, yuno)
}
