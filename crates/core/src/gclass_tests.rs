// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::event::{EVF_OUTPUT_EVENT, EVF_SYSTEM_EVENT};
use crate::gobj::Runtime;
use crate::test_support::{sample_gclass, C_SAMPLE, EV_ON_MESSAGE, ST_CONNECTED, ST_IDLE};

#[test]
fn register_and_lookup() {
    let mut rt = Runtime::start_up();
    rt.register_gclass(sample_gclass()).unwrap();
    let gc = rt.gclass(C_SAMPLE).unwrap();
    assert_eq!(gc.name, C_SAMPLE);
    assert_eq!(gc.initial_state(), Some(ST_IDLE));
    assert_eq!(gc.state_names(), [ST_IDLE, ST_CONNECTED]);
}

#[test]
fn register_rejects_bad_names() {
    let mut rt = Runtime::start_up();
    for bad in ["with`tick", "with^caret", "with.dot", ""] {
        let err = rt.register_gclass(GClassBuilder::new(bad)).unwrap_err();
        assert!(matches!(err, GobjError::Parameter(_)), "{bad:?} should be rejected");
    }
}

#[test]
fn register_rejects_duplicates() {
    let mut rt = Runtime::start_up();
    rt.register_gclass(sample_gclass()).unwrap();
    let err = rt.register_gclass(sample_gclass()).unwrap_err();
    assert!(matches!(err, GobjError::Parameter(_)));
}

#[test]
fn unregister_refuses_with_instances_alive() {
    let mut rt = Runtime::start_up();
    rt.register_gclass(sample_gclass()).unwrap();
    let yuno = rt.create_yuno("y", C_SAMPLE, crate::kw::KwMap::new()).unwrap();
    assert!(matches!(rt.unregister_gclass(C_SAMPLE), Err(GobjError::Operational(_))));
    rt.destroy_gobj(yuno).unwrap();
    rt.unregister_gclass(C_SAMPLE).unwrap();
    assert!(rt.gclass(C_SAMPLE).is_none());
}

#[test]
fn event_lookup_by_name_and_flag() {
    let mut rt = Runtime::start_up();
    rt.register_gclass(sample_gclass()).unwrap();
    let gc = rt.gclass(C_SAMPLE).unwrap();
    let et = gc.event_type(EV_ON_MESSAGE).unwrap();
    assert!(et.is_output());
    assert!(!et.is_system());
    let outputs = gc.events_by_flag(EVF_OUTPUT_EVENT);
    assert!(outputs.contains(&EV_ON_MESSAGE.to_string()));
    assert!(gc.events_by_flag(EVF_SYSTEM_EVENT).is_empty());
}

#[test]
fn action_table_keeps_declaration_order() {
    let mut rt = Runtime::start_up();
    rt.register_gclass(sample_gclass()).unwrap();
    let gc = rt.gclass(C_SAMPLE).unwrap();
    let idle = gc.state(ST_IDLE).unwrap();
    let events: Vec<&String> = idle.actions.keys().collect();
    assert_eq!(events[0], "EV_CONNECT");
}

#[test]
fn user_trace_levels_cap_at_16() {
    let mut builder = GClassBuilder::new("C_TRACEY");
    for i in 0..20 {
        builder = builder.trace_level(&format!("lvl{i}"), "");
    }
    let mut rt = Runtime::start_up();
    rt.register_gclass(builder).unwrap();
    assert_eq!(rt.gclass("C_TRACEY").unwrap().user_trace_levels().len(), 16);
}

#[test]
fn comm_prot_schema_resolution() {
    let mut rt = Runtime::start_up();
    rt.register_gclass(sample_gclass()).unwrap();
    rt.comm_prot_register("tcph", C_SAMPLE).unwrap();
    assert_eq!(rt.comm_prot_get_gclass("tcph"), Some(C_SAMPLE));
    // trailing-s schema falls back to the plain one
    assert_eq!(rt.comm_prot_get_gclass("tcphs"), Some(C_SAMPLE));
    assert_eq!(rt.comm_prot_get_gclass("modbus"), None);
}

#[test]
fn comm_prot_register_needs_gclass() {
    let mut rt = Runtime::start_up();
    assert!(rt.comm_prot_register("tcph", "C_GHOST").is_err());
}

#[test]
fn command_and_authz_tables() {
    let mut rt = Runtime::start_up();
    rt.register_gclass(
        GClassBuilder::new("C_CMD")
            .state(ST_IDLE)
            .command("help", "List commands")
            .authz("read", "Read access"),
    )
    .unwrap();
    let gc = rt.gclass("C_CMD").unwrap();
    assert_eq!(gc.commands().len(), 1);
    assert_eq!(gc.commands()[0].name, "help");
    assert_eq!(gc.authzs()[0].name, "read");
}
