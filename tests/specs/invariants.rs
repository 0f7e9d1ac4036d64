// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-cutting invariants of the runtime.

use serde_json::json;
use yn_core::kw::Kw;
use yn_core::subs::SubsOptions;
use yn_core::test_support::{
    kwmap, runtime_with_yuno, C_SAMPLE, EV_CONNECT, EV_DISCONNECT, EV_ON_MESSAGE,
};
use yn_core::{Gobj, KwMap};

/// Every live gobj's current state is one of its gclass's states.
#[test]
fn current_state_always_belongs_to_the_gclass() {
    let (mut rt, yuno) = runtime_with_yuno();
    let g = rt.create_gobj("g", C_SAMPLE, KwMap::new(), Some(yuno), 0).unwrap();
    let states = rt.gclass(C_SAMPLE).unwrap().state_names();
    assert!(states.contains(&rt.current_state(g)));
    rt.send_event(g, EV_CONNECT, Kw::new(), Gobj::null()).unwrap();
    assert!(states.contains(&rt.current_state(g)));
    rt.send_event(g, EV_DISCONNECT, Kw::new(), Gobj::null()).unwrap();
    assert!(states.contains(&rt.current_state(g)));
}

/// Both endpoints reference the same subscription record.
#[test]
fn subscription_lists_stay_in_sync() {
    let (mut rt, yuno) = runtime_with_yuno();
    let p = rt.create_gobj("p", C_SAMPLE, KwMap::new(), Some(yuno), 0).unwrap();
    let s = rt.create_gobj("s", C_SAMPLE, KwMap::new(), Some(yuno), 0).unwrap();
    let opts = SubsOptions::new().global(kwmap(json!({"tag": "t"})));
    let id = rt.subscribe_event(p, Some(EV_ON_MESSAGE), opts.clone(), s).unwrap();

    assert_eq!(rt.subscriptions(p), rt.subscribings(s));
    let record = rt.subscription(id).unwrap();
    assert_eq!(record.publisher, p);
    assert_eq!(record.subscriber, s);
    assert_eq!(record.opts, opts);

    rt.unsubscribe_event(p, Some(EV_ON_MESSAGE), &opts, s).unwrap();
    assert!(rt.subscriptions(p).is_empty());
    assert!(rt.subscribings(s).is_empty());
}

/// full_name is the chain of short names from the root down.
#[test]
fn full_name_matches_recomputed_chain() {
    let (mut rt, yuno) = runtime_with_yuno();
    let a = rt.create_gobj("a", C_SAMPLE, KwMap::new(), Some(yuno), 0).unwrap();
    let b = rt.create_gobj("b", C_SAMPLE, KwMap::new(), Some(a), 0).unwrap();

    let mut chain = Vec::new();
    let mut cur = Some(b);
    while let Some(g) = cur {
        chain.push(rt.short_name(g));
        cur = rt.parent(g);
    }
    chain.reverse();
    assert_eq!(rt.full_name(b), chain.join("`"));
    assert_eq!(rt.full_name(yuno), rt.short_name(yuno));
}

/// Clones keep a gbuffer alive; the last drop frees it exactly once.
#[test]
fn gbuf_refcount_follows_handoffs() {
    let gbuf = yn_core::GBuffer::create(128, 128).unwrap();
    gbuf.append(b"payload");
    let kw = Kw::new().with_gbuf(gbuf.clone());
    assert_eq!(gbuf.refcount(), 2);
    let kw2 = kw.clone();
    assert_eq!(gbuf.refcount(), 3);
    drop(kw);
    drop(kw2);
    assert_eq!(gbuf.refcount(), 1);
    assert_eq!(gbuf.leftbytes(), 7);
}
