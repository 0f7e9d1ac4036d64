// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription policy scenario: filter, local strip, global merge.

use serde_json::json;
use yn_core::kw::Kw;
use yn_core::subs::SubsOptions;
use yn_core::test_support::{kwmap, runtime_with_yuno, C_SAMPLE, EV_CONNECT, EV_ON_MESSAGE};
use yn_core::{Gobj, KwMap};

#[test]
fn filtered_stripped_and_enriched_delivery() {
    let (mut rt, yuno) = runtime_with_yuno();
    let publisher = rt.create_gobj("pub", C_SAMPLE, KwMap::new(), Some(yuno), 0).unwrap();
    let subscriber = rt.create_gobj("sub", C_SAMPLE, KwMap::new(), Some(yuno), 0).unwrap();
    rt.send_event(subscriber, EV_CONNECT, Kw::new(), Gobj::null()).unwrap();

    rt.subscribe_event(
        publisher,
        Some(EV_ON_MESSAGE),
        SubsOptions::new()
            .filter(kwmap(json!({"channel": "A"})))
            .local_keys(&["secret"])
            .global(kwmap(json!({"trace_id": "X"}))),
        subscriber,
    )
    .unwrap();

    // channel A passes the filter; secret is stripped, trace_id merged
    let sent = rt.publish_event(
        publisher,
        EV_ON_MESSAGE,
        Kw::from_map(kwmap(json!({"channel": "A", "secret": "s", "payload": 1}))),
    );
    assert_eq!(sent, 1);
    assert_eq!(rt.read_stat(subscriber, "rx_msgs"), 1);
    assert_eq!(
        rt.read_user_data(subscriber, "last_kw"),
        Some(json!({"channel": "A", "payload": 1, "trace_id": "X"}))
    );

    // channel B is filtered out: delivered to nobody, but the subscription
    // existed, so this is not a no-subscribers situation
    let sent = rt.publish_event(
        publisher,
        EV_ON_MESSAGE,
        Kw::from_map(kwmap(json!({"channel": "B", "secret": "s", "payload": 2}))),
    );
    assert_eq!(sent, 0);
    assert_eq!(rt.read_stat(subscriber, "rx_msgs"), 1);

    // the publisher's kw was not poisoned by per-delivery editing
    let sent = rt.publish_event(
        publisher,
        EV_ON_MESSAGE,
        Kw::from_map(kwmap(json!({"channel": "A", "payload": 3}))),
    );
    assert_eq!(sent, 1);
    assert_eq!(
        rt.read_user_data(subscriber, "last_kw"),
        Some(json!({"channel": "A", "payload": 3, "trace_id": "X"}))
    );
}

#[test]
fn non_declared_event_reaches_nobody() {
    let (mut rt, yuno) = runtime_with_yuno();
    let publisher = rt.create_gobj("pub", C_SAMPLE, KwMap::new(), Some(yuno), 0).unwrap();
    let subscriber = rt.create_gobj("sub", C_SAMPLE, KwMap::new(), Some(yuno), 0).unwrap();
    rt.send_event(subscriber, EV_CONNECT, Kw::new(), Gobj::null()).unwrap();
    rt.subscribe_event(publisher, None, SubsOptions::new(), subscriber).unwrap();

    assert_eq!(rt.publish_event(publisher, "EV_NOT_DECLARED", Kw::new()), 0);
    assert_eq!(rt.read_stat(subscriber, "rx_msgs"), 0);
}

#[test]
fn unsubscribing_during_publication_is_safe() {
    // the snapshot protects the loop: a subscriber that unsubscribes while
    // a publication is in flight neither corrupts it nor receives twice
    let (mut rt, yuno) = runtime_with_yuno();
    let publisher = rt.create_gobj("pub", C_SAMPLE, KwMap::new(), Some(yuno), 0).unwrap();
    let a = rt.create_gobj("a", C_SAMPLE, KwMap::new(), Some(yuno), 0).unwrap();
    let b = rt.create_gobj("b", C_SAMPLE, KwMap::new(), Some(yuno), 0).unwrap();
    rt.send_event(a, EV_CONNECT, Kw::new(), Gobj::null()).unwrap();
    rt.send_event(b, EV_CONNECT, Kw::new(), Gobj::null()).unwrap();
    rt.subscribe_event(publisher, Some(EV_ON_MESSAGE), SubsOptions::new(), a).unwrap();
    rt.subscribe_event(publisher, Some(EV_ON_MESSAGE), SubsOptions::new(), b).unwrap();

    let sent = rt.publish_event(publisher, EV_ON_MESSAGE, Kw::new());
    assert_eq!(sent, 2);

    // drop one and publish again
    rt.unsubscribe_event(publisher, Some(EV_ON_MESSAGE), &SubsOptions::new(), a).unwrap();
    let sent = rt.publish_event(publisher, EV_ON_MESSAGE, Kw::new());
    assert_eq!(sent, 1);
    assert_eq!(rt.read_stat(a, "rx_msgs"), 1);
    assert_eq!(rt.read_stat(b, "rx_msgs"), 2);
}
