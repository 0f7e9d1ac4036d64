// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::gclass::{GClassBuilder, GobjMethods};
use crate::test_support::{
    kwmap, runtime_with_yuno, C_SAMPLE, EV_CONNECT, EV_ON_MESSAGE, EV_SILENT, ST_IDLE,
};
use serde_json::json;

fn pair(rt: &mut Runtime, yuno: Gobj) -> (Gobj, Gobj) {
    let publisher = rt.create_gobj("pub", C_SAMPLE, crate::kw::KwMap::new(), Some(yuno), 0).unwrap();
    let subscriber = rt.create_gobj("sub", C_SAMPLE, crate::kw::KwMap::new(), Some(yuno), 0).unwrap();
    // move the subscriber where EV_ON_MESSAGE is accepted
    rt.send_event(subscriber, EV_CONNECT, Kw::new(), Gobj::null()).unwrap();
    (publisher, subscriber)
}

#[test]
fn subscription_lands_in_both_lists() {
    let (mut rt, yuno) = runtime_with_yuno();
    let (publisher, subscriber) = pair(&mut rt, yuno);
    let id = rt
        .subscribe_event(publisher, Some(EV_ON_MESSAGE), SubsOptions::new(), subscriber)
        .unwrap();
    assert_eq!(rt.subscriptions(publisher), [id]);
    assert_eq!(rt.subscribings(subscriber), [id]);
    let sub = rt.subscription(id).unwrap();
    assert_eq!(sub.publisher, publisher);
    assert_eq!(sub.subscriber, subscriber);
    assert_eq!(sub.event.as_deref(), Some(EV_ON_MESSAGE));
}

#[test]
fn subscribe_rejects_undeclared_events() {
    let (mut rt, yuno) = runtime_with_yuno();
    let (publisher, subscriber) = pair(&mut rt, yuno);
    // EV_CONNECT is an input, not declared OUTPUT
    assert!(rt
        .subscribe_event(publisher, Some(EV_CONNECT), SubsOptions::new(), subscriber)
        .is_err());
}

#[test]
fn no_check_flag_allows_undeclared_events() {
    let (mut rt, yuno) = runtime_with_yuno();
    rt.register_gclass(
        GClassBuilder::new("C_LOOSE")
            .state(ST_IDLE)
            .flags(crate::gclass::GCF_NO_CHECK_OUTPUT_EVENTS),
    )
    .unwrap();
    let publisher = rt.create_gobj("loose", "C_LOOSE", crate::kw::KwMap::new(), Some(yuno), 0).unwrap();
    let subscriber = rt.create_gobj("s", C_SAMPLE, crate::kw::KwMap::new(), Some(yuno), 0).unwrap();
    assert!(rt
        .subscribe_event(publisher, Some("EV_WHATEVER"), SubsOptions::new(), subscriber)
        .is_ok());
}

#[test]
fn repeated_subscription_is_replaced() {
    let (mut rt, yuno) = runtime_with_yuno();
    let (publisher, subscriber) = pair(&mut rt, yuno);
    let first = rt
        .subscribe_event(publisher, Some(EV_ON_MESSAGE), SubsOptions::new(), subscriber)
        .unwrap();
    let second = rt
        .subscribe_event(publisher, Some(EV_ON_MESSAGE), SubsOptions::new(), subscriber)
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(rt.subscriptions(publisher), [second]);
    assert_eq!(rt.subscribings(subscriber), [second]);
}

#[test]
fn different_policies_are_not_repeats() {
    let (mut rt, yuno) = runtime_with_yuno();
    let (publisher, subscriber) = pair(&mut rt, yuno);
    rt.subscribe_event(publisher, Some(EV_ON_MESSAGE), SubsOptions::new(), subscriber)
        .unwrap();
    rt.subscribe_event(
        publisher,
        Some(EV_ON_MESSAGE),
        SubsOptions::new().global(kwmap(json!({"trace_id": "X"}))),
        subscriber,
    )
    .unwrap();
    assert_eq!(rt.subscriptions(publisher).len(), 2);
}

#[test]
fn subscribe_unsubscribe_restores_lists() {
    let (mut rt, yuno) = runtime_with_yuno();
    let (publisher, subscriber) = pair(&mut rt, yuno);
    let opts = SubsOptions::new().local_keys(&["secret"]);
    rt.subscribe_event(publisher, Some(EV_ON_MESSAGE), opts.clone(), subscriber).unwrap();
    rt.unsubscribe_event(publisher, Some(EV_ON_MESSAGE), &opts, subscriber).unwrap();
    assert!(rt.subscriptions(publisher).is_empty());
    assert!(rt.subscribings(subscriber).is_empty());
}

#[test]
fn unsubscribe_unknown_fails() {
    let (mut rt, yuno) = runtime_with_yuno();
    let (publisher, subscriber) = pair(&mut rt, yuno);
    assert!(rt
        .unsubscribe_event(publisher, Some(EV_ON_MESSAGE), &SubsOptions::new(), subscriber)
        .is_err());
}

#[test]
fn hard_subscription_survives_unsubscribe_but_not_destroy() {
    let (mut rt, yuno) = runtime_with_yuno();
    let (publisher, subscriber) = pair(&mut rt, yuno);
    let opts = SubsOptions::new().hard();
    let id = rt
        .subscribe_event(publisher, Some(EV_ON_MESSAGE), opts.clone(), subscriber)
        .unwrap();
    assert!(rt.unsubscribe_event(publisher, Some(EV_ON_MESSAGE), &opts, subscriber).is_err());
    assert_eq!(rt.subscriptions(publisher), [id]);
    // destruction clears hard subscriptions on both sides
    rt.destroy_gobj(subscriber).unwrap();
    assert!(rt.subscriptions(publisher).is_empty());
    assert!(rt.subscription(id).is_none());
}

#[test]
fn publish_delivers_to_matching_subscribers() {
    let (mut rt, yuno) = runtime_with_yuno();
    let (publisher, subscriber) = pair(&mut rt, yuno);
    rt.subscribe_event(publisher, Some(EV_ON_MESSAGE), SubsOptions::new(), subscriber)
        .unwrap();
    let sent =
        rt.publish_event(publisher, EV_ON_MESSAGE, Kw::from_map(kwmap(json!({"n": 1}))));
    assert_eq!(sent, 1);
    assert_eq!(rt.read_stat(subscriber, "rx_msgs"), 1);
    assert_eq!(rt.read_user_data(subscriber, "last_kw"), Some(json!({"n": 1})));
}

#[test]
fn wildcard_subscription_gets_every_output() {
    let (mut rt, yuno) = runtime_with_yuno();
    let (publisher, subscriber) = pair(&mut rt, yuno);
    rt.subscribe_event(publisher, None, SubsOptions::new(), subscriber).unwrap();
    assert_eq!(rt.publish_event(publisher, EV_ON_MESSAGE, Kw::new()), 1);
}

#[test]
fn filter_global_local_policies() {
    let (mut rt, yuno) = runtime_with_yuno();
    let (publisher, subscriber) = pair(&mut rt, yuno);
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

    let sent = rt.publish_event(
        publisher,
        EV_ON_MESSAGE,
        Kw::from_map(kwmap(json!({"channel": "A", "secret": "s", "payload": 1}))),
    );
    assert_eq!(sent, 1);
    assert_eq!(
        rt.read_user_data(subscriber, "last_kw"),
        Some(json!({"channel": "A", "payload": 1, "trace_id": "X"}))
    );

    // channel B is filtered out
    let sent = rt.publish_event(
        publisher,
        EV_ON_MESSAGE,
        Kw::from_map(kwmap(json!({"channel": "B", "secret": "s"}))),
    );
    assert_eq!(sent, 0);
    assert_eq!(rt.read_stat(subscriber, "rx_msgs"), 1);
}

#[test]
fn own_event_stops_the_loop() {
    let (mut rt, yuno) = runtime_with_yuno();
    let (publisher, owner) = pair(&mut rt, yuno);
    let other = rt.create_gobj("other", C_SAMPLE, crate::kw::KwMap::new(), Some(yuno), 0).unwrap();
    rt.send_event(other, EV_CONNECT, Kw::new(), Gobj::null()).unwrap();
    // the owner consumes messages (its action returns -1)
    rt.write_user_data(owner, "own_messages", json!(true));
    rt.subscribe_event(publisher, Some(EV_ON_MESSAGE), SubsOptions::new().own_event(), owner)
        .unwrap();
    rt.subscribe_event(publisher, Some(EV_ON_MESSAGE), SubsOptions::new(), other).unwrap();
    let ret = rt.publish_event(publisher, EV_ON_MESSAGE, Kw::new());
    assert_eq!(ret, -1, "owner consumed the event");
    // the second subscriber never saw it
    assert_eq!(rt.read_stat(other, "rx_msgs"), 0);
}

#[test]
fn destroyed_subscriber_is_skipped() {
    let (mut rt, yuno) = runtime_with_yuno();
    let (publisher, subscriber) = pair(&mut rt, yuno);
    rt.subscribe_event(publisher, Some(EV_ON_MESSAGE), SubsOptions::new(), subscriber)
        .unwrap();
    rt.destroy_gobj(subscriber).unwrap();
    // destruction removed the record; publish sees no candidates
    assert_eq!(rt.publish_event(publisher, EV_SILENT, Kw::new()), 0);
}

#[test]
fn undeclared_event_publishes_to_nobody() {
    let (mut rt, yuno) = runtime_with_yuno();
    let (publisher, subscriber) = pair(&mut rt, yuno);
    rt.subscribe_event(publisher, None, SubsOptions::new(), subscriber).unwrap();
    assert_eq!(rt.publish_event(publisher, "EV_UNDECLARED", Kw::new()), 0);
    assert_eq!(rt.read_stat(subscriber, "rx_msgs"), 0);
}

#[test]
fn pure_child_creation_subscribes_the_parent() {
    let (mut rt, yuno) = runtime_with_yuno();
    let parent = rt.create_gobj("parent", C_SAMPLE, crate::kw::KwMap::new(), Some(yuno), 0).unwrap();
    let child = rt.create_pure_child("child", C_SAMPLE, crate::kw::KwMap::new(), parent).unwrap();
    // the wiring is an ordinary wildcard subscription record
    let subs = rt.subscriptions(child);
    assert_eq!(subs.len(), 1);
    let record = rt.subscription(subs[0]).unwrap();
    assert_eq!(record.publisher, child);
    assert_eq!(record.subscriber, parent);
    assert_eq!(record.event, None);
    assert_eq!(rt.subscribings(parent), subs);
}

#[test]
fn pure_child_publishes_to_parent() {
    let (mut rt, yuno) = runtime_with_yuno();
    let parent = rt.create_gobj("parent", C_SAMPLE, crate::kw::KwMap::new(), Some(yuno), 0).unwrap();
    rt.send_event(parent, EV_CONNECT, Kw::new(), Gobj::null()).unwrap();
    let child = rt.create_pure_child("child", C_SAMPLE, crate::kw::KwMap::new(), parent).unwrap();
    let ret = rt.publish_event(child, EV_ON_MESSAGE, Kw::from_map(kwmap(json!({"n": 2}))));
    assert_eq!(ret, 1);
    assert_eq!(rt.read_stat(parent, "rx_msgs"), 1);
    assert_eq!(rt.read_user_data(parent, "last_kw"), Some(json!({"n": 2})));
}

#[test]
fn pure_child_extra_subscriber_also_receives() {
    let (mut rt, yuno) = runtime_with_yuno();
    let parent = rt.create_gobj("parent", C_SAMPLE, crate::kw::KwMap::new(), Some(yuno), 0).unwrap();
    rt.send_event(parent, EV_CONNECT, Kw::new(), Gobj::null()).unwrap();
    let child = rt.create_pure_child("child", C_SAMPLE, crate::kw::KwMap::new(), parent).unwrap();
    let other = rt.create_gobj("other", C_SAMPLE, crate::kw::KwMap::new(), Some(yuno), 0).unwrap();
    rt.send_event(other, EV_CONNECT, Kw::new(), Gobj::null()).unwrap();
    rt.subscribe_event(child, Some(EV_ON_MESSAGE), SubsOptions::new(), other).unwrap();

    let sent = rt.publish_event(child, EV_ON_MESSAGE, Kw::new());
    assert_eq!(sent, 2);
    assert_eq!(rt.read_stat(parent, "rx_msgs"), 1);
    assert_eq!(rt.read_stat(other, "rx_msgs"), 1);
}

struct MutePublisher;

impl GobjMethods for MutePublisher {
    fn defined(&self) -> u32 {
        crate::gclass::mt::PUBLISH_EVENT
    }

    fn mt_publish_event(&self, _rt: &mut Runtime, _gobj: Gobj, _event: &str, _kw: &mut Kw) -> i32 {
        0 // skip publishing
    }
}

#[test]
fn pure_child_publish_override_is_honored() {
    let (mut rt, yuno) = runtime_with_yuno();
    rt.register_gclass(
        GClassBuilder::new("C_MUTE")
            .state(ST_IDLE)
            .event_type(EV_ON_MESSAGE, crate::event::EVF_OUTPUT_EVENT)
            .methods(MutePublisher),
    )
    .unwrap();
    let parent = rt.create_gobj("parent", C_SAMPLE, crate::kw::KwMap::new(), Some(yuno), 0).unwrap();
    rt.send_event(parent, EV_CONNECT, Kw::new(), Gobj::null()).unwrap();
    let child = rt.create_pure_child("child", "C_MUTE", crate::kw::KwMap::new(), parent).unwrap();

    // the class override gates the publication even for a pure child
    assert_eq!(rt.publish_event(child, EV_ON_MESSAGE, Kw::new()), 0);
    assert_eq!(rt.read_stat(parent, "rx_msgs"), 0);
}

#[test]
fn subs_options_roundtrip_as_json() {
    let opts = SubsOptions::new()
        .hard()
        .filter(kwmap(json!({"channel": "A"})))
        .global(kwmap(json!({"trace_id": "X"})))
        .local_keys(&["secret"]);
    let text = serde_json::to_string(&opts).unwrap();
    let back: SubsOptions = serde_json::from_str(&text).unwrap();
    assert_eq!(back, opts);
    // omitted fields fall back to defaults
    let sparse: SubsOptions = serde_json::from_str(r#"{"own_event": true}"#).unwrap();
    assert!(sparse.own_event);
    assert!(!sparse.hard_subscription);
    assert!(sparse.filter.is_none());
}

#[test]
fn subscription_gbuf_rider_travels() {
    let (mut rt, yuno) = runtime_with_yuno();
    let (publisher, subscriber) = pair(&mut rt, yuno);
    rt.subscribe_event(publisher, Some(EV_ON_MESSAGE), SubsOptions::new(), subscriber)
        .unwrap();
    let gbuf = crate::gbuf::GBuffer::create(8, 8).unwrap();
    gbuf.append(b"PING\n");
    let kw = Kw::new().with_gbuf(gbuf.clone());
    assert_eq!(rt.publish_event(publisher, EV_ON_MESSAGE, kw), 1);
    // publisher's clone plus ours
    assert!(gbuf.refcount() >= 1);
}
