// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Destroy cascade: children, services, subscriptions, hooks.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use yn_core::event::EVF_OUTPUT_EVENT;
use yn_core::gclass::{GClassBuilder, GobjMethods};
use yn_core::gobj::{Gobj, Runtime, GF_SERVICE, GF_VOLATIL};
use yn_core::subs::SubsOptions;
use yn_core::test_support::{kwmap, runtime_with_yuno, C_SAMPLE, EV_ON_MESSAGE};
use yn_core::KwMap;

struct RecordingMethods {
    log: Arc<Mutex<Vec<String>>>,
}

impl GobjMethods for RecordingMethods {
    fn mt_child_removed(&self, rt: &mut Runtime, _gobj: Gobj, child: Gobj) {
        self.log.lock().push(format!("child_removed:{}", rt.gobj_name(child)));
    }

    fn mt_destroy(&self, rt: &mut Runtime, gobj: Gobj) {
        self.log.lock().push(format!("destroy:{}", rt.gobj_name(gobj)));
    }
}

#[test]
fn destroy_cascade_clears_children_services_and_subscriptions() {
    let (mut rt, yuno) = runtime_with_yuno();
    let log = Arc::new(Mutex::new(Vec::new()));
    rt.register_gclass(
        GClassBuilder::new("C_REC")
            .state("ST_IDLE")
            .event_type(EV_ON_MESSAGE, EVF_OUTPUT_EVENT)
            .methods(RecordingMethods { log: log.clone() }),
    )
    .unwrap();

    let baseline = rt.alive_count();
    let parent = rt.create_gobj("parent", "C_REC", KwMap::new(), Some(yuno), 0).unwrap();
    let c1 = rt.create_pure_child("c1", C_SAMPLE, KwMap::new(), parent).unwrap();
    let c2 = rt
        .create_gobj("c2", C_SAMPLE, KwMap::new(), Some(parent), GF_SERVICE | GF_VOLATIL)
        .unwrap();
    let c3 = rt.create_gobj("c3", C_SAMPLE, KwMap::new(), Some(parent), 0).unwrap();
    // c3 holds a hard subscription to the parent's output
    let sub_id = rt
        .subscribe_event(parent, Some(EV_ON_MESSAGE), SubsOptions::new().hard(), c3)
        .unwrap();

    assert_eq!(rt.alive_count(), baseline + 4);
    assert_eq!(rt.find_service("c2"), Some(c2));
    assert!(rt.is_volatil(c2));
    assert!(rt.is_pure_child(c1));

    rt.destroy_gobj(parent).unwrap();

    // every child notified the parent, in child order
    let log = log.lock();
    assert_eq!(
        log.as_slice(),
        ["child_removed:c1", "child_removed:c2", "child_removed:c3", "destroy:parent"]
    );

    // service table, subscriptions and objects are gone
    assert_eq!(rt.find_service("c2"), None);
    assert!(rt.subscription(sub_id).is_none());
    for g in [parent, c1, c2, c3] {
        assert!(!rt.exists(g));
    }
    assert_eq!(rt.alive_count(), baseline);
}

#[test]
fn destroying_an_endpoint_cleans_the_other_side() {
    let (mut rt, yuno) = runtime_with_yuno();
    let publisher = rt.create_gobj("pub", C_SAMPLE, KwMap::new(), Some(yuno), 0).unwrap();
    let subscriber = rt.create_gobj("sub", C_SAMPLE, KwMap::new(), Some(yuno), 0).unwrap();
    rt.subscribe_event(publisher, Some(EV_ON_MESSAGE), SubsOptions::new(), subscriber).unwrap();

    rt.destroy_gobj(publisher).unwrap();
    assert!(rt.subscribings(subscriber).is_empty());
}

#[test]
fn persistent_attrs_load_applies_to_services() {
    use yn_core::attr::{KeySelector, PersistentAttrs, SData};
    use yn_core::error::GobjError;
    use yn_core::test_support::C_PLAYER;

    struct FixedStore;

    impl PersistentAttrs for FixedStore {
        fn load(&mut self, service: &str, attrs: &mut SData) -> Result<(), GobjError> {
            if service == "player" {
                attrs.set("url", json!("tcp://persisted:9"))?;
            }
            Ok(())
        }

        fn save(
            &mut self,
            _service: &str,
            _attrs: &SData,
            _keys: &KeySelector,
        ) -> Result<(), GobjError> {
            Ok(())
        }

        fn remove(&mut self, _service: &str, _keys: &KeySelector) -> Result<(), GobjError> {
            Ok(())
        }

        fn list(&mut self) -> serde_json::Value {
            json!({})
        }
    }

    let (mut rt, yuno) = runtime_with_yuno();
    rt.set_persistent_attrs(Box::new(FixedStore)).unwrap();
    // services load persisted values before mt_create
    let svc = rt.create_service("player", C_PLAYER, KwMap::new(), yuno).unwrap();
    assert_eq!(rt.read_str_attr(svc, "url").as_deref(), Some("tcp://persisted:9"));
    // plain gobjs do not
    let plain = rt
        .create_gobj("other", C_PLAYER, kwmap(json!({"url": "u://x"})), Some(yuno), 0)
        .unwrap();
    assert_eq!(rt.read_str_attr(plain, "url").as_deref(), Some("u://x"));
}
