// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The gobj tree: object instances, hierarchical ownership, lifecycle.
//!
//! All gobjs of one yuno live in a [`Runtime`] arena; [`Gobj`] is a `Copy`
//! generational handle. A destroyed gobj invalidates every outstanding
//! handle to it, which gives subscriptions and bottom chains weak-reference
//! semantics for free.
//!
//! Everything here runs on one thread: the runtime has no interior locking
//! and every hook, action and callback executes on the caller's stack.

use crate::attr::{KeySelector, PersistentAttrs, SData, ATTR_RSTATS, ATTR_STATS};
use crate::error::{GobjError, MsgSet};
use crate::event::{system_event_types, EventType};
use crate::gclass::{
    mt, GClass, GClassBuilder, GobjMethods, State, GCF_IGNORE_UNKNOWN_ATTRS, GCF_MANUAL_START,
    GCF_REQUIRED_START_TO_PLAY,
};
use crate::kw::{KwMap, KwMatchFn};
use crate::list::Registry;
use crate::subs::{SubsId, SubsOptions, Subscription};
use crate::trace::{TRACE_CREATE_DELETE, TRACE_START_STOP};
use indexmap::IndexMap;
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;

/// Well-known service name resolving to the yuno.
pub const SRV_YUNO: &str = "__yuno__";
/// Alias of [`SRV_YUNO`].
pub const SRV_ROOT: &str = "__root__";
/// Well-known service name resolving to the default service.
pub const SRV_DEFAULT_SERVICE: &str = "__default_service__";

/// Gobj flag bits.
pub type GobjFlag = u32;

/// The root singleton.
pub const GF_YUNO: GobjFlag = 0x01;
/// Registered in the service table under its name.
pub const GF_SERVICE: GobjFlag = 0x02;
/// Service plus `__default_service__` resolution.
pub const GF_DEFAULT_SERVICE: GobjFlag = 0x04;
/// Destroyed by its parent on the standard STOPPED action.
pub const GF_VOLATIL: GobjFlag = 0x08;
/// The parent is auto-subscribed to every output event at creation.
pub const GF_PURE_CHILD: GobjFlag = 0x10;
/// Started by `autostart_services`.
pub const GF_AUTOSTART: GobjFlag = 0x20;
/// Played by `autoplay_services`.
pub const GF_AUTOPLAY: GobjFlag = 0x40;

/// Opaque gobj handle: arena index plus generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Gobj {
    pub(crate) idx: u32,
    pub(crate) gen: u32,
}

impl Gobj {
    /// The null handle: resolves to nothing, usable as "no source".
    pub const fn null() -> Gobj {
        Gobj { idx: u32::MAX, gen: 0 }
    }

    pub fn is_null(&self) -> bool {
        self.idx == u32::MAX
    }
}

/// Tree-walk orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOrder {
    TopToBottom,
    BottomToTop,
    ByLevelFirstToLast,
    ByLevelLastToFirst,
}

pub(crate) struct GobjData {
    pub(crate) name: String,
    pub(crate) gclass_name: String,
    pub(crate) parent: Option<Gobj>,
    pub(crate) childs: Vec<Gobj>,
    pub(crate) current_state: String,
    pub(crate) last_state: String,
    pub(crate) attrs: SData,
    pub(crate) stats: KwMap,
    pub(crate) user_data: KwMap,
    pub(crate) priv_data: Option<Box<dyn Any + Send>>,
    pub(crate) bottom: Option<Gobj>,
    pub(crate) flags: GobjFlag,
    pub(crate) running: bool,
    pub(crate) playing: bool,
    pub(crate) disabled: bool,
    pub(crate) created: bool,
    pub(crate) destroying: bool,
    /// Destruction requested mid-dispatch; completed when the dispatcher
    /// unwinds.
    pub(crate) deferred_destroy: bool,
    /// Dispatch depth of this gobj.
    pub(crate) inside: u32,
    pub(crate) trace_level: u32,
    pub(crate) no_trace_level: u32,
    /// Subscriptions where this gobj is the publisher.
    pub(crate) dl_subs: Vec<SubsId>,
    /// Subscriptions where this gobj is the subscriber.
    pub(crate) dl_subscribings: Vec<SubsId>,
}

struct GobjSlot {
    gen: u32,
    data: Option<GobjData>,
}

/// One yuno's runtime: gclass registry, gobj arena, service table,
/// subscriptions and trace configuration.
pub struct Runtime {
    pub(crate) gclasses: IndexMap<String, GClass>,
    pub(crate) system_events: Vec<EventType>,
    pub(crate) comm_prots: IndexMap<String, String>,
    slots: Vec<GobjSlot>,
    free_slots: Vec<u32>,
    pub(crate) subs: Registry<Subscription>,
    pub(crate) services: IndexMap<String, Gobj>,
    pub(crate) yuno: Option<Gobj>,
    pub(crate) default_service: Option<Gobj>,
    pub(crate) global_trace: u32,
    pub(crate) deep_trace: u8,
    pub(crate) publish_match: KwMatchFn,
    pub(crate) persist: Option<Box<dyn PersistentAttrs>>,
    pub(crate) shutdowning: bool,
    pub(crate) initialized: bool,
    /// Global dispatch depth, for trace indentation.
    pub(crate) inside: u32,
    alive: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::start_up()
    }
}

impl Runtime {
    /// Bring up a fresh runtime with the system event table registered.
    pub fn start_up() -> Runtime {
        Runtime {
            gclasses: IndexMap::new(),
            system_events: system_event_types(),
            comm_prots: IndexMap::new(),
            slots: Vec::new(),
            free_slots: Vec::new(),
            subs: Registry::new(),
            services: IndexMap::new(),
            yuno: None,
            default_service: None,
            global_trace: 0,
            deep_trace: 0,
            publish_match: crate::kw::kw_match_simple,
            persist: None,
            shutdowning: false,
            initialized: true,
            inside: 0,
            alive: 0,
        }
    }

    /// Install the persistent-attribute storage. Runs its `startup`.
    pub fn set_persistent_attrs(
        &mut self,
        mut persist: Box<dyn PersistentAttrs>,
    ) -> Result<(), GobjError> {
        persist.startup()?;
        self.persist = Some(persist);
        Ok(())
    }

    /// Replace the process-wide publication match function.
    pub fn set_publish_match_fn(&mut self, f: KwMatchFn) {
        self.publish_match = f;
    }

    /// Request shutdown: pause a playing yuno, stop a running one.
    pub fn shutdown(&mut self) {
        self.shutdowning = true;
        if let Some(yuno) = self.yuno {
            if self.is_playing(yuno) {
                let _ = self.pause(yuno);
            }
            if self.is_running(yuno) {
                let _ = self.stop(yuno);
            }
        }
    }

    pub fn is_shutdowning(&self) -> bool {
        self.shutdowning
    }

    /// Tear everything down: yuno tree, services, gclasses, storage.
    /// Reports leaks. Further calls on the runtime fail the initialized gate.
    pub fn end(&mut self) {
        if let Some(yuno) = self.yuno.take() {
            let _ = self.destroy_gobj(yuno);
        }
        self.services.clear();
        self.default_service = None;
        let stuck: Vec<String> = self
            .gclasses
            .values()
            .filter(|gc| gc.instances > 0)
            .map(|gc| gc.name.clone())
            .collect();
        for name in stuck {
            tracing::error!(
                msgset = %MsgSet::InternalError,
                gclass = %name,
                "gclass still has instances at end"
            );
        }
        self.gclasses.clear();
        self.comm_prots.clear();
        self.system_events.clear();
        if let Some(mut persist) = self.persist.take() {
            persist.end();
        }
        if self.alive > 0 {
            tracing::error!(
                msgset = %MsgSet::InternalError,
                alive = self.alive,
                "gobjs still alive at end"
            );
        }
        crate::mem::report_leaks();
        self.initialized = false;
    }

    fn check_initialized(&self) -> Result<(), GobjError> {
        if !self.initialized {
            let msg = "runtime not initialized (ended?)".to_string();
            tracing::error!(msgset = %MsgSet::ParameterError, "{msg}");
            return Err(GobjError::Parameter(msg));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    //  GClass registry
    // ------------------------------------------------------------------

    /// Register a gclass. Names with `` ` ``, `^` or `.` and duplicates are
    /// rejected.
    pub fn register_gclass(&mut self, builder: GClassBuilder) -> Result<(), GobjError> {
        self.check_initialized()?;
        let name = builder.name.clone();
        if name.is_empty() || name.contains(['`', '^', '.']) {
            let msg = format!("bad gclass name {name:?}");
            tracing::error!(msgset = %MsgSet::ParameterError, gclass = %name, "{msg}");
            return Err(GobjError::Parameter(msg));
        }
        if self.gclasses.contains_key(&name) {
            let msg = format!("gclass {name:?} already registered");
            tracing::error!(msgset = %MsgSet::ParameterError, gclass = %name, "{msg}");
            return Err(GobjError::Parameter(msg));
        }
        self.gclasses.insert(
            name.clone(),
            GClass {
                name,
                states: builder.states,
                event_types: builder.event_types,
                methods: builder.methods,
                attrs_desc: Arc::new(builder.attrs_desc),
                command_table: builder.command_table,
                authz_table: builder.authz_table,
                user_trace_levels: builder.user_trace_levels,
                flags: builder.flags,
                instances: 0,
                trace_level: 0,
                no_trace_level: 0,
                trace_filter: KwMap::new(),
            },
        );
        Ok(())
    }

    /// Unregister a gclass. Refused while instances are alive.
    pub fn unregister_gclass(&mut self, name: &str) -> Result<(), GobjError> {
        let Some(gc) = self.gclasses.get(name) else {
            let msg = format!("gclass {name:?} not registered");
            tracing::error!(msgset = %MsgSet::ParameterError, gclass = name, "{msg}");
            return Err(GobjError::Parameter(msg));
        };
        if gc.instances > 0 {
            let msg = format!("gclass {name:?} has {} instances alive", gc.instances);
            tracing::error!(msgset = %MsgSet::OperationalError, gclass = name, "{msg}");
            return Err(GobjError::Operational(msg));
        }
        self.gclasses.shift_remove(name);
        self.comm_prots.retain(|_, g| g != name);
        Ok(())
    }

    pub fn gclass(&self, name: &str) -> Option<&GClass> {
        self.gclasses.get(name)
    }

    pub fn gclass_names(&self) -> Vec<String> {
        self.gclasses.keys().cloned().collect()
    }

    /// Register a gclass under a communication-protocol schema.
    pub fn comm_prot_register(&mut self, schema: &str, gclass: &str) -> Result<(), GobjError> {
        if !self.gclasses.contains_key(gclass) {
            let msg = format!("gclass {gclass:?} not registered");
            tracing::error!(msgset = %MsgSet::ParameterError, schema, gclass, "{msg}");
            return Err(GobjError::Parameter(msg));
        }
        self.comm_prots.insert(schema.to_string(), gclass.to_string());
        Ok(())
    }

    /// Resolve a schema to its gclass. A schema ending in `s` falls back to
    /// the plain schema (the transport adds SSL itself).
    pub fn comm_prot_get_gclass(&self, schema: &str) -> Option<&str> {
        if let Some(g) = self.comm_prots.get(schema) {
            return Some(g.as_str());
        }
        schema
            .strip_suffix('s')
            .and_then(|plain| self.comm_prots.get(plain))
            .map(String::as_str)
    }

    // ------------------------------------------------------------------
    //  Resolution helpers
    // ------------------------------------------------------------------

    pub(crate) fn data(&self, gobj: Gobj) -> Option<&GobjData> {
        self.slots
            .get(gobj.idx as usize)
            .filter(|s| s.gen == gobj.gen)
            .and_then(|s| s.data.as_ref())
    }

    pub(crate) fn data_mut(&mut self, gobj: Gobj) -> Option<&mut GobjData> {
        self.slots
            .get_mut(gobj.idx as usize)
            .filter(|s| s.gen == gobj.gen)
            .and_then(|s| s.data.as_mut())
    }

    pub(crate) fn resolve(&self, gobj: Gobj) -> Result<&GobjData, GobjError> {
        self.data(gobj).ok_or_else(|| {
            GobjError::Parameter("gobj destroyed or never existed".to_string())
        })
    }

    pub(crate) fn resolve_mut(&mut self, gobj: Gobj) -> Result<&mut GobjData, GobjError> {
        self.data_mut(gobj).ok_or_else(|| {
            GobjError::Parameter("gobj destroyed or never existed".to_string())
        })
    }

    pub fn exists(&self, gobj: Gobj) -> bool {
        self.data(gobj).is_some()
    }

    pub(crate) fn class_of(&self, gobj: Gobj) -> Option<&GClass> {
        self.data(gobj).and_then(|d| self.gclasses.get(&d.gclass_name))
    }

    pub(crate) fn methods_of(&self, gobj: Gobj) -> Option<Arc<dyn GobjMethods>> {
        self.class_of(gobj).map(GClass::methods)
    }

    pub(crate) fn class_defines(&self, gobj: Gobj, mt_bit: u32) -> bool {
        self.class_of(gobj).map(|gc| gc.defines(mt_bit)).unwrap_or(false)
    }

    pub(crate) fn class_has_flag(&self, gobj: Gobj, flag: crate::gclass::ClassFlag) -> bool {
        self.class_of(gobj).map(|gc| gc.has_flag(flag)).unwrap_or(false)
    }

    pub(crate) fn state_of(&self, gobj: Gobj, state: &str) -> Option<&State> {
        self.class_of(gobj).and_then(|gc| gc.state(state))
    }

    /// Is `event` declared OUTPUT or SYSTEM for this gclass (or globally)?
    pub(crate) fn event_is_output(&self, gclass: &GClass, event: &str) -> bool {
        use crate::event::{EVF_OUTPUT_EVENT, EVF_SYSTEM_EVENT};
        if let Some(et) = gclass.event_type(event) {
            return et.flags & (EVF_OUTPUT_EVENT | EVF_SYSTEM_EVENT) != 0;
        }
        self.system_events
            .iter()
            .any(|et| et.name == event && et.flags & (EVF_OUTPUT_EVENT | EVF_SYSTEM_EVENT) != 0)
    }

    pub(crate) fn event_flags(&self, gclass: &GClass, event: &str) -> crate::event::EventFlag {
        if let Some(et) = gclass.event_type(event) {
            return et.flags;
        }
        self.system_events.iter().find(|et| et.name == event).map(|et| et.flags).unwrap_or(0)
    }

    // ------------------------------------------------------------------
    //  Creation
    // ------------------------------------------------------------------

    /// Create the root yuno gobj.
    pub fn create_yuno(&mut self, name: &str, gclass: &str, kw: KwMap) -> Result<Gobj, GobjError> {
        self.create_gobj(name, gclass, kw, None, GF_YUNO)
    }

    /// Create a named service, reachable through the service table.
    pub fn create_service(
        &mut self,
        name: &str,
        gclass: &str,
        kw: KwMap,
        parent: Gobj,
    ) -> Result<Gobj, GobjError> {
        self.create_gobj(name, gclass, kw, Some(parent), GF_SERVICE)
    }

    /// Create the default service.
    pub fn create_default_service(
        &mut self,
        name: &str,
        gclass: &str,
        kw: KwMap,
        parent: Gobj,
    ) -> Result<Gobj, GobjError> {
        self.create_gobj(name, gclass, kw, Some(parent), GF_SERVICE | GF_DEFAULT_SERVICE)
    }

    /// Create a pure child: the parent is subscribed to all its output
    /// events.
    pub fn create_pure_child(
        &mut self,
        name: &str,
        gclass: &str,
        kw: KwMap,
        parent: Gobj,
    ) -> Result<Gobj, GobjError> {
        self.create_gobj(name, gclass, kw, Some(parent), GF_PURE_CHILD)
    }

    /// Create a volatile gobj, destroyed by the parent when it stops.
    pub fn create_volatil(
        &mut self,
        name: &str,
        gclass: &str,
        kw: KwMap,
        parent: Gobj,
    ) -> Result<Gobj, GobjError> {
        self.create_gobj(name, gclass, kw, Some(parent), GF_VOLATIL)
    }

    /// Create a gobj.
    ///
    /// Ordering contract: the child is fully initialized (attributes built,
    /// persistent attributes loaded, service registered, `mt_create` run)
    /// before the parent is notified with `mt_child_added` and the yuno with
    /// `mt_gobj_created`.
    pub fn create_gobj(
        &mut self,
        name: &str,
        gclass_name: &str,
        kw: KwMap,
        parent: Option<Gobj>,
        flags: GobjFlag,
    ) -> Result<Gobj, GobjError> {
        self.check_initialized()?;
        if name.contains(['`', '^']) {
            let msg = format!("bad gobj name {name:?}");
            tracing::error!(msgset = %MsgSet::ParameterError, name, "{msg}");
            return Err(GobjError::Parameter(msg));
        }
        if gclass_name.is_empty() {
            let msg = "empty gclass name".to_string();
            tracing::error!(msgset = %MsgSet::ParameterError, name, "{msg}");
            return Err(GobjError::Parameter(msg));
        }
        let Some(gclass) = self.gclasses.get(gclass_name) else {
            let msg = format!("gclass {gclass_name:?} not registered");
            tracing::error!(msgset = %MsgSet::ParameterError, name, gclass = gclass_name, "{msg}");
            return Err(GobjError::Parameter(msg));
        };
        let is_yuno = flags & GF_YUNO != 0;
        let is_service = flags & (GF_SERVICE | GF_DEFAULT_SERVICE) != 0;
        if is_yuno {
            if self.yuno.is_some() {
                let msg = "yuno already created".to_string();
                tracing::error!(msgset = %MsgSet::ParameterError, name, "{msg}");
                return Err(GobjError::Parameter(msg));
            }
            if parent.is_some() {
                let msg = "yuno cannot have a parent".to_string();
                tracing::error!(msgset = %MsgSet::ParameterError, name, "{msg}");
                return Err(GobjError::Parameter(msg));
            }
        } else {
            let Some(parent) = parent else {
                let msg = format!("gobj {name:?} needs a parent");
                tracing::error!(msgset = %MsgSet::ParameterError, name, "{msg}");
                return Err(GobjError::Parameter(msg));
            };
            if !self.exists(parent) {
                let msg = format!("parent of {name:?} does not exist");
                tracing::error!(msgset = %MsgSet::ParameterError, name, "{msg}");
                return Err(GobjError::Parameter(msg));
            }
        }
        if is_service {
            if name.is_empty() {
                let msg = "service without name".to_string();
                tracing::error!(msgset = %MsgSet::ParameterError, "{msg}");
                return Err(GobjError::Parameter(msg));
            }
            if self.services.contains_key(name) {
                let msg = format!("service {name:?} already registered");
                tracing::error!(msgset = %MsgSet::ParameterError, name, "{msg}");
                return Err(GobjError::Parameter(msg));
            }
        }

        let ignore_unknown = gclass.has_flag(GCF_IGNORE_UNKNOWN_ATTRS);
        let descs = gclass.attrs_desc();
        let initial_state = gclass.initial_state().unwrap_or("").to_string();
        let methods = gclass.methods();
        let has_create2 = gclass.defines(mt::CREATE2);

        let mut attrs = SData::create(descs, &kw, ignore_unknown);

        // Persistent attributes apply to services, before mt_create
        if is_service {
            if let Some(mut persist) = self.persist.take() {
                if let Err(e) = persist.load(name, &mut attrs) {
                    tracing::error!(
                        msgset = %MsgSet::SystemError,
                        service = name,
                        "cannot load persistent attrs: {e}"
                    );
                }
                self.persist = Some(persist);
            }
        }

        let data = GobjData {
            name: name.to_string(),
            gclass_name: gclass_name.to_string(),
            parent,
            childs: Vec::new(),
            current_state: initial_state.clone(),
            last_state: initial_state,
            attrs,
            stats: KwMap::new(),
            user_data: KwMap::new(),
            priv_data: None,
            bottom: None,
            flags,
            running: false,
            playing: false,
            disabled: false,
            created: false,
            destroying: false,
            deferred_destroy: false,
            inside: 0,
            trace_level: 0,
            no_trace_level: 0,
            dl_subs: Vec::new(),
            dl_subscribings: Vec::new(),
        };

        let gobj = match self.free_slots.pop() {
            Some(idx) => {
                let slot = &mut self.slots[idx as usize];
                slot.data = Some(data);
                Gobj { idx, gen: slot.gen }
            }
            None => {
                let idx = self.slots.len() as u32;
                self.slots.push(GobjSlot { gen: 1, data: Some(data) });
                Gobj { idx, gen: 1 }
            }
        };
        self.alive += 1;
        if let Some(gc) = self.gclasses.get_mut(gclass_name) {
            gc.instances += 1;
        }
        if is_yuno {
            self.yuno = Some(gobj);
        }
        if is_service {
            self.services.insert(name.to_string(), gobj);
            if flags & GF_DEFAULT_SERVICE != 0 {
                self.default_service = Some(gobj);
            }
        }
        if let Some(parent) = parent {
            if let Some(pd) = self.data_mut(parent) {
                pd.childs.push(gobj);
            }
        }

        // mt_create2 gets the raw creation kw and takes precedence
        if has_create2 {
            methods.mt_create2(self, gobj, &kw);
        } else {
            methods.mt_create(self, gobj);
        }
        if let Some(d) = self.data_mut(gobj) {
            d.created = true;
        }

        // a pure child's default subscriber is its parent, through the
        // ordinary subscription path
        if flags & GF_PURE_CHILD != 0 {
            if let Some(parent) = parent {
                let _ = self.subscribe_event(gobj, None, SubsOptions::new(), parent);
            }
        }

        if let Some(parent) = parent {
            if let Some(pm) = self.methods_of(parent) {
                pm.mt_child_added(self, parent, gobj);
            }
        }
        if let Some(yuno) = self.yuno {
            if yuno != gobj {
                if let Some(ym) = self.methods_of(yuno) {
                    ym.mt_gobj_created(self, yuno, gobj);
                }
            }
        }

        if self.is_level_tracing(gobj, TRACE_CREATE_DELETE) {
            tracing::info!(gobj = %self.short_name(gobj), "created");
        }
        Ok(gobj)
    }

    // ------------------------------------------------------------------
    //  Destruction
    // ------------------------------------------------------------------

    /// Destroy a gobj and its subtree. Idempotent: a stale handle or a gobj
    /// already being destroyed is a no-op.
    pub fn destroy_gobj(&mut self, gobj: Gobj) -> Result<(), GobjError> {
        let Some(data) = self.data(gobj) else {
            return Ok(());
        };
        if data.destroying {
            return Ok(());
        }
        if data.inside > 0 {
            // destruction from inside the gobj's own dispatch is unsafe;
            // finish it when the dispatcher unwinds
            tracing::info!(
                gobj = %self.short_name(gobj),
                "destroy requested mid-dispatch, deferring"
            );
            if let Some(d) = self.data_mut(gobj) {
                d.deferred_destroy = true;
            }
            return Ok(());
        }
        if self.is_level_tracing(gobj, TRACE_CREATE_DELETE) {
            tracing::info!(gobj = %self.short_name(gobj), "destroying");
        }
        let name = data.name.clone();
        let gclass_name = data.gclass_name.clone();
        let parent = data.parent;
        let is_service = data.flags & (GF_SERVICE | GF_DEFAULT_SERVICE) != 0;
        let playing = data.playing;
        let running = data.running;
        if let Some(d) = self.data_mut(gobj) {
            d.destroying = true;
        }

        if let Some(parent) = parent {
            if let Some(pm) = self.methods_of(parent) {
                pm.mt_child_removed(self, parent, gobj);
            }
        }

        if is_service {
            self.services.shift_remove(&name);
            if self.default_service == Some(gobj) {
                self.default_service = None;
            }
        }
        if self.yuno == Some(gobj) {
            self.yuno = None;
        }

        if playing {
            tracing::warn!(
                msgset = %MsgSet::OperationalError,
                gobj = %self.short_name(gobj),
                "destroying a playing gobj, pausing"
            );
            let _ = self.pause(gobj);
        }
        if running {
            tracing::warn!(
                msgset = %MsgSet::OperationalError,
                gobj = %self.short_name(gobj),
                "destroying a running gobj, stopping"
            );
            let _ = self.stop(gobj);
        }

        // Subscriptions die with either endpoint, hard ones included
        self.delete_all_subscriptions_of(gobj);

        let childs = self.data(gobj).map(|d| d.childs.clone()).unwrap_or_default();
        for child in childs {
            let _ = self.destroy_gobj(child);
        }

        if let Some(m) = self.methods_of(gobj) {
            m.mt_destroy(self, gobj);
        }

        if let Some(parent) = parent {
            if let Some(pd) = self.data_mut(parent) {
                pd.childs.retain(|c| *c != gobj);
            }
        }
        if let Some(gc) = self.gclasses.get_mut(&gclass_name) {
            gc.instances = gc.instances.saturating_sub(1);
        }
        if let Some(slot) = self.slots.get_mut(gobj.idx as usize) {
            slot.data = None;
            slot.gen = slot.gen.wrapping_add(1);
            self.free_slots.push(gobj.idx);
        }
        self.alive -= 1;
        Ok(())
    }

    /// Destroy every child of a gobj.
    pub fn destroy_childs(&mut self, gobj: Gobj) -> Result<(), GobjError> {
        let childs = self.resolve(gobj)?.childs.clone();
        for child in childs {
            let _ = self.destroy_gobj(child);
        }
        Ok(())
    }

    /// Live gobj count, for leak checks.
    pub fn alive_count(&self) -> usize {
        self.alive
    }

    // ------------------------------------------------------------------
    //  Lifecycle
    // ------------------------------------------------------------------

    /// Start a gobj: reject if running, disabled or missing required
    /// attributes; reset volatile attributes; run `mt_start`.
    pub fn start(&mut self, gobj: Gobj) -> Result<(), GobjError> {
        let data = self.resolve(gobj)?;
        if data.running {
            let msg = format!("{} already running", self.short_name(gobj));
            tracing::error!(msgset = %MsgSet::OperationalError, "{msg}");
            return Err(GobjError::Operational(msg));
        }
        if data.disabled {
            let msg = format!("{} is disabled", self.short_name(gobj));
            tracing::error!(msgset = %MsgSet::OperationalError, "{msg}");
            return Err(GobjError::Operational(msg));
        }
        let missing = data.attrs.missing_required();
        if !missing.is_empty() {
            let msg = format!(
                "{} cannot start, required attributes empty: {missing:?}",
                self.short_name(gobj)
            );
            tracing::error!(msgset = %MsgSet::OperationalError, "{msg}");
            return Err(GobjError::Operational(msg));
        }
        if self.is_level_tracing(gobj, TRACE_START_STOP) {
            tracing::info!(gobj = %self.short_name(gobj), "start");
        }
        if let Some(d) = self.data_mut(gobj) {
            d.attrs.reset_volatiles();
            d.running = true;
        }
        let methods = self.methods_of(gobj).ok_or_else(|| {
            GobjError::Internal("gclass vanished".to_string())
        })?;
        if let Err(e) = methods.mt_start(self, gobj) {
            if let Some(d) = self.data_mut(gobj) {
                d.running = false;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Stop a gobj. Stopping a stopped gobj is informational, not an error.
    pub fn stop(&mut self, gobj: Gobj) -> Result<(), GobjError> {
        let data = self.resolve(gobj)?;
        if !data.running {
            tracing::info!(gobj = %self.short_name(gobj), "already stopped");
            return Ok(());
        }
        if data.playing {
            tracing::warn!(
                msgset = %MsgSet::OperationalError,
                gobj = %self.short_name(gobj),
                "stopping a playing gobj, pausing first"
            );
            let _ = self.pause(gobj);
        }
        if self.is_level_tracing(gobj, TRACE_START_STOP) {
            tracing::info!(gobj = %self.short_name(gobj), "stop");
        }
        let methods = self.methods_of(gobj).ok_or_else(|| {
            GobjError::Internal("gclass vanished".to_string())
        })?;
        let result = methods.mt_stop(self, gobj);
        if let Some(d) = self.data_mut(gobj) {
            d.running = false;
        }
        result
    }

    /// Play a gobj. Without a prior `start`, the class flag
    /// `required_start_to_play` selects between failing and auto-starting
    /// (with a logged error).
    pub fn play(&mut self, gobj: Gobj) -> Result<(), GobjError> {
        let data = self.resolve(gobj)?;
        if data.playing {
            tracing::warn!(
                msgset = %MsgSet::OperationalError,
                gobj = %self.short_name(gobj),
                "already playing"
            );
            return Ok(());
        }
        if !data.running {
            if self.class_has_flag(gobj, GCF_REQUIRED_START_TO_PLAY) {
                let msg = format!("{} cannot play without start", self.short_name(gobj));
                tracing::error!(msgset = %MsgSet::OperationalError, "{msg}");
                return Err(GobjError::Operational(msg));
            }
            tracing::error!(
                msgset = %MsgSet::OperationalError,
                gobj = %self.short_name(gobj),
                "play without start, auto-starting"
            );
            self.start(gobj)?;
        }
        if let Some(d) = self.data_mut(gobj) {
            d.playing = true;
        }
        if self.class_defines(gobj, mt::PLAY) {
            let methods = self.methods_of(gobj).ok_or_else(|| {
                GobjError::Internal("gclass vanished".to_string())
            })?;
            if let Err(e) = methods.mt_play(self, gobj) {
                if let Some(d) = self.data_mut(gobj) {
                    d.playing = false;
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Pause a gobj. Pausing a paused gobj is informational.
    pub fn pause(&mut self, gobj: Gobj) -> Result<(), GobjError> {
        let data = self.resolve(gobj)?;
        if !data.playing {
            tracing::info!(gobj = %self.short_name(gobj), "not playing");
            return Ok(());
        }
        let result = if self.class_defines(gobj, mt::PAUSE) {
            let methods = self.methods_of(gobj).ok_or_else(|| {
                GobjError::Internal("gclass vanished".to_string())
            })?;
            methods.mt_pause(self, gobj)
        } else {
            Ok(())
        };
        if let Some(d) = self.data_mut(gobj) {
            d.playing = false;
        }
        result
    }

    /// Start the children of a gobj, skipping disabled ones and classes
    /// flagged `manual_start`.
    pub fn start_childs(&mut self, gobj: Gobj) -> Result<(), GobjError> {
        let childs = self.resolve(gobj)?.childs.clone();
        for child in childs {
            if self.startable(child) {
                let _ = self.start(child);
            }
        }
        Ok(())
    }

    /// Start a gobj and its whole subtree. Skipped branches (disabled,
    /// `manual_start`) are skipped whole.
    pub fn start_tree(&mut self, gobj: Gobj) -> Result<(), GobjError> {
        if !self.startable(gobj) {
            return Ok(());
        }
        if !self.is_running(gobj) {
            let _ = self.start(gobj);
        }
        let childs = self.resolve(gobj)?.childs.clone();
        for child in childs {
            let _ = self.start_tree(child);
        }
        Ok(())
    }

    fn startable(&self, gobj: Gobj) -> bool {
        match self.data(gobj) {
            Some(d) => !d.disabled && !self.class_has_flag(gobj, GCF_MANUAL_START),
            None => false,
        }
    }

    /// Stop the children of a gobj.
    pub fn stop_childs(&mut self, gobj: Gobj) -> Result<(), GobjError> {
        let childs = self.resolve(gobj)?.childs.clone();
        for child in childs {
            if self.is_running(child) {
                let _ = self.stop(child);
            }
        }
        Ok(())
    }

    /// Stop a gobj and its whole subtree.
    pub fn stop_tree(&mut self, gobj: Gobj) -> Result<(), GobjError> {
        if self.is_running(gobj) {
            let _ = self.stop(gobj);
        }
        let childs = self.resolve(gobj)?.childs.clone();
        for child in childs {
            let _ = self.stop_tree(child);
        }
        Ok(())
    }

    /// Disable a gobj: `start` is refused until enabled. Default behavior
    /// (no `mt_disable`) stops the subtree.
    pub fn disable(&mut self, gobj: Gobj) -> Result<(), GobjError> {
        let data = self.resolve(gobj)?;
        if data.disabled {
            tracing::info!(gobj = %self.short_name(gobj), "already disabled");
            return Ok(());
        }
        if let Some(d) = self.data_mut(gobj) {
            d.disabled = true;
        }
        if self.class_defines(gobj, mt::DISABLE) {
            let methods = self.methods_of(gobj).ok_or_else(|| {
                GobjError::Internal("gclass vanished".to_string())
            })?;
            methods.mt_disable(self, gobj)
        } else {
            self.stop_tree(gobj)
        }
    }

    /// Enable a gobj. Default behavior (no `mt_enable`) starts the subtree.
    pub fn enable(&mut self, gobj: Gobj) -> Result<(), GobjError> {
        let data = self.resolve(gobj)?;
        if !data.disabled {
            tracing::info!(gobj = %self.short_name(gobj), "not disabled");
            return Ok(());
        }
        if let Some(d) = self.data_mut(gobj) {
            d.disabled = false;
        }
        if self.class_defines(gobj, mt::ENABLE) {
            let methods = self.methods_of(gobj).ok_or_else(|| {
                GobjError::Internal("gclass vanished".to_string())
            })?;
            methods.mt_enable(self, gobj)
        } else {
            self.start_tree(gobj)
        }
    }

    // ------------------------------------------------------------------
    //  Services
    // ------------------------------------------------------------------

    /// Find a service by name. `__yuno__`/`__root__` resolve to the yuno,
    /// `__default_service__` to the default service.
    pub fn find_service(&self, name: &str) -> Option<Gobj> {
        match name {
            SRV_YUNO | SRV_ROOT => self.yuno,
            SRV_DEFAULT_SERVICE => self.default_service,
            _ => self.services.get(name).copied(),
        }
    }

    pub fn yuno(&self) -> Option<Gobj> {
        self.yuno
    }

    pub fn default_service(&self) -> Option<Gobj> {
        self.default_service
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    /// Start every autostart service: `start` when the class defines
    /// `mt_play` (it will start its own tree on play), else `start_tree`.
    pub fn autostart_services(&mut self) {
        for gobj in self.service_gobjs() {
            if self.data(gobj).map(|d| d.flags & GF_AUTOSTART != 0).unwrap_or(false) {
                if self.class_defines(gobj, mt::PLAY) {
                    let _ = self.start(gobj);
                } else {
                    let _ = self.start_tree(gobj);
                }
            }
        }
    }

    /// Play every autoplay service.
    pub fn autoplay_services(&mut self) {
        for gobj in self.service_gobjs() {
            if self.data(gobj).map(|d| d.flags & GF_AUTOPLAY != 0).unwrap_or(false) {
                let _ = self.play(gobj);
            }
        }
    }

    /// Stop every autostart service's tree.
    pub fn stop_autostart_services(&mut self) {
        for gobj in self.service_gobjs() {
            if self.data(gobj).map(|d| d.flags & GF_AUTOSTART != 0).unwrap_or(false) {
                let _ = self.stop_tree(gobj);
            }
        }
    }

    /// Pause every autoplay service.
    pub fn pause_autoplay_services(&mut self) {
        for gobj in self.service_gobjs() {
            if self.data(gobj).map(|d| d.flags & GF_AUTOPLAY != 0).unwrap_or(false) {
                let _ = self.pause(gobj);
            }
        }
    }

    fn service_gobjs(&self) -> Vec<Gobj> {
        self.services
            .values()
            .copied()
            .filter(|g| Some(*g) != self.yuno)
            .collect()
    }

    // ------------------------------------------------------------------
    //  Names and lookup
    // ------------------------------------------------------------------

    pub fn gobj_name(&self, gobj: Gobj) -> String {
        self.data(gobj).map(|d| d.name.clone()).unwrap_or_default()
    }

    pub fn gclass_name_of(&self, gobj: Gobj) -> String {
        self.data(gobj).map(|d| d.gclass_name.clone()).unwrap_or_default()
    }

    /// `gclass^name`.
    pub fn short_name(&self, gobj: Gobj) -> String {
        match self.data(gobj) {
            Some(d) => format!("{}^{}", d.gclass_name, d.name),
            None => "???".to_string(),
        }
    }

    /// Backtick-joined chain of short names from the root down.
    pub fn full_name(&self, gobj: Gobj) -> String {
        let Some(_) = self.data(gobj) else {
            return "???".to_string();
        };
        let mut segments = Vec::new();
        let mut cur = Some(gobj);
        while let Some(g) = cur {
            segments.push(self.short_name(g));
            cur = self.data(g).and_then(|d| d.parent);
        }
        segments.reverse();
        segments.join("`")
    }

    pub fn parent(&self, gobj: Gobj) -> Option<Gobj> {
        self.data(gobj).and_then(|d| d.parent)
    }

    pub fn is_running(&self, gobj: Gobj) -> bool {
        self.data(gobj).map(|d| d.running).unwrap_or(false)
    }

    pub fn is_playing(&self, gobj: Gobj) -> bool {
        self.data(gobj).map(|d| d.playing).unwrap_or(false)
    }

    pub fn is_disabled(&self, gobj: Gobj) -> bool {
        self.data(gobj).map(|d| d.disabled).unwrap_or(false)
    }

    pub fn is_destroying(&self, gobj: Gobj) -> bool {
        self.data(gobj).map(|d| d.destroying).unwrap_or(true)
    }

    pub fn is_yuno(&self, gobj: Gobj) -> bool {
        self.data(gobj).map(|d| d.flags & GF_YUNO != 0).unwrap_or(false)
    }

    pub fn is_service(&self, gobj: Gobj) -> bool {
        self.data(gobj)
            .map(|d| d.flags & (GF_SERVICE | GF_DEFAULT_SERVICE) != 0)
            .unwrap_or(false)
    }

    pub fn is_pure_child(&self, gobj: Gobj) -> bool {
        self.data(gobj).map(|d| d.flags & GF_PURE_CHILD != 0).unwrap_or(false)
    }

    pub fn is_volatil(&self, gobj: Gobj) -> bool {
        self.data(gobj).map(|d| d.flags & GF_VOLATIL != 0).unwrap_or(false)
    }

    pub fn current_state(&self, gobj: Gobj) -> String {
        self.data(gobj).map(|d| d.current_state.clone()).unwrap_or_default()
    }

    pub fn last_state(&self, gobj: Gobj) -> String {
        self.data(gobj).map(|d| d.last_state.clone()).unwrap_or_default()
    }

    /// Find a gobj by `` ` ``-separated path of `gclass^name` (or plain
    /// name) segments, rooted at the yuno. A plain service name also
    /// resolves.
    pub fn find_gobj(&self, path: &str) -> Option<Gobj> {
        if !path.contains('`') {
            if let Some(service) = self.find_service(path) {
                return Some(service);
            }
        }
        let yuno = self.yuno?;
        let mut segments = path.split('`');
        let first = segments.next()?;
        if !self.segment_matches(yuno, first) {
            return None;
        }
        let mut cur = yuno;
        for segment in segments {
            cur = self
                .data(cur)?
                .childs
                .iter()
                .copied()
                .find(|c| self.segment_matches(*c, segment))?;
        }
        Some(cur)
    }

    fn segment_matches(&self, gobj: Gobj, segment: &str) -> bool {
        let Some(d) = self.data(gobj) else {
            return false;
        };
        match segment.split_once('^') {
            Some((gclass, name)) => d.gclass_name == gclass && d.name == name,
            None => d.name == segment,
        }
    }

    // ------------------------------------------------------------------
    //  Children
    // ------------------------------------------------------------------

    pub fn children(&self, gobj: Gobj) -> Vec<Gobj> {
        self.data(gobj).map(|d| d.childs.clone()).unwrap_or_default()
    }

    pub fn child_count(&self, gobj: Gobj) -> usize {
        self.data(gobj).map(|d| d.childs.len()).unwrap_or(0)
    }

    pub fn first_child(&self, gobj: Gobj) -> Option<Gobj> {
        self.data(gobj).and_then(|d| d.childs.first().copied())
    }

    pub fn last_child(&self, gobj: Gobj) -> Option<Gobj> {
        self.data(gobj).and_then(|d| d.childs.last().copied())
    }

    pub fn next_child(&self, child: Gobj) -> Option<Gobj> {
        let parent = self.parent(child)?;
        let childs = &self.data(parent)?.childs;
        let pos = childs.iter().position(|c| *c == child)?;
        childs.get(pos + 1).copied()
    }

    pub fn prev_child(&self, child: Gobj) -> Option<Gobj> {
        let parent = self.parent(child)?;
        let childs = &self.data(parent)?.childs;
        let pos = childs.iter().position(|c| *c == child)?;
        pos.checked_sub(1).and_then(|p| childs.get(p).copied())
    }

    pub fn child_by_name(&self, gobj: Gobj, name: &str) -> Option<Gobj> {
        self.data(gobj)?
            .childs
            .iter()
            .copied()
            .find(|c| self.data(*c).map(|d| d.name == name).unwrap_or(false))
    }

    /// First child matching the filter. Special keys:
    /// `__gclass_name__`, `__inherited_gclass_name__`, `__gobj_name__`,
    /// `__prefix_gobj_name__`, `__state__`, `__disabled__`; any other key is
    /// compared against the child's attribute of that name.
    pub fn find_child(&self, gobj: Gobj, filter: &KwMap) -> Option<Gobj> {
        self.data(gobj)?
            .childs
            .iter()
            .copied()
            .find(|c| self.gobj_matches(*c, filter))
    }

    /// All children matching the filter.
    pub fn match_children(&self, gobj: Gobj, filter: &KwMap) -> Vec<Gobj> {
        self.data(gobj)
            .map(|d| {
                d.childs.iter().copied().filter(|c| self.gobj_matches(*c, filter)).collect()
            })
            .unwrap_or_default()
    }

    fn gobj_matches(&self, gobj: Gobj, filter: &KwMap) -> bool {
        let Some(d) = self.data(gobj) else {
            return false;
        };
        for (key, wanted) in filter {
            let ok = match key.as_str() {
                "__gclass_name__" => wanted.as_str() == Some(d.gclass_name.as_str()),
                "__inherited_gclass_name__" => match wanted.as_str() {
                    Some(w) => self.inherits_gclass(gobj, w),
                    None => false,
                },
                "__gobj_name__" => wanted.as_str() == Some(d.name.as_str()),
                "__prefix_gobj_name__" => {
                    wanted.as_str().map(|w| d.name.starts_with(w)).unwrap_or(false)
                }
                "__state__" => wanted.as_str() == Some(d.current_state.as_str()),
                "__disabled__" => wanted.as_bool() == Some(d.disabled),
                attr => d.attrs.get(attr) == Some(wanted),
            };
            if !ok {
                return false;
            }
        }
        true
    }

    /// Does the gobj (or its bottom chain) instantiate `gclass`?
    fn inherits_gclass(&self, gobj: Gobj, gclass: &str) -> bool {
        let mut cur = Some(gobj);
        while let Some(g) = cur {
            let Some(d) = self.data(g) else {
                return false;
            };
            if d.gclass_name == gclass {
                return true;
            }
            cur = d.bottom;
        }
        false
    }

    // ------------------------------------------------------------------
    //  Tree walking
    // ------------------------------------------------------------------

    /// Walk the descendants of `root`. Callback return: negative stops the
    /// walk (and is returned), zero continues, positive skips the current
    /// branch (top-to-bottom only).
    pub fn walk_tree(
        &mut self,
        root: Gobj,
        order: WalkOrder,
        cb: &mut dyn FnMut(&mut Runtime, Gobj) -> i32,
    ) -> i32 {
        match order {
            WalkOrder::TopToBottom => self.walk_top_bottom(root, cb),
            WalkOrder::BottomToTop => {
                let mut list = Vec::new();
                self.collect_pre_order(root, &mut list);
                for gobj in list.into_iter().rev() {
                    let ret = cb(self, gobj);
                    if ret < 0 {
                        return ret;
                    }
                }
                0
            }
            WalkOrder::ByLevelFirstToLast | WalkOrder::ByLevelLastToFirst => {
                let reverse = order == WalkOrder::ByLevelLastToFirst;
                let mut queue: std::collections::VecDeque<Gobj> = std::collections::VecDeque::new();
                queue.extend(self.ordered_childs(root, reverse));
                while let Some(gobj) = queue.pop_front() {
                    let ret = cb(self, gobj);
                    if ret < 0 {
                        return ret;
                    }
                    queue.extend(self.ordered_childs(gobj, reverse));
                }
                0
            }
        }
    }

    fn ordered_childs(&self, gobj: Gobj, reverse: bool) -> Vec<Gobj> {
        let mut childs = self.children(gobj);
        if reverse {
            childs.reverse();
        }
        childs
    }

    fn walk_top_bottom(
        &mut self,
        gobj: Gobj,
        cb: &mut dyn FnMut(&mut Runtime, Gobj) -> i32,
    ) -> i32 {
        let childs = self.children(gobj);
        for child in childs {
            let ret = cb(self, child);
            if ret < 0 {
                return ret;
            }
            if ret > 0 {
                continue; // skip this branch
            }
            let ret = self.walk_top_bottom(child, cb);
            if ret < 0 {
                return ret;
            }
        }
        0
    }

    fn collect_pre_order(&self, gobj: Gobj, out: &mut Vec<Gobj>) {
        for child in self.children(gobj) {
            out.push(child);
            self.collect_pre_order(child, out);
        }
    }

    // ------------------------------------------------------------------
    //  Attributes
    // ------------------------------------------------------------------

    /// The gobj in the bottom chain that defines `name`, starting at `gobj`.
    fn attr_owner(&self, gobj: Gobj, name: &str) -> Option<Gobj> {
        let mut cur = Some(gobj);
        while let Some(g) = cur {
            let d = self.data(g)?;
            if d.attrs.has(name) {
                return Some(g);
            }
            cur = d.bottom;
        }
        None
    }

    pub fn has_attr(&self, gobj: Gobj, name: &str) -> bool {
        self.attr_owner(gobj, name).is_some()
    }

    /// Read an attribute, inheriting down the bottom chain.
    pub fn read_attr(&self, gobj: Gobj, name: &str) -> Option<Value> {
        let owner = self.attr_owner(gobj, name)?;
        self.data(owner)?.attrs.get(name).cloned()
    }

    /// Read an attribute with the class observing the read: `mt_reading`
    /// runs first when defined, so computed attributes can refresh.
    pub fn reading_attr(&mut self, gobj: Gobj, name: &str) -> Option<Value> {
        if self.class_defines(gobj, mt::READING) {
            if let Some(m) = self.methods_of(gobj) {
                m.mt_reading(self, gobj, name);
            }
        }
        self.read_attr(gobj, name)
    }

    pub fn read_str_attr(&self, gobj: Gobj, name: &str) -> Option<String> {
        self.read_attr(gobj, name).and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn read_int_attr(&self, gobj: Gobj, name: &str) -> i64 {
        self.read_attr(gobj, name).and_then(|v| v.as_i64()).unwrap_or(0)
    }

    pub fn read_bool_attr(&self, gobj: Gobj, name: &str) -> bool {
        self.read_attr(gobj, name).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    pub fn read_real_attr(&self, gobj: Gobj, name: &str) -> f64 {
        self.read_attr(gobj, name).and_then(|v| v.as_f64()).unwrap_or(0.0)
    }

    /// Write an attribute on the chain gobj defining it. Type mismatches
    /// are rejected; a successful write triggers `mt_writing` once the
    /// owner has completed creation and is not being destroyed.
    pub fn write_attr(&mut self, gobj: Gobj, name: &str, value: Value) -> Result<(), GobjError> {
        let Some(owner) = self.attr_owner(gobj, name) else {
            let msg = format!("attribute {name:?} not found in {}", self.short_name(gobj));
            tracing::error!(msgset = %MsgSet::ParameterError, attr = name, "{msg}");
            return Err(GobjError::Parameter(msg));
        };
        {
            let d = self.resolve_mut(owner)?;
            if let Err(e) = d.attrs.set(name, value) {
                tracing::error!(msgset = %MsgSet::ParameterError, attr = name, "{e}");
                return Err(e);
            }
        }
        let notify = {
            let d = self.resolve(owner)?;
            d.created && !d.destroying && self.class_defines(owner, mt::WRITING)
        };
        if notify {
            if let Some(m) = self.methods_of(owner) {
                m.mt_writing(self, owner, name);
            }
        }
        Ok(())
    }

    pub fn write_str_attr(&mut self, gobj: Gobj, name: &str, value: &str) -> Result<(), GobjError> {
        self.write_attr(gobj, name, Value::String(value.to_string()))
    }

    pub fn write_int_attr(&mut self, gobj: Gobj, name: &str, value: i64) -> Result<(), GobjError> {
        self.write_attr(gobj, name, Value::from(value))
    }

    pub fn write_bool_attr(&mut self, gobj: Gobj, name: &str, value: bool) -> Result<(), GobjError> {
        self.write_attr(gobj, name, Value::Bool(value))
    }

    /// All attributes of the gobj itself (no chain walk).
    pub fn attrs_snapshot(&self, gobj: Gobj) -> KwMap {
        self.data(gobj).map(|d| d.attrs.all()).unwrap_or_default()
    }

    /// Save the writable+persistent attributes of a service.
    pub fn save_persistent_attrs(
        &mut self,
        gobj: Gobj,
        keys: &KeySelector,
    ) -> Result<(), GobjError> {
        let (name, attrs) = {
            let d = self.resolve(gobj)?;
            if d.flags & (GF_SERVICE | GF_DEFAULT_SERVICE) == 0 {
                let msg = format!("{} is not a service", self.short_name(gobj));
                tracing::error!(msgset = %MsgSet::ParameterError, "{msg}");
                return Err(GobjError::Parameter(msg));
            }
            (d.name.clone(), d.attrs.clone())
        };
        let Some(mut persist) = self.persist.take() else {
            return Err(GobjError::Operational("no persistent-attrs storage installed".into()));
        };
        let result = persist.save(&name, &attrs, keys);
        self.persist = Some(persist);
        result
    }

    /// Remove stored attributes of a service.
    pub fn remove_persistent_attrs(
        &mut self,
        gobj: Gobj,
        keys: &KeySelector,
    ) -> Result<(), GobjError> {
        let name = self.resolve(gobj)?.name.clone();
        let Some(mut persist) = self.persist.take() else {
            return Err(GobjError::Operational("no persistent-attrs storage installed".into()));
        };
        let result = persist.remove(&name, keys);
        self.persist = Some(persist);
        result
    }

    /// List stored attributes.
    pub fn list_persistent_attrs(&mut self) -> Value {
        let Some(mut persist) = self.persist.take() else {
            return Value::Null;
        };
        let out = persist.list();
        self.persist = Some(persist);
        out
    }

    // ------------------------------------------------------------------
    //  Stats and user data
    // ------------------------------------------------------------------

    /// Add to a statistic, creating it at zero.
    pub fn incr_stat(&mut self, gobj: Gobj, name: &str, delta: i64) -> i64 {
        let Some(d) = self.data_mut(gobj) else {
            return 0;
        };
        let cur = d.stats.get(name).and_then(Value::as_i64).unwrap_or(0);
        let new = cur + delta;
        d.stats.insert(name.to_string(), Value::from(new));
        new
    }

    pub fn set_stat(&mut self, gobj: Gobj, name: &str, value: i64) {
        if let Some(d) = self.data_mut(gobj) {
            d.stats.insert(name.to_string(), Value::from(value));
        }
    }

    pub fn read_stat(&self, gobj: Gobj, name: &str) -> i64 {
        self.data(gobj)
            .and_then(|d| d.stats.get(name))
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    /// Reset the resettable statistic attributes to their defaults.
    pub fn reset_rstats(&mut self, gobj: Gobj) {
        if let Some(d) = self.data_mut(gobj) {
            d.attrs.reset_flagged(ATTR_RSTATS);
        }
    }

    /// Statistic attributes (STATS/RSTATS) plus the free counters.
    pub fn stats_snapshot(&self, gobj: Gobj) -> KwMap {
        let Some(d) = self.data(gobj) else {
            return KwMap::new();
        };
        let mut out = d.attrs.snapshot(ATTR_STATS | ATTR_RSTATS);
        for (k, v) in &d.stats {
            out.insert(k.clone(), v.clone());
        }
        out
    }

    pub fn write_user_data(&mut self, gobj: Gobj, key: &str, value: Value) {
        if let Some(d) = self.data_mut(gobj) {
            d.user_data.insert(key.to_string(), value);
        }
    }

    pub fn read_user_data(&self, gobj: Gobj, key: &str) -> Option<Value> {
        self.data(gobj).and_then(|d| d.user_data.get(key)).cloned()
    }

    // ------------------------------------------------------------------
    //  Bottom gobj
    // ------------------------------------------------------------------

    /// Set the bottom gobj. Overwriting a live bottom is logged as an
    /// internal error (and done anyway).
    pub fn set_bottom_gobj(&mut self, gobj: Gobj, bottom: Option<Gobj>) -> Option<Gobj> {
        let prev = self.data(gobj).and_then(|d| d.bottom);
        if let (Some(p), Some(_)) = (prev, bottom) {
            if self.exists(p) {
                tracing::error!(
                    msgset = %MsgSet::InternalError,
                    gobj = %self.short_name(gobj),
                    prev = %self.short_name(p),
                    "bottom gobj overwritten"
                );
            }
        }
        if let Some(d) = self.data_mut(gobj) {
            d.bottom = bottom;
        }
        prev
    }

    pub fn bottom_gobj(&self, gobj: Gobj) -> Option<Gobj> {
        self.data(gobj).and_then(|d| d.bottom)
    }

    /// The deepest gobj of the bottom chain.
    pub fn last_bottom_gobj(&self, gobj: Gobj) -> Option<Gobj> {
        let mut last = None;
        let mut cur = self.bottom_gobj(gobj);
        while let Some(g) = cur {
            last = Some(g);
            cur = self.bottom_gobj(g);
        }
        last
    }

    // ------------------------------------------------------------------
    //  Private data
    // ------------------------------------------------------------------

    /// Bind the per-instance private block (normally from `mt_create`).
    pub fn set_priv(&mut self, gobj: Gobj, priv_data: Box<dyn Any + Send>) {
        if let Some(d) = self.data_mut(gobj) {
            d.priv_data = Some(priv_data);
        }
    }

    pub fn priv_ref<T: 'static>(&self, gobj: Gobj) -> Option<&T> {
        self.data(gobj)?.priv_data.as_ref()?.downcast_ref::<T>()
    }

    pub fn priv_mut<T: 'static>(&mut self, gobj: Gobj) -> Option<&mut T> {
        self.data_mut(gobj)?.priv_data.as_mut()?.downcast_mut::<T>()
    }

    /// Take the private block out (e.g. to drop it in `mt_destroy`).
    pub fn take_priv(&mut self, gobj: Gobj) -> Option<Box<dyn Any + Send>> {
        self.data_mut(gobj)?.priv_data.take()
    }

    // ------------------------------------------------------------------
    //  Stats/commands plumbing
    // ------------------------------------------------------------------

    /// Invoke a command on a gobj's class.
    pub fn command(
        &mut self,
        gobj: Gobj,
        command: &str,
        kw: crate::kw::Kw,
        src: Gobj,
    ) -> Result<Value, GobjError> {
        let methods = self
            .methods_of(gobj)
            .ok_or_else(|| GobjError::Parameter("gobj destroyed".to_string()))?;
        if !self.class_defines(gobj, mt::COMMAND) {
            return Err(GobjError::Parameter(format!(
                "{} has no command table",
                self.short_name(gobj)
            )));
        }
        methods.mt_command(self, gobj, command, kw, src)
    }
}

#[cfg(test)]
#[path = "gobj_tests.rs"]
mod tests;
