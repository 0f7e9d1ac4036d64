// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! GClass registry: states, event types, action tables, method hooks.
//!
//! A gclass parameterizes gobjs: it owns the FSM table (ordered states, each
//! with an ordered event→action map), the declared event types, the attribute
//! descriptor table, the lifecycle/hook methods and the per-class trace
//! configuration.

use crate::attr::SdataDesc;
use crate::error::GobjError;
use crate::event::EventType;
use crate::gobj::{Gobj, Runtime};
use crate::kw::{Kw, KwMap};
use crate::subs::SubsId;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Arc;

/// Class flag bits.
pub type ClassFlag = u32;

/// Children of this class are skipped by `start_childs`/`start_tree`.
pub const GCF_MANUAL_START: ClassFlag = 0x0001;
/// Publishing/subscribing events need not be declared OUTPUT.
pub const GCF_NO_CHECK_OUTPUT_EVENTS: ClassFlag = 0x0002;
/// Unknown kw keys at creation are silently skipped.
pub const GCF_IGNORE_UNKNOWN_ATTRS: ClassFlag = 0x0004;
/// `play` on a non-running gobj fails instead of auto-starting.
pub const GCF_REQUIRED_START_TO_PLAY: ClassFlag = 0x0008;

/// Action executed when (state, event) matches.
pub type ActionFn = fn(&mut Runtime, Gobj, &str, Kw, Gobj) -> i32;

/// One row of a state's action table.
#[derive(Clone)]
pub struct EvAction {
    pub event: String,
    pub action: Option<ActionFn>,
    /// `None` keeps the state (or the action changes it manually).
    pub next_state: Option<String>,
}

/// A named FSM state with its ordered action table.
#[derive(Clone, Default)]
pub struct State {
    pub actions: IndexMap<String, (Option<ActionFn>, Option<String>)>,
}

/// Declarative FSM: ordered states, each with its action rows.
pub type StateTable = Vec<(String, Vec<EvAction>)>;

/// Hook `defined()` bits: a class reports which optional hooks it implements
/// so the runtime can fall back to default behavior for the rest.
pub mod mt {
    pub const PLAY: u32 = 0x0000_0001;
    pub const PAUSE: u32 = 0x0000_0002;
    pub const ENABLE: u32 = 0x0000_0004;
    pub const DISABLE: u32 = 0x0000_0008;
    pub const WRITING: u32 = 0x0000_0010;
    pub const INJECT_EVENT: u32 = 0x0000_0020;
    pub const STATE_CHANGED: u32 = 0x0000_0040;
    pub const PUBLISH_EVENT: u32 = 0x0000_0080;
    pub const PUBLICATION_PRE_FILTER: u32 = 0x0000_0100;
    pub const PUBLICATION_FILTER: u32 = 0x0000_0200;
    pub const SUBSCRIPTION_ADDED: u32 = 0x0000_0400;
    pub const SUBSCRIPTION_DELETED: u32 = 0x0000_0800;
    pub const COMMAND: u32 = 0x0000_1000;
    pub const STATS: u32 = 0x0000_2000;
    pub const READING: u32 = 0x0000_4000;
    pub const CREATE2: u32 = 0x0000_8000;
}

/// Global method table of a gclass.
///
/// Every hook has a no-op default; [`defined`](GobjMethods::defined) reports
/// the optional ones actually implemented (`mt::*` bits) so the runtime can
/// distinguish "absent" from "implemented as no-op".
#[allow(unused_variables)]
pub trait GobjMethods: Send + Sync {
    fn defined(&self) -> u32 {
        0
    }

    fn mt_create(&self, rt: &mut Runtime, gobj: Gobj) {}

    /// Creation hook with access to the raw creation kw; takes precedence
    /// over `mt_create` when defined.
    fn mt_create2(&self, rt: &mut Runtime, gobj: Gobj, kw: &KwMap) {}

    fn mt_destroy(&self, rt: &mut Runtime, gobj: Gobj) {}

    fn mt_start(&self, rt: &mut Runtime, gobj: Gobj) -> Result<(), GobjError> {
        Ok(())
    }

    fn mt_stop(&self, rt: &mut Runtime, gobj: Gobj) -> Result<(), GobjError> {
        Ok(())
    }

    fn mt_play(&self, rt: &mut Runtime, gobj: Gobj) -> Result<(), GobjError> {
        Ok(())
    }

    fn mt_pause(&self, rt: &mut Runtime, gobj: Gobj) -> Result<(), GobjError> {
        Ok(())
    }

    fn mt_enable(&self, rt: &mut Runtime, gobj: Gobj) -> Result<(), GobjError> {
        Ok(())
    }

    fn mt_disable(&self, rt: &mut Runtime, gobj: Gobj) -> Result<(), GobjError> {
        Ok(())
    }

    /// Called after every successful attribute write, once the gobj has
    /// completed creation and is not destroyed.
    fn mt_writing(&self, rt: &mut Runtime, gobj: Gobj, name: &str) {}

    /// Called before an observed attribute read (`reading_attr`), so the
    /// class can refresh computed attributes.
    fn mt_reading(&self, rt: &mut Runtime, gobj: Gobj, name: &str) {}

    /// Veto hook: a negative return cancels the new subscription.
    fn mt_subscription_added(&self, rt: &mut Runtime, gobj: Gobj, subs: SubsId) -> i32 {
        0
    }

    fn mt_subscription_deleted(&self, rt: &mut Runtime, gobj: Gobj, subs: SubsId) {}

    /// Publication override: negative breaks, zero skips publishing,
    /// positive continues.
    fn mt_publish_event(&self, rt: &mut Runtime, gobj: Gobj, event: &str, kw: &mut Kw) -> i32 {
        1
    }

    /// Per-subscription gate: negative breaks the loop, zero skips this
    /// subscription, positive publishes.
    fn mt_publication_pre_filter(
        &self,
        rt: &mut Runtime,
        gobj: Gobj,
        subs: SubsId,
        event: &str,
        kw: &mut Kw,
    ) -> i32 {
        1
    }

    /// Subscription `__filter__` evaluation when the class overrides the
    /// process-wide match function.
    fn mt_publication_filter(
        &self,
        rt: &mut Runtime,
        gobj: Gobj,
        event: &str,
        kw: &Kw,
        subscriber: Gobj,
    ) -> bool {
        true
    }

    /// Fallback for events with no entry in the current state.
    fn mt_inject_event(&self, rt: &mut Runtime, gobj: Gobj, event: &str, kw: Kw, src: Gobj) -> i32 {
        -1
    }

    /// Override for state-change publication.
    fn mt_state_changed(&self, rt: &mut Runtime, gobj: Gobj, event: &str, kw: Kw) {}

    fn mt_child_added(&self, rt: &mut Runtime, gobj: Gobj, child: Gobj) {}

    fn mt_child_removed(&self, rt: &mut Runtime, gobj: Gobj, child: Gobj) {}

    /// Called on the yuno's class for every gobj created in the tree.
    fn mt_gobj_created(&self, rt: &mut Runtime, gobj: Gobj, created: Gobj) {}

    fn mt_command(
        &self,
        rt: &mut Runtime,
        gobj: Gobj,
        command: &str,
        kw: Kw,
        src: Gobj,
    ) -> Result<Value, GobjError> {
        Err(GobjError::Parameter(format!("command {command:?} not implemented")))
    }

    fn mt_stats(&self, rt: &mut Runtime, gobj: Gobj, stats: &str, kw: Kw, src: Gobj) -> Value {
        Value::Null
    }

    fn mt_authenticate(&self, rt: &mut Runtime, gobj: Gobj, kw: &Kw, src: Gobj) -> Result<(), GobjError> {
        Ok(())
    }

    fn mt_authz_checker(&self, rt: &mut Runtime, gobj: Gobj, authz: &str, kw: &Kw, src: Gobj) -> bool {
        true
    }

    fn mt_trace_on(&self, rt: &mut Runtime, gobj: Gobj, level: &str, kw: &KwMap) {}

    fn mt_trace_off(&self, rt: &mut Runtime, gobj: Gobj, level: &str, kw: &KwMap) {}
}

/// All-defaults method table.
pub struct DefaultMethods;

impl GobjMethods for DefaultMethods {}

/// Command descriptor (hook metadata only; parsing is external).
#[derive(Debug, Clone)]
pub struct CmdDesc {
    pub name: String,
    pub alias: Vec<String>,
    pub description: String,
}

/// Authorization descriptor (hook metadata only; checking is external).
#[derive(Debug, Clone)]
pub struct AuthzDesc {
    pub name: String,
    pub description: String,
}

/// A registered class.
pub struct GClass {
    pub name: String,
    pub(crate) states: IndexMap<String, State>,
    pub(crate) event_types: Vec<EventType>,
    pub(crate) methods: Arc<dyn GobjMethods>,
    pub(crate) attrs_desc: Arc<Vec<SdataDesc>>,
    pub(crate) command_table: Vec<CmdDesc>,
    pub(crate) authz_table: Vec<AuthzDesc>,
    /// Up to 16 (name, description) user trace levels, bit i = 1 << i.
    pub(crate) user_trace_levels: Vec<(String, String)>,
    pub(crate) flags: ClassFlag,
    // mutable per class
    pub(crate) instances: usize,
    pub(crate) trace_level: u32,
    pub(crate) no_trace_level: u32,
    pub(crate) trace_filter: KwMap,
}

impl GClass {
    pub fn has_flag(&self, flag: ClassFlag) -> bool {
        self.flags & flag != 0
    }

    pub fn defines(&self, mt_bit: u32) -> bool {
        self.methods.defined() & mt_bit != 0
    }

    pub fn instances(&self) -> usize {
        self.instances
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    pub fn state_names(&self) -> Vec<String> {
        self.states.keys().cloned().collect()
    }

    /// First declared state: the initial state of new instances.
    pub fn initial_state(&self) -> Option<&str> {
        self.states.keys().next().map(String::as_str)
    }

    /// Event type declared by this class (or a system event).
    pub fn event_type(&self, event: &str) -> Option<&EventType> {
        self.event_types.iter().find(|e| e.name == event)
    }

    /// Event names carrying any of `flags`.
    pub fn events_by_flag(&self, flags: crate::event::EventFlag) -> Vec<String> {
        self.event_types
            .iter()
            .filter(|e| e.flags & flags != 0)
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn attrs_desc(&self) -> Arc<Vec<SdataDesc>> {
        Arc::clone(&self.attrs_desc)
    }

    pub fn methods(&self) -> Arc<dyn GobjMethods> {
        Arc::clone(&self.methods)
    }

    pub fn commands(&self) -> &[CmdDesc] {
        &self.command_table
    }

    pub fn authzs(&self) -> &[AuthzDesc] {
        &self.authz_table
    }

    pub fn user_trace_levels(&self) -> &[(String, String)] {
        &self.user_trace_levels
    }
}

/// Incremental gclass definition, registered with
/// [`Runtime::register_gclass`](crate::gobj::Runtime::register_gclass).
pub struct GClassBuilder {
    pub(crate) name: String,
    pub(crate) states: IndexMap<String, State>,
    pub(crate) event_types: Vec<EventType>,
    pub(crate) methods: Arc<dyn GobjMethods>,
    pub(crate) attrs_desc: Vec<SdataDesc>,
    pub(crate) command_table: Vec<CmdDesc>,
    pub(crate) authz_table: Vec<AuthzDesc>,
    pub(crate) user_trace_levels: Vec<(String, String)>,
    pub(crate) flags: ClassFlag,
}

impl GClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            states: IndexMap::new(),
            event_types: Vec::new(),
            methods: Arc::new(DefaultMethods),
            attrs_desc: Vec::new(),
            command_table: Vec::new(),
            authz_table: Vec::new(),
            user_trace_levels: Vec::new(),
            flags: 0,
        }
    }

    /// Add an empty state. States keep declaration order; the first one is
    /// the initial state.
    pub fn state(mut self, name: &str) -> Self {
        self.states.entry(name.to_string()).or_default();
        self
    }

    /// Add a state with its action rows.
    pub fn state_with_actions(mut self, name: &str, actions: Vec<EvAction>) -> Self {
        let state = self.states.entry(name.to_string()).or_default();
        for row in actions {
            state.actions.insert(row.event, (row.action, row.next_state));
        }
        self
    }

    /// Add one action row to an existing (or new) state.
    pub fn ev_action(
        mut self,
        state: &str,
        event: &str,
        action: Option<ActionFn>,
        next_state: Option<&str>,
    ) -> Self {
        let st = self.states.entry(state.to_string()).or_default();
        st.actions.insert(event.to_string(), (action, next_state.map(str::to_string)));
        self
    }

    pub fn event_type(mut self, name: &str, flags: crate::event::EventFlag) -> Self {
        self.event_types.push(EventType::new(name, flags));
        self
    }

    pub fn methods(mut self, methods: impl GobjMethods + 'static) -> Self {
        self.methods = Arc::new(methods);
        self
    }

    pub fn attrs(mut self, descs: Vec<SdataDesc>) -> Self {
        self.attrs_desc = descs;
        self
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.command_table.push(CmdDesc {
            name: name.to_string(),
            alias: Vec::new(),
            description: description.to_string(),
        });
        self
    }

    pub fn authz(mut self, name: &str, description: &str) -> Self {
        self.authz_table
            .push(AuthzDesc { name: name.to_string(), description: description.to_string() });
        self
    }

    /// Declare a user trace level (bit = declaration index, max 16).
    pub fn trace_level(mut self, name: &str, description: &str) -> Self {
        if self.user_trace_levels.len() < 16 {
            self.user_trace_levels.push((name.to_string(), description.to_string()));
        }
        self
    }

    pub fn flags(mut self, flags: ClassFlag) -> Self {
        self.flags |= flags;
        self
    }
}

#[cfg(test)]
#[path = "gclass_tests.rs"]
mod tests;
