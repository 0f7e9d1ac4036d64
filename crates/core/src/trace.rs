// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trace levels.
//!
//! A 32-bit mask per scope: low 16 bits are user levels declared by each
//! gclass, high 16 bits are the global levels below. A record fires when any
//! of {global, gclass, gobj} has the bit set and neither the gclass nor the
//! gobj suppression mask has it. The deep-trace knob overrides: 1 traces
//! everything except suppressed, 2+ traces everything unconditionally.

use crate::error::{GobjError, MsgSet};
use crate::gobj::{Gobj, Runtime};
use crate::kw::kw_match_simple;
use serde_json::Value;

pub const TRACE_MACHINE: u32 = 1 << 16;
pub const TRACE_CREATE_DELETE: u32 = 1 << 17;
pub const TRACE_CREATE_DELETE2: u32 = 1 << 18;
pub const TRACE_SUBSCRIPTIONS: u32 = 1 << 19;
pub const TRACE_START_STOP: u32 = 1 << 20;
pub const TRACE_MONITOR: u32 = 1 << 21;
pub const TRACE_EVENT_MONITOR: u32 = 1 << 22;
pub const TRACE_UV: u32 = 1 << 23;
pub const TRACE_EV_KW: u32 = 1 << 24;
pub const TRACE_AUTHZS: u32 = 1 << 25;
pub const TRACE_STATES: u32 = 1 << 26;
pub const TRACE_PERIODIC_TIMER: u32 = 1 << 27;
pub const TRACE_GBUFFERS: u32 = 1 << 28;
pub const TRACE_TIMER: u32 = 1 << 29;

pub const TRACE_USER_MASK: u32 = 0x0000_FFFF;
pub const TRACE_GLOBAL_MASK: u32 = 0xFFFF_0000;

/// Reserved global trace level names, bit `16 + index`.
pub const GLOBAL_TRACE_LEVELS: &[(&str, &str)] = &[
    ("machine", "Trace machine"),
    ("create_delete", "Trace create/delete of gobjs"),
    ("create_delete2", "Trace create/delete of gobjs level 2: with kw"),
    ("subscriptions", "Trace subscriptions of gobjs"),
    ("start_stop", "Trace start/stop of gobjs"),
    ("monitor", "Monitor activity of gobjs"),
    ("event_monitor", "Monitor events of gobjs"),
    ("libuv", "Trace event loop mixins"),
    ("ev_kw", "Trace event keywords"),
    ("authzs", "Trace authorizations"),
    ("states", "Trace change of states"),
    ("periodic_timer", "Trace periodic timers"),
    ("gbuffers", "Trace gbuffers"),
    ("timer", "Trace timers"),
];

/// Mask of a global level name. `""` or `"*"` selects all global levels.
pub fn global_level_mask(level: &str) -> Option<u32> {
    if level.is_empty() || level == "*" {
        return Some(TRACE_GLOBAL_MASK);
    }
    GLOBAL_TRACE_LEVELS
        .iter()
        .position(|(name, _)| *name == level)
        .map(|i| 1u32 << (16 + i))
}

/// Mask of a level name against a gclass's user levels, falling back to the
/// global names. `""` or `"*"` selects everything.
pub fn level_mask(user_levels: &[(String, String)], level: &str) -> Option<u32> {
    if level.is_empty() || level == "*" {
        return Some(u32::MAX);
    }
    if let Some(i) = user_levels.iter().position(|(name, _)| name == level) {
        return Some(1u32 << i);
    }
    global_level_mask(level)
}

impl Runtime {
    /// Set or clear a global trace level by name.
    pub fn set_global_trace(&mut self, level: &str, set: bool) -> Result<(), GobjError> {
        let Some(mask) = global_level_mask(level) else {
            let msg = format!("unknown global trace level {level:?}");
            tracing::error!(msgset = %MsgSet::ParameterError, level, "{msg}");
            return Err(GobjError::Parameter(msg));
        };
        if set {
            self.global_trace |= mask;
        } else {
            self.global_trace &= !mask;
        }
        Ok(())
    }

    pub fn global_trace_level(&self) -> u32 {
        self.global_trace
    }

    /// Deep trace knob: 0 off, 1 everything except suppressed, 2+ everything.
    pub fn set_deep_trace(&mut self, level: u8) {
        self.deep_trace = level;
    }

    pub fn deep_trace(&self) -> u8 {
        self.deep_trace
    }

    /// Set or clear a gclass trace level by name.
    pub fn set_gclass_trace(&mut self, gclass: &str, level: &str, set: bool) -> Result<(), GobjError> {
        self.gclass_trace_bits(gclass, level, set, false)
    }

    /// Set or clear a gclass suppression level by name.
    pub fn set_gclass_no_trace(
        &mut self,
        gclass: &str,
        level: &str,
        set: bool,
    ) -> Result<(), GobjError> {
        self.gclass_trace_bits(gclass, level, set, true)
    }

    fn gclass_trace_bits(
        &mut self,
        gclass: &str,
        level: &str,
        set: bool,
        suppress: bool,
    ) -> Result<(), GobjError> {
        let Some(gc) = self.gclasses.get_mut(gclass) else {
            let msg = format!("gclass {gclass:?} not registered");
            tracing::error!(msgset = %MsgSet::ParameterError, gclass, "{msg}");
            return Err(GobjError::Parameter(msg));
        };
        let Some(mask) = level_mask(&gc.user_trace_levels, level) else {
            let msg = format!("unknown trace level {level:?} in gclass {gclass:?}");
            tracing::error!(msgset = %MsgSet::ParameterError, gclass, level, "{msg}");
            return Err(GobjError::Parameter(msg));
        };
        let bits = if suppress { &mut gc.no_trace_level } else { &mut gc.trace_level };
        if set {
            *bits |= mask;
        } else {
            *bits &= !mask;
        }
        Ok(())
    }

    /// Set or clear a gobj trace level by name.
    pub fn set_gobj_trace(&mut self, gobj: Gobj, level: &str, set: bool) -> Result<(), GobjError> {
        self.gobj_trace_bits(gobj, level, set, false)
    }

    /// Set or clear a gobj suppression level by name.
    pub fn set_gobj_no_trace(&mut self, gobj: Gobj, level: &str, set: bool) -> Result<(), GobjError> {
        self.gobj_trace_bits(gobj, level, set, true)
    }

    fn gobj_trace_bits(
        &mut self,
        gobj: Gobj,
        level: &str,
        set: bool,
        suppress: bool,
    ) -> Result<(), GobjError> {
        let gclass_name = {
            let data = self.resolve(gobj)?;
            data.gclass_name.clone()
        };
        let user_levels = self
            .gclasses
            .get(&gclass_name)
            .map(|gc| gc.user_trace_levels.clone())
            .unwrap_or_default();
        let Some(mask) = level_mask(&user_levels, level) else {
            let msg = format!("unknown trace level {level:?}");
            tracing::error!(msgset = %MsgSet::ParameterError, level, "{msg}");
            return Err(GobjError::Parameter(msg));
        };
        let data = self.resolve_mut(gobj)?;
        let bits = if suppress { &mut data.no_trace_level } else { &mut data.trace_level };
        if set {
            *bits |= mask;
        } else {
            *bits &= !mask;
        }
        Ok(())
    }

    /// Narrow a gclass's tracing to gobjs whose `attr` equals `value`.
    pub fn add_trace_filter(
        &mut self,
        gclass: &str,
        attr: &str,
        value: Value,
    ) -> Result<(), GobjError> {
        let Some(gc) = self.gclasses.get_mut(gclass) else {
            return Err(GobjError::Parameter(format!("gclass {gclass:?} not registered")));
        };
        match gc.trace_filter.get_mut(attr) {
            Some(Value::Array(values)) => {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
            _ => {
                gc.trace_filter.insert(attr.to_string(), Value::Array(vec![value]));
            }
        }
        Ok(())
    }

    /// Remove one value (or the whole attribute with `None`) from the filter.
    pub fn remove_trace_filter(
        &mut self,
        gclass: &str,
        attr: &str,
        value: Option<&Value>,
    ) -> Result<(), GobjError> {
        let Some(gc) = self.gclasses.get_mut(gclass) else {
            return Err(GobjError::Parameter(format!("gclass {gclass:?} not registered")));
        };
        match value {
            None => {
                gc.trace_filter.remove(attr);
            }
            Some(v) => {
                if let Some(Value::Array(values)) = gc.trace_filter.get_mut(attr) {
                    values.retain(|x| x != v);
                    if values.is_empty() {
                        gc.trace_filter.remove(attr);
                    }
                }
            }
        }
        Ok(())
    }

    pub fn trace_filter(&self, gclass: &str) -> Option<&crate::kw::KwMap> {
        self.gclasses.get(gclass).map(|gc| &gc.trace_filter)
    }

    /// Effective trace mask of a gobj: global | gclass | gobj, minus the
    /// gclass and gobj suppression masks. Deep trace overrides.
    pub fn trace_level(&self, gobj: Gobj) -> u32 {
        if self.deep_trace >= 2 {
            return u32::MAX;
        }
        let Ok(data) = self.resolve(gobj) else {
            return self.global_trace;
        };
        let (class_bits, class_no) = self
            .gclasses
            .get(&data.gclass_name)
            .map(|gc| (gc.trace_level, gc.no_trace_level))
            .unwrap_or((0, 0));
        let mut bits = self.global_trace | class_bits | data.trace_level;
        if self.deep_trace == 1 {
            bits = u32::MAX;
        }
        bits & !(class_no | data.no_trace_level)
    }

    /// Does `mask` trace fire for this gobj, honoring the gclass trace
    /// filter?
    pub fn is_level_tracing(&self, gobj: Gobj, mask: u32) -> bool {
        if self.deep_trace >= 2 {
            return true;
        }
        if self.trace_level(gobj) & mask == 0 {
            return false;
        }
        // Trace filter: when present, only matching gobjs trace
        let Ok(data) = self.resolve(gobj) else {
            return true;
        };
        let Some(gc) = self.gclasses.get(&data.gclass_name) else {
            return true;
        };
        if gc.trace_filter.is_empty() {
            return true;
        }
        kw_match_simple(&data.attrs.all(), &gc.trace_filter)
    }

    pub fn is_machine_tracing(&self, gobj: Gobj) -> bool {
        self.is_level_tracing(gobj, TRACE_MACHINE)
    }

    pub fn is_ev_kw_tracing(&self, gobj: Gobj) -> bool {
        self.is_level_tracing(gobj, TRACE_EV_KW)
    }
}

#[cfg(test)]
#[path = "trace_tests.rs"]
mod tests;
