// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FSM dispatcher.
//!
//! `send_event` resolves (current state, event) to an action row and runs
//! it. When the row names a next state, the transition happens BEFORE the
//! action executes: a chained `send_event` from inside the action sees the
//! new state, and the pre-transition state is available as `last_state`.
//! This ordering is load-bearing; do not reorder.

use crate::error::{GobjError, MsgSet};
use crate::event::EV_STATE_CHANGED;
use crate::gclass::mt;
use crate::gobj::{Gobj, Runtime};
use crate::kw::Kw;
use crate::trace::TRACE_STATES;
use serde_json::json;

impl Runtime {
    /// Send an event to a gobj, dispatching through its FSM.
    ///
    /// Returns the action's value. Events unknown to the current state fall
    /// back to `mt_inject_event` when the class defines it.
    pub fn send_event(&mut self, dst: Gobj, event: &str, kw: Kw, src: Gobj) -> Result<i32, GobjError> {
        let Some(data) = self.data(dst) else {
            let msg = format!("send_event {event:?} to a destroyed gobj");
            tracing::error!(msgset = %MsgSet::ParameterError, event, "{msg}");
            return Err(GobjError::Parameter(msg));
        };
        if data.destroying {
            let msg = format!("send_event {event:?} to {} while destroying", self.short_name(dst));
            tracing::error!(msgset = %MsgSet::ParameterError, event, "{msg}");
            return Err(GobjError::Parameter(msg));
        }
        let state_name = data.current_state.clone();

        let row = self
            .class_of(dst)
            .and_then(|gc| gc.state(&state_name))
            .and_then(|st| st.actions.get(event))
            .cloned();

        let Some((action, next_state)) = row else {
            if self.class_defines(dst, mt::INJECT_EVENT) {
                let methods = self.methods_of(dst).ok_or_else(|| {
                    GobjError::Internal("gclass vanished".to_string())
                })?;
                return Ok(methods.mt_inject_event(self, dst, event, kw, src));
            }
            let msg = format!(
                "event {event:?} not accepted in {} state {state_name:?}",
                self.short_name(dst)
            );
            tracing::error!(msgset = %MsgSet::ParameterError, event, state = %state_name, "{msg}");
            return Err(GobjError::Parameter(msg));
        };

        if self.is_machine_tracing(dst) {
            let indent = "  ".repeat(self.inside as usize);
            if self.is_ev_kw_tracing(dst) {
                tracing::trace!(
                    gobj = %self.short_name(dst),
                    src = %self.short_name(src),
                    kw = %serde_json::Value::Object(kw.data.clone()),
                    "{indent}mach: {state_name} <- {event}"
                );
            } else {
                tracing::trace!(
                    gobj = %self.short_name(dst),
                    src = %self.short_name(src),
                    "{indent}mach: {state_name} <- {event}"
                );
            }
        }

        self.inside += 1;
        if let Some(d) = self.data_mut(dst) {
            d.inside += 1;
        }

        // Transition first: the action observes the new state
        if let Some(next) = next_state {
            if let Err(e) = self.change_state(dst, &next) {
                self.inside -= 1;
                if let Some(d) = self.data_mut(dst) {
                    d.inside -= 1;
                }
                return Err(e);
            }
        }

        let ret = match action {
            Some(f) => f(self, dst, event, kw, src),
            None => 0,
        };

        self.inside -= 1;
        let complete_deferred = match self.data_mut(dst) {
            Some(d) => {
                d.inside -= 1;
                d.inside == 0 && d.deferred_destroy
            }
            None => false,
        };
        if complete_deferred {
            let _ = self.destroy_gobj(dst);
        }
        Ok(ret)
    }

    /// Change a gobj's state. Unknown states are refused; a no-op
    /// transition is skipped. Real transitions record the previous state
    /// and publish `EV_STATE_CHANGED`.
    pub fn change_state(&mut self, gobj: Gobj, new_state: &str) -> Result<bool, GobjError> {
        let data = self.resolve(gobj)?;
        if data.current_state == new_state {
            return Ok(false);
        }
        if self.state_of(gobj, new_state).is_none() {
            let msg = format!(
                "unknown state {new_state:?} in {}",
                self.short_name(gobj)
            );
            tracing::error!(msgset = %MsgSet::ParameterError, state = new_state, "{msg}");
            return Err(GobjError::Parameter(msg));
        }
        let previous = {
            let d = self.resolve_mut(gobj)?;
            let previous = std::mem::replace(&mut d.current_state, new_state.to_string());
            d.last_state = previous.clone();
            previous
        };
        if self.is_level_tracing(gobj, TRACE_STATES) {
            tracing::info!(
                gobj = %self.short_name(gobj),
                "state {previous} -> {new_state}"
            );
        }
        let (created, destroying) = {
            let d = self.resolve(gobj)?;
            (d.created, d.destroying)
        };
        if created && !destroying {
            let kw = Kw::from(json!({
                "previous_state": previous,
                "current_state": new_state,
            }));
            if self.class_defines(gobj, mt::STATE_CHANGED) {
                if let Some(m) = self.methods_of(gobj) {
                    m.mt_state_changed(self, gobj, EV_STATE_CHANGED, kw);
                }
            } else {
                self.publish_event(gobj, EV_STATE_CHANGED, kw);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
#[path = "fsm_tests.rs"]
mod tests;
