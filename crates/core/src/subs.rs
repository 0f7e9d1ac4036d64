// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Publish/subscribe engine.
//!
//! A subscription links a publisher and a subscriber for one event (or all,
//! with `None`) and carries per-subscription policy: `global` keys merged
//! into every delivered kw, `local` keys stripped from it, an optional
//! `filter` match predicate, and the `hard_subscription`/`own_event` flags.
//!
//! Every record is referenced from both endpoints' lists; publication
//! iterates a snapshot so a subscriber unsubscribing (or dying) mid-loop
//! cannot corrupt the iteration.

use crate::error::{GobjError, MsgSet};
use crate::event::{EVF_NO_WARN_SUBS, EV_STATE_CHANGED};
use crate::gclass::{mt, GCF_NO_CHECK_OUTPUT_EVENTS};
use crate::gobj::{Gobj, Runtime};
use crate::kw::{kw_delete_keys, kw_merge, Kw, KwMap};
use crate::trace::TRACE_SUBSCRIPTIONS;

/// Handle to a subscription record.
pub type SubsId = crate::list::RegistryId;

/// Per-subscription policy.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SubsOptions {
    /// Survives normal unsubscribe; still cleared by destruction.
    pub hard_subscription: bool,
    /// A −1 action return stops the publication loop and reports −1.
    pub own_event: bool,
    /// Merged into every published kw.
    pub global: KwMap,
    /// Keys stripped from every published kw.
    pub local: Vec<String>,
    /// Match predicate against the published kw.
    pub filter: Option<KwMap>,
    /// Informational.
    pub service: Option<String>,
}

impl SubsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hard(mut self) -> Self {
        self.hard_subscription = true;
        self
    }

    pub fn own_event(mut self) -> Self {
        self.own_event = true;
        self
    }

    pub fn global(mut self, global: KwMap) -> Self {
        self.global = global;
        self
    }

    pub fn local_keys(mut self, keys: &[&str]) -> Self {
        self.local = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn filter(mut self, filter: KwMap) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn service(mut self, service: &str) -> Self {
        self.service = Some(service.to_string());
        self
    }

    /// Duplicate criterion: the three policy dicts, not the filter.
    fn same_policies(&self, other: &SubsOptions) -> bool {
        self.hard_subscription == other.hard_subscription
            && self.own_event == other.own_event
            && self.global == other.global
            && self.local == other.local
    }
}

/// A subscription record.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub publisher: Gobj,
    pub subscriber: Gobj,
    /// `None` subscribes to every output event.
    pub event: Option<String>,
    pub opts: SubsOptions,
}

impl Runtime {
    /// Subscribe `subscriber` to an output event of `publisher`.
    ///
    /// A repeated subscription (same endpoints, event and policies) is
    /// removed with a warning before the new one is inserted. The
    /// publisher's `mt_subscription_added` may veto with a negative return.
    pub fn subscribe_event(
        &mut self,
        publisher: Gobj,
        event: Option<&str>,
        opts: SubsOptions,
        subscriber: Gobj,
    ) -> Result<SubsId, GobjError> {
        if !self.exists(publisher) || !self.exists(subscriber) {
            let msg = "subscribe with a destroyed endpoint".to_string();
            tracing::error!(msgset = %MsgSet::ParameterError, "{msg}");
            return Err(GobjError::Parameter(msg));
        }
        if let Some(event) = event {
            let declared = {
                let gc = self
                    .class_of(publisher)
                    .ok_or_else(|| GobjError::Internal("gclass vanished".to_string()))?;
                gc.has_flag(GCF_NO_CHECK_OUTPUT_EVENTS) || self.event_is_output(gc, event)
            };
            if !declared {
                let msg = format!(
                    "event {event:?} is not an output event of {}",
                    self.short_name(publisher)
                );
                tracing::error!(msgset = %MsgSet::ParameterError, event, "{msg}");
                return Err(GobjError::Parameter(msg));
            }
        }

        // Replace repeated subscriptions
        let repeated: Vec<SubsId> = self
            .resolve(publisher)?
            .dl_subs
            .iter()
            .copied()
            .filter(|id| {
                self.subs.get(*id).is_some_and(|s| {
                    s.subscriber == subscriber
                        && s.event.as_deref() == event
                        && s.opts.same_policies(&opts)
                })
            })
            .collect();
        for id in repeated {
            tracing::warn!(
                msgset = %MsgSet::ParameterError,
                publisher = %self.short_name(publisher),
                subscriber = %self.short_name(subscriber),
                event = event.unwrap_or("*"),
                "repeated subscription, replacing"
            );
            let _ = self.delete_subscription(id, true);
        }

        let id = self.subs.add(Subscription {
            publisher,
            subscriber,
            event: event.map(str::to_string),
            opts,
        });

        if self.class_defines(publisher, mt::SUBSCRIPTION_ADDED) {
            let methods = self
                .methods_of(publisher)
                .ok_or_else(|| GobjError::Internal("gclass vanished".to_string()))?;
            if methods.mt_subscription_added(self, publisher, id) < 0 {
                self.subs.remove(id);
                return Err(GobjError::Operational("subscription rejected".to_string()));
            }
        }

        if let Some(d) = self.data_mut(publisher) {
            d.dl_subs.push(id);
        }
        if let Some(d) = self.data_mut(subscriber) {
            d.dl_subscribings.push(id);
        }
        if self.is_level_tracing(publisher, TRACE_SUBSCRIPTIONS) {
            tracing::info!(
                publisher = %self.short_name(publisher),
                subscriber = %self.short_name(subscriber),
                event = event.unwrap_or("*"),
                "subscribed"
            );
        }
        Ok(id)
    }

    /// Remove the subscription matching (publisher, subscriber, event,
    /// policies). Hard subscriptions refuse normal unsubscribe.
    pub fn unsubscribe_event(
        &mut self,
        publisher: Gobj,
        event: Option<&str>,
        opts: &SubsOptions,
        subscriber: Gobj,
    ) -> Result<(), GobjError> {
        let found = self
            .resolve(publisher)?
            .dl_subs
            .iter()
            .copied()
            .find(|id| {
                self.subs.get(*id).is_some_and(|s| {
                    s.subscriber == subscriber
                        && s.event.as_deref() == event
                        && s.opts.same_policies(opts)
                })
            });
        let Some(id) = found else {
            let msg = format!(
                "subscription not found: {} -> {} event {}",
                self.short_name(publisher),
                self.short_name(subscriber),
                event.unwrap_or("*")
            );
            tracing::error!(msgset = %MsgSet::ParameterError, "{msg}");
            return Err(GobjError::Parameter(msg));
        };
        self.delete_subscription(id, false)
    }

    /// Delete a subscription record. `force` overrides `hard_subscription`.
    pub fn delete_subscription(&mut self, id: SubsId, force: bool) -> Result<(), GobjError> {
        let Some(sub) = self.subs.get(id).cloned() else {
            return Err(GobjError::Parameter("subscription already deleted".to_string()));
        };
        if sub.opts.hard_subscription && !force {
            let msg = "hard subscription, delete refused".to_string();
            tracing::error!(msgset = %MsgSet::OperationalError, "{msg}");
            return Err(GobjError::Operational(msg));
        }
        if self.class_defines(sub.publisher, mt::SUBSCRIPTION_DELETED) {
            if let Some(m) = self.methods_of(sub.publisher) {
                m.mt_subscription_deleted(self, sub.publisher, id);
            }
        }
        if let Some(d) = self.data_mut(sub.publisher) {
            d.dl_subs.retain(|x| *x != id);
        }
        if let Some(d) = self.data_mut(sub.subscriber) {
            d.dl_subscribings.retain(|x| *x != id);
        }
        self.subs.remove(id);
        if self.is_level_tracing(sub.publisher, TRACE_SUBSCRIPTIONS) {
            tracing::info!(
                publisher = %self.short_name(sub.publisher),
                subscriber = %self.short_name(sub.subscriber),
                "unsubscribed"
            );
        }
        Ok(())
    }

    /// Subscription ids where the gobj is the publisher.
    pub fn subscriptions(&self, publisher: Gobj) -> Vec<SubsId> {
        self.data(publisher).map(|d| d.dl_subs.clone()).unwrap_or_default()
    }

    /// Subscription ids where the gobj is the subscriber.
    pub fn subscribings(&self, subscriber: Gobj) -> Vec<SubsId> {
        self.data(subscriber).map(|d| d.dl_subscribings.clone()).unwrap_or_default()
    }

    pub fn subscription(&self, id: SubsId) -> Option<&Subscription> {
        self.subs.get(id)
    }

    /// Drop every subscription where the gobj is the subscriber. Hard
    /// subscriptions survive unless `force`.
    pub fn unsubscribe_list(&mut self, subscriber: Gobj, force: bool) {
        for id in self.subscribings(subscriber) {
            let _ = self.delete_subscription(id, force);
        }
    }

    /// Destruction cascade: drop every record touching the gobj, hard ones
    /// included.
    pub(crate) fn delete_all_subscriptions_of(&mut self, gobj: Gobj) {
        let mut ids = self.subscriptions(gobj);
        ids.extend(self.subscribings(gobj));
        for id in ids {
            let _ = self.delete_subscription(id, true);
        }
    }

    /// Publish an output event to every matching subscriber.
    ///
    /// Returns the number of deliveries, or −1 when a subscriber with the
    /// `own_event` policy returned −1 and owned the event.
    pub fn publish_event(&mut self, publisher: Gobj, event: &str, kw: Kw) -> i32 {
        let Some(data) = self.data(publisher) else {
            tracing::error!(msgset = %MsgSet::ParameterError, event, "publish from destroyed gobj");
            return -1;
        };
        if data.destroying {
            tracing::error!(
                msgset = %MsgSet::ParameterError,
                event,
                gobj = %self.short_name(publisher),
                "publish while destroying"
            );
            return -1;
        }

        let declared = {
            let Some(gc) = self.class_of(publisher) else {
                return -1;
            };
            gc.has_flag(GCF_NO_CHECK_OUTPUT_EVENTS) || self.event_is_output(gc, event)
        };
        if !declared {
            tracing::error!(
                msgset = %MsgSet::ParameterError,
                event,
                gobj = %self.short_name(publisher),
                "event is not declared OUTPUT, publishing to nobody"
            );
            return 0;
        }

        let mut kw = kw;
        if self.class_defines(publisher, mt::PUBLISH_EVENT) {
            let Some(methods) = self.methods_of(publisher) else {
                return -1;
            };
            let ret = methods.mt_publish_event(self, publisher, event, &mut kw);
            if ret < 0 {
                return -1;
            }
            if ret == 0 {
                return 0;
            }
        }

        // Snapshot: deletions during delivery cannot corrupt the loop
        let snapshot = self.subscriptions(publisher);
        let pre_filter = self.class_defines(publisher, mt::PUBLICATION_PRE_FILTER);
        let custom_filter = self.class_defines(publisher, mt::PUBLICATION_FILTER);

        let mut candidates = 0;
        let mut sent = 0;
        for id in snapshot {
            let Some(sub) = self.subs.get(id).cloned() else {
                continue; // deleted mid-publication
            };
            if let Some(sub_event) = &sub.event {
                if sub_event != event {
                    continue;
                }
            }
            candidates += 1;

            if pre_filter {
                let Some(methods) = self.methods_of(publisher) else {
                    break;
                };
                let ret = methods.mt_publication_pre_filter(self, publisher, id, event, &mut kw);
                if ret < 0 {
                    break;
                }
                if ret == 0 {
                    continue;
                }
            }

            if !self.exists(sub.subscriber) || self.is_destroying(sub.subscriber) {
                continue;
            }

            if let Some(filter) = &sub.opts.filter {
                let matched = if custom_filter {
                    let Some(methods) = self.methods_of(publisher) else {
                        break;
                    };
                    methods.mt_publication_filter(self, publisher, event, &kw, sub.subscriber)
                } else {
                    (self.publish_match)(&kw.data, filter)
                };
                if !matched {
                    continue;
                }
            }

            // State changes only reach subscribers able to process them
            if event == EV_STATE_CHANGED {
                let state = self.current_state(sub.subscriber);
                let accepts = self
                    .state_of(sub.subscriber, &state)
                    .map(|st| st.actions.contains_key(event))
                    .unwrap_or(false);
                if !accepts {
                    continue;
                }
            }

            let mut delivery = kw.data.clone();
            kw_delete_keys(&mut delivery, &sub.opts.local);
            kw_merge(&mut delivery, &sub.opts.global);
            let delivery = Kw { data: delivery, gbuf: kw.gbuf.clone() };

            let ret = self
                .send_event(sub.subscriber, event, delivery, publisher)
                .unwrap_or(-1);
            sent += 1;
            if ret == -1 && sub.opts.own_event {
                return -1;
            }
        }

        if candidates == 0 {
            let no_warn = self
                .class_of(publisher)
                .map(|gc| self.event_flags(gc, event) & EVF_NO_WARN_SUBS != 0)
                .unwrap_or(false);
            if !no_warn {
                tracing::warn!(
                    msgset = %MsgSet::OperationalError,
                    event,
                    gobj = %self.short_name(publisher),
                    "publish without subscribers"
                );
            }
        }
        sent
    }
}

#[cfg(test)]
#[path = "subs_tests.rs"]
mod tests;
