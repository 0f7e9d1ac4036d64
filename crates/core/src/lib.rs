// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! yn-core: the gobj runtime — gclass registry, gobj tree, FSM dispatcher,
//! typed attributes, publish/subscribe, byte buffers, trace machinery.

pub mod macros;

pub mod attr;
pub mod error;
pub mod event;
pub mod fsm;
pub mod gbuf;
pub mod gclass;
pub mod gobj;
pub mod helpers;
pub mod kw;
pub mod list;
pub mod mem;
pub mod subs;
pub mod trace;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Runtime version, reported in protocol user agents.
pub const YUNETA_VERSION: &str = "7.0.0";

pub use attr::{AttrFlag, AttrType, KeySelector, PersistentAttrs, SData, SdataDesc};
pub use error::{GobjError, MsgSet};
pub use event::{EventFlag, EventType, EV_STATE_CHANGED};
pub use gbuf::GBuffer;
pub use gclass::{ActionFn, ClassFlag, DefaultMethods, EvAction, GClassBuilder, GobjMethods};
pub use gobj::{Gobj, GobjFlag, Runtime, WalkOrder};
pub use kw::{Kw, KwMap};
pub use list::{Registry, RegistryId};
pub use subs::{SubsId, SubsOptions, Subscription};
