// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types and completions.

use thiserror::Error;
use yn_core::GBuffer;

/// Completion result for a cancelled submission (ECANCELED).
pub const RESULT_CANCELED: i32 = -125;

/// Event flag bits.
pub const YEV_STOPPED: u32 = 0x01;
pub const YEV_TIMER_PERIODIC: u32 = 0x02;

/// Kind tag of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YevType {
    Timer,
    Accept,
    Connect,
    Read,
    Write,
}

yn_core::simple_display! {
    YevType {
        Timer => "timer",
        Accept => "accept",
        Connect => "connect",
        Read => "read",
        Write => "write",
    }
}

/// Handle to a connection registered in the loop (from accept/connect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub(crate) u64);

/// A delivered completion.
#[derive(Debug)]
pub struct YevEvent {
    pub id: super::YevId,
    pub kind: YevType,
    /// ≥ 0 success (bytes for read/write), < 0 errno-style failure.
    pub result: i32,
    /// `YEV_STOPPED` | `YEV_TIMER_PERIODIC`.
    pub flags: u32,
    /// Connection delivered by accept/connect completions.
    pub conn: Option<ConnId>,
    /// Buffer of read/write completions.
    pub gbuf: Option<GBuffer>,
}

impl YevEvent {
    pub fn is_stopped(&self) -> bool {
        self.flags & YEV_STOPPED != 0
    }
}

/// Completion callback. Runs on the loop task; may start/stop events.
pub type YevCallback = Box<dyn FnMut(&mut super::YevLoop, &YevEvent) + Send>;

/// Event-loop errors.
#[derive(Debug, Error)]
pub enum YevError {
    #[error("Parameter error: {0}")]
    Parameter(String),

    #[error("Operational error: {0}")]
    Operational(String),

    #[error("System error: {0}")]
    System(String),
}
