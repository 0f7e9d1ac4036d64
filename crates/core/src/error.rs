// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime error type, one variant per msgset of the log taxonomy.
//!
//! Most runtime failures are recovered locally: the API logs a record
//! carrying the msgset tag plus context fields and returns the error to the
//! caller. Nothing panics.

use thiserror::Error;

/// Log-record classification tag ("msgset").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgSet {
    ParameterError,
    InternalError,
    MemoryError,
    SystemError,
    OperationalError,
    ProtocolError,
    ConnectDisconnect,
    Connection,
    JsonError,
}

crate::simple_display! {
    MsgSet {
        ParameterError => "Parameter Error",
        InternalError => "Internal Error",
        MemoryError => "Memory Error",
        SystemError => "System Error",
        OperationalError => "Operational Error",
        ProtocolError => "Protocol Error",
        ConnectDisconnect => "Connect Disconnect",
        Connection => "Connection",
        JsonError => "Json Error",
    }
}

/// Errors surfaced by the gobj runtime.
#[derive(Debug, Error)]
pub enum GobjError {
    /// NULL-ish inputs, unknown gclass/state/event, duplicate registration.
    #[error("Parameter error: {0}")]
    Parameter(String),

    /// Invariant violation: double link/unlink, subscription inconsistency.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Allocator refusal, block or system ceiling exceeded.
    #[error("Memory error: {0}")]
    Memory(String),

    /// Socket, filesystem or kernel failures.
    #[error("System error: {0}")]
    System(String),

    /// Lifecycle call on a gobj in the wrong phase.
    #[error("Operational error: {0}")]
    Operational(String),

    /// Stream parse failures.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Encoding/decoding failures.
    #[error("Json error: {0}")]
    Json(String),
}

impl GobjError {
    /// The msgset tag this error is logged under.
    pub fn msgset(&self) -> MsgSet {
        match self {
            GobjError::Parameter(_) => MsgSet::ParameterError,
            GobjError::Internal(_) => MsgSet::InternalError,
            GobjError::Memory(_) => MsgSet::MemoryError,
            GobjError::System(_) => MsgSet::SystemError,
            GobjError::Operational(_) => MsgSet::OperationalError,
            GobjError::Protocol(_) => MsgSet::ProtocolError,
            GobjError::Json(_) => MsgSet::JsonError,
        }
    }
}

impl From<serde_json::Error> for GobjError {
    fn from(e: serde_json::Error) -> Self {
        GobjError::Json(e.to_string())
    }
}

impl From<std::io::Error> for GobjError {
    fn from(e: std::io::Error) -> Self {
        GobjError::System(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
