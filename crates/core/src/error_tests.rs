// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn msgset_tags() {
    assert_eq!(GobjError::Parameter("x".into()).msgset(), MsgSet::ParameterError);
    assert_eq!(GobjError::Memory("x".into()).msgset(), MsgSet::MemoryError);
    assert_eq!(GobjError::Protocol("x".into()).msgset(), MsgSet::ProtocolError);
}

#[test]
fn msgset_display() {
    assert_eq!(MsgSet::ParameterError.to_string(), "Parameter Error");
    assert_eq!(MsgSet::ConnectDisconnect.to_string(), "Connect Disconnect");
}

#[test]
fn json_error_converts() {
    let bad: Result<serde_json::Value, _> = serde_json::from_str("{nope");
    let err: GobjError = bad.unwrap_err().into();
    assert_eq!(err.msgset(), MsgSet::JsonError);
}
