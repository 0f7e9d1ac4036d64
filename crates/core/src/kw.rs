// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyword-argument dictionaries.
//!
//! Events carry a free-form JSON object (`kw`) plus an optional byte-buffer
//! rider for binary payloads. Getters take a default and a `required` flag;
//! a missing required key logs a Parameter Error and yields the default.

use crate::error::MsgSet;
use crate::gbuf::GBuffer;
use serde_json::Value;

pub type KwMap = serde_json::Map<String, Value>;

/// Event payload: JSON data plus an optional binary rider.
#[derive(Debug, Clone, Default)]
pub struct Kw {
    pub data: KwMap,
    pub gbuf: Option<GBuffer>,
}

impl Kw {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(data: KwMap) -> Self {
        Self { data, gbuf: None }
    }

    pub fn with_gbuf(mut self, gbuf: GBuffer) -> Self {
        self.gbuf = Some(gbuf);
        self
    }

    /// Take the binary rider, leaving the JSON data in place.
    pub fn take_gbuf(&mut self) -> Option<GBuffer> {
        self.gbuf.take()
    }
}

impl From<Value> for Kw {
    fn from(v: Value) -> Self {
        match v {
            Value::Object(map) => Kw::from_map(map),
            _ => Kw::new(),
        }
    }
}

fn warn_required(key: &str, expected: &str) {
    tracing::error!(
        msgset = %MsgSet::ParameterError,
        key,
        expected,
        "required kw key missing or wrong type"
    );
}

pub fn kw_get_str<'a>(kw: &'a KwMap, key: &str, default: &'a str, required: bool) -> &'a str {
    match kw.get(key).and_then(Value::as_str) {
        Some(s) => s,
        None => {
            if required {
                warn_required(key, "string");
            }
            default
        }
    }
}

pub fn kw_get_int(kw: &KwMap, key: &str, default: i64, required: bool) -> i64 {
    match kw.get(key).and_then(Value::as_i64) {
        Some(v) => v,
        None => {
            if required {
                warn_required(key, "integer");
            }
            default
        }
    }
}

pub fn kw_get_real(kw: &KwMap, key: &str, default: f64, required: bool) -> f64 {
    match kw.get(key).and_then(Value::as_f64) {
        Some(v) => v,
        None => {
            if required {
                warn_required(key, "real");
            }
            default
        }
    }
}

pub fn kw_get_bool(kw: &KwMap, key: &str, default: bool, required: bool) -> bool {
    match kw.get(key).and_then(Value::as_bool) {
        Some(v) => v,
        None => {
            if required {
                warn_required(key, "boolean");
            }
            default
        }
    }
}

pub fn kw_get_dict<'a>(kw: &'a KwMap, key: &str, required: bool) -> Option<&'a KwMap> {
    match kw.get(key).and_then(Value::as_object) {
        Some(v) => Some(v),
        None => {
            if required {
                warn_required(key, "dict");
            }
            None
        }
    }
}

pub fn kw_get_list<'a>(kw: &'a KwMap, key: &str, required: bool) -> Option<&'a Vec<Value>> {
    match kw.get(key).and_then(Value::as_array) {
        Some(v) => Some(v),
        None => {
            if required {
                warn_required(key, "list");
            }
            None
        }
    }
}

/// Update `dst` with every key of `src` (overwriting).
pub fn kw_merge(dst: &mut KwMap, src: &KwMap) {
    for (k, v) in src {
        dst.insert(k.clone(), v.clone());
    }
}

/// Remove `keys` from `kw`. Missing keys are ignored.
pub fn kw_delete_keys(kw: &mut KwMap, keys: &[String]) {
    for k in keys {
        kw.remove(k);
    }
}

fn value_matches(candidate: &Value, wanted: &Value) -> bool {
    match wanted {
        // A list in the filter is a set of alternatives
        Value::Array(alts) => alts.iter().any(|alt| value_matches(candidate, alt)),
        Value::String(_) | Value::Bool(_) | Value::Number(_) | Value::Null => candidate == wanted,
        // Dicts and other shapes don't take part in simple matching
        _ => false,
    }
}

/// Simple match: every key of `filter` must exist in `kw` and compare equal
/// (string, integer, real, boolean; a filter list matches any member).
pub fn kw_match_simple(kw: &KwMap, filter: &KwMap) -> bool {
    filter.iter().all(|(k, wanted)| kw.get(k).is_some_and(|v| value_matches(v, wanted)))
}

/// Signature of the process-wide publication match function.
pub type KwMatchFn = fn(&KwMap, &KwMap) -> bool;

#[cfg(test)]
#[path = "kw_tests.rs"]
mod tests;
