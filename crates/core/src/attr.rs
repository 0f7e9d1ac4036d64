// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed attribute schema.
//!
//! A gclass declares its attributes as a table of [`SdataDesc`] descriptors;
//! each gobj instantiates the table into an [`SData`] record by parsing the
//! declared defaults and overlaying the caller's kw. Writes are type-checked
//! against the descriptor.

use crate::error::{GobjError, MsgSet};
use crate::kw::KwMap;
use serde_json::Value;
use std::sync::Arc;

/// Attribute value type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrType {
    Str,
    Bool,
    Int,
    Real,
    List,
    Dict,
    Json,
    Pointer,
}

crate::simple_display! {
    AttrType {
        Str => "string",
        Bool => "boolean",
        Int => "integer",
        Real => "real",
        List => "list",
        Dict => "dict",
        Json => "json",
        Pointer => "pointer",
    }
}

/// Attribute flag bits.
pub type AttrFlag = u32;

pub const ATTR_RD: AttrFlag = 0x0001;
pub const ATTR_WR: AttrFlag = 0x0002;
/// Must be non-empty/non-zero before `start` succeeds.
pub const ATTR_REQUIRED: AttrFlag = 0x0004;
/// Saved/loaded through the persistent-attrs callbacks.
pub const ATTR_PERSIST: AttrFlag = 0x0008;
/// Reset to the default on every `start`.
pub const ATTR_VOLATIL: AttrFlag = 0x0010;
pub const ATTR_STATS: AttrFlag = 0x0020;
/// Resettable statistic.
pub const ATTR_RSTATS: AttrFlag = 0x0040;
/// Persistent statistic.
pub const ATTR_PSTATS: AttrFlag = 0x0080;
pub const ATTR_FKEY: AttrFlag = 0x0100;
pub const ATTR_PKEY: AttrFlag = 0x0200;
pub const ATTR_WILD_CMD: AttrFlag = 0x0400;
pub const ATTR_AUTHZ_R: AttrFlag = 0x0800;
pub const ATTR_AUTHZ_W: AttrFlag = 0x1000;

/// Declarative attribute descriptor.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SdataDesc {
    pub name: String,
    pub ty: AttrType,
    pub flags: AttrFlag,
    /// Literal default, parsed per type at record build time.
    pub default: String,
    pub description: String,
}

impl SdataDesc {
    pub fn new(name: &str, ty: AttrType, flags: AttrFlag, default: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            ty,
            flags,
            default: default.to_string(),
            description: description.to_string(),
        }
    }

    pub fn str(name: &str, flags: AttrFlag, default: &str, description: &str) -> Self {
        Self::new(name, AttrType::Str, flags, default, description)
    }

    pub fn boolean(name: &str, flags: AttrFlag, default: &str, description: &str) -> Self {
        Self::new(name, AttrType::Bool, flags, default, description)
    }

    pub fn int(name: &str, flags: AttrFlag, default: &str, description: &str) -> Self {
        Self::new(name, AttrType::Int, flags, default, description)
    }

    pub fn real(name: &str, flags: AttrFlag, default: &str, description: &str) -> Self {
        Self::new(name, AttrType::Real, flags, default, description)
    }

    pub fn list(name: &str, flags: AttrFlag, default: &str, description: &str) -> Self {
        Self::new(name, AttrType::List, flags, default, description)
    }

    pub fn dict(name: &str, flags: AttrFlag, default: &str, description: &str) -> Self {
        Self::new(name, AttrType::Dict, flags, default, description)
    }

    pub fn json(name: &str, flags: AttrFlag, default: &str, description: &str) -> Self {
        Self::new(name, AttrType::Json, flags, default, description)
    }

    pub fn pointer(name: &str, flags: AttrFlag, description: &str) -> Self {
        Self::new(name, AttrType::Pointer, flags, "0", description)
    }

    /// Parse the default literal into a typed value.
    pub fn parse_default(&self) -> Value {
        parse_literal(self.ty, &self.default)
    }

    fn accepts(&self, value: &Value) -> bool {
        match self.ty {
            AttrType::Str => value.is_string(),
            AttrType::Bool => value.is_boolean(),
            AttrType::Int | AttrType::Pointer => value.is_i64() || value.is_u64(),
            AttrType::Real => value.is_number(),
            AttrType::List => value.is_array(),
            AttrType::Dict => value.is_object(),
            AttrType::Json => true,
        }
    }
}

fn parse_literal(ty: AttrType, literal: &str) -> Value {
    match ty {
        AttrType::Str => Value::String(literal.to_string()),
        AttrType::Bool => {
            Value::Bool(matches!(literal.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        }
        AttrType::Int | AttrType::Pointer => Value::from(literal.parse::<i64>().unwrap_or(0)),
        AttrType::Real => Value::from(literal.parse::<f64>().unwrap_or(0.0)),
        AttrType::List => match serde_json::from_str::<Value>(literal) {
            Ok(Value::Array(a)) => Value::Array(a),
            _ => Value::Array(vec![]),
        },
        AttrType::Dict => match serde_json::from_str::<Value>(literal) {
            Ok(Value::Object(o)) => Value::Object(o),
            _ => Value::Object(serde_json::Map::new()),
        },
        AttrType::Json => serde_json::from_str::<Value>(literal).unwrap_or(Value::Null),
    }
}

/// Runtime attribute record: descriptor table plus current values.
#[derive(Clone)]
pub struct SData {
    descs: Arc<Vec<SdataDesc>>,
    values: indexmap::IndexMap<String, Value>,
}

impl std::fmt::Debug for SData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

impl SData {
    /// Build the record: defaults first, then the caller kw overlay.
    ///
    /// Unknown keys are logged and skipped; `ignore_unknown` silences the
    /// log. Type-mismatched overlays are logged and skipped.
    pub fn create(descs: Arc<Vec<SdataDesc>>, kw: &KwMap, ignore_unknown: bool) -> SData {
        let mut values = indexmap::IndexMap::new();
        for desc in descs.iter() {
            values.insert(desc.name.clone(), desc.parse_default());
        }
        let mut sdata = SData { descs, values };
        for (key, value) in kw {
            if key.starts_with("__") && key.ends_with("__") {
                // policy keys travel in kw but are not attributes
                continue;
            }
            if sdata.desc(key).is_none() {
                if !ignore_unknown {
                    tracing::error!(
                        msgset = %MsgSet::ParameterError,
                        attr = key,
                        "unknown attribute in kw"
                    );
                }
                continue;
            }
            if let Err(e) = sdata.set(key, value.clone()) {
                tracing::error!(msgset = %MsgSet::ParameterError, attr = key, "{e}");
            }
        }
        sdata
    }

    pub fn desc(&self, name: &str) -> Option<&SdataDesc> {
        self.descs.iter().find(|d| d.name == name)
    }

    pub fn descs(&self) -> &[SdataDesc] {
        &self.descs
    }

    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Type-checked write. Mismatches are a Parameter Error.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), GobjError> {
        let Some(desc) = self.desc(name) else {
            return Err(GobjError::Parameter(format!("unknown attribute {name:?}")));
        };
        if !desc.accepts(&value) {
            return Err(GobjError::Parameter(format!(
                "attribute {name:?} wants {}, got {value}",
                desc.ty
            )));
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Reset every attribute carrying any of `flags` to its default.
    pub fn reset_flagged(&mut self, flags: AttrFlag) {
        let resets: Vec<(String, Value)> = self
            .descs
            .iter()
            .filter(|d| d.flags & flags != 0)
            .map(|d| (d.name.clone(), d.parse_default()))
            .collect();
        for (name, value) in resets {
            self.values.insert(name, value);
        }
    }

    /// Reset every VOLATIL attribute to its default.
    pub fn reset_volatiles(&mut self) {
        self.reset_flagged(ATTR_VOLATIL);
    }

    /// Names of REQUIRED attributes still empty/zero.
    pub fn missing_required(&self) -> Vec<String> {
        self.descs
            .iter()
            .filter(|d| d.flags & ATTR_REQUIRED != 0)
            .filter(|d| {
                match self.values.get(&d.name) {
                    Some(Value::String(s)) => s.is_empty(),
                    Some(Value::Array(a)) => a.is_empty(),
                    Some(Value::Object(o)) => o.is_empty(),
                    Some(Value::Number(n)) => n.as_i64() == Some(0),
                    Some(Value::Null) | None => true,
                    _ => false,
                }
            })
            .map(|d| d.name.clone())
            .collect()
    }

    /// Values whose descriptors carry any of `flags`.
    pub fn snapshot(&self, flags: AttrFlag) -> KwMap {
        let mut out = KwMap::new();
        for desc in self.descs.iter() {
            if desc.flags & flags != 0 {
                if let Some(v) = self.values.get(&desc.name) {
                    out.insert(desc.name.clone(), v.clone());
                }
            }
        }
        out
    }

    /// All values, in declaration order.
    pub fn all(&self) -> KwMap {
        let mut out = KwMap::new();
        for (k, v) in &self.values {
            out.insert(k.clone(), v.clone());
        }
        out
    }
}

/// Selector for the persistence callbacks: everything, named keys, or a
/// key→value dictionary.
#[derive(Debug, Clone)]
pub enum KeySelector {
    All,
    Key(String),
    Keys(Vec<String>),
    Dict(KwMap),
}

impl KeySelector {
    pub fn includes(&self, name: &str) -> bool {
        match self {
            KeySelector::All => true,
            KeySelector::Key(k) => k == name,
            KeySelector::Keys(ks) => ks.iter().any(|k| k == name),
            KeySelector::Dict(d) => d.contains_key(name),
        }
    }
}

/// Persistent-attribute storage, installed process-wide at startup.
///
/// The runtime never touches storage itself: `load` is invoked for
/// service-flagged gobjs during creation (before `mt_create`), the rest on
/// explicit request.
pub trait PersistentAttrs: Send {
    /// Global storage setup.
    fn startup(&mut self) -> Result<(), GobjError> {
        Ok(())
    }

    /// Global storage teardown.
    fn end(&mut self) {}

    /// Apply stored values onto the record of the named service.
    fn load(&mut self, service: &str, attrs: &mut SData) -> Result<(), GobjError>;

    /// Store the writable+persistent attributes selected by `keys`.
    fn save(&mut self, service: &str, attrs: &SData, keys: &KeySelector) -> Result<(), GobjError>;

    /// Remove stored attributes selected by `keys`.
    fn remove(&mut self, service: &str, keys: &KeySelector) -> Result<(), GobjError>;

    /// List stored attributes per service.
    fn list(&mut self) -> Value;
}

#[cfg(test)]
#[path = "attr_tests.rs"]
mod tests;
