// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Growable, reference-counted byte buffer with read/write cursors.
//!
//! `GBuffer` is the universal payload container: cloning the handle is the
//! incref, dropping the last clone frees the storage exactly once. Cursors
//! live behind a mutex so readers and the event loop can share one buffer.
//!
//! Invariant: `0 <= curp <= tail <= max_size`. Appending never grows past
//! `max_size`; the overflow is logged as a Memory Error and only the free
//! bytes are written.

use crate::error::{GobjError, MsgSet};
use crate::mem;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

struct Inner {
    data: Vec<u8>,
    /// Read cursor; write cursor is `data.len()`.
    curp: usize,
    max_size: usize,
    /// Bytes currently registered with the memory gauge.
    allocated: usize,
    label: String,
    mark: u64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.allocated > 0 {
            mem::track_free(self.allocated);
        }
    }
}

/// Shared byte buffer handle. `clone` increfs, `drop` decrefs.
#[derive(Clone)]
pub struct GBuffer(Arc<Mutex<Inner>>);

impl std::fmt::Debug for GBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.0.lock();
        f.debug_struct("GBuffer")
            .field("tail", &inner.data.len())
            .field("curp", &inner.curp)
            .field("max_size", &inner.max_size)
            .field("label", &inner.label)
            .field("mark", &inner.mark)
            .finish()
    }
}

impl GBuffer {
    /// Create a buffer reserving `initial` bytes, growable up to `maximum`.
    pub fn create(initial: usize, maximum: usize) -> Result<GBuffer, GobjError> {
        if maximum == 0 || initial > maximum {
            let msg = format!("bad gbuffer sizes: initial {initial}, maximum {maximum}");
            tracing::error!(msgset = %MsgSet::ParameterError, initial, maximum, "{msg}");
            return Err(GobjError::Parameter(msg));
        }
        if maximum > mem::max_block() {
            let msg = format!("gbuffer maximum {maximum} exceeds block ceiling");
            tracing::error!(msgset = %MsgSet::MemoryError, maximum, "{msg}");
            return Err(GobjError::Memory(msg));
        }
        mem::track_alloc(initial)?;
        Ok(GBuffer(Arc::new(Mutex::new(Inner {
            data: Vec::with_capacity(initial),
            curp: 0,
            max_size: maximum,
            allocated: initial,
            label: String::new(),
            mark: 0,
        }))))
    }

    /// Create from a byte slice, sized exactly to it.
    pub fn from_slice(bytes: &[u8]) -> Result<GBuffer, GobjError> {
        let gbuf = GBuffer::create(bytes.len().max(1), bytes.len().max(1))?;
        gbuf.append(bytes);
        Ok(gbuf)
    }

    /// Live handle count.
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    fn grow_for(inner: &mut Inner, wanted: usize) -> bool {
        // wanted <= max_size is guaranteed by the caller
        if wanted <= inner.allocated {
            return true;
        }
        let mut new_size = inner.allocated.max(1);
        while new_size < wanted {
            new_size = (new_size * 2).min(inner.max_size);
        }
        if mem::track_alloc(new_size).is_err() {
            return false;
        }
        mem::track_free(inner.allocated);
        inner.allocated = new_size;
        inner.data.reserve(new_size - inner.data.len());
        true
    }

    /// Append bytes, growing by doubling up to the maximum.
    ///
    /// Returns the count actually written; a short write means the ceiling
    /// was hit and has been logged as a Memory Error.
    pub fn append(&self, bytes: &[u8]) -> usize {
        let mut inner = self.0.lock();
        let free = inner.max_size - inner.data.len();
        let n = bytes.len().min(free);
        if n > 0 {
            let wanted = inner.data.len() + n;
            if !Self::grow_for(&mut inner, wanted) {
                return 0;
            }
            inner.data.extend_from_slice(&bytes[..n]);
        }
        if n < bytes.len() {
            tracing::error!(
                msgset = %MsgSet::MemoryError,
                wanted = bytes.len(),
                written = n,
                max_size = inner.max_size,
                "gbuffer full, partial append"
            );
        }
        n
    }

    pub fn append_str(&self, s: &str) -> usize {
        self.append(s.as_bytes())
    }

    pub fn append_char(&self, c: u8) -> usize {
        self.append(&[c])
    }

    /// Append the readable region of another buffer (not consumed).
    pub fn append_gbuf(&self, other: &GBuffer) -> usize {
        let bytes = other.with_readable(|b| b.to_vec());
        self.append(&bytes)
    }

    /// Consume `n` bytes from the read cursor. `None` when not enough left.
    pub fn get(&self, n: usize) -> Option<Vec<u8>> {
        let mut inner = self.0.lock();
        if n > inner.data.len() - inner.curp {
            return None;
        }
        let out = inner.data[inner.curp..inner.curp + n].to_vec();
        inner.curp += n;
        Some(out)
    }

    pub fn getchar(&self) -> Option<u8> {
        self.get(1).map(|v| v[0])
    }

    /// Consume through `delim`, returning the bytes before it. Without a
    /// delimiter, the remaining bytes are returned whole.
    pub fn getline(&self, delim: u8) -> Option<Vec<u8>> {
        let mut inner = self.0.lock();
        if inner.curp >= inner.data.len() {
            return None;
        }
        let rest = &inner.data[inner.curp..];
        match rest.iter().position(|&b| b == delim) {
            Some(pos) => {
                let line = rest[..pos].to_vec();
                inner.curp += pos + 1;
                Some(line)
            }
            None => {
                let line = rest.to_vec();
                inner.curp = inner.data.len();
                Some(line)
            }
        }
    }

    /// Borrow the readable region.
    pub fn with_readable<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let inner = self.0.lock();
        f(&inner.data[inner.curp..])
    }

    /// Bytes between the read cursor and the tail.
    pub fn leftbytes(&self) -> usize {
        let inner = self.0.lock();
        inner.data.len() - inner.curp
    }

    /// Bytes written so far.
    pub fn totalbytes(&self) -> usize {
        self.0.lock().data.len()
    }

    /// Bytes still appendable before the ceiling.
    pub fn freebytes(&self) -> usize {
        let inner = self.0.lock();
        inner.max_size - inner.data.len()
    }

    pub fn capacity(&self) -> usize {
        self.0.lock().max_size
    }

    /// `min(leftbytes, max)` — the next readable chunk size.
    pub fn chunk(&self, max: usize) -> usize {
        self.leftbytes().min(max)
    }

    /// Rewind the read cursor.
    pub fn reset_rd(&self) {
        self.0.lock().curp = 0;
    }

    /// Drop all content and rewind both cursors.
    pub fn reset_wr(&self) {
        let mut inner = self.0.lock();
        inner.data.clear();
        inner.curp = 0;
    }

    pub fn clear(&self) {
        self.reset_wr();
    }

    pub fn set_label(&self, label: &str) {
        self.0.lock().label = label.to_string();
    }

    pub fn label(&self) -> String {
        self.0.lock().label.clone()
    }

    pub fn set_mark(&self, mark: u64) {
        self.0.lock().mark = mark;
    }

    pub fn mark(&self) -> u64 {
        self.0.lock().mark
    }

    /// Serialize to `{label, mark, data: base64(readable bytes)}`.
    /// Non-destructive: the read cursor stays put.
    pub fn serialize(&self) -> Value {
        let inner = self.0.lock();
        json!({
            "label": inner.label,
            "mark": inner.mark,
            "data": base64::encode(&inner.data[inner.curp..]),
        })
    }

    /// Inverse of [`serialize`](Self::serialize): bytes, label and mark are
    /// restored from the JSON object.
    pub fn deserialize(value: &Value) -> Result<GBuffer, GobjError> {
        let Some(obj) = value.as_object() else {
            let msg = "gbuffer deserialize needs an object".to_string();
            tracing::error!(msgset = %MsgSet::ParameterError, "{msg}");
            return Err(GobjError::Parameter(msg));
        };
        let label = crate::kw::kw_get_str(obj, "label", "", false);
        let mark = crate::kw::kw_get_int(obj, "mark", 0, false) as u64;
        let data = crate::kw::kw_get_str(obj, "data", "", false);
        let bytes = from_base64(data)?;
        let gbuf = GBuffer::create(bytes.len().max(1), bytes.len().max(1))?;
        gbuf.append(&bytes);
        gbuf.set_label(label);
        gbuf.set_mark(mark);
        Ok(gbuf)
    }
}

/// RFC-4648/1521 standard alphabet with `=` padding.
pub fn to_base64(bytes: &[u8]) -> String {
    base64::encode(bytes)
}

/// Strict decode: characters outside the alphabet are rejected.
pub fn from_base64(s: &str) -> Result<Vec<u8>, GobjError> {
    base64::decode(s).map_err(|e| {
        let msg = format!("bad base64: {e}");
        tracing::error!(msgset = %MsgSet::JsonError, "{msg}");
        GobjError::Json(msg)
    })
}

#[cfg(test)]
#[path = "gbuf_tests.rs"]
mod tests;
