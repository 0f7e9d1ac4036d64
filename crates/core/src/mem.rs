// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide memory gauge.
//!
//! Meters the runtime's dynamic payload allocations (gbuffers, attribute
//! records) against two ceilings: the largest single block and the total
//! system memory granted to the process. Exceeding the block ceiling is a
//! recoverable [`GobjError::Memory`]; exceeding the system ceiling aborts
//! the process after a critical log.

use crate::error::{GobjError, MsgSet};
use parking_lot::Mutex;

/// Default largest single block: 16 MiB.
pub const DEFAULT_MAX_BLOCK: usize = 16 * 1024 * 1024;
/// Default total system memory: 64 MiB.
pub const DEFAULT_MAX_SYSTEM: usize = 64 * 1024 * 1024;

struct Gauge {
    max_block: usize,
    max_system: usize,
    in_use: usize,
    /// Cumulative count of live tracked blocks.
    blocks: usize,
    /// High-water mark, reported at shutdown.
    peak: usize,
}

static GAUGE: Mutex<Gauge> = Mutex::new(Gauge {
    max_block: DEFAULT_MAX_BLOCK,
    max_system: DEFAULT_MAX_SYSTEM,
    in_use: 0,
    blocks: 0,
    peak: 0,
});

/// Configure both ceilings. Zero keeps the current value.
pub fn set_maximums(max_block: usize, max_system: usize) {
    let mut g = GAUGE.lock();
    if max_block > 0 {
        g.max_block = max_block;
    }
    if max_system > 0 {
        g.max_system = max_system;
    }
}

pub fn max_block() -> usize {
    GAUGE.lock().max_block
}

pub fn max_system() -> usize {
    GAUGE.lock().max_system
}

/// Register a block of `size` bytes.
///
/// Over the block ceiling: logs and returns [`GobjError::Memory`].
/// Over the system ceiling: critical log and process abort.
pub fn track_alloc(size: usize) -> Result<(), GobjError> {
    let mut g = GAUGE.lock();
    if size > g.max_block {
        let msg = format!("block of {} bytes exceeds maximum of {}", size, g.max_block);
        tracing::error!(msgset = %MsgSet::MemoryError, size, max_block = g.max_block, "{msg}");
        return Err(GobjError::Memory(msg));
    }
    if g.in_use.saturating_add(size) > g.max_system {
        tracing::error!(
            msgset = %MsgSet::MemoryError,
            size,
            in_use = g.in_use,
            max_system = g.max_system,
            "system memory ceiling exceeded, aborting"
        );
        std::process::abort();
    }
    g.in_use += size;
    g.blocks += 1;
    if g.in_use > g.peak {
        g.peak = g.in_use;
    }
    Ok(())
}

/// Release a block previously registered with [`track_alloc`].
pub fn track_free(size: usize) {
    let mut g = GAUGE.lock();
    if size > g.in_use || g.blocks == 0 {
        tracing::error!(
            msgset = %MsgSet::InternalError,
            size,
            in_use = g.in_use,
            "free of untracked memory"
        );
        g.in_use = 0;
        return;
    }
    g.in_use -= size;
    g.blocks -= 1;
}

/// Bytes currently tracked.
pub fn in_use() -> usize {
    GAUGE.lock().in_use
}

/// Live tracked block count.
pub fn block_count() -> usize {
    GAUGE.lock().blocks
}

/// High-water mark of tracked bytes.
pub fn peak() -> usize {
    GAUGE.lock().peak
}

/// Log a leak report if anything is still tracked. Returns the leaked bytes.
pub fn report_leaks() -> usize {
    let g = GAUGE.lock();
    if g.in_use > 0 {
        tracing::error!(
            msgset = %MsgSet::InternalError,
            in_use = g.in_use,
            blocks = g.blocks,
            peak = g.peak,
            "memory still tracked at shutdown"
        );
    }
    g.in_use
}

/// Reset the gauge to defaults. Test support.
pub fn reset() {
    let mut g = GAUGE.lock();
    g.max_block = DEFAULT_MAX_BLOCK;
    g.max_system = DEFAULT_MAX_SYSTEM;
    g.in_use = 0;
    g.blocks = 0;
    g.peak = 0;
}

#[cfg(test)]
#[path = "mem_tests.rs"]
mod tests;
