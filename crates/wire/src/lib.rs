// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! yn-wire: TCP4H byte framing.
//!
//! Wire format: 4-byte big-endian length header that INCLUDES the header
//! itself, followed by the payload. Payload size = length − 4; a length of
//! exactly 4 is a valid empty message.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;

pub use frame::{
    decode, encode, read_frame, read_frame_gbuf, write_frame, write_frame_gbuf, FrameError,
    HEADER_SIZE,
};
