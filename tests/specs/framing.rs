// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP4H framing over a live stream.

use yn_core::GBuffer;
use yn_wire::{read_frame, read_frame_gbuf, write_frame, write_frame_gbuf, FrameError};

const MAX_PKT: u32 = 16 * 1024;

#[tokio::test]
async fn framed_messages_cross_a_duplex_stream() {
    let (mut client, mut server) = tokio::io::duplex(64 * 1024);

    let payload = GBuffer::create(64, 64).unwrap();
    payload.append(b"\"command\"");
    write_frame_gbuf(&mut client, &payload).await.unwrap();
    write_frame(&mut client, b"").await.unwrap();

    let first = read_frame_gbuf(&mut server, MAX_PKT).await.unwrap();
    assert_eq!(first.with_readable(|b| b.to_vec()), b"\"command\"");
    let second = read_frame(&mut server, MAX_PKT).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn oversized_advertisement_means_drop() {
    let (mut client, mut server) = tokio::io::duplex(64 * 1024);
    // a poisoned header advertising more than the maximum
    tokio::io::AsyncWriteExt::write_all(&mut client, &(MAX_PKT + 100).to_be_bytes())
        .await
        .unwrap();
    let err = read_frame(&mut server, MAX_PKT).await.unwrap_err();
    assert!(matches!(err, FrameError::TooBig { .. }));
    // the reader must not be trusted further; the caller closes it here
    drop(server);
}
