// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-prefixed framing: encode/decode plus async read/write.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::error;
use yn_core::error::MsgSet;
use yn_core::GBuffer;

/// The 4 header bytes, counted inside the advertised length.
pub const HEADER_SIZE: usize = 4;

/// Framing errors. An oversized or undersized length means the stream is
/// poisoned: the caller must drop the connection.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Advertised length exceeds the configured maximum.
    #[error("Memory error: frame of {length} bytes exceeds maximum {max}")]
    TooBig { length: u32, max: u32 },

    /// Advertised length smaller than the header itself.
    #[error("Protocol error: frame length {length} below header size")]
    BadLength { length: u32 },

    /// Peer closed or I/O failed.
    #[error("System error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame a payload: header (length including itself) then payload.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let length = (payload.len() + HEADER_SIZE) as u32;
    let mut frame = Vec::with_capacity(payload.len() + HEADER_SIZE);
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Split one complete frame into its payload. The input must hold the
/// whole frame, nothing less.
pub fn decode(frame: &[u8], max_pkt_size: u32) -> Result<&[u8], FrameError> {
    if frame.len() < HEADER_SIZE {
        return Err(FrameError::BadLength { length: frame.len() as u32 });
    }
    let length = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
    check_length(length, max_pkt_size)?;
    let payload_len = (length as usize) - HEADER_SIZE;
    if frame.len() < HEADER_SIZE + payload_len {
        return Err(FrameError::BadLength { length });
    }
    Ok(&frame[HEADER_SIZE..HEADER_SIZE + payload_len])
}

fn check_length(length: u32, max_pkt_size: u32) -> Result<(), FrameError> {
    if length < HEADER_SIZE as u32 {
        error!(msgset = %MsgSet::ProtocolError, length, "frame length below header size");
        return Err(FrameError::BadLength { length });
    }
    if length > max_pkt_size {
        error!(
            msgset = %MsgSet::MemoryError,
            length,
            max = max_pkt_size,
            "frame exceeds maximum packet size, drop the connection"
        );
        return Err(FrameError::TooBig { length, max: max_pkt_size });
    }
    Ok(())
}

/// Write one frame: header and payload as two separate writes.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), FrameError> {
    let length = (payload.len() + HEADER_SIZE) as u32;
    writer.write_all(&length.to_be_bytes()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Write the readable region of a gbuffer as one frame (not consumed).
pub async fn write_frame_gbuf<W: AsyncWrite + Unpin>(
    writer: &mut W,
    gbuf: &GBuffer,
) -> Result<(), FrameError> {
    let payload = gbuf.with_readable(|b| b.to_vec());
    write_frame(writer, &payload).await
}

/// Read one frame, enforcing `max_pkt_size` on the advertised length.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_pkt_size: u32,
) -> Result<Vec<u8>, FrameError> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;
    let length = u32::from_be_bytes(header);
    check_length(length, max_pkt_size)?;
    let payload_len = (length as usize) - HEADER_SIZE;
    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        reader.read_exact(&mut payload).await?;
    }
    Ok(payload)
}

/// Read one frame into a fresh gbuffer.
pub async fn read_frame_gbuf<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_pkt_size: u32,
) -> Result<GBuffer, FrameError> {
    let payload = read_frame(reader, max_pkt_size).await?;
    GBuffer::from_slice(&payload)
        .map_err(|e| FrameError::Io(std::io::Error::other(e.to_string())))
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
