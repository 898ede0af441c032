//! Decoder for the framed stdout/stderr stream of a non-TTY exec session.
//!
//! Every frame starts with an 8-byte header: one byte naming the stream, three
//! padding bytes, and the payload length as a big-endian `u32`.

use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use super::super::OutputChunk;

const HEADER_LEN: usize = 8;

/// Most buffer space reserved ahead of a frame's payload arriving.
const MAX_RESERVE: usize = 64 * 1024;

/// Splits a framed exec stream into [`OutputChunk`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecFrameDecoder;

impl Decoder for ExecFrameDecoder {
    type Item = OutputChunk;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header_slice) = src.get(..HEADER_LEN) else {
            return Ok(None);
        };
        let header: [u8; HEADER_LEN] = header_slice
            .try_into()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "short frame header"))?;
        let [stream, _, _, _, len_bytes @ ..] = header;
        let payload_len = usize::try_from(frame_length(len_bytes))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let frame_len = HEADER_LEN.saturating_add(payload_len);

        if src.len() < frame_len {
            src.reserve(frame_len.saturating_sub(src.len()).min(MAX_RESERVE));
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(payload_len).freeze();
        match stream {
            0 | 1 => Ok(Some(OutputChunk::Stdout(payload))),
            2 => Ok(Some(OutputChunk::Stderr(payload))),
            3 => Err(io::Error::other(format!(
                "engine reported a stream error: {}",
                String::from_utf8_lossy(&payload).trim()
            ))),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown stream id {other} in exec frame"),
            )),
        }
    }
}

#[expect(
    clippy::big_endian_bytes,
    reason = "frame lengths are big-endian on the wire"
)]
const fn frame_length(bytes: [u8; 4]) -> u32 {
    u32::from_be_bytes(bytes)
}
