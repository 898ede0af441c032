//! Incremental reader for the `images/pull` progress stream.
//!
//! libpod writes one JSON object per progress step, with or without newlines
//! between them, and reports a failed pull as an object carrying `error`.
//! Frames may split an object anywhere.

use bytes::{Buf, BytesMut};

use super::models::PullReport;

/// Consumes progress frames as they arrive, keeping only an unfinished record.
#[derive(Debug, Default)]
pub(super) struct PullProgress {
    pending: BytesMut,
}

impl PullProgress {
    /// Feed one frame and return the first failure it completes.
    pub(super) fn feed(&mut self, frame: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(frame);
        let mut records =
            serde_json::Deserializer::from_slice(&self.pending).into_iter::<PullReport>();
        let mut failure = None;
        for record in records.by_ref() {
            match record {
                Ok(report) if !report.error.is_empty() => {
                    failure = Some(report.error);
                    break;
                }
                Ok(report) => {
                    if !report.stream.is_empty() {
                        tracing::trace!(status = %report.stream.trim_end(), "pull progress");
                    }
                }
                Err(e) if e.is_eof() => break,
                Err(e) => {
                    failure = Some(format!("malformed pull progress: {e}"));
                    break;
                }
            }
        }
        let consumed = records.byte_offset();
        self.pending.advance(consumed);
        failure
    }

    /// Report a record left unfinished when the stream ended.
    pub(super) fn finish(&self) -> Option<String> {
        if self.pending.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(String::from("pull progress ended mid-record"))
        }
    }
}
