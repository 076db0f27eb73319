//! Line codec for interpreter stdout.
//!
//! Frames bytes on `\n` with [`tokio_util::codec::AnyDelimiterCodec`] and a
//! maximum line length so a runaway print cannot grow the buffer without
//! bound. Lines are decoded lossily: bytes that are not UTF-8 (a latin1
//! locale message, say) become U+FFFD and the stream carries on. An
//! over-long line is reported once and discarded up to its newline; decoding
//! then resumes.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder};
use tracing::warn;

use crate::{AppError, Result};

/// Maximum stdout line length accepted: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-delimited, lossily decoded framing for interpreter stdout.
#[derive(Debug)]
pub struct TranscriptCodec(AnyDelimiterCodec);

impl TranscriptCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(AnyDelimiterCodec::new_with_max_length(
            b"\n".to_vec(),
            b"\n".to_vec(),
            MAX_LINE_BYTES,
        ))
    }
}

impl Default for TranscriptCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TranscriptCodec {
    type Item = String;
    type Error = AppError;

    // The inner codec keeps discarding after reporting an over-long line,
    // so retrying makes progress. Surfacing the error would end the stream.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.0.decode(src) {
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => report_overflow(),
                other => return other.map(|line| line.map(to_text)).map_err(map_codec_error),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            match self.0.decode_eof(src) {
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => report_overflow(),
                other => return other.map(|line| line.map(to_text)).map_err(map_codec_error),
            }
        }
    }
}

/// Lossy UTF-8 text of one line, without a trailing `\r`.
fn to_text(line: Bytes) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(&line[..]);
    String::from_utf8_lossy(line).into_owned()
}

fn report_overflow() {
    warn!(limit = MAX_LINE_BYTES, "stdout line too long; discarding it");
}

fn map_codec_error(e: AnyDelimiterCodecError) -> AppError {
    match e {
        AnyDelimiterCodecError::MaxChunkLengthExceeded => {
            AppError::Protocol(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        AnyDelimiterCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
