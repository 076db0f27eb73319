//! Fragment encoding and the per-kind chunked sender.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::sync::mpsc;
use tracing::trace;

use crate::models::message::{OutboundKind, OutboundMessage};
use crate::{AppError, Result};

/// How raw pipe bytes become text fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentEncoding {
    /// Standard padded base64.
    Base64,
    /// UTF-8 text, lossy on invalid input.
    Utf8,
}

/// Stateful encoder turning arbitrary read boundaries into fragments whose
/// concatenation is a single well-formed value.
///
/// Base64 only emits whole 3-byte groups until [`finish`](Self::finish), so
/// no padding appears mid-stream. UTF-8 holds back an incomplete trailing
/// code point until the next read completes it.
#[derive(Debug)]
pub struct FragmentEncoder {
    encoding: FragmentEncoding,
    carry: Vec<u8>,
}

impl FragmentEncoder {
    /// Create an encoder with an empty carry buffer.
    #[must_use]
    pub fn new(encoding: FragmentEncoding) -> Self {
        Self {
            encoding,
            carry: Vec::new(),
        }
    }

    /// Encoding used by this encoder.
    #[must_use]
    pub fn encoding(&self) -> FragmentEncoding {
        self.encoding
    }

    /// Encode the next read. Returns `None` when everything was carried over.
    pub fn push(&mut self, bytes: &[u8]) -> Option<String> {
        self.carry.extend_from_slice(bytes);
        let ready = match self.encoding {
            FragmentEncoding::Base64 => self.carry.len() - self.carry.len() % 3,
            FragmentEncoding::Utf8 => utf8_complete_prefix(&self.carry),
        };
        if ready == 0 {
            return None;
        }
        let head: Vec<u8> = self.carry.drain(..ready).collect();
        Some(self.encode(&head))
    }

    /// Flush whatever is carried at end of stream and reset the encoder.
    pub fn finish(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.carry);
        Some(self.encode(&rest))
    }

    fn encode(&self, bytes: &[u8]) -> String {
        match self.encoding {
            FragmentEncoding::Base64 => STANDARD.encode(bytes),
            FragmentEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// Length of the longest prefix of `bytes` that does not end inside a
/// multi-byte UTF-8 sequence.
fn utf8_complete_prefix(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes.len(),
        Err(err) => match err.error_len() {
            // Truncated sequence at the end: hold it back.
            None => err.valid_up_to(),
            // Genuinely invalid byte: let lossy decoding replace it.
            Some(_) => bytes.len(),
        },
    }
}

/// Sends one kind's fragments and terminators to the outbound channel.
///
/// Enforces the framing rules: empty fragments are never sent as data, and
/// exactly one terminator closes each value.
#[derive(Debug, Clone)]
pub struct ChunkedSender {
    kind: OutboundKind,
    tx: mpsc::Sender<OutboundMessage>,
    open: bool,
}

impl ChunkedSender {
    /// Create a sender for `kind`.
    #[must_use]
    pub fn new(kind: OutboundKind, tx: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            kind,
            tx,
            open: false,
        }
    }

    /// Kind of message produced.
    #[must_use]
    pub fn kind(&self) -> OutboundKind {
        self.kind
    }

    /// Whether a value has started and not yet been terminated.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.open
    }

    /// Send a data fragment. Empty fragments are skipped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Stream` if the outbound channel is closed.
    pub async fn send_fragment(&mut self, fragment: String) -> Result<()> {
        if fragment.is_empty() {
            return Ok(());
        }
        trace!(kind = self.kind.as_str(), len = fragment.len(), "fragment");
        self.open = true;
        self.send(OutboundMessage::new(self.kind, fragment)).await
    }

    /// Send the terminator that ends the current value.
    ///
    /// A terminator is sent even when no fragment preceded it, so every
    /// stream close is visible to the receiver.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Stream` if the outbound channel is closed.
    pub async fn finish(&mut self) -> Result<()> {
        self.open = false;
        self.send(OutboundMessage::terminator(self.kind)).await
    }

    async fn send(&self, msg: OutboundMessage) -> Result<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| AppError::Stream(format!("{} receiver dropped", self.kind.as_str())))
    }
}
