//! Protocol messages exchanged with the browser client.
//!
//! Both directions use the same JSON shape: `{"type": "...", "data": "..."}`.
//! Outbound payloads of the three chunked types may be fragments of a larger
//! value; an empty `data` string terminates the value.

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Category of a server → client message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutboundKind {
    /// One filtered interpreter stdout line.
    Stdout,
    /// One raw interpreter stderr chunk.
    Stderr,
    /// Base64 fragment of a plot image.
    Plot,
    /// JSON fragment of a data frame snapshot.
    Dataframe,
    /// JSON fragment of the data frame name list.
    Dflist,
}

impl OutboundKind {
    /// Whether this kind uses empty-payload terminators.
    #[must_use]
    pub fn is_chunked(self) -> bool {
        matches!(self, Self::Plot | Self::Dataframe | Self::Dflist)
    }

    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Plot => "plot",
            Self::Dataframe => "dataframe",
            Self::Dflist => "dflist",
        }
    }
}

/// Server → client message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Message category.
    #[serde(rename = "type")]
    pub kind: OutboundKind,
    /// Payload or fragment; empty for a chunk terminator.
    pub data: String,
}

impl OutboundMessage {
    /// Build a message carrying `data`.
    #[must_use]
    pub fn new(kind: OutboundKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    /// Build the empty-payload terminator for `kind`.
    #[must_use]
    pub fn terminator(kind: OutboundKind) -> Self {
        Self {
            kind,
            data: String::new(),
        }
    }

    /// Whether this message ends a chunked value.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.data.is_empty()
    }

    /// Serialize to the JSON text frame sent over the socket.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|err| AppError::Protocol(format!("failed to encode outbound message: {err}")))
    }
}

/// Client → server command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InboundCommand {
    /// Raw command text forwarded to the interpreter.
    Stdin(String),
    /// Name of an interpreter value to snapshot.
    Dataframe(String),
}

impl InboundCommand {
    /// Build a `stdin` command, terminating `text` with a newline.
    #[must_use]
    pub fn stdin_line(text: &str) -> Self {
        Self::Stdin(format!("{text}\n"))
    }

    /// Build a `dataframe` request for `name`.
    #[must_use]
    pub fn dataframe(name: impl Into<String>) -> Self {
        Self::Dataframe(name.into())
    }

    /// Parse a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` for malformed JSON, an unknown `type`,
    /// or a missing or non-string `data` field.
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| AppError::Protocol(format!("malformed inbound message: {err}")))
    }

    /// Serialize to the JSON text frame sent over the socket.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|err| AppError::Protocol(format!("failed to encode inbound command: {err}")))
    }
}
