//! Chunked transfer of unbounded payloads over the outbound message channel.
//!
//! A logical value is sent as a run of same-typed messages with non-empty
//! fragments, followed by exactly one message of that type with an empty
//! payload. The receiver owns concatenation; see
//! [`ClientReassembler`](crate::client::ClientReassembler).

pub mod chunked;

pub use chunked::{ChunkedSender, FragmentEncoder, FragmentEncoding};
