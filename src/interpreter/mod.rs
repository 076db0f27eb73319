//! Interpreter child process handling.
//!
//! - `spawner`: launches the interpreter in the run directory with the
//!   connection's environment.
//! - `codec`: newline framing for stdout with a per-line size limit.
//! - `reader`: stdout (marker-filtered) and stderr fan-in tasks.
//! - `writer`: command sink task feeding the interpreter's stdin.
//! - `commands`: text of the injected bookkeeping commands.

pub mod codec;
pub mod commands;
pub mod reader;
pub mod spawner;
pub mod writer;

/// Interpreter stream lifecycle notifications sent to the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamClosed {
    /// Writing to stdin failed.
    Stdin,
    /// stdout reached EOF or failed.
    Stdout,
}
