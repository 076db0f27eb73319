//! Session orchestration modules.
//!
//! Covers run directory provisioning, the self-healing named pipe
//! channels, and the per-connection session state machine.

pub mod pipe_channel;
pub mod provisioner;
pub mod session_manager;
