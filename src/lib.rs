#![forbid(unsafe_code)]

//! Interactive bridge between browser clients and per-connection R
//! interpreter sessions, streaming text output, plots, and data frames.

#[cfg(not(unix))]
compile_error!("data-playground relies on named pipes and only supports Unix platforms");

pub mod client;
pub mod config;
pub mod errors;
pub mod interpreter;
pub mod models;
pub mod orchestrator;
pub mod protocol;
pub mod server;

pub use config::ServerConfig;
pub use errors::{AppError, Result};
