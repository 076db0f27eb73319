//! Consumer side of the outbound protocol.
//!
//! [`ClientReassembler`] holds one connection's reassembly state (current
//! plot, partial data frame buffers, transcript) and turns outbound
//! messages into complete values. [`RecentCommandHistory`] is the prompt's
//! up/down recall buffer. Both are per-session values, never globals.

pub mod history;
pub mod reassembler;

pub use history::{RecentCommandHistory, MAX_RECENT_COMMANDS};
pub use reassembler::{
    ClientReassembler, ClientUpdate, DataTable, PlotImage, TranscriptEntry, PLOT_URI_PREFIX,
};
