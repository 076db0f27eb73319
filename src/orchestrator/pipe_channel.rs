//! Self-healing named pipe channel.
//!
//! A FIFO delivers one writer session per open: the reader sees data, then
//! EOF once the writer closes. [`NamedPipeChannel`] hides that cycle behind
//! a durable logical stream. On every EOF it, in order:
//!
//! 1. flushes the fragment encoder and emits one terminator,
//! 2. reopens the same path for reading,
//! 3. replaces its current stream with the reopened one.
//!
//! The read end is opened non-blocking and driven by reactor readiness, so
//! an idle channel holds no thread. Until a writer connects the reader is
//! simply not readable; the writer's close then shows up as a zero-length
//! read.
//!
//! The loop only ends at session teardown. A writer that starts between the
//! EOF and the reopen is still served, since opening a FIFO for writing
//! waits for a reader. A stream error leaves the channel inert until
//! teardown; it is not retried.

use std::path::{Path, PathBuf};

use nix::sys::stat::Mode;
use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PipeNames;
use crate::models::message::OutboundKind;
use crate::protocol::{ChunkedSender, FragmentEncoder, FragmentEncoding};
use crate::{AppError, Result};

/// Read buffer size for a single pipe read.
pub const READ_BUF_BYTES: usize = 64 * 1024;


/// The three pipes every session owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipeKind {
    /// Plot image written by the plot device.
    Image,
    /// JSON snapshot of one requested data frame.
    Dataframe,
    /// JSON list of data frame names in the workspace.
    Dflist,
}

impl PipeKind {
    /// All kinds, in setup order.
    pub const ALL: [Self; 3] = [Self::Image, Self::Dataframe, Self::Dflist];

    /// Outbound message kind emitted for this pipe.
    #[must_use]
    pub fn outbound_kind(self) -> OutboundKind {
        match self {
            Self::Image => OutboundKind::Plot,
            Self::Dataframe => OutboundKind::Dataframe,
            Self::Dflist => OutboundKind::Dflist,
        }
    }

    /// Text encoding applied to the pipe's bytes.
    #[must_use]
    pub fn encoding(self) -> FragmentEncoding {
        match self {
            Self::Image => FragmentEncoding::Base64,
            Self::Dataframe | Self::Dflist => FragmentEncoding::Utf8,
        }
    }

    /// Configured file name of this pipe.
    #[must_use]
    pub fn file_name(self, names: &PipeNames) -> &str {
        match self {
            Self::Image => &names.image,
            Self::Dataframe => &names.dataframe,
            Self::Dflist => &names.dflist,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Dataframe => "dataframe",
            Self::Dflist => "dflist",
        }
    }
}

/// Session-side view of a running channel.
///
/// The path is the channel's stable identity; `closes` counts the
/// terminators emitted so far, one per writer cycle.
#[derive(Debug, Clone)]
pub struct PipeHandle {
    /// Which pipe this is.
    pub kind: PipeKind,
    /// Path of the FIFO special file.
    pub path: PathBuf,
    closes: watch::Receiver<u64>,
}

impl PipeHandle {
    /// Number of close cycles handled so far.
    #[must_use]
    pub fn close_count(&self) -> u64 {
        *self.closes.borrow()
    }

    /// Wait until at least `count` close cycles have been handled.
    ///
    /// Returns `false` if the channel stopped first.
    pub async fn wait_for_closes(&mut self, count: u64) -> bool {
        self.closes.wait_for(|seen| *seen >= count).await.is_ok()
    }
}

/// Durable logical stream over one FIFO.
#[derive(Debug)]
pub struct NamedPipeChannel {
    kind: PipeKind,
    path: PathBuf,
    stream: Option<pipe::Receiver>,
    encoder: FragmentEncoder,
    closes: watch::Sender<u64>,
}

impl NamedPipeChannel {
    /// Create the FIFO special file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PipeCreation` if the special file cannot be created.
    pub fn create(kind: PipeKind, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        nix::unistd::mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|errno| {
            AppError::PipeCreation(format!(
                "mkfifo '{}' failed: {errno}",
                path.display()
            ))
        })?;
        debug!(pipe = kind.label(), path = %path.display(), "fifo created");

        let (closes, _) = watch::channel(0);
        Ok(Self {
            kind,
            path,
            stream: None,
            encoder: FragmentEncoder::new(kind.encoding()),
            closes,
        })
    }

    /// Which pipe this is.
    #[must_use]
    pub fn kind(&self) -> PipeKind {
        self.kind
    }

    /// Path of the FIFO; unchanged across reopen cycles.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Session-side handle observing this channel.
    #[must_use]
    pub fn handle(&self) -> PipeHandle {
        PipeHandle {
            kind: self.kind,
            path: self.path.clone(),
            closes: self.closes.subscribe(),
        }
    }

    /// Open the FIFO for reading and make it the current stream.
    ///
    /// Returns at once; the stream becomes readable when a writer connects.
    /// Must be called from within the runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Stream` if the path cannot be opened.
    pub fn reopen(&mut self) -> Result<()> {
        self.stream = None;
        let receiver = pipe::OpenOptions::new()
            .open_receiver(&self.path)
            .map_err(|err| {
                AppError::Stream(format!("{} pipe open failed: {err}", self.kind.label()))
            })?;
        self.stream = Some(receiver);
        Ok(())
    }

    /// Spawn the pump task delivering this channel's fragments to `sender`.
    #[must_use]
    pub fn spawn(self, sender: ChunkedSender, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(sender, cancel))
    }

    /// Pump fragments and terminators until `cancel` fires.
    pub async fn run(mut self, mut sender: ChunkedSender, cancel: CancellationToken) {
        let kind = self.kind;
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(()),
            result = self.pump(&mut sender) => result,
        };

        if let Err(err) = outcome {
            if cancel.is_cancelled() {
                return;
            }
            warn!(pipe = kind.label(), %err, "pipe channel stopped; inert until teardown");
            cancel.cancelled().await;
        }
        debug!(pipe = kind.label(), "pipe channel finished");
    }

    async fn pump(&mut self, sender: &mut ChunkedSender) -> Result<()> {
        let mut buf = vec![0u8; READ_BUF_BYTES];
        self.reopen()?;
        info!(pipe = self.kind.label(), path = %self.path.display(), "pipe channel open");

        loop {
            let n = match self.stream.as_mut() {
                Some(stream) => stream.read(&mut buf).await.map_err(|err| {
                    AppError::Stream(format!("{} pipe read failed: {err}", self.kind.label()))
                })?,
                None => 0,
            };

            if n > 0 {
                if let Some(fragment) = self.encoder.push(&buf[..n]) {
                    sender.send_fragment(fragment).await?;
                }
                continue;
            }

            if let Some(rest) = self.encoder.finish() {
                sender.send_fragment(rest).await?;
            }
            sender.finish().await?;
            self.closes.send_modify(|count| *count += 1);
            debug!(
                pipe = self.kind.label(),
                cycles = *self.closes.borrow(),
                "pipe closed; reopening"
            );
            self.reopen()?;
        }
    }
}

/// Create all three FIFOs inside `dir`, in [`PipeKind::ALL`] order.
///
/// # Errors
///
/// Returns `AppError::PipeCreation` on the first pipe that cannot be created.
pub fn create_session_pipes(dir: &Path, names: &PipeNames) -> Result<[NamedPipeChannel; 3]> {
    let [image, dataframe, dflist] = PipeKind::ALL;
    Ok([
        NamedPipeChannel::create(image, dir.join(image.file_name(names)))?,
        NamedPipeChannel::create(dataframe, dir.join(dataframe.file_name(names)))?,
        NamedPipeChannel::create(dflist, dir.join(dflist.file_name(names)))?,
    ])
}
