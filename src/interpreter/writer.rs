//! Interpreter command sink.
//!
//! Receives command text from the session loop and writes it verbatim to the
//! interpreter's stdin, flushing after each command so the interpreter sees
//! it immediately.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::StreamClosed;

/// Writer task feeding `stdin` until cancellation or channel close.
///
/// A failed write reports [`StreamClosed::Stdin`] and stops the task; later
/// sends on the command channel then fail and are ignored by the caller.
pub async fn run_writer<W>(
    mut stdin: W,
    mut commands: mpsc::Receiver<String>,
    lifecycle: mpsc::Sender<StreamClosed>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("stdin writer: cancellation received, stopping");
                return;
            }

            cmd = commands.recv() => {
                let Some(cmd) = cmd else {
                    debug!("stdin writer: command channel closed, stopping");
                    return;
                };
                trace!(len = cmd.len(), "stdin writer: writing command");
                let written = async {
                    stdin.write_all(cmd.as_bytes()).await?;
                    stdin.flush().await
                };
                // A full stdin pipe must not outlast teardown.
                let outcome = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        debug!("stdin writer: cancelled mid-write, stopping");
                        return;
                    }
                    outcome = written => outcome,
                };
                if let Err(err) = outcome {
                    warn!(%err, "stdin writer: write to interpreter failed");
                    if lifecycle.send(StreamClosed::Stdin).await.is_err() {
                        debug!("stdin writer: lifecycle receiver gone");
                    }
                    return;
                }
            }
        }
    }
}
