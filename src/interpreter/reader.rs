//! Interpreter output reader tasks.
//!
//! stdout is framed into lines by [`TranscriptCodec`]; lines carrying the
//! bookkeeping marker are dropped and every other line is forwarded as a
//! `stdout` message with its newline restored. stderr is forwarded chunk by
//! chunk as `stderr` messages without framing; a code point split across
//! two reads is held back until it is complete.
//!
//! Both readers stop on cancellation. The stdout reader additionally
//! reports EOF or a fatal read error on the lifecycle channel, since that is
//! one of the events that ends a session.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::{BytesCodec, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::codec::TranscriptCodec;
use super::StreamClosed;
use crate::models::message::{OutboundKind, OutboundMessage};
use crate::protocol::{FragmentEncoder, FragmentEncoding};

/// Whether a stdout line should reach the client.
#[must_use]
pub fn should_forward(line: &str, marker: &str) -> bool {
    !line.contains(marker)
}

/// stdout reader task.
pub async fn run_stdout_reader<R>(
    stdout: R,
    marker: String,
    tx: mpsc::Sender<OutboundMessage>,
    lifecycle: mpsc::Sender<StreamClosed>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, TranscriptCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("stdout reader: cancellation received, stopping");
                return;
            }

            item = framed.next() => match item {
                None => {
                    debug!("stdout reader: EOF");
                    break;
                }
                Some(Err(err)) => {
                    warn!(%err, "stdout reader: stream error, stopping");
                    break;
                }
                Some(Ok(line)) => {
                    if !should_forward(&line, &marker) {
                        trace!("stdout reader: suppressed bookkeeping echo");
                        continue;
                    }
                    let msg = OutboundMessage::new(OutboundKind::Stdout, format!("{line}\n"));
                    if tx.send(msg).await.is_err() {
                        debug!("stdout reader: outbound closed, stopping");
                        return;
                    }
                }
            }
        }
    }

    if lifecycle.send(StreamClosed::Stdout).await.is_err() {
        debug!("stdout reader: lifecycle receiver gone");
    }
}

/// stderr reader task. Stream errors leave it stopped (logged, not retried).
pub async fn run_stderr_reader<R>(
    stderr: R,
    tx: mpsc::Sender<OutboundMessage>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stderr, BytesCodec::new());
    let mut encoder = FragmentEncoder::new(FragmentEncoding::Utf8);

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("stderr reader: cancellation received, stopping");
                return;
            }

            item = framed.next() => match item {
                None => {
                    debug!("stderr reader: EOF");
                    break;
                }
                Some(Err(err)) => {
                    warn!(%err, "stderr reader: stream error, stopping");
                    break;
                }
                Some(Ok(chunk)) => {
                    debug!(bytes = chunk.len(), "interpreter stderr");
                    let Some(text) = encoder.push(&chunk) else {
                        continue;
                    };
                    if !send_stderr(&tx, text).await {
                        return;
                    }
                }
            }
        }
    }

    if let Some(rest) = encoder.finish() {
        send_stderr(&tx, rest).await;
    }
}

async fn send_stderr(tx: &mpsc::Sender<OutboundMessage>, text: String) -> bool {
    if tx.send(OutboundMessage::new(OutboundKind::Stderr, text)).await.is_err() {
        debug!("stderr reader: outbound closed, stopping");
        return false;
    }
    true
}
