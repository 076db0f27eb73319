//! Per-connection session lifecycle.
//!
//! `Provisioning → Running → Closing → Closed`
//!
//! [`SessionOrchestrator::open`] acquires the session's resources in strict
//! order (run directory, image pipe, dataframe pipe, dflist pipe,
//! interpreter) and yields a [`Session`] only when all are ready.
//! [`Session::run`] then translates inbound commands, fans every output
//! source into the outbound channel, and tears everything down on the first
//! close event.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::pipe_channel::{create_session_pipes, NamedPipeChannel, PipeHandle};
use super::provisioner::{RunDirectory, RunDirectoryProvisioner};
use crate::config::ServerConfig;
use crate::interpreter::commands::BookkeepingCommands;
use crate::interpreter::spawner::{InterpreterProcess, InterpreterSpec};
use crate::interpreter::{reader, writer, StreamClosed};
use crate::models::message::{InboundCommand, OutboundMessage};
use crate::models::session::{CloseCause, SessionReport, SessionState};
use crate::protocol::ChunkedSender;
use crate::{AppError, Result};

/// Capacity of the command sink feeding interpreter stdin.
const COMMAND_QUEUE: usize = 256;

/// Bound on waiting for reader tasks after cancellation.
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything a session needs before it can run.
#[derive(Debug)]
pub struct SessionResources {
    /// Provisioned run directory.
    pub run_dir: RunDirectory,
    /// Image, dataframe, and dflist channels, in that order.
    pub pipes: [NamedPipeChannel; 3],
    /// Interpreter handle, possibly dead if the spawn failed.
    pub process: InterpreterProcess,
}

impl SessionResources {
    /// Acquire the resources sequentially; the first failure aborts setup
    /// and drops whatever was already created.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Provisioning` or `AppError::PipeCreation`.
    /// Interpreter spawn failures are not errors.
    pub async fn acquire(
        config: &ServerConfig,
        provisioner: &RunDirectoryProvisioner,
        query: &[(String, String)],
    ) -> Result<Self> {
        let run_dir = provisioner.provision().await?;
        let pipes = create_session_pipes(run_dir.path(), &config.pipes)?;
        let spec = InterpreterSpec::for_session(config, run_dir.path(), query);
        let process = InterpreterProcess::spawn(&spec);
        Ok(Self {
            run_dir,
            pipes,
            process,
        })
    }
}

/// Creates sessions from the shared server configuration.
#[derive(Debug, Clone)]
pub struct SessionOrchestrator {
    config: Arc<ServerConfig>,
    provisioner: RunDirectoryProvisioner,
    commands: BookkeepingCommands,
}

impl SessionOrchestrator {
    /// Build an orchestrator for `config`.
    #[must_use]
    pub fn new(config: Arc<ServerConfig>) -> Self {
        let provisioner =
            RunDirectoryProvisioner::new(config.template_dir.clone(), config.run_root.clone());
        let commands = BookkeepingCommands::new(
            config.interpreter.marker.clone(),
            config.plot,
            config.pipes.clone(),
        );
        Self {
            config,
            provisioner,
            commands,
        }
    }

    /// Shared configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Provision a session for a connection that carried `query`.
    ///
    /// # Errors
    ///
    /// Returns the setup failure; the connection should then be closed.
    pub async fn open(&self, session_id: &str, query: &[(String, String)]) -> Result<Session> {
        let started_at = Utc::now();
        debug!(session_id, state = %SessionState::Provisioning, "session state");
        let resources = SessionResources::acquire(&self.config, &self.provisioner, query).await?;
        Ok(Session {
            id: session_id.to_owned(),
            state: SessionState::Provisioning,
            started_at,
            resources,
            commands: self.commands.clone(),
            teardown_timeout: self.config.teardown_timeout(),
        })
    }
}

/// One connection's interpreter session.
#[derive(Debug)]
pub struct Session {
    id: String,
    state: SessionState,
    started_at: DateTime<Utc>,
    resources: SessionResources,
    commands: BookkeepingCommands,
    teardown_timeout: Duration,
}

impl Session {
    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run directory path.
    #[must_use]
    pub fn run_dir(&self) -> &std::path::Path {
        self.resources.run_dir.path()
    }

    /// Handles observing the three pipe channels.
    #[must_use]
    pub fn pipe_handles(&self) -> Vec<PipeHandle> {
        self.resources.pipes.iter().map(NamedPipeChannel::handle).collect()
    }

    /// OS process id of the interpreter, if it is running.
    #[must_use]
    pub fn interpreter_pid(&self) -> Option<u32> {
        self.resources.process.pid()
    }

    /// Drive the session until the connection closes, an interpreter stream
    /// closes, the interpreter exits, or `shutdown` fires.
    ///
    /// `inbound` yields raw text frames from the client; its end means the
    /// connection closed. Every outbound message goes to `outbound`, which is
    /// dropped on return so the connection can close its side.
    pub async fn run(
        self,
        mut inbound: mpsc::Receiver<String>,
        outbound: mpsc::Sender<OutboundMessage>,
        shutdown: CancellationToken,
    ) -> SessionReport {
        let Self {
            id,
            mut state,
            started_at,
            resources,
            commands,
            teardown_timeout,
        } = self;
        let SessionResources {
            run_dir,
            pipes,
            mut process,
        } = resources;

        let cancel = shutdown.child_token();
        let (lifecycle_tx, mut lifecycle_rx) = mpsc::channel::<StreamClosed>(4);
        let (command_tx, command_rx) = mpsc::channel::<String>(COMMAND_QUEUE);
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        let handles: Vec<PipeHandle> = pipes.iter().map(NamedPipeChannel::handle).collect();
        for channel in pipes {
            let sender = ChunkedSender::new(channel.kind().outbound_kind(), outbound.clone());
            tasks.push(channel.spawn(sender, cancel.clone()));
        }

        if let Some(stdout) = process.take_stdout() {
            tasks.push(tokio::spawn(reader::run_stdout_reader(
                stdout,
                commands.marker().to_owned(),
                outbound.clone(),
                lifecycle_tx.clone(),
                cancel.clone(),
            )));
        } else if lifecycle_tx.try_send(StreamClosed::Stdout).is_err() {
            debug!(session_id = id, "lifecycle queue full");
        }

        if let Some(stderr) = process.take_stderr() {
            tasks.push(tokio::spawn(reader::run_stderr_reader(
                stderr,
                outbound.clone(),
                cancel.clone(),
            )));
        }

        if let Some(stdin) = process.take_stdin() {
            tasks.push(tokio::spawn(writer::run_writer(
                stdin,
                command_rx,
                lifecycle_tx.clone(),
                cancel.clone(),
            )));
        } else {
            drop(command_rx);
        }

        transition(&id, &mut state, SessionState::Running);

        let cause = loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => break CloseCause::Shutdown,

                closed = lifecycle_rx.recv() => match closed {
                    Some(StreamClosed::Stdin) => break CloseCause::StdinClosed,
                    Some(StreamClosed::Stdout) | None => break CloseCause::StdoutClosed,
                },

                status = process.wait() => {
                    info!(session_id = id, %status, "interpreter exited");
                    break CloseCause::InterpreterExited;
                }

                frame = inbound.recv() => match frame {
                    None => break CloseCause::ConnectionClosed,
                    Some(text) => dispatch(&commands, &command_tx, &text),
                },
            }
        };

        info!(session_id = id, %cause, "session closing");
        transition(&id, &mut state, SessionState::Closing);

        let exit_status = teardown(
            &id,
            cancel,
            &mut process,
            teardown_timeout,
            &handles,
            tasks,
        )
        .await;
        drop(command_tx);
        drop(outbound);
        run_dir.remove();

        transition(&id, &mut state, SessionState::Closed);

        SessionReport {
            session_id: id,
            cause,
            exit_status,
            started_at,
            ended_at: Utc::now(),
        }
    }
}

/// Translate one inbound text frame into interpreter commands.
///
/// Malformed frames are rejected: logged and dropped, the session goes on.
/// Never waits on the sink: an interpreter that stops reading stdin must
/// not keep the session loop from seeing a close. When the sink cannot hold
/// the whole batch it is dropped, so a payload never goes without its
/// bookkeeping commands.
fn dispatch(commands: &BookkeepingCommands, sink: &mpsc::Sender<String>, raw: &str) {
    let command = match InboundCommand::parse(raw) {
        Ok(command) => command,
        Err(err) => {
            warn!(%err, "rejecting inbound message");
            return;
        }
    };

    let batch = match command {
        InboundCommand::Stdin(text) => {
            debug!(len = text.len(), "stdin command");
            let mut batch = vec![text];
            batch.extend(commands.after_stdin());
            batch
        }
        InboundCommand::Dataframe(name) => {
            if let Err(err) = validate_value_name(&name) {
                warn!(%err, "rejecting dataframe request");
                return;
            }
            debug!(name, "dataframe request");
            vec![commands.snapshot(name.trim())]
        }
    };

    // The session loop is the only producer, so free capacity cannot shrink
    // between this check and the sends below.
    if sink.is_closed() {
        debug!("interpreter stdin unavailable; command dropped");
        return;
    }
    if sink.capacity() < batch.len() {
        warn!(
            queued = sink.max_capacity() - sink.capacity(),
            "interpreter is not reading stdin; command dropped"
        );
        return;
    }
    for text in batch {
        if let Err(err) = sink.try_send(text) {
            debug!(%err, "interpreter stdin unavailable; command dropped");
            return;
        }
    }
}

/// A dataframe request must name a value on a single line, or the
/// bookkeeping marker would not cover the whole injected command.
fn validate_value_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::Protocol("empty dataframe name".into()));
    }
    if name.contains('\n') || name.contains('\r') {
        return Err(AppError::Protocol("dataframe name spans lines".into()));
    }
    Ok(())
}

fn transition(session_id: &str, state: &mut SessionState, next: SessionState) {
    if state.can_transition_to(next) {
        info!(session_id, from = %state, to = %next, "session state");
        *state = next;
    } else {
        warn!(session_id, from = %state, to = %next, "ignoring invalid session transition");
    }
}

/// Forcible teardown: stop readers (which closes the pipe read ends), kill
/// the interpreter, then wait briefly for tasks to finish.
async fn teardown(
    session_id: &str,
    cancel: CancellationToken,
    process: &mut InterpreterProcess,
    timeout: Duration,
    handles: &[PipeHandle],
    tasks: Vec<JoinHandle<()>>,
) -> Option<ExitStatus> {
    cancel.cancel();
    let exit_status = process.terminate(timeout).await;

    for handle in handles {
        debug!(
            session_id,
            pipe = handle.kind.label(),
            cycles = handle.close_count(),
            "pipe channel closed"
        );
    }

    for task in tasks {
        let abort = task.abort_handle();
        if tokio::time::timeout(TASK_JOIN_TIMEOUT, task).await.is_err() {
            warn!(session_id, "session task did not stop in time; aborting");
            abort.abort();
        }
    }

    exit_status
}
