//! Interpreter process spawner.
//!
//! Launches the interpreter with:
//! - the run directory as working directory,
//! - `env_clear()` followed by the configured `inherit_env` allowlist, the
//!   connection's query parameters verbatim, and `APIDOMAIN`,
//! - piped stdio and `kill_on_drop(true)`.
//!
//! A spawn failure is only logged. The returned [`InterpreterProcess`] then
//! has no child and no stdio: writes go nowhere and stdout reports closed at
//! once, which ends the session.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::AppError;

/// Environment variable carrying the base API domain.
pub const API_DOMAIN_ENV: &str = "APIDOMAIN";

/// Everything needed to launch one interpreter.
#[derive(Debug, Clone)]
pub struct InterpreterSpec {
    /// Binary to execute.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Working directory (the session's run directory).
    pub cwd: PathBuf,
    /// Complete child environment; nothing else is inherited.
    pub env: Vec<(String, String)>,
}

impl InterpreterSpec {
    /// Build the launch settings for a session rooted at `cwd` whose connection carried
    /// `query` parameters.
    #[must_use]
    pub fn for_session(config: &ServerConfig, cwd: &Path, query: &[(String, String)]) -> Self {
        Self {
            program: config.interpreter.program.clone(),
            args: config.interpreter.args.clone(),
            cwd: cwd.to_path_buf(),
            env: interpreter_env(config, query),
        }
    }
}

/// Compose the interpreter environment.
///
/// Order of precedence, lowest first: inherited allowlist, query
/// parameters, `APIDOMAIN`. Keys that cannot be environment variable names
/// are dropped with a warning.
#[must_use]
pub fn interpreter_env(config: &ServerConfig, query: &[(String, String)]) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = Vec::new();
    let mut set = |key: &str, value: &str| {
        if let Some(slot) = env.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value.to_owned();
        } else {
            env.push((key.to_owned(), value.to_owned()));
        }
    };

    for key in &config.inherit_env {
        if let Ok(value) = std::env::var(key) {
            set(key, &value);
        }
    }

    for (key, value) in query {
        if !is_valid_env_pair(key, value) {
            warn!(key, "dropping query parameter unusable as environment variable");
            continue;
        }
        set(key, value);
    }

    set(API_DOMAIN_ENV, &config.api_domain);
    env
}

fn is_valid_env_pair(key: &str, value: &str) -> bool {
    !key.is_empty() && !key.contains('=') && !key.contains('\0') && !value.contains('\0')
}

/// Owned interpreter child and its not-yet-claimed stdio.
#[derive(Debug)]
pub struct InterpreterProcess {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    exit_status: Option<ExitStatus>,
}

impl InterpreterProcess {
    /// Spawn the interpreter described by `spec`.
    ///
    /// Never fails: a spawn error is logged and yields a dead handle.
    #[must_use]
    pub fn spawn(spec: &InterpreterSpec) -> Self {
        match try_spawn(spec) {
            Ok(mut child) => {
                info!(
                    pid = child.id().unwrap_or(0),
                    program = spec.program,
                    cwd = %spec.cwd.display(),
                    "interpreter spawned"
                );
                Self {
                    stdin: child.stdin.take(),
                    stdout: child.stdout.take(),
                    stderr: child.stderr.take(),
                    child: Some(child),
                    exit_status: None,
                }
            }
            Err(err) => {
                error!(%err, program = spec.program, "interpreter spawn failed");
                Self::dead()
            }
        }
    }

    /// Handle with no process behind it.
    #[must_use]
    pub fn dead() -> Self {
        Self {
            child: None,
            stdin: None,
            stdout: None,
            stderr: None,
            exit_status: None,
        }
    }

    /// Whether a child was ever started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.child.is_some()
    }

    /// OS process id while the child is running.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Claim the command sink.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Claim the stdout stream.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Claim the stderr stream.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Exit status once the child has been reaped.
    #[must_use]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Resolve when the child exits. Pends forever without a live child.
    ///
    /// Cancel safe.
    pub async fn wait(&mut self) -> ExitStatus {
        if let Some(status) = self.exit_status {
            return status;
        }
        let Some(child) = self.child.as_mut() else {
            return std::future::pending().await;
        };
        match child.wait().await {
            Ok(status) => {
                self.exit_status = Some(status);
                status
            }
            Err(err) => {
                warn!(%err, "error waiting for interpreter");
                std::future::pending().await
            }
        }
    }

    /// Forcibly terminate the child and reap it within `timeout`.
    ///
    /// Returns the exit status, or `None` when there was no child or it
    /// could not be reaped in time.
    pub async fn terminate(&mut self, timeout: Duration) -> Option<ExitStatus> {
        if let Some(status) = self.exit_status {
            return Some(status);
        }
        let child = self.child.as_mut()?;

        if let Err(err) = child.start_kill() {
            debug!(%err, "kill signal not delivered");
        }
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                info!(%status, "interpreter terminated");
                self.exit_status = Some(status);
                Some(status)
            }
            Ok(Err(err)) => {
                warn!(%err, "failed to reap interpreter");
                None
            }
            Err(_elapsed) => {
                warn!(?timeout, "interpreter not reaped within teardown timeout");
                None
            }
        }
    }
}

fn try_spawn(spec: &InterpreterSpec) -> Result<Child, AppError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .env_clear()
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .current_dir(&spec.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cmd.spawn()
        .map_err(|err| AppError::InterpreterSpawn(format!("failed to spawn '{}': {err}", spec.program)))
}
