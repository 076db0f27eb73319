//! Shared helpers for session-level integration tests.
//!
//! Sessions run a POSIX shell script standing in for the interpreter. The
//! script echoes every line it reads (as an interactive interpreter echoes
//! its input) and reacts to the injected bookkeeping commands by writing
//! canned JSON to the named pipes they mention.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use data_playground::models::message::{InboundCommand, OutboundKind, OutboundMessage};
use data_playground::models::session::SessionReport;
use data_playground::orchestrator::session_manager::SessionOrchestrator;
use data_playground::ServerConfig;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Overall bound on any wait in these tests.
pub const WAIT: Duration = Duration::from_secs(15);

/// Bytes the fake interpreter writes to the image pipe on `draw`.
pub const PLOT_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nIHDR";

/// Rows written for every data frame snapshot request.
pub const MTCARS_JSON: &str =
    r#"[{"mpg":21,"cyl":6,"am":"manual"},{"mpg":22.8,"cyl":4,"am":"auto"},{"mpg":18.7,"cyl":8,"am":null}]"#;

const FAKE_INTERPRETER: &str = r#"#!/bin/sh
while IFS= read -r line; do
  echo "$line"
  case "$line" in
    *dataframe.json*) printf '%s' '__ROWS__' > dataframe.json ;;
    *dflist.json*) printf '%s' '["mtcars"]' > dflist.json ;;
    draw*) printf '\211PNG\r\n\032\nIHDR' > plot.png ;;
    latin1*) printf 'caf\351\n' ;;
    quit*) exit 0 ;;
    warn*) echo "Warning message: $line" >&2 ;;
    show-env*) echo "APIDOMAIN=$APIDOMAIN TOKEN=$TOKEN" ;;
  esac
done
"#;

/// Template and run root kept alive for the duration of a test.
pub struct Harness {
    pub template: TempDir,
    pub run_root: TempDir,
    pub config: ServerConfig,
}

impl Harness {
    /// Template holding the fake interpreter script, sessions rooted in a
    /// private run root.
    pub fn new() -> Self {
        let template = tempfile::tempdir().expect("template dir");
        let script = FAKE_INTERPRETER.replace("__ROWS__", MTCARS_JSON);
        std::fs::write(template.path().join("fake_r.sh"), script).expect("write script");
        std::fs::write(template.path().join("init.R"), "library(jsonlite)\n").expect("write init");

        let run_root = tempfile::tempdir().expect("run root");

        let mut config = ServerConfig::default();
        config.template_dir = template.path().to_path_buf();
        config.run_root = Some(run_root.path().to_path_buf());
        config.interpreter.program = "sh".into();
        config.interpreter.args = vec!["fake_r.sh".into()];
        config.inherit_env = vec!["PATH".into()];
        config.api_domain = "https://api.example.test".into();
        config.teardown_timeout_ms = 3_000;
        config.validate().expect("valid test config");

        Self {
            template,
            run_root,
            config,
        }
    }

    /// Same template, but the interpreter never reads its stdin.
    pub fn with_deaf_interpreter() -> Self {
        let mut harness = Self::new();
        harness.config.interpreter.args = vec!["-c".into(), "exec sleep 600".into()];
        harness
    }

    pub fn orchestrator(&self) -> SessionOrchestrator {
        SessionOrchestrator::new(Arc::new(self.config.clone()))
    }

    /// Open and start a session with the given connection query.
    pub async fn start(&self, query: &[(&str, &str)]) -> RunningSession {
        start_with(&self.orchestrator(), query).await
    }
}

/// A session driven from the test as a connection would drive it.
pub struct RunningSession {
    pub inbound: mpsc::Sender<String>,
    pub outbound: mpsc::Receiver<OutboundMessage>,
    pub shutdown: CancellationToken,
    pub run_dir: PathBuf,
    pub task: JoinHandle<SessionReport>,
    /// Every message received so far.
    pub seen: Vec<OutboundMessage>,
}

pub async fn start_with(
    orchestrator: &SessionOrchestrator,
    query: &[(&str, &str)],
) -> RunningSession {
    let query: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    let session = orchestrator
        .open("test-session", &query)
        .await
        .expect("session opens");
    let run_dir = session.run_dir().to_path_buf();

    let (inbound, inbound_rx) = mpsc::channel(16);
    let (outbound_tx, outbound) = mpsc::channel(256);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(session.run(inbound_rx, outbound_tx, shutdown.clone()));

    RunningSession {
        inbound,
        outbound,
        shutdown,
        run_dir,
        task,
        seen: Vec::new(),
    }
}

impl RunningSession {
    pub async fn send(&self, command: &InboundCommand) {
        self.send_raw(&command.to_json().expect("encode command")).await;
    }

    pub async fn send_raw(&self, text: &str) {
        self.inbound
            .send(text.to_owned())
            .await
            .expect("session accepts input");
    }

    /// Receive until `done` holds for everything received so far. Returns
    /// the messages received by this call.
    pub async fn collect_until<F>(&mut self, done: F) -> Vec<OutboundMessage>
    where
        F: Fn(&[OutboundMessage]) -> bool,
    {
        let start = self.seen.len();
        tokio::time::timeout(WAIT, async {
            while !done(&self.seen[start..]) {
                let msg = self.outbound.recv().await.expect("session still sending");
                self.seen.push(msg);
            }
        })
        .await
        .expect("expected output in time");
        self.seen[start..].to_vec()
    }

    /// Close the connection side and wait for the final report.
    pub async fn close(self) -> SessionReport {
        let Self {
            inbound,
            mut outbound,
            task,
            ..
        } = self;
        drop(inbound);
        let drain = tokio::spawn(async move { while outbound.recv().await.is_some() {} });
        let report = tokio::time::timeout(WAIT, task)
            .await
            .expect("session ends in time")
            .expect("session task");
        drain.await.expect("drain");
        report
    }
}

/// Whether `msgs` holds a terminator of `kind`.
pub fn has_terminator(msgs: &[OutboundMessage], kind: OutboundKind) -> bool {
    msgs.iter().any(|m| m.kind == kind && m.is_terminator())
}

/// Concatenated payload of `kind` messages up to the first terminator.
pub fn first_value(msgs: &[OutboundMessage], kind: OutboundKind) -> String {
    msgs.iter()
        .filter(|m| m.kind == kind)
        .take_while(|m| !m.is_terminator())
        .map(|m| m.data.as_str())
        .collect()
}

/// stdout payloads, in order.
pub fn stdout_lines(msgs: &[OutboundMessage]) -> Vec<String> {
    msgs.iter()
        .filter(|m| m.kind == OutboundKind::Stdout)
        .map(|m| m.data.clone())
        .collect()
}
