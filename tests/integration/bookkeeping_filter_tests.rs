use data_playground::client::{ClientReassembler, ClientUpdate};
use data_playground::models::message::{InboundCommand, OutboundKind};

use super::test_helpers::{first_value, has_terminator, stdout_lines, Harness};

const MARKER: &str = "#DataPirate";

#[tokio::test]
async fn injected_commands_never_reach_the_transcript() {
    let harness = Harness::new();
    let mut session = harness.start(&[]).await;

    session.send(&InboundCommand::stdin_line("x <- 1:3")).await;
    let msgs = session
        .collect_until(|seen| {
            has_terminator(seen, OutboundKind::Dflist)
                && stdout_lines(seen).iter().any(|l| l == "x <- 1:3\n")
        })
        .await;

    for line in stdout_lines(&msgs) {
        assert!(!line.contains(MARKER), "leaked bookkeeping line: {line}");
        assert!(!line.contains("invisible("), "leaked bookkeeping line: {line}");
    }
    assert_eq!(first_value(&msgs, OutboundKind::Dflist), r#"["mtcars"]"#);

    let report = session.close().await;
    assert!(report.interpreter_terminated());
}

#[tokio::test]
async fn every_stdin_command_refreshes_the_frame_list() {
    let harness = Harness::new();
    let mut session = harness.start(&[]).await;
    let mut client = ClientReassembler::new();

    session.send(&InboundCommand::stdin_line("data(mtcars)")).await;
    let msgs = session
        .collect_until(|seen| has_terminator(seen, OutboundKind::Dflist))
        .await;

    let updates: Vec<ClientUpdate> = msgs.iter().filter_map(|m| client.apply(m)).collect();
    assert!(updates.contains(&ClientUpdate::FrameList(vec!["mtcars".into()])));
    assert_eq!(client.frames(), ["mtcars".to_owned()]);

    session.close().await;
}

#[tokio::test]
async fn malformed_frames_are_ignored_and_the_session_goes_on() {
    let harness = Harness::new();
    let mut session = harness.start(&[]).await;

    session.send_raw("this is not json").await;
    session.send_raw(r#"{"type":"eval","data":"1+1"}"#).await;
    session.send_raw(r#"{"type":"dataframe","data":"x\nsystem('id')"}"#).await;
    session.send(&InboundCommand::stdin_line("after")).await;

    let msgs = session
        .collect_until(|seen| stdout_lines(seen).iter().any(|l| l == "after\n"))
        .await;
    assert!(stdout_lines(&msgs).iter().all(|l| !l.contains("system(")));
    assert!(!session.task.is_finished());

    session.close().await;
}

#[tokio::test]
async fn query_parameters_reach_the_interpreter_environment() {
    let harness = Harness::new();
    let mut session = harness
        .start(&[("TOKEN", "tok-123"), ("APIDOMAIN", "https://spoofed.test")])
        .await;

    session.send(&InboundCommand::stdin_line("show-env")).await;
    let msgs = session
        .collect_until(|seen| stdout_lines(seen).iter().any(|l| l.starts_with("APIDOMAIN=")))
        .await;

    let env_line = stdout_lines(&msgs)
        .into_iter()
        .find(|l| l.starts_with("APIDOMAIN="))
        .unwrap();
    assert_eq!(env_line, "APIDOMAIN=https://api.example.test TOKEN=tok-123\n");

    session.close().await;
}

#[tokio::test]
async fn stderr_is_forwarded_separately() {
    let harness = Harness::new();
    let mut session = harness.start(&[]).await;

    session.send(&InboundCommand::stdin_line("warn me")).await;
    let msgs = session
        .collect_until(|seen| {
            seen.iter()
                .filter(|m| m.kind == OutboundKind::Stderr)
                .map(|m| m.data.as_str())
                .collect::<String>()
                .contains("Warning message: warn me\n")
        })
        .await;

    assert!(stdout_lines(&msgs).iter().all(|l| !l.contains("Warning message")));
    session.close().await;
}
