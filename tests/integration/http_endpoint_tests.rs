//! Listener-level tests for the session endpoint and the static host.
//!
//! Each server binds an ephemeral port discovered up front.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use data_playground::orchestrator::session_manager::SessionOrchestrator;
use data_playground::server::static_host::serve_static;
use data_playground::server::{serve_ws, AppState};
use tokio_util::sync::CancellationToken;

use super::test_helpers::Harness;

async fn free_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    addr
}

async fn spawn_ws(harness: &Harness) -> (String, CancellationToken) {
    let addr = free_addr().await;
    let ct = CancellationToken::new();
    let state = AppState {
        orchestrator: Arc::new(SessionOrchestrator::new(Arc::new(harness.config.clone()))),
        shutdown: ct.clone(),
    };
    let server_ct = ct.clone();
    tokio::spawn(async move {
        let _ = serve_ws(state, addr, server_ct).await;
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    (format!("http://{addr}"), ct)
}

#[tokio::test]
async fn health_returns_ok() {
    let harness = Harness::new();
    let (base_url, ct) = spawn_ws(&harness).await;

    let resp = reqwest::get(format!("{base_url}/health"))
        .await
        .expect("HTTP GET /health");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.expect("body"), "ok");

    ct.cancel();
}

#[tokio::test]
async fn plain_get_on_session_endpoint_is_refused() {
    let harness = Harness::new();
    let (base_url, ct) = spawn_ws(&harness).await;

    let resp = reqwest::get(format!("{base_url}/?TOKEN=abc"))
        .await
        .expect("HTTP GET /");
    assert!(resp.status().is_client_error());
    assert_eq!(
        std::fs::read_dir(harness.run_root.path()).unwrap().count(),
        0,
        "no session is provisioned without an upgrade"
    );

    ct.cancel();
}

#[tokio::test]
async fn static_host_serves_the_client_bundle() {
    let bundle = tempfile::tempdir().expect("bundle");
    std::fs::write(bundle.path().join("index.html"), "<html>playground</html>").unwrap();
    std::fs::write(bundle.path().join("app.js"), "console.log(1)").unwrap();

    let addr = free_addr().await;
    let ct = CancellationToken::new();
    let dir = bundle.path().to_path_buf();
    let server_ct = ct.clone();
    tokio::spawn(async move {
        let _ = serve_static(&dir, addr, server_ct).await;
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let index = reqwest::get(format!("http://{addr}/")).await.expect("GET /");
    assert_eq!(index.status(), 200);
    assert_eq!(index.text().await.unwrap(), "<html>playground</html>");

    let script = reqwest::get(format!("http://{addr}/app.js")).await.expect("GET app.js");
    assert_eq!(script.status(), 200);

    let missing = reqwest::get(format!("http://{addr}/nope.css")).await.expect("GET missing");
    assert_eq!(missing.status(), 404);

    ct.cancel();
}
