//! WebSocket endpoint: one interpreter session per connection.
//!
//! The upgrade request's query parameters become the interpreter's
//! environment. After the upgrade the socket is split into a reader task
//! (client frames → session inbound queue) and a writer task (session
//! outbound queue → JSON text frames). The writer sends a close frame once
//! the session drops its outbound sender, unless the client already closed.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::models::message::OutboundMessage;
use crate::orchestrator::session_manager::SessionOrchestrator;
use crate::{AppError, Result};

/// Capacity of the client → session queue.
const INBOUND_QUEUE: usize = 64;

/// Capacity of the session → client queue shared by all output sources.
const OUTBOUND_QUEUE: usize = 256;

/// Shared state for the WebSocket router.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Builds one session per connection.
    pub orchestrator: Arc<SessionOrchestrator>,
    /// Fires on server shutdown; ends every running session.
    pub shutdown: CancellationToken,
}

/// Handler for `GET /health`.
async fn health() -> &'static str {
    "ok"
}

/// Router with the session endpoint at `/` and a liveness check at `/health`.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(upgrade))
        .route("/health", get(health))
        .with_state(state)
}

async fn upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<Vec<(String, String)>>,
    State(state): State<AppState>,
) -> Response {
    let session_id = Uuid::new_v4().to_string();
    let span = info_span!("session", session_id = %session_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, query).instrument(span))
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    session_id: String,
    query: Vec<(String, String)>,
) {
    info!(params = query.len(), "session connected");
    let (mut sink, mut stream) = socket.split();

    let session = match state.orchestrator.open(&session_id, &query).await {
        Ok(session) => session,
        Err(err) => {
            error!(%err, "session setup failed");
            if let Err(err) = sink.send(Message::Close(None)).await {
                debug!(%err, "close frame not delivered");
            }
            return;
        }
    };

    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(INBOUND_QUEUE);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_QUEUE);
    let client_closed = CancellationToken::new();

    let reader_closed = client_closed.clone();
    let reader = tokio::spawn(
        async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text.as_str().to_owned()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Binary(_)) => {
                        warn!("rejecting binary frame");
                    }
                    Ok(Message::Close(frame)) => {
                        info!(?frame, "websocket close");
                        break;
                    }
                    Ok(Message::Ping(_) | Message::Pong(_)) => {}
                    Err(err) => {
                        warn!(%err, "websocket read failed");
                        break;
                    }
                }
            }
            reader_closed.cancel();
        }
        .in_current_span(),
    );

    let writer_closed = client_closed.clone();
    let writer = tokio::spawn(
        async move {
            while let Some(msg) = outbound_rx.recv().await {
                let json = match msg.to_json() {
                    Ok(json) => json,
                    Err(err) => {
                        warn!(%err, "dropping outbound message");
                        continue;
                    }
                };
                if sink.send(Message::Text(json.into())).await.is_err() {
                    debug!("connection no longer open; discarding output");
                    break;
                }
            }
            if !writer_closed.is_cancelled() {
                if let Err(err) = sink.send(Message::Close(None)).await {
                    debug!(%err, "close frame not delivered");
                }
            }
        }
        .in_current_span(),
    );

    let report = session
        .run(inbound_rx, outbound_tx, state.shutdown.clone())
        .await;

    if let Err(err) = writer.await {
        warn!(%err, "websocket writer task failed");
    }
    reader.abort();

    info!(
        cause = %report.cause,
        exit = ?report.exit_status,
        elapsed_ms = (report.ended_at - report.started_at).num_milliseconds(),
        "session closed"
    );
}

/// Serve the WebSocket endpoint on `bind` until `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Config` if the listener cannot bind, or
/// `AppError::Io` if the server fails.
pub async fn serve_ws(state: AppState, bind: SocketAddr, ct: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind websocket on {bind}: {err}")))?;

    info!(%bind, "starting interpreter session service");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("websocket server error: {err}")))?;

    info!("interpreter session service shut down");
    Ok(())
}
