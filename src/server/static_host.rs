//! Bare static file host for the browser client bundle.
//!
//! Serves `static_dir` and nothing else; no API surface lives here.

use std::net::SocketAddr;
use std::path::Path;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{AppError, Result};

/// Router serving files under `dir`, with `index.html` for directories.
#[must_use]
pub fn static_router(dir: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(dir))
        .layer(TraceLayer::new_for_http())
}

/// Serve `dir` on `bind` until `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Config` if the listener cannot bind, or
/// `AppError::Io` if the server fails.
pub async fn serve_static(dir: &Path, bind: SocketAddr, ct: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind static host on {bind}: {err}")))?;

    info!(%bind, dir = %dir.display(), "starting static host");

    axum::serve(listener, static_router(dir))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("static host error: {err}")))?;

    info!("static host shut down");
    Ok(())
}
