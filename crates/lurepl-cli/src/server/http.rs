// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! HTTP server for the playground.
//!
//! Every request first passes the interception layer, which answers
//! result-frame module requests from the last completed build. Everything
//! else reaches the routes below or the static file fallback.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State, WebSocketUpgrade},
    http::{header, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use lurepl::tools::{embedded_artifact, ToolKind};
use lurepl::{InterceptedAsset, ToolUrls, Worker};
use tower_http::services::ServeDir;

use super::bridge::handle_websocket;

/// Shared application state for the playground server.
pub struct AppState {
    /// Build worker shared by every WebSocket client.
    pub worker: Worker,
    /// Directory served behind the interception layer.
    pub static_dir: PathBuf,
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.static_dir);

    Router::new()
        .route("/repl/ws", get(websocket_handler))
        .route("/repl/:file", get(artifact_handler))
        .route("/cdn/*path", get(artifact_handler))
        .fallback_service(static_files)
        .layer(middleware::from_fn_with_state(state.clone(), intercept_assets))
        .with_state(state)
}

/// Creates and starts the playground HTTP server.
pub async fn create_server(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let worker = state.worker.clone();
    ws.on_upgrade(move |socket| handle_websocket(socket, worker))
}

/// Tool kind served at `path`, matching the URLs the loader requests from a
/// local origin.
pub fn artifact_kind(path: &str) -> Option<ToolKind> {
    let urls = ToolUrls::local("");
    ToolKind::REQUIRED
        .iter()
        .chain(std::iter::once(&ToolKind::Minifier))
        .copied()
        .find(|kind| urls.url(*kind) == path)
}

async fn artifact_handler(uri: Uri) -> Response {
    let Some(kind) = artifact_kind(uri.path()) else {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    };

    let content_type = if uri.path().ends_with(".lua") {
        "text/x-lua; charset=utf-8"
    } else {
        "application/json"
    };
    ([(header::CONTENT_TYPE, content_type)], embedded_artifact(kind)).into_response()
}

async fn intercept_assets(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    if request.method() == Method::GET || request.method() == Method::HEAD {
        if let Some(asset) = state.worker.intercept(request.uri().path()) {
            return asset_response(asset);
        }
    }
    next.run(request).await
}

fn asset_response(asset: InterceptedAsset) -> Response {
    let mut builder = Response::builder().status(StatusCode::OK);
    for (name, value) in &asset.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from(asset.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
