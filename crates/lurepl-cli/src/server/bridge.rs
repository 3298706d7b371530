// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! WebSocket handler connecting a host page to the build worker.

use axum::extract::ws::{Message, WebSocket};
use lurepl::{Worker, WorkerMessage};
use tokio::sync::broadcast;

async fn send(socket: &mut WebSocket, message: &WorkerMessage) -> bool {
    match message.to_json() {
        Ok(text) => socket.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            tracing::warn!("could not serialize worker message: {}", e);
            true
        }
    }
}

/// Forwards host messages to the worker and published results to the host.
///
/// A new connection first receives the latest published result, if any.
pub async fn handle_websocket(mut socket: WebSocket, worker: Worker) {
    let (latest, mut rx) = worker.subscribe();
    if let Some(result) = latest {
        if !send(&mut socket, &WorkerMessage::Result(result)).await {
            return;
        }
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(message) => {
                        if !send(&mut socket, &message).await {
                            // Client disconnected
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("websocket client lagged behind by {} result(s)", skipped);
                        continue;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = worker.handle_message(&text) {
                            tracing::warn!("rejected host message: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}
