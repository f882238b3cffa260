//! Manages the WebSocket connection lifecycle for a voice session.

use super::protocol::{Inbound, decode_client_frame, encode_output};
use crate::{handlers::ApiError, state::AppState};
use axum::{
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use recipe_road_core::{ClientInput, SessionOutput, VoiceSession, registry::SessionEntry};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{Instrument, Span, error, info, info_span, warn};
use uuid::Uuid;

/// Axum handler that upgrades `GET /sessions/{id}/assistant` to a WebSocket.
///
/// The session must exist and must not already have a live voice connection.
pub async fn ws_handler(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let entry = match state.registry.get(id).await {
        Ok(entry) => entry,
        Err(e) => return ApiError::from_registry(e).into_response(),
    };
    if let Some(current) = entry.connection_state().await {
        if current.accepts_work() {
            return ApiError::Conflict(format!("Session {id} already has a live voice connection"))
                .into_response();
        }
    }
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, state, entry)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, entry: Arc<SessionEntry>) {
    let span = info_span!("voice_session", session_id = %entry.id, recipe = %entry.recipe.title);
    run_connection(socket, state, entry).instrument(span).await
}

async fn run_connection(socket: WebSocket, state: Arc<AppState>, entry: Arc<SessionEntry>) {
    info!("Client connected to the assistant.");
    let (session, handle, outputs) =
        VoiceSession::new(entry.id, entry.recipe.clone(), state.session_config.clone());
    if let Err(e) = entry.attach(handle.clone()).await {
        warn!(error = %e, "Rejecting second voice connection");
        return;
    }

    let (socket_tx, mut socket_rx) = socket.split();
    let session_task = tokio::spawn(
        session
            .run(state.realtime.clone())
            .instrument(Span::current()),
    );
    let writer = tokio::spawn(write_outputs(socket_tx, outputs).instrument(Span::current()));

    let mut deleted = entry.shutdown_signal();
    loop {
        tokio::select! {
            frame = socket_rx.next() => match frame {
                Some(Ok(msg)) => match decode_client_frame(msg) {
                    Inbound::Input(ClientInput::Audio(chunk)) => {
                        if handle.send_audio(chunk).await.is_err() {
                            break;
                        }
                    }
                    Inbound::Input(ClientInput::End) => {
                        info!("Client ended the session.");
                        let _ = handle.end().await;
                        break;
                    }
                    Inbound::Disconnect => {
                        info!("Client sent close frame.");
                        break;
                    }
                    Inbound::Ignore => {}
                },
                Some(Err(e)) => {
                    warn!(error = %e, "Error receiving from client WebSocket");
                    break;
                }
                None => break,
            },
            _ = until_deleted(&mut deleted) => {
                info!("Session was deleted; ending voice connection.");
                let _ = handle.end().await;
                break;
            }
            _ = handle.closed() => break,
        }
    }

    // Dropping the last handle lets the session notice a disconnect.
    entry.detach().await;
    drop(handle);

    match session_task.await {
        Ok(outcome) => info!(reason = ?outcome.reason, "Voice session finished."),
        Err(e) => error!(error = %e, "Voice session task failed"),
    }
    let _ = writer.await;
}

async fn until_deleted(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|deleted| *deleted).await;
}

/// Drains session outputs into the socket until the session closes its stream.
async fn write_outputs(
    mut socket_tx: SplitSink<WebSocket, Message>,
    mut outputs: mpsc::Receiver<SessionOutput>,
) {
    while let Some(output) = outputs.recv().await {
        let msg = match encode_output(output) {
            Ok(msg) => msg,
            Err(e) => {
                error!(error = %e, "Failed to encode control event");
                continue;
            }
        };
        if socket_tx.send(msg).await.is_err() {
            warn!("Client socket is gone; dropping remaining output.");
            break;
        }
    }
    let _ = socket_tx.close().await;
}
