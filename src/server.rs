//! HTTP/WebSocket wiring: routes, the per-connection socket loop, message
//! dispatch, and the background sweeps.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::{Html, IntoResponse, Json},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::error::{close_code, SessionError};
use crate::handlers;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::Outbound;
use crate::state::AppState;

pub async fn run(state: Arc<AppState>) -> anyhow::Result<()> {
    spawn_sweepers(state.clone());

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(addr = %addr, "session server listening");
    tracing::info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

/// Background sweeps: the connection liveness check and the room reaper.
fn spawn_sweepers(state: Arc<AppState>) {
    let interval_ms = state.config.room.sweep_interval_ms;

    let liveness_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            interval.tick().await;
            handlers::sweep_idle_connections(liveness_state.clone()).await;
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            interval.tick().await;
            handlers::reap_rooms(state.clone()).await;
        }
    });
}

async fn index_handler() -> Html<&'static str> {
    Html("<h1>TutorLink Session Server</h1><p>WebSocket endpoint: /ws</p>")
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": "tutorlink-session-rs",
        "rooms": state.rooms.len(),
        "connections": state.registry.len(),
    }))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One receive loop per transport connection. Outbound frames flow through
/// a bounded outbox drained by a dedicated send task; a `kick` wakes this
/// loop when the connection is force-disconnected from elsewhere.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(state.config.room.outbox_capacity);
    let kick = Arc::new(Notify::new());
    let connection_id = Uuid::new_v4().to_string();

    let mut send_task = tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            match item {
                Outbound::Frame(frame) => {
                    let Ok(json) = serde_json::to_string(&frame) else {
                        continue;
                    };
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let _ = ws_sender
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    let mut joined = false;
    loop {
        let frame = tokio::select! {
            _ = kick.notified() => break,
            frame = ws_receiver.next() => match frame {
                Some(Ok(frame)) => frame,
                Some(Err(_)) | None => break,
            },
        };

        match frame {
            Message::Text(text) => {
                let msg = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => msg,
                    Err(err) => {
                        tracing::debug!(
                            connection_id = %connection_id,
                            error = %err,
                            "dropping unparseable frame"
                        );
                        let _ = tx.try_send(Outbound::Frame(error_frame(
                            &SessionError::UnsupportedMessageType("unparseable frame".to_string()),
                        )));
                        continue;
                    }
                };
                if dispatch(&state, &connection_id, &tx, &kick, &mut joined, msg)
                    .await
                    .is_break()
                {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    if joined {
        handlers::handle_disconnect(&state, &connection_id).await;
    }

    // Let queued frames, including any close frame, flush before giving up.
    drop(tx);
    if tokio::time::timeout(Duration::from_secs(1), &mut send_task)
        .await
        .is_err()
    {
        send_task.abort();
    }
}

/// Explicit dispatch table keyed by message type. Recoverable errors go back
/// to the sender as `error` frames; fatal ones close the transport with
/// their close code.
async fn dispatch(
    state: &Arc<AppState>,
    connection_id: &str,
    tx: &mpsc::Sender<Outbound>,
    kick: &Arc<Notify>,
    joined: &mut bool,
    msg: ClientMessage,
) -> ControlFlow<()> {
    if *joined {
        state.registry.touch(connection_id);
    }

    let result: Result<(), SessionError> = match msg {
        ClientMessage::Heartbeat => {
            if *joined {
                handlers::handle_heartbeat(state, connection_id);
            } else {
                let _ = tx.try_send(Outbound::Frame(ServerMessage::HeartbeatAck));
            }
            Ok(())
        }
        ClientMessage::Join {
            room_id,
            user_id,
            display_name,
            role,
            wants_video,
        } => {
            if *joined {
                Err(SessionError::DuplicateConnection(connection_id.to_string()))
            } else {
                let req = handlers::JoinRequest {
                    room_id,
                    user_id,
                    display_name,
                    role,
                    wants_video,
                    sender: tx.clone(),
                    kick: kick.clone(),
                };
                match handlers::handle_join(state, connection_id, req).await {
                    Ok(()) => {
                        *joined = true;
                        Ok(())
                    }
                    Err(err) => {
                        let _ = tx.try_send(Outbound::Frame(ServerMessage::Rejected {
                            reason: err.code().to_string(),
                        }));
                        let _ = tx.try_send(Outbound::Close {
                            code: err.close_code().unwrap_or(close_code::INTERNAL),
                            reason: err.to_string(),
                        });
                        return ControlFlow::Break(());
                    }
                }
            }
        }
        ClientMessage::Leave => {
            if *joined {
                handlers::handle_disconnect(state, connection_id).await;
                *joined = false;
            }
            let _ = tx.try_send(Outbound::Close {
                code: close_code::NORMAL,
                reason: "left".to_string(),
            });
            return ControlFlow::Break(());
        }
        _ if !*joined => Err(SessionError::UnsupportedMessageType(
            "join required first".to_string(),
        )),
        ClientMessage::Signal { kind, payload, seq } => {
            handlers::handle_signal(state, connection_id, &kind, payload, seq).await
        }
        ClientMessage::WbOp { op_type, data } => {
            handlers::handle_wb_op(state, connection_id, op_type, data).await
        }
        ClientMessage::WbUndo => handlers::handle_wb_undo(state, connection_id).await,
        ClientMessage::WbRedo => handlers::handle_wb_redo(state, connection_id).await,
        ClientMessage::IceConfig => {
            handlers::handle_ice_config(state, connection_id).await;
            Ok(())
        }
    };

    if let Err(err) = result {
        match err.close_code() {
            Some(code) => {
                if err == SessionError::RoomClosed {
                    if let Some(conn) = state.registry.get(connection_id) {
                        let _ = tx.try_send(Outbound::Frame(ServerMessage::RoomClosed {
                            room_id: conn.room_id.clone(),
                        }));
                    }
                }
                let _ = tx.try_send(Outbound::Close {
                    code,
                    reason: err.to_string(),
                });
                handlers::handle_disconnect(state, connection_id).await;
                return ControlFlow::Break(());
            }
            None => {
                let _ = tx.try_send(Outbound::Frame(error_frame(&err)));
            }
        }
    }
    ControlFlow::Continue(())
}

fn error_frame(err: &SessionError) -> ServerMessage {
    ServerMessage::Error {
        code: err.code().to_string(),
        message: err.to_string(),
    }
}
