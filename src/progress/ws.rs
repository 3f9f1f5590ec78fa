//! WebSocket stream of progress events at `/ws/progress/{session_id}`.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use super::ProgressNotifier;

/// Build the router for `/ws/progress/{session_id}`.
pub fn progress_routes(notifier: Arc<ProgressNotifier>) -> Router {
    Router::new()
        .route("/ws/progress/{session_id}", get(ws_handler))
        .with_state(notifier)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(notifier): State<Arc<ProgressNotifier>>,
) -> impl IntoResponse {
    info!(session = %session_id, "Progress WebSocket client connecting");
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, notifier))
}

async fn handle_socket(mut socket: WebSocket, session_id: String, notifier: Arc<ProgressNotifier>) {
    let sub = notifier.subscribe(&session_id).await;
    let subscriber_id = sub.id;
    let mut events = sub.into_stream();
    info!(session = %session_id, subscriber = %subscriber_id, "Progress WebSocket client connected");

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else {
                    debug!("Progress subscription closed");
                    break;
                };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            debug!("Progress client disconnected during send");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to serialize progress event"),
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(session = %session_id, "Progress WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Progress WebSocket error");
                        break;
                    }
                    // Clients only listen; anything else they send is ignored.
                    _ => {}
                }
            }
        }
    }

    notifier.unsubscribe(&session_id, subscriber_id).await;
}
