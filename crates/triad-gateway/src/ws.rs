use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use tracing::{debug, warn};

use triad_core::SubscriptionFilter;

use crate::server::AppState;

/// How long the server waits for an optional filter frame after the upgrade.
const FILTER_WAIT: Duration = Duration::from_millis(250);

/// Upgrade handler for `GET /ws/status`.
pub async fn status_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One status-stream connection.
///
/// The first client frame, if it arrives promptly and parses as a
/// [`SubscriptionFilter`], scopes the stream; otherwise the stream carries
/// everything. Events are forwarded as JSON text frames. A slow consumer is
/// throttled by its bounded queue (gap markers), never disconnected.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let filter = match tokio::time::timeout(FILTER_WAIT, socket.recv()).await {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str(&text) {
            Ok(filter) => filter,
            Err(e) => {
                warn!(error = %e, "Invalid subscription filter, using defaults");
                SubscriptionFilter::default()
            }
        },
        Ok(Some(Ok(_))) | Err(_) => SubscriptionFilter::default(),
        // Connection closed before sending anything.
        Ok(Some(Err(_))) | Ok(None) => return,
    };

    let mut subscription = state.broadcaster.subscribe(filter);
    debug!(subscriber_id = %subscription.id(), "Status stream opened");

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else { break };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize status event");
                        continue;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Pings are answered by axum; other frames are ignored.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!(subscriber_id = %subscription.id(), "Status stream closed");
}
