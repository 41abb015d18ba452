//! WebSocket upgrade and per-connection read/write loops.

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, header},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use orbit_protocol::ServerMessage;
use tokio::sync::mpsc;

use super::types::OutboundSink;
use crate::api::{ApiError, AppState};

/// Interval between protocol-level ping frames.
const PING_INTERVAL_SECS: u64 = 30;

/// WebSocket upgrade handler.
///
/// GET /ws
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    check_origin(&headers, &state.allowed_origins)?;
    state.registry.check_admission()?;
    Ok(ws.on_upgrade(move |socket| handle_ws_connection(socket, state)))
}

/// Browsers do not apply CORS to WebSocket upgrades, so the `Origin` header is
/// checked here. Requests without one come from non-browser clients.
fn check_origin(headers: &HeaderMap, allowed: &[String]) -> Result<(), ApiError> {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return Ok(());
    };
    let origin = origin.to_str().unwrap_or_default();
    if allowed.iter().any(|allowed| allowed == origin) {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!("origin {origin:?} is not allowed")))
    }
}

async fn handle_ws_connection(socket: WebSocket, state: AppState) {
    let (sink, outbound_rx) = OutboundSink::channel();
    let conn_id = match state.registry.create(sink.clone()) {
        Ok(id) => id,
        Err(e) => {
            warn!("rejecting WebSocket connection: {}", e);
            return;
        }
    };
    info!("WebSocket connection {} opened", conn_id);

    let (sender, mut receiver) = socket.split();
    sink.send(ServerMessage::ConnectionStatus { connected: true });
    let mut send_task = tokio::spawn(write_loop(sender, outbound_rx));

    loop {
        tokio::select! {
            frame = receiver.next() => {
                let Some(frame) = frame else { break };
                match frame {
                    Ok(Message::Text(text)) => {
                        state.router.handle_text(&conn_id, text.as_str()).await;
                    }
                    Ok(Message::Binary(_)) => {
                        debug!("binary frame from {}, ignoring", conn_id);
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => {
                        info!("client closed connection {}", conn_id);
                        break;
                    }
                    Err(e) => {
                        warn!("WebSocket error on {}: {}", conn_id, e);
                        break;
                    }
                }
            }
            _ = &mut send_task => {
                debug!("writer for {} finished", conn_id);
                break;
            }
            _ = state.registry.closed() => {
                info!("closing connection {} for shutdown", conn_id);
                break;
            }
        }
    }

    state.registry.remove(&conn_id).await;
    send_task.abort();
    info!("WebSocket connection {} closed", conn_id);
}

async fn write_loop(
    mut sender: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
) {
    let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
    ping_interval.tick().await;

    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(message) = message else { break };
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("failed to serialize outbound message: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = sender.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_origin(origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_str(origin).unwrap());
        headers
    }

    #[test]
    fn test_missing_origin_is_allowed() {
        assert!(check_origin(&HeaderMap::new(), &[]).is_ok());
    }

    #[test]
    fn test_listed_origin_is_allowed() {
        let allowed = vec!["http://localhost:5173".to_string()];
        assert!(check_origin(&with_origin("http://localhost:5173"), &allowed).is_ok());
    }

    #[test]
    fn test_unlisted_origin_is_forbidden() {
        let allowed = vec!["http://localhost:5173".to_string()];
        assert!(matches!(
            check_origin(&with_origin("https://evil.test"), &allowed),
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            check_origin(&with_origin("http://localhost:5173"), &[]),
            Err(ApiError::Forbidden(_))
        ));
    }
}
