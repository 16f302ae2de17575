use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, error, warn};
use serde::Deserialize;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::auth;
use crate::auth::model::UserInfo;

use super::context;
use super::registry::Connection;
use super::service::EventService;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

/// Token validation happens before the upgrade completes, so an
/// unauthenticated client never holds an open socket.
pub async fn ws(
    Query(params): Query<WsParams>,
    State(auth_service): State<auth::Service>,
    State(event_service): State<EventService>,
    ws: WebSocketUpgrade,
) -> super::Result<Response> {
    let token = params.token.ok_or(auth::Error::MissingToken)?;

    let user = tokio::time::timeout(HANDSHAKE_TIMEOUT, auth_service.validate(&token))
        .await
        .map_err(|_| {
            warn!("WS handshake timed out");
            super::Error::ConnectionRejected
        })?
        .map_err(super::Error::from)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user, event_service)))
}

async fn handle_socket(socket: WebSocket, user: UserInfo, event_service: EventService) {
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let ctx = context::Ws::new(user, Connection::new(frames_tx));

    event_service.connect(&ctx);

    let (sink, stream) = socket.split();
    let read_task = tokio::spawn(read(ctx.clone(), event_service.clone(), stream));
    let write_task = tokio::spawn(write(ctx.clone(), sink, frames_rx));

    if let Err(e) = tokio::try_join!(read_task, write_task) {
        error!("WS connection task panicked: {e}");
    }

    event_service.disconnect(&ctx);
}

/// Reads frames and drives the heartbeat. A connection that fails to pong
/// within one interval is considered gone and torn down.
async fn read(ctx: context::Ws, event_service: EventService, mut stream: SplitStream<WebSocket>) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    // the first tick fires immediately
    heartbeat.tick().await;

    loop {
        tokio::select! {
            () = ctx.close.notified() => break,
            _ = heartbeat.tick() => {
                if !ctx.connection.take_alive() {
                    debug!("Heartbeat missed for {}, closing", ctx.user.id);
                    ctx.close.notify_one();
                    break;
                }
                ctx.connection.send_raw(Message::Ping(Bytes::new()));
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    event_service.handle(&ctx, text.as_str()).await;
                }
                Some(Ok(Message::Pong(_))) => ctx.connection.mark_alive(),
                Some(Ok(Message::Ping(_))) => {
                    // the transport answers pings on our behalf
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!("Ignoring binary frame from {}", ctx.user.id);
                }
                Some(Ok(Message::Close(_))) | None => {
                    ctx.close.notify_one();
                    break;
                }
                Some(Err(e)) => {
                    warn!("WS read failed for {}: {e}", ctx.user.id);
                    ctx.close.notify_one();
                    break;
                }
            },
        }
    }
}

/// Drains the connection's outbound queue into the socket.
async fn write(
    ctx: context::Ws,
    mut sink: SplitSink<WebSocket, Message>,
    mut frames: UnboundedReceiver<Message>,
) {
    loop {
        tokio::select! {
            () = ctx.close.notified() => break,
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(frame).await {
                        debug!("WS write failed for {}: {e}", ctx.user.id);
                        ctx.close.notify_one();
                        break;
                    }
                }
                None => {
                    ctx.close.notify_one();
                    break;
                }
            },
        }
    }

    let _ = sink.close().await;
}
