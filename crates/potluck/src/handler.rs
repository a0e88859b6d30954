//! Per-connection handler: room resolution, name admission, and the
//! inbound pump.
//!
//! Each accepted connection gets its own task running
//! [`handle_connection`]. The flow mirrors the client's screens:
//!   1. Receive `create` or `join` until a room is resolved (one
//!      capacity slot is reserved at this point).
//!   2. Receive `name` until admission succeeds.
//!   3. Pump `chat`/`deposit` messages into the room's inbound queue
//!      until the connection drops or the member leaves.

use std::sync::Arc;

use potluck_protocol::{Action, Codec, JsonCodec, Message};
use potluck_room::{Link, LinkError, Room};
use potluck_transport::{Connection, WebSocketConnection};

use crate::ServerError;
use crate::server::ServerState;

/// The room-facing half of a WebSocket connection: encodes messages
/// and writes them, while the handler task keeps reading inbound
/// frames from the same socket.
#[derive(Clone)]
pub(crate) struct WsLink {
    conn: WebSocketConnection,
    codec: JsonCodec,
}

impl Link for WsLink {
    async fn send(&self, msg: &Message) -> Result<(), LinkError> {
        let bytes = self
            .codec
            .encode(msg)
            .map_err(|e| LinkError(e.to_string()))?;
        self.conn
            .send(&bytes)
            .await
            .map_err(|e| LinkError(e.to_string()))
    }

    async fn close(&self) {
        if let Err(e) = self.conn.close().await {
            tracing::debug!(conn_id = %self.conn.id(), error = %e, "close failed");
        }
    }
}

/// Removes the member when the handler exits, however it exits.
/// `Drop` is synchronous, so the async removal is spawned; removal is
/// idempotent, so racing the room's own eviction is harmless.
struct MembershipGuard {
    name: String,
    room: Arc<Room<WsLink>>,
}

impl Drop for MembershipGuard {
    fn drop(&mut self) {
        let name = std::mem::take(&mut self.name);
        let room = Arc::clone(&self.room);
        tokio::spawn(async move {
            room.remove(&name).await;
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), ServerError> {
    let codec = JsonCodec;
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    // --- Step 1: resolve a room ---
    // Errors are relayed back and the client may simply try again;
    // only a dead connection ends the conversation.
    let room = loop {
        let Some(msg) = next_message(&conn, &codec).await? else {
            return Ok(());
        };
        match msg.action {
            Action::Create => {
                let room = state.registry.create(state.room_config.clone()).await;
                match room.reserve() {
                    Ok(()) => break room,
                    Err(e) => {
                        send(&conn, &codec, &Message::error(e.to_string())).await?;
                    }
                }
            }
            Action::Join => {
                match state.registry.lookup_and_reserve(msg.contents.trim()).await {
                    Ok(room) => break room,
                    Err(e) => {
                        send(&conn, &codec, &Message::error(e.to_string())).await?;
                    }
                }
            }
            other => {
                send(
                    &conn,
                    &codec,
                    &Message::error(format!("expected create or join, got {other}")),
                )
                .await?;
            }
        }
    };

    if let Err(e) = send(&conn, &codec, &Message::server(Action::Join, room.id())).await {
        room.release_slot();
        return Err(e);
    }

    // --- Step 2: name admission ---
    // The capacity slot stays reserved while the client picks a name;
    // every exit path before admission hands it back.
    let name = loop {
        let msg = match next_message(&conn, &codec).await {
            Ok(Some(msg)) => msg,
            Ok(None) | Err(_) => {
                room.release_slot();
                return Ok(());
            }
        };
        if msg.action != Action::Name {
            let reply = Message::error(format!("expected name, got {}", msg.action));
            if send(&conn, &codec, &reply).await.is_err() {
                room.release_slot();
                return Ok(());
            }
            continue;
        }

        let candidate = msg.contents.trim().to_string();
        let link = WsLink {
            conn: conn.clone(),
            codec,
        };
        match room.admit(&candidate, link).await {
            Ok(()) => break candidate,
            Err(e) => {
                if send(&conn, &codec, &Message::error(e.to_string())).await.is_err() {
                    room.release_slot();
                    return Ok(());
                }
            }
        }
    };

    let _guard = MembershipGuard {
        name: name.clone(),
        room: Arc::clone(&room),
    };
    tracing::info!(%conn_id, room_id = %room.id(), member = %name, "member joined");
    send(&conn, &codec, &Message::server(Action::Name, name.clone())).await?;

    // --- Step 3: inbound pump ---
    loop {
        let msg = match next_message(&conn, &codec).await {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                tracing::info!(%conn_id, member = %name, "connection closed");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, member = %name, error = %e, "receive failed");
                break;
            }
        };
        match msg.action {
            Action::Chat | Action::Deposit => {
                let mut msg = msg;
                // The sender field is asserted server-side; whatever the
                // client wrote there is overwritten.
                msg.sender = name.clone();
                room.submit(msg).await;
            }
            Action::Leave => {
                let _ = send(&conn, &codec, &Message::server(Action::Leave, "goodbye")).await;
                break;
            }
            other => {
                let reply = Message::error(format!("unexpected {other}"));
                if send(&conn, &codec, &reply).await.is_err() {
                    break;
                }
            }
        }
    }

    // _guard drops here → member removal fires.
    Ok(())
}

/// Receives the next decodable message. Undecodable frames get an
/// `error` reply and another try; `Ok(None)` means a clean close.
async fn next_message(
    conn: &WebSocketConnection,
    codec: &JsonCodec,
) -> Result<Option<Message>, ServerError> {
    loop {
        let Some(data) = conn.recv().await? else {
            return Ok(None);
        };
        match codec.decode::<Message>(&data) {
            Ok(msg) => return Ok(Some(msg)),
            Err(e) => {
                tracing::debug!(conn_id = %conn.id(), error = %e, "undecodable frame");
                send(conn, codec, &Message::error(format!("unreadable message: {e}"))).await?;
            }
        }
    }
}

async fn send(
    conn: &WebSocketConnection,
    codec: &JsonCodec,
    msg: &Message,
) -> Result<(), ServerError> {
    let bytes = codec.encode(msg)?;
    conn.send(&bytes).await?;
    Ok(())
}
