//! WebSocket sessions.
//!
//! The handshake is authenticated before upgrading; an invalid credential
//! gets a plain 401. After that every problem is reported as an `error`
//! event on the same socket and the connection stays open.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use orderchat_shared::identity::Identity;
use orderchat_shared::protocol::{ClientEvent, ServerEvent};
use orderchat_shared::ChatError;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::api::AppState;
use crate::auth::bearer_from_headers;
use crate::error::ServerError;
use crate::messaging::OutgoingMessage;
use crate::realtime::ConnectionId;

#[derive(Debug, Default, Deserialize)]
pub struct HandshakeParams {
    token: Option<String>,
}

/// `GET /ws`. The token comes from the `Authorization` header or, for
/// browsers that cannot set headers on a socket, the `token` query parameter.
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Option<Query<HandshakeParams>>,
    ws: Option<WebSocketUpgrade>,
) -> Result<Response, ServerError> {
    let bearer = bearer_from_headers(&headers)
        .map(str::to_string)
        .or_else(|| params.and_then(|Query(p)| p.token))
        .ok_or(ChatError::Unauthenticated)?;
    let identity = state.authenticator.authenticate(&bearer).await?;

    let Some(ws) = ws else {
        return Err(ServerError::BadRequest(
            "expected a websocket upgrade".into(),
        ));
    };

    Ok(ws.on_upgrade(move |socket| run_session(state, identity, socket)))
}

async fn run_session(state: AppState, identity: Identity, mut socket: WebSocket) {
    let (conn, mut outbound) = state
        .hub
        .connect(identity.user_id, identity.name.clone())
        .await;
    info!(connection = %conn, user = %identity.user_id, "Realtime session opened");

    loop {
        tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else { break };
                match event.to_json() {
                    Ok(text) => {
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(connection = %conn, error = %e, "Failed to encode event"),
                }
            }
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&state, &identity, conn, &text).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        state
                            .hub
                            .send_to(conn, ServerEvent::error("Binary frames are not supported"))
                            .await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong are answered by the socket itself.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(connection = %conn, error = %e, "Socket error");
                        break;
                    }
                }
            }
        }
    }

    state.hub.disconnect(conn).await;
    info!(connection = %conn, user = %identity.user_id, "Realtime session closed");
}

/// Decode and apply one inbound frame, answering failures with an
/// `error` event.
pub(crate) async fn handle_frame(state: &AppState, identity: &Identity, conn: ConnectionId, raw: &str) {
    let event = match ClientEvent::from_json(raw) {
        Ok(event) => event,
        Err(e) => {
            debug!(connection = %conn, error = %e, "Malformed realtime payload");
            state
                .hub
                .send_to(conn, ServerEvent::error("Invalid event payload"))
                .await;
            return;
        }
    };

    let name = event.name();
    if let Err(err) = dispatch(state, identity, conn, event).await {
        match &err {
            ChatError::Internal(detail) => {
                error!(connection = %conn, event = name, error = %detail, "Realtime event failed")
            }
            other => debug!(connection = %conn, event = name, error = %other, "Realtime event rejected"),
        }
        state
            .hub
            .send_to(conn, ServerEvent::error(err.public_message()))
            .await;
    }
}

async fn dispatch(
    state: &AppState,
    identity: &Identity,
    conn: ConnectionId,
    event: ClientEvent,
) -> Result<(), ChatError> {
    match event {
        ClientEvent::JoinRoom { order_id } => {
            let (room, role) = state.rooms.authorize(order_id, identity.user_id).await?;
            state.hub.join(conn, &room, role).await
        }
        ClientEvent::LeaveRoom { order_id } => state.hub.leave(conn, order_id).await,
        ClientEvent::SendMessage {
            order_id,
            message,
            message_type,
        } => {
            state.hub.require_joined(conn, order_id).await?;
            let outgoing = OutgoingMessage {
                order_id,
                body: message,
                message_type: message_type.unwrap_or_default(),
            };
            let (view, room) = state
                .messaging
                .send_message(identity.user_id, outgoing)
                .await?;
            state.hub.publish_message(&room, &view).await;
            Ok(())
        }
        ClientEvent::TypingStart { order_id } => state.hub.set_typing(conn, order_id, true).await,
        ClientEvent::TypingStop { order_id } => state.hub.set_typing(conn, order_id, false).await,
        ClientEvent::MarkRead { order_id } => {
            state.hub.require_joined(conn, order_id).await?;
            let (_, role, count) = state
                .messaging
                .mark_read(order_id, identity.user_id)
                .await?;
            state
                .hub
                .publish_read_receipt(order_id, identity.user_id, role, count, Some(conn))
                .await;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestApp;
    use orderchat_shared::{AccountRole, Role};
    use serde_json::json;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn frame(event: &str, data: serde_json::Value) -> String {
        json!({ "event": event, "data": data }).to_string()
    }

    struct Session {
        identity: Identity,
        conn: ConnectionId,
        rx: mpsc::Receiver<ServerEvent>,
    }

    async fn open(app: &TestApp, user_id: Uuid, role: AccountRole) -> Session {
        let identity = app.identity(user_id, role);
        let (conn, rx) = app
            .state
            .hub
            .connect(identity.user_id, identity.name.clone())
            .await;
        Session { identity, conn, rx }
    }

    async fn send(app: &TestApp, session: &Session, raw: &str) {
        handle_frame(&app.state, &session.identity, session.conn, raw).await;
    }

    #[tokio::test]
    async fn hello_reaches_both_participants() {
        let app = TestApp::new().await;
        let order_id = app.order.order_id;
        app.state.rooms.create_or_get_room(order_id).await.unwrap();
        let before = app.state.rooms.get_room_by_order(order_id).await.unwrap();

        let mut client = open(&app, app.order.client_id, AccountRole::Customer).await;
        let mut store = open(&app, app.order.store_user_id, AccountRole::StoreOwner).await;
        let join = frame("join_room", json!({ "orderId": order_id }));
        send(&app, &client, &join).await;
        send(&app, &store, &join).await;
        drain(&mut client.rx);
        drain(&mut store.rx);

        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        send(
            &app,
            &client,
            &frame("send_message", json!({ "orderId": order_id, "message": "Hello" })),
        )
        .await;

        for rx in [&mut client.rx, &mut store.rx] {
            let events = drain(rx);
            assert!(matches!(
                events.as_slice(),
                [ServerEvent::NewMessage(m)]
                    if m.message == "Hello" && m.sender_type == Role::Client && !m.is_read
            ));
        }

        let after = app.state.rooms.get_room_by_order(order_id).await.unwrap();
        assert!(after.updated_at > before.updated_at);
        // The store was connected, so nobody was notified.
        assert!(app.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn outsiders_get_error_events_and_stay_connected() {
        let app = TestApp::new().await;
        let order_id = app.order.order_id;
        app.state.rooms.create_or_get_room(order_id).await.unwrap();

        let mut outsider = open(&app, Uuid::new_v4(), AccountRole::Customer).await;
        send(&app, &outsider, &frame("join_room", json!({ "orderId": order_id }))).await;
        let real = drain(&mut outsider.rx);
        send(&app, &outsider, &frame("join_room", json!({ "orderId": Uuid::new_v4() }))).await;
        let guessed = drain(&mut outsider.rx);
        assert!(matches!(
            real.as_slice(),
            [ServerEvent::Error { message }] if message == "Chat room not found"
        ));
        assert_eq!(real, guessed);

        send(&app, &outsider, "{not json").await;
        send(&app, &outsider, &frame("dance", json!({}))).await;
        let events = drain(&mut outsider.rx);
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e, ServerEvent::Error { message } if message == "Invalid event payload")));

        assert_eq!(app.state.hub.connection_count().await, 1);
    }

    #[tokio::test]
    async fn events_require_the_joined_order() {
        let app = TestApp::new().await;
        let order_id = app.order.order_id;
        app.state.rooms.create_or_get_room(order_id).await.unwrap();
        let mut client = open(&app, app.order.client_id, AccountRole::Customer).await;

        send(
            &app,
            &client,
            &frame("send_message", json!({ "orderId": order_id, "message": "early" })),
        )
        .await;
        assert!(matches!(
            drain(&mut client.rx).as_slice(),
            [ServerEvent::Error { .. }]
        ));
        let history = app
            .state
            .messaging
            .get_history(order_id, app.order.client_id, None, None)
            .await
            .unwrap();
        assert_eq!(history.total, 0);

        send(&app, &client, &frame("leave_room", json!({ "orderId": order_id }))).await;
        assert!(matches!(
            drain(&mut client.rx).as_slice(),
            [ServerEvent::Error { .. }]
        ));
    }

    #[tokio::test]
    async fn mark_read_notifies_the_other_side() {
        let app = TestApp::new().await;
        let order_id = app.order.order_id;
        app.state.rooms.create_or_get_room(order_id).await.unwrap();

        let mut client = open(&app, app.order.client_id, AccountRole::Customer).await;
        let mut store = open(&app, app.order.store_user_id, AccountRole::StoreOwner).await;
        let join = frame("join_room", json!({ "orderId": order_id }));
        send(&app, &client, &join).await;
        send(&app, &store, &join).await;
        send(
            &app,
            &client,
            &frame("send_message", json!({ "orderId": order_id, "message": "Extra napkins please" })),
        )
        .await;
        drain(&mut client.rx);
        drain(&mut store.rx);

        send(&app, &store, &frame("mark_read", json!({ "orderId": order_id }))).await;
        assert!(matches!(
            drain(&mut client.rx).as_slice(),
            [ServerEvent::MessagesRead { reader_role: Role::Store, count: 1, .. }]
        ));
        assert!(drain(&mut store.rx).is_empty());
    }

    #[tokio::test]
    async fn typing_is_relayed_to_others() {
        let app = TestApp::new().await;
        let order_id = app.order.order_id;
        app.state.rooms.create_or_get_room(order_id).await.unwrap();

        let mut client = open(&app, app.order.client_id, AccountRole::Customer).await;
        let mut store = open(&app, app.order.store_user_id, AccountRole::StoreOwner).await;
        let join = frame("join_room", json!({ "orderId": order_id }));
        send(&app, &client, &join).await;
        send(&app, &store, &join).await;
        drain(&mut client.rx);
        drain(&mut store.rx);

        send(&app, &store, &frame("typing_start", json!({ "orderId": order_id }))).await;
        send(&app, &store, &frame("typing_stop", json!({ "orderId": order_id }))).await;
        let events = drain(&mut client.rx);
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::TypingStart(a), ServerEvent::TypingStop(b)]
                if a.role == Role::Store && b.role == Role::Store
        ));
        assert!(drain(&mut store.rx).is_empty());
    }
}
