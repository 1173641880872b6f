use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, Method, StatusCode},
    middleware,
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use orderchat_shared::dto::{ChatStats, HistoryPage, MessageView, RoomPage, RoomView};
use orderchat_shared::identity::Identity;
use orderchat_shared::{ChatError, MessageType, SystemEventType};
use orderchat_store::SharedDatabase;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::auth::{require_auth, verify_admin_token, Authenticator};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::messaging::{MessagingEngine, MessagingLimits, OutgoingMessage};
use crate::notify::Notifier;
use crate::order_events::{OrderEvent, OrderEventBus, OrderEventHandler};
use crate::rate_limit::{rate_limit_middleware, IpRateLimiter, SenderRateLimiter};
use crate::realtime::RealtimeHub;
use crate::rooms::{RoomManager, RoomQuery};
use crate::system_messages::SystemMessageInjector;
use crate::ws::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub db: SharedDatabase,
    pub rooms: RoomManager,
    pub messaging: MessagingEngine,
    pub system_messages: SystemMessageInjector,
    pub hub: RealtimeHub,
    pub authenticator: Authenticator,
    pub order_events: OrderEventBus,
    pub order_handler: OrderEventHandler,
    pub ip_limiter: IpRateLimiter,
    pub sender_limiter: SenderRateLimiter,
}

impl AppState {
    /// Wire every component over one database handle.
    pub fn new(config: ServerConfig, db: SharedDatabase, notifier: Arc<dyn Notifier>) -> Self {
        let rooms = RoomManager::new(db.clone());
        let sender_limiter =
            SenderRateLimiter::new(config.message_rate_per_sec, config.message_burst);
        let messaging = MessagingEngine::new(
            db.clone(),
            rooms.clone(),
            sender_limiter.clone(),
            MessagingLimits {
                max_message_length: config.max_message_length,
                block_sends_on_closed_rooms: config.block_sends_on_closed_rooms,
            },
        );
        let hub = RealtimeHub::new(notifier, config.outbound_buffer);
        let system_messages =
            SystemMessageInjector::new(rooms.clone(), messaging.clone(), hub.clone());
        let order_handler =
            OrderEventHandler::new(db.clone(), rooms.clone(), system_messages.clone());

        Self {
            authenticator: Authenticator::new(config.auth_server_pubkey, db.clone()),
            config: Arc::new(config),
            db,
            rooms,
            messaging,
            system_messages,
            hub,
            order_events: OrderEventBus::default(),
            order_handler,
            ip_limiter: IpRateLimiter::default(),
            sender_limiter,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(Any);

    let authenticated = Router::new()
        .route("/rooms", get(list_rooms))
        .route("/rooms/by-id/:room_id", get(get_room_by_id))
        .route("/rooms/:order_id", post(create_room).get(get_room))
        .route("/rooms/:order_id/messages", get(get_messages))
        .route("/rooms/:order_id/read", put(mark_read))
        .route("/rooms/:order_id/close", put(close_room))
        .route("/messages", post(send_message))
        .route("/system-messages", post(post_system_message))
        .route("/stats", get(stats))
        .route_layer(middleware::from_fn_with_state(
            state.authenticator.clone(),
            require_auth,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/internal/order-events", post(ingest_order_event))
        .route("/ws", get(ws_handler))
        .merge(authenticated)
        .layer(middleware::from_fn_with_state(
            state.ip_limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data: Some(data),
        })
    }

    fn with_message(message: &str, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.to_string()),
            data: Some(data),
        })
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ServerError>;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServerError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ServerError::BadRequest(e.body_text()))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, ServerError> {
    params
        .map(|Query(v)| v)
        .map_err(|e| ServerError::BadRequest(e.body_text()))
}

fn parse_order_id(raw: &str) -> Result<Uuid, ServerError> {
    parse_uuid("orderId", raw)
}

fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, ServerError> {
    raw.parse::<Uuid>().map_err(|_| {
        ChatError::validation(field, format!("{field} must be a valid UUID")).into()
    })
}

/// Accept an RFC 3339 timestamp or a bare `YYYY-MM-DD` date. A bare date
/// covers the whole day: its start for `from`, its end for `to`.
fn parse_bound(field: &str, raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, ServerError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        ServerError::from(ChatError::validation(
            field,
            format!("'{field}' must be a date (YYYY-MM-DD) or RFC 3339 timestamp"),
        ))
    })?;
    let time = if end_of_day {
        NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        Some(NaiveTime::MIN)
    };
    let time = time.unwrap_or(NaiveTime::MIN);
    Ok(date.and_time(time).and_utc())
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    connections: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageParams {
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomListParams {
    is_active: Option<bool>,
    from: Option<String>,
    to: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest {
    order_id: Uuid,
    message: String,
    #[serde(default)]
    message_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SystemMessageRequest {
    order_id: Uuid,
    #[serde(rename = "type")]
    event_type: String,
    message: String,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkReadResponse {
    marked_count: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        connections: state.hub.connection_count().await,
    })
}

async fn create_room(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Path(order_id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<RoomView>>), ServerError> {
    let order_id = parse_order_id(&order_id)?;
    let (room, created) = state
        .rooms
        .create_or_get_room_as(order_id, caller.user_id)
        .await?;

    if created {
        Ok((
            StatusCode::CREATED,
            ApiResponse::with_message("Chat room created", room),
        ))
    } else {
        Ok((StatusCode::OK, ApiResponse::data(room)))
    }
}

async fn get_room(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Path(order_id): Path<String>,
) -> ApiResult<RoomView> {
    let order_id = parse_order_id(&order_id)?;
    let room = state
        .rooms
        .room_view_by_order(order_id, Some(caller.user_id))
        .await?;
    Ok(ApiResponse::data(room))
}

async fn get_room_by_id(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Path(room_id): Path<String>,
) -> ApiResult<RoomView> {
    let room_id = parse_uuid("roomId", &room_id)?;
    let room = state
        .rooms
        .room_view_by_id(room_id, Some(caller.user_id))
        .await?;
    Ok(ApiResponse::data(room))
}

async fn get_messages(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Path(order_id): Path<String>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> ApiResult<HistoryPage> {
    let order_id = parse_order_id(&order_id)?;
    let params = query(params)?;
    let page = state
        .messaging
        .get_history(order_id, caller.user_id, params.limit, params.offset)
        .await?;
    Ok(ApiResponse::data(page))
}

async fn mark_read(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Path(order_id): Path<String>,
) -> ApiResult<MarkReadResponse> {
    let order_id = parse_order_id(&order_id)?;
    let (_, role, count) = state.messaging.mark_read(order_id, caller.user_id).await?;
    state
        .hub
        .publish_read_receipt(order_id, caller.user_id, role, count, None)
        .await;
    Ok(ApiResponse::with_message(
        "Messages marked as read",
        MarkReadResponse {
            marked_count: count,
        },
    ))
}

async fn list_rooms(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    params: Result<Query<RoomListParams>, QueryRejection>,
) -> ApiResult<RoomPage> {
    let params = query(params)?;
    let room_query = RoomQuery {
        is_active: params.is_active,
        from: params
            .from
            .as_deref()
            .map(|raw| parse_bound("from", raw, false))
            .transpose()?,
        to: params
            .to
            .as_deref()
            .map(|raw| parse_bound("to", raw, true))
            .transpose()?,
        limit: params.limit,
        offset: params.offset,
    };
    let page = state
        .rooms
        .list_rooms_for_user(caller.user_id, room_query)
        .await?;
    Ok(ApiResponse::data(page))
}

async fn close_room(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Path(order_id): Path<String>,
) -> ApiResult<RoomView> {
    let order_id = parse_order_id(&order_id)?;
    let room = state.rooms.close_room(order_id, caller.user_id).await?;
    Ok(ApiResponse::with_message("Chat room closed", room))
}

async fn send_message(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<MessageView>>), ServerError> {
    let req = body(payload)?;
    let message_type = match req.message_type.as_deref() {
        None => MessageType::default(),
        Some(raw) => MessageType::parse(raw).ok_or_else(|| {
            ChatError::validation("messageType", "messageType must be TEXT or IMAGE")
        })?,
    };

    let (view, room) = state
        .messaging
        .send_message(
            caller.user_id,
            OutgoingMessage {
                order_id: req.order_id,
                body: req.message,
                message_type,
            },
        )
        .await?;
    state.hub.publish_message(&room, &view).await;

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Message sent", view),
    ))
}

async fn post_system_message(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    payload: Result<Json<SystemMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<MessageView>>), ServerError> {
    let req = body(payload)?;
    let event_type = SystemEventType::parse(&req.event_type)
        .ok_or_else(|| ChatError::validation("type", "Unknown system message type"))?;

    let view = state
        .system_messages
        .post_as(&caller, req.order_id, event_type, &req.message, req.metadata)
        .await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("System message posted", view),
    ))
}

async fn stats(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
) -> ApiResult<ChatStats> {
    Ok(ApiResponse::data(state.rooms.stats(caller.user_id).await?))
}

async fn ingest_order_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<OrderEvent>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<()>>), ServerError> {
    verify_admin_token(&headers, &state.config)?;
    let event = body(payload)?;
    state.order_events.publish(event);

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            success: true,
            message: Some("Event accepted".to_string()),
            data: None,
        }),
    ))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
