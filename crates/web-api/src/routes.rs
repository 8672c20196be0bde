use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use application::{
    CreateRoomRequest, Identity, IdentityDto, MessageDto, RegisterUserRequest, RoomDto, UserDto,
};
use domain::{ChatRoom, RoomCode};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    auth::{AdminUser, CurrentUser},
    error::ApiError,
    state::AppState,
    ws_connection::WebSocketConnection,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/admin/login", post(admin_login))
        .route("/auth/logout", post(logout))
        .route("/me", get(me))
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/{code}", get(room_detail))
        .route("/rooms/{code}/messages", get(room_history))
        .route("/admin/users", get(admin_list_users))
        .route("/admin/rooms", get(admin_list_rooms))
        .route("/admin/rooms/{code}/deactivate", post(admin_deactivate_room))
        .route("/ws", get(websocket_upgrade))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    username: String,
    email: String,
    password: String,
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .user_service
        .register(RegisterUserRequest {
            username: payload.username,
            email: payload.email,
            password: payload.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(UserDto::from(&user))))
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    user: IdentityDto,
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    let identity = state
        .identity_service
        .authenticate(&payload.username, &payload.password)
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid username or password"))?;

    open_session(&state, identity).await
}

async fn admin_login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    let identity = state
        .identity_service
        .authenticate_admin(&payload.username, &payload.password)
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid admin credentials"))?;

    open_session(&state, identity).await
}

async fn open_session(
    state: &AppState,
    identity: Identity,
) -> Result<Json<LoginResponse>, ApiError> {
    let session = state.identity_service.open_session(identity).await?;
    let token = state.jwt_service.issue(&session)?;

    Ok(Json(LoginResponse {
        token,
        user: IdentityDto::from(&session.identity),
    }))
}

async fn logout(State(state): State<AppState>, user: CurrentUser) -> StatusCode {
    state.identity_service.clear(user.session_id).await;
    StatusCode::NO_CONTENT
}

async fn me(user: CurrentUser) -> Json<IdentityDto> {
    Json(IdentityDto::from(&user.identity))
}

async fn list_rooms(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<Vec<RoomDto>>, ApiError> {
    let rooms = state.room_service.list_active_rooms().await?;
    Ok(Json(rooms.iter().map(RoomDto::from).collect()))
}

#[derive(Debug, Deserialize)]
struct CreateRoomPayload {
    name: String,
}

async fn create_room(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateRoomPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let room = state
        .room_service
        .create_room(CreateRoomRequest {
            name: payload.name,
            created_by: user.identity.user_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(RoomDto::from(&room))))
}

async fn room_detail(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(code): Path<String>,
) -> Result<Json<RoomDto>, ApiError> {
    let code = RoomCode::parse(code)?;
    let room = state.room_service.find_room(&code).await?;
    Ok(Json(with_online_count(&state, &room).await))
}

async fn room_history(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(code): Path<String>,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let code = RoomCode::parse(code)?;
    let messages = state.room_service.history(&code).await?;
    Ok(Json(messages.iter().map(MessageDto::from).collect()))
}

async fn admin_list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<UserDto>>, ApiError> {
    let users = state.user_service.list_all_users().await?;
    Ok(Json(users.iter().map(UserDto::from).collect()))
}

async fn admin_list_rooms(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<RoomDto>>, ApiError> {
    let rooms = state.room_service.list_all_rooms().await?;
    let mut views = Vec::with_capacity(rooms.len());
    for room in &rooms {
        views.push(with_online_count(&state, room).await);
    }
    Ok(Json(views))
}

async fn admin_deactivate_room(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(code): Path<String>,
) -> Result<Json<RoomDto>, ApiError> {
    let code = RoomCode::parse(code)?;
    let room = state.room_service.deactivate_room(&code).await?;
    state.broadcast_core.release_room(room.id).await;
    tracing::info!(
        room_code = %room.code,
        admin_id = %admin.identity.user_id,
        "room deactivated by admin"
    );
    Ok(Json(RoomDto::from(&room)))
}

async fn with_online_count(state: &AppState, room: &ChatRoom) -> RoomDto {
    let mut view = RoomDto::from(room);
    view.online = Some(
        state
            .broadcast_core
            .registry()
            .member_count(&room.code)
            .await,
    );
    view
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// 令牌缺失或无效时仍然升级，连接上的事件会被静默丢弃
async fn websocket_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let session_id = state.jwt_service.session_id(query.token.as_deref());
    if session_id.is_none() {
        tracing::debug!("websocket upgrade without a valid session token");
    }

    ws.on_upgrade(move |socket| async move {
        WebSocketConnection::new(socket, state, session_id)
            .run()
            .await;
    })
}
