use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use huddle_shared::protocol::MessageEnvelope;
use huddle_shared::types::{ChatId, ChatKind, TaskId, TaskStatus};
use huddle_store::{DatabasePool, GroupSummary, StoreError};

use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::ledger::{TaskDraft, TaskLedger, TaskView};
use crate::lifecycle::{GroupLifecycle, StatusUpdate};
use crate::messaging::MessageService;
use crate::rooms::RoomRegistry;
use crate::socket::{ws_handler, Heartbeat};
use crate::storage::Storage;
use crate::timeline::{ChatView, TimelineBuilder};

#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub rooms: RoomRegistry,
    pub timeline: TimelineBuilder,
    pub ledger: TaskLedger,
    pub lifecycle: GroupLifecycle,
    pub messages: MessageService,
    pub heartbeat: Heartbeat,
}

impl AppState {
    /// Wire every service around one pool and one room registry.
    pub fn new(pool: DatabasePool, config: &ServerConfig) -> Self {
        let storage = Storage::new(pool);
        let rooms = RoomRegistry::new(config.subscriber_queue);
        let broadcaster = Broadcaster::new(rooms.clone());

        Self {
            timeline: TimelineBuilder::new(storage.clone()),
            ledger: TaskLedger::new(storage.clone()),
            lifecycle: GroupLifecycle::new(storage.clone(), broadcaster.clone()),
            messages: MessageService::new(storage.clone(), broadcaster),
            heartbeat: Heartbeat::from(config),
            storage,
            rooms,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/users", post(register_user))
        .route("/users/:username/public-key", get(public_key))
        .route("/chats", get(list_chats).post(create_chat))
        .route("/chats/:id", get(chat_timeline))
        .route("/chats/:id/messages/plain", post(send_plain))
        .route("/chats/:id/messages/e2ee", post(send_encrypted))
        .route("/groups", get(list_groups))
        .route("/tasks", get(list_tasks).post(add_tasks))
        .route("/tasks/status", patch(update_task_status))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct UserQuery {
    username: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterUserRequest {
    username: Option<String>,
    public_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserResponse {
    username: String,
    public_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyResponse {
    public_key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateChatRequest {
    chat_name: Option<String>,
    chat_type: Option<String>,
    usernames: Option<Vec<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateChatResponse {
    chat_id: ChatId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlainMessageRequest {
    chat_id: Option<ChatId>,
    username: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncryptedMessageRequest {
    chat_id: Option<ChatId>,
    username: Option<String>,
    iv: Option<String>,
    ct: Option<String>,
    tag: Option<String>,
}

#[derive(Deserialize)]
struct AddTasksRequest {
    tasks: Option<Vec<TaskDraft>>,
}

#[derive(Serialize)]
struct AddTasksResponse {
    tasks: Vec<TaskView>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusRequest {
    task_id: Option<TaskId>,
    status: Option<String>,
    username: Option<String>,
}

/// A present, non-blank string field.
fn required(value: Option<String>, field: &str) -> Result<String, ServerError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest(format!("Missing field: {field}")))
}

fn username_param(query: Result<Query<UserQuery>, QueryRejection>) -> Result<String, ServerError> {
    let Query(query) = query?;
    required(query.username, "username")
}

/// The chat id in the path must agree with the one in the body.
fn matching_chat(path: ChatId, body: Option<ChatId>) -> Result<ChatId, ServerError> {
    match body {
        Some(id) if id == path => Ok(id),
        Some(id) => Err(ServerError::BadRequest(format!(
            "chatId {id} does not match path chat {path}"
        ))),
        None => Err(ServerError::BadRequest("Missing field: chatId".into())),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn register_user(
    State(state): State<AppState>,
    body: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ServerError> {
    let Json(req) = body?;
    let username = required(req.username, "username")?;
    let public_key = required(req.public_key, "publicKey")?;

    let user = state
        .storage
        .run(move |db| Ok(db.create_user(&username, &public_key)?))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            username: user.username,
            public_key: user.public_key,
        }),
    ))
}

async fn public_key(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<PublicKeyResponse>, ServerError> {
    let public_key = state
        .storage
        .run(move |db| {
            db.public_key(&username).map_err(|e| match e {
                StoreError::NotFound => ServerError::NotFound(format!("User not found: {username}")),
                other => other.into(),
            })
        })
        .await?;
    Ok(Json(PublicKeyResponse { public_key }))
}

async fn list_chats(
    State(state): State<AppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<Vec<ChatView>>, ServerError> {
    let username = username_param(query)?;
    Ok(Json(state.timeline.list_chats(&username).await?))
}

async fn chat_timeline(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<ChatView>, ServerError> {
    let username = username_param(query)?;
    Ok(Json(state.timeline.build_timeline(ChatId(id), &username).await?))
}

async fn create_chat(
    State(state): State<AppState>,
    body: Result<Json<CreateChatRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateChatResponse>), ServerError> {
    let Json(req) = body?;
    let name = required(req.chat_name, "chatName")?;
    let kind: ChatKind = required(req.chat_type, "chatType")?
        .parse()
        .map_err(|e: huddle_shared::ParseError| ServerError::BadRequest(e.to_string()))?;
    let usernames = req
        .usernames
        .filter(|names| !names.is_empty())
        .ok_or_else(|| ServerError::BadRequest("Missing field: usernames".into()))?;

    let chat = state
        .storage
        .run(move |db| Ok(db.create_chat(Some(name.as_str()), kind, &usernames)?))
        .await?;

    Ok((StatusCode::CREATED, Json(CreateChatResponse { chat_id: chat.id })))
}

async fn send_plain(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<PlainMessageRequest>, JsonRejection>,
) -> Result<Json<MessageEnvelope>, ServerError> {
    let Json(req) = body?;
    let chat_id = matching_chat(ChatId(id), req.chat_id)?;
    let username = required(req.username, "username")?;
    let message = required(req.message, "message")?;

    Ok(Json(state.messages.send_plain(chat_id, &username, &message).await?))
}

async fn send_encrypted(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<EncryptedMessageRequest>, JsonRejection>,
) -> Result<Json<MessageEnvelope>, ServerError> {
    let Json(req) = body?;
    let chat_id = matching_chat(ChatId(id), req.chat_id)?;
    let username = required(req.username, "username")?;
    let iv = required(req.iv, "iv")?;
    let ct = required(req.ct, "ct")?;
    let tag = required(req.tag, "tag")?;

    Ok(Json(
        state
            .messages
            .send_encrypted(chat_id, &username, &iv, &ct, &tag)
            .await?,
    ))
}

async fn list_groups(
    State(state): State<AppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<Vec<GroupSummary>>, ServerError> {
    let username = username_param(query)?;
    let groups = state
        .storage
        .run(move |db| {
            db.require_user(&username)?;
            Ok(db.list_groups_for_user(&username)?)
        })
        .await?;
    Ok(Json(groups))
}

async fn add_tasks(
    State(state): State<AppState>,
    body: Result<Json<AddTasksRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AddTasksResponse>), ServerError> {
    let Json(req) = body?;
    let tasks = state.ledger.add_tasks(req.tasks.unwrap_or_default()).await?;
    Ok((StatusCode::CREATED, Json(AddTasksResponse { tasks })))
}

async fn list_tasks(
    State(state): State<AppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<Vec<TaskView>>, ServerError> {
    let username = username_param(query)?;
    Ok(Json(state.ledger.list_tasks_for_user(&username).await?))
}

async fn update_task_status(
    State(state): State<AppState>,
    body: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<StatusUpdate>, ServerError> {
    let Json(req) = body?;
    let task_id = req
        .task_id
        .ok_or_else(|| ServerError::BadRequest("Missing field: taskId".into()))?;
    let status: TaskStatus = required(req.status, "status")?
        .parse()
        .map_err(|e: huddle_shared::ParseError| ServerError::BadRequest(e.to_string()))?;
    let username = required(req.username, "username")?;

    Ok(Json(
        state
            .lifecycle
            .update_task_status(task_id, status, &username)
            .await?,
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

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::testing::harness;

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn app_with_group(users: &[&str]) -> (Router, crate::testing::Harness, i64) {
        let h = harness(users).await;
        let group = h.group("Team", users).await;
        (build_router(h.state.clone()), h, group.0)
    }

    fn task(group: i64, name: &str, deadline: &str) -> Value {
        json!({ "groupId": group, "participantName": "alice", "taskName": name, "deadline": deadline })
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(&[]).await;
        let (status, body) = call(&build_router(h.state.clone()), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_and_fetch_public_key() {
        let h = harness(&[]).await;
        let app = build_router(h.state.clone());

        let (status, _) = call(&app, "POST", "/users", Some(json!({ "username": "dave", "publicKey": "pk" }))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(&app, "POST", "/users", Some(json!({ "username": "dave", "publicKey": "pk2" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["duplicates"], json!(["dave"]));

        let (status, _) = call(&app, "POST", "/users", Some(json!({ "username": "erin" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&app, "GET", "/users/dave/public-key", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["publicKey"], "pk");

        let (status, _) = call(&app, "GET", "/users/nobody/public-key", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_chat_and_list() {
        let h = harness(&["alice", "bob"]).await;
        let app = build_router(h.state.clone());

        let (status, body) = call(
            &app,
            "POST",
            "/chats",
            Some(json!({ "chatName": "dm", "chatType": "private", "usernames": ["alice", "bob"] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let chat_id = body["chatId"].as_i64().unwrap();

        let (status, _) = call(
            &app,
            "POST",
            "/chats",
            Some(json!({ "chatName": "x", "chatType": "group", "usernames": ["alice", "ghost"] })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&app, "GET", "/chats?username=bob", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["chatId"], chat_id);
        assert_eq!(body[0]["name"], "alice");
        assert_eq!(body[0]["type"], "private");

        let (status, _) = call(&app, "GET", "/chats", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app, "GET", "/chats?username=ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_single_chat_timeline() {
        let (app, _h, group) = app_with_group(&["alice", "bob"]).await;
        let uri = format!("/chats/{group}/messages/plain");
        let (status, _) = call(
            &app,
            "POST",
            &uri,
            Some(json!({ "chatId": group, "username": "bob", "message": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, "GET", &format!("/chats/{group}?username=alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chatId"], group);
        assert_eq!(body["name"], "Team");
        assert_eq!(body["messages"][0]["sender"], "bob");
        assert_eq!(body["messages"][0]["content"], "hello");

        let (status, _) = call(&app, "GET", &format!("/chats/{group}"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app, "GET", "/chats/999?username=alice", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_plain_message_validation() {
        let (app, _h, group) = app_with_group(&["alice", "bob"]).await;
        let uri = format!("/chats/{group}/messages/plain");

        let (status, body) = call(
            &app,
            "POST",
            &uri,
            Some(json!({ "chatId": group, "username": "alice", "message": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "hi");

        let (status, _) = call(&app, "POST", &uri, Some(json!({ "chatId": group, "username": "alice" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "POST",
            &uri,
            Some(json!({ "chatId": group + 1, "username": "alice", "message": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "POST",
            "/chats/999/messages/plain",
            Some(json!({ "chatId": 999, "username": "alice", "message": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_duplicate_batch_rejected() {
        let (app, _h, group) = app_with_group(&["alice"]).await;

        let (status, body) = call(&app, "POST", "/tasks", Some(json!({ "tasks": [task(group, "T1", "2025-03-01")] }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["tasks"][0]["groupName"], "Team");
        assert_eq!(body["tasks"][0]["status"], "In Progress");

        let (status, body) = call(
            &app,
            "POST",
            "/tasks",
            Some(json!({ "tasks": [task(group, "T1", "2025-03-02"), task(group, "T2", "2025-03-03")] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["duplicates"], json!(["T1"]));

        let (status, body) = call(&app, "GET", "/tasks?username=alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["status"], "In Progress");
        assert_eq!(body[0]["groupName"], "Team");
    }

    #[tokio::test]
    async fn test_malformed_task_batches() {
        let (app, _h, group) = app_with_group(&["alice"]).await;

        let (status, _) = call(&app, "POST", "/tasks", Some(json!({ "tasks": [] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "POST",
            "/tasks",
            Some(json!({ "tasks": [{ "groupId": group, "taskName": "T1", "deadline": "2025-03-01" }] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "GET", "/tasks?username=ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_updates_and_cascade() {
        let (app, _h, group) = app_with_group(&["alice", "bob"]).await;

        let (_, body) = call(
            &app,
            "POST",
            "/tasks",
            Some(json!({ "tasks": [task(group, "T1", "2025-03-01"), task(group, "T2", "2025-03-02")] })),
        )
        .await;
        let ids: Vec<i64> = body["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["id"].as_i64().unwrap())
            .collect();

        let (status, _) = call(
            &app,
            "PATCH",
            "/tasks/status",
            Some(json!({ "taskId": 9999, "status": "Finished", "username": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &app,
            "PATCH",
            "/tasks/status",
            Some(json!({ "taskId": ids[0], "status": "Done", "username": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            "PATCH",
            "/tasks/status",
            Some(json!({ "taskId": ids[0], "status": "Finished", "username": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cascaded"], false);

        let (_, body) = call(
            &app,
            "PATCH",
            "/tasks/status",
            Some(json!({ "taskId": ids[1], "status": "Finished", "username": "bob" })),
        )
        .await;
        assert_eq!(body["cascaded"], true);

        let (_, tasks) = call(&app, "GET", "/tasks?username=alice", None).await;
        assert_eq!(tasks, json!([]));

        let (_, chats) = call(&app, "GET", "/chats?username=alice", None).await;
        assert_eq!(chats[0]["messages"][0]["content"], "Task is Ended!");
        assert_eq!(chats[0]["messages"][0]["sender"], "bob");
    }

    #[tokio::test]
    async fn test_groups_listing() {
        let (app, _h, group) = app_with_group(&["alice", "bob"]).await;

        let (status, body) = call(&app, "GET", "/groups?username=bob", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["id"], group);
        assert_eq!(body[0]["participants"], json!(["alice", "bob"]));

        let (status, _) = call(&app, "GET", "/groups?username=ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
