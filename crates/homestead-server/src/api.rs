use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, Query, State},
    http::{Method, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use homestead_shared::{Role, Sender, ThreadId, ThreadStatus};
use homestead_store::{
    Database, InquiryRequest, Participant, StoreHandle, Thread, ThreadDetail, ThreadFilter,
    ThreadScope,
};

use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub store: StoreHandle,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = if state.config.cors_allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/inquiries", get(list_inquiries).post(create_inquiry))
        .route("/inquiries/unread", get(unread_total))
        .route("/inquiries/:id", get(get_inquiry))
        .route("/inquiries/:id/messages", post(post_message))
        .route("/inquiries/:id/archive", post(archive_inquiry))
        .route("/inquiries/:id/read", post(mark_read))
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run `op` against a fresh connection on the blocking pool.
async fn with_db<T, F>(state: &AppState, op: F) -> Result<T, ServerError>
where
    F: FnOnce(&Database) -> homestead_store::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || {
        let db = store.open()?;
        op(&db)
    })
    .await
    .map_err(|e| ServerError::Internal(format!("storage task failed: {e}")))?
    .map_err(ServerError::from)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServerError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ServerError::BadRequest(rejection.body_text()))
}

/// Unparseable ids cannot name a stored thread.
fn thread_id(raw: &str) -> Result<ThreadId, ServerError> {
    ThreadId::parse(raw).map_err(|_| ServerError::NotFound)
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ─── Requests / responses ───

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

const OK: OkResponse = OkResponse { ok: true };

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    owner_id: Option<String>,
    buyer_email: Option<String>,
    all: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnreadQuery {
    owner_id: Option<String>,
    buyer_email: Option<String>,
}

#[derive(Serialize)]
struct UnreadResponse {
    total: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CreateInquiryBody {
    property_id: Option<String>,
    owner_id: Option<String>,
    buyer_id: Option<String>,
    buyer_name: Option<String>,
    buyer_email: Option<String>,
    message: Option<String>,
    attachments: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateInquiryResponse {
    inquiry_id: ThreadId,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PostMessageBody {
    text: String,
    attachments: Vec<String>,
    sender: String,
}

impl Default for PostMessageBody {
    fn default() -> Self {
        Self {
            text: String::new(),
            attachments: Vec::new(),
            sender: Sender::Owner.as_str().to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MarkReadBody {
    role: Option<String>,
}

// ─── Handlers ───

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /inquiries?ownerId=…` | `?buyerEmail=…` | `?all=1`, optionally
/// narrowed with `&status=open|archived`.
async fn list_inquiries(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Thread>>, ServerError> {
    let scope = if query.all.as_deref().is_some_and(is_truthy) {
        ThreadScope::All
    } else if let Some(email) = non_empty(query.buyer_email) {
        ThreadScope::Buyer(email)
    } else if let Some(owner_id) = non_empty(query.owner_id) {
        ThreadScope::Owner(owner_id)
    } else {
        return Err(ServerError::BadRequest(
            "ownerId or buyerEmail is required".to_string(),
        ));
    };

    let status = non_empty(query.status)
        .map(|s| s.parse::<ThreadStatus>())
        .transpose()?;
    let filter = ThreadFilter::new(scope).with_status(status);

    let threads = with_db(&state, move |db| db.list_threads(&filter)).await?;
    Ok(Json(threads))
}

/// `GET /inquiries/unread?ownerId=…` | `?buyerEmail=…`
async fn unread_total(
    State(state): State<AppState>,
    Query(query): Query<UnreadQuery>,
) -> Result<Json<UnreadResponse>, ServerError> {
    let participant = if let Some(email) = non_empty(query.buyer_email) {
        Participant::Buyer(email)
    } else if let Some(owner_id) = non_empty(query.owner_id) {
        Participant::Owner(owner_id)
    } else {
        return Err(ServerError::BadRequest(
            "ownerId or buyerEmail is required".to_string(),
        ));
    };

    let total = with_db(&state, move |db| db.unread_total(&participant)).await?;
    Ok(Json(UnreadResponse { total }))
}

async fn get_inquiry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ThreadDetail>, ServerError> {
    let id = thread_id(&id)?;
    let detail = with_db(&state, move |db| db.thread_detail(id)).await?;
    Ok(Json(detail))
}

async fn create_inquiry(
    State(state): State<AppState>,
    payload: Result<Json<CreateInquiryBody>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateInquiryResponse>), ServerError> {
    let body = json_body(payload)?;
    let request = InquiryRequest {
        property_id: body.property_id.unwrap_or_default(),
        owner_id: body.owner_id.unwrap_or_default(),
        buyer_id: body.buyer_id,
        buyer_name: body.buyer_name.unwrap_or_default(),
        buyer_email: body.buyer_email.unwrap_or_default(),
        message: body.message,
        attachments: body.attachments,
    };

    let submission = with_db(&state, move |db| db.submit_inquiry(&request)).await?;

    info!(thread_id = %submission.thread.id, "Inquiry accepted via API");
    Ok((
        StatusCode::CREATED,
        Json(CreateInquiryResponse {
            inquiry_id: submission.thread.id,
        }),
    ))
}

async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<PostMessageBody>, JsonRejection>,
) -> Result<Json<OkResponse>, ServerError> {
    let id = thread_id(&id)?;
    let body = json_body(payload)?;
    let sender: Sender = body.sender.parse()?;

    with_db(&state, move |db| {
        db.post_message(id, sender, &body.text, &body.attachments)
    })
    .await?;
    Ok(Json(OK))
}

async fn archive_inquiry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ServerError> {
    let id = thread_id(&id)?;
    with_db(&state, move |db| db.archive_thread(id)).await?;
    Ok(Json(OK))
}

async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<MarkReadBody>, JsonRejection>,
) -> Result<Json<OkResponse>, ServerError> {
    let id = thread_id(&id)?;
    let role: Role = match non_empty(json_body(payload)?.role) {
        Some(role) => role.parse()?,
        None => return Err(ServerError::BadRequest("role is required".to_string())),
    };

    with_db(&state, move |db| db.mark_read(id, role)).await?;
    Ok(Json(OK))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_app() -> (Router, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreHandle::init(dir.path().join("api.db")).unwrap();
        let state = AppState {
            store,
            config: Arc::new(ServerConfig::default()),
        };
        (build_router(state), dir)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create(app: &Router, message: &str) -> String {
        let (status, body) = call(
            app,
            "POST",
            "/inquiries",
            Some(json!({
                "propertyId": "P1",
                "ownerId": "O1",
                "buyerName": "Bea",
                "buyerEmail": "b@x.com",
                "message": message,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["inquiryId"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = test_app();
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_inquiry_conversation_flow() {
        let (app, _dir) = test_app();
        let id = create(&app, "Is this available?").await;

        let (_, list) = call(&app, "GET", "/inquiries?ownerId=O1", None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["ownerUnreadCount"], 1);
        assert_eq!(list[0]["buyerUnreadCount"], 0);

        let (status, body) = call(
            &app,
            "POST",
            &format!("/inquiries/{id}/messages"),
            Some(json!({ "text": "Yes" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);

        let (_, detail) = call(&app, "GET", &format!("/inquiries/{id}"), None).await;
        assert_eq!(detail["inquiry"]["buyerUnreadCount"], 1);
        assert_eq!(detail["messages"].as_array().unwrap().len(), 2);
        assert_eq!(detail["messages"][1]["sender"], "owner");
        assert_eq!(detail["seen"]["owner"], false);

        let (status, _) = call(
            &app,
            "POST",
            &format!("/inquiries/{id}/read"),
            Some(json!({ "role": "buyer" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, detail) = call(&app, "GET", &format!("/inquiries/{id}"), None).await;
        assert_eq!(detail["inquiry"]["buyerUnreadCount"], 0);
        assert_eq!(detail["seen"]["owner"], true);
    }

    #[tokio::test]
    async fn test_repeat_inquiry_reuses_thread() {
        let (app, _dir) = test_app();
        let first = create(&app, "hello").await;
        let second = create(&app, "again").await;
        assert_eq!(first, second);

        let (_, list) = call(&app, "GET", "/inquiries?buyerEmail=B@X.COM", None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["ownerUnreadCount"], 2);

        let (_, unread) = call(&app, "GET", "/inquiries/unread?ownerId=O1", None).await;
        assert_eq!(unread["total"], 2);

        let (_, list) = call(&app, "GET", "/inquiries?ownerId=%20O1", None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        let (_, unread) = call(&app, "GET", "/inquiries/unread?ownerId=O1%20", None).await;
        assert_eq!(unread["total"], 2);
    }

    #[tokio::test]
    async fn test_admin_sender_is_accepted() {
        let (app, _dir) = test_app();
        let id = create(&app, "hello").await;

        let (status, _) = call(
            &app,
            "POST",
            &format!("/inquiries/{id}/messages"),
            Some(json!({ "text": "Support here", "sender": "admin" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, detail) = call(&app, "GET", &format!("/inquiries/{id}"), None).await;
        assert_eq!(detail["inquiry"]["buyerUnreadCount"], 1);
        assert_eq!(detail["inquiry"]["ownerUnreadCount"], 1);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let (app, _dir) = test_app();
        let id = create(&app, "hello").await;

        let (status, body) = call(
            &app,
            "POST",
            "/inquiries",
            Some(json!({ "propertyId": "P1", "ownerId": "O1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("buyerEmail"));

        let (status, _) = call(
            &app,
            "POST",
            &format!("/inquiries/{id}/messages"),
            Some(json!({ "text": "", "attachments": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "POST",
            &format!("/inquiries/{id}/messages"),
            Some(json!({ "text": "hi", "sender": "agent" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            "POST",
            &format!("/inquiries/{id}/read"),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "role is required");

        let (status, _) = call(&app, "GET", "/inquiries", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, detail) = call(&app, "GET", &format!("/inquiries/{id}"), None).await;
        assert_eq!(detail["messages"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_thread_is_not_found() {
        let (app, _dir) = test_app();
        let missing = ThreadId::new();

        let (status, _) = call(&app, "GET", &format!("/inquiries/{missing}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, "GET", "/inquiries/not-an-id", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &app,
            "POST",
            &format!("/inquiries/{missing}/read"),
            Some(json!({ "role": "owner" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, "POST", &format!("/inquiries/{missing}/archive"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_archive_and_status_filter() {
        let (app, _dir) = test_app();
        let id = create(&app, "hello").await;

        let (status, _) = call(&app, "POST", &format!("/inquiries/{id}/archive"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, open) = call(&app, "GET", "/inquiries?ownerId=O1&status=open", None).await;
        assert!(open.as_array().unwrap().is_empty());

        let (_, all) = call(&app, "GET", "/inquiries?all=1", None).await;
        assert_eq!(all[0]["status"], "archived");

        let (status, _) = call(&app, "GET", "/inquiries?all=1&status=closed", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
