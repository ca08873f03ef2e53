use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::error::{self, MAX_NAME, MAX_NOTE};
use crate::auth::{tokens, AdminAuth};
use crate::billing::engine;
use crate::db::models::{BindRequest, NodeUserMapping, PriceRow, User, WhitelistEntry};
use crate::queue::QueueItem;
use crate::AppState;

/// `/auth/login`, which must work without a session.
pub fn public_auth_routes(state: Arc<AppState>) -> Router {
    Router::new().route("/login", post(login)).with_state(state)
}

/// `/auth/logout`, `/auth/me` — require [`crate::auth::admin_auth_middleware`].
pub fn protected_auth_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(state)
}

/// A node (or an admin acting on its behalf) asking to bind a local
/// identity to a billing username. Sits outside `/admin` — any
/// authenticated caller may file one, not just admins (§6).
pub fn bind_request_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/bind", post(file_bind_request))
        .with_state(state)
}

/// Everything under `/admin`, gated by [`crate::auth::admin_auth_middleware`].
pub fn protected_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/prices", get(list_prices).put(upsert_price))
        .route("/prices/{prefix}", delete(delete_price))
        .route("/users", get(list_users))
        .route("/users/{username}", get(get_user))
        .route("/users/{username}/recharge", post(recharge_user))
        .route("/mappings", get(list_mappings).put(upsert_mapping))
        .route("/mappings/{node_id}/{local_username}", delete(delete_mapping))
        .route("/whitelist", get(list_whitelist).put(upsert_whitelist))
        .route("/whitelist/{node_id}/{local_username}", delete(delete_whitelist))
        .route("/requests", get(list_bind_requests))
        .route("/requests/{id}/approve", post(approve_bind_request))
        .route("/requests/{id}/reject", post(reject_bind_request))
        .route("/nodes", get(list_nodes))
        .route("/usage", get(query_usage))
        .route("/usage/export", get(export_usage_csv))
        .route("/queue", get(list_queue).post(enqueue_request))
        .route("/queue/{id}", delete(dequeue_request))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Login / logout
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    csrf_token: String,
}

/// `POST /admin/login` — exchange admin_users credentials for a session
/// cookie plus a CSRF token the client must echo back on non-GET
/// admin requests (§6 "auth model").
async fn login(State(state): State<Arc<AppState>>, Json(req): Json<LoginRequest>) -> Response {
    let row: Option<(String, String)> =
        match sqlx::query_as("SELECT id, password_hash FROM admin_users WHERE username = ?")
            .bind(&req.username)
            .fetch_optional(&state.db.pool)
            .await
        {
            Ok(r) => r,
            Err(e) => return error::internal_error("admin_login", e),
        };

    let Some((admin_id, password_hash)) = row else {
        return error::bad_request("Invalid username or password");
    };

    if !tokens::verify_password(&password_hash, &req.password) {
        return error::bad_request("Invalid username or password");
    }

    let (token, csrf_token) =
        match crate::auth::sessions::create_session(&state.db, &admin_id, state.config.session_hours).await {
            Ok(t) => t,
            Err(e) => return error::internal_error("create_session", e),
        };

    let cookie = crate::auth::sessions::build_cookie(&token, state.config.session_hours, state.config.cookie_secure);
    let mut response = Json(LoginResponse { csrf_token }).into_response();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

/// `POST /admin/logout` — clear the session row and the cookie.
async fn logout(State(state): State<Arc<AppState>>, req: axum::extract::Request) -> Response {
    let cookie_header = req
        .headers()
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = cookie_header.split(';').find_map(|c| {
        let c = c.trim();
        c.strip_prefix(&format!("{}=", crate::auth::sessions::cookie_name()))
    });

    if let Some(token) = token {
        let _ = crate::auth::sessions::delete_session(&state.db, token).await;
    }

    let cookie = crate::auth::sessions::clear_cookie(state.config.cookie_secure);
    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

/// `GET /auth/me` — identify the caller behind the current session/bearer
/// token, so an admin UI can render who's logged in without guessing.
async fn me(Extension(admin): Extension<AdminAuth>) -> Response {
    Json(serde_json::json!({ "admin_user_id": admin.admin_user_id })).into_response()
}

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

async fn list_prices(State(state): State<Arc<AppState>>) -> Response {
    match sqlx::query_as::<_, PriceRow>("SELECT gpu_model_prefix, price_per_minute, updated_at FROM prices ORDER BY gpu_model_prefix")
        .fetch_all(&state.db.pool)
        .await
    {
        Ok(rows) => Json(serde_json::json!({ "prices": rows })).into_response(),
        Err(e) => error::internal_error("list_prices", e),
    }
}

#[derive(Debug, Deserialize)]
struct UpsertPriceRequest {
    gpu_model_prefix: String,
    price_per_minute: f64,
}

/// `PUT /admin/prices` — set or update a GPU-model-prefix price, or the
/// reserved `CPU_CORE` key (§3). Longest-prefix match happens at read
/// time in [`crate::billing::pricing::PriceIndex`]; this just mutates
/// the table it's built from.
async fn upsert_price(State(state): State<Arc<AppState>>, Json(req): Json<UpsertPriceRequest>) -> Response {
    if let Some(resp) = error::validate_len("gpu_model_prefix", &req.gpu_model_prefix, MAX_NAME) {
        return resp;
    }
    if req.price_per_minute < 0.0 {
        return error::bad_request("price_per_minute must be >= 0");
    }

    let result = sqlx::query(
        "INSERT INTO prices (gpu_model_prefix, price_per_minute, updated_at) VALUES (?, ?, datetime('now')) \
         ON CONFLICT (gpu_model_prefix) DO UPDATE SET price_per_minute = excluded.price_per_minute, updated_at = datetime('now')",
    )
    .bind(&req.gpu_model_prefix)
    .bind(req.price_per_minute)
    .execute(&state.db.pool)
    .await;

    match result {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error::internal_error("upsert_price", e),
    }
}

async fn delete_price(State(state): State<Arc<AppState>>, Path(prefix): Path<String>) -> Response {
    match sqlx::query("DELETE FROM prices WHERE gpu_model_prefix = ?")
        .bind(&prefix)
        .execute(&state.db.pool)
        .await
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error::internal_error("delete_price", e),
    }
}

// ---------------------------------------------------------------------------
// Billing accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

async fn list_users(State(state): State<Arc<AppState>>, Query(page): Query<Pagination>) -> Response {
    let limit = page.limit.unwrap_or(100).clamp(1, 1000);
    let offset = page.offset.unwrap_or(0).max(0);

    match sqlx::query_as::<_, User>(
        "SELECT username, balance, status, blocked_at, created_at FROM users ORDER BY username LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db.pool)
    .await
    {
        Ok(rows) => Json(serde_json::json!({ "users": rows })).into_response(),
        Err(e) => error::internal_error("list_users", e),
    }
}

async fn get_user(State(state): State<Arc<AppState>>, Path(username): Path<String>) -> Response {
    match sqlx::query_as::<_, User>(
        "SELECT username, balance, status, blocked_at, created_at FROM users WHERE username = ?",
    )
    .bind(&username)
    .fetch_optional(&state.db.pool)
    .await
    {
        Ok(Some(user)) => Json(user).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "No such user" }))).into_response(),
        Err(e) => error::internal_error("get_user", e),
    }
}

#[derive(Debug, Deserialize)]
struct RechargeRequest {
    amount: f64,
    #[serde(default)]
    note: Option<String>,
}

/// `POST /admin/users/{username}/recharge` — credit a billing account
/// through the same row-locked write path a debit uses (§7 recovery:
/// balance math never happens outside that path).
async fn recharge_user(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AdminAuth>,
    Path(username): Path<String>,
    Json(req): Json<RechargeRequest>,
) -> Response {
    if req.amount <= 0.0 {
        return error::bad_request("amount must be > 0");
    }
    if let Some(note) = &req.note {
        if let Some(resp) = error::validate_len("note", note, MAX_NOTE) {
            return resp;
        }
    }

    match engine::apply_recharge(&state.db, &state.config, &username, req.amount, req.note.as_deref()).await {
        Ok(user) => {
            info!(admin = %admin.admin_user_id, username = %username, amount = req.amount, "recharged billing account");
            Json(serde_json::json!({
                "username": user.username,
                "balance": user.balance,
                "status": user.status.as_str(),
            }))
            .into_response()
        }
        Err(e) => error::internal_error("recharge_user", e),
    }
}

// ---------------------------------------------------------------------------
// Node-user mappings / whitelist
// ---------------------------------------------------------------------------

async fn list_mappings(State(state): State<Arc<AppState>>) -> Response {
    match sqlx::query_as::<_, NodeUserMapping>(
        "SELECT node_id, local_username, billing_username FROM node_user_mappings ORDER BY node_id, local_username",
    )
    .fetch_all(&state.db.pool)
    .await
    {
        Ok(rows) => Json(serde_json::json!({ "mappings": rows })).into_response(),
        Err(e) => error::internal_error("list_mappings", e),
    }
}

#[derive(Debug, Deserialize)]
struct UpsertMappingRequest {
    node_id: String,
    local_username: String,
    billing_username: String,
}

async fn upsert_mapping(State(state): State<Arc<AppState>>, Json(req): Json<UpsertMappingRequest>) -> Response {
    let result = sqlx::query(
        "INSERT INTO node_user_mappings (node_id, local_username, billing_username) VALUES (?, ?, ?) \
         ON CONFLICT (node_id, local_username) DO UPDATE SET billing_username = excluded.billing_username",
    )
    .bind(&req.node_id)
    .bind(&req.local_username)
    .bind(&req.billing_username)
    .execute(&state.db.pool)
    .await;

    match result {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error::internal_error("upsert_mapping", e),
    }
}

async fn delete_mapping(
    State(state): State<Arc<AppState>>,
    Path((node_id, local_username)): Path<(String, String)>,
) -> Response {
    match sqlx::query("DELETE FROM node_user_mappings WHERE node_id = ? AND local_username = ?")
        .bind(&node_id)
        .bind(&local_username)
        .execute(&state.db.pool)
        .await
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error::internal_error("delete_mapping", e),
    }
}

async fn list_whitelist(State(state): State<Arc<AppState>>) -> Response {
    match sqlx::query_as::<_, WhitelistEntry>("SELECT node_id, local_username FROM whitelist ORDER BY node_id, local_username")
        .fetch_all(&state.db.pool)
        .await
    {
        Ok(rows) => Json(serde_json::json!({ "whitelist": rows })).into_response(),
        Err(e) => error::internal_error("list_whitelist", e),
    }
}

#[derive(Debug, Deserialize)]
struct WhitelistRequest {
    node_id: String,
    local_username: String,
}

async fn upsert_whitelist(State(state): State<Arc<AppState>>, Json(req): Json<WhitelistRequest>) -> Response {
    match sqlx::query("INSERT OR IGNORE INTO whitelist (node_id, local_username) VALUES (?, ?)")
        .bind(&req.node_id)
        .bind(&req.local_username)
        .execute(&state.db.pool)
        .await
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error::internal_error("upsert_whitelist", e),
    }
}

async fn delete_whitelist(
    State(state): State<Arc<AppState>>,
    Path((node_id, local_username)): Path<(String, String)>,
) -> Response {
    match sqlx::query("DELETE FROM whitelist WHERE node_id = ? AND local_username = ?")
        .bind(&node_id)
        .bind(&local_username)
        .execute(&state.db.pool)
        .await
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error::internal_error("delete_whitelist", e),
    }
}

// ---------------------------------------------------------------------------
// Bind requests
// ---------------------------------------------------------------------------

async fn list_bind_requests(State(state): State<Arc<AppState>>) -> Response {
    match sqlx::query_as::<_, BindRequest>(
        "SELECT id, node_id, local_username, requested_billing_username, status, created_at, decided_at \
         FROM bind_requests ORDER BY created_at DESC",
    )
    .fetch_all(&state.db.pool)
    .await
    {
        Ok(rows) => Json(serde_json::json!({ "bind_requests": rows })).into_response(),
        Err(e) => error::internal_error("list_bind_requests", e),
    }
}

/// `POST /admin/bind-requests/{id}/approve` — materialize a pending
/// request into a `node_user_mappings` row and mark it decided.
async fn approve_bind_request(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let row: Option<(String, String, String)> = match sqlx::query_as(
        "SELECT node_id, local_username, requested_billing_username FROM bind_requests WHERE id = ? AND status = 'pending'",
    )
    .bind(&id)
    .fetch_optional(&state.db.pool)
    .await
    {
        Ok(r) => r,
        Err(e) => return error::internal_error("approve_bind_request", e),
    };

    let Some((node_id, local_username, billing_username)) = row else {
        return (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "No such pending request" }))).into_response();
    };

    let mut tx = match state.db.pool.begin().await {
        Ok(tx) => tx,
        Err(e) => return error::internal_error("approve_bind_request", e),
    };

    if let Err(e) = sqlx::query(
        "INSERT INTO node_user_mappings (node_id, local_username, billing_username) VALUES (?, ?, ?) \
         ON CONFLICT (node_id, local_username) DO UPDATE SET billing_username = excluded.billing_username",
    )
    .bind(&node_id)
    .bind(&local_username)
    .bind(&billing_username)
    .execute(&mut *tx)
    .await
    {
        return error::internal_error("approve_bind_request", e);
    }

    if let Err(e) = sqlx::query("UPDATE bind_requests SET status = 'approved', decided_at = datetime('now') WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await
    {
        return error::internal_error("approve_bind_request", e);
    }

    if let Err(e) = tx.commit().await {
        return error::internal_error("approve_bind_request", e);
    }

    StatusCode::NO_CONTENT.into_response()
}

async fn reject_bind_request(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match sqlx::query("UPDATE bind_requests SET status = 'rejected', decided_at = datetime('now') WHERE id = ? AND status = 'pending'")
        .bind(&id)
        .execute(&state.db.pool)
        .await
    {
        Ok(result) if result.rows_affected() == 0 => {
            (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "No such pending request" }))).into_response()
        }
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error::internal_error("reject_bind_request", e),
    }
}

#[derive(Debug, Deserialize)]
struct FileBindRequest {
    node_id: String,
    local_username: String,
    requested_billing_username: String,
}

/// `POST /requests/bind` — a node files a request to bind a local
/// identity to a billing username. Open to the agent token as well as
/// admin auth (§6: "any authenticated caller may file a request on
/// behalf of a node it controls"), so this checks both schemes inline
/// rather than sitting behind either single-scheme middleware.
async fn file_bind_request(
    State(state): State<Arc<AppState>>,
    req: axum::extract::Request,
) -> Response {
    if !caller_is_authenticated(&state, &req).await {
        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({ "error": "Authentication required" }))).into_response();
    }

    let Json(payload): Json<FileBindRequest> = match axum::Json::from_bytes(
        &match axum::body::to_bytes(req.into_body(), 1024 * 1024).await {
            Ok(b) => b,
            Err(e) => return error::internal_error("file_bind_request", e),
        },
    ) {
        Ok(j) => j,
        Err(_) => return error::bad_request("invalid JSON body"),
    };

    if let Some(resp) = error::validate_len("node_id", &payload.node_id, MAX_NAME) {
        return resp;
    }
    if let Some(resp) = error::validate_len("local_username", &payload.local_username, MAX_NAME) {
        return resp;
    }
    if let Some(resp) = error::validate_len("requested_billing_username", &payload.requested_billing_username, MAX_NAME) {
        return resp;
    }

    let id = Uuid::new_v4().to_string();
    let result = sqlx::query(
        "INSERT INTO bind_requests (id, node_id, local_username, requested_billing_username) VALUES (?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&payload.node_id)
    .bind(&payload.local_username)
    .bind(&payload.requested_billing_username)
    .execute(&state.db.pool)
    .await;

    match result {
        Ok(_) => (StatusCode::CREATED, Json(serde_json::json!({ "id": id }))).into_response(),
        Err(e) if is_pending_conflict(&e) => {
            error::bad_request("A pending bind request already exists for this node/user")
        }
        Err(e) => error::internal_error("file_bind_request", e),
    }
}

fn is_pending_conflict(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Accept either the agent's shared-secret header or a valid admin
/// bearer token / session cookie, without requiring both middlewares.
async fn caller_is_authenticated(state: &AppState, req: &axum::extract::Request) -> bool {
    let agent_token = req
        .headers()
        .get("x-agent-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if state.config.validate_agent_token(agent_token) {
        return true;
    }

    if let Some(bearer) = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        if state.config.validate_admin_token(bearer) {
            return true;
        }
    }

    let cookie_header = req
        .headers()
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let session_token = cookie_header.split(';').find_map(|c| {
        let c = c.trim();
        c.strip_prefix(&format!("{}=", crate::auth::sessions::cookie_name()))
    });
    match session_token {
        Some(token) => crate::auth::sessions::validate_session(&state.db, token).await.is_ok(),
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

async fn list_nodes(State(state): State<Arc<AppState>>) -> Response {
    match sqlx::query_as::<_, crate::db::models::NodeStatus>("SELECT * FROM nodes ORDER BY node_id")
        .fetch_all(&state.db.pool)
        .await
    {
        Ok(rows) => Json(serde_json::json!({ "nodes": rows })).into_response(),
        Err(e) => error::internal_error("list_nodes", e),
    }
}

// ---------------------------------------------------------------------------
// Usage queries / CSV export
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UsageQuery {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    node_id: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

async fn query_usage(State(state): State<Arc<AppState>>, Query(q): Query<UsageQuery>) -> Response {
    let limit = q.limit.unwrap_or(200).clamp(1, 5000);

    let result = sqlx::query_as::<_, crate::db::models::UsageRecord>(
        "SELECT id, node_id, report_id, username, ts, pid, cpu_percent, memory_mb, gpu_count, command, gpu_usage, cost \
         FROM usage_records \
         WHERE (?1 IS NULL OR username = ?1) AND (?2 IS NULL OR node_id = ?2) \
         ORDER BY ts DESC LIMIT ?3",
    )
    .bind(&q.username)
    .bind(&q.node_id)
    .bind(limit)
    .fetch_all(&state.db.pool)
    .await;

    match result {
        Ok(rows) => Json(serde_json::json!({ "usage_records": rows })).into_response(),
        Err(e) => error::internal_error("query_usage", e),
    }
}

async fn export_usage_csv(State(state): State<Arc<AppState>>, Query(q): Query<UsageQuery>) -> Response {
    let limit = q.limit.unwrap_or(5000).clamp(1, 50000);

    let rows = match sqlx::query_as::<_, crate::db::models::UsageRecord>(
        "SELECT id, node_id, report_id, username, ts, pid, cpu_percent, memory_mb, gpu_count, command, gpu_usage, cost \
         FROM usage_records \
         WHERE (?1 IS NULL OR username = ?1) AND (?2 IS NULL OR node_id = ?2) \
         ORDER BY ts DESC LIMIT ?3",
    )
    .bind(&q.username)
    .bind(&q.node_id)
    .bind(limit)
    .fetch_all(&state.db.pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => return error::internal_error("export_usage_csv", e),
    };

    let mut csv = String::from("node_id,username,ts,pid,cpu_percent,memory_mb,gpu_count,cost,command\n");
    for r in rows {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{:.4},{}\n",
            r.node_id,
            r.username,
            r.ts,
            r.pid,
            r.cpu_percent,
            r.memory_mb,
            r.gpu_count,
            r.cost,
            r.command.unwrap_or_default().replace(',', " "),
        ));
    }

    let mut response = csv.into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv"));
    response.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"usage.csv\""),
    );
    response
}

// ---------------------------------------------------------------------------
// GPU request queue (process-local FIFO, display-only — §1 Non-goals)
// ---------------------------------------------------------------------------

async fn list_queue(State(state): State<Arc<AppState>>) -> Response {
    Json(serde_json::json!({ "queue": state.gpu_queue.list() })).into_response()
}

#[derive(Debug, Deserialize)]
struct EnqueueRequest {
    username: String,
    #[serde(default)]
    note: String,
}

async fn enqueue_request(State(state): State<Arc<AppState>>, Json(req): Json<EnqueueRequest>) -> Response {
    if let Some(resp) = error::validate_len("username", &req.username, MAX_NAME) {
        return resp;
    }
    let item = QueueItem {
        id: Uuid::new_v4().to_string(),
        username: req.username,
        note: req.note,
        submitted_at: crate::db::models::now_rfc3339(),
    };
    state.gpu_queue.push(item.clone());
    Json(item).into_response()
}

async fn dequeue_request(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    if state.gpu_queue.remove(&id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "No such queue entry" }))).into_response()
    }
}
