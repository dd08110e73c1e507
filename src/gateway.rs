use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::store::MemStore;
use crate::upstream::UpstreamClient;

#[derive(Clone)]
pub struct GatewayState {
    pub cfg: Arc<AppConfig>,
    pub store: MemStore,
    pub upstream: UpstreamClient,
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat/completions", post(chat_completions))
        .route("/api/admin/login", post(admin_login))
        .route("/api/admin/api-keys", get(list_api_keys).post(create_api_key))
        .route("/api/admin/token-usage", get(token_usage))
        .with_state(state)
}

pub async fn serve(state: GatewayState) -> anyhow::Result<()> {
    let addr: SocketAddr =
        format!("{}:{}", state.cfg.listen.host, state.cfg.listen.port).parse()?;
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("chat relay listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

/// Proxy a chat completion to the upstream API using the active key, and
/// record reported token usage before replying. The request body is
/// forwarded verbatim; the upstream status and body pass through unchanged.
async fn chat_completions(State(st): State<GatewayState>, Json(body): Json<Value>) -> Response {
    let Some(api_key) = st.store.get_active_api_key() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "No API key configured"})),
        )
            .into_response();
    };

    let upstream = &st.cfg.upstream;
    match st
        .upstream
        .post_json(
            &upstream.base_url,
            "/v1/chat/completions",
            &body,
            Some(&api_key.key),
            upstream.request_timeout_seconds,
        )
        .await
    {
        Ok((status, data)) => {
            if (200..300).contains(&status) {
                if let Some(usage) = data.get("usage") {
                    let model = body.get("model").and_then(|v| v.as_str()).unwrap_or("");
                    let total = usage
                        .get("total_tokens")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0);
                    let metadata = json!({
                        "prompt_tokens": usage.get("prompt_tokens").cloned().unwrap_or(Value::Null),
                        "completion_tokens": usage.get("completion_tokens").cloned().unwrap_or(Value::Null),
                    });
                    st.store.record_usage(model, total, Some(metadata));
                }
            }
            let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (code, Json(data)).into_response()
        }
        Err(e) => {
            log::warn!("upstream chat completion failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to process chat completion"})),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn admin_login(State(st): State<GatewayState>, Json(req): Json<LoginRequest>) -> Response {
    let admin = &st.cfg.admin;
    let ok = req.username == admin.username && req.password == admin.password;
    log::info!(
        "admin login attempt for {:?}: {}",
        req.username,
        if ok { "accepted" } else { "rejected" }
    );
    if ok {
        Json(json!({"success": true})).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid credentials"})),
        )
            .into_response()
    }
}

async fn list_api_keys(State(st): State<GatewayState>) -> impl IntoResponse {
    Json(st.store.api_keys())
}

#[derive(Deserialize)]
struct CreateApiKeyRequest {
    #[serde(default)]
    key: String,
}

async fn create_api_key(
    State(st): State<GatewayState>,
    Json(req): Json<CreateApiKeyRequest>,
) -> Response {
    if req.key.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Invalid API key data"})),
        )
            .into_response();
    }
    let created = st.store.create_api_key(&req.key);
    log::info!("api key rotated, new active key id {}", created.id);
    Json(created).into_response()
}

async fn token_usage(State(st): State<GatewayState>) -> impl IntoResponse {
    Json(json!({
        "totalTokens": st.store.total_tokens_used(),
        "todayTokens": st.store.today_tokens_used(),
        "usageByModel": st.store.usage_by_model(),
    }))
}
