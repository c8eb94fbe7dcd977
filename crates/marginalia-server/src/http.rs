//! Internal HTTP API.
//!
//! `/api/agent-write` and `/api/agent-read` are server-to-server endpoints
//! authenticated with the shared internal secret. `/api/suggest` is polled by
//! front-ends directly and stays CORS-open. Request bodies over 1 MiB are
//! rejected.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use marginalia_types::PageId;
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};

use crate::AppState;

const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/agent-write", post(agent_write))
        .route("/api/agent-read", post(agent_read))
        .route("/api/suggest", post(suggest))
        .layer(cors)
        .layer(middleware::from_fn(options_no_content))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// `OPTIONS` answers 204 No Content; the CorsLayer preflight default is 200.
async fn options_no_content(req: Request, next: Next) -> Response {
    let preflight = req.method() == Method::OPTIONS;
    let mut res = next.run(req).await;
    if preflight {
        *res.status_mut() = StatusCode::NO_CONTENT;
    }
    res
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "Unauthorized" })),
    )
        .into_response()
}

/// Check the internal bearer secret on server-to-server routes.
fn authorize(state: &AppState, headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == state.internal_secret)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WriteBody {
    page_id: PageId,
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageBody {
    page_id: PageId,
}

async fn agent_write(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<WriteBody>,
) -> Response {
    if !authorize(&state, &headers) {
        return unauthorized();
    }
    match state.ctx.docs.append_paragraph(body.page_id, &body.text).await {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => {
            tracing::warn!(page = %body.page_id.short(), error = %e, "agent-write failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn agent_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PageBody>,
) -> Response {
    if !authorize(&state, &headers) {
        return unauthorized();
    }
    match state.ctx.docs.read_text(body.page_id).await {
        Ok(text) => Json(serde_json::json!({ "text": text })).into_response(),
        Err(e) => {
            tracing::warn!(page = %body.page_id.short(), error = %e, "agent-read failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Front-end suggestion poll. No auth: suggestions are already scoped to the
/// page and ephemeral. `suggestion` is the display string, empty when
/// nothing is cached; metadata rides in separate fields.
async fn suggest(State(state): State<Arc<AppState>>, Json(body): Json<PageBody>) -> Response {
    match state.ctx.suggestions.get(&body.page_id) {
        Some(s) => Json(serde_json::json!({
            "suggestion": s.text,
            "agentName": s.agent_name,
            "intent": s.intent,
        }))
        .into_response(),
        None => Json(serde_json::json!({ "suggestion": "" })).into_response(),
    }
}
