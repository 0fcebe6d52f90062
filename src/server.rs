use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::metadata::{self, ResolveOutcome};
use crate::store::{MetadataStore, metadata_key};
use crate::token_id::normalize_token_id;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MetadataStore>,
    pub fallback_image: String,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/create", post(create_metadata))
        .route(
            "/metadata/:token_id",
            get(fetch_metadata).options(metadata_preflight),
        )
        .route("/reset-counter", post(reset_counter))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CreateRequest {
    #[serde(rename = "tokenId", default)]
    token_id: Option<Value>,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
struct CreateResponse {
    success: bool,
    #[serde(rename = "tokenId")]
    token_id: String,
    message: String,
    url: String,
}

#[derive(Debug, Serialize)]
struct ResetResponse {
    success: bool,
    message: String,
}

#[derive(Debug, Serialize)]
struct FailureResponse {
    success: bool,
    error: String,
}

fn failure(status: StatusCode, error: &str) -> Response {
    (
        status,
        Json(FailureResponse {
            success: false,
            error: error.to_string(),
        }),
    )
        .into_response()
}

/// メタデータを登録し、採番または正規化済みのトークンIDを返す
async fn create_metadata(
    State(state): State<AppState>,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "create rejected, body is not valid JSON");
            return failure(StatusCode::BAD_REQUEST, "Request body must be JSON");
        }
    };
    let Some(document) = request.metadata else {
        return failure(StatusCode::BAD_REQUEST, "Metadata is required");
    };

    let token_id = match request.token_id {
        Some(explicit) => {
            let Some(raw) = render_token_id(&explicit) else {
                return failure(StatusCode::BAD_REQUEST, "tokenId must be a string or number");
            };
            normalize_token_id(&raw)
        }
        None => match state.store.next_token_id().await {
            Ok(id) => id,
            Err(err) => {
                error!(error = %err, "token id allocation failed");
                return failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to allocate token ID");
            }
        },
    };

    let body = match serde_json::to_string_pretty(&document) {
        Ok(body) => body,
        Err(err) => {
            error!(error = %err, "metadata could not be encoded");
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store metadata");
        }
    };
    if let Err(err) = state.store.set(&metadata_key(&token_id), &body).await {
        error!(error = %err, %token_id, "metadata write failed");
        return failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store metadata");
    }

    info!(%token_id, "metadata stored");
    let url = format!("/metadata/{token_id}.json");
    (
        StatusCode::OK,
        Json(CreateResponse {
            success: true,
            message: format!("Metadata stored at {url}"),
            url,
            token_id,
        }),
    )
        .into_response()
}

/// 明示指定されたトークンIDを文字列に直す。文字列と数値だけを受け付ける
fn render_token_id(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// トークンのメタデータを返す。どの状態でも200でスキーマを満たす
async fn fetch_metadata(State(state): State<AppState>, Path(raw_id): Path<String>) -> Response {
    let token_id = normalize_token_id(&raw_id);
    let key = metadata_key(&token_id);
    debug!(raw = %raw_id, %token_id, %key, "metadata requested");

    let stored = match state.store.get(&key).await {
        Ok(stored) => stored,
        Err(err) => {
            error!(error = %err, %token_id, "store lookup failed");
            let doc = metadata::store_error_document(&token_id, &state.fallback_image, &err.to_string());
            return document_response(&doc);
        }
    };

    let (doc, outcome) = metadata::resolve_document(stored.as_deref(), &token_id, &state.fallback_image);
    match outcome {
        ResolveOutcome::Found => debug!(%token_id, "stored metadata served"),
        ResolveOutcome::Backfilled => {
            warn!(%token_id, "stored metadata missing required fields, backfilled")
        }
        ResolveOutcome::Malformed => {
            warn!(%token_id, "stored metadata is not valid JSON, default served")
        }
        ResolveOutcome::Missing => info!(%token_id, "no stored metadata, default served"),
    }
    document_response(&doc)
}

/// メタデータ配信共通のヘッダー付き200レスポンス
fn document_response(doc: &Value) -> Response {
    let body = serde_json::to_string_pretty(doc).unwrap_or_else(|_| "{}".to_string());
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CONTENT_DISPOSITION, "inline"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
        body,
    )
        .into_response()
}

async fn metadata_preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
            (header::ACCESS_CONTROL_MAX_AGE, "86400"),
        ],
    )
}

async fn reset_counter(State(state): State<AppState>) -> Response {
    match state.store.reset_counter().await {
        Ok(()) => {
            info!("token counter reset to 0");
            (
                StatusCode::OK,
                Json(ResetResponse {
                    success: true,
                    message: "Counter reset to 0 successfully".to_string(),
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!(error = %err, "counter reset failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to reset counter")
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
