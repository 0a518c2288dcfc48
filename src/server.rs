use crate::logging::SharedLogger;
use crate::models::ModelRegistry;
use crate::translate::openai_types::{ChatCompletionRequest, ChatMessage, ErrorResponse};
use crate::translate::{response, streaming};
use crate::upstream::UpstreamClient;

use axum::extract::State;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderValue, Method, StatusCode, Uri};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub registry: ModelRegistry,
    pub upstream: UpstreamClient,
    pub logger: SharedLogger,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_root).options(handle_preflight))
        .route("/v1/models", get(handle_models).options(handle_preflight))
        .route(
            "/v1/chat/completions",
            post(handle_chat_completions).options(handle_preflight),
        )
        .fallback(handle_fallback)
        // The CORS headers go on every response, not just preflights.
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Authorization"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_chat_completions(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            state
                .logger
                .error("server", format!("Failed to parse request: {}", e));
            let err = ErrorResponse::invalid_request(format!("Invalid request body: {}", e));
            return (StatusCode::BAD_REQUEST, Json(err)).into_response();
        }
    };

    let model = req
        .model
        .clone()
        .unwrap_or_else(|| state.registry.default_model().to_string());

    if !state.registry.contains(&model) {
        let err = ErrorResponse::invalid_request(format!("Model '{}' not found", model));
        return (StatusCode::BAD_REQUEST, Json(err)).into_response();
    }

    let messages = match validate_messages(&req.messages) {
        Ok(m) => m,
        Err(err) => return (StatusCode::BAD_REQUEST, Json(err)).into_response(),
    };

    state.logger.info(
        "server",
        format!(
            "Request: model={} streaming={} messages={}",
            model,
            req.stream,
            messages.len()
        ),
    );

    let deltas = match state.upstream.chat_completion(&model, &messages).await {
        Ok(s) => s,
        Err(e) => {
            state
                .logger
                .error("server", format!("Upstream call failed: {}", e));
            return internal_server_error();
        }
    };

    if req.stream {
        let frames = streaming::stream_chunks(deltas, &model, state.logger.clone());
        let event_stream = frames.map(|result| match result {
            Ok(payload) => Ok(Event::default().data(payload)),
            Err(e) => Err(std::io::Error::other(e.to_string())),
        });
        Sse::new(event_stream).into_response()
    } else {
        match response::aggregate(deltas, &model).await {
            Ok(completion) => Json(completion).into_response(),
            Err(e) => {
                state
                    .logger
                    .error("server", format!("Aggregation failed: {}", e));
                internal_server_error()
            }
        }
    }
}

/// The error body must say "non-empty array" for missing, empty, and
/// non-array values alike, so the raw JSON value is inspected by hand.
fn validate_messages(
    messages: &serde_json::Value,
) -> std::result::Result<Vec<ChatMessage>, ErrorResponse> {
    let entries = match messages.as_array() {
        Some(a) if !a.is_empty() => a,
        _ => {
            return Err(ErrorResponse::invalid_request(
                "Messages must be a non-empty array",
            ))
        }
    };

    entries
        .iter()
        .map(|entry| serde_json::from_value(entry.clone()))
        .collect::<std::result::Result<Vec<ChatMessage>, _>>()
        .map_err(|e| ErrorResponse::invalid_request(format!("Invalid message entry: {}", e)))
}

fn internal_server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::server_error("Internal server error")),
    )
        .into_response()
}

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "GPT-OSS API gateway is running",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/v1/models", "/v1/chat/completions"],
    }))
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "object": "list",
        "data": state.registry.descriptors(),
    }))
}

async fn handle_preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn handle_fallback(method: Method, uri: Uri) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }

    let err = ErrorResponse::invalid_request(format!("Path {} not found", uri.path()));
    (StatusCode::NOT_FOUND, Json(err)).into_response()
}
