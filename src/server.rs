use std::{sync::Arc, time::Instant};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::task;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    config::AppConfig,
    engine::EngineSlot,
    error::ServiceError,
    prompt::{ChatRequest, build_prompt},
    stream::{self, protocol},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engine: EngineSlot,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn build_router(config: Arc<AppConfig>, engine: EngineSlot) -> Router {
    let state = AppState { config, engine };

    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    if state.engine.is_ready() {
        (StatusCode::OK, Json(HealthResponse { status: "ok" }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "loading" }),
        )
    }
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, ServiceError>>>, ServiceError> {
    let started_at = Instant::now();
    let message = request.validated_message()?;
    let engine = state.engine.get()?;

    let preview: String = message.chars().take(50).collect();
    info!(%preview, "new stream request");

    let prompt = build_prompt(message);
    let max_input_tokens = state.config.max_input_tokens;
    let tokenizer = engine.clone();
    let encoding = task::spawn_blocking(move || {
        tokenizer.tokenize(&prompt, max_input_tokens, true)
    })
    .await
    .map_err(|e| ServiceError::Tokenizer(format!("tokenization task failed: {e}")))??;
    info!(input_tokens = encoding.len(), "prompt tokenized");

    let params = state
        .config
        .generation
        .clone()
        .with_special_tokens(engine.special_tokens());

    let events = stream::start(
        engine,
        encoding,
        params,
        state.config.stream_options(),
        started_at,
    );
    let frames = events.map(|item| item.and_then(|event| protocol::to_sse_event(&event)));

    Ok(Sse::new(frames))
}
