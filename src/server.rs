use crate::backend::{AgentBackend, BackendReply};
use crate::conversation::{BackendChatRequest, BackendDefaults, ConversationRequest};
use crate::error::TranslateError;
use crate::translate::{FrameSink, Pacing, pace, payload_frames, pump_lines, pump_raw};
use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::Value;
use std::error::Error;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

const STREAM_BUFFER: usize = 64;

pub struct ServerConfig {
    pub listen: String,
    pub backend_url: String,
    pub defaults: BackendDefaults,
    pub pacing: Pacing,
}

struct ServerState {
    backend: AgentBackend,
    defaults: BackendDefaults,
    pacing: Pacing,
}

type ServerResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

pub async fn run(config: ServerConfig) -> ServerResult<()> {
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    tracing::info!(
        listen = %config.listen,
        backend = %config.backend_url,
        "thoughtline translator listening"
    );
    axum::serve(listener, router(config)).await?;
    Ok(())
}

pub fn router(config: ServerConfig) -> axum::Router {
    let state = Arc::new(ServerState {
        backend: AgentBackend::new(&config.backend_url),
        defaults: config.defaults,
        pacing: config.pacing,
    });

    axum::Router::new()
        .route("/api/chat", post(chat))
        .route("/api/health", get(health))
        .with_state(state)
}

async fn chat(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Response, TranslateError> {
    let request = ConversationRequest::from_body(&body)?;
    let payload = BackendChatRequest::from_conversation(&request, &state.defaults);
    tracing::info!(
        messages = payload.messages.len(),
        requested_mode = ?request.agent_mode,
        provider = %payload.provider,
        "forwarding chat to agent backend"
    );

    let (sink, rx) = FrameSink::channel(STREAM_BUFFER);
    match state.backend.send_chat(&payload).await? {
        BackendReply::Streaming(response) => {
            tracing::debug!("backend answered with a stream; forwarding lines");
            tokio::spawn(pump_raw(response.bytes_stream(), sink));
        }
        BackendReply::Payload(reply) => {
            let frames = payload_frames(reply)?;
            tracing::debug!(frames = frames.len(), "replaying atomic backend answer");
            let lines = pace(&frames, state.pacing)?;
            tokio::spawn(pump_lines(lines, sink));
        }
    }

    Ok((
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
            (CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response())
}

async fn health(State(state): State<Arc<ServerState>>) -> Result<Json<Value>, TranslateError> {
    let status = state.backend.health().await?;
    tracing::debug!(backend = %state.backend.base_url(), "backend health checked");
    Ok(Json(status))
}
