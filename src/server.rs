//! HTTP server: streaming generation plus fact and style CRUD.
//!
//! | Route | |
//! |---|---|
//! | `POST /generate` | server-sent events: `queries`, `context`, `text`, `error`, `end` |
//! | `GET/POST /facts`, `PUT/DELETE /facts/{id}` | fact CRUD |
//! | `GET/POST /style`, `GET /getStyle`, `POST /postStyle` | writing style |
//!
//! Cross-origin requests are allowed from `server.cors_origins`.

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::LoreConfig;
use crate::db;
use crate::embedding;
use crate::facts::store::SqliteFactStore;
use crate::facts::style::StyleConfig;
use crate::facts::{Fact, FactStore, NewFact};
use crate::llm::openai::OpenAiGenerator;
use crate::llm::{ChatMessage, TextGenerator};
use crate::pipeline::{GenerationRequest, Pipeline};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteFactStore>,
    pub pipeline: Pipeline,
}

/// Request body for `POST /generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub old_context: String,
    #[serde(default)]
    pub style: Option<StyleConfig>,
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(error = %self.message, "request failed");
        }
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

/// Run a synchronous store operation off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::from(anyhow::anyhow!("store task failed: {e}")))?
        .map_err(ApiError::from)
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/generate", post(generate))
        .route("/facts", get(list_facts).post(create_fact))
        .route("/facts/{id}", put(update_fact).delete(delete_fact))
        .route("/style", get(get_style).post(save_style))
        // Route names used by the bundled web client
        .route("/getStyle", get(get_style))
        .route("/postStyle", post(save_style))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// Allow the configured browser origins; unparsable entries are skipped.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
}

async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if body.messages.is_empty() {
        return Err(ApiError::bad_request("messages must not be empty"));
    }

    let style = match body.style {
        Some(style) => style,
        None => {
            let store = Arc::clone(&state.store);
            match blocking(move || store.load_style()).await {
                Ok(style) => style,
                Err(e) => {
                    tracing::warn!(error = %e.message, "failed to load writing style, using default");
                    StyleConfig::default()
                }
            }
        }
    };

    tracing::info!(
        turns = body.messages.len(),
        prior_context_len = body.old_context.len(),
        "generate request"
    );

    let events = state.pipeline.orchestrator.run(GenerationRequest {
        conversation: body.messages,
        prior_context: body.old_context,
        style,
    });
    let frames = state
        .pipeline
        .encoder
        .encode(events)
        .map(|frame| Ok(Event::default().event(frame.kind.as_str()).data(frame.data)));

    Ok(Sse::new(frames).keep_alive(KeepAlive::default()))
}

async fn list_facts(State(state): State<AppState>) -> Result<Json<Vec<Fact>>, ApiError> {
    let store = Arc::clone(&state.store);
    Ok(Json(blocking(move || store.list_facts()).await?))
}

async fn create_fact(
    State(state): State<AppState>,
    Json(body): Json<NewFact>,
) -> Result<(StatusCode, Json<Fact>), ApiError> {
    if body.text.trim().is_empty() {
        return Err(ApiError::bad_request("fact text must not be empty"));
    }
    let store = Arc::clone(&state.store);
    let fact = blocking(move || store.insert_fact(&body.category, &body.text)).await?;
    tracing::info!(id = %fact.id, category = %fact.category, "fact created");
    Ok((StatusCode::CREATED, Json(fact)))
}

async fn update_fact(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NewFact>,
) -> Result<Json<Fact>, ApiError> {
    if body.text.trim().is_empty() {
        return Err(ApiError::bad_request("fact text must not be empty"));
    }
    let store = Arc::clone(&state.store);
    let lookup = id.clone();
    blocking(move || store.update_fact(&lookup, &body.category, &body.text))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("fact not found: {id}")))
}

async fn delete_fact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let store = Arc::clone(&state.store);
    let lookup = id.clone();
    if blocking(move || store.delete_fact(&lookup)).await? {
        tracing::info!(id = %id, "fact deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("fact not found: {id}")))
    }
}

async fn get_style(State(state): State<AppState>) -> Result<Json<StyleConfig>, ApiError> {
    let store = Arc::clone(&state.store);
    Ok(Json(blocking(move || store.load_style()).await?))
}

async fn save_style(
    State(state): State<AppState>,
    Json(style): Json<StyleConfig>,
) -> Result<Json<StyleConfig>, ApiError> {
    let store = Arc::clone(&state.store);
    let saved = style.clone();
    blocking(move || store.save_style(&saved)).await?;
    Ok(Json(style))
}

/// Open the database and build the production pipeline (local embeddings,
/// OpenAI-compatible generation).
pub fn build_state(config: &LoreConfig) -> Result<AppState> {
    let db_path = config.resolved_db_path();
    let store = Arc::new(SqliteFactStore::new(db::open_database(&db_path)?));

    let embedder: Arc<dyn embedding::EmbeddingProvider> =
        Arc::from(embedding::create_provider(&config.embedding)?);
    tracing::info!(model = %config.embedding.model, "embedding provider ready");

    let generator: Arc<dyn TextGenerator> = Arc::new(OpenAiGenerator::new(&config.llm)?);
    tracing::info!(base_url = %config.llm.base_url, model = %config.llm.model, "generation backend ready");

    let facts: Arc<dyn FactStore> = store.clone();
    let pipeline = Pipeline::new(config, facts, embedder, generator);
    Ok(AppState { store, pipeline })
}

/// Start the HTTP server and run until Ctrl-C.
pub async fn serve(config: LoreConfig) -> Result<()> {
    let state = build_state(&config)?;

    // Build the index up front so the first request does not pay for it
    if let Err(e) = state.pipeline.synchronizer.ensure_current().await {
        tracing::warn!(error = %e, "initial index build failed, will retry on first request");
    }

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "lorekeeper listening at http://{bind_addr}");

    axum::serve(listener, router(state, &config.server.cors_origins))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}
