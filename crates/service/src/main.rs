use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use finqa_core::FinancialRecord;
use finqa_rag::{render_answer, FinqaConfig, FinqaServices};

struct AppState {
    services: FinqaServices,
    records: Vec<FinancialRecord>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = FinqaConfig::load(None)?;
    let state = task::spawn_blocking(move || -> anyhow::Result<AppState> {
        let services = FinqaServices::from_config(config)?;
        let records = match services.seed() {
            Ok(records) => records,
            Err(err) => {
                warn!("seeding the index failed, serving without it: {err:#}");
                services.records()
            }
        };
        Ok(AppState { services, records })
    })
    .await??;

    let app = router(Arc::new(state));
    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening" = %addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/records", get(handle_records))
        .route("/answer", post(handle_answer))
        .route("/upload", post(handle_upload))
        .with_state(state)
}

async fn handle_records(State(state): State<Arc<AppState>>) -> Json<Vec<FinancialRecord>> {
    Json(state.records.clone())
}

#[derive(Debug, Deserialize)]
struct AnswerRequest {
    query: String,
}

#[derive(Debug, Serialize)]
struct AnswerResponse {
    query: String,
    answer: String,
}

async fn handle_answer(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    let query = body.query.trim().to_string();
    if query.is_empty() {
        return Err(AppError::bad_request("query must not be empty"));
    }
    let response = task::spawn_blocking(move || {
        let answer = render_answer(state.services.synthesizer().answer(&query));
        AnswerResponse { query, answer }
    })
    .await
    .map_err(AppError::internal)?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    filename: Option<String>,
    bytes: usize,
    status: &'static str,
}

/// Uploaded documents are acknowledged only; ingestion runs through the CLI.
async fn handle_upload(mut multipart: Multipart) -> Result<Json<UploadResponse>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(AppError::bad_request)?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().map(|s| s.to_string());
            let data = field.bytes().await.map_err(AppError::bad_request)?;
            info!(filename = filename.as_deref().unwrap_or("-"), bytes = data.len(), "upload received");
            return Ok(Json(UploadResponse {
                filename,
                bytes: data.len(),
                status: "received",
            }));
        }
    }
    Err(AppError::bad_request("missing file"))
}

#[derive(Debug, Error)]
enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn bad_request<E: ToString>(msg: E) -> Self {
        Self::BadRequest(msg.to_string())
    }

    fn internal<E: Into<anyhow::Error>>(err: E) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Internal(err) => {
                error!("internal_error" = %err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}
