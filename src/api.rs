//! HTTP surface for VisuLex.
//!
//! This module exposes a compact Axum router for the single-page frontend:
//!
//! - `POST /upload` – Multipart upload (field `file`); the document is extracted, summarized,
//!   embedded, and stored. Returns `doc_id`, `filename`, `file_type`, and `summary`.
//! - `POST /ask` – Answer a question about an uploaded document, optionally with a specific model.
//! - `GET /history` – Uploaded documents keyed by `doc_id`, in upload order.
//! - `GET /document/:doc_id` – Full stored record, including text and embedding.
//! - `GET /health` – Configured and loaded models plus the document count.
//! - `GET /metrics` – Ingestion and answer counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools.
//!
//! Errors are returned as `{"error": message}` with a status derived from the failure.

use crate::config::Config;
use crate::extraction::ExtractionError;
use crate::metrics::MetricsSnapshot;
use crate::processing::{DocumentApi, HealthSnapshot, ProcessingError, UploadedFile};
use crate::qa::AnswerSource;
use crate::store::{DocumentRecord, DocumentSummary};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Path, State,
        multipart::MultipartError,
        rejection::JsonRejection,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize, ser::SerializeMap};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Room for multipart boundaries and headers on top of the file size limit.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Build the HTTP router exposing the document API surface.
pub fn create_router<S>(service: Arc<S>, config: &Config) -> Router
where
    S: DocumentApi + 'static,
{
    Router::new()
        .route("/", get(root))
        .route("/health", get(health::<S>))
        .route(
            "/upload",
            post(upload_document::<S>).layer(DefaultBodyLimit::max(
                config.max_file_size.saturating_add(MULTIPART_OVERHEAD),
            )),
        )
        .route("/ask", post(ask_question::<S>))
        .route("/history", get(history::<S>))
        .route("/document/:doc_id", get(get_document::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter(|origin| {
            let wildcard = origin.as_str() == "*";
            if wildcard {
                tracing::warn!("Ignoring wildcard CORS origin; credentials are allowed");
            }
            !wildcard
        })
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(origin = %origin, error = %error, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Backend is running" }))
}

/// Response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    #[serde(flatten)]
    snapshot: HealthSnapshot,
}

async fn health<S>(State(service): State<Arc<S>>) -> Json<HealthResponse>
where
    S: DocumentApi,
{
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        snapshot: service.health().await,
    })
}

/// Success response for `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    doc_id: Uuid,
    filename: String,
    file_type: String,
    summary: String,
}

/// Accept a multipart upload and run it through the document pipeline.
///
/// Only the `file` field is read; other fields are ignored.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError>
where
    S: DocumentApi,
{
    let mut upload: Option<UploadedFile> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;
        upload = Some(UploadedFile {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
    }

    let file = upload.ok_or_else(|| AppError::BadRequest("No file provided".into()))?;
    let outcome = service.upload(file).await?;
    tracing::info!(
        doc_id = %outcome.doc_id,
        filename = %outcome.filename,
        file_type = %outcome.file_type,
        "Upload request completed"
    );
    Ok(Json(UploadResponse {
        doc_id: outcome.doc_id,
        filename: outcome.filename,
        file_type: outcome.file_type,
        summary: outcome.summary,
    }))
}

/// Request body for `POST /ask`.
#[derive(Deserialize)]
struct AskRequest {
    doc_id: String,
    question: String,
    /// Optional model override; the configured QA chain is used otherwise.
    #[serde(default)]
    model: Option<String>,
}

/// Success response for `POST /ask`.
#[derive(Serialize)]
struct AskResponse {
    doc_id: String,
    question: String,
    answer: String,
    confidence: f32,
    source: AnswerSource,
    model: Option<String>,
    start: usize,
    end: usize,
}

async fn ask_question<S>(
    State(service): State<Arc<S>>,
    request: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError>
where
    S: DocumentApi,
{
    let Json(request) = request.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let answer = service
        .ask(&request.doc_id, &request.question, request.model.as_deref())
        .await?;
    Ok(Json(AskResponse {
        doc_id: request.doc_id,
        question: request.question,
        answer: answer.answer,
        confidence: answer.confidence,
        source: answer.source,
        model: answer.model,
        start: answer.start,
        end: answer.end,
    }))
}

/// Uploaded documents as a JSON object keyed by id, preserving upload order.
struct HistoryResponse(Vec<DocumentSummary>);

#[derive(Serialize)]
struct HistoryEntry<'a> {
    filename: &'a str,
    summary: &'a str,
    file_type: &'a str,
    uploaded_at: &'a str,
}

impl Serialize for HistoryResponse {
    fn serialize<Ser>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error>
    where
        Ser: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for document in &self.0 {
            map.serialize_entry(
                &document.id,
                &HistoryEntry {
                    filename: &document.filename,
                    summary: &document.summary,
                    file_type: &document.file_type,
                    uploaded_at: &document.uploaded_at,
                },
            )?;
        }
        map.end()
    }
}

async fn history<S>(State(service): State<Arc<S>>) -> Json<HistoryResponse>
where
    S: DocumentApi,
{
    Json(HistoryResponse(service.history().await))
}

async fn get_document<S>(
    State(service): State<Arc<S>>,
    Path(doc_id): Path<String>,
) -> Result<Json<DocumentRecord>, AppError>
where
    S: DocumentApi,
{
    let record = service.document(&doc_id).await?;
    Ok(Json(DocumentRecord::clone(&record)))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: DocumentApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/upload",
                description: "Upload a PDF, image (JPEG, PNG, GIF), or text file as multipart field 'file'. Returns { \"doc_id\", \"filename\", \"file_type\", \"summary\" }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ask",
                method: "POST",
                path: "/ask",
                description: "Answer a question about an uploaded document. Keyword rules run first, then the QA model chain.",
                request_example: Some(json!({
                    "doc_id": "00000000-0000-0000-0000-000000000000",
                    "question": "What is the phone number?",
                    "model": "deepset/roberta-base-squad2"
                })),
            },
            CommandDescriptor {
                name: "history",
                method: "GET",
                path: "/history",
                description: "Return uploaded documents keyed by doc_id with filename, summary, and upload time.",
                request_example: None,
            },
            CommandDescriptor {
                name: "document",
                method: "GET",
                path: "/document/:doc_id",
                description: "Return the stored record of a document, including extracted text and embedding.",
                request_example: None,
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Report configured and loaded models and the number of stored documents.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion and answer counters.",
                request_example: None,
            },
        ],
    })
}

/// Failure of an HTTP request, rendered as `{"error": message}`.
#[derive(Debug)]
enum AppError {
    Processing(ProcessingError),
    Multipart(MultipartError),
    BadRequest(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Processing(error) => processing_status(error),
            Self::Multipart(error) => error.status(),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Processing(error) => error.to_string(),
            Self::Multipart(error) => error.body_text(),
            Self::BadRequest(message) => message.clone(),
        }
    }
}

fn processing_status(error: &ProcessingError) -> StatusCode {
    match error {
        ProcessingError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
        ProcessingError::EmptyUpload | ProcessingError::EmptyQuestion => StatusCode::BAD_REQUEST,
        ProcessingError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ProcessingError::Extraction(error) => match error {
            ExtractionError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ExtractionError::InvalidUtf8(_) => StatusCode::BAD_REQUEST,
            ExtractionError::Pdf(_) | ExtractionError::Image(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ExtractionError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        ProcessingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %message, "Request failed");
        } else {
            tracing::warn!(status = %status, error = %message, "Request rejected");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self::Processing(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::Multipart(inner)
    }
}
