use axum::{
    extract::{DefaultBodyLimit, Json, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    app_state::{AppState, Status},
    error::{ErrorKind, RagError},
    ingest::IndexingSummary,
    models::ChatTurn,
    session::ChatResponse,
};

/// Tamaño máximo de un PDF subido.
const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct ChatPayload {
    query: String,
}

#[derive(Serialize)]
pub struct SessionCreated {
    session_id: Uuid,
}

#[derive(Serialize)]
pub struct Instructions {
    title: &'static str,
    steps: [&'static str; 4],
}

const INSTRUCTIONS: Instructions = Instructions {
    title: "Instructions",
    steps: [
        "Upload a PDF document using the file uploader.",
        "Wait for the document to be processed and indexed.",
        "Enter your question in the text input field.",
        "View the answer and retrieved document segments.",
    ],
};

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session_handler))
        .route("/api/sessions/:id", delete(end_session_handler))
        .route("/api/sessions/:id/upload", post(upload_handler))
        .route("/api/sessions/:id/chat", post(chat_handler))
        .route("/api/sessions/:id/history", get(history_handler))
        .route("/api/sessions/:id/status", get(status_handler))
        .route("/api/instructions", get(instructions_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(app_state)
}

// --- Errores ---

fn status_code(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidUpload => StatusCode::BAD_REQUEST,
        ErrorKind::UnknownSession => StatusCode::NOT_FOUND,
        ErrorKind::Extraction => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Embedding | ErrorKind::VectorIndex | ErrorKind::Generation => StatusCode::BAD_GATEWAY,
    }
}

fn rag_error(err: RagError) -> ApiError {
    let kind = err.kind();
    (
        status_code(kind),
        Json(json!({
            "error": err.user_message(),
            "kind": kind,
            "detail": err.to_string(),
        })),
    )
}

fn bad_request(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

// --- Handlers ---

#[axum::debug_handler]
async fn create_session_handler(State(state): State<AppState>) -> Json<SessionCreated> {
    let handle = state.sessions.create();
    info!(session_id = %handle.id, "session started");
    Json(SessionCreated { session_id: handle.id })
}

#[axum::debug_handler]
async fn end_session_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.sessions.end(id).map_err(rag_error)?;
    info!(session_id = %id, "session ended, history discarded");
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
async fn upload_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<IndexingSummary>, ApiError> {
    let handle = state.sessions.get(id).map_err(rag_error)?;

    // Se toma el primer campo que traiga fichero.
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&format!("Multipart error: {e}")))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(&format!("Failed to read file: {e}")))?;
        upload = Some((file_name, bytes.to_vec()));
        break;
    }
    let (file_name, bytes) = upload.ok_or_else(|| bad_request("No file provided"))?;

    let summary = state
        .orchestrator
        .handle_upload(&handle, &file_name, bytes)
        .await
        .map_err(|e| {
            error!(session_id = %id, error = %e, "upload failed");
            rag_error(e)
        })?;
    Ok(Json(summary))
}

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<ChatResponse>, ApiError> {
    if payload.query.is_empty() {
        return Err(bad_request("Query must not be empty"));
    }
    let handle = state.sessions.get(id).map_err(rag_error)?;

    let response = state
        .orchestrator
        .handle_query(&handle, &payload.query)
        .await
        .map_err(|e| {
            error!(session_id = %id, error = %e, "query failed");
            rag_error(e)
        })?;
    Ok(Json(response))
}

#[axum::debug_handler]
async fn history_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChatTurn>>, ApiError> {
    let handle = state.sessions.get(id).map_err(rag_error)?;
    Ok(Json(state.orchestrator.history(&handle).await))
}

#[axum::debug_handler]
async fn status_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Status>, ApiError> {
    let handle = state.sessions.get(id).map_err(rag_error)?;
    Ok(Json(handle.status()))
}

#[axum::debug_handler]
async fn instructions_handler() -> Json<Instructions> {
    Json(INSTRUCTIONS)
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Shutdown requested.");
    let sender = state
        .shutdown_sender
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .take();
    if let Some(sender) = sender {
        let _ = sender.send(());
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tokio::sync::oneshot;
    use tower::ServiceExt;

    use crate::app_state::SessionRegistry;
    use crate::config::{AppConfig, ChunkIdScheme};
    use crate::ingest::Indexer;
    use crate::rag::Retriever;
    use crate::session::SessionOrchestrator;
    use crate::testing::{pdf_with_pages, FakeEmbedder, FakeGenerator};
    use crate::vector_store::MemoryIndex;

    fn test_state() -> (AppState, oneshot::Receiver<()>) {
        let config = AppConfig::from_lookup(|key| match key {
            "COHERE_API_KEY" => Some("test".to_string()),
            "VECTOR_BACKEND" => Some("memory".to_string()),
            _ => None,
        })
        .unwrap();

        let embedder = Arc::new(FakeEmbedder::default());
        let index = Arc::new(MemoryIndex::new());
        let orchestrator = SessionOrchestrator::new(
            Indexer::new(embedder.clone(), index.clone(), ChunkIdScheme::Ordinal),
            Retriever::new(embedder, index),
            Arc::new(FakeGenerator::default()),
            Duration::ZERO,
        );
        let (tx, rx) = oneshot::channel();

        let state = AppState {
            config,
            orchestrator: Arc::new(orchestrator),
            sessions: Arc::new(SessionRegistry::new(None)),
            shutdown_sender: Arc::new(Mutex::new(Some(tx))),
        };
        (state, rx)
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_upload(uri: &str, file_name: &str, content: &[u8]) -> Request<Body> {
        let boundary = "ragsta-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n").as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::post(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn new_session(router: &Router) -> String {
        let (status, body) = send(router, Request::post("/api/sessions").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        body["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn chat_appends_history_and_returns_answer() {
        let (state, _rx) = test_state();
        let router = create_router(state);
        let id = new_session(&router).await;

        let (status, body) = send(
            &router,
            post_json(&format!("/api/sessions/{id}/chat"), json!({"query": "What is X?"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["answer"].as_str().is_some_and(|a| !a.is_empty()));
        assert_eq!(body["context_found"], json!(false));

        let (status, history) = send(
            &router,
            Request::get(format!("/api/sessions/{id}/history")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let roles: Vec<&str> = history
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "assistant"]);
    }

    #[tokio::test]
    async fn status_is_reported_per_session() {
        let (state, _rx) = test_state();
        let router = create_router(state);
        let id = new_session(&router).await;

        send(&router, post_json(&format!("/api/sessions/{id}/chat"), json!({"query": "q"}))).await;
        let (status, body) = send(
            &router,
            Request::get(format!("/api/sessions/{id}/status")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], json!("complete"));
        assert_eq!(body["message"], json!("Found the Citations!"));
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (state, _rx) = test_state();
        let router = create_router(state);

        let (status, body) = send(
            &router,
            post_json(&format!("/api/sessions/{}/chat", Uuid::new_v4()), json!({"query": "q"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], json!("unknown_session"));
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let (state, _rx) = test_state();
        let router = create_router(state);
        let id = new_session(&router).await;

        let (status, _) = send(&router, post_json(&format!("/api/sessions/{id}/chat"), json!({"query": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // cualquier texto no vacío se acepta tal cual
        let (status, body) = send(&router, post_json(&format!("/api/sessions/{id}/chat"), json!({"query": "  "}))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["answer"].is_string());
    }

    #[tokio::test]
    async fn upload_of_valid_pdf_indexes_it() {
        let (state, _rx) = test_state();
        let router = create_router(state);
        let id = new_session(&router).await;

        let pdf = pdf_with_pages(&["FirstPageMarker", "SecondPageMarker"]);
        let (status, body) = send(&router, multipart_upload(&format!("/api/sessions/{id}/upload"), "doc.pdf", &pdf)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["file_name"], json!("doc.pdf"));
        assert!(body["chunks_indexed"].as_u64().unwrap() > 0);

        let (status, body) = send(
            &router,
            Request::get(format!("/api/sessions/{id}/status")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], json!("complete"));
        assert_eq!(body["document"], json!("doc.pdf"));
    }

    #[tokio::test]
    async fn upload_of_non_pdf_is_bad_request() {
        let (state, _rx) = test_state();
        let router = create_router(state);
        let id = new_session(&router).await;

        let (status, body) = send(
            &router,
            multipart_upload(&format!("/api/sessions/{id}/upload"), "notes.txt", b"just text"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], json!("invalid_upload"));
    }

    #[tokio::test]
    async fn upload_of_corrupt_pdf_is_unprocessable() {
        let (state, _rx) = test_state();
        let router = create_router(state);
        let id = new_session(&router).await;

        let (status, body) = send(
            &router,
            multipart_upload(&format!("/api/sessions/{id}/upload"), "broken.pdf", b"%PDF-1.4 nope"),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], json!("extraction"));
    }

    #[tokio::test]
    async fn ending_a_session_discards_it() {
        let (state, _rx) = test_state();
        let router = create_router(state);
        let id = new_session(&router).await;

        let (status, _) = send(
            &router,
            Request::delete(format!("/api/sessions/{id}")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(
            &router,
            Request::get(format!("/api/sessions/{id}/history")).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn instructions_are_static() {
        let (state, _rx) = test_state();
        let router = create_router(state);
        let (status, body) = send(&router, Request::get("/api/instructions").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["steps"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn shutdown_fires_the_signal_once() {
        let (state, rx) = test_state();
        let router = create_router(state);
        let (status, _) = send(&router, Request::post("/api/shutdown").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(rx.await.is_ok());

        let (status, _) = send(&router, Request::post("/api/shutdown").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn error_kinds_map_to_status_codes() {
        assert_eq!(status_code(ErrorKind::InvalidUpload), StatusCode::BAD_REQUEST);
        assert_eq!(status_code(ErrorKind::Extraction), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_code(ErrorKind::Generation), StatusCode::BAD_GATEWAY);
        assert_eq!(status_code(ErrorKind::UnknownSession), StatusCode::NOT_FOUND);
    }
}
