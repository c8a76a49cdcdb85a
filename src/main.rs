//! Report Summarizer - turns uploaded medical reports into patient-friendly HTML summaries.

mod config;
mod error;
mod extract;
mod html;
mod llm;
mod model;
mod ocr;
mod pdf;
mod pipeline;

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use config::{ProfileStore, Settings};
use error::Error;
use extract::TextExtractor;
use llm::ChatClient;
use model::{SummariesResponse, UploadedFile};
use pdf::LopdfParser;
use pipeline::ReportPipeline;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Multipart field that carries the report files.
const FILES_FIELD: &str = "files";
const NO_FILES: &str = "No files uploaded.";
const TOO_MANY_FILES: &str = "Too many files uploaded.";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<ReportPipeline>,
    profiles: Arc<ProfileStore>,
    max_files: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "report_summarizer=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    let profiles = match &settings.profiles_dir {
        Some(dir) => ProfileStore::load_from_dir(dir)?,
        None => ProfileStore::builtin(),
    }
    .with_default(&settings.default_profile)?;
    for name in profiles.list() {
        if let Some(profile) = profiles.get(&name) {
            info!("Loaded profile {}: {}", name, profile.description);
        }
    }
    info!("Default profile: {}", profiles.default_profile().name);

    let llm = ChatClient::new(&settings.llm_api_url, &settings.api_key, settings.llm_timeout)?;
    info!("LLM client initialized for {}", settings.llm_api_url);

    let ocr = ocr::from_settings(&settings);
    info!("OCR engine: {}", ocr.name());

    let extractor = TextExtractor::new(Arc::new(LopdfParser), ocr, settings.ocr_lang.clone());

    let state = AppState {
        pipeline: Arc::new(ReportPipeline::new(extractor, Arc::new(llm))),
        profiles: Arc::new(profiles),
        max_files: settings.max_files,
    };

    let app = router(state, settings.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    info!("Server listening on http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/profiles", get(list_profiles))
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// List available prompt profiles.
async fn list_profiles(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.profiles.list())
}

#[derive(serde::Deserialize)]
struct UploadQuery {
    profile: Option<String>,
}

/// Summarize every uploaded report; any failure fails the whole batch.
async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SummariesResponse>, Error> {
    let profile = match query.profile.as_deref() {
        Some(name) => state.profiles.get(name).ok_or_else(|| Error::UnknownProfile {
            name: name.to_string(),
            available: state.profiles.list(),
        })?,
        None => state.profiles.default_profile(),
    };

    // A body that is not multipart carries no files.
    let multipart = multipart.map_err(|_| Error::validation(NO_FILES))?;
    let files = read_files(multipart, state.max_files).await?;

    if files.is_empty() {
        return Err(Error::validation(NO_FILES));
    }

    let batch_id = Uuid::new_v4();
    info!("Batch {}: {} files, profile {}", batch_id, files.len(), profile.name);

    let summaries = state
        .pipeline
        .process_batch(&files, profile)
        .instrument(info_span!("batch", %batch_id))
        .await?;

    info!("Batch {} complete", batch_id);
    Ok(Json(SummariesResponse { summaries }))
}

/// Buffer the `files` file parts of the form in memory; other fields are skipped.
async fn read_files(mut multipart: Multipart, max_files: usize) -> Result<Vec<UploadedFile>, Error> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(malformed_multipart)? {
        // Only parts carrying a filename are files; plain form values are skipped.
        let Some(original_name) = field
            .file_name()
            .filter(|_| field.name() == Some(FILES_FIELD))
            .map(str::to_string)
        else {
            continue;
        };
        if files.len() == max_files {
            return Err(Error::validation(TOO_MANY_FILES));
        }

        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let content = field.bytes().await.map_err(malformed_multipart)?.to_vec();

        info!("Received file: {} ({}, {} bytes)", original_name, mime_type, content.len());
        files.push(UploadedFile::new(original_name, mime_type, content));
    }

    Ok(files)
}

fn malformed_multipart(e: axum::extract::multipart::MultipartError) -> Error {
    Error::Multipart {
        status: e.status(),
        details: e.body_text(),
    }
}
