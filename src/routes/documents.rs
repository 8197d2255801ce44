use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::Document;
use crate::pipeline::{
    self, chunks, chunks::NewChunkInput, intake, intake::NewDocumentInput, retry, view::utc,
    PipelineView, ProcessingStats,
};
use crate::state::AppState;
use crate::status::ProcessingStatus;

use super::chunks::ChunkResponse;
use super::distributions::DistributionResponse;

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub document_type_id: Option<Uuid>,
    pub document_category_id: Option<Uuid>,
    pub original_filename: String,
    pub file_key: String,
    pub file_size: i64,
    pub mime_type: String,
    pub bronze_processed_at: Option<DateTime<Utc>>,
    pub bronze_metadata: Value,
    pub embedding_status: ProcessingStatus,
    pub silver_processed_at: Option<DateTime<Utc>>,
    pub silver_chunk_count: i32,
    pub gold_distribution_status: ProcessingStatus,
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Document> for DocumentResponse {
    fn from(document: Document) -> Self {
        Self {
            embedding_status: document.embedding_state(),
            gold_distribution_status: document.gold_state(),
            id: document.id,
            document_type_id: document.document_type_id,
            document_category_id: document.document_category_id,
            original_filename: document.original_filename,
            file_key: document.file_key,
            file_size: document.file_size,
            mime_type: document.mime_type,
            bronze_processed_at: document.bronze_processed_at.map(utc),
            bronze_metadata: document.bronze_metadata,
            silver_processed_at: document.silver_processed_at.map(utc),
            silver_chunk_count: document.silver_chunk_count,
            uploaded_at: utc(document.uploaded_at),
            updated_at: utc(document.updated_at),
        }
    }
}

#[derive(Deserialize)]
pub struct CompleteBronzeRequest {
    pub extracted_text: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Serialize)]
pub struct RetryResponse {
    pub requeued: bool,
}

pub async fn register_document(
    State(state): State<AppState>,
    Json(payload): Json<NewDocumentInput>,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;
    let document = intake::register_document(&mut conn, payload)?;
    Ok(Json(document.into()))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;
    let document = pipeline::find_document(&mut conn, document_id)?;
    Ok(Json(document.into()))
}

pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<PipelineView>> {
    let mut conn = state.db()?;
    let snapshot = pipeline::load_pipeline_snapshot(&mut conn, document_id)?;
    Ok(Json(snapshot.view()))
}

pub async fn list_silver_chunks(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<Vec<ChunkResponse>>> {
    let mut conn = state.db()?;
    pipeline::find_document(&mut conn, document_id)?;
    let chunks = pipeline::document_silver_chunks(&mut conn, document_id)?;
    Ok(Json(chunks.into_iter().map(ChunkResponse::from).collect()))
}

pub async fn list_gold_distributions(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<Vec<DistributionResponse>>> {
    let mut conn = state.db()?;
    pipeline::find_document(&mut conn, document_id)?;
    let distributions = pipeline::document_gold_distributions(&mut conn, document_id)?;
    Ok(Json(
        distributions.iter().map(DistributionResponse::from).collect(),
    ))
}

pub async fn get_processing_stats(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<ProcessingStats>> {
    let mut conn = state.db()?;
    let snapshot = pipeline::load_pipeline_snapshot(&mut conn, document_id)?;
    Ok(Json(snapshot.stats()))
}

pub async fn retry_gold(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<RetryResponse>> {
    let mut conn = state.db()?;
    let requeued = retry::retry_failed_gold_distribution(&mut conn, document_id)?;
    Ok(Json(RetryResponse { requeued }))
}

pub async fn start_bronze(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;
    let document = intake::begin_extraction(&mut conn, document_id)?;
    Ok(Json(document.into()))
}

pub async fn complete_bronze(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(payload): Json<CompleteBronzeRequest>,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;
    let document = intake::complete_extraction(
        &mut conn,
        document_id,
        &payload.extracted_text,
        payload.metadata,
    )?;
    Ok(Json(document.into()))
}

pub async fn create_silver_chunk(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(payload): Json<NewChunkInput>,
) -> AppResult<Json<ChunkResponse>> {
    let mut conn = state.db()?;
    let chunk = chunks::create_silver_chunk(&mut conn, document_id, payload)?;
    Ok(Json(chunk.into()))
}
