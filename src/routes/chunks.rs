use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{ExtractedEntity, SilverChunk};
use crate::pipeline::{chunks, view::utc};
use crate::state::AppState;
use crate::status::ProcessingStatus;

#[derive(Serialize)]
pub struct ChunkResponse {
    pub id: Uuid,
    pub document_id: Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub token_count: i32,
    pub page_number: Option<i32>,
    pub has_table: bool,
    pub has_image: bool,
    pub section_hierarchy: Vec<String>,
    pub extracted_entities: Vec<ExtractedEntity>,
    pub processing_status: ProcessingStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SilverChunk> for ChunkResponse {
    fn from(chunk: SilverChunk) -> Self {
        Self {
            extracted_entities: chunk.entities(),
            processing_status: chunk.status(),
            id: chunk.id,
            document_id: chunk.document_id,
            chunk_index: chunk.chunk_index,
            content: chunk.content,
            token_count: chunk.token_count,
            page_number: chunk.page_number,
            has_table: chunk.has_table,
            has_image: chunk.has_image,
            section_hierarchy: chunk.section_hierarchy,
            error_message: chunk.error_message,
            created_at: utc(chunk.created_at),
            updated_at: utc(chunk.updated_at),
        }
    }
}

#[derive(Deserialize)]
pub struct UpdateChunkStatusRequest {
    pub status: ProcessingStatus,
    #[serde(default)]
    pub error_message: Option<String>,
}

pub async fn update_chunk_status(
    State(state): State<AppState>,
    Path(chunk_id): Path<Uuid>,
    Json(payload): Json<UpdateChunkStatusRequest>,
) -> AppResult<Json<ChunkResponse>> {
    let mut conn = state.db()?;
    let chunk = chunks::update_chunk_status(
        &mut conn,
        chunk_id,
        payload.status,
        payload.error_message.as_deref(),
    )?;
    Ok(Json(chunk.into()))
}
