use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::jobs::JobQueueError;
use crate::models::{Document, GoldDistribution, SilverChunk};
use crate::schema::{documents, gold_distributions, silver_chunks};
use crate::status::GoldLayer;

pub mod categories;
pub mod chunks;
pub mod intake;
pub mod ledger;
pub mod retry;
pub mod stats;
pub mod view;

pub use stats::{
    compute_document_aggregates, processing_stats, DocumentAggregates, LayerCounts, ProcessingStats,
};
pub use view::{derive_pipeline_view, PipelineStage, PipelineView, StageStatus, StageView};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("job queue error: {0}")]
    JobQueue(#[from] JobQueueError),
    #[error("document {0} not found")]
    DocumentNotFound(Uuid),
    #[error("silver chunk {0} not found")]
    ChunkNotFound(Uuid),
    #[error("gold distribution {0} not found")]
    DistributionNotFound(Uuid),
    #[error("document category {0} not found")]
    CategoryNotFound(Uuid),
    #[error("document {0} has not completed text extraction")]
    BronzeIncomplete(Uuid),
    #[error("file key '{0}' is already registered")]
    DuplicateFileKey(String),
    #[error("chunk index {chunk_index} already exists for document {document_id}")]
    DuplicateChunkIndex { document_id: Uuid, chunk_index: i32 },
    #[error("category name '{0}' is already in use")]
    DuplicateCategory(String),
    #[error(
        "{layer} of distribution {distribution_id} already completed with '{existing}', refusing '{attempted}'"
    )]
    ConflictingDestinationId {
        distribution_id: Uuid,
        layer: GoldLayer,
        existing: String,
        attempted: String,
    },
    #[error("invalid input: {0}")]
    Invalid(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

pub(crate) const MAX_NAME_LEN: usize = 255;
pub(crate) const MAX_FILE_KEY_LEN: usize = 500;
pub(crate) const MAX_MIME_TYPE_LEN: usize = 100;
pub(crate) const MAX_DESTINATION_ID_LEN: usize = 255;

pub(crate) fn ensure_max_len(field: &str, value: &str, max: usize) -> LedgerResult<()> {
    if value.chars().count() > max {
        return Err(LedgerError::Invalid(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

pub fn find_document(conn: &mut PgConnection, document_id: Uuid) -> LedgerResult<Document> {
    documents::table
        .find(document_id)
        .first::<Document>(conn)
        .optional()?
        .ok_or(LedgerError::DocumentNotFound(document_id))
}

pub(crate) fn lock_document(conn: &mut PgConnection, document_id: Uuid) -> LedgerResult<Document> {
    documents::table
        .find(document_id)
        .for_update()
        .first::<Document>(conn)
        .optional()?
        .ok_or(LedgerError::DocumentNotFound(document_id))
}

pub fn document_silver_chunks(
    conn: &mut PgConnection,
    document_id: Uuid,
) -> LedgerResult<Vec<SilverChunk>> {
    let chunks = silver_chunks::table
        .filter(silver_chunks::document_id.eq(document_id))
        .order(silver_chunks::chunk_index.asc())
        .load(conn)?;
    Ok(chunks)
}

pub fn document_gold_distributions(
    conn: &mut PgConnection,
    document_id: Uuid,
) -> LedgerResult<Vec<GoldDistribution>> {
    let distributions = gold_distributions::table
        .inner_join(silver_chunks::table)
        .filter(gold_distributions::document_id.eq(document_id))
        .order(silver_chunks::chunk_index.asc())
        .select(gold_distributions::all_columns)
        .load::<GoldDistribution>(conn)?;
    Ok(distributions)
}

/// Recomputes `embedding_status`, `silver_chunk_count`, `silver_processed_at` and
/// `gold_distribution_status` from the live child rows. Callers hold the document lock.
pub fn refresh_document_aggregates(
    conn: &mut PgConnection,
    document_id: Uuid,
) -> LedgerResult<Document> {
    let document = find_document(conn, document_id)?;
    let chunks = document_silver_chunks(conn, document_id)?;
    let distributions = document_gold_distributions(conn, document_id)?;

    let now = Utc::now().naive_utc();
    let aggregates = compute_document_aggregates(&document, &chunks, &distributions, now);
    if aggregates.matches(&document) {
        return Ok(document);
    }

    diesel::update(documents::table.find(document_id))
        .set((
            documents::embedding_status.eq(aggregates.embedding_status.as_str()),
            documents::silver_chunk_count.eq(aggregates.silver_chunk_count),
            documents::silver_processed_at.eq(aggregates.silver_processed_at),
            documents::gold_distribution_status.eq(aggregates.gold_distribution_status.as_str()),
            documents::updated_at.eq(now),
        ))
        .execute(conn)?;

    find_document(conn, document_id)
}

#[derive(Debug, Clone)]
pub struct PipelineSnapshot {
    pub document: Document,
    pub chunks: Vec<SilverChunk>,
    pub distributions: Vec<GoldDistribution>,
}

impl PipelineSnapshot {
    pub fn view(&self) -> PipelineView {
        derive_pipeline_view(&self.document, &self.chunks, &self.distributions)
    }

    pub fn stats(&self) -> ProcessingStats {
        processing_stats(&self.distributions)
    }
}

pub fn load_pipeline_snapshot(
    conn: &mut PgConnection,
    document_id: Uuid,
) -> LedgerResult<PipelineSnapshot> {
    conn.transaction(|conn| {
        let document = find_document(conn, document_id)?;
        let chunks = document_silver_chunks(conn, document_id)?;
        let distributions = document_gold_distributions(conn, document_id)?;

        if document.silver_chunk_count as usize != chunks.len() {
            warn!(
                document_id = %document_id,
                recorded = document.silver_chunk_count,
                live = chunks.len(),
                "silver chunk count out of sync with chunk rows"
            );
        }

        Ok(PipelineSnapshot {
            document,
            chunks,
            distributions,
        })
    })
}
