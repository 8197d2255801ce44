use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{ExtractedEntity, NewSilverChunk, SilverChunk};
use crate::schema::silver_chunks;
use crate::status::ProcessingStatus;

use super::ledger::ensure_distribution;
use super::{lock_document, refresh_document_aggregates, LedgerError, LedgerResult};

#[derive(Debug, Clone, Deserialize)]
pub struct NewChunkInput {
    pub chunk_index: i32,
    pub content: String,
    #[serde(default)]
    pub token_count: i32,
    #[serde(default)]
    pub page_number: Option<i32>,
    #[serde(default)]
    pub has_table: bool,
    #[serde(default)]
    pub has_image: bool,
    #[serde(default)]
    pub section_hierarchy: Vec<String>,
    #[serde(default)]
    pub extracted_entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub processing_status: Option<ProcessingStatus>,
}

pub fn validate_entities(entities: &[ExtractedEntity]) -> LedgerResult<()> {
    for entity in entities {
        if !(0.0..=1.0).contains(&entity.confidence) {
            return Err(LedgerError::Invalid(format!(
                "entity '{}' has confidence {} outside [0, 1]",
                entity.value, entity.confidence
            )));
        }
        if entity.start_offset < 0 || entity.end_offset < entity.start_offset {
            return Err(LedgerError::Invalid(format!(
                "entity '{}' has invalid offsets {}..{}",
                entity.value, entity.start_offset, entity.end_offset
            )));
        }
    }
    Ok(())
}

fn validate_chunk(input: &NewChunkInput) -> LedgerResult<()> {
    if input.chunk_index < 0 {
        return Err(LedgerError::Invalid("chunk_index must not be negative".into()));
    }
    if input.token_count < 0 {
        return Err(LedgerError::Invalid("token_count must not be negative".into()));
    }
    validate_entities(&input.extracted_entities)
}

fn find_chunk(conn: &mut PgConnection, chunk_id: Uuid) -> LedgerResult<SilverChunk> {
    silver_chunks::table
        .find(chunk_id)
        .first::<SilverChunk>(conn)
        .optional()?
        .ok_or(LedgerError::ChunkNotFound(chunk_id))
}

pub fn create_silver_chunk(
    conn: &mut PgConnection,
    document_id: Uuid,
    input: NewChunkInput,
) -> LedgerResult<SilverChunk> {
    validate_chunk(&input)?;

    conn.transaction(|conn| {
        let document = lock_document(conn, document_id)?;
        if !document.bronze_complete() {
            return Err(LedgerError::BronzeIncomplete(document_id));
        }

        let duplicate = || LedgerError::DuplicateChunkIndex {
            document_id,
            chunk_index: input.chunk_index,
        };

        let existing = silver_chunks::table
            .filter(silver_chunks::document_id.eq(document_id))
            .filter(silver_chunks::chunk_index.eq(input.chunk_index))
            .select(silver_chunks::id)
            .first::<Uuid>(conn)
            .optional()?;
        if existing.is_some() {
            return Err(duplicate());
        }

        let status = input.processing_status.unwrap_or(ProcessingStatus::Pending);
        let entities = serde_json::to_value(&input.extracted_entities)
            .map_err(|err| LedgerError::Invalid(format!("extracted_entities: {err}")))?;
        let new_chunk = NewSilverChunk {
            id: Uuid::new_v4(),
            document_id,
            chunk_index: input.chunk_index,
            content: input.content,
            token_count: input.token_count,
            page_number: input.page_number,
            has_table: input.has_table,
            has_image: input.has_image,
            section_hierarchy: input.section_hierarchy,
            extracted_entities: entities,
            processing_status: status.as_str().to_string(),
        };

        match diesel::insert_into(silver_chunks::table)
            .values(&new_chunk)
            .execute(conn)
        {
            Ok(_) => {}
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                return Err(duplicate());
            }
            Err(err) => return Err(err.into()),
        }

        let chunk = find_chunk(conn, new_chunk.id)?;
        if chunk.status() == ProcessingStatus::Completed {
            ensure_distribution(conn, &document, &chunk)?;
        }
        refresh_document_aggregates(conn, document_id)?;

        info!(
            document_id = %document_id,
            silver_chunk_id = %chunk.id,
            chunk_index = chunk.chunk_index,
            status = %status,
            "silver chunk created"
        );
        Ok(chunk)
    })
}

pub fn update_chunk_status(
    conn: &mut PgConnection,
    chunk_id: Uuid,
    status: ProcessingStatus,
    error_message: Option<&str>,
) -> LedgerResult<SilverChunk> {
    conn.transaction(|conn| {
        let document_id = find_chunk(conn, chunk_id)?.document_id;
        let document = lock_document(conn, document_id)?;
        let chunk = silver_chunks::table
            .find(chunk_id)
            .for_update()
            .first::<SilverChunk>(conn)?;

        let current = chunk.status();
        if current == ProcessingStatus::Completed {
            if status == ProcessingStatus::Completed {
                return Ok(chunk);
            }
            return Err(LedgerError::Invalid(format!(
                "silver chunk {chunk_id} already completed"
            )));
        }

        let error_message = match status {
            ProcessingStatus::Failed => error_message
                .map(str::trim)
                .filter(|message| !message.is_empty()),
            _ => None,
        };

        diesel::update(silver_chunks::table.find(chunk_id))
            .set((
                silver_chunks::processing_status.eq(status.as_str()),
                silver_chunks::error_message.eq(error_message),
                silver_chunks::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        let chunk = find_chunk(conn, chunk_id)?;
        if status == ProcessingStatus::Completed {
            ensure_distribution(conn, &document, &chunk)?;
        }
        refresh_document_aggregates(conn, document_id)?;

        if status == ProcessingStatus::Failed {
            warn!(
                document_id = %document_id,
                silver_chunk_id = %chunk_id,
                chunk_index = chunk.chunk_index,
                error = error_message.unwrap_or("unspecified"),
                "silver chunk failed"
            );
        } else {
            info!(
                document_id = %document_id,
                silver_chunk_id = %chunk_id,
                from = %current,
                to = %status,
                "silver chunk status changed"
            );
        }
        Ok(chunk)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(confidence: f64) -> ExtractedEntity {
        ExtractedEntity {
            entity_type: "ORG".to_string(),
            value: "Acme".to_string(),
            normalized_value: "acme".to_string(),
            start_offset: 4,
            end_offset: 8,
            confidence,
        }
    }

    fn input(entities: Vec<ExtractedEntity>) -> NewChunkInput {
        NewChunkInput {
            chunk_index: 0,
            content: "Acme reported growth".to_string(),
            token_count: 3,
            page_number: Some(1),
            has_table: false,
            has_image: false,
            section_hierarchy: vec!["Results".to_string()],
            extracted_entities: entities,
            processing_status: None,
        }
    }

    #[test]
    fn confidence_bounds_are_inclusive() {
        assert!(validate_entities(&[entity(0.0), entity(1.0), entity(0.42)]).is_ok());
        assert!(matches!(
            validate_entities(&[entity(1.2)]),
            Err(LedgerError::Invalid(_))
        ));
        assert!(validate_entities(&[entity(f64::NAN)]).is_err());
    }

    #[test]
    fn negative_index_is_rejected() {
        let mut chunk = input(vec![]);
        chunk.chunk_index = -1;
        assert!(validate_chunk(&chunk).is_err());
        assert!(validate_chunk(&input(vec![entity(0.9)])).is_ok());
    }

    #[test]
    fn input_defaults_from_minimal_json() {
        let parsed: NewChunkInput = serde_json::from_value(serde_json::json!({
            "chunk_index": 2,
            "content": "text",
            "extracted_entities": [{
                "type": "PERSON",
                "value": "Ada",
                "normalized_value": "ada",
                "start_offset": 0,
                "end_offset": 3,
                "confidence": 0.8
            }]
        }))
        .unwrap();
        assert_eq!(parsed.chunk_index, 2);
        assert!(parsed.processing_status.is_none());
        assert_eq!(parsed.extracted_entities[0].entity_type, "PERSON");
    }
}
