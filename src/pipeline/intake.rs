use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Document, NewDocument};
use crate::schema::documents;
use crate::status::ProcessingStatus;

use super::categories::find_category;
use super::{
    ensure_max_len, find_document, lock_document, LedgerError, LedgerResult, MAX_FILE_KEY_LEN,
    MAX_MIME_TYPE_LEN, MAX_NAME_LEN,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewDocumentInput {
    pub original_filename: String,
    pub file_key: String,
    pub file_size: i64,
    pub mime_type: String,
    #[serde(default)]
    pub document_type_id: Option<Uuid>,
    #[serde(default)]
    pub document_category_id: Option<Uuid>,
    #[serde(default)]
    pub bronze_metadata: Option<Value>,
}

fn normalize_metadata(value: Option<Value>) -> Value {
    match value {
        Some(Value::Object(map)) => Value::Object(map),
        _ => Value::Object(Default::default()),
    }
}

pub fn register_document(conn: &mut PgConnection, input: NewDocumentInput) -> LedgerResult<Document> {
    let original_filename = input.original_filename.trim();
    let file_key = input.file_key.trim();
    if original_filename.is_empty() {
        return Err(LedgerError::Invalid("original_filename must not be empty".into()));
    }
    if file_key.is_empty() {
        return Err(LedgerError::Invalid("file_key must not be empty".into()));
    }
    if input.file_size < 0 {
        return Err(LedgerError::Invalid("file_size must not be negative".into()));
    }
    let mime_type = input.mime_type.trim();
    ensure_max_len("original_filename", original_filename, MAX_NAME_LEN)?;
    ensure_max_len("file_key", file_key, MAX_FILE_KEY_LEN)?;
    ensure_max_len("mime_type", mime_type, MAX_MIME_TYPE_LEN)?;

    if let Some(category_id) = input.document_category_id {
        match find_category(conn, category_id) {
            Ok(_) => {}
            Err(LedgerError::CategoryNotFound(id)) => {
                return Err(LedgerError::Invalid(format!("unknown document category {id}")));
            }
            Err(err) => return Err(err),
        }
    }

    let new_document = NewDocument {
        id: Uuid::new_v4(),
        document_type_id: input.document_type_id,
        document_category_id: input.document_category_id,
        original_filename: original_filename.to_string(),
        file_key: file_key.to_string(),
        file_size: input.file_size,
        mime_type: mime_type.to_string(),
        bronze_metadata: normalize_metadata(input.bronze_metadata),
    };

    match diesel::insert_into(documents::table)
        .values(&new_document)
        .execute(conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(LedgerError::DuplicateFileKey(new_document.file_key));
        }
        Err(err) => return Err(err.into()),
    }

    info!(
        document_id = %new_document.id,
        file_key = %new_document.file_key,
        "document registered"
    );
    find_document(conn, new_document.id)
}

pub fn begin_extraction(conn: &mut PgConnection, document_id: Uuid) -> LedgerResult<Document> {
    conn.transaction(|conn| {
        let document = lock_document(conn, document_id)?;
        if document.bronze_complete() || document.embedding_state() == ProcessingStatus::Processing {
            return Ok(document);
        }

        diesel::update(documents::table.find(document_id))
            .set((
                documents::embedding_status.eq(ProcessingStatus::Processing.as_str()),
                documents::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        debug!(document_id = %document_id, "text extraction started");
        find_document(conn, document_id)
    })
}

/// Bronze fields are written once.
pub fn complete_extraction(
    conn: &mut PgConnection,
    document_id: Uuid,
    extracted_text: &str,
    metadata: Option<Value>,
) -> LedgerResult<Document> {
    conn.transaction(|conn| {
        let document = lock_document(conn, document_id)?;
        if document.bronze_complete() {
            debug!(document_id = %document_id, "bronze already complete, ignoring result");
            return Ok(document);
        }

        let metadata = match metadata {
            Some(value) => normalize_metadata(Some(value)),
            None => document.bronze_metadata.clone(),
        };
        let now = Utc::now().naive_utc();

        diesel::update(documents::table.find(document_id))
            .set((
                documents::extracted_text.eq(Some(extracted_text)),
                documents::bronze_processed_at.eq(Some(now)),
                documents::bronze_metadata.eq(&metadata),
                documents::embedding_status.eq(ProcessingStatus::Processing.as_str()),
                documents::updated_at.eq(now),
            ))
            .execute(conn)?;

        info!(
            document_id = %document_id,
            characters = extracted_text.chars().count(),
            "bronze extraction completed"
        );
        find_document(conn, document_id)
    })
}
