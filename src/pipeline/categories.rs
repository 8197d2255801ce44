use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::DatabaseErrorKind;
use uuid::Uuid;

use crate::models::{Document, DocumentCategory, NewDocumentCategory};
use crate::schema::document_categories;
use crate::status::GoldLayer;

use super::{ensure_max_len, LedgerError, LedgerResult, MAX_NAME_LEN};

pub fn list_categories(conn: &mut PgConnection) -> LedgerResult<Vec<DocumentCategory>> {
    let categories = document_categories::table
        .order(document_categories::name.asc())
        .load(conn)?;
    Ok(categories)
}

pub fn find_category(conn: &mut PgConnection, category_id: Uuid) -> LedgerResult<DocumentCategory> {
    document_categories::table
        .find(category_id)
        .first::<DocumentCategory>(conn)
        .optional()?
        .ok_or(LedgerError::CategoryNotFound(category_id))
}

pub fn create_category(
    conn: &mut PgConnection,
    name: &str,
    targets: &[GoldLayer],
) -> LedgerResult<DocumentCategory> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::Invalid("name must not be empty".into()));
    }
    ensure_max_len("name", name, MAX_NAME_LEN)?;

    let mut layers = targets.to_vec();
    layers.sort();
    layers.dedup();

    let new_category = NewDocumentCategory {
        id: Uuid::new_v4(),
        name: name.to_string(),
        target_gold_layers: layers.iter().map(|layer| layer.as_str().to_string()).collect(),
    };

    match diesel::insert_into(document_categories::table)
        .values(&new_category)
        .execute(conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(LedgerError::DuplicateCategory(name.to_string()));
        }
        Err(err) => return Err(err.into()),
    }

    find_category(conn, new_category.id)
}

/// Uncategorized documents target every layer.
pub fn target_layers_for(conn: &mut PgConnection, document: &Document) -> LedgerResult<Vec<GoldLayer>> {
    match document.document_category_id {
        Some(category_id) => Ok(find_category(conn, category_id)?.target_layers()),
        None => Ok(GoldLayer::ALL.to_vec()),
    }
}
