use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::DocumentCategory;
use crate::pipeline::{categories, view::utc};
use crate::state::AppState;
use crate::status::GoldLayer;

#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub target_gold_layers: Vec<String>,
}

#[derive(Serialize)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    pub target_gold_layers: Vec<GoldLayer>,
    pub created_at: DateTime<Utc>,
}

impl From<DocumentCategory> for CategoryResponse {
    fn from(category: DocumentCategory) -> Self {
        Self {
            id: category.id,
            target_gold_layers: category.target_layers(),
            name: category.name,
            created_at: utc(category.created_at),
        }
    }
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<CategoryResponse>>> {
    let mut conn = state.db()?;
    let categories = categories::list_categories(&mut conn)?;
    Ok(Json(categories.into_iter().map(CategoryResponse::from).collect()))
}

pub async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<CreateCategoryRequest>,
) -> AppResult<Json<CategoryResponse>> {
    let targets = payload
        .target_gold_layers
        .iter()
        .map(|raw| {
            GoldLayer::parse(raw)
                .ok_or_else(|| AppError::bad_request(format!("unknown gold layer '{raw}'")))
        })
        .collect::<AppResult<Vec<_>>>()?;

    let mut conn = state.db()?;
    let category = categories::create_category(&mut conn, &payload.name, &targets)?;
    Ok(Json(category.into()))
}
